//! End-to-end integration tests for the stepwise agent engine.
//!
//! These tests exercise the full pipeline: configuration, agent template,
//! built-in tools, the synchronous loop and the streaming adapter.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use stepwise_agent::{
    AgentTemplate, ChannelSink, RunOutcome, SessionManager, StreamEvent, StreamOutcome,
    StreamingAdapter,
};
use stepwise_config::{AgentSettings, AppConfig};
use stepwise_core::error::{ProviderError, ToolError};
use stepwise_core::message::{Message, MessageToolCall, Role};
use stepwise_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
use stepwise_core::tool::{ToolCall, ToolResult, ToolSet};
use stepwise_tools::default_registry;
use tokio::sync::{Notify, mpsc};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence, then
/// repeats its fallback text (if any).
struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    fallback: Option<String>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn repeating(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::new(Vec::new())
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> ProviderRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return Ok(next);
        }
        match &self.fallback {
            Some(text) => Ok(text_response(text)),
            None => panic!("ScriptedProvider exhausted after {} calls", self.calls()),
        }
    }
}

/// Waits for a permit before every answer.
struct GatedProvider {
    gate: Arc<Notify>,
}

#[async_trait::async_trait]
impl Provider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.gate.notified().await;
        Ok(text_response("finally"))
    }
}

/// A remote catalogue with a single `lookup` tool.
struct RemoteCatalogue;

#[async_trait::async_trait]
impl ToolSet for RemoteCatalogue {
    async fn list_available(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        Ok(vec![ToolDefinition {
            name: "lookup".into(),
            description: "Look up a term remotely".into(),
            parameters: serde_json::json!({"type": "object"}),
        }])
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let term = call.arguments["term"].as_str().unwrap_or_default();
        Ok(ToolResult::ok(format!("definition of {term}")))
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: None,
        model: "mock".into(),
    }
}

fn tool_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tool_calls(thought, tool_calls),
        usage: None,
        model: "mock".into(),
    }
}

fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall::new(name, serde_json::to_string(&args).unwrap())
}

fn template(provider: Arc<dyn Provider>, workdir: &std::path::Path) -> AgentTemplate {
    AgentTemplate::new(
        AgentSettings::default(),
        provider,
        "mock",
        Arc::new(default_registry(workdir)),
    )
}

async fn drain(rx: &mut mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(StreamEvent::event_type).collect()
}

// ── E2E: synchronous runs ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_write_file_then_terminate() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(
            vec![make_tool_call(
                "file_write",
                serde_json::json!({"file_name": "notes.txt", "content": "remember the milk"}),
            )],
            "I'll write that down.",
        ),
        tool_response(
            vec![make_tool_call("terminate", serde_json::json!({"status": "success"}))],
            "",
        ),
    ]));
    let mut agent = template(provider.clone(), dir.path()).instantiate();

    let report = agent.run("Write a note about milk").await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Terminated);
    assert_eq!(report.steps, 2);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(),
        "remember the milk"
    );
    assert_eq!(
        report.trace[0],
        "Step 1: Tool: file_write, Result: File written successfully: notes.txt"
    );
    assert_eq!(
        report.trace[1],
        "Step 2: Tool: terminate, Result: The interaction has been completed with status: success"
    );

    // Every tool result follows the assistant message that asked for it
    let roles: Vec<_> = agent.conversation().messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::System,
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
            Role::Tool,
        ]
    );

    // Tools were offered to the model
    let offered: Vec<_> = provider.last_request().tools.into_iter().map(|t| t.name).collect();
    assert_eq!(offered, vec!["file_read", "file_write", "terminate"]);
}

#[tokio::test]
async fn e2e_stuck_agent_keeps_partial_trace() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::repeating("I am not sure."));
    let mut agent = template(provider.clone(), dir.path()).instantiate();

    let report = agent.run("Do something").await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Stuck);
    assert_eq!(provider.calls(), 3);
    assert!(report.text().ends_with("Step 3: Stuck detected, handling stuck step."));
    assert!(agent.pending_input().unwrap().contains("Observed duplicate responses"));
}

#[tokio::test]
async fn e2e_config_limits_drive_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[provider]
name = "ollama"
model = "llama3"
temperature = 0.2

[agent]
max_steps = 2
"#,
    )
    .unwrap();
    let config = AppConfig::load_from(&path).unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("first thought"),
        text_response("second thought"),
    ]));
    let template =
        AgentTemplate::from_config(&config, provider.clone(), Arc::new(default_registry(dir.path())));
    let mut agent = template.instantiate();
    let report = agent.run("Think twice").await.unwrap();

    assert_eq!(report.outcome, RunOutcome::MaxSteps);
    assert_eq!(report.trace.last().unwrap(), "Reached maximum steps without finishing.");
    let request = provider.last_request();
    assert_eq!(request.model, "llama3");
    assert!((request.temperature - 0.2).abs() < f32::EPSILON);
}

#[tokio::test]
async fn e2e_remote_tool_is_routed_through_composite() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(
            vec![make_tool_call("lookup", serde_json::json!({"term": "borrowck"}))],
            "",
        ),
        tool_response(
            vec![make_tool_call("terminate", serde_json::json!({"status": "success"}))],
            "",
        ),
    ]));
    let mut agent = template(provider.clone(), dir.path())
        .with_remote_tools(Arc::new(RemoteCatalogue))
        .instantiate();

    let report = agent.run("Define borrowck").await.unwrap();
    assert_eq!(report.trace[0], "Step 1: Tool: lookup, Result: definition of borrowck");
    assert!(provider.last_request().tools.iter().any(|t| t.name == "lookup"));
}

#[tokio::test]
async fn e2e_configured_http_catalogue_serves_tools() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tools": [{
                "name": "weather",
                "description": "Current weather for a city",
                "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tools/weather"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"output": "Sunny, 21C"})),
        )
        .mount(&server)
        .await;

    let mut config = AppConfig::default();
    config.tools.remote_url = Some(server.uri());
    config.tools.shell_enabled = false;
    config.tools.web_fetch_enabled = false;
    config.agent.tool_refresh_interval = 1;

    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(
            vec![make_tool_call("weather", serde_json::json!({"city": "Lisbon"}))],
            "",
        ),
        tool_response(
            vec![make_tool_call("terminate", serde_json::json!({"status": "success"}))],
            "",
        ),
    ]));
    let local = stepwise_tools::registry_from_config(&config.tools, dir.path()).unwrap();
    let remote = stepwise_tools::remote_source(&config.tools).unwrap().unwrap();
    let mut agent = AgentTemplate::from_config(&config, provider.clone(), Arc::new(local))
        .with_remote_tools(remote)
        .instantiate();

    let report = agent.run("Weather in Lisbon?").await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Terminated);
    assert_eq!(report.trace[0], "Step 1: Tool: weather, Result: Sunny, 21C");
    let offered: Vec<_> = provider.last_request().tools.iter().map(|t| t.name.clone()).collect();
    assert_eq!(offered, vec!["file_read", "file_write", "terminate", "weather"]);
}

// ── E2E: streaming ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_stream_reads_file_and_answers() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("todo.md"), "buy bread").unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(
            vec![make_tool_call("file_read", serde_json::json!({"file_name": "todo.md"}))],
            "Reading your list.",
        ),
        text_response("Your list says: buy bread"),
    ]));
    let adapter = StreamingAdapter::new(Arc::new(SessionManager::new()));
    let (sink, mut rx) = ChannelSink::channel(32);

    let handle = adapter
        .start(template(provider, dir.path()).instantiate(), "What is on my list?", sink)
        .await
        .unwrap();
    let events = drain(&mut rx).await;

    assert_eq!(
        kinds(&events),
        vec![
            "stream-info",
            "thought",
            "tool-start",
            "tool-args",
            "tool-result",
            "final-response",
            "complete",
        ]
    );
    assert_eq!(
        events[4],
        StreamEvent::ToolResult {
            id: match &events[2] {
                StreamEvent::ToolStart { id, .. } => id.clone(),
                other => panic!("unexpected event: {other:?}"),
            },
            name: "file_read".into(),
            output: "buy bread".into(),
            success: true,
        }
    );
    assert_eq!(
        events[5],
        StreamEvent::FinalResponse {
            content: "Your list says: buy bread".into()
        }
    );
    assert_eq!(handle.wait().await, StreamOutcome::Finished(RunOutcome::Replied));
    assert_eq!(adapter.active_count(), 0);
}

#[tokio::test]
async fn e2e_cancelling_one_stream_leaves_the_other_running() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = Arc::new(SessionManager::new());
    let adapter = StreamingAdapter::new(sessions.clone());

    let gate = Arc::new(Notify::new());
    let slow = template(Arc::new(GatedProvider { gate: gate.clone() }), dir.path());
    let fast = template(Arc::new(ScriptedProvider::repeating("done")), dir.path());

    let (slow_sink, mut slow_rx) = ChannelSink::channel(8);
    let slow_handle = adapter.start(slow.instantiate(), "slow task", slow_sink).await.unwrap();
    assert_eq!(slow_rx.recv().await.unwrap().event_type(), "stream-info");
    assert_eq!(adapter.status(&slow_handle.session_id).unwrap().message, "slow task");

    let (fast_sink, mut fast_rx) = ChannelSink::channel(8);
    let fast_handle = adapter.start(fast.instantiate(), "fast task", fast_sink).await.unwrap();
    assert_ne!(slow_handle.session_id, fast_handle.session_id);

    assert!(adapter.cancel(&slow_handle.session_id).unwrap());
    gate.notify_one();

    let fast_events = drain(&mut fast_rx).await;
    assert_eq!(kinds(&fast_events), vec!["stream-info", "final-response", "complete"]);
    assert!(drain(&mut slow_rx).await.is_empty());

    assert_eq!(slow_handle.wait().await, StreamOutcome::Cancelled);
    assert_eq!(
        fast_handle.wait().await,
        StreamOutcome::Finished(RunOutcome::Replied)
    );
    assert_eq!(sessions.active_count(), 0);
}

#[tokio::test]
async fn e2e_dropped_receiver_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::repeating("hello"));
    let adapter = StreamingAdapter::new(Arc::new(SessionManager::new()));
    let (sink, mut rx) = ChannelSink::channel(1);

    let handle = adapter
        .start(template(provider, dir.path()).instantiate(), "hi", sink)
        .await
        .unwrap();
    assert_eq!(rx.recv().await.unwrap().event_type(), "stream-info");
    drop(rx);

    assert_eq!(handle.wait().await, StreamOutcome::Cancelled);
    assert_eq!(adapter.active_count(), 0);
}
