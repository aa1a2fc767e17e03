//! The agent state machine: a bounded think/act loop.
//!
//! # Loop
//!
//! ```text
//! begin(input)            Idle -> Running, input becomes pending
//! while step < max && state != Finished:
//!     step += 1
//!     think  -> act (only if think asked for it)
//!     stuck? -> remediation appended to pending input, loop ends
//! budget spent -> Finished, "Reached maximum steps without finishing."
//! end_run                 cleanup hook, state -> Idle, step -> 0
//! ```
//!
//! Nothing raised inside the loop escapes [`Agent::run`]; it ends up as a
//! trace line. Only usage errors (not idle, blank input) are returned.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use stepwise_core::agent::AgentState;
use stepwise_core::error::AgentError;
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_core::message::{Conversation, Message, MessageToolCall};
use tracing::{debug, error, info, warn};

use crate::stepper::{AgentContext, Stepper, Thought, ToolOutcome};
use crate::stuck;

pub const NO_ACTION_NEEDED: &str = "Thinking complete - no action needed";
pub const NO_TOOL_CALLS: &str = "Tool calls not found in chat response, no action taken.";
pub const MAX_STEPS_REACHED: &str = "Reached maximum steps without finishing.";

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The terminate tool moved the agent to FINISHED.
    Terminated,
    /// A terminal textual reply ended the run (streaming mode).
    Replied,
    /// The step budget ran out.
    MaxSteps,
    /// The repetition guard ended the run early.
    Stuck,
    /// A streaming session was cancelled, timed out or lost its sink.
    Cancelled,
    /// The step itself failed.
    Failed(String),
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Terminated => "terminated",
            Self::Replied => "replied",
            Self::MaxSteps => "max_steps",
            Self::Stuck => "stuck",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

/// The synchronous result of [`Agent::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Steps performed before the run ended.
    pub steps: usize,
    pub trace: Vec<String>,
}

impl RunReport {
    /// The newline-joined trace.
    pub fn text(&self) -> String {
        self.trace.join("\n")
    }
}

/// A reusable, single-writer agent.
///
/// `run` borrows the agent mutably, so two runs can never overlap on one
/// instance. Allocate one agent per concurrent conversation
/// (see [`crate::AgentTemplate`]).
pub struct Agent {
    name: String,
    description: String,
    system_prompt: String,
    next_step_prompt: String,
    stuck_prompt: String,
    max_steps: usize,
    duplicate_threshold: usize,
    stepper: Box<dyn Stepper>,
    ctx: AgentContext,
    step: usize,
    event_bus: Option<Arc<EventBus>>,
}

impl Agent {
    /// Create an agent around a stepper with default limits
    /// (10 steps, duplicate threshold 2) and no prompts.
    pub fn new(name: impl Into<String>, stepper: Box<dyn Stepper>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: String::new(),
            next_step_prompt: String::new(),
            stuck_prompt: String::new(),
            max_steps: 10,
            duplicate_threshold: 2,
            stepper,
            ctx: AgentContext::new(),
            step: 0,
            event_bus: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Guidance appended to the system message.
    pub fn with_next_step_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.next_step_prompt = prompt.into();
        self
    }

    pub fn with_stuck_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.stuck_prompt = prompt.into();
        self
    }

    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_duplicate_threshold(mut self, threshold: usize) -> Self {
        self.duplicate_threshold = threshold;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Continue an existing conversation instead of starting empty.
    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.ctx.conversation = conversation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn state(&self) -> AgentState {
        self.ctx.state
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn conversation(&self) -> &Conversation {
        &self.ctx.conversation
    }

    pub fn pending_input(&self) -> Option<&str> {
        self.ctx.pending_input.as_deref()
    }

    /// Run the loop to completion and return the step trace.
    pub async fn run(&mut self, input: &str) -> Result<RunReport, AgentError> {
        self.begin(input)?;

        let mut trace = Vec::new();
        let outcome = loop {
            if self.ctx.state == AgentState::Finished {
                break RunOutcome::Terminated;
            }
            if self.step >= self.max_steps {
                warn!(agent = %self.name, steps = self.step, "Reached maximum steps without finishing");
                trace.push(MAX_STEPS_REACHED.to_string());
                break RunOutcome::MaxSteps;
            }

            let step = self.advance();
            match self.step().await {
                Ok(summary) => {
                    if self.check_stuck() {
                        trace.push(format!("Step {step}: Stuck detected, handling stuck step."));
                        break RunOutcome::Stuck;
                    }
                    self.publish_step(step, &summary);
                    trace.push(format!("Step {step}: {summary}"));
                }
                Err(e) => {
                    error!(agent = %self.name, step, error = %e, "Agent step failed");
                    self.ctx.state = AgentState::Error;
                    trace.push(format!("error: {e}"));
                    break RunOutcome::Failed(e.to_string());
                }
            }
        };

        let steps = self.step;
        self.end_run(&outcome);
        Ok(RunReport {
            outcome,
            steps,
            trace,
        })
    }

    /// One think/act cycle, summarised as text.
    pub async fn step(&mut self) -> stepwise_core::Result<String> {
        let thought = self.think().await?;
        if !thought.needs_action {
            return Ok(NO_ACTION_NEEDED.to_string());
        }
        Ok(self.act().await)
    }

    // --- Loop primitives (also driven by the streaming adapter) ---

    /// Validate the input and move `Idle -> Running`.
    pub fn begin(&mut self, input: &str) -> Result<(), AgentError> {
        if self.ctx.state != AgentState::Idle {
            return Err(AgentError::NotIdle {
                agent: self.name.clone(),
                state: self.ctx.state.to_string(),
            });
        }
        if input.trim().is_empty() {
            return Err(AgentError::BlankInput);
        }

        if self.ctx.conversation.is_empty() {
            if let Some(system) = self.system_message() {
                self.ctx.push(system);
            }
        }
        self.ctx.run_start = self.ctx.conversation.len();
        self.ctx.pending_input = Some(input.to_string());
        self.ctx.state = AgentState::Running;
        self.step = 0;

        info!(agent = %self.name, max_steps = self.max_steps, "Agent run starting");
        self.publish(DomainEvent::RunStarted {
            agent: self.name.clone(),
            max_steps: self.max_steps,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Whether another step may run.
    pub fn can_step(&self) -> bool {
        self.ctx.state == AgentState::Running && self.step < self.max_steps
    }

    /// Increment the step counter and return the new step number.
    pub fn advance(&mut self) -> usize {
        self.step += 1;
        debug!(agent = %self.name, step = self.step, max = self.max_steps, "Executing step");
        self.step
    }

    pub async fn think(&mut self) -> stepwise_core::Result<Thought> {
        let thought = self.stepper.think(&mut self.ctx).await?;
        debug!(
            agent = %self.name,
            step = self.step,
            needs_action = thought.needs_action,
            "Think complete"
        );
        Ok(thought)
    }

    /// The next call `act_next` would execute.
    pub fn next_call(&self) -> Option<&MessageToolCall> {
        self.stepper.next_call()
    }

    /// Execute the next pending tool call.
    pub async fn act_next(&mut self) -> Option<ToolOutcome> {
        let outcome = self.stepper.act_next(&mut self.ctx).await?;
        self.publish(DomainEvent::ToolExecuted {
            tool_name: outcome.name.clone(),
            success: outcome.success,
            duration_ms: outcome.duration_ms,
            timestamp: Utc::now(),
        });
        Some(outcome)
    }

    /// Execute every pending tool call and summarise the results.
    pub async fn act(&mut self) -> String {
        if self.next_call().is_none() {
            return NO_TOOL_CALLS.to_string();
        }
        let mut lines = Vec::new();
        while let Some(outcome) = self.act_next().await {
            lines.push(outcome.summary());
        }
        lines.join("\n")
    }

    /// Run the repetition guard over this run's messages.
    ///
    /// When stuck, the remediation prompt is appended to the pending input.
    pub fn check_stuck(&mut self) -> bool {
        if !stuck::is_stuck(self.ctx.run_messages(), self.duplicate_threshold) {
            return false;
        }

        warn!(agent = %self.name, step = self.step, "Stuck detected");
        let mut pending = self.ctx.pending_input.take().unwrap_or_default();
        pending.push_str(&self.stuck_prompt);
        self.ctx.pending_input = Some(pending);

        self.publish(DomainEvent::StuckDetected {
            agent: self.name.clone(),
            step: self.step,
            timestamp: Utc::now(),
        });
        true
    }

    /// Record a completed step on the event bus.
    pub fn publish_step(&self, step: usize, summary: &str) {
        self.publish(DomainEvent::StepCompleted {
            agent: self.name.clone(),
            step,
            summary: summary.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Close the run: terminal state, cleanup hook, reset to `Idle`.
    pub fn end_run(&mut self, outcome: &RunOutcome) {
        self.ctx.state = match outcome {
            RunOutcome::Failed(_) => AgentState::Error,
            _ => AgentState::Finished,
        };
        let steps = self.step;

        self.stepper.cleanup(&mut self.ctx);
        self.ctx.state = AgentState::Idle;
        self.step = 0;

        info!(agent = %self.name, outcome = outcome.label(), steps, "Agent run completed, state reset to idle");
        self.publish(DomainEvent::RunFinished {
            agent: self.name.clone(),
            outcome: outcome.label().to_string(),
            steps,
            timestamp: Utc::now(),
        });
    }

    fn system_message(&self) -> Option<Message> {
        let parts: Vec<&str> = [self.system_prompt.as_str(), self.next_step_prompt.as_str()]
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(Message::system(parts.join("\n\n")))
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use crate::tool_calling::ToolCallingStepper;
    use stepwise_core::message::Role;
    use stepwise_core::tool::TERMINATE_TOOL;

    fn agent_with(provider: SequentialMockProvider, max_steps: usize) -> Agent {
        let stepper = ToolCallingStepper::new(Arc::new(provider), Arc::new(mock_tools()), "mock");
        Agent::new("test-agent", Box::new(stepper))
            .with_system_prompt("You are a test agent.")
            .with_stuck_prompt(" Try something else.")
            .with_max_steps(max_steps)
    }

    #[tokio::test]
    async fn repeated_reply_is_stuck_at_third_step() {
        let mut agent = agent_with(SequentialMockProvider::repeating("X"), 3);
        let report = agent.run("go").await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Stuck);
        assert_eq!(
            report.trace,
            vec![
                format!("Step 1: {NO_ACTION_NEEDED}"),
                format!("Step 2: {NO_ACTION_NEEDED}"),
                "Step 3: Stuck detected, handling stuck step.".to_string(),
            ]
        );
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.current_step(), 0);
        assert_eq!(agent.pending_input(), Some(" Try something else."));
    }

    #[tokio::test]
    async fn budget_exhaustion_is_normal_outcome() {
        let provider = SequentialMockProvider::new(vec![
            make_text_response("one"),
            make_text_response("two"),
        ]);
        let mut agent = agent_with(provider, 2);
        let report = agent.run("go").await.unwrap();

        assert_eq!(report.outcome, RunOutcome::MaxSteps);
        assert_eq!(report.steps, 2);
        assert_eq!(report.trace.last().unwrap(), MAX_STEPS_REACHED);
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn step_budget_bounds_reasoning_calls() {
        let provider = Arc::new(SequentialMockProvider::new(
            (0..10).map(|i| make_text_response(&format!("reply {i}"))).collect(),
        ));
        let stepper = ToolCallingStepper::new(provider.clone(), Arc::new(mock_tools()), "mock");
        let mut agent = Agent::new("a", Box::new(stepper)).with_max_steps(4);

        agent.run("go").await.unwrap();
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn terminate_tool_finishes_run() {
        let provider = SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("echo", serde_json::json!({"text": "hi"}))], "Looking"),
            make_tool_call_response(
                vec![
                    make_tool_call("echo", serde_json::json!({"text": "bye"})),
                    make_tool_call(TERMINATE_TOOL, serde_json::json!({"status": "success"})),
                ],
                "",
            ),
        ]);
        let mut agent = agent_with(provider, 10);
        let report = agent.run("say hi").await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Terminated);
        assert_eq!(report.steps, 2);
        assert_eq!(report.trace.len(), 2);
        assert_eq!(report.trace[0], "Step 1: Tool: echo, Result: hi");
        assert!(report.trace[1].starts_with("Step 2: Tool: echo, Result: bye\nTool: terminate, Result:"));
        assert!(!report.text().contains(MAX_STEPS_REACHED));
    }

    #[tokio::test]
    async fn usage_errors_are_reported_synchronously() {
        let mut agent = agent_with(SequentialMockProvider::repeating("X"), 3);
        assert_eq!(agent.run("   ").await.unwrap_err(), AgentError::BlankInput);

        agent.begin("first").unwrap();
        let err = agent.run("second").await.unwrap_err();
        assert!(matches!(err, AgentError::NotIdle { .. }));
    }

    #[tokio::test]
    async fn tool_listing_failure_degrades_the_conversation() {
        let stepper = ToolCallingStepper::new(
            Arc::new(SequentialMockProvider::repeating("X")),
            Arc::new(FailingToolSet),
            "mock",
        );
        let mut agent = Agent::new("a", Box::new(stepper));
        let report = agent.run("go").await.unwrap();

        // The same planning error repeats until the repetition guard fires
        assert_eq!(report.outcome, RunOutcome::Stuck);
        assert_eq!(report.steps, 3);
        assert_eq!(report.trace[0], format!("Step 1: {NO_ACTION_NEEDED}"));
        assert!(!report.text().contains("error: "));

        let planning_errors = agent
            .conversation()
            .messages
            .iter()
            .filter(|m| m.is_assistant() && m.content.starts_with("Error during tool call planning"))
            .count();
        assert_eq!(planning_errors, 3);
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.current_step(), 0);
    }

    #[tokio::test]
    async fn agent_is_reusable_after_any_outcome() {
        let mut agent = agent_with(SequentialMockProvider::repeating("X"), 3);
        let first = agent.run("go").await.unwrap();
        assert_eq!(first.outcome, RunOutcome::Stuck);

        // Same replies again: stuck detection only looks at this run
        let second = agent.run("go again").await.unwrap();
        assert_eq!(second.outcome, RunOutcome::Stuck);
        assert_eq!(second.trace, first.trace);

        let systems = agent.conversation().by_role(Role::System).count();
        assert_eq!(systems, 1);
    }

    #[tokio::test]
    async fn system_prompt_includes_next_step_guidance() {
        let mut agent = agent_with(SequentialMockProvider::repeating("X"), 1)
            .with_next_step_prompt("Use terminate when done.");
        agent.run("go").await.unwrap();

        let system = &agent.conversation().messages[0];
        assert_eq!(system.role, Role::System);
        assert_eq!(system.content, "You are a test agent.\n\nUse terminate when done.");
        assert_eq!(agent.conversation().messages[1].content, "go");
    }

    #[tokio::test]
    async fn events_are_published_when_bus_attached() {
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let mut agent = agent_with(SequentialMockProvider::repeating("X"), 3).with_event_bus(bus);
        agent.run("go").await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::RunStarted { .. } => "started",
                DomainEvent::StepCompleted { .. } => "step",
                DomainEvent::StuckDetected { .. } => "stuck",
                DomainEvent::RunFinished { .. } => "finished",
                _ => "other",
            });
        }
        assert_eq!(kinds, vec!["started", "step", "step", "stuck", "finished"]);
    }
}
