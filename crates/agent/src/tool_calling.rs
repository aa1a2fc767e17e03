//! Tool-calling stepper: one provider call per think, one tool per act.
//!
//! `think` sends the whole conversation plus the tools currently on offer.
//! A reply without tool calls is recorded immediately and ends the step; a
//! reply with tool calls is retained and recorded just before the first of
//! them executes, so every tool-result message follows the assistant message
//! that requested it.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use stepwise_core::agent::AgentState;
use stepwise_core::message::{Message, MessageToolCall};
use stepwise_core::provider::{Provider, ProviderRequest};
use stepwise_core::tool::{TERMINATE_TOOL, ToolCall, ToolSet};
use tracing::{debug, info, warn};

use crate::stepper::{AgentContext, Stepper, Thought, ToolOutcome};

pub struct ToolCallingStepper {
    provider: Arc<dyn Provider>,
    tools: Arc<dyn ToolSet>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    /// Assistant message whose tool calls are still pending.
    retained: Option<Message>,
    queue: VecDeque<MessageToolCall>,
}

impl ToolCallingStepper {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolSet>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            retained: None,
            queue: VecDeque::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl Stepper for ToolCallingStepper {
    async fn think(&mut self, ctx: &mut AgentContext) -> stepwise_core::Result<Thought> {
        self.retained = None;
        self.queue.clear();

        if let Some(input) = ctx.take_pending() {
            ctx.push(Message::user(input));
        }

        let tools = match self.tools.list_available().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(error = %e, "Tool listing failed");
                let content = format!("Error during tool call planning: {e}");
                ctx.push(Message::assistant(content.clone()));
                return Ok(Thought::failed(content, e.to_string()));
            }
        };
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: ctx.conversation.messages.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
        };

        match self.provider.complete(request).await {
            Ok(response) => {
                let message = response.message;
                if !message.has_tool_calls() {
                    let content = message.content.clone();
                    ctx.push(message);
                    return Ok(Thought::reply(content));
                }

                info!(
                    provider = self.provider.name(),
                    count = message.tool_calls.len(),
                    "Model requested tool calls"
                );
                let content = message.content.clone();
                self.queue = message.tool_calls.iter().cloned().collect();
                self.retained = Some(message);
                Ok(Thought::action(content))
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Reasoning call failed");
                let content = format!("Error during tool call: {e}");
                ctx.push(Message::assistant(content.clone()));
                Ok(Thought::failed(content, e.to_string()))
            }
        }
    }

    fn next_call(&self) -> Option<&MessageToolCall> {
        self.queue.front()
    }

    async fn act_next(&mut self, ctx: &mut AgentContext) -> Option<ToolOutcome> {
        if let Some(message) = self.retained.take() {
            ctx.push(message);
        }
        let call = self.queue.pop_front()?;

        debug!(tool = %call.name, id = %call.id, "Executing tool");
        let start = Instant::now();
        let request = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments_value(),
        };
        let (output, success) = match self.tools.execute(&request).await {
            Ok(result) => (result.output, result.success),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                (format!("Error executing tool {}: {e}", call.name), false)
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        ctx.push(Message::tool_result(&call.id, &call.name, &output));

        if call.name == TERMINATE_TOOL {
            info!("Terminate tool executed, agent finished");
            ctx.state = AgentState::Finished;
        }

        Some(ToolOutcome {
            call_id: call.id,
            name: call.name,
            arguments: call.arguments,
            output,
            success,
            duration_ms,
        })
    }

    fn cleanup(&mut self, _ctx: &mut AgentContext) {
        self.retained = None;
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use stepwise_core::error::ProviderError;
    use stepwise_core::message::Role;

    #[tokio::test]
    async fn text_reply_is_recorded_and_needs_no_action() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response("done")]));
        let mut stepper = ToolCallingStepper::new(provider.clone(), Arc::new(mock_tools()), "m");
        let mut ctx = AgentContext::new();
        ctx.pending_input = Some("question".into());

        let thought = stepper.think(&mut ctx).await.unwrap();
        assert!(!thought.needs_action);
        assert_eq!(thought.content, "done");
        assert_eq!(ctx.conversation.len(), 2);
        assert_eq!(ctx.conversation.messages[0].role, Role::User);
        assert!(ctx.pending_input.is_none());
        assert!(stepper.next_call().is_none());

        // Tools on offer were sent along with the history
        let requests = provider.requests();
        assert_eq!(requests[0].tools.len(), 2);
        assert_eq!(requests[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn tool_calls_recorded_before_their_results() {
        let provider = SequentialMockProvider::new(vec![make_tool_call_response(
            vec![
                make_tool_call("echo", serde_json::json!({"text": "a"})),
                make_tool_call("echo", serde_json::json!({"text": "b"})),
            ],
            "",
        )]);
        let mut stepper = ToolCallingStepper::new(Arc::new(provider), Arc::new(mock_tools()), "m");
        let mut ctx = AgentContext::new();
        ctx.pending_input = Some("go".into());

        let thought = stepper.think(&mut ctx).await.unwrap();
        assert!(thought.needs_action);
        // Not recorded until the first call executes
        assert_eq!(ctx.conversation.len(), 1);
        assert_eq!(stepper.next_call().unwrap().name, "echo");

        let first = stepper.act_next(&mut ctx).await.unwrap();
        let second = stepper.act_next(&mut ctx).await.unwrap();
        assert!(stepper.act_next(&mut ctx).await.is_none());
        assert_eq!((first.output.as_str(), second.output.as_str()), ("a", "b"));

        let roles: Vec<_> = ctx.conversation.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Tool]);
        let tool_msg = &ctx.conversation.messages[2];
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some(first.call_id.as_str()));
    }

    #[tokio::test]
    async fn provider_failure_becomes_assistant_message() {
        let provider = SequentialMockProvider::from_results(vec![Err(ProviderError::Network(
            "connection reset".into(),
        ))]);
        let mut stepper = ToolCallingStepper::new(Arc::new(provider), Arc::new(mock_tools()), "m");
        let mut ctx = AgentContext::new();
        ctx.pending_input = Some("go".into());

        let thought = stepper.think(&mut ctx).await.unwrap();
        assert!(!thought.needs_action);
        assert!(thought.failure.is_some());
        let last = ctx.conversation.last().unwrap();
        assert!(last.is_assistant());
        assert!(last.content.starts_with("Error during tool call:"));
        assert!(last.content.contains("connection reset"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failed_outcome() {
        let provider = SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_tool_call("nonexistent", serde_json::json!({}))],
            "",
        )]);
        let mut stepper = ToolCallingStepper::new(Arc::new(provider), Arc::new(mock_tools()), "m");
        let mut ctx = AgentContext::new();
        ctx.pending_input = Some("go".into());
        stepper.think(&mut ctx).await.unwrap();

        let outcome = stepper.act_next(&mut ctx).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.output.contains("nonexistent"));
        assert_eq!(ctx.state, AgentState::Idle);
    }

    #[tokio::test]
    async fn terminate_sets_finished() {
        let provider = SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_tool_call(TERMINATE_TOOL, serde_json::json!({"status": "success"}))],
            "",
        )]);
        let mut stepper = ToolCallingStepper::new(Arc::new(provider), Arc::new(mock_tools()), "m");
        let mut ctx = AgentContext::new();
        ctx.state = AgentState::Running;
        ctx.pending_input = Some("go".into());
        stepper.think(&mut ctx).await.unwrap();

        let outcome = stepper.act_next(&mut ctx).await.unwrap();
        assert!(outcome.success);
        assert_eq!(ctx.state, AgentState::Finished);
    }

    #[tokio::test]
    async fn tool_listing_failure_is_recorded_as_failed_thought() {
        let provider = Arc::new(SequentialMockProvider::repeating("x"));
        let mut stepper =
            ToolCallingStepper::new(provider.clone(), Arc::new(FailingToolSet), "m");
        let mut ctx = AgentContext::new();
        ctx.pending_input = Some("go".into());

        let thought = stepper.think(&mut ctx).await.unwrap();
        assert!(!thought.needs_action);
        assert!(thought.failure.is_some());
        assert!(thought.content.starts_with("Error during tool call planning"));

        let last = ctx.conversation.messages.last().unwrap();
        assert!(last.is_assistant());
        assert_eq!(last.content, thought.content);
        assert_eq!(provider.call_count(), 0);
        assert!(stepper.next_call().is_none());
    }
}
