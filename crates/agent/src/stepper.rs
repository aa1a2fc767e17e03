//! The think/act seam between the loop and whatever does the reasoning.
//!
//! [`crate::Agent`] owns the loop shape (step budget, stuck guard, reset);
//! a [`Stepper`] supplies one think/act cycle. Behaviour is layered by
//! wrapping steppers rather than subclassing them.

use async_trait::async_trait;
use stepwise_core::agent::AgentState;
use stepwise_core::message::{Conversation, Message, MessageToolCall};

/// Mutable run state shared between the loop and its stepper.
#[derive(Debug, Default)]
pub struct AgentContext {
    /// Full history, kept across runs of the same agent.
    pub conversation: Conversation,

    /// Input to inject as a user message before the next reasoning call.
    pub pending_input: Option<String>,

    pub state: AgentState,

    /// Index of the first message produced by the current run.
    pub(crate) run_start: usize,
}

impl AgentContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.conversation.push(message);
    }

    /// Take the pending input, treating an empty string as nothing pending.
    pub fn take_pending(&mut self) -> Option<String> {
        self.pending_input.take().filter(|s| !s.is_empty())
    }

    /// Messages appended since the current run began.
    pub fn run_messages(&self) -> &[Message] {
        let start = self.run_start.min(self.conversation.messages.len());
        &self.conversation.messages[start..]
    }
}

/// What the reasoning phase decided.
#[derive(Debug, Clone, PartialEq)]
pub struct Thought {
    /// Whether the act phase has tool calls to run.
    pub needs_action: bool,

    /// Text produced alongside the decision (reply, commentary or error).
    pub content: String,

    /// Set when the reasoning capability failed and `content` describes it.
    pub failure: Option<String>,
}

impl Thought {
    pub fn reply(content: impl Into<String>) -> Self {
        Self {
            needs_action: false,
            content: content.into(),
            failure: None,
        }
    }

    pub fn action(content: impl Into<String>) -> Self {
        Self {
            needs_action: true,
            content: content.into(),
            failure: None,
        }
    }

    pub fn failed(content: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            needs_action: false,
            content: content.into(),
            failure: Some(cause.into()),
        }
    }
}

/// The result of executing one requested tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub call_id: String,
    pub name: String,
    /// Raw argument string as requested by the model.
    pub arguments: String,
    pub output: String,
    pub success: bool,
    pub duration_ms: u64,
}

impl ToolOutcome {
    /// One trace line for this call.
    pub fn summary(&self) -> String {
        format!("Tool: {}, Result: {}", self.name, self.output)
    }
}

/// One think/act cycle.
#[async_trait]
pub trait Stepper: Send {
    /// Reasoning phase. Appends to the conversation and reports whether the
    /// act phase has work to do.
    ///
    /// Reasoning failures are folded into the returned [`Thought`]; an `Err`
    /// means the step itself could not run.
    async fn think(&mut self, ctx: &mut AgentContext) -> stepwise_core::Result<Thought>;

    /// The next tool call the act phase would execute, if any.
    fn next_call(&self) -> Option<&MessageToolCall>;

    /// Execute the next pending tool call and record its result.
    ///
    /// Returns `None` once the batch retained by the last `think` is drained.
    async fn act_next(&mut self, ctx: &mut AgentContext) -> Option<ToolOutcome>;

    /// Hook run once at the end of every run, whatever the outcome.
    fn cleanup(&mut self, _ctx: &mut AgentContext) {}
}
