//! The stepwise agent engine.
//!
//! An [`Agent`] runs a bounded **think → act** loop:
//!
//! 1. **Think**: the pending input becomes a user message and the provider
//!    is asked for the next move, with the currently available tools
//! 2. **Act**: any requested tool calls are executed and their results
//!    appended to the conversation
//! 3. **Guard**: a repeated reply ends the run early as stuck
//!
//! The loop stops when the `terminate` tool runs, the step budget is spent,
//! or the agent gets stuck. [`StreamingAdapter`] drives the same loop on its
//! own task, pushing each sub-step to an [`EventSink`] and honouring
//! cancellation through a shared [`SessionManager`].

pub mod machine;
pub mod refresh;
pub mod session;
pub mod stepper;
pub mod stream_event;
pub mod streaming;
pub mod stuck;
pub mod template;
pub mod tool_calling;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use machine::{Agent, RunOutcome, RunReport};
pub use refresh::RefreshingStepper;
pub use session::{SessionManager, SessionStatus};
pub use stepper::{AgentContext, Stepper, Thought, ToolOutcome};
pub use stream_event::StreamEvent;
pub use streaming::{
    ChannelSink, EventSink, SinkError, StreamHandle, StreamOutcome, StreamingAdapter,
};
pub use stuck::is_stuck;
pub use template::AgentTemplate;
pub use tool_calling::ToolCallingStepper;
