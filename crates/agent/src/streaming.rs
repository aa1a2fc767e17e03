//! Streaming adapter: drives one agent run on its own task and pushes
//! every observable sub-step to an output sink.
//!
//! ```text
//! start()  ── begin run, register session, send stream-info ──┐
//!                                                             │ tokio::spawn
//!   loop: think → [thought] → per call: tool-start, tool-args, act, tool-result
//!   end:  final-response | error → complete → sink.complete()
//!   cancel / timeout / dead sink: stop, no complete
//!   always: agent reset, session cleanup (exactly once)
//! ```
//!
//! Cancellation is cooperative: the session flag is checked before every
//! emission and before every step, so a cancelled run stops at the next
//! checkpoint rather than instantly.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stepwise_config::StreamingConfig;
use stepwise_core::agent::AgentState;
use stepwise_core::error::{AgentError, SessionError};
use stepwise_core::event::{DomainEvent, EventBus};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::machine::{Agent, MAX_STEPS_REACHED, NO_ACTION_NEEDED, RunOutcome};
use crate::session::{SessionManager, SessionStatus};
use crate::stream_event::StreamEvent;

/// Sent as the final response when the loop ends without a text reply.
pub const TASK_COMPLETE: &str = "Task processing complete.";
pub const STUCK_RESPONSE: &str = "Stopped early: the agent kept repeating the same response.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("Output channel closed")]
    Closed,
}

/// Push-based output for one stream.
///
/// A failed `send` is terminal for the session: it is never retried.
/// `complete`/`complete_with_error` consume the sink, so it can only be
/// closed once.
#[async_trait]
pub trait EventSink: Send + 'static {
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkError>;

    /// Close after a normal end of stream.
    fn complete(self)
    where
        Self: Sized,
    {
    }

    /// Close after a failed run.
    fn complete_with_error(self, _cause: &str)
    where
        Self: Sized,
    {
    }
}

/// An [`EventSink`] over a bounded tokio channel.
///
/// The receiver sees the end of the stream (`None`) once the sink is
/// completed or dropped.
pub struct ChannelSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    /// A sink plus the receiver to read it from.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkError> {
        self.tx.send(event).await.map_err(|_| SinkError::Closed)
    }

    fn complete_with_error(self, cause: &str) {
        debug!(cause, "Closing stream after failure");
    }
}

/// How a streaming run ended, as seen by whoever awaits its handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// `final-response` was emitted.
    Finished(RunOutcome),
    /// `error` was emitted.
    Failed(String),
    /// Stopped by a cancel request or a dead sink.
    Cancelled,
    /// Stopped by the wall-clock ceiling.
    TimedOut,
}

/// Handle to a spawned streaming run.
#[derive(Debug)]
pub struct StreamHandle {
    pub session_id: String,
    pub conversation_id: String,
    join: JoinHandle<StreamOutcome>,
}

impl StreamHandle {
    /// Wait for the run task to finish.
    pub async fn wait(self) -> StreamOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(session_id = %self.session_id, error = %e, "Streaming task aborted");
                StreamOutcome::Failed(e.to_string())
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Runs agents asynchronously against an output sink, under the control of
/// a shared [`SessionManager`].
pub struct StreamingAdapter {
    sessions: Arc<SessionManager>,
    timeout: Duration,
    event_delay: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl StreamingAdapter {
    /// Five-minute ceiling, no pacing delay.
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            timeout: Duration::from_secs(300),
            event_delay: Duration::ZERO,
            event_bus: None,
        }
    }

    pub fn from_config(config: &StreamingConfig, sessions: Arc<SessionManager>) -> Self {
        Self::new(sessions)
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_event_delay(Duration::from_millis(config.event_delay_ms))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pause before each emission after `stream-info`.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Start a streaming run.
    ///
    /// Usage errors (agent not idle, blank input) and a sink that is already
    /// closed are reported here, before any task is spawned. Otherwise
    /// `stream-info` has been delivered when this returns.
    pub async fn start<S: EventSink>(
        &self,
        mut agent: Agent,
        input: &str,
        mut sink: S,
    ) -> stepwise_core::Result<StreamHandle> {
        agent.begin(input)?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let conversation_id = agent.conversation().id.to_string();
        if let Err(e) = self.sessions.create(&session_id, &conversation_id, input) {
            agent.end_run(&RunOutcome::Failed(e.to_string()));
            return Err(e.into());
        }

        let info = StreamEvent::StreamInfo {
            session_id: session_id.clone(),
            conversation_id: conversation_id.clone(),
            message: input.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        if let Err(e) = sink.send(info).await {
            warn!(session_id = %session_id, error = %e, "Output channel closed before stream start");
            self.sessions.cleanup(&session_id);
            agent.end_run(&RunOutcome::Cancelled);
            return Err(AgentError::SinkClosed.into());
        }

        info!(session_id = %session_id, agent = %agent.name(), "Streaming run started");
        let task = StreamTask {
            agent,
            sink,
            sessions: self.sessions.clone(),
            session_id: session_id.clone(),
            registration: Some(SessionGuard {
                sessions: self.sessions.clone(),
                session_id: session_id.clone(),
            }),
            event_delay: self.event_delay,
            event_bus: self.event_bus.clone(),
        };
        let join = tokio::spawn(task.run(self.timeout));

        Ok(StreamHandle {
            session_id,
            conversation_id,
            join,
        })
    }

    /// Request cancellation. Returns whether a live session was stopped.
    pub fn cancel(&self, session_id: &str) -> Result<bool, SessionError> {
        if session_id.trim().is_empty() {
            return Err(SessionError::InvalidId);
        }
        let stopped = self.sessions.cancel(session_id);
        if stopped {
            publish_cancelled(self.event_bus.as_deref(), session_id, "requested");
        }
        Ok(stopped)
    }

    /// Cancel every tracked session; returns how many there were.
    pub fn cancel_all(&self) -> usize {
        self.sessions.cancel_all()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.active_count()
    }

    pub fn status(&self, session_id: &str) -> Result<SessionStatus, SessionError> {
        self.sessions.status(session_id)
    }
}

fn publish_cancelled(bus: Option<&EventBus>, session_id: &str, reason: &str) {
    if let Some(bus) = bus {
        bus.publish(DomainEvent::SessionCancelled {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// The session's flag was found cleared or the sink failed.
struct Stopped;

enum Ending {
    Completed(RunOutcome),
    Failed(String),
    Cancelled,
    TimedOut,
}

enum Close {
    Complete,
    WithError(String),
    Drop,
}

/// Removes a session from the registry when dropped, including when the
/// run task unwinds from a panic.
struct SessionGuard {
    sessions: Arc<SessionManager>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(session_id = %self.session_id, "Streaming run panicked, releasing session");
        }
        self.sessions.cleanup(&self.session_id);
    }
}

struct StreamTask<S> {
    agent: Agent,
    sink: S,
    sessions: Arc<SessionManager>,
    session_id: String,
    registration: Option<SessionGuard>,
    event_delay: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl<S: EventSink> StreamTask<S> {
    async fn run(mut self, timeout: Duration) -> StreamOutcome {
        let ending = match tokio::time::timeout(timeout, self.drive()).await {
            Ok(Ok(ending)) => ending,
            Ok(Err(Stopped)) => Ending::Cancelled,
            Err(_) => {
                warn!(
                    session_id = %self.session_id,
                    timeout_secs = timeout.as_secs(),
                    "Streaming run timed out"
                );
                self.sessions.cancel(&self.session_id);
                publish_cancelled(self.event_bus.as_deref(), &self.session_id, "timeout");
                Ending::TimedOut
            }
        };

        let (run_outcome, stream_outcome, close) = match ending {
            Ending::Completed(outcome) => {
                let close = match self.emit(StreamEvent::Complete).await {
                    Ok(()) => Close::Complete,
                    Err(Stopped) => Close::Drop,
                };
                (outcome.clone(), StreamOutcome::Finished(outcome), close)
            }
            Ending::Failed(cause) => {
                let error = StreamEvent::Error {
                    message: cause.clone(),
                };
                let close = match self.emit(error).await {
                    Ok(()) => match self.emit(StreamEvent::Complete).await {
                        Ok(()) => Close::WithError(cause.clone()),
                        Err(Stopped) => Close::Drop,
                    },
                    Err(Stopped) => Close::Drop,
                };
                (
                    RunOutcome::Failed(cause.clone()),
                    StreamOutcome::Failed(cause),
                    close,
                )
            }
            Ending::Cancelled => {
                info!(session_id = %self.session_id, "Streaming run stopped by cancellation");
                (RunOutcome::Cancelled, StreamOutcome::Cancelled, Close::Drop)
            }
            Ending::TimedOut => (RunOutcome::Cancelled, StreamOutcome::TimedOut, Close::Drop),
        };

        self.agent.end_run(&run_outcome);
        // Unregister before the receiver can observe the end of the stream
        drop(self.registration.take());
        debug!(session_id = %self.session_id, outcome = ?stream_outcome, "Streaming run closed");

        match close {
            Close::Complete => self.sink.complete(),
            Close::WithError(cause) => self.sink.complete_with_error(&cause),
            Close::Drop => {}
        }
        stream_outcome
    }

    async fn drive(&mut self) -> Result<Ending, Stopped> {
        let mut reply = None;

        let outcome = loop {
            if self.agent.state() == AgentState::Finished {
                break RunOutcome::Terminated;
            }
            if !self.agent.can_step() {
                warn!(session_id = %self.session_id, "Reached maximum steps without finishing");
                break RunOutcome::MaxSteps;
            }
            if !self.sessions.should_continue(&self.session_id) {
                return Err(Stopped);
            }

            let step = self.agent.advance();
            let thought = match self.agent.think().await {
                Ok(thought) => thought,
                Err(e) => {
                    error!(session_id = %self.session_id, step, error = %e, "Agent step failed");
                    return Ok(Ending::Failed(e.to_string()));
                }
            };
            if thought.failure.is_some() {
                return Ok(Ending::Failed(thought.content));
            }

            if !thought.needs_action {
                self.agent.publish_step(step, NO_ACTION_NEEDED);
                if !thought.content.trim().is_empty() {
                    reply = Some(thought.content);
                }
                break RunOutcome::Replied;
            }

            if !thought.content.trim().is_empty() {
                self.emit(StreamEvent::Thought {
                    content: thought.content,
                })
                .await?;
            }

            let mut summaries = Vec::new();
            while let Some(call) = self.agent.next_call().cloned() {
                self.emit(StreamEvent::ToolStart {
                    id: call.id.clone(),
                    name: call.name.clone(),
                })
                .await?;
                self.emit(StreamEvent::ToolArgs {
                    id: call.id,
                    name: call.name,
                    arguments: call.arguments,
                })
                .await?;

                let Some(outcome) = self.agent.act_next().await else {
                    break;
                };
                summaries.push(outcome.summary());
                self.emit(StreamEvent::ToolResult {
                    id: outcome.call_id,
                    name: outcome.name,
                    output: outcome.output,
                    success: outcome.success,
                })
                .await?;
            }

            if self.agent.check_stuck() {
                break RunOutcome::Stuck;
            }
            self.agent.publish_step(step, &summaries.join("\n"));
        };

        let content = reply.unwrap_or_else(|| fallback_response(&outcome).to_string());
        self.emit(StreamEvent::FinalResponse { content }).await?;
        Ok(Ending::Completed(outcome))
    }

    /// Pace, re-check the session, then send.
    async fn emit(&mut self, event: StreamEvent) -> Result<(), Stopped> {
        if !self.event_delay.is_zero() {
            tokio::time::sleep(self.event_delay).await;
        }
        if !self.sessions.should_continue(&self.session_id) {
            debug!(session_id = %self.session_id, event = event.event_type(), "Session cancelled, dropping event");
            return Err(Stopped);
        }

        debug!(session_id = %self.session_id, event = event.event_type(), "Emitting stream event");
        if let Err(e) = self.sink.send(event).await {
            warn!(session_id = %self.session_id, error = %e, "Output channel failed, cancelling session");
            self.sessions.cancel(&self.session_id);
            publish_cancelled(self.event_bus.as_deref(), &self.session_id, "sink closed");
            return Err(Stopped);
        }
        Ok(())
    }
}

fn fallback_response(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::MaxSteps => MAX_STEPS_REACHED,
        RunOutcome::Stuck => STUCK_RESPONSE,
        _ => TASK_COMPLETE,
    }
}
