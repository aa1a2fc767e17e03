//! Tool-set refresh decorator.
//!
//! Wraps any [`Stepper`] and, every `interval` thinks, re-enumerates a
//! dynamic tool source. Additions and removals since the last enumeration
//! are announced to the model as system messages.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use stepwise_core::message::{Message, MessageToolCall};
use stepwise_core::tool::ToolSet;
use tracing::{debug, info, warn};

use crate::stepper::{AgentContext, Stepper, Thought, ToolOutcome};

pub struct RefreshingStepper<S> {
    inner: S,
    source: Arc<dyn ToolSet>,
    interval: usize,
    /// Thinks seen so far, independent of the agent's step counter.
    counter: usize,
    /// Last enumerated tool names; `None` until the baseline is recorded.
    known: Option<BTreeSet<String>>,
}

impl<S: Stepper> RefreshingStepper<S> {
    /// Wrap `inner`, checking `source` every `interval` thinks (clamped to 1).
    pub fn new(inner: S, source: Arc<dyn ToolSet>, interval: usize) -> Self {
        Self {
            inner,
            source,
            interval: interval.max(1),
            counter: 0,
            known: None,
        }
    }

    /// The tool names recorded by the last successful enumeration.
    pub fn known_tools(&self) -> Option<&BTreeSet<String>> {
        self.known.as_ref()
    }

    /// Compare the source's current tools with the known set and append a
    /// notice for each non-empty delta. Returns the notices appended.
    pub async fn reconcile(&mut self, ctx: &mut AgentContext) -> Vec<String> {
        let current: BTreeSet<String> = match self.source.list_available().await {
            Ok(defs) => defs.into_iter().map(|d| d.name).collect(),
            Err(e) => {
                warn!(error = %e, "Tool source enumeration failed, keeping known tools");
                return Vec::new();
            }
        };

        let Some(known) = self.known.replace(current.clone()) else {
            debug!(count = current.len(), "Recorded baseline tool set");
            return Vec::new();
        };

        let added: Vec<&str> = current.difference(&known).map(String::as_str).collect();
        let removed: Vec<&str> = known.difference(&current).map(String::as_str).collect();

        let mut notices = Vec::new();
        if !added.is_empty() {
            notices.push(format!("New tools are now available: {}", added.join(", ")));
        }
        if !removed.is_empty() {
            notices.push(format!(
                "The following tools are no longer available: {}",
                removed.join(", ")
            ));
        }

        for notice in &notices {
            info!(notice = %notice, "Tool set changed");
            ctx.push(Message::system(notice.clone()));
        }
        notices
    }
}

#[async_trait]
impl<S: Stepper> Stepper for RefreshingStepper<S> {
    async fn think(&mut self, ctx: &mut AgentContext) -> stepwise_core::Result<Thought> {
        self.counter += 1;
        if self.counter % self.interval == 0 {
            self.reconcile(ctx).await;
        }
        self.inner.think(ctx).await
    }

    fn next_call(&self) -> Option<&MessageToolCall> {
        self.inner.next_call()
    }

    async fn act_next(&mut self, ctx: &mut AgentContext) -> Option<ToolOutcome> {
        self.inner.act_next(ctx).await
    }

    fn cleanup(&mut self, ctx: &mut AgentContext) {
        self.inner.cleanup(ctx);
    }
}
