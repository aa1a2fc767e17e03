//! Agent templates: one configured persona, many isolated agents.
//!
//! A template is immutable; [`AgentTemplate::instantiate`] hands out a
//! fresh [`Agent`] with its own conversation and counters, so concurrent
//! conversations never share mutable state.

use std::sync::Arc;
use stepwise_config::{AgentSettings, AppConfig};
use stepwise_core::event::EventBus;
use stepwise_core::message::{Conversation, ConversationId};
use stepwise_core::provider::Provider;
use stepwise_core::tool::{CompositeToolSet, ToolSet};
use tracing::debug;

use crate::machine::Agent;
use crate::refresh::RefreshingStepper;
use crate::stepper::Stepper;
use crate::tool_calling::ToolCallingStepper;

#[derive(Clone)]
pub struct AgentTemplate {
    settings: AgentSettings,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    local_tools: Arc<dyn ToolSet>,
    remote_tools: Option<Arc<dyn ToolSet>>,
    event_bus: Option<Arc<EventBus>>,
}

impl AgentTemplate {
    pub fn new(
        settings: AgentSettings,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        local_tools: Arc<dyn ToolSet>,
    ) -> Self {
        Self {
            settings,
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            local_tools,
            remote_tools: None,
            event_bus: None,
        }
    }

    /// Build from application config: agent settings plus the provider's
    /// model parameters.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        local_tools: Arc<dyn ToolSet>,
    ) -> Self {
        let mut template = Self::new(
            config.agent.clone(),
            provider,
            config.provider.model.clone(),
            local_tools,
        );
        template.temperature = config.provider.temperature;
        template.max_tokens = config.provider.max_tokens;
        template
    }

    /// Attach a dynamic tool source. Agents built afterwards offer it next to
    /// the local tools and reconcile it every `tool_refresh_interval` steps.
    pub fn with_remote_tools(mut self, source: Arc<dyn ToolSet>) -> Self {
        self.remote_tools = Some(source);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn has_remote_tools(&self) -> bool {
        self.remote_tools.is_some()
    }

    /// A fresh agent with an empty conversation.
    pub fn instantiate(&self) -> Agent {
        self.build(Conversation::new())
    }

    /// A fresh agent bound to the given conversation id.
    pub fn instantiate_for(&self, conversation_id: &str) -> Agent {
        self.build(Conversation::with_id(ConversationId::from(conversation_id)))
    }

    fn build(&self, conversation: Conversation) -> Agent {
        let stepper: Box<dyn Stepper> = match &self.remote_tools {
            Some(remote) => {
                let tools: Arc<dyn ToolSet> =
                    Arc::new(CompositeToolSet::new(self.local_tools.clone(), remote.clone()));
                Box::new(RefreshingStepper::new(
                    self.tool_calling(tools),
                    remote.clone(),
                    self.settings.tool_refresh_interval,
                ))
            }
            None => Box::new(self.tool_calling(self.local_tools.clone())),
        };
        debug!(
            agent = %self.settings.name,
            conversation_id = %conversation.id,
            refreshing = self.remote_tools.is_some(),
            "Instantiating agent"
        );

        let mut agent = Agent::new(self.settings.name.clone(), stepper)
            .with_description(self.settings.description.clone())
            .with_system_prompt(self.settings.system_prompt.clone())
            .with_next_step_prompt(self.settings.next_step_prompt.clone())
            .with_stuck_prompt(self.settings.stuck_prompt.clone())
            .with_max_steps(self.settings.max_steps)
            .with_duplicate_threshold(self.settings.duplicate_threshold)
            .with_conversation(conversation);
        if let Some(bus) = &self.event_bus {
            agent = agent.with_event_bus(bus.clone());
        }
        agent
    }

    fn tool_calling(&self, tools: Arc<dyn ToolSet>) -> ToolCallingStepper {
        ToolCallingStepper::new(self.provider.clone(), tools, self.model.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }
}
