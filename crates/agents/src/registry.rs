//! Name → agent lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use pipeline::SitegenError;

use crate::stages::{
    AnalystAgent, BuilderAgent, CleanupAgent, CompatAgent, DiagnosticAgent, InitAgent,
    PageGeneratorAgent, PublisherAgent, ReviewerAgent, StyleAgent, TesterAgent,
};
use crate::Agent;

/// Agents keyed by routing name.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in stage.
    pub fn standard() -> Self {
        let agents: [Arc<dyn Agent>; 11] = [
            Arc::new(AnalystAgent),
            Arc::new(BuilderAgent),
            Arc::new(ReviewerAgent),
            Arc::new(StyleAgent),
            Arc::new(TesterAgent),
            Arc::new(PublisherAgent),
            Arc::new(CleanupAgent),
            Arc::new(DiagnosticAgent),
            Arc::new(InitAgent),
            Arc::new(PageGeneratorAgent),
            Arc::new(CompatAgent),
        ];
        agents
            .into_iter()
            .fold(Self::new(), |registry, agent| registry.with(agent))
    }

    /// Registers `agent`, replacing any agent with the same name.
    pub fn with(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.insert(agent.name().to_string(), agent);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Agent>, SitegenError> {
        self.agents
            .get(name)
            .cloned()
            .ok_or_else(|| SitegenError::UnknownAgent(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}
