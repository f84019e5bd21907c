//! Services and input shared by every stage run.

use std::sync::Arc;

use pipeline::{
    CmsClient, CommandRunner, EnvConfig, EventBus, Handover, HandoverArchive,
    InMemoryHandoverArchive, InMemoryManifestRepository, InMemoryPatternStore, LlmProvider,
    Manifests, PatternStore, Settings, Workspace,
};
use serde_json::Value;

use crate::AgentFailure;

/// Everything a stage may call out to.
///
/// Built once by the composition root and shared by `Arc`. The LLM and CMS
/// clients are optional: the LLM is absent without an API key (stages fall
/// back), the CMS is absent without connection settings (stages that need it
/// fail their environment check first).
pub struct AgentContext {
    pub bus: Arc<EventBus>,
    pub manifests: Arc<Manifests>,
    pub archive: Arc<dyn HandoverArchive>,
    pub workspace: Arc<dyn Workspace>,
    pub runner: Arc<dyn CommandRunner>,
    pub patterns: Arc<dyn PatternStore>,
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub cms: Option<Arc<dyn CmsClient>>,
    pub env: EnvConfig,
    pub settings: Settings,
}

impl AgentContext {
    /// A context over `workspace` and `runner` with in-memory bookkeeping,
    /// no LLM, no CMS, an empty environment and default settings.
    pub fn new(workspace: Arc<dyn Workspace>, runner: Arc<dyn CommandRunner>) -> Self {
        let settings = Settings::default();
        Self {
            bus: Arc::new(EventBus::in_memory()),
            manifests: Arc::new(Manifests::new(Arc::new(InMemoryManifestRepository::new()))),
            archive: Arc::new(InMemoryHandoverArchive::new()),
            workspace,
            runner,
            patterns: Arc::new(InMemoryPatternStore::new()),
            llm: None,
            cms: None,
            env: EnvConfig::default(),
            settings,
        }
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_manifests(mut self, manifests: Arc<Manifests>) -> Self {
        self.manifests = manifests;
        self
    }

    pub fn with_archive(mut self, archive: Arc<dyn HandoverArchive>) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_patterns(mut self, patterns: Arc<dyn PatternStore>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_llm(mut self, llm: Option<Arc<dyn LlmProvider>>) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_cms(mut self, cms: Option<Arc<dyn CmsClient>>) -> Self {
        self.cms = cms;
        self
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.env = env;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// The CMS client, for stages that passed their environment check.
    pub fn cms(&self) -> Result<&Arc<dyn CmsClient>, AgentFailure> {
        self.cms.as_ref().ok_or(AgentFailure::CmsUnavailable)
    }

    /// Whether CMS calls can be made at all (client present, env complete).
    pub fn cms_configured(&self) -> bool {
        self.cms.is_some() && self.env.cms_connection().is_ok()
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("workspace", &self.workspace.root())
            .field("llm", &self.llm.as_ref().map(|l| l.name().to_string()))
            .field("cms", &self.cms.is_some())
            .finish_non_exhaustive()
    }
}

/// One invocation's input.
#[derive(Debug, Clone)]
pub struct AgentInput {
    pub prompt: Option<String>,
    /// Stage-specific options (`block`, `pages`, `commands`, `autoFix`, ...).
    pub config: Value,
    pub handover: Option<Handover>,
    pub dry_run: bool,
}

impl Default for AgentInput {
    fn default() -> Self {
        Self {
            prompt: None,
            config: Value::Null,
            handover: None,
            dry_run: true,
        }
    }
}

impl AgentInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_handover(mut self, handover: Option<Handover>) -> Self {
        self.handover = handover;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Non-blank prompt text.
    pub fn prompt_text(&self) -> Option<&str> {
        self.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn config_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(Value::as_bool)
    }

    /// A list of strings; a single string is treated as a one-element list.
    pub fn config_strings(&self, key: &str) -> Vec<String> {
        match self.config.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(item)) if !item.trim().is_empty() => vec![item.clone()],
            _ => Vec::new(),
        }
    }
}
