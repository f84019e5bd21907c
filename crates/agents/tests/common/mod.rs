//! In-memory fakes of the port traits and a tempdir-backed harness.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agents::AgentContext;
use async_trait::async_trait;
use local::{FsHandoverArchive, FsWorkspace};
use pipeline::{
    CmsClient, CmsError, CommandError, CommandOutput, CommandRunner, CommandSpec, Completion,
    CompletionRequest, DocumentId, EnvConfig, LlmError, LlmProvider, Settings, CMS_ENV,
};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// CMS
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeCms {
    pub documents: Mutex<BTreeMap<String, Value>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeCms {
    pub fn with_documents(documents: Vec<Value>) -> Self {
        let cms = Self::default();
        {
            let mut stored = cms.documents.lock().unwrap();
            for doc in documents {
                stored.insert(doc["_id"].as_str().unwrap().to_string(), doc);
            }
        }
        cms
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn document(&self, id: &str) -> Option<Value> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl CmsClient for FakeCms {
    async fn fetch(&self, query: &str, params: Value) -> Result<Value, CmsError> {
        self.log(format!("fetch {query}"));
        let docs = self.documents.lock().unwrap();
        if query.starts_with("count(") {
            return Ok(json!(docs.len()));
        }
        if let Some(id) = params.get("id").and_then(Value::as_str) {
            return Ok(docs.get(id).cloned().unwrap_or(Value::Null));
        }
        if query.contains(r#"_type == "page""#) {
            let pages: Vec<Value> = docs
                .values()
                .filter(|d| d["_type"] == "page")
                .map(|d| json!({ "title": d["title"], "slug": d["slug"]["current"] }))
                .collect();
            return Ok(Value::Array(pages));
        }
        Ok(Value::Array(docs.values().cloned().collect()))
    }

    async fn create(&self, document: Value) -> Result<Value, CmsError> {
        let id = document["_id"].as_str().ok_or(CmsError::InvalidDocument)?.to_string();
        self.log(format!("create {id}"));
        self.documents.lock().unwrap().insert(id, document.clone());
        Ok(document)
    }

    async fn create_or_replace(&self, document: Value) -> Result<Value, CmsError> {
        let id = document["_id"].as_str().ok_or(CmsError::InvalidDocument)?.to_string();
        self.log(format!("createOrReplace {id}"));
        self.documents.lock().unwrap().insert(id, document.clone());
        Ok(document)
    }

    async fn patch(&self, id: &DocumentId, fields: Map<String, Value>) -> Result<Value, CmsError> {
        self.log(format!("patch {id}"));
        let mut docs = self.documents.lock().unwrap();
        let doc = docs.get_mut(id.as_str()).ok_or(CmsError::Status {
            status: 404,
            message: format!("{id} not found"),
        })?;
        if let Some(object) = doc.as_object_mut() {
            object.extend(fields);
        }
        Ok(doc.clone())
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), CmsError> {
        self.log(format!("delete {id}"));
        self.documents.lock().unwrap().remove(id.as_str());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Command runner
// ---------------------------------------------------------------------------

/// Answers commands from a script keyed by command line; unscripted commands
/// succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    pub script: Mutex<HashMap<String, Result<CommandOutput, String>>>,
    pub runs: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn respond(&self, command: &str, status: i32, stdout: &str, stderr: &str) {
        self.script.lock().unwrap().insert(
            command.to_string(),
            Ok(CommandOutput {
                status: Some(status),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        );
    }

    pub fn fail_to_spawn(&self, command: &str) {
        self.script
            .lock()
            .unwrap()
            .insert(command.to_string(), Err("not found".to_string()));
    }

    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, command: &CommandSpec, _cwd: &Path) -> Result<CommandOutput, CommandError> {
        let line = command.to_string();
        self.runs.lock().unwrap().push(line.clone());
        match self.script.lock().unwrap().get(&line).cloned() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(CommandError::Spawn {
                program: command.program.clone(),
                message,
            }),
            None => Ok(CommandOutput {
                status: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

pub struct FakeLlm {
    pub answer: Result<String, String>,
    pub calls: AtomicUsize,
}

impl FakeLlm {
    pub fn answering(text: &str) -> Self {
        Self {
            answer: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: &str) -> Self {
        Self {
            answer: Err(status.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    fn name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Ok(text) => Ok(Completion {
                model: "fake-model".to_string(),
                text: text.clone(),
            }),
            Err(message) => Err(LlmError::Status {
                status: 500,
                message: message.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn cms_env() -> EnvConfig {
    CMS_ENV
        .iter()
        .fold(EnvConfig::default(), |env, var| env.with(*var, "test-value"))
}

pub struct Harness {
    pub tmp: TempDir,
    pub runner: Arc<FakeRunner>,
    pub cms: Arc<FakeCms>,
}

impl Harness {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("site")).unwrap();
        Self {
            tmp,
            runner: Arc::new(FakeRunner::default()),
            cms: Arc::new(FakeCms::default()),
        }
    }

    pub fn with_cms(mut self, cms: FakeCms) -> Self {
        self.cms = Arc::new(cms);
        self
    }

    pub fn site(&self) -> std::path::PathBuf {
        self.tmp.path().join("site")
    }

    pub fn out(&self) -> std::path::PathBuf {
        self.tmp.path().join("out")
    }

    pub fn write(&self, file: &str, content: &str) {
        let path = self.site().join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn exists(&self, file: &str) -> bool {
        self.site().join(file).exists()
    }

    pub fn read(&self, file: &str) -> String {
        std::fs::read_to_string(self.site().join(file)).unwrap()
    }

    /// Context without CMS or LLM; the archive writes under `out/`.
    pub fn context(&self) -> AgentContext {
        let mut settings = Settings::default();
        settings.out_dir = self.out();
        settings.site_root = self.site();
        settings.inter_step_delay_ms = 0;
        AgentContext::new(Arc::new(FsWorkspace::new(self.site())), self.runner.clone())
            .with_archive(Arc::new(FsHandoverArchive::new(self.out())))
            .with_settings(settings)
    }

    /// Context with the fake CMS and a complete CMS environment.
    pub fn cms_context(&self) -> AgentContext {
        self.context()
            .with_cms(Some(self.cms.clone() as Arc<dyn CmsClient>))
            .with_env(cms_env())
    }
}
