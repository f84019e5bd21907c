//! sitegen CLI entry point.
//!
//! This binary is the composition root for the whole workspace:
//!
//! 1. **Load configuration**: `.env` (dotenvy), then an optional
//!    `sitegen.toml` ([`Settings`]), then command-line overrides.
//! 2. **Wire observability**: see [`telemetry`].
//! 3. **Construct infrastructure**: filesystem adapters from `local`, the
//!    Anthropic provider when `ANTHROPIC_API_KEY` is set, the Sanity client
//!    when the CMS variables are set, all injected into an [`Orchestrator`].
//! 4. **Dispatch the subcommand.**
//!
//! Exit status is 0 on success, 1 when a stage fails and 2 when the
//! configuration or environment is unusable.

mod telemetry;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use agents::{
    AgentContext, AgentInput, AgentOutcome, AgentRegistry, AutoGenerateRequest, ChainOptions,
    Orchestrator, RunReport,
};
use clap::{Parser, Subcommand};
use cms::SanityClient;
use llm::AnthropicProvider;
use local::{
    FileEventLog, FsHandoverArchive, FsManifestRepository, FsPatternStore, FsWorkspace,
    SystemCommandRunner,
};
use pipeline::{
    CmsClient, EnvConfig, EventBus, Handover, LlmProvider, LogProgress, Manifests, Settings,
    SitegenError,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

const DEFAULT_CONFIG_FILE: &str = "sitegen.toml";

#[derive(Parser, Debug)]
#[command(name = "sitegen", version, about = "Handover-driven site scaffolding pipeline")]
struct Cli {
    /// Settings file. Defaults to ./sitegen.toml when it exists.
    #[arg(long, global = true, env = "SITEGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for handover snapshots, manifests and the event log.
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,

    /// Root of the site project.
    #[arg(long, global = true)]
    site_root: Option<PathBuf>,

    /// Write files and CMS documents instead of planning them.
    #[arg(long, global = true, conflicts_with = "dry_run")]
    apply: bool,

    /// Plan only; overrides `dry_run = false` in the settings file.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full analyst → cleanup chain for a prompt
    Run {
        prompt: String,
        /// JSON object passed to every stage as its config
        #[arg(long, value_parser = parse_json)]
        stage_config: Option<Value>,
    },
    /// Run a single agent
    Agent {
        /// Registered agent name, e.g. `builderAgent`
        name: String,
        #[arg(long)]
        prompt: Option<String>,
        /// JSON object passed to the agent as its config
        #[arg(long, value_parser = parse_json)]
        stage_config: Option<Value>,
        /// Incoming handover snapshot (`out/<contextId>/<agent>-handover.json`)
        #[arg(long)]
        handover: Option<PathBuf>,
    },
    /// Build blocks and carry them through page generation and checks
    AutoGenerate {
        #[arg(default_value = "")]
        prompt: String,
        /// Block to build; repeatable. Detected from the prompt when absent.
        #[arg(long = "block")]
        blocks: Vec<String>,
        /// Page slug to compose; repeatable.
        #[arg(long = "page")]
        pages: Vec<String>,
        /// Also run the publisher stage.
        #[arg(long)]
        publish: bool,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "SITEGEN_ADDR", default_value = "127.0.0.1:3000")]
        addr: SocketAddr,
    },
    /// Delete run manifests older than the configured age
    CleanupManifests {
        /// Overrides `manifest_max_age_days`.
        #[arg(long)]
        days: Option<u32>,
    },
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let telemetry = match telemetry::init() {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("error: failed to initialise logging: {e:#}");
            return ExitCode::from(2);
        }
    };

    let code = match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "sitegen failed");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_status(&e))
        }
    };
    telemetry.shutdown();
    code
}

fn exit_status(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<SitegenError>() {
        Some(SitegenError::PipelineHalt { .. }) | None => 1,
        Some(_) => 2,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings(&cli)?;
    let dry_run = settings.dry_run;
    let orchestrator = build_orchestrator(settings, EnvConfig::from_env());

    match cli.command {
        Command::Run {
            prompt,
            stage_config,
        } => {
            let options = ChainOptions {
                dry_run,
                config: stage_config.unwrap_or(Value::Null),
            };
            let report = orchestrator.run_chain(&prompt, options).await?;
            finish_run(report)
        }
        Command::Agent {
            name,
            prompt,
            stage_config,
            handover,
        } => {
            let handover = handover.as_deref().map(read_handover).transpose()?;
            let mut input = AgentInput::new()
                .with_config(stage_config.unwrap_or(Value::Null))
                .with_handover(handover)
                .with_dry_run(dry_run);
            if let Some(prompt) = prompt {
                input = input.with_prompt(prompt);
            }
            let outcome = orchestrator.run_agent(&name, input).await?;
            finish_agent(outcome)
        }
        Command::AutoGenerate {
            prompt,
            blocks,
            pages,
            publish,
        } => {
            let request = AutoGenerateRequest {
                prompt,
                blocks,
                pages,
                dry_run,
                publish,
            };
            let report = orchestrator.auto_generate(request, &LogProgress).await?;
            finish_run(report)
        }
        Command::Serve { addr } => {
            let state = server::AppState::new(Arc::new(orchestrator));
            server::serve(addr, state).await?;
            Ok(())
        }
        Command::CleanupManifests { days } => {
            let ctx = orchestrator.context();
            let days = days.unwrap_or(ctx.settings.manifest_max_age_days);
            let removed = ctx.manifests.cleanup_old_manifests(days).await?;
            info!(removed, days, "Old manifests removed");
            print_json(&serde_json::json!({ "removed": removed, "days": days }))
        }
    }
}

/// File settings, then flag overrides.
fn load_settings(cli: &Cli) -> Result<Settings, SitegenError> {
    let mut settings = match &cli.config {
        Some(path) => read_settings(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            read_settings(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => Settings::default(),
    };
    if let Some(out_dir) = &cli.out_dir {
        settings.out_dir = out_dir.clone();
    }
    if let Some(site_root) = &cli.site_root {
        settings.site_root = site_root.clone();
    }
    if cli.apply {
        settings.dry_run = false;
    } else if cli.dry_run {
        settings.dry_run = true;
    }
    Ok(settings)
}

fn read_settings(path: &Path) -> Result<Settings, SitegenError> {
    let text = std::fs::read_to_string(path).map_err(|e| SitegenError::Configuration {
        message: format!("cannot read {}: {e}", path.display()),
    })?;
    Settings::from_toml_str(&text)
}

fn read_handover(path: &Path) -> Result<Handover, SitegenError> {
    let configuration = |message: String| SitegenError::Configuration { message };
    let text = std::fs::read_to_string(path)
        .map_err(|e| configuration(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| configuration(format!("invalid handover {}: {e}", path.display())))
}

fn build_orchestrator(settings: Settings, env: EnvConfig) -> Orchestrator {
    let out_dir = settings.out_dir.clone();

    let llm = AnthropicProvider::from_env(&env).map(|provider| {
        info!(model = provider.model(), "LLM provider configured");
        Arc::new(provider) as Arc<dyn LlmProvider>
    });
    if llm.is_none() {
        info!("ANTHROPIC_API_KEY not set; builders use template fallbacks");
    }

    let cms = match env.cms_connection() {
        Ok(connection) => Some(Arc::new(SanityClient::new(&connection)) as Arc<dyn CmsClient>),
        Err(e) => {
            info!(reason = %e, "CMS client not configured");
            None
        }
    };

    let event_log = Arc::new(FileEventLog::in_dir(&out_dir));
    let ctx = AgentContext::new(
        Arc::new(FsWorkspace::new(settings.site_root.clone())),
        Arc::new(SystemCommandRunner),
    )
    .with_bus(Arc::new(EventBus::new(
        settings.event_history_capacity,
        event_log,
    )))
    .with_manifests(Arc::new(Manifests::new(Arc::new(
        FsManifestRepository::new(out_dir.clone()),
    ))))
    .with_archive(Arc::new(FsHandoverArchive::new(out_dir.clone())))
    .with_patterns(Arc::new(FsPatternStore::in_dir(&out_dir)))
    .with_llm(llm)
    .with_cms(cms)
    .with_env(env)
    .with_settings(settings);

    Orchestrator::new(Arc::new(ctx), AgentRegistry::standard())
}

fn finish_run(report: RunReport) -> anyhow::Result<()> {
    print_json(&report)?;
    match report.into_error() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn finish_agent(outcome: AgentOutcome) -> anyhow::Result<()> {
    print_json(&outcome)?;
    if outcome.ok {
        return Ok(());
    }
    if !outcome.missing.is_empty() {
        return Err(SitegenError::MissingEnvironment {
            missing: outcome.missing,
        }
        .into());
    }
    Err(SitegenError::PipelineHalt {
        agent: outcome.agent.to_string(),
        reason: outcome.failure_reason(),
    }
    .into())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
