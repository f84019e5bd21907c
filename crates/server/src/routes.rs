use std::convert::Infallible;
use std::sync::Arc;

use agents::stages::site_status;
use agents::{names, AgentInput, AutoGenerateRequest, Orchestrator};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use pipeline::{ProgressEvent, CMS_ENV};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, instrument};

use crate::{ndjson_line, ChannelProgress, ServerError};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auto-generate", post(auto_generate))
        .route("/api/init-site", get(init_status).post(init_site))
        .with_state(state)
}

#[instrument(skip_all)]
async fn auto_generate(
    State(state): State<AppState>,
    Json(request): Json<AutoGenerateRequest>,
) -> Result<Response, ServerError> {
    if request.prompt.trim().is_empty() && request.blocks.is_empty() {
        return Err(ServerError::BadRequest(
            "Either a prompt or a list of blocks is required".to_string(),
        ));
    }

    info!(
        blocks = request.blocks.len(),
        publish = request.publish,
        dry_run = request.dry_run,
        "Auto-generate requested"
    );
    let (tx, rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let reporter = ChannelProgress::new(tx);
        if let Err(e) = orchestrator.auto_generate(request, &reporter).await {
            info!(error = %e, "Auto-generate stopped before running");
        }
    });

    let lines = UnboundedReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(ndjson_line(&event)));
    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}

async fn init_status(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    let ctx = state.orchestrator.context();
    let missing = ctx.env.missing(&CMS_ENV);
    if !missing.is_empty() {
        return Err(ServerError::Unavailable(format!(
            "Missing environment variables: {}",
            missing.join(", ")
        )));
    }
    let cms = ctx
        .cms
        .as_ref()
        .ok_or_else(|| ServerError::Unavailable("CMS client is not configured".to_string()))?;
    let status = site_status(cms.as_ref()).await?;
    Ok(Json(json!(status)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitSiteRequest {
    pub dry_run: Option<bool>,
    pub site_name: Option<String>,
}

#[instrument(skip_all)]
async fn init_site(
    State(state): State<AppState>,
    body: Option<Json<InitSiteRequest>>,
) -> Result<Response, ServerError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let dry_run = request
        .dry_run
        .unwrap_or(state.orchestrator.context().settings.dry_run);
    let config = match &request.site_name {
        Some(name) => json!({ "siteName": name }),
        None => Value::Null,
    };

    let outcome = state
        .orchestrator
        .run_agent(
            names::INIT,
            AgentInput::new().with_config(config).with_dry_run(dry_run),
        )
        .await?;

    let status = if outcome.ok {
        StatusCode::OK
    } else if outcome.stage.as_deref() == Some("env") {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(outcome)).into_response())
}
