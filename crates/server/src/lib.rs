//! sitegen HTTP surface.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /api/auto-generate` | Runs [`agents::Orchestrator::auto_generate`], streaming progress as NDJSON |
//! | `GET /api/init-site` | Reports whether the CMS dataset is empty |
//! | `POST /api/init-site` | Runs the init agent |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Handlers translate HTTP to orchestrator calls and back;
//! they make no pipeline decisions.

mod error;
mod progress;
mod routes;

pub use error::ServerError;
pub use progress::{ndjson_line, ChannelProgress};
pub use routes::{router, AppState, InitSiteRequest};

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

/// Binds `addr` and serves until the process stops.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "sitegen server listening");
    axum::serve(listener, router(state)).await
}
