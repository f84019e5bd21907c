use pipeline::{ProgressEvent, ProgressReporter};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Forwards progress events into a channel drained by the response stream.
pub struct ChannelProgress {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressReporter for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            debug!("Progress receiver dropped; client disconnected");
        }
    }
}

/// One newline-terminated JSON line.
pub fn ndjson_line(event: &ProgressEvent) -> String {
    let mut line = serde_json::to_string(event).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "error": e.to_string() }).to_string()
    });
    line.push('\n');
    line
}
