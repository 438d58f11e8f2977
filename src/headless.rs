//! Headless mode - NDJSON event output
//!
//! Every [`AppEvent`] and every host-level record is written to stdout as
//! one JSON object per line, with an `event` tag and a millisecond
//! `timestamp`.
//!
//! # Example Output
//!
//! ```json
//! {"app":"bridge","message":"Downloading https://example.com/bridge.zip","event":"download_started","url":"https://example.com/bridge.zip","timestamp":1704700001000}
//! {"app":"bridge","message":"Started (pid 4242)","event":"started","pid":4242,"timestamp":1704700002000}
//! ```

use chrono::Utc;
use serde::Serialize;
use std::io::{self, Write};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use sidecar_core::{AppEvent, AppPhase};

/// Host-level records that are not tied to one app's event channel
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// One catalog entry (from `list`)
    App {
        app: String,
        display_name: String,
        kind: &'static str,
        phase: AppPhase,
        installed: bool,
        configurable: bool,
    },

    /// Composed command-line string (from `args`)
    Arguments { app: String, arguments: String },

    /// Outcome of a command that produced no app event
    Outcome { app: String, outcome: String },

    /// Error occurred
    Error { message: String, fatal: bool },
}

#[derive(Serialize)]
struct Line<'a, T: Serialize> {
    #[serde(flatten)]
    record: &'a T,
    timestamp: i64,
}

/// Serialize a record as one NDJSON line (without the trailing newline)
pub fn to_line<T: Serialize>(record: &T) -> serde_json::Result<String> {
    serde_json::to_string(&Line {
        record,
        timestamp: Utc::now().timestamp_millis(),
    })
}

/// Write a record to stdout as one NDJSON line
pub fn emit<T: Serialize>(record: &T) {
    let json = match to_line(record) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize headless event: {}", e);
            return;
        }
    };

    let mut stdout = io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", json) {
        error!("Failed to write headless event to stdout: {}", e);
        return;
    }
    if let Err(e) = stdout.flush() {
        error!("Failed to flush headless stdout: {}", e);
    }
}

/// Print every event from an app's channel until all senders are gone
pub fn spawn_printer(mut rx: mpsc::Receiver<AppEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            emit(&event);
        }
    })
}
