//! Domain event definitions

use std::path::PathBuf;

use serde::Serialize;

use crate::argument::Argument;
use crate::types::OutputStream;

// ─────────────────────────────────────────────────────────
// Process Events
// ─────────────────────────────────────────────────────────

/// Raw events from a supervised child process
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// Line from stdout
    Stdout(String),
    /// Line from stderr
    Stderr(String),
    /// Process exited (code is `None` when killed by a signal)
    Exited { code: Option<i32> },
}

impl ProcessEvent {
    /// Stream and line for output events
    pub fn output(&self) -> Option<(OutputStream, &str)> {
        match self {
            ProcessEvent::Stdout(line) => Some((OutputStream::Stdout, line)),
            ProcessEvent::Stderr(line) => Some((OutputStream::Stderr, line)),
            ProcessEvent::Exited { .. } => None,
        }
    }
}

// ─────────────────────────────────────────────────────────
// App Events
// ─────────────────────────────────────────────────────────

/// Notification about one app, consumed by observers (UI, loggers, CLI).
///
/// Per app, acquisition events are ordered
/// `started -> progress* -> finished | failed`.
#[derive(Debug, Clone, Serialize)]
pub struct AppEvent {
    /// Stable name of the originating app
    pub app: String,
    /// Human-readable summary
    pub message: String,
    #[serde(flatten)]
    pub kind: AppEventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AppEventKind {
    DownloadStarted { url: String },
    DownloadProgress { received: u64, total: Option<u64> },
    DownloadFinished { path: PathBuf },
    DownloadFailed { error: String },
    InstallStarted,
    InstallFinished,
    InstallFailed {
        code: Option<i32>,
        error: Option<String>,
    },
    /// Validation failed; the UI should bring the argument into focus
    ConfigurationRequired { argument: Box<Argument> },
    Started { pid: Option<u32> },
    Stopped { code: Option<i32> },
    /// Combined output log after an update
    Monitor { text: String },
}

impl AppEvent {
    fn new(app: &str, message: String, kind: AppEventKind) -> Self {
        Self {
            app: app.to_string(),
            message,
            kind,
        }
    }

    pub fn download_started(app: &str, url: &str) -> Self {
        Self::new(
            app,
            format!("Downloading {}", url),
            AppEventKind::DownloadStarted {
                url: url.to_string(),
            },
        )
    }

    pub fn download_progress(app: &str, received: u64, total: Option<u64>) -> Self {
        let message = match total {
            Some(total) if total > 0 => format!("Downloaded {}%", received * 100 / total),
            _ => format!("Downloaded {} bytes", received),
        };
        Self::new(app, message, AppEventKind::DownloadProgress { received, total })
    }

    pub fn download_finished(app: &str, path: PathBuf) -> Self {
        Self::new(
            app,
            "Download finished".to_string(),
            AppEventKind::DownloadFinished { path },
        )
    }

    pub fn download_failed(app: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(
            app,
            format!("Download failed: {}", error),
            AppEventKind::DownloadFailed { error },
        )
    }

    pub fn install_started(app: &str) -> Self {
        Self::new(app, "Installing".to_string(), AppEventKind::InstallStarted)
    }

    pub fn install_finished(app: &str) -> Self {
        Self::new(
            app,
            "Install finished".to_string(),
            AppEventKind::InstallFinished,
        )
    }

    pub fn install_failed(app: &str, code: Option<i32>, error: Option<String>) -> Self {
        let message = match (&error, code) {
            (Some(e), _) => format!("Install failed: {}", e),
            (None, Some(code)) => format!("Installer exited with code {}", code),
            (None, None) => "Installer terminated".to_string(),
        };
        Self::new(app, message, AppEventKind::InstallFailed { code, error })
    }

    pub fn configuration_required(app: &str, argument: &Argument, message: String) -> Self {
        Self::new(
            app,
            message,
            AppEventKind::ConfigurationRequired {
                argument: Box::new(argument.clone()),
            },
        )
    }

    pub fn started(app: &str, pid: Option<u32>) -> Self {
        let message = match pid {
            Some(pid) => format!("Started (pid {})", pid),
            None => "Started".to_string(),
        };
        Self::new(app, message, AppEventKind::Started { pid })
    }

    pub fn stopped(app: &str, code: Option<i32>) -> Self {
        let message = match code {
            Some(code) => format!("Exited with code {}", code),
            None => "Stopped".to_string(),
        };
        Self::new(app, message, AppEventKind::Stopped { code })
    }

    pub fn monitor(app: &str, text: String) -> Self {
        Self::new(app, String::new(), AppEventKind::Monitor { text })
    }

    /// Whether this event ends an acquisition sequence
    pub fn is_terminal_acquisition(&self) -> bool {
        matches!(
            self.kind,
            AppEventKind::DownloadFailed { .. }
                | AppEventKind::InstallFinished
                | AppEventKind::InstallFailed { .. }
        )
    }
}
