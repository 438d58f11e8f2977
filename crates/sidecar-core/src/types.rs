//! Shared lifecycle and launch types

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a managed app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppPhase {
    /// Nothing runnable on disk yet
    #[default]
    NotInstalled,
    /// Artifact download (and extraction) in progress
    Downloading,
    /// Native installer running
    Installing,
    /// Installed and not running
    Ready,
    /// Process spawned (or target opened) and not yet exited
    Running,
}

impl AppPhase {
    /// Whether an acquisition pipeline currently owns the app
    pub fn is_acquiring(&self) -> bool {
        matches!(self, AppPhase::Downloading | AppPhase::Installing)
    }
}

/// Which standard stream a line of output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Initial window state requested for a launched app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartWindowState {
    #[default]
    Normal,
    Minimized,
    Maximized,
    Hidden,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_default_and_acquiring() {
        assert_eq!(AppPhase::default(), AppPhase::NotInstalled);
        assert!(AppPhase::Downloading.is_acquiring());
        assert!(AppPhase::Installing.is_acquiring());
        assert!(!AppPhase::Running.is_acquiring());
    }

    #[test]
    fn test_window_state_serde() {
        let state: StartWindowState = serde_json::from_str("\"hidden\"").unwrap();
        assert_eq!(state, StartWindowState::Hidden);
        assert_eq!(
            serde_json::to_string(&StartWindowState::Minimized).unwrap(),
            "\"minimized\""
        );
    }
}
