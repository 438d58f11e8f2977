//! On-disk locations owned by one app

use std::path::{Path, PathBuf};

use crate::config::PathSettings;

/// Prefix of entries marking a user-pinned local build
pub const PINNED_MARKER_PREFIX: &str = "my_version";

/// Install and download directories for one app, derived from its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Extraction target; the executable of a downloadable app lives here
    pub install_dir: PathBuf,
    /// Cache directory for the downloaded artifact
    pub download_dir: PathBuf,
}

impl AppPaths {
    pub fn new(settings: &PathSettings, app_name: &str) -> Self {
        Self {
            install_dir: settings.apps_dir.join(app_name),
            download_dir: settings.downloads_dir.join(app_name),
        }
    }

    /// Cached artifact location for a given remote file name
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.download_dir.join(file_name)
    }

    /// Whether the install directory holds a `my_version*` entry
    pub fn is_pinned(&self) -> bool {
        has_pinned_marker(&self.install_dir)
    }
}

fn has_pinned_marker(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry
            .file_name()
            .to_string_lossy()
            .starts_with(PINNED_MARKER_PREFIX)
    })
}
