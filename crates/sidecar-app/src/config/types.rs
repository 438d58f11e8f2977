//! Configuration types for sidecar
//!
//! Defines:
//! - `Settings` - Host settings (`settings.toml`)
//! - `AppCatalog` / `AppDefinition` - The managed apps (`apps.toml`)
//! - `AppKind` - Closed set of app variants and their acquisition data

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use sidecar_core::{Configuration, StartWindowState};

// ─────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────

/// Host settings (settings.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub behavior: BehaviorSettings,

    #[serde(default)]
    pub download: DownloadSettings,
}

/// Where apps are installed and artifacts cached
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathSettings {
    /// Root of per-app install directories
    #[serde(default = "default_apps_dir")]
    pub apps_dir: PathBuf,

    /// Root of per-app downloaded artifacts
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            apps_dir: default_apps_dir(),
            downloads_dir: default_downloads_dir(),
        }
    }
}

fn data_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sidecar")
}

fn default_apps_dir() -> PathBuf {
    data_root().join("apps")
}

fn default_downloads_dir() -> PathBuf {
    data_root().join("downloads")
}

/// Behavior settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BehaviorSettings {
    /// Wait between a graceful close request and the forced kill
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,

    /// Whether a finished acquisition chains into a run
    #[serde(default)]
    pub auto_run: AutoRunPolicy,
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            close_timeout_ms: default_close_timeout_ms(),
            auto_run: AutoRunPolicy::default(),
        }
    }
}

impl BehaviorSettings {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

fn default_close_timeout_ms() -> u64 {
    3000
}

/// When to launch an app right after its acquisition pipeline succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoRunPolicy {
    /// Always chain into a run
    #[default]
    Always,
    /// Never; the caller runs the app explicitly
    Never,
    /// Skip the first successful download of this runtime's lifetime,
    /// run after every later one
    SkipFirstDownload,
}

impl AutoRunPolicy {
    /// Decide for a pipeline that just completed, given how many pipelines
    /// completed before it.
    pub fn should_run(&self, completed_before: u32) -> bool {
        match self {
            AutoRunPolicy::Always => true,
            AutoRunPolicy::Never => false,
            AutoRunPolicy::SkipFirstDownload => completed_before > 0,
        }
    }
}

/// Artifact download settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Longest gap between received bytes before a transfer is abandoned
    #[serde(default = "default_idle_timeout_secs", alias = "timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl DownloadSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_user_agent() -> String {
    format!("sidecar/{}", env!("CARGO_PKG_VERSION"))
}

// ─────────────────────────────────────────────────────────────────
// App Catalog
// ─────────────────────────────────────────────────────────────────

/// The managed apps (apps.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppCatalog {
    #[serde(default)]
    pub apps: Vec<AppDefinition>,
}

impl AppCatalog {
    pub fn find(&self, name: &str) -> Option<&AppDefinition> {
        self.apps.iter().find(|a| a.name == name)
    }
}

/// One catalog entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppDefinition {
    /// Stable key, also used for on-disk paths
    pub name: String,

    /// Display-only name
    #[serde(default)]
    pub custom_name: Option<String>,

    pub kind: AppKind,

    #[serde(default)]
    pub run_as_admin: bool,

    /// Mark the executable `+x` before the first launch (POSIX only)
    #[serde(default)]
    pub chmod: bool,

    #[serde(default)]
    pub start_window_state: StartWindowState,

    #[serde(default)]
    pub configuration: Configuration,
}

impl AppDefinition {
    pub fn new(name: impl Into<String>, kind: AppKind) -> Self {
        Self {
            name: name.into(),
            custom_name: None,
            kind,
            run_as_admin: false,
            chmod: false,
            start_window_state: StartWindowState::Normal,
            configuration: Configuration::default(),
        }
    }

    pub fn with_configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn with_chmod(mut self) -> Self {
        self.chmod = true;
        self
    }

    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.name)
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            run_as_admin: self.run_as_admin,
            chmod: self.chmod,
            start_window_state: self.start_window_state,
        }
    }
}

/// Launch-time hints shared by every app kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub run_as_admin: bool,
    pub chmod: bool,
    pub start_window_state: StartWindowState,
}

/// The closed set of app variants
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppKind {
    /// An executable already present on this machine.
    ///
    /// Without `executable`, the value of the first configuration argument
    /// is the program path.
    Local {
        #[serde(default)]
        executable: Option<PathBuf>,
    },

    /// A URI or document handed to the OS default handler
    Open { target: String },

    /// A remote artifact downloaded (and extracted) into the app's directory
    Downloadable {
        url: String,
        /// Program path relative to the install directory
        executable: PathBuf,
    },

    /// A remote artifact carrying a native installer
    Installable {
        url: String,
        installer: InstallerSpec,
        /// Directory the installer is known to install into
        install_dir: PathBuf,
        /// Program path relative to `install_dir`
        executable: PathBuf,
        /// Installs an OS service; never run or closed directly
        #[serde(default)]
        service: bool,
        /// The installer launches the app itself
        #[serde(default)]
        auto_starts: bool,
    },
}

impl AppKind {
    pub fn download_url(&self) -> Option<&str> {
        match self {
            AppKind::Downloadable { url, .. } | AppKind::Installable { url, .. } => Some(url),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AppKind::Local { .. } => "local",
            AppKind::Open { .. } => "open",
            AppKind::Downloadable { .. } => "downloadable",
            AppKind::Installable { .. } => "installable",
        }
    }
}

/// Native installer shipped inside an installable artifact
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InstallerSpec {
    /// Installer path relative to the extraction directory. When the
    /// artifact is not an archive this is usually the artifact's own name.
    pub file: PathBuf,

    /// Flag requesting an unattended install (e.g. `/S`, `--silent`)
    #[serde(default)]
    pub silent_flag: Option<String>,

    #[serde(default)]
    pub elevated: bool,
}
