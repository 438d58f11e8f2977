//! Configuration file parsing for sidecar
//!
//! Supports:
//! - `settings.toml` - Host settings (paths, close timeout, auto-run policy)
//! - `apps.toml` - The app catalog

pub mod settings;
pub mod types;

pub use settings::{
    default_config_dir, load_catalog, load_settings, parse_catalog, CATALOG_FILENAME,
    SETTINGS_FILENAME,
};
pub use types::*;
