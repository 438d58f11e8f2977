//! Settings and catalog loading

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use sidecar_core::prelude::*;

use super::types::{AppCatalog, Settings};

pub const SETTINGS_FILENAME: &str = "settings.toml";
pub const CATALOG_FILENAME: &str = "apps.toml";
const CONFIG_DIR_NAME: &str = "sidecar";

/// Default settings directory: `<config_dir>/sidecar`
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CONFIG_DIR_NAME)
}

/// Load settings from `config_dir/settings.toml`
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(config_dir: &Path) -> Settings {
    let path = config_dir.join(SETTINGS_FILENAME);

    if !path.exists() {
        debug!("No settings file at {:?}, using defaults", path);
        return Settings::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            Settings::default()
        }
    }
}

/// Load the app catalog from `config_dir/apps.toml`
///
/// A missing file is an empty catalog. Anything malformed is a fatal
/// construction error: bad argument type grammar, bad conditions, and
/// duplicate or path-unsafe app names.
pub fn load_catalog(config_dir: &Path) -> Result<AppCatalog> {
    let path = config_dir.join(CATALOG_FILENAME);

    if !path.exists() {
        debug!("No catalog at {:?}, no apps configured", path);
        return Ok(AppCatalog::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::config(format!("Failed to read {}: {}", path.display(), e)))?;
    let catalog = parse_catalog(&content)
        .map_err(|e| Error::config_invalid(format!("{}: {}", path.display(), e)))?;

    info!("Loaded {} app(s) from {:?}", catalog.apps.len(), path);
    Ok(catalog)
}

/// Parse and validate catalog TOML
pub fn parse_catalog(content: &str) -> Result<AppCatalog> {
    let catalog: AppCatalog =
        toml::from_str(content).map_err(|e| Error::config_invalid(e.to_string()))?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn validate_catalog(catalog: &AppCatalog) -> Result<()> {
    let mut seen = HashSet::new();
    for app in &catalog.apps {
        if !is_path_safe_name(&app.name) {
            return Err(Error::config_invalid(format!(
                "app name '{}' must be a single path component",
                app.name
            )));
        }
        if !seen.insert(app.name.as_str()) {
            return Err(Error::config_invalid(format!(
                "duplicate app name '{}'",
                app.name
            )));
        }
        app.configuration.check().map_err(|e| {
            Error::config_invalid(format!("app '{}': {}", app.name, e))
        })?;
    }
    Ok(())
}

fn is_path_safe_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AutoRunPolicy;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_defaults() {
        let temp = tempdir().unwrap();
        let settings = load_settings(temp.path());
        assert_eq!(settings.behavior.close_timeout_ms, 3000);
        assert_eq!(settings.behavior.auto_run, AutoRunPolicy::Always);
    }

    #[test]
    fn test_load_settings_custom() {
        let temp = tempdir().unwrap();
        let config = r#"
[paths]
apps_dir = "/srv/sidecar/apps"

[behavior]
close_timeout_ms = 500
auto_run = "skip_first_download"

[download]
timeout_secs = 30
"#;
        std::fs::write(temp.path().join(SETTINGS_FILENAME), config).unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings.paths.apps_dir, PathBuf::from("/srv/sidecar/apps"));
        assert!(settings.paths.downloads_dir.ends_with("downloads"));
        assert_eq!(settings.behavior.close_timeout_ms, 500);
        assert_eq!(settings.behavior.auto_run, AutoRunPolicy::SkipFirstDownload);
        // The pre-rename key still loads.
        assert_eq!(settings.download.idle_timeout_secs, 30);
    }

    #[test]
    fn test_load_settings_invalid_toml() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join(SETTINGS_FILENAME), "not [valid").unwrap();
        let settings = load_settings(temp.path());
        assert_eq!(settings.behavior.close_timeout_ms, 3000);
    }

    #[test]
    fn test_load_catalog_missing_is_empty() {
        let temp = tempdir().unwrap();
        assert!(load_catalog(temp.path()).unwrap().apps.is_empty());
    }

    #[test]
    fn test_load_catalog_bad_type_is_fatal() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join(CATALOG_FILENAME),
            r#"
[[apps]]
name = "x"
kind = { type = "local" }

[[apps.configuration.arguments]]
name = "n"
type = "number"
"#,
        )
        .unwrap();

        let err = load_catalog(temp.path()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = parse_catalog(
            r#"
[[apps]]
name = "a"
kind = { type = "local" }

[[apps]]
name = "a"
kind = { type = "open", target = "https://example.com" }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_path_unsafe_names_rejected() {
        for name in ["..", "a/b", "", "."] {
            let toml = format!(
                "[[apps]]\nname = \"{}\"\nkind = {{ type = \"local\" }}\n",
                name
            );
            assert!(parse_catalog(&toml).is_err(), "accepted {:?}", name);
        }
    }

    #[test]
    fn test_bad_condition_rejected() {
        let err = parse_catalog(
            r#"
[[apps]]
name = "a"
kind = { type = "local" }

[[apps.configuration.arguments]]
name = "n"
type = "string"
required_on_argument = "missing-equals"
"#,
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }
}
