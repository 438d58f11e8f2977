//! Host wiring: settings + catalog -> app runtimes, and the CLI commands
//!
//! Each runtime gets its own event channel; the host drains it with a
//! headless printer (or hands the receiver to the caller).

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use sidecar_app::config::{load_catalog, load_settings, AppCatalog, Settings};
use sidecar_app::{AppRuntime, InstallOutcome, PipelineOutcome, RunOutcome};
use sidecar_core::prelude::*;
use sidecar_core::{AppEvent, RuntimeArguments};
use sidecar_daemon::ArtifactFetcher;

use crate::headless::{self, HostEvent};

/// Capacity of each app's event channel
pub const EVENT_BUFFER: usize = 1024;

/// Loaded settings and catalog
pub struct Host {
    pub settings: Settings,
    pub catalog: AppCatalog,
    fetcher: ArtifactFetcher,
}

impl Host {
    /// Load `settings.toml` and `apps.toml` from `config_dir`.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let settings = load_settings(config_dir);
        let catalog = load_catalog(config_dir)?;
        Self::new(settings, catalog)
    }

    pub fn new(settings: Settings, catalog: AppCatalog) -> Result<Self> {
        let fetcher = ArtifactFetcher::new(
            settings.download.connect_timeout(),
            settings.download.idle_timeout(),
            &settings.download.user_agent,
        )?;
        Ok(Self {
            settings,
            catalog,
            fetcher,
        })
    }

    /// Build the runtime for one catalog entry, with its own event channel
    pub fn runtime(&self, name: &str) -> Result<(Arc<AppRuntime>, mpsc::Receiver<AppEvent>)> {
        let definition = self
            .catalog
            .find(name)
            .cloned()
            .ok_or_else(|| Error::UnknownApp {
                name: name.to_string(),
            })?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let runtime = AppRuntime::new(definition, &self.settings, self.fetcher.clone(), tx);
        Ok((runtime, rx))
    }
}

// ─────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────

/// `list`: one record per catalog entry
pub fn list(host: &Host) -> Result<()> {
    for definition in &host.catalog.apps {
        let (runtime, _rx) = host.runtime(&definition.name)?;
        headless::emit(&HostEvent::App {
            app: runtime.name().to_string(),
            display_name: runtime.display_name().to_string(),
            kind: runtime.kind().label(),
            phase: runtime.phase(),
            installed: runtime.is_installed(),
            configurable: runtime.is_configurable(),
        });
    }
    Ok(())
}

/// `args`: print the composed argument string
pub fn arguments(host: &Host, app: &str, runtime_args: &RuntimeArguments) -> Result<()> {
    let (runtime, _rx) = host.runtime(app)?;
    let arguments = runtime.argument_string(runtime_args)?;
    headless::emit(&HostEvent::Arguments {
        app: app.to_string(),
        arguments,
    });
    Ok(())
}

/// `run`: run the app and supervise it until it exits or Ctrl+C closes it
pub async fn run(host: &Host, app: &str, runtime_args: RuntimeArguments) -> Result<()> {
    let (runtime, rx) = host.runtime(app)?;
    let printer = headless::spawn_printer(rx);

    match runtime.run(runtime_args).await {
        Ok(RunOutcome::Started { .. }) => supervise(&runtime).await,
        Ok(RunOutcome::Installing(outcome)) => finish_install(&runtime, outcome).await,
        Ok(outcome) => report(app, format!("{:?}", outcome)),
        Err(e) => {
            // Argument errors were already reported as configuration_required.
            if e.argument_error().is_none() {
                report_error(&e);
            }
        }
    }

    drain(runtime, printer).await;
    Ok(())
}

/// `install`: acquire the app, following the pipeline to completion
pub async fn install(host: &Host, app: &str, runtime_args: RuntimeArguments) -> Result<()> {
    let (runtime, rx) = host.runtime(app)?;
    let printer = headless::spawn_printer(rx);

    match runtime.install(runtime_args).await {
        Ok(outcome) => finish_install(&runtime, outcome).await,
        Err(e) => report_error(&e),
    }

    drain(runtime, printer).await;
    Ok(())
}

/// `close`: stop the app, including instances this host did not start
pub async fn close(host: &Host, app: &str) -> Result<()> {
    let (runtime, rx) = host.runtime(app)?;
    let printer = headless::spawn_printer(rx);

    runtime.close().await;
    report(app, "closed".to_string());

    drain(runtime, printer).await;
    Ok(())
}

async fn finish_install(runtime: &Arc<AppRuntime>, outcome: InstallOutcome) {
    let handle = match outcome {
        InstallOutcome::Pending(handle) => handle,
        other => return report(runtime.name(), format!("{:?}", other)),
    };
    match handle.wait().await {
        PipelineOutcome::Completed { launched: true } => supervise(runtime).await,
        PipelineOutcome::Completed { launched: false } => {
            report(runtime.name(), "installed".to_string())
        }
        // The failure event already carries the error.
        PipelineOutcome::Failed { error } => debug!("Pipeline failed: {}", error),
    }
}

async fn supervise(runtime: &Arc<AppRuntime>) {
    if !runtime.is_running() {
        return;
    }
    tokio::select! {
        _ = runtime.wait_for_exit() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, closing '{}'", runtime.name());
            runtime.close().await;
        }
    }
}

/// Drop our runtime handle and let the printer flush what is left
async fn drain(runtime: Arc<AppRuntime>, printer: tokio::task::JoinHandle<()>) {
    drop(runtime);
    if tokio::time::timeout(std::time::Duration::from_secs(2), printer)
        .await
        .is_err()
    {
        debug!("Event printer still busy at exit");
    }
}

fn report(app: &str, outcome: String) {
    headless::emit(&HostEvent::Outcome {
        app: app.to_string(),
        outcome,
    });
}

fn report_error(error: &Error) {
    error!("{}", error);
    headless::emit(&HostEvent::Error {
        message: error.to_string(),
        fatal: error.is_fatal(),
    });
}
