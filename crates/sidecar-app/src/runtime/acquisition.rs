//! Acquisition pipeline: size check, download, extract, native install
//!
//! `install()` does the cheap checks inline and hands the rest to a
//! background task. Completion is reported through events; callers that
//! want to block can await the returned [`PipelineHandle`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;

use sidecar_core::prelude::*;
use sidecar_core::{AppEvent, AppPhase, RuntimeArguments};
use sidecar_daemon::{
    artifact_file_name, extract_async, make_executable, ArchiveKind, InstallerCommand,
};

use super::{lock, AppRuntime, RunOutcome};
use crate::config::AppKind;

/// Result of an `install()` call
#[derive(Debug)]
pub enum InstallOutcome {
    /// Local/open apps have nothing to acquire
    NotInstallable,
    /// A `my_version*` marker pins a local build; nothing was touched
    Pinned,
    /// Remote and cached artifact sizes match; nothing was fetched
    UpToDate,
    /// Another install or run sequence owns the app
    InProgress,
    /// The size probe failed; `DownloadFailed` was emitted
    Failed { error: String },
    /// The download started; completion is reported through events
    Pending(PipelineHandle),
}

/// How a background pipeline ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Installed; `launched` tells whether the auto-run started the app
    Completed { launched: bool },
    Failed { error: String },
}

/// Awaitable handle on a running pipeline
#[derive(Debug)]
pub struct PipelineHandle {
    handle: JoinHandle<PipelineOutcome>,
}

impl PipelineHandle {
    pub async fn wait(self) -> PipelineOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => PipelineOutcome::Failed {
                error: format!("pipeline task failed: {}", e),
            },
        }
    }
}

/// Which stage a pipeline failure belongs to (selects the failure event)
enum Failure {
    Download(Error),
    Install(Error),
}

impl AppRuntime {
    /// Acquire the app if its cached artifact is missing or stale.
    pub async fn install(self: &Arc<Self>, runtime: RuntimeArguments) -> Result<InstallOutcome> {
        let Some(url) = self.kind.download_url().map(str::to_string) else {
            return Ok(InstallOutcome::NotInstallable);
        };

        {
            let mut state = lock(&self.acquisition);
            if state.busy || self.is_running() {
                debug!("App '{}' busy, not starting another install", self.name);
                return Ok(InstallOutcome::InProgress);
            }
            state.busy = true;
        }

        let outcome = self.begin(url, runtime).await;
        if !matches!(outcome, Ok(InstallOutcome::Pending(_))) {
            lock(&self.acquisition).busy = false;
        }
        outcome
    }

    async fn begin(
        self: &Arc<Self>,
        url: String,
        runtime: RuntimeArguments,
    ) -> Result<InstallOutcome> {
        if self.paths.is_pinned() {
            info!("App '{}' is pinned to a local build", self.name);
            return Ok(InstallOutcome::Pinned);
        }

        let artifact = match artifact_file_name(&url) {
            Ok(file_name) => self.paths.artifact_path(&file_name),
            Err(e) => return Ok(self.probe_failed(e).await),
        };

        match self.is_artifact_current(&url, &artifact).await {
            Ok(true) => {
                info!("App '{}' is up to date", self.name);
                return Ok(InstallOutcome::UpToDate);
            }
            Ok(false) => {}
            Err(e) => return Ok(self.probe_failed(e).await),
        }

        remove_dir_if_exists(&self.paths.install_dir).await?;
        self.phase.send_replace(AppPhase::Downloading);
        self.emit(AppEvent::download_started(&self.name, &url)).await;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.pipeline(url, artifact, runtime).await });
        Ok(InstallOutcome::Pending(PipelineHandle { handle }))
    }

    /// Byte-size freshness check. An unknown remote size counts as stale.
    async fn is_artifact_current(&self, url: &str, artifact: &Path) -> Result<bool> {
        let remote = self.fetcher.remote_size(url).await?;
        let local = tokio::fs::metadata(artifact).await.ok().map(|m| m.len());
        debug!(
            "App '{}' remote size {:?}, cached size {:?}",
            self.name, remote, local
        );
        let same_size = matches!((remote, local), (Some(r), Some(l)) if r == l);
        Ok(same_size && self.is_installed())
    }

    async fn probe_failed(&self, error: Error) -> InstallOutcome {
        warn!("App '{}' size check failed: {}", self.name, error);
        self.emit(AppEvent::download_failed(&self.name, error.to_string()))
            .await;
        InstallOutcome::Failed {
            error: error.to_string(),
        }
    }

    async fn pipeline(
        self: Arc<Self>,
        url: String,
        artifact: PathBuf,
        runtime: RuntimeArguments,
    ) -> PipelineOutcome {
        match self.acquire(&url, &artifact).await {
            Ok(()) => {
                self.process.lock().await.permissions_fixed = false;
                self.phase.send_replace(self.resting_phase());
                let completed_before = {
                    let mut state = lock(&self.acquisition);
                    state.busy = false;
                    state.completed += 1;
                    state.completed - 1
                };

                if !self.should_auto_run(completed_before) {
                    return PipelineOutcome::Completed { launched: false };
                }
                let launched = match self.launch(&runtime).await {
                    Ok(RunOutcome::Started { .. } | RunOutcome::Opened) => true,
                    Ok(_) => false,
                    Err(e) => {
                        warn!("App '{}' installed but failed to start: {}", self.name, e);
                        false
                    }
                };
                PipelineOutcome::Completed { launched }
            }
            Err(failure) => {
                let error = self.roll_back(failure, &artifact).await;
                self.phase.send_replace(self.resting_phase());
                lock(&self.acquisition).busy = false;
                PipelineOutcome::Failed { error }
            }
        }
    }

    async fn acquire(&self, url: &str, artifact: &Path) -> std::result::Result<(), Failure> {
        let app = self.name.clone();
        let events = self.events.clone();
        self.fetcher
            .fetch(url, artifact, move |progress| {
                // Progress is lossy under back-pressure; terminal events are not.
                let _ = events.try_send(AppEvent::download_progress(
                    &app,
                    progress.received,
                    progress.total,
                ));
            })
            .await
            .map_err(Failure::Download)?;

        self.unpack(artifact).await.map_err(Failure::Download)?;
        self.emit(AppEvent::download_finished(&self.name, artifact.to_path_buf()))
            .await;

        if let AppKind::Installable { installer, .. } = &self.kind {
            self.phase.send_replace(AppPhase::Installing);
            self.emit(AppEvent::install_started(&self.name)).await;

            let path = self.paths.install_dir.join(&installer.file);
            if !path.is_file() {
                return Err(Failure::Install(Error::InstallerNotFound { path }));
            }
            make_executable(&path).await.map_err(Failure::Install)?;

            let command = InstallerCommand {
                path,
                silent_flag: installer.silent_flag.clone(),
                elevated: installer.elevated,
            };
            let code = command.run().await.map_err(Failure::Install)?;
            if code != Some(0) {
                return Err(Failure::Install(Error::InstallerExit { code }));
            }
            self.emit(AppEvent::install_finished(&self.name)).await;
        }

        Ok(())
    }

    /// Extract archives into the install directory; copy anything else as-is.
    async fn unpack(&self, artifact: &Path) -> Result<()> {
        let dest = self.paths.install_dir.clone();
        match ArchiveKind::detect(artifact) {
            Some(kind) => extract_async(artifact.to_path_buf(), kind, dest).await,
            None => {
                tokio::fs::create_dir_all(&dest).await?;
                let file_name = artifact
                    .file_name()
                    .ok_or_else(|| Error::download("artifact has no file name"))?;
                tokio::fs::copy(artifact, dest.join(file_name))
                    .await
                    .with_context(|| format!("Failed to copy {}", artifact.display()))?;
                Ok(())
            }
        }
    }

    /// Clear partial state and report the failure. Returns the error text.
    async fn roll_back(&self, failure: Failure, artifact: &Path) -> String {
        if let Err(e) = remove_dir_if_exists(&self.paths.install_dir).await {
            warn!("Failed to clear {}: {}", self.paths.install_dir.display(), e);
        }
        // A truncated or rejected artifact must not pass the next size check.
        if let Err(e) = tokio::fs::remove_file(artifact).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", artifact.display(), e);
            }
        }

        match failure {
            Failure::Download(e) => {
                error!("Download of '{}' failed: {}", self.name, e);
                let text = e.to_string();
                self.emit(AppEvent::download_failed(&self.name, text.clone()))
                    .await;
                text
            }
            Failure::Install(Error::InstallerExit { code }) => {
                error!("Installer of '{}' exited with {:?}", self.name, code);
                self.emit(AppEvent::install_failed(&self.name, code, None))
                    .await;
                Error::InstallerExit { code }.to_string()
            }
            Failure::Install(e) => {
                error!("Install of '{}' failed: {}", self.name, e);
                let text = e.to_string();
                self.emit(AppEvent::install_failed(&self.name, None, Some(text.clone())))
                    .await;
                text
            }
        }
    }

    fn should_auto_run(&self, completed_before: u32) -> bool {
        if !self.behavior.auto_run.should_run(completed_before) {
            debug!(
                "Auto-run policy {:?} skips launching '{}'",
                self.behavior.auto_run, self.name
            );
            return false;
        }
        match &self.kind {
            AppKind::Installable { auto_starts, .. } => !auto_starts && self.is_runnable(),
            _ => true,
        }
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
