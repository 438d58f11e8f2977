//! App runtime - lifecycle of one managed companion app
//!
//! An [`AppRuntime`] owns the app's configuration, its supervised process,
//! the bounded output log and the lifecycle phase. Every transition is
//! reported on the per-instance event channel handed in by the orchestrator.
//!
//! ```text
//! NotInstalled -> Downloading -> [Installing] -> Ready -> Running -> Ready
//! ```

mod acquisition;
pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use sidecar_core::prelude::*;
use sidecar_core::{
    split_command_line, AppEvent, AppPhase, Argument, Configuration, OutputLog, ProcessEvent,
    RuntimeArguments,
};
use sidecar_daemon::{
    is_uri, kill_by_path, kill_pid, make_executable, open_target, resolve_program, AppProcess,
    ArtifactFetcher, LaunchSpec,
};

use crate::config::{AppDefinition, AppKind, BehaviorSettings, LaunchOptions, Settings};

pub use acquisition::{InstallOutcome, PipelineHandle, PipelineOutcome};
pub use paths::AppPaths;

/// Buffer between the process readers and the supervisor task
const PROCESS_EVENT_BUFFER: usize = 256;

/// How long `close()` lets the supervisor observe the exit before marking
/// the app stopped itself
const SUPERVISOR_SETTLE: Duration = Duration::from_millis(500);

/// Result of a `run()` call
#[derive(Debug)]
pub enum RunOutcome {
    /// A process was spawned
    Started { pid: Option<u32> },
    /// The target was handed to the OS default handler
    Opened,
    /// Already running; nothing was spawned
    AlreadyRunning,
    /// Not installed yet; the run is deferred to the acquisition pipeline
    Installing(InstallOutcome),
}

/// What a launch resolves to
#[derive(Debug, Clone, PartialEq)]
enum LaunchTarget {
    Program(PathBuf),
    /// URI or document opened through the OS; nothing to capture or track
    Open(String),
}

#[derive(Default)]
struct ProcessSlot {
    process: Option<AppProcess>,
    last_pid: Option<u32>,
    permissions_fixed: bool,
}

#[derive(Debug, Default)]
struct AcquisitionState {
    busy: bool,
    completed: u32,
}

/// One managed companion app
pub struct AppRuntime {
    name: String,
    custom_name: Option<String>,
    kind: AppKind,
    launch: LaunchOptions,
    paths: AppPaths,
    behavior: BehaviorSettings,
    fetcher: ArtifactFetcher,
    events: mpsc::Sender<AppEvent>,

    configuration: Mutex<Configuration>,
    /// Serializes launch and close
    process: tokio::sync::Mutex<ProcessSlot>,
    pid: Mutex<Option<u32>>,
    phase: watch::Sender<AppPhase>,
    output: Mutex<OutputLog>,
    argument_required: Mutex<Option<Argument>>,
    acquisition: Mutex<AcquisitionState>,
    /// Bumped per launch and per close; a supervisor only acts while its
    /// generation is current
    generation: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AppRuntime {
    pub fn new(
        definition: AppDefinition,
        settings: &Settings,
        fetcher: ArtifactFetcher,
        events: mpsc::Sender<AppEvent>,
    ) -> Arc<Self> {
        let paths = AppPaths::new(&settings.paths, &definition.name);
        let launch = definition.launch_options();
        let (phase, _) = watch::channel(AppPhase::NotInstalled);

        let runtime = Arc::new(Self {
            name: definition.name,
            custom_name: definition.custom_name,
            kind: definition.kind,
            launch,
            paths,
            behavior: settings.behavior.clone(),
            fetcher,
            events,
            configuration: Mutex::new(definition.configuration),
            process: tokio::sync::Mutex::new(ProcessSlot::default()),
            pid: Mutex::new(None),
            phase,
            output: Mutex::new(OutputLog::default()),
            argument_required: Mutex::new(None),
            acquisition: Mutex::new(AcquisitionState::default()),
            generation: AtomicU64::new(0),
        });
        runtime.phase.send_replace(runtime.resting_phase());
        debug!("App '{}' initialized in {:?}", runtime.name, runtime.phase());
        runtime
    }

    // ─────────────────────────────────────────────────────────
    // State queries
    // ─────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.name)
    }

    pub fn kind(&self) -> &AppKind {
        &self.kind
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn phase(&self) -> AppPhase {
        *self.phase.borrow()
    }

    /// Subscribe to phase changes
    pub fn watch_phase(&self) -> watch::Receiver<AppPhase> {
        self.phase.subscribe()
    }

    /// Supervisor-owned running flag; not a live process probe
    pub fn is_running(&self) -> bool {
        self.phase() == AppPhase::Running
    }

    pub fn process_id(&self) -> Option<u32> {
        *lock(&self.pid)
    }

    /// Combined stdout then stderr text of the bounded output log
    pub fn monitor(&self) -> String {
        lock(&self.output).monitor()
    }

    pub fn output_len(&self) -> usize {
        lock(&self.output).len()
    }

    /// The argument that failed validation during the last composition
    pub fn argument_required(&self) -> Option<Argument> {
        lock(&self.argument_required).clone()
    }

    pub fn is_configurable(&self) -> bool {
        lock(&self.configuration).is_configurable()
    }

    pub fn is_installable(&self) -> bool {
        self.kind.download_url().is_some()
    }

    /// Service installables belong to the OS service manager once installed
    pub fn is_runnable(&self) -> bool {
        !matches!(self.kind, AppKind::Installable { service: true, .. })
    }

    pub fn is_installed(&self) -> bool {
        match &self.kind {
            AppKind::Open { .. } => true,
            AppKind::Installable {
                service: true,
                install_dir,
                ..
            } => install_dir.is_dir(),
            AppKind::Local { .. } => self.launch_target().is_some(),
            AppKind::Downloadable { .. } | AppKind::Installable { .. } => {
                self.executable_path().is_some()
            }
        }
    }

    /// Runnable executable, if it can be resolved.
    ///
    /// Installable apps only look in their declared install directory.
    pub fn executable_path(&self) -> Option<PathBuf> {
        match &self.kind {
            AppKind::Local { .. } => match self.launch_target()? {
                LaunchTarget::Program(path) => Some(path),
                LaunchTarget::Open(_) => None,
            },
            AppKind::Open { .. } => None,
            AppKind::Downloadable { executable, .. } => {
                existing_file(self.paths.install_dir.join(executable))
            }
            AppKind::Installable {
                install_dir,
                executable,
                ..
            } => existing_file(install_dir.join(executable)),
        }
    }

    fn launch_target(&self) -> Option<LaunchTarget> {
        match &self.kind {
            AppKind::Open { target } => Some(LaunchTarget::Open(target.clone())),
            AppKind::Local { executable } => {
                let raw = match executable {
                    Some(path) => path.display().to_string(),
                    None => lock(&self.configuration)
                        .arguments()
                        .first()
                        .map(|a| a.value_str().to_string())
                        .unwrap_or_default(),
                };
                if raw.is_empty() {
                    None
                } else if is_uri(&raw) {
                    Some(LaunchTarget::Open(raw))
                } else {
                    resolve_program(Path::new(&raw)).map(LaunchTarget::Program)
                }
            }
            AppKind::Downloadable { .. } | AppKind::Installable { .. } => {
                self.executable_path().map(LaunchTarget::Program)
            }
        }
    }

    fn resting_phase(&self) -> AppPhase {
        if self.is_installed() {
            AppPhase::Ready
        } else {
            AppPhase::NotInstalled
        }
    }

    // ─────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────

    /// Snapshot of the current configuration
    pub fn configuration(&self) -> Configuration {
        lock(&self.configuration).clone()
    }

    /// Mutate the configuration in place
    pub fn update_configuration<R>(&self, f: impl FnOnce(&mut Configuration) -> R) -> R {
        f(&mut lock(&self.configuration))
    }

    /// Set one argument value by name
    pub fn set_argument(&self, name: &str, value: Option<String>) -> Result<()> {
        lock(&self.configuration).set_value(name, value)
    }

    /// Compose the command-line string, recording a failing argument.
    pub fn argument_string(&self, runtime: &RuntimeArguments) -> Result<String> {
        let result = lock(&self.configuration).generate_argument_string(runtime);
        let mut required = lock(&self.argument_required);
        match &result {
            Ok(_) => *required = None,
            Err(e) => {
                if let Some(arg_err) = e.argument_error() {
                    *required = Some((*arg_err.argument).clone());
                }
            }
        }
        result
    }

    // ─────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────

    /// Run the app.
    ///
    /// A no-op while running. An app that is not installed yet is acquired
    /// first and launched from the pipeline once ready.
    pub async fn run(self: &Arc<Self>, runtime: RuntimeArguments) -> Result<RunOutcome> {
        if self.is_running() {
            debug!("App '{}' already running", self.name);
            return Ok(RunOutcome::AlreadyRunning);
        }
        if !self.is_runnable() {
            return Err(Error::NotRunnable {
                app: self.name.clone(),
            });
        }
        if !self.is_installed() {
            if self.is_installable() {
                info!("App '{}' not installed, acquiring first", self.name);
                let outcome = self.install(runtime).await?;
                return Ok(RunOutcome::Installing(outcome));
            }
            return Err(Error::executable_not_found(&self.name));
        }
        self.launch(&runtime).await
    }

    /// Compose arguments and spawn (or open) the app.
    async fn launch(self: &Arc<Self>, runtime: &RuntimeArguments) -> Result<RunOutcome> {
        let mut slot = self.process.lock().await;
        if self.is_running() {
            return Ok(RunOutcome::AlreadyRunning);
        }

        let args = match self.argument_string(runtime) {
            Ok(args) => args,
            Err(e) => {
                if let Some(arg_err) = e.argument_error() {
                    warn!("App '{}' needs configuration: {}", self.name, arg_err);
                    self.emit(AppEvent::configuration_required(
                        &self.name,
                        &arg_err.argument,
                        arg_err.message(),
                    ))
                    .await;
                }
                return Err(e);
            }
        };

        let program = match self.launch_target() {
            Some(LaunchTarget::Program(program)) => program,
            Some(LaunchTarget::Open(target)) => {
                if !args.is_empty() {
                    debug!("Ignoring arguments for opened target {}", target);
                }
                open_target(&target)?;
                self.generation.fetch_add(1, Ordering::SeqCst);
                *lock(&self.pid) = None;
                self.phase.send_replace(AppPhase::Running);
                self.emit(AppEvent::started(&self.name, None)).await;
                return Ok(RunOutcome::Opened);
            }
            None => return Err(Error::executable_not_found(&self.name)),
        };

        if self.launch.chmod && !slot.permissions_fixed {
            make_executable(&program)
                .await
                .context(format!("Failed to mark '{}' executable", self.name))?;
            slot.permissions_fixed = true;
        }

        let spec = LaunchSpec::new(&program)
            .args(split_command_line(&args))
            .run_as_admin(self.launch.run_as_admin)
            .window_state(self.launch.start_window_state);

        let (tx, rx) = mpsc::channel(PROCESS_EVENT_BUFFER);
        let process = AppProcess::spawn(&spec, tx).inspect_err(|e| {
            error!("Failed to start '{}': {}", self.name, e);
        })?;
        let pid = process.id();

        let generation = {
            let mut log = lock(&self.output);
            log.clear();
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        slot.process = Some(process);
        slot.last_pid = pid;
        *lock(&self.pid) = pid;
        self.phase.send_replace(AppPhase::Running);
        drop(slot);

        self.emit(AppEvent::started(&self.name, pid)).await;
        tokio::spawn(Arc::clone(self).supervise(rx, generation));

        Ok(RunOutcome::Started { pid })
    }

    /// Capture output into the log and flip the phase on exit.
    ///
    /// Events from a launch that is no longer current are dropped.
    async fn supervise(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<ProcessEvent>,
        generation: u64,
    ) {
        // Keep draining after the exit so late reader lines still land.
        while let Some(event) = rx.recv().await {
            if let ProcessEvent::Exited { code } = event {
                info!("App '{}' exited with {:?}", self.name, code);
                self.mark_stopped(generation, code).await;
                continue;
            }
            if let Some((stream, line)) = event.output() {
                let text = {
                    let mut log = lock(&self.output);
                    if !self.is_current(generation) {
                        continue;
                    }
                    log.push(stream, line);
                    log.monitor()
                };
                self.emit(AppEvent::monitor(&self.name, text)).await;
            }
        }
        debug!("Supervisor for '{}' finished", self.name);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Flip `Running` to `Ready` if `generation` still owns the app.
    async fn mark_stopped(&self, generation: u64, code: Option<i32>) {
        let mut current = false;
        let changed = self.phase.send_if_modified(|phase| {
            current = self.is_current(generation);
            if current && *phase == AppPhase::Running {
                *phase = AppPhase::Ready;
                true
            } else {
                false
            }
        });
        if !current {
            debug!("Ignoring stale exit for '{}'", self.name);
            return;
        }
        *lock(&self.pid) = None;
        if changed {
            self.emit(AppEvent::stopped(&self.name, code)).await;
        }
    }

    /// Close the app. Never fails; problems are logged.
    ///
    /// Requests a graceful close, waits up to the configured timeout, then
    /// kills by the last known PID and by executable path.
    pub async fn close(&self) {
        if !self.is_runnable() {
            debug!("App '{}' is OS-managed, not closing", self.name);
            return;
        }

        let mut slot = self.process.lock().await;
        let tracked = slot.process.take();
        let last_pid = slot.last_pid.take();

        let mut stopped_cleanly = false;
        if let Some(mut process) = tracked {
            match process.shutdown(self.behavior.close_timeout()).await {
                Ok(()) => stopped_cleanly = true,
                Err(e) => warn!("Failed to stop '{}' cleanly: {}", self.name, e),
            }
        }

        if !stopped_cleanly {
            if let Some(pid) = last_pid {
                if kill_pid(pid) {
                    info!("Killed '{}' by PID {}", self.name, pid);
                }
            }
        }

        if let Some(program) = self.executable_path() {
            match tokio::task::spawn_blocking(move || kill_by_path(&program)).await {
                Ok(0) => {}
                Ok(n) => info!("Killed {} stray instance(s) of '{}'", n, self.name),
                Err(e) => warn!("Kill-by-path for '{}' failed: {}", self.name, e),
            }
        }

        if self.is_running() {
            let _ = tokio::time::timeout(SUPERVISOR_SETTLE, self.wait_for_exit()).await;
        }
        // Detach the old supervisor before taking over its stop.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.mark_stopped(generation, None).await;
        drop(slot);
    }

    /// Wait until the app is no longer running
    pub async fn wait_for_exit(&self) {
        let mut rx = self.phase.subscribe();
        let _ = rx.wait_for(|phase| *phase != AppPhase::Running).await;
    }

    async fn emit(&self, event: AppEvent) {
        if self.events.send(event).await.is_err() {
            trace!("No event observer for '{}'", self.name);
        }
    }
}

impl std::fmt::Debug for AppRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRuntime")
            .field("name", &self.name)
            .field("kind", &self.kind.label())
            .field("phase", &self.phase())
            .finish()
    }
}

fn existing_file(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}
