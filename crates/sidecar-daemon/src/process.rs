//! Child process supervision

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, Notify};

use crate::launch::LaunchSpec;
use crate::terminate;
use sidecar_core::events::ProcessEvent;
use sidecar_core::prelude::*;

/// Manages one supervised child process.
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` background task that
/// calls `child.wait()`, so the real exit code is captured and emitted as
/// `ProcessEvent::Exited { code: Some(N) }`.
///
/// `AppProcess` retains a kill channel ([`kill_tx`]) to request a force-kill, an
/// atomic flag ([`exited`]) for synchronous `has_exited()` checks, and a [`Notify`]
/// handle so `shutdown()` can await graceful exit without polling.
pub struct AppProcess {
    /// Process ID
    pid: Option<u32>,
    /// One-shot sender that tells the wait task to force-kill the process.
    /// Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set to `true` by the wait task once the child has exited.
    exited: Arc<AtomicBool>,
    /// Notified by the wait task immediately after the child exits.
    exit_notify: Arc<Notify>,
}

impl AppProcess {
    /// Spawn a process and start forwarding its output to `event_tx`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(spec: &LaunchSpec, event_tx: mpsc::Sender<ProcessEvent>) -> Result<Self> {
        info!("Spawning: {}", spec.display());

        let mut child = spec
            .command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ProcessSpawn {
                        reason: format!("executable not found: {}", spec.program.display()),
                    }
                } else {
                    Error::ProcessSpawn {
                        reason: e.to_string(),
                    }
                }
            })?;

        let pid = child.id();
        info!("Process started with PID: {:?}", pid);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(Self::stdout_reader(stdout, event_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(Self::stderr_reader(stderr, event_tx.clone()));
        }

        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());

        // Kill channel: AppProcess holds the sender, wait task holds the receiver.
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            kill_rx,
            event_tx,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
        ));

        Ok(Self {
            pid,
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
        })
    }

    /// Background task: owns `child`, waits for it to exit, emits `ProcessEvent::Exited`.
    ///
    /// Two ways the task can end:
    /// 1. The process exits naturally; `child.wait()` resolves.
    /// 2. `kill_rx` fires; we kill the child first, then wait for it.
    async fn wait_for_exit(
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        event_tx: mpsc::Sender<ProcessEvent>,
        exited: Arc<AtomicBool>,
        exit_notify: Arc<Notify>,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("Process exited with status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for process: {}", e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Kill signal received, force-killing process");
                if let Err(e) = child.kill().await {
                    error!("Failed to kill process: {}", e);
                }
                match child.wait().await {
                    Ok(status) => {
                        info!("Process killed, exit status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting after kill: {}", e);
                        None
                    }
                }
            }
        };

        // Mark exited and wake waiters before sending the event, so
        // `has_exited()` is already true when observers see it.
        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();

        debug!("Sending ProcessEvent::Exited {{ code: {:?} }}", code);
        let _ = event_tx.send(ProcessEvent::Exited { code }).await;
    }

    /// Read lines from stdout and send as `ProcessEvent::Stdout`.
    async fn stdout_reader(stdout: tokio::process::ChildStdout, tx: mpsc::Sender<ProcessEvent>) {
        let mut reader = BufReader::new(stdout).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            trace!("stdout: {}", line);

            if tx.send(ProcessEvent::Stdout(line)).await.is_err() {
                debug!("stdout channel closed");
                break;
            }
        }

        debug!("stdout reader finished");
    }

    /// Read lines from stderr and send as `ProcessEvent::Stderr`.
    async fn stderr_reader(stderr: tokio::process::ChildStderr, tx: mpsc::Sender<ProcessEvent>) {
        let mut reader = BufReader::new(stderr).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            trace!("stderr: {}", line);

            if tx.send(ProcessEvent::Stderr(line)).await.is_err() {
                debug!("stderr channel closed");
                break;
            }
        }

        debug!("stderr reader finished");
    }

    /// Shut the process down, escalating to a forced kill.
    ///
    /// 1. Early exit if the process is already dead
    /// 2. Request a graceful close (SIGTERM / WM_CLOSE)
    /// 3. Wait up to `grace` for the exit notification
    /// 4. Signal the wait task to force-kill on timeout
    pub async fn shutdown(&mut self, grace: Duration) -> Result<()> {
        if self.has_exited() {
            info!("Process already exited, skipping shutdown");
            return Ok(());
        }

        // Create the `notified()` future before requesting the close, so a
        // fast exit between the request and the await is not missed.
        let notified = self.exit_notify.notified();

        if let Some(pid) = self.pid {
            if !terminate::request_close(pid).await {
                debug!("Graceful close request for PID {} was not delivered", pid);
            }
        }

        if self.has_exited() {
            return Ok(());
        }

        match tokio::time::timeout(grace, notified).await {
            Ok(()) => {
                info!("Process exited gracefully");
                Ok(())
            }
            Err(_) => {
                warn!("Timeout waiting for graceful exit, force killing");
                self.force_kill().await
            }
        }
    }

    /// Force kill the process by signalling the wait task, then await the exit.
    pub async fn force_kill(&mut self) -> Result<()> {
        let notified = self.exit_notify.notified();
        if self.has_exited() {
            return Ok(());
        }

        match self.kill_tx.take() {
            Some(tx) => {
                // Ignore send error: the wait task may have already exited naturally.
                let _ = tx.send(());
            }
            None => return Err(Error::process("kill already requested")),
        }

        if tokio::time::timeout(Duration::from_secs(5), notified)
            .await
            .is_err()
        {
            return Err(Error::process("process did not exit after kill"));
        }
        Ok(())
    }

    /// Wait until the process exits
    pub async fn wait(&self) {
        let notified = self.exit_notify.notified();
        if self.has_exited() {
            return;
        }
        notified.await;
    }

    /// Check if the process has already exited.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Check if the process is still running.
    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    /// Get the process ID
    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for AppProcess {
    fn drop(&mut self) {
        // Tell the wait task to kill the child if it's still running.
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec::new("/bin/sh").args(vec!["-c".to_string(), script.to_string()])
    }

    async fn collect_until_exit(rx: &mut mpsc::Receiver<ProcessEvent>) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = matches!(event, ProcessEvent::Exited { .. });
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let (tx, mut rx) = mpsc::channel(16);
        let process = AppProcess::spawn(&sh("echo hello; echo oops 1>&2; exit 3"), tx).unwrap();
        assert!(process.id().is_some());

        let mut events = collect_until_exit(&mut rx).await;
        // Output readers may race the exit event; drain the rest.
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(200), rx.recv()).await
        {
            events.push(event);
        }

        assert!(events.contains(&ProcessEvent::Stdout("hello".into())));
        assert!(events.contains(&ProcessEvent::Stderr("oops".into())));
        assert!(events.contains(&ProcessEvent::Exited { code: Some(3) }));
        assert!(process.has_exited());
    }

    #[tokio::test]
    async fn test_shutdown_terminates_long_running_process() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut process = AppProcess::spawn(&sh("sleep 30"), tx).unwrap();
        assert!(process.is_running());

        process.shutdown(Duration::from_secs(2)).await.unwrap();
        assert!(process.has_exited());

        let events = collect_until_exit(&mut rx).await;
        assert!(matches!(events.last(), Some(ProcessEvent::Exited { .. })));
    }

    #[tokio::test]
    async fn test_force_kill_ignores_term() {
        let (tx, _rx) = mpsc::channel(16);
        let mut process =
            AppProcess::spawn(&sh("trap '' TERM; sleep 30"), tx).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        process.shutdown(Duration::from_millis(200)).await.unwrap();
        assert!(process.has_exited());
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let (tx, _rx) = mpsc::channel(16);
        let result = AppProcess::spawn(&LaunchSpec::new("/no/such/binary"), tx);
        assert!(matches!(result, Err(Error::ProcessSpawn { .. })));
    }

    #[tokio::test]
    async fn test_wait_returns_after_exit() {
        let (tx, _rx) = mpsc::channel(16);
        let process = AppProcess::spawn(&sh("exit 0"), tx).unwrap();
        tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .unwrap();
        assert!(process.has_exited());
    }
}
