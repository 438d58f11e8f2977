//! Process termination by PID and by executable path
//!
//! Used when the tracked child handle is missing or stale (e.g. the app
//! relaunched itself, or a previous host run started it).

use std::path::{Path, PathBuf};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use sidecar_core::prelude::*;

fn system_for(processes: ProcessesToUpdate<'_>) -> System {
    let mut system = System::new();
    system.refresh_processes_specifics(processes, true, ProcessRefreshKind::everything());
    system
}

/// Ask a process to close gracefully.
///
/// SIGTERM on Unix; on Windows a non-forced `taskkill`, which posts WM_CLOSE
/// to the main window. Returns whether the request was delivered. Neither
/// path blocks the async runtime.
pub async fn request_close(pid: u32) -> bool {
    #[cfg(windows)]
    {
        tokio::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .inspect_err(|e| debug!("taskkill failed for PID {}: {}", pid, e))
            .unwrap_or(false)
    }

    #[cfg(not(windows))]
    {
        tokio::task::spawn_blocking(move || send_term(pid))
            .await
            .unwrap_or(false)
    }
}

#[cfg(not(windows))]
fn send_term(pid: u32) -> bool {
    let target = Pid::from_u32(pid);
    let system = system_for(ProcessesToUpdate::Some(&[target]));
    system
        .process(target)
        .and_then(|p| p.kill_with(sysinfo::Signal::Term))
        .unwrap_or(false)
}

/// Forcibly kill a process by PID. Returns whether a kill was delivered.
pub fn kill_pid(pid: u32) -> bool {
    let target = Pid::from_u32(pid);
    let system = system_for(ProcessesToUpdate::Some(&[target]));
    match system.process(target) {
        Some(process) => {
            let killed = process.kill();
            if killed {
                info!("Killed PID {}", pid);
            }
            killed
        }
        None => false,
    }
}

/// Whether a process with this PID currently exists
pub fn is_process_running(pid: u32) -> bool {
    let target = Pid::from_u32(pid);
    system_for(ProcessesToUpdate::Some(&[target]))
        .process(target)
        .is_some()
}

/// Forcibly kill every process whose executable is `path`.
///
/// Never kills the calling process. Returns the number of processes killed.
pub fn kill_by_path(path: &Path) -> usize {
    let target = canonical(path);
    let own_pid = Pid::from_u32(std::process::id());
    let system = system_for(ProcessesToUpdate::All);

    let mut killed = 0;
    for (pid, process) in system.processes() {
        if *pid == own_pid {
            continue;
        }
        let Some(exe) = process.exe() else {
            continue;
        };
        if canonical(exe) == target && process.kill() {
            info!("Killed PID {} by path {}", pid, path.display());
            killed += 1;
        }
    }
    killed
}

fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unknown_pid() {
        // PIDs near u32::MAX are never allocated on Linux/macOS.
        assert!(!kill_pid(u32::MAX - 1));
        assert!(!is_process_running(u32::MAX - 1));
        assert!(!request_close(u32::MAX - 1).await);
    }

    #[test]
    fn test_kill_by_path_no_match() {
        assert_eq!(kill_by_path(Path::new("/no/such/executable")), 0);
    }

    #[tokio::test]
    async fn test_request_close_terminates_child() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(is_process_running(pid));

        assert!(request_close(pid).await);

        let mut exited = false;
        for _ in 0..50 {
            if child.try_wait().unwrap().is_some() {
                exited = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(exited);
    }
}
