//! # sidecar-daemon - OS and Network Plumbing
//!
//! Spawns and supervises companion processes, terminates them by PID or
//! executable path, and fetches, extracts and installs downloaded artifacts.
//!
//! Depends on [`sidecar_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Process Management
//! - [`LaunchSpec`] - Program, argv, working directory, elevation, window state
//! - [`AppProcess`] - Spawn a child and forward its output as [`ProcessEvent`]s
//! - [`request_close()`], [`kill_pid()`], [`kill_by_path()`] - Termination helpers
//! - [`open_target()`] - Hand a URI to the OS default handler
//!
//! ### Acquisition
//! - [`ArtifactFetcher`] - Remote size probe and streamed download
//! - [`ArchiveKind`], [`extract()`] - Zip / tar.gz / gzip extraction
//! - [`InstallerCommand`] - Run a native installer unattended
//! - [`make_executable()`] - `chmod +x` fix-up
//!
//! [`ProcessEvent`]: sidecar_core::ProcessEvent

pub mod download;
pub mod extract;
pub mod installer;
pub mod launch;
pub mod permissions;
pub mod process;
pub mod terminate;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use download::{artifact_file_name, ArtifactFetcher, DownloadProgress};
pub use extract::{extract, extract_async, ArchiveKind};
pub use installer::InstallerCommand;
pub use launch::{is_uri, open_target, resolve_program, LaunchSpec};
pub use permissions::make_executable;
pub use process::AppProcess;
pub use terminate::{is_process_running, kill_by_path, kill_pid, request_close};
