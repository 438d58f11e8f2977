//! sidecar library
//!
//! Host wiring and headless output for the `sidecar` binary. The engine
//! lives in the workspace crates:
//!
//! - [`sidecar_core`] - arguments, configuration composition, events, errors
//! - [`sidecar_daemon`] - processes, downloads, archives, installers
//! - [`sidecar_app`] - app runtime state machine, acquisition pipeline, config files

pub mod headless;
pub mod host;

pub use host::Host;
