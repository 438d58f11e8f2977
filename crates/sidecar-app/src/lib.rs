//! sidecar-app - App runtime and acquisition for sidecar
//!
//! This crate implements the per-app lifecycle state machine
//! ([`AppRuntime`]), the download/extract/install pipeline, and loading of
//! `settings.toml` and the `apps.toml` catalog.

pub mod config;
pub mod runtime;

// Re-export primary types
pub use config::{AppCatalog, AppDefinition, AppKind, AutoRunPolicy, Settings};
pub use runtime::{AppPaths, AppRuntime, InstallOutcome, PipelineHandle, PipelineOutcome, RunOutcome};
