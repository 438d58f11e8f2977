//! # sidecar-core - Core Domain Types
//!
//! Foundation crate for sidecar. Provides the argument/configuration engine,
//! error handling, event definitions and the bounded output log.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, regex, tracing).
//!
//! ## Public API
//!
//! ### Arguments (`argument`)
//! - [`Argument`] - Typed, named value with validation rules and value mapping
//! - [`ArgumentType`] - Parsed type declaration (`int[0..10]`, `selection[a|b]`)
//!
//! ### Configuration (`configuration`)
//! - [`Configuration`] - Ordered arguments plus prefix/delimiter/raw rules
//! - [`RuntimeArguments`] - Per-invocation overrides
//! - [`split_command_line()`] - Turn a composed string back into argv tokens
//!
//! ### Events (`events`)
//! - [`AppEvent`] / [`AppEventKind`] - Notifications consumed by observers
//! - [`ProcessEvent`] - Raw child stdout/stderr/exit events
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`ArgumentError`] - Validation failure carrying the offending argument
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use sidecar_core::prelude::*;
//! ```

pub mod argument;
pub mod configuration;
pub mod error;
pub mod events;
pub mod logging;
pub mod output_log;
pub mod types;

/// Prelude for common imports used throughout all sidecar crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use argument::{Argument, ArgumentType, BaseType, TypeConstraint, BOOL_LITERALS};
pub use configuration::{quote, split_command_line, Configuration, RuntimeArguments};
pub use error::{
    ArgumentError, ArgumentErrorKind, Error, Result, ResultExt, ARGUMENT_ERROR_KEY,
};
pub use events::{AppEvent, AppEventKind, ProcessEvent};
pub use output_log::{OutputLog, MAX_APP_MONITOR_ENTRIES};
pub use types::{AppPhase, OutputStream, StartWindowState};
