//! Application error types with rich context

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::argument::Argument;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Key every argument validation error message starts with.
///
/// Consumers match on this to route a "configuration required" notification
/// instead of treating the failure as fatal.
pub const ARGUMENT_ERROR_KEY: &str = "ARGUMENT_ERROR";

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Argument Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid type '{spec}' for argument '{name}': {reason}")]
    InvalidArgumentType {
        name: String,
        spec: String,
        reason: String,
    },

    #[error("Invalid condition '{condition}' on argument '{name}', expected 'other=value'")]
    InvalidCondition { name: String, condition: String },

    #[error("Unknown argument: {name}")]
    UnknownArgument { name: String },

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    // ─────────────────────────────────────────────────────────────
    // Process Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Executable not found for app '{app}'")]
    ExecutableNotFound { app: String },

    #[error("App '{app}' is not runnable")]
    NotRunnable { app: String },

    #[error("Failed to spawn process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("Process error: {message}")]
    Process { message: String },

    // ─────────────────────────────────────────────────────────────
    // Acquisition Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Download failed: {message}")]
    Download { message: String },

    #[error("Failed to extract archive {path}: {message}")]
    Extract { path: PathBuf, message: String },

    #[error("Installer not found: {path}")]
    InstallerNotFound { path: PathBuf },

    #[error("Installer exited with code: {code:?}")]
    InstallerExit { code: Option<i32> },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("Unknown app: {name}")]
    UnknownApp { name: String },
}

// ─────────────────────────────────────────────────────────────────
// Argument Validation Errors
// ─────────────────────────────────────────────────────────────────

/// Why an argument value was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentErrorKind {
    /// Value is empty but the argument is required
    Required,
    /// Value does not parse as the argument's base type
    InvalidFormat,
    /// Value (or its length, for strings) is outside the declared bounds
    OutOfRange { low: f64, high: f64 },
    /// Value is not one of the selection literals
    NotInSelection { choices: Vec<String> },
}

/// A validation failure, carrying the offending argument for UI correlation.
#[derive(Debug, Clone)]
pub struct ArgumentError {
    pub argument: Box<Argument>,
    pub kind: ArgumentErrorKind,
}

impl ArgumentError {
    pub fn new(argument: &Argument, kind: ArgumentErrorKind) -> Self {
        Self {
            argument: Box::new(argument.clone()),
            kind,
        }
    }

    /// Human-readable description without the routing key
    pub fn message(&self) -> String {
        let name = self.argument.display_name();
        let value = self.argument.value.as_deref().unwrap_or_default();
        match &self.kind {
            ArgumentErrorKind::Required => format!("'{}' is required", name),
            ArgumentErrorKind::InvalidFormat => format!(
                "'{}' is not a valid {} value for '{}'",
                value,
                self.argument.arg_type.base(),
                name
            ),
            ArgumentErrorKind::OutOfRange { low, high } => format!(
                "'{}' for '{}' must be within [{}..{}]",
                value, name, low, high
            ),
            ArgumentErrorKind::NotInSelection { choices } => format!(
                "'{}' for '{}' must be one of: {}",
                value,
                name,
                choices.join(", ")
            ),
        }
    }
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", ARGUMENT_ERROR_KEY, self.message())
    }
}

impl std::error::Error for ArgumentError {}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::Download {
            message: message.into(),
        }
    }

    pub fn extract(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extract {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    pub fn executable_not_found(app: impl Into<String>) -> Self {
        Self::ExecutableNotFound { app: app.into() }
    }

    /// The argument that failed validation, if this is a validation error
    pub fn argument_error(&self) -> Option<&ArgumentError> {
        match self {
            Error::Argument(e) => Some(e),
            _ => None,
        }
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Argument(_)
                | Error::Download { .. }
                | Error::Extract { .. }
                | Error::InstallerNotFound { .. }
                | Error::InstallerExit { .. }
        )
    }

    /// Check if this error should abort catalog loading / the host
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgumentType { .. }
                | Error::InvalidCondition { .. }
                | Error::ConfigInvalid { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_argument() -> Argument {
        Argument::new("T", "int[0..10]").unwrap().with_value("15")
    }

    #[test]
    fn test_error_display_messages() {
        let err = Error::download("connection reset");
        assert_eq!(err.to_string(), "Download failed: connection reset");

        let err = Error::executable_not_found("bridge");
        assert!(err.to_string().contains("bridge"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_argument_error_carries_key_and_argument() {
        let arg = test_argument();
        let err: Error = ArgumentError::new(&arg, ArgumentErrorKind::OutOfRange { low: 0.0, high: 10.0 })
            .into();

        assert!(err.to_string().starts_with(ARGUMENT_ERROR_KEY));
        let attached = err.argument_error().expect("argument error");
        assert_eq!(attached.argument.name, "T");
    }

    #[test]
    fn test_error_is_fatal() {
        let err = Error::InvalidArgumentType {
            name: "x".into(),
            spec: "num".into(),
            reason: "unknown base type".into(),
        };
        assert!(err.is_fatal());
        assert!(!Error::download("test").is_fatal());
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(Error::download("test").is_recoverable());
        assert!(Error::InstallerExit { code: Some(1) }.is_recoverable());
        let arg = test_argument();
        assert!(Error::from(ArgumentError::new(&arg, ArgumentErrorKind::Required)).is_recoverable());
        assert!(!Error::process("spawn").is_recoverable());
    }

    #[test]
    fn test_required_message_uses_display_name() {
        let arg = Argument::new("port", "int")
            .unwrap()
            .with_human_name("Listen port");
        let err = ArgumentError::new(&arg, ArgumentErrorKind::Required);
        assert_eq!(err.message(), "'Listen port' is required");
    }
}
