//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // External Tool Errors
    // ─────────────────────────────────────────────────────────────
    #[error("{tool} command not found. Ensure '{tool}' is in your PATH.")]
    ToolNotFound { tool: String },

    #[error("Device discovery unavailable: {reason}")]
    DiscoveryUnavailable { reason: String },

    #[error("Malformed device list line: {line:?}")]
    MalformedDeviceList { line: String },

    #[error("Failed to spawn process: {reason}")]
    SpawnFailed { reason: String },

    #[error("Process exited unexpectedly with code: {code:?}")]
    ProcessDied { code: Option<i32> },

    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    // ─────────────────────────────────────────────────────────────
    // Lifecycle Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Device {device} is busy with another operation")]
    Busy { device: String },

    #[error("Cannot {operation} device {device} while {from}")]
    InvalidTransition {
        device: String,
        from: String,
        operation: String,
    },

    #[error("Unknown device: {device}")]
    UnknownDevice { device: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    pub fn discovery_unavailable(reason: impl Into<String>) -> Self {
        Self::DiscoveryUnavailable {
            reason: reason.into(),
        }
    }

    pub fn malformed_device_list(line: impl Into<String>) -> Self {
        Self::MalformedDeviceList { line: line.into() }
    }

    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, millis: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            millis,
        }
    }

    pub fn busy(device: impl Into<String>) -> Self {
        Self::Busy {
            device: device.into(),
        }
    }

    pub fn invalid_transition(
        device: impl Into<String>,
        from: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            device: device.into(),
            from: from.into(),
            operation: operation.into(),
        }
    }

    pub fn unknown_device(device: impl Into<String>) -> Self {
        Self::UnknownDevice {
            device: device.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error
    ///
    /// Recoverable errors leave the device in a stable state; the caller may
    /// simply retry (or wait for the next discovery poll).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::DiscoveryUnavailable { .. }
                | Error::MalformedDeviceList { .. }
                | Error::Busy { .. }
                | Error::SpawnFailed { .. }
                | Error::ProcessDied { .. }
                | Error::Timeout { .. }
        )
    }

    /// Check if this error should be surfaced as a persistent startup error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ToolNotFound { .. })
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions (for use with color-eyre)
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

    #[test]
    fn test_error_display_messages() {
        let err = Error::tool_not_found("adb");
        assert!(err.to_string().contains("adb command not found"));

        let err = Error::busy("emulator-5554");
        assert_eq!(
            err.to_string(),
            "Device emulator-5554 is busy with another operation"
        );

        let err = Error::invalid_transition("abc", "idle", "stop recording");
        assert_eq!(err.to_string(), "Cannot stop recording device abc while idle");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(Error::tool_not_found("scrcpy").is_fatal());
        assert!(!Error::discovery_unavailable("timeout").is_fatal());
        assert!(!Error::busy("abc").is_fatal());
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(Error::discovery_unavailable("adb hung").is_recoverable());
        assert!(Error::busy("abc").is_recoverable());
        assert!(Error::spawn_failed("boom").is_recoverable());
        assert!(Error::ProcessDied { code: Some(1) }.is_recoverable());
        assert!(!Error::tool_not_found("adb").is_recoverable());
        assert!(!Error::unknown_device("abc").is_recoverable());
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout("adb devices", 5000);
        assert_eq!(err.to_string(), "adb devices timed out after 5000ms");
    }

    #[test]
    fn test_context_preserves_variant() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.context("writing screenshot").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
