//! Error types for the portclaim-core library.

use thiserror::Error;

/// Result type alias for portclaim operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while acquiring a port or launching a service.
///
/// Only [`Error::Spawn`] and configuration errors are meant to end a launch.
/// Everything else is captured by the reclaimer and the acquirer and folded
/// into the attempt log.
#[derive(Error, Debug)]
pub enum Error {
    /// A listening socket could not be bound. Expected; drives fallback.
    #[error("Cannot bind {address}:{port}: {reason}")]
    Bind {
        address: String,
        port: u16,
        reason: String,
    },

    /// An introspection facility (lsof, ss, /proc) is missing or unusable.
    #[error("Introspection unavailable ({facility}): {reason}")]
    IntrospectionUnavailable {
        facility: &'static str,
        reason: String,
    },

    /// A signal could not be delivered to one process.
    #[error("Failed to signal process {pid}: {reason}")]
    SignalDelivery { pid: u32, reason: String },

    /// The target process no longer exists.
    #[error("Process with PID {0} not found")]
    ProcessNotFound(u32),

    /// Permission denied for an operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Elevation was needed but is disabled or not present on this host.
    #[error("Elevated privilege unavailable: {0}")]
    ElevationUnavailable(String),

    /// The dependent service could not be started.
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to execute a system command.
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// Failed to parse command output.
    #[error("Failed to parse output: {0}")]
    ParseError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Platform not supported.
    #[error("Platform not supported: {0}")]
    UnsupportedPlatform(String),
}

impl Error {
    /// True for errors that mean "not allowed" rather than "went wrong".
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::PermissionDenied(_) | Error::ElevationUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ProcessNotFound(1234);
        assert!(err.to_string().contains("1234"));

        let err = Error::SignalDelivery {
            pid: 5678,
            reason: "boom".to_string(),
        };
        assert!(err.to_string().contains("5678"));
        assert!(err.to_string().contains("boom"));

        let err = Error::Bind {
            address: "127.0.0.1".to_string(),
            port: 80,
            reason: "Address already in use".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot bind 127.0.0.1:80: Address already in use"
        );
    }

    #[test]
    fn test_permission_classification() {
        assert!(Error::PermissionDenied("kill".into()).is_permission_denied());
        assert!(Error::ElevationUnavailable("no sudo".into()).is_permission_denied());
        assert!(!Error::ProcessNotFound(1).is_permission_denied());
    }
}
