//! Custom error types for the lab bench.
//!
//! `LabError` is the single error type shared by the transport, the protocol
//! codec and the instrument controllers. It is built with `thiserror`, so
//! underlying errors convert with `?` where a `#[from]` is declared.
//!
//! ## Error Hierarchy
//!
//! - **Connection errors** (`TransportUnavailable`, `PortNotFound`,
//!   `PermissionDenied`, `OpenFailed`): raised by `connect()`. All of them can be
//!   retried, `TransportUnavailable` only on a host that has a serial stack.
//! - **`NotConnected`**: a send was attempted without an open channel. This is a
//!   caller error and is never retried.
//! - **Channel errors** (`WriteFailure`, `ReadFailure`): I/O failed on an open
//!   channel. The transport tears the connection down before surfacing them.
//! - **Configuration errors** (`Config`, `Configuration`): loading or validating
//!   the figment configuration.
//!
//! The simulation engine never produces errors.

use thiserror::Error;

/// Convenience alias for results using the lab error type.
pub type AppResult<T> = std::result::Result<T, LabError>;

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum LabError {
    #[error("Serial transport is not available on this host")]
    TransportUnavailable,

    #[error("No serial port selected")]
    PortNotFound,

    #[error("Access to serial port '{0}' was refused")]
    PermissionDenied(String),

    #[error("Failed to open serial port '{port}': {reason}")]
    OpenFailed { port: String, reason: String },

    #[error("Serial port not connected")]
    NotConnected,

    #[error("Serial write failed: {0}")]
    WriteFailure(String),

    #[error("Serial read failed: {0}")]
    ReadFailure(String),

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LabError {
    /// Whether retrying the failed operation can succeed without a code change.
    pub fn is_recoverable(&self) -> bool {
        match self {
            LabError::TransportUnavailable
            | LabError::PortNotFound
            | LabError::PermissionDenied(_)
            | LabError::OpenFailed { .. }
            | LabError::WriteFailure(_)
            | LabError::ReadFailure(_) => true,
            LabError::NotConnected
            | LabError::SerialFeatureDisabled
            | LabError::Config(_)
            | LabError::Configuration(_)
            | LabError::Io(_) => false,
        }
    }

    /// Whether the error was raised on an open channel and ended the connection.
    pub fn tears_down_connection(&self) -> bool {
        matches!(self, LabError::WriteFailure(_) | LabError::ReadFailure(_))
    }
}

impl From<figment::Error> for LabError {
    fn from(value: figment::Error) -> Self {
        LabError::Config(Box::new(value))
    }
}
