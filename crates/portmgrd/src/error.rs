//! Error types for portmgrd

use thiserror::Error;

use crate::counter::CounterError;

/// Base of the numeric port error codes.
pub const PORT_BASE_ERR: i32 = -1000;

/// Errors returned by port registry operations.
///
/// Every variant maps to a small negative code (see [`PortError::code`]) so
/// API handlers can report the same `(code, message)` pair the dataplane
/// tooling expects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    /// Port (or the requested role transition) already exists
    #[error("port exists: {0}")]
    PortExists(String),

    /// No such port, or no such role on the port
    #[error("no such port: {0}")]
    NotExist(String),

    /// Named master port does not exist
    #[error("no such master: {0}")]
    NoMaster(String),

    /// Port number pool failure
    #[error("port number allocation failed: {0}")]
    CounterError(#[from] CounterError),

    /// Index maps disagree with the map of record
    #[error("port index inconsistent: {0}")]
    MapError(String),

    /// Zone does not exist or rejected the port
    #[error("zone invalid: {0}")]
    ZoneInvalid(String),

    /// Real device is missing or was not given
    #[error("no real device: {0}")]
    NoRealDev(String),
}

impl PortError {
    /// Numeric code for this error.
    pub fn code(&self) -> i32 {
        match self {
            PortError::PortExists(_) => PORT_BASE_ERR + 1,
            PortError::NotExist(_) => PORT_BASE_ERR + 2,
            PortError::NoMaster(_) => PORT_BASE_ERR + 3,
            PortError::CounterError(_) => PORT_BASE_ERR + 4,
            PortError::MapError(_) => PORT_BASE_ERR + 5,
            PortError::ZoneInvalid(_) => PORT_BASE_ERR + 6,
            PortError::NoRealDev(_) => PORT_BASE_ERR + 7,
        }
    }
}

/// Result type for port registry operations
pub type Result<T> = std::result::Result<T, PortError>;

/// Daemon-level errors (configuration, IO)
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Port operation failed while applying configuration
    #[error("Port error: {0}")]
    Port(#[from] PortError),
}
