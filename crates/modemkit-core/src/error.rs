//! Error handling for modemkit
//!
//! Provides error types for the two layers of the stack:
//! - Transport errors (status channel, modem link, worker lifecycle)
//! - Command errors (send API, transaction outcome)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Transport error type
///
/// Represents failures of the modem link, the status channel, and the
/// worker that drives them.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Could not reach the modem status service within the retry window
    #[error("Status channel unavailable at {path}: {reason}")]
    StatusChannelUnavailable {
        /// Path of the status service socket.
        path: String,
        /// The last connection failure observed.
        reason: String,
    },

    /// Could not open the modem device
    #[error("Failed to open modem device {path}: {reason}")]
    OpenFailed {
        /// Path of the modem device.
        path: String,
        /// The reason the device failed to open.
        reason: String,
    },

    /// Could not spawn the worker task
    #[error("Failed to spawn worker: {reason}")]
    WorkerSpawn {
        /// The reason the worker could not be spawned.
        reason: String,
    },

    /// The status service never reported a modem state during startup
    #[error("No modem status received within {secs}s")]
    NoStatusReceived {
        /// How long startup waited, in seconds.
        secs: u64,
    },

    /// The modem link closed underneath an operation
    #[error("Modem link closed")]
    LinkClosed,

    /// I/O error on a transport descriptor
    #[error("I/O error: {reason}")]
    Io {
        /// The underlying I/O failure.
        reason: String,
    },
}

/// Command error type
///
/// Represents errors surfaced by the send API to client callers.
#[derive(Error, Debug, Clone)]
pub enum CommandError {
    /// The manager has not been started
    #[error("Manager not started")]
    NotStarted,

    /// The manager is already running
    #[error("Manager already started")]
    AlreadyStarted,

    /// The modem transport listeners are not active
    #[error("Modem transport not ready")]
    NotReady,

    /// A synchronous command is already outstanding
    #[error("A synchronous command is already outstanding")]
    Busy,

    /// The transport rejected the command write
    #[error("Write rejected by transport: {reason}")]
    WriteError {
        /// The reason the write failed.
        reason: String,
    },

    /// No answer arrived within the caller's wait budget
    #[error("No answer within {timeout_ms}ms")]
    Timeout {
        /// The wait budget in milliseconds.
        timeout_ms: u64,
    },

    /// The manager stopped while the command was pending
    #[error("Command aborted")]
    Aborted,
}

/// Main error type for modemkit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Command error
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Command(CommandError::Timeout { .. })
                | Error::Transport(TransportError::NoStatusReceived { .. })
        )
    }

    /// Check if this is a transport error
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if the send API rejected the call because a synchronous
    /// command was already outstanding
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Command(CommandError::Busy))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
