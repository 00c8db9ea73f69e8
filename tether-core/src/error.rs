// ABOUTME: Typed errors for caller misuse and channel failures.
// ABOUTME: Returned synchronously; none of these are ever sent across the channel.

use crate::connection::ConnectionStatus;
use thiserror::Error;

/// Errors surfaced by the session layer.
///
/// Caller-misuse variants (`NotConnected`, `Disposed`, `TaskInProgress`) are
/// returned before any state is touched.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot send '{action}' while connection is {status}")]
    NotConnected {
        action: String,
        status: ConnectionStatus,
    },

    #[error("connection was explicitly closed; create a new session to reconnect")]
    Disposed,

    #[error("task {task_id} is still {status}; wait for it to finish or stop it first")]
    TaskInProgress { task_id: String, status: String },

    #[error("invalid channel address: {0}")]
    InvalidAddress(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("session worker has shut down")]
    Closed,
}

impl SessionError {
    /// Whether this error is the caller's fault rather than the channel's
    pub fn is_caller_misuse(&self) -> bool {
        matches!(
            self,
            SessionError::NotConnected { .. }
                | SessionError::Disposed
                | SessionError::TaskInProgress { .. }
        )
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
