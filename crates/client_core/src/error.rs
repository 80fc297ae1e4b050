use thiserror::Error;

use crate::session::SessionState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("username must not be empty")]
    InvalidUsername,
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("failed to send envelope: {0}")]
    Send(String),
}
