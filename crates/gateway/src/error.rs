//! Gateway error types.

use thiserror::Error;

use crate::session::SessionId;

/// Gateway error type.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Token validation failed.
    #[error("auth error: {0}")]
    Auth(#[from] auth::AuthError),

    /// The session's egress queue had no room for a system frame; the
    /// session must be drained.
    #[error("egress queue full for session {0}")]
    EgressFull(SessionId),

    /// The session is no longer registered with the hub.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
