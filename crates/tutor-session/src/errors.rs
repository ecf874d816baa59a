//! Session error taxonomy.
//!
//! Every failure inside the session state machine is converted at its
//! boundary into a single observable [`SessionError`] on the state
//! snapshot, plus an error counter increment. Nothing here propagates
//! as a panic to the host.

use thiserror::Error;

/// User-visible session failure.
///
/// The `Display` string doubles as the short human-readable message
/// shown by the presentation layer. Deadline expiry deliberately has
/// no variant: running out the clock is a successful session and is
/// reported through the completion message instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Microphone capture was refused by the user or platform.
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    /// Ephemeral credential could not be obtained (transport failure
    /// or malformed response), after retries were exhausted.
    #[error("Could not fetch session credential: {0}")]
    CredentialFetch(String),

    /// SDP offer/answer exchange with the realtime endpoint failed,
    /// or the remote description could not be applied.
    #[error("Realtime negotiation failed: {0}")]
    Negotiation(String),

    /// Post-connect transport failure (ICE failure equivalent or
    /// control channel loss) that was not recovered by reconnection.
    #[error("Voice transport failed: {0}")]
    Transport(String),

    /// Mid-session credential refresh failed; the session cannot be
    /// kept alive past the credential lifetime.
    #[error("Session expired: {0}")]
    RefreshFailed(String),

    /// Bounded reconnection gave up.
    #[error("Connection failed after multiple attempts")]
    ReconnectExhausted,
}

/// Returned by handle methods when the session task is no longer
/// running (component torn down).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("session task has stopped")]
pub struct SessionGone;
