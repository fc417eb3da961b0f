// error.rs - Error taxonomy for the RADIUS client engine
//
// Every failure class from the transaction path funnels through this single
// enum so callers can match on variants instead of parsing strings.

use thiserror::Error;

/// Errors produced while building, sending, or validating a RADIUS
/// transaction.
#[derive(Debug, Error)]
pub enum RadiusError {
    /// The request bundle named an empty server.
    #[error("server name must not be empty")]
    EmptyServerName,

    /// The server name could not be resolved against the configured table.
    #[error("unknown RADIUS server: {0}")]
    ServerNotFound(String),

    /// Switching into (or back out of) the configured network namespace failed.
    #[error("namespace {namespace} operation failed: {reason}")]
    Namespace {
        namespace: String,
        reason: String,
    },

    /// A socket, send, or receive operation failed for a reason other than
    /// interruption or unreachability.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// sendto() reported the destination network as unreachable.
    #[error("network unreachable")]
    NetworkUnreachable,

    /// The transport hook's lock/unlock pair failed.
    #[error("transport lock error: {0}")]
    Lock(String),

    /// A reply arrived whose id did not match the expected sequence number.
    /// Internal to the retry engine; never escapes to the orchestrator.
    #[error("reply id mismatch")]
    BadResponseId,

    /// A reply's response-authenticator digest did not match.
    #[error("reply digest mismatch")]
    BadResponseDigest,

    /// A reply's declared length was outside [20, 4096] or exceeded the
    /// received datagram.
    #[error("reply has invalid length")]
    BadResponseLength,

    /// A reply's attribute section failed the bounds-checked walk.
    #[error("reply attribute structure is invalid: {0}")]
    BadResponseStructure(String),

    /// A reply carried an unrecognized or unexpected RADIUS code.
    #[error("reply carried unexpected code: {0}")]
    BadResponseCode(u8),

    /// No valid reply arrived within `retry_max + 1` send attempts.
    #[error("timed out waiting for RADIUS reply")]
    Timeout,

    /// An attribute referenced a name or encoding the encoder does not know.
    #[error("attribute encoding error: {0}")]
    Encoding(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RadiusError>;
