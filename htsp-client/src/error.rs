//! Client error types.

use htsp_protocol::{EncodeError, ProtocolError};
use std::time::Duration;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("could not resolve address: {0}")]
    Resolve(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("initial sync not completed within {0:?}")]
    SyncTimeout(Duration),

    #[error("authentication rejected by server")]
    AuthFailed,

    #[error("server error in {method}: {message}")]
    Server { method: String, message: String },
}

impl ClientError {
    /// Returns whether the connection can still be used after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout(_) | ClientError::Encode(_) | ClientError::Server { .. }
        )
    }
}

/// Misuse of a [`Gate`](crate::gate::Gate).
///
/// These indicate a programming error in the caller, not a runtime condition
/// to recover from.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("release without a matching acquire")]
    NotHeld,

    #[error("release from a thread that does not own the gate")]
    NotOwner,

    #[error("gate still held ({holds} holds) after {waited:?}")]
    Starved { holds: usize, waited: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(ClientError::Timeout(Duration::from_secs(5)).is_recoverable());
        assert!(ClientError::Encode(EncodeError::NameTooLong(300)).is_recoverable());
        assert!(ClientError::Server {
            method: "deleteDvrEntry".into(),
            message: "Invalid id".into(),
        }
        .is_recoverable());

        assert!(!ClientError::ConnectionClosed.is_recoverable());
        assert!(!ClientError::AuthFailed.is_recoverable());
        assert!(!ClientError::SyncTimeout(Duration::from_secs(5)).is_recoverable());
        assert!(!ClientError::Protocol(ProtocolError::UnknownFieldType(7)).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));

        let err = ClientError::Server {
            method: "deleteDvrEntry".into(),
            message: "Invalid id".into(),
        };
        assert_eq!(err.to_string(), "server error in deleteDvrEntry: Invalid id");

        let err = GateError::Starved {
            holds: 2,
            waited: Duration::from_millis(50),
        };
        assert!(err.to_string().contains("2 holds"));
    }
}
