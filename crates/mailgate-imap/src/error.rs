//! Error types for the IMAP library.

use std::time::Duration;

use thiserror::Error;

use crate::types::{ConnState, ResponseCode};

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Malformed wire data.
    #[error("Protocol error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Command issued in the wrong connection state.
    #[error("Command requires {required} state, connection is {current}")]
    BadState {
        /// Minimum state the command needs.
        required: ConnState,
        /// State the connection is in.
        current: ConnState,
    },

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned NO response.
    #[error("Server returned NO: {text}")]
    No {
        /// Response code, if any.
        code: Option<ResponseCode>,
        /// Server's reason, verbatim.
        text: String,
    },

    /// Server returned BAD response.
    #[error("Server returned BAD: {text}")]
    Bad {
        /// Response code, if any.
        code: Option<ResponseCode>,
        /// Server's reason, verbatim.
        text: String,
    },

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The connection is closed; every outstanding and future command fails
    /// with this error.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Creates a parse error.
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Returns true if the error means the connection is gone.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Bye(_))
    }

    /// Returns the response code of a NO or BAD completion.
    #[must_use]
    pub const fn code(&self) -> Option<&ResponseCode> {
        match self {
            Self::No { code, .. } | Self::Bad { code, .. } => code.as_ref(),
            _ => None,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let err = Error::No {
            code: Some(ResponseCode::NonExistent),
            text: "No such mailbox".into(),
        };
        assert_eq!(err.to_string(), "Server returned NO: No such mailbox");
        assert_eq!(err.code(), Some(&ResponseCode::NonExistent));

        let err = Error::BadState {
            required: ConnState::Selected,
            current: ConnState::NotAuthenticated,
        };
        assert_eq!(
            err.to_string(),
            "Command requires selected state, connection is not authenticated"
        );
    }

    #[test]
    fn closed() {
        assert!(Error::ConnectionClosed.is_closed());
        assert!(Error::Bye("shutting down".into()).is_closed());
        assert!(!Error::Protocol("x".into()).is_closed());
    }
}
