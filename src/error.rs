//! Session error taxonomy

use std::io::Error as IoError;

use thiserror::Error;

use crate::{codec::ResponseCodecError, command::EncodeError, response::TaggedResponse};

/// Everything that can go wrong while talking to a server.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying transport failed.
    #[error(transparent)]
    Transport(#[from] IoError),

    /// A command could not be represented on the wire.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The server completed the command with `NO`: the command was valid
    /// but refused. The connection stays usable.
    #[error("Command rejected: {0}")]
    CommandRejected(TaggedResponse),

    /// The server completed the command with `BAD`: it considers the
    /// command malformed or inappropriate. The connection stays usable.
    #[error("Protocol violation reported by server: {0}")]
    ProtocolViolation(TaggedResponse),

    /// A tagged response carried a status other than OK/NO/BAD. The
    /// connection is torn down, as command correlation can no longer be
    /// trusted.
    #[error("Invalid tagged response: {0}")]
    InvalidTaggedResponse(String),

    /// The server closed the connection (or sent an unsolicited `BYE`)
    /// while commands were outstanding.
    #[error("Connection closed unexpectedly: {0}")]
    UnexpectedDisconnect(String),

    /// A response unit could not be framed; the stream is out of sync.
    #[error(transparent)]
    Codec(#[from] ResponseCodecError),

    /// The server sent a response unit larger than
    /// [`crate::SessionConfig::max_response_size`]. Connection-fatal, as
    /// the unit cannot be skipped without losing synchronization.
    #[error("Response exceeds the configured maximum of {max_response_size} bytes")]
    ResponseTooLarge { max_response_size: u32 },

    /// The session has reached the logout state; no further commands can
    /// be issued.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// The server's greeting was `BYE`, i.e., it refused the connection.
    #[error("Connection refused by server: {0}")]
    ConnectionRefused(String),

    /// The greeting did not arrive within the configured open timeout.
    #[error("No greeting within the open timeout")]
    GreetingTimeout,
}

/// A connection-fatal failure, recorded once by the receiver loop and
/// replayed to every caller that is blocked on (or later asks for) a tagged
/// response.
///
/// This is the cloneable subset of [`Error`]; transport errors are demoted
/// to their [`std::io::ErrorKind`] plus message so that the value can be
/// handed to multiple waiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FatalError {
    Transport(std::io::ErrorKind, String),
    UnexpectedDisconnect(String),
    InvalidTaggedResponse(String),
    ResponseTooLarge { max_response_size: u32 },
    OutOfSync(String),
}

impl FatalError {
    pub(crate) fn transport(error: &IoError) -> Self {
        Self::Transport(error.kind(), error.to_string())
    }
}

impl From<FatalError> for Error {
    fn from(fatal: FatalError) -> Self {
        match fatal {
            FatalError::Transport(kind, message) => {
                Error::Transport(IoError::new(kind, message))
            }
            FatalError::UnexpectedDisconnect(message) => Error::UnexpectedDisconnect(message),
            FatalError::InvalidTaggedResponse(message) => Error::InvalidTaggedResponse(message),
            FatalError::ResponseTooLarge { max_response_size } => {
                Error::ResponseTooLarge { max_response_size }
            }
            FatalError::OutOfSync(message) => Error::UnexpectedDisconnect(message),
        }
    }
}
