//! # IMAP Client Session Library
//!
//! imap-session is a protocol engine for [IMAP4rev1](https://tools.ietf.org/html/rfc3501)
//! clients: wire encoding and parsing, response framing, and a concurrent
//! [`Session`] that correlates commands with their tagged completions. It is
//! transport-agnostic: anything implementing [`tokio::io::AsyncRead`] +
//! [`tokio::io::AsyncWrite`] works, so TLS (and STARTTLS upgrades) stay the
//! embedder's concern.
//!
//! ## Example
//!
//! ```rust,no_run
//! use imap_session::{Session, SessionConfig};
//!
//! # async fn example() -> Result<(), imap_session::Error> {
//! # let transport = tokio::net::TcpStream::connect("imap.example.org:143").await?;
//! let session = Session::connect(transport, SessionConfig::default()).await?;
//!
//! session.login("alice", "pa55w0rd").await?;
//! session.select("INBOX").await?;
//!
//! let unseen = session.search("UNSEEN").await?;
//! println!("{} unseen messages", unseen.len());
//!
//! session.logout().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! A [`Session`] is cheap to clone and every clone may issue commands
//! concurrently; commands are pipelined and each caller is woken exactly
//! when its own tagged completion arrives. A dedicated receiver task is the
//! only reader of the transport. Unsolicited server data is accumulated in a
//! per-name registry (see [`Session::responses`]) or can be observed live
//! through a response handler.
//!
//! ## Literals
//!
//! IMAP literals make separating the wire from the application difficult.
//! When a command carries a literal (e.g. a password that cannot be
//! quoted), the client announces it (`{42}`), waits for a continuation
//! request (`+ ...`), and only then sends the bytes. [`Command::encode`]
//! therefore yields [`Fragment`]s instead of a flat buffer; the session
//! drives the continuation handshake internally.
//!
//! # Features
//!
//! |Feature           |Description                                          |Enabled by default|
//! |------------------|-----------------------------------------------------|------------------|
//! |quirk_crlf_relaxed|Accept bare `\n` line endings from broken servers    |No                |

mod codec;
mod command;
mod config;
mod core;
mod error;
mod flag;
mod framing;
mod parse;
mod registry;
mod response;
mod sequence;
mod session;
mod state;

pub use codec::{ResponseCodec, ResponseCodecError};
pub use command::{Argument, Command, Encoded, EncodeError, Fragment};
pub use config::SessionConfig;
pub use core::{
    Atom, AtomError, IString, Literal, LiteralError, Quoted, QuotedError, Tag, TagError,
};
pub use error::Error;
pub use flag::Flag;
pub use framing::FramingError;
pub use registry::ResponseRegistry;
pub use response::{
    Capability, Code, Condition, ContinueRequest, Data, FetchItem, Response, ResponseData,
    TaggedResponse, TaggedStatus, UntaggedResponse,
};
pub use sequence::{SeqOrUid, Sequence, SequenceSet, SequenceSetError};
pub use session::{HandlerId, Session};
pub use state::ConnectionState;
