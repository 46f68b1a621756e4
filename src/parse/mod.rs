//! Parsers for the IMAP response grammar.
//!
//! All parsers are written against [RFC 3501](https://www.rfc-editor.org/rfc/rfc3501.html)
//! in streaming mode: they return `Incomplete` when more input is required.
//! The framing layer (see [`crate::codec`]) only invokes them on a complete
//! response unit, i.e., a logical line with all announced literals buffered,
//! so `Incomplete` never escapes to callers.

mod core;
mod response;

pub(crate) use response::response;
