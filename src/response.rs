//! Server responses
//!
//! The owned response model produced by the parser and handed to the
//! session: tagged completion replies, untagged data/status, and
//! continuation requests. ([RFC 3501](https://www.rfc-editor.org/rfc/rfc3501.html), section 7)

use std::{fmt, num::NonZeroU32};

use crate::{core::Atom, flag::Flag};

/// A single response unit read from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `<tag> SP <OK/NO/BAD> ...`, the completion result of a command.
    Tagged(TaggedResponse),
    /// `* ...`, server data or status not tied to a specific command.
    Untagged(UntaggedResponse),
    /// `+ ...`, the server accepts an incomplete command and is ready
    /// for the remainder.
    Continue(ContinueRequest),
}

/// Status of a tagged completion reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedStatus {
    /// The command completed successfully.
    Ok,
    /// The command was valid but the server refused it.
    No,
    /// The command was malformed or issued in the wrong state.
    Bad,
    /// A structurally invalid completion status. Receiving one is a
    /// protocol violation on the server's part.
    Other(Atom),
}

impl fmt::Display for TaggedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::No => f.write_str("NO"),
            Self::Bad => f.write_str("BAD"),
            Self::Other(atom) => write!(f, "{atom}"),
        }
    }
}

/// A tagged completion reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedResponse {
    pub tag: crate::core::Tag,
    pub status: TaggedStatus,
    pub code: Option<Code>,
    pub text: String,
}

impl fmt::Display for TaggedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.text)
    }
}

/// Condition of an untagged status response.
///
/// `PREAUTH` and `BYE` can only appear untagged; the greeting is simply the
/// first untagged status response on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Ok,
    No,
    Bad,
    PreAuth,
    Bye,
}

impl Condition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
            Self::PreAuth => "PREAUTH",
            Self::Bye => "BYE",
        }
    }
}

/// An untagged response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK [UNSEEN 12] Message 12 is first unseen`
    Status {
        condition: Condition,
        code: Option<Code>,
        text: String,
    },
    /// Server data, e.g., `* 172 EXISTS`.
    Data(Data),
}

/// A continuation request.
///
/// The text is the raw remainder of the line; for `AUTHENTICATE` it carries
/// the base64-encoded server challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinueRequest {
    pub text: String,
}

/// A response code, i.e., the bracketed part of `* OK [UIDNEXT 4392] ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Code {
    Alert,
    BadCharset,
    Capability(Vec<Capability>),
    Parse,
    PermanentFlags(Vec<Flag>),
    ReadOnly,
    ReadWrite,
    TryCreate,
    UidNext(NonZeroU32),
    UidValidity(NonZeroU32),
    Unseen(NonZeroU32),
    /// The previously selected mailbox was closed ([RFC 9051](https://www.rfc-editor.org/rfc/rfc9051.html), section 7.1).
    Closed,
    /// Any other code, carried opaquely.
    Other { name: Atom, text: Option<String> },
}

impl Code {
    /// The name under which code-carried data is recorded in the registry.
    pub fn name(&self) -> &str {
        match self {
            Self::Alert => "ALERT",
            Self::BadCharset => "BADCHARSET",
            Self::Capability(_) => "CAPABILITY",
            Self::Parse => "PARSE",
            Self::PermanentFlags(_) => "PERMANENTFLAGS",
            Self::ReadOnly => "READ-ONLY",
            Self::ReadWrite => "READ-WRITE",
            Self::TryCreate => "TRYCREATE",
            Self::UidNext(_) => "UIDNEXT",
            Self::UidValidity(_) => "UIDVALIDITY",
            Self::Unseen(_) => "UNSEEN",
            Self::Closed => "CLOSED",
            Self::Other { name, .. } => name.inner(),
        }
    }
}

/// A capability advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability(pub(crate) Atom);

impl Capability {
    pub fn inner(&self) -> &str {
        self.0.inner()
    }

    /// Case-insensitive comparison, as capability names are atoms.
    pub fn is(&self, name: &str) -> bool {
        self.0.inner().eq_ignore_ascii_case(name)
    }
}

impl From<Atom> for Capability {
    fn from(atom: Atom) -> Self {
        Self(atom)
    }
}

impl TryFrom<&str> for Capability {
    type Error = crate::core::AtomError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(Self(Atom::try_from(value)?))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload of an untagged data response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    /// `* CAPABILITY IMAP4rev1 STARTTLS AUTH=PLAIN`
    Capability(Vec<Capability>),
    /// `* LIST (\Noselect) "/" foo`
    List {
        attributes: Vec<Flag>,
        delimiter: Option<char>,
        mailbox: String,
    },
    /// `* FLAGS (\Answered \Flagged \Deleted \Seen \Draft)`
    Flags(Vec<Flag>),
    /// `* 172 EXISTS`
    Exists(u32),
    /// `* 1 RECENT`
    Recent(u32),
    /// `* 44 EXPUNGE`
    Expunge(NonZeroU32),
    /// `* SEARCH 2 84 882`
    Search(Vec<NonZeroU32>),
    /// `* 23 FETCH (FLAGS (\Seen) UID 447 RFC822.SIZE 44827)`
    Fetch {
        seq: NonZeroU32,
        items: Vec<FetchItem>,
    },
    /// Any other data line (`STATUS`, `NAMESPACE`, ...), carried opaquely
    /// under its leading name so it still reaches the registry.
    Other { name: String, raw: Vec<u8> },
}

impl Data {
    /// The name under which the payload is recorded in the registry.
    pub fn name(&self) -> &str {
        match self {
            Self::Capability(_) => "CAPABILITY",
            Self::List { .. } => "LIST",
            Self::Flags(_) => "FLAGS",
            Self::Exists(_) => "EXISTS",
            Self::Recent(_) => "RECENT",
            Self::Expunge(_) => "EXPUNGE",
            Self::Search(_) => "SEARCH",
            Self::Fetch { .. } => "FETCH",
            Self::Other { name, .. } => name,
        }
    }
}

/// A single data item within a FETCH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    Flags(Vec<Flag>),
    Uid(NonZeroU32),
    Rfc822Size(u32),
    /// `BODY[<section>]` (and `RFC822`/`RFC822.HEADER`/`RFC822.TEXT`)
    /// payload; `None` encodes NIL.
    Body {
        section: String,
        data: Option<Vec<u8>>,
    },
    /// Any other item (e.g., `INTERNALDATE`), carried opaquely.
    Other { name: String, raw: Vec<u8> },
}

/// What gets accumulated in the response registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseData {
    /// Payload of an untagged data response, keyed by [`Data::name`].
    Data(Data),
    /// A response code carried by a status response, keyed by [`Code::name`].
    Code(Code),
    /// An untagged status condition, keyed by [`Condition::name`].
    Condition { code: Option<Code>, text: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Tag;

    #[test]
    fn test_tagged_display() {
        let response = TaggedResponse {
            tag: Tag::try_from("A7").unwrap(),
            status: TaggedStatus::No,
            code: None,
            text: "Mailbox does not exist".into(),
        };

        assert_eq!(response.to_string(), "NO Mailbox does not exist");
    }

    #[test]
    fn test_capability_case_insensitive() {
        let capability = Capability::try_from("IMAP4rev1").unwrap();

        assert!(capability.is("imap4rev1"));
        assert!(capability.is("IMAP4REV1"));
        assert!(!capability.is("IMAP4"));
    }
}
