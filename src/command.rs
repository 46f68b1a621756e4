//! Client commands and their wire encoding
//!
//! A [`Command`] is a tag, a command name, and a list of semantically typed
//! [`Argument`]s. Encoding produces a sequence of [`Fragment`]s rather than a
//! flat byte buffer: every synchronizing literal ends the current line
//! (`{<byte-count>}\r\n`) and the sender has to wait for a continuation
//! request before transmitting the literal bytes and the rest of the command.

use std::collections::VecDeque;

use thiserror::Error;

use crate::{
    core::{escape_quoted, is_text_char, Atom, AtomError, IString, Literal, LiteralError, Tag,
        TagError},
    sequence::{SequenceSet, SequenceSetError},
};

/// A command argument, encoded according to its semantic type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// An unquoted atom, e.g., a fetch macro such as `FULL`.
    Atom(Atom),
    /// A string, encoded quoted or as a literal depending on its content.
    String(IString),
    /// A plain number.
    Number(u32),
    /// A message sequence set, e.g., `1:5,42,99:*`.
    SequenceSet(SequenceSet),
    /// A parenthesized list of arguments.
    List(Vec<Argument>),
    /// Pre-encoded data, transmitted verbatim. Must not contain CR or LF.
    Raw(String),
}

impl Argument {
    pub fn atom(value: &str) -> Result<Self, EncodeError> {
        Ok(Self::Atom(Atom::try_from(value)?))
    }

    pub fn string(value: impl Into<String>) -> Result<Self, EncodeError> {
        Ok(Self::String(IString::try_from(value.into())?))
    }

    /// Binary content, always sent as a literal.
    pub fn literal(value: Vec<u8>) -> Result<Self, EncodeError> {
        Ok(Self::String(IString::Literal(Literal::try_from(value)?)))
    }

    pub fn sequence_set(value: &str) -> Result<Self, EncodeError> {
        Ok(Self::SequenceSet(SequenceSet::try_from(value)?))
    }

    pub fn raw(value: impl Into<String>) -> Result<Self, EncodeError> {
        let value = value.into();

        if let Some(position) = value.bytes().position(|b| !is_text_char(b)) {
            return Err(EncodeError::RawByteNotAllowed {
                found: value.as_bytes()[position],
                position,
            });
        }

        Ok(Self::Raw(value))
    }

    fn encode(&self, buffer: &mut FragmentBuffer) {
        match self {
            Self::Atom(atom) => buffer.push_str(atom.inner()),
            Self::String(IString::Quoted(quoted)) => {
                buffer.push_str("\"");
                buffer.push_str(&escape_quoted(quoted.inner()));
                buffer.push_str("\"");
            }
            Self::String(IString::Literal(literal)) => buffer.push_literal(literal.data()),
            Self::Number(number) => buffer.push_str(&number.to_string()),
            Self::SequenceSet(set) => buffer.push_str(&set.to_string()),
            Self::List(items) => {
                buffer.push_str("(");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        buffer.push_str(" ");
                    }
                    item.encode(buffer);
                }
                buffer.push_str(")");
            }
            Self::Raw(raw) => buffer.push_str(raw),
        }
    }
}

/// A client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub tag: Tag,
    pub name: Atom,
    pub args: Vec<Argument>,
}

impl Command {
    pub fn new(tag: Tag, name: &str, args: Vec<Argument>) -> Result<Self, EncodeError> {
        Ok(Self {
            tag,
            name: Atom::try_from(name)?,
            args,
        })
    }

    /// Encode the command into wire fragments.
    ///
    /// The final fragment is always a [`Fragment::Line`] terminated by CRLF.
    pub fn encode(&self) -> Encoded {
        let mut buffer = FragmentBuffer::default();

        buffer.push_str(self.tag.inner());
        buffer.push_str(" ");
        buffer.push_str(self.name.inner());

        for arg in &self.args {
            buffer.push_str(" ");
            arg.encode(&mut buffer);
        }

        buffer.finish()
    }
}

/// The encoding of a message in fragments.
///
/// Fragments are the unit of transmission: lines can be sent right away,
/// literal data only after the server sent a continuation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    fragments: VecDeque<Fragment>,
}

impl Encoded {
    /// Dump the whole encoding, ignoring the continuation handshake.
    ///
    /// Only useful for logging and tests.
    pub fn dump(self) -> Vec<u8> {
        let mut out = Vec::new();

        for fragment in self.fragments {
            match fragment {
                Fragment::Line { data } => out.extend_from_slice(&data),
                Fragment::Literal { data } => out.extend_from_slice(&data),
            }
        }

        out
    }
}

impl Iterator for Encoded {
    type Item = Fragment;

    fn next(&mut self) -> Option<Self::Item> {
        self.fragments.pop_front()
    }
}

/// The smallest unit of transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// A line that is ready to be sent, including the trailing CRLF (or
    /// `{<byte-count>}\r\n` when a literal follows).
    Line { data: Vec<u8> },
    /// Literal bytes that may only be sent after a continuation request.
    Literal { data: Vec<u8> },
}

#[derive(Debug, Default)]
struct FragmentBuffer {
    fragments: Vec<Fragment>,
    line: Vec<u8>,
}

impl FragmentBuffer {
    fn push_str(&mut self, data: &str) {
        self.line.extend_from_slice(data.as_bytes());
    }

    fn push_literal(&mut self, data: &[u8]) {
        self.line
            .extend_from_slice(format!("{{{}}}\r\n", data.len()).as_bytes());
        self.fragments.push(Fragment::Line {
            data: std::mem::take(&mut self.line),
        });
        self.fragments.push(Fragment::Literal {
            data: data.to_vec(),
        });
    }

    fn finish(mut self) -> Encoded {
        self.line.extend_from_slice(b"\r\n");
        self.fragments.push(Fragment::Line { data: self.line });

        Encoded {
            fragments: self.fragments.into(),
        }
    }
}

/// An argument (or command) could not be represented on the wire.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum EncodeError {
    #[error(transparent)]
    Atom(#[from] AtomError),
    #[error(transparent)]
    Tag(#[from] TagError),
    #[error(transparent)]
    String(#[from] LiteralError),
    #[error(transparent)]
    SequenceSet(#[from] SequenceSetError),
    #[error("Invalid byte b'\\x{found:02x}' at index {position} in raw argument")]
    RawByteNotAllowed { found: u8, position: usize },
}
