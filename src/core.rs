//! Core wire types
//!
//! The string types of the IMAP wire grammar. Every type validates its
//! content on construction so that encoding can never produce an invalid
//! message.
//!
//! ```text
//!              ┌───────┐
//!              │IString│
//!              └┬─────┬┘
//!               │     │
//!         ┌─────▼─┐ ┌─▼────┐
//! ┌────┐  │Literal│ │Quoted│  ┌───┐
//! │Atom│  └───────┘ └──────┘  │Tag│
//! └────┘                      └───┘
//! ```

use std::{borrow::Borrow, fmt, str::from_utf8};

use thiserror::Error;

/// `atom-specials = "(" / ")" / "{" / SP / CTL / list-wildcards / quoted-specials / resp-specials`
pub(crate) fn is_atom_char(b: u8) -> bool {
    matches!(b, 0x21..=0x7e)
        && !matches!(
            b,
            b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\' | b']'
        )
}

/// `ASTRING-CHAR = ATOM-CHAR / resp-specials`
pub(crate) fn is_astring_char(b: u8) -> bool {
    is_atom_char(b) || b == b']'
}

/// `TEXT-CHAR = <any CHAR except CR and LF>`
pub(crate) fn is_text_char(b: u8) -> bool {
    matches!(b, 0x01..=0x09 | 0x0b..=0x0c | 0x0e..=0x7f)
}

/// `CHAR8 = %x01-ff` (any octet except NUL)
pub(crate) fn is_char8(b: u8) -> bool {
    b != 0x00
}

/// Escape `\` and `"` for use inside a quoted string.
pub(crate) fn escape_quoted(unescaped: &str) -> String {
    unescaped.replace('\\', "\\\\").replace('"', "\\\"")
}

/// An atom.
///
/// "An atom consists of one or more non-special characters." ([RFC 3501](https://www.rfc-editor.org/rfc/rfc3501.html))
#[derive(Debug, Clone, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct Atom(pub(crate) String);

impl Atom {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), AtomError> {
        let value = value.as_ref();

        if value.is_empty() {
            return Err(AtomError::Empty);
        }

        if let Some(position) = value.iter().position(|b| !is_atom_char(*b)) {
            return Err(AtomError::ByteNotAllowed {
                found: value[position],
                position,
            });
        }

        Ok(())
    }

    pub fn inner(&self) -> &str {
        self.0.as_ref()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<&str> for Atom {
    type Error = AtomError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Atom {
    type Error = AtomError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::verify(&value)?;

        Ok(Self(value))
    }
}

impl TryFrom<&[u8]> for Atom {
    type Error = AtomError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        // Safety: `unwrap` can't panic due to `verify`.
        Ok(Self(from_utf8(value).unwrap().to_owned()))
    }
}

impl AsRef<str> for Atom {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl Borrow<str> for Atom {
    fn borrow(&self) -> &str {
        self.0.as_ref()
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum AtomError {
    #[error("Must not be empty")]
    Empty,
    #[error("Invalid byte b'\\x{found:02x}' at index {position}")]
    ByteNotAllowed { found: u8, position: usize },
}

/// A command tag.
///
/// Tags are `ASTRING-CHAR`s except `+`, which is reserved for continuation
/// requests. Every command carries a tag that is unique while the command is
/// in flight; the matching completion reply repeats it.
#[derive(Debug, Clone, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct Tag(pub(crate) String);

impl Tag {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), TagError> {
        let value = value.as_ref();

        if value.is_empty() {
            return Err(TagError::Empty);
        }

        if let Some(position) = value
            .iter()
            .position(|b| !is_astring_char(*b) || *b == b'+')
        {
            return Err(TagError::ByteNotAllowed {
                found: value[position],
                position,
            });
        }

        Ok(())
    }

    pub fn inner(&self) -> &str {
        self.0.as_ref()
    }
}

impl TryFrom<&str> for Tag {
    type Error = TagError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Tag {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::verify(&value)?;

        Ok(Self(value))
    }
}

impl TryFrom<&[u8]> for Tag {
    type Error = TagError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        // Safety: `unwrap` can't panic due to `verify`.
        Ok(Self(from_utf8(value).unwrap().to_owned()))
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum TagError {
    #[error("Must not be empty")]
    Empty,
    #[error("Invalid byte b'\\x{found:02x}' at index {position}")]
    ByteNotAllowed { found: u8, position: usize },
}

/// A quoted string.
///
/// The inner value is stored unescaped; `"` and `\` are escaped during
/// encoding. Quoted strings can only carry `TEXT-CHAR`s, everything else
/// must be sent as a [`Literal`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Quoted(pub(crate) String);

impl Quoted {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), QuotedError> {
        let value = value.as_ref();

        if let Some(position) = value.iter().position(|b| !is_text_char(*b)) {
            return Err(QuotedError::ByteNotAllowed {
                found: value[position],
                position,
            });
        }

        Ok(())
    }

    pub fn inner(&self) -> &str {
        self.0.as_ref()
    }
}

impl TryFrom<&str> for Quoted {
    type Error = QuotedError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Quoted {
    type Error = QuotedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::verify(&value)?;

        Ok(Self(value))
    }
}

impl AsRef<str> for Quoted {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum QuotedError {
    #[error("Invalid byte b'\\x{found:02x}' at index {position}")]
    ByteNotAllowed { found: u8, position: usize },
}

/// A literal, i.e., a byte-counted string segment.
///
/// `{<byte-count>}<CRLF>` followed by exactly that many raw bytes. Used for
/// arbitrary or binary content that neither an atom nor a quoted string can
/// carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal(pub(crate) Vec<u8>);

impl Literal {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), LiteralError> {
        let value = value.as_ref();

        if let Some(position) = value.iter().position(|b| !is_char8(*b)) {
            return Err(LiteralError::ByteNotAllowed {
                found: value[position],
                position,
            });
        }

        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.0
    }

    pub fn into_data(self) -> Vec<u8> {
        self.0
    }
}

impl TryFrom<&[u8]> for Literal {
    type Error = LiteralError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<Vec<u8>> for Literal {
    type Error = LiteralError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::verify(&value)?;

        Ok(Self(value))
    }
}

impl TryFrom<&str> for Literal {
    type Error = LiteralError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value.as_bytes().to_owned()))
    }
}

impl AsRef<[u8]> for Literal {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum LiteralError {
    #[error("Invalid byte b'\\x{found:02x}' at index {position}")]
    ByteNotAllowed { found: u8, position: usize },
}

/// Either a quoted string or a literal.
///
/// Construction from a string picks the cheapest encoding that can represent
/// the value: quoted when every byte is a `TEXT-CHAR`, literal otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IString {
    Quoted(Quoted),
    Literal(Literal),
}

impl IString {
    /// Raw bytes of the value, without any quoting or length prefix.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Quoted(quoted) => quoted.inner().as_bytes(),
            Self::Literal(literal) => literal.data(),
        }
    }
}

impl TryFrom<&str> for IString {
    type Error = LiteralError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if let Ok(quoted) = Quoted::try_from(value) {
            return Ok(Self::Quoted(quoted));
        }

        Ok(Self::Literal(Literal::try_from(value)?))
    }
}

impl TryFrom<String> for IString {
    type Error = LiteralError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if Quoted::verify(&value).is_ok() {
            // Safety: `unwrap` can't panic due to `verify`.
            return Ok(Self::Quoted(Quoted::try_from(value).unwrap()));
        }

        Ok(Self::Literal(Literal::try_from(value.into_bytes())?))
    }
}

impl TryFrom<Vec<u8>> for IString {
    type Error = LiteralError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        match String::from_utf8(value) {
            Ok(string) => Self::try_from(string),
            Err(error) => Ok(Self::Literal(Literal::try_from(error.into_bytes())?)),
        }
    }
}

impl From<Quoted> for IString {
    fn from(value: Quoted) -> Self {
        Self::Quoted(value)
    }
}

impl From<Literal> for IString {
    fn from(value: Literal) -> Self {
        Self::Literal(value)
    }
}
