//! Message flags

use std::fmt;

use crate::core::Atom;

/// `flag = "\Answered" / "\Flagged" / "\Deleted" / "\Seen" / "\Draft" / flag-keyword / flag-extension`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Seen,
    /// `\Recent` may only be set by the server.
    Recent,
    /// `flag-keyword = atom`
    Keyword(Atom),
    /// `flag-extension = "\" atom`
    ///
    /// "Future expansion. Client implementations MUST accept flag-extension
    /// flags." ([RFC 3501](https://www.rfc-editor.org/rfc/rfc3501.html))
    Extension(Atom),
    /// `\*` inside `PERMANENTFLAGS`, i.e., the client may create keywords.
    Permanent,
}

impl Flag {
    pub fn system(atom: &Atom) -> Option<Self> {
        match atom.inner() {
            value if value.eq_ignore_ascii_case("Answered") => Some(Self::Answered),
            value if value.eq_ignore_ascii_case("Deleted") => Some(Self::Deleted),
            value if value.eq_ignore_ascii_case("Draft") => Some(Self::Draft),
            value if value.eq_ignore_ascii_case("Flagged") => Some(Self::Flagged),
            value if value.eq_ignore_ascii_case("Seen") => Some(Self::Seen),
            value if value.eq_ignore_ascii_case("Recent") => Some(Self::Recent),
            _ => None,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Answered => f.write_str("\\Answered"),
            Self::Deleted => f.write_str("\\Deleted"),
            Self::Draft => f.write_str("\\Draft"),
            Self::Flagged => f.write_str("\\Flagged"),
            Self::Seen => f.write_str("\\Seen"),
            Self::Recent => f.write_str("\\Recent"),
            Self::Keyword(atom) => write!(f, "{atom}"),
            Self::Extension(atom) => write!(f, "\\{atom}"),
            Self::Permanent => f.write_str("\\*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let tests = [
            (Flag::Seen, "\\Seen"),
            (Flag::Answered, "\\Answered"),
            (
                Flag::Keyword(Atom::try_from("$Forwarded").unwrap()),
                "$Forwarded",
            ),
            (
                Flag::Extension(Atom::try_from("MDNSent").unwrap()),
                "\\MDNSent",
            ),
            (Flag::Permanent, "\\*"),
        ];

        for (test, expected) in tests {
            assert_eq!(expected, test.to_string());
        }
    }
}
