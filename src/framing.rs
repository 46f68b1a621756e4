//! Response framing
//!
//! All interactions transmitted by client and server are in the form of
//! lines, that is, strings that end with a CRLF. A line announcing a literal
//! ends with `{<byte-count>}\r\n`; the literal bytes and the continuation of
//! the line follow. A *response unit* is a line plus all of its literals.

use thiserror::Error;

/// The protocol receiver of an IMAP4rev1 client is either ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FramingState {
    /// ... reading a line, or ...
    ReadLine { to_consume_acc: usize },
    /// ... is reading a sequence of octets with a known count followed by
    /// a line.
    ReadLiteral { to_consume_acc: usize, length: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("Expected `\\r\\n`, got `\\n`")]
    NotCrLf,
    #[error("Could not parse the announced literal length")]
    BadLiteralLength,
    #[error("Expected a response unit of at most {max_response_size} bytes, got at least {size} bytes")]
    ResponseTooLarge { max_response_size: u32, size: u32 },
}

/// Skip the first `skip` bytes of `buf` and count how many more bytes are
/// needed to cover the next `\r\n`.
///
/// This function returns `None` when no line was found, `Some(Ok(length))`
/// with `buf[..skip + length]` being the first line (including `\r\n`), or
/// `Some(Err(length))` with `buf[..skip + length]` being the first line
/// (including `\n`) with a missing `\r`.
pub(crate) fn find_crlf_inclusive(skip: usize, buf: &[u8]) -> Option<Result<usize, usize>> {
    match buf.iter().skip(skip).position(|item| *item == b'\n') {
        Some(position) => {
            if position > 0 && buf[skip + position - 1] == b'\r' {
                Some(Ok(position + 1))
            } else {
                Some(Err(position + 1))
            }
        }
        None => None,
    }
}

/// Does `line` (without its CRLF) announce a literal?
///
/// Returns the declared length when the line ends with `{<digits>}`, `None`
/// otherwise, and an error when the digits do not fit a `u32`.
pub(crate) fn parse_literal_announcement(line: &[u8]) -> Result<Option<u32>, FramingError> {
    let Some(line) = line.strip_suffix(b"}") else {
        return Ok(None);
    };

    let Some(open) = line.iter().rposition(|&b| b == b'{') else {
        return Ok(None);
    };

    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Ok(None);
    }

    match std::str::from_utf8(digits).unwrap_or_default().parse::<u32>() {
        Ok(length) => Ok(Some(length)),
        Err(_) => Err(FramingError::BadLiteralLength),
    }
}
