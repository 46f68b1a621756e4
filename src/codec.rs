//! Byte-stream to [`Response`] decoding
//!
//! [`ResponseCodec`] implements [`tokio_util::codec::Decoder`]. It frames a
//! complete response unit (a line plus all announced literals), parses it in
//! one go, and only then consumes it from the buffer.
//!
//! Error recovery is decided here: a response unit that framed correctly but
//! failed to parse is consumed before the error is returned, so the caller
//! can log it and keep decoding. A framing failure (missing `\r`, or a unit
//! exceeding the configured size ceiling) leaves no usable synchronization
//! point, so the buffer is cleared and the connection should be dropped.

use std::io::Error as IoError;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio_util::codec::Decoder;

use crate::{
    framing::{find_crlf_inclusive, parse_literal_announcement, FramingError, FramingState},
    parse,
    response::Response,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCodec {
    state: FramingState,
    max_response_size: u32,
}

impl ResponseCodec {
    pub fn new(max_response_size: u32) -> Self {
        Self {
            state: FramingState::ReadLine { to_consume_acc: 0 },
            max_response_size,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResponseCodecError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("Parsing failed")]
    ParsingFailed,
}

impl ResponseCodecError {
    /// A parse failure of a well-framed unit is recoverable: the unit was
    /// consumed and the next one can be decoded. Everything else means the
    /// stream is out of sync.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ParsingFailed)
    }
}

impl PartialEq for ResponseCodecError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Io(error1), Self::Io(error2)) => error1.kind() == error2.kind(),
            (Self::Framing(error1), Self::Framing(error2)) => error1 == error2,
            (Self::ParsingFailed, Self::ParsingFailed) => true,
            _ => false,
        }
    }
}

impl Decoder for ResponseCodec {
    type Item = Response;
    type Error = ResponseCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                FramingState::ReadLine {
                    ref mut to_consume_acc,
                } => {
                    match find_crlf_inclusive(*to_consume_acc, src) {
                        Some(Ok(to_consume)) => {
                            *to_consume_acc += to_consume;

                            if *to_consume_acc as u64 > u64::from(self.max_response_size) {
                                let size = *to_consume_acc as u32;
                                src.clear();
                                self.state = FramingState::ReadLine { to_consume_acc: 0 };

                                return Err(FramingError::ResponseTooLarge {
                                    max_response_size: self.max_response_size,
                                    size,
                                }
                                .into());
                            }

                            match parse_literal_announcement(&src[..*to_consume_acc - 2]) {
                                // No literal, the unit is complete.
                                Ok(None) => {
                                    match parse::response(&src[..*to_consume_acc]) {
                                        Ok((remaining, response)) => {
                                            debug_assert!(remaining.is_empty());

                                            src.advance(*to_consume_acc);
                                            self.state =
                                                FramingState::ReadLine { to_consume_acc: 0 };

                                            return Ok(Some(response));
                                        }
                                        Err(_) => {
                                            src.advance(*to_consume_acc);
                                            self.state =
                                                FramingState::ReadLine { to_consume_acc: 0 };

                                            return Err(ResponseCodecError::ParsingFailed);
                                        }
                                    }
                                }
                                // Literal announced, keep framing.
                                Ok(Some(length)) => {
                                    let unit_size = *to_consume_acc as u64 + u64::from(length);
                                    if unit_size > u64::from(self.max_response_size) {
                                        src.clear();
                                        self.state = FramingState::ReadLine { to_consume_acc: 0 };

                                        return Err(FramingError::ResponseTooLarge {
                                            max_response_size: self.max_response_size,
                                            size: unit_size.min(u64::from(u32::MAX)) as u32,
                                        }
                                        .into());
                                    }

                                    src.reserve(length as usize);

                                    self.state = FramingState::ReadLiteral {
                                        to_consume_acc: *to_consume_acc,
                                        length,
                                    };
                                }
                                Err(error) => {
                                    src.clear();
                                    self.state = FramingState::ReadLine { to_consume_acc: 0 };

                                    return Err(error.into());
                                }
                            }
                        }
                        // More data needed.
                        None => {
                            // Cheap check so an endless line cannot grow the
                            // buffer past the ceiling.
                            if src.len() as u64 > u64::from(self.max_response_size) {
                                let size = src.len().min(u32::MAX as usize) as u32;
                                src.clear();
                                self.state = FramingState::ReadLine { to_consume_acc: 0 };

                                return Err(FramingError::ResponseTooLarge {
                                    max_response_size: self.max_response_size,
                                    size,
                                }
                                .into());
                            }

                            return Ok(None);
                        }
                        // Lone `\n`.
                        Some(Err(to_consume)) => {
                            if cfg!(feature = "quirk_crlf_relaxed") {
                                // Patch the line ending so that the parser
                                // sees the CRLF it expects, then re-frame.
                                let at = *to_consume_acc + to_consume - 1;
                                let mut patched = BytesMut::with_capacity(src.len() + 1);
                                patched.extend_from_slice(&src[..at]);
                                patched.extend_from_slice(b"\r\n");
                                patched.extend_from_slice(&src[at + 1..]);
                                *src = patched;
                                continue;
                            }

                            src.clear();
                            self.state = FramingState::ReadLine { to_consume_acc: 0 };

                            return Err(FramingError::NotCrLf.into());
                        }
                    }
                }
                FramingState::ReadLiteral {
                    to_consume_acc,
                    length,
                } => {
                    if to_consume_acc + length as usize <= src.len() {
                        self.state = FramingState::ReadLine {
                            to_consume_acc: to_consume_acc + length as usize,
                        }
                    } else {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use bytes::BytesMut;
    use tokio_util::codec::Decoder;

    use super::*;
    use crate::response::{Condition, Data, FetchItem, UntaggedResponse};

    fn status(condition: Condition, text: &str) -> Response {
        Response::Untagged(UntaggedResponse::Status {
            condition,
            code: None,
            text: text.into(),
        })
    }

    #[test]
    fn test_decoder_line() {
        let tests = [
            (b"".as_ref(), Ok(None)),
            (b"* ", Ok(None)),
            (b"OK ...\r", Ok(None)),
            (b"\n", Ok(Some(status(Condition::Ok, "...")))),
            (b"", Ok(None)),
            (b"xxxx", Ok(None)),
            (b"\r\n", Err(ResponseCodecError::ParsingFailed)),
            // The bad unit was consumed; decoding continues.
            (
                b"* 5 RECENT\r\n",
                Ok(Some(Response::Untagged(UntaggedResponse::Data(
                    Data::Recent(5),
                )))),
            ),
        ];

        let mut src = BytesMut::new();
        let mut codec = ResponseCodec::new(1024);

        for (test, expected) in tests {
            src.extend_from_slice(test);
            let got = codec.decode(&mut src);

            dbg!((std::str::from_utf8(test).unwrap(), &expected, &got));

            assert_eq!(expected, got);
        }
    }

    #[test]
    fn test_decoder_literal() {
        let tests = [
            (
                b"* OK ...\r\n".as_ref(),
                Ok(Some(status(Condition::Ok, "..."))),
            ),
            (b"* 12 FETCH (BODY[HEADER] {3}", Ok(None)),
            (b"\r", Ok(None)),
            (b"\n", Ok(None)),
            (b"a", Ok(None)),
            (b"bc)", Ok(None)),
            (b"\r", Ok(None)),
            (
                b"\n",
                Ok(Some(Response::Untagged(UntaggedResponse::Data(
                    Data::Fetch {
                        seq: NonZeroU32::new(12).unwrap(),
                        items: vec![FetchItem::Body {
                            section: "BODY[HEADER]".into(),
                            data: Some(b"abc".to_vec()),
                        }],
                    },
                )))),
            ),
        ];

        let mut src = BytesMut::new();
        let mut codec = ResponseCodec::new(1024);

        for (test, expected) in tests {
            src.extend_from_slice(test);
            let got = codec.decode(&mut src);

            dbg!((std::str::from_utf8(test).unwrap(), &expected, &got));

            assert_eq!(expected, got);
        }
    }

    #[cfg(not(feature = "quirk_crlf_relaxed"))]
    #[test]
    fn test_decoder_error() {
        let tests = [
            (
                b"xxx\r\n".as_ref(),
                Err(ResponseCodecError::ParsingFailed),
            ),
            (
                b"* search 1\n",
                Err(ResponseCodecError::Framing(FramingError::NotCrLf)),
            ),
            (
                b"* 1 FETCH (BODY[] {17}\r\n",
                Err(ResponseCodecError::Framing(
                    FramingError::ResponseTooLarge {
                        max_response_size: 32,
                        size: 41,
                    },
                )),
            ),
        ];

        let mut src = BytesMut::new();
        let mut codec = ResponseCodec::new(32);

        for (test, expected) in tests {
            src.extend_from_slice(test);
            let got = codec.decode(&mut src);

            dbg!((std::str::from_utf8(test).unwrap(), &expected, &got));

            assert_eq!(expected, got);
        }
    }

    #[test]
    fn test_recoverable() {
        assert!(ResponseCodecError::ParsingFailed.is_recoverable());
        assert!(!ResponseCodecError::Framing(FramingError::NotCrLf).is_recoverable());
    }
}
