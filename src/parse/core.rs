//! Parsers for the core grammar rules.

use std::{num::NonZeroU32, str::from_utf8};

use abnf_core::streaming::{crlf, dquote};
use nom::{
    branch::alt,
    bytes::streaming::{escaped, tag, take, take_while1},
    character::streaming::one_of,
    combinator::{map, map_res, opt, value},
    sequence::{delimited, terminated, tuple},
    IResult,
};

use crate::core::{is_astring_char, is_atom_char, is_text_char, Atom, Tag};

/// `atom = 1*ATOM-CHAR`
pub(crate) fn atom(input: &[u8]) -> IResult<&[u8], Atom> {
    map_res(take_while1(is_atom_char), Atom::try_from)(input)
}

/// `tag = 1*<any ASTRING-CHAR except "+">`
pub(crate) fn tag_imap(input: &[u8]) -> IResult<&[u8], Tag> {
    map_res(
        take_while1(|b| is_astring_char(b) && b != b'+'),
        Tag::try_from,
    )(input)
}

/// `number = 1*DIGIT`
pub(crate) fn number(input: &[u8]) -> IResult<&[u8], u32> {
    map_res(
        map_res(take_while1(|b: u8| b.is_ascii_digit()), from_utf8),
        str::parse::<u32>,
    )(input)
}

/// `nz-number = digit-nz *DIGIT`
pub(crate) fn nz_number(input: &[u8]) -> IResult<&[u8], NonZeroU32> {
    map_res(number, NonZeroU32::try_from)(input)
}

/// `text = 1*TEXT-CHAR`
pub(crate) fn text(input: &[u8]) -> IResult<&[u8], String> {
    map_res(take_while1(is_text_char), |bytes: &[u8]| {
        from_utf8(bytes).map(str::to_owned)
    })(input)
}

fn is_quoted_text_char(b: u8) -> bool {
    is_text_char(b) && b != b'"' && b != b'\\'
}

/// `quoted = DQUOTE *QUOTED-CHAR DQUOTE`
pub(crate) fn quoted(input: &[u8]) -> IResult<&[u8], String> {
    let (remaining, raw) = delimited(
        dquote,
        map(
            opt(escaped(
                take_while1(is_quoted_text_char),
                '\\',
                one_of("\\\""),
            )),
            Option::unwrap_or_default,
        ),
        dquote,
    )(input)?;

    // Undo `quoted-specials` escaping.
    let mut unescaped = String::with_capacity(raw.len());
    let mut bytes = raw.iter();
    while let Some(&b) = bytes.next() {
        if b == b'\\' {
            if let Some(&escaped) = bytes.next() {
                unescaped.push(escaped as char);
            }
        } else {
            unescaped.push(b as char);
        }
    }

    Ok((remaining, unescaped))
}

/// `literal = "{" number "}" CRLF *CHAR8`
///
/// The declared number of bytes must already be buffered; the framing layer
/// guarantees this before the parser runs.
pub(crate) fn literal(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (remaining, length) = terminated(delimited(tag(b"{"), number, tag(b"}")), crlf)(input)?;
    let (remaining, data) = take(length)(remaining)?;

    Ok((remaining, data.to_vec()))
}

/// `string = quoted / literal`
pub(crate) fn string(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    alt((map(quoted, String::into_bytes), literal))(input)
}

/// `nstring = string / nil`
pub(crate) fn nstring(input: &[u8]) -> IResult<&[u8], Option<Vec<u8>>> {
    alt((
        value(None, tag(b"NIL")),
        map(string, Some),
    ))(input)
}

/// `astring = 1*ASTRING-CHAR / string`
pub(crate) fn astring(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    alt((
        map(take_while1(is_astring_char), <[u8]>::to_vec),
        string,
    ))(input)
}

/// `QUOTED-CHAR` delimiter inside a LIST response, or NIL.
pub(crate) fn quoted_char_or_nil(input: &[u8]) -> IResult<&[u8], Option<char>> {
    alt((
        value(None, tag(b"NIL")),
        map(
            tuple((
                dquote,
                alt((
                    map(tuple((tag(b"\\"), take(1usize))), |(_, b): (_, &[u8])| b[0]),
                    map_res(take(1usize), |b: &[u8]| {
                        if is_quoted_text_char(b[0]) {
                            Ok(b[0])
                        } else {
                            Err("quoted-specials must be escaped")
                        }
                    }),
                )),
                dquote,
            )),
            |(_, b, _)| Some(b as char),
        ),
    ))(input)
}
