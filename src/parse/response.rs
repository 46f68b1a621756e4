//! Parsers for the three response forms.
//!
//! `response = continue-req / response-tagged / response-data`
//!
//! The greeting is not special-cased: `PREAUTH` and `BYE` parse as untagged
//! status conditions, so the first response on a connection goes through the
//! same entry point as everything else.

use abnf_core::streaming::{crlf, sp};
use nom::{
    branch::alt,
    bytes::streaming::{tag, tag_no_case, take_while1},
    combinator::{map, opt, recognize, value},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use super::core::{
    astring, atom, nstring, number, nz_number, quoted, quoted_char_or_nil, string, tag_imap, text,
};
use crate::{
    core::{is_atom_char, is_text_char},
    flag::Flag,
    response::{
        Capability, Code, Condition, ContinueRequest, Data, FetchItem, Response, TaggedResponse,
        TaggedStatus, UntaggedResponse,
    },
};

/// `response = continue-req / response-data / response-tagged`
pub(crate) fn response(input: &[u8]) -> IResult<&[u8], Response> {
    alt((
        map(continue_req, Response::Continue),
        map(response_data, Response::Untagged),
        map(response_tagged, Response::Tagged),
    ))(input)
}

/// `continue-req = "+" SP (resp-text / base64) CRLF`
///
/// The remainder of the line is carried verbatim; `AUTHENTICATE` callers
/// see the raw base64 challenge.
pub(crate) fn continue_req(input: &[u8]) -> IResult<&[u8], ContinueRequest> {
    let mut parser = tuple((tag(b"+"), opt(preceded(sp, opt(text))), crlf));

    let (remaining, (_, maybe_text, _)) = parser(input)?;

    Ok((
        remaining,
        ContinueRequest {
            text: maybe_text.flatten().unwrap_or_default(),
        },
    ))
}

/// `response-tagged = tag SP resp-cond-state CRLF`
///
/// The status is parsed as an atom: a token other than OK/NO/BAD still
/// yields a structured reply (with [`TaggedStatus::Other`]) so that the
/// session can treat it as a protocol violation instead of dropping the
/// whole line.
pub(crate) fn response_tagged(input: &[u8]) -> IResult<&[u8], TaggedResponse> {
    let mut parser = tuple((tag_imap, sp, atom, sp, resp_text, crlf));

    let (remaining, (tag, _, status, _, (code, text), _)) = parser(input)?;

    let status = match status.inner() {
        s if s.eq_ignore_ascii_case("OK") => TaggedStatus::Ok,
        s if s.eq_ignore_ascii_case("NO") => TaggedStatus::No,
        s if s.eq_ignore_ascii_case("BAD") => TaggedStatus::Bad,
        _ => TaggedStatus::Other(status),
    };

    Ok((
        remaining,
        TaggedResponse {
            tag,
            status,
            code,
            text,
        },
    ))
}

/// `response-data = "*" SP (resp-cond-state / resp-cond-bye / mailbox-data / message-data / capability-data) CRLF`
pub(crate) fn response_data(input: &[u8]) -> IResult<&[u8], UntaggedResponse> {
    let mut parser = tuple((
        tag(b"*"),
        sp,
        alt((
            resp_cond,
            map(capability_data, |caps| {
                UntaggedResponse::Data(Data::Capability(caps))
            }),
            map(mailbox_data, UntaggedResponse::Data),
            map(message_data, UntaggedResponse::Data),
            map(unknown_data, UntaggedResponse::Data),
        )),
        crlf,
    ));

    let (remaining, (_, _, response, _)) = parser(input)?;

    Ok((remaining, response))
}

/// `resp-cond-state / resp-cond-auth / resp-cond-bye`
///
/// `("OK" / "NO" / "BAD" / "PREAUTH" / "BYE") SP resp-text`
fn resp_cond(input: &[u8]) -> IResult<&[u8], UntaggedResponse> {
    let mut parser = tuple((
        alt((
            // Longest match first: `PREAUTH` must not parse as an atom later.
            value(Condition::PreAuth, tag_no_case(b"PREAUTH")),
            value(Condition::Bye, tag_no_case(b"BYE")),
            value(Condition::Ok, tag_no_case(b"OK")),
            value(Condition::No, tag_no_case(b"NO")),
            value(Condition::Bad, tag_no_case(b"BAD")),
        )),
        sp,
        resp_text,
    ));

    let (remaining, (condition, _, (code, text))) = parser(input)?;

    Ok((
        remaining,
        UntaggedResponse::Status {
            condition,
            code,
            text,
        },
    ))
}

/// `resp-text = ["[" resp-text-code "]" SP] text`
///
/// Some servers omit the text (or the space before it); both are accepted.
fn resp_text(input: &[u8]) -> IResult<&[u8], (Option<Code>, String)> {
    map(
        tuple((
            opt(terminated(
                delimited(tag(b"["), resp_text_code, tag(b"]")),
                opt(sp),
            )),
            opt(text),
        )),
        |(code, text)| (code, text.unwrap_or_default()),
    )(input)
}

/// `resp-text-code = "ALERT" /
///                   "BADCHARSET" [SP "(" charset *(SP charset) ")" ] /
///                   capability-data /
///                   "PARSE" /
///                   "PERMANENTFLAGS" SP "(" [flag-perm *(SP flag-perm)] ")" /
///                   "READ-ONLY" /
///                   "READ-WRITE" /
///                   "TRYCREATE" /
///                   "UIDNEXT" SP nz-number /
///                   "UIDVALIDITY" SP nz-number /
///                   "UNSEEN" SP nz-number /
///                   "CLOSED" /
///                   atom [SP 1*<any TEXT-CHAR except "]">]`
fn resp_text_code(input: &[u8]) -> IResult<&[u8], Code> {
    alt((
        value(Code::Alert, tag_no_case(b"ALERT")),
        map(
            tuple((
                tag_no_case(b"BADCHARSET"),
                opt(preceded(
                    sp,
                    delimited(tag(b"("), separated_list1(sp, astring), tag(b")")),
                )),
            )),
            |_| Code::BadCharset,
        ),
        map(capability_data, Code::Capability),
        value(Code::Parse, tag_no_case(b"PARSE")),
        map(
            tuple((
                tag_no_case(b"PERMANENTFLAGS"),
                sp,
                delimited(
                    tag(b"("),
                    separated_list0(sp, flag_perm),
                    tag(b")"),
                ),
            )),
            |(_, _, flags)| Code::PermanentFlags(flags),
        ),
        value(Code::ReadOnly, tag_no_case(b"READ-ONLY")),
        value(Code::ReadWrite, tag_no_case(b"READ-WRITE")),
        value(Code::TryCreate, tag_no_case(b"TRYCREATE")),
        map(
            tuple((tag_no_case(b"UIDNEXT"), sp, nz_number)),
            |(_, _, num)| Code::UidNext(num),
        ),
        map(
            tuple((tag_no_case(b"UIDVALIDITY"), sp, nz_number)),
            |(_, _, num)| Code::UidValidity(num),
        ),
        map(
            tuple((tag_no_case(b"UNSEEN"), sp, nz_number)),
            |(_, _, num)| Code::Unseen(num),
        ),
        value(Code::Closed, tag_no_case(b"CLOSED")),
        map(
            tuple((
                atom,
                opt(preceded(
                    sp,
                    map(
                        take_while1(|b| is_text_char(b) && b != b']'),
                        |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned(),
                    ),
                )),
            )),
            |(name, text)| Code::Other { name, text },
        ),
    ))(input)
}

/// `capability-data = "CAPABILITY" *(SP capability)`
fn capability_data(input: &[u8]) -> IResult<&[u8], Vec<Capability>> {
    let mut parser = tuple((
        tag_no_case(b"CAPABILITY"),
        many0(preceded(sp, map(atom, Capability::from))),
    ));

    let (remaining, (_, caps)) = parser(input)?;

    Ok((remaining, caps))
}

/// `flag = "\Answered" / "\Flagged" / "\Deleted" / "\Seen" / "\Draft" / flag-keyword / flag-extension`
pub(crate) fn flag(input: &[u8]) -> IResult<&[u8], Flag> {
    alt((
        map(preceded(tag(b"\\"), atom), |name| {
            Flag::system(&name).unwrap_or(Flag::Extension(name))
        }),
        map(atom, Flag::Keyword),
    ))(input)
}

/// `flag-perm = flag / "\*"`
fn flag_perm(input: &[u8]) -> IResult<&[u8], Flag> {
    alt((value(Flag::Permanent, tag(b"\\*")), flag))(input)
}

/// `flag-list = "(" [flag *(SP flag)] ")"`
fn flag_list(input: &[u8]) -> IResult<&[u8], Vec<Flag>> {
    delimited(tag(b"("), separated_list0(sp, flag), tag(b")"))(input)
}

/// `mailbox-data = "FLAGS" SP flag-list /
///                 "LIST" SP mailbox-list /
///                 "SEARCH" *(SP nz-number) /
///                 number SP "EXISTS" /
///                 number SP "RECENT"`
fn mailbox_data(input: &[u8]) -> IResult<&[u8], Data> {
    alt((
        map(
            preceded(tuple((tag_no_case(b"FLAGS"), sp)), flag_list),
            Data::Flags,
        ),
        map(
            preceded(tuple((tag_no_case(b"LIST"), sp)), mailbox_list),
            |(attributes, delimiter, mailbox)| Data::List {
                attributes,
                delimiter,
                mailbox,
            },
        ),
        map(
            preceded(tag_no_case(b"SEARCH"), many0(preceded(sp, nz_number))),
            Data::Search,
        ),
        map(terminated(number, tag_no_case(b" EXISTS")), Data::Exists),
        map(terminated(number, tag_no_case(b" RECENT")), Data::Recent),
    ))(input)
}

/// `mailbox-list = "(" [mbx-list-flags] ")" SP (DQUOTE QUOTED-CHAR DQUOTE / nil) SP mailbox`
fn mailbox_list(input: &[u8]) -> IResult<&[u8], (Vec<Flag>, Option<char>, String)> {
    let mut parser = tuple((
        flag_list,
        sp,
        quoted_char_or_nil,
        sp,
        map(astring, |bytes| String::from_utf8_lossy(&bytes).into_owned()),
    ));

    let (remaining, (attributes, _, delimiter, _, mailbox)) = parser(input)?;

    Ok((remaining, (attributes, delimiter, mailbox)))
}

/// `message-data = nz-number SP ("EXPUNGE" / ("FETCH" SP msg-att))`
fn message_data(input: &[u8]) -> IResult<&[u8], Data> {
    let (remaining, seq) = terminated(nz_number, sp)(input)?;

    alt((
        value(Data::Expunge(seq), tag_no_case(b"EXPUNGE")),
        map(
            preceded(tuple((tag_no_case(b"FETCH"), sp)), msg_att),
            move |items| Data::Fetch { seq, items },
        ),
    ))(remaining)
}

/// Any other data line, e.g., `STATUS`, `NAMESPACE`, `ESEARCH`.
///
/// The payload is not decoded, but captured under its leading name so it
/// still accumulates in the registry for whoever issued the command.
fn unknown_data(input: &[u8]) -> IResult<&[u8], Data> {
    let mut parser = tuple((
        atom,
        opt(preceded(sp, take_while1(is_text_char))),
    ));

    let (remaining, (name, raw)) = parser(input)?;

    Ok((
        remaining,
        Data::Other {
            name: name.inner().to_owned(),
            raw: raw.map(<[u8]>::to_vec).unwrap_or_default(),
        },
    ))
}

/// `msg-att = "(" msg-att-item *(SP msg-att-item) ")"`
fn msg_att(input: &[u8]) -> IResult<&[u8], Vec<FetchItem>> {
    delimited(tag(b"("), separated_list1(sp, msg_att_item), tag(b")"))(input)
}

/// One item of a FETCH response.
///
/// `FLAGS`, `UID`, `RFC822.SIZE`, and body payloads are decoded; everything
/// else (`INTERNALDATE`, `ENVELOPE`, `BODYSTRUCTURE`, ...) is captured
/// opaquely so that unknown items never abort the whole response.
fn msg_att_item(input: &[u8]) -> IResult<&[u8], FetchItem> {
    alt((
        map(
            preceded(tuple((tag_no_case(b"FLAGS"), sp)), flag_list),
            FetchItem::Flags,
        ),
        map(
            preceded(tuple((tag_no_case(b"UID"), sp)), nz_number),
            FetchItem::Uid,
        ),
        map(
            preceded(tuple((tag_no_case(b"RFC822.SIZE"), sp)), number),
            FetchItem::Rfc822Size,
        ),
        map(
            tuple((body_section_name, sp, nstring)),
            |(section, _, data)| FetchItem::Body { section, data },
        ),
        map(
            tuple((
                map(take_while1(|b| is_atom_char(b) || b == b'['), |bytes: &[u8]| {
                    String::from_utf8_lossy(bytes).into_owned()
                }),
                sp,
                msg_att_value_raw,
            )),
            |(name, _, raw)| FetchItem::Other { name, raw },
        ),
    ))(input)
}

/// `"BODY" section ["<" number ">"] / "RFC822" [".HEADER" / ".TEXT"]`
fn body_section_name(input: &[u8]) -> IResult<&[u8], String> {
    map(
        recognize(alt((
            recognize(tuple((
                tag_no_case(b"BODY"),
                tag(b"["),
                take_while1(|b| is_text_char(b) && b != b']'),
                tag(b"]"),
                opt(tuple((tag(b"<"), number, tag(b">")))),
            ))),
            recognize(tuple((tag_no_case(b"BODY"), tag(b"[]"),
                opt(tuple((tag(b"<"), number, tag(b">")))),
            ))),
            recognize(tuple((
                tag_no_case(b"RFC822"),
                opt(alt((tag_no_case(b".HEADER"), tag_no_case(b".TEXT")))),
            ))),
        ))),
        |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned(),
    )(input)
}

/// An opaque FETCH value: a string, a number-ish atom run, or a balanced
/// parenthesized expression. Returned as the raw bytes that were consumed.
fn msg_att_value_raw(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    alt((
        string,
        map(recognize(paren_balanced), <[u8]>::to_vec),
        map(
            take_while1(|b| is_text_char(b) && b != b' ' && b != b'(' && b != b')'),
            <[u8]>::to_vec,
        ),
    ))(input)
}

/// A parenthesized expression with balanced nesting. Literals inside are
/// consumed with their declared length so that `)` bytes in message data
/// cannot unbalance the scan.
fn paren_balanced(input: &[u8]) -> IResult<&[u8], ()> {
    let (mut remaining, _) = tag(b"(")(input)?;
    let mut depth = 1usize;

    while depth > 0 {
        if let Ok((rest, _)) = super::core::literal(remaining) {
            remaining = rest;
            continue;
        }
        if let Ok((rest, _)) = quoted(remaining) {
            remaining = rest;
            continue;
        }

        let (rest, byte) = nom::bytes::streaming::take(1usize)(remaining)?;
        match byte[0] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        remaining = rest;
    }

    Ok((remaining, ()))
}
