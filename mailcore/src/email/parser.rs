/*
 * mailcore - parser module
 *
 * Copyright 2024 mailcore contributors
 *
 * This file is part of mailcore.
 *
 * mailcore is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * mailcore is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with mailcore. If not, see <http://www.gnu.org/licenses/>.
 */

//! Parsers for the parts of RFC 5322 messages the core reads: header
//! blocks, address lists, message-id lists and MIME structure.

use std::borrow::Cow;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::char,
    combinator::{map, opt},
    error::ErrorKind,
    multi::{many1, separated_list0},
    sequence::{pair, preceded},
};

use crate::{
    email::address::{Address, AddressList},
    error::Error,
};

#[derive(Debug, Eq, PartialEq)]
pub struct ParsingError<I> {
    pub input: I,
    pub error: Cow<'static, str>,
}

pub type IResult<I, O, E = ParsingError<I>> = std::result::Result<(I, O), nom::Err<E>>;

impl<I> From<(I, &'static str)> for ParsingError<I> {
    fn from((input, error): (I, &'static str)) -> Self {
        Self {
            input,
            error: error.into(),
        }
    }
}

impl<I> nom::error::ParseError<I> for ParsingError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        Self {
            input,
            error: kind.description().to_string().into(),
        }
    }

    fn append(input: I, kind: ErrorKind, other: Self) -> Self {
        Self {
            input,
            error: format!("{}, {}", kind.description(), other.error).into(),
        }
    }
}

impl<I, E> nom::error::FromExternalError<I, E> for ParsingError<I> {
    fn from_external_error(input: I, kind: ErrorKind, _e: E) -> Self {
        Self {
            input,
            error: kind.description().to_string().into(),
        }
    }
}

impl<'i> From<ParsingError<&'i [u8]>> for Error {
    fn from(val: ParsingError<&'i [u8]>) -> Self {
        Self::new("Parsing error").set_summary(format!(
            r#"In input: "{}...",
Error: {}"#,
            String::from_utf8_lossy(val.input)
                .chars()
                .take(30)
                .collect::<String>(),
            val.error
        ))
    }
}

impl<'i> From<ParsingError<&'i str>> for Error {
    fn from(val: ParsingError<&'i str>) -> Self {
        Self::new("Parsing error").set_summary(format!(
            r#"In input: "{}...",
Error: {}"#,
            val.input.chars().take(30).collect::<String>(),
            val.error
        ))
    }
}

impl<'i> From<nom::Err<ParsingError<&'i [u8]>>> for Error {
    fn from(val: nom::Err<ParsingError<&'i [u8]>>) -> Self {
        match val {
            nom::Err::Incomplete(_) => Self::new("Parsing Error: Incomplete"),
            nom::Err::Error(err) | nom::Err::Failure(err) => err.into(),
        }
    }
}

impl<'i> From<nom::Err<ParsingError<&'i str>>> for Error {
    fn from(val: nom::Err<ParsingError<&'i str>>) -> Self {
        match val {
            nom::Err::Incomplete(_) => Self::new("Parsing Error: Incomplete"),
            nom::Err::Error(err) | nom::Err::Failure(err) => err.into(),
        }
    }
}

pub mod headers {
    //! Header blocks.
    use super::*;

    /// Split a message into its header block and body. The returned offset
    /// is where the body starts.
    pub fn split_headers(input: &[u8]) -> (&[u8], usize) {
        if input.starts_with(b"\r\n") {
            return (&[], 2);
        } else if input.starts_with(b"\n") {
            return (&[], 1);
        }
        let mut i = 0;
        while i < input.len() {
            if input[i..].starts_with(b"\r\n\r\n") {
                return (&input[..i + 2], i + 4);
            } else if input[i..].starts_with(b"\n\n") {
                return (&input[..i + 1], i + 2);
            }
            i += 1;
        }
        (input, input.len())
    }

    /// The value of a header up to the next line that does not start with
    /// folding whitespace.
    pub fn header_value(input: &[u8]) -> IResult<&[u8], &[u8]> {
        let input_len = input.len();
        for (i, x) in input.iter().enumerate() {
            if *x == b'\n'
                && (((i + 1) < input_len && input[i + 1] != b' ' && input[i + 1] != b'\t')
                    || i + 1 == input_len)
            {
                let end = if i > 0 && input[i - 1] == b'\r' { i - 1 } else { i };
                return Ok((&input[(i + 1)..], &input[0..end]));
            }
        }
        Ok((&input[input_len..], input))
    }

    /// Parse a single `Name: value` header.
    pub fn header(input: &[u8]) -> IResult<&[u8], (&str, &[u8])> {
        if input.is_empty() {
            return Err(nom::Err::Error((input, "header(): empty input").into()));
        } else if input.starts_with(b"\n") || input.starts_with(b"\r\n") {
            return Err(nom::Err::Error(
                (input, "header(): field name starts with new line").into(),
            ));
        }
        let Some(colon) = input.iter().position(|b| *b == b':') else {
            return Err(nom::Err::Error((input, "header(): no colon found").into()));
        };
        let name = &input[..colon];
        if name.is_empty()
            || name
                .iter()
                .any(|b| b.is_ascii_control() || *b == b' ' || !b.is_ascii())
        {
            return Err(nom::Err::Error((input, "header(): invalid header name").into()));
        }
        let Ok(name) = std::str::from_utf8(name) else {
            return Err(nom::Err::Error((input, "header(): invalid header name").into()));
        };
        let mut ptr = colon + 1;
        while ptr < input.len() && (input[ptr] == b' ' || input[ptr] == b'\t') {
            ptr += 1;
        }
        header_value(&input[ptr..]).map(|(rest, value)| (rest, (name, value)))
    }

    pub fn headers(input: &[u8]) -> IResult<&[u8], Vec<(&str, &[u8])>> {
        many1(header)(input)
    }

    /// Join folded lines and decode as UTF-8, replacing invalid sequences.
    pub fn unfold(value: &[u8]) -> String {
        let value = String::from_utf8_lossy(value);
        let mut ret = String::with_capacity(value.len());
        for (i, line) in value.split('\n').enumerate() {
            let line = line.trim_end_matches('\r');
            if i == 0 {
                ret.push_str(line);
            } else {
                ret.push(' ');
                ret.push_str(line.trim_start());
            }
        }
        ret.trim().to_string()
    }

    /// All headers of a message, unfolded, in order.
    pub fn parse_headers(input: &[u8]) -> Vec<(String, String)> {
        let (block, _) = split_headers(input);
        match headers(block) {
            Ok((_, list)) => list
                .into_iter()
                .map(|(name, value)| (name.to_string(), unfold(value)))
                .collect(),
            Err(_) => vec![],
        }
    }
}

pub mod address {
    //! Address lists (`From`, `To`, ...).
    use super::*;

    const SPECIALS: &str = "()<>[]:;@\\,\"";

    /// Skip whitespace and comments, returning the last comment found.
    pub fn cfws(mut input: &str) -> IResult<&str, Option<&str>> {
        let mut last = None;
        loop {
            let trimmed = input.trim_start();
            let Some(rest) = trimmed.strip_prefix('(') else {
                return Ok((trimmed, last));
            };
            let mut depth = 1;
            let mut escaped = false;
            let mut end = None;
            for (i, c) in rest.char_indices() {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            let Some(end) = end else {
                return Err(nom::Err::Error((input, "cfws(): unbalanced comment").into()));
            };
            last = Some(rest[..end].trim());
            input = &rest[end + 1..];
        }
    }

    pub fn quoted_string(input: &str) -> IResult<&str, String> {
        let (input, _) = cfws(input)?;
        let Some(rest) = input.strip_prefix('"') else {
            return Err(nom::Err::Error((input, "quoted_string(): expected '\"'").into()));
        };
        let mut ret = String::new();
        let mut escaped = false;
        for (i, c) in rest.char_indices() {
            match c {
                _ if escaped => {
                    ret.push(c);
                    escaped = false;
                }
                '\\' => escaped = true,
                '"' => return Ok((&rest[i + 1..], ret)),
                _ => ret.push(c),
            }
        }
        Err(nom::Err::Error((input, "quoted_string(): unterminated string").into()))
    }

    pub fn atom(input: &str) -> IResult<&str, &str> {
        let (input, _) = cfws(input)?;
        take_while1(|c: char| !c.is_whitespace() && !SPECIALS.contains(c))(input)
    }

    pub fn phrase(input: &str) -> IResult<&str, String> {
        map(
            many1(alt((quoted_string, map(atom, str::to_string)))),
            |words| words.join(" "),
        )(input)
    }

    pub fn addr_spec(input: &str) -> IResult<&str, String> {
        let (input, local) = alt((
            map(quoted_string, |s| format!("\"{}\"", s)),
            map(atom, str::to_string),
        ))(input)?;
        let (input, domain) = opt(preceded(char('@'), atom))(input)?;
        Ok((
            input,
            match domain {
                Some(d) => format!("{}@{}", local, d),
                None => local,
            },
        ))
    }

    pub fn angle_addr(input: &str) -> IResult<&str, String> {
        let (input, _) = cfws(input)?;
        let (input, _) = char('<')(input)?;
        let (input, _) = cfws(input)?;
        // obsolete source route
        let input = match input.strip_prefix('@') {
            Some(rest) => rest.split_once(':').map(|(_, r)| r).unwrap_or(rest),
            None => input,
        };
        let (input, spec) = addr_spec(input)?;
        let (input, _) = cfws(input)?;
        let (input, _) = char('>')(input)?;
        Ok((input, spec))
    }

    pub fn name_addr(input: &str) -> IResult<&str, Address> {
        let (input, (personal, mailbox)) = pair(opt(phrase), angle_addr)(input)?;
        Ok((
            input,
            Address {
                personal: personal.filter(|p| !p.is_empty()),
                mailbox: Some(mailbox),
                ..Address::default()
            },
        ))
    }

    pub fn bare_addr(input: &str) -> IResult<&str, Address> {
        let (input, mailbox) = addr_spec(input)?;
        let (input, comment) = cfws(input)?;
        Ok((
            input,
            Address {
                personal: comment.filter(|c| !c.is_empty()).map(str::to_string),
                mailbox: Some(mailbox),
                ..Address::default()
            },
        ))
    }

    pub fn mailbox(input: &str) -> IResult<&str, Address> {
        alt((name_addr, bare_addr))(input)
    }

    fn list_separator(input: &str) -> IResult<&str, ()> {
        let (input, _) = cfws(input)?;
        let (input, _) = char(',')(input)?;
        let (input, _) = cfws(input)?;
        Ok((input, ()))
    }

    pub fn group(input: &str) -> IResult<&str, AddressList> {
        let (input, name) = phrase(input)?;
        let (input, _) = cfws(input)?;
        let (input, _) = char(':')(input)?;
        let (input, members) = separated_list0(list_separator, mailbox)(input)?;
        let (input, _) = cfws(input)?;
        let (input, _) = opt(char(';'))(input)?;
        let mut ret = AddressList::new();
        ret.push(Address::group_start(&name));
        ret.extend(members);
        ret.push(Address::group_end());
        Ok((input, ret))
    }

    pub fn address(input: &str) -> IResult<&str, AddressList> {
        alt((group, map(mailbox, |a| smallvec::smallvec![a])))(input)
    }

    pub fn rfc2822address_list(input: &str) -> IResult<&str, AddressList> {
        let (input, _) = cfws(input)?;
        let (input, lists) = separated_list0(list_separator, address)(input)?;
        let (input, _) = opt(tag(","))(input)?;
        let (input, _) = cfws(input)?;
        Ok((input, lists.into_iter().flatten().collect()))
    }

    /// Parse an address list header value, keeping whatever parsed.
    pub fn parse_address_list(value: &str) -> AddressList {
        match rfc2822address_list(value) {
            Ok((rest, list)) => {
                if !rest.trim().is_empty() {
                    log::trace!("trailing garbage in address list: {:?}", rest);
                }
                list
            }
            Err(err) => {
                log::trace!("could not parse address list {:?}: {:?}", value, err);
                AddressList::new()
            }
        }
    }
}

pub mod message_ids {
    //! `Message-ID`, `In-Reply-To` and `References` values.

    /// Every `<...>` token of `input`, angle brackets included, in order.
    pub fn msg_id_list(input: &str) -> Vec<String> {
        let mut ret = vec![];
        let mut rest = input;
        while let Some(start) = rest.find('<') {
            let Some(len) = rest[start..].find('>') else {
                break;
            };
            let id = &rest[start..start + len + 1];
            if id.len() > 2 && !id.contains(char::is_whitespace) {
                ret.push(id.to_string());
            }
            rest = &rest[start + len + 1..];
        }
        ret
    }

    /// The first message-id of `input`, or the whole trimmed value when it
    /// has no angle brackets.
    pub fn msg_id(input: &str) -> Option<String> {
        msg_id_list(input).into_iter().next().or_else(|| {
            let trimmed = input.trim();
            if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }
}

pub mod attachments {
    //! MIME structure.
    use super::{address::quoted_string, *};

    fn token(input: &str) -> IResult<&str, &str> {
        let input = input.trim_start();
        take_while1(|c: char| !c.is_whitespace() && !"()<>@,;:\\\"/[]?=".contains(c))(input)
    }

    fn parameter(input: &str) -> IResult<&str, (String, String)> {
        let input = input.trim_start();
        let (input, _) = char(';')(input)?;
        let (input, name) = token(input)?;
        let input = input.trim_start();
        let (input, _) = char('=')(input)?;
        let (input, value) = alt((quoted_string, map(token, str::to_string)))(input)?;
        Ok((input, (name.to_ascii_lowercase(), value)))
    }

    fn parameters(mut input: &str) -> (&str, Vec<(String, String)>) {
        let mut ret = vec![];
        loop {
            match parameter(input) {
                Ok((rest, p)) => {
                    ret.push(p);
                    input = rest;
                }
                // skip stray `;` and unparseable parameters
                Err(_) => match input.trim_start().strip_prefix(';') {
                    Some(rest) => {
                        input = rest
                            .find(';')
                            .map(|i| &rest[i..])
                            .unwrap_or_default();
                    }
                    None => return (input, ret),
                },
            }
        }
    }

    /// `type/subtype; name=value; ...`
    pub fn content_type(input: &str) -> IResult<&str, (String, String, Vec<(String, String)>)> {
        let (input, major) = token(input)?;
        let (input, _) = char('/')(input.trim_start())?;
        let (input, minor) = token(input)?;
        let (input, params) = parameters(input);
        Ok((
            input,
            (major.to_ascii_lowercase(), minor.to_ascii_lowercase(), params),
        ))
    }

    /// `inline; filename=...`
    pub fn content_disposition(input: &str) -> IResult<&str, (String, Vec<(String, String)>)> {
        let (input, kind) = token(input)?;
        let (input, params) = parameters(input);
        Ok((input, (kind.to_ascii_lowercase(), params)))
    }

    /// Offsets and lengths, relative to `body`, of each part delimited by
    /// `--boundary` lines.
    pub fn multipart_parts(body: &[u8], boundary: &str) -> Vec<(usize, usize)> {
        let delimiter = format!("--{}", boundary);
        let mut ret = vec![];
        let mut part_start: Option<usize> = None;
        let mut line_start = 0;
        while line_start <= body.len() {
            let line_end = body[line_start..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|p| line_start + p)
                .unwrap_or(body.len());
            let line = &body[line_start..line_end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.starts_with(delimiter.as_bytes()) {
                let tail = &line[delimiter.len()..];
                let is_close = tail.starts_with(b"--");
                if is_close || tail.iter().all(u8::is_ascii_whitespace) {
                    if let Some(start) = part_start.take() {
                        // the line break before a delimiter belongs to it
                        let mut end = line_start.saturating_sub(1);
                        if end > start && body[end - 1] == b'\r' {
                            end -= 1;
                        }
                        ret.push((start, end.saturating_sub(start)));
                    }
                    if is_close {
                        break;
                    }
                    part_start = Some((line_end + 1).min(body.len()));
                }
            }
            line_start = line_end + 1;
        }
        if let Some(start) = part_start {
            ret.push((start, body.len() - start));
        }
        ret
    }
}

pub mod encodings {
    //! Content-Transfer-Encoding decoders.
    use data_encoding::BASE64_MIME;
    use nom::{character::is_hex_digit, multi::many0, number::complete::le_u8};

    use super::*;
    use crate::email::body::TransferEncoding;

    fn hex_value(c: u8) -> u8 {
        if c < b':' {
            c - 48
        } else if c < b'[' {
            c - 55
        } else {
            c - 87
        }
    }

    pub fn quoted_printable_byte(input: &[u8]) -> IResult<&[u8], u8> {
        if input.len() < 3 {
            Err(nom::Err::Error(
                (
                    input,
                    "quoted_printable_byte(): input too short to be quoted_printable",
                )
                    .into(),
            ))
        } else if input[0] == b'=' && is_hex_digit(input[1]) && is_hex_digit(input[2]) {
            Ok((&input[3..], hex_value(input[1]) * 16 + hex_value(input[2])))
        } else {
            Err(nom::Err::Error(
                (input, "quoted_printable_byte(): invalid input").into(),
            ))
        }
    }

    fn quoted_printable_soft_break(input: &[u8]) -> IResult<&[u8], ()> {
        if let Some(rest) = input.strip_prefix(b"=\r\n") {
            Ok((rest, ()))
        } else if let Some(rest) = input.strip_prefix(b"=\n") {
            Ok((rest, ()))
        } else {
            Err(nom::Err::Error(
                (input, "quoted_printable_soft_break(): invalid input").into(),
            ))
        }
    }

    pub fn quoted_printable_bytes(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
        let (rest, bytes) = many0(alt((
            map(quoted_printable_soft_break, |()| None),
            map(quoted_printable_byte, Some),
            map(le_u8, Some),
        )))(input)?;
        Ok((rest, bytes.into_iter().flatten().collect()))
    }

    /// Undo the transfer encoding of a body. Undecodable input is returned
    /// as is.
    pub fn decode(input: &[u8], encoding: &TransferEncoding) -> Vec<u8> {
        match encoding {
            TransferEncoding::QuotedPrintable => quoted_printable_bytes(input)
                .map(|(_, v)| v)
                .unwrap_or_else(|_| input.to_vec()),
            TransferEncoding::Base64 => {
                let stripped: Vec<u8> = input
                    .iter()
                    .copied()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                BASE64_MIME
                    .decode(&stripped)
                    .unwrap_or_else(|_| input.to_vec())
            }
            _ => input.to_vec(),
        }
    }
}
