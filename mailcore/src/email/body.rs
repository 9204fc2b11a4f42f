/*
 * mailcore - body module
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

//! MIME tree.

use std::fmt;

use super::{
    envelope::Envelope,
    parser::{
        attachments::{content_disposition, content_type, multipart_parts},
        headers::{parse_headers, split_headers},
    },
    Email,
};

/// Nested `message/rfc822` parts deeper than this are not parsed.
const MAX_DEPTH: usize = 8;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ContentType {
    Other,
    Audio,
    Application,
    Image,
    Message,
    Model,
    Multipart,
    #[default]
    Text,
    Video,
}

impl ContentType {
    pub fn from_major(major: &str) -> Self {
        match major.to_ascii_lowercase().as_str() {
            "audio" => Self::Audio,
            "application" => Self::Application,
            "image" => Self::Image,
            "message" => Self::Message,
            "model" => Self::Model,
            "multipart" => Self::Multipart,
            "text" => Self::Text,
            "video" => Self::Video,
            _ => Self::Other,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Other => "x-unknown",
            Self::Audio => "audio",
            Self::Application => "application",
            Self::Image => "image",
            Self::Message => "message",
            Self::Model => "model",
            Self::Multipart => "multipart",
            Self::Text => "text",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum TransferEncoding {
    #[default]
    SevenBit,
    EightBit,
    Binary,
    QuotedPrintable,
    Base64,
    Uuencoded,
    Other,
}

impl TransferEncoding {
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "7bit" => Self::SevenBit,
            "8bit" => Self::EightBit,
            "binary" => Self::Binary,
            "quoted-printable" => Self::QuotedPrintable,
            "base64" => Self::Base64,
            "x-uuencode" | "x-uue" | "uuencode" => Self::Uuencoded,
            _ => Self::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Disposition {
    #[default]
    Inline,
    Attachment,
    FormData,
    None,
}

/// A node of the MIME tree. Offsets are into the message stream the body
/// was parsed from.
#[derive(Clone, Debug, Default)]
pub struct Body {
    pub content_type: ContentType,
    pub subtype: String,
    pub parameters: Vec<(String, String)>,
    pub encoding: TransferEncoding,
    pub disposition: Disposition,
    pub filename: Option<String>,
    pub description: Option<String>,
    /// Start of this part's headers.
    pub hdr_offset: usize,
    /// Start of this part's content.
    pub offset: usize,
    /// Length of the content.
    pub length: usize,
    pub parts: Vec<Body>,
    /// The enclosed message of a `message/rfc822` part.
    pub email: Option<Box<Email>>,
    /// This part counts as an attachment.
    pub attach_qualifies: bool,
    /// Number of qualifying attachments below this part.
    pub attach_count: usize,
}

impl Body {
    /// A single `text/plain` body covering `offset..offset + length`.
    pub fn text_plain(hdr_offset: usize, offset: usize, length: usize) -> Self {
        Self {
            subtype: "plain".to_string(),
            hdr_offset,
            offset,
            length,
            ..Self::default()
        }
    }

    /// Parse the part of `stream` in `hdr_offset..end`.
    pub fn parse(stream: &[u8], hdr_offset: usize, end: usize) -> Self {
        Self::parse_part(stream, hdr_offset, end, (ContentType::Text, "plain"), 0)
    }

    fn parse_part(
        stream: &[u8],
        hdr_offset: usize,
        end: usize,
        default_type: (ContentType, &str),
        depth: usize,
    ) -> Self {
        let end = end.min(stream.len());
        let hdr_offset = hdr_offset.min(end);
        let part = &stream[hdr_offset..end];
        let (_, body_start) = split_headers(part);
        let headers = parse_headers(part);
        let mut ret = Self {
            content_type: default_type.0,
            subtype: default_type.1.to_string(),
            hdr_offset,
            offset: hdr_offset + body_start.min(part.len()),
            ..Self::default()
        };
        ret.length = end - ret.offset;
        for (name, value) in &headers {
            match name.to_ascii_lowercase().as_str() {
                "content-type" => {
                    if let Ok((_, (major, minor, params))) = content_type(value) {
                        ret.content_type = ContentType::from_major(&major);
                        ret.subtype = minor;
                        ret.parameters = params;
                    }
                }
                "content-transfer-encoding" => {
                    ret.encoding = TransferEncoding::from_header(value);
                }
                "content-disposition" => {
                    if let Ok((_, (kind, params))) = content_disposition(value) {
                        ret.disposition = match kind.as_str() {
                            "inline" => Disposition::Inline,
                            "attachment" => Disposition::Attachment,
                            "form-data" => Disposition::FormData,
                            _ => Disposition::None,
                        };
                        if let Some((_, f)) = params.iter().find(|(k, _)| k == "filename") {
                            ret.filename = Some(f.clone());
                        }
                    }
                }
                "content-description" => ret.description = Some(value.clone()),
                _ => {}
            }
        }
        if ret.filename.is_none() {
            ret.filename = ret.parameter("name").map(str::to_string);
        }
        if depth >= MAX_DEPTH {
            return ret;
        }
        match ret.content_type {
            ContentType::Multipart => {
                if let Some(boundary) = ret.parameter("boundary").map(str::to_string) {
                    let child_default = if ret.subtype == "digest" {
                        (ContentType::Message, "rfc822")
                    } else {
                        (ContentType::Text, "plain")
                    };
                    ret.parts = multipart_parts(&stream[ret.offset..end], &boundary)
                        .into_iter()
                        .map(|(o, l)| {
                            Self::parse_part(
                                stream,
                                ret.offset + o,
                                ret.offset + o + l,
                                child_default,
                                depth + 1,
                            )
                        })
                        .collect();
                }
            }
            ContentType::Message if ret.subtype == "rfc822" || ret.subtype == "news" => {
                let inner = &stream[ret.offset..end];
                let env = Envelope::from_headers(&parse_headers(inner), None);
                let body = Self::parse_part(
                    stream,
                    ret.offset,
                    end,
                    (ContentType::Text, "plain"),
                    depth + 1,
                );
                ret.email = Some(Box::new(Email::new(env, body)));
            }
            _ => {}
        }
        ret
    }

    /// Case-insensitive parameter lookup.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `type/subtype`
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.content_type, self.subtype)
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type == ContentType::Multipart
    }

    /// Walk this part and every part below it, depth first.
    pub fn walk(&self) -> Vec<&Self> {
        let mut ret = vec![];
        let mut stack = vec![self];
        while let Some(b) = stack.pop() {
            ret.push(b);
            if let Some(e) = b.email.as_ref() {
                stack.push(&e.body);
            }
            stack.extend(b.parts.iter().rev());
        }
        ret
    }

    /// Mark the parts that count as attachments and return how many there
    /// are. The main text of a message never counts; a part counts if it
    /// is marked as an attachment, has a file name, or is not text.
    pub fn count_attachments(&mut self) -> usize {
        self.count_parts(true)
    }

    fn count_parts(&mut self, top: bool) -> usize {
        let count = match self.content_type {
            ContentType::Multipart => {
                self.attach_qualifies = false;
                let alternative = self.subtype == "alternative";
                let mut count = 0;
                for (i, part) in self.parts.iter_mut().enumerate() {
                    // the first text part of a message is its body
                    let is_body = (top && i == 0) || alternative;
                    count += part.count_parts(is_body);
                }
                count
            }
            ContentType::Message => {
                self.attach_qualifies = !top;
                usize::from(self.attach_qualifies)
            }
            _ => {
                self.attach_qualifies = self.disposition == Disposition::Attachment
                    || self.filename.is_some()
                    || (!top && self.content_type != ContentType::Text);
                usize::from(self.attach_qualifies)
            }
        };
        self.attach_count = count;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &[u8] = b"From: a@example.com
Content-Type: multipart/mixed; boundary=\"b1\"

--b1
Content-Type: text/plain

hello
--b1
Content-Type: application/pdf; name=report.pdf
Content-Disposition: attachment; filename=report.pdf
Content-Transfer-Encoding: base64

AAAA
--b1
Content-Type: message/rfc822

From: inner@example.com
Subject: forwarded

inner body
--b1--
";

    #[test]
    fn test_body_parse_multipart() {
        let (_, offset) = split_headers(MULTIPART);
        let mut body = Body::parse(MULTIPART, 0, MULTIPART.len());
        assert_eq!(body.mime_type(), "multipart/mixed");
        assert_eq!(body.offset, offset);
        assert_eq!(body.parts.len(), 3);
        assert_eq!(body.parts[0].mime_type(), "text/plain");
        let text = &body.parts[0];
        assert_eq!(&MULTIPART[text.offset..text.offset + text.length], b"hello");
        assert_eq!(body.parts[1].filename.as_deref(), Some("report.pdf"));
        assert_eq!(body.parts[1].encoding, TransferEncoding::Base64);
        assert_eq!(body.parts[1].disposition, Disposition::Attachment);
        let inner = body.parts[2].email.as_ref().unwrap();
        assert_eq!(inner.env.subject(), Some("forwarded"));

        assert_eq!(body.count_attachments(), 2);
        assert!(!body.parts[0].attach_qualifies);
        assert!(body.parts[1].attach_qualifies);
        assert!(body.parts[2].attach_qualifies);
        assert_eq!(body.walk().len(), 5);
    }

    #[test]
    fn test_body_single_part() {
        let raw = b"Subject: x\n\nplain text\n";
        let mut body = Body::parse(raw, 0, raw.len());
        assert_eq!(body.mime_type(), "text/plain");
        assert_eq!(body.length, "plain text\n".len());
        assert_eq!(body.count_attachments(), 0);
    }
}
