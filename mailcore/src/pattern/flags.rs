/*
 * mailcore - pattern tag table
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

use super::{CompileFlags, PatternOp};

/// The kind of argument a tag takes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EatArg {
    None,
    Regex,
    Date,
    Range,
    MessageRange,
    Query,
}

/// One entry of [`PATTERN_FLAGS`].
#[derive(Clone, Copy, Debug)]
pub struct PatternFlags {
    pub tag: char,
    pub op: PatternOp,
    /// The tag is only accepted when compiling with these flags.
    pub flags: CompileFlags,
    pub eat_arg: EatArg,
    pub desc: &'static str,
}

const fn entry(
    tag: char,
    op: PatternOp,
    flags: CompileFlags,
    eat_arg: EatArg,
    desc: &'static str,
) -> PatternFlags {
    PatternFlags {
        tag,
        op,
        flags,
        eat_arg,
        desc,
    }
}

const NONE: CompileFlags = CompileFlags::empty();
const FULL: CompileFlags = CompileFlags::FULL_MSG;

pub const PATTERN_FLAGS: &[PatternFlags] = &[
    entry('A', PatternOp::All, NONE, EatArg::None, "all messages"),
    entry('b', PatternOp::Body, FULL, EatArg::Regex, "messages whose body matches EXPR"),
    entry('B', PatternOp::WholeMessage, FULL, EatArg::Regex, "messages whose body or headers match EXPR"),
    entry('c', PatternOp::Cc, NONE, EatArg::Regex, "messages whose CC header matches EXPR"),
    entry('C', PatternOp::Recipient, NONE, EatArg::Regex, "messages whose recipient matches EXPR"),
    entry('d', PatternOp::Date, NONE, EatArg::Date, "messages sent in DATERANGE"),
    entry('D', PatternOp::Deleted, NONE, EatArg::None, "deleted messages"),
    entry('e', PatternOp::Sender, NONE, EatArg::Regex, "messages whose Sender header matches EXPR"),
    entry('E', PatternOp::Expired, NONE, EatArg::None, "expired messages"),
    entry('f', PatternOp::From, NONE, EatArg::Regex, "messages whose From header matches EXPR"),
    entry('F', PatternOp::Flag, NONE, EatArg::None, "flagged messages"),
    entry('g', PatternOp::CryptSign, NONE, EatArg::None, "cryptographically signed messages"),
    entry('G', PatternOp::CryptEncrypt, NONE, EatArg::None, "cryptographically encrypted messages"),
    entry('h', PatternOp::Header, FULL, EatArg::Regex, "messages whose header matches EXPR"),
    entry('H', PatternOp::Spam, NONE, EatArg::Regex, "messages whose spam tag matches EXPR"),
    entry('i', PatternOp::MessageId, NONE, EatArg::Regex, "messages whose Message-ID matches EXPR"),
    entry('I', PatternOp::MessageIdExternal, NONE, EatArg::Query, "messages whose Message-ID is returned by the external search command"),
    entry('k', PatternOp::PgpKey, NONE, EatArg::None, "messages which contain PGP key"),
    entry('K', PatternOp::Bcc, NONE, EatArg::Regex, "messages whose BCC header matches EXPR"),
    entry('l', PatternOp::List, NONE, EatArg::None, "messages addressed to known mailing lists"),
    entry('L', PatternOp::Address, NONE, EatArg::Regex, "messages whose From/Sender/To/CC matches EXPR"),
    entry('m', PatternOp::MessageRange, NONE, EatArg::MessageRange, "messages whose number is in RANGE"),
    entry('M', PatternOp::MimeType, FULL, EatArg::Regex, "messages with a Content-Type matching EXPR"),
    entry('n', PatternOp::Score, NONE, EatArg::Range, "messages whose score is in RANGE"),
    entry('N', PatternOp::New, NONE, EatArg::None, "new messages"),
    entry('O', PatternOp::Old, NONE, EatArg::None, "old messages"),
    entry('p', PatternOp::PersonalRecipient, NONE, EatArg::None, "messages addressed to you"),
    entry('P', PatternOp::PersonalFrom, NONE, EatArg::None, "messages from you"),
    entry('Q', PatternOp::Replied, NONE, EatArg::None, "messages which have been replied to"),
    entry('r', PatternOp::DateReceived, NONE, EatArg::Date, "messages received in DATERANGE"),
    entry('R', PatternOp::Read, NONE, EatArg::None, "already read messages"),
    entry('s', PatternOp::Subject, NONE, EatArg::Regex, "messages whose Subject header matches EXPR"),
    entry('S', PatternOp::Superseded, NONE, EatArg::None, "superseded messages"),
    entry('t', PatternOp::To, NONE, EatArg::Regex, "messages whose To header matches EXPR"),
    entry('T', PatternOp::Tag, NONE, EatArg::None, "tagged messages"),
    entry('u', PatternOp::SubscribedList, NONE, EatArg::None, "messages addressed to subscribed mailing lists"),
    entry('U', PatternOp::Unread, NONE, EatArg::None, "unread messages"),
    entry('v', PatternOp::Collapsed, NONE, EatArg::None, "messages in collapsed threads"),
    entry('V', PatternOp::CryptVerified, NONE, EatArg::None, "cryptographically verified messages"),
    entry('w', PatternOp::Newsgroups, NONE, EatArg::Regex, "newsgroups matching EXPR"),
    entry('x', PatternOp::Reference, NONE, EatArg::Regex, "messages whose References header matches EXPR"),
    entry('X', PatternOp::MimeAttachment, NONE, EatArg::Range, "messages with RANGE attachments"),
    entry('y', PatternOp::XLabel, NONE, EatArg::Regex, "messages whose X-Label header matches EXPR"),
    entry('Y', PatternOp::DriverTags, NONE, EatArg::Regex, "messages whose tags match EXPR"),
    entry('z', PatternOp::Size, NONE, EatArg::Range, "messages whose size is in RANGE"),
    entry('=', PatternOp::Duplicated, NONE, EatArg::None, "duplicated messages"),
    entry('$', PatternOp::Unreferenced, NONE, EatArg::None, "unreferenced messages"),
    entry('#', PatternOp::Broken, NONE, EatArg::None, "broken threads"),
    entry('/', PatternOp::ServerSearch, NONE, EatArg::Regex, "IMAP custom server-side search for STRING"),
];

/// The table entry for a tag character.
pub fn lookup_tag(tag: char) -> Option<&'static PatternFlags> {
    PATTERN_FLAGS.iter().find(|f| f.tag == tag)
}

/// The table entry for a leaf op. Compound ops have none.
pub fn lookup_op(op: PatternOp) -> Option<&'static PatternFlags> {
    PATTERN_FLAGS.iter().find(|f| f.op == op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_flags_lookup() {
        let f = lookup_tag('f').unwrap();
        assert_eq!(f.op, PatternOp::From);
        assert_eq!(f.eat_arg, EatArg::Regex);
        assert!(f.flags.is_empty());

        for tag in ['b', 'B', 'h', 'M'] {
            assert!(lookup_tag(tag).unwrap().flags.contains(CompileFlags::FULL_MSG));
        }
        assert_eq!(lookup_tag('I').unwrap().eat_arg, EatArg::Query);
        assert!(lookup_tag('j').is_none());
        assert!(lookup_tag('(').is_none());

        assert_eq!(lookup_op(PatternOp::Date).unwrap().tag, 'd');
        assert!(lookup_op(PatternOp::And).is_none());

        let mut tags: Vec<char> = PATTERN_FLAGS.iter().map(|f| f.tag).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), PATTERN_FLAGS.len());
    }
}
