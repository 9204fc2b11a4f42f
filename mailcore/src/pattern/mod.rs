/*
 * mailcore - pattern module
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

//! Search patterns.
//!
//! A pattern such as `~f alice ~d <1w | =s "foo"` is compiled with
//! [`compile`] into a [`PatternList`] tree and evaluated per message with
//! [`PatternList::exec`]. Juxtaposition is AND, `|` is OR and binds looser,
//! so `A B | C` is `(A & B) | C`.
//!
//! Each leaf is a prefix, a tag and an argument:
//!
//! - `~` matches a regular expression
//! - `=` matches a literal substring
//! - `%` matches an address group by name
//!
//! Lower-case arguments match case-insensitively.

use std::fmt;

use regex::Regex;

pub mod compile;
pub mod date;
pub mod exec;
pub mod flags;
pub mod func;

pub use compile::{check_simple, compile, CompileContext};
pub use exec::{pattern_exec, ExecFlags, PatternCache, PatternContext};
pub use flags::{lookup_op, lookup_tag, EatArg, PatternFlags, PATTERN_FLAGS};
pub use func::{
    pattern_func, search_next, PatternAction, SearchDirection, SearchHit, SearchState, NO_MATCHES,
};

bitflags! {
    /// Restrictions and options for [`compile`].
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct CompileFlags: u8 {
        /// Tags that read the whole message are allowed.
        const FULL_MSG = 1 << 0;
        /// Relative dates are recomputed at every evaluation.
        const DYNAMIC  = 1 << 1;
    }
}

/// What a [`Pattern`] node tests.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PatternOp {
    And,
    Or,
    /// Some message of the thread matches.
    Thread,
    /// The parent message matches.
    Parent,
    /// Some child message matches.
    Children,
    All,
    Expired,
    Superseded,
    Flag,
    Tag,
    New,
    Unread,
    Replied,
    Old,
    Read,
    Deleted,
    MessageRange,
    Date,
    DateReceived,
    Body,
    Header,
    WholeMessage,
    ServerSearch,
    Sender,
    From,
    To,
    Cc,
    Bcc,
    Subject,
    MessageId,
    MessageIdExternal,
    Score,
    Size,
    Reference,
    Address,
    Recipient,
    List,
    SubscribedList,
    PersonalRecipient,
    PersonalFrom,
    Collapsed,
    CryptSign,
    CryptVerified,
    CryptEncrypt,
    PgpKey,
    XLabel,
    DriverTags,
    Spam,
    Duplicated,
    MimeAttachment,
    MimeType,
    Unreferenced,
    Broken,
    Newsgroups,
}

impl PatternOp {
    /// Nodes whose payload is a list of sub-patterns.
    pub fn is_compound(self) -> bool {
        matches!(
            self,
            Self::And | Self::Or | Self::Thread | Self::Parent | Self::Children
        )
    }
}

/// The argument of a [`Pattern`] node.
#[derive(Clone, Debug)]
pub enum PatternPayload {
    Regex(Regex),
    /// `=` prefix.
    Literal { text: String, ign_case: bool },
    /// `%` prefix: name of an address group.
    AddressGroup(String),
    /// Inclusive bounds. `max: None` is unbounded.
    NumericRange { min: i64, max: Option<i64> },
    /// Inclusive bounds in seconds since the epoch. A dynamic range keeps
    /// its source text and is recomputed when evaluated.
    DateRange {
        min: i64,
        max: i64,
        dynamic: Option<String>,
    },
    /// Message-ids returned by the external search command.
    MessageIdList(Vec<String>),
    SubPattern(Vec<Pattern>),
}

/// One node of a compiled pattern.
#[derive(Clone, Debug)]
pub struct Pattern {
    pub op: PatternOp,
    pub pat_not: bool,
    /// Every address of the field must match, not just one.
    pub all_addr: bool,
    /// Only addresses that are the target of an alias match.
    pub is_alias: bool,
    pub payload: Option<PatternPayload>,
}

impl Pattern {
    pub fn new(op: PatternOp) -> Self {
        Self {
            op,
            pat_not: false,
            all_addr: false,
            is_alias: false,
            payload: None,
        }
    }

    pub fn with_children(op: PatternOp, children: Vec<Self>) -> Self {
        Self {
            payload: Some(PatternPayload::SubPattern(children)),
            ..Self::new(op)
        }
    }

    pub fn children(&self) -> &[Self] {
        match self.payload {
            Some(PatternPayload::SubPattern(ref children)) => children,
            _ => &[],
        }
    }

    /// `true` if evaluating this tree may need to read message contents or
    /// ask the server.
    pub fn needs_io(&self) -> bool {
        matches!(
            self.op,
            PatternOp::Body
                | PatternOp::Header
                | PatternOp::WholeMessage
                | PatternOp::ServerSearch
        ) || self.children().iter().any(Self::needs_io)
    }

    /// Literal leaves that a server-side search can answer.
    pub fn is_string_match(&self) -> bool {
        matches!(self.payload, Some(PatternPayload::Literal { .. }))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if self.pat_not {
            write!(fmt, "!")?;
        }
        if self.all_addr {
            write!(fmt, "^")?;
        }
        if self.is_alias {
            write!(fmt, "@")?;
        }
        match self.op {
            PatternOp::And | PatternOp::Or => {
                write!(
                    fmt,
                    "({}",
                    if self.op == PatternOp::And { "and" } else { "or" }
                )?;
                for c in self.children() {
                    write!(fmt, " {}", c)?;
                }
                write!(fmt, ")")
            }
            PatternOp::Thread | PatternOp::Parent | PatternOp::Children => {
                let prefix = match self.op {
                    PatternOp::Thread => "~(",
                    PatternOp::Parent => "~<(",
                    _ => "~>(",
                };
                write!(fmt, "{}", prefix)?;
                for (i, c) in self.children().iter().enumerate() {
                    if i > 0 {
                        write!(fmt, " ")?;
                    }
                    write!(fmt, "{}", c)?;
                }
                write!(fmt, ")")
            }
            op => {
                let tag = lookup_op(op).map_or('?', |f| f.tag);
                match self.payload {
                    Some(PatternPayload::Literal { ref text, .. }) => {
                        write!(fmt, "={} {:?}", tag, text)
                    }
                    Some(PatternPayload::AddressGroup(ref name)) => {
                        write!(fmt, "%{} {:?}", tag, name)
                    }
                    Some(PatternPayload::Regex(ref rx)) => write!(fmt, "~{} {:?}", tag, rx.as_str()),
                    Some(PatternPayload::NumericRange { min, max }) => match max {
                        Some(max) => write!(fmt, "~{} {}-{}", tag, min, max),
                        None => write!(fmt, "~{} {}-", tag, min),
                    },
                    Some(PatternPayload::DateRange { ref dynamic, min, max }) => match dynamic {
                        Some(src) => write!(fmt, "~{} {}", tag, src),
                        None => write!(fmt, "~{} @{}-@{}", tag, min, max),
                    },
                    Some(PatternPayload::MessageIdList(ref ids)) => {
                        write!(fmt, "~{} [{}]", tag, ids.len())
                    }
                    _ => write!(fmt, "~{}", tag),
                }
            }
        }
    }
}

/// A compiled pattern and the text it was compiled from.
#[derive(Clone, Debug)]
pub struct PatternList {
    root: Pattern,
    source: String,
}

impl PatternList {
    pub fn new(root: Pattern, source: &str) -> Self {
        Self {
            root,
            source: source.to_string(),
        }
    }

    pub fn root(&self) -> &Pattern {
        &self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Matches every message without looking at any.
    pub fn is_match_all(&self) -> bool {
        self.root.op == PatternOp::All && !self.root.pat_not
    }

    /// Evaluate against the message at `msgno`.
    ///
    /// With [`ExecFlags::BEST_EFFORT`] a read error makes the message a
    /// non-match; otherwise it is returned.
    pub fn exec(
        &self,
        ctx: &PatternContext<'_>,
        msgno: usize,
        cache: &mut PatternCache,
    ) -> crate::error::Result<bool> {
        match pattern_exec(&self.root, ctx, msgno, cache) {
            Err(err)
                if err.kind == crate::error::ErrorKind::Io
                    && ctx.flags.contains(ExecFlags::BEST_EFFORT) =>
            {
                log::warn!("pattern: message {} not matched: {}", msgno + 1, err.details);
                Ok(false)
            }
            other => other,
        }
    }
}

impl fmt::Display for PatternList {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.root)
    }
}
