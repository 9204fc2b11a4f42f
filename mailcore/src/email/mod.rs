/*
 * mailcore - email module
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

//! Email parsing and in-memory representation.
//!
//! - [`Envelope`] holds the parsed header block
//! - [`Body`] is the MIME tree
//! - [`Email`] ties them together with flags, and with the per-view state
//!   the threading engine and the index need

use regex::Regex;

pub mod address;
pub mod body;
pub mod envelope;
pub mod parser;
pub mod sort;

pub use address::*;
pub use body::*;
pub use envelope::*;

use crate::{
    crypt::SecurityFlags,
    error::{Error, ErrorKind, Result},
    thread::{ThreadId, TreeChar},
    utils::datetime::UnixTimestamp,
};

bitflags! {
    /// Stored message flags. Whether a message is "new" is derived: it is
    /// neither read nor old.
    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
    pub struct Flag: u8 {
        const READ    = 1 << 0;
        const OLD     = 1 << 1;
        const REPLIED = 1 << 2;
        const FLAGGED = 1 << 3;
        const DELETED = 1 << 4;
        const TAGGED  = 1 << 5;
        /// Delete for good on the next sync.
        const PURGE   = 1 << 6;
    }
}

/// One message.
#[derive(Clone, Debug)]
pub struct Email {
    pub env: Envelope,
    pub body: Body,
    /// Position in the mailbox, in insertion order.
    pub msgno: usize,
    /// Position in the current view, `None` when hidden.
    pub vnum: Option<usize>,
    /// Identity stamp, unique for the lifetime of the mailbox.
    pub sequence: u64,
    pub flags: Flag,
    pub received: UnixTimestamp,
    pub score: i64,
    pub security: SecurityFlags,
    pub expired: bool,
    pub superseded: bool,
    /// Has unsaved changes.
    pub changed: bool,
    pub attach_valid: bool,
    pub attach_total: usize,
    /// The real subject differs from the thread parent's.
    pub subject_changed: bool,
    /// Show the subject in the index.
    pub display_subject: bool,
    /// Root of a collapsed thread.
    pub collapsed: bool,
    /// Passes the current limit.
    pub visible: bool,
    pub limit_visited: bool,
    /// Linked into the thread forest.
    pub threaded: bool,
    /// Messages hidden under this one while its thread is collapsed.
    pub num_hidden: usize,
    pub thread: Option<ThreadId>,
    /// Tree drawing prefix for the index.
    pub tree: Vec<TreeChar>,
    /// Set by a server-side search.
    pub matched: bool,
    pub searched: bool,
    pub tags: Vec<String>,
}

impl Email {
    pub fn new(env: Envelope, body: Body) -> Self {
        let mut ret = Self {
            env,
            body: Body::default(),
            msgno: 0,
            vnum: None,
            sequence: 0,
            flags: Flag::empty(),
            received: 0,
            score: 0,
            security: SecurityFlags::empty(),
            expired: false,
            superseded: false,
            changed: false,
            attach_valid: false,
            attach_total: 0,
            subject_changed: false,
            display_subject: false,
            collapsed: false,
            visible: true,
            limit_visited: false,
            threaded: false,
            num_hidden: 0,
            thread: None,
            tree: vec![],
            matched: false,
            searched: false,
            tags: vec![],
        };
        ret.set_body(body);
        ret
    }

    /// Parse a whole RFC 5322 message.
    pub fn from_bytes(bytes: &[u8], reply_regex: Option<&Regex>) -> Result<Self> {
        let headers = parser::headers::parse_headers(bytes);
        if headers.is_empty() {
            return Err(Error::new("Could not parse message: no headers found")
                .set_kind(ErrorKind::Backend));
        }
        let env = Envelope::from_headers(&headers, reply_regex);
        let body = Body::parse(bytes, 0, bytes.len());
        let mut ret = Self::new(env, body);
        ret.received = ret.env.date;
        Ok(ret)
    }

    /// Replace the MIME tree, recounting attachments.
    pub fn set_body(&mut self, mut body: Body) {
        self.attach_total = body.count_attachments();
        self.attach_valid = true;
        self.security = crate::crypt::crypt_query(&body);
        self.body = body;
    }

    pub fn is_read(&self) -> bool {
        self.flags.contains(Flag::READ)
    }

    pub fn is_old(&self) -> bool {
        self.flags.contains(Flag::OLD)
    }

    /// Neither read nor old.
    pub fn is_new(&self) -> bool {
        !self.flags.intersects(Flag::READ | Flag::OLD)
    }

    pub fn is_flagged(&self) -> bool {
        self.flags.contains(Flag::FLAGGED)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(Flag::DELETED)
    }

    pub fn is_tagged(&self) -> bool {
        self.flags.contains(Flag::TAGGED)
    }

    pub fn is_replied(&self) -> bool {
        self.flags.contains(Flag::REPLIED)
    }

    /// Size of the message content.
    pub fn size(&self) -> usize {
        self.body.length
    }

    /// Bytes the message occupies in its mailbox, headers included.
    pub fn stored_size(&self) -> usize {
        self.body.length + self.body.offset - self.body.hdr_offset
    }
}
