/*
 * mailcore - mailbox module
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

//! A collection of [`Email`] values with stable insertion-order numbers.
//!
//! Only storage backends insert and remove messages. Removing leaves a hole
//! so that `msgno` values held by observers stay valid until the next
//! [`Mailbox::compact`].

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use smallvec::smallvec;

use crate::{
    backends::MailBackend,
    email::{Email, Flag},
    notify::{EmailEvent, EmailRef, Event, EventData, EventKind, MailboxEvent, Notify},
};

/// A flag change requested through [`Mailbox::set_flag`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SetFlag {
    Delete,
    Purge,
    /// Clearing `New` marks the message read.
    New,
    Old,
    Read,
    Replied,
    Flag,
    Tag,
}

impl std::str::FromStr for SetFlag {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "delete" | "deleted" => Self::Delete,
            "purge" => Self::Purge,
            "new" => Self::New,
            "old" => Self::Old,
            "read" => Self::Read,
            "replied" => Self::Replied,
            "flag" | "flagged" => Self::Flag,
            "tag" | "tagged" => Self::Tag,
            other => {
                return Err(crate::error::Error::new(format!("Unknown flag `{}`", other)))
            }
        })
    }
}

/// What the mailbox allows to be changed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct MailboxPermissions {
    pub set_seen: bool,
    pub set_flags: bool,
    pub delete_messages: bool,
}

impl Default for MailboxPermissions {
    fn default() -> Self {
        Self {
            set_seen: true,
            set_flags: true,
            delete_messages: true,
        }
    }
}

impl fmt::Display for MailboxPermissions {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{:#?}", self)
    }
}

pub struct Mailbox {
    pub path: String,
    pub name: String,
    emails: Vec<Option<Email>>,
    next_sequence: u64,
    pub msg_unread: usize,
    pub msg_new: usize,
    pub msg_flagged: usize,
    pub msg_deleted: usize,
    pub msg_tagged: usize,
    /// Has unsynced changes.
    pub changed: bool,
    pub readonly: bool,
    pub permissions: MailboxPermissions,
    /// The number of visible messages, maintained by the view.
    pub vcount: usize,
    pub id_hash: Option<HashMap<String, usize>>,
    /// Real subject to the messages carrying it, in msgno order.
    pub subj_hash: Option<HashMap<String, Vec<usize>>>,
    pub notify: Notify,
    pub backend: Option<Rc<dyn MailBackend>>,
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct(stringify!(Mailbox))
            .field("path", &self.path)
            .field("msg_count", &self.msg_count())
            .field("msg_unread", &self.msg_unread)
            .field("msg_new", &self.msg_new)
            .field("msg_flagged", &self.msg_flagged)
            .field("msg_deleted", &self.msg_deleted)
            .field("msg_tagged", &self.msg_tagged)
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .finish()
    }
}

impl Mailbox {
    pub fn new(path: &str) -> Self {
        let name = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(path)
            .to_string();
        Self {
            path: path.to_string(),
            name,
            emails: vec![],
            next_sequence: 1,
            msg_unread: 0,
            msg_new: 0,
            msg_flagged: 0,
            msg_deleted: 0,
            msg_tagged: 0,
            changed: false,
            readonly: false,
            permissions: MailboxPermissions::default(),
            vcount: 0,
            id_hash: None,
            subj_hash: None,
            notify: Notify::new(),
            backend: None,
        }
    }

    /// Number of slots, holes included.
    pub fn msg_count(&self) -> usize {
        self.emails.len()
    }

    pub fn email(&self, msgno: usize) -> Option<&Email> {
        self.emails.get(msgno).and_then(Option::as_ref)
    }

    pub fn email_mut(&mut self, msgno: usize) -> Option<&mut Email> {
        self.emails.get_mut(msgno).and_then(Option::as_mut)
    }

    /// Every present email with its msgno.
    pub fn emails(&self) -> impl Iterator<Item = (usize, &Email)> + '_ {
        self.emails
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, e)))
    }

    pub fn emails_mut(&mut self) -> impl Iterator<Item = &mut Email> + '_ {
        self.emails.iter_mut().flatten()
    }

    /// Store `e` in the next slot without publishing anything.
    ///
    /// Assigns `msgno` and a fresh `sequence`. See [`mailbox_add_email`] for
    /// the variant that notifies observers.
    pub fn insert_email(&mut self, mut e: Email) -> EmailRef {
        e.msgno = self.emails.len();
        e.sequence = self.next_sequence;
        self.next_sequence += 1;
        let ret = EmailRef {
            msgno: e.msgno,
            sequence: e.sequence,
        };
        if let (Some(hash), Some(id)) = (self.id_hash.as_mut(), e.env.message_id.as_ref()) {
            hash.entry(id.clone()).or_insert(e.msgno);
        }
        if let (Some(hash), Some(subj)) = (self.subj_hash.as_mut(), e.env.real_subj()) {
            hash.entry(subj.to_string()).or_default().push(e.msgno);
        }
        self.emails.push(Some(e));
        ret
    }

    /// Take the email out of its slot, leaving a hole.
    pub fn take_email(&mut self, msgno: usize) -> Option<Email> {
        let e = self.emails.get_mut(msgno)?.take()?;
        if let (Some(hash), Some(id)) = (self.id_hash.as_mut(), e.env.message_id.as_ref()) {
            if hash.get(id) == Some(&msgno) {
                hash.remove(id);
            }
        }
        if let (Some(hash), Some(subj)) = (self.subj_hash.as_mut(), e.env.real_subj()) {
            if let Some(list) = hash.get_mut(subj) {
                list.retain(|&n| n != msgno);
            }
        }
        Some(e)
    }

    /// Drop holes and every email `keep` rejects, renumbering the rest.
    ///
    /// Returns the removed emails. Counters and hashes are not touched; the
    /// view recomputes them.
    pub fn compact<F: Fn(&Email) -> bool>(&mut self, keep: F) -> Vec<Email> {
        let mut removed = vec![];
        let mut kept = Vec::with_capacity(self.emails.len());
        for e in self.emails.drain(..).flatten() {
            if keep(&e) {
                kept.push(Some(e));
            } else {
                removed.push(e);
            }
        }
        for (i, e) in kept.iter_mut().flatten().enumerate() {
            e.msgno = i;
        }
        self.emails = kept;
        removed
    }

    pub fn clear_counters(&mut self) {
        self.msg_unread = 0;
        self.msg_new = 0;
        self.msg_flagged = 0;
        self.msg_deleted = 0;
        self.msg_tagged = 0;
    }

    /// Add the flags of the email at `msgno` to the counters.
    pub fn count_email(&mut self, msgno: usize) {
        let Some(flags) = self.email(msgno).map(|e| e.flags) else {
            return;
        };
        if flags.contains(Flag::TAGGED) {
            self.msg_tagged += 1;
        }
        if flags.contains(Flag::FLAGGED) {
            self.msg_flagged += 1;
        }
        if flags.contains(Flag::DELETED) {
            self.msg_deleted += 1;
        }
        if !flags.contains(Flag::READ) {
            self.msg_unread += 1;
            if !flags.contains(Flag::OLD) {
                self.msg_new += 1;
            }
        }
    }

    /// Recompute every counter from the email flags.
    pub fn recount(&mut self) {
        self.clear_counters();
        for msgno in 0..self.emails.len() {
            self.count_email(msgno);
        }
    }

    pub fn build_id_hash(&mut self) {
        let mut hash = HashMap::with_capacity(self.emails.len());
        for (msgno, e) in self.emails() {
            if let Some(id) = e.env.message_id.as_ref() {
                hash.entry(id.clone()).or_insert(msgno);
            }
        }
        self.id_hash = Some(hash);
    }

    pub fn build_subj_hash(&mut self) {
        let mut hash: HashMap<String, Vec<usize>> = HashMap::new();
        for (msgno, e) in self.emails() {
            if let Some(subj) = e.env.real_subj() {
                hash.entry(subj.to_string()).or_default().push(msgno);
            }
        }
        self.subj_hash = Some(hash);
    }

    pub fn clear_hashes(&mut self) {
        self.id_hash = None;
        self.subj_hash = None;
    }

    /// Find an email by Message-ID, building the index on first use.
    pub fn lookup_id(&mut self, message_id: &str) -> Option<usize> {
        if self.id_hash.is_none() {
            self.build_id_hash();
        }
        self.id_hash.as_ref()?.get(message_id).copied()
    }

    /// Change one flag of the email at `msgno`.
    ///
    /// When `update_counters` is set the matching mailbox counter moves with
    /// the flag. Publishes `NT_MAILBOX/Change` if anything changed and
    /// returns whether it did. The event is sent while the caller still holds
    /// the mailbox, so observers must not borrow it.
    pub fn set_flag(
        &mut self,
        msgno: usize,
        flag: SetFlag,
        on: bool,
        flag_safe: bool,
        update_counters: bool,
    ) -> bool {
        if self.readonly && flag != SetFlag::Tag {
            return false;
        }
        let perms = self.permissions;
        let before = (self.msg_deleted, self.msg_tagged, self.msg_flagged);
        let Some(e) = self.emails.get_mut(msgno).and_then(Option::as_mut) else {
            return false;
        };
        let was_changed = e.changed;
        let mut delta = Counters::default();
        let mut update = false;

        match flag {
            SetFlag::Delete => {
                if !perms.delete_messages {
                    return false;
                }
                if on {
                    if !e.is_deleted() && (!e.is_flagged() || !flag_safe) {
                        e.flags.insert(Flag::DELETED);
                        delta.deleted += 1;
                        update = true;
                    }
                } else if e.is_deleted() {
                    e.flags.remove(Flag::DELETED);
                    delta.deleted -= 1;
                    update = true;
                }
            }
            SetFlag::Purge => {
                if !perms.delete_messages {
                    return false;
                }
                e.flags.set(Flag::PURGE, on);
            }
            SetFlag::New => {
                if !perms.set_seen {
                    return false;
                }
                if on {
                    if e.is_read() || e.is_old() {
                        update = true;
                        e.flags.remove(Flag::OLD);
                        delta.new += 1;
                        if e.is_read() {
                            e.flags.remove(Flag::READ);
                            delta.unread += 1;
                        }
                        e.changed = true;
                    }
                } else if !e.is_read() {
                    update = true;
                    if !e.is_old() {
                        delta.new -= 1;
                    }
                    e.flags.insert(Flag::READ);
                    delta.unread -= 1;
                    e.changed = true;
                }
            }
            SetFlag::Old => {
                if !perms.set_seen {
                    return false;
                }
                if on != e.is_old() {
                    update = true;
                    e.flags.set(Flag::OLD, on);
                    if !e.is_read() {
                        delta.new += if on { -1 } else { 1 };
                    }
                    e.changed = true;
                }
            }
            SetFlag::Read => {
                if !perms.set_seen {
                    return false;
                }
                if on != e.is_read() {
                    update = true;
                    e.flags.set(Flag::READ, on);
                    let step = if on { -1 } else { 1 };
                    delta.unread += step;
                    if !e.is_old() {
                        delta.new += step;
                    }
                    e.changed = true;
                }
            }
            SetFlag::Replied => {
                if !perms.set_flags {
                    return false;
                }
                if on {
                    if !e.is_replied() {
                        update = true;
                        e.flags.insert(Flag::REPLIED);
                        if !e.is_read() {
                            e.flags.insert(Flag::READ);
                            delta.unread -= 1;
                            if !e.is_old() {
                                delta.new -= 1;
                            }
                        }
                        e.changed = true;
                    }
                } else if e.is_replied() {
                    update = true;
                    e.flags.remove(Flag::REPLIED);
                    e.changed = true;
                }
            }
            SetFlag::Flag => {
                if !perms.set_flags {
                    return false;
                }
                if on != e.is_flagged() {
                    update = true;
                    e.flags.set(Flag::FLAGGED, on);
                    delta.flagged += if on { 1 } else { -1 };
                    e.changed = true;
                }
            }
            SetFlag::Tag => {
                if on != e.is_tagged() {
                    update = true;
                    e.flags.set(Flag::TAGGED, on);
                    delta.tagged += if on { 1 } else { -1 };
                }
            }
        }

        let email_changed = e.changed != was_changed;
        let searched = e.searched;
        let email_ref = EmailRef {
            msgno,
            sequence: e.sequence,
        };
        if update_counters {
            delta.apply(self);
            if email_changed || (update && marks_mailbox_changed(flag)) {
                self.changed = true;
            }
        }
        // Cached search results no longer describe this message.
        if searched
            && (email_changed || before != (self.msg_deleted, self.msg_tagged, self.msg_flagged))
        {
            if let Some(e) = self.email_mut(msgno) {
                e.searched = false;
            }
        }
        if update {
            self.notify.send(&Event::with_data(
                EventKind::Mailbox(MailboxEvent::Change),
                EventData::Emails(smallvec![email_ref]),
            ));
        }
        update
    }
}

const fn marks_mailbox_changed(flag: SetFlag) -> bool {
    !matches!(flag, SetFlag::Tag | SetFlag::Delete | SetFlag::Purge)
}

#[derive(Default)]
struct Counters {
    unread: isize,
    new: isize,
    flagged: isize,
    deleted: isize,
    tagged: isize,
}

impl Counters {
    fn apply(&self, m: &mut Mailbox) {
        fn step(counter: &mut usize, delta: isize) {
            *counter = counter.saturating_add_signed(delta);
        }
        step(&mut m.msg_unread, self.unread);
        step(&mut m.msg_new, self.new);
        step(&mut m.msg_flagged, self.flagged);
        step(&mut m.msg_deleted, self.deleted);
        step(&mut m.msg_tagged, self.tagged);
    }
}

/// Append `e` to the mailbox and publish `NT_MAILBOX/Add`.
pub fn mailbox_add_email(m: &Rc<RefCell<Mailbox>>, e: Email) -> EmailRef {
    let (email_ref, notify) = {
        let mut m = m.borrow_mut();
        (m.insert_email(e), m.notify.clone())
    };
    notify.send(&Event::with_data(
        EventKind::Mailbox(MailboxEvent::Add),
        EventData::Emails(smallvec![email_ref]),
    ));
    email_ref
}

/// Publish `NT_EMAIL/Delete` for the email at `msgno`, then remove it,
/// leaving a hole.
///
/// Observers see the event while the email is still in place.
pub fn mailbox_remove_email(m: &Rc<RefCell<Mailbox>>, msgno: usize) -> Option<Email> {
    let (email_ref, notify) = {
        let m = m.borrow();
        let e = m.email(msgno)?;
        (
            EmailRef {
                msgno,
                sequence: e.sequence,
            },
            m.notify.clone(),
        )
    };
    notify.send(&Event::with_data(
        EventKind::Email(EmailEvent::Delete),
        EventData::Emails(smallvec![email_ref]),
    ));
    m.borrow_mut().take_email(msgno)
}

/// Ask the mailbox's observers to rebuild or resort.
pub fn mailbox_changed(m: &Rc<RefCell<Mailbox>>, action: MailboxEvent) {
    let notify = m.borrow().notify.clone();
    notify.send(&Event::new(EventKind::Mailbox(action)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{Body, Envelope};

    fn email(id: &str) -> Email {
        let mut env = Envelope::new();
        env.message_id = Some(id.to_string());
        Email::new(env, Body::default())
    }

    #[test]
    fn test_mailbox_add_remove_keeps_msgno() {
        let m = Rc::new(RefCell::new(Mailbox::new("/tmp/inbox")));
        let seen = Rc::new(RefCell::new(vec![]));
        let seen2 = seen.clone();
        m.borrow().notify.observer_add(
            crate::notify::NotifyType::All,
            Rc::new(move |ev: &Event| {
                seen2.borrow_mut().push(ev.kind);
                crate::notify::ObserverReturn::Continue
            }),
        );
        let a = mailbox_add_email(&m, email("<a>"));
        let b = mailbox_add_email(&m, email("<b>"));
        assert_eq!((a.msgno, b.msgno), (0, 1));
        assert!(b.sequence > a.sequence);
        assert!(mailbox_remove_email(&m, 0).is_some());
        assert!(mailbox_remove_email(&m, 0).is_none());
        let m = m.borrow();
        assert_eq!(m.msg_count(), 2);
        assert!(m.email(0).is_none());
        assert_eq!(m.email(1).map(|e| e.msgno), Some(1));
        assert_eq!(m.name, "inbox");
        assert_eq!(
            seen.borrow().as_slice(),
            &[
                EventKind::Mailbox(MailboxEvent::Add),
                EventKind::Mailbox(MailboxEvent::Add),
                EventKind::Email(EmailEvent::Delete),
            ]
        );
    }

    #[test]
    fn test_mailbox_set_flag_counters() {
        let mut m = Mailbox::new("inbox");
        m.insert_email(email("<a>"));
        m.insert_email(email("<b>"));
        m.recount();
        assert_eq!((m.msg_unread, m.msg_new), (2, 2));

        assert!(m.set_flag(0, SetFlag::Read, true, false, true));
        assert!(!m.set_flag(0, SetFlag::Read, true, false, true));
        assert_eq!((m.msg_unread, m.msg_new), (1, 1));

        assert!(m.set_flag(1, SetFlag::Old, true, false, true));
        assert_eq!((m.msg_unread, m.msg_new), (1, 0));
        assert!(m.set_flag(1, SetFlag::New, true, false, true));
        assert_eq!((m.msg_unread, m.msg_new), (1, 1));

        m.set_flag(1, SetFlag::Flag, true, false, true);
        assert!(!m.set_flag(1, SetFlag::Delete, true, true, true));
        assert!(m.set_flag(1, SetFlag::Delete, true, false, true));
        assert_eq!((m.msg_flagged, m.msg_deleted), (1, 1));

        m.set_flag(0, SetFlag::Tag, true, false, false);
        assert_eq!(m.msg_tagged, 0);
        let counted = (m.msg_unread, m.msg_new, m.msg_flagged, m.msg_deleted);
        m.recount();
        assert_eq!(
            (m.msg_unread, m.msg_new, m.msg_flagged, m.msg_deleted),
            counted
        );
        assert_eq!(m.msg_tagged, 1);
    }

    #[test]
    fn test_mailbox_compact() {
        let mut m = Mailbox::new("inbox");
        for id in ["<a>", "<b>", "<c>"] {
            m.insert_email(email(id));
        }
        m.set_flag(1, SetFlag::Delete, true, false, true);
        m.take_email(0);
        let removed = m.compact(|e| !e.is_deleted());
        assert_eq!(removed.len(), 1);
        assert_eq!(m.msg_count(), 1);
        assert_eq!(m.email(0).and_then(|e| e.env.message_id.as_deref()), Some("<c>"));
        assert_eq!(m.lookup_id("<c>"), Some(0));
    }
}
