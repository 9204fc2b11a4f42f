/*
 * mailcore - envelope module
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

//! The parsed header block of a message.

use std::fmt;

use regex::Regex;

use super::{
    address::{
        addrlist_equal, addrlist_has_recips, addrlist_to_intl, addrlist_to_local, AddressList,
    },
    parser::{address::parse_address_list, message_ids},
};
use crate::utils::datetime::{rfc822_to_timestamp, UnixTimestamp};

bitflags! {
    /// Header fields edited by the user since the message was read.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct EnvelopeChanged: u8 {
        const IRT     = 1 << 0;
        const REFS    = 1 << 1;
        const XLABEL  = 1 << 2;
        const SUBJECT = 1 << 3;
    }
}

/// An address field that could not be converted to its ASCII form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IntlError {
    pub tag: &'static str,
    pub address: String,
}

impl fmt::Display for IntlError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Bad IDN in \"{}\": '{}'", self.tag, self.address)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Envelope {
    pub return_path: AddressList,
    pub from: AddressList,
    pub to: AddressList,
    pub cc: AddressList,
    pub bcc: AddressList,
    pub sender: AddressList,
    pub reply_to: AddressList,
    pub mail_followup_to: AddressList,
    pub x_original_to: AddressList,
    pub list_post: Option<String>,
    pub list_subscribe: Option<String>,
    pub list_unsubscribe: Option<String>,
    subject: Option<String>,
    /// Byte offset of the real subject inside `subject`. `None` when the
    /// subject is nothing but a reply prefix.
    real_subj: Option<usize>,
    /// Subject rewritten by `subjectrx` rules.
    pub disp_subj: Option<String>,
    pub message_id: Option<String>,
    pub supersedes: Option<String>,
    /// Sent date.
    pub date: UnixTimestamp,
    pub x_label: Option<String>,
    pub organization: Option<String>,
    pub newsgroups: Option<String>,
    pub spam: Option<String>,
    /// In header order, oldest ancestor first.
    pub references: Vec<String>,
    pub in_reply_to: Vec<String>,
    pub userhdrs: Vec<(String, String)>,
    pub changed: EnvelopeChanged,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an envelope from unfolded `(name, value)` header pairs.
    pub fn from_headers(headers: &[(String, String)], reply_regex: Option<&Regex>) -> Self {
        let mut env = Self::default();
        for (name, value) in headers {
            match name.to_ascii_lowercase().as_str() {
                "return-path" => env.return_path = parse_address_list(value),
                "from" => env.from = parse_address_list(value),
                "to" => env.to.extend(parse_address_list(value)),
                "cc" => env.cc.extend(parse_address_list(value)),
                "bcc" => env.bcc.extend(parse_address_list(value)),
                "sender" => env.sender = parse_address_list(value),
                "reply-to" => env.reply_to = parse_address_list(value),
                "mail-followup-to" => env.mail_followup_to = parse_address_list(value),
                "x-original-to" => env.x_original_to = parse_address_list(value),
                "list-post" => env.list_post = Some(value.clone()),
                "list-subscribe" => env.list_subscribe = Some(value.clone()),
                "list-unsubscribe" => env.list_unsubscribe = Some(value.clone()),
                "subject" if env.subject.is_none() => env.set_subject(Some(value), reply_regex),
                "message-id" => env.message_id = message_ids::msg_id(value),
                "supersedes" => env.supersedes = message_ids::msg_id(value),
                "date" => env.date = rfc822_to_timestamp(value).unwrap_or_default(),
                "x-label" => env.x_label = Some(value.clone()).filter(|v| !v.is_empty()),
                "organization" => env.organization = Some(value.clone()),
                "newsgroups" => env.newsgroups = Some(value.clone()),
                "references" => env.references = message_ids::msg_id_list(value),
                "in-reply-to" => env.in_reply_to = message_ids::msg_id_list(value),
                _ => env.userhdrs.push((name.clone(), value.clone())),
            }
        }
        env.changed = EnvelopeChanged::empty();
        env
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// The subject without its reply prefix.
    pub fn real_subj(&self) -> Option<&str> {
        let subject = self.subject.as_deref()?;
        subject.get(self.real_subj?..)
    }

    /// Where the real subject starts inside the subject.
    pub fn real_subj_offset(&self) -> Option<usize> {
        self.subject.as_ref().and(self.real_subj)
    }

    /// The subject to display: the `subjectrx` rewrite if there is one.
    pub fn display_subject(&self) -> Option<&str> {
        self.disp_subj.as_deref().or(self.subject.as_deref())
    }

    /// Replace the subject and derive the real subject from it.
    pub fn set_subject(&mut self, subject: Option<&str>, reply_regex: Option<&Regex>) {
        self.subject = subject.map(str::to_string);
        self.disp_subj = None;
        self.subject_real_set(reply_regex);
    }

    /// Derive the real subject by skipping whatever `reply_regex` matches at
    /// the start of the subject.
    pub fn subject_real_set(&mut self, reply_regex: Option<&Regex>) {
        self.real_subj = match (self.subject.as_deref(), reply_regex) {
            (None, _) => None,
            (Some(_), None) => Some(0),
            (Some(subject), Some(re)) => match re.find(subject) {
                Some(m) if m.start() == 0 && m.end() == subject.len() => None,
                Some(m) if m.start() == 0 => Some(m.end()),
                _ => Some(0),
            },
        };
    }

    /// Fill in every field `self` lacks from `extra`.
    ///
    /// `references` and `in_reply_to` are only taken when the user has not
    /// edited them. The subject moves together with its real and display
    /// forms. `spam` and user headers always come from `extra`.
    pub fn merge(&mut self, mut extra: Self) {
        macro_rules! move_list {
            ($($field:ident),*) => {
                $(
                    if self.$field.is_empty() {
                        std::mem::swap(&mut self.$field, &mut extra.$field);
                    }
                )*
            };
        }
        macro_rules! move_elem {
            ($($field:ident),*) => {
                $(
                    if self.$field.is_none() {
                        self.$field = extra.$field.take();
                    }
                )*
            };
        }
        move_list!(
            return_path,
            from,
            to,
            cc,
            bcc,
            sender,
            reply_to,
            mail_followup_to
        );
        move_elem!(list_post, list_subscribe, list_unsubscribe, message_id, supersedes);
        if self.date == 0 {
            self.date = extra.date;
        }
        move_list!(x_original_to);
        if !self.changed.contains(EnvelopeChanged::XLABEL) {
            move_elem!(x_label);
        }
        if !self.changed.contains(EnvelopeChanged::REFS) {
            move_list!(references);
        }
        if !self.changed.contains(EnvelopeChanged::IRT) {
            move_list!(in_reply_to);
        }
        if self.subject.is_none() {
            self.subject = extra.subject.take();
            self.real_subj = extra.real_subj.take();
            self.disp_subj = extra.disp_subj.take();
        }
        self.spam = extra.spam.take();
        self.userhdrs = std::mem::take(&mut extra.userhdrs);
    }

    /// Strict comparison of the identifying fields.
    pub fn cmp_strict(&self, other: &Self) -> bool {
        self.message_id == other.message_id
            && self.subject == other.subject
            && self.references == other.references
            && addrlist_equal(&self.from, &other.from)
            && addrlist_equal(&self.sender, &other.sender)
            && addrlist_equal(&self.reply_to, &other.reply_to)
            && addrlist_equal(&self.to, &other.to)
            && addrlist_equal(&self.cc, &other.cc)
            && addrlist_equal(&self.return_path, &other.return_path)
    }

    pub fn to_local(&mut self) {
        addrlist_to_local(&mut self.return_path);
        addrlist_to_local(&mut self.from);
        addrlist_to_local(&mut self.to);
        addrlist_to_local(&mut self.cc);
        addrlist_to_local(&mut self.bcc);
        addrlist_to_local(&mut self.reply_to);
        addrlist_to_local(&mut self.mail_followup_to);
    }

    /// Convert every address field to its ASCII form, reporting the first
    /// field and address that failed. Later fields are still converted.
    pub fn to_intl(&mut self) -> Result<(), IntlError> {
        let mut ret = Ok(());
        for (tag, list) in [
            ("return_path", &mut self.return_path),
            ("from", &mut self.from),
            ("to", &mut self.to),
            ("cc", &mut self.cc),
            ("bcc", &mut self.bcc),
            ("reply_to", &mut self.reply_to),
            ("mail_followup_to", &mut self.mail_followup_to),
        ] {
            if let Err(address) = addrlist_to_intl(list) {
                if ret.is_ok() {
                    ret = Err(IntlError { tag, address });
                }
            }
        }
        ret
    }

    /// Number of `To`, `Cc` and `Bcc` recipients.
    pub fn has_recips(&self) -> usize {
        addrlist_has_recips(&self.to) + addrlist_has_recips(&self.cc) + addrlist_has_recips(&self.bcc)
    }

    /// Value of a header not stored in a dedicated field.
    pub fn user_header(&self, name: &str) -> Option<&str> {
        self.userhdrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{email::address::Address, ConfigSubset};

    fn reply_regex() -> Regex {
        ConfigSubset::default().reply_regex().unwrap().clone()
    }

    #[test]
    fn test_envelope_real_subject() {
        let re = reply_regex();
        let mut env = Envelope::new();
        env.set_subject(Some("Re: [list] project"), Some(&re));
        assert_eq!(env.real_subj(), Some("project"));
        assert_eq!(env.real_subj_offset(), Some(11));

        env.set_subject(Some("project"), Some(&re));
        assert_eq!(env.real_subj(), Some("project"));

        env.set_subject(Some("Re: "), Some(&re));
        assert_eq!(env.real_subj(), None);

        env.set_subject(Some("Re: x"), None);
        assert_eq!(env.real_subj(), Some("Re: x"));

        env.set_subject(None, Some(&re));
        assert_eq!(env.real_subj(), None);
    }

    #[test]
    fn test_envelope_merge() {
        let re = reply_regex();
        let mut base = Envelope::new();
        base.from.push(Address::new(None, "base@example.com"));
        base.references = vec!["<edited>".into()];
        base.changed |= EnvelopeChanged::REFS;
        base.spam = Some("old".into());

        let mut extra = Envelope::new();
        extra.from.push(Address::new(None, "extra@example.com"));
        extra.to.push(Address::new(None, "to@example.com"));
        extra.references = vec!["<a>".into(), "<b>".into()];
        extra.in_reply_to = vec!["<b>".into()];
        extra.message_id = Some("<c>".into());
        extra.set_subject(Some("Re: hello"), Some(&re));
        extra.disp_subj = Some("hello!".into());
        extra.spam = None;
        extra.userhdrs.push(("X-Foo".into(), "bar".into()));

        base.merge(extra);
        assert_eq!(base.from[0].mailbox.as_deref(), Some("base@example.com"));
        assert_eq!(base.to[0].mailbox.as_deref(), Some("to@example.com"));
        assert_eq!(base.references, vec!["<edited>".to_string()]);
        assert_eq!(base.in_reply_to, vec!["<b>".to_string()]);
        assert_eq!(base.message_id.as_deref(), Some("<c>"));
        assert_eq!(base.subject(), Some("Re: hello"));
        assert_eq!(base.real_subj(), Some("hello"));
        assert_eq!(base.disp_subj.as_deref(), Some("hello!"));
        assert_eq!(base.spam, None);
        assert_eq!(base.user_header("x-foo"), Some("bar"));
    }

    #[test]
    fn test_envelope_to_intl() {
        let mut env = Envelope::new();
        env.from.push(Address::new(None, "me@bücher.example"));
        env.cc.push(Address::new(None, "bad@exa mple.com"));
        env.bcc.push(Address::new(None, "worse@exa mple.org"));
        let err = env.to_intl().unwrap_err();
        assert_eq!(err.tag, "cc");
        assert_eq!(err.address, "bad@exa mple.com");
        assert_eq!(env.from[0].mailbox.as_deref(), Some("me@xn--bcher-kva.example"));
        env.to_local();
        assert_eq!(env.from[0].mailbox.as_deref(), Some("me@bücher.example"));
        assert_eq!(env.has_recips(), 2);
    }

    #[test]
    fn test_envelope_from_headers() {
        let headers = vec![
            ("From".to_string(), "Alice <alice@example.com>".to_string()),
            ("Message-ID".to_string(), "<m2@example.com>".to_string()),
            ("In-Reply-To".to_string(), "<m1@example.com>".to_string()),
            ("References".to_string(), "<m0@example.com> <m1@example.com>".to_string()),
            ("Subject".to_string(), "Re: project".to_string()),
            ("Date".to_string(), "Wed, 8 Jan 2020 10:44:03 -0800".to_string()),
            ("X-Mailer".to_string(), "test".to_string()),
        ];
        let env = Envelope::from_headers(&headers, Some(&reply_regex()));
        assert_eq!(env.message_id.as_deref(), Some("<m2@example.com>"));
        assert_eq!(env.in_reply_to, vec!["<m1@example.com>".to_string()]);
        assert_eq!(env.references.len(), 2);
        assert_eq!(env.real_subj(), Some("project"));
        assert_eq!(env.date, 1578509043);
        assert_eq!(env.user_header("X-Mailer"), Some("test"));
        assert!(env.cmp_strict(&env.clone()));
    }
}
