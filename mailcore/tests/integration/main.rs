//
// mailcore - integration tests
//
// Copyright 2024 mailcore contributors
//
// This file is part of mailcore.
//
// mailcore is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// mailcore is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with mailcore. If not, see <http://www.gnu.org/licenses/>.
//
// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later

use std::rc::Rc;

use mailcore::{
    conf::{compile_regex, default_vals},
    email::Email,
    mailbox::Mailbox,
    thread::ThreadContext,
    mailbox_open, ConfigSubset, InMemoryBackend, MailBackend, MailboxView, NeoMutt, RawMessage,
    ThreadingSettings, UseThreads,
};

mod laws;
mod mailbox_view;
mod patterns;
mod threading;

/// Headers of a test message. Ids are given without angle brackets.
#[derive(Clone, Debug, Default)]
pub struct Msg<'a> {
    pub id: &'a str,
    pub from: &'a str,
    pub subject: &'a str,
    pub date: String,
    pub in_reply_to: Option<&'a str>,
    pub references: &'a [&'a str],
    pub body: &'a str,
}

impl<'a> Msg<'a> {
    pub fn new(id: &'a str, subject: &'a str, day: u32) -> Self {
        Self {
            id,
            from: "nobody@example.com",
            subject,
            date: format!("{day} Jan 2024 10:00:00 +0000"),
            body: "hello",
            ..Self::default()
        }
    }

    pub fn reply_to(mut self, parent: &'a str) -> Self {
        self.in_reply_to = Some(parent);
        self
    }

    pub fn references(mut self, references: &'a [&'a str]) -> Self {
        self.references = references;
        self
    }

    pub fn sender(mut self, from: &'a str) -> Self {
        self.from = from;
        self
    }

    pub fn body(mut self, body: &'a str) -> Self {
        self.body = body;
        self
    }

    pub fn date(mut self, date: String) -> Self {
        self.date = date;
        self
    }

    pub fn raw(&self) -> String {
        let mut ret = format!(
            "From: {}\nSubject: {}\nMessage-ID: <{}>\nDate: {}\n",
            self.from, self.subject, self.id, self.date
        );
        if let Some(irt) = self.in_reply_to {
            ret.push_str(&format!("In-Reply-To: <{irt}>\n"));
        }
        if !self.references.is_empty() {
            let refs: Vec<String> = self.references.iter().map(|r| format!("<{r}>")).collect();
            ret.push_str(&format!("References: {}\n", refs.join(" ")));
        }
        ret.push('\n');
        ret.push_str(self.body);
        ret.push('\n');
        ret
    }

    pub fn email(&self) -> Email {
        let re = compile_regex(&default_vals::reply_regex()).unwrap();
        Email::from_bytes(self.raw().as_bytes(), Some(&re)).unwrap()
    }
}

pub fn mailbox(msgs: &[Msg<'_>]) -> Mailbox {
    let mut m = Mailbox::new("memory://test");
    for msg in msgs {
        m.insert_email(msg.email());
    }
    m
}

pub fn threads() -> ThreadingSettings {
    ThreadingSettings {
        use_threads: UseThreads::Threads,
        ..ThreadingSettings::default()
    }
}

/// Thread `m` from scratch.
pub fn thread(m: &mut Mailbox, settings: &ThreadingSettings) -> ThreadContext {
    let mut ctx = ThreadContext::new();
    ctx.sort(m, settings, true);
    ctx
}

/// Ids of `msgnos`, without angle brackets.
pub fn ids(m: &Mailbox, msgnos: &[usize]) -> Vec<String> {
    msgnos
        .iter()
        .map(|&msgno| {
            m.email(msgno)
                .unwrap()
                .env
                .message_id
                .as_deref()
                .unwrap()
                .trim_matches(|c| c == '<' || c == '>')
                .to_string()
        })
        .collect()
}

pub fn view_ids(view: &MailboxView) -> Vec<String> {
    let m = view.mailbox().borrow();
    ids(&m, view.v2r())
}

/// A view over an in-memory mailbox holding `msgs`.
pub fn open_view(
    msgs: &[Msg<'_>],
    settings: ThreadingSettings,
    padding: usize,
) -> (NeoMutt, Rc<InMemoryBackend>, MailboxView) {
    let neomutt = NeoMutt::from_settings(settings).unwrap();
    let backend = Rc::new(
        InMemoryBackend::new(
            msgs.iter().map(|msg| RawMessage::new(msg.raw())).collect(),
            &ConfigSubset::default(),
        )
        .with_padding(padding),
    );
    let dyn_backend: Rc<dyn MailBackend> = backend.clone();
    let m = mailbox_open(dyn_backend, "memory://").unwrap();
    let view = MailboxView::new(m, &neomutt).unwrap();
    (neomutt, backend, view)
}
