/*
 * mailcore - backends module
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

//! Storage backends.
//!
//! A backend fills a [`Mailbox`] when it is opened and later reports new
//! mail, removes purged messages and hands out raw message bytes. Capability
//! queries are plain methods with `false` defaults.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    fmt,
    path::Path,
    rc::Rc,
};

use regex::Regex;

use crate::{
    conf::ConfigSubset,
    email::{Email, Flag},
    error::{Error, ErrorKind, Result, ResultIntoError},
    mailbox::{mailbox_add_email, mailbox_changed, mailbox_remove_email, Mailbox},
    notify::MailboxEvent,
};

/// Outcome of [`MailBackend::check`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CheckStatus {
    Unchanged,
    NewMail,
    /// The mailbox was reloaded from scratch.
    Reopened,
}

/// The raw bytes of one message, as returned by
/// [`MailBackend::open_message`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MessageStream {
    pub msgno: usize,
    pub data: Vec<u8>,
}

impl MessageStream {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

pub trait MailBackend: fmt::Debug {
    fn name(&self) -> &str;

    /// Load the messages of `m`.
    fn open(&self, m: &mut Mailbox) -> Result<()>;

    fn close(&self, _m: &mut Mailbox) -> Result<()> {
        Ok(())
    }

    /// Look for changes made behind our back.
    fn check(&self, m: &Rc<RefCell<Mailbox>>) -> Result<CheckStatus>;

    /// Write changes back and purge deleted messages. Returns how many
    /// messages were removed.
    fn sync(&self, m: &Rc<RefCell<Mailbox>>) -> Result<usize>;

    fn open_message(&self, m: &Mailbox, msgno: usize) -> Result<MessageStream>;

    fn close_message(&self, _m: &Mailbox, _stream: MessageStream) -> Result<()> {
        Ok(())
    }

    /// Bytes of separator between stored messages.
    fn msg_padding(&self, _m: &Mailbox) -> usize {
        0
    }

    fn can_search_on_server(&self) -> bool {
        false
    }

    fn preserves_msgno_across_sync(&self) -> bool {
        false
    }

    fn supports_tags(&self) -> bool {
        false
    }

    /// Run `query` on the server, setting `matched` on every hit.
    fn search(&self, _m: &mut Mailbox, _query: &str) -> Result<()> {
        Err(Error::new(format!("{} does not support server side search", self.name()))
            .set_kind(ErrorKind::NotImplemented))
    }
}

pub type BackendCreator = Box<dyn Fn(&str, &ConfigSubset) -> Result<Rc<dyn MailBackend>>>;

/// Available mail backends by name.
pub struct Backends {
    map: HashMap<String, Backend>,
}

pub struct Backend {
    pub create_fn: Box<dyn Fn() -> BackendCreator>,
    /// Does this backend handle the given path?
    pub probe_fn: Box<dyn Fn(&str) -> bool>,
}

impl Default for Backends {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_list().entries(self.map.keys()).finish()
    }
}

impl Backends {
    pub fn new() -> Self {
        let mut b = Self {
            map: HashMap::with_capacity(1),
        };
        b.register(
            "memory".to_string(),
            Backend {
                create_fn: Box::new(|| {
                    Box::new(|path, sub| {
                        let backend: Rc<dyn MailBackend> =
                            Rc::new(InMemoryBackend::from_path(path, sub)?);
                        Ok(backend)
                    })
                }),
                probe_fn: Box::new(|path| {
                    path.starts_with("memory://") || path.ends_with(".json")
                }),
            },
        );
        b
    }

    pub fn get(&self, key: &str) -> Result<BackendCreator> {
        self.map
            .get(key)
            .map(|b| (b.create_fn)())
            .ok_or_else(|| {
                Error::new(format!("{} is not a valid mail backend", key))
                    .set_kind(ErrorKind::Backend)
            })
    }

    /// Name of the first backend claiming `path`.
    pub fn probe(&self, path: &str) -> Option<&str> {
        let mut names = self.map.keys().collect::<Vec<_>>();
        names.sort();
        names
            .into_iter()
            .find(|name| (self.map[name.as_str()].probe_fn)(path))
            .map(String::as_str)
    }

    pub fn register(&mut self, key: String, backend: Backend) -> bool {
        if self.map.contains_key(&key) {
            log::warn!("{} is an already registered backend", key);
            return false;
        }
        self.map.insert(key, backend);
        true
    }

    /// Pick a backend for `path` and open a mailbox with it.
    pub fn open(&self, path: &str, sub: &ConfigSubset) -> Result<Rc<RefCell<Mailbox>>> {
        let name = self.probe(path).ok_or_else(|| {
            Error::new(format!("No mail backend recognises {}", path)).set_kind(ErrorKind::Backend)
        })?;
        let create = self.get(name)?;
        mailbox_open(create(path, sub)?, path)
    }
}

/// Create a mailbox at `path` and load it through `backend`.
pub fn mailbox_open(backend: Rc<dyn MailBackend>, path: &str) -> Result<Rc<RefCell<Mailbox>>> {
    let mut m = Mailbox::new(path);
    backend
        .open(&mut m)
        .chain_err_summary(|| format!("Could not open mailbox {}", path))?;
    m.backend = Some(backend);
    m.recount();
    log::debug!("opened {:?}", m);
    Ok(Rc::new(RefCell::new(m)))
}

pub fn mailbox_close(m: &Rc<RefCell<Mailbox>>) -> Result<()> {
    let backend = m.borrow().backend.clone();
    match backend {
        Some(b) => b.close(&mut m.borrow_mut()),
        None => Ok(()),
    }
}

fn backend_of(m: &Rc<RefCell<Mailbox>>) -> Result<Rc<dyn MailBackend>> {
    m.borrow()
        .backend
        .clone()
        .ok_or_else(|| Error::new("Mailbox is not open").set_kind(ErrorKind::NoMailbox))
}

pub fn mailbox_check(m: &Rc<RefCell<Mailbox>>) -> Result<CheckStatus> {
    backend_of(m)?.check(m)
}

/// Sync the mailbox. Deleted messages are purged only with `purge`; the
/// caller resolves `$delete` before calling.
pub fn mailbox_sync(m: &Rc<RefCell<Mailbox>>, purge: bool) -> Result<usize> {
    let backend = backend_of(m)?;
    if !purge && m.borrow().emails().any(|(_, e)| e.is_deleted()) {
        log::debug!("sync without purge: deleted messages are kept");
        return Ok(0);
    }
    backend.sync(m)
}

/// Read the raw bytes of one message.
pub fn mailbox_open_message(m: &Mailbox, msgno: usize) -> Result<MessageStream> {
    let backend = m
        .backend
        .as_ref()
        .ok_or_else(|| Error::new("Mailbox is not open").set_kind(ErrorKind::NoMailbox))?;
    backend.open_message(m, msgno)
}

/// A message as stored by [`InMemoryBackend`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawMessage {
    /// The whole RFC 5322 message.
    pub data: String,
    #[serde(default)]
    pub flags: Flag,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RawMessage {
    pub fn new<S: Into<String>>(data: S) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }
}

/// A backend keeping every message in memory.
///
/// New mail is queued with [`InMemoryBackend::deliver`] and shows up in the
/// mailbox on the next [`MailBackend::check`].
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    reply_regex: Option<Regex>,
    padding: usize,
    server_search: bool,
    initial: RefCell<Vec<RawMessage>>,
    incoming: RefCell<VecDeque<RawMessage>>,
    /// Raw bytes by email sequence.
    store: RefCell<HashMap<u64, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new(messages: Vec<RawMessage>, sub: &ConfigSubset) -> Self {
        Self {
            reply_regex: sub.reply_regex().cloned(),
            initial: RefCell::new(messages),
            ..Self::default()
        }
    }

    /// Load messages from a JSON array of [`RawMessage`] at `path`, which may
    /// carry a `memory://` prefix. An empty path gives an empty mailbox.
    pub fn from_path(path: &str, sub: &ConfigSubset) -> Result<Self> {
        let file = path.strip_prefix("memory://").unwrap_or(path);
        if file.is_empty() {
            return Ok(Self::new(vec![], sub));
        }
        let contents = std::fs::read_to_string(Path::new(file))
            .chain_err_summary(|| format!("Could not read {}", file))
            .chain_err_kind(ErrorKind::Io)?;
        let messages: Vec<RawMessage> = serde_json::from_str(&contents)
            .chain_err_summary(|| format!("Could not parse message fixture {}", file))?;
        Ok(Self::new(messages, sub))
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_server_search(mut self, new_val: bool) -> Self {
        self.server_search = new_val;
        self
    }

    /// Drop the stored text of the message at `msgno`, as if its file went
    /// missing. The headers stay in the mailbox; reading the message fails.
    pub fn lose_message(&self, m: &Mailbox, msgno: usize) -> bool {
        m.email(msgno)
            .map_or(false, |e| self.store.borrow_mut().remove(&e.sequence).is_some())
    }

    /// Queue a message for the next check.
    pub fn deliver(&self, message: RawMessage) {
        self.incoming.borrow_mut().push_back(message);
    }

    fn parse(&self, raw: &RawMessage) -> Result<Email> {
        let mut e = Email::from_bytes(raw.data.as_bytes(), self.reply_regex.as_ref())?;
        e.flags = raw.flags;
        e.tags = raw.tags.clone();
        Ok(e)
    }
}

impl MailBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&self, m: &mut Mailbox) -> Result<()> {
        let initial = std::mem::take(&mut *self.initial.borrow_mut());
        for raw in initial {
            match self.parse(&raw) {
                Ok(e) => {
                    let r = m.insert_email(e);
                    self.store
                        .borrow_mut()
                        .insert(r.sequence, raw.data.into_bytes());
                }
                Err(err) => log::warn!("{}: skipping unparsable message: {}", m.path, err),
            }
        }
        Ok(())
    }

    fn check(&self, m: &Rc<RefCell<Mailbox>>) -> Result<CheckStatus> {
        let mut ret = CheckStatus::Unchanged;
        loop {
            let Some(raw) = self.incoming.borrow_mut().pop_front() else {
                break;
            };
            let e = match self.parse(&raw) {
                Ok(e) => e,
                Err(err) => {
                    log::warn!("skipping unparsable message: {}", err);
                    continue;
                }
            };
            let r = mailbox_add_email(m, e);
            self.store
                .borrow_mut()
                .insert(r.sequence, raw.data.into_bytes());
            ret = CheckStatus::NewMail;
        }
        Ok(ret)
    }

    fn sync(&self, m: &Rc<RefCell<Mailbox>>) -> Result<usize> {
        let doomed = m
            .borrow()
            .emails()
            .filter(|(_, e)| e.is_deleted() || e.flags.contains(Flag::PURGE))
            .map(|(msgno, e)| (msgno, e.sequence))
            .collect::<Vec<_>>();
        for &(msgno, sequence) in &doomed {
            mailbox_remove_email(m, msgno);
            self.store.borrow_mut().remove(&sequence);
        }
        for e in m.borrow_mut().emails_mut() {
            e.changed = false;
        }
        m.borrow_mut().changed = false;
        if !doomed.is_empty() {
            mailbox_changed(m, MailboxEvent::Update);
        }
        Ok(doomed.len())
    }

    fn open_message(&self, m: &Mailbox, msgno: usize) -> Result<MessageStream> {
        let sequence = m
            .email(msgno)
            .map(|e| e.sequence)
            .ok_or_else(|| Error::new(format!("No message {}", msgno)).set_kind(ErrorKind::Io))?;
        let data = self.store.borrow().get(&sequence).cloned().ok_or_else(|| {
            Error::new(format!("Could not open message {}", msgno)).set_kind(ErrorKind::Io)
        })?;
        Ok(MessageStream { msgno, data })
    }

    fn msg_padding(&self, _m: &Mailbox) -> usize {
        self.padding
    }

    fn can_search_on_server(&self) -> bool {
        self.server_search
    }

    fn supports_tags(&self) -> bool {
        true
    }

    fn search(&self, m: &mut Mailbox, query: &str) -> Result<()> {
        if !self.server_search {
            return Err(Error::new("memory backend: server side search is disabled")
                .set_kind(ErrorKind::NotImplemented));
        }
        let needle = query.to_lowercase();
        let store = self.store.borrow();
        for e in m.emails_mut() {
            e.matched = store
                .get(&e.sequence)
                .map(|raw| String::from_utf8_lossy(raw).to_lowercase().contains(&needle))
                .unwrap_or(false);
        }
        Ok(())
    }
}
