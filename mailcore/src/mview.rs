/*
 * mailcore - mailbox view
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

//! A [`Mailbox`] as the index shows it: threaded or sorted, possibly
//! limited to the messages matching a pattern, with collapsed threads.
//!
//! The view keeps `v2r`, the display position to `msgno` table, and the
//! `vnum` of every email in step with it. Messages that are limited out or
//! hidden inside a collapsed thread have no `vnum`.
//!
//! The view observes its mailbox. Observers run while the mailbox may be
//! borrowed, so the view only queues what it hears; the queue is drained at
//! the start of every mutating call or explicitly with
//! [`MailboxView::process_events`].

use std::{
    cell::RefCell,
    collections::VecDeque,
    rc::Rc,
};

use crate::{
    conf::{ConfigSubset, ThreadingSettings},
    crypt::crypt_query,
    email::{sort::compare_emails, EnvelopeChanged},
    error::{Error, ErrorKind, Result},
    mailbox::Mailbox,
    neomutt::{Globals, NeoMutt},
    notify::{
        EmailEvent, Event, EventData, EventKind, MailboxEvent, MviewEvent, Notify, NotifyType,
        ObserverId, ObserverReturn,
    },
    pattern::{
        compile, pattern_func, CompileContext, CompileFlags, ExecFlags, PatternAction,
        PatternCache, PatternContext, PatternList,
    },
    progress::Progress,
    score::score_message,
    thread::{
        collapse_thread, messages_in_thread, thread_can_collapse, thread_collapse,
        thread_collapse_collapsed, uncollapse_thread, MessageInThread, ThreadContext,
    },
};

/// What the mailbox observer hands over to the view.
#[derive(Clone, Debug, Eq, PartialEq)]
enum PendingEvent {
    Mailbox(MailboxEvent, EventData),
    EmailDeleted(EventData),
}

pub struct MailboxView {
    mailbox: Rc<RefCell<Mailbox>>,
    sub: Rc<RefCell<ConfigSubset>>,
    globals: Rc<RefCell<Globals>>,
    pub threads: ThreadContext,
    /// Display position to `msgno`.
    v2r: Vec<usize>,
    /// Every message in display order, limited or not.
    order: Vec<usize>,
    /// Bytes taken by the visible messages.
    vsize: usize,
    /// The current limit, if it came from a pattern.
    pattern: Option<PatternList>,
    /// A limit is in effect.
    limited: bool,
    /// All threads were collapsed by [`MailboxView::collapse_all`].
    pub collapsed: bool,
    /// The message open in the pager.
    pub msg_in_pager: Option<usize>,
    /// Used for limits and searches. Add [`ExecFlags::BEST_EFFORT`] to skip
    /// messages the backend cannot read.
    pub exec_flags: ExecFlags,
    pub notify: Notify,
    events: Rc<RefCell<VecDeque<PendingEvent>>>,
    observer: ObserverId,
}

impl std::fmt::Debug for MailboxView {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct(stringify!(MailboxView))
            .field("vcount", &self.v2r.len())
            .field("vsize", &self.vsize)
            .field("limit", &self.pattern.as_ref().map(PatternList::source))
            .field("collapsed", &self.collapsed)
            .field("pending_events", &self.events.borrow().len())
            .finish()
    }
}

impl MailboxView {
    /// Create a view of `mailbox` and build it. Publishes `NT_MVIEW/Add`
    /// on the new view, which forwards to `neomutt`.
    pub fn new(mailbox: Rc<RefCell<Mailbox>>, neomutt: &NeoMutt) -> Result<Self> {
        let notify = Notify::new();
        notify.set_parent(Some(&neomutt.notify));
        let events: Rc<RefCell<VecDeque<PendingEvent>>> = Rc::new(RefCell::new(VecDeque::new()));
        let queue = events.clone();
        let observer = mailbox.borrow().notify.observer_add(
            NotifyType::All,
            Rc::new(move |ev: &Event| {
                let pending = match ev.kind {
                    EventKind::Mailbox(MailboxEvent::Change) => None,
                    EventKind::Mailbox(sub) => Some(PendingEvent::Mailbox(sub, ev.data.clone())),
                    EventKind::Email(EmailEvent::Delete) => {
                        Some(PendingEvent::EmailDeleted(ev.data.clone()))
                    }
                    _ => None,
                };
                if let Some(p) = pending {
                    queue.borrow_mut().push_back(p);
                }
                ObserverReturn::Continue
            }),
        );
        let mut ret = Self {
            mailbox,
            sub: neomutt.sub.clone(),
            globals: neomutt.globals.clone(),
            threads: ThreadContext::new(),
            v2r: vec![],
            order: vec![],
            vsize: 0,
            pattern: None,
            limited: false,
            collapsed: false,
            msg_in_pager: None,
            exec_flags: ExecFlags::MATCH_FULL_ADDRESS,
            notify,
            events,
            observer,
        };
        ret.notify
            .send(&Event::new(EventKind::MailboxView(MviewEvent::Add)));
        ret.update()?;
        Ok(ret)
    }

    pub fn mailbox(&self) -> &Rc<RefCell<Mailbox>> {
        &self.mailbox
    }

    pub fn globals(&self) -> &Rc<RefCell<Globals>> {
        &self.globals
    }

    pub fn settings(&self) -> ThreadingSettings {
        self.sub.borrow().settings().clone()
    }

    pub fn vcount(&self) -> usize {
        self.v2r.len()
    }

    pub fn vsize(&self) -> usize {
        self.vsize
    }

    pub fn v2r(&self) -> &[usize] {
        &self.v2r
    }

    /// `msgno` of the message shown at `vnum`.
    pub fn msgno_at(&self, vnum: usize) -> Option<usize> {
        self.v2r.get(vnum).copied()
    }

    pub fn limit_pattern(&self) -> Option<&PatternList> {
        self.pattern.as_ref()
    }

    pub fn is_limited(&self) -> bool {
        self.limited
    }

    /// Drain the mailbox events queued since the last call.
    pub fn process_events(&mut self) -> Result<()> {
        loop {
            let Some(ev) = self.events.borrow_mut().pop_front() else {
                return Ok(());
            };
            debug!("mview: processing {:?}", ev);
            match ev {
                PendingEvent::Mailbox(MailboxEvent::Delete, _) => self.clean(),
                PendingEvent::Mailbox(MailboxEvent::Invalid, _) => self.rebuild()?,
                PendingEvent::Mailbox(MailboxEvent::Update, _) => self.update_tables()?,
                PendingEvent::Mailbox(MailboxEvent::Resort, _) => self.sort_headers(false)?,
                PendingEvent::Mailbox(MailboxEvent::Add, data) => self.add_new(&data)?,
                PendingEvent::Mailbox(MailboxEvent::Change, _) => {}
                PendingEvent::EmailDeleted(EventData::Emails(refs)) => {
                    for r in refs {
                        self.threads.remove_message(r.msgno);
                        if self.msg_in_pager == Some(r.msgno) {
                            self.msg_in_pager = None;
                        }
                    }
                    let mailbox = self.mailbox.clone();
                    self.set_vnum(&mut mailbox.borrow_mut());
                }
                PendingEvent::EmailDeleted(_) => {}
            }
        }
    }

    /// Rebuild everything from the mailbox: counters, hashes, security
    /// flags, supersedes marks, scores and the threads. Publishes
    /// `NT_MVIEW/Change`.
    pub fn update(&mut self) -> Result<()> {
        self.process_events()?;
        self.rebuild()
    }

    fn rebuild(&mut self) -> Result<()> {
        let settings = self.settings();
        {
            let globals = self.globals.borrow();
            let mut m = self.mailbox.borrow_mut();
            m.clear_counters();
            m.clear_hashes();
            m.changed = false;
            let score = settings.score && !globals.score_rules.is_empty();
            let msgnos: Vec<usize> = m.emails().map(|(msgno, _)| msgno).collect();

            for &msgno in &msgnos {
                let limited = self.limited;
                let Some(e) = m.email_mut(msgno) else {
                    continue;
                };
                if !limited {
                    e.visible = true;
                }
                e.vnum = if e.visible { Some(msgno) } else { None };
                e.security = crypt_query(&e.body);
                let supersedes = e.env.supersedes.clone();

                if let Some(id) = supersedes {
                    if let Some(old) = m.lookup_id(&id) {
                        if let Some(old_email) = m.email_mut(old) {
                            old_email.superseded = true;
                        }
                        if score {
                            score_message(&mut m, old, &globals, None, &settings, true)?;
                        }
                    }
                }
                if score {
                    score_message(&mut m, msgno, &globals, None, &settings, false)?;
                }
                if m.email(msgno).map_or(false, |e| e.changed) {
                    m.changed = true;
                }
                m.count_email(msgno);
            }
            m.build_id_hash();
            m.build_subj_hash();
        }
        self.globals.borrow_mut().need_rescore = false;
        self.sort_headers(true)?;
        self.notify
            .send(&Event::new(EventKind::MailboxView(MviewEvent::Change)));
        Ok(())
    }

    /// Thread or sort the messages and renumber the index.
    ///
    /// With `init` the forest is built from scratch, otherwise only new
    /// messages are linked in.
    pub fn sort_headers(&mut self, init: bool) -> Result<()> {
        let settings = self.settings();
        let mailbox = self.mailbox.clone();
        let mut m = mailbox.borrow_mut();
        if m.msg_count() == 0 {
            self.v2r.clear();
            self.order.clear();
            self.vsize = 0;
            m.vcount = 0;
            return Ok(());
        }
        if settings.using_threads() {
            self.threads.sort(&mut m, &settings, init);
            self.order = self.threads.linear_order(&settings);
        } else {
            self.threads.clear(&mut m);
            for e in m.emails_mut() {
                e.tree.clear();
            }
            let mut order: Vec<usize> = m.emails().map(|(msgno, _)| msgno).collect();
            order.sort_by(|a, b| match (m.email(*a), m.email(*b)) {
                (Some(a), Some(b)) => compare_emails(a, b, settings.sort, settings.sort_aux),
                _ => a.cmp(b),
            });
            self.order = order;
        }

        for &msgno in &self.order {
            if let Some(e) = m.email_mut(msgno) {
                if e.collapsed && e.visible {
                    e.vnum.get_or_insert(msgno);
                }
            }
        }
        self.set_vnum(&mut m);
        if settings.using_threads() {
            thread_collapse_collapsed(&self.threads, &mut m, &settings)?;
            self.set_vnum(&mut m);
        }
        Ok(())
    }

    /// Number the messages that keep a place in the index, in display order.
    fn set_vnum(&mut self, m: &mut Mailbox) {
        let padding = m.backend.as_ref().map_or(0, |b| b.msg_padding(m));
        self.v2r.clear();
        self.vsize = 0;
        for &msgno in &self.order {
            let Some(e) = m.email_mut(msgno) else {
                continue;
            };
            if e.vnum.is_some() {
                e.vnum = Some(self.v2r.len());
                self.v2r.push(msgno);
                self.vsize += e.stored_size() + padding;
            }
        }
        m.vcount = self.v2r.len();
    }

    /// Restrict the index to the messages matching `pattern`. An empty
    /// pattern or `~A` removes the limit. Returns the number of visible
    /// messages.
    pub fn limit(&mut self, pattern: &str, progress: Option<&mut dyn Progress>) -> Result<usize> {
        self.process_events()?;
        let pattern = pattern.trim();
        pattern_func(
            self,
            PatternAction::Limit,
            if pattern.is_empty() { "~A" } else { pattern },
            progress,
        )
    }

    /// Record the limit `pattern_func` applied and rebuild the index.
    pub(crate) fn set_limit(&mut self, pattern: Option<PatternList>) -> Result<()> {
        self.limited = pattern.is_some();
        self.pattern = pattern;
        self.collapsed = false;
        self.sort_headers(false)
    }

    /// Show only the thread containing `msgno`.
    pub fn limit_to_thread(&mut self, msgno: usize) -> Result<bool> {
        self.process_events()?;
        let settings = self.settings();
        let Some(top) = ({
            let m = self.mailbox.borrow();
            self.threads
                .node_of(&m, msgno)
                .map(|id| self.threads.top_of_thread(id))
        }) else {
            return Ok(false);
        };
        if !settings.using_threads() {
            return Ok(false);
        }
        {
            let mut m = self.mailbox.borrow_mut();
            let members: Vec<usize> = self.threads.thread_messages(top);
            for e in m.emails_mut() {
                e.vnum = None;
                e.visible = false;
                e.collapsed = false;
                e.num_hidden = 0;
            }
            for n in members {
                if let Some(e) = m.email_mut(n) {
                    e.visible = true;
                    e.vnum = Some(n);
                }
            }
        }
        self.pattern = None;
        self.limited = true;
        self.collapsed = false;
        self.sort_headers(false)?;
        Ok(true)
    }

    /// Collapse the thread of `msgno`. Returns `false` if `$collapse_unread`
    /// or `$collapse_flagged` keep it open.
    pub fn collapse_thread(&mut self, msgno: usize) -> Result<bool> {
        self.process_events()?;
        let settings = self.settings();
        let mailbox = self.mailbox.clone();
        let mut m = mailbox.borrow_mut();
        if !thread_can_collapse(&self.threads, &mut m, &settings, msgno) {
            return Ok(false);
        }
        collapse_thread(&self.threads, &mut m, &settings, msgno)?;
        self.set_vnum(&mut m);
        Ok(true)
    }

    pub fn uncollapse_thread(&mut self, msgno: usize) -> Result<()> {
        self.process_events()?;
        let settings = self.settings();
        let mailbox = self.mailbox.clone();
        let mut m = mailbox.borrow_mut();
        uncollapse_thread(&self.threads, &mut m, &settings, msgno)?;
        self.set_vnum(&mut m);
        Ok(())
    }

    /// Collapse or expand every thread.
    pub fn collapse_all(&mut self, collapse: bool) -> Result<()> {
        self.process_events()?;
        let settings = self.settings();
        if !settings.using_threads() {
            return Err(Error::new("Threading is not enabled").set_kind(ErrorKind::Threading));
        }
        let mailbox = self.mailbox.clone();
        let mut m = mailbox.borrow_mut();
        if m.msg_count() == 0 {
            return Ok(());
        }
        self.collapsed = collapse;
        thread_collapse(&self.threads, &mut m, &settings, collapse)?;
        self.set_vnum(&mut m);
        Ok(())
    }

    /// Size of the thread of `msgno`, or the position of `msgno` inside it.
    pub fn messages_in_thread(&self, msgno: usize, what: MessageInThread) -> usize {
        let m = self.mailbox.borrow();
        messages_in_thread(&self.threads, &m, self.sub.borrow().settings(), msgno, what)
    }

    /// Rescore every message if score rules changed since the last time.
    pub fn check_rescore(&mut self) -> Result<()> {
        self.process_events()?;
        let settings = self.settings();
        if !self.globals.borrow().need_rescore || !settings.score {
            return Ok(());
        }
        {
            let globals = self.globals.borrow();
            let mut m = self.mailbox.borrow_mut();
            let msgnos: Vec<usize> = m.emails().map(|(msgno, _)| msgno).collect();
            for msgno in msgnos {
                score_message(&mut m, msgno, &globals, Some(&self.threads), &settings, true)?;
            }
        }
        self.globals.borrow_mut().need_rescore = false;
        if settings.sort.method == crate::conf::SortMethod::Score
            || settings.sort_aux.method == crate::conf::SortMethod::Score
        {
            self.sort_headers(true)?;
        }
        Ok(())
    }

    /// Compact the mailbox after its backend purged messages: drop the
    /// holes and deleted emails, renumber, and rebuild counters, hashes,
    /// threads and the index.
    pub fn update_tables(&mut self) -> Result<()> {
        let settings = self.settings();
        {
            let mut m = self.mailbox.borrow_mut();
            self.threads.clear(&mut m);
            let removed = m.compact(|e| !e.is_deleted());
            debug!("update_tables: {} messages dropped", removed.len());
            for e in m.emails_mut() {
                e.changed = false;
                e.env.changed = EnvelopeChanged::empty();
                if !self.limited {
                    e.visible = true;
                }
                e.vnum = if e.visible { Some(e.msgno) } else { None };
            }
            m.changed = false;
            m.recount();
            m.build_id_hash();
            m.build_subj_hash();
        }
        self.msg_in_pager = None;
        self.sort_headers(true)?;
        log::trace!(
            "update_tables: {} messages, {} visible ({})",
            self.mailbox.borrow().msg_count(),
            self.vcount(),
            settings.thread_style().as_str()
        );
        Ok(())
    }

    /// Take in messages the mailbox gained since the last update.
    fn add_new(&mut self, data: &EventData) -> Result<()> {
        let EventData::Emails(refs) = data else {
            return Ok(());
        };
        let settings = self.settings();
        {
            let globals = self.globals.borrow();
            let mut m = self.mailbox.borrow_mut();
            let score = settings.score && !globals.score_rules.is_empty();
            for r in refs {
                let matches = match self.pattern.as_ref() {
                    Some(p) => {
                        let ctx = PatternContext::new(&m)
                            .with_globals(&globals)
                            .with_settings(&settings)
                            .with_flags(self.exec_flags);
                        p.exec(&ctx, r.msgno, &mut PatternCache::new())?
                    }
                    None => !self.limited,
                };
                let Some(e) = m.email_mut(r.msgno) else {
                    continue;
                };
                if e.sequence != r.sequence {
                    continue;
                }
                e.visible = matches;
                e.vnum = if matches { Some(r.msgno) } else { None };
                e.security = crypt_query(&e.body);
                if score {
                    score_message(&mut m, r.msgno, &globals, None, &settings, false)?;
                }
                m.count_email(r.msgno);
            }
            m.build_id_hash();
            m.build_subj_hash();
        }
        self.sort_headers(false)
    }

    /// Forget the view state after the mailbox went away.
    fn clean(&mut self) {
        if let Ok(mut m) = self.mailbox.try_borrow_mut() {
            self.threads.clear(&mut m);
            m.vcount = 0;
        }
        self.v2r.clear();
        self.order.clear();
        self.vsize = 0;
        self.pattern = None;
        self.limited = false;
        self.msg_in_pager = None;
    }

    /// Compile `s` for use against this view.
    pub fn compile(&self, s: &str, flags: CompileFlags) -> Result<PatternList> {
        let settings = self.settings();
        let m = self.mailbox.borrow();
        let current = self.msg_in_pager;
        let ctx = CompileContext::new(flags)
            .with_settings(&settings)
            .with_mailbox(&m, current);
        compile(s, &ctx)
    }
}

impl Drop for MailboxView {
    fn drop(&mut self) {
        self.notify
            .send(&Event::new(EventKind::MailboxView(MviewEvent::Delete)));
        if let Ok(m) = self.mailbox.try_borrow() {
            m.notify.observer_remove(self.observer);
        }
        self.clean();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backends::{mailbox_check, mailbox_open, mailbox_sync, InMemoryBackend, MailBackend, RawMessage},
        conf::{ConfigSubset, UseThreads},
        mailbox::{mailbox_changed, SetFlag},
    };

    fn raw(id: &str, irt: Option<&str>, subject: &str, day: u32) -> RawMessage {
        let mut data = format!(
            "From: user{day}@example.com\nSubject: {subject}\nMessage-ID: <{id}>\nDate: {day} Jan 2024 10:00:00 +0000\n"
        );
        if let Some(irt) = irt {
            data.push_str(&format!("In-Reply-To: <{irt}>\n"));
        }
        data.push_str("\nhello\n");
        RawMessage::new(data)
    }

    fn threaded() -> ThreadingSettings {
        ThreadingSettings {
            use_threads: UseThreads::Threads,
            ..ThreadingSettings::default()
        }
    }

    /// Two threads: a <- b <- c, and d <- e.
    fn setup(settings: ThreadingSettings) -> (NeoMutt, Rc<InMemoryBackend>, MailboxView) {
        let neomutt = NeoMutt::from_settings(settings).unwrap();
        let backend = Rc::new(
            InMemoryBackend::new(
                vec![
                    raw("a", None, "first", 1),
                    raw("b", Some("a"), "Re: first", 2),
                    raw("d", None, "second", 3),
                    raw("c", Some("b"), "Re: first", 4),
                    raw("e", Some("d"), "Re: second", 5),
                ],
                &ConfigSubset::default(),
            )
            .with_padding(1),
        );
        let dyn_backend: Rc<dyn MailBackend> = backend.clone();
        let m = mailbox_open(dyn_backend, "memory://").unwrap();
        let view = MailboxView::new(m, &neomutt).unwrap();
        (neomutt, backend, view)
    }

    fn ids(view: &MailboxView) -> Vec<String> {
        let m = view.mailbox().borrow();
        view.v2r()
            .iter()
            .filter_map(|&msgno| m.email(msgno)?.env.message_id.clone())
            .map(|id| id.trim_matches(|c| c == '<' || c == '>').to_string())
            .collect()
    }

    #[test]
    fn test_mview_threaded_update() {
        let (_neomutt, _backend, view) = setup(threaded());
        assert_eq!(ids(&view), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(view.vcount(), 5);
        let m = view.mailbox().borrow();
        assert_eq!(m.vcount, 5);
        for (vnum, &msgno) in view.v2r().iter().enumerate() {
            assert_eq!(m.email(msgno).unwrap().vnum, Some(vnum));
        }
        let expected: usize = m.emails().map(|(_, e)| e.stored_size() + 1).sum();
        assert_eq!(view.vsize(), expected);
        assert_eq!(m.msg_unread, 5);
        assert_eq!(
            view.messages_in_thread(3, MessageInThread::Count),
            3
        );
        assert_eq!(view.messages_in_thread(3, MessageInThread::Position), 3);
    }

    #[test]
    fn test_mview_flat_order() {
        let settings = ThreadingSettings {
            sort: "reverse-date".parse().unwrap(),
            ..ThreadingSettings::default()
        };
        let (_neomutt, _backend, view) = setup(settings);
        assert_eq!(ids(&view), vec!["e", "c", "d", "b", "a"]);
        assert!(view.threads.is_empty());
    }

    #[test]
    fn test_mview_lifecycle_events() {
        let neomutt = NeoMutt::default();
        let seen = Rc::new(RefCell::new(vec![]));
        let seen2 = seen.clone();
        neomutt.notify.observer_add(
            NotifyType::MailboxView,
            Rc::new(move |ev: &Event| {
                seen2.borrow_mut().push(ev.kind);
                ObserverReturn::Continue
            }),
        );
        let m = Rc::new(RefCell::new(Mailbox::new("empty")));
        let view = MailboxView::new(m.clone(), &neomutt).unwrap();
        assert_eq!(m.borrow().notify.observer_count(), 1);
        drop(view);
        assert_eq!(m.borrow().notify.observer_count(), 0);
        assert_eq!(
            seen.borrow().as_slice(),
            &[
                EventKind::MailboxView(MviewEvent::Add),
                EventKind::MailboxView(MviewEvent::Change),
                EventKind::MailboxView(MviewEvent::Delete),
            ]
        );
    }

    #[test]
    fn test_mview_collapse() {
        let (_neomutt, _backend, mut view) = setup(threaded());
        // unread threads stay open unless $collapse_unread
        assert!(view.collapse_thread(0).unwrap());
        assert_eq!(ids(&view), vec!["a", "d", "e"]);
        {
            let m = view.mailbox().borrow();
            assert!(m.email(0).unwrap().collapsed);
            assert_eq!(m.email(0).unwrap().num_hidden, 3);
            assert_eq!(m.email(1).unwrap().vnum, None);
            assert!(m.email(1).unwrap().visible);
        }
        view.uncollapse_thread(0).unwrap();
        assert_eq!(ids(&view), vec!["a", "b", "c", "d", "e"]);

        view.collapse_all(true).unwrap();
        assert_eq!(ids(&view), vec!["a", "d"]);
        view.collapse_all(false).unwrap();
        assert_eq!(ids(&view), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_mview_collapse_gates() {
        let settings = ThreadingSettings {
            collapse_unread: false,
            ..threaded()
        };
        let (_neomutt, _backend, mut view) = setup(settings);
        assert!(!view.collapse_thread(0).unwrap());
        assert_eq!(view.vcount(), 5);
        {
            let mailbox = view.mailbox().clone();
            let mut m = mailbox.borrow_mut();
            for msgno in 0..m.msg_count() {
                m.set_flag(msgno, SetFlag::Read, true, false, true);
            }
        }
        assert!(view.collapse_thread(0).unwrap());
        assert_eq!(view.vcount(), 3);
    }

    #[test]
    fn test_mview_collapse_needs_threads() {
        let (_neomutt, _backend, mut view) = setup(ThreadingSettings::default());
        let err = view.collapse_all(true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Threading);
    }

    #[test]
    fn test_mview_limit_to_thread() {
        let (_neomutt, _backend, mut view) = setup(threaded());
        assert!(view.limit_to_thread(4).unwrap());
        assert_eq!(ids(&view), vec!["d", "e"]);
        assert!(view.is_limited());
        // an update keeps the limit
        view.update().unwrap();
        assert_eq!(ids(&view), vec!["d", "e"]);
        view.limit("", None).unwrap();
        assert_eq!(view.vcount(), 5);
    }

    #[test]
    fn test_mview_new_mail() {
        let (_neomutt, backend, mut view) = setup(threaded());
        view.limit("~s first", None).unwrap();
        assert_eq!(ids(&view), vec!["a", "b", "c"]);
        backend.deliver(raw("f", Some("e"), "Re: second", 6));
        backend.deliver(raw("g", Some("c"), "Re: first", 7));
        mailbox_check(view.mailbox()).unwrap();
        view.process_events().unwrap();
        // the limit applies to new mail too
        assert_eq!(ids(&view), vec!["a", "b", "c", "g"]);
        view.limit("~A", None).unwrap();
        assert_eq!(ids(&view), vec!["a", "b", "c", "g", "d", "e", "f"]);
        assert_eq!(view.mailbox().borrow().msg_unread, 7);
    }

    #[test]
    fn test_mview_sync_update_tables() {
        let (_neomutt, _backend, mut view) = setup(threaded());
        {
            let mailbox = view.mailbox().clone();
            let mut m = mailbox.borrow_mut();
            m.set_flag(1, SetFlag::Delete, true, false, true);
            m.set_flag(2, SetFlag::Delete, true, false, true);
        }
        assert_eq!(mailbox_sync(view.mailbox(), true).unwrap(), 2);
        view.process_events().unwrap();
        let m = view.mailbox().borrow();
        assert_eq!(m.msg_count(), 3);
        assert_eq!(m.msg_deleted, 0);
        for (msgno, e) in m.emails() {
            assert_eq!(e.msgno, msgno);
        }
        drop(m);
        // b and d are gone, c and e hang off phantoms
        assert_eq!(ids(&view), vec!["a", "c", "e"]);
    }

    #[test]
    fn test_mview_mailbox_events() {
        let (_neomutt, _backend, mut view) = setup(threaded());
        mailbox_changed(view.mailbox(), MailboxEvent::Invalid);
        view.process_events().unwrap();
        assert_eq!(view.vcount(), 5);
        mailbox_changed(view.mailbox(), MailboxEvent::Delete);
        view.process_events().unwrap();
        assert_eq!(view.vcount(), 0);
        assert!(view.threads.is_empty());
    }

    #[test]
    fn test_mview_supersedes() {
        let neomutt = NeoMutt::from_settings(threaded()).unwrap();
        let mut m = Mailbox::new("inbox");
        for data in [
            "Message-ID: <old>\nSubject: draft\n\nv1\n",
            "Message-ID: <new>\nSupersedes: <old>\nSubject: draft\n\nv2\n",
        ] {
            m.insert_email(crate::email::Email::from_bytes(data.as_bytes(), None).unwrap());
        }
        let view = MailboxView::new(Rc::new(RefCell::new(m)), &neomutt).unwrap();
        let m = view.mailbox().borrow();
        assert!(m.email(0).unwrap().superseded);
        assert!(!m.email(1).unwrap().superseded);
    }
}
