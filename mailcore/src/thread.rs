/*
 * mailcore - thread module
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

//! Conversation threading.
//!
//! Messages are linked into a forest by their `Message-ID`, `In-Reply-To`
//! and `References` headers, and optionally by subject. Nodes live in a
//! [`ThreadContext`] arena and are addressed by generational [`ThreadId`]
//! handles; an [`Email`] only holds the handle of its node.
//!
//! A node either carries a message or is a phantom standing in for a
//! referenced message that is not in the mailbox:
//!
//! ```text
//! <a>              <a>
//!  |                └─ (b)      phantom
//!  <c> refs a b          └─ <c>
//! ```

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    ops::{Index, IndexMut},
};

use smallvec::SmallVec;

use crate::{
    conf::{Sort, ThreadingSettings, UseThreads},
    email::{sort::compare_by, Email, Envelope},
    mailbox::Mailbox,
    utils::datetime::UnixTimestamp,
};

pub mod iterators;
pub mod navigation;
mod tree;

pub use iterators::*;
pub use navigation::*;

/// Handle of a node in a [`ThreadContext`].
///
/// The generation changes every time a slot is reused, so a handle kept
/// across a rebuild never aliases a different node.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ThreadId {
    index: u32,
    generation: u32,
}

impl fmt::Display for ThreadId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}v{}", self.index, self.generation)
    }
}

/// What a thread node stands for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ThreadContents {
    /// A message, by `msgno`.
    Message(usize),
    /// A message that is referenced but not present.
    Phantom(String),
}

/// Glyphs of the thread tree drawn in front of a subject.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TreeChar {
    /// Last child.
    LLCorner,
    /// Child with later siblings.
    LTee,
    HLine,
    VLine,
    Space,
    RArrow,
    /// Attached by subject.
    Star,
    /// Parent is hidden by the limit.
    Hidden,
    /// Duplicate of its parent.
    Equals,
    /// Child whose parent is not drawn.
    TTee,
    /// Parent is missing from the mailbox.
    Missing,
}

impl TreeChar {
    pub const fn as_ascii(self) -> char {
        match self {
            Self::LLCorner => '`',
            Self::LTee => '|',
            Self::HLine => '-',
            Self::VLine => '|',
            Self::Space => ' ',
            Self::RArrow => '>',
            Self::Star => '*',
            Self::Hidden => '&',
            Self::Equals => '=',
            Self::TTee => '-',
            Self::Missing => '?',
        }
    }

    pub const fn as_unicode(self) -> char {
        match self {
            Self::LLCorner => '└',
            Self::LTee => '├',
            Self::HLine => '─',
            Self::VLine => '│',
            Self::Space => ' ',
            Self::RArrow => '>',
            Self::Star => '*',
            Self::Hidden => '&',
            Self::Equals => '=',
            Self::TTee => '┬',
            Self::Missing => '?',
        }
    }
}

/// Render a tree prefix.
pub fn tree_to_string(tree: &[TreeChar], ascii: bool) -> String {
    tree.iter()
        .map(|c| if ascii { c.as_ascii() } else { c.as_unicode() })
        .collect()
}

#[derive(Clone, Debug)]
pub struct ThreadNode {
    pub contents: ThreadContents,
    pub parent: Option<ThreadId>,
    /// First child.
    pub child: Option<ThreadId>,
    pub next: Option<ThreadId>,
    pub prev: Option<ThreadId>,
    /// Message this node sorts by among its siblings.
    pub sort_aux_key: Option<usize>,
    /// Message this node sorts by at the top level.
    pub sort_thread_key: Option<usize>,
    /// Attached by subject rather than by reference.
    pub fake_thread: bool,
    /// Second message with its parent's `Message-ID`.
    pub duplicate_thread: bool,
    pub check_subject: bool,
    pub visible: bool,
    /// Takes up a level of indentation when drawn.
    pub deep: bool,
    /// 0: nothing visible below, 1: something visible below, 2: this is
    /// the first visible node of its subtree.
    pub subtree_visible: u8,
    pub next_subtree_visible: bool,
    /// The children need sorting.
    pub sort_children: bool,
}

impl ThreadNode {
    fn new(contents: ThreadContents) -> Self {
        Self {
            contents,
            parent: None,
            child: None,
            next: None,
            prev: None,
            sort_aux_key: None,
            sort_thread_key: None,
            fake_thread: false,
            duplicate_thread: false,
            check_subject: false,
            visible: false,
            deep: false,
            subtree_visible: 0,
            next_subtree_visible: false,
            sort_children: false,
        }
    }

    pub fn message(&self) -> Option<usize> {
        match self.contents {
            ThreadContents::Message(msgno) => Some(msgno),
            ThreadContents::Phantom(_) => None,
        }
    }

    pub fn is_phantom(&self) -> bool {
        matches!(self.contents, ThreadContents::Phantom(_))
    }
}

#[derive(Clone, Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<ThreadNode>,
}

/// The thread forest of one mailbox.
#[derive(Clone, Debug, Default)]
pub struct ThreadContext {
    slots: Vec<Slot>,
    free: Vec<u32>,
    tree: Option<ThreadId>,
    /// `Message-ID` to nodes. Only real messages share a key.
    hash: Option<HashMap<String, SmallVec<[ThreadId; 1]>>>,
    /// `(sort, sort_aux)` of the last pass.
    sorted_by: Option<(Sort, Sort)>,
}

/// # Panics
///
/// On a handle whose node is gone. Use [`ThreadContext::get`] for handles
/// that may be stale.
impl Index<ThreadId> for ThreadContext {
    type Output = ThreadNode;

    fn index(&self, id: ThreadId) -> &ThreadNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale thread id {}", id),
        }
    }
}

impl IndexMut<ThreadId> for ThreadContext {
    fn index_mut(&mut self, id: ThreadId) -> &mut ThreadNode {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale thread id {}", id),
        }
    }
}

impl ThreadContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// First root of the forest.
    pub fn tree(&self) -> Option<ThreadId> {
        self.tree
    }

    /// The node of `id`, or `None` if it was dropped or the forest was
    /// rebuilt since.
    pub fn get(&self, id: ThreadId) -> Option<&ThreadNode> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut ThreadNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes, phantoms included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn alloc(&mut self, node: ThreadNode) -> ThreadId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.node = Some(node);
            ThreadId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            ThreadId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    fn release(&mut self, id: ThreadId) {
        if let Some(slot) = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation && s.node.is_some())
        {
            slot.node = None;
            self.free.push(id.index);
        }
    }

    /// Nodes registered under a `Message-ID`.
    pub fn find(&self, message_id: &str) -> &[ThreadId] {
        self.hash
            .as_ref()
            .and_then(|h| h.get(message_id))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn hash_first(&self, message_id: &str) -> Option<ThreadId> {
        self.find(message_id).first().copied()
    }

    fn hash_insert(&mut self, message_id: &str, id: ThreadId) {
        self.hash
            .get_or_insert_with(HashMap::new)
            .entry(message_id.to_string())
            .or_default()
            .push(id);
    }

    fn hash_remove(&mut self, message_id: &str, id: ThreadId) -> bool {
        let Some(hash) = self.hash.as_mut() else {
            return false;
        };
        let Some(bucket) = hash.get_mut(message_id) else {
            return false;
        };
        bucket.retain(|t| *t != id);
        let empty = bucket.is_empty();
        if empty {
            hash.remove(message_id);
        }
        empty
    }

    fn hash_key_of(&self, id: ThreadId) -> Option<String> {
        if let ThreadContents::Phantom(key) = &self[id].contents {
            return Some(key.clone());
        }
        self.hash.as_ref()?.iter().find_map(|(key, bucket)| {
            if bucket.contains(&id) {
                Some(key.clone())
            } else {
                None
            }
        })
    }

    /// The node of the message at `msgno`, if it is threaded.
    pub fn node_of(&self, m: &Mailbox, msgno: usize) -> Option<ThreadId> {
        m.email(msgno)?.thread.filter(|id| self.contains(*id))
    }

    /// `a` is `b` or lies below it.
    pub fn is_descendant(&self, a: ThreadId, b: ThreadId) -> bool {
        let mut cur = Some(a);
        while let Some(c) = cur {
            if c == b {
                return true;
            }
            cur = self[c].parent;
        }
        false
    }

    pub fn top_of_thread(&self, id: ThreadId) -> ThreadId {
        let mut cur = id;
        while let Some(p) = self[cur].parent {
            cur = p;
        }
        cur
    }

    /// Remove `id` from its sibling list. The parent link is left alone.
    fn unlink(&mut self, id: ThreadId) {
        let (parent, prev, next) = {
            let n = &self[id];
            (n.parent, n.prev, n.next)
        };
        match prev {
            Some(p) => self[p].next = next,
            None => match parent {
                Some(par) => {
                    if self[par].child == Some(id) {
                        self[par].child = next;
                    }
                }
                None => {
                    if self.tree == Some(id) {
                        self.tree = next;
                    }
                }
            },
        }
        if let Some(n) = next {
            self[n].prev = prev;
        }
        let n = &mut self[id];
        n.prev = None;
        n.next = None;
    }

    /// Make `id` the first child of `parent`, or the first root.
    fn insert(&mut self, parent: Option<ThreadId>, id: ThreadId) {
        let head = match parent {
            Some(p) => self[p].child,
            None => self.tree,
        };
        {
            let n = &mut self[id];
            n.prev = None;
            n.next = head;
            n.parent = parent;
        }
        if let Some(h) = head {
            self[h].prev = Some(id);
        }
        match parent {
            Some(p) => self[p].child = Some(id),
            None => self.tree = Some(id),
        }
    }

    /// The closest message-bearing nodes of the subtree at `start`, in
    /// order. A message-bearing node hides the messages below it.
    fn nearest_messages(&self, start: ThreadId) -> Vec<ThreadId> {
        let mut ret = vec![];
        let mut cur = start;
        loop {
            while self[cur].message().is_none() {
                match self[cur].child {
                    Some(c) => cur = c,
                    None => break,
                }
            }
            if self[cur].message().is_some() {
                ret.push(cur);
            }
            while self[cur].next.is_none() && cur != start {
                match self[cur].parent {
                    Some(p) => cur = p,
                    None => return ret,
                }
            }
            if cur == start {
                return ret;
            }
            match self[cur].next {
                Some(n) => cur = n,
                None => return ret,
            }
        }
    }

    /// Forget every node and unlink every email.
    pub fn clear(&mut self, m: &mut Mailbox) {
        for e in m.emails_mut() {
            e.thread = None;
            e.threaded = false;
        }
        // Slots are kept so the next forest hands out new generations.
        for slot in &mut self.slots {
            slot.node = None;
        }
        self.free = (0..self.slots.len() as u32).rev().collect();
        self.tree = None;
        self.hash = None;
        self.sorted_by = None;
    }

    /// Turn the node of a removed message into a phantom, or drop it if
    /// nothing hangs off it.
    pub fn remove_message(&mut self, msgno: usize) -> bool {
        let Some(id) = self.slots.iter().enumerate().find_map(|(index, slot)| {
            match slot.node.as_ref()?.contents {
                ThreadContents::Message(n) if n == msgno => Some(ThreadId {
                    index: index as u32,
                    generation: slot.generation,
                }),
                _ => None,
            }
        }) else {
            return false;
        };
        let key = self.hash_key_of(id);
        let shared = key.as_deref().map_or(false, |k| self.find(k).len() > 1);
        match key {
            Some(key) if !shared && self[id].child.is_some() => {
                self[id].contents = ThreadContents::Phantom(key);
                self[id].sort_aux_key = None;
                self[id].sort_thread_key = None;
            }
            key => {
                if let Some(key) = key {
                    self.hash_remove(&key, id);
                }
                let parent = self[id].parent;
                let mut child = self[id].child;
                while let Some(c) = child {
                    child = self[c].next;
                    self.unlink(c);
                    self[c].duplicate_thread = false;
                    self.insert(parent, c);
                }
                self[id].child = None;
                self.unlink(id);
                self.release(id);
                self.prune_phantoms(parent);
            }
        }
        true
    }

    /// Drop childless phantoms from `start` upwards.
    fn prune_phantoms(&mut self, start: Option<ThreadId>) {
        let mut cur = start;
        while let Some(id) = cur {
            if !self[id].is_phantom() || self[id].child.is_some() {
                if let Some(p) = self[id].parent {
                    self[p].sort_children = true;
                }
                return;
            }
            cur = self[id].parent;
            if let ThreadContents::Phantom(key) = self[id].contents.clone() {
                self.hash_remove(&key, id);
            }
            self.unlink(id);
            self.release(id);
        }
    }

    /// Build or update the forest.
    ///
    /// With `init` everything is rethreaded from scratch; otherwise only
    /// messages that are not threaded yet are linked in and the rest of
    /// the forest keeps its shape.
    pub fn sort(&mut self, m: &mut Mailbox, settings: &ThreadingSettings, init: bool) {
        let init = init || self.hash.is_none();
        if init {
            self.clear(m);
            self.hash = Some(HashMap::with_capacity(m.msg_count() * 2));
        }
        if m.emails().next().is_none() {
            return;
        }

        // Hang everything off a temporary root so that dangling nodes are
        // the ones without a parent.
        let top = self.alloc(ThreadNode::new(ThreadContents::Phantom(String::new())));
        let mut root = self.tree.take();
        self[top].child = root;
        while let Some(r) = root {
            self[r].parent = Some(top);
            root = self[r].next;
        }

        self.attach_messages(m, settings, top, init);
        self.link_references(m, top);

        let mut root = self[top].child;
        while let Some(r) = root {
            self[r].parent = None;
            root = self[r].next;
        }
        self.tree = self[top].child;
        self[top].child = None;
        self.release(top);

        self.check_subjects(m, init);
        if !settings.strict_threads {
            self.pseudo_threads(m, settings);
        }
        if self.tree.is_some() {
            self.sort_subthreads(m, settings, init);
            tree::draw_tree(self, m, settings);
        }
    }

    fn attach_messages(
        &mut self,
        m: &mut Mailbox,
        settings: &ThreadingSettings,
        top: ThreadId,
        init: bool,
    ) {
        for msgno in 0..m.msg_count() {
            let Some(e) = m.email(msgno) else {
                continue;
            };
            if let Some(thread) = e.thread {
                // Subject-attached children may belong under a new arrival.
                let mut child = self[thread].child;
                while let Some(c) = child {
                    child = self[c].next;
                    if self[c].fake_thread {
                        self.unlink(c);
                        self.insert(Some(top), c);
                        self[c].fake_thread = false;
                    }
                }
                continue;
            }

            let message_id = e.env.message_id.clone();
            let found = match message_id.as_deref() {
                Some(id) if !init || settings.duplicate_threads => self.hash_first(id),
                _ => None,
            };
            match found {
                Some(ph) if self[ph].is_phantom() => {
                    self[ph].contents = ThreadContents::Message(msgno);
                    self[ph].check_subject = true;
                    if let Some(e) = m.email_mut(msgno) {
                        e.thread = Some(ph);
                    }
                    if let Some(c) = self[ph].child {
                        for d in self.nearest_messages(c) {
                            self[d].check_subject = true;
                        }
                    }
                    // Links above the placeholder came from its children;
                    // the message's own headers decide from here on.
                    let mut cur = ph;
                    while let Some(p) = self[cur].parent {
                        self.unlink(cur);
                        let n = &mut self[cur];
                        n.parent = None;
                        n.sort_thread_key = None;
                        n.sort_aux_key = None;
                        n.fake_thread = false;
                        cur = p;
                        if cur == top || self[cur].child.is_some() || !self[cur].is_phantom() {
                            break;
                        }
                    }
                }
                found => {
                    let mut node = ThreadNode::new(ThreadContents::Message(msgno));
                    node.check_subject = true;
                    let id = self.alloc(node);
                    if let Some(message_id) = message_id.as_deref() {
                        self.hash_insert(message_id, id);
                    }
                    let e = m.email_mut(msgno);
                    if let Some(e) = e {
                        e.thread = Some(id);
                    }
                    if let Some(mut dup) = found.filter(|_| settings.duplicate_threads) {
                        if self[dup].duplicate_thread {
                            if let Some(p) = self[dup].parent {
                                dup = p;
                            }
                        }
                        self.insert(Some(dup), id);
                        self[id].duplicate_thread = true;
                        if let Some(e) = m.email_mut(msgno) {
                            e.threaded = true;
                        }
                    }
                }
            }
        }
    }

    fn link_references(&mut self, m: &mut Mailbox, top: ThreadId) {
        for msgno in 0..m.msg_count() {
            let Some(e) = m.email_mut(msgno) else {
                continue;
            };
            if e.threaded {
                continue;
            }
            e.threaded = true;
            let Some(mut thread) = e.thread else {
                continue;
            };
            for reference in reference_chain(&e.env) {
                let parent = match self.hash_first(&reference) {
                    Some(mut p) => {
                        if self[p].duplicate_thread {
                            if let Some(pp) = self[p].parent {
                                p = pp;
                            }
                        }
                        if self.is_descendant(p, thread) {
                            // reference loop
                            continue;
                        }
                        p
                    }
                    None => {
                        let p = self.alloc(ThreadNode::new(ThreadContents::Phantom(
                            reference.clone(),
                        )));
                        self.hash_insert(&reference, p);
                        p
                    }
                };
                if self[thread].parent.is_some() {
                    self.unlink(thread);
                }
                self.insert(Some(parent), thread);
                thread = parent;
                if !self[thread].is_phantom()
                    || self[thread].parent.map_or(false, |p| p != top)
                {
                    break;
                }
            }
            if self[thread].parent.is_none() {
                self.insert(Some(top), thread);
            }
        }
    }

    fn check_subjects(&mut self, m: &mut Mailbox, init: bool) {
        for msgno in 0..m.msg_count() {
            let Some(thread) = self.node_of(m, msgno) else {
                continue;
            };
            if self[thread].check_subject {
                self[thread].check_subject = false;
            } else if !init {
                continue;
            }
            let mut parent = self[thread].parent;
            while let Some(p) = parent.filter(|p| self[*p].is_phantom()) {
                parent = self[p].parent;
            }
            let changed = {
                let Some(e) = m.email(msgno) else {
                    continue;
                };
                match parent
                    .and_then(|p| self[p].message())
                    .and_then(|pm| m.email(pm))
                {
                    None => true,
                    Some(pe) => match (e.env.real_subj(), pe.env.real_subj()) {
                        (Some(a), Some(b)) => a != b,
                        (a, b) => a.is_some() || b.is_some(),
                    },
                }
            };
            if let Some(e) = m.email_mut(msgno) {
                e.subject_changed = changed;
            }
        }
    }

    /// Subjects a subtree could be attached by, and its earliest date.
    fn make_subject_list(
        &self,
        m: &Mailbox,
        settings: &ThreadingSettings,
        cur: ThreadId,
    ) -> (BTreeSet<String>, Option<UnixTimestamp>) {
        let mut subjects = BTreeSet::new();
        let mut date: Option<UnixTimestamp> = None;
        for node in self.nearest_messages(cur) {
            let Some(e) = self[node].message().and_then(|msgno| m.email(msgno)) else {
                continue;
            };
            let this = thread_date(e, settings);
            if date.map_or(true, |d| this < d) {
                date = Some(this);
            }
            if let Some(subj) = e.env.real_subj() {
                if e.env.real_subj_offset() != Some(0) || !settings.sort_re {
                    subjects.insert(subj.to_string());
                }
            }
        }
        (subjects, date)
    }

    /// Best parent for `cur` by subject: the latest message with the same
    /// subject sent before everything in `cur`'s subtree.
    fn find_subject(
        &self,
        m: &Mailbox,
        settings: &ThreadingSettings,
        cur: ThreadId,
    ) -> Option<ThreadId> {
        let (subjects, date) = self.make_subject_list(m, settings, cur);
        let date = date.unwrap_or_default();
        let hash = m.subj_hash.as_ref()?;
        let mut last: Option<(ThreadId, UnixTimestamp)> = None;
        for subject in &subjects {
            let Some(candidates) = hash.get(subject) else {
                continue;
            };
            for &msgno in candidates {
                let Some(e) = m.email(msgno) else {
                    continue;
                };
                let Some(tmp) = e.thread.filter(|t| self.contains(*t)) else {
                    continue;
                };
                let this = thread_date(e, settings);
                if tmp != cur
                    && !self[tmp].fake_thread
                    && e.subject_changed
                    && !self.is_descendant(tmp, cur)
                    && date >= this
                    && last.map_or(true, |(_, d)| d < this)
                    && e.env.real_subj() == Some(subject.as_str())
                {
                    last = Some((tmp, this));
                }
            }
        }
        last.map(|(t, _)| t)
    }

    fn pseudo_threads(&mut self, m: &mut Mailbox, settings: &ThreadingSettings) {
        if m.subj_hash.is_none() {
            m.build_subj_hash();
        }
        let mut next_root = self.tree;
        while let Some(cur) = next_root {
            next_root = self[cur].next;
            let Some(parent) = self.find_subject(m, settings, cur) else {
                continue;
            };
            self[cur].fake_thread = true;
            self.unlink(cur);
            self.insert(Some(parent), cur);
            self[parent].sort_children = true;

            let parent_subj = self[parent]
                .message()
                .and_then(|msgno| m.email(msgno))
                .and_then(|e| e.env.real_subj().map(str::to_string));
            for tmp in self.nearest_messages(cur) {
                let Some(msgno) = self[tmp].message() else {
                    continue;
                };
                let same = m
                    .email(msgno)
                    .map_or(false, |e| e.env.real_subj() == parent_subj.as_deref());
                if tmp != cur && !same {
                    continue;
                }
                // Pseudo-children with the parent's subject move up to it.
                if let Some(e) = m.email_mut(msgno) {
                    e.subject_changed = false;
                }
                let mut child = self[tmp].child;
                while let Some(c) = child {
                    child = self[c].next;
                    if self[c].fake_thread {
                        self.unlink(c);
                        self.insert(Some(parent), c);
                    }
                }
            }
        }
    }

    fn sort_subthreads(&mut self, m: &Mailbox, settings: &ThreadingSettings, init: bool) {
        let mut sort = settings.sort;
        let sort_aux = settings.sort_aux;
        if sort.method == crate::conf::SortMethod::Threads {
            sort = sort_aux;
        }
        let init = init || self.sorted_by != Some((sort, sort_aux));
        self.sorted_by = Some((sort, sort_aux));

        // Children come before their parents.
        let mut order = vec![];
        let mut stack: Vec<(ThreadId, bool)> = vec![];
        let mut root = self.tree;
        while let Some(r) = root {
            stack.push((r, false));
            root = self[r].next;
        }
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            let mut child = self[id].child;
            while let Some(c) = child {
                stack.push((c, false));
                child = self[c].next;
            }
        }

        let mut sort_top = false;
        for &id in &order {
            if init || self[id].sort_thread_key.is_none() || self[id].sort_aux_key.is_none() {
                let n = &mut self[id];
                n.sort_thread_key = None;
                n.sort_aux_key = None;
                let parent = n.parent;
                match parent {
                    Some(p) => self[p].sort_children = true,
                    None => sort_top = true,
                }
            }
        }
        for id in order {
            if self[id].child.is_none() {
                let msg = self[id].message();
                let n = &mut self[id];
                n.sort_aux_key = msg;
                n.sort_thread_key = msg;
                continue;
            }
            let resort = self[id].sort_children;
            if resort {
                let first = self[id].child;
                let sorted = self.sorted_siblings(m, first, sort, sort_aux, true);
                self.relink_siblings(Some(id), &sorted);
            }
            if !(resort
                || self[id].sort_aux_key.is_none()
                || self[id].sort_thread_key.is_none())
            {
                continue;
            }
            self[id].sort_children = false;
            let old = (self[id].sort_aux_key, self[id].sort_thread_key);
            let keys = self.compute_keys(m, id, sort, sort_aux);
            self[id].sort_aux_key = keys.0;
            self[id].sort_thread_key = keys.1;
            if old != keys {
                let parent = self[id].parent;
                match parent {
                    Some(p) => self[p].sort_children = true,
                    None => sort_top = true,
                }
            }
        }
        if sort_top {
            let sorted = self.sorted_siblings(m, self.tree, sort, sort_aux, false);
            self.relink_siblings(None, &sorted);
        }
    }

    /// Sort keys of an inner node from its own message and its children.
    fn compute_keys(
        &self,
        m: &Mailbox,
        id: ThreadId,
        sort: Sort,
        sort_aux: Sort,
    ) -> (Option<usize>, Option<usize>) {
        let own = self[id].message();
        let children: SmallVec<[ThreadId; 8]> = self.siblings(self[id].child).collect();
        let pick = |keys: &mut dyn Iterator<Item = usize>, by: Sort, latest: bool| {
            keys.filter_map(|k| m.email(k)).reduce(|a, b| {
                let ord = compare_by(a, b, Sort { reverse: false, ..by })
                    .then_with(|| a.msgno.cmp(&b.msgno));
                if ord.is_lt() == latest {
                    b
                } else {
                    a
                }
            })
            .map(|e| e.msgno)
        };

        let aux = if sort_aux.last {
            let mut keys = own
                .into_iter()
                .chain(children.iter().filter_map(|c| self[*c].sort_aux_key));
            pick(&mut keys, sort_aux, true)
        } else {
            own.or_else(|| {
                let mut keys = children.iter().filter_map(|c| self[*c].sort_aux_key);
                pick(&mut keys, sort_aux, false)
            })
        };
        let thread = if sort.same_order(&sort_aux) {
            aux
        } else if sort.last {
            let mut keys = own
                .into_iter()
                .chain(children.iter().filter_map(|c| self[*c].sort_thread_key));
            pick(&mut keys, sort, true)
        } else {
            own.or_else(|| {
                let mut keys = children.iter().filter_map(|c| self[*c].sort_thread_key);
                pick(&mut keys, sort, false)
            })
        };
        (aux, thread)
    }

    fn sorted_siblings(
        &self,
        m: &Mailbox,
        first: Option<ThreadId>,
        sort: Sort,
        sort_aux: Sort,
        inner: bool,
    ) -> Vec<ThreadId> {
        let mut siblings: Vec<ThreadId> = self.siblings(first).collect();
        let key = |id: ThreadId| {
            let n = &self[id];
            let k = if inner {
                n.sort_aux_key
            } else {
                n.sort_thread_key
            };
            k.and_then(|msgno| m.email(msgno))
        };
        let by = if inner { sort_aux } else { sort };
        siblings.sort_by(|a, b| match (key(*a), key(*b)) {
            (Some(x), Some(y)) => compare_by(x, y, by).then_with(|| x.msgno.cmp(&y.msgno)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        siblings
    }

    fn relink_siblings(&mut self, parent: Option<ThreadId>, sorted: &[ThreadId]) {
        for (i, id) in sorted.iter().enumerate() {
            let n = &mut self[*id];
            n.prev = i.checked_sub(1).map(|p| sorted[p]);
            n.next = sorted.get(i + 1).copied();
        }
        match parent {
            Some(p) => self[p].child = sorted.first().copied(),
            None => self.tree = sorted.first().copied(),
        }
    }

    /// Every message of the thread containing `id`, in tree order.
    pub fn thread_messages(&self, id: ThreadId) -> Vec<usize> {
        let top = self.top_of_thread(id);
        self.subtree(top)
            .filter_map(|(_, t)| self[t].message())
            .collect()
    }

    /// Display order of all threaded messages.
    ///
    /// `reverse` flips the order of the threads, not of the messages
    /// inside a thread.
    pub fn linearize(&self, reverse: bool) -> LinearIter<'_> {
        LinearIter::new(self, reverse)
    }

    /// Display order for the threading style in `settings`.
    pub fn linear_order(&self, settings: &ThreadingSettings) -> Vec<usize> {
        self.linearize(settings.thread_style() == UseThreads::Reverse)
            .map(|(_, _, msgno)| msgno)
            .collect()
    }
}

fn thread_date(e: &Email, settings: &ThreadingSettings) -> UnixTimestamp {
    if settings.thread_received {
        e.received
    } else {
        e.env.date
    }
}

/// Parent candidates of a message, nearest first.
///
/// The first `In-Reply-To` comes first. Without `References` the rest of
/// `In-Reply-To` follows; otherwise `References` from the last entry
/// backwards, skipping its last entry when it repeats `In-Reply-To`.
pub fn reference_chain(env: &Envelope) -> Vec<String> {
    let refs: Vec<&String> = env.references.iter().rev().collect();
    let mut chain = vec![];
    match env.in_reply_to.first() {
        Some(first) => {
            chain.push(first.clone());
            if refs.is_empty() {
                chain.extend(env.in_reply_to.iter().skip(1).cloned());
            } else {
                let skip = usize::from(refs[0] == first);
                chain.extend(refs.into_iter().skip(skip).cloned());
            }
        }
        None => chain.extend(refs.into_iter().cloned()),
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::Body;

    pub(crate) fn email(id: &str, irt: &[&str], refs: &[&str], subject: &str, date: u64) -> Email {
        let mut env = Envelope::new();
        env.message_id = Some(id.to_string());
        env.in_reply_to = irt.iter().map(|s| s.to_string()).collect();
        env.references = refs.iter().map(|s| s.to_string()).collect();
        let re = crate::conf::compile_regex(&crate::conf::default_vals::reply_regex()).unwrap();
        env.set_subject(Some(subject), Some(&re));
        env.date = date;
        let mut e = Email::new(env, Body::default());
        e.received = date;
        e
    }

    fn ids(ctx: &ThreadContext, m: &Mailbox) -> Vec<String> {
        ctx.linearize(false)
            .map(|(depth, _, msgno)| {
                format!(
                    "{}{}",
                    " ".repeat(depth),
                    m.email(msgno).unwrap().env.message_id.as_deref().unwrap()
                )
            })
            .collect()
    }

    #[test]
    fn test_thread_stale_ids() {
        let mut m = Mailbox::new("memory://stale");
        m.insert_email(email("<a>", &[], &[], "x", 1));
        m.insert_email(email("<b>", &["<a>"], &[], "x", 2));
        let settings = ThreadingSettings {
            use_threads: UseThreads::Threads,
            ..ThreadingSettings::default()
        };
        let mut ctx = ThreadContext::new();
        ctx.sort(&mut m, &settings, true);
        let old = m.email(1).unwrap().thread.unwrap();
        assert!(ctx.get(old).is_some());

        ctx.sort(&mut m, &settings, true);
        let new = m.email(1).unwrap().thread.unwrap();
        assert_ne!(old, new);
        assert!(ctx.get(old).is_none());
        assert!(ctx.get_mut(old).is_none());
        assert!(!ctx.contains(old));
        assert_eq!(ctx[new].message(), Some(1));
        assert_eq!(ctx.len(), 2);

        ctx.clear(&mut m);
        assert!(ctx.is_empty());
        assert!(ctx.get(new).is_none());
    }

    #[test]
    fn test_thread_reference_chain() {
        let e = email("<c>", &["<b>"], &["<a>", "<b>"], "x", 0);
        assert_eq!(reference_chain(&e.env), vec!["<b>", "<a>"]);
        let e = email("<c>", &["<x>"], &["<a>", "<b>"], "x", 0);
        assert_eq!(reference_chain(&e.env), vec!["<x>", "<b>", "<a>"]);
        let e = email("<c>", &["<x>", "<y>"], &[], "x", 0);
        assert_eq!(reference_chain(&e.env), vec!["<x>", "<y>"]);
    }

    #[test]
    fn test_thread_arena_generations() {
        let mut ctx = ThreadContext::new();
        let a = ctx.alloc(ThreadNode::new(ThreadContents::Message(0)));
        ctx.release(a);
        let b = ctx.alloc(ThreadNode::new(ThreadContents::Message(1)));
        assert_ne!(a, b);
        assert!(ctx.get(a).is_none());
        assert_eq!(ctx[b].message(), Some(1));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_thread_build_and_remove() {
        let mut m = Mailbox::new("memory://test");
        m.insert_email(email("<a>", &[], &[], "plan", 10));
        m.insert_email(email("<b>", &["<a>"], &[], "Re: plan", 20));
        m.insert_email(email("<c>", &["<b>"], &[], "Re: plan", 30));
        let settings = ThreadingSettings::default();
        let mut ctx = ThreadContext::new();
        ctx.sort(&mut m, &settings, true);
        assert_eq!(ids(&ctx, &m), vec!["<a>", " <b>", "  <c>"]);
        assert!(m.email(0).unwrap().subject_changed);
        assert!(!m.email(1).unwrap().subject_changed);

        // <b> goes away but still holds <c> under <a>
        assert!(ctx.remove_message(1));
        m.take_email(1);
        let b = ctx.find("<b>")[0];
        assert!(ctx[b].is_phantom());
        assert_eq!(ids(&ctx, &m), vec!["<a>", "  <c>"]);

        // a leaf is dropped together with the phantom above it
        assert!(ctx.remove_message(2));
        m.take_email(2);
        assert!(ctx.find("<b>").is_empty());
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_thread_tree_chars() {
        let mut m = Mailbox::new("memory://test");
        m.insert_email(email("<a>", &[], &[], "plan", 10));
        m.insert_email(email("<b>", &["<a>"], &[], "Re: plan", 20));
        m.insert_email(email("<c>", &["<a>"], &[], "Re: plan", 30));
        for e in m.emails_mut() {
            e.vnum = Some(e.msgno);
        }
        let settings = ThreadingSettings::default();
        let mut ctx = ThreadContext::new();
        ctx.sort(&mut m, &settings, true);
        assert!(m.email(0).unwrap().tree.is_empty());
        assert_eq!(tree_to_string(&m.email(1).unwrap().tree, false), "├─>");
        assert_eq!(tree_to_string(&m.email(2).unwrap().tree, true), "`->");
        assert!(m.email(0).unwrap().display_subject);
        assert!(!m.email(1).unwrap().display_subject);
    }
}
