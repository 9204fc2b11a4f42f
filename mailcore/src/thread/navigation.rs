/*
 * mailcore - thread navigation
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

//! Moving around threads, collapsing them and relinking messages.

use super::{tree::is_visible, ThreadContext, ThreadId};
use crate::{
    conf::{ThreadingSettings, UseThreads},
    email::EnvelopeChanged,
    error::{Error, ErrorKind, Result},
    mailbox::{Mailbox, SetFlag},
};

bitflags! {
    /// Changes [`traverse_thread`] makes while it walks a thread.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct ThreadFlags: u8 {
        const COLLAPSE   = 1 << 0;
        const UNCOLLAPSE = 1 << 1;
    }
}

/// What [`traverse_thread`] found.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ThreadStats {
    /// Where the cursor belongs afterwards.
    pub position: Option<usize>,
    /// Holds visible unread messages that are new.
    pub has_new: bool,
    /// Holds visible unread messages that are old.
    pub has_old: bool,
    /// The unread message with the lowest `msgno`, or the starting one.
    pub next_unread: Option<usize>,
    pub flagged: bool,
    /// Visible messages without a place in the index.
    pub num_hidden: usize,
}

impl ThreadStats {
    pub fn has_unread(&self) -> bool {
        self.has_new || self.has_old
    }
}

/// What [`messages_in_thread`] counts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageInThread {
    /// Messages in the whole thread.
    Count,
    /// 1-based position of the message inside its thread.
    Position,
}

fn threading_disabled() -> Error {
    Error::new("Threading is not enabled").set_kind(ErrorKind::Threading)
}

fn check_threaded(settings: &ThreadingSettings) -> Result<UseThreads> {
    match settings.thread_style() {
        UseThreads::Flat => Err(threading_disabled()),
        style => Ok(style),
    }
}

/// The node's own message if it is in the index, else the first (or last)
/// descendant that is.
fn find_virtual(ctx: &ThreadContext, m: &Mailbox, id: ThreadId, last: bool) -> Option<usize> {
    let vnum_of = |t: ThreadId| ctx[t].message().and_then(|msgno| m.email(msgno)?.vnum);
    if let Some(vnum) = vnum_of(id) {
        return Some(vnum);
    }
    let mut below = ctx.subtree(id).skip(1).filter_map(|(_, t)| vnum_of(t));
    if last {
        below.last()
    } else {
        below.next()
    }
}

/// vnum of the next or previous thread, or subthread, in display order.
/// `None` at either end.
pub fn aside_thread(
    ctx: &ThreadContext,
    m: &Mailbox,
    settings: &ThreadingSettings,
    msgno: usize,
    forwards: bool,
    subthreads: bool,
) -> Result<Option<usize>> {
    let reverse = check_threaded(settings)? == UseThreads::Reverse;
    let Some(mut cur) = ctx.node_of(m, msgno) else {
        return Ok(None);
    };
    // Threads are listed backwards in reverse mode, their insides are not.
    let ahead = |ctx: &ThreadContext, id: ThreadId| {
        if ctx[id].parent.is_none() {
            forwards != reverse
        } else {
            forwards
        }
    };
    if subthreads {
        loop {
            let n = &ctx[cur];
            let at_edge = if ahead(ctx, cur) {
                n.next.is_none()
            } else {
                n.prev.is_none()
            };
            match n.parent {
                Some(p) if at_edge => cur = p,
                _ => break,
            }
        }
    } else {
        cur = ctx.top_of_thread(cur);
    }
    let ahead = ahead(ctx, cur);
    loop {
        let step = if ahead { ctx[cur].next } else { ctx[cur].prev };
        let Some(next) = step else {
            return Ok(None);
        };
        cur = next;
        if let Some(vnum) = find_virtual(ctx, m, cur, !ahead) {
            return Ok(Some(vnum));
        }
    }
}

/// vnum of the parent, or of the thread root, of a message.
pub fn parent_message(
    ctx: &ThreadContext,
    m: &Mailbox,
    settings: &ThreadingSettings,
    msgno: usize,
    find_root: bool,
) -> Result<usize> {
    if !settings.using_threads() {
        return Err(threading_disabled());
    }
    let mut found = if find_root { Some(msgno) } else { None };
    let mut cur = ctx.node_of(m, msgno).and_then(|t| ctx[t].parent);
    while let Some(t) = cur {
        if let Some(p) = ctx[t].message() {
            found = Some(p);
            if !find_root {
                break;
            }
        }
        cur = ctx[t].parent;
    }
    let Some(parent) = found.and_then(|p| m.email(p)) else {
        return Err(Error::new("Parent message is not available").set_kind(ErrorKind::Threading));
    };
    let hidden = || {
        Error::new(if find_root {
            "Root message is not visible in this limited view"
        } else {
            "Parent message is not visible in this limited view"
        })
        .set_kind(ErrorKind::Threading)
    };
    if !is_visible(parent) {
        return Err(hidden());
    }
    parent.vnum.ok_or_else(hidden)
}

/// Walk the whole thread of `msgno`, collapsing or expanding it as
/// `flags` say, and report what it contains.
///
/// Collapsing keeps the first visible message of the thread in the index
/// and takes every other message out of it. With reversed threads the
/// cursor goes to the visible message with the lowest `msgno` instead.
pub fn traverse_thread(
    ctx: &ThreadContext,
    m: &mut Mailbox,
    settings: &ThreadingSettings,
    msgno: usize,
    flags: ThreadFlags,
) -> Result<ThreadStats> {
    let reverse = check_threaded(settings)? == UseThreads::Reverse;
    let cursor = m.email(msgno).and_then(|e| e.vnum);
    let mut stats = ThreadStats {
        position: cursor,
        next_unread: cursor,
        ..ThreadStats::default()
    };
    let Some(node) = ctx.node_of(m, msgno) else {
        return Ok(stats);
    };
    let messages = ctx.thread_messages(node);
    let toggle = flags.intersects(ThreadFlags::COLLAPSE | ThreadFlags::UNCOLLAPSE);
    let collapse = flags.contains(ThreadFlags::COLLAPSE);
    let mut keeper: Option<usize> = None;
    let mut min_unread_msgno = usize::MAX;
    let mut min_msgno = messages.first().copied().unwrap_or(usize::MAX);

    for (i, &n) in messages.iter().enumerate() {
        let Some(e) = m.email_mut(n) else {
            continue;
        };
        if toggle {
            e.collapsed = collapse;
            let candidate = if i == 0 { e.vnum.is_some() } else { e.visible };
            if keeper.is_none() && candidate {
                keeper = Some(n);
                if collapse {
                    stats.position = e.vnum;
                }
            }
            if reverse && collapse && e.visible && e.msgno < min_msgno {
                min_msgno = e.msgno;
                stats.position = e.vnum;
            }
            if i > 0 && keeper != Some(n) {
                if collapse {
                    e.vnum = None;
                } else if e.visible {
                    e.vnum = Some(e.msgno);
                }
            }
        }
        if !e.is_read() && e.visible {
            if e.is_old() {
                stats.has_old = true;
            } else {
                stats.has_new = true;
            }
            if e.msgno < min_unread_msgno {
                stats.next_unread = e.vnum;
                min_unread_msgno = e.msgno;
            }
        }
        if e.is_flagged() && e.visible {
            stats.flagged = true;
        }
        if e.vnum.is_none() && e.visible {
            stats.num_hidden += 1;
        }
    }

    if toggle {
        // Every message remembers the size so `~v` still works once the
        // index is no longer threaded.
        let hidden = if collapse {
            stats.num_hidden + 1
        } else {
            stats.num_hidden
        };
        for &n in &messages {
            if let Some(e) = m.email_mut(n) {
                e.num_hidden = hidden;
            }
        }
    }
    Ok(stats)
}

pub fn collapse_thread(
    ctx: &ThreadContext,
    m: &mut Mailbox,
    settings: &ThreadingSettings,
    msgno: usize,
) -> Result<ThreadStats> {
    traverse_thread(ctx, m, settings, msgno, ThreadFlags::COLLAPSE)
}

pub fn uncollapse_thread(
    ctx: &ThreadContext,
    m: &mut Mailbox,
    settings: &ThreadingSettings,
    msgno: usize,
) -> Result<ThreadStats> {
    traverse_thread(ctx, m, settings, msgno, ThreadFlags::UNCOLLAPSE)
}

/// Collapsing is allowed unless `$collapse_unread` or `$collapse_flagged`
/// forbid it for what the thread holds.
pub fn thread_can_collapse(
    ctx: &ThreadContext,
    m: &mut Mailbox,
    settings: &ThreadingSettings,
    msgno: usize,
) -> bool {
    let Ok(stats) = traverse_thread(ctx, m, settings, msgno, ThreadFlags::empty()) else {
        return false;
    };
    (settings.collapse_unread || !stats.has_unread())
        && (settings.collapse_flagged || !stats.flagged)
}

fn thread_heads(ctx: &ThreadContext) -> Vec<usize> {
    ctx.roots()
        .filter_map(|root| {
            ctx.subtree(root)
                .find_map(|(_, t)| ctx[t].message())
        })
        .collect()
}

/// Collapse again every thread whose head is marked collapsed, after the
/// index was rebuilt.
pub fn thread_collapse_collapsed(
    ctx: &ThreadContext,
    m: &mut Mailbox,
    settings: &ThreadingSettings,
) -> Result<()> {
    for head in thread_heads(ctx) {
        if m.email(head).map_or(false, |e| e.collapsed) {
            collapse_thread(ctx, m, settings, head)?;
        }
    }
    Ok(())
}

/// Collapse or expand every thread. Threads that may not collapse are
/// left open.
pub fn thread_collapse(
    ctx: &ThreadContext,
    m: &mut Mailbox,
    settings: &ThreadingSettings,
    collapse: bool,
) -> Result<()> {
    check_threaded(settings)?;
    for head in thread_heads(ctx) {
        let Some(collapsed) = m.email(head).map(|e| e.collapsed) else {
            continue;
        };
        if collapsed == collapse {
            continue;
        }
        if collapsed {
            uncollapse_thread(ctx, m, settings, head)?;
        } else if thread_can_collapse(ctx, m, settings, head) {
            collapse_thread(ctx, m, settings, head)?;
        }
    }
    Ok(())
}

/// Size of the thread of `msgno`, or the position of `msgno` in it.
/// Unthreaded messages count as a thread of one.
pub fn messages_in_thread(
    ctx: &ThreadContext,
    m: &Mailbox,
    settings: &ThreadingSettings,
    msgno: usize,
    what: MessageInThread,
) -> usize {
    if !settings.using_threads() {
        return 1;
    }
    let Some(node) = ctx.node_of(m, msgno) else {
        return 1;
    };
    let messages = ctx.thread_messages(node);
    match what {
        MessageInThread::Count => messages.len(),
        MessageInThread::Position => messages
            .iter()
            .position(|n| *n == msgno)
            .map_or(1, |p| p + 1),
    }
}

/// Forget the threading headers of a message so it starts a thread of its
/// own on the next rebuild.
pub fn break_thread(m: &mut Mailbox, msgno: usize) -> bool {
    let Some(e) = m.email_mut(msgno) else {
        return false;
    };
    e.env.in_reply_to.clear();
    e.env.references.clear();
    e.env.changed |= EnvelopeChanged::IRT | EnvelopeChanged::REFS;
    e.changed = true;
    true
}

/// Make each of `children` a reply to `parent` by rewriting its
/// `In-Reply-To`. The forest has to be rebuilt afterwards.
pub fn link_threads(m: &mut Mailbox, parent: usize, children: &[usize]) -> bool {
    let Some(parent_id) = m.email(parent).and_then(|e| e.env.message_id.clone()) else {
        return false;
    };
    let mut changed = false;
    for &child in children {
        if child == parent || !break_thread(m, child) {
            continue;
        }
        if let Some(e) = m.email_mut(child) {
            e.env.in_reply_to.insert(0, parent_id.clone());
        }
        m.set_flag(child, SetFlag::Tag, false, false, true);
        changed = true;
    }
    changed
}
