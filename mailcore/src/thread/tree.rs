/*
 * mailcore - thread tree drawing
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

//! Visibility of thread nodes and the tree prefixes drawn in the index.

use super::{ThreadContext, ThreadId, TreeChar};
use crate::{conf::ThreadingSettings, email::Email, mailbox::Mailbox};

/// Shown in the index, or standing in for a collapsed thread.
pub fn is_visible(e: &Email) -> bool {
    e.vnum.is_some() || (e.collapsed && e.visible)
}

fn node_email<'m>(ctx: &ThreadContext, m: &'m Mailbox, id: ThreadId) -> Option<&'m Email> {
    ctx[id].message().and_then(|msgno| m.email(msgno))
}

/// Whether the subject of the message at `node` is worth repeating.
fn need_display_subject(
    ctx: &ThreadContext,
    m: &Mailbox,
    settings: &ThreadingSettings,
    node: ThreadId,
) -> bool {
    if !settings.hide_thread_subject {
        return true;
    }
    if node_email(ctx, m, node).map_or(true, |e| e.subject_changed) {
        return true;
    }
    // closest displayed earlier sibling
    let mut tmp = ctx[node].prev;
    while let Some(t) = tmp {
        if let Some(e) = node_email(ctx, m, t).filter(|e| is_visible(e)) {
            if e.subject_changed {
                return true;
            }
            break;
        }
        tmp = ctx[t].prev;
    }
    // subject changes between here and the closest displayed ancestor
    let mut tmp = ctx[node].parent;
    while let Some(t) = tmp {
        if let Some(e) = node_email(ctx, m, t) {
            if is_visible(e) {
                return false;
            }
            if e.subject_changed {
                return true;
            }
        }
        tmp = ctx[t].parent;
    }
    true
}

fn last_sibling(ctx: &ThreadContext, mut id: ThreadId) -> ThreadId {
    while let Some(n) = ctx[id].next {
        id = n;
    }
    id
}

/// Work out `visible`, `deep` and `subtree_visible` for every node and
/// clear the old tree prefixes. Returns the depth of the deepest node.
fn calculate_visibility(
    ctx: &mut ThreadContext,
    m: &mut Mailbox,
    settings: &ThreadingSettings,
) -> usize {
    let Some(orig) = ctx.tree else {
        return 0;
    };
    let hide_top_missing = settings.hide_top_missing && !settings.hide_missing;
    let hide_top_limited = settings.hide_top_limited && !settings.hide_limited;
    let mut depth: isize = 0;
    let mut max_depth: isize = 0;

    // Each level is walked backwards so next_subtree_visible can be filled
    // in from the sibling after.
    let mut tree = last_sibling(ctx, orig);
    loop {
        max_depth = max_depth.max(depth);
        ctx[tree].subtree_visible = 0;
        match ctx[tree].message() {
            Some(msgno) => {
                let visible = match m.email_mut(msgno) {
                    Some(e) => {
                        e.tree.clear();
                        is_visible(e)
                    }
                    None => false,
                };
                if visible {
                    ctx[tree].deep = true;
                    ctx[tree].visible = true;
                    let display = need_display_subject(ctx, m, settings, tree);
                    if let Some(e) = m.email_mut(msgno) {
                        e.display_subject = display;
                    }
                    let mut tmp = Some(tree);
                    while let Some(t) = tmp {
                        if ctx[t].subtree_visible != 0 {
                            ctx[t].deep = true;
                            ctx[t].subtree_visible = 2;
                            break;
                        }
                        ctx[t].subtree_visible = 1;
                        tmp = ctx[t].parent;
                    }
                } else {
                    ctx[tree].visible = false;
                    ctx[tree].deep = !settings.hide_limited;
                }
            }
            None => {
                ctx[tree].visible = false;
                ctx[tree].deep = !settings.hide_missing;
            }
        }
        let next_visible = ctx[tree]
            .next
            .map_or(false, |n| ctx[n].next_subtree_visible || ctx[n].subtree_visible != 0);
        ctx[tree].next_subtree_visible = next_visible;

        if let Some(child) = ctx[tree].child {
            depth += 1;
            tree = last_sibling(ctx, child);
        } else if let Some(prev) = ctx[tree].prev {
            tree = prev;
        } else {
            let mut cur = Some(tree);
            while let Some(c) = cur.filter(|c| ctx[*c].prev.is_none()) {
                depth -= 1;
                cur = ctx[c].parent;
            }
            match cur.and_then(|c| ctx[c].prev) {
                Some(prev) => tree = prev,
                None => break,
            }
        }
    }

    if hide_top_limited || hide_top_missing {
        let mut tree = orig;
        loop {
            let n = &ctx[tree];
            if !n.visible
                && n.deep
                && n.subtree_visible < 2
                && ((!n.is_phantom() && hide_top_limited) || (n.is_phantom() && hide_top_missing))
            {
                ctx[tree].deep = false;
            }
            let n = &ctx[tree];
            if let Some(child) = n.child.filter(|_| !n.deep && n.subtree_visible != 0) {
                tree = child;
            } else if let Some(next) = n.next {
                tree = next;
            } else {
                let mut cur = Some(tree);
                while let Some(c) = cur.filter(|c| ctx[*c].next.is_none()) {
                    cur = ctx[c].parent;
                }
                match cur.and_then(|c| ctx[c].next) {
                    Some(next) => tree = next,
                    None => break,
                }
            }
        }
    }
    max_depth.max(0) as usize
}

fn put(buf: &mut Vec<TreeChar>, at: usize, c: TreeChar) {
    if buf.len() <= at {
        buf.resize(at + 1, TreeChar::Space);
    }
    buf[at] = c;
}

/// Fill in `Email::tree` for every visible threaded message.
pub(super) fn draw_tree(ctx: &mut ThreadContext, m: &mut Mailbox, settings: &ThreadingSettings) {
    let corner = TreeChar::LLCorner;
    let vtee = TreeChar::TTee;
    let width: isize = if settings.narrow_tree { 1 } else { 2 };
    let max_depth = calculate_visibility(ctx, m, settings) as isize;
    let mut pfx = vec![TreeChar::Space; (width * max_depth + 2) as usize];
    let mut arrow = pfx.clone();
    let (mut depth, mut start_depth): (isize, isize) = (0, 0);
    let mut nextdisp: Option<ThreadId> = None;
    let mut pseudo: Option<ThreadId> = None;
    let mut parent: Option<ThreadId> = None;

    let mut tree = ctx.tree;
    while let Some(t) = tree {
        if depth != 0 {
            let at = ((depth - start_depth - isize::from(start_depth == 0)) * width).max(0) as usize;
            let glyph = if start_depth == depth {
                if nextdisp.is_some() {
                    TreeChar::LTee
                } else {
                    corner
                }
            } else {
                match parent.map(|p| ctx[p].is_phantom()) {
                    Some(false) if !settings.hide_limited => TreeChar::Hidden,
                    Some(true) if !settings.hide_missing => TreeChar::Missing,
                    _ => vtee,
                }
            };
            put(&mut arrow, at, glyph);
            if width == 2 {
                let line = if pseudo.is_some() {
                    TreeChar::Star
                } else if ctx[t].duplicate_thread {
                    TreeChar::Equals
                } else {
                    TreeChar::HLine
                };
                put(&mut arrow, at + 1, line);
            }
            if ctx[t].visible {
                let end = at + width as usize;
                put(&mut arrow, end, TreeChar::RArrow);
                let mut new_tree = vec![];
                if start_depth > 1 {
                    let keep = (width * (start_depth - 1)) as usize;
                    new_tree.extend_from_slice(&pfx[..keep.min(pfx.len())]);
                }
                new_tree.extend_from_slice(&arrow[..=end]);
                if let Some(e) = ctx[t].message().and_then(|msgno| m.email_mut(msgno)) {
                    e.tree = new_tree;
                }
            }
        }
        if ctx[t].child.is_some() && depth != 0 {
            let at = ((depth - 1) * width) as usize;
            put(
                &mut pfx,
                at,
                if nextdisp.is_some() {
                    TreeChar::VLine
                } else {
                    TreeChar::Space
                },
            );
            if width == 2 {
                put(&mut pfx, at + 1, TreeChar::Space);
            }
        }
        parent = Some(t);
        nextdisp = None;
        pseudo = None;

        let mut cur = t;
        tree = loop {
            if let Some(child) = ctx[cur].child.filter(|_| ctx[cur].subtree_visible != 0) {
                if ctx[cur].deep {
                    depth += 1;
                }
                if ctx[cur].visible {
                    start_depth = depth;
                }
                cur = child;
                // start with the first child that shows anything
                while ctx[cur].subtree_visible == 0 {
                    match ctx[cur].next {
                        Some(n) => cur = n,
                        None => break,
                    }
                }
            } else {
                while ctx[cur].next.is_none() {
                    let Some(p) = ctx[cur].parent else {
                        break;
                    };
                    if pseudo == Some(cur) {
                        pseudo = None;
                    }
                    if nextdisp == Some(cur) {
                        nextdisp = None;
                    }
                    if ctx[cur].visible {
                        start_depth = depth;
                    }
                    cur = p;
                    if ctx[cur].deep {
                        if start_depth == depth {
                            start_depth -= 1;
                        }
                        depth -= 1;
                    }
                }
                if pseudo == Some(cur) {
                    pseudo = None;
                }
                if nextdisp == Some(cur) {
                    nextdisp = None;
                }
                if ctx[cur].visible {
                    start_depth = depth;
                }
                match ctx[cur].next {
                    Some(n) => cur = n,
                    None => break None,
                }
            }
            if pseudo.is_none() && ctx[cur].fake_thread {
                pseudo = Some(cur);
            }
            if nextdisp.is_none() && ctx[cur].next_subtree_visible {
                nextdisp = Some(cur);
            }
            if ctx[cur].deep {
                break Some(cur);
            }
        };
    }
}
