/*
 * mailcore - thread iterators
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

use smallvec::SmallVec;

use super::{ThreadContext, ThreadId};

impl ThreadContext {
    /// `first` and the siblings after it.
    pub fn siblings(&self, first: Option<ThreadId>) -> SiblingIter<'_> {
        SiblingIter {
            ctx: self,
            next: first,
        }
    }

    pub fn roots(&self) -> SiblingIter<'_> {
        self.siblings(self.tree)
    }

    pub fn children(&self, id: ThreadId) -> SiblingIter<'_> {
        self.siblings(self[id].child)
    }

    /// Every node below `root`, `root` included, depth first.
    pub fn subtree(&self, root: ThreadId) -> SubtreeIter<'_> {
        SubtreeIter {
            ctx: self,
            root,
            next: Some((0, root)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SiblingIter<'a> {
    ctx: &'a ThreadContext,
    next: Option<ThreadId>,
}

impl<'a> Iterator for SiblingIter<'a> {
    type Item = ThreadId;

    fn next(&mut self) -> Option<ThreadId> {
        let ret = self.next?;
        self.next = self.ctx[ret].next;
        Some(ret)
    }
}

/* `SubtreeIter` walks one thread depth first, yielding each node with its
 * depth below the starting node. For
 *
 *  ```
 *  A_
 *   |_B
 *   | |_C
 *   |_D
 *  ```
 *
 *  starting at A it returns `(0, A), (1, B), (2, C), (1, D)`.
 */
#[derive(Clone, Debug)]
pub struct SubtreeIter<'a> {
    ctx: &'a ThreadContext,
    root: ThreadId,
    next: Option<(usize, ThreadId)>,
}

impl<'a> Iterator for SubtreeIter<'a> {
    type Item = (usize, ThreadId);

    fn next(&mut self) -> Option<(usize, ThreadId)> {
        let (depth, cur) = self.next?;
        self.next = if let Some(child) = self.ctx[cur].child {
            Some((depth + 1, child))
        } else {
            let (mut d, mut n) = (depth, cur);
            loop {
                if n == self.root {
                    break None;
                }
                if let Some(next) = self.ctx[n].next {
                    break Some((d, next));
                }
                match self.ctx[n].parent {
                    Some(p) => {
                        n = p;
                        d = d.saturating_sub(1);
                    }
                    None => break None,
                }
            }
        };
        Some((depth, cur))
    }
}

/* `LinearIter` is the display order of the whole forest: every thread in
 * turn, messages only, each with its depth so the tree can be redrawn.
 * Phantoms are skipped but still count towards the depth of what lies
 * below them. */
#[derive(Clone, Debug)]
pub struct LinearIter<'a> {
    ctx: &'a ThreadContext,
    roots: SmallVec<[ThreadId; 64]>,
    pos: usize,
    current: Option<SubtreeIter<'a>>,
}

impl<'a> LinearIter<'a> {
    pub(super) fn new(ctx: &'a ThreadContext, reverse: bool) -> Self {
        let mut roots: SmallVec<[ThreadId; 64]> = ctx.roots().collect();
        if reverse {
            roots.reverse();
        }
        Self {
            ctx,
            roots,
            pos: 0,
            current: None,
        }
    }

    /// Start over from the first thread.
    pub fn restart(&mut self) {
        self.pos = 0;
        self.current = None;
    }
}

impl<'a> Iterator for LinearIter<'a> {
    /// `(depth, node, msgno)`
    type Item = (usize, ThreadId, usize);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(iter) = self.current.as_mut() {
                for (depth, id) in iter.by_ref() {
                    if let Some(msgno) = self.ctx[id].message() {
                        return Some((depth, id, msgno));
                    }
                }
                self.current = None;
            }
            let root = *self.roots.get(self.pos)?;
            self.pos += 1;
            self.current = Some(self.ctx.subtree(root));
        }
    }
}
