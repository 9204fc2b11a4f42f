/*
 * mailcore - pattern operations on a mailbox view
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

//! Limit, tag and delete by pattern, and the search command.

use super::{check_simple, CompileFlags, Pattern, PatternCache, PatternContext, PatternList, PatternOp, PatternPayload};
use crate::{
    error::{Error, ErrorKind, Result},
    mailbox::{Mailbox, SetFlag},
    mview::MailboxView,
    progress::{Progress, ProgressTracker},
};

/// Reported when a limit leaves nothing visible. The limit is applied
/// anyway.
pub const NO_MATCHES: &str = "No messages matched criteria";

/// What [`pattern_func`] does to the matching messages.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PatternAction {
    /// Show only the matching messages.
    Limit,
    Tag,
    Untag,
    Delete,
    Undelete,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum SearchDirection {
    #[default]
    Forward,
    Backward,
}

impl SearchDirection {
    pub const fn opposite(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

/// The text of the first literal leaf a server can look for.
fn server_query(pat: &Pattern) -> Option<&str> {
    if let (
        PatternOp::Body | PatternOp::Header | PatternOp::WholeMessage | PatternOp::ServerSearch,
        Some(PatternPayload::Literal { text, .. }),
    ) = (pat.op, pat.payload.as_ref())
    {
        return Some(text);
    }
    pat.children().iter().find_map(server_query)
}

/// Let the backend answer the literal body and header tests, if it can.
fn server_search(m: &mut Mailbox, pattern: &PatternList) -> Result<()> {
    let Some(backend) = m.backend.clone().filter(|b| b.can_search_on_server()) else {
        return Ok(());
    };
    if let Some(query) = server_query(pattern.root()) {
        log::debug!("server search for {:?} in {}", query, m.path);
        backend.search(m, query)?;
    }
    Ok(())
}

/// Messages among `candidates` matching `pattern`, in order.
fn matching(
    view: &MailboxView,
    pattern: &PatternList,
    candidates: &[usize],
    match_all: bool,
    progress: Option<&mut dyn Progress>,
) -> Result<Vec<usize>> {
    let settings = view.settings();
    let m = view.mailbox().borrow();
    let globals = view.globals().borrow();
    let ctx = PatternContext::new(&m)
        .with_threads(&view.threads)
        .with_globals(&globals)
        .with_settings(&settings)
        .with_flags(view.exec_flags);
    let mut tracker = ProgressTracker::new("Search", candidates.len(), progress);
    let mut hits = vec![];
    for (i, &msgno) in candidates.iter().enumerate() {
        tracker.set_work(i)?;
        if match_all || pattern.exec(&ctx, msgno, &mut PatternCache::new())? {
            hits.push(msgno);
        }
    }
    tracker.set_work(candidates.len())?;
    Ok(hits)
}

/// Compile `s`, expanding simple searches, and apply `action` to every
/// matching message.
///
/// A limit looks at every message and replaces the current one; `~A`
/// removes it. The other actions only touch visible messages. Returns the
/// number of visible messages after a limit, otherwise the number of
/// messages acted on. If `progress` cancels, nothing is changed and the
/// error reads "Search interrupted". A message that cannot be read fails
/// the call the same way unless the view's `exec_flags` has
/// [`ExecFlags::BEST_EFFORT`](super::ExecFlags::BEST_EFFORT).
pub fn pattern_func(
    view: &mut MailboxView,
    action: PatternAction,
    s: &str,
    progress: Option<&mut dyn Progress>,
) -> Result<usize> {
    view.process_events()?;
    let settings = view.settings();
    let expanded = check_simple(s, &settings.simple_search);
    let match_all = expanded.trim_start() == "~A";
    let pattern = view.compile(&expanded, CompileFlags::FULL_MSG)?;
    let mailbox = view.mailbox().clone();
    server_search(&mut mailbox.borrow_mut(), &pattern)?;

    let candidates: Vec<usize> = match action {
        PatternAction::Limit => mailbox.borrow().emails().map(|(msgno, _)| msgno).collect(),
        _ => view.v2r().to_vec(),
    };
    let hits = matching(view, &pattern, &candidates, match_all, progress)?;
    debug!("pattern_func {:?} {:?}: {} of {}", action, s, hits.len(), candidates.len());

    if action == PatternAction::Limit {
        {
            let mut m = mailbox.borrow_mut();
            for e in m.emails_mut() {
                e.vnum = None;
                e.visible = false;
                e.limit_visited = true;
                e.collapsed = false;
                e.num_hidden = 0;
            }
            for &msgno in &hits {
                if let Some(e) = m.email_mut(msgno) {
                    e.visible = true;
                    e.vnum = Some(msgno);
                }
            }
        }
        view.set_limit(if match_all { None } else { Some(pattern) })?;
        if !candidates.is_empty() && view.vcount() == 0 {
            log::warn!("{}", NO_MATCHES);
        }
        return Ok(view.vcount());
    }

    let mut m = mailbox.borrow_mut();
    for &msgno in &hits {
        match action {
            PatternAction::Undelete => {
                m.set_flag(msgno, SetFlag::Purge, false, settings.flag_safe, true);
                m.set_flag(msgno, SetFlag::Delete, false, settings.flag_safe, true);
            }
            PatternAction::Delete => {
                m.set_flag(msgno, SetFlag::Delete, true, settings.flag_safe, true);
            }
            PatternAction::Tag | PatternAction::Untag => {
                m.set_flag(
                    msgno,
                    SetFlag::Tag,
                    action == PatternAction::Tag,
                    settings.flag_safe,
                    true,
                );
            }
            PatternAction::Limit => {}
        }
    }
    Ok(hits.len())
}

/// A search string and its compiled form, kept between searches.
#[derive(Clone, Debug, Default)]
pub struct SearchState {
    source: String,
    expanded: String,
    pattern: Option<PatternList>,
}

impl SearchState {
    pub fn new(s: &str) -> Self {
        Self {
            source: s.to_string(),
            ..Self::default()
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Search for `s` from now on.
    pub fn set_source(&mut self, s: &str) {
        if self.source != s {
            self.source = s.to_string();
            self.pattern = None;
        }
    }

    pub fn pattern(&self) -> Option<&PatternList> {
        self.pattern.as_ref()
    }
}

/// Where [`search_next`] stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SearchHit {
    pub vnum: usize,
    /// "Search wrapped to top" or "Search wrapped to bottom".
    pub message: Option<&'static str>,
}

fn not_found(msg: &'static str) -> Error {
    Error::new(msg).set_kind(ErrorKind::None)
}

/// Find the next visible message after `cur` that matches the search, or
/// the previous one going [`SearchDirection::Backward`].
///
/// Results are cached in each email's `searched`/`matched` flags until the
/// expanded pattern changes. `$wrap_search` decides whether the search
/// goes round the ends of the index.
pub fn search_next(
    view: &mut MailboxView,
    state: &mut SearchState,
    cur: usize,
    direction: SearchDirection,
    progress: Option<&mut dyn Progress>,
) -> Result<SearchHit> {
    view.process_events()?;
    if state.source.trim().is_empty() {
        return Err(Error::new("No search pattern.").set_kind(ErrorKind::PatternCompile));
    }
    let settings = view.settings();
    let mailbox = view.mailbox().clone();

    let expanded = check_simple(&state.source, &settings.simple_search);
    if expanded != state.expanded {
        state.expanded = expanded;
        state.pattern = None;
    }
    if state.pattern.is_none() {
        let pattern = view.compile(&state.expanded, CompileFlags::FULL_MSG)?;
        let mut m = mailbox.borrow_mut();
        for e in m.emails_mut() {
            e.searched = false;
        }
        server_search(&mut m, &pattern)?;
        state.pattern = Some(pattern);
    }
    let Some(pattern) = state.pattern.as_ref() else {
        return Err(not_found("Not found"));
    };

    let vcount = view.vcount();
    let incr: isize = match direction {
        SearchDirection::Forward => 1,
        SearchDirection::Backward => -1,
    };
    let mut tracker = ProgressTracker::new("Search", vcount, progress);
    let mut message = None;
    let mut i = cur as isize + incr;
    for j in 0..vcount {
        tracker.set_work(j)?;
        if i >= vcount as isize {
            if !settings.wrap_search {
                return Err(not_found("Search hit bottom without finding match"));
            }
            i = 0;
            message = Some("Search wrapped to top");
        } else if i < 0 {
            if !settings.wrap_search {
                return Err(not_found("Search hit top without finding match"));
            }
            i = vcount as isize - 1;
            message = Some("Search wrapped to bottom");
        }
        let vnum = i as usize;
        let Some(msgno) = view.msgno_at(vnum) else {
            break;
        };
        let cached = match mailbox.borrow().email(msgno) {
            Some(e) if e.searched => Some(e.matched),
            Some(_) => None,
            None => break,
        };
        let matched = match cached {
            Some(matched) => matched,
            None => {
                let matched = {
                    let m = mailbox.borrow();
                    let globals = view.globals().borrow();
                    let ctx = PatternContext::new(&m)
                        .with_threads(&view.threads)
                        .with_globals(&globals)
                        .with_settings(&settings)
                        .with_flags(view.exec_flags);
                    pattern.exec(&ctx, msgno, &mut PatternCache::new())?
                };
                if let Some(e) = mailbox.borrow_mut().email_mut(msgno) {
                    e.searched = true;
                    e.matched = matched;
                }
                matched
            }
        };
        if matched {
            return Ok(SearchHit { vnum, message });
        }
        i += incr;
    }
    Err(not_found("Not found"))
}
