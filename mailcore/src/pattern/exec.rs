/*
 * mailcore - pattern evaluator
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

use super::{date::eval_date_range, Pattern, PatternOp, PatternPayload};
use crate::{
    backends::mailbox_open_message,
    conf::ThreadingSettings,
    crypt::SecurityFlags,
    email::{
        parser::{
            encodings,
            headers::{parse_headers, split_headers},
        },
        Address, AddressList, Body, Email,
    },
    error::{ErrorKind, Result},
    mailbox::Mailbox,
    neomutt::Globals,
    thread::ThreadContext,
    utils::datetime::{self, UnixTimestamp},
};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ExecFlags: u8 {
        /// Address patterns also match the display name.
        const MATCH_FULL_ADDRESS = 1 << 0;
        /// A message whose text cannot be read does not match, instead of
        /// failing the whole evaluation.
        const BEST_EFFORT        = 1 << 1;
    }
}

/// Results of the expensive address predicates for one message. Use a
/// fresh cache for every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct PatternCache {
    list_all: Option<bool>,
    list_one: Option<bool>,
    sub_all: Option<bool>,
    sub_one: Option<bool>,
    pers_recip_all: Option<bool>,
    pers_recip_one: Option<bool>,
    pers_from_all: Option<bool>,
    pers_from_one: Option<bool>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Everything a pattern may look at while it is evaluated.
#[derive(Clone, Copy)]
pub struct PatternContext<'a> {
    pub mailbox: &'a Mailbox,
    /// Needed by the thread operators and the thread flags.
    pub threads: Option<&'a ThreadContext>,
    /// `$thorough_search` and `$from`.
    pub settings: Option<&'a ThreadingSettings>,
    /// Lists, groups, aliases and alternates.
    pub globals: Option<&'a Globals>,
    pub flags: ExecFlags,
    /// Reference time for dynamic dates, defaults to the clock.
    pub now: Option<UnixTimestamp>,
}

impl<'a> PatternContext<'a> {
    pub fn new(mailbox: &'a Mailbox) -> Self {
        Self {
            mailbox,
            threads: None,
            settings: None,
            globals: None,
            flags: ExecFlags::empty(),
            now: None,
        }
    }

    pub fn with_threads(self, threads: &'a ThreadContext) -> Self {
        Self {
            threads: Some(threads),
            ..self
        }
    }

    pub fn with_settings(self, settings: &'a ThreadingSettings) -> Self {
        Self {
            settings: Some(settings),
            ..self
        }
    }

    pub fn with_globals(self, globals: &'a Globals) -> Self {
        Self {
            globals: Some(globals),
            ..self
        }
    }

    pub fn with_flags(self, flags: ExecFlags) -> Self {
        Self { flags, ..self }
    }

    pub fn with_now(self, now: UnixTimestamp) -> Self {
        Self {
            now: Some(now),
            ..self
        }
    }

    fn thorough_search(&self) -> bool {
        self.settings.map_or(true, |s| s.thorough_search)
    }

    fn match_full_address(&self) -> bool {
        self.flags.contains(ExecFlags::MATCH_FULL_ADDRESS)
    }
}

/// Evaluate `pat` against the message at `msgno`.
///
/// Fails only if reading the message from its backend fails; a missing
/// message does not match.
pub fn pattern_exec(
    pat: &Pattern,
    ctx: &PatternContext<'_>,
    msgno: usize,
    cache: &mut PatternCache,
) -> Result<bool> {
    let Some(e) = ctx.mailbox.email(msgno) else {
        return Ok(false);
    };
    Ok(pat.pat_not ^ eval(pat, ctx, e, cache)?)
}

/// Does `s` satisfy the leaf's regex, literal or group?
fn patmatch(pat: &Pattern, ctx: &PatternContext<'_>, s: &str) -> bool {
    match pat.payload {
        Some(PatternPayload::Regex(ref rx)) => rx.is_match(s),
        Some(PatternPayload::Literal {
            ref text,
            ign_case: true,
        }) => s.to_lowercase().contains(text.to_lowercase().as_str()),
        Some(PatternPayload::Literal { ref text, .. }) => s.contains(text.as_str()),
        Some(PatternPayload::AddressGroup(ref name)) => {
            ctx.globals.map_or(false, |g| g.group_match(name, s))
        }
        Some(PatternPayload::MessageIdList(ref ids)) => ids.iter().any(|id| id == s),
        _ => false,
    }
}

fn in_range(pat: &Pattern, value: i64) -> bool {
    match pat.payload {
        Some(PatternPayload::NumericRange { min, max }) => {
            value >= min && max.map_or(true, |max| value <= max)
        }
        _ => false,
    }
}

fn in_date_range(pat: &Pattern, ctx: &PatternContext<'_>, value: UnixTimestamp) -> bool {
    let (min, max) = match pat.payload {
        Some(PatternPayload::DateRange {
            dynamic: Some(ref src),
            min,
            max,
        }) => eval_date_range(src, ctx.now.unwrap_or_else(datetime::now)).unwrap_or((min, max)),
        Some(PatternPayload::DateRange { min, max, .. }) => (min, max),
        _ => return false,
    };
    let value = i64::try_from(value).unwrap_or(i64::MAX);
    value >= min && value <= max
}

fn match_addrlist(pat: &Pattern, ctx: &PatternContext<'_>, lists: &[&AddressList]) -> bool {
    let match_personal = ctx.match_full_address();
    for a in lists.iter().flat_map(|l| l.iter()) {
        let alias_ok = !pat.is_alias || ctx.globals.map_or(false, |g| g.alias_reverse_lookup(a));
        let hit = alias_ok
            && (a.mailbox.as_deref().map_or(false, |m| patmatch(pat, ctx, m))
                || (match_personal && a.personal.as_deref().map_or(false, |p| patmatch(pat, ctx, p))));
        if pat.all_addr ^ hit {
            return !pat.all_addr;
        }
    }
    pat.all_addr
}

/// With `all_addr`, every address must satisfy `predicate`; otherwise one
/// is enough.
fn match_predicate<F: Fn(&Address) -> bool>(
    all_addr: bool,
    lists: &[&AddressList],
    predicate: F,
) -> bool {
    for a in lists.iter().flat_map(|l| l.iter()) {
        if all_addr ^ predicate(a) {
            return !all_addr;
        }
    }
    all_addr
}

fn cached<F: FnOnce() -> bool>(slot: &mut Option<bool>, f: F) -> bool {
    *slot.get_or_insert_with(f)
}

fn match_reference(pat: &Pattern, ctx: &PatternContext<'_>, ids: &[String]) -> bool {
    ids.iter().any(|id| patmatch(pat, ctx, id))
}

fn sub_pattern(pat: &Pattern) -> Option<&Pattern> {
    pat.children().first()
}

/// Evaluate `sub` against another message, with its own cache.
fn exec_other(sub: &Pattern, ctx: &PatternContext<'_>, msgno: usize) -> Result<bool> {
    pattern_exec(sub, ctx, msgno, &mut PatternCache::new())
}

/// Lines of the message to search for `~b`, `~h` and `~B`.
fn message_lines(pat: &Pattern, ctx: &PatternContext<'_>, e: &Email) -> Result<Option<Vec<String>>> {
    if ctx.mailbox.backend.is_none() {
        return Ok(None);
    }
    let stream = mailbox_open_message(ctx.mailbox, e.msgno).map_err(|err| {
        log::debug!("pattern: could not read message {}: {}", e.msgno, err.details);
        err.set_kind(ErrorKind::Io)
    })?;
    let data = stream.as_bytes();
    let (header_block, body_offset) = split_headers(data);
    let thorough = ctx.thorough_search();
    let mut lines = vec![];

    if matches!(pat.op, PatternOp::Header | PatternOp::WholeMessage) {
        if thorough {
            lines.extend(
                parse_headers(header_block)
                    .into_iter()
                    .map(|(name, value)| format!("{}: {}", name, value)),
            );
        } else {
            lines.extend(String::from_utf8_lossy(header_block).lines().map(str::to_string));
        }
    }
    if matches!(pat.op, PatternOp::Body | PatternOp::WholeMessage) {
        let body = &data[body_offset.min(data.len())..];
        if thorough {
            let parsed = Body::parse(data, 0, data.len());
            for part in parsed.walk() {
                if !part.parts.is_empty() || part.email.is_some() {
                    continue;
                }
                let end = (part.offset + part.length).min(data.len());
                let start = part.offset.min(end);
                let decoded = encodings::decode(&data[start..end], &part.encoding);
                lines.extend(String::from_utf8_lossy(&decoded).lines().map(str::to_string));
            }
        } else {
            lines.extend(String::from_utf8_lossy(body).lines().map(str::to_string));
        }
    }
    if let Some(backend) = ctx.mailbox.backend.as_ref() {
        backend.close_message(ctx.mailbox, stream)?;
    }
    Ok(Some(lines))
}

fn server_answers(pat: &Pattern, ctx: &PatternContext<'_>) -> bool {
    pat.is_string_match()
        && ctx
            .mailbox
            .backend
            .as_ref()
            .map_or(false, |b| b.can_search_on_server())
}

/// The result of `pat` before its own negation.
fn eval(pat: &Pattern, ctx: &PatternContext<'_>, e: &Email, cache: &mut PatternCache) -> Result<bool> {
    let env = &e.env;
    Ok(match pat.op {
        PatternOp::And => {
            for c in pat.children() {
                if !pattern_exec(c, ctx, e.msgno, cache)? {
                    return Ok(false);
                }
            }
            true
        }
        PatternOp::Or => {
            for c in pat.children() {
                if pattern_exec(c, ctx, e.msgno, cache)? {
                    return Ok(true);
                }
            }
            false
        }
        PatternOp::Thread => {
            let (Some(threads), Some(sub)) = (ctx.threads, sub_pattern(pat)) else {
                return Ok(false);
            };
            let Some(id) = threads.node_of(ctx.mailbox, e.msgno) else {
                return Ok(false);
            };
            for msgno in threads.thread_messages(id) {
                if exec_other(sub, ctx, msgno)? {
                    return Ok(true);
                }
            }
            false
        }
        PatternOp::Parent => {
            let (Some(threads), Some(sub)) = (ctx.threads, sub_pattern(pat)) else {
                return Ok(false);
            };
            match threads
                .node_of(ctx.mailbox, e.msgno)
                .and_then(|id| threads[id].parent)
                .and_then(|p| threads[p].message())
            {
                Some(parent) => exec_other(sub, ctx, parent)?,
                None => false,
            }
        }
        PatternOp::Children => {
            let (Some(threads), Some(sub)) = (ctx.threads, sub_pattern(pat)) else {
                return Ok(false);
            };
            let Some(id) = threads.node_of(ctx.mailbox, e.msgno) else {
                return Ok(false);
            };
            for child in threads.children(id) {
                if let Some(msgno) = threads[child].message() {
                    if exec_other(sub, ctx, msgno)? {
                        return Ok(true);
                    }
                }
            }
            false
        }
        PatternOp::All => true,
        PatternOp::Expired => e.expired,
        PatternOp::Superseded => e.superseded,
        PatternOp::Flag => e.is_flagged(),
        PatternOp::Tag => e.is_tagged(),
        PatternOp::New => !(e.is_old() || e.is_read()),
        PatternOp::Unread => !e.is_read(),
        PatternOp::Replied => e.is_replied(),
        PatternOp::Old => e.is_old() && !e.is_read(),
        PatternOp::Read => e.is_read(),
        PatternOp::Deleted => e.is_deleted(),
        PatternOp::MessageRange => in_range(pat, e.msgno as i64 + 1),
        PatternOp::Date => in_date_range(pat, ctx, env.date),
        PatternOp::DateReceived => in_date_range(pat, ctx, e.received),
        PatternOp::Body | PatternOp::Header | PatternOp::WholeMessage => {
            if server_answers(pat, ctx) {
                e.matched
            } else {
                match message_lines(pat, ctx, e)? {
                    Some(lines) => lines.iter().any(|l| patmatch(pat, ctx, l)),
                    None => false,
                }
            }
        }
        PatternOp::ServerSearch => server_answers(pat, ctx) && e.matched,
        PatternOp::Sender => match_addrlist(pat, ctx, &[&env.sender]),
        PatternOp::From => match_addrlist(pat, ctx, &[&env.from]),
        PatternOp::To => match_addrlist(pat, ctx, &[&env.to]),
        PatternOp::Cc => match_addrlist(pat, ctx, &[&env.cc]),
        PatternOp::Bcc => match_addrlist(pat, ctx, &[&env.bcc]),
        PatternOp::Address => match_addrlist(
            pat,
            ctx,
            &[&env.from, &env.sender, &env.to, &env.cc, &env.bcc],
        ),
        PatternOp::Recipient => match_addrlist(pat, ctx, &[&env.to, &env.cc, &env.bcc]),
        PatternOp::Subject => env.subject().map_or(false, |s| patmatch(pat, ctx, s)),
        PatternOp::MessageId | PatternOp::MessageIdExternal => env
            .message_id
            .as_deref()
            .map_or(false, |id| patmatch(pat, ctx, id)),
        PatternOp::Score => in_range(pat, e.score),
        PatternOp::Size => in_range(pat, i64::try_from(e.body.length).unwrap_or(i64::MAX)),
        PatternOp::Reference => {
            match_reference(pat, ctx, &env.references) || match_reference(pat, ctx, &env.in_reply_to)
        }
        PatternOp::List => {
            let slot = if pat.all_addr {
                &mut cache.list_all
            } else {
                &mut cache.list_one
            };
            cached(slot, || {
                match_predicate(pat.all_addr, &[&env.to, &env.cc], |a| {
                    ctx.globals.map_or(false, |g| g.is_mail_list(a))
                })
            })
        }
        PatternOp::SubscribedList => {
            let slot = if pat.all_addr {
                &mut cache.sub_all
            } else {
                &mut cache.sub_one
            };
            cached(slot, || {
                match_predicate(pat.all_addr, &[&env.to, &env.cc], |a| {
                    ctx.globals.map_or(false, |g| g.is_subscribed_list(a))
                })
            })
        }
        PatternOp::PersonalRecipient | PatternOp::PersonalFrom => {
            let from = ctx.settings.and_then(|s| s.from.as_deref());
            let is_user = |a: &Address| ctx.globals.map_or(false, |g| g.addr_is_user(a, from));
            let (slot, lists): (_, &[&AddressList]) =
                match (pat.op == PatternOp::PersonalFrom, pat.all_addr) {
                    (false, true) => (&mut cache.pers_recip_all, &[&env.to, &env.cc, &env.bcc]),
                    (false, false) => (&mut cache.pers_recip_one, &[&env.to, &env.cc, &env.bcc]),
                    (true, true) => (&mut cache.pers_from_all, &[&env.from]),
                    (true, false) => (&mut cache.pers_from_one, &[&env.from]),
                };
            cached(slot, || match_predicate(pat.all_addr, lists, is_user))
        }
        PatternOp::Collapsed => e.collapsed && e.num_hidden > 1,
        PatternOp::CryptSign => e.security.contains(SecurityFlags::SIGN),
        PatternOp::CryptVerified => e.security.contains(SecurityFlags::GOODSIGN),
        PatternOp::CryptEncrypt => e.security.contains(SecurityFlags::ENCRYPT),
        PatternOp::PgpKey => e
            .security
            .contains(SecurityFlags::KEYBLOCK | SecurityFlags::PGP),
        PatternOp::XLabel => env.x_label.as_deref().map_or(false, |s| patmatch(pat, ctx, s)),
        PatternOp::DriverTags => e.tags.iter().any(|t| patmatch(pat, ctx, t)),
        PatternOp::Spam => env.spam.as_deref().map_or(false, |s| patmatch(pat, ctx, s)),
        PatternOp::Newsgroups => env
            .newsgroups
            .as_deref()
            .map_or(false, |s| patmatch(pat, ctx, s)),
        PatternOp::MimeAttachment => in_range(pat, e.attach_total as i64),
        PatternOp::MimeType => e
            .body
            .walk()
            .iter()
            .any(|b| patmatch(pat, ctx, &b.mime_type())),
        PatternOp::Duplicated | PatternOp::Unreferenced | PatternOp::Broken => {
            let Some(node) = ctx
                .threads
                .and_then(|t| t.node_of(ctx.mailbox, e.msgno).map(|id| &t[id]))
            else {
                return Ok(false);
            };
            match pat.op {
                PatternOp::Duplicated => node.duplicate_thread,
                PatternOp::Unreferenced => node.child.is_none(),
                _ => node.fake_thread,
            }
        }
    })
}
