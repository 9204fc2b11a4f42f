/*
 * mailcore - pattern compiler
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

use std::{
    io::{BufRead, BufReader},
    process::{Command, Stdio},
};

use regex::{Captures, Regex, RegexBuilder};

use super::{
    date::{eval_date_range, strtol},
    flags::{lookup_tag, EatArg},
    CompileFlags, Pattern, PatternList, PatternOp, PatternPayload,
};
use crate::{
    conf::ThreadingSettings,
    error::{Error, ErrorKind, Result},
    mailbox::Mailbox,
    utils::{datetime, is_lower},
};

/// What the compiler may consult besides the pattern text.
#[derive(Clone, Copy, Default)]
pub struct CompileContext<'a> {
    pub flags: CompileFlags,
    /// Needed by `~I`.
    pub settings: Option<&'a ThreadingSettings>,
    /// Needed by `~m`.
    pub mailbox: Option<&'a Mailbox>,
    /// `msgno` of the selected message, for `~m .` and relative ranges.
    pub current: Option<usize>,
    /// Reference time for relative dates, defaults to the clock.
    pub now: Option<datetime::UnixTimestamp>,
}

impl<'a> CompileContext<'a> {
    pub fn new(flags: CompileFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    pub fn with_settings(self, settings: &'a ThreadingSettings) -> Self {
        Self {
            settings: Some(settings),
            ..self
        }
    }

    pub fn with_mailbox(self, mailbox: &'a Mailbox, current: Option<usize>) -> Self {
        Self {
            mailbox: Some(mailbox),
            current,
            ..self
        }
    }

    pub fn with_now(self, now: datetime::UnixTimestamp) -> Self {
        Self {
            now: Some(now),
            ..self
        }
    }

    fn now(&self) -> datetime::UnixTimestamp {
        self.now.unwrap_or_else(datetime::now)
    }
}

fn compile_error<M: Into<String>>(msg: M) -> Error {
    Error::new(msg.into()).set_kind(ErrorKind::PatternCompile)
}

/// Compile `s` into a pattern tree.
pub fn compile(s: &str, ctx: &CompileContext<'_>) -> Result<PatternList> {
    match compile_expr(s, ctx) {
        Ok(root) => Ok(PatternList::new(root, s)),
        Err(err) => {
            log::debug!("pattern {:?}: {}", s, err.details);
            Err(err)
        }
    }
}

#[derive(Clone, Copy, Default)]
struct Modifiers {
    pat_not: bool,
    all_addr: bool,
    is_alias: bool,
}

impl Modifiers {
    fn apply(self, pat: &mut Pattern) {
        pat.pat_not ^= self.pat_not;
        pat.all_addr |= self.all_addr;
        pat.is_alias |= self.is_alias;
    }
}

/// Replace the nodes of `list` by one `op` node holding them.
fn attach_new_root(list: &mut Vec<Pattern>, op: PatternOp) {
    if list.len() > 1 {
        let children = std::mem::take(list);
        list.push(Pattern::with_children(op, children));
    }
}

/// Offset in `s` of the `)` closing a `(` just before `s`.
fn find_matching_paren(s: &str) -> Option<usize> {
    let mut level = 1;
    for (i, c) in s.char_indices() {
        match c {
            '(' => level += 1,
            ')' => {
                level -= 1;
                if level == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn compile_expr(s: &str, ctx: &CompileContext<'_>) -> Result<Pattern> {
    if s.is_empty() {
        return Err(compile_error("empty pattern"));
    }
    let mut list: Vec<Pattern> = vec![];
    let mut pat_or = false;
    // the previous atom was joined by juxtaposition
    let mut implicit = true;
    let mut modifiers = Modifiers::default();

    let mut rest = s.trim_start();
    while let Some(c) = rest.chars().next() {
        match c {
            '^' => {
                modifiers.all_addr = !modifiers.all_addr;
                rest = &rest[1..];
            }
            '!' => {
                modifiers.pat_not = !modifiers.pat_not;
                rest = &rest[1..];
            }
            '@' => {
                modifiers.is_alias = !modifiers.is_alias;
                rest = &rest[1..];
            }
            '&' => rest = &rest[1..],
            '|' => {
                if !pat_or {
                    if list.is_empty() {
                        return Err(compile_error(format!("error in pattern at: {}", rest)));
                    }
                    // A B | C == (A B) | C
                    attach_new_root(&mut list, PatternOp::And);
                    pat_or = true;
                }
                rest = &rest[1..];
                implicit = false;
                modifiers = Modifiers::default();
            }
            '~' | '=' | '%' => {
                let after = &rest[1..];
                let Some(tag) = after.chars().next() else {
                    return Err(compile_error(format!("missing pattern: {}", rest)));
                };
                // A | B C == (A | B) C
                if implicit && pat_or {
                    attach_new_root(&mut list, PatternOp::Or);
                    pat_or = false;
                }
                let thread_op = if after.starts_with('(') {
                    Some((PatternOp::Thread, 0))
                } else if after.starts_with("<(") {
                    Some((PatternOp::Parent, 1))
                } else if after.starts_with(">(") {
                    Some((PatternOp::Children, 1))
                } else {
                    None
                };
                if let Some((op, skip)) = thread_op {
                    let open = &after[skip..];
                    let Some(close) = find_matching_paren(&open[1..]) else {
                        return Err(compile_error(format!("mismatched parentheses: {}", open)));
                    };
                    let sub = compile_expr(&open[1..=close], ctx)?;
                    let mut leaf = Pattern::with_children(op, vec![sub]);
                    modifiers.apply(&mut leaf);
                    list.push(leaf);
                    rest = &open[close + 2..];
                } else {
                    let Some(entry) = lookup_tag(tag) else {
                        return Err(compile_error(format!("{}: invalid pattern modifier", tag)));
                    };
                    if !entry.flags.is_empty() && !ctx.flags.intersects(entry.flags) {
                        return Err(compile_error(format!("{}: not supported in this mode", tag)));
                    }
                    let mut leaf = Pattern::new(entry.op);
                    modifiers.apply(&mut leaf);
                    rest = after[tag.len_utf8()..].trim_start();
                    if entry.eat_arg != EatArg::None && rest.is_empty() {
                        return Err(compile_error("missing parameter"));
                    }
                    let arg = match entry.eat_arg {
                        EatArg::None => None,
                        EatArg::Regex => Some(eat_regex(rest, c)?),
                        EatArg::Date => Some(eat_date(rest, ctx)?),
                        EatArg::Range => Some(eat_range(rest)),
                        EatArg::MessageRange => Some(eat_message_range(rest, ctx)?),
                        EatArg::Query => Some(eat_query(rest, ctx)?),
                    };
                    if let Some((payload, tail)) = arg {
                        leaf.payload = Some(payload);
                        rest = tail;
                    }
                    list.push(leaf);
                }
                modifiers = Modifiers::default();
                implicit = true;
            }
            '(' => {
                let Some(close) = find_matching_paren(&rest[1..]) else {
                    return Err(compile_error(format!("mismatched parentheses: {}", rest)));
                };
                if implicit && pat_or {
                    attach_new_root(&mut list, PatternOp::Or);
                    pat_or = false;
                }
                let mut sub = compile_expr(&rest[1..=close], ctx)?;
                modifiers.apply(&mut sub);
                list.push(sub);
                modifiers = Modifiers::default();
                implicit = true;
                rest = &rest[close + 2..];
            }
            _ => return Err(compile_error(format!("error in pattern at: {}", rest))),
        }
        rest = rest.trim_start();
    }

    attach_new_root(
        &mut list,
        if pat_or {
            PatternOp::Or
        } else {
            PatternOp::And
        },
    );
    list.pop().ok_or_else(|| compile_error("empty pattern"))
}

/// Expand `$NAME` and `${NAME}` from the environment.
fn expand_var(s: &str) -> Option<(String, &str)> {
    let (name, rest) = if let Some(braced) = s.strip_prefix('{') {
        let end = braced.find('}')?;
        (&braced[..end], &braced[end + 1..])
    } else {
        let end = s
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(s.len());
        (&s[..end], &s[end..])
    };
    Some((std::env::var(name).unwrap_or_default(), rest))
}

/// Read one argument. Whitespace and `~ % = ! |` end it unless quoted or
/// escaped with a backslash. Returns the token and the rest of `s`.
fn extract_token(s: &str) -> Result<(String, &str)> {
    let mut out = String::new();
    let mut quote: Option<char> = None;
    let mut rest = s;
    while let Some(ch) = rest.chars().next() {
        if quote.is_none() && (ch.is_whitespace() || "~%=!|".contains(ch)) {
            break;
        }
        rest = &rest[ch.len_utf8()..];
        match ch {
            '"' | '\'' if quote.is_none() => quote = Some(ch),
            _ if Some(ch) == quote => quote = None,
            '\\' if quote != Some('\'') => {
                let Some(next) = rest.chars().next() else {
                    return Err(compile_error(format!("Error in expression: {}", s)));
                };
                rest = &rest[next.len_utf8()..];
                out.push(match next {
                    'n' | 'N' => '\n',
                    'r' | 'R' => '\r',
                    't' | 'T' => '\t',
                    'e' | 'E' => '\x1b',
                    other => other,
                });
            }
            '$' if quote != Some('\'')
                && rest.starts_with(|c: char| c == '{' || c.is_ascii_alphabetic()) =>
            {
                match expand_var(rest) {
                    Some((value, tail)) => {
                        out.push_str(&value);
                        rest = tail;
                    }
                    None => out.push(ch),
                }
            }
            _ => out.push(ch),
        }
    }
    Ok((out, rest.trim_start()))
}

fn eat_regex(s: &str, prefix: char) -> Result<(PatternPayload, &str)> {
    let (token, rest) = extract_token(s)?;
    if token.is_empty() {
        return Err(compile_error("Empty expression"));
    }
    let payload = match prefix {
        '=' => PatternPayload::Literal {
            ign_case: is_lower(&token),
            text: token,
        },
        '%' => PatternPayload::AddressGroup(token),
        _ => PatternPayload::Regex(
            RegexBuilder::new(&token)
                .case_insensitive(is_lower(&token))
                .multi_line(true)
                .build()
                .map_err(|err| compile_error(format!("'{}': {}", token, err)))?,
        ),
    };
    Ok((payload, rest))
}

fn eat_date<'s>(s: &'s str, ctx: &CompileContext<'_>) -> Result<(PatternPayload, &'s str)> {
    let (token, rest) = extract_token(s)?;
    if token.is_empty() {
        return Err(compile_error("Empty expression"));
    }
    let (min, max) = eval_date_range(&token, ctx.now())?;
    let dynamic = ctx.flags.contains(CompileFlags::DYNAMIC).then_some(token);
    Ok((PatternPayload::DateRange { min, max, dynamic }, rest))
}

/// Apply a `K` or `M` suffix.
fn size_suffix(value: i64, s: &str) -> (i64, &str) {
    match s.chars().next() {
        Some('k' | 'K') => (value.saturating_mul(1024), &s[1..]),
        Some('m' | 'M') => (value.saturating_mul(1_048_576), &s[1..]),
        _ => (value, s),
    }
}

fn finish_range(tail: &str, skip_quote: bool) -> &str {
    let tail = if skip_quote {
        tail.strip_prefix('"').unwrap_or(tail)
    } else {
        tail
    };
    tail.trim_start()
}

/// `N`, `N-M`, `N-`, `-M`, `<N`, `>N`, each number with an optional `K` or
/// `M` suffix. The range may be wrapped in double quotes.
fn eat_range(s: &str) -> (PatternPayload, &str) {
    let (s, skip_quote) = match s.strip_prefix('"') {
        Some(inner) => (inner, true),
        None => (s, false),
    };

    if let Some(after) = s.strip_prefix('>') {
        // The bound is made exclusive before scaling: `>1K` is 2048.
        let (tail, n) = strtol(after);
        let (min, tail) = size_suffix(n.saturating_add(1), tail);
        return (
            PatternPayload::NumericRange { min, max: None },
            finish_range(tail, skip_quote),
        );
    }

    let exclusive = s.starts_with('<');
    let mut min = 0;
    let tail = if s.starts_with('-') || exclusive {
        &s[1..]
    } else {
        let (tail, n) = strtol(s);
        let (n, tail) = size_suffix(n, tail);
        min = n;
        match tail.strip_prefix('-') {
            Some(tail) => tail,
            None => {
                return (
                    PatternPayload::NumericRange { min, max: Some(min) },
                    finish_range(tail, skip_quote),
                )
            }
        }
    };

    if tail.starts_with(|c: char| c.is_ascii_digit()) {
        let (tail, n) = strtol(tail);
        let (n, tail) = size_suffix(n, tail);
        let max = if exclusive { n.saturating_sub(1) } else { n };
        (
            PatternPayload::NumericRange {
                min,
                max: Some(max),
            },
            finish_range(tail, skip_quote),
        )
    } else {
        (PatternPayload::NumericRange { min, max: None }, finish_range(tail, skip_quote))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RangeKind {
    /// `-2,3`: relative to the current message.
    Relative,
    /// `2-7`
    Absolute,
    /// `<5`
    LessThan,
    /// `>5`
    GreaterThan,
    /// `5`, `.`, `$`, `^`
    Bare,
}

impl RangeKind {
    const ALL: [Self; 5] = [
        Self::Relative,
        Self::Absolute,
        Self::LessThan,
        Self::GreaterThan,
        Self::Bare,
    ];

    fn regex(self) -> String {
        const NUM: &str = r"([[:digit:]]+|0x[[:xdigit:]]+)[MmKk]?";
        let rel_slot = format!(r"[[:blank:]]*([.^$]|-?{})?[[:blank:]]*", NUM);
        let abs_slot = format!(r"[[:blank:]]*([.^$]|{})?[[:blank:]]*", NUM);
        match self {
            Self::Relative => format!("^{},{}", rel_slot, rel_slot),
            Self::Absolute => format!("^{}-{}", abs_slot, abs_slot),
            Self::LessThan => format!(r"^()[[:blank:]]*(<[[:blank:]]*{})[[:blank:]]*", NUM),
            Self::GreaterThan => format!(r"^()[[:blank:]]*(>[[:blank:]]*{})[[:blank:]]*", NUM),
            Self::Bare => format!(r"^[[:blank:]]*([.^$]|{})[[:blank:]]*", NUM),
        }
    }

    /// Capture groups of the left and right bounds.
    fn groups(self) -> (usize, usize) {
        match self {
            Self::Relative | Self::Absolute => (1, 3),
            Self::LessThan => (1, 2),
            Self::GreaterThan => (2, 1),
            Self::Bare => (1, 1),
        }
    }

    /// Characters in the match that make the range depend on the current
    /// message.
    fn needs_current(self) -> &'static str {
        match self {
            Self::Relative => ".0123456789",
            Self::Absolute | Self::Bare => ".",
            Self::LessThan | Self::GreaterThan => "",
        }
    }
}

struct RangeScanner<'a> {
    kind: RangeKind,
    msg_count: i64,
    /// 1-based number of the current message.
    current: Option<i64>,
    caps: Captures<'a>,
}

impl RangeScanner<'_> {
    /// `None` when the bound does not fit in an `i64`.
    fn num(&self, group: usize) -> Option<i64> {
        let Some(m) = self.caps.get(group) else {
            return Some(0);
        };
        let (_, n) = strtol(m.as_str());
        let (n, _) = size_suffix(n, &m.as_str()[m.as_str().len().saturating_sub(1)..]);
        match self.kind {
            RangeKind::Relative => n.checked_add(self.current.unwrap_or(0)),
            RangeKind::LessThan => n.checked_sub(1),
            RangeKind::GreaterThan => n.checked_add(1),
            _ => Some(n),
        }
    }

    fn slot(&self, group: usize, left: bool) -> Option<i64> {
        let text = self.caps.get(group).map_or("", |m| m.as_str());
        match text.chars().next() {
            None if left => Some(1),
            None => Some(self.msg_count),
            Some('^') => Some(1),
            Some('$') => Some(self.msg_count),
            Some('.') => Some(self.current.unwrap_or(1)),
            Some('<' | '>') => self.num(group + 1),
            Some(_) => self.num(group),
        }
    }
}

/// Message numbers, 1-based: `N`, `N-M`, `-N,M` around the current one,
/// `<N`, `>N`, `.` current, `^` first, `$` last.
fn eat_message_range<'s>(
    s: &'s str,
    ctx: &CompileContext<'_>,
) -> Result<(PatternPayload, &'s str)> {
    let Some(mailbox) = ctx.mailbox else {
        return Err(compile_error("No mailbox is open"));
    };
    let (s, skip_quote) = match s.strip_prefix('"') {
        Some(inner) => (inner, true),
        None => (s, false),
    };
    let current = ctx.current.map(|msgno| msgno as i64 + 1);
    for kind in RangeKind::ALL {
        let rx = Regex::new(&kind.regex())?;
        let Some(caps) = rx.captures(s) else {
            continue;
        };
        let whole = caps.get(0).map_or("", |m| m.as_str());
        if current.is_none() && whole.contains(|c: char| kind.needs_current().contains(c)) {
            return Err(compile_error("No current message"));
        }
        let end = whole.len();
        let scanner = RangeScanner {
            kind,
            msg_count: mailbox.msg_count() as i64,
            current,
            caps,
        };
        let (lgrp, rgrp) = kind.groups();
        let (Some(mut min), Some(mut max)) = (scanner.slot(lgrp, true), scanner.slot(rgrp, false))
        else {
            return Err(compile_error(format!("error in pattern at: {}", s)));
        };
        if kind == RangeKind::Bare && min == 0 && max == 0 {
            let Some(cur) = current else {
                return Err(compile_error("No current message"));
            };
            min = cur;
            max = cur;
        }
        if min > max {
            std::mem::swap(&mut min, &mut max);
        }
        let mut tail = &s[end..];
        if skip_quote {
            tail = tail.strip_prefix('"').unwrap_or(tail);
        }
        return Ok((
            PatternPayload::NumericRange {
                min,
                max: Some(max),
            },
            tail.trim_start(),
        ));
    }
    Err(compile_error(format!("error in pattern at: {}", s)))
}

/// Run `$external_search_command` and collect the message-ids it prints.
fn eat_query<'s>(s: &'s str, ctx: &CompileContext<'_>) -> Result<(PatternPayload, &'s str)> {
    let Some(command) = ctx
        .settings
        .and_then(|s| s.external_search_command.as_deref())
    else {
        return Err(compile_error("No search command defined"));
    };
    let (token, rest) = extract_token(s)?;
    if token.is_empty() {
        return Err(compile_error("Empty expression"));
    }
    let folder = match ctx.mailbox {
        Some(m) => format!("'{}'", m.path.replace('\'', r"'\''")),
        None => "/".to_string(),
    };
    let cmd = format!("{} {} {}", command, folder, token);
    log::info!("Running search command: {} ...", cmd);
    let mut child = Command::new("sh")
        .args(["-c", &cmd])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|err| {
            Error::new(format!("unable to fork command: {}", cmd))
                .set_source(Some(std::sync::Arc::new(err)))
                .set_kind(ErrorKind::External)
        })?;
    let mut ids = vec![];
    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            let line = line?;
            let id = line.trim();
            if !id.is_empty() {
                ids.push(id.to_string());
            }
        }
    }
    let status = child.wait()?;
    if !status.success() {
        log::debug!("search command {:?} exited with {}", cmd, status);
    }
    Ok((PatternPayload::MessageIdList(ids), rest))
}

/// Turn a plain search string into a pattern.
///
/// Strings with an unescaped `~`, `=` or `%` are patterns already. A few
/// keywords stand for flag patterns; anything else is quoted and put in
/// place of each `%s` in `simple_search`.
pub fn check_simple(s: &str, simple_search: &str) -> String {
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '~' | '=' | '%' => return s.to_string(),
            _ => {}
        }
    }
    let keyword = match s.to_ascii_lowercase().as_str() {
        "all" | "^" | "." => Some("~A"),
        "del" => Some("~D"),
        "flag" => Some("~F"),
        "new" => Some("~N"),
        "old" => Some("~O"),
        "repl" => Some("~Q"),
        "read" => Some("~R"),
        "tag" => Some("~T"),
        "unread" => Some("~U"),
        _ => None,
    };
    if let Some(k) = keyword {
        return k.to_string();
    }
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        if c == '\\' || c == '"' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    simple_search.replace("%s", &quoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        email::{Email, Envelope},
        Body,
    };

    fn ctx() -> CompileContext<'static> {
        CompileContext::new(CompileFlags::FULL_MSG)
    }

    fn ops(p: &Pattern) -> Vec<PatternOp> {
        p.children().iter().map(|c| c.op).collect()
    }

    fn err(s: &str, ctx: &CompileContext<'_>) -> String {
        compile(s, ctx).unwrap_err().details.to_string()
    }

    #[test]
    fn test_compile_precedence() {
        let p = compile("~f alice ~s hello", &ctx()).unwrap();
        assert_eq!(p.root().op, PatternOp::And);
        assert_eq!(ops(p.root()), vec![PatternOp::From, PatternOp::Subject]);

        let p = compile("~f alice", &ctx()).unwrap();
        assert_eq!(p.root().op, PatternOp::From);
        assert!(p.root().children().is_empty());

        // A B | C == (A B) | C
        let p = compile("~f a ~d <1w | ~s c", &ctx()).unwrap();
        assert_eq!(p.root().op, PatternOp::Or);
        assert_eq!(ops(p.root()), vec![PatternOp::And, PatternOp::Subject]);
        assert_eq!(
            ops(&p.root().children()[0]),
            vec![PatternOp::From, PatternOp::Date]
        );

        // A | B C == (A | B) C
        let p = compile("~f a | ~t b ~s c", &ctx()).unwrap();
        assert_eq!(p.root().op, PatternOp::And);
        assert_eq!(ops(p.root()), vec![PatternOp::Or, PatternOp::Subject]);

        let p = compile("~f a | ~t b | ~s c", &ctx()).unwrap();
        assert_eq!(p.root().op, PatternOp::Or);
        assert_eq!(p.root().children().len(), 3);

        // explicit &
        let p = compile("~f alice & ~d <1w", &ctx()).unwrap();
        assert_eq!(p.root().op, PatternOp::And);
        assert_eq!(ops(p.root()), vec![PatternOp::From, PatternOp::Date]);
    }

    #[test]
    fn test_compile_modifiers() {
        let p = compile("!~f alice ^~C bob @~t carol", &ctx()).unwrap();
        let c = p.root().children();
        assert!(c[0].pat_not && !c[0].all_addr && !c[0].is_alias);
        assert!(!c[1].pat_not && c[1].all_addr);
        assert!(c[2].is_alias);

        // modifiers do not leak past `|`
        let p = compile("~f a | ~s b", &ctx()).unwrap();
        assert!(p.root().children().iter().all(|c| !c.pat_not));

        let p = compile("!(~f a | ~s b)", &ctx()).unwrap();
        assert_eq!(p.root().op, PatternOp::Or);
        assert!(p.root().pat_not);

        let p = compile("!!~N", &ctx()).unwrap();
        assert!(!p.root().pat_not);
    }

    #[test]
    fn test_compile_thread_ops() {
        let p = compile("~(~f alice) ~<(~N) ~>(~s x)", &ctx()).unwrap();
        assert_eq!(
            ops(p.root()),
            vec![PatternOp::Thread, PatternOp::Parent, PatternOp::Children]
        );
        assert_eq!(p.root().children()[0].children()[0].op, PatternOp::From);

        let p = compile("!~((~f a) ~s b)", &ctx()).unwrap();
        assert_eq!(p.root().op, PatternOp::Thread);
        assert!(p.root().pat_not);
        assert_eq!(p.root().children()[0].op, PatternOp::And);
    }

    #[test]
    fn test_compile_leaves() {
        match compile("=s Hello", &ctx()).unwrap().root().payload {
            Some(PatternPayload::Literal { ref text, ign_case }) => {
                assert_eq!(text, "Hello");
                assert!(!ign_case);
            }
            ref other => panic!("{:?}", other),
        }
        match compile("%f friends", &ctx()).unwrap().root().payload {
            Some(PatternPayload::AddressGroup(ref name)) => assert_eq!(name, "friends"),
            ref other => panic!("{:?}", other),
        }
        match compile("~s hello", &ctx()).unwrap().root().payload {
            Some(PatternPayload::Regex(ref rx)) => {
                assert!(rx.is_match("Say HELLO"));
            }
            ref other => panic!("{:?}", other),
        }
        match compile("~s Hello", &ctx()).unwrap().root().payload {
            Some(PatternPayload::Regex(ref rx)) => {
                assert!(!rx.is_match("say hello"));
                assert!(rx.is_match("Hello there"));
            }
            ref other => panic!("{:?}", other),
        }
        // quoting and escapes
        match compile(r#"~s "a b|c" ~f 'x\.y'"#, &ctx()).unwrap().root().children()[..] {
            [ref s, ref f] => {
                assert_eq!(
                    s.payload.as_ref().map(|p| matches!(p, PatternPayload::Regex(rx) if rx.as_str() == "a b|c")),
                    Some(true)
                );
                assert_eq!(
                    f.payload.as_ref().map(|p| matches!(p, PatternPayload::Regex(rx) if rx.as_str() == r"x\.y")),
                    Some(true)
                );
            }
            ref other => panic!("{:?}", other),
        }
        match compile(r"~s foo\ bar", &ctx()).unwrap().root().payload {
            Some(PatternPayload::Regex(ref rx)) => assert_eq!(rx.as_str(), "foo bar"),
            ref other => panic!("{:?}", other),
        }
        assert!(compile("~A", &ctx()).unwrap().is_match_all());
        assert!(!compile("!~A", &ctx()).unwrap().is_match_all());
    }

    #[test]
    fn test_compile_ranges() {
        let range = |s: &str| match compile(s, &ctx()).unwrap().root().payload {
            Some(PatternPayload::NumericRange { min, max }) => (min, max),
            ref other => panic!("{:?}", other),
        };
        assert_eq!(range("~z 100"), (100, Some(100)));
        assert_eq!(range("~z 10-20"), (10, Some(20)));
        assert_eq!(range("~z 10-"), (10, None));
        assert_eq!(range("~z -20"), (0, Some(20)));
        assert_eq!(range("~z <1K"), (0, Some(1023)));
        assert_eq!(range("~z >1K"), (2048, None));
        assert_eq!(range("~z 2M"), (2_097_152, Some(2_097_152)));
        assert_eq!(range("~n \"5-7\""), (5, Some(7)));
        assert_eq!(range("~X 0x10"), (16, Some(16)));
    }

    #[test]
    fn test_compile_message_ranges() {
        let mut m = Mailbox::new("inbox");
        for _ in 0..10 {
            m.insert_email(Email::new(Envelope::new(), Body::default()));
        }
        let with_current = CompileContext::new(CompileFlags::empty()).with_mailbox(&m, Some(4));
        let without = CompileContext::new(CompileFlags::empty()).with_mailbox(&m, None);
        let range = |s: &str, ctx: &CompileContext<'_>| match compile(s, ctx).unwrap().root().payload {
            Some(PatternPayload::NumericRange { min, max }) => (min, max),
            ref other => panic!("{:?}", other),
        };
        assert_eq!(range("~m 3", &without), (3, Some(3)));
        assert_eq!(range("~m 3-5", &without), (3, Some(5)));
        assert_eq!(range("~m 7-3", &without), (3, Some(7)));
        assert_eq!(range("~m -3", &without), (1, Some(3)));
        assert_eq!(range("~m 8-", &without), (8, Some(10)));
        assert_eq!(range("~m <4", &without), (1, Some(3)));
        assert_eq!(range("~m >4", &without), (5, Some(10)));
        assert_eq!(range("~m ^", &without), (1, Some(1)));
        assert_eq!(range("~m $", &without), (10, Some(10)));
        assert_eq!(range("~m .", &with_current), (5, Some(5)));
        assert_eq!(range("~m 0", &with_current), (5, Some(5)));
        assert_eq!(range("~m -1,1", &with_current), (4, Some(6)));
        assert_eq!(range("~m .-$", &with_current), (5, Some(10)));

        assert_eq!(err("~m .", &without), "No current message");
        assert_eq!(err("~m -1,1", &without), "No current message");
        assert_eq!(err("~m 3", &ctx()), "No mailbox is open");
    }

    #[test]
    fn test_compile_dates() {
        let ctx = ctx().with_now(1_700_000_000);
        let p = compile("~d <1w", &ctx).unwrap();
        match p.root().payload {
            Some(PatternPayload::DateRange { min, max, ref dynamic }) => {
                assert!(min < 1_700_000_000 && min > 1_700_000_000 - 8 * 86400);
                assert!(max > 1_700_000_000);
                assert!(dynamic.is_none());
            }
            ref other => panic!("{:?}", other),
        }
        let dynamic = CompileContext::new(CompileFlags::DYNAMIC).with_now(1_700_000_000);
        match compile("~r <1w", &dynamic).unwrap().root().payload {
            Some(PatternPayload::DateRange { ref dynamic, .. }) => {
                assert_eq!(dynamic.as_deref(), Some("<1w"));
            }
            ref other => panic!("{:?}", other),
        }
        assert!(err("~d 40/01/2024", &ctx).starts_with("Invalid day of month"));
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(err("", &ctx()), "empty pattern");
        assert_eq!(err("   ", &ctx()), "empty pattern");
        assert_eq!(err("| ~f a", &ctx()), "error in pattern at: | ~f a");
        assert_eq!(err("~f a ~", &ctx()), "missing pattern: ~");
        assert_eq!(err("~(~f a", &ctx()), "mismatched parentheses: (~f a");
        assert_eq!(err("(~f a", &ctx()), "mismatched parentheses: (~f a");
        assert_eq!(err("~j foo", &ctx()), "j: invalid pattern modifier");
        assert_eq!(
            err("~b foo", &CompileContext::new(CompileFlags::empty())),
            "b: not supported in this mode"
        );
        assert_eq!(err("~f", &ctx()), "missing parameter");
        assert_eq!(err("~f \"\"", &ctx()), "Empty expression");
        assert_eq!(err("foo", &ctx()), "error in pattern at: foo");
        assert_eq!(err("()", &ctx()), "empty pattern");
        assert!(err("~s (", &ctx()).starts_with("'(': "));
        assert_eq!(err("~I foo", &ctx()), "No search command defined");
        assert_eq!(
            compile("~j", &ctx()).unwrap_err().kind,
            ErrorKind::PatternCompile
        );
    }

    #[test]
    fn test_compile_external_query() {
        let settings = ThreadingSettings {
            external_search_command: Some("printf '<a@x>\\n\\n <b@y> \\n'; true".to_string()),
            ..ThreadingSettings::default()
        };
        let ctx = ctx().with_settings(&settings);
        match compile("~I whatever", &ctx).unwrap().root().payload {
            Some(PatternPayload::MessageIdList(ref ids)) => {
                assert_eq!(ids, &["<a@x>", "<b@y>"]);
            }
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_check_simple() {
        let simple = "~f %s | ~s %s";
        assert_eq!(check_simple("~f alice", simple), "~f alice");
        assert_eq!(check_simple("=s x", simple), "=s x");
        assert_eq!(check_simple("All", simple), "~A");
        assert_eq!(check_simple(".", simple), "~A");
        assert_eq!(check_simple("unread", simple), "~U");
        assert_eq!(check_simple("DEL", simple), "~D");
        assert_eq!(
            check_simple("alice", simple),
            r#"~f "alice" | ~s "alice""#
        );
        assert_eq!(
            check_simple(r#"say "hi" \~"#, "~s %s"),
            r#"~s "say \"hi\" \\~""#
        );
        // the expansion compiles back to the same text
        let p = compile(&check_simple("say \"hi\"", "~s %s"), &ctx()).unwrap();
        match p.root().payload {
            Some(PatternPayload::Regex(ref rx)) => assert_eq!(rx.as_str(), "say \"hi\""),
            ref other => panic!("{:?}", other),
        }
    }
}
