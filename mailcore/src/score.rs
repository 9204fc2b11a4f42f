/*
 * mailcore - message scoring
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

//! Message scores.
//!
//! `score pattern value` adds `value` to every message matching `pattern`.
//! A value written `=N`, or one of the extremes `9999` and `-9999`, sets the
//! score outright and ends the evaluation. Scores never go below zero and
//! the `score_threshold_*` options turn them into flags.

use std::fmt;

use crate::{
    conf::{ConfigSubset, ThreadingSettings},
    error::{Error, ErrorKind, Result},
    mailbox::{Mailbox, SetFlag},
    neomutt::Globals,
    pattern::{compile, CompileContext, CompileFlags, ExecFlags, PatternCache, PatternContext, PatternList},
    thread::ThreadContext,
};

/// Scores at or beyond these end the evaluation.
pub const SCORE_MAX: i64 = 9999;
pub const SCORE_MIN: i64 = -9999;

/// One `score` command.
#[derive(Clone, Debug)]
pub struct ScoreRule {
    pub pattern: PatternList,
    pub value: i64,
    /// Written as `=N`.
    pub exact: bool,
}

impl ScoreRule {
    pub fn source(&self) -> &str {
        self.pattern.source()
    }

    fn is_final(&self) -> bool {
        self.exact || self.value == SCORE_MAX || self.value == SCORE_MIN
    }
}

impl fmt::Display for ScoreRule {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "score '{}' {}{}",
            self.source(),
            if self.exact { "=" } else { "" },
            self.value
        )
    }
}

fn score_error(msg: &str) -> Error {
    Error::new(format!("score: {}", msg)).set_kind(ErrorKind::Configuration)
}

/// `score pattern [=]value`
pub fn parse_score(g: &mut Globals, sub: &ConfigSubset, args: &[String]) -> Result<()> {
    let (source, value) = match args {
        [] | [_] => return Err(score_error("too few arguments")),
        [source, value] => (source, value),
        _ => return Err(score_error("too many arguments")),
    };
    let (exact, digits) = match value.strip_prefix('=') {
        Some(rest) => (true, rest),
        None => (false, value.as_str()),
    };
    let value: i64 = digits
        .trim()
        .parse()
        .map_err(|_| score_error("invalid number"))?;

    if let Some(rule) = g.score_rules.iter_mut().find(|r| r.source() == source) {
        rule.value = value;
        rule.exact = exact;
    } else {
        let ctx = CompileContext::new(CompileFlags::empty()).with_settings(sub.settings());
        let pattern = compile(source, &ctx)?;
        g.score_rules.push(ScoreRule {
            pattern,
            value,
            exact,
        });
    }
    g.need_rescore = true;
    Ok(())
}

/// `unscore {* | pattern...}`
pub fn parse_unscore(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(Error::new("unscore: too few arguments").set_kind(ErrorKind::Configuration));
    }
    for arg in args {
        if arg == "*" {
            g.score_rules.clear();
            break;
        }
        g.score_rules.retain(|r| r.source() != arg);
    }
    g.need_rescore = true;
    Ok(())
}

/// Sum the rules matching message `msgno`.
pub fn compute_score(
    m: &Mailbox,
    msgno: usize,
    globals: &Globals,
    threads: Option<&ThreadContext>,
    settings: &ThreadingSettings,
) -> Result<i64> {
    let ctx = PatternContext::new(m)
        .with_globals(globals)
        .with_settings(settings)
        .with_flags(ExecFlags::MATCH_FULL_ADDRESS);
    let ctx = match threads {
        Some(t) => ctx.with_threads(t),
        None => ctx,
    };
    let mut score = 0;
    for rule in &globals.score_rules {
        if !rule.pattern.exec(&ctx, msgno, &mut PatternCache::new())? {
            continue;
        }
        if rule.is_final() {
            score = rule.value;
            break;
        }
        score += rule.value;
    }
    Ok(score.max(0))
}

/// Recompute the score of `msgno` and apply the thresholds.
///
/// With `upd_mbox` unset the flags change without touching the mailbox
/// counters.
pub fn score_message(
    m: &mut Mailbox,
    msgno: usize,
    globals: &Globals,
    threads: Option<&ThreadContext>,
    settings: &ThreadingSettings,
    upd_mbox: bool,
) -> Result<()> {
    let score = compute_score(m, msgno, globals, threads, settings)?;
    let Some(e) = m.email_mut(msgno) else {
        return Ok(());
    };
    e.score = score;

    if score <= settings.score_threshold_delete {
        m.set_flag(msgno, SetFlag::Delete, true, settings.flag_safe, upd_mbox);
    }
    if score <= settings.score_threshold_read {
        m.set_flag(msgno, SetFlag::Read, true, settings.flag_safe, upd_mbox);
    }
    if score >= settings.score_threshold_flag {
        m.set_flag(msgno, SetFlag::Flag, true, settings.flag_safe, upd_mbox);
    }
    Ok(())
}
