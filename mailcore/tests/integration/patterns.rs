//
// mailcore - pattern language
//
// Copyright 2024 mailcore contributors
//
// This file is part of mailcore.
//
// mailcore is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// mailcore is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with mailcore. If not, see <http://www.gnu.org/licenses/>.
//
// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later

use mailcore::{
    mailbox::{Mailbox, SetFlag},
    pattern::{
        check_simple, compile, lookup_op, lookup_tag, CompileContext, CompileFlags,
        PatternCache, PatternContext, PatternOp,
    },
    thread::ThreadContext,
    ErrorKind, UnixTimestamp,
};

use crate::{mailbox, thread, threads, Msg};

/// 2024-01-10 10:00:00 UTC
const NOW: UnixTimestamp = 1_704_880_800;

fn sample() -> (Mailbox, ThreadContext) {
    let mut m = mailbox(&[
        Msg::new("a", "plan", 1).sender("Alice <alice@example.com>"),
        Msg::new("b", "Re: plan", 2)
            .sender("bob@example.com")
            .reply_to("a"),
        Msg::new("c", "Re: plan", 3)
            .sender("carol@example.com")
            .reply_to("b"),
        Msg::new("d", "other", 9).sender("alice@example.org"),
    ]);
    m.set_flag(3, SetFlag::Flag, true, false, true);
    let ctx = thread(&mut m, &threads());
    (m, ctx)
}

fn search(m: &Mailbox, threads: &ThreadContext, s: &str) -> Vec<usize> {
    let cctx = CompileContext::new(CompileFlags::FULL_MSG)
        .with_mailbox(m, None)
        .with_now(NOW);
    let p = compile(s, &cctx).unwrap();
    let ctx = PatternContext::new(m).with_threads(threads).with_now(NOW);
    m.emails()
        .filter(|(msgno, _)| p.exec(&ctx, *msgno, &mut PatternCache::new()).unwrap())
        .map(|(msgno, _)| msgno)
        .collect()
}

#[test]
fn test_pattern_operators() {
    let (m, ctx) = sample();
    assert_eq!(search(&m, &ctx, "~f alice"), vec![0, 3]);
    assert_eq!(search(&m, &ctx, "~f alice ~s plan"), vec![0]);
    assert_eq!(search(&m, &ctx, "~f alice | ~f bob"), vec![0, 1, 3]);
    assert_eq!(search(&m, &ctx, "!~f alice"), vec![1, 2]);
    assert_eq!(search(&m, &ctx, "!(~f alice | ~f bob)"), vec![2]);
    assert_eq!(search(&m, &ctx, "~F"), vec![3]);
    assert_eq!(search(&m, &ctx, "~U !~F"), vec![0, 1, 2]);
    assert_eq!(search(&m, &ctx, "=s plan"), vec![0, 1, 2]);
    assert_eq!(search(&m, &ctx, "~m 2-3"), vec![1, 2]);
    assert_eq!(search(&m, &ctx, "~z >1M"), Vec::<usize>::new());
    assert_eq!(search(&m, &ctx, "~d <3d"), vec![3]);
}

#[test]
fn test_pattern_thread_operators() {
    let (m, ctx) = sample();
    assert_eq!(search(&m, &ctx, "~(~f carol)"), vec![0, 1, 2]);
    assert_eq!(search(&m, &ctx, "~<(~f alice)"), vec![1]);
    assert_eq!(search(&m, &ctx, "~>(~f carol)"), vec![1]);
    assert_eq!(search(&m, &ctx, "~$"), vec![2, 3]);
    assert_eq!(search(&m, &ctx, "~="), Vec::<usize>::new());
}

#[test]
fn test_pattern_simple_search() {
    let (m, ctx) = sample();
    let expanded = check_simple("alice", "~f %s | ~s %s");
    assert_eq!(expanded, r#"~f "alice" | ~s "alice""#);
    assert_eq!(search(&m, &ctx, &expanded), vec![0, 3]);
    assert_eq!(check_simple("all", "~f %s | ~s %s"), "~A");
}

#[test]
fn test_pattern_errors() {
    let full = CompileContext::new(CompileFlags::FULL_MSG);
    let err = compile("~j", &full).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PatternCompile);
    assert_eq!(err.details, "j: invalid pattern modifier");

    let err = compile("~b hello", &CompileContext::new(CompileFlags::empty())).unwrap_err();
    assert_eq!(err.details, "b: not supported in this mode");
    assert!(compile("~b hello", &full).is_ok());

    assert_eq!(compile("(~f a", &full).unwrap_err().details, "mismatched parentheses: (~f a");
}

#[test]
fn test_pattern_table() {
    let entry = lookup_tag('f').unwrap();
    assert_eq!(entry.op, PatternOp::From);
    assert_eq!(lookup_op(PatternOp::From).unwrap().tag, 'f');
    assert!(lookup_tag('j').is_none());
    assert!(lookup_tag('b').unwrap().flags.contains(CompileFlags::FULL_MSG));
}

#[test]
fn test_pattern_huge_ranges() {
    let (m, ctx) = sample();
    let all = vec![0, 1, 2, 3];
    let none = Vec::<usize>::new();

    // message numbers past i64::MAX are compile errors, not overflows
    let current = CompileContext::new(CompileFlags::FULL_MSG).with_mailbox(&m, Some(0));
    for s in [
        "~m >99999999999999999999",
        "~m >9223372036854775807",
        "~m -1,99999999999999999999",
        "~m 9223372036854775807,1",
    ] {
        let err = compile(s, &current).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PatternCompile, "{}", s);
        assert!(err.details.starts_with("error in pattern at: "), "{}: {}", s, err.details);
    }
    assert_eq!(search(&m, &ctx, "~m 99999999999999999999"), none);
    assert_eq!(search(&m, &ctx, "~m 1-99999999999999999999"), all);

    // sizes and scores saturate
    assert_eq!(search(&m, &ctx, "~z >99999999999999999999"), none);
    assert_eq!(search(&m, &ctx, "~z <99999999999999999999"), all);
    assert_eq!(search(&m, &ctx, "~z 99999999999999999999M-"), none);
    assert_eq!(search(&m, &ctx, "~z -0x7fffffffffffffff"), all);
    assert_eq!(search(&m, &ctx, "~n >9223372036854775807"), none);
    assert_eq!(search(&m, &ctx, "~n <9223372036854775807"), all);
}

#[test]
fn test_pattern_message_range_context() {
    let (m, _) = sample();
    let err = compile("~m 1-2", &CompileContext::new(CompileFlags::FULL_MSG)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PatternCompile);
    assert_eq!(err.details, "No mailbox is open");

    let no_current = CompileContext::new(CompileFlags::FULL_MSG).with_mailbox(&m, None);
    assert_eq!(compile("~m -1,1", &no_current).unwrap_err().details, "No current message");
    assert_eq!(compile("~m .", &no_current).unwrap_err().details, "No current message");
    assert!(compile("~m 1-2", &no_current).is_ok());
}
