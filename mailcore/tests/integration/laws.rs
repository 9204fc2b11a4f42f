//
// mailcore - laws of the view and the thread engine
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
    mailbox::Mailbox,
    pattern::{compile, CompileContext, CompileFlags, PatternCache, PatternContext},
    thread::ThreadContext,
    MailboxView, ThreadingSettings,
};

use crate::{ids, mailbox, open_view, thread, threads, view_ids, Msg};

fn corpus() -> Vec<Msg<'static>> {
    vec![
        Msg::new("a", "plan", 1).sender("alice@example.com"),
        Msg::new("b", "Re: plan", 2)
            .sender("bob@example.com")
            .reply_to("a"),
        Msg::new("x", "lunch", 3).sender("carol@example.com"),
        Msg::new("c", "Re: plan", 4)
            .sender("alice@example.com")
            .reply_to("b"),
        Msg::new("d", "Re: plan", 5)
            .sender("dave@example.com")
            .references(&["a", "missing"]),
        Msg::new("y", "Re: lunch", 6).sender("alice@example.com"),
        Msg::new("z", "minutes", 2).sender("bob@example.com"),
    ]
}

/// Forest shape: depth and message of every node in display order.
fn topology(view: &MailboxView) -> Vec<(usize, usize)> {
    view.threads
        .linearize(false)
        .map(|(depth, _, msgno)| (depth, msgno))
        .collect()
}

#[test]
fn test_update_is_idempotent() {
    let (_neomutt, _backend, mut view) = open_view(&corpus(), threads(), 0);
    view.update().unwrap();
    let (v2r, shape) = (view.v2r().to_vec(), topology(&view));
    view.update().unwrap();
    assert_eq!(view.v2r(), v2r.as_slice());
    assert_eq!(topology(&view), shape);
}

#[test]
fn test_collapse_round_trip() {
    let (_neomutt, _backend, mut view) = open_view(&corpus(), threads(), 0);
    let before: Vec<Option<usize>> = {
        let m = view.mailbox().borrow();
        m.emails().map(|(_, e)| e.vnum).collect()
    };
    view.collapse_all(true).unwrap();
    assert!(view.vcount() < before.len());
    view.collapse_all(false).unwrap();
    let m = view.mailbox().borrow();
    let after: Vec<Option<usize>> = m.emails().map(|(_, e)| e.vnum).collect();
    assert_eq!(after, before);
}

#[test]
fn test_sort_is_stable() {
    for settings in [
        threads(),
        ThreadingSettings::default(),
        ThreadingSettings {
            sort: "from".parse().unwrap(),
            ..ThreadingSettings::default()
        },
    ] {
        let (_neomutt, _backend, mut view) = open_view(&corpus(), settings, 0);
        let first = view_ids(&view);
        view.sort_headers(false).unwrap();
        assert_eq!(view_ids(&view), first);
        view.sort_headers(true).unwrap();
        assert_eq!(view_ids(&view), first);
    }
}

#[test]
fn test_negation() {
    let mut m = mailbox(&corpus());
    let ctx = thread(&mut m, &threads());
    let cctx = CompileContext::new(CompileFlags::empty()).with_mailbox(&m, None);
    let pctx = PatternContext::new(&m).with_threads(&ctx);
    for p in [
        "~f alice",
        "~s plan ~f bob",
        "~s lunch | ~U",
        "~(~f carol)",
        "~<(~f alice)",
        "~>(~s plan)",
        "~m 2-4",
        "~z <100",
        "~$",
        "~x missing",
        "~A",
    ] {
        let pos = compile(p, &cctx).unwrap();
        let neg = compile(&format!("!({p})"), &cctx).unwrap();
        for (msgno, _) in m.emails() {
            assert_ne!(
                pos.exec(&pctx, msgno, &mut PatternCache::new()).unwrap(),
                neg.exec(&pctx, msgno, &mut PatternCache::new()).unwrap(),
                "{p} on message {msgno}"
            );
        }
    }
}

#[test]
fn test_reference_cycle() {
    let mut m: Mailbox = mailbox(&[
        Msg::new("A", "loop", 1).reply_to("C"),
        Msg::new("B", "loop", 2).reply_to("A"),
        Msg::new("C", "loop", 3).reply_to("B"),
    ]);
    let settings = threads();
    let ctx: ThreadContext = thread(&mut m, &settings);
    assert_eq!(ctx.roots().count(), 1);
    let mut order = ids(&m, &ctx.linear_order(&settings));
    assert_eq!(order.len(), 3);
    order.sort();
    assert_eq!(order, vec!["A", "B", "C"]);

    let root = ctx.tree().unwrap();
    assert_eq!(ctx.subtree(root).count(), 3);
}
