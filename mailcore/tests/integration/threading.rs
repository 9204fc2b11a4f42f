//
// mailcore - threading scenarios
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

use mailcore::{thread::tree_to_string, ThreadingSettings, UseThreads};

use crate::{ids, mailbox, thread, threads, Msg};

#[test]
fn test_basic_threading() {
    let mut m = mailbox(&[
        Msg::new("m1", "plan", 1),
        Msg::new("m2", "Re: plan", 2).reply_to("m1"),
        Msg::new("m3", "Re: plan", 3).reply_to("m2"),
    ]);
    let settings = threads();
    let ctx = thread(&mut m, &settings);

    let root = ctx.tree().unwrap();
    assert!(ctx[root].next.is_none());
    assert_eq!(ctx[root].message(), Some(0));
    let m2 = ctx[root].child.unwrap();
    assert_eq!(ctx[m2].message(), Some(1));
    let m3 = ctx[m2].child.unwrap();
    assert_eq!(ctx[m3].message(), Some(2));
    assert!(ctx[m3].child.is_none());

    let depths: Vec<usize> = ctx.linearize(false).map(|(depth, _, _)| depth).collect();
    assert_eq!(depths, vec![0, 1, 2]);
    assert_eq!(ids(&m, &ctx.linear_order(&settings)), vec!["m1", "m2", "m3"]);

    // reverse flips the roots, not the messages inside a thread
    let reverse = ThreadingSettings {
        use_threads: UseThreads::Reverse,
        ..settings
    };
    assert_eq!(ids(&m, &ctx.linear_order(&reverse)), vec!["m1", "m2", "m3"]);

    for (msgno, e) in m.emails() {
        let t = e.thread.unwrap();
        assert_eq!(ctx[t].message(), Some(msgno));
        assert!(e.threaded);
    }
}

#[test]
fn test_reverse_threads() {
    let mut m = mailbox(&[
        Msg::new("a", "one", 1),
        Msg::new("b", "two", 2),
        Msg::new("c", "Re: one", 3).reply_to("a"),
    ]);
    let settings = ThreadingSettings {
        use_threads: UseThreads::Reverse,
        ..ThreadingSettings::default()
    };
    let ctx = thread(&mut m, &settings);
    assert_eq!(ids(&m, &ctx.linear_order(&settings)), vec!["b", "a", "c"]);
}

#[test]
fn test_missing_middle() {
    let mut m = mailbox(&[
        Msg::new("a", "plan", 1),
        Msg::new("c", "Re: plan", 3).references(&["a", "b"]),
    ]);
    let settings = threads();
    let ctx = thread(&mut m, &settings);

    let a = m.email(0).unwrap().thread.unwrap();
    let b = ctx[a].child.unwrap();
    assert!(ctx[b].is_phantom());
    assert_eq!(ctx.find("<b>"), &[b]);
    let c = ctx[b].child.unwrap();
    assert_eq!(ctx[c].message(), Some(1));
    assert_eq!(ctx[c].parent, Some(b));

    assert!(settings.hide_missing);
    assert_eq!(ids(&m, &ctx.linear_order(&settings)), vec!["a", "c"]);
    let depths: Vec<usize> = ctx.linearize(false).map(|(depth, _, _)| depth).collect();
    assert_eq!(depths, vec![0, 2]);
}

#[test]
fn test_missing_middle_tree() {
    let msgs = [
        Msg::new("a", "plan", 1),
        Msg::new("c", "Re: plan", 3).references(&["a", "b"]),
    ];
    let mut shown = vec![];
    for hide_missing in [true, false] {
        let mut m = mailbox(&msgs);
        for e in m.emails_mut() {
            e.vnum = Some(e.msgno);
        }
        let settings = ThreadingSettings {
            hide_missing,
            ..threads()
        };
        thread(&mut m, &settings);
        shown.push(tree_to_string(&m.email(1).unwrap().tree, true));
    }
    // the placeholder takes a level only when it is drawn
    assert_ne!(shown[0], shown[1]);
    assert!(shown[1].len() > shown[0].len());
}

#[test]
fn test_subject_pseudo_threads() {
    let msgs = [
        Msg::new("first", "project", 1),
        Msg::new("second", "Re: project", 2),
    ];

    let mut m = mailbox(&msgs);
    let settings = threads();
    let ctx = thread(&mut m, &settings);
    let first = m.email(0).unwrap().thread.unwrap();
    let second = m.email(1).unwrap().thread.unwrap();
    assert_eq!(ctx[second].parent, Some(first));
    assert!(ctx[second].fake_thread);
    assert_eq!(ctx.roots().count(), 1);

    let mut m = mailbox(&msgs);
    let settings = ThreadingSettings {
        strict_threads: true,
        ..threads()
    };
    let ctx = thread(&mut m, &settings);
    let second = m.email(1).unwrap().thread.unwrap();
    assert!(ctx[second].parent.is_none());
    assert!(!ctx[second].fake_thread);
    assert_eq!(ctx.roots().count(), 2);
}

#[test]
fn test_subject_needs_reply_prefix() {
    // without a stripped prefix the second message is not a reply
    let mut m = mailbox(&[
        Msg::new("first", "project", 1),
        Msg::new("second", "project", 2),
    ]);
    let ctx = thread(&mut m, &threads());
    assert_eq!(ctx.roots().count(), 2);

    let mut m = mailbox(&[
        Msg::new("first", "project", 1),
        Msg::new("second", "project", 2),
    ]);
    let settings = ThreadingSettings {
        sort_re: false,
        ..threads()
    };
    let ctx = thread(&mut m, &settings);
    assert_eq!(ctx.roots().count(), 1);
}

#[test]
fn test_duplicate_message_id() {
    let msgs = [Msg::new("dup", "copy", 1), Msg::new("dup", "copy", 2)];

    let mut m = mailbox(&msgs);
    let settings = threads();
    assert!(settings.duplicate_threads);
    let ctx = thread(&mut m, &settings);
    let first = m.email(0).unwrap().thread.unwrap();
    let second = m.email(1).unwrap().thread.unwrap();
    assert_eq!(ctx[second].parent, Some(first));
    assert!(ctx[second].duplicate_thread);
    assert_eq!(ctx.find("<dup>").len(), 2);

    let mut m = mailbox(&msgs);
    let settings = ThreadingSettings {
        duplicate_threads: false,
        ..threads()
    };
    let ctx = thread(&mut m, &settings);
    let second = m.email(1).unwrap().thread.unwrap();
    assert!(ctx[second].parent.is_none());
    assert!(!ctx[second].duplicate_thread);
    assert_eq!(ctx.roots().count(), 2);
}

#[test]
fn test_incremental_add() {
    let owned: Vec<(String, String)> = (1..=10)
        .map(|n| (format!("m{n}"), format!("topic {n}")))
        .collect();
    let msgs: Vec<Msg<'_>> = owned
        .iter()
        .enumerate()
        .map(|(i, (id, subject))| Msg::new(id, subject, i as u32 + 1))
        .collect();
    let mut m = mailbox(&msgs);
    let settings = threads();
    let mut ctx = thread(&mut m, &settings);

    let before: Vec<_> = m.emails().map(|(_, e)| e.thread.unwrap()).collect();
    let shape = |ctx: &mailcore::thread::ThreadContext| {
        ctx.linearize(false).collect::<Vec<_>>()
    };
    let old_shape = shape(&ctx);

    let reply = Msg::new("m11", "Re: topic 5", 11).reply_to("m5");
    let r = m.insert_email(reply.email());
    ctx.sort(&mut m, &settings, false);

    // nothing that was threaded moved
    for (msgno, id) in before.iter().enumerate() {
        assert_eq!(m.email(msgno).unwrap().thread, Some(*id));
    }
    let new = m.email(r.msgno).unwrap();
    assert!(new.threaded);
    let node = new.thread.unwrap();
    assert_eq!(ctx[node].parent, Some(before[4]));
    assert_eq!(ctx[before[4]].child, Some(node));
    assert!(!ctx[node].fake_thread);

    let new_shape = shape(&ctx);
    assert_eq!(new_shape.len(), old_shape.len() + 1);
    let without_new: Vec<_> = new_shape
        .into_iter()
        .filter(|(_, _, msgno)| *msgno != r.msgno)
        .collect();
    assert_eq!(without_new, old_shape);
}

#[test]
fn test_remove_and_rethread() {
    let mut m = mailbox(&[
        Msg::new("a", "plan", 1),
        Msg::new("b", "Re: plan", 2).reply_to("a"),
        Msg::new("c", "Re: plan", 3).reply_to("b"),
    ]);
    let settings = threads();
    let mut ctx = thread(&mut m, &settings);
    assert!(ctx.remove_message(1));
    m.take_email(1);
    assert_eq!(ids(&m, &ctx.linear_order(&settings)), vec!["a", "c"]);

    // a full rebuild gives the same answer
    let mut again = thread(&mut m, &settings);
    assert_eq!(
        ids(&m, &again.linear_order(&settings)),
        ids(&m, &ctx.linear_order(&settings))
    );
    again.clear(&mut m);
    assert!(again.is_empty());
    assert!(m.emails().all(|(_, e)| e.thread.is_none()));
}
