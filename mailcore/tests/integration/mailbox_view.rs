//
// mailcore - mailbox views
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

use std::{cell::RefCell, rc::Rc};

use chrono::{Duration, Utc};
use mailcore::{
    mailbox_check, pattern::ExecFlags, ErrorKind, Event, EventKind, MailboxEvent, MviewEvent,
    NotifyType, ObserverReturn, RawMessage, ThreadingSettings,
};

use crate::{open_view, threads, view_ids, Msg};

fn days_ago(n: i64) -> String {
    (Utc::now() - Duration::days(n)).to_rfc2822()
}

#[test]
fn test_limit_and_relinearise() {
    let dates: Vec<String> = [2, 1, 30, 3, 0].iter().map(|n| days_ago(*n)).collect();
    let msgs = [
        Msg::new("1", "lunch", 1)
            .sender("alice@example.com")
            .date(dates[0].clone()),
        Msg::new("2", "report", 1)
            .sender("bob@example.com")
            .date(dates[1].clone()),
        Msg::new("3", "old news", 1)
            .sender("alice@example.com")
            .date(dates[2].clone()),
        Msg::new("4", "minutes", 1)
            .sender("Alice <alice@example.net>")
            .date(dates[3].clone()),
        Msg::new("5", "hello", 1)
            .sender("carol@example.com")
            .date(dates[4].clone()),
    ];
    let (_neomutt, _backend, mut view) = open_view(&msgs, threads(), 3);
    let forest = |view: &mailcore::MailboxView| view.threads.linearize(false).collect::<Vec<_>>();
    let before = forest(&view);
    assert_eq!(view.vcount(), 5);

    assert_eq!(view.limit("~f alice & ~d <1w", None).unwrap(), 2);
    assert_eq!(view.vcount(), 2);
    assert!(view.is_limited());
    let mut shown = view_ids(&view);
    shown.sort();
    assert_eq!(shown, vec!["1", "4"]);

    let m = view.mailbox().borrow();
    let expected: usize = view
        .v2r()
        .iter()
        .map(|&msgno| m.email(msgno).unwrap().stored_size() + 3)
        .sum();
    assert_eq!(view.vsize(), expected);
    for (vnum, &msgno) in view.v2r().iter().enumerate() {
        assert_eq!(m.email(msgno).unwrap().vnum, Some(vnum));
    }
    assert_eq!(m.vcount, 2);
    drop(m);

    assert_eq!(forest(&view), before);
}

#[test]
fn test_incremental_add_through_view() {
    let owned: Vec<(String, String)> = (1..=10)
        .map(|n| (format!("m{n}"), format!("topic {n}")))
        .collect();
    let msgs: Vec<Msg<'_>> = owned
        .iter()
        .enumerate()
        .map(|(i, (id, subject))| Msg::new(id, subject, i as u32 + 1))
        .collect();
    let (_neomutt, backend, mut view) = open_view(&msgs, threads(), 0);
    let before: Vec<_> = {
        let m = view.mailbox().borrow();
        m.emails().map(|(_, e)| e.thread.unwrap()).collect()
    };

    backend.deliver(RawMessage::new(
        Msg::new("m11", "Re: topic 5", 11).reply_to("m5").raw(),
    ));
    mailbox_check(view.mailbox()).unwrap();
    view.process_events().unwrap();

    let m = view.mailbox().borrow();
    assert_eq!(m.msg_count(), 11);
    for (msgno, id) in before.iter().enumerate() {
        assert_eq!(m.email(msgno).unwrap().thread, Some(*id));
    }
    let new = m.email(10).unwrap();
    assert!(new.threaded);
    assert_eq!(view.threads[new.thread.unwrap()].parent, Some(before[4]));
    drop(m);

    assert_eq!(view.vcount(), 11);
    let shown = view_ids(&view);
    let at = shown.iter().position(|id| id == "m5").unwrap();
    assert_eq!(shown[at + 1], "m11");
}

#[test]
fn test_view_events_reach_root() {
    let neomutt_events: Rc<RefCell<Vec<EventKind>>> = Rc::default();
    let msgs = [Msg::new("a", "one", 1), Msg::new("b", "two", 2)];
    let (neomutt, _backend, view) = open_view(&msgs, ThreadingSettings::default(), 0);
    let seen = neomutt_events.clone();
    neomutt.notify.observer_add(
        NotifyType::MailboxView,
        Rc::new(move |event: &Event| {
            seen.borrow_mut().push(event.kind);
            ObserverReturn::Continue
        }),
    );
    mailcore::mailbox_changed(view.mailbox(), MailboxEvent::Resort);
    drop(view);
    assert_eq!(
        *neomutt_events.borrow(),
        vec![EventKind::MailboxView(MviewEvent::Delete)]
    );
}

#[test]
fn test_config_changes_apply_on_resort() {
    let msgs = [
        Msg::new("a", "one", 1),
        Msg::new("b", "two", 2),
        Msg::new("c", "three", 3),
    ];
    let (neomutt, _backend, mut view) = open_view(&msgs, ThreadingSettings::default(), 0);
    assert_eq!(view_ids(&view), vec!["a", "b", "c"]);
    neomutt.parse_line("set sort=reverse-date").unwrap();
    view.sort_headers(true).unwrap();
    assert_eq!(view_ids(&view), vec!["c", "b", "a"]);
    neomutt.parse_line("reset sort").unwrap();
    view.sort_headers(true).unwrap();
    assert_eq!(view_ids(&view), vec!["a", "b", "c"]);
}

#[test]
fn test_scoring_through_view() {
    let msgs = [
        Msg::new("a", "lunch", 1).sender("alice@example.com"),
        Msg::new("b", "urgent", 2).sender("boss@example.com"),
        Msg::new("c", "hello", 3).sender("carol@example.com"),
    ];
    let (neomutt, _backend, mut view) = open_view(&msgs, ThreadingSettings::default(), 0);
    neomutt.parse_line("score '~f alice' 10").unwrap();
    neomutt.parse_line("score '~f boss' 9999").unwrap();
    view.update().unwrap();

    let m = view.mailbox().borrow();
    assert_eq!(m.email(0).unwrap().score, 10);
    assert_eq!(m.email(1).unwrap().score, 9999);
    assert_eq!(m.email(2).unwrap().score, 0);
    assert!(m.email(1).unwrap().is_flagged());
    assert_eq!(m.msg_flagged, 1);
    drop(m);

    assert_eq!(view.limit("~n 5-", None).unwrap(), 2);
    assert_eq!(view_ids(&view), vec!["a", "b"]);
}

#[test]
fn test_delivered_mail_respects_limit() {
    let msgs = [
        Msg::new("a", "lunch", 1).sender("alice@example.com"),
        Msg::new("b", "report", 2).sender("bob@example.com"),
    ];
    let (_neomutt, backend, mut view) = open_view(&msgs, ThreadingSettings::default(), 0);
    view.limit("~f alice", None).unwrap();
    assert_eq!(view_ids(&view), vec!["a"]);

    for (id, from) in [("c", "alice@example.com"), ("d", "dave@example.com")] {
        backend.deliver(RawMessage::new(
            Msg::new(id, "more", 3).sender(from).raw(),
        ));
    }
    mailbox_check(view.mailbox()).unwrap();
    view.process_events().unwrap();
    assert_eq!(view_ids(&view), vec!["a", "c"]);
    assert_eq!(view.mailbox().borrow().msg_count(), 4);
}

#[test]
fn test_limit_with_unreadable_message() {
    let msgs = [
        Msg::new("a", "plans", 1).body("the launch is on friday"),
        Msg::new("b", "food", 2).body("lunch?"),
        Msg::new("c", "plans", 3).body("launch moved"),
    ];
    let (_neomutt, backend, mut view) = open_view(&msgs, ThreadingSettings::default(), 0);
    assert_eq!(view.limit("~b launch", None).unwrap(), 2);
    assert_eq!(view_ids(&view), vec!["a", "c"]);

    assert!(backend.lose_message(&view.mailbox().borrow(), 0));

    // a read error aborts and the previous limit stays
    let err = view.limit("~b friday", None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Io);
    assert_eq!(view.vcount(), 2);
    assert_eq!(view.v2r(), &[0, 2]);
    assert_eq!(view_ids(&view), vec!["a", "c"]);
    assert!(view.is_limited());

    view.exec_flags |= ExecFlags::BEST_EFFORT;
    assert_eq!(view.limit("~b launch", None).unwrap(), 1);
    assert_eq!(view_ids(&view), vec!["c"]);
    // the unreadable message matches neither a pattern nor its negation
    assert_eq!(view.limit("!~b launch", None).unwrap(), 1);
    assert_eq!(view_ids(&view), vec!["b"]);
    // leaves that do not read the message are unaffected
    assert_eq!(view.limit("~s plans", None).unwrap(), 2);
    assert_eq!(view_ids(&view), vec!["a", "c"]);
}
