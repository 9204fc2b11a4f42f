/*
 * mview - index listing
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

//! Plain text rendering of a [`MailboxView`], one line per visible message.

use std::io::Write;

use mailcore::{
    error::Result,
    thread::tree_to_string,
    utils::datetime::timestamp_to_string,
    Email, Globals, MailboxView, SecurityFlags, ThreadingSettings,
};

use crate::conf::IndexSettings;

/// Sizes the way the index shows them: bytes, then tenths of a kilobyte,
/// then kilobytes and megabytes.
pub fn pretty_size(num: usize) -> String {
    const KIB: usize = 1024;
    if num < 1000 {
        num.to_string()
    } else if num < 10 * KIB {
        format!("{:.1}K", num as f64 / KIB as f64)
    } else if num < 1000 * KIB {
        format!("{}K", (num + KIB / 2) / KIB)
    } else {
        format!("{:.1}M", num as f64 / (KIB * KIB) as f64)
    }
}

/// Status, security and flag columns.
fn flags(e: &Email) -> String {
    let status = if e.is_deleted() {
        'D'
    } else if e.is_replied() {
        'r'
    } else if e.is_new() {
        'N'
    } else if !e.is_read() {
        'O'
    } else {
        ' '
    };
    let security = if e.security.contains(SecurityFlags::GOODSIGN) {
        'S'
    } else if e.security.contains(SecurityFlags::ENCRYPT) {
        'P'
    } else if e.security.contains(SecurityFlags::SIGN) {
        's'
    } else if e.security.contains(SecurityFlags::KEYBLOCK) {
        'K'
    } else {
        ' '
    };
    let flag = if e.is_tagged() {
        '*'
    } else if e.is_flagged() {
        '!'
    } else {
        ' '
    };
    [status, security, flag].iter().collect()
}

/// The author column: the sender's name, or the first recipient's when the
/// message is from the user.
fn author(e: &Email, globals: &Globals, settings: &ThreadingSettings) -> String {
    let Some(from) = e.env.from.first() else {
        return String::new();
    };
    if globals.addr_is_user(from, settings.from.as_deref()) {
        if let Some(to) = e.env.to.first() {
            return format!("To {}", to.get_name());
        }
    }
    from.get_name().into_owned()
}

fn truncate(s: &str, width: usize) -> String {
    format!("{:<width$.width$}", s, width = width)
}

/// One line of the index.
pub fn index_line(
    view: &MailboxView,
    vnum: usize,
    conf: &IndexSettings,
    settings: &ThreadingSettings,
) -> Option<String> {
    let msgno = view.msgno_at(vnum)?;
    let m = view.mailbox().borrow();
    let e = m.email(msgno)?;
    let globals = view.globals().borrow();

    let mut subject = String::new();
    if settings.using_threads() {
        subject.push_str(&tree_to_string(&e.tree, conf.ascii));
    }
    if !settings.using_threads() || e.display_subject || !settings.hide_thread_subject {
        subject.push_str(e.env.subject().unwrap_or_default());
    }
    let size = if e.collapsed && e.num_hidden > 1 {
        format!("{:>4}", e.num_hidden)
    } else {
        format!("{:>4}", pretty_size(e.stored_size()))
    };
    Some(format!(
        "{:>4} {} {} {} ({}) {}",
        vnum + 1,
        flags(e),
        timestamp_to_string(e.env.date, Some(&conf.date_format)),
        truncate(&author(e, &globals, settings), conf.from_width),
        size,
        subject
    ))
}

/// Write every visible message of `view`.
pub fn print_index<W: Write>(view: &MailboxView, conf: &IndexSettings, out: &mut W) -> Result<()> {
    let settings = view.settings();
    for vnum in 0..view.vcount() {
        if let Some(line) = index_line(view, vnum, conf, &settings) {
            writeln!(out, "{}", line)?;
        }
    }
    Ok(())
}

/// `-*- name [Msgs:shown/total New:n Flag:n Del:n] (size) -*-`
pub fn status_line(view: &MailboxView) -> String {
    let m = view.mailbox().borrow();
    let mut counts = "Msgs:".to_string();
    if view.is_limited() {
        counts.push_str(&format!("{}/", view.vcount()));
    }
    counts.push_str(&m.msg_count().to_string());
    for (label, n) in [
        ("New", m.msg_new),
        ("Old", m.msg_unread.saturating_sub(m.msg_new)),
        ("Flag", m.msg_flagged),
        ("Del", m.msg_deleted),
        ("Tag", m.msg_tagged),
    ] {
        if n > 0 {
            counts.push_str(&format!(" {}:{}", label, n));
        }
    }
    format!(
        "-*- {} [{}] ({}) -*-",
        m.name,
        counts,
        pretty_size(view.vsize())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_size() {
        assert_eq!(pretty_size(0), "0");
        assert_eq!(pretty_size(999), "999");
        assert_eq!(pretty_size(1024), "1.0K");
        assert_eq!(pretty_size(5 * 1024 + 512), "5.5K");
        assert_eq!(pretty_size(100 * 1024), "100K");
        assert_eq!(pretty_size(3 * 1024 * 1024), "3.0M");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("alice", 8), "alice   ");
        assert_eq!(truncate("alice@example.com", 5), "alice");
    }
}
