/*
 * mailcore - sort module
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

//! Comparators for flat (unthreaded) sorting.

use std::cmp::Ordering;

use super::Email;
use crate::conf::{Sort, SortMethod};

/// `fn(a, b, reverse)`
pub type SortFn = fn(&Email, &Email, bool) -> Ordering;

fn apply_reverse(ord: Ordering, reverse: bool) -> Ordering {
    if reverse {
        ord.reverse()
    } else {
        ord
    }
}

/// Case-insensitive string comparison.
pub fn istr_cmp(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Highest score first.
pub fn compare_score(a: &Email, b: &Email, reverse: bool) -> Ordering {
    apply_reverse(b.score.cmp(&a.score), reverse)
}

pub fn compare_size(a: &Email, b: &Email, reverse: bool) -> Ordering {
    apply_reverse(a.body.length.cmp(&b.body.length), reverse)
}

pub fn compare_date_sent(a: &Email, b: &Email, reverse: bool) -> Ordering {
    apply_reverse(a.env.date.cmp(&b.env.date), reverse)
}

/// Messages without a subject sort first, by date among themselves.
pub fn compare_subject(a: &Email, b: &Email, reverse: bool) -> Ordering {
    let ord = match (a.env.real_subj(), b.env.real_subj()) {
        (None, None) => compare_date_sent(a, b, false),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => istr_cmp(x, y),
    };
    apply_reverse(ord, reverse)
}

fn first_name(list: &[super::Address]) -> String {
    list.first()
        .map(|a| a.get_name().chars().take(127).collect())
        .unwrap_or_default()
}

pub fn compare_from(a: &Email, b: &Email, reverse: bool) -> Ordering {
    apply_reverse(
        istr_cmp(&first_name(&a.env.from), &first_name(&b.env.from)),
        reverse,
    )
}

pub fn compare_to(a: &Email, b: &Email, reverse: bool) -> Ordering {
    apply_reverse(
        istr_cmp(&first_name(&a.env.to), &first_name(&b.env.to)),
        reverse,
    )
}

pub fn compare_date_received(a: &Email, b: &Email, reverse: bool) -> Ordering {
    apply_reverse(a.received.cmp(&b.received), reverse)
}

/// Mailbox order.
pub fn compare_order(a: &Email, b: &Email, reverse: bool) -> Ordering {
    apply_reverse(a.msgno.cmp(&b.msgno), reverse)
}

/// Split a leading decimal number off `s`.
fn leading_number(s: &str) -> (Option<f64>, &str) {
    let s_trim = s.trim_start();
    let mut end = 0;
    for (i, c) in s_trim.char_indices() {
        let ok = c.is_ascii_digit()
            || c == '.'
            || ((c == '-' || c == '+') && i == 0)
            || ((c == 'e' || c == 'E') && i > 0);
        if !ok {
            break;
        }
        end = i + c.len_utf8();
    }
    while end > 0 {
        if let Ok(v) = s_trim[..end].parse::<f64>() {
            return (Some(v), &s_trim[end..]);
        }
        end -= 1;
    }
    (None, s)
}

/// Messages with a spam attribute sort after those without; attributes
/// compare numerically, then by their remaining text.
pub fn compare_spam(a: &Email, b: &Email, reverse: bool) -> Ordering {
    let a_spam = a.env.spam.as_deref().filter(|s| !s.is_empty());
    let b_spam = b.env.spam.as_deref().filter(|s| !s.is_empty());
    let (a_spam, b_spam) = match (a_spam, b_spam) {
        (Some(_), None) => return apply_reverse(Ordering::Greater, reverse),
        (None, Some(_)) => return apply_reverse(Ordering::Less, reverse),
        (None, None) => return Ordering::Equal,
        (Some(x), Some(y)) => (x, y),
    };
    let ord = match (leading_number(a_spam), leading_number(b_spam)) {
        ((Some(x), a_rest), (Some(y), b_rest)) => x
            .partial_cmp(&y)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a_rest.cmp(b_rest)),
        ((_, a_rest), (_, b_rest)) => a_rest.cmp(b_rest),
    };
    apply_reverse(ord, reverse)
}

/// Labelled messages sort first.
pub fn compare_label(a: &Email, b: &Email, reverse: bool) -> Ordering {
    let a_label = a.env.x_label.as_deref().filter(|s| !s.is_empty());
    let b_label = b.env.x_label.as_deref().filter(|s| !s.is_empty());
    match (a_label, b_label) {
        (Some(_), None) => apply_reverse(Ordering::Less, reverse),
        (None, Some(_)) => apply_reverse(Ordering::Greater, reverse),
        (None, None) => Ordering::Equal,
        (Some(x), Some(y)) => apply_reverse(istr_cmp(x, y), reverse),
    }
}

/// The comparator for `method`. `threads` has none of its own.
pub fn sort_func(method: SortMethod) -> Option<SortFn> {
    let f: SortFn = match method {
        SortMethod::Date => compare_date_sent,
        SortMethod::DateReceived => compare_date_received,
        SortMethod::Subject => compare_subject,
        SortMethod::From => compare_from,
        SortMethod::To => compare_to,
        SortMethod::Score => compare_score,
        SortMethod::Size => compare_size,
        SortMethod::Spam => compare_spam,
        SortMethod::Label => compare_label,
        SortMethod::Unsorted => compare_order,
        SortMethod::Threads => return None,
    };
    Some(f)
}

/// Compare with a single sort setting.
pub fn compare_by(a: &Email, b: &Email, sort: Sort) -> Ordering {
    sort_func(sort.method)
        .map(|f| f(a, b, sort.reverse))
        .unwrap_or(Ordering::Equal)
}

/// Compare by `sort`, then `sort_aux`, then mailbox order.
pub fn compare_emails(a: &Email, b: &Email, sort: Sort, sort_aux: Sort) -> Ordering {
    compare_by(a, b, sort)
        .then_with(|| compare_by(a, b, sort_aux))
        .then_with(|| compare_order(a, b, false))
}
