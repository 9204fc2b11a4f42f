/*
 * mailcore - address module
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

//! Mail addresses and address lists.
//!
//! A list is flat: a group shows up as a marker [`Address`] with `group` set
//! and the group name in `mailbox`, followed by its members and a terminator
//! without a mailbox.

use std::{borrow::Cow, fmt};

use smallvec::SmallVec;

pub type AddressList = SmallVec<[Address; 1]>;

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct Address {
    /// Display name.
    #[serde(default)]
    pub personal: Option<String>,
    /// `user@domain`, or the group name of a group marker.
    #[serde(default)]
    pub mailbox: Option<String>,
    #[serde(default)]
    pub group: bool,
    #[serde(skip)]
    pub intl_checked: bool,
    #[serde(skip)]
    pub is_intl: bool,
}

impl Address {
    pub fn new(personal: Option<&str>, mailbox: &str) -> Self {
        Self {
            personal: personal.map(str::to_string),
            mailbox: Some(mailbox.to_string()),
            ..Self::default()
        }
    }

    pub fn group_start(name: &str) -> Self {
        Self {
            mailbox: Some(name.to_string()),
            group: true,
            ..Self::default()
        }
    }

    pub fn group_end() -> Self {
        Self::default()
    }

    pub fn is_intl(&self) -> bool {
        self.intl_checked && self.is_intl
    }

    pub fn is_local(&self) -> bool {
        self.intl_checked && !self.is_intl
    }

    /// The domain part of the mailbox, if there is one.
    pub fn domain(&self) -> Option<&str> {
        mailbox_to_udomain(self.mailbox.as_deref()?).map(|(_, d)| d)
    }

    /// Convert the domain to its ASCII form.
    ///
    /// Returns `false` if the domain is not a valid internationalized domain
    /// name. Addresses without a domain are left alone.
    pub fn to_intl(&mut self) -> bool {
        if self.group || self.is_intl() {
            return true;
        }
        let Some((user, domain)) = self.mailbox.as_deref().and_then(mailbox_to_udomain) else {
            return true;
        };
        match idna::domain_to_ascii_strict(domain) {
            Ok(ascii) => {
                self.mailbox = Some(format!("{}@{}", user, ascii));
                self.intl_checked = true;
                self.is_intl = true;
                true
            }
            Err(err) => {
                log::debug!("could not convert {:?} to ASCII: {:?}", domain, err);
                false
            }
        }
    }

    /// Convert an ASCII-encoded domain back to Unicode. Conversion errors
    /// leave the mailbox unchanged.
    pub fn to_local(&mut self) {
        if self.group || self.is_local() {
            return;
        }
        let Some((user, domain)) = self.mailbox.as_deref().and_then(mailbox_to_udomain) else {
            return;
        };
        let (local, res) = idna::domain_to_unicode(domain);
        if res.is_ok() {
            self.mailbox = Some(format!("{}@{}", user, local));
        }
        self.intl_checked = true;
        self.is_intl = false;
    }

    /// The mailbox as it should be shown to the user.
    pub fn for_display(&self) -> Cow<'_, str> {
        let Some(mailbox) = self.mailbox.as_deref() else {
            return Cow::Borrowed("");
        };
        if self.is_local() {
            return Cow::Borrowed(mailbox);
        }
        match mailbox_to_udomain(mailbox) {
            Some((user, domain)) if domain.contains("xn--") => {
                let (local, res) = idna::domain_to_unicode(domain);
                if res.is_ok() {
                    Cow::Owned(format!("{}@{}", user, local))
                } else {
                    Cow::Borrowed(mailbox)
                }
            }
            _ => Cow::Borrowed(mailbox),
        }
    }

    /// The best name for display: the personal name, else the mailbox.
    pub fn get_name(&self) -> Cow<'_, str> {
        match self.personal.as_deref() {
            Some(p) if !p.is_empty() => Cow::Borrowed(p),
            _ => self.for_display(),
        }
    }

    /// Case-insensitive mailbox equality.
    pub fn mailbox_eq(&self, other: &Self) -> bool {
        match (self.mailbox.as_deref(), other.mailbox.as_deref()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }
}

/// Split `user@domain`.
pub fn mailbox_to_udomain(mailbox: &str) -> Option<(&str, &str)> {
    let (user, domain) = mailbox.split_once('@')?;
    if domain.is_empty() {
        return None;
    }
    Some((user, domain))
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.mailbox == other.mailbox && self.personal == other.personal
    }
}

impl Eq for Address {}

impl fmt::Display for Address {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match (self.group, self.personal.as_deref(), self.mailbox.as_deref()) {
            (true, _, Some(name)) => write!(fmt, "{}:", name),
            (_, _, None) => write!(fmt, ";"),
            (false, Some(p), Some(_)) if !p.is_empty() => {
                if p.contains(|c: char| ",.:;<>@[]\\\"()".contains(c)) {
                    write!(
                        fmt,
                        "\"{}\" <{}>",
                        p.replace('\\', "\\\\").replace('"', "\\\""),
                        self.for_display()
                    )
                } else {
                    write!(fmt, "{} <{}>", p, self.for_display())
                }
            }
            (false, _, Some(_)) => write!(fmt, "{}", self.for_display()),
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, fmt)
    }
}

/// Convert every address of `list` to its ASCII form.
///
/// On failure the remaining addresses are still converted and the first
/// mailbox that failed is returned.
pub fn addrlist_to_intl(list: &mut [Address]) -> Result<(), String> {
    let mut first_err = None;
    for addr in list.iter_mut() {
        if !addr.to_intl() && first_err.is_none() {
            first_err = addr.mailbox.clone();
        }
    }
    match first_err {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

pub fn addrlist_to_local(list: &mut [Address]) {
    for addr in list.iter_mut() {
        addr.to_local();
    }
}

/// Number of real recipients, not counting group markers.
pub fn addrlist_has_recips(list: &[Address]) -> usize {
    list.iter()
        .filter(|a| a.mailbox.is_some() && !a.group)
        .count()
}

/// Strict equality: same length, same mailboxes and personal names in the
/// same order.
pub fn addrlist_equal(a: &[Address], b: &[Address]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

/// Does `list` contain an address with the same mailbox as `addr`?
pub fn addrlist_search(addr: &Address, list: &[Address]) -> bool {
    list.iter().any(|a| a.mailbox_eq(addr))
}

pub fn addrlist_to_string(list: &[Address]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(list.len());
    let mut group: Option<(String, Vec<String>)> = None;
    for a in list {
        if a.group {
            group = Some((a.mailbox.clone().unwrap_or_default(), vec![]));
        } else if a.mailbox.is_none() {
            if let Some((name, members)) = group.take() {
                parts.push(format!("{}: {};", name, members.join(", ")));
            }
        } else if let Some((_, members)) = group.as_mut() {
            members.push(a.to_string());
        } else {
            parts.push(a.to_string());
        }
    }
    if let Some((name, members)) = group.take() {
        parts.push(format!("{}: {};", name, members.join(", ")));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        assert_eq!(
            Address::new(Some("Alice"), "alice@example.com").to_string(),
            "Alice <alice@example.com>"
        );
        assert_eq!(
            Address::new(Some("Doe, John"), "jd@example.com").to_string(),
            "\"Doe, John\" <jd@example.com>"
        );
        assert_eq!(Address::new(None, "bob@example.com").to_string(), "bob@example.com");
    }

    #[test]
    fn test_address_intl() {
        let mut list: AddressList = smallvec::smallvec![
            Address::new(None, "user@bücher.example"),
            Address::new(None, "user@exa mple.com"),
            Address::new(None, "plain@example.com"),
        ];
        assert_eq!(
            addrlist_to_intl(&mut list),
            Err("user@exa mple.com".to_string())
        );
        assert_eq!(
            list[0].mailbox.as_deref(),
            Some("user@xn--bcher-kva.example")
        );
        assert!(list[0].is_intl());
        assert_eq!(list[0].for_display(), "user@bücher.example");
        addrlist_to_local(&mut list);
        assert_eq!(list[0].mailbox.as_deref(), Some("user@bücher.example"));
        assert!(list[0].is_local());
    }

    #[test]
    fn test_addrlist_helpers() {
        let list = vec![
            Address::group_start("team"),
            Address::new(None, "a@example.com"),
            Address::new(Some("B"), "b@example.com"),
            Address::group_end(),
        ];
        assert_eq!(addrlist_has_recips(&list), 2);
        assert!(addrlist_search(&Address::new(None, "A@EXAMPLE.COM"), &list));
        assert!(!addrlist_search(&Address::new(None, "c@example.com"), &list));
        assert!(addrlist_equal(&list, &list.clone()));
        assert!(!addrlist_equal(&list, &list[1..]));
        assert_eq!(
            addrlist_to_string(&list),
            "team: a@example.com, B <b@example.com>;"
        );
    }
}
