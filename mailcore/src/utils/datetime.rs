/*
 * mailcore - datetime module
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

//! Functions for dealing with date strings and UNIX Epoch timestamps.
//!
//! # Examples
//!
//! ```rust
//! # use mailcore::utils::datetime::*;
//! // Parse date from string
//! let date_val = "Wed, 8 Jan 2020 10:44:03 -0800";
//! let timestamp = rfc822_to_timestamp(date_val).unwrap();
//! assert_eq!(timestamp, 1578509043);
//!
//! // Convert timestamp back to string
//! let s = timestamp_to_string_utc(timestamp, Some("%Y-%m-%d"));
//! assert_eq!(s, "2020-01-08");
//! ```

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::error::{Error, ErrorKind, Result};

pub type UnixTimestamp = u64;

pub mod formats {
    /// `<date>`T`<time>`
    pub const RFC3339_DATETIME: &str = "%Y-%m-%dT%H:%M:%S";
    /// `<date>` `<time>`
    pub const RFC3339_DATETIME_AND_SPACE: &str = "%Y-%m-%d %H:%M:%S";

    pub const RFC3339_DATE: &str = "%Y-%m-%d";

    pub const RFC822_DATE: &str = "%a, %d %b %Y %H:%M:%S %z";
    pub const DEFAULT_FMT: &str = "%a, %d %b %Y %R";
}

fn to_utc(timestamp: UnixTimestamp) -> DateTime<Utc> {
    Utc.timestamp_opt(timestamp as i64, 0)
        .single()
        .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
}

/// Return a UNIX epoch timestamp as string in the local timezone, using `fmt`
/// as the `strftime` style format argument.
pub fn timestamp_to_string(timestamp: UnixTimestamp, fmt: Option<&str>) -> String {
    to_utc(timestamp)
        .with_timezone(&Local)
        .format(fmt.unwrap_or(formats::RFC3339_DATETIME_AND_SPACE))
        .to_string()
}

/// Return a UNIX epoch timestamp as string in the UTC/GMT/+00:00 timezone,
/// using `fmt` as the `strftime` style format argument.
pub fn timestamp_to_string_utc(timestamp: UnixTimestamp, fmt: Option<&str>) -> String {
    to_utc(timestamp)
        .format(fmt.unwrap_or(formats::RFC3339_DATETIME_AND_SPACE))
        .to_string()
}

pub fn rfc822_to_timestamp<T: AsRef<str>>(s: T) -> Result<UnixTimestamp> {
    DateTime::parse_from_rfc2822(s.as_ref().trim())
        .map(|d| d.timestamp().max(0) as UnixTimestamp)
        .map_err(|err| {
            Error::new(format!("Could not parse date `{}`: {}", s.as_ref(), err))
                .set_kind(ErrorKind::Configuration)
        })
}

pub fn rfc3339_to_timestamp<T: AsRef<str>>(s: T) -> Result<UnixTimestamp> {
    DateTime::parse_from_rfc3339(s.as_ref().trim())
        .map(|d| d.timestamp().max(0) as UnixTimestamp)
        .map_err(|err| {
            Error::new(format!("Could not parse date `{}`: {}", s.as_ref(), err))
                .set_kind(ErrorKind::Configuration)
        })
}

/// Parse either an RFC 2822 `Date:` value, an RFC 3339 timestamp or a bare
/// number of seconds since the epoch.
pub fn parse_timestamp_from_string<T: AsRef<str>>(s: T) -> Result<UnixTimestamp> {
    let s = s.as_ref().trim();
    if let Ok(secs) = s.parse::<UnixTimestamp>() {
        return Ok(secs);
    }
    rfc822_to_timestamp(s).or_else(|_| rfc3339_to_timestamp(s))
}

pub fn now() -> UnixTimestamp {
    Utc::now().timestamp().max(0) as UnixTimestamp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_parse_formats() {
        assert_eq!(
            rfc822_to_timestamp("Wed, 8 Jan 2020 10:44:03 -0800").unwrap(),
            1578509043
        );
        assert_eq!(
            rfc3339_to_timestamp("2020-01-08T18:44:03Z").unwrap(),
            1578509043
        );
        assert_eq!(parse_timestamp_from_string("1578509043").unwrap(), 1578509043);
        assert!(parse_timestamp_from_string("not a date").is_err());
    }

    #[test]
    fn test_datetime_to_string_utc() {
        assert_eq!(
            timestamp_to_string_utc(1578509043, Some(formats::RFC3339_DATE)),
            "2020-01-08"
        );
        assert_eq!(
            timestamp_to_string_utc(0, None),
            "1970-01-01 00:00:00"
        );
    }
}
