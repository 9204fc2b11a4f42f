/*
 * mailcore - date range arguments
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

//! Date ranges for `~d` and `~r`.
//!
//! ```text
//! 20240131          one day, ISO form
//! 31/01/2024        one day, dd[/mm[/yy]] form; missing parts are taken from today
//! 01/01-31/01       from the first date to the second
//! 01/01-            from a date until now
//! -01/02            until a date
//! <1w  >2m  =3d     less than, more than, exactly N units ago
//! 15/01*2d  15/01+1w  15/01-1d
//!                   widen a date both ways, forwards or backwards
//! ```
//!
//! Units are `y` years, `m` months, `w` weeks, `d` days, and `H`, `M`, `S`
//! for hours, minutes and seconds. Dates are interpreted in local time.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{digit1, hex_digit1, one_of},
    combinator::{map, opt},
    sequence::{pair, preceded},
};

use crate::{
    error::{Error, ErrorKind, Result},
    utils::datetime::UnixTimestamp,
};

/// Largest offset applied in one step, in days or seconds.
const MAX_STEP: i64 = 1_000_000_000;

/// Parse a C-style integer: optional sign, decimal or `0x` hexadecimal.
/// Returns the input unchanged and `0` if there is no number.
pub(super) fn strtol(input: &str) -> (&str, i64) {
    let trimmed = input.trim_start();
    let res: nom::IResult<&str, (Option<char>, (u32, &str))> = pair(
        opt(one_of("+-")),
        alt((
            map(preceded(tag_no_case("0x"), hex_digit1), |d| (16, d)),
            map(digit1, |d| (10, d)),
        )),
    )(trimmed);
    match res {
        Ok((rest, (sign, (radix, digits)))) => {
            let value = i64::from_str_radix(digits, radix).unwrap_or(i64::MAX);
            (rest, if sign == Some('-') { -value } else { value })
        }
        Err(_) => (input, 0),
    }
}

/// Broken-down local time. Fields may be out of range until normalized.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct Tm {
    year: i64,
    /// 0-11
    mon: i64,
    /// 1-31
    mday: i64,
    hour: i64,
    min: i64,
    sec: i64,
}

impl Tm {
    const fn new(year: i64, mon: i64, mday: i64, hour: i64, min: i64, sec: i64) -> Self {
        Self {
            year,
            mon,
            mday,
            hour,
            min,
            sec,
        }
    }

    fn from_naive(ndt: NaiveDateTime) -> Self {
        Self::new(
            ndt.year().into(),
            ndt.month0().into(),
            ndt.day().into(),
            ndt.hour().into(),
            ndt.minute().into(),
            ndt.second().into(),
        )
    }

    fn from_timestamp(ts: UnixTimestamp) -> Self {
        let ts = i64::try_from(ts).unwrap_or(i64::MAX);
        Self::from_naive(
            Local
                .timestamp_opt(ts, 0)
                .earliest()
                .map(|d| d.naive_local())
                .unwrap_or_default(),
        )
    }

    fn set_hms(&mut self, hour: i64, min: i64, sec: i64) {
        self.hour = hour;
        self.min = min;
        self.sec = sec;
    }

    fn to_naive(self) -> Option<NaiveDateTime> {
        let year = i32::try_from(self.year.checked_add(self.mon.div_euclid(12))?).ok()?;
        let month = u32::try_from(self.mon.rem_euclid(12)).ok()? + 1;
        let date = NaiveDate::from_ymd_opt(year, month, 1)?
            .checked_add_signed(Duration::days((self.mday - 1).clamp(-MAX_STEP, MAX_STEP)))?;
        let secs = self
            .hour
            .saturating_mul(3600)
            .saturating_add(self.min.saturating_mul(60))
            .saturating_add(self.sec)
            .clamp(-MAX_STEP, MAX_STEP);
        date.and_hms_opt(0, 0, 0)?
            .checked_add_signed(Duration::seconds(secs))
    }

    /// Carry out-of-range fields over, the way `mktime` does.
    fn normalize(&mut self) {
        if let Some(ndt) = self.to_naive() {
            *self = Self::from_naive(ndt);
        }
    }

    fn timestamp(self) -> i64 {
        let Some(ndt) = self.to_naive() else {
            return if self.year < 1970 { 0 } else { i64::MAX };
        };
        // a local time skipped by a DST change is moved past the gap
        Local
            .from_local_datetime(&ndt)
            .earliest()
            .or_else(|| {
                Local
                    .from_local_datetime(&(ndt + Duration::hours(1)))
                    .earliest()
            })
            .map_or(0, |d| d.timestamp().max(0))
    }

    fn same_day_as(&mut self, other: &Self) {
        self.year = other.year;
        self.mon = other.mon;
        self.mday = other.mday;
    }
}

fn compile_error(msg: String) -> Error {
    Error::new(msg).set_kind(ErrorKind::PatternCompile)
}

/// Apply an offset such as `3d` to `tm`, forcing the sign of the number
/// to `sign`. Returns the rest of `s`, or `None` if there is no unit.
fn get_offset<'s>(tm: &mut Tm, s: &'s str, sign: i64) -> Option<&'s str> {
    let (rest, mut offset) = strtol(s);
    if (sign < 0 && offset > 0) || (sign > 0 && offset < 0) {
        offset = -offset;
    }
    let unit = rest.chars().next()?;
    match unit {
        'y' => tm.year = tm.year.saturating_add(offset),
        'm' => tm.mon = tm.mon.saturating_add(offset),
        'w' => tm.mday = tm.mday.saturating_add(offset.saturating_mul(7)),
        'd' => tm.mday = tm.mday.saturating_add(offset),
        'H' => tm.hour = tm.hour.saturating_add(offset),
        'M' => tm.min = tm.min.saturating_add(offset),
        'S' => tm.sec = tm.sec.saturating_add(offset),
        _ => return None,
    }
    tm.normalize();
    Some(&rest[1..])
}

/// Parse an absolute date into the date fields of `tm`.
fn get_date<'s>(s: &'s str, tm: &mut Tm, now: &Tm) -> Result<&'s str> {
    if s.len() >= 8 && s.as_bytes()[..8].iter().all(u8::is_ascii_digit) {
        let field = |r: std::ops::Range<usize>| s[r].parse::<i64>().unwrap_or_default();
        tm.year = field(0..4);
        tm.mon = field(4..6) - 1;
        tm.mday = field(6..8);
        if !(1..=31).contains(&tm.mday) {
            return Err(compile_error(format!("Invalid day of month: {}", s)));
        }
        if !(0..=11).contains(&tm.mon) {
            return Err(compile_error(format!("Invalid month: {}", s)));
        }
        return Ok(&s[8..]);
    }

    let (rest, mday) = strtol(s);
    tm.mday = mday;
    if !(1..=31).contains(&tm.mday) {
        return Err(compile_error(format!("Invalid day of month: {}", s)));
    }
    let Some(rest) = rest.strip_prefix('/') else {
        tm.mon = now.mon;
        tm.year = now.year;
        return Ok(rest);
    };
    let (rest, mon) = strtol(rest);
    tm.mon = mon - 1;
    if !(0..=11).contains(&tm.mon) {
        return Err(compile_error(format!("Invalid month: {}", rest)));
    }
    let Some(rest) = rest.strip_prefix('/') else {
        tm.year = now.year;
        return Ok(rest);
    };
    let (rest, year) = strtol(rest);
    tm.year = if year < 70 {
        2000 + year
    } else if year > 1900 {
        year
    } else {
        1900 + year
    };
    Ok(rest)
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    struct RangeFlags: u8 {
        const MINUS    = 1 << 0;
        const PLUS     = 1 << 1;
        const WINDOW   = 1 << 2;
        const ABSOLUTE = 1 << 3;
        const DONE     = 1 << 4;
        const ERROR    = 1 << 5;
    }
}

/// Parse what follows the first date: `-date`, `-offset`, `+offset` and
/// `*offset`.
fn parse_date_range<'s>(
    mut pc: &'s str,
    min: &mut Tm,
    max: &mut Tm,
    have_min: bool,
    base_min: &Tm,
    now: &Tm,
) -> Result<&'s str> {
    let mut flags = RangeFlags::empty();
    let mut op_start = pc;
    while !pc.is_empty() && !flags.contains(RangeFlags::DONE) {
        op_start = pc;
        let mut chars = pc.chars();
        let ch = chars.next().unwrap_or_default();
        pc = chars.as_str().trim_start();
        match ch {
            '-' => match get_offset(min, pc, -1) {
                Some(rest) => {
                    pc = rest;
                    if flags.is_empty() && !have_min {
                        max.same_day_as(min);
                    }
                    flags |= RangeFlags::MINUS;
                }
                None if flags.is_empty() => match get_date(pc, max, now) {
                    Ok(rest) => {
                        pc = rest;
                        if !have_min {
                            *min = *base_min;
                        }
                        flags |= RangeFlags::ABSOLUTE | RangeFlags::DONE;
                    }
                    Err(err) => {
                        debug!("date range: {}", err);
                        return Err(err);
                    }
                },
                None => flags |= RangeFlags::ERROR | RangeFlags::DONE,
            },
            '+' => match get_offset(max, pc, 1) {
                Some(rest) => {
                    pc = rest;
                    flags |= RangeFlags::PLUS;
                }
                None => flags |= RangeFlags::ERROR | RangeFlags::DONE,
            },
            '*' => match get_offset(min, pc, -1) {
                Some(_) => {
                    pc = get_offset(max, pc, 1).unwrap_or(pc);
                    flags |= RangeFlags::WINDOW;
                }
                None => flags |= RangeFlags::ERROR | RangeFlags::DONE,
            },
            _ => flags |= RangeFlags::ERROR | RangeFlags::DONE,
        }
        pc = pc.trim_start();
    }
    if flags.contains(RangeFlags::ERROR) {
        return Err(compile_error(format!("Invalid relative date: {}", op_start)));
    }
    Ok(pc)
}

/// Swap the dates of `min` and `max` if they are in the wrong order.
fn adjust_date_range(min: &mut Tm, max: &mut Tm) {
    if (min.year, min.mon, min.mday) > (max.year, max.mon, max.mday) {
        std::mem::swap(&mut min.year, &mut max.year);
        std::mem::swap(&mut min.mon, &mut max.mon);
        std::mem::swap(&mut min.mday, &mut max.mday);
        min.set_hms(0, 0, 0);
        max.set_hms(23, 59, 59);
    }
}

/// Compute the inclusive bounds, in seconds since the epoch, of the date
/// range `s` as seen at time `now`.
pub fn eval_date_range(s: &str, now: UnixTimestamp) -> Result<(i64, i64)> {
    let today = Tm::from_timestamp(now);
    let mut min = Tm::new(1970, 0, 2, 0, 0, 0);
    let mut max = Tm::new(2030, 11, 31, 23, 59, 59);

    if let Some(kind @ ('<' | '>' | '=')) = s.chars().next() {
        let offset = &s[1..];
        let tm = if kind == '<' { &mut min } else { &mut max };
        *tm = today;
        let (unit, _) = strtol(offset);
        if !unit.starts_with(['H', 'M', 'S']) {
            tm.set_hms(23, 59, 59);
        }
        get_offset(tm, offset, -1);
        if kind == '=' {
            min = max;
            min.set_hms(0, 0, 0);
        }
    } else {
        let mut pc = s;
        let mut have_min = false;
        let mut until_now = false;
        if pc.starts_with(|c: char| c.is_ascii_digit()) {
            pc = get_date(pc, &mut min, &today)?.trim_start();
            have_min = true;
            if let Some(rest) = pc.strip_prefix('-') {
                until_now = rest.trim_start().is_empty();
            }
        }
        if !until_now {
            let base_min = min;
            if !have_min {
                min = today;
                min.set_hms(0, 0, 0);
            }
            max.same_day_as(&min);
            parse_date_range(pc, &mut min, &mut max, have_min, &base_min, &today)?;
        }
    }

    adjust_date_range(&mut min, &mut max);
    Ok((min.timestamp(), max.timestamp()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> i64 {
        Local
            .with_ymd_and_hms(y, m, d, hh, mm, ss)
            .earliest()
            .unwrap()
            .timestamp()
    }

    // 2024-03-15 12:00 local
    fn now() -> UnixTimestamp {
        local(2024, 3, 15, 12, 0, 0) as UnixTimestamp
    }

    #[test]
    fn test_date_strtol() {
        assert_eq!(strtol("42abc"), ("abc", 42));
        assert_eq!(strtol("-3d"), ("d", -3));
        assert_eq!(strtol("0x1fK"), ("K", 31));
        assert_eq!(strtol("abc"), ("abc", 0));
        assert_eq!(strtol(" 7"), ("", 7));
    }

    #[test]
    fn test_date_absolute() {
        assert_eq!(
            eval_date_range("20240131", now()).unwrap(),
            (local(2024, 1, 31, 0, 0, 0), local(2024, 1, 31, 23, 59, 59))
        );
        assert_eq!(
            eval_date_range("31/01/24", now()).unwrap(),
            (local(2024, 1, 31, 0, 0, 0), local(2024, 1, 31, 23, 59, 59))
        );
        assert_eq!(
            eval_date_range("1/2/99", now()).unwrap().0,
            local(1999, 2, 1, 0, 0, 0)
        );
        // the month and year default to today's
        assert_eq!(
            eval_date_range("5", now()).unwrap().0,
            local(2024, 3, 5, 0, 0, 0)
        );
        assert_eq!(
            eval_date_range("01/01/2024-31/01/2024", now()).unwrap(),
            (local(2024, 1, 1, 0, 0, 0), local(2024, 1, 31, 23, 59, 59))
        );
        // reversed bounds are swapped
        assert_eq!(
            eval_date_range("31/01/2024-01/01/2024", now()).unwrap(),
            (local(2024, 1, 1, 0, 0, 0), local(2024, 1, 31, 23, 59, 59))
        );
        // until the default upper bound
        assert_eq!(
            eval_date_range("01/03/2024-", now()).unwrap(),
            (local(2024, 3, 1, 0, 0, 0), local(2030, 12, 31, 23, 59, 59))
        );
        // from the default lower bound
        assert_eq!(
            eval_date_range("-01/03/2024", now()).unwrap(),
            (local(1970, 1, 2, 0, 0, 0), local(2024, 3, 1, 23, 59, 59))
        );
    }

    #[test]
    fn test_date_relative() {
        assert_eq!(
            eval_date_range("<1w", now()).unwrap(),
            (local(2024, 3, 8, 23, 59, 59), local(2030, 12, 31, 23, 59, 59))
        );
        assert_eq!(
            eval_date_range(">1m", now()).unwrap(),
            (local(1970, 1, 2, 0, 0, 0), local(2024, 2, 15, 23, 59, 59))
        );
        assert_eq!(
            eval_date_range("=3d", now()).unwrap(),
            (local(2024, 3, 12, 0, 0, 0), local(2024, 3, 12, 23, 59, 59))
        );
        // hour offsets keep the time of day
        assert_eq!(
            eval_date_range("<2H", now()).unwrap().0,
            local(2024, 3, 15, 10, 0, 0)
        );
        assert_eq!(
            eval_date_range("15/03/2024*2d", now()).unwrap(),
            (local(2024, 3, 13, 0, 0, 0), local(2024, 3, 17, 23, 59, 59))
        );
        assert_eq!(
            eval_date_range("10/03/2024+1w", now()).unwrap(),
            (local(2024, 3, 10, 0, 0, 0), local(2024, 3, 17, 23, 59, 59))
        );
        assert_eq!(
            eval_date_range("10/03/2024-1d", now()).unwrap(),
            (local(2024, 3, 9, 0, 0, 0), local(2024, 3, 10, 23, 59, 59))
        );
    }

    #[test]
    fn test_date_errors() {
        let err = eval_date_range("32/01/2024", now()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PatternCompile);
        assert!(err.to_string().contains("Invalid day of month"), "{}", err);
        let err = eval_date_range("20241301", now()).unwrap_err();
        assert!(err.to_string().contains("Invalid month"), "{}", err);
        let err = eval_date_range("01/13/2024", now()).unwrap_err();
        assert!(err.to_string().contains("Invalid month"), "{}", err);
        let err = eval_date_range("01/01/2024+x", now()).unwrap_err();
        assert!(err.to_string().contains("Invalid relative date"), "{}", err);
    }
}
