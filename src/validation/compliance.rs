// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Calendar/time-window compliance policies.
//!
//! Checked before `DRAFT → VALIDATED`. Kept apart from amount and currency
//! rules because its inputs (timezone, weekly calendar) are unrelated to them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Timelike, Utc, Weekday};

use crate::models::Donation;

const MINUTES_PER_DAY: u32 = 24 * 60;
const MINUTES_PER_WEEK: u32 = 7 * MINUTES_PER_DAY;

/// Decides whether a donation may be accepted at a given instant.
pub trait CompliancePolicy: Send + Sync {
    /// `Err(reason)` when the donation must not be accepted at `at`.
    fn check(&self, donation: &Donation, at: DateTime<Utc>) -> Result<(), String>;
}

/// Accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOpen;

impl CompliancePolicy for AlwaysOpen {
    fn check(&self, _donation: &Donation, _at: DateTime<Utc>) -> Result<(), String> {
        Ok(())
    }
}

/// Weekly closed window in a fixed UTC offset, e.g. Friday 16:00 to
/// Saturday 20:00 at +02:00. The end is exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyBlackout {
    start_day: Weekday,
    start_time: NaiveTime,
    end_day: Weekday,
    end_time: NaiveTime,
    offset: FixedOffset,
}

impl WeeklyBlackout {
    pub fn new(
        start: (Weekday, NaiveTime),
        end: (Weekday, NaiveTime),
        offset: FixedOffset,
    ) -> Self {
        Self {
            start_day: start.0,
            start_time: start.1,
            end_day: end.0,
            end_time: end.1,
            offset,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.offset);
        let now = minute_of_week(local.weekday(), local.hour(), local.minute());
        let start = minute_of_week(
            self.start_day,
            self.start_time.hour(),
            self.start_time.minute(),
        );
        let end = minute_of_week(self.end_day, self.end_time.hour(), self.end_time.minute());

        if start <= end {
            now >= start && now < end
        } else {
            // Window wraps past Sunday midnight.
            now >= start || now < end
        }
    }
}

impl CompliancePolicy for WeeklyBlackout {
    fn check(&self, _donation: &Donation, at: DateTime<Utc>) -> Result<(), String> {
        if self.contains(at) {
            Err(format!("donations are not accepted during {self}"))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for WeeklyBlackout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} - {} {} {}",
            self.start_day,
            self.start_time.format("%H:%M"),
            self.end_day,
            self.end_time.format("%H:%M"),
            self.offset
        )
    }
}

fn minute_of_week(day: Weekday, hour: u32, minute: u32) -> u32 {
    (day.num_days_from_monday() * MINUTES_PER_DAY + hour * 60 + minute) % MINUTES_PER_WEEK
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid blackout window {input:?}: {reason}")]
pub struct BlackoutParseError {
    pub input: String,
    pub reason: String,
}

impl FromStr for WeeklyBlackout {
    type Err = BlackoutParseError;

    /// Parses `"fri 16:00 - sat 20:00 +02:00"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| BlackoutParseError {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (start, rest) = s.split_once('-').ok_or_else(|| err("missing '-'"))?;
        let mut start_parts = start.split_whitespace();
        let mut end_parts = rest.split_whitespace();

        let start_day = parse_day(start_parts.next()).ok_or_else(|| err("bad start day"))?;
        let start_time = parse_time(start_parts.next()).ok_or_else(|| err("bad start time"))?;
        let end_day = parse_day(end_parts.next()).ok_or_else(|| err("bad end day"))?;
        let end_time = parse_time(end_parts.next()).ok_or_else(|| err("bad end time"))?;
        let offset = match end_parts.next() {
            Some(raw) => parse_offset(raw).ok_or_else(|| err("bad UTC offset"))?,
            None => FixedOffset::east_opt(0).ok_or_else(|| err("bad UTC offset"))?,
        };

        Ok(Self::new(
            (start_day, start_time),
            (end_day, end_time),
            offset,
        ))
    }
}

fn parse_day(raw: Option<&str>) -> Option<Weekday> {
    raw?.parse().ok()
}

fn parse_time(raw: Option<&str>) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw?, "%H:%M").ok()
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let (sign, body) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => (1, raw),
    };
    let (hours, minutes) = body.split_once(':').unwrap_or((body, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
