// SPDX-License-Identifier: MIT

//! Best-effort syslog timestamps (`Oct 12 03:14:07`), which carry no year.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use time::{
    Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, format_description::BorrowedFormatItem,
    macros::format_description, parsing::Parsed,
};

use crate::error::ConfigError;

const SYSLOG_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[month repr:short] [day padding:space] [hour]:[minute]:[second]");

const REPORT_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Which year a year-less syslog stamp is assigned to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum YearPolicy {
    /// The year the tool runs in.
    #[default]
    Current,
    /// The most recent year in which the stamp exists and is not in the future.
    Rolling,
    Fixed(i32),
}

impl YearPolicy {
    pub fn year_for(&self, month: time::Month, day: u8, now: PrimitiveDateTime) -> i32 {
        match self {
            YearPolicy::Current => now.year(),
            YearPolicy::Fixed(year) => *year,
            YearPolicy::Rolling => {
                let this_year = now.year();
                // A day of slack absorbs clock skew between hosts.
                let latest = now.date() + Duration::days(1);
                // Feb 29 recurs within eight years.
                (this_year - 8..=this_year)
                    .rev()
                    .find(|&year| {
                        Date::from_calendar_date(year, month, day).is_ok_and(|date| date <= latest)
                    })
                    .unwrap_or(this_year)
            }
        }
    }
}

impl FromStr for YearPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("current") {
            return Ok(YearPolicy::Current);
        }
        if s.eq_ignore_ascii_case("rolling") {
            return Ok(YearPolicy::Rolling);
        }
        let year: i32 = s.parse().map_err(|_| {
            ConfigError::invalid("year", format!("expected 'current', 'rolling' or a year, got '{s}'"))
        })?;
        fixed_year(i64::from(year))
    }
}

fn fixed_year(year: i64) -> Result<YearPolicy, ConfigError> {
    if !(1..=9999).contains(&year) {
        return Err(ConfigError::invalid("year", format!("{year} is out of range")));
    }
    Ok(YearPolicy::Fixed(year as i32))
}

impl fmt::Display for YearPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearPolicy::Current => f.write_str("current"),
            YearPolicy::Rolling => f.write_str("rolling"),
            YearPolicy::Fixed(year) => write!(f, "{year}"),
        }
    }
}

impl<'de> Deserialize<'de> for YearPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct YearVisitor;

        impl<'de> serde::de::Visitor<'de> for YearVisitor {
            type Value = YearPolicy;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("'current', 'rolling' or a year like 2024")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                value.parse().map_err(E::custom)
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                fixed_year(value).map_err(E::custom)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                fixed_year(i64::try_from(value).unwrap_or(i64::MAX)).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(YearVisitor)
    }
}

/// Parses stamps at the start of log lines, resolving the year against a
/// fixed "now" so a whole run is consistent.
#[derive(Debug, Clone, Copy)]
pub struct StampParser {
    policy: YearPolicy,
    now: PrimitiveDateTime,
}

impl StampParser {
    pub fn new(policy: YearPolicy) -> Self {
        let now = OffsetDateTime::now_utc();
        Self::at(policy, PrimitiveDateTime::new(now.date(), now.time()))
    }

    pub fn at(policy: YearPolicy, now: PrimitiveDateTime) -> Self {
        Self { policy, now }
    }

    pub fn policy(&self) -> YearPolicy {
        self.policy
    }

    /// `None` when the line does not start with a valid stamp.
    pub fn parse(&self, line: &str) -> Option<PrimitiveDateTime> {
        let mut parsed = Parsed::new();
        parsed.parse_items(line.as_bytes(), SYSLOG_STAMP).ok()?;

        let month = parsed.month()?;
        let day = parsed.day()?.get();
        let time = Time::from_hms(parsed.hour_24()?, parsed.minute()?, parsed.second()?).ok()?;
        let year = self.policy.year_for(month, day, self.now);
        let date = Date::from_calendar_date(year, month, day).ok()?;

        Some(PrimitiveDateTime::new(date, time))
    }
}

/// `2024-10-12T03:14:07`
pub fn format_stamp(stamp: &PrimitiveDateTime) -> String {
    stamp
        .format(REPORT_STAMP)
        .unwrap_or_else(|_| stamp.to_string())
}
