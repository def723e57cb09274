use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// MJD of the UNIX epoch (1970-01-01T00:00:00Z).
pub const MJD_1970_EPOCH: f64 = 40587.0;
pub const SECONDS_PER_DAY: f64 = 86400.0;

/// Converts UNIX epoch seconds to DMJD.
///
/// The whole-day part is a floored quotient and the fraction comes from the
/// Euclidean remainder, so `secs_to_dmjd(0.0)` is exactly `40587.0`.
pub fn secs_to_dmjd(secs: f64) -> f64 {
    let days = (secs / SECONDS_PER_DAY).floor();
    let dmjd = days + MJD_1970_EPOCH;
    dmjd + secs.rem_euclid(SECONDS_PER_DAY) / SECONDS_PER_DAY
}

/// Converts DMJD back to UNIX epoch seconds.
///
/// The fractional day is split off by truncation (modf), not floor.
pub fn dmjd_to_secs(dmjd: f64) -> f64 {
    let mjd = dmjd.trunc();
    let d = dmjd - mjd;
    (SECONDS_PER_DAY * (mjd - MJD_1970_EPOCH)) + (SECONDS_PER_DAY * d)
}

/// Current wall-clock time as DMJD.
pub fn current_dmjd() -> f64 {
    TimePoint::now().dmjd()
}

/// How a two-digit year in a start-time string is mapped to a full year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CenturyPolicy {
    /// POSIX strptime rule: 69-99 are 1969-1999, 00-68 are 2000-2068.
    #[default]
    Pivot,
    /// Year is `base + YY`, e.g. `Fixed(2000)`.
    Fixed(i32),
}

impl CenturyPolicy {
    /// `None` when a fixed base pushes the year past `i32`.
    pub fn resolve(&self, yy: i32) -> Option<i32> {
        match self {
            CenturyPolicy::Pivot if yy >= 69 => Some(1900 + yy),
            CenturyPolicy::Pivot => Some(2000 + yy),
            CenturyPolicy::Fixed(base) => base.checked_add(yy),
        }
    }
}

/// Parses `YY:MM:DD:HH:MM:SS` (or `YYYY:MM:DD:HH:MM:SS`) as a UTC instant.
pub fn parse_utc(text: &str, century: CenturyPolicy) -> Result<DateTime<Utc>, ParseError> {
    let fields: Vec<&str> = text.trim().split(':').collect();
    if fields.len() != 6 {
        return Err(ParseError::Format(text.to_string()));
    }

    let mut values = [0u32; 6];
    for (slot, field) in values.iter_mut().zip(&fields) {
        if field.is_empty() || !field.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseError::Field {
                input: text.to_string(),
                field: field.to_string(),
            });
        }
        *slot = field.parse().map_err(|_| ParseError::Field {
            input: text.to_string(),
            field: field.to_string(),
        })?;
    }

    let year = match fields[0].len() {
        1 | 2 => century
            .resolve(values[0] as i32)
            .ok_or_else(|| ParseError::OutOfRange(text.to_string()))?,
        4 => values[0] as i32,
        _ => {
            return Err(ParseError::Field {
                input: text.to_string(),
                field: fields[0].to_string(),
            })
        }
    };
    let [_, month, day, hour, minute, second] = values;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| ParseError::OutOfRange(text.to_string()))
}

/// Colon-delimited, unpadded UTC string for display, e.g. `2015:3:15:14:8:12`.
pub fn format_utc(dt: &DateTime<Utc>) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}

/// An instant, held as UNIX epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TimePoint(f64);

impl TimePoint {
    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn from_utc(dt: &DateTime<Utc>) -> Self {
        Self(dt.timestamp() as f64)
    }

    pub fn from_dmjd(dmjd: f64) -> Self {
        Self(dmjd_to_secs(dmjd))
    }

    /// Whole seconds only, like `int(time.time())`.
    pub fn now() -> Self {
        Self(Utc::now().timestamp() as f64)
    }

    pub fn offset(&self, secs: i64) -> Self {
        Self(self.0 + secs as f64)
    }

    pub fn secs(&self) -> f64 {
        self.0
    }

    pub fn dmjd(&self) -> f64 {
        secs_to_dmjd(self.0)
    }

    /// `None` when the instant is outside chrono's representable range.
    pub fn utc(&self) -> Option<DateTime<Utc>> {
        let whole = self.0.floor();
        let nanos = ((self.0 - whole) * 1e9).round().min(999_999_999.0) as u32;
        DateTime::from_timestamp(whole as i64, nanos)
    }
}
