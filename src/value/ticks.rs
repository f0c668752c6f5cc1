//! 100-nanosecond tick encodings for the date and time types.
//!
//! * `DateTime`: ticks since 0001-01-01T00:00:00.
//! * `DateTimeOffset`: FILETIME, ticks since 1601-01-01T00:00:00Z. Reads back in UTC.
//! * `TimeSpan`: signed tick count.

use crate::error::{GraphwireError, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};

pub(crate) const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;
/// Last representable tick: 9999-12-31T23:59:59.9999999.
pub(crate) const MAX_DATETIME_TICKS: i64 = 3_155_378_975_999_999_999;

fn midnight(year: i32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// 0001-01-01T00:00:00, the zero of the `DateTime` tick scale.
pub fn datetime_epoch() -> NaiveDateTime {
    midnight(1)
}

fn filetime_epoch() -> NaiveDateTime {
    midnight(1601)
}

/// Default `DateTimeOffset`: the `DateTime` epoch at offset zero.
pub fn offset_epoch() -> DateTime<FixedOffset> {
    datetime_epoch().and_utc().fixed_offset()
}

fn delta_to_ticks(delta: TimeDelta) -> Option<i64> {
    delta
        .num_seconds()
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(i64::from(delta.subsec_nanos()) / NANOS_PER_TICK)
}

/// Ticks of `delta`, rejecting nanoseconds that do not fall on a tick.
fn exact_ticks(delta: TimeDelta, value: &dyn std::fmt::Display) -> Result<Option<i64>> {
    if i64::from(delta.subsec_nanos()) % NANOS_PER_TICK != 0 {
        return Err(GraphwireError::Format(format!(
            "{value} is finer than the 100 ns tick"
        )));
    }
    Ok(delta_to_ticks(delta))
}

fn ticks_to_delta(ticks: i64) -> Option<TimeDelta> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let rem = ticks.rem_euclid(TICKS_PER_SECOND);
    TimeDelta::new(secs, u32::try_from(rem * NANOS_PER_TICK).ok()?)
}

/// Ticks of a `DateTime`.
///
/// # Errors
/// [`GraphwireError::Format`] outside years 0001-9999 or below tick precision.
pub fn datetime_to_ticks(dt: &NaiveDateTime) -> Result<i64> {
    exact_ticks(dt.signed_duration_since(datetime_epoch()), dt)?
        .filter(|t| (0..=MAX_DATETIME_TICKS).contains(t))
        .ok_or_else(|| GraphwireError::Format(format!("DateTime {dt} is outside 0001-9999")))
}

/// `DateTime` from ticks.
pub fn datetime_from_ticks(ticks: i64) -> Result<NaiveDateTime> {
    if !(0..=MAX_DATETIME_TICKS).contains(&ticks) {
        return Err(GraphwireError::CorruptedStream(format!(
            "DateTime ticks {ticks} out of range"
        )));
    }
    ticks_to_delta(ticks)
        .and_then(|d| datetime_epoch().checked_add_signed(d))
        .ok_or_else(|| GraphwireError::CorruptedStream(format!("DateTime ticks {ticks} out of range")))
}

/// FILETIME of a `DateTimeOffset`. Instants before 1601 cannot be encoded.
///
/// # Errors
/// [`GraphwireError::Format`] before the FILETIME epoch or below tick precision.
pub fn offset_to_filetime(dt: &DateTime<FixedOffset>) -> Result<i64> {
    exact_ticks(dt.naive_utc().signed_duration_since(filetime_epoch()), dt)?
        .filter(|t| *t >= 0)
        .ok_or_else(|| {
            GraphwireError::Format(format!("DateTimeOffset {dt} precedes the FILETIME epoch"))
        })
}

/// `DateTimeOffset` (UTC) from FILETIME.
pub fn offset_from_filetime(filetime: i64) -> Result<DateTime<FixedOffset>> {
    let bad = || GraphwireError::CorruptedStream(format!("FILETIME {filetime} out of range"));
    if filetime < 0 {
        return Err(bad());
    }
    ticks_to_delta(filetime)
        .and_then(|d| filetime_epoch().checked_add_signed(d))
        .filter(|dt| delta_to_ticks(dt.signed_duration_since(datetime_epoch()))
            .is_some_and(|t| t <= MAX_DATETIME_TICKS))
        .map(|dt| dt.and_utc().fixed_offset())
        .ok_or_else(bad)
}

/// Ticks of a `TimeSpan`.
///
/// # Errors
/// [`GraphwireError::Format`] beyond 64-bit ticks or below tick precision.
pub fn timespan_to_ticks(delta: &TimeDelta) -> Result<i64> {
    exact_ticks(*delta, delta)?
        .ok_or_else(|| GraphwireError::Format(format!("TimeSpan {delta} exceeds 64-bit ticks")))
}

/// `TimeSpan` from ticks. Every 64-bit tick count is representable.
pub fn timespan_from_ticks(ticks: i64) -> Result<TimeDelta> {
    ticks_to_delta(ticks)
        .ok_or_else(|| GraphwireError::CorruptedStream(format!("TimeSpan ticks {ticks} out of range")))
}

/// Renders `[-][d.]hh:mm:ss[.fffffff]`.
pub fn format_timespan(delta: &TimeDelta) -> Option<String> {
    let ticks = delta_to_ticks(*delta)?;
    let sign = if ticks < 0 { "-" } else { "" };
    let abs = ticks.unsigned_abs();
    let per_sec = TICKS_PER_SECOND as u64;
    let frac = abs % per_sec;
    let total_secs = abs / per_sec;
    let (days, hours) = (total_secs / 86_400, (total_secs / 3_600) % 24);
    let (minutes, seconds) = ((total_secs / 60) % 60, total_secs % 60);
    let mut out = String::from(sign);
    if days > 0 {
        out.push_str(&format!("{days}."));
    }
    out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
    if frac > 0 {
        out.push_str(&format!(".{frac:07}"));
    }
    Some(out)
}

/// Parses the format produced by [`format_timespan`].
pub fn parse_timespan(text: &str) -> Option<TimeDelta> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let mut parts = body.split(':');
    let (head, minutes, tail) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let (days, hours) = match head.split_once('.') {
        Some((d, h)) => (d.parse::<i64>().ok()?, h.parse::<i64>().ok()?),
        None => (0, head.parse::<i64>().ok()?),
    };
    let (seconds, frac) = match tail.split_once('.') {
        Some((s, f)) if !f.is_empty() && f.len() <= 7 && f.bytes().all(|b| b.is_ascii_digit()) => {
            (s.parse::<i64>().ok()?, format!("{f:0<7}").parse::<i64>().ok()?)
        }
        Some(_) => return None,
        None => (tail.parse::<i64>().ok()?, 0),
    };
    let minutes = minutes.parse::<i64>().ok()?;
    if days < 0 || !(0..24).contains(&hours) || !(0..60).contains(&minutes) || !(0..60).contains(&seconds) {
        return None;
    }
    let total_secs = days
        .checked_mul(86_400)?
        .checked_add(hours * 3_600 + minutes * 60 + seconds)?;
    let ticks = total_secs.checked_mul(TICKS_PER_SECOND)?.checked_add(frac)?;
    ticks_to_delta(if negative { ticks.checked_neg()? } else { ticks })
}
