#![forbid(unsafe_code)]

use std::time::Duration;

use crate::error::TaskgoError;

/// Sentinel accepted wherever a validity can be cleared.
pub const NONE_SENTINEL: &str = "none";

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// A caller-supplied validity: either "clear the deadline" or a concrete span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Clear,
    For(Duration),
}

impl Validity {
    /// Empty input and `none` both clear; anything else must parse as a duration.
    pub fn parse(input: &str) -> Result<Self, TaskgoError> {
        let s = input.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(NONE_SENTINEL) {
            return Ok(Self::Clear);
        }
        parse_duration(s).map(Self::For)
    }
}

/// Parses `"24h"`, `"1h30m"`, `"1.5h"`, `"250ms"` and friends.
pub fn parse_duration(input: &str) -> Result<Duration, TaskgoError> {
    let s = input.trim();
    let invalid = || TaskgoError::InvalidDuration(input.to_owned());
    if s.is_empty() {
        return Err(invalid());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = s;
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (num, tail) = rest.split_at(num_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let scale = unit_nanos(unit).ok_or_else(invalid)?;
        let nanos = scaled(num, scale).ok_or_else(invalid)?;
        total = total.checked_add(nanos).ok_or_else(invalid)?;
        rest = tail;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| invalid())?;
    // Remainder is always below one second.
    let sub = (total % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, sub))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    Some(match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 60 * 60 * NANOS_PER_SEC,
        "d" => 24 * 60 * 60 * NANOS_PER_SEC,
        "w" => 7 * 24 * 60 * 60 * NANOS_PER_SEC,
        _ => return None,
    })
}

fn scaled(num: &str, scale: u128) -> Option<u128> {
    let (whole, frac) = match num.split_once('.') {
        Some((w, f)) => (w, f),
        None => (num, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.contains('.') {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut value = whole.checked_mul(scale)?;

    // Digits beyond nanosecond precision of the largest unit cannot matter.
    let frac = &frac[..frac.len().min(18)];
    if !frac.is_empty() {
        let digits: u128 = frac.parse().ok()?;
        let denom = 10u128.checked_pow(u32::try_from(frac.len()).ok()?)?;
        value = value.checked_add(digits.checked_mul(scale)? / denom)?;
    }
    Some(value)
}

/// Renders a remaining span the way `list` shows it, e.g. `23h59m`.
#[must_use]
pub fn format_remaining(d: time::Duration) -> String {
    let total_minutes = (d.whole_seconds() + 30) / 60;
    if total_minutes <= 0 {
        return "0m".to_owned();
    }
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;
    match (days, hours) {
        (0, 0) => format!("{minutes}m"),
        (0, _) => format!("{hours}h{minutes}m"),
        _ => format!("{days}d{hours}h{minutes}m"),
    }
}
