//! Human time strings to durations.
//!
//! Accepted forms:
//! - plain seconds: `90`, `2.5`
//! - colon form: `1:30`, `01:02:03` (fields after the first must be < 60)
//! - unit form: `1h2m3s`, `90s`, `1 min 30 sec`, `2 hours` (whole numbers,
//!   parsed by `humantime`)

use std::time::Duration;

use crate::player::PlaybackError;

/// Parse a timestamp, rejecting anything malformed as `InvalidTimestamp`.
pub fn parse_timestamp(input: &str) -> Result<Duration, PlaybackError> {
    let text = input.trim();
    let invalid = || PlaybackError::InvalidTimestamp(input.to_string());

    if text.is_empty() {
        return Err(invalid());
    }

    let parsed = if text.contains(':') {
        parse_colon_form(text).and_then(from_secs)
    } else if text.chars().all(|c| c.is_ascii_digit() || c == '.') {
        parse_seconds(text).and_then(from_secs)
    } else {
        parse_unit_form(text)
    };
    parsed.ok_or_else(invalid)
}

fn from_secs(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

fn parse_seconds(text: &str) -> Option<f64> {
    if !text.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: f64 = text.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

fn parse_whole(text: &str) -> Option<u64> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn parse_colon_form(text: &str) -> Option<f64> {
    let fields: Vec<&str> = text.split(':').map(str::trim).collect();
    if !(2..=3).contains(&fields.len()) {
        return None;
    }

    let (last, leading) = fields.split_last()?;
    let seconds = parse_seconds(last)?;
    if seconds >= 60.0 {
        return None;
    }

    let mut total = 0u64;
    for (i, field) in leading.iter().enumerate() {
        let value = parse_whole(field)?;
        // Only the most significant field may exceed 59.
        if i > 0 && value >= 60 {
            return None;
        }
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    Some(total as f64 * 60.0 + seconds)
}

/// Commas may separate the parts. Units are case-insensitive here, which
/// also keeps `M` from meaning months.
fn parse_unit_form(text: &str) -> Option<Duration> {
    let normalized = text.to_lowercase().replace(',', " ");
    humantime::parse_duration(&normalized).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(input: &str) -> f64 {
        parse_timestamp(input).unwrap().as_secs_f64()
    }

    #[test]
    fn test_plain_seconds() {
        assert_eq!(secs("90"), 90.0);
        assert_eq!(secs(" 2.5 "), 2.5);
        assert_eq!(secs("0"), 0.0);
    }

    #[test]
    fn test_colon_form() {
        assert_eq!(secs("01:30"), 90.0);
        assert_eq!(secs("1:02:03"), 3723.0);
        assert_eq!(secs("00:00"), 0.0);
        assert_eq!(secs("90:00"), 5400.0);
        assert_eq!(secs("0:01.5"), 1.5);
    }

    #[test]
    fn test_unit_form() {
        assert_eq!(secs("1h2m3s"), 3723.0);
        assert_eq!(secs("90s"), 90.0);
        assert_eq!(secs("1 min 30 sec"), 90.0);
        assert_eq!(secs("2 hours"), 7200.0);
        assert_eq!(secs("1m, 5s"), 65.0);
        assert_eq!(secs("1M 5S"), 65.0);
        assert_eq!(secs("500ms"), 0.5);
    }

    #[test]
    fn test_rejects_garbage() {
        for bad in ["", "   ", "abc", "1:60", "1:2:3:4", "-5", "1x", "1.5m", "m5", ":30", "1::2", ".", "1:99:00"] {
            assert_eq!(
                parse_timestamp(bad),
                Err(PlaybackError::InvalidTimestamp(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }
}
