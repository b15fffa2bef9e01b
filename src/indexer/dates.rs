//! Publish date normalization.
//!
//! Sites report dates as relative text ("2 hours ago"), epoch seconds, RFC 2822
//! feed dates or site-specific formats in a known time zone. Every helper here
//! yields an absolute UTC instant; relative forms are resolved against an
//! explicit `now` so results are reproducible.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc, Weekday,
};
use once_cell::sync::Lazy;
use regex::Regex;

use super::error::{IndexerError, Result};
use super::parse_util::coerce_double;

static TIME_AGO_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*?([\d\.]+)\s*?([^\d\s\.]+)\s*?").expect("valid regex"));
static AGO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bago\b").expect("valid regex"));
static RELATIVE_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(today|yesterday|tomorrow)(?:[\s,]+(?:at)?\s*|$)").expect("valid regex")
});
static WEEKDAY_AT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\s+at\s+")
        .expect("valid regex")
});

/// Formats tried, in order, by [`from_unknown`]. Interpreted as UTC.
const KNOWN_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M",
    "%b %d %Y, %H:%M",
    "%d %b %Y %H:%M",
    "%d %B %Y %H:%M",
];

const KNOWN_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d %b %Y", "%b %d %Y", "%B %d, %Y"];

fn invalid(text: &str, reason: &str) -> IndexerError {
    IndexerError::parse(format!("invalid date \"{text}\": {reason}"))
}

/// Resolve relative text like "2 hours ago", "1 day, 3 hours" or "5 mins" against `now`.
///
/// Units: sec/s, min/m, hour/hr/h, day/d, week/wk/w, month/mo (30 days),
/// year/yr/y (365 days). An unknown unit is an error.
pub fn from_time_ago(text: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let lowered = text.to_lowercase();
    if lowered.contains("now") || lowered.contains("just") {
        return Ok(now);
    }

    let cleaned = lowered
        .replace(',', " ")
        .replace("ago", " ")
        .replace("and", " ");

    let mut total_seconds = 0f64;
    let mut matched = false;

    for caps in TIME_AGO_PART.captures_iter(&cleaned) {
        let value = coerce_double(&caps[1]).ok_or_else(|| invalid(text, "bad number"))?;
        let unit = &caps[2];
        matched = true;

        let unit_seconds = if unit.contains("sec") || unit == "s" {
            1.0
        } else if unit.contains("min") || unit == "m" {
            60.0
        } else if unit.contains("hour") || unit.contains("hr") || unit == "h" {
            3_600.0
        } else if unit.contains("day") || unit == "d" {
            86_400.0
        } else if unit.contains("week") || unit.contains("wk") || unit == "w" {
            7.0 * 86_400.0
        } else if unit.contains("month") || unit == "mo" {
            30.0 * 86_400.0
        } else if unit.contains("year") || unit.contains("yr") || unit == "y" {
            365.0 * 86_400.0
        } else {
            return Err(invalid(text, &format!("unknown unit \"{unit}\"")));
        };

        total_seconds += value * unit_seconds;
    }

    if !matched {
        return Err(invalid(text, "no time-ago components"));
    }

    let millis = total_seconds * 1000.0;
    if !millis.is_finite() || millis >= i64::MAX as f64 {
        return Err(invalid(text, "interval out of range"));
    }
    Duration::try_milliseconds(millis as i64)
        .and_then(|ago| now.checked_sub_signed(ago))
        .ok_or_else(|| invalid(text, "interval out of range"))
}

/// Epoch seconds to UTC
pub fn from_unix(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

/// RFC 2822 feed dates ("Tue, 10 Jun 2003 04:00:00 GMT"), also accepting RFC 3339
pub fn from_rfc2822(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc2822(text)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid(text, &e.to_string()))
}

/// Parse a site-specific format whose local time zone is known.
/// Date-only formats resolve to midnight in that zone.
pub fn from_format(text: &str, format: &str, offset: FixedOffset) -> Result<DateTime<Utc>> {
    let text = text.trim();
    let naive = NaiveDateTime::parse_from_str(text, format)
        .or_else(|_| NaiveDate::parse_from_str(text, format).map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|e| invalid(text, &e.to_string()))?;

    localize(naive, offset).ok_or_else(|| invalid(text, "not representable in time zone"))
}

fn localize(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_time_of_day(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    if text.is_empty() {
        return Some(NaiveTime::MIN);
    }

    let upper = text.to_uppercase();
    ["%H:%M:%S", "%H:%M", "%I:%M %p", "%I:%M%p", "%I:%M:%S %p"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&upper, fmt).ok())
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    name.parse().ok()
}

/// Best-effort parse for sites that mix several date styles.
///
/// Tries, in order: epoch seconds, "now", time-ago text, today/yesterday/tomorrow
/// with an optional time, "<weekday> at <time>", RFC 2822/3339 and a list of common
/// formats interpreted as UTC.
pub fn from_unknown(text: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid(text, "empty"));
    }

    if text.chars().all(|c| c.is_ascii_digit()) {
        return text
            .parse::<i64>()
            .ok()
            .and_then(from_unix)
            .ok_or_else(|| invalid(text, "timestamp out of range"));
    }

    if text.to_lowercase().contains("now") {
        return Ok(now);
    }

    if AGO.is_match(text) {
        return from_time_ago(text, now);
    }

    let today = now.date_naive();

    if let Some(caps) = RELATIVE_DAY.captures(text) {
        let rest = &text[caps[0].len()..];
        let time = parse_time_of_day(rest).ok_or_else(|| invalid(text, "bad time of day"))?;
        let day = match caps[1].to_lowercase().as_str() {
            "yesterday" => today - Duration::days(1),
            "tomorrow" => today + Duration::days(1),
            _ => today,
        };
        return Ok(Utc.from_utc_datetime(&day.and_time(time)));
    }

    if let Some(caps) = WEEKDAY_AT.captures(text) {
        let rest = &text[caps[0].len()..];
        let time = parse_time_of_day(rest).ok_or_else(|| invalid(text, "bad time of day"))?;
        let target = weekday_from_name(&caps[1]).ok_or_else(|| invalid(text, "bad weekday"))?;
        let mut day = today;
        while day.weekday() != target {
            day -= Duration::days(1);
        }
        return Ok(Utc.from_utc_datetime(&day.and_time(time)));
    }

    if let Ok(dt) = from_rfc2822(text) {
        return Ok(dt);
    }

    if let Some(naive) = KNOWN_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    KNOWN_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
        .ok_or_else(|| invalid(text, "unrecognised format"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_time_ago_hours() {
        let now = fixed_now();
        assert_eq!(from_time_ago("2 hours ago", now).unwrap(), now - Duration::hours(2));
    }

    #[test]
    fn test_time_ago_compound_and_short_units() {
        let now = fixed_now();
        assert_eq!(
            from_time_ago("1 day, 3 hours and 10 min ago", now).unwrap(),
            now - Duration::days(1) - Duration::hours(3) - Duration::minutes(10)
        );
        assert_eq!(from_time_ago("2w", now).unwrap(), now - Duration::days(14));
        assert_eq!(from_time_ago("1.5 hr", now).unwrap(), now - Duration::minutes(90));
        assert_eq!(from_time_ago("3 months", now).unwrap(), now - Duration::days(90));
        assert_matches!(from_time_ago("100000000000 years ago", now), Err(IndexerError::Parse { .. }));
        assert_matches!(from_time_ago("300000 years ago", now), Err(IndexerError::Parse { .. }));
        assert_eq!(from_time_ago("Just now", now).unwrap(), now);
    }

    #[test]
    fn test_time_ago_unknown_unit() {
        assert_matches!(
            from_time_ago("3 fortnights ago", fixed_now()),
            Err(IndexerError::Parse { .. })
        );
        assert_matches!(from_time_ago("ago", fixed_now()), Err(IndexerError::Parse { .. }));
    }

    #[test]
    fn test_from_unix_and_rfc2822() {
        assert_eq!(from_unix(1_710_504_000), Some(fixed_now()));
        assert_eq!(
            from_rfc2822("Fri, 15 Mar 2024 14:00:00 +0200").unwrap(),
            fixed_now()
        );
        assert_eq!(from_rfc2822("2024-03-15T12:00:00Z").unwrap(), fixed_now());
    }

    #[test]
    fn test_from_format_with_offset() {
        let cet = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(
            from_format("15.03.2024 13:00", "%d.%m.%Y %H:%M", cet).unwrap(),
            fixed_now()
        );
        assert_eq!(
            from_format("2024-03-15", "%Y-%m-%d", FixedOffset::east_opt(0).unwrap()).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_from_unknown_variants() {
        let now = fixed_now();
        assert_eq!(from_unknown("1710504000", now).unwrap(), now);
        assert_eq!(from_unknown("5 minutes ago", now).unwrap(), now - Duration::minutes(5));
        assert_eq!(
            from_unknown("Yesterday at 08:30", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 14, 8, 30, 0).unwrap()
        );
        assert_eq!(
            from_unknown("Today", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
        );
        // 2024-03-15 is a Friday
        assert_eq!(
            from_unknown("Tuesday at 2:15 pm", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 12, 14, 15, 0).unwrap()
        );
        assert_eq!(
            from_unknown("2024-01-02 03:04:05", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(
            from_unknown("02 Jan 2024", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
        assert!(from_unknown("sometime soon", now).is_err());
    }
}
