//! Normalization helpers shared by response parsers: sizes, numbers and ids.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static IMDB_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:tt)?(\d{1,8})$").expect("valid regex"));
static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").expect("valid regex"));

/// Trim and collapse whitespace runs into single spaces
pub fn normalize_spaces(s: &str) -> String {
    MULTI_SPACE.replace_all(s.trim(), " ").into_owned()
}

/// Keep digits and decimal separators; the last separator is the decimal point,
/// earlier ones are treated as thousands separators.
fn normalize_number(s: &str) -> String {
    let value: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if value.is_empty() {
        return "0".to_string();
    }

    match value.rfind('.') {
        Some(last) if value.matches('.').count() > 1 => {
            format!("{}{}", value[..last].replace('.', ""), &value[last..])
        }
        _ => value,
    }
}

/// Parse a floating point value from display text ("1,234.5", "12.5 %")
pub fn coerce_double(s: &str) -> Option<f64> {
    normalize_number(s).parse().ok()
}

/// Parse an integer from display text, ignoring grouping separators ("1,234" -> 1234).
/// A lone dash, as some sites print for zero, yields 0.
pub fn coerce_long(s: &str) -> Option<i64> {
    let trimmed = s.trim();
    if trimmed == "-" {
        return Some(0);
    }

    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

pub fn coerce_int(s: &str) -> Option<i32> {
    coerce_long(s).and_then(|v| i32::try_from(v).ok())
}

/// First run of digits in a string, e.g. an id inside a URL
pub fn long_from_string(s: &str) -> Option<i64> {
    FIRST_NUMBER
        .captures(s)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Size text such as "1.5 GB", "700 MiB" or "1,024.00 KB" in bytes (1024-based).
/// Text without a recognised unit is taken as a plain byte count.
pub fn get_bytes(s: &str) -> Option<u64> {
    let number: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if number.is_empty() {
        return None;
    }

    let value = coerce_double(&number)?;
    let unit: String = s
        .chars()
        .filter(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase()
        .replace('i', "");

    let multiplier = if unit.contains("kb") {
        1024f64
    } else if unit.contains("mb") {
        1024f64.powi(2)
    } else if unit.contains("gb") {
        1024f64.powi(3)
    } else if unit.contains("tb") {
        1024f64.powi(4)
    } else if unit.contains("pb") {
        1024f64.powi(5)
    } else {
        1.0
    };

    Some((value * multiplier) as u64)
}

/// Numeric part of an IMDb id, accepting "tt0133093", "0133093" or "133093"
pub fn imdb_id_number(s: &str) -> Option<u32> {
    IMDB_ID
        .captures(s.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Canonical IMDb id: "tt" plus at least seven zero-padded digits
pub fn full_imdb_id(s: &str) -> Option<String> {
    imdb_id_number(s).map(|id| {
        if id > 9_999_999 {
            format!("tt{id:08}")
        } else {
            format!("tt{id:07}")
        }
    })
}

/// Value of a query-string argument in a URL, if present
pub fn query_argument(url: &str, argument: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == argument)
        .map(|(_, value)| value.into_owned())
}

/// Decode HTML entities ("Tom &amp; Jerry" -> "Tom & Jerry")
pub fn html_decode(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    scraper::Html::parse_fragment(s)
        .root_element()
        .text()
        .collect()
}

/// Deserialize a count that APIs send as a number, a numeric string or null.
/// Use with `#[serde(default, deserialize_with = "lenient_u64")]`.
pub fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Int(n)) => Some(n),
        Some(Raw::Float(f)) if f >= 0.0 => Some(f as u64),
        Some(Raw::Text(s)) => coerce_long(&s).and_then(|v| u64::try_from(v).ok()),
        _ => None,
    })
}
