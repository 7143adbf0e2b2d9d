use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;

static TRAILING_ANNOTATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^()]*\)\s*$").unwrap());

/// Stand-in for unparsable dates. Only meaningful together with a validity flag.
pub static DATE_SENTINEL: LazyLock<NaiveDateTime> = LazyLock::new(|| {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
});

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d, %H:%M",
    "%H:%M, %d %B %Y",
    "%H:%M, %Y %B %d",
    "%H:%M, %B %d, %Y",
    "%H:%M %d %B %Y",
    "%d %B %Y %H:%M",
    "%B %d, %Y %H:%M",
];

/// Month and year only; parsed against the first of the month.
const MONTH_YEAR_FORMATS: &[&str] = &["%d %B %Y", "%d %B, %Y"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%d %B, %Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%Y %B %d",
];

/// chrono's `%Y` takes any digit count, so a misread day can leave a
/// one or two digit year behind. Such parses are rejected.
const MIN_YEAR: i32 = 1000;

fn plausible(dt: NaiveDateTime) -> Option<NaiveDateTime> {
    (dt.year() >= MIN_YEAR).then_some(dt)
}

fn midnight(d: NaiveDate) -> Option<NaiveDateTime> {
    d.and_hms_opt(0, 0, 0).and_then(plausible)
}

/// Parse a loosely written action date. A trailing parenthesised
/// annotation such as `(UTC)` is ignored. Month-year dates resolve to
/// the first of the month.
pub fn parse_action_date(raw: &str) -> Option<NaiveDateTime> {
    let cleaned = TRAILING_ANNOTATION_RE.replace(raw.trim(), "");
    let cleaned = cleaned.trim().trim_end_matches('.');
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(cleaned) {
        return plausible(dt.naive_utc());
    }
    let first_of_month = format!("1 {}", cleaned);
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(cleaned, fmt).ok().and_then(plausible))
        .or_else(|| {
            MONTH_YEAR_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&first_of_month, fmt).ok().and_then(midnight))
        })
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(cleaned, fmt).ok().and_then(midnight))
        })
}
