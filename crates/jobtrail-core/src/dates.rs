//! Post-date inference for listing and ad pages.
//!
//! Listing pages on the classifieds site show relative or year-less dates
//! ("Today", "Yesterday", "12 Jan"). The year is inferred under the
//! assumption that no listed ad is older than one year: a month later in the
//! calendar than the current month belongs to the previous year.
//!
//! Known edge case: a year-less date in the *current* month but with a day
//! after today (e.g. "20 Jan" read on 5 January) is assigned the current
//! year and therefore lands in the future. The site does not list ads that
//! old, so the rule is kept as is rather than guessing.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Resolve a listing-page date label against `today`.
///
/// Returns `None` when the label is not recognised.
pub fn infer_post_date(label: &str, today: NaiveDate) -> Option<NaiveDate> {
    let label = label.trim();
    let lower = label.to_lowercase();
    if lower.contains("today") {
        return Some(today);
    }
    if lower.contains("yesterday") {
        return today.checked_sub_days(Days::new(1));
    }

    let mut parts = lower.split_whitespace();
    let day: u32 = parts.next()?.parse().ok()?;
    let month = month_number(parts.next()?)?;
    let year = infer_year(month, today);
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Year for a year-less `month`, assuming the date is at most a year old.
pub fn infer_year(month: u32, today: NaiveDate) -> i32 {
    if today.month() >= month {
        today.year()
    } else {
        today.year() - 1
    }
}

/// Month number (1-12) from an English month name or abbreviation.
pub fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.trim().to_lowercase().chars().take(3).collect();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|idx| idx as u32 + 1)
}

/// Parse the classifieds ad-page timestamp, e.g. `"14:05, 12 January 2024"`.
pub fn parse_ad_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), "%H:%M, %d %B %Y").ok()
}

/// Parse a job board `time`/`title` attribute,
/// e.g. `"Wednesday, January 10, 2024 at 2:05PM"`.
pub fn parse_job_board_timestamp(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = [
        "%A, %B %d, %Y at %I:%M%p",
        "%A, %B %d, %Y at%I:%M%p",
        "%A, %B %d, %Y at %H:%M",
    ];
    let text = text.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}
