use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Spreadsheet date literal; the month is zero-based.
re!(re_sheet_literal, r"^Date\((\d{1,4}),\s*(\d{1,2}),\s*(\d{1,2})");
re!(re_year_first, r"(\d{4})[/.\-](\d{1,2})[/.\-](\d{1,2})");
re!(re_day_first, r"(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})");

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y",
];

/// Calendar components read from a date cell. Regex-extracted parts are not
/// validated against the calendar; they only need to compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl From<NaiveDate> for DateParts {
    fn from(d: NaiveDate) -> Self {
        Self { year: d.year(), month: d.month(), day: d.day() }
    }
}

/// Reads the calendar date in `text`.
///
/// Well-formed dates are tried first (the spreadsheet `Date(y,m,d)` literal,
/// RFC 3339, ISO date-times and a few named-month layouts). Anything else
/// falls back to extracting `YYYY-MM-DD` or `DD/MM/YYYY` shaped digits, with
/// `/`, `-` or `.` as separators.
pub fn parse_date_parts(text: &str) -> Option<DateParts> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = re_sheet_literal().captures(text) {
        let year = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return Some(DateParts { year, month: month + 1, day });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive().into());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date().into());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Some(d.into());
        }
    }

    if let Some(caps) = re_year_first().captures(text) {
        return Some(DateParts {
            year: caps[1].parse().ok()?,
            month: caps[2].parse().ok()?,
            day: caps[3].parse().ok()?,
        });
    }
    if let Some(caps) = re_day_first().captures(text) {
        return Some(DateParts {
            day: caps[1].parse().ok()?,
            month: caps[2].parse().ok()?,
            year: caps[3].parse().ok()?,
        });
    }

    None
}

/// Optional day / month / year constraints; unset components are not checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFilter {
    pub day: Option<u32>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

impl DateFilter {
    pub fn new(day: Option<u32>, month: Option<u32>, year: Option<i32>) -> Self {
        Self { day, month, year }
    }

    pub fn is_empty(&self) -> bool {
        self.day.is_none() && self.month.is_none() && self.year.is_none()
    }

    pub fn is_year_only(&self) -> bool {
        self.year.is_some() && self.day.is_none() && self.month.is_none()
    }

    pub fn matches_parts(&self, parts: &DateParts) -> bool {
        self.day.map_or(true, |d| d == parts.day)
            && self.month.map_or(true, |m| m == parts.month)
            && self.year.map_or(true, |y| y == parts.year)
    }

    /// Checks a date cell's text against the filter.
    ///
    /// An unparseable cell only passes a year-only filter, and only when the
    /// year appears verbatim in the text.
    pub fn matches_text(&self, text: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        match parse_date_parts(text) {
            Some(parts) => self.matches_parts(&parts),
            None => match self.year {
                Some(year) if self.is_year_only() => text.contains(&year.to_string()),
                _ => false,
            },
        }
    }
}
