#![forbid(unsafe_code)]

use anyhow::Result;
use chrono::NaiveDate;
use regex::Regex;

// Two digits, separator, two digits, separator, two digits.  Each separator
// position is independently '.' or ','.
pub const DATE_PATTERN: &str = r"\d{2}[.,]\d{2}[.,]\d{2}";

// Two digit years are read as 20yy.
const CENTURY: i32 = 2000;

// ---------------------------------------------------------------------------
// DateExtractor:
// ---------------------------------------------------------------------------
/// Finds date-shaped tokens in recognized text.
#[derive(Debug, Clone)]
pub struct DateExtractor {
    pattern: Regex,
}

impl DateExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self { pattern: Regex::new(DATE_PATTERN)? })
    }

    /** All non-overlapping date-shaped substrings in order of appearance.
     * No deduplication and no calendar validation.
     */
    pub fn find_all(&self, text: &str) -> Vec<String> {
        self.pattern.find_iter(text).map(|m| m.as_str().to_string()).collect()
    }

    /** Read each token as dd.mm.yy and keep only real calendar dates, sorted
     * ascending.  Duplicates are kept.
     */
    pub fn to_calendar_dates(&self, matches: &[String]) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = matches.iter().filter_map(|m| parse_token(m)).collect();
        dates.sort();
        dates
    }
}

fn parse_token(token: &str) -> Option<NaiveDate> {
    let mut parts = token.split(['.', ',']);
    let day: u32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let year: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(CENTURY + year, month, day)
}
