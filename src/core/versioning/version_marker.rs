// Filename version markers.
//
// Documents carry their version in the filename, e.g.
// `Resume (Jan 2024, Software).pdf`. Every bit of string surgery on that
// convention lives here so it can later be swapped for structured metadata
// without touching the reconciler.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// The date portion of a filename's first parenthesized group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker {
    /// Exact text taken from the filename, e.g. `"Jan 2024"`.
    pub raw: String,
    /// First day of the marked month. Only month and year are meaningful.
    pub month: NaiveDate,
}

/// A filename split into its logical identity and its version marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedName {
    /// The filename with the marker text removed. Surrounding punctuation and
    /// any tag after the comma are kept, so `", Software"` must match exactly.
    pub identity: String,
    pub marker: VersionMarker,
}

fn first_group_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\((.*?)\)").expect("static regex is valid"))
}

fn month_year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z]{3})\s+([0-9]{4})$").expect("static regex is valid")
    })
}

/// Parses `"<Mon> <Year>"` (strftime `%b %Y`) into the first day of that month.
///
/// Month abbreviations are English and case-insensitive; full month names,
/// surrounding whitespace and year 0 are rejected.
pub fn parse_month_year(text: &str) -> Option<NaiveDate> {
    let caps = month_year_pattern().captures(text)?;

    let abbreviation = caps[1].to_ascii_lowercase();
    let month = MONTH_ABBREVIATIONS
        .iter()
        .position(|m| *m == abbreviation)? as u32
        + 1;

    let year: i32 = caps[2].parse().ok()?;
    if year == 0 {
        return None;
    }

    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Splits a filename into identity and version marker.
///
/// Returns `None` when the name has no parenthesized group or when the text
/// before the first comma inside that group is not a `%b %Y` date. Such
/// files never take part in version comparison.
pub fn parse_versioned_name(file_name: &str) -> Option<VersionedName> {
    let group = first_group_pattern().captures(file_name)?.get(1)?.as_str();
    let raw = group.split(',').next().unwrap_or(group);
    let month = parse_month_year(raw)?;

    Some(VersionedName {
        identity: file_name.replace(raw, ""),
        marker: VersionMarker {
            raw: raw.to_string(),
            month,
        },
    })
}
