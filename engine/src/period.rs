//! Period keys and the date normalizer.
//!
//! Source tables spell dates in many ways: spreadsheet date cells,
//! `2024年3月`, `2024/03`, separate year and month columns, fiscal years,
//! quarters. [`normalize`] folds all of them into one [`Period`] whose
//! canonical key (`YYYY`, `YYYYQn`, `YYYYMM`) sorts lexicographically in
//! chronological order.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::grid::Cell;

/// Inclusive year range accepted as a date.
pub const YEAR_RANGE: (i64, i64) = (1900, 2100);

// =============================================================================
// Frequency & Period
// =============================================================================

/// Granularity of a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Annual,
    Quarterly,
    Monthly,
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "annual" | "yearly" | "a" | "y" => Ok(Frequency::Annual),
            "quarterly" | "q" => Ok(Frequency::Quarterly),
            "monthly" | "m" => Ok(Frequency::Monthly),
            other => Err(format!("unknown frequency '{}'", other)),
        }
    }
}

/// Canonical, sortable period key.
///
/// Ordering agrees with the lexicographic order of [`Period::key`]: by year,
/// then within one year `YYYY` < `YYYYMM` < `YYYYQn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Annual(u16),
    Quarterly(u16, u8),
    Monthly(u16, u8),
}

impl Period {
    /// Validated constructors. Out-of-range values are not dates.
    pub fn annual(year: i64) -> Option<Self> {
        valid_year(year).map(Period::Annual)
    }

    pub fn quarterly(year: i64, quarter: i64) -> Option<Self> {
        let year = valid_year(year)?;
        (1..=4).contains(&quarter).then_some(Period::Quarterly(year, quarter as u8))
    }

    pub fn monthly(year: i64, month: i64) -> Option<Self> {
        let year = valid_year(year)?;
        (1..=12).contains(&month).then_some(Period::Monthly(year, month as u8))
    }

    pub fn from_date(date: NaiveDate) -> Option<Self> {
        Period::monthly(date.year() as i64, date.month() as i64)
    }

    pub fn year(&self) -> u16 {
        match self {
            Period::Annual(y) | Period::Quarterly(y, _) | Period::Monthly(y, _) => *y,
        }
    }

    pub fn frequency(&self) -> Frequency {
        match self {
            Period::Annual(_) => Frequency::Annual,
            Period::Quarterly(..) => Frequency::Quarterly,
            Period::Monthly(..) => Frequency::Monthly,
        }
    }

    /// Truncate to a coarser frequency. `None` when `target` is finer.
    pub fn coarsen(&self, target: Frequency) -> Option<Self> {
        match (*self, target) {
            (p, t) if p.frequency() == t => Some(p),
            (Period::Monthly(y, m), Frequency::Quarterly) => Some(Period::Quarterly(y, (m - 1) / 3 + 1)),
            (Period::Monthly(y, _), Frequency::Annual) | (Period::Quarterly(y, _), Frequency::Annual) => {
                Some(Period::Annual(y))
            }
            _ => None,
        }
    }

    fn sort_key(&self) -> (u16, u8, u8) {
        match *self {
            Period::Annual(y) => (y, 0, 0),
            Period::Monthly(y, m) => (y, 1, m),
            Period::Quarterly(y, q) => (y, 2, q),
        }
    }

    /// Canonical key: `YYYY`, `YYYYQn` or `YYYYMM`.
    pub fn key(&self) -> String {
        match self {
            Period::Annual(y) => format!("{:04}", y),
            Period::Quarterly(y, q) => format!("{:04}Q{}", y, q),
            Period::Monthly(y, m) => format!("{:04}{:02}", y, m),
        }
    }
}

fn valid_year(year: i64) -> Option<u16> {
    (YEAR_RANGE.0..=YEAR_RANGE.1).contains(&year).then_some(year as u16)
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Period {
    type Err = String;

    /// Parse a canonical key.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_canonical(s.trim()).ok_or_else(|| format!("not a canonical period key: '{}'", s))
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Text patterns
// =============================================================================

static CANONICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})(?:(\d{2})|Q([1-4]))?$").expect("valid regex"));

// 2024年3月, 2024年 3月分
static YEAR_MONTH_JA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月").expect("valid regex"));

// 2024/03, 2024-03-01, 2024.3
static YEAR_MONTH_SEP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{4})\s*[/\-.]\s*(\d{1,2})(?:\D|$)").expect("valid regex"));

// 2024Q1, 2024 Q1, 2024年第1四半期, 2024年1～3月期
static QUARTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})\s*(?:[Qq]\s*([1-4])|年\s*第\s*([1-4])\s*四半期|年\s*(\d{1,2})\s*[-～~〜]\s*(\d{1,2})\s*月期)")
        .expect("valid regex")
});

// 2024年, 2024年度, FY2024
static YEAR_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:FY\s*)?(\d{4})\s*(?:年度?|年平均)?$").expect("valid regex"));

fn parse_canonical(s: &str) -> Option<Period> {
    let caps = CANONICAL.captures(s)?;
    let year: i64 = caps[1].parse().ok()?;
    match (caps.get(2), caps.get(3)) {
        (Some(m), _) => Period::monthly(year, m.as_str().parse().ok()?),
        (None, Some(q)) => Period::quarterly(year, q.as_str().parse().ok()?),
        (None, None) => Period::annual(year),
    }
}

fn capture_i64(caps: &regex::Captures<'_>, idx: usize) -> Option<i64> {
    caps.get(idx)?.as_str().parse().ok()
}

/// Recognize a period in one piece of text.
pub fn parse_text(text: &str) -> Option<Period> {
    let text = normalize_digits(text.trim());
    let text = text.as_str();
    if text.is_empty() {
        return None;
    }

    if let Some(p) = parse_canonical(text) {
        return Some(p);
    }
    if let Some(caps) = QUARTER.captures(text) {
        let year = capture_i64(&caps, 1)?;
        if let Some(q) = capture_i64(&caps, 2).or_else(|| capture_i64(&caps, 3)) {
            return Period::quarterly(year, q);
        }
        let (first, last) = (capture_i64(&caps, 4)?, capture_i64(&caps, 5)?);
        if last == first + 2 && first % 3 == 1 {
            return Period::quarterly(year, first / 3 + 1);
        }
        return None;
    }
    if let Some(caps) = YEAR_MONTH_JA.captures(text) {
        return Period::monthly(capture_i64(&caps, 1)?, capture_i64(&caps, 2)?);
    }
    if let Some(caps) = YEAR_MONTH_SEP.captures(text) {
        return Period::monthly(capture_i64(&caps, 1)?, capture_i64(&caps, 2)?);
    }
    if let Some(caps) = YEAR_ONLY.captures(text) {
        return Period::annual(capture_i64(&caps, 1)?);
    }
    None
}

/// Fold full-width digits (０-９) to ASCII.
fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            _ => c,
        })
        .collect()
}

// =============================================================================
// Normalizer
// =============================================================================

/// Recognize a period in a single cell.
pub fn normalize_cell(cell: &Cell) -> Option<Period> {
    match cell {
        Cell::Empty => None,
        Cell::Date(d) => Period::from_date(*d),
        Cell::Text(s) => parse_text(s),
        Cell::Number(_) => {
            let n = cell.as_integer()?;
            if n >= 100_000 {
                Period::monthly(n / 100, n % 100)
            } else {
                Period::annual(n)
            }
        }
    }
}

/// Normalize the cells of a date window into a period.
///
/// Tried in order: a native date cell, a text cell carrying a period, a pair
/// of adjacent integer cells (year, month), a lone year. A year followed by a
/// blank or out-of-range month is rejected rather than read as a year.
/// Returns `None` when nothing recognizable is present; callers skip such
/// rows.
pub fn normalize(cells: &[&Cell]) -> Option<Period> {
    if let Some(p) = cells.iter().find_map(|c| match c {
        Cell::Date(d) => Period::from_date(*d),
        _ => None,
    }) {
        return Some(p);
    }

    // A bare year text next to a month cell is still a year/month pair, so
    // annual text only wins after the pair check.
    if let Some(p) = cells
        .iter()
        .filter_map(|c| match c {
            Cell::Text(s) => parse_text(s),
            _ => None,
        })
        .find(|p| p.frequency() != Frequency::Annual)
    {
        return Some(p);
    }

    match pair_period(cells, '月', Period::monthly) {
        Pair::Found(p) => Some(p),
        Pair::Rejected => None,
        Pair::Absent => cells.iter().find_map(|c| normalize_cell(c)),
    }
}

/// Same as [`normalize`], but adjacent integer pairs are read as (year, quarter).
pub fn normalize_quarterly(cells: &[&Cell]) -> Option<Period> {
    match pair_period(cells, 'Q', Period::quarterly) {
        Pair::Found(p) => Some(p),
        Pair::Rejected => None,
        Pair::Absent => normalize(cells),
    }
}

enum Pair {
    Found(Period),
    /// A year followed by a blank or invalid sub-period cell.
    Rejected,
    Absent,
}

/// First (year, sub-period) pair of adjacent cells.
fn pair_period(cells: &[&Cell], marker: char, build: fn(i64, i64) -> Option<Period>) -> Pair {
    for pair in cells.windows(2) {
        let Some(year) = year_value(pair[0]) else {
            continue;
        };
        if pair[1].is_empty() {
            return Pair::Rejected;
        }
        if let Some(sub) = sub_value(pair[1], marker) {
            return match build(year, sub) {
                Some(p) => Pair::Found(p),
                None => Pair::Rejected,
            };
        }
    }
    Pair::Absent
}

/// Year component of a cell used in a (year, month) pair: `2024` or `2024年`.
fn year_value(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Text(s) => match parse_text(s)? {
            Period::Annual(y) => Some(y as i64),
            _ => None,
        },
        other => other.as_integer().filter(|y| valid_year(*y).is_some()),
    }
}

/// Month or quarter component of a pair: `3`, `3月`, `Q3`.
fn sub_value(cell: &Cell, marker: char) -> Option<i64> {
    match cell {
        Cell::Text(s) => {
            let s = normalize_digits(s.trim());
            s.trim_end_matches(marker)
                .trim_start_matches(marker)
                .trim()
                .parse()
                .ok()
        }
        other => other.as_integer(),
    }
}
