//! Anchor locator.
//!
//! Finds landmark cells ("時間軸コード", "総合", "先行指数", ...) inside an
//! unlabeled grid. Scans are row-major and left-to-right, each cell is matched
//! on its own, and numeric or date cells never match. Not finding anything is a
//! normal outcome: every function here returns an empty result rather than an
//! error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::error::ProfileError;
use crate::grid::{Cell, Grid};

// =============================================================================
// Pattern
// =============================================================================

/// Textual test applied to a single cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PatternSpec", into = "PatternSpec")]
pub enum Pattern {
    /// Cell text contains the substring.
    Substring(String),
    /// Cell text contains any of the substrings.
    AnyOf(Vec<String>),
    /// Trimmed cell text equals one of the values.
    Exact(Vec<String>),
    /// Cell text matches the regular expression.
    Regex(Regex),
}

/// Serialized form of a [`Pattern`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternSpec {
    Substring { value: String },
    AnyOf { values: Vec<String> },
    Exact { values: Vec<String> },
    Regex { value: String },
}

impl Pattern {
    pub fn substring(s: impl Into<String>) -> Self {
        Pattern::Substring(s.into())
    }

    pub fn any_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern::AnyOf(values.into_iter().map(Into::into).collect())
    }

    pub fn exact<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern::Exact(values.into_iter().map(Into::into).collect())
    }

    /// Compile a regular expression pattern.
    pub fn regex(expr: &str) -> Result<Self, ProfileError> {
        Regex::new(expr)
            .map(Pattern::Regex)
            .map_err(|e| ProfileError::InvalidPattern {
                pattern: expr.to_string(),
                message: e.to_string(),
            })
    }

    /// Test a piece of text.
    pub fn matches_text(&self, text: &str) -> bool {
        match self {
            Pattern::Substring(s) => !s.is_empty() && text.contains(s.as_str()),
            Pattern::AnyOf(values) => values
                .iter()
                .any(|s| !s.is_empty() && text.contains(s.as_str())),
            Pattern::Exact(values) => {
                let trimmed = text.trim();
                values.iter().any(|s| s == trimmed)
            }
            Pattern::Regex(re) => re.is_match(text),
        }
    }

    /// Test a cell. Only text cells can match.
    pub fn matches(&self, cell: &Cell) -> bool {
        match cell {
            Cell::Text(text) => self.matches_text(text),
            _ => false,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Substring(s) => write!(f, "\"{}\"", s),
            Pattern::AnyOf(values) => {
                let quoted: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
                write!(f, "any of [{}]", quoted.join(", "))
            }
            Pattern::Exact(values) => write!(f, "exactly one of [{}]", values.join(", ")),
            Pattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl TryFrom<PatternSpec> for Pattern {
    type Error = ProfileError;

    fn try_from(spec: PatternSpec) -> Result<Self, Self::Error> {
        match spec {
            PatternSpec::Substring { value } => Ok(Pattern::Substring(value)),
            PatternSpec::AnyOf { values } => Ok(Pattern::AnyOf(values)),
            PatternSpec::Exact { values } => Ok(Pattern::Exact(values)),
            PatternSpec::Regex { value } => Pattern::regex(&value),
        }
    }
}

impl From<Pattern> for PatternSpec {
    fn from(pattern: Pattern) -> Self {
        match pattern {
            Pattern::Substring(value) => PatternSpec::Substring { value },
            Pattern::AnyOf(values) => PatternSpec::AnyOf { values },
            Pattern::Exact(values) => PatternSpec::Exact { values },
            Pattern::Regex(re) => PatternSpec::Regex {
                value: re.as_str().to_string(),
            },
        }
    }
}

// =============================================================================
// Anchor
// =============================================================================

/// A located landmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// Label of the landmark (the pattern that found it).
    pub label: String,
    pub row: usize,
    pub column: usize,
    /// Text of the matched cell.
    pub text: String,
}

impl Anchor {
    fn new(pattern: &Pattern, row: usize, column: usize, cell: &Cell) -> Self {
        Self {
            label: pattern.to_string(),
            row,
            column,
            text: cell.to_text().into_owned(),
        }
    }
}

/// All cells matching `pattern`, in row-major order.
///
/// `scan_limit` caps the number of rows searched (header regions).
pub fn locate(grid: &Grid, pattern: &Pattern, scan_limit: Option<usize>) -> Vec<Anchor> {
    let rows = 0..scan_limit.map_or(grid.height(), |limit| limit.min(grid.height()));
    locate_in(grid, pattern, rows, None)
}

/// First match in row-major order.
pub fn locate_first(grid: &Grid, pattern: &Pattern, scan_limit: Option<usize>) -> Option<Anchor> {
    locate_nth(grid, pattern, scan_limit, 0)
}

/// The `n`-th (zero-based) match in row-major order.
pub fn locate_nth(
    grid: &Grid,
    pattern: &Pattern,
    scan_limit: Option<usize>,
    n: usize,
) -> Option<Anchor> {
    locate(grid, pattern, scan_limit).into_iter().nth(n)
}

/// Matches inside a rectangular window.
///
/// `cols` of `None` means every column of each row. Out-of-range windows are
/// clipped, never an error.
pub fn locate_in(
    grid: &Grid,
    pattern: &Pattern,
    rows: Range<usize>,
    cols: Option<Range<usize>>,
) -> Vec<Anchor> {
    let mut found = Vec::new();
    let end_row = rows.end.min(grid.height());

    for row in rows.start..end_row {
        let cells = grid.row(row);
        let (start, end) = match &cols {
            Some(c) => (c.start, c.end.min(cells.len())),
            None => (0, cells.len()),
        };
        for col in start..end {
            let cell = &cells[col];
            if pattern.matches(cell) {
                found.push(Anchor::new(pattern, row, col, cell));
            }
        }
    }

    found
}

/// First row (within `scan_limit`) where every pattern matches at least one cell.
pub fn find_row_with_all(
    grid: &Grid,
    patterns: &[Pattern],
    scan_limit: Option<usize>,
) -> Option<usize> {
    if patterns.is_empty() {
        return None;
    }
    let limit = scan_limit.map_or(grid.height(), |l| l.min(grid.height()));

    (0..limit).find(|&row| {
        let cells = grid.row(row);
        patterns
            .iter()
            .all(|p| cells.iter().any(|cell| p.matches(cell)))
    })
}
