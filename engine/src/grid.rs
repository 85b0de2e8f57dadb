//! Grid model shared by every supplier and extractor.
//!
//! A [`Grid`] is a ragged, zero-indexed collection of rows. Spreadsheet sheets,
//! HTML tables and tab-split text dumps all end up here, so nothing downstream
//! needs to know where a table came from.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// =============================================================================
// Cell
// =============================================================================

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Cell {
    /// No content (or content that is only whitespace).
    #[default]
    Empty,
    /// Free text.
    Text(String),
    /// Native numeric value.
    Number(f64),
    /// Native date value (spreadsheet date cells).
    Date(NaiveDate),
}

static EMPTY: Cell = Cell::Empty;

impl Cell {
    /// Infer a cell from raw text: blank is empty, a plain number is numeric,
    /// everything else stays text.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() && !trimmed.starts_with('+') => Cell::Number(n),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text content, only for text cells.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content, only for numeric cells.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric content when it is a whole number.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(*n as i64),
            Cell::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Textual form used for display and pattern matching.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Cell::Empty => Cow::Borrowed(""),
            Cell::Text(s) => Cow::Borrowed(s.as_str()),
            Cell::Number(n) => Cow::Owned(n.to_string()),
            Cell::Date(d) => Cow::Owned(d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Number(n as f64)
    }
}

impl From<NaiveDate> for Cell {
    fn from(d: NaiveDate) -> Self {
        Cell::Date(d)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Empty)
    }
}

// =============================================================================
// Grid
// =============================================================================

/// Ragged rectangular container of cells.
///
/// Rows need not have equal length; any lookup past the end of a row (or
/// past the last row) yields [`Cell::Empty`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Build a grid from anything convertible into cells.
    ///
    /// ```ignore
    /// let grid = Grid::from_rows(vec![
    ///     vec![Cell::from("年月"), Cell::from("総合")],
    ///     vec![Cell::from("2024年3月"), Cell::from(101.2)],
    /// ]);
    /// ```
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// Build a grid from raw text fields, inferring cell types.
    pub fn from_text_rows<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|s| Cell::from_raw(s.as_ref())).collect())
                .collect(),
        }
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Length of the longest row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.iter().all(Cell::is_empty))
    }

    /// Cell at `(row, col)`, empty when out of bounds.
    pub fn get(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    /// Cells of one row (empty slice past the end).
    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Length of one row.
    pub fn row_width(&self, row: usize) -> usize {
        self.row(row).len()
    }

    /// Whether every cell of the row is empty.
    pub fn is_blank_row(&self, row: usize) -> bool {
        self.row(row).iter().all(Cell::is_empty)
    }

    /// Iterate rows with their index.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[Cell])> {
        self.rows.iter().enumerate().map(|(i, r)| (i, r.as_slice()))
    }

    /// Cells `start..end` of a row, padding with empties past the row end.
    pub fn window(&self, row: usize, start: usize, end: usize) -> Vec<&Cell> {
        (start..end).map(|col| self.get(row, col)).collect()
    }

    /// Append a row.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }
}
