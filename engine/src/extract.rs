//! Series extractor
//!
//! Walks the data rows of a resolved [`Layout`] and produces one [`Series`]
//! per metric column. There is no "end of data" marker: a row whose date
//! window does not normalize is skipped, which is how trailing footnotes and
//! notes disappear. One bad cell never aborts the extraction, it only drops
//! that value and leaves a [`SkippedRow`] behind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::grid::{Cell, Grid};
use crate::layout::{Layout, MetricColumn};
use crate::period::{normalize, normalize_quarterly, Frequency, Period};

/// Placeholder tokens treated as explicit missing values.
pub const DEFAULT_PLACEHOLDERS: &[&str] = &["*", "-", "－", "―", "…", "***", "x", "X"];

// =============================================================================
// Options
// =============================================================================

/// Per-table extraction switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Tokens that mean "no value" (blank cells always do).
    #[serde(default = "default_placeholders")]
    pub placeholders: Vec<String>,

    /// Expected period frequency. Finer periods are truncated to it,
    /// coarser ones are skipped.
    #[serde(default)]
    pub frequency: Option<Frequency>,

    /// Read adjacent integer date cells as (year, quarter) instead of (year, month).
    #[serde(default)]
    pub quarterly_pairs: bool,
}

fn default_placeholders() -> Vec<String> {
    DEFAULT_PLACEHOLDERS.iter().map(|s| s.to_string()).collect()
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            placeholders: default_placeholders(),
            frequency: None,
            quarterly_pairs: false,
        }
    }
}

// =============================================================================
// Series
// =============================================================================

/// One metric's values, ordered by period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    metric: String,
    points: BTreeMap<Period, Option<f64>>,
}

impl Series {
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            points: BTreeMap::new(),
        }
    }

    /// Build from known points (later duplicates win).
    pub fn from_points<I>(metric: impl Into<String>, points: I) -> Self
    where
        I: IntoIterator<Item = (Period, Option<f64>)>,
    {
        Self {
            metric: metric.into(),
            points: points.into_iter().collect(),
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `None` when the period is absent, `Some(None)` when it is explicitly missing.
    pub fn get(&self, period: &Period) -> Option<Option<f64>> {
        self.points.get(period).copied()
    }

    /// Points in ascending period order.
    pub fn iter(&self) -> impl Iterator<Item = (&Period, &Option<f64>)> {
        self.points.iter()
    }

    pub fn periods(&self) -> impl Iterator<Item = &Period> {
        self.points.keys()
    }

    pub fn first_period(&self) -> Option<Period> {
        self.points.keys().next().copied()
    }

    pub fn last_period(&self) -> Option<Period> {
        self.points.keys().next_back().copied()
    }

    /// Count of explicitly missing values.
    pub fn missing_count(&self) -> usize {
        self.points.values().filter(|v| v.is_none()).count()
    }

    /// Same points under another name.
    pub fn renamed(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }

    fn insert(&mut self, period: Period, value: Option<f64>) {
        self.points.insert(period, value);
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Why a row (or one of its values) was skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipReason {
    /// Date window did not normalize (footnote, note, blank-ish row).
    NoDate,
    /// Period granularity does not fit the expected frequency.
    FrequencyMismatch { period: Period },
    /// Value is neither a number nor a placeholder.
    InvalidValue { metric: String, raw: String },
}

/// A row that was skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub row: usize,
    #[serde(flatten)]
    pub reason: SkipReason,
}

impl std::fmt::Display for SkippedRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            SkipReason::NoDate => write!(f, "row {}: no recognizable date", self.row),
            SkipReason::FrequencyMismatch { period } => {
                write!(f, "row {}: period {} coarser than expected", self.row, period)
            }
            SkipReason::InvalidValue { metric, raw } => {
                write!(f, "row {}: '{}' is not a number ({})", self.row, raw, metric)
            }
        }
    }
}

/// Result of extracting one layout.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    /// One series per metric column, in layout order.
    pub series: Vec<Series>,
    /// Rows or values that were dropped.
    pub skipped: Vec<SkippedRow>,
    /// Blank rows passed over silently.
    pub blank_rows: usize,
    /// Rows that produced a period.
    pub dated_rows: usize,
}

impl Extraction {
    /// Check if every data row was used
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn series(&self, metric: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.metric() == metric)
    }

    /// Get summary statistics
    pub fn summary(&self) -> String {
        let points: usize = self.series.iter().map(Series::len).sum();
        format!(
            "Extracted: {} series, {} points from {} dated rows, {} skipped, {} blank",
            self.series.len(),
            points,
            self.dated_rows,
            self.skipped.len(),
            self.blank_rows
        )
    }
}

// =============================================================================
// Numeric coercion
// =============================================================================

/// Outcome of reading a value cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Value(f64),
    /// Blank or placeholder.
    Missing,
    /// Not a number; raw text kept for the diagnostic.
    Invalid(String),
}

/// Read a value cell: strip thousands separators and whitespace, parse a
/// float, map placeholders and blanks to missing.
pub fn coerce_number(cell: &Cell, placeholders: &[String]) -> Coerced {
    match cell {
        Cell::Empty => Coerced::Missing,
        Cell::Number(n) if n.is_finite() => Coerced::Value(*n),
        Cell::Number(n) => Coerced::Invalid(n.to_string()),
        Cell::Date(d) => Coerced::Invalid(d.to_string()),
        Cell::Text(raw) => {
            let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || c == '\u{3000}');
            if trimmed.is_empty() || placeholders.iter().any(|p| p == trimmed) {
                return Coerced::Missing;
            }
            let cleaned: String = trimmed
                .chars()
                .filter(|c| !matches!(c, ',' | '，' | ' ' | '\u{3000}'))
                .map(|c| match c {
                    '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
                    '．' => '.',
                    '－' | '−' | '▲' | '△' => '-',
                    other => other,
                })
                .collect();
            match cleaned.parse::<f64>() {
                Ok(n) if n.is_finite() => Coerced::Value(n),
                _ => Coerced::Invalid(trimmed.to_string()),
            }
        }
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Extract every metric column of a layout.
pub fn extract(grid: &Grid, layout: &Layout, options: &ExtractOptions) -> Extraction {
    extract_columns(grid, layout, &layout.metric_columns, options)
}

/// Extract a single metric by name. `None` when the layout has no such metric.
pub fn extract_metric(
    grid: &Grid,
    layout: &Layout,
    metric: &str,
    options: &ExtractOptions,
) -> Option<Extraction> {
    let column = layout.metric(metric)?.clone();
    Some(extract_columns(grid, layout, std::slice::from_ref(&column), options))
}

fn extract_columns(
    grid: &Grid,
    layout: &Layout,
    columns: &[MetricColumn],
    options: &ExtractOptions,
) -> Extraction {
    let mut result = Extraction {
        series: columns.iter().map(|c| Series::new(c.name.clone())).collect(),
        ..Extraction::default()
    };
    let window = layout.date_window;

    for row in layout.data_rows(grid) {
        if grid.is_blank_row(row) {
            result.blank_rows += 1;
            continue;
        }

        let cells = grid.window(row, window.start, window.end);
        let period = if options.quarterly_pairs {
            normalize_quarterly(&cells)
        } else {
            normalize(&cells)
        };
        let Some(period) = period else {
            result.skipped.push(SkippedRow {
                row,
                reason: SkipReason::NoDate,
            });
            continue;
        };

        let period = match options.frequency {
            Some(freq) => match period.coarsen(freq) {
                Some(p) => p,
                None => {
                    result.skipped.push(SkippedRow {
                        row,
                        reason: SkipReason::FrequencyMismatch { period },
                    });
                    continue;
                }
            },
            None => period,
        };
        result.dated_rows += 1;

        for (series, column) in result.series.iter_mut().zip(columns) {
            match coerce_number(grid.get(row, column.column), &options.placeholders) {
                Coerced::Value(v) => series.insert(period, Some(v)),
                Coerced::Missing => series.insert(period, None),
                Coerced::Invalid(raw) => result.skipped.push(SkippedRow {
                    row,
                    reason: SkipReason::InvalidValue {
                        metric: column.name.clone(),
                        raw,
                    },
                }),
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Pattern;
    use crate::layout::{resolve, LayoutRules, MetricRule};

    fn placeholders() -> Vec<String> {
        ExtractOptions::default().placeholders
    }

    fn single_metric_layout(data_start_row: usize) -> Layout {
        Layout::manual(0, vec![("value".into(), 1)], data_start_row, 0..1).unwrap()
    }

    #[test]
    fn test_coerce_number() {
        let p = placeholders();
        assert_eq!(coerce_number(&Cell::from("2,345.6"), &p), Coerced::Value(2345.6));
        assert_eq!(coerce_number(&Cell::from(" 101.2 "), &p), Coerced::Value(101.2));
        assert_eq!(coerce_number(&Cell::from("▲0.3"), &p), Coerced::Value(-0.3));
        assert_eq!(coerce_number(&Cell::from("１０２．５"), &p), Coerced::Value(102.5));
        assert_eq!(coerce_number(&Cell::Number(7.0), &p), Coerced::Value(7.0));
        assert_eq!(coerce_number(&Cell::Empty, &p), Coerced::Missing);
        assert_eq!(coerce_number(&Cell::from("  "), &p), Coerced::Missing);
        assert_eq!(coerce_number(&Cell::from("abc"), &p), Coerced::Invalid("abc".into()));
    }

    #[test]
    fn test_placeholders_are_missing() {
        let p = placeholders();
        for token in ["*", "-", ""] {
            assert_eq!(coerce_number(&Cell::from(token), &p), Coerced::Missing, "token {token:?}");
        }
    }

    #[test]
    fn test_cpi_scenario() {
        let grid = Grid::new(vec![
            vec![Cell::from("消費者物価指数")],
            vec![],
            vec![],
            vec![Cell::Empty, Cell::Empty, Cell::Empty, Cell::Empty, Cell::from("総合")],
            vec![],
            vec![Cell::from("時間軸コード")],
            vec![Cell::Empty, Cell::from("2024年3月"), Cell::Empty, Cell::Empty, Cell::from("2,345.6")],
        ]);
        let rules = LayoutRules::new(
            Pattern::substring("時間軸コード"),
            vec![MetricRule::new("total", Some(Pattern::substring("総合")), 12)],
        );
        let layout = resolve(&grid, &rules).unwrap();
        let result = extract(&grid, &layout, &ExtractOptions::default());

        let series = result.series("total").unwrap();
        let points: Vec<(String, Option<f64>)> = series.iter().map(|(p, v)| (p.key(), *v)).collect();
        assert_eq!(points, vec![("202403".to_string(), Some(2345.6))]);
        assert!(result.is_clean());
    }

    #[test]
    fn test_round_trip_with_footnotes() {
        let known = [("2023年11月", 98.5), ("2023年12月", 99.0), ("2024年1月", 100.25)];
        let mut rows = vec![vec![Cell::from("年月"), Cell::from("値")]];
        for (i, (date, value)) in known.iter().enumerate() {
            rows.push(vec![Cell::from(*date), Cell::from(*value)]);
            if i == 1 {
                rows.push(vec![]);
                rows.push(vec![Cell::from("注：速報値")]);
            }
        }
        rows.push(vec![Cell::from("資料：総務省統計局")]);
        let grid = Grid::new(rows);

        let result = extract(&grid, &single_metric_layout(1), &ExtractOptions::default());
        let series = &result.series[0];
        let got: Vec<(String, Option<f64>)> = series.iter().map(|(p, v)| (p.key(), *v)).collect();
        assert_eq!(
            got,
            vec![
                ("202311".to_string(), Some(98.5)),
                ("202312".to_string(), Some(99.0)),
                ("202401".to_string(), Some(100.25)),
            ]
        );
        assert_eq!(result.blank_rows, 1);
        assert_eq!(result.skipped.len(), 2);
        assert!(result.skipped.iter().all(|s| s.reason == SkipReason::NoDate));
    }

    #[test]
    fn test_garbage_dropped_placeholders_kept() {
        let grid = Grid::new(vec![
            vec![Cell::from("header")],
            vec![Cell::from("2024/01"), Cell::from("*")],
            vec![Cell::from("2024/02"), Cell::from("abc")],
            vec![Cell::from("2024/03"), Cell::from("-")],
            vec![Cell::from("2024/04"), Cell::from("1.5")],
        ]);
        let result = extract(&grid, &single_metric_layout(1), &ExtractOptions::default());
        let series = &result.series[0];

        assert_eq!(series.get(&Period::Monthly(2024, 1)), Some(None));
        assert_eq!(series.get(&Period::Monthly(2024, 2)), None);
        assert_eq!(series.get(&Period::Monthly(2024, 3)), Some(None));
        assert_eq!(series.get(&Period::Monthly(2024, 4)), Some(Some(1.5)));
        assert_eq!(
            result.skipped,
            vec![SkippedRow {
                row: 2,
                reason: SkipReason::InvalidValue {
                    metric: "value".into(),
                    raw: "abc".into()
                }
            }]
        );
    }

    #[test]
    fn test_duplicates_last_wins_and_sorted() {
        let grid = Grid::new(vec![
            vec![Cell::from("header")],
            vec![Cell::from("2024/02"), Cell::from(2.0)],
            vec![Cell::from("2024/01"), Cell::from(1.0)],
            vec![Cell::from("2024/02"), Cell::from(22.0)],
        ]);
        let result = extract(&grid, &single_metric_layout(1), &ExtractOptions::default());
        let keys: Vec<String> = result.series[0].periods().map(Period::key).collect();
        assert_eq!(keys, vec!["202401", "202402"]);
        assert_eq!(result.series[0].get(&Period::Monthly(2024, 2)), Some(Some(22.0)));
    }

    #[test]
    fn test_invalid_month_rejects_row() {
        let grid = Grid::new(vec![
            vec![Cell::from("西暦年"), Cell::from("月"), Cell::from("値")],
            vec![Cell::from(2024.0), Cell::from(13.0), Cell::from(5.0)],
            vec![Cell::from(2024.0), Cell::Empty, Cell::from(5.5)],
            vec![Cell::from(2024.0), Cell::from(3.0), Cell::from(6.0)],
        ]);
        let layout = Layout::manual(0, vec![("value".into(), 2)], 1, 0..2).unwrap();
        let result = extract(&grid, &layout, &ExtractOptions::default());

        let got: Vec<(String, Option<f64>)> = result.series[0].iter().map(|(p, v)| (p.key(), *v)).collect();
        assert_eq!(got, vec![("202403".to_string(), Some(6.0))]);
        assert_eq!(result.skipped.len(), 2);
        assert!(result.skipped.iter().all(|s| s.reason == SkipReason::NoDate));
    }

    #[test]
    fn test_value_beyond_row_width_is_missing() {
        let grid = Grid::new(vec![vec![Cell::from("header")], vec![Cell::from("2024/05")]]);
        let result = extract(&grid, &single_metric_layout(1), &ExtractOptions::default());
        assert_eq!(result.series[0].get(&Period::Monthly(2024, 5)), Some(None));
    }

    #[test]
    fn test_frequency_coarsening() {
        let grid = Grid::new(vec![
            vec![Cell::from("header")],
            vec![Cell::from("2023/12"), Cell::from(1.0)],
            vec![Cell::from("2024"), Cell::from(2.0)],
        ]);
        let options = ExtractOptions {
            frequency: Some(Frequency::Quarterly),
            ..ExtractOptions::default()
        };
        let result = extract(&grid, &single_metric_layout(1), &options);
        assert_eq!(result.series[0].get(&Period::Quarterly(2023, 4)), Some(Some(1.0)));
        assert!(matches!(
            result.skipped[0].reason,
            SkipReason::FrequencyMismatch { period: Period::Annual(2024) }
        ));
    }

    #[test]
    fn test_extract_metric_by_name() {
        let grid = Grid::new(vec![
            vec![Cell::from("header")],
            vec![Cell::from("2024/01"), Cell::from(1.0), Cell::from(10.0)],
        ]);
        let layout = Layout::manual(0, vec![("a".into(), 1), ("b".into(), 2)], 1, 0..1).unwrap();
        let result = extract_metric(&grid, &layout, "b", &ExtractOptions::default()).unwrap();
        assert_eq!(result.series.len(), 1);
        assert_eq!(result.series[0].get(&Period::Monthly(2024, 1)), Some(Some(10.0)));
        assert!(extract_metric(&grid, &layout, "c", &ExtractOptions::default()).is_none());
    }
}
