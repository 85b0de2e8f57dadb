//! Layout resolver.
//!
//! Turns anchors into the coordinates an extractor needs: where the header is,
//! which column holds each metric, where data starts (and optionally ends),
//! which columns carry the date. Only a missing header anchor is fatal.
//! Every other missing landmark falls back to a configured default and is
//! recorded as a [`Degradation`] on the returned [`Layout`].
//!
//! # Fallback chain
//!
//! ```text
//! header anchor ──missing──▶ LayoutNotFound (fatal)
//! metric label  ──above header──▶ offset_above
//!               ──on/below header──▶ offset_below
//!               ──missing──▶ fallback_column + MetricFallback
//! date window   ──date cells──▶ ──year/month labels──▶ ──widen──▶ fallback window + DateWindowFallback
//!               ──year label only──▶ year column + next, DateWindowGuessed
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

use crate::anchor::{find_row_with_all, locate_first, locate_in, Anchor, Pattern};
use crate::error::{LayoutError, LayoutResult};
use crate::extract::{coerce_number, Coerced};
use crate::grid::{Cell, Grid};
use crate::period::{normalize_cell, Frequency};

// =============================================================================
// Rules
// =============================================================================

/// How to find a table's landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutRules {
    /// Marks the row where the machine-readable block starts.
    pub header: Pattern,

    /// Extra labels that must appear on the header row.
    #[serde(default)]
    pub header_row_requires: Vec<Pattern>,

    /// Rows searched for the header anchor (all rows if unset).
    #[serde(default)]
    pub header_scan_limit: Option<usize>,

    /// Metrics to extract, in output order.
    pub metrics: Vec<MetricRule>,

    /// Rows above the header searched for metric labels.
    #[serde(default = "default_lookback")]
    pub label_lookback: usize,

    /// Date column detection.
    #[serde(default)]
    pub date: DateRules,

    /// Offsets between the header row and the first data row.
    #[serde(default)]
    pub offsets: OffsetRules,

    /// Row label that ends the data block (stacked sections).
    #[serde(default)]
    pub end_marker: Option<Pattern>,
}

/// One metric column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRule {
    /// Output name of the metric.
    pub name: String,

    /// Category label identifying the column (e.g. "総合").
    #[serde(default)]
    pub label: Option<Pattern>,

    /// Which match of `label` to use (0 = first, row-major).
    #[serde(default)]
    pub occurrence: usize,

    /// Column used when the label cannot be found.
    pub fallback_column: usize,
}

impl MetricRule {
    pub fn new(name: impl Into<String>, label: Option<Pattern>, fallback_column: usize) -> Self {
        Self {
            name: name.into(),
            label,
            occurrence: 0,
            fallback_column,
        }
    }

    pub fn with_occurrence(mut self, occurrence: usize) -> Self {
        self.occurrence = occurrence;
        self
    }
}

/// Date column detection rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRules {
    /// Label of a calendar-year column.
    #[serde(default = "default_year_label")]
    pub year_label: Pattern,

    /// Label of a month column.
    #[serde(default = "default_month_label")]
    pub month_label: Pattern,

    /// Initial half-width of the column window around the header anchor.
    #[serde(default = "default_radius")]
    pub radius: usize,

    /// Largest half-width tried when widening.
    #[serde(default = "default_max_radius")]
    pub max_radius: usize,

    /// Rows below the header probed for date cells.
    #[serde(default = "default_probe_rows")]
    pub probe_rows: usize,

    /// Absolute `[start, end)` window used when nothing is found.
    /// Defaults to three columns starting at the header anchor.
    #[serde(default)]
    pub fallback_window: Option<(usize, usize)>,

    /// Absolute `[start, end)` window used without any detection.
    #[serde(default)]
    pub fixed_window: Option<(usize, usize)>,
}

impl Default for DateRules {
    fn default() -> Self {
        Self {
            year_label: default_year_label(),
            month_label: default_month_label(),
            radius: default_radius(),
            max_radius: default_max_radius(),
            probe_rows: default_probe_rows(),
            fallback_window: None,
            fixed_window: None,
        }
    }
}

/// Header-to-data offsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetRules {
    /// Labels sit above the header row.
    #[serde(default = "default_offset_above")]
    pub label_above: usize,

    /// A category-label row intervenes at or below the header row.
    #[serde(default = "default_offset_below")]
    pub label_below: usize,

    /// Every metric fell back.
    #[serde(default = "default_offset_above")]
    pub fallback: usize,

    /// Pin the offset regardless of where labels were found.
    #[serde(default)]
    pub fixed: Option<usize>,
}

impl Default for OffsetRules {
    fn default() -> Self {
        Self {
            label_above: default_offset_above(),
            label_below: default_offset_below(),
            fallback: default_offset_above(),
            fixed: None,
        }
    }
}

fn default_lookback() -> usize {
    2
}

fn default_year_label() -> Pattern {
    Pattern::any_of(["西暦年", "Calendar"])
}

fn default_month_label() -> Pattern {
    Pattern::exact(["月", "Month", "month"])
}

fn default_radius() -> usize {
    2
}

fn default_max_radius() -> usize {
    8
}

fn default_probe_rows() -> usize {
    6
}

fn default_offset_above() -> usize {
    1
}

fn default_offset_below() -> usize {
    2
}

impl LayoutRules {
    /// Rules with default detection settings.
    pub fn new(header: Pattern, metrics: Vec<MetricRule>) -> Self {
        Self {
            header,
            header_row_requires: Vec::new(),
            header_scan_limit: None,
            metrics,
            label_lookback: default_lookback(),
            date: DateRules::default(),
            offsets: OffsetRules::default(),
            end_marker: None,
        }
    }

    /// Header anchor in `grid`, honouring `header_row_requires`.
    pub fn header_anchor(&self, grid: &Grid) -> Option<Anchor> {
        if self.header_row_requires.is_empty() {
            return locate_first(grid, &self.header, self.header_scan_limit);
        }
        let mut required = self.header_row_requires.clone();
        required.push(self.header.clone());
        find_row_with_all(grid, &required, self.header_scan_limit)
            .and_then(|row| locate_in(grid, &self.header, row..row + 1, None).into_iter().next())
    }

    /// Reject rules that can never produce a valid layout.
    pub fn validate(&self) -> LayoutResult<()> {
        if self.metrics.is_empty() {
            return Err(LayoutError::InvalidRules("no metrics configured".into()));
        }
        let offsets = [
            self.offsets.label_above,
            self.offsets.label_below,
            self.offsets.fallback,
            self.offsets.fixed.unwrap_or(1),
        ];
        if offsets.contains(&0) {
            return Err(LayoutError::InvalidRules(
                "data offset must be at least 1 row below the header".into(),
            ));
        }
        let mut names = BTreeSet::new();
        for metric in &self.metrics {
            if !names.insert(metric.name.as_str()) {
                return Err(LayoutError::InvalidRules(format!(
                    "duplicate metric name '{}'",
                    metric.name
                )));
            }
        }
        for (start, end) in self.date.fallback_window.iter().chain(&self.date.fixed_window) {
            if start >= end {
                return Err(LayoutError::InvalidRules(format!(
                    "empty date window [{}, {})",
                    start, end
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Layout
// =============================================================================

/// How a metric column was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resolution {
    /// Found through its label.
    Anchor { row: usize },
    /// Label absent; configured default used.
    Fallback,
    /// Fixed column with no label to look for.
    Configured,
}

/// A resolved metric column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricColumn {
    pub name: String,
    pub column: usize,
    pub resolution: Resolution,
}

/// How the date window was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSource {
    /// Cells holding dates were found.
    DateCells,
    /// Year/month column labels were found.
    Labels,
    /// Only a year label was found; the month column is assumed to follow it.
    YearLabel,
    /// Nothing found; configured default used.
    Fallback,
    /// Set directly by the caller.
    Configured,
}

/// Columns `[start, end)` handed to the date normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: usize,
    pub end: usize,
    pub source: WindowSource,
}

impl DateWindow {
    pub fn columns(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// A fallback that was used while resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Degradation {
    /// Metric label not found; fixed column used.
    MetricFallback { metric: String, column: usize },
    /// Date columns not found; fixed window used.
    DateWindowFallback { start: usize, end: usize },
    /// Year label without a month label; window guessed from its position.
    DateWindowGuessed { start: usize, end: usize },
    /// Metric column holds no numbers in the first data rows.
    ImplausibleMetricColumn { metric: String, column: usize },
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Degradation::MetricFallback { metric, column } => {
                write!(f, "label for '{}' not found, using column {}", metric, column)
            }
            Degradation::DateWindowFallback { start, end } => {
                write!(f, "date columns not found, using columns [{}, {})", start, end)
            }
            Degradation::DateWindowGuessed { start, end } => {
                write!(f, "no month label next to the year label, guessing columns [{}, {})", start, end)
            }
            Degradation::ImplausibleMetricColumn { metric, column } => {
                write!(f, "column {} for '{}' has no numeric values near the data start", column, metric)
            }
        }
    }
}

/// Resolved coordinates of a table's data region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub header_row: usize,
    pub header_column: usize,
    pub metric_columns: Vec<MetricColumn>,
    pub data_start_row: usize,
    /// Exclusive end of the data block, when an end marker was found.
    pub data_end_row: Option<usize>,
    pub date_window: DateWindow,
    pub degradations: Vec<Degradation>,
}

impl Layout {
    /// Layout with caller-supplied coordinates.
    pub fn manual(
        header_row: usize,
        metrics: Vec<(String, usize)>,
        data_start_row: usize,
        date_window: Range<usize>,
    ) -> LayoutResult<Self> {
        if data_start_row <= header_row {
            return Err(LayoutError::InvalidRules(format!(
                "data start row {} must be below header row {}",
                data_start_row, header_row
            )));
        }
        if date_window.start >= date_window.end {
            return Err(LayoutError::InvalidRules("empty date window".into()));
        }
        Ok(Self {
            header_row,
            header_column: date_window.start,
            metric_columns: metrics
                .into_iter()
                .map(|(name, column)| MetricColumn {
                    name,
                    column,
                    resolution: Resolution::Configured,
                })
                .collect(),
            data_start_row,
            data_end_row: None,
            date_window: DateWindow {
                start: date_window.start,
                end: date_window.end,
                source: WindowSource::Configured,
            },
            degradations: Vec::new(),
        })
    }

    /// Whether any fallback was used.
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn metric(&self, name: &str) -> Option<&MetricColumn> {
        self.metric_columns.iter().find(|m| m.name == name)
    }

    /// Rows the extractor walks.
    pub fn data_rows(&self, grid: &Grid) -> Range<usize> {
        let end = self
            .data_end_row
            .map_or(grid.height(), |e| e.min(grid.height()));
        self.data_start_row..end.max(self.data_start_row)
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolve a grid's layout.
pub fn resolve(grid: &Grid, rules: &LayoutRules) -> LayoutResult<Layout> {
    rules.validate()?;

    let header = locate_header(grid, rules)?;
    let mut degradations = Vec::new();

    // Step 2: metric columns
    let mut metric_columns = Vec::with_capacity(rules.metrics.len());
    let mut label_rows = Vec::new();
    for rule in &rules.metrics {
        if rule.label.is_none() {
            metric_columns.push(MetricColumn {
                name: rule.name.clone(),
                column: rule.fallback_column,
                resolution: Resolution::Configured,
            });
            continue;
        }
        match locate_metric_label(grid, rules, header.row, rule) {
            Some(anchor) => {
                label_rows.push(anchor.row);
                metric_columns.push(MetricColumn {
                    name: rule.name.clone(),
                    column: anchor.column,
                    resolution: Resolution::Anchor { row: anchor.row },
                });
            }
            None => {
                degradations.push(Degradation::MetricFallback {
                    metric: rule.name.clone(),
                    column: rule.fallback_column,
                });
                metric_columns.push(MetricColumn {
                    name: rule.name.clone(),
                    column: rule.fallback_column,
                    resolution: Resolution::Fallback,
                });
            }
        }
    }

    // Step 3: date window
    let detected = match rules.date.fixed_window {
        Some((start, end)) => Some(DateWindow {
            start,
            end,
            source: WindowSource::Configured,
        }),
        None => locate_date_window(grid, rules, &header),
    };
    let date_window = match detected {
        Some(window) => {
            if window.source == WindowSource::YearLabel {
                degradations.push(Degradation::DateWindowGuessed {
                    start: window.start,
                    end: window.end,
                });
            }
            window
        }
        None => {
            let (start, end) = rules
                .date
                .fallback_window
                .unwrap_or((header.column, header.column + 3));
            degradations.push(Degradation::DateWindowFallback { start, end });
            DateWindow {
                start,
                end,
                source: WindowSource::Fallback,
            }
        }
    };

    // Step 4: data start
    let offset = match rules.offsets.fixed {
        Some(fixed) => fixed,
        None => label_rows
            .iter()
            .map(|&row| {
                if row < header.row {
                    rules.offsets.label_above
                } else {
                    rules.offsets.label_below
                }
            })
            .max()
            .unwrap_or(rules.offsets.fallback),
    };
    let data_start_row = header.row + offset;

    let data_end_row = rules.end_marker.as_ref().and_then(|marker| {
        locate_in(grid, marker, data_start_row..grid.height(), None)
            .first()
            .map(|a| a.row)
    });

    let mut layout = Layout {
        header_row: header.row,
        header_column: header.column,
        metric_columns,
        data_start_row,
        data_end_row,
        date_window,
        degradations,
    };
    flag_implausible_columns(grid, &mut layout, rules.date.probe_rows);

    Ok(layout)
}

/// Step 1: first header anchor, optionally on a row carrying extra labels.
fn locate_header(grid: &Grid, rules: &LayoutRules) -> LayoutResult<Anchor> {
    rules.header_anchor(grid).ok_or_else(|| LayoutError::LayoutNotFound {
        pattern: describe_header(rules),
    })
}

fn describe_header(rules: &LayoutRules) -> String {
    if rules.header_row_requires.is_empty() {
        rules.header.to_string()
    } else {
        let extra: Vec<String> = rules.header_row_requires.iter().map(|p| p.to_string()).collect();
        format!("{} on a row with {}", rules.header, extra.join(", "))
    }
}

/// Step 2: a metric's label in the look-back rows, else the header row and
/// the row directly below it.
fn locate_metric_label(
    grid: &Grid,
    rules: &LayoutRules,
    header_row: usize,
    rule: &MetricRule,
) -> Option<Anchor> {
    let label = rule.label.as_ref()?;
    let above = header_row.saturating_sub(rules.label_lookback)..header_row;

    locate_in(grid, label, above, None)
        .into_iter()
        .nth(rule.occurrence)
        .or_else(|| {
            locate_in(grid, label, header_row..header_row + 2, None)
                .into_iter()
                .nth(rule.occurrence)
        })
}

/// Step 3: date columns near the header anchor, widening the search window.
fn locate_date_window(grid: &Grid, rules: &LayoutRules, header: &Anchor) -> Option<DateWindow> {
    let probe = header.row + 1..(header.row + 1 + rules.date.probe_rows).min(grid.height());
    let label_rows = header.row.saturating_sub(rules.label_lookback)..header.row + 2;

    let mut radius = rules.date.radius;
    loop {
        let cols = header.column.saturating_sub(radius)..header.column + radius + 1;

        if let Some((start, end)) = date_cells_in(grid, probe.clone(), cols.clone()) {
            return Some(DateWindow {
                start,
                end,
                source: WindowSource::DateCells,
            });
        }

        let year = locate_in(grid, &rules.date.year_label, label_rows.clone(), Some(cols.clone()));
        if let Some(year) = year.first() {
            let month = locate_in(grid, &rules.date.month_label, label_rows.clone(), Some(cols.clone()));
            return Some(match month.first() {
                Some(m) => DateWindow {
                    start: year.column.min(m.column),
                    end: year.column.max(m.column) + 1,
                    source: WindowSource::Labels,
                },
                None => DateWindow {
                    start: year.column,
                    end: year.column + 2,
                    source: WindowSource::YearLabel,
                },
            });
        }

        if radius >= rules.date.max_radius {
            return None;
        }
        radius = (radius.max(1) * 2).min(rules.date.max_radius);
    }
}

/// Columns holding sub-annual periods or native dates in the probe rows.
fn date_cells_in(grid: &Grid, rows: Range<usize>, cols: Range<usize>) -> Option<(usize, usize)> {
    let mut found: Option<(usize, usize)> = None;
    for row in rows {
        for col in cols.clone() {
            let cell = grid.get(row, col);
            let is_date = match cell {
                Cell::Date(_) => true,
                Cell::Text(_) => normalize_cell(cell).is_some_and(|p| p.frequency() != Frequency::Annual),
                _ => false,
            };
            if is_date {
                found = Some(match found {
                    Some((s, e)) => (s.min(col), e.max(col + 1)),
                    None => (col, col + 1),
                });
            }
        }
    }
    found
}

/// Flag metric columns with no numeric value in the first data rows.
fn flag_implausible_columns(grid: &Grid, layout: &mut Layout, probe_rows: usize) {
    let rows = layout.data_start_row..(layout.data_start_row + probe_rows).min(grid.height());
    if rows.is_empty() {
        return;
    }
    let mut flagged = Vec::new();
    for metric in &layout.metric_columns {
        let has_number = rows
            .clone()
            .any(|row| matches!(coerce_number(grid.get(row, metric.column), &[]), Coerced::Value(_)));
        if !has_number {
            flagged.push(Degradation::ImplausibleMetricColumn {
                metric: metric.name.clone(),
                column: metric.column,
            });
        }
    }
    layout.degradations.extend(flagged);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// CPI-style sheet: title band, category row two rows above the
    /// "時間軸コード" header, Japanese year-month text in the data rows.
    fn cpi_grid() -> Grid {
        let mut rows: Vec<Vec<Cell>> = vec![
            vec![Cell::from("消費者物価指数")],
            vec![],
            vec![],
            vec![Cell::Empty, Cell::Empty, Cell::Empty, Cell::Empty, Cell::from("総合")],
            vec![],
            vec![Cell::from("時間軸コード"), Cell::from("時点")],
        ];
        rows.push(vec![
            Cell::from("2024000303"),
            Cell::from("2024年3月"),
            Cell::Empty,
            Cell::Empty,
            Cell::from("2,345.6"),
        ]);
        Grid::new(rows)
    }

    fn cpi_rules() -> LayoutRules {
        LayoutRules::new(
            Pattern::substring("時間軸コード"),
            vec![MetricRule::new("total", Some(Pattern::substring("総合")), 12)],
        )
    }

    #[test]
    fn test_resolve_cpi_layout() {
        let layout = resolve(&cpi_grid(), &cpi_rules()).unwrap();

        assert_eq!(layout.header_row, 5);
        assert_eq!(layout.metric_columns[0].column, 4);
        assert_eq!(layout.metric_columns[0].resolution, Resolution::Anchor { row: 3 });
        assert_eq!(layout.data_start_row, 6);
        assert_eq!(layout.date_window.columns(), 1..2);
        assert_eq!(layout.date_window.source, WindowSource::DateCells);
        assert!(!layout.is_degraded());
    }

    #[test]
    fn test_missing_header_is_fatal() {
        let grid = Grid::from_rows(vec![vec![Cell::from("総合")], vec![Cell::from("2024年3月")]]);
        let err = resolve(&grid, &cpi_rules()).unwrap_err();
        match err {
            LayoutError::LayoutNotFound { pattern } => assert!(pattern.contains("時間軸コード")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_metric_fallback_is_flagged() {
        let mut rules = cpi_rules();
        rules.metrics[0].label = Some(Pattern::substring("生鮮食品を除く総合"));

        let layout = resolve(&cpi_grid(), &rules).unwrap();
        assert_eq!(layout.metric_columns[0].column, 12);
        assert_eq!(layout.metric_columns[0].resolution, Resolution::Fallback);
        assert!(layout.is_degraded());
        assert!(layout.degradations.contains(&Degradation::MetricFallback {
            metric: "total".into(),
            column: 12,
        }));
        assert!(layout.data_start_row > layout.header_row);
    }

    #[test]
    fn test_lookback_too_short_falls_back() {
        let mut rules = cpi_rules();
        rules.label_lookback = 1;
        let layout = resolve(&cpi_grid(), &rules).unwrap();
        assert_eq!(layout.metric_columns[0].resolution, Resolution::Fallback);
    }

    #[test]
    fn test_labels_on_header_row_use_lower_offset() {
        // CI/DI style: labels on the header row, unit row, then data.
        let grid = Grid::from_rows(vec![
            vec![Cell::from("景気動向指数")],
            vec![
                Cell::from("時間軸コード"),
                Cell::from("西暦年"),
                Cell::from("月"),
                Cell::from("先行指数"),
                Cell::from("一致指数"),
                Cell::from("先行指数"),
            ],
            vec![Cell::Empty, Cell::Empty, Cell::Empty, Cell::from("2020=100")],
            vec![Cell::Empty, Cell::from(2024.0), Cell::from(1.0), Cell::from(109.5), Cell::from(112.1), Cell::from(50.0)],
        ]);
        let mut rules = LayoutRules::new(
            Pattern::substring("時間軸コード"),
            vec![
                MetricRule::new("ci_leading", Some(Pattern::substring("先行指数")), 3),
                MetricRule::new("di_leading", Some(Pattern::substring("先行指数")), 9).with_occurrence(1),
            ],
        );
        rules.header_row_requires = vec![Pattern::substring("一致指数")];

        let layout = resolve(&grid, &rules).unwrap();
        assert_eq!(layout.header_row, 1);
        assert_eq!(layout.data_start_row, 3);
        assert_eq!(layout.metric("ci_leading").unwrap().column, 3);
        assert_eq!(layout.metric("di_leading").unwrap().column, 5);
        assert_eq!(layout.date_window.columns(), 1..3);
        assert_eq!(layout.date_window.source, WindowSource::Labels);
        assert!(!layout.is_degraded());
    }

    #[test]
    fn test_date_window_fallback() {
        let grid = Grid::from_rows(vec![
            vec![Cell::from("Series"), Cell::from("総合")],
            vec![Cell::from("時間軸コード")],
            vec![Cell::from("x"), Cell::from(1.0)],
        ]);
        let mut rules = cpi_rules();
        rules.date.fallback_window = Some((0, 1));

        let layout = resolve(&grid, &rules).unwrap();
        assert_eq!(layout.date_window.columns(), 0..1);
        assert!(layout
            .degradations
            .contains(&Degradation::DateWindowFallback { start: 0, end: 1 }));
    }

    #[test]
    fn test_year_label_without_month_is_flagged() {
        let grid = Grid::from_rows(vec![
            vec![Cell::from("時間軸コード"), Cell::from("西暦年"), Cell::Empty, Cell::from("総合")],
            vec![Cell::Empty, Cell::from(2024.0), Cell::from(3.0), Cell::from(101.2)],
        ]);
        let layout = resolve(&grid, &cpi_rules()).unwrap();

        assert_eq!(layout.date_window.columns(), 1..3);
        assert_eq!(layout.date_window.source, WindowSource::YearLabel);
        assert!(layout.is_degraded());
        assert!(layout
            .degradations
            .contains(&Degradation::DateWindowGuessed { start: 1, end: 3 }));
    }

    #[test]
    fn test_date_window_widens() {
        let mut row = vec![Cell::Empty; 7];
        row[6] = Cell::from("2024/01");
        let grid = Grid::new(vec![vec![Cell::from("時間軸コード")], row]);
        let mut rules = cpi_rules();
        rules.date.radius = 1;

        let layout = resolve(&grid, &rules).unwrap();
        assert_eq!(layout.date_window.columns(), 6..7);

        rules.date.max_radius = 4;
        let layout = resolve(&grid, &rules).unwrap();
        assert_eq!(layout.date_window.source, WindowSource::Fallback);
    }

    #[test]
    fn test_end_marker() {
        let grid = Grid::from_rows(vec![
            vec![Cell::from("指数")],
            vec![Cell::from(2022.0), Cell::from(99.0)],
            vec![Cell::from(2023.0), Cell::from(100.0)],
            vec![Cell::from("前年比")],
            vec![Cell::from(2023.0), Cell::from(1.0)],
        ]);
        let mut rules = LayoutRules::new(Pattern::substring("指数"), vec![MetricRule::new("index", None, 1)]);
        rules.end_marker = Some(Pattern::substring("前年比"));
        rules.date.fallback_window = Some((0, 1));

        let layout = resolve(&grid, &rules).unwrap();
        assert_eq!(layout.data_end_row, Some(3));
        assert_eq!(layout.data_rows(&grid), 1..3);
    }

    #[test]
    fn test_fixed_window_is_not_degraded() {
        let grid = Grid::from_rows(vec![
            vec![Cell::from("年"), Cell::from("指数")],
            vec![Cell::from(2022.0), Cell::from(99.0)],
        ]);
        let mut rules = LayoutRules::new(Pattern::substring("年"), vec![MetricRule::new("index", None, 1)]);
        rules.date.fixed_window = Some((0, 1));

        let layout = resolve(&grid, &rules).unwrap();
        assert_eq!(layout.date_window.columns(), 0..1);
        assert_eq!(layout.date_window.source, WindowSource::Configured);
        assert!(!layout.is_degraded());
    }

    #[test]
    fn test_zero_offset_rejected() {
        let mut rules = cpi_rules();
        rules.offsets.fixed = Some(0);
        assert!(matches!(
            resolve(&cpi_grid(), &rules),
            Err(LayoutError::InvalidRules(_))
        ));
    }

    #[test]
    fn test_implausible_column_flagged() {
        let mut rules = cpi_rules();
        rules.metrics[0].label = None;
        rules.metrics[0].fallback_column = 2;
        let layout = resolve(&cpi_grid(), &rules).unwrap();
        assert!(layout.degradations.contains(&Degradation::ImplausibleMetricColumn {
            metric: "total".into(),
            column: 2,
        }));
    }

    #[test]
    fn test_manual_layout_invariant() {
        assert!(Layout::manual(3, vec![("v".into(), 1)], 3, 0..1).is_err());
        let layout = Layout::manual(3, vec![("v".into(), 1)], 4, 0..1).unwrap();
        assert!(!layout.is_degraded());
    }
}
