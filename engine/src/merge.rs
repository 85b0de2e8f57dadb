//! Merge extracted series into one canonical table.
//!
//! # Architecture
//!
//! ```text
//! Series (one per metric)          →  CanonicalTable (outer join on period)
//! ┌──────────────────────────┐       ┌────────┬──────┬──────┐
//! │ A: 202401=1, 202402=2    │       │ period │ A    │ B    │
//! │ B: 202402=5, 202403=6    │  →    │ 202401 │ 1    │ -    │
//! └──────────────────────────┘       │ 202402 │ 2    │ 5    │
//!                                    │ 202403 │ -    │ 6    │
//!                                    └────────┴──────┴──────┘
//! ```
//!
//! A missing value stays missing (`None`), it is never zero-filled.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::extract::Series;
use crate::period::Period;

/// Period-indexed table with one column per metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTable {
    /// Column names, in input order.
    pub metrics: Vec<String>,
    /// One row per period, aligned with `metrics`.
    pub rows: BTreeMap<Period, Vec<Option<f64>>>,
}

impl CanonicalTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn metric_index(&self, metric: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m == metric)
    }

    /// Value of `metric` at `period`, flattened (`None` for missing or absent).
    pub fn value(&self, period: &Period, metric: &str) -> Option<f64> {
        let idx = self.metric_index(metric)?;
        self.rows.get(period).and_then(|row| row.get(idx).copied().flatten())
    }

    pub fn periods(&self) -> impl Iterator<Item = &Period> {
        self.rows.keys()
    }
}

/// How complete the merged table is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Periods where at least one metric is missing.
    pub gap_periods: usize,
    /// Missing count per metric, in column order.
    pub missing_by_metric: Vec<(String, usize)>,
    pub first: Option<Period>,
    pub last: Option<Period>,
}

impl CoverageReport {
    pub fn has_gaps(&self) -> bool {
        self.gap_periods > 0
    }
}

/// Merge result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Merged {
    pub table: CanonicalTable,
    pub coverage: CoverageReport,
}

/// Outer-join series on their periods.
pub fn merge(series: &[Series]) -> Merged {
    let metrics = unique_names(series);

    let periods: BTreeSet<Period> = series
        .iter()
        .flat_map(|s| s.periods().copied())
        .collect();

    let rows: BTreeMap<Period, Vec<Option<f64>>> = periods
        .into_iter()
        .map(|period| {
            let values = series
                .iter()
                .map(|s| s.get(&period).flatten())
                .collect();
            (period, values)
        })
        .collect();

    let table = CanonicalTable { metrics, rows };
    let coverage = coverage(&table);
    Merged { table, coverage }
}

/// Compute coverage for an existing table.
pub fn coverage(table: &CanonicalTable) -> CoverageReport {
    let mut missing = vec![0usize; table.metrics.len()];
    let mut gap_periods = 0;

    for values in table.rows.values() {
        let mut gap = false;
        for (idx, value) in values.iter().enumerate() {
            if value.is_none() {
                missing[idx] += 1;
                gap = true;
            }
        }
        if gap {
            gap_periods += 1;
        }
    }

    CoverageReport {
        gap_periods,
        missing_by_metric: table.metrics.iter().cloned().zip(missing).collect(),
        first: table.rows.keys().next().copied(),
        last: table.rows.keys().next_back().copied(),
    }
}

// Repeated metric names become name_2, name_3, ...
fn unique_names(series: &[Series]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    series
        .iter()
        .map(|s| {
            let count = seen.entry(s.metric()).or_insert(0);
            *count += 1;
            if *count == 1 {
                s.metric().to_string()
            } else {
                format!("{}_{}", s.metric(), count)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(year: u16, month: u8) -> Period {
        Period::Monthly(year, month)
    }

    fn scenario() -> (Series, Series) {
        let a = Series::from_points("A", [(m(2024, 1), Some(1.0)), (m(2024, 2), Some(2.0))]);
        let b = Series::from_points("B", [(m(2024, 2), Some(5.0)), (m(2024, 3), Some(6.0))]);
        (a, b)
    }

    #[test]
    fn test_outer_join_keeps_missing() {
        let (a, b) = scenario();
        let merged = merge(&[a, b]);

        let rows: Vec<(String, Vec<Option<f64>>)> = merged
            .table
            .rows
            .iter()
            .map(|(p, v)| (p.key(), v.clone()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("202401".to_string(), vec![Some(1.0), None]),
                ("202402".to_string(), vec![Some(2.0), Some(5.0)]),
                ("202403".to_string(), vec![None, Some(6.0)]),
            ]
        );
        assert_eq!(merged.table.metrics, vec!["A", "B"]);
        assert_eq!(merged.coverage.gap_periods, 2);
        assert_eq!(
            merged.coverage.missing_by_metric,
            vec![("A".to_string(), 1), ("B".to_string(), 1)]
        );
        assert_eq!(merged.coverage.first, Some(m(2024, 1)));
        assert_eq!(merged.coverage.last, Some(m(2024, 3)));
    }

    #[test]
    fn test_input_order_only_changes_columns() {
        let (a, b) = scenario();
        let ab = merge(&[a.clone(), b.clone()]);
        let ba = merge(&[b, a]);

        assert_eq!(ba.table.metrics, vec!["B", "A"]);
        let ab_periods: Vec<&Period> = ab.table.periods().collect();
        let ba_periods: Vec<&Period> = ba.table.periods().collect();
        assert_eq!(ab_periods, ba_periods);
        for period in ab.table.periods() {
            for metric in ["A", "B"] {
                assert_eq!(ab.table.value(period, metric), ba.table.value(period, metric));
            }
        }
        assert_eq!(ab.coverage.gap_periods, ba.coverage.gap_periods);
    }

    #[test]
    fn test_explicit_missing_counts_as_gap() {
        let a = Series::from_points("A", [(m(2024, 1), None), (m(2024, 2), Some(2.0))]);
        let merged = merge(&[a]);
        assert_eq!(merged.coverage.gap_periods, 1);
        assert_eq!(merged.table.value(&m(2024, 1), "A"), None);
    }

    #[test]
    fn test_duplicate_names_suffixed() {
        let a1 = Series::from_points("A", [(m(2024, 1), Some(1.0))]);
        let a2 = Series::from_points("A", [(m(2024, 1), Some(2.0))]);
        let a3 = Series::from_points("A", [(m(2024, 1), Some(3.0))]);
        let merged = merge(&[a1, a2, a3]);
        assert_eq!(merged.table.metrics, vec!["A", "A_2", "A_3"]);
        assert_eq!(merged.table.value(&m(2024, 1), "A_3"), Some(3.0));
    }

    #[test]
    fn test_mixed_frequencies_follow_key_order() {
        let annual = Series::from_points("wage", [(Period::Annual(2024), Some(100.0))]);
        let monthly = Series::from_points("cpi", [(m(2000, 1), Some(95.0)), (m(2024, 3), Some(105.0))]);
        let merged = merge(&[annual, monthly]);

        let keys: Vec<String> = merged.table.periods().map(Period::key).collect();
        assert_eq!(keys, vec!["200001", "2024", "202403"]);
    }

    #[test]
    fn test_empty_input() {
        let merged = merge(&[]);
        assert!(merged.table.is_empty());
        assert!(!merged.coverage.has_gaps());
        assert_eq!(merged.coverage.first, None);
    }
}
