//! Non-fatal findings returned alongside successful results.
//!
//! A run that degrades still produces data; these values tell the caller how
//! far to trust it.

use serde::Serialize;

use crate::extract::{SkipReason, SkippedRow};
use crate::layout::Degradation;
use crate::merge::CoverageReport;

/// One trust signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The layout resolver used a fallback.
    DegradedLayout {
        source: String,
        degradation: Degradation,
    },
    /// A data row (or one value of it) was dropped.
    RowSkipped { source: String, skipped: SkippedRow },
    /// The merged table has periods with missing metrics.
    MergeCoverageGap { gap_periods: usize, total_periods: usize },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::DegradedLayout { source, degradation } => {
                write!(f, "{}: degraded layout: {}", source, degradation)
            }
            Diagnostic::RowSkipped { source, skipped } => write!(f, "{}: {}", source, skipped),
            Diagnostic::MergeCoverageGap { gap_periods, total_periods } => write!(
                f,
                "{} of {} periods have at least one missing metric",
                gap_periods, total_periods
            ),
        }
    }
}

/// Ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn record_degradations(&mut self, source: &str, degradations: &[Degradation]) {
        self.0.extend(degradations.iter().map(|d| Diagnostic::DegradedLayout {
            source: source.to_string(),
            degradation: d.clone(),
        }));
    }

    pub fn record_skipped(&mut self, source: &str, skipped: &[SkippedRow]) {
        self.0.extend(skipped.iter().map(|s| Diagnostic::RowSkipped {
            source: source.to_string(),
            skipped: s.clone(),
        }));
    }

    /// Adds a gap diagnostic only when there is a gap.
    pub fn record_coverage(&mut self, coverage: &CoverageReport, total_periods: usize) {
        if coverage.has_gaps() {
            self.0.push(Diagnostic::MergeCoverageGap {
                gap_periods: coverage.gap_periods,
                total_periods,
            });
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_degraded(&self) -> bool {
        self.0
            .iter()
            .any(|d| matches!(d, Diagnostic::DegradedLayout { .. }))
    }

    pub fn degraded_count(&self) -> usize {
        self.0
            .iter()
            .filter(|d| matches!(d, Diagnostic::DegradedLayout { .. }))
            .count()
    }

    /// Skipped rows that were not plain "no date" rows (footnotes are expected).
    pub fn dropped_values(&self) -> usize {
        self.0
            .iter()
            .filter(|d| {
                matches!(
                    d,
                    Diagnostic::RowSkipped { skipped, .. } if skipped.reason != SkipReason::NoDate
                )
            })
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.0
            .iter()
            .filter(|d| matches!(d, Diagnostic::RowSkipped { .. }))
            .count()
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        let gaps = self.0.iter().find_map(|d| match d {
            Diagnostic::MergeCoverageGap { gap_periods, .. } => Some(*gap_periods),
            _ => None,
        });
        format!(
            "{} degradation(s), {} skipped row(s) ({} dropped value(s)), {} gap period(s)",
            self.degraded_count(),
            self.skipped_count(),
            self.dropped_values(),
            gaps.unwrap_or(0)
        )
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
