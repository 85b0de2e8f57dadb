//! High-level pipeline API: source -> layout -> series -> canonical table.
//!
//! # Example
//!
//! ```rust,ignore
//! use statnorm::pipeline::{run_all, ExtractionJob, PipelineOptions};
//! use statnorm::profile::builtin;
//!
//! let jobs = vec![
//!     ExtractionJob::new("cpi.xlsx", builtin("cpi").unwrap()),
//!     ExtractionJob::new("ci.csv", builtin("business-cycle").unwrap()),
//! ];
//! let report = run_all(&jobs, &PipelineOptions::default())?;
//! println!("{} periods", report.merged.table.len());
//! ```
//!
//! Independent extractions run in parallel; the merge waits for all of them.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::diagnostics::Diagnostics;
use crate::error::{PipelineError, PipelineResult};
use crate::extract::{extract, Extraction, Series};
use crate::grid::Grid;
use crate::layout::{resolve, Layout};
use crate::logs::{log_info, log_source, log_success, LogLevel};
use crate::merge::{merge, Merged};
use crate::period::Frequency;
use crate::profile::TableProfile;
use crate::sink::OutputFormat;
use crate::source::{SourceSpec, TableSource};

/// Per-run switches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Reject degraded layouts instead of reporting them
    #[serde(default)]
    pub strict: bool,

    /// Override every profile's expected frequency
    #[serde(default)]
    pub frequency: Option<Frequency>,

    #[serde(default)]
    pub format: OutputFormat,
}

/// One source paired with the profile that reads it
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub source: SourceSpec,
    pub profile: TableProfile,
}

impl ExtractionJob {
    /// Job reading `path` with the profile's own source options.
    pub fn new(path: impl Into<PathBuf>, profile: TableProfile) -> Self {
        let source = SourceSpec::new(path).with_options(profile.source.clone());
        Self { source, profile }
    }
}

/// Outcome of extracting one table
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: String,
    pub profile: String,
    pub layout: Layout,
    pub extraction: Extraction,
    pub diagnostics: Diagnostics,
}

impl RunReport {
    /// Series renamed through the profile's column mapping.
    pub fn output_series(&self, profile: &TableProfile) -> Vec<Series> {
        self.extraction
            .series
            .iter()
            .map(|s| {
                let name = profile.columns.output_name(s.metric()).to_string();
                s.clone().renamed(name)
            })
            .collect()
    }
}

/// Outcome of extracting and merging several tables
#[derive(Debug, Clone, Serialize)]
pub struct MergedReport {
    pub runs: Vec<RunReport>,
    pub merged: Merged,
    pub diagnostics: Diagnostics,
}

/// Resolve and extract an in-memory grid.
pub fn run_grid(grid: &Grid, profile: &TableProfile, options: &PipelineOptions) -> PipelineResult<RunReport> {
    run_labeled(&format!("grid ({})", profile.name), grid, profile, options)
}

/// Load a source and extract it.
pub fn run_source<S>(source: &S, profile: &TableProfile, options: &PipelineOptions) -> PipelineResult<RunReport>
where
    S: TableSource + ?Sized,
{
    let label = source.describe();
    log_info(format!("Loading {}", label));
    let grid = source.load_grid()?;
    run_labeled(&label, &grid, profile, options)
}

fn run_labeled(
    label: &str,
    grid: &Grid,
    profile: &TableProfile,
    options: &PipelineOptions,
) -> PipelineResult<RunReport> {
    profile.validate()?;
    let layout = resolve(grid, &profile.layout)?;

    log_source(
        LogLevel::Info,
        label,
        format!(
            "header row {}, data from row {}, date columns [{}, {})",
            layout.header_row, layout.data_start_row, layout.date_window.start, layout.date_window.end
        ),
    );
    for degradation in &layout.degradations {
        log_source(LogLevel::Warning, label, degradation.to_string());
    }

    if options.strict && layout.is_degraded() {
        let reasons: Vec<String> = layout.degradations.iter().map(|d| d.to_string()).collect();
        return Err(PipelineError::Degraded(format!("{}: {}", label, reasons.join("; "))));
    }

    let mut extract_options = profile.extract.clone();
    if options.frequency.is_some() {
        extract_options.frequency = options.frequency;
    }
    let extraction = extract(grid, &layout, &extract_options);

    let mut diagnostics = Diagnostics::new();
    diagnostics.record_degradations(label, &layout.degradations);
    diagnostics.record_skipped(label, &extraction.skipped);

    log_source(LogLevel::Success, label, extraction.summary());

    Ok(RunReport {
        source: label.to_string(),
        profile: profile.name.clone(),
        layout,
        extraction,
        diagnostics,
    })
}

/// Run every job in parallel, then merge their series in job order.
///
/// The first failing job fails the whole run.
pub fn run_all(jobs: &[ExtractionJob], options: &PipelineOptions) -> PipelineResult<MergedReport> {
    if jobs.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    log_info(format!("Extracting {} source(s)", jobs.len()));

    let runs: Vec<RunReport> = jobs
        .par_iter()
        .map(|job| {
            run_source(&job.source, &job.profile, options).map_err(|e| {
                log_source(LogLevel::Error, &job.source.describe(), e.to_string());
                e
            })
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    let report = merge_runs(runs, jobs.iter().map(|job| &job.profile));
    log_success(format!(
        "Merged {} series into {} periods ({})",
        report.merged.table.metrics.len(),
        report.merged.table.len(),
        report.diagnostics.summary()
    ));
    Ok(report)
}

/// Merge already-extracted grids (no file access).
pub fn run_grids(
    inputs: &[(Grid, TableProfile)],
    options: &PipelineOptions,
) -> PipelineResult<MergedReport> {
    if inputs.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    let runs: Vec<RunReport> = inputs
        .par_iter()
        .map(|(grid, profile)| run_grid(grid, profile, options))
        .collect::<PipelineResult<Vec<_>>>()?;

    Ok(merge_runs(runs, inputs.iter().map(|(_, profile)| profile)))
}

// Join barrier: series are merged in input order once every run is done.
fn merge_runs<'a>(runs: Vec<RunReport>, profiles: impl Iterator<Item = &'a TableProfile>) -> MergedReport {
    let series: Vec<Series> = runs
        .iter()
        .zip(profiles)
        .flat_map(|(run, profile)| run.output_series(profile))
        .collect();
    let merged = merge(&series);

    let mut diagnostics = Diagnostics::new();
    for run in &runs {
        diagnostics.extend(run.diagnostics.clone());
    }
    diagnostics.record_coverage(&merged.coverage, merged.table.len());

    MergedReport {
        runs,
        merged,
        diagnostics,
    }
}
