//! # Statnorm - anchor-based extraction of irregular statistical tables
//!
//! Statnorm reads published statistics tables (spreadsheets, HTML pages, text
//! dumps) whose layout drifts between releases, locates their data through
//! textual landmarks, and emits canonical period-indexed series.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Source    │────▶│    Grid     │────▶│   Layout    │────▶│   Series    │────▶│  Canonical  │
//! │ xlsx / html │     │ (row, col)  │     │  (anchors + │     │ (per metric,│     │   table     │
//! │   / text    │     │             │     │  fallbacks) │     │  by period) │     │  (merged)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use statnorm::{builtin, run_source, PipelineOptions, SourceSpec};
//!
//! let profile = builtin("cpi").unwrap();
//! let report = run_source(&SourceSpec::new("cpi.xlsx"), &profile, &PipelineOptions::default())?;
//! for (period, value) in report.extraction.series[0].iter() {
//!     println!("{} {:?}", period, value);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`grid`] - Cells and ragged grids
//! - [`anchor`] - Landmark search
//! - [`layout`] - Layout resolution with named fallbacks
//! - [`period`] - Date normalization to canonical period keys
//! - [`extract`] - Series extraction and numeric coercion
//! - [`merge`] - Outer join of series into a canonical table
//! - [`diagnostics`] - Non-fatal trust signals
//! - [`source`] - Workbook, HTML and delimited-text suppliers
//! - [`sink`] - CSV and JSON output
//! - [`profile`] - Table profiles and built-ins
//! - [`registry`] - Stored profiles
//! - [`pipeline`] - End-to-end runs
//! - [`logs`] - Run log broadcasting

// Core modules
pub mod error;
pub mod grid;

// Engine
pub mod anchor;
pub mod extract;
pub mod layout;
pub mod merge;
pub mod period;

// Reporting
pub mod diagnostics;
pub mod logs;

// Suppliers and sinks
pub mod sink;
pub mod source;

// Configuration
pub mod profile;
pub mod registry;

// Orchestration
pub mod pipeline;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    LayoutError, PipelineError, ProfileError, SinkError, SourceError,
};

// =============================================================================
// Re-exports - Engine
// =============================================================================

pub use grid::{Cell, Grid};

pub use anchor::{find_row_with_all, locate, locate_first, locate_in, locate_nth, Anchor, Pattern};

pub use layout::{
    resolve, Degradation, Layout, LayoutRules, MetricColumn, MetricRule, Resolution,
};

pub use period::{normalize, normalize_cell, parse_text, Frequency, Period};

pub use extract::{coerce_number, extract, extract_metric, ExtractOptions, Extraction, Series, SkippedRow};

pub use merge::{merge, CanonicalTable, CoverageReport, Merged};

pub use diagnostics::{Diagnostic, Diagnostics};

// =============================================================================
// Re-exports - Suppliers and sinks
// =============================================================================

pub use source::{
    decode_content, detect_delimiter, detect_encoding, load, parse_delimited, parse_html_tables,
    read_workbook, SourceKind, SourceOptions, SourceSpec, TableSource,
};

pub use sink::{ColumnMapping, CsvSink, JsonSink, OutputFormat, Sink};

// =============================================================================
// Re-exports - Profiles and pipeline
// =============================================================================

pub use profile::{builtin, builtins, TableProfile};

pub use registry::{ProfileRegistry, StoredProfile};

pub use pipeline::{
    run_all, run_grid, run_grids, run_source, ExtractionJob, MergedReport, PipelineOptions, RunReport,
};
