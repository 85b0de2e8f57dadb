//! Error types for the statnorm extraction pipeline.
//!
//! Only conditions that stop a run are errors. Everything the source data is
//! expected to throw at us (fallback columns, footnote rows, unparsable cells,
//! coverage gaps) is reported as a [`crate::diagnostics::Diagnostic`] instead.
//!
//! - [`SourceError`] - Raw table supplier errors
//! - [`LayoutError`] - Layout resolution errors
//! - [`ProfileError`] - Profile and registry errors
//! - [`SinkError`] - Output errors
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Source Errors
// =============================================================================

/// Errors while turning a file or a page into a [`crate::grid::Grid`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to read file.
    #[error("Failed to read source: {0}")]
    Io(#[from] std::io::Error),

    /// Content could not be decoded.
    #[error("Failed to decode content as {encoding}: {message}")]
    Encoding { encoding: String, message: String },

    /// Delimited text could not be parsed.
    #[error("Invalid delimited text: {0}")]
    Delimited(#[from] csv::Error),

    /// Spreadsheet could not be opened or read.
    #[error("Workbook error: {0}")]
    Workbook(String),

    /// Requested sheet does not exist.
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// Requested HTML table does not exist.
    #[error("HTML table #{index} not found ({found} tables on page)")]
    TableNotFound { index: usize, found: usize },

    /// Unknown source kind.
    #[error("Unsupported source format: {0}")]
    Unsupported(String),

    /// Nothing to read.
    #[error("Source is empty")]
    Empty,
}

// =============================================================================
// Layout Errors
// =============================================================================

/// Errors during layout resolution.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// The header anchor is absent; extraction cannot begin.
    #[error("No header anchor found (searched for {pattern})")]
    LayoutNotFound { pattern: String },

    /// Rules that can never produce a valid layout.
    #[error("Invalid layout rules: {0}")]
    InvalidRules(String),
}

// =============================================================================
// Profile Errors
// =============================================================================

/// Errors from table profiles and the profile registry.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Pattern failed to compile.
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Profile is structurally invalid.
    #[error("Invalid profile: {0}")]
    Invalid(String),

    /// Profile not found.
    #[error("Profile not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("Registry IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Profile JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Sink Errors
// =============================================================================

/// Errors while persisting a canonical table.
#[derive(Debug, Error)]
pub enum SinkError {
    /// IO error.
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer error.
    #[error("CSV output error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON error.
    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    /// Column mapping names a metric the table does not have.
    #[error("Column mapping refers to unknown metric: {0}")]
    UnknownMetric(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by [`crate::pipeline::run_source`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Supplier error.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Layout error.
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    /// Profile error.
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Sink error.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Layout used fallbacks while running in strict mode.
    #[error("Degraded layout rejected in strict mode: {0}")]
    Degraded(String),

    /// No sources to run.
    #[error("No sources to extract")]
    EmptyInput,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for supplier operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for layout resolution.
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Result type for profile operations.
pub type ProfileResult<T> = Result<T, ProfileError>;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
