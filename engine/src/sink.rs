//! Output sinks for canonical tables.
//!
//! A sink persists one [`CanonicalTable`]: one row per period, one column per
//! metric, in the table's metric order. Missing values are written as empty
//! CSV fields or JSON `null`, never as zero.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{SinkError, SinkResult};
use crate::merge::CanonicalTable;
use crate::period::Period;

/// Metric name -> output column name. Unmapped metrics keep their name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping(BTreeMap<String, String>);

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metric: impl Into<String>, column: impl Into<String>) {
        self.0.insert(metric.into(), column.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mapped metric names.
    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn output_name<'a>(&'a self, metric: &'a str) -> &'a str {
        self.0.get(metric).map_or(metric, String::as_str)
    }

    /// Merge another mapping in; entries of `other` win.
    pub fn merged_with(&self, other: &ColumnMapping) -> ColumnMapping {
        let mut merged = self.clone();
        merged.0.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Output header for a table, after checking every mapped metric exists.
    pub fn headers(&self, table: &CanonicalTable) -> SinkResult<Vec<String>> {
        if let Some(unknown) = self.metrics().find(|m| table.metric_index(m).is_none()) {
            return Err(SinkError::UnknownMetric(unknown.to_string()));
        }
        Ok(table
            .metrics
            .iter()
            .map(|m| self.output_name(m).to_string())
            .collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ColumnMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// Destination for a canonical table.
pub trait Sink {
    fn write(&mut self, table: &CanonicalTable, columns: &ColumnMapping) -> SinkResult<()>;
}

// =============================================================================
// CSV
// =============================================================================

/// Writes `period,<col>,...` rows.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
        }
    }

    pub fn into_inner(self) -> SinkResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))
    }
}

impl<W: Write> Sink for CsvSink<W> {
    fn write(&mut self, table: &CanonicalTable, columns: &ColumnMapping) -> SinkResult<()> {
        let mut header = vec!["period".to_string()];
        header.extend(columns.headers(table)?);
        self.writer.write_record(&header)?;

        for (period, values) in &table.rows {
            let mut record = Vec::with_capacity(values.len() + 1);
            record.push(period.key());
            record.extend(values.iter().map(|v| v.map(|n| n.to_string()).unwrap_or_default()));
            self.writer.write_record(&record)?;
        }

        self.writer.flush()?;
        Ok(())
    }
}

// =============================================================================
// JSON
// =============================================================================

/// Writes an array of `{"period": ..., "<col>": value|null}` objects.
pub struct JsonSink<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, pretty: true }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for JsonSink<W> {
    fn write(&mut self, table: &CanonicalTable, columns: &ColumnMapping) -> SinkResult<()> {
        let headers = columns.headers(table)?;

        let records: Vec<JsonRecord<'_>> = table
            .rows
            .iter()
            .map(|(period, values)| JsonRecord {
                period,
                headers: &headers,
                values,
            })
            .collect();

        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, &records)?;
        } else {
            serde_json::to_writer(&mut self.writer, &records)?;
        }
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// One output object: `period` first, then the columns in table order.
struct JsonRecord<'a> {
    period: &'a Period,
    headers: &'a [String],
    values: &'a [Option<f64>],
}

impl Serialize for JsonRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.headers.len() + 1))?;
        map.serialize_entry("period", self.period)?;
        for (name, value) in self.headers.iter().zip(self.values) {
            // Non-finite values have no JSON form.
            map.serialize_entry(name, &value.filter(|v| v.is_finite()))?;
        }
        map.end()
    }
}

/// Write a table to a file in the given format.
pub fn write_file(
    path: &Path,
    format: OutputFormat,
    table: &CanonicalTable,
    columns: &ColumnMapping,
) -> SinkResult<()> {
    let file = BufWriter::new(File::create(path)?);
    match format {
        OutputFormat::Csv => CsvSink::new(file).write(table, columns),
        OutputFormat::Json => JsonSink::new(file).write(table, columns),
    }
}
