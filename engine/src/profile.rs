//! Table profiles.
//!
//! A profile is the whole recipe for one family of tables: how to read the
//! file, where the landmarks are, how to coerce values, and what to call the
//! output columns. Profiles are plain JSON so new table families need no code.

use serde::{Deserialize, Serialize};

use crate::anchor::Pattern;
use crate::error::{ProfileError, ProfileResult};
use crate::extract::ExtractOptions;
use crate::layout::{LayoutRules, MetricRule};
use crate::period::Frequency;
use crate::sink::ColumnMapping;
use crate::source::{SourceKind, SourceOptions};

/// Names of the built-in profiles.
pub const BUILTIN_PROFILES: &[&str] = &[
    "cpi",
    "business-cycle",
    "wage-annual",
    "wage-annual-yoy",
    "real-estate-tokyo",
];

/// Extraction recipe for one table family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableProfile {
    /// Version of the profile format
    #[serde(default = "default_version")]
    pub version: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// How to read the raw file
    #[serde(default)]
    pub source: SourceOptions,

    /// Landmarks and fallbacks
    pub layout: LayoutRules,

    /// Value coercion and period handling
    #[serde(default)]
    pub extract: ExtractOptions,

    /// Metric name -> output column name
    #[serde(default)]
    pub columns: ColumnMapping,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl TableProfile {
    pub fn new(name: impl Into<String>, layout: LayoutRules) -> Self {
        Self {
            version: default_version(),
            name: name.into(),
            description: String::new(),
            source: SourceOptions::default(),
            layout,
            extract: ExtractOptions::default(),
            columns: ColumnMapping::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Parse and validate a profile from JSON
    pub fn from_json(json: &str) -> ProfileResult<Self> {
        let profile: TableProfile = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> ProfileResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Metric names in output order.
    pub fn metric_names(&self) -> Vec<&str> {
        self.layout.metrics.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn validate(&self) -> ProfileResult<()> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::Invalid("profile name is empty".into()));
        }
        self.layout
            .validate()
            .map_err(|e| ProfileError::Invalid(format!("{}: {}", self.name, e)))?;

        let metrics = self.metric_names();
        if let Some(unknown) = self.columns.metrics().find(|m| !metrics.contains(m)) {
            return Err(ProfileError::Invalid(format!(
                "{}: column mapping refers to unknown metric '{}'",
                self.name, unknown
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Built-in profiles
// =============================================================================

/// Look up a built-in profile by name.
pub fn builtin(name: &str) -> Option<TableProfile> {
    match name {
        "cpi" => Some(cpi_profile()),
        "business-cycle" => Some(business_cycle_profile()),
        "wage-annual" => Some(wage_annual_profile()),
        "wage-annual-yoy" => Some(wage_annual_yoy_profile()),
        "real-estate-tokyo" => Some(real_estate_tokyo_profile()),
        _ => None,
    }
}

/// All built-in profiles.
pub fn builtins() -> Vec<TableProfile> {
    BUILTIN_PROFILES.iter().filter_map(|name| builtin(name)).collect()
}

/// Consumer price index workbook: one "総合" column next to a
/// "時間軸コード" time-code block.
fn cpi_profile() -> TableProfile {
    let layout = LayoutRules::new(
        Pattern::substring("時間軸コード"),
        vec![MetricRule::new("総合", Some(Pattern::substring("総合")), 12)],
    );

    let mut profile = TableProfile::new("cpi", layout)
        .with_description("Consumer price index, all items (総合), monthly");
    profile.extract.frequency = Some(Frequency::Monthly);
    profile
}

/// Business-cycle indexes: CI and DI sections side by side, each with
/// leading/coincident/lagging columns under the same labels.
fn business_cycle_profile() -> TableProfile {
    let labels = [("先行指数", 0), ("一致指数", 1), ("遅行指数", 2)];

    let mut metrics = Vec::new();
    for (section, occurrence, base) in [("CI", 0, 3), ("DI", 1, 9)] {
        for (label, offset) in labels {
            metrics.push(
                MetricRule::new(
                    format!("{}_{}", section, label),
                    Some(Pattern::substring(label)),
                    base + offset,
                )
                .with_occurrence(occurrence),
            );
        }
    }

    let mut layout = LayoutRules::new(Pattern::substring("先行指数"), metrics);
    layout.header_row_requires = vec![Pattern::substring("一致指数"), Pattern::substring("遅行指数")];
    layout.header_scan_limit = Some(10);

    let mut profile = TableProfile::new("business-cycle", layout)
        .with_description("Composite (CI) and diffusion (DI) indexes, monthly");
    profile.extract.frequency = Some(Frequency::Monthly);
    profile.extract.placeholders.push("NA".to_string());
    profile
}

fn year_on_year_marker() -> Pattern {
    Pattern::any_of(["前年比", "Year-on-year", "year-on-year"])
}

/// Annual wage index: year in column A, value in column B of the TL sheet,
/// stopping where the year-on-year section starts.
fn wage_annual_profile() -> TableProfile {
    let mut layout = LayoutRules::new(
        Pattern::any_of(["年", "Year"]),
        vec![MetricRule::new("指数", None, 1)],
    );
    layout.header_scan_limit = Some(20);
    layout.offsets.fixed = Some(1);
    layout.date.fixed_window = Some((0, 1));
    layout.end_marker = Some(year_on_year_marker());

    let mut profile = TableProfile::new("wage-annual", layout)
        .with_description("Annual average wage index (TL sheet)");
    profile.source.kind = Some(SourceKind::Workbook);
    profile.source.sheet = Some("TL".to_string());
    profile.extract.frequency = Some(Frequency::Annual);
    profile
}

/// Year-on-year section stacked under the wage index on the same sheet.
/// Merged with `wage-annual` it gives one row per year with both columns.
fn wage_annual_yoy_profile() -> TableProfile {
    let mut layout = LayoutRules::new(year_on_year_marker(), vec![MetricRule::new("前年比", None, 1)]);
    layout.offsets.fixed = Some(1);
    layout.date.fixed_window = Some((0, 1));

    let mut profile = TableProfile::new("wage-annual-yoy", layout)
        .with_description("Annual wage index, year-on-year change (TL sheet)");
    profile.source.kind = Some(SourceKind::Workbook);
    profile.source.sheet = Some("TL".to_string());
    profile.extract.frequency = Some(Frequency::Annual);
    profile
}

/// Commercial property price index, Tokyo sheet. Dates sit in column A six
/// rows below the Japanese property-type header; the price index is the
/// first column under each type.
fn real_estate_tokyo_profile() -> TableProfile {
    let types = [
        ("商業用不動産総合", Pattern::substring("商業用不動産総合"), 2, "Commercial_Property"),
        ("店舗", Pattern::substring("店舗"), 8, "Retail"),
        ("オフィス", Pattern::substring("オフィス"), 11, "Office"),
        ("倉庫", Pattern::substring("倉庫"), 14, "Warehouse"),
        ("工場", Pattern::substring("工場"), 17, "Factory"),
        (
            "マンション・アパート",
            Pattern::any_of(["ﾏﾝｼｮﾝ･ｱﾊﾟｰﾄ", "マンション・アパート"]),
            20,
            "Apartment",
        ),
    ];

    let mut metrics = Vec::new();
    let mut columns = ColumnMapping::new();
    for (name, label, fallback, output) in types {
        metrics.push(MetricRule::new(name, Some(label), fallback));
        columns.insert(name, output);
    }

    let mut layout = LayoutRules::new(Pattern::substring("商業用不動産総合"), metrics);
    layout.header_row_requires = vec![Pattern::substring("店舗"), Pattern::substring("オフィス")];
    layout.header_scan_limit = Some(20);
    // Labels share the header row; titles above may repeat them.
    layout.label_lookback = 0;
    layout.offsets.fixed = Some(6);
    layout.date.fixed_window = Some((0, 1));

    let mut profile = TableProfile::new("real-estate-tokyo", layout)
        .with_description("Commercial property price index, Tokyo, by property type");
    profile.source.kind = Some(SourceKind::Workbook);
    profile.source.sheet = Some("東京都Tokyo".to_string());
    profile.extract.frequency = Some(Frequency::Annual);
    profile.columns = columns;
    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_valid() {
        let all = builtins();
        assert_eq!(all.len(), BUILTIN_PROFILES.len());
        for profile in all {
            profile.validate().unwrap();
        }
    }

    #[test]
    fn test_business_cycle_metrics() {
        let profile = builtin("business-cycle").unwrap();
        assert_eq!(
            profile.metric_names(),
            vec!["CI_先行指数", "CI_一致指数", "CI_遅行指数", "DI_先行指数", "DI_一致指数", "DI_遅行指数"]
        );
        let fallbacks: Vec<usize> = profile.layout.metrics.iter().map(|m| m.fallback_column).collect();
        assert_eq!(fallbacks, vec![3, 4, 5, 9, 10, 11]);
        assert_eq!(profile.layout.metrics[3].occurrence, 1);
    }

    #[test]
    fn test_json_round_trip() {
        let profile = builtin("cpi").unwrap();
        let json = profile.to_json().unwrap();
        let parsed = TableProfile::from_json(&json).unwrap();

        assert_eq!(parsed.name, "cpi");
        assert_eq!(parsed.layout.metrics[0].fallback_column, 12);
        assert_eq!(parsed.extract.frequency, Some(Frequency::Monthly));
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{
            "name": "custom",
            "layout": {
                "header": {"type": "substring", "value": "Time"},
                "metrics": [{"name": "value", "label": {"type": "substring", "value": "Value"}, "fallback_column": 2}]
            }
        }"#;
        let profile = TableProfile::from_json(json).unwrap();

        assert_eq!(profile.version, "1.0");
        assert_eq!(profile.layout.label_lookback, 2);
        assert_eq!(profile.layout.offsets.label_below, 2);
        assert!(profile.extract.placeholders.contains(&"*".to_string()));
        assert!(profile.columns.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        let mut profile = builtin("cpi").unwrap();
        profile.layout.offsets.label_above = 0;
        assert!(matches!(profile.validate(), Err(ProfileError::Invalid(_))));

        let mut profile = builtin("cpi").unwrap();
        profile.columns.insert("missing", "x");
        assert!(matches!(profile.validate(), Err(ProfileError::Invalid(_))));

        let mut profile = builtin("cpi").unwrap();
        profile.name = " ".into();
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_real_estate_output_names() {
        let profile = builtin("real-estate-tokyo").unwrap();
        let outputs: Vec<&str> = profile
            .metric_names()
            .into_iter()
            .map(|m| profile.columns.output_name(m))
            .collect();
        assert_eq!(
            outputs,
            vec!["Commercial_Property", "Retail", "Office", "Warehouse", "Factory", "Apartment"]
        );
        let fallbacks: Vec<usize> = profile.layout.metrics.iter().map(|m| m.fallback_column).collect();
        assert_eq!(fallbacks, vec![2, 8, 11, 14, 17, 20]);
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(builtin("gdp").is_none());
    }
}
