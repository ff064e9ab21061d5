// Revenue engine configuration
use crate::error::{RevenueError, RevenueResult};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix, e.g. `PESTCARE_DEFAULT_CURRENCY`
pub const ENV_PREFIX: &str = "PESTCARE";

/// How monthly fees are spread across visits in the operator report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorProration {
    /// Each monthly-priced visit adds the fee divided by the operator's visit
    /// count at the moment the visit is folded in
    RunningVisitCount,
    /// Each monthly-priced visit adds the fee divided by the number of
    /// completed visits of its customer/branch in the period
    EndOfScan,
}

impl Default for OperatorProration {
    fn default() -> Self {
        Self::RunningVisitCount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// HTML table markup that spreadsheet applications open as a workbook
    HtmlTable,
    Csv,
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::HtmlTable
    }
}

/// Placeholder names for rows whose joined relation is missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayLabels {
    pub unknown_customer: String,
    pub unknown_branch: String,
    pub unknown_operator: String,
    pub unknown_product: String,
    pub default_unit: String,
}

impl Default for DisplayLabels {
    fn default() -> Self {
        Self {
            unknown_customer: "Unknown customer".to_string(),
            unknown_branch: "Unknown branch".to_string(),
            unknown_operator: "Unknown operator".to_string(),
            unknown_product: "Unknown product".to_string(),
            default_unit: "adet".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevenueConfig {
    /// Currency used when the company record carries none
    pub default_currency: String,
    pub labels: DisplayLabels,
    pub operator_proration: OperatorProration,
    pub export_format: ExportFormat,
    pub customer_filename_prefix: String,
    pub operator_filename_prefix: String,
    /// Upper bound for the joined acquisition fetch
    pub fetch_timeout_secs: u64,
}

impl Default for RevenueConfig {
    fn default() -> Self {
        Self {
            default_currency: "TRY".to_string(),
            labels: DisplayLabels::default(),
            operator_proration: OperatorProration::default(),
            export_format: ExportFormat::default(),
            customer_filename_prefix: "customer_revenue_report".to_string(),
            operator_filename_prefix: "operator_revenue_report".to_string(),
            fetch_timeout_secs: 30,
        }
    }
}

impl RevenueConfig {
    /// Load defaults, then the optional file, then `PESTCARE_*` environment variables
    pub fn load(path: Option<&Path>) -> RevenueResult<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document layered over the defaults
    pub fn from_yaml_str(yaml: &str) -> RevenueResult<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RevenueResult<()> {
        if self.default_currency.trim().is_empty() {
            return Err(RevenueError::Config("default_currency cannot be empty".to_string()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(RevenueError::Config("fetch_timeout_secs must be positive".to_string()));
        }
        if self.customer_filename_prefix.trim().is_empty()
            || self.operator_filename_prefix.trim().is_empty()
        {
            return Err(RevenueError::Config("export filename prefixes cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn filename_prefix(&self, scope: crate::models::ReportScope) -> &str {
        match scope {
            crate::models::ReportScope::Customer => &self.customer_filename_prefix,
            crate::models::ReportScope::Operator => &self.operator_filename_prefix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RevenueConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_currency, "TRY");
        assert_eq!(config.operator_proration, OperatorProration::RunningVisitCount);
        assert_eq!(config.export_format, ExportFormat::HtmlTable);
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let config = RevenueConfig::from_yaml_str(
            r#"
default_currency: EUR
operator_proration: end_of_scan
export_format: csv
labels:
  unknown_customer: "Bilinmeyen Müşteri"
"#,
        )
        .unwrap();

        assert_eq!(config.default_currency, "EUR");
        assert_eq!(config.operator_proration, OperatorProration::EndOfScan);
        assert_eq!(config.export_format, ExportFormat::Csv);
        assert_eq!(config.labels.unknown_customer, "Bilinmeyen Müşteri");
        assert_eq!(config.labels.unknown_operator, "Unknown operator");
        assert_eq!(config.fetch_timeout_secs, 30);
    }

    #[test]
    fn test_rejects_empty_currency_and_zero_timeout() {
        assert!(matches!(
            RevenueConfig::from_yaml_str("default_currency: \"  \""),
            Err(RevenueError::Config(_))
        ));
        assert!(matches!(
            RevenueConfig::from_yaml_str("fetch_timeout_secs: 0"),
            Err(RevenueError::Config(_))
        ));
    }
}
