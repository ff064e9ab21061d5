//! Downloadable tabular exports of a revenue report
//!
//! Two formats are produced from the same table:
//! - HTML table markup, which spreadsheet applications open as a workbook
//! - CSV
//!
//! Amount cells hold plain numbers rounded to two decimals; the currency has
//! its own column. A report without buckets still yields a valid document with
//! the header row only.

use crate::config::{ExportFormat, RevenueConfig};
use crate::error::RevenueResult;
use crate::models::ReportScope;
use crate::reporting::{pricing_label, round_money, RevenueReport};
use csv::WriterBuilder;
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

const TABLE_TEMPLATE: &str = "revenue_table";

const HTML_TABLE: &str = r#"<html xmlns:x="urn:schemas-microsoft-com:office:excel">
<head><meta charset="utf-8"><title>{{title}}</title></head>
<body>
<table border="1">
<thead>
<tr>{{#each headers}}<th>{{this}}</th>{{/each}}</tr>
</thead>
<tbody>
{{#each rows}}<tr>{{#each this}}<td>{{this}}</td>{{/each}}</tr>
{{/each}}</tbody>
{{#if footer}}<tfoot>
<tr>{{#each footer}}<td><b>{{this}}</b></td>{{/each}}</tr>
</tfoot>
{{/if}}</table>
</body>
</html>
"#;

/// A rendered export, ready to be offered as a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDocument {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::HtmlTable => "xls",
            Self::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::HtmlTable => "application/vnd.ms-excel;charset=utf-8",
            Self::Csv => "text/csv;charset=utf-8",
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportTable {
    title: String,
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
    footer: Option<Vec<String>>,
}

impl ExportTable {
    fn from_report(report: &RevenueReport) -> Self {
        let headers = match report.scope {
            ReportScope::Customer => vec![
                "Customer",
                "Branch",
                "Visits",
                "Pricing",
                "Per-visit revenue",
                "Monthly revenue",
                "Material revenue",
                "Total revenue",
                "Currency",
            ],
            ReportScope::Operator => vec![
                "Operator",
                "Visits",
                "Per-visit revenue",
                "Monthly revenue",
                "Material revenue",
                "Total revenue",
                "Currency",
            ],
        };

        let rows = report
            .buckets
            .iter()
            .map(|bucket| {
                let mut row = vec![bucket.name.clone()];
                if report.scope == ReportScope::Customer {
                    row.push(bucket.branch_name.clone().unwrap_or_default());
                }
                row.push(bucket.visit_count.to_string());
                if report.scope == ReportScope::Customer {
                    row.push(pricing_label(bucket.pricing_type).to_string());
                }
                row.extend([
                    round_money(bucket.per_visit_revenue),
                    round_money(bucket.monthly_revenue),
                    round_money(bucket.material_revenue),
                    round_money(bucket.total_revenue),
                    bucket.currency.clone(),
                ]);
                row
            })
            .collect::<Vec<_>>();

        let footer = (!rows.is_empty()).then(|| {
            let mut footer = vec!["Total".to_string()];
            footer.resize(headers.len().saturating_sub(2), String::new());
            footer.push(round_money(report.grand_total));
            footer.push(report.currency.clone());
            footer
        });

        Self {
            title: format!("{} revenue {}", report.scope, report.period),
            headers,
            rows,
            footer,
        }
    }
}

/// Neutralize cells a spreadsheet would evaluate as a formula
fn harden_cell(cell: &str) -> String {
    match cell.trim_start().chars().next() {
        Some('=' | '+' | '-' | '@') => format!("'{}", cell),
        _ => cell.to_string(),
    }
}

/// Renders reports into downloadable documents
pub struct ReportExporter {
    handlebars: Handlebars<'static>,
    format: ExportFormat,
    customer_prefix: String,
    operator_prefix: String,
}

impl ReportExporter {
    pub fn new(format: ExportFormat) -> RevenueResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_template_string(TABLE_TEMPLATE, HTML_TABLE)?;

        let defaults = RevenueConfig::default();
        Ok(Self {
            handlebars,
            format,
            customer_prefix: defaults.customer_filename_prefix,
            operator_prefix: defaults.operator_filename_prefix,
        })
    }

    pub fn from_config(config: &RevenueConfig) -> RevenueResult<Self> {
        Ok(Self::new(config.export_format)?
            .with_filename_prefixes(&config.customer_filename_prefix, &config.operator_filename_prefix))
    }

    pub fn with_filename_prefixes(mut self, customer: &str, operator: &str) -> Self {
        self.customer_prefix = customer.to_string();
        self.operator_prefix = operator.to_string();
        self
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// `{prefix}_{year}_{month}.{ext}`, month without padding
    pub fn filename(&self, report: &RevenueReport) -> String {
        let prefix = match report.scope {
            ReportScope::Customer => &self.customer_prefix,
            ReportScope::Operator => &self.operator_prefix,
        };
        format!(
            "{}_{}_{}.{}",
            prefix,
            report.period.year(),
            report.period.month(),
            self.format.extension()
        )
    }

    pub fn export(&self, report: &RevenueReport) -> RevenueResult<ExportDocument> {
        let table = ExportTable::from_report(report);
        let bytes = match self.format {
            ExportFormat::HtmlTable => self.render_html(&table)?,
            ExportFormat::Csv => render_csv(&table)?,
        };

        let filename = self.filename(report);
        debug!(%filename, rows = table.rows.len(), bytes = bytes.len(), "Exported revenue report");

        Ok(ExportDocument {
            filename,
            content_type: self.format.content_type(),
            bytes,
        })
    }

    fn render_html(&self, table: &ExportTable) -> RevenueResult<Vec<u8>> {
        Ok(self.handlebars.render(TABLE_TEMPLATE, table)?.into_bytes())
    }
}

fn render_csv(table: &ExportTable) -> RevenueResult<Vec<u8>> {
    let mut writer = WriterBuilder::new().from_writer(vec![]);
    writer.write_record(&table.headers)?;
    for row in table.rows.iter().chain(table.footer.iter()) {
        writer.write_record(row.iter().map(|cell| harden_cell(cell)))?;
    }
    writer
        .into_inner()
        .map_err(|e| crate::error::RevenueError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{Aggregation, AggregationDiagnostics};
    use crate::models::{AttributionKey, CompanyContext, PricingMode, RevenueBucket};
    use crate::period::ReportPeriod;
    use crate::rows::AcquisitionDiagnostics;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn report(scope: ReportScope, buckets: Vec<RevenueBucket>) -> RevenueReport {
        RevenueReport::new(
            scope,
            ReportPeriod::new(2024, 3).unwrap(),
            &CompanyContext::new(Uuid::new_v4(), "TRY"),
            Aggregation {
                buckets,
                diagnostics: AggregationDiagnostics::default(),
            },
            AcquisitionDiagnostics::default(),
        )
    }

    fn bucket(name: &str, total: i64) -> RevenueBucket {
        let mut bucket = RevenueBucket::new(
            AttributionKey::Customer {
                customer_id: Uuid::new_v4(),
            },
            name.to_string(),
            Some("Main <depot>".to_string()),
            Some(PricingMode::PerVisit),
            "TRY",
        );
        bucket.visit_count = 2;
        bucket.per_visit_revenue = Decimal::from(total);
        bucket.finalize_total();
        bucket
    }

    #[test]
    fn test_html_export_escapes_and_names_file() {
        let exporter = ReportExporter::new(ExportFormat::HtmlTable).unwrap();
        let document = exporter
            .export(&report(ReportScope::Customer, vec![bucket("Tom & Jerry Ltd", 250)]))
            .unwrap();

        assert_eq!(document.filename, "customer_revenue_report_2024_3.xls");
        assert_eq!(document.content_type, "application/vnd.ms-excel;charset=utf-8");

        let html = String::from_utf8(document.bytes).unwrap();
        assert!(html.contains("<td>Tom &amp; Jerry Ltd</td>"));
        assert!(html.contains("<td>Main &lt;depot&gt;</td>"));
        assert!(html.contains("<td>250.00</td>"));
        assert!(html.contains("<tfoot>"));
    }

    #[test]
    fn test_empty_report_exports_header_only() {
        let exporter = ReportExporter::new(ExportFormat::HtmlTable).unwrap();
        let document = exporter.export(&report(ReportScope::Operator, Vec::new())).unwrap();
        assert_eq!(document.filename, "operator_revenue_report_2024_3.xls");

        let html = String::from_utf8(document.bytes).unwrap();
        assert!(html.contains("<th>Operator</th>"));
        assert!(!html.contains("<td>"));
        assert!(!html.contains("<tfoot>"));

        let csv = ReportExporter::new(ExportFormat::Csv)
            .unwrap()
            .export(&report(ReportScope::Operator, Vec::new()))
            .unwrap();
        let text = String::from_utf8(csv.bytes).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_csv_export_rows_and_total() {
        let exporter = ReportExporter::new(ExportFormat::Csv)
            .unwrap()
            .with_filename_prefixes("musteri", "operator");
        let document = exporter
            .export(&report(
                ReportScope::Customer,
                vec![bucket("=HYPERLINK(\"x\")", 300), bucket("Acme", 100)],
            ))
            .unwrap();

        assert_eq!(document.filename, "musteri_2024_3.csv");
        assert_eq!(document.content_type, "text/csv;charset=utf-8");

        let mut reader = csv::Reader::from_reader(document.bytes.as_slice());
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(&records[0][0], "'=HYPERLINK(\"x\")");
        assert_eq!(&records[0][7], "300.00");
        assert_eq!(&records[2][0], "Total");
        assert_eq!(&records[2][7], "400.00");
        assert_eq!(&records[2][8], "TRY");
    }
}
