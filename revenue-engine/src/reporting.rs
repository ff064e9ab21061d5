use crate::aggregation::{Aggregation, AggregationDiagnostics};
use crate::models::{CompanyContext, MaterialSale, PricingMode, ReportScope, RevenueBucket};
use crate::period::ReportPeriod;
use crate::rows::AcquisitionDiagnostics;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything the engine skipped or repaired while building a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDiagnostics {
    pub acquisition: AcquisitionDiagnostics,
    pub aggregation: AggregationDiagnostics,
}

/// Revenue report for one company, period and scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueReport {
    pub scope: ReportScope,
    pub period: ReportPeriod,
    pub company_id: Uuid,
    pub currency: String,
    /// Sorted by total revenue, highest first
    pub buckets: Vec<RevenueBucket>,
    pub grand_total: Decimal,
    pub diagnostics: ReportDiagnostics,
    pub generated_at: DateTime<Utc>,
}

impl RevenueReport {
    pub fn new(
        scope: ReportScope,
        period: ReportPeriod,
        company: &CompanyContext,
        aggregation: Aggregation,
        acquisition: AcquisitionDiagnostics,
    ) -> Self {
        let grand_total = aggregation.grand_total();
        Self {
            scope,
            period,
            company_id: company.company_id,
            currency: company.currency.clone(),
            buckets: aggregation.buckets,
            grand_total,
            diagnostics: ReportDiagnostics {
                acquisition,
                aggregation: aggregation.diagnostics,
            },
            generated_at: Utc::now(),
        }
    }

    /// No completed visits in the period; totals are zero
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn total_visits(&self) -> u64 {
        self.buckets.iter().map(|bucket| u64::from(bucket.visit_count)).sum()
    }
}

/// Display model of a report, with every amount formatted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportView {
    pub scope: ReportScope,
    pub period: String,
    pub currency: String,
    pub rows: Vec<ReportRow>,
    pub total_visits: u64,
    pub grand_total: String,
    pub is_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub rank: usize,
    pub name: String,
    pub branch_name: Option<String>,
    pub visit_count: u32,
    pub pricing_type: Option<String>,
    pub per_visit_revenue: String,
    pub monthly_revenue: String,
    pub material_revenue: String,
    pub total_revenue: String,
    /// One line per sold item
    pub material_lines: Vec<String>,
}

/// Round half away from zero to two decimals and append the currency code
pub fn format_amount(amount: Decimal, currency: &str) -> String {
    format!("{} {}", round_money(amount), currency)
}

pub(crate) fn round_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}", rounded)
}

/// Quantities print without trailing zeros
fn format_quantity(quantity: Decimal) -> String {
    quantity.normalize().to_string()
}

fn material_lines(sales: &[MaterialSale], currency: &str, default_unit: &str) -> Vec<String> {
    sales
        .iter()
        .flat_map(|sale| sale.items.iter())
        .map(|item| {
            format!(
                "{} {} x {} = {}",
                format_quantity(item.quantity),
                item.unit.as_deref().unwrap_or(default_unit),
                format_amount(item.unit_price, currency),
                format_amount(item.total_price, currency),
            )
        })
        .collect()
}

/// Build the display model of `report`
pub fn render(report: &RevenueReport, default_unit: &str) -> ReportView {
    let currency = report.currency.as_str();
    let rows = report
        .buckets
        .iter()
        .enumerate()
        .map(|(position, bucket)| ReportRow {
            rank: position + 1,
            name: bucket.name.clone(),
            branch_name: bucket.branch_name.clone(),
            visit_count: bucket.visit_count,
            pricing_type: bucket.pricing_type.map(|mode| mode.as_str().to_string()),
            per_visit_revenue: format_amount(bucket.per_visit_revenue, currency),
            monthly_revenue: format_amount(bucket.monthly_revenue, currency),
            material_revenue: format_amount(bucket.material_revenue, currency),
            total_revenue: format_amount(bucket.total_revenue, currency),
            material_lines: material_lines(&bucket.material_sales, currency, default_unit),
        })
        .collect();

    ReportView {
        scope: report.scope,
        period: report.period.to_string(),
        currency: report.currency.clone(),
        rows,
        total_visits: report.total_visits(),
        grand_total: format_amount(report.grand_total, currency),
        is_empty: report.is_empty(),
    }
}

/// Human label of a pricing mode column
pub fn pricing_label(mode: Option<PricingMode>) -> &'static str {
    match mode {
        Some(PricingMode::Monthly) => "Monthly",
        Some(PricingMode::PerVisit) => "Per visit",
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributionKey, MaterialSaleItem};
    use chrono::NaiveDate;

    fn report(buckets: Vec<RevenueBucket>) -> RevenueReport {
        let aggregation = Aggregation {
            buckets,
            diagnostics: AggregationDiagnostics::default(),
        };
        RevenueReport::new(
            ReportScope::Customer,
            ReportPeriod::new(2024, 3).unwrap(),
            &CompanyContext::new(Uuid::new_v4(), "TRY"),
            aggregation,
            AcquisitionDiagnostics::default(),
        )
    }

    #[test]
    fn test_format_amount_rounds_half_away_from_zero() {
        assert_eq!(format_amount(Decimal::new(12345, 3), "TRY"), "12.35 TRY");
        assert_eq!(format_amount(Decimal::new(12344, 3), "TRY"), "12.34 TRY");
        assert_eq!(format_amount(Decimal::from(300), "EUR"), "300.00 EUR");
        assert_eq!(format_amount(Decimal::from(1000) / Decimal::from(3), "TRY"), "333.33 TRY");
    }

    #[test]
    fn test_empty_report_renders_zero_total() {
        let report = report(Vec::new());
        assert!(report.is_empty());

        let view = render(&report, "adet");
        assert!(view.is_empty);
        assert!(view.rows.is_empty());
        assert_eq!(view.grand_total, "0.00 TRY");
        assert_eq!(view.period, "2024-03");
    }

    #[test]
    fn test_render_rows_and_material_lines() {
        let customer_id = Uuid::new_v4();
        let mut bucket = RevenueBucket::new(
            AttributionKey::Customer { customer_id },
            "Acme Foods".to_string(),
            None,
            Some(PricingMode::Monthly),
            "TRY",
        );
        bucket.visit_count = 3;
        bucket.monthly_revenue = Decimal::from(300);
        bucket.material_revenue = Decimal::from(50);
        bucket.material_sales.push(MaterialSale {
            id: Uuid::new_v4(),
            visit_id: None,
            customer_id,
            branch_id: None,
            sale_date: NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
            status: "completed".to_string(),
            total_amount: Decimal::from(50),
            items: vec![MaterialSaleItem {
                product_id: None,
                product_name: "Gel bait".to_string(),
                unit: None,
                quantity: Decimal::new(200, 2),
                unit_price: Decimal::from(25),
                total_price: Decimal::from(50),
            }],
        });
        bucket.finalize_total();

        let view = render(&report(vec![bucket]), "adet");
        assert_eq!(view.rows.len(), 1);
        let row = &view.rows[0];
        assert_eq!(row.rank, 1);
        assert_eq!(row.pricing_type.as_deref(), Some("monthly"));
        assert_eq!(row.total_revenue, "350.00 TRY");
        assert_eq!(row.material_lines, vec!["2 adet x 25.00 TRY = 50.00 TRY".to_string()]);
        assert_eq!(view.grand_total, "350.00 TRY");
        assert_eq!(view.total_visits, 3);
    }
}
