//! Raw rows as returned by the data store, and their conversion into the
//! typed records the aggregator works on.
//!
//! Joined relations may be missing (a deleted customer, branch or product) and
//! amounts may arrive as numbers, numeric strings or garbage. Everything is
//! validated here so the aggregator never sees a loosely-typed value:
//! - missing names become the configured placeholder labels
//! - non-numeric or negative amounts become zero and are counted
//! - rows without a usable id are dropped and counted

use crate::config::DisplayLabels;
use crate::models::*;
use crate::period::ReportPeriod;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub id: Uuid,
    #[serde(default)]
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRef {
    pub id: Uuid,
    #[serde(default)]
    pub branch_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRow {
    pub id: Uuid,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub branch_id: Option<Uuid>,
    #[serde(default)]
    pub operator_id: Option<Uuid>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub visit_date: NaiveDateTime,
    pub status: String,
    #[serde(default)]
    pub is_invoiced: Option<bool>,
    #[serde(default)]
    pub customer: Option<CustomerRef>,
    #[serde(default)]
    pub branch: Option<BranchRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRow {
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub branch_id: Option<Uuid>,
    #[serde(default)]
    pub pricing_type: Option<String>,
    #[serde(default)]
    pub per_visit_price: Option<Value>,
    #[serde(default)]
    pub monthly_price: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSaleItemRow {
    #[serde(default)]
    pub product_id: Option<Uuid>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub unit_price: Option<Value>,
    #[serde(default)]
    pub total_price: Option<Value>,
    #[serde(default, alias = "paid_products")]
    pub product: Option<ProductRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSaleRow {
    pub id: Uuid,
    #[serde(default)]
    pub visit_id: Option<Uuid>,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub branch_id: Option<Uuid>,
    pub sale_date: NaiveDate,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_amount: Option<Value>,
    #[serde(default, alias = "paid_material_sale_items")]
    pub items: Vec<MaterialSaleItemRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorRow {
    pub id: Uuid,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Counters for data that was repaired or discarded during conversion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionDiagnostics {
    /// Amounts that were non-numeric or negative and were read as zero
    pub malformed_amounts: usize,
    /// Rows dropped because a required reference was missing
    pub dropped_rows: usize,
    /// Rows dropped because they were outside the period or not completed
    pub out_of_scope_rows: usize,
    /// Rows whose joined relation was missing and got a placeholder name
    pub placeholder_names: usize,
}

/// Result of reading a loosely-typed amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amount {
    Missing,
    Valid(Decimal),
    Malformed,
}

/// Largest amount accepted from a row; anything above is malformed
///
/// Keeps every roll-up far inside `Decimal`'s range.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);

impl Amount {
    pub fn parse(raw: Option<&Value>) -> Self {
        match raw {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::Number(number)) => Self::from_text(&number.to_string()),
            Some(Value::String(text)) if text.trim().is_empty() => Self::Missing,
            Some(Value::String(text)) => Self::from_text(text.trim()),
            Some(_) => Self::Malformed,
        }
    }

    fn from_text(text: &str) -> Self {
        let parsed = Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text));
        match parsed {
            Ok(value) if value.is_sign_negative() && !value.is_zero() => Self::Malformed,
            Ok(value) if value > MAX_AMOUNT => Self::Malformed,
            Ok(value) => Self::Valid(value),
            Err(_) => Self::Malformed,
        }
    }

    /// Optional amount, with malformed input coerced to zero
    pub fn coerce(self, diagnostics: &mut AcquisitionDiagnostics) -> Option<Decimal> {
        match self {
            Self::Missing => None,
            Self::Valid(value) => Some(value),
            Self::Malformed => {
                diagnostics.malformed_amounts += 1;
                Some(Decimal::ZERO)
            }
        }
    }

    /// Required amount, zero when missing or malformed
    pub fn or_zero(self, diagnostics: &mut AcquisitionDiagnostics) -> Decimal {
        self.coerce(diagnostics).unwrap_or(Decimal::ZERO)
    }
}

fn name_or_placeholder(
    name: Option<&str>,
    placeholder: &str,
    diagnostics: &mut AcquisitionDiagnostics,
) -> String {
    match name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => name.to_string(),
        None => {
            diagnostics.placeholder_names += 1;
            placeholder.to_string()
        }
    }
}

impl VisitRow {
    /// Convert an in-period visit of any status; visits outside the period yield `None`
    pub fn into_visit(
        self,
        period: &ReportPeriod,
        labels: &DisplayLabels,
        diagnostics: &mut AcquisitionDiagnostics,
    ) -> Option<Visit> {
        if !period.contains(self.visit_date) {
            diagnostics.out_of_scope_rows += 1;
            return None;
        }
        let status = VisitStatus::parse(&self.status);

        let Some(customer_id) = self.customer_id.or(self.customer.as_ref().map(|c| c.id)) else {
            warn!(visit_id = %self.id, "Dropping visit without customer reference");
            diagnostics.dropped_rows += 1;
            return None;
        };

        let customer_name = name_or_placeholder(
            self.customer.as_ref().and_then(|c| c.company_name.as_deref()),
            &labels.unknown_customer,
            diagnostics,
        );

        let branch_id = self.branch_id.or(self.branch.as_ref().map(|b| b.id));
        let branch_name = branch_id.map(|_| {
            name_or_placeholder(
                self.branch.as_ref().and_then(|b| b.branch_name.as_deref()),
                &labels.unknown_branch,
                diagnostics,
            )
        });

        Some(Visit {
            id: self.id,
            customer_id,
            customer_name,
            branch_id,
            branch_name,
            operator_id: self.operator_id,
            visit_date: self.visit_date,
            status,
            is_invoiced: self.is_invoiced.unwrap_or(false),
        })
    }
}

impl PricingRow {
    /// Branch rows take the branch as owner even when they also carry the customer id
    pub fn into_record(self, diagnostics: &mut AcquisitionDiagnostics) -> Option<PricingRecord> {
        let owner = match (self.branch_id, self.customer_id) {
            (Some(branch_id), _) => PricingOwner::Branch(branch_id),
            (None, Some(customer_id)) => PricingOwner::Customer(customer_id),
            (None, None) => {
                warn!("Dropping pricing row without customer or branch reference");
                diagnostics.dropped_rows += 1;
                return None;
            }
        };

        let per_visit_price = Amount::parse(self.per_visit_price.as_ref()).coerce(diagnostics);
        let monthly_price = Amount::parse(self.monthly_price.as_ref()).coerce(diagnostics);

        Some(PricingRecord {
            owner,
            declared_mode: self.pricing_type.as_deref().and_then(PricingMode::parse),
            per_visit_price,
            monthly_price,
        })
    }
}

impl MaterialSaleItemRow {
    pub fn into_item(
        self,
        labels: &DisplayLabels,
        diagnostics: &mut AcquisitionDiagnostics,
    ) -> MaterialSaleItem {
        let product_name = name_or_placeholder(
            self.product.as_ref().and_then(|p| p.name.as_deref()),
            &labels.unknown_product,
            diagnostics,
        );

        MaterialSaleItem {
            product_id: self.product_id,
            product_name,
            unit: self.product.and_then(|p| p.unit).filter(|u| !u.trim().is_empty()),
            quantity: Amount::parse(self.quantity.as_ref()).or_zero(diagnostics),
            unit_price: Amount::parse(self.unit_price.as_ref()).or_zero(diagnostics),
            total_price: Amount::parse(self.total_price.as_ref()).or_zero(diagnostics),
        }
    }
}

impl MaterialSaleRow {
    /// Convert a sale dated inside the period; anything else yields `None`
    pub fn into_sale(
        self,
        period: &ReportPeriod,
        labels: &DisplayLabels,
        diagnostics: &mut AcquisitionDiagnostics,
    ) -> Option<MaterialSale> {
        if !period.contains_date(self.sale_date) {
            diagnostics.out_of_scope_rows += 1;
            return None;
        }

        let Some(customer_id) = self.customer_id else {
            warn!(sale_id = %self.id, "Dropping material sale without customer reference");
            diagnostics.dropped_rows += 1;
            return None;
        };

        let items: Vec<MaterialSaleItem> = self
            .items
            .into_iter()
            .map(|item| item.into_item(labels, diagnostics))
            .collect();

        debug!(sale_id = %self.id, items = items.len(), "Converted material sale");

        Some(MaterialSale {
            id: self.id,
            visit_id: self.visit_id,
            customer_id,
            branch_id: self.branch_id,
            sale_date: self.sale_date,
            status: self.status.unwrap_or_default(),
            total_amount: Amount::parse(self.total_amount.as_ref()).or_zero(diagnostics),
            items,
        })
    }
}

impl OperatorRow {
    pub fn into_operator(
        self,
        labels: &DisplayLabels,
        diagnostics: &mut AcquisitionDiagnostics,
    ) -> Operator {
        Operator {
            id: self.id,
            full_name: name_or_placeholder(
                self.full_name.as_deref(),
                &labels.unknown_operator,
                diagnostics,
            ),
            email: self.email,
        }
    }
}

/// Accepts RFC 3339 timestamps (offset dropped, wall-clock kept), naive
/// timestamps and plain dates (read as midnight).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn march() -> ReportPeriod {
        ReportPeriod::new(2024, 3).unwrap()
    }

    #[test]
    fn test_amount_parsing() {
        assert_eq!(Amount::parse(None), Amount::Missing);
        assert_eq!(Amount::parse(Some(&Value::Null)), Amount::Missing);
        assert_eq!(Amount::parse(Some(&json!(150))), Amount::Valid(Decimal::from(150)));
        assert_eq!(Amount::parse(Some(&json!("99.90"))), Amount::Valid(Decimal::new(9990, 2)));
        assert_eq!(Amount::parse(Some(&json!(""))), Amount::Missing);
        assert_eq!(Amount::parse(Some(&json!("abc"))), Amount::Malformed);
        assert_eq!(Amount::parse(Some(&json!(-5))), Amount::Malformed);
        assert_eq!(Amount::parse(Some(&json!(true))), Amount::Malformed);
        assert_eq!(Amount::parse(Some(&json!("1000000000000000"))), Amount::Valid(MAX_AMOUNT));
        assert_eq!(
            Amount::parse(Some(&json!("50000000000000000000000000000"))),
            Amount::Malformed
        );
    }

    #[test]
    fn test_oversized_amount_is_counted_as_malformed() {
        let mut diagnostics = AcquisitionDiagnostics::default();
        let row: PricingRow = serde_json::from_value(json!({
            "customer_id": Uuid::new_v4(),
            "per_visit_price": "50000000000000000000000000000"
        }))
        .unwrap();

        let record = row.into_record(&mut diagnostics).unwrap();
        assert_eq!(record.per_visit_price, Some(Decimal::ZERO));
        assert_eq!(diagnostics.malformed_amounts, 1);
    }

    #[test]
    fn test_malformed_amounts_coerce_to_zero() {
        let mut diagnostics = AcquisitionDiagnostics::default();
        let row: PricingRow = serde_json::from_value(json!({
            "customer_id": Uuid::new_v4(),
            "per_visit_price": "not a number",
            "monthly_price": -100
        }))
        .unwrap();

        let record = row.into_record(&mut diagnostics).unwrap();
        assert_eq!(record.per_visit_price, Some(Decimal::ZERO));
        assert_eq!(record.monthly_price, Some(Decimal::ZERO));
        assert_eq!(record.effective_mode(), PricingMode::PerVisit);
        assert_eq!(diagnostics.malformed_amounts, 2);
    }

    #[test]
    fn test_branch_row_is_owned_by_branch() {
        let mut diagnostics = AcquisitionDiagnostics::default();
        let branch = Uuid::new_v4();
        let row = PricingRow {
            customer_id: Some(Uuid::new_v4()),
            branch_id: Some(branch),
            pricing_type: Some("monthly".to_string()),
            per_visit_price: None,
            monthly_price: Some(json!("900")),
        };
        let record = row.into_record(&mut diagnostics).unwrap();
        assert_eq!(record.owner, PricingOwner::Branch(branch));
        assert_eq!(record.declared_mode, Some(PricingMode::Monthly));

        let orphan = PricingRow {
            customer_id: None,
            branch_id: None,
            pricing_type: None,
            per_visit_price: Some(json!(10)),
            monthly_price: None,
        };
        assert!(orphan.into_record(&mut diagnostics).is_none());
        assert_eq!(diagnostics.dropped_rows, 1);
    }

    #[test]
    fn test_visit_with_missing_customer_join_gets_placeholder() {
        let mut diagnostics = AcquisitionDiagnostics::default();
        let labels = DisplayLabels::default();
        let customer_id = Uuid::new_v4();
        let row: VisitRow = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "customer_id": customer_id,
            "visit_date": "2024-03-10T09:30:00+03:00",
            "status": "completed",
            "customer": null
        }))
        .unwrap();

        let visit = row.into_visit(&march(), &labels, &mut diagnostics).unwrap();
        assert_eq!(visit.customer_id, customer_id);
        assert_eq!(visit.customer_name, labels.unknown_customer);
        assert_eq!(visit.branch_name, None);
        assert!(!visit.is_invoiced);
        assert_eq!(diagnostics.placeholder_names, 1);
    }

    #[test]
    fn test_visit_outside_period_is_skipped() {
        let mut diagnostics = AcquisitionDiagnostics::default();
        let labels = DisplayLabels::default();
        let row = |date: &str, status: &str| VisitRow {
            id: Uuid::new_v4(),
            customer_id: Some(Uuid::new_v4()),
            branch_id: None,
            operator_id: None,
            visit_date: parse_timestamp(date).unwrap(),
            status: status.to_string(),
            is_invoiced: None,
            customer: None,
            branch: None,
        };

        assert!(row("2024-04-01T00:00:00", "completed")
            .into_visit(&march(), &labels, &mut diagnostics)
            .is_none());
        assert!(row("2024-02-29T23:59:59", "completed")
            .into_visit(&march(), &labels, &mut diagnostics)
            .is_none());
        assert_eq!(diagnostics.out_of_scope_rows, 2);

        let planned = row("2024-03-05T10:00:00", "planned")
            .into_visit(&march(), &labels, &mut diagnostics)
            .unwrap();
        assert_eq!(planned.status, VisitStatus::Planned);
        assert!(!planned.is_completed());
    }

    #[test]
    fn test_sale_rows_accept_store_aliases() {
        let mut diagnostics = AcquisitionDiagnostics::default();
        let labels = DisplayLabels::default();
        let row: MaterialSaleRow = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "customer_id": Uuid::new_v4(),
            "sale_date": "2024-03-12",
            "total_amount": "50.00",
            "paid_material_sale_items": [
                { "quantity": 2, "unit_price": "25", "total_price": "50", "paid_products": { "name": "Rodent bait", "unit": "box" } },
                { "quantity": 1, "unit_price": 5, "total_price": 5, "paid_products": null }
            ]
        }))
        .unwrap();

        let sale = row.into_sale(&march(), &labels, &mut diagnostics).unwrap();
        assert_eq!(sale.items.len(), 2);
        assert_eq!(sale.items[0].product_name, "Rodent bait");
        assert_eq!(sale.items[0].unit.as_deref(), Some("box"));
        assert_eq!(sale.items[1].product_name, labels.unknown_product);
        assert_eq!(sale.items_total(), Decimal::from(55));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-05T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05T10:00:00+00:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-05"),
            Some(expected.date().and_time(NaiveTime::MIN))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
