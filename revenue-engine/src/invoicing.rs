//! Per-visit revenue for the invoicing view, and material summaries
use crate::aggregation::completed_visits_per_key;
use crate::models::*;
use crate::pricing::PricingBook;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Revenue a single visit brings in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRevenue {
    pub visit_id: Uuid,
    pub visit_date: NaiveDateTime,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub branch_name: Option<String>,
    pub operator_id: Option<Uuid>,
    pub status: VisitStatus,
    pub is_invoiced: bool,
    /// Effective pricing mode; `None` for visits that are not completed
    pub pricing_type: Option<PricingMode>,
    pub service_revenue: Decimal,
    pub material_revenue: Decimal,
    pub total_revenue: Decimal,
}

/// Revenue of each visit in input order
///
/// A completed visit earns its per-visit price, or its share of the monthly
/// fee (the fee divided by the completed visits of the same customer/branch),
/// plus the line totals of sales recorded on it. Other visits earn nothing.
pub fn visit_revenues(
    visits: &[Visit],
    pricing: &[PricingRecord],
    material_sales: &[MaterialSale],
) -> Vec<VisitRevenue> {
    let book = PricingBook::new(pricing.iter().cloned());
    let visits_per_key = completed_visits_per_key(visits);

    let mut materials_by_visit: HashMap<Uuid, Decimal> = HashMap::new();
    for sale in material_sales {
        if let Some(visit_id) = sale.visit_id {
            *materials_by_visit.entry(visit_id).or_default() += sale.items_total();
        }
    }

    visits
        .iter()
        .map(|visit| {
            let mut revenue = VisitRevenue {
                visit_id: visit.id,
                visit_date: visit.visit_date,
                customer_id: visit.customer_id,
                customer_name: visit.customer_name.clone(),
                branch_name: visit.branch_name.clone(),
                operator_id: visit.operator_id,
                status: visit.status,
                is_invoiced: visit.is_invoiced,
                pricing_type: None,
                service_revenue: Decimal::ZERO,
                material_revenue: Decimal::ZERO,
                total_revenue: Decimal::ZERO,
            };
            if !visit.is_completed() {
                return revenue;
            }

            let terms = book.terms_for(visit.customer_id, visit.branch_id);
            revenue.pricing_type = Some(terms.mode);
            revenue.service_revenue = match terms.mode {
                PricingMode::PerVisit => terms.per_visit.unwrap_or(Decimal::ZERO),
                PricingMode::Monthly => {
                    let count = visits_per_key
                        .get(&visit.attribution_key())
                        .copied()
                        .unwrap_or(1)
                        .max(1);
                    terms.monthly.unwrap_or(Decimal::ZERO) / Decimal::from(count)
                }
            };
            revenue.material_revenue = materials_by_visit
                .get(&visit.id)
                .copied()
                .unwrap_or(Decimal::ZERO);
            revenue.total_revenue = revenue.service_revenue + revenue.material_revenue;
            revenue
        })
        .collect()
}

/// Invoiced versus outstanding revenue of completed visits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicingSummary {
    pub completed_visits: usize,
    pub invoiced_visits: usize,
    pub outstanding_visits: usize,
    pub invoiced_revenue: Decimal,
    pub outstanding_revenue: Decimal,
    pub total_revenue: Decimal,
}

impl InvoicingSummary {
    pub fn from_revenues(revenues: &[VisitRevenue]) -> Self {
        let mut summary = Self::default();
        for revenue in revenues.iter().filter(|r| r.status == VisitStatus::Completed) {
            summary.completed_visits += 1;
            summary.total_revenue += revenue.total_revenue;
            if revenue.is_invoiced {
                summary.invoiced_visits += 1;
                summary.invoiced_revenue += revenue.total_revenue;
            } else {
                summary.outstanding_visits += 1;
                summary.outstanding_revenue += revenue.total_revenue;
            }
        }
        summary
    }
}

/// Quantity and value of one product sold to a customer in the period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSummaryLine {
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub unit: String,
    pub quantity: Decimal,
    pub total_price: Decimal,
}

/// Per-product totals of the sales made to a customer, optionally narrowed to one branch
///
/// Lines without a product reference are grouped by name. Sorted by product name.
pub fn material_summary(
    material_sales: &[MaterialSale],
    customer_id: Uuid,
    branch_id: Option<Uuid>,
    default_unit: &str,
) -> Vec<MaterialSummaryLine> {
    let mut lines: Vec<MaterialSummaryLine> = Vec::new();
    let mut index: HashMap<(Option<Uuid>, String), usize> = HashMap::new();

    let sales = material_sales
        .iter()
        .filter(|sale| sale.customer_id == customer_id)
        .filter(|sale| branch_id.is_none() || sale.branch_id == branch_id);

    for item in sales.flat_map(|sale| sale.items.iter()) {
        let key = match item.product_id {
            Some(id) => (Some(id), String::new()),
            None => (None, item.product_name.clone()),
        };
        let position = *index.entry(key).or_insert_with(|| {
            lines.push(MaterialSummaryLine {
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                unit: item.unit.clone().unwrap_or_else(|| default_unit.to_string()),
                quantity: Decimal::ZERO,
                total_price: Decimal::ZERO,
            });
            lines.len() - 1
        });
        if let Some(line) = lines.get_mut(position) {
            line.quantity += item.quantity;
            line.total_price += item.total_price;
        }
    }

    lines.sort_by(|a, b| a.product_name.cmp(&b.product_name));
    lines
}
