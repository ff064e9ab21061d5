//! Folding visits, pricing and material sales into revenue buckets
//!
//! Both roll-ups make a single pass over the visits, creating a bucket the
//! first time a key is seen, then fold the material sales into the buckets
//! that exist. The aggregator performs no I/O and never fails: data it cannot
//! attribute is counted in [`AggregationDiagnostics`].

use crate::config::OperatorProration;
use crate::models::*;
use crate::pricing::{PricingBook, PricingTerms};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Data the aggregator skipped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationDiagnostics {
    /// Sales whose customer/branch (or visit) has no bucket in this report
    pub unattributable_sales: usize,
    /// Line totals of those sales; a known undercount of the report
    pub unattributable_sale_amount: Decimal,
    /// Visits that were not completed, or lacked an operator in the operator view
    pub skipped_visits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Sorted by total revenue, highest first
    pub buckets: Vec<RevenueBucket>,
    pub diagnostics: AggregationDiagnostics,
}

impl Aggregation {
    pub fn grand_total(&self) -> Decimal {
        self.buckets.iter().map(|bucket| bucket.total_revenue).sum()
    }
}

/// Buckets in first-encounter order with a key index
#[derive(Default)]
struct BucketSet {
    buckets: Vec<RevenueBucket>,
    index: HashMap<AttributionKey, usize>,
}

impl BucketSet {
    fn get_or_insert_with(
        &mut self,
        key: AttributionKey,
        create: impl FnOnce() -> RevenueBucket,
    ) -> (usize, bool) {
        if let Some(&position) = self.index.get(&key) {
            return (position, false);
        }
        let position = self.buckets.len();
        self.buckets.push(create());
        self.index.insert(key, position);
        (position, true)
    }

    fn get_mut(&mut self, key: &AttributionKey) -> Option<&mut RevenueBucket> {
        let position = *self.index.get(key)?;
        self.buckets.get_mut(position)
    }

    fn finish(self) -> Vec<RevenueBucket> {
        let mut buckets = self.buckets;
        for bucket in &mut buckets {
            bucket.finalize_total();
        }
        // stable: equal totals keep first-encounter order
        buckets.sort_by(|a, b| b.total_revenue.cmp(&a.total_revenue));
        buckets
    }
}

/// Computes revenue roll-ups for one company and period
#[derive(Debug, Clone)]
pub struct RevenueAggregator {
    currency: String,
    unknown_operator: String,
    proration: OperatorProration,
}

impl RevenueAggregator {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            unknown_operator: "Unknown operator".to_string(),
            proration: OperatorProration::default(),
        }
    }

    pub fn with_operator_proration(mut self, proration: OperatorProration) -> Self {
        self.proration = proration;
        self
    }

    pub fn with_unknown_operator_label(mut self, label: impl Into<String>) -> Self {
        self.unknown_operator = label.into();
        self
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Roll up revenue per customer, or per customer branch when the visit has one
    ///
    /// Monthly fees are recorded once per bucket and then divided by the
    /// bucket's visit count, giving a per-visit equivalent.
    pub fn aggregate_by_customer(
        &self,
        visits: &[Visit],
        pricing: &[PricingRecord],
        material_sales: &[MaterialSale],
    ) -> Aggregation {
        let book = PricingBook::new(pricing.iter().cloned());
        let mut diagnostics = AggregationDiagnostics::default();
        let mut set = BucketSet::default();
        let mut terms_by_bucket: Vec<PricingTerms> = Vec::new();

        for visit in visits {
            if !visit.is_completed() {
                diagnostics.skipped_visits += 1;
                continue;
            }

            let key = visit.attribution_key();
            let terms = book.terms_for(visit.customer_id, visit.branch_id);
            let (position, created) = set.get_or_insert_with(key, || {
                RevenueBucket::new(
                    key,
                    visit.customer_name.clone(),
                    visit.branch_name.clone(),
                    Some(terms.mode),
                    &self.currency,
                )
            });
            if created {
                debug!(key = %key, mode = terms.mode.as_str(), "Opened customer bucket");
                terms_by_bucket.push(terms);
            }

            let (Some(bucket), Some(terms)) =
                (set.buckets.get_mut(position), terms_by_bucket.get(position))
            else {
                continue;
            };

            bucket.visit_count += 1;
            match (terms.mode, terms.per_visit, terms.monthly) {
                (PricingMode::PerVisit, Some(amount), _) => bucket.per_visit_revenue += amount,
                (PricingMode::Monthly, _, Some(amount)) => bucket.monthly_revenue_gross = amount,
                _ => {}
            }
        }

        for bucket in &mut set.buckets {
            if bucket.pricing_type == Some(PricingMode::Monthly) && bucket.visit_count > 0 {
                bucket.monthly_revenue =
                    bucket.monthly_revenue_gross / Decimal::from(bucket.visit_count);
            }
        }

        for sale in material_sales {
            let key = sale.attribution_key();
            match set.get_mut(&key) {
                Some(bucket) => {
                    bucket.material_revenue += sale.items_total();
                    bucket.material_sales.push(sale.clone());
                }
                None => drop_sale(&mut diagnostics, sale, "no visits for customer/branch"),
            }
        }

        Aggregation {
            buckets: set.finish(),
            diagnostics,
        }
    }

    /// Roll up revenue per operator
    ///
    /// Operator buckets mix pricing plans, so `pricing_type` is `None` and the
    /// monthly share is already prorated when it is added. Material sales are
    /// attributed through the visit they were recorded on.
    pub fn aggregate_by_operator(
        &self,
        visits: &[Visit],
        pricing: &[PricingRecord],
        material_sales: &[MaterialSale],
        operators: &[Operator],
    ) -> Aggregation {
        let book = PricingBook::new(pricing.iter().cloned());
        let mut diagnostics = AggregationDiagnostics::default();
        let mut set = BucketSet::default();

        let operator_names: HashMap<Uuid, &str> = operators
            .iter()
            .map(|operator| (operator.id, operator.full_name.as_str()))
            .collect();

        let visits_per_key = completed_visits_per_key(visits);

        let mut sales_by_visit: HashMap<Uuid, Vec<&MaterialSale>> = HashMap::new();
        for sale in material_sales {
            match sale.visit_id {
                Some(visit_id) => sales_by_visit.entry(visit_id).or_default().push(sale),
                None => drop_sale(&mut diagnostics, sale, "sale is not linked to a visit"),
            }
        }

        for visit in visits {
            if !visit.is_completed() {
                diagnostics.skipped_visits += 1;
                continue;
            }
            let Some(operator_id) = visit.operator_id else {
                debug!(visit_id = %visit.id, "Skipping visit without operator");
                diagnostics.skipped_visits += 1;
                continue;
            };

            let key = AttributionKey::Operator { operator_id };
            let (position, created) = set.get_or_insert_with(key, || {
                let name = operator_names
                    .get(&operator_id)
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| self.unknown_operator.clone());
                RevenueBucket::new(key, name, None, None, &self.currency)
            });
            if created && !operator_names.contains_key(&operator_id) {
                warn!(%operator_id, "Visit operator is not listed for the company");
            }

            let Some(bucket) = set.buckets.get_mut(position) else {
                continue;
            };
            bucket.visit_count += 1;

            let terms = book.terms_for(visit.customer_id, visit.branch_id);
            match (terms.mode, terms.per_visit, terms.monthly) {
                (PricingMode::PerVisit, Some(amount), _) => bucket.per_visit_revenue += amount,
                (PricingMode::Monthly, _, Some(amount)) => {
                    let divisor = match self.proration {
                        OperatorProration::RunningVisitCount => bucket.visit_count,
                        OperatorProration::EndOfScan => visits_per_key
                            .get(&visit.attribution_key())
                            .copied()
                            .unwrap_or(1),
                    };
                    let share = amount / Decimal::from(divisor.max(1));
                    bucket.monthly_revenue_gross += share;
                    bucket.monthly_revenue += share;
                }
                _ => {}
            }

            if let Some(sales) = sales_by_visit.remove(&visit.id) {
                for sale in sales {
                    bucket.material_revenue += sale.items_total();
                    bucket.material_sales.push(sale.clone());
                }
            }
        }

        for sale in sales_by_visit.into_values().flatten() {
            drop_sale(&mut diagnostics, sale, "linked visit is not in this report");
        }

        Aggregation {
            buckets: set.finish(),
            diagnostics,
        }
    }
}

/// Completed visits per customer/branch key, used for monthly proration
pub(crate) fn completed_visits_per_key(visits: &[Visit]) -> HashMap<AttributionKey, u32> {
    let mut counts = HashMap::new();
    for visit in visits.iter().filter(|visit| visit.is_completed()) {
        *counts.entry(visit.attribution_key()).or_insert(0) += 1;
    }
    counts
}

fn drop_sale(diagnostics: &mut AggregationDiagnostics, sale: &MaterialSale, reason: &str) {
    let amount = sale.items_total();
    debug!(sale_id = %sale.id, %amount, reason, "Dropping unattributable material sale");
    diagnostics.unattributable_sales += 1;
    diagnostics.unattributable_sale_amount += amount;
}
