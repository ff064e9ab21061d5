use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Visit completion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Completed,
    Planned,
    InProgress,
    Cancelled,
    #[serde(other)]
    Other,
}

impl VisitStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "completed" => Self::Completed,
            "planned" | "scheduled" => Self::Planned,
            "in_progress" => Self::InProgress,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Other,
        }
    }
}

/// A single service visit, with customer and branch names already resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub branch_id: Option<Uuid>,
    pub branch_name: Option<String>,
    pub operator_id: Option<Uuid>,
    pub visit_date: NaiveDateTime,
    pub status: VisitStatus,
    pub is_invoiced: bool,
}

impl Visit {
    pub fn is_completed(&self) -> bool {
        self.status == VisitStatus::Completed
    }

    /// Customer/branch key this visit's revenue is attributed to
    pub fn attribution_key(&self) -> AttributionKey {
        AttributionKey::for_customer(self.customer_id, self.branch_id)
    }
}

/// Pricing plan type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    PerVisit,
    Monthly,
}

impl PricingMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "per_visit" => Some(Self::PerVisit),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerVisit => "per_visit",
            Self::Monthly => "monthly",
        }
    }
}

/// Owner of a pricing agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum PricingOwner {
    Customer(Uuid),
    Branch(Uuid),
}

/// Active pricing agreement for a customer or a branch
///
/// Amounts are already validated: malformed or negative values arrive here as
/// zero, and zero counts as "not set".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRecord {
    pub owner: PricingOwner,
    /// Mode as recorded by the company; the effective mode is derived from the amounts
    pub declared_mode: Option<PricingMode>,
    pub per_visit_price: Option<Decimal>,
    pub monthly_price: Option<Decimal>,
}

impl PricingRecord {
    pub fn per_visit_amount(&self) -> Option<Decimal> {
        self.per_visit_price.filter(|amount| *amount > Decimal::ZERO)
    }

    pub fn monthly_amount(&self) -> Option<Decimal> {
        self.monthly_price.filter(|amount| *amount > Decimal::ZERO)
    }

    /// Monthly wins whenever a monthly amount is set, even alongside a per-visit amount.
    pub fn effective_mode(&self) -> PricingMode {
        if self.monthly_amount().is_some() {
            PricingMode::Monthly
        } else {
            PricingMode::PerVisit
        }
    }
}

/// One line of a paid material sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSaleItem {
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub unit: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Line total as stored; never recomputed from quantity and unit price
    pub total_price: Decimal,
}

/// Sale of paid materials to a customer, optionally during a visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSale {
    pub id: Uuid,
    pub visit_id: Option<Uuid>,
    pub customer_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub sale_date: NaiveDate,
    pub status: String,
    pub total_amount: Decimal,
    pub items: Vec<MaterialSaleItem>,
}

impl MaterialSale {
    /// Sum of the stored line totals
    pub fn items_total(&self) -> Decimal {
        self.items.iter().map(|item| item.total_price).sum()
    }

    pub fn attribution_key(&self) -> AttributionKey {
        AttributionKey::for_customer(self.customer_id, self.branch_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
}

/// Identity revenue is accumulated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributionKey {
    Customer { customer_id: Uuid },
    Branch { customer_id: Uuid, branch_id: Uuid },
    Operator { operator_id: Uuid },
}

impl AttributionKey {
    pub fn for_customer(customer_id: Uuid, branch_id: Option<Uuid>) -> Self {
        match branch_id {
            Some(branch_id) => Self::Branch {
                customer_id,
                branch_id,
            },
            None => Self::Customer { customer_id },
        }
    }
}

impl fmt::Display for AttributionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer { customer_id } => write!(f, "{}", customer_id),
            Self::Branch {
                customer_id,
                branch_id,
            } => write!(f, "{}-{}", customer_id, branch_id),
            Self::Operator { operator_id } => write!(f, "operator:{}", operator_id),
        }
    }
}

/// Which attribution a report rolls up by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportScope {
    Customer,
    Operator,
}

impl fmt::Display for ReportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer => f.write_str("customer"),
            Self::Operator => f.write_str("operator"),
        }
    }
}

/// Company the report is computed for, supplied by the caller after authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyContext {
    pub company_id: Uuid,
    pub currency: String,
}

impl CompanyContext {
    pub fn new(company_id: Uuid, currency: impl Into<String>) -> Self {
        Self {
            company_id,
            currency: currency.into(),
        }
    }
}

/// Running revenue total for one attribution key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueBucket {
    pub key: AttributionKey,
    /// Customer name, or operator name for operator buckets
    pub name: String,
    pub branch_name: Option<String>,
    pub visit_count: u32,
    /// Effective pricing mode; operator buckets mix plans and carry none
    pub pricing_type: Option<PricingMode>,
    pub per_visit_revenue: Decimal,
    /// Monthly fee before proration
    pub monthly_revenue_gross: Decimal,
    /// Monthly fee as a per-visit-equivalent
    pub monthly_revenue: Decimal,
    pub material_revenue: Decimal,
    pub total_revenue: Decimal,
    pub currency: String,
    pub material_sales: Vec<MaterialSale>,
}

impl RevenueBucket {
    pub fn new(
        key: AttributionKey,
        name: String,
        branch_name: Option<String>,
        pricing_type: Option<PricingMode>,
        currency: &str,
    ) -> Self {
        Self {
            key,
            name,
            branch_name,
            visit_count: 0,
            pricing_type,
            per_visit_revenue: Decimal::ZERO,
            monthly_revenue_gross: Decimal::ZERO,
            monthly_revenue: Decimal::ZERO,
            material_revenue: Decimal::ZERO,
            total_revenue: Decimal::ZERO,
            currency: currency.to_string(),
            material_sales: Vec::new(),
        }
    }

    /// Revenue from visits alone, without materials
    pub fn service_revenue(&self) -> Decimal {
        self.per_visit_revenue + self.monthly_revenue
    }

    pub(crate) fn finalize_total(&mut self) {
        self.total_revenue = self.per_visit_revenue + self.monthly_revenue + self.material_revenue;
    }
}
