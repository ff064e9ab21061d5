use crate::models::{PricingMode, PricingOwner, PricingRecord};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

/// Charge that applies to a customer or branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingTerms {
    pub mode: PricingMode,
    /// Per-visit charge; only set for `PerVisit` terms
    pub per_visit: Option<Decimal>,
    /// Monthly fee; only set for `Monthly` terms
    pub monthly: Option<Decimal>,
}

impl PricingTerms {
    /// Per-visit plan with nothing to charge
    pub const UNPRICED: Self = Self {
        mode: PricingMode::PerVisit,
        per_visit: None,
        monthly: None,
    };

    pub fn from_record(record: &PricingRecord) -> Self {
        match record.effective_mode() {
            PricingMode::Monthly => Self {
                mode: PricingMode::Monthly,
                per_visit: None,
                monthly: record.monthly_amount(),
            },
            PricingMode::PerVisit => Self {
                mode: PricingMode::PerVisit,
                per_visit: record.per_visit_amount(),
                monthly: None,
            },
        }
    }
}

/// Pricing agreements indexed by owner
///
/// When several agreements exist for the same owner the first one wins.
#[derive(Debug, Clone, Default)]
pub struct PricingBook {
    by_branch: HashMap<Uuid, PricingRecord>,
    by_customer: HashMap<Uuid, PricingRecord>,
}

impl PricingBook {
    pub fn new(records: impl IntoIterator<Item = PricingRecord>) -> Self {
        let mut book = Self::default();
        for record in records {
            let index = match record.owner {
                PricingOwner::Branch(id) => book.by_branch.entry(id),
                PricingOwner::Customer(id) => book.by_customer.entry(id),
            };
            index.or_insert(record);
        }
        book
    }

    pub fn len(&self) -> usize {
        self.by_branch.len() + self.by_customer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Branch agreement if the branch has one, else the customer agreement
    pub fn lookup(&self, customer_id: Uuid, branch_id: Option<Uuid>) -> Option<&PricingRecord> {
        branch_id
            .and_then(|id| self.by_branch.get(&id))
            .or_else(|| self.by_customer.get(&customer_id))
    }

    pub fn terms_for(&self, customer_id: Uuid, branch_id: Option<Uuid>) -> PricingTerms {
        self.lookup(customer_id, branch_id)
            .map(PricingTerms::from_record)
            .unwrap_or(PricingTerms::UNPRICED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(owner: PricingOwner, per_visit: Option<i64>, monthly: Option<i64>) -> PricingRecord {
        PricingRecord {
            owner,
            declared_mode: None,
            per_visit_price: per_visit.map(Decimal::from),
            monthly_price: monthly.map(Decimal::from),
        }
    }

    #[test]
    fn test_branch_pricing_beats_customer_pricing() {
        let customer = Uuid::new_v4();
        let branch = Uuid::new_v4();
        let book = PricingBook::new(vec![
            record(PricingOwner::Customer(customer), Some(100), None),
            record(PricingOwner::Branch(branch), None, Some(900)),
        ]);

        let terms = book.terms_for(customer, Some(branch));
        assert_eq!(terms.mode, PricingMode::Monthly);
        assert_eq!(terms.monthly, Some(Decimal::from(900)));

        // a branch without its own agreement falls back to the customer
        let terms = book.terms_for(customer, Some(Uuid::new_v4()));
        assert_eq!(terms.mode, PricingMode::PerVisit);
        assert_eq!(terms.per_visit, Some(Decimal::from(100)));
    }

    #[test]
    fn test_first_record_wins() {
        let customer = Uuid::new_v4();
        let book = PricingBook::new(vec![
            record(PricingOwner::Customer(customer), Some(100), None),
            record(PricingOwner::Customer(customer), Some(250), None),
        ]);
        assert_eq!(book.len(), 1);
        assert_eq!(book.terms_for(customer, None).per_visit, Some(Decimal::from(100)));
    }

    #[test]
    fn test_both_amounts_resolve_to_monthly() {
        let customer = Uuid::new_v4();
        let book = PricingBook::new(vec![record(
            PricingOwner::Customer(customer),
            Some(100),
            Some(900),
        )]);
        let terms = book.terms_for(customer, None);
        assert_eq!(terms.mode, PricingMode::Monthly);
        assert_eq!(terms.per_visit, None);
    }

    #[test]
    fn test_missing_pricing_is_unpriced_per_visit() {
        let book = PricingBook::new(Vec::new());
        assert!(book.is_empty());
        assert_eq!(book.terms_for(Uuid::new_v4(), None), PricingTerms::UNPRICED);
    }
}
