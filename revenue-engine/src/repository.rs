use crate::{
    error::{RevenueError, RevenueResult},
    period::ReportPeriod,
    rows::*,
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Read access to the rows a revenue report is built from
///
/// Every method is scoped to a single company. Implementations return raw
/// rows; validation happens in [`crate::acquisition`]. Visits come back newest
/// first with ties broken by id; running-count operator proration depends on
/// this order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RevenueRepository: Send + Sync {
    /// Completed visits in the period, joined with customer and branch names
    async fn completed_visits(
        &self,
        company_id: Uuid,
        period: ReportPeriod,
    ) -> RevenueResult<Vec<VisitRow>>;

    /// Visits of every status in the period, for the invoicing view
    async fn period_visits(
        &self,
        company_id: Uuid,
        period: ReportPeriod,
    ) -> RevenueResult<Vec<VisitRow>>;

    /// Active pricing agreements, not scoped by date
    async fn pricing_records(&self, company_id: Uuid) -> RevenueResult<Vec<PricingRow>>;

    /// Material sales dated in the period, with line items and product names
    async fn material_sales(
        &self,
        company_id: Uuid,
        period: ReportPeriod,
    ) -> RevenueResult<Vec<MaterialSaleRow>>;

    /// Operators of the company
    async fn operators(&self, company_id: Uuid) -> RevenueResult<Vec<OperatorRow>>;
}

/// Every row stored for one company, as exchanged with snapshot files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanySnapshot {
    pub company_id: Option<Uuid>,
    pub currency: Option<String>,
    pub visits: Vec<VisitRow>,
    pub pricing: Vec<PricingRow>,
    pub material_sales: Vec<MaterialSaleRow>,
    pub operators: Vec<OperatorRow>,
}

impl CompanySnapshot {
    pub fn from_json(json: &str) -> RevenueResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| RevenueError::Validation(format!("Invalid snapshot document: {}", e)))
    }
}

/// In-memory repository for tests, demos and snapshot files
pub struct InMemoryRevenueRepository {
    companies: Arc<DashMap<Uuid, CompanySnapshot>>,
}

impl InMemoryRevenueRepository {
    pub fn new() -> Self {
        Self {
            companies: Arc::new(DashMap::new()),
        }
    }

    /// Replace everything stored for `company_id`
    pub fn insert_snapshot(&self, company_id: Uuid, snapshot: CompanySnapshot) {
        self.companies.insert(company_id, snapshot);
    }

    pub fn add_visit(&self, company_id: Uuid, row: VisitRow) {
        self.companies.entry(company_id).or_default().visits.push(row);
    }

    pub fn add_pricing(&self, company_id: Uuid, row: PricingRow) {
        self.companies.entry(company_id).or_default().pricing.push(row);
    }

    pub fn add_material_sale(&self, company_id: Uuid, row: MaterialSaleRow) {
        self.companies
            .entry(company_id)
            .or_default()
            .material_sales
            .push(row);
    }

    pub fn add_operator(&self, company_id: Uuid, row: OperatorRow) {
        self.companies.entry(company_id).or_default().operators.push(row);
    }

    fn read<T>(&self, company_id: Uuid, select: impl FnOnce(&CompanySnapshot) -> Vec<T>) -> Vec<T> {
        self.companies
            .get(&company_id)
            .map(|snapshot| select(snapshot.value()))
            .unwrap_or_default()
    }
}

impl Default for InMemoryRevenueRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Order visits the way every adapter returns them: newest first, then by id
pub fn newest_first(mut rows: Vec<VisitRow>) -> Vec<VisitRow> {
    rows.sort_by(|a, b| b.visit_date.cmp(&a.visit_date).then_with(|| a.id.cmp(&b.id)));
    rows
}

#[async_trait]
impl RevenueRepository for InMemoryRevenueRepository {
    async fn completed_visits(
        &self,
        company_id: Uuid,
        period: ReportPeriod,
    ) -> RevenueResult<Vec<VisitRow>> {
        Ok(newest_first(self.read(company_id, |snapshot| {
            snapshot
                .visits
                .iter()
                .filter(|row| row.status.eq_ignore_ascii_case("completed"))
                .filter(|row| period.contains(row.visit_date))
                .cloned()
                .collect()
        })))
    }

    async fn period_visits(
        &self,
        company_id: Uuid,
        period: ReportPeriod,
    ) -> RevenueResult<Vec<VisitRow>> {
        Ok(newest_first(self.read(company_id, |snapshot| {
            snapshot
                .visits
                .iter()
                .filter(|row| period.contains(row.visit_date))
                .cloned()
                .collect()
        })))
    }

    async fn pricing_records(&self, company_id: Uuid) -> RevenueResult<Vec<PricingRow>> {
        Ok(self.read(company_id, |snapshot| snapshot.pricing.clone()))
    }

    async fn material_sales(
        &self,
        company_id: Uuid,
        period: ReportPeriod,
    ) -> RevenueResult<Vec<MaterialSaleRow>> {
        Ok(self.read(company_id, |snapshot| {
            snapshot
                .material_sales
                .iter()
                .filter(|row| period.contains_date(row.sale_date))
                .cloned()
                .collect()
        }))
    }

    async fn operators(&self, company_id: Uuid) -> RevenueResult<Vec<OperatorRow>> {
        Ok(self.read(company_id, |snapshot| snapshot.operators.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::parse_timestamp;

    fn visit(date: &str, status: &str) -> VisitRow {
        VisitRow {
            id: Uuid::new_v4(),
            customer_id: Some(Uuid::new_v4()),
            branch_id: None,
            operator_id: None,
            visit_date: parse_timestamp(date).unwrap(),
            status: status.to_string(),
            is_invoiced: None,
            customer: None,
            branch: None,
        }
    }

    #[tokio::test]
    async fn test_visits_filtered_by_status_and_period() {
        let repo = InMemoryRevenueRepository::new();
        let company = Uuid::new_v4();
        let period = ReportPeriod::new(2024, 3).unwrap();

        repo.add_visit(company, visit("2024-03-01T00:00:00", "completed"));
        repo.add_visit(company, visit("2024-03-31T23:59:59", "completed"));
        repo.add_visit(company, visit("2024-03-15T10:00:00", "planned"));
        repo.add_visit(company, visit("2024-04-01T00:00:00", "completed"));

        let rows = repo.completed_visits(company, period).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(repo.period_visits(company, period).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_visits_come_back_newest_first() {
        let repo = InMemoryRevenueRepository::new();
        let company = Uuid::new_v4();
        let period = ReportPeriod::new(2024, 3).unwrap();

        let mut same_day = vec![
            visit("2024-03-20T09:00:00", "completed"),
            visit("2024-03-20T09:00:00", "completed"),
        ];
        same_day.sort_by_key(|row| row.id);

        repo.add_visit(company, visit("2024-03-02T10:00:00", "completed"));
        repo.add_visit(company, same_day[1].clone());
        repo.add_visit(company, visit("2024-03-11T10:00:00", "planned"));
        repo.add_visit(company, same_day[0].clone());

        let completed = repo.completed_visits(company, period).await.unwrap();
        let ids: Vec<_> = completed.iter().map(|row| row.id).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], same_day[0].id);
        assert_eq!(ids[1], same_day[1].id);
        assert_eq!(completed[2].visit_date.date().to_string(), "2024-03-02");

        let all = repo.period_visits(company, period).await.unwrap();
        let days: Vec<_> = all.iter().map(|row| row.visit_date.date().to_string()).collect();
        assert_eq!(days, vec!["2024-03-20", "2024-03-20", "2024-03-11", "2024-03-02"]);
    }

    #[tokio::test]
    async fn test_companies_are_isolated() {
        let repo = InMemoryRevenueRepository::new();
        let company = Uuid::new_v4();
        let other = Uuid::new_v4();
        let period = ReportPeriod::new(2024, 3).unwrap();

        repo.add_visit(company, visit("2024-03-02T10:00:00", "completed"));
        repo.add_operator(
            company,
            OperatorRow {
                id: Uuid::new_v4(),
                full_name: Some("Ayse".to_string()),
                email: None,
            },
        );

        assert!(repo.completed_visits(other, period).await.unwrap().is_empty());
        assert!(repo.operators(other).await.unwrap().is_empty());
        assert_eq!(repo.operators(company).await.unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_parses_partial_document() {
        let snapshot = CompanySnapshot::from_json(r#"{ "currency": "EUR" }"#).unwrap();
        assert_eq!(snapshot.currency.as_deref(), Some("EUR"));
        assert!(snapshot.visits.is_empty());
        assert!(CompanySnapshot::from_json("[1, 2]").is_err());
    }
}
