use crate::acquisition::{DataAcquisition, VisitSelection};
use crate::aggregation::RevenueAggregator;
use crate::config::RevenueConfig;
use crate::error::RevenueResult;
use crate::export::{ExportDocument, ReportExporter};
use crate::invoicing::{self, InvoicingSummary, MaterialSummaryLine, VisitRevenue};
use crate::models::*;
use crate::period::ReportPeriod;
use crate::reporting::{self, ReportView, RevenueReport};
use crate::repository::RevenueRepository;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Per-visit revenue of a period with its invoicing totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRevenueReport {
    pub period: ReportPeriod,
    pub currency: String,
    pub visits: Vec<VisitRevenue>,
    pub summary: InvoicingSummary,
}

/// Entry point for revenue reports
///
/// Every call is a full, stateless cycle: fetch, validate, aggregate.
pub struct RevenueReportService {
    acquisition: DataAcquisition,
    exporter: ReportExporter,
    config: RevenueConfig,
}

impl RevenueReportService {
    pub fn new(repository: Arc<dyn RevenueRepository>, config: RevenueConfig) -> RevenueResult<Self> {
        config.validate()?;
        Ok(Self {
            acquisition: DataAcquisition::from_config(repository, &config),
            exporter: ReportExporter::from_config(&config)?,
            config,
        })
    }

    pub fn config(&self) -> &RevenueConfig {
        &self.config
    }

    fn currency_for<'a>(&'a self, company: &'a CompanyContext) -> &'a str {
        if company.currency.trim().is_empty() {
            &self.config.default_currency
        } else {
            &company.currency
        }
    }

    fn aggregator(&self, company: &CompanyContext) -> RevenueAggregator {
        RevenueAggregator::new(self.currency_for(company))
            .with_operator_proration(self.config.operator_proration)
            .with_unknown_operator_label(self.config.labels.unknown_operator.clone())
    }

    /// Revenue per customer and branch for `month` of `year`, highest total first
    pub async fn customer_revenue_report(
        &self,
        company: &CompanyContext,
        year: i32,
        month: u32,
    ) -> RevenueResult<RevenueReport> {
        let period = ReportPeriod::new(year, month)?;
        self.report(company, period, ReportScope::Customer).await
    }

    /// Revenue per operator for `month` of `year`, highest total first
    pub async fn operator_revenue_report(
        &self,
        company: &CompanyContext,
        year: i32,
        month: u32,
    ) -> RevenueResult<RevenueReport> {
        let period = ReportPeriod::new(year, month)?;
        self.report(company, period, ReportScope::Operator).await
    }

    #[instrument(skip(self, company), fields(company_id = %company.company_id))]
    pub async fn report(
        &self,
        company: &CompanyContext,
        period: ReportPeriod,
        scope: ReportScope,
    ) -> RevenueResult<RevenueReport> {
        let inputs = self.acquisition.acquire(company, period, scope).await?;
        let aggregator = self.aggregator(company);

        let aggregation = match scope {
            ReportScope::Customer => aggregator.aggregate_by_customer(
                &inputs.visits,
                &inputs.pricing,
                &inputs.material_sales,
            ),
            ReportScope::Operator => aggregator.aggregate_by_operator(
                &inputs.visits,
                &inputs.pricing,
                &inputs.material_sales,
                &inputs.operators,
            ),
        };

        let context = CompanyContext::new(company.company_id, aggregator.currency());
        let report = RevenueReport::new(scope, period, &context, aggregation, inputs.diagnostics);

        info!(
            buckets = report.buckets.len(),
            grand_total = %report.grand_total,
            unattributable_sales = report.diagnostics.aggregation.unattributable_sales,
            "Revenue report ready"
        );
        Ok(report)
    }

    /// Revenue of every visit in the period, with invoiced and outstanding totals
    #[instrument(skip(self, company), fields(company_id = %company.company_id))]
    pub async fn visit_revenue_report(
        &self,
        company: &CompanyContext,
        period: ReportPeriod,
    ) -> RevenueResult<VisitRevenueReport> {
        let inputs = self
            .acquisition
            .fetch(company, period, VisitSelection::All)
            .await?;

        let visits = invoicing::visit_revenues(&inputs.visits, &inputs.pricing, &inputs.material_sales);
        let summary = InvoicingSummary::from_revenues(&visits);
        info!(visits = visits.len(), total = %summary.total_revenue, "Visit revenue ready");

        Ok(VisitRevenueReport {
            period,
            currency: self.currency_for(company).to_string(),
            visits,
            summary,
        })
    }

    /// Products sold to a customer in the period, optionally for one branch
    #[instrument(skip(self, company), fields(company_id = %company.company_id))]
    pub async fn material_summary(
        &self,
        company: &CompanyContext,
        period: ReportPeriod,
        customer_id: Uuid,
        branch_id: Option<Uuid>,
    ) -> RevenueResult<Vec<MaterialSummaryLine>> {
        let inputs = self
            .acquisition
            .acquire(company, period, ReportScope::Customer)
            .await?;

        Ok(invoicing::material_summary(
            &inputs.material_sales,
            customer_id,
            branch_id,
            &self.config.labels.default_unit,
        ))
    }

    pub fn render(&self, report: &RevenueReport) -> ReportView {
        reporting::render(report, &self.config.labels.default_unit)
    }

    pub fn export_report(&self, report: &RevenueReport) -> RevenueResult<ExportDocument> {
        self.exporter.export(report)
    }
}

/// Identifies one report request of a [`ReportSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    generation: u64,
}

impl RequestTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Serves the reports of one viewer, discarding results that resolve after a
/// newer request was issued
pub struct ReportSession {
    service: Arc<RevenueReportService>,
    generation: AtomicU64,
}

impl ReportSession {
    pub fn new(service: Arc<RevenueReportService>) -> Self {
        Self {
            service,
            generation: AtomicU64::new(0),
        }
    }

    /// Start a request, superseding every earlier one
    pub fn begin(&self) -> RequestTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket { generation }
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    /// Run a report; `Ok(None)` when a newer request started before this one finished
    pub async fn report(
        &self,
        company: &CompanyContext,
        period: ReportPeriod,
        scope: ReportScope,
    ) -> RevenueResult<Option<RevenueReport>> {
        let ticket = self.begin();
        let result = self.service.report(company, period, scope).await;

        if !self.is_current(ticket) {
            debug!(generation = ticket.generation, %period, %scope, "Discarding superseded report");
            return Ok(None);
        }
        result.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRevenueRepository;

    #[test]
    fn test_tickets_supersede_each_other() {
        let repository = Arc::new(InMemoryRevenueRepository::new());
        let service = RevenueReportService::new(repository, RevenueConfig::default()).unwrap();
        let session = ReportSession::new(Arc::new(service));

        let first = session.begin();
        assert!(session.is_current(first));
        let second = session.begin();
        assert!(!session.is_current(first));
        assert!(session.is_current(second));
        assert_eq!(second.generation(), first.generation() + 1);
    }

    #[tokio::test]
    async fn test_empty_period_is_not_an_error() {
        let repository = Arc::new(InMemoryRevenueRepository::new());
        let service = RevenueReportService::new(repository, RevenueConfig::default()).unwrap();
        let company = CompanyContext::new(Uuid::new_v4(), "");

        let report = service.customer_revenue_report(&company, 2024, 2).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(report.currency, "TRY");
        assert_eq!(report.grand_total, rust_decimal::Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_invalid_month_is_rejected() {
        let repository = Arc::new(InMemoryRevenueRepository::new());
        let service = RevenueReportService::new(repository, RevenueConfig::default()).unwrap();
        let company = CompanyContext::new(Uuid::new_v4(), "TRY");

        let err = service.operator_revenue_report(&company, 2024, 13).await.unwrap_err();
        assert!(matches!(err, crate::error::RevenueError::InvalidPeriod(_)));
    }
}
