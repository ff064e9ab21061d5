use crate::config::{DisplayLabels, RevenueConfig};
use crate::error::{RevenueError, RevenueResult};
use crate::models::*;
use crate::period::ReportPeriod;
use crate::repository::RevenueRepository;
use crate::rows::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Validated records for one company and period
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportInputs {
    pub visits: Vec<Visit>,
    pub pricing: Vec<PricingRecord>,
    pub material_sales: Vec<MaterialSale>,
    pub operators: Vec<Operator>,
    pub diagnostics: AcquisitionDiagnostics,
}

/// Which visits to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitSelection {
    /// Completed visits, for the revenue roll-ups
    Completed,
    /// Every visit in the period, for the invoicing view
    All,
}

/// Fetches the four row sets of a report concurrently and validates them
///
/// All fetches must succeed: the first failure aborts the cycle and nothing is
/// aggregated from a partial result.
pub struct DataAcquisition {
    repository: Arc<dyn RevenueRepository>,
    labels: DisplayLabels,
    timeout: Duration,
}

impl DataAcquisition {
    pub fn new(repository: Arc<dyn RevenueRepository>) -> Self {
        Self::from_config(repository, &RevenueConfig::default())
    }

    pub fn from_config(repository: Arc<dyn RevenueRepository>, config: &RevenueConfig) -> Self {
        Self {
            repository,
            labels: config.labels.clone(),
            timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn labels(&self) -> &DisplayLabels {
        &self.labels
    }

    /// Load the inputs of a `scope` report
    pub async fn acquire(
        &self,
        company: &CompanyContext,
        period: ReportPeriod,
        scope: ReportScope,
    ) -> RevenueResult<ReportInputs> {
        debug!(company_id = %company.company_id, %period, %scope, "Acquiring report inputs");
        self.fetch(company, period, VisitSelection::Completed).await
    }

    pub async fn fetch(
        &self,
        company: &CompanyContext,
        period: ReportPeriod,
        selection: VisitSelection,
    ) -> RevenueResult<ReportInputs> {
        let company_id = company.company_id;
        let repository = &self.repository;

        let visits = async {
            match selection {
                VisitSelection::Completed => repository.completed_visits(company_id, period).await,
                VisitSelection::All => repository.period_visits(company_id, period).await,
            }
        };

        let joined = async {
            tokio::try_join!(
                visits,
                repository.pricing_records(company_id),
                repository.material_sales(company_id, period),
                repository.operators(company_id),
            )
        };

        let (visit_rows, pricing_rows, sale_rows, operator_rows) =
            match tokio::time::timeout(self.timeout, joined).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(%company_id, %period, timeout_secs = self.timeout.as_secs(), "Report fetch timed out");
                    return Err(RevenueError::Timeout(self.timeout.as_secs()));
                }
            };

        info!(
            %company_id,
            %period,
            visits = visit_rows.len(),
            pricing = pricing_rows.len(),
            material_sales = sale_rows.len(),
            operators = operator_rows.len(),
            "Fetched report rows"
        );

        Ok(self.convert(period, visit_rows, pricing_rows, sale_rows, operator_rows))
    }

    fn convert(
        &self,
        period: ReportPeriod,
        visit_rows: Vec<VisitRow>,
        pricing_rows: Vec<PricingRow>,
        sale_rows: Vec<MaterialSaleRow>,
        operator_rows: Vec<OperatorRow>,
    ) -> ReportInputs {
        let mut diagnostics = AcquisitionDiagnostics::default();
        let labels = &self.labels;

        let visits = visit_rows
            .into_iter()
            .filter_map(|row| row.into_visit(&period, labels, &mut diagnostics))
            .collect();
        let pricing = pricing_rows
            .into_iter()
            .filter_map(|row| row.into_record(&mut diagnostics))
            .collect();
        let material_sales = sale_rows
            .into_iter()
            .filter_map(|row| row.into_sale(&period, labels, &mut diagnostics))
            .collect();
        let operators = operator_rows
            .into_iter()
            .map(|row| row.into_operator(labels, &mut diagnostics))
            .collect();

        if diagnostics.malformed_amounts > 0 || diagnostics.dropped_rows > 0 {
            warn!(
                malformed_amounts = diagnostics.malformed_amounts,
                dropped_rows = diagnostics.dropped_rows,
                "Repaired or dropped malformed rows"
            );
        }

        ReportInputs {
            visits,
            pricing,
            material_sales,
            operators,
            diagnostics,
        }
    }
}
