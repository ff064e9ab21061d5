//! PestCare revenue reports from the command line
//!
//! Reads a JSON snapshot of a company's store rows into the in-memory
//! repository and runs the same report cycles the application does.
//!
//! Usage:
//!   pestcare-revenue report --snapshot march.json --year 2024 --month 3 --scope operator
//!   pestcare-revenue report --snapshot march.json --year 2024 --month 3 --export report.xls
//!   pestcare-revenue visits --snapshot march.json --year 2024 --month 3
//!   pestcare-revenue materials --snapshot march.json --year 2024 --month 3 --customer <uuid>

mod output;

use anyhow::Context;
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use revenue_engine::{
    CompanyContext, CompanySnapshot, ExportFormat, InMemoryRevenueRepository, ReportPeriod,
    ReportScope, RevenueConfig, RevenueReportService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "pestcare-revenue")]
#[command(about = "Revenue reports for pest-control companies")]
struct Cli {
    /// Configuration file (YAML or TOML)
    #[arg(long, global = true, env = "PESTCARE_CONFIG")]
    config: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Revenue per customer/branch or per operator
    Report {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long, value_enum, default_value_t = ScopeArg::Customer)]
        scope: ScopeArg,

        /// Write a downloadable export to this path
        #[arg(long)]
        export: Option<PathBuf>,

        /// Export format; defaults to the configured one
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
    /// Revenue of every visit with invoicing totals
    Visits {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Products sold to one customer
    Materials {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long)]
        customer: Uuid,

        #[arg(long)]
        branch: Option<Uuid>,
    },
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// JSON snapshot of the company's rows
    #[arg(long)]
    snapshot: PathBuf,

    /// Company id; defaults to the snapshot's
    #[arg(long)]
    company: Option<Uuid>,

    /// Currency code; defaults to the snapshot's, then the configured default
    #[arg(long)]
    currency: Option<String>,

    /// Defaults to the current year
    #[arg(long)]
    year: Option<i32>,

    /// 1-12, defaults to the current month
    #[arg(long)]
    month: Option<u32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    Customer,
    Operator,
}

impl From<ScopeArg> for ReportScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Customer => ReportScope::Customer,
            ScopeArg::Operator => ReportScope::Operator,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    HtmlTable,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::HtmlTable => ExportFormat::HtmlTable,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

/// Service, company and period resolved from the command line
struct Session {
    service: RevenueReportService,
    company: CompanyContext,
    period: ReportPeriod,
}

fn open_session(source: &SourceArgs, config: RevenueConfig) -> anyhow::Result<Session> {
    let raw = std::fs::read_to_string(&source.snapshot)
        .with_context(|| format!("reading snapshot {}", source.snapshot.display()))?;
    let snapshot = CompanySnapshot::from_json(&raw)?;

    let company_id = source
        .company
        .or(snapshot.company_id)
        .context("no --company given and the snapshot has no company_id")?;
    let currency = source
        .currency
        .clone()
        .or_else(|| snapshot.currency.clone())
        .unwrap_or_else(|| config.default_currency.clone());

    let today = Local::now().date_naive();
    let current = ReportPeriod::current(today)?;
    let period = ReportPeriod::new(
        source.year.unwrap_or(current.year()),
        source.month.unwrap_or(current.month()),
    )?;

    debug!(%company_id, %period, visits = snapshot.visits.len(), "Loaded snapshot");

    let repository = InMemoryRevenueRepository::new();
    repository.insert_snapshot(company_id, snapshot);

    let service = RevenueReportService::new(Arc::new(repository), config)?;

    Ok(Session {
        service,
        company: CompanyContext::new(company_id, currency),
        period,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = RevenueConfig::load(cli.config.as_deref())?;

    match &cli.command {
        Command::Report {
            source,
            scope,
            export,
            format,
        } => {
            let session = open_session(source, config)?;
            let report = session
                .service
                .report(&session.company, session.period, (*scope).into())
                .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                output::print_report(&session.service.render(&report), &report);
            }

            if let Some(path) = export {
                let mut exporter = revenue_engine::ReportExporter::from_config(session.service.config())?;
                if let Some(format) = format {
                    exporter = exporter.with_format((*format).into());
                }
                let document = exporter.export(&report)?;
                std::fs::write(path, &document.bytes)
                    .with_context(|| format!("writing export {}", path.display()))?;
                info!(
                    path = %path.display(),
                    suggested_name = %document.filename,
                    content_type = document.content_type,
                    "Export written"
                );
            }
        }
        Command::Visits { source } => {
            let session = open_session(source, config)?;
            let report = session
                .service
                .visit_revenue_report(&session.company, session.period)
                .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                output::print_visits(&report);
            }
        }
        Command::Materials {
            source,
            customer,
            branch,
        } => {
            let session = open_session(source, config)?;
            let lines = session
                .service
                .material_summary(&session.company, session.period, *customer, *branch)
                .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&lines)?);
            } else {
                output::print_materials(&lines, &session.company.currency);
            }
        }
    }

    Ok(())
}
