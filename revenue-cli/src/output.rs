//! Plain-text tables for terminal output
use revenue_engine::{
    format_amount, MaterialSummaryLine, ReportScope, ReportView, RevenueReport, VisitRevenueReport,
};
use rust_decimal::Decimal;

pub fn print_report(view: &ReportView, report: &RevenueReport) {
    println!("{} revenue, {} ({})", view.scope, view.period, view.currency);

    if view.is_empty {
        println!("No completed visits in this period.");
        return;
    }

    let label = match view.scope {
        ReportScope::Customer => "Customer",
        ReportScope::Operator => "Operator",
    };
    println!(
        "{:>3}  {:<32} {:>6}  {:<10} {:>16} {:>16} {:>16} {:>16}",
        "#", label, "Visits", "Pricing", "Per visit", "Monthly", "Materials", "Total"
    );

    for row in &view.rows {
        let name = match &row.branch_name {
            Some(branch) => format!("{} / {}", row.name, branch),
            None => row.name.clone(),
        };
        println!(
            "{:>3}  {:<32} {:>6}  {:<10} {:>16} {:>16} {:>16} {:>16}",
            row.rank,
            name,
            row.visit_count,
            row.pricing_type.as_deref().unwrap_or("-"),
            row.per_visit_revenue,
            row.monthly_revenue,
            row.material_revenue,
            row.total_revenue
        );
        for line in &row.material_lines {
            println!("{:>5}- {}", "", line);
        }
    }

    println!("Visits: {}   Grand total: {}", view.total_visits, view.grand_total);

    let skipped = &report.diagnostics.aggregation;
    if skipped.unattributable_sales > 0 {
        println!(
            "Not attributed: {} material sale(s), {}",
            skipped.unattributable_sales,
            format_amount(skipped.unattributable_sale_amount, &view.currency)
        );
    }
}

pub fn print_visits(report: &VisitRevenueReport) {
    println!("Visit revenue, {} ({})", report.period, report.currency);
    println!(
        "{:<17} {:<32} {:<12} {:<9} {:>16}",
        "Date", "Customer", "Status", "Invoiced", "Revenue"
    );

    for visit in &report.visits {
        let name = match &visit.branch_name {
            Some(branch) => format!("{} / {}", visit.customer_name, branch),
            None => visit.customer_name.clone(),
        };
        println!(
            "{:<17} {:<32} {:<12} {:<9} {:>16}",
            visit.visit_date.format("%Y-%m-%d %H:%M"),
            name,
            format!("{:?}", visit.status),
            if visit.is_invoiced { "yes" } else { "no" },
            format_amount(visit.total_revenue, &report.currency)
        );
    }

    let summary = &report.summary;
    println!(
        "Completed: {}   Invoiced: {} ({})   Outstanding: {} ({})   Total: {}",
        summary.completed_visits,
        summary.invoiced_visits,
        format_amount(summary.invoiced_revenue, &report.currency),
        summary.outstanding_visits,
        format_amount(summary.outstanding_revenue, &report.currency),
        format_amount(summary.total_revenue, &report.currency)
    );
}

pub fn print_materials(lines: &[MaterialSummaryLine], currency: &str) {
    if lines.is_empty() {
        println!("No material sales for this customer in the period.");
        return;
    }

    println!("{:<32} {:>12} {:<8} {:>16}", "Product", "Quantity", "Unit", "Total");
    for line in lines {
        println!(
            "{:<32} {:>12} {:<8} {:>16}",
            line.product_name,
            line.quantity.normalize().to_string(),
            line.unit,
            format_amount(line.total_price, currency)
        );
    }

    let total: Decimal = lines.iter().map(|line| line.total_price).sum();
    println!("{:<32} {:>12} {:<8} {:>16}", "", "", "", format_amount(total, currency));
}
