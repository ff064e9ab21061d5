//! PostgreSQL-backed revenue repository
//!
//! Reads the tables of the pest-control data store:
//! - `visits` joined with `customers` and `customer_branches`
//! - `customer_pricing` and `branch_pricing`
//! - `paid_material_sales` with `paid_material_sale_items` and `paid_products`
//! - `operators`
//!
//! Tenancy is enforced through `customers.created_by_company_id` and
//! `operators.company_id`. A visit whose customer row is gone is scoped by its
//! operator and reported under the unknown-customer label; a visit with
//! neither a customer nor an operator cannot be tied to a company and is not
//! returned. Amount columns are read as text so malformed
//! values reach the acquisition boundary instead of failing the query.

use crate::{
    error::{RevenueError, RevenueResult},
    period::ReportPeriod,
    repository::{newest_first, RevenueRepository},
    rows::*,
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

pub struct PostgresRevenueRepository {
    pool: PgPool,
}

impl PostgresRevenueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn from_connection_string(connection_string: &str) -> RevenueResult<Self> {
        let pool = PgPool::connect(connection_string)
            .await
            .map_err(|e| RevenueError::unavailable("database", format!("Failed to connect: {}", e)))?;

        Ok(Self::new(pool))
    }

    async fn visits(
        &self,
        company_id: Uuid,
        period: ReportPeriod,
        completed_only: bool,
    ) -> RevenueResult<Vec<VisitRow>> {
        let rows = sqlx::query(
            r#"
            SELECT v.id, v.customer_id, v.branch_id, v.operator_id,
                   v.visit_date::timestamp AS visit_date, v.status, v.is_invoiced,
                   c.company_name, b.id AS joined_branch_id, b.branch_name
            FROM visits v
            LEFT JOIN customers c ON c.id = v.customer_id
            LEFT JOIN customer_branches b ON b.id = v.branch_id
            LEFT JOIN operators o ON o.id = v.operator_id
            WHERE (c.created_by_company_id = $1
                   OR (c.id IS NULL AND o.company_id = $1))
              AND ($4 = false OR v.status = 'completed')
              AND v.visit_date::timestamp >= $2
              AND v.visit_date::timestamp <= $3
            ORDER BY v.visit_date DESC, v.id
            "#,
        )
        .bind(company_id)
        .bind(period.start())
        .bind(period.end_inclusive())
        .bind(completed_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("visits", e))?;

        debug!(%company_id, %period, completed_only, rows = rows.len(), "Fetched visits");

        let visits = rows
            .iter()
            .map(|row| {
                let customer_id: Option<Uuid> = get(row, "customer_id", "visits")?;
                let joined_branch_id: Option<Uuid> = get(row, "joined_branch_id", "customer_branches")?;
                let visit_date: NaiveDateTime = get(row, "visit_date", "visits")?;
                let company_name: Option<String> = get(row, "company_name", "customers")?;
                let branch_name: Option<String> = get(row, "branch_name", "customer_branches")?;

                Ok(VisitRow {
                    id: get(row, "id", "visits")?,
                    customer_id,
                    branch_id: get(row, "branch_id", "visits")?,
                    operator_id: get(row, "operator_id", "visits")?,
                    visit_date,
                    status: get(row, "status", "visits")?,
                    is_invoiced: get(row, "is_invoiced", "visits")?,
                    customer: customer_id.map(|id| CustomerRef {
                        id,
                        company_name,
                    }),
                    branch: joined_branch_id.map(|id| BranchRef {
                        id,
                        branch_name,
                    }),
                })
            })
            .collect::<RevenueResult<Vec<_>>>()?;

        Ok(newest_first(visits))
    }

    async fn sale_items(&self, sale_ids: &[Uuid]) -> RevenueResult<HashMap<Uuid, Vec<MaterialSaleItemRow>>> {
        let mut items: HashMap<Uuid, Vec<MaterialSaleItemRow>> = HashMap::new();
        if sale_ids.is_empty() {
            return Ok(items);
        }

        let rows = sqlx::query(
            r#"
            SELECT i.sale_id, i.product_id,
                   i.quantity::text AS quantity,
                   i.unit_price::text AS unit_price,
                   i.total_price::text AS total_price,
                   p.name AS product_name, p.unit AS product_unit
            FROM paid_material_sale_items i
            LEFT JOIN paid_products p ON p.id = i.product_id
            WHERE i.sale_id = ANY($1)
            "#,
        )
        .bind(sale_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("paid_material_sale_items", e))?;

        for row in rows {
            let sale_id: Uuid = get(&row, "sale_id", "paid_material_sale_items")?;
            let product_name: Option<String> = get(&row, "product_name", "paid_products")?;
            let product_unit: Option<String> = get(&row, "product_unit", "paid_products")?;
            let product_id: Option<Uuid> = get(&row, "product_id", "paid_material_sale_items")?;

            items.entry(sale_id).or_default().push(MaterialSaleItemRow {
                product_id,
                quantity: text_amount(&row, "quantity", "paid_material_sale_items")?,
                unit_price: text_amount(&row, "unit_price", "paid_material_sale_items")?,
                total_price: text_amount(&row, "total_price", "paid_material_sale_items")?,
                product: product_id.map(|_| ProductRef {
                    name: product_name,
                    unit: product_unit,
                }),
            });
        }

        Ok(items)
    }
}

fn storage_error(table: &'static str, e: sqlx::Error) -> RevenueError {
    RevenueError::unavailable(table, e.to_string())
}

fn get<'r, T>(row: &'r PgRow, column: &str, table: &'static str) -> RevenueResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| RevenueError::unavailable(table, format!("column {}: {}", column, e)))
}

fn text_amount(row: &PgRow, column: &str, table: &'static str) -> RevenueResult<Option<Value>> {
    let raw: Option<String> = get(row, column, table)?;
    Ok(raw.map(Value::String))
}

#[async_trait]
impl RevenueRepository for PostgresRevenueRepository {
    async fn completed_visits(
        &self,
        company_id: Uuid,
        period: ReportPeriod,
    ) -> RevenueResult<Vec<VisitRow>> {
        self.visits(company_id, period, true).await
    }

    async fn period_visits(
        &self,
        company_id: Uuid,
        period: ReportPeriod,
    ) -> RevenueResult<Vec<VisitRow>> {
        self.visits(company_id, period, false).await
    }

    async fn pricing_records(&self, company_id: Uuid) -> RevenueResult<Vec<PricingRow>> {
        // branch rows first so they are found before customer rows
        let rows = sqlx::query(
            r#"
            SELECT bp.branch_id, b.customer_id, bp.pricing_type,
                   bp.per_visit_price::text AS per_visit_price,
                   bp.monthly_price::text AS monthly_price
            FROM branch_pricing bp
            JOIN customer_branches b ON b.id = bp.branch_id
            JOIN customers c ON c.id = b.customer_id
            WHERE c.created_by_company_id = $1
            UNION ALL
            SELECT NULL::uuid AS branch_id, cp.customer_id, cp.pricing_type,
                   cp.per_visit_price::text AS per_visit_price,
                   cp.monthly_price::text AS monthly_price
            FROM customer_pricing cp
            JOIN customers c ON c.id = cp.customer_id
            WHERE c.created_by_company_id = $1
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("pricing", e))?;

        rows.iter()
            .map(|row| {
                Ok(PricingRow {
                    customer_id: get(row, "customer_id", "customer_pricing")?,
                    branch_id: get(row, "branch_id", "branch_pricing")?,
                    pricing_type: get(row, "pricing_type", "customer_pricing")?,
                    per_visit_price: text_amount(row, "per_visit_price", "customer_pricing")?,
                    monthly_price: text_amount(row, "monthly_price", "customer_pricing")?,
                })
            })
            .collect()
    }

    async fn material_sales(
        &self,
        company_id: Uuid,
        period: ReportPeriod,
    ) -> RevenueResult<Vec<MaterialSaleRow>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.visit_id, s.customer_id, s.branch_id, s.sale_date, s.status,
                   s.total_amount::text AS total_amount
            FROM paid_material_sales s
            JOIN customers c ON c.id = s.customer_id
            WHERE c.created_by_company_id = $1
              AND s.sale_date >= $2
              AND s.sale_date <= $3
            "#,
        )
        .bind(company_id)
        .bind(period.first_day())
        .bind(period.last_day())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("paid_material_sales", e))?;

        let sale_ids = rows
            .iter()
            .map(|row| get(row, "id", "paid_material_sales"))
            .collect::<RevenueResult<Vec<Uuid>>>()?;
        let mut items = self.sale_items(&sale_ids).await?;

        rows.iter()
            .map(|row| {
                let id: Uuid = get(row, "id", "paid_material_sales")?;
                let sale_date: NaiveDate = get(row, "sale_date", "paid_material_sales")?;
                Ok(MaterialSaleRow {
                    id,
                    visit_id: get(row, "visit_id", "paid_material_sales")?,
                    customer_id: get(row, "customer_id", "paid_material_sales")?,
                    branch_id: get(row, "branch_id", "paid_material_sales")?,
                    sale_date,
                    status: get(row, "status", "paid_material_sales")?,
                    total_amount: text_amount(row, "total_amount", "paid_material_sales")?,
                    items: items.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn operators(&self, company_id: Uuid) -> RevenueResult<Vec<OperatorRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, full_name, email
            FROM operators
            WHERE company_id = $1
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("operators", e))?;

        rows.iter()
            .map(|row| {
                Ok(OperatorRow {
                    id: get(row, "id", "operators")?,
                    full_name: get(row, "full_name", "operators")?,
                    email: get(row, "email", "operators")?,
                })
            })
            .collect()
    }
}
