use std::collections::BTreeMap;

use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::invoice::INVOICE_COLUMNS,
    auth::auth::AuthUser,
    error::ApiResult,
    model::invoice::Invoice,
    service::{
        pos_report::{DateRange, Period, resolve_range},
        round2,
        sales::{InvoiceTotals, conversion_rate, count_by, invoice_totals},
    },
    utils::db_utils::{SqlFilter, fetch_all_as},
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct SalesStatsQuery {
    pub location_id: Option<u64>,
    /// today, week or month; month when nothing is given
    pub period: Option<Period>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Top customers to return, default 5
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct TopCustomer {
    pub customer_id: u64,
    pub name: String,
    pub sale_count: i64,
    pub total_spent: f64,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct PosTotals {
    pub revenue: f64,
    pub sale_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SalesStats {
    pub range: DateRange,
    pub pos: PosTotals,
    pub invoices: InvoiceTotals,
    pub quotation_count: i64,
    /// converted / total * 100
    pub conversion_rate: f64,
    pub customers_by_status: BTreeMap<String, i64>,
    pub top_customers: Vec<TopCustomer>,
}

fn document_filter(location_id: Option<u64>, range: &DateRange) -> SqlFilter {
    let mut filter = SqlFilter::new();
    filter
        .and_eq("location_id", location_id)
        .and_between("date", Some(range.from), Some(range.to));
    filter
}

fn sale_filter(location_id: Option<u64>, range: &DateRange) -> SqlFilter {
    let mut filter = SqlFilter::new();
    filter
        .and_raw("s.status IN ('completed', 'partial_return')")
        .and_eq("s.location_id", location_id)
        .and_between("DATE(s.created_at)", Some(range.from), Some(range.to));
    filter
}

#[utoipa::path(
    get,
    path = "/api/sales/stats",
    params(SalesStatsQuery),
    responses((status = 200, description = "Sales management overview", body = SalesStats)),
    security(("bearer_auth" = [])),
    tag = "Sales"
)]
pub async fn sales_stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SalesStatsQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;

    let today = Local::now().date_naive();
    let range = resolve_range(
        query.period.or(Some(Period::Month)),
        query.from,
        query.to,
        today,
    )?;
    let pool = pool.get_ref();

    let sales = sale_filter(query.location_id, &range);
    let mut pos = fetch_all_as::<PosTotals>(
        pool,
        &format!(
            "SELECT COALESCE(SUM(s.total_amount), 0) AS revenue, COUNT(*) AS sale_count \
             FROM sales s {}",
            sales.where_clause()
        ),
        sales.values(),
    )
    .await?
    .pop()
    .unwrap_or(PosTotals { revenue: 0.0, sale_count: 0 });
    pos.revenue = round2(pos.revenue);

    let documents = document_filter(query.location_id, &range);
    let invoices = fetch_all_as::<Invoice>(
        pool,
        &format!("SELECT {INVOICE_COLUMNS} FROM invoices {}", documents.where_clause()),
        documents.values(),
    )
    .await?;

    let quotation_statuses: Vec<String> = fetch_all_as::<(String,)>(
        pool,
        &format!("SELECT status FROM quotations {}", documents.where_clause()),
        documents.values(),
    )
    .await?
    .into_iter()
    .map(|(status,)| status)
    .collect();

    let customer_statuses: Vec<(String,)> = sqlx::query_as("SELECT status FROM customers")
        .fetch_all(pool)
        .await?;

    let mut top = sale_filter(query.location_id, &range);
    top.and_raw("s.customer_id IS NOT NULL");
    let mut values = top.values().to_vec();
    values.push(u64::from(query.limit.unwrap_or(5).clamp(1, 50)).into());
    let mut top_customers = fetch_all_as::<TopCustomer>(
        pool,
        &format!(
            r#"
            SELECT c.id AS customer_id, c.name, COUNT(*) AS sale_count,
                   SUM(s.total_amount) AS total_spent
            FROM sales s
            JOIN customers c ON c.id = s.customer_id
            {}
            GROUP BY c.id, c.name
            ORDER BY total_spent DESC
            LIMIT ?
            "#,
            top.where_clause()
        ),
        &values,
    )
    .await?;
    for customer in &mut top_customers {
        customer.total_spent = round2(customer.total_spent);
    }

    Ok(HttpResponse::Ok().json(SalesStats {
        range,
        pos,
        invoices: invoice_totals(&invoices, today),
        quotation_count: quotation_statuses.len() as i64,
        conversion_rate: conversion_rate(&quotation_statuses),
        customers_by_status: count_by(customer_statuses.iter().map(|(s,)| s.as_str())),
        top_customers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn march() -> DateRange {
        DateRange {
            from: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
        }
    }

    #[test]
    fn sale_filter_only_counts_settled_sales() {
        let filter = sale_filter(None, &march());
        assert_eq!(
            filter.where_clause(),
            "WHERE s.status IN ('completed', 'partial_return') \
             AND DATE(s.created_at) >= ? AND DATE(s.created_at) <= ?"
        );
        assert_eq!(filter.values().len(), 2);
    }

    #[test]
    fn document_filter_scopes_location() {
        let filter = document_filter(Some(2), &march());
        assert_eq!(filter.where_clause(), "WHERE location_id = ? AND date >= ? AND date <= ?");
    }
}
