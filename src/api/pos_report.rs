use std::collections::HashMap;

use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{
        pos::{SALE_COLUMNS, SALE_ITEM_COLUMNS},
        product::product_columns,
        stock_movement::MOVEMENT_COLUMNS,
    },
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::{
        product::Product,
        sale::{Sale, SaleItem},
        stock::{CashSession, StockMovement},
    },
    service::{
        export::{ExportFormat, csv_response, metrics_csv, rows_to_csv},
        pos_report::{
            CashRegister, DateRange, MovementTotals, Period, StockSort, TrendPoint,
            cash_register, discounts_returns, lookback_start, low_stock, movement_totals,
            payment_methods, profit_loss, resolve_range, sales_by_category, sales_by_staff,
            sales_summary, sales_trend, slow_moving, stock_levels, top_products, variance,
            vat_report,
        },
    },
    utils::db_utils::{PageRequest, SqlFilter, fetch_all_as, fetch_page},
};

const SETTLED: &str = "s.status IN ('completed', 'partial_return')";

#[derive(Debug, Deserialize, IntoParams)]
pub struct PosReportQuery {
    pub location_id: Option<u64>,
    /// today, week (7 days) or month (30 days); ignored when from/to are given
    pub period: Option<Period>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default)]
    #[param(value_type = Option<String>)]
    pub format: ExportFormat,
    /// top_products: number of rows
    pub limit: Option<usize>,
    /// slow_moving: days without a sale
    pub days: Option<i64>,
    /// stock_levels: category filter
    pub category: Option<String>,
    /// stock_levels: name, quantity or value
    pub sort: Option<StockSort>,
    /// cash_register
    pub opening_balance: Option<f64>,
    /// cash_register
    pub paid_out: Option<f64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PosReportQuery {
    fn range(&self) -> ApiResult<DateRange> {
        resolve_range(self.period, self.from, self.to, Local::now().date_naive())
    }

    fn csv(&self) -> bool {
        self.format == ExportFormat::Csv
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CloseDay {
    pub location_id: u64,
    /// Defaults to today
    #[schema(value_type = Option<String>, format = "date")]
    pub business_date: Option<NaiveDate>,
    #[serde(default)]
    pub opening_balance: f64,
    pub actual_cash: f64,
    #[serde(default)]
    pub paid_out: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MovementReport {
    pub totals: MovementTotals,
    pub movements: Vec<StockMovement>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Dashboard {
    pub range: DateRange,
    pub total_revenue: f64,
    pub total_sales: i64,
    pub low_stock_count: i64,
    pub trend: Vec<TrendPoint>,
}

fn prefixed(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn sales_filter(location_id: Option<u64>, range: &DateRange) -> SqlFilter {
    let mut filter = SqlFilter::new();
    filter
        .and_eq("s.location_id", location_id)
        .and_between("DATE(s.created_at)", Some(range.from), Some(range.to));
    filter
}

async fn load_sales(
    pool: &MySqlPool,
    location_id: Option<u64>,
    range: &DateRange,
) -> ApiResult<Vec<Sale>> {
    let filter = sales_filter(location_id, range);
    let sql = format!(
        "SELECT {} FROM sales s {} ORDER BY s.created_at",
        prefixed(SALE_COLUMNS, "s"),
        filter.where_clause()
    );
    Ok(fetch_all_as::<Sale>(pool, &sql, filter.values()).await?)
}

/// Lines of the sales in range; `settled_only` drops cancelled and fully
/// returned sales.
async fn load_items(
    pool: &MySqlPool,
    location_id: Option<u64>,
    range: &DateRange,
    settled_only: bool,
) -> ApiResult<Vec<SaleItem>> {
    let mut filter = sales_filter(location_id, range);
    if settled_only {
        filter.and_raw(SETTLED);
    }
    let sql = format!(
        "SELECT {} FROM sale_items i JOIN sales s ON s.id = i.sale_id {}",
        prefixed(SALE_ITEM_COLUMNS, "i"),
        filter.where_clause()
    );
    Ok(fetch_all_as::<SaleItem>(pool, &sql, filter.values()).await?)
}

async fn load_products(pool: &MySqlPool, location_id: Option<u64>) -> ApiResult<Vec<Product>> {
    Ok(sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products p WHERE p.is_active = TRUE ORDER BY p.name",
        product_columns(location_id)
    ))
    .fetch_all(pool)
    .await?)
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/daily-sales",
    params(PosReportQuery),
    responses((status = 200, description = "Sales summary", body = crate::service::pos_report::SalesSummary)),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn daily_sales(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let range = query.range()?;
    let sales = load_sales(pool.get_ref(), query.location_id, &range).await?;
    let summary = sales_summary(&sales);

    if query.csv() {
        let methods: Vec<(String, String)> = summary
            .by_payment_method
            .iter()
            .map(|(m, v)| (format!("payment_{m}"), v.to_string()))
            .collect();
        let mut metrics = vec![
            ("from", range.from.to_string()),
            ("to", range.to.to_string()),
            ("total_sales", summary.total_sales.to_string()),
            ("transaction_count", summary.transaction_count.to_string()),
            ("average_transaction", summary.average_transaction.to_string()),
            ("total_tax", summary.total_tax.to_string()),
            ("total_discount", summary.total_discount.to_string()),
        ];
        metrics.extend(methods.iter().map(|(m, v)| (m.as_str(), v.clone())));
        return Ok(csv_response("daily-sales", metrics_csv(&metrics)));
    }
    Ok(HttpResponse::Ok().json(summary))
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/payment-methods",
    params(PosReportQuery),
    responses((status = 200, description = "Totals per payment method", body = [crate::service::pos_report::PaymentMethodRow])),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn payment_methods_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let sales = load_sales(pool.get_ref(), query.location_id, &query.range()?).await?;
    let rows = payment_methods(&sales);

    if query.csv() {
        return Ok(csv_response("payment-methods", rows_to_csv(&rows)));
    }
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/staff",
    params(PosReportQuery),
    responses((status = 200, description = "Sales per staff member", body = [crate::service::pos_report::StaffSales])),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn staff_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let sales = load_sales(pool.get_ref(), query.location_id, &query.range()?).await?;
    let rows = sales_by_staff(&sales);

    if query.csv() {
        return Ok(csv_response("sales-by-staff", rows_to_csv(&rows)));
    }
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/categories",
    params(PosReportQuery),
    responses((status = 200, description = "Sales per category", body = [crate::service::pos_report::CategorySales])),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn category_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let items = load_items(pool.get_ref(), query.location_id, &query.range()?, true).await?;
    let rows = sales_by_category(&items);

    if query.csv() {
        return Ok(csv_response("sales-by-category", rows_to_csv(&rows)));
    }
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/top-products",
    params(PosReportQuery),
    responses((status = 200, description = "Best sellers by quantity", body = [crate::service::pos_report::TopProduct])),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn top_products_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let items = load_items(pool.get_ref(), query.location_id, &query.range()?, true).await?;
    let rows = top_products(&items, query.limit.unwrap_or(10).clamp(1, 100));

    if query.csv() {
        return Ok(csv_response("top-products", rows_to_csv(&rows)));
    }
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/slow-moving",
    params(PosReportQuery),
    responses((status = 200, description = "Products without a sale in the window", body = [crate::service::pos_report::SlowMover])),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn slow_moving_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    let days = query.days.unwrap_or(config.policy.slow_moving_days);
    let since = lookback_start(Local::now().naive_local(), days)?;

    let products = load_products(pool.get_ref(), query.location_id).await?;

    let mut filter = SqlFilter::new();
    filter.and_eq("s.location_id", query.location_id).and_raw(SETTLED);
    let sql = format!(
        "SELECT i.product_id, MAX(s.created_at) FROM sale_items i JOIN sales s ON s.id = i.sale_id {} GROUP BY i.product_id",
        filter.where_clause()
    );
    let last_sold: HashMap<u64, NaiveDateTime> =
        fetch_all_as::<(u64, NaiveDateTime)>(pool.get_ref(), &sql, filter.values())
            .await?
            .into_iter()
            .collect();

    let rows = slow_moving(&products, &last_sold, since);

    if query.csv() {
        return Ok(csv_response("slow-moving", rows_to_csv(&rows)));
    }
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/low-stock",
    params(PosReportQuery),
    responses((status = 200, description = "Products at or under their reorder level", body = [Product])),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn low_stock_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;
    let products = load_products(pool.get_ref(), query.location_id).await?;
    let rows = low_stock(&products);

    if query.csv() {
        return Ok(csv_response("low-stock", rows_to_csv(&rows)));
    }
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/stock-levels",
    params(PosReportQuery),
    responses((status = 200, description = "Stock quantity and value", body = crate::service::pos_report::StockLevels)),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn stock_levels_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let products = load_products(pool.get_ref(), query.location_id).await?;
    let report = stock_levels(
        &products,
        query.category.as_deref(),
        query.sort.unwrap_or_default(),
    );

    if query.csv() {
        return Ok(csv_response("stock-levels", rows_to_csv(&report.items)));
    }
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/stock-movements",
    params(PosReportQuery),
    responses((status = 200, description = "Movements in range with totals", body = MovementReport)),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn movements_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let range = query.range()?;

    let mut filter = SqlFilter::new();
    filter.and_between("DATE(created_at)", Some(range.from), Some(range.to));
    if let Some(location_id) = query.location_id {
        filter.and("? IN (from_location_id, to_location_id)", location_id);
    }
    let sql = format!(
        "SELECT {MOVEMENT_COLUMNS} FROM stock_movements {} ORDER BY created_at DESC, id DESC",
        filter.where_clause()
    );
    let movements = fetch_all_as::<StockMovement>(pool.get_ref(), &sql, filter.values()).await?;

    if query.csv() {
        return Ok(csv_response("stock-movements", rows_to_csv(&movements)));
    }
    Ok(HttpResponse::Ok().json(MovementReport {
        totals: movement_totals(&movements, query.location_id),
        movements,
    }))
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/vat",
    params(PosReportQuery),
    responses((status = 200, description = "VAT collected", body = crate::service::pos_report::VatReport)),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn vat(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let sales = load_sales(pool.get_ref(), query.location_id, &query.range()?).await?;
    let report = vat_report(&sales, config.policy.vat_rate);

    if query.csv() {
        return Ok(csv_response("vat", rows_to_csv(&report.days)));
    }
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/profit-loss",
    params(PosReportQuery),
    responses((status = 200, description = "Revenue, cost of goods and margin", body = crate::service::pos_report::ProfitLoss)),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn profit_loss_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let range = query.range()?;
    let sales = load_sales(pool.get_ref(), query.location_id, &range).await?;
    let items = load_items(pool.get_ref(), query.location_id, &range, true).await?;
    let report = profit_loss(&sales, &items);

    if query.csv() {
        let body = metrics_csv(&[
            ("revenue", report.revenue.to_string()),
            ("cost_of_goods", report.cost_of_goods.to_string()),
            ("gross_profit", report.gross_profit.to_string()),
            ("margin", report.margin.to_string()),
        ]);
        return Ok(csv_response("profit-loss", body));
    }
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/discounts-returns",
    params(PosReportQuery),
    responses((status = 200, description = "Discounts given and goods returned", body = crate::service::pos_report::DiscountsReturns)),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn discounts_returns_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let range = query.range()?;
    let sales = load_sales(pool.get_ref(), query.location_id, &range).await?;
    let items = load_items(pool.get_ref(), query.location_id, &range, false).await?;
    let report = discounts_returns(&sales, &items);

    if query.csv() {
        let body = metrics_csv(&[
            ("discounted_sales", report.discounted_sales.to_string()),
            ("total_discount", report.total_discount.to_string()),
            ("returned_sales", report.returned_sales.to_string()),
            ("returned_value", report.returned_value.to_string()),
        ]);
        return Ok(csv_response("discounts-returns", body));
    }
    Ok(HttpResponse::Ok().json(report))
}

fn register_metrics(register: &CashRegister) -> Vec<(&'static str, String)> {
    vec![
        ("opening_balance", register.opening_balance.to_string()),
        ("cash_sales", register.cash_sales.to_string()),
        ("cash_transactions", register.cash_transactions.to_string()),
        ("cash_received", register.cash_received.to_string()),
        ("change_given", register.change_given.to_string()),
        ("cash_paid_out", register.cash_paid_out.to_string()),
        ("expected_in_drawer", register.expected_in_drawer.to_string()),
    ]
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/cash-register",
    params(PosReportQuery),
    responses((status = 200, description = "Expected cash in the drawer", body = CashRegister)),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn cash_register_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;
    let sales = load_sales(pool.get_ref(), query.location_id, &query.range()?).await?;
    let register = cash_register(
        &sales,
        query.opening_balance.unwrap_or(0.0),
        query.paid_out.unwrap_or(0.0),
    );

    if query.csv() {
        return Ok(csv_response("cash-register", metrics_csv(&register_metrics(&register))));
    }
    Ok(HttpResponse::Ok().json(register))
}

/// Persists the cash-up for one location and business day.
#[utoipa::path(
    post,
    path = "/api/pos/reports/close-day",
    request_body = CloseDay,
    responses(
        (status = 201, description = "Day closed", body = CashSession),
        (status = 409, description = "Day already closed for this location")
    ),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn close_day(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CloseDay>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    if payload.opening_balance < 0.0 || payload.actual_cash < 0.0 || payload.paid_out < 0.0 {
        return Err(ApiError::validation("Cash amounts cannot be negative"));
    }

    let date = payload
        .business_date
        .unwrap_or_else(|| Local::now().date_naive());
    let range = DateRange { from: date, to: date };
    let sales = load_sales(pool.get_ref(), Some(payload.location_id), &range).await?;
    let register = cash_register(&sales, payload.opening_balance, payload.paid_out);
    let difference = variance(payload.actual_cash, register.expected_in_drawer);
    let now = Local::now().naive_local();

    let result = sqlx::query(
        r#"
        INSERT INTO cash_sessions
        (location_id, business_date, opening_balance, cash_sales, cash_received, change_given,
         cash_paid_out, expected_in_drawer, actual_cash, variance, closed_by, closed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.location_id)
    .bind(date)
    .bind(register.opening_balance)
    .bind(register.cash_sales)
    .bind(register.cash_received)
    .bind(register.change_given)
    .bind(register.cash_paid_out)
    .bind(register.expected_in_drawer)
    .bind(payload.actual_cash)
    .bind(difference)
    .bind(auth.user_id)
    .bind(now)
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Day already closed for this location"),
        other => other,
    })?;

    info!(
        location_id = payload.location_id,
        business_date = %date,
        variance = difference,
        "Day closed"
    );

    Ok(HttpResponse::Created().json(CashSession {
        id: result.last_insert_id(),
        location_id: payload.location_id,
        business_date: date,
        opening_balance: register.opening_balance,
        cash_sales: register.cash_sales,
        cash_received: register.cash_received,
        change_given: register.change_given,
        cash_paid_out: register.cash_paid_out,
        expected_in_drawer: register.expected_in_drawer,
        actual_cash: payload.actual_cash,
        variance: difference,
        closed_by: auth.user_id,
        closed_at: now,
    }))
}

#[utoipa::path(
    get,
    path = "/api/pos/reports/transactions",
    params(PosReportQuery),
    responses((status = 200, description = "Paginated sale history")),
    security(("bearer_auth" = [])),
    tag = "POS Reports"
)]
pub async fn transactions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let range = query.range()?;

    if query.csv() {
        let sales = load_sales(pool.get_ref(), query.location_id, &range).await?;
        return Ok(csv_response("transactions", rows_to_csv(&sales)));
    }

    let page = fetch_page::<Sale>(
        pool.get_ref(),
        &prefixed(SALE_COLUMNS, "s"),
        "FROM sales s",
        &sales_filter(query.location_id, &range),
        "s.created_at DESC, s.id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Headline figures for the range (a month unless asked otherwise).
#[utoipa::path(
    get,
    path = "/api/dashboard",
    params(PosReportQuery),
    responses((status = 200, description = "Dashboard figures", body = Dashboard)),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn dashboard(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PosReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;

    let today = Local::now().date_naive();
    let range = resolve_range(
        query.period.or(Some(Period::Month)),
        query.from,
        query.to,
        today,
    )?;
    let sales = load_sales(pool.get_ref(), query.location_id, &range).await?;
    let summary = sales_summary(&sales);
    let products = load_products(pool.get_ref(), query.location_id).await?;

    let report = Dashboard {
        total_revenue: summary.total_sales,
        total_sales: summary.transaction_count,
        low_stock_count: low_stock(&products).len() as i64,
        trend: sales_trend(&sales, range.days(), range.to),
        range,
    };

    if query.csv() {
        return Ok(csv_response("dashboard-trend", rows_to_csv(&report.trend)));
    }
    Ok(HttpResponse::Ok().json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn columns_get_the_table_alias() {
        assert_eq!(prefixed("id, sale_id,quantity", "i"), "i.id, i.sale_id, i.quantity");
    }

    #[test]
    fn sales_filter_covers_the_whole_range() {
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
        };
        let filter = sales_filter(Some(4), &range);
        assert_eq!(
            filter.where_clause(),
            "WHERE s.location_id = ? AND DATE(s.created_at) >= ? AND DATE(s.created_at) <= ?"
        );
        assert_eq!(filter.values().len(), 3);
    }

    #[test]
    fn dashboard_serializes_range_and_trend() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let range = DateRange { from: today, to: today };
        let dashboard = Dashboard {
            range,
            total_revenue: 0.0,
            total_sales: 0,
            low_stock_count: 2,
            trend: sales_trend::<Sale>(&[], 1, today),
        };
        let value = serde_json::to_value(&dashboard).unwrap();
        assert_eq!(value["range"]["from"], json!("2026-03-03"));
        assert_eq!(value["trend"][0]["total"], json!(0.0));
    }
}
