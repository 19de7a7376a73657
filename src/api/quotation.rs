use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::invoice::{NewInvoice, insert_invoice},
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::quotation::{DocumentLine, Quotation, QuotationStatus, QuotationWithLines},
    service::sales::{
        DocumentLineInput, DocumentTotals, document_totals, ensure_dates, next_quotation_status,
    },
    utils::db_utils::{PageRequest, SqlFilter, fetch_page},
};

pub(crate) const QUOTATION_COLUMNS: &str = "id, quotation_number, customer_id, location_id, date, \
     expiry_date, subtotal, tax_total, total_amount, status";

/// Which document a line table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineTable {
    Quotation,
    Invoice,
}

impl LineTable {
    fn table(self) -> &'static str {
        match self {
            LineTable::Quotation => "quotation_items",
            LineTable::Invoice => "invoice_items",
        }
    }

    fn parent(self) -> &'static str {
        match self {
            LineTable::Quotation => "quotation_id",
            LineTable::Invoice => "invoice_id",
        }
    }
}

/// Writes one row per input line with its computed total.
pub(crate) async fn insert_lines(
    conn: &mut MySqlConnection,
    table: LineTable,
    parent_id: u64,
    lines: &[DocumentLineInput],
    totals: &DocumentTotals,
) -> ApiResult<()> {
    let sql = format!(
        "INSERT INTO {} ({}, product_id, quantity, unit_price, line_total) VALUES (?, ?, ?, ?, ?)",
        table.table(),
        table.parent()
    );
    for (line, line_total) in lines.iter().zip(&totals.line_totals) {
        sqlx::query(&sql)
            .bind(parent_id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line_total)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn fetch_lines(
    conn: &mut MySqlConnection,
    table: LineTable,
    parent_id: u64,
) -> ApiResult<Vec<DocumentLine>> {
    let sql = format!(
        "SELECT id, product_id, quantity, unit_price, line_total FROM {} WHERE {} = ? ORDER BY id",
        table.table(),
        table.parent()
    );
    Ok(sqlx::query_as::<_, DocumentLine>(&sql)
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await?)
}

/// Products and the customer must exist before a document references them.
pub(crate) async fn check_references(
    conn: &mut MySqlConnection,
    customer_id: u64,
    location_id: u64,
    lines: &[DocumentLineInput],
) -> ApiResult<()> {
    let customer = sqlx::query_scalar::<_, u64>("SELECT id FROM customers WHERE id = ?")
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?;
    if customer.is_none() {
        return Err(ApiError::not_found("Customer"));
    }
    let location = sqlx::query_scalar::<_, u64>("SELECT id FROM locations WHERE id = ?")
        .bind(location_id)
        .fetch_optional(&mut *conn)
        .await?;
    if location.is_none() {
        return Err(ApiError::not_found("Location"));
    }
    for line in lines {
        let product = sqlx::query_scalar::<_, u64>("SELECT id FROM products WHERE id = ?")
            .bind(line.product_id)
            .fetch_optional(&mut *conn)
            .await?;
        if product.is_none() {
            return Err(ApiError::validation(format!(
                "Product {} does not exist",
                line.product_id
            )));
        }
    }
    Ok(())
}

/// Millisecond-stamped document number, e.g. `QT-1767254400000`.
pub(crate) fn document_number(prefix: &str) -> String {
    format!("{prefix}-{}", Local::now().timestamp_millis())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateQuotation {
    pub customer_id: u64,
    pub location_id: u64,
    /// Defaults to today
    #[schema(value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
    #[schema(value_type = String, format = "date", example = "2026-07-31")]
    pub expiry_date: NaiveDate,
    pub lines: Vec<DocumentLineInput>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct QuotationStatusUpdate {
    /// `sent`, `accepted` or `declined`
    pub status: QuotationStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConvertQuotation {
    #[schema(value_type = String, format = "date", example = "2026-08-15")]
    pub due_date: NaiveDate,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct QuotationQuery {
    pub status: Option<QuotationStatus>,
    pub customer_id: Option<u64>,
    pub location_id: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl QuotationQuery {
    fn to_filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::new();
        filter
            .and_eq("status", self.status.map(|s| s.to_string()))
            .and_eq("customer_id", self.customer_id)
            .and_eq("location_id", self.location_id);
        filter
    }
}

async fn fetch_quotation(
    conn: &mut MySqlConnection,
    quotation_id: u64,
    lock: bool,
) -> ApiResult<Quotation> {
    let sql = format!(
        "SELECT {QUOTATION_COLUMNS} FROM quotations WHERE id = ?{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, Quotation>(&sql)
        .bind(quotation_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Quotation"))
}

fn parse_status(quotation: &Quotation) -> ApiResult<QuotationStatus> {
    quotation.status.parse().map_err(|_| {
        ApiError::validation(format!("Unknown quotation status {}", quotation.status))
    })
}

#[utoipa::path(
    post,
    path = "/api/quotation",
    request_body = CreateQuotation,
    responses(
        (status = 201, description = "Quotation created", body = Object, example = json!({
            "message": "Quotation created",
            "id": 3,
            "quotation_number": "QT-1767254400000",
            "total_amount": 116.5
        })),
        (status = 400, description = "No lines, bad quantity or expiry before date")
    ),
    security(("bearer_auth" = [])),
    tag = "Quotation"
)]
pub async fn create_quotation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreateQuotation>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;

    let date = payload.date.unwrap_or_else(|| Local::now().date_naive());
    ensure_dates(date, payload.expiry_date, "Expiry date")?;
    let totals = document_totals(&payload.lines, config.policy.vat_rate)?;

    let mut tx = pool.begin().await?;
    check_references(&mut tx, payload.customer_id, payload.location_id, &payload.lines).await?;

    let number = document_number("QT");
    let result = sqlx::query(
        r#"
        INSERT INTO quotations
            (quotation_number, customer_id, location_id, date, expiry_date,
             subtotal, tax_total, total_amount, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'draft')
        "#,
    )
    .bind(&number)
    .bind(payload.customer_id)
    .bind(payload.location_id)
    .bind(date)
    .bind(payload.expiry_date)
    .bind(totals.subtotal)
    .bind(totals.tax_total)
    .bind(totals.total_amount)
    .execute(&mut *tx)
    .await?;
    let quotation_id = result.last_insert_id();

    insert_lines(&mut tx, LineTable::Quotation, quotation_id, &payload.lines, &totals).await?;
    tx.commit().await?;

    info!(quotation_id, number = %number, total = totals.total_amount, "Quotation created");
    Ok(HttpResponse::Created().json(json!({
        "message": "Quotation created",
        "id": quotation_id,
        "quotation_number": number,
        "total_amount": totals.total_amount
    })))
}

#[utoipa::path(
    get,
    path = "/api/quotation",
    params(QuotationQuery),
    responses((status = 200, description = "Paginated quotations, newest first")),
    security(("bearer_auth" = [])),
    tag = "Quotation"
)]
pub async fn list_quotations(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<QuotationQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;

    let page = fetch_page::<Quotation>(
        pool.get_ref(),
        QUOTATION_COLUMNS,
        "FROM quotations",
        &query.to_filter(),
        "date DESC, id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/quotation/{quotation_id}",
    params(("quotation_id" = u64, Path, description = "Quotation ID")),
    responses(
        (status = 200, description = "Quotation with lines", body = QuotationWithLines),
        (status = 404, description = "Quotation not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Quotation"
)]
pub async fn get_quotation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;
    let quotation_id = path.into_inner();

    let mut conn = pool.acquire().await?;
    let quotation = fetch_quotation(&mut conn, quotation_id, false).await?;
    let lines = fetch_lines(&mut conn, LineTable::Quotation, quotation_id).await?;

    Ok(HttpResponse::Ok().json(QuotationWithLines { quotation, lines }))
}

#[utoipa::path(
    put,
    path = "/api/quotation/{quotation_id}/status",
    params(("quotation_id" = u64, Path, description = "Quotation ID")),
    request_body = QuotationStatusUpdate,
    responses(
        (status = 200, description = "Status changed"),
        (status = 400, description = "Transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Quotation"
)]
pub async fn update_quotation_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<QuotationStatusUpdate>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;
    let quotation_id = path.into_inner();

    if payload.status == QuotationStatus::Converted {
        return Err(ApiError::validation(
            "Use the convert endpoint to turn a quotation into an invoice",
        ));
    }

    let mut tx = pool.begin().await?;
    let quotation = fetch_quotation(&mut tx, quotation_id, true).await?;
    let next = next_quotation_status(parse_status(&quotation)?, payload.status)?;

    sqlx::query("UPDATE quotations SET status = ? WHERE id = ?")
        .bind(next.as_ref())
        .bind(quotation_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(quotation_id, status = %next, "Quotation status changed");
    Ok(HttpResponse::Ok().json(json!({ "message": format!("Quotation {next}") })))
}

#[utoipa::path(
    post,
    path = "/api/quotation/{quotation_id}/convert",
    params(("quotation_id" = u64, Path, description = "Quotation ID")),
    request_body = ConvertQuotation,
    responses(
        (status = 201, description = "Invoice created from the quotation", body = Object, example = json!({
            "message": "Quotation converted",
            "invoice_id": 8,
            "invoice_number": "INV-1767254400000"
        })),
        (status = 400, description = "Quotation not accepted or due date before today")
    ),
    security(("bearer_auth" = [])),
    tag = "Quotation"
)]
pub async fn convert_to_invoice(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
    payload: web::Json<ConvertQuotation>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;
    let quotation_id = path.into_inner();
    let today = Local::now().date_naive();
    ensure_dates(today, payload.due_date, "Due date")?;

    let mut tx = pool.begin().await?;
    let quotation = fetch_quotation(&mut tx, quotation_id, true).await?;
    let next = next_quotation_status(parse_status(&quotation)?, QuotationStatus::Converted)?;

    let lines: Vec<DocumentLineInput> = fetch_lines(&mut tx, LineTable::Quotation, quotation_id)
        .await?
        .into_iter()
        .map(|l| DocumentLineInput {
            product_id: l.product_id,
            quantity: l.quantity,
            unit_price: l.unit_price,
        })
        .collect();
    let totals = document_totals(&lines, config.policy.vat_rate)?;

    let (invoice_id, invoice_number) = insert_invoice(
        &mut tx,
        &NewInvoice {
            customer_id: quotation.customer_id,
            location_id: quotation.location_id,
            quotation_id: Some(quotation_id),
            date: today,
            due_date: payload.due_date,
        },
        &lines,
        &totals,
    )
    .await?;

    sqlx::query("UPDATE quotations SET status = ? WHERE id = ?")
        .bind(next.as_ref())
        .bind(quotation_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(quotation_id, invoice_id, "Quotation converted to invoice");
    Ok(HttpResponse::Created().json(json!({
        "message": "Quotation converted",
        "invoice_id": invoice_id,
        "invoice_number": invoice_number
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_tables_point_at_their_parent() {
        assert_eq!(LineTable::Quotation.table(), "quotation_items");
        assert_eq!(LineTable::Quotation.parent(), "quotation_id");
        assert_eq!(LineTable::Invoice.table(), "invoice_items");
        assert_eq!(LineTable::Invoice.parent(), "invoice_id");
    }

    #[test]
    fn document_numbers_carry_prefix_and_millis() {
        let number = document_number("QT");
        let (prefix, millis) = number.split_once('-').unwrap();
        assert_eq!(prefix, "QT");
        assert!(millis.parse::<i64>().unwrap() > 1_700_000_000_000);
    }

    #[test]
    fn quotation_filter_combines_fields() {
        let query = QuotationQuery {
            status: Some(QuotationStatus::Sent),
            customer_id: Some(4),
            location_id: None,
            page: None,
            per_page: None,
        };
        assert_eq!(query.to_filter().where_clause(), "WHERE status = ? AND customer_id = ?");
    }
}
