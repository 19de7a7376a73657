use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::quotation::{LineTable, check_references, document_number, fetch_lines, insert_lines},
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::invoice::{Invoice, InvoiceStatus, InvoiceWithLines},
    service::{
        round2,
        sales::{DocumentLineInput, DocumentTotals, apply_payment, document_totals, ensure_dates},
    },
    utils::db_utils::{PageRequest, SqlFilter, fetch_page},
};

pub(crate) const INVOICE_COLUMNS: &str = "id, invoice_number, customer_id, location_id, quotation_id, \
     date, due_date, subtotal, tax_total, total_amount, amount_paid, status";

pub(crate) struct NewInvoice {
    pub customer_id: u64,
    pub location_id: u64,
    pub quotation_id: Option<u64>,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Inserts a draft invoice with its lines. Returns `(id, invoice_number)`.
pub(crate) async fn insert_invoice(
    conn: &mut MySqlConnection,
    invoice: &NewInvoice,
    lines: &[DocumentLineInput],
    totals: &DocumentTotals,
) -> ApiResult<(u64, String)> {
    let number = document_number("INV");
    let result = sqlx::query(
        r#"
        INSERT INTO invoices
            (invoice_number, customer_id, location_id, quotation_id, date, due_date,
             subtotal, tax_total, total_amount, amount_paid, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 'draft')
        "#,
    )
    .bind(&number)
    .bind(invoice.customer_id)
    .bind(invoice.location_id)
    .bind(invoice.quotation_id)
    .bind(invoice.date)
    .bind(invoice.due_date)
    .bind(totals.subtotal)
    .bind(totals.tax_total)
    .bind(totals.total_amount)
    .execute(&mut *conn)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Invoice number already issued, retry"),
        other => other,
    })?;
    let invoice_id = result.last_insert_id();

    insert_lines(conn, LineTable::Invoice, invoice_id, lines, totals).await?;
    Ok((invoice_id, number))
}

async fn fetch_invoice(
    conn: &mut MySqlConnection,
    invoice_id: u64,
    lock: bool,
) -> ApiResult<Invoice> {
    let sql = format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, Invoice>(&sql)
        .bind(invoice_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Invoice"))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInvoice {
    pub customer_id: u64,
    pub location_id: u64,
    /// Defaults to today
    #[schema(value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
    #[schema(value_type = String, format = "date", example = "2026-08-15")]
    pub due_date: NaiveDate,
    pub lines: Vec<DocumentLineInput>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordPayment {
    #[schema(example = 50.0)]
    pub amount: f64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct InvoiceQuery {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<u64>,
    /// Only sent invoices past their due date, plus those already marked overdue
    pub overdue: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl InvoiceQuery {
    fn to_filter(&self, today: NaiveDate) -> SqlFilter {
        let mut filter = SqlFilter::new();
        filter
            .and_eq("status", self.status.map(|s| s.to_string()))
            .and_eq("customer_id", self.customer_id);
        if self.overdue == Some(true) {
            filter.and(
                "(status = 'overdue' OR (status = 'sent' AND due_date < ?))",
                today,
            );
        }
        filter
    }
}

#[utoipa::path(
    post,
    path = "/api/invoice",
    request_body = CreateInvoice,
    responses(
        (status = 201, description = "Invoice created", body = Object, example = json!({
            "message": "Invoice created",
            "id": 8,
            "invoice_number": "INV-1767254400000",
            "total_amount": 116.5
        })),
        (status = 400, description = "No lines or due date before invoice date")
    ),
    security(("bearer_auth" = [])),
    tag = "Invoice"
)]
pub async fn create_invoice(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreateInvoice>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;

    let date = payload.date.unwrap_or_else(|| Local::now().date_naive());
    ensure_dates(date, payload.due_date, "Due date")?;
    let totals = document_totals(&payload.lines, config.policy.vat_rate)?;

    let mut tx = pool.begin().await?;
    check_references(&mut tx, payload.customer_id, payload.location_id, &payload.lines).await?;
    let (invoice_id, number) = insert_invoice(
        &mut tx,
        &NewInvoice {
            customer_id: payload.customer_id,
            location_id: payload.location_id,
            quotation_id: None,
            date,
            due_date: payload.due_date,
        },
        &payload.lines,
        &totals,
    )
    .await?;
    tx.commit().await?;

    info!(invoice_id, number = %number, total = totals.total_amount, "Invoice created");
    Ok(HttpResponse::Created().json(json!({
        "message": "Invoice created",
        "id": invoice_id,
        "invoice_number": number,
        "total_amount": totals.total_amount
    })))
}

#[utoipa::path(
    get,
    path = "/api/invoice",
    params(InvoiceQuery),
    responses((status = 200, description = "Paginated invoices, newest first")),
    security(("bearer_auth" = [])),
    tag = "Invoice"
)]
pub async fn list_invoices(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<InvoiceQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;

    let page = fetch_page::<Invoice>(
        pool.get_ref(),
        INVOICE_COLUMNS,
        "FROM invoices",
        &query.to_filter(Local::now().date_naive()),
        "date DESC, id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/invoice/{invoice_id}",
    params(("invoice_id" = u64, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice with lines", body = InvoiceWithLines),
        (status = 404, description = "Invoice not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Invoice"
)]
pub async fn get_invoice(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;
    let invoice_id = path.into_inner();

    let mut conn = pool.acquire().await?;
    let invoice = fetch_invoice(&mut conn, invoice_id, false).await?;
    let lines = fetch_lines(&mut conn, LineTable::Invoice, invoice_id).await?;

    Ok(HttpResponse::Ok().json(InvoiceWithLines { invoice, lines }))
}

#[utoipa::path(
    put,
    path = "/api/invoice/{invoice_id}/send",
    params(("invoice_id" = u64, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice sent"),
        (status = 400, description = "Invoice is not a draft")
    ),
    security(("bearer_auth" = [])),
    tag = "Invoice"
)]
pub async fn send_invoice(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;
    move_status(pool.get_ref(), path.into_inner(), &[InvoiceStatus::Draft], InvoiceStatus::Sent)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Invoice sent" })))
}

#[utoipa::path(
    put,
    path = "/api/invoice/{invoice_id}/cancel",
    params(("invoice_id" = u64, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice cancelled"),
        (status = 400, description = "Invoice already has payments or is settled")
    ),
    security(("bearer_auth" = [])),
    tag = "Invoice"
)]
pub async fn cancel_invoice(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;
    move_status(
        pool.get_ref(),
        path.into_inner(),
        &[InvoiceStatus::Draft, InvoiceStatus::Sent, InvoiceStatus::Overdue],
        InvoiceStatus::Cancelled,
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Invoice cancelled" })))
}

async fn move_status(
    pool: &MySqlPool,
    invoice_id: u64,
    from: &[InvoiceStatus],
    to: InvoiceStatus,
) -> ApiResult<()> {
    let mut tx = pool.begin().await?;
    let invoice = fetch_invoice(&mut tx, invoice_id, true).await?;
    if !from.iter().any(|s| s.as_ref() == invoice.status) {
        return Err(ApiError::validation(format!(
            "Cannot move a {} invoice to {to}",
            invoice.status
        )));
    }
    if to == InvoiceStatus::Cancelled && invoice.amount_paid > 0.0 {
        return Err(ApiError::validation("Invoices with payments cannot be cancelled"));
    }
    sqlx::query("UPDATE invoices SET status = ? WHERE id = ?")
        .bind(to.as_ref())
        .bind(invoice_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(invoice_id, status = %to, "Invoice status changed");
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/invoice/{invoice_id}/payments",
    params(("invoice_id" = u64, Path, description = "Invoice ID")),
    request_body = RecordPayment,
    responses(
        (status = 200, description = "Payment recorded", body = Object, example = json!({
            "message": "Payment recorded",
            "amount_paid": 116.5,
            "outstanding": 0.0,
            "status": "paid"
        })),
        (status = 400, description = "Amount not positive, above outstanding or invoice not payable")
    ),
    security(("bearer_auth" = [])),
    tag = "Invoice"
)]
pub async fn record_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RecordPayment>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;
    let invoice_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let invoice = fetch_invoice(&mut tx, invoice_id, true).await?;
    let (paid, status) = apply_payment(&invoice, payload.amount)?;

    sqlx::query("UPDATE invoices SET amount_paid = ?, status = ? WHERE id = ?")
        .bind(paid)
        .bind(status.as_ref())
        .bind(invoice_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let outstanding = round2((invoice.total_amount - paid).max(0.0));
    info!(invoice_id, amount = payload.amount, status = %status, "Payment recorded");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Payment recorded",
        "amount_paid": paid,
        "outstanding": outstanding,
        "status": status
    })))
}

/// Flags every sent invoice whose due date has passed.
#[utoipa::path(
    post,
    path = "/api/invoice/mark-overdue",
    responses((status = 200, description = "Sweep result", body = Object, example = json!({
        "message": "Overdue invoices marked", "updated": 3
    }))),
    security(("bearer_auth" = [])),
    tag = "Invoice"
)]
pub async fn mark_overdue(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    auth.require_sales()?;

    let updated = sweep_overdue(pool.get_ref(), Local::now().date_naive()).await?;
    info!(updated, "Overdue invoices marked");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Overdue invoices marked",
        "updated": updated
    })))
}

async fn sweep_overdue(pool: &MySqlPool, today: NaiveDate) -> ApiResult<u64> {
    let result = sqlx::query(
        "UPDATE invoices SET status = 'overdue' WHERE status = 'sent' AND due_date < ?",
    )
    .bind(today)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::db_utils::SqlValue;

    #[test]
    fn overdue_filter_binds_today() {
        let today = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let query = InvoiceQuery {
            status: None,
            customer_id: Some(2),
            overdue: Some(true),
            page: None,
            per_page: None,
        };
        let filter = query.to_filter(today);
        assert_eq!(
            filter.where_clause(),
            "WHERE customer_id = ? AND (status = 'overdue' OR (status = 'sent' AND due_date < ?))"
        );
        assert_eq!(filter.values()[1], SqlValue::Date(today));
    }

    #[test]
    fn overdue_false_adds_nothing() {
        let query = InvoiceQuery {
            status: None,
            customer_id: None,
            overdue: Some(false),
            page: None,
            per_page: None,
        };
        assert_eq!(query.to_filter(NaiveDate::MIN).where_clause(), "");
    }
}
