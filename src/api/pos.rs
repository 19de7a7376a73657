use std::collections::HashMap;

use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::product::product_columns,
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::{
        product::Product,
        sale::{PaymentMethod, Sale, SaleItem, SaleStatus, SaleWithItems},
        stock::MovementType,
        sync::SyncKind,
    },
    service::{
        cart::{CartLine, Quote, SaleHeader, build_sale, quote, receipt_number, settle},
        round2,
    },
    utils::{
        db_utils::{PageRequest, SqlFilter, fetch_page},
        product_cache,
        stock_db::{NewMovement, apply_movement, insert_sale},
        txn_filter,
    },
};

pub(crate) const SALE_COLUMNS: &str = "id, receipt_number, pos_transaction_id, location_id, \
    customer_id, staff_id, staff_name, subtotal, discount_amount, tax_amount, total_amount, \
    paid_amount, change_amount, payment_method, status, notes, created_at";

pub(crate) const SALE_ITEM_COLUMNS: &str = "id, sale_id, product_id, product_name, sku, category, \
    quantity, returned_quantity, unit_price, cost_price, discount_amount, tax_amount, total_price";

#[derive(Debug, Deserialize, ToSchema)]
pub struct QuoteReq {
    pub lines: Vec<CartLine>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutLine {
    pub product_id: u64,
    #[schema(example = 2)]
    pub quantity: i64,
    #[serde(default)]
    pub discount: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutReq {
    /// Defaults to the caller's location
    pub location_id: Option<u64>,
    pub lines: Vec<CheckoutLine>,
    pub payment_method: PaymentMethod,
    /// Cash handed over; required for cash
    pub tendered: Option<f64>,
    pub customer_id: Option<u64>,
    #[serde(default)]
    pub notes: String,
    /// Client generated id; repeating it returns the original sale
    pub pos_transaction_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReturnLine {
    pub sale_item_id: u64,
    pub quantity: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReturnReq {
    pub items: Vec<ReturnLine>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SaleQuery {
    pub location_id: Option<u64>,
    pub staff_id: Option<u64>,
    pub payment_method: Option<PaymentMethod>,
    pub status: Option<SaleStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Receipt number
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl SaleQuery {
    pub(crate) fn to_filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::new();
        filter
            .and_eq("location_id", self.location_id)
            .and_eq("staff_id", self.staff_id)
            .and_eq("payment_method", self.payment_method.map(|m| m.to_string()))
            .and_eq("status", self.status.map(|s| s.to_string()))
            .and_search(&["receipt_number"], self.search.as_deref());
        if let Some(from) = self.from {
            filter.and("DATE(created_at) >= ?", from);
        }
        if let Some(to) = self.to {
            filter.and("DATE(created_at) <= ?", to);
        }
        filter
    }
}

pub(crate) async fn fetch_sale_with_items(
    conn: &mut MySqlConnection,
    sale_id: u64,
    lock: bool,
) -> ApiResult<SaleWithItems> {
    let suffix = if lock { " FOR UPDATE" } else { "" };

    let sale = sqlx::query_as::<_, Sale>(&format!(
        "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?{suffix}"
    ))
    .bind(sale_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Sale"))?;

    let items = sqlx::query_as::<_, SaleItem>(&format!(
        "SELECT {SALE_ITEM_COLUMNS} FROM sale_items WHERE sale_id = ? ORDER BY id{suffix}"
    ))
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(SaleWithItems { sale, items })
}

async fn sale_id_for_transaction(pool: &MySqlPool, txn_id: &str) -> ApiResult<Option<u64>> {
    // a filter miss is definitive, a hit still needs the database
    if !txn_filter::might_exist(SyncKind::Sale, txn_id) {
        return Ok(None);
    }
    Ok(
        sqlx::query_scalar::<_, u64>("SELECT id FROM sales WHERE pos_transaction_id = ?")
            .bind(txn_id)
            .fetch_optional(pool)
            .await?,
    )
}

/// Prices a cart without touching the database.
#[utoipa::path(
    post,
    path = "/api/pos/quote",
    request_body = QuoteReq,
    responses(
        (status = 200, description = "Cart totals", body = Quote),
        (status = 400, description = "Empty cart, bad quantity or discount")
    ),
    security(("bearer_auth" = [])),
    tag = "POS"
)]
pub async fn quote_cart(
    _auth: AuthUser,
    config: web::Data<Config>,
    payload: web::Json<QuoteReq>,
) -> ApiResult<HttpResponse> {
    let quote = quote(&payload.lines, config.policy.vat_rate)?;
    Ok(HttpResponse::Ok().json(quote))
}

#[utoipa::path(
    post,
    path = "/api/pos/checkout",
    request_body = CheckoutReq,
    responses(
        (status = 201, description = "Sale recorded", body = SaleWithItems),
        (status = 200, description = "Sale already recorded for this transaction id", body = SaleWithItems),
        (status = 400, description = "Invalid cart or insufficient cash"),
        (status = 409, description = "Insufficient stock", body = Object, example = json!({
            "code": "CONFLICT", "message": "Insufficient stock for SKU BEV-COLA-500"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "POS"
)]
pub async fn checkout(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CheckoutReq>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;

    let location_id = payload
        .location_id
        .or(auth.location_id)
        .ok_or_else(|| ApiError::validation("location_id is required"))?;

    if let Some(txn_id) = payload.pos_transaction_id.as_deref()
        && let Some(sale_id) = sale_id_for_transaction(pool.get_ref(), txn_id).await?
    {
        let mut conn = pool.acquire().await?;
        let existing = fetch_sale_with_items(&mut conn, sale_id, false).await?;
        return Ok(HttpResponse::Ok().json(existing));
    }

    if payload.lines.is_empty() {
        return Err(ApiError::validation("Cart is empty"));
    }

    // Price from the catalogue, never from the client
    let ids: Vec<String> = payload.lines.iter().map(|l| l.product_id.to_string()).collect();
    let products: HashMap<u64, Product> = sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products p WHERE p.is_active = TRUE AND p.id IN ({})",
        product_columns(Some(location_id)),
        ids.join(", ")
    ))
    .fetch_all(pool.get_ref())
    .await?
    .into_iter()
    .map(|p| (p.id, p))
    .collect();

    let lines = payload
        .lines
        .iter()
        .map(|l| {
            products
                .get(&l.product_id)
                .map(|p| CartLine::priced(p, l.quantity, l.discount))
                .ok_or_else(|| ApiError::not_found(&format!("Product {}", l.product_id)))
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let quote = quote(&lines, config.policy.vat_rate)?;
    let settlement = settle(payload.payment_method, quote.total, payload.tendered)?;

    let now = Utc::now();
    let sale = build_sale(
        SaleHeader {
            pos_transaction_id: payload
                .pos_transaction_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            receipt_number: receipt_number(now.timestamp_millis()),
            location_id,
            customer_id: payload.customer_id,
            staff_id: auth.user_id,
            staff_name: auth.username.clone(),
            payment_method: payload.payment_method,
            notes: payload.notes.clone(),
            created_at: Local::now().naive_local(),
        },
        &quote,
        settlement,
    );

    let mut tx = pool.begin().await?;
    let sale_id = insert_sale(&mut *tx, &sale, Some(auth.user_id), false).await?;
    let recorded = fetch_sale_with_items(&mut *tx, sale_id, false).await?;
    tx.commit().await.map_err(|e| {
        error!(error = %e, receipt = %sale.receipt_number, "Checkout commit failed");
        ApiError::from(e)
    })?;

    txn_filter::insert(SyncKind::Sale, &sale.pos_transaction_id);
    product_cache::invalidate_products(&products.keys().copied().collect::<Vec<_>>());

    info!(
        sale_id,
        receipt = %sale.receipt_number,
        total = sale.total_amount,
        location_id,
        "Sale completed"
    );

    Ok(HttpResponse::Created().json(recorded))
}

/// Refund value of `quantity` units of a sold line.
fn refund_value(item: &SaleItem, quantity: i64) -> f64 {
    if item.quantity == 0 {
        return 0.0;
    }
    round2(item.total_price / item.quantity as f64 * quantity as f64)
}

#[utoipa::path(
    post,
    path = "/api/pos/sales/{sale_id}/return",
    params(("sale_id" = u64, Path, description = "Sale ID")),
    request_body = ReturnReq,
    responses(
        (status = 200, description = "Items returned", body = Object, example = json!({
            "message": "Return recorded", "status": "partial_return", "refund": 700.0
        })),
        (status = 400, description = "Sale cannot be returned or quantity too large")
    ),
    security(("bearer_auth" = [])),
    tag = "POS"
)]
pub async fn return_sale(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ReturnReq>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;
    let sale_id = path.into_inner();

    if payload.items.is_empty() {
        return Err(ApiError::validation("Nothing to return"));
    }

    let mut tx = pool.begin().await?;
    let SaleWithItems { sale, mut items } = fetch_sale_with_items(&mut *tx, sale_id, true).await?;

    if sale.status != SaleStatus::Completed.as_ref()
        && sale.status != SaleStatus::PartialReturn.as_ref()
    {
        return Err(ApiError::validation(format!(
            "A {} sale cannot be returned",
            sale.status
        )));
    }

    let now = Local::now().naive_local();
    let mut refund = 0.0;
    let mut touched = Vec::new();

    for line in &payload.items {
        let item = items
            .iter_mut()
            .find(|i| i.id == line.sale_item_id)
            .ok_or_else(|| ApiError::not_found(&format!("Sale item {}", line.sale_item_id)))?;

        let returnable = item.quantity - item.returned_quantity;
        if line.quantity <= 0 || line.quantity > returnable {
            return Err(ApiError::validation(format!(
                "Can return between 1 and {returnable} of {}",
                item.sku
            )));
        }

        sqlx::query("UPDATE sale_items SET returned_quantity = returned_quantity + ? WHERE id = ?")
            .bind(line.quantity)
            .bind(item.id)
            .execute(&mut *tx)
            .await?;
        item.returned_quantity += line.quantity;

        apply_movement(
            &mut *tx,
            &NewMovement {
                uuid: None,
                product_id: item.product_id,
                movement_type: MovementType::Return,
                from_location_id: None,
                to_location_id: Some(sale.location_id),
                quantity: line.quantity,
                unit_cost: item.cost_price,
                reference: &sale.receipt_number,
                reason: &payload.reason,
                created_by: Some(auth.user_id),
                created_at: now,
            },
            true,
        )
        .await?;

        refund += refund_value(item, line.quantity);
        touched.push(item.product_id);
    }

    let status = if items.iter().all(|i| i.returned_quantity >= i.quantity) {
        SaleStatus::Returned
    } else {
        SaleStatus::PartialReturn
    };

    sqlx::query("UPDATE sales SET status = ? WHERE id = ?")
        .bind(status.as_ref())
        .bind(sale_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    product_cache::invalidate_products(&touched);

    let refund = round2(refund);
    info!(sale_id, status = %status, refund, "Return recorded");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Return recorded",
        "status": status,
        "refund": refund
    })))
}

#[utoipa::path(
    get,
    path = "/api/pos/sales",
    params(SaleQuery),
    responses((status = 200, description = "Paginated sales")),
    security(("bearer_auth" = [])),
    tag = "POS"
)]
pub async fn list_sales(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SaleQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;

    let page = fetch_page::<Sale>(
        pool.get_ref(),
        SALE_COLUMNS,
        "FROM sales",
        &query.to_filter(),
        "created_at DESC, id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/pos/sales/{sale_id}",
    params(("sale_id" = u64, Path, description = "Sale ID")),
    responses(
        (status = 200, description = "Sale with items", body = SaleWithItems),
        (status = 404, description = "Sale not found")
    ),
    security(("bearer_auth" = [])),
    tag = "POS"
)]
pub async fn get_sale(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;
    let mut conn = pool.acquire().await?;
    let sale = fetch_sale_with_items(&mut conn, path.into_inner(), false).await?;
    Ok(HttpResponse::Ok().json(sale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::jwt::test_bearer, model::role::Role};
    use actix_web::{App, http::StatusCode, test as actix_test};

    fn item(quantity: i64, total_price: f64) -> SaleItem {
        SaleItem {
            id: 1,
            sale_id: 1,
            product_id: 1,
            product_name: "Cola".into(),
            sku: "COLA".into(),
            category: "Drinks".into(),
            quantity,
            returned_quantity: 0,
            unit_price: 10.0,
            cost_price: 6.0,
            discount_amount: 0.0,
            tax_amount: 0.0,
            total_price,
        }
    }

    #[test]
    fn refund_is_proportional_to_the_line() {
        assert_eq!(refund_value(&item(4, 46.6), 1), 11.65);
        assert_eq!(refund_value(&item(4, 46.6), 4), 46.6);
        assert_eq!(refund_value(&item(0, 0.0), 1), 0.0);
    }

    #[test]
    fn sale_filter_uses_business_dates() {
        let query = SaleQuery {
            location_id: Some(2),
            staff_id: None,
            payment_method: Some(PaymentMethod::MobileMoney),
            status: None,
            from: NaiveDate::from_ymd_opt(2026, 1, 1),
            to: None,
            search: None,
            page: None,
            per_page: None,
        };
        assert_eq!(
            query.to_filter().where_clause(),
            "WHERE location_id = ? AND payment_method = ? AND DATE(created_at) >= ?"
        );
    }

    #[actix_web::test]
    async fn quote_endpoint_prices_the_cart() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(Config::for_tests()))
                .route("/api/pos/quote", web::post().to(quote_cart)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/pos/quote")
            .insert_header(("Authorization", test_bearer(Role::Cashier, Some(1))))
            .set_json(json!({
                "lines": [{"product_id": 1, "unit_price": 10.0, "quantity": 3}]
            }))
            .to_request();

        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["subtotal"], 30.0);
        assert_eq!(body["tax_total"], 4.95);
        assert_eq!(body["total"], 34.95);
    }

    #[actix_web::test]
    async fn quote_endpoint_rejects_empty_cart() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(Config::for_tests()))
                .route("/api/pos/quote", web::post().to(quote_cart)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/pos/quote")
            .insert_header(("Authorization", test_bearer(Role::Cashier, Some(1))))
            .set_json(json!({ "lines": [] }))
            .to_request();

        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn quote_endpoint_needs_a_token() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(Config::for_tests()))
                .route("/api/pos/quote", web::post().to(quote_cart)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/pos/quote")
            .set_json(json!({ "lines": [] }))
            .to_request();

        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
