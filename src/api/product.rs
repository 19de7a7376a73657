use actix_web::{HttpResponse, web};
use chrono::Local;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        product::{Category, LocationStockRow, Product},
        stock::MovementType,
    },
    utils::{
        db_utils::{PageRequest, SqlFilter, build_update_sql, execute_update, fetch_page},
        product_cache,
        stock_db::{NewMovement, apply_movement},
    },
};

const UPDATABLE: &[&str] = &[
    "sku",
    "name",
    "description",
    "category",
    "barcode",
    "cost_price",
    "selling_price",
    "taxable",
    "reorder_level",
    "is_active",
];

/// Stock expression: one location, or the sum over all of them.
fn stock_expr(location_id: Option<u64>) -> String {
    match location_id {
        Some(id) => format!(
            "COALESCE((SELECT ls.quantity FROM location_stock ls WHERE ls.product_id = p.id AND ls.location_id = {id}), 0)"
        ),
        None => "CAST(COALESCE((SELECT SUM(ls.quantity) FROM location_stock ls WHERE ls.product_id = p.id), 0) AS SIGNED)"
            .to_string(),
    }
}

/// Column list producing a [`Product`] row from `products p`.
pub(crate) fn product_columns(location_id: Option<u64>) -> String {
    format!(
        "p.id, p.sku, p.name, p.description, p.category, p.barcode, p.cost_price, \
         p.selling_price, p.taxable, p.reorder_level, p.is_active, {} AS stock_quantity, p.updated_at",
        stock_expr(location_id)
    )
}

pub(crate) async fn fetch_product(
    pool: &MySqlPool,
    product_id: u64,
    location_id: Option<u64>,
) -> ApiResult<Product> {
    sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products p WHERE p.id = ?",
        product_columns(location_id)
    ))
    .bind(product_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Product"))
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCategory {
    #[schema(example = "Beverages")]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, ToSchema)]
pub struct InitialStock {
    pub location_id: u64,
    #[schema(example = 48)]
    pub quantity: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateProduct {
    #[schema(example = "BEV-COLA-500")]
    pub sku: String,
    #[schema(example = "Cola 500ml")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub barcode: Option<String>,
    #[schema(example = 450.0)]
    pub cost_price: f64,
    #[schema(example = 700.0)]
    pub selling_price: f64,
    #[serde(default = "default_taxable")]
    pub taxable: bool,
    #[serde(default = "default_reorder_level")]
    pub reorder_level: i64,
    pub initial_stock: Option<InitialStock>,
}

fn default_taxable() -> bool {
    true
}

fn default_reorder_level() -> i64 {
    10
}

#[derive(Deserialize, IntoParams)]
pub struct ProductQuery {
    pub category: Option<String>,
    /// Name, SKU or barcode
    pub search: Option<String>,
    /// Resolve stock at this location instead of the total
    pub location_id: Option<u64>,
    #[serde(default)]
    pub low_stock: bool,
    #[serde(default)]
    pub include_inactive: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct LookupQuery {
    /// Barcode or SKU
    pub code: String,
    /// Defaults to the caller's location
    pub location_id: Option<u64>,
}

fn check_prices(cost: Option<f64>, price: Option<f64>) -> ApiResult<()> {
    if cost.is_some_and(|c| c < 0.0) || price.is_some_and(|p| p < 0.0) {
        return Err(ApiError::validation("Prices cannot be negative"));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/product/category",
    request_body = CreateCategory,
    responses(
        (status = 201, description = "Category created"),
        (status = 409, description = "Category already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Product"
)]
pub async fn create_category(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateCategory>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("Category name is required"));
    }

    let result = sqlx::query("INSERT INTO categories (name, description) VALUES (?, ?)")
        .bind(payload.name.trim())
        .bind(&payload.description)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Category created",
        "id": result.last_insert_id()
    })))
}

#[utoipa::path(
    get,
    path = "/api/product/category",
    responses((status = 200, description = "Categories", body = [Category])),
    security(("bearer_auth" = [])),
    tag = "Product"
)]
pub async fn list_categories(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> ApiResult<HttpResponse> {
    let categories =
        sqlx::query_as::<_, Category>("SELECT id, name, description FROM categories ORDER BY name")
            .fetch_all(pool.get_ref())
            .await?;
    Ok(HttpResponse::Ok().json(categories))
}

#[utoipa::path(
    post,
    path = "/api/product",
    request_body = CreateProduct,
    responses(
        (status = 201, description = "Product created", body = Object, example = json!({
            "message": "Product created", "id": 7
        })),
        (status = 400, description = "Invalid prices or stock"),
        (status = 409, description = "SKU already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Product"
)]
pub async fn create_product(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateProduct>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    if payload.sku.trim().is_empty() || payload.name.trim().is_empty() {
        return Err(ApiError::validation("SKU and name are required"));
    }
    check_prices(Some(payload.cost_price), Some(payload.selling_price))?;
    if payload.reorder_level < 0 {
        return Err(ApiError::validation("Reorder level cannot be negative"));
    }
    if payload.initial_stock.as_ref().is_some_and(|s| s.quantity < 0) {
        return Err(ApiError::validation("Initial stock cannot be negative"));
    }

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO products
        (sku, name, description, category, barcode, cost_price, selling_price, taxable, reorder_level)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.sku.trim())
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(payload.category.trim())
    .bind(payload.barcode.as_deref().map(str::trim).filter(|b| !b.is_empty()))
    .bind(payload.cost_price)
    .bind(payload.selling_price)
    .bind(payload.taxable)
    .bind(payload.reorder_level)
    .execute(&mut *tx)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict(format!("SKU {} already exists", payload.sku)),
        other => other,
    })?;

    let product_id = result.last_insert_id();

    if let Some(stock) = payload.initial_stock.as_ref().filter(|s| s.quantity > 0) {
        apply_movement(
            &mut tx,
            &NewMovement {
                uuid: None,
                product_id,
                movement_type: MovementType::StockIn,
                from_location_id: None,
                to_location_id: Some(stock.location_id),
                quantity: stock.quantity,
                unit_cost: payload.cost_price,
                reference: "OPENING",
                reason: "Initial stock",
                created_by: Some(auth.user_id),
                created_at: Local::now().naive_local(),
            },
            false,
        )
        .await?;
    }

    tx.commit().await.map_err(|e| {
        error!(error = %e, sku = %payload.sku, "Create product failed");
        ApiError::from(e)
    })?;

    info!(product_id, sku = %payload.sku, "Product created");

    Ok(HttpResponse::Created().json(json!({
        "message": "Product created",
        "id": product_id
    })))
}

#[utoipa::path(
    get,
    path = "/api/product",
    params(ProductQuery),
    responses((status = 200, description = "Paginated products")),
    security(("bearer_auth" = [])),
    tag = "Product"
)]
pub async fn list_products(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ProductQuery>,
) -> ApiResult<HttpResponse> {
    let mut filter = SqlFilter::new();
    filter
        .and_eq("p.category", query.category.as_deref())
        .and_search(&["p.name", "p.sku", "p.barcode"], query.search.as_deref());
    if !query.include_inactive {
        filter.and_raw("p.is_active = TRUE");
    }
    if query.low_stock {
        filter.and_raw(&format!(
            "{} <= p.reorder_level",
            stock_expr(query.location_id)
        ));
    }

    let page = fetch_page::<Product>(
        pool.get_ref(),
        &product_columns(query.location_id),
        "FROM products p",
        &filter,
        "p.name",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[derive(Deserialize, IntoParams)]
pub struct AtLocation {
    pub location_id: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/product/{product_id}",
    params(("product_id" = u64, Path, description = "Product ID"), AtLocation),
    responses(
        (status = 200, description = "Product", body = Product),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Product"
)]
pub async fn get_product(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<AtLocation>,
) -> ApiResult<HttpResponse> {
    let product = fetch_product(pool.get_ref(), path.into_inner(), query.location_id).await?;
    Ok(HttpResponse::Ok().json(product))
}

#[utoipa::path(
    put,
    path = "/api/product/{product_id}",
    params(("product_id" = u64, Path, description = "Product ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Product updated"),
        (status = 400, description = "Unknown field or negative price"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Product"
)]
pub async fn update_product(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let product_id = path.into_inner();

    check_prices(
        body.get("cost_price").and_then(Value::as_f64),
        body.get("selling_price").and_then(Value::as_f64),
    )?;

    let update = build_update_sql("products", &body, UPDATABLE, product_id)?;
    if execute_update(pool.get_ref(), update).await? == 0 {
        fetch_product(pool.get_ref(), product_id, None).await?;
    }

    product_cache::invalidate_products(&[product_id]);

    Ok(HttpResponse::Ok().json(json!({ "message": "Product updated" })))
}

/// Till scan: barcode first, then SKU. Answers from cache when it can.
#[utoipa::path(
    get,
    path = "/api/product/lookup",
    params(LookupQuery),
    responses(
        (status = 200, description = "Product with stock at the location", body = Product),
        (status = 404, description = "No active product with that code")
    ),
    security(("bearer_auth" = [])),
    tag = "Product"
)]
pub async fn lookup(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LookupQuery>,
) -> ApiResult<HttpResponse> {
    let code = query.code.trim();
    if code.is_empty() {
        return Err(ApiError::validation("A barcode or SKU is required"));
    }
    let location_id = query
        .location_id
        .or(auth.location_id)
        .ok_or_else(|| ApiError::validation("location_id is required"))?;

    if let Some(product) = product_cache::get(location_id, code).await {
        return Ok(HttpResponse::Ok().json(product));
    }

    let product = sqlx::query_as::<_, Product>(&format!(
        r#"
        SELECT {} FROM products p
        WHERE (p.barcode = ? OR p.sku = ?) AND p.is_active = TRUE
        ORDER BY p.barcode = ? DESC
        LIMIT 1
        "#,
        product_columns(Some(location_id))
    ))
    .bind(code)
    .bind(code)
    .bind(code)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Product"))?;

    product_cache::put(location_id, code, product.clone()).await;

    Ok(HttpResponse::Ok().json(product))
}

#[utoipa::path(
    get,
    path = "/api/product/{product_id}/stock",
    params(("product_id" = u64, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Quantity per location", body = Object, example = json!({
            "product_id": 7,
            "locations": [{"location_id": 1, "location_name": "Main", "quantity": 120}],
            "total": 120
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Product"
)]
pub async fn stock_by_location(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let product_id = path.into_inner();
    fetch_product(pool.get_ref(), product_id, None).await?;

    let rows = sqlx::query_as::<_, LocationStockRow>(
        r#"
        SELECT l.id AS location_id, l.name AS location_name, COALESCE(ls.quantity, 0) AS quantity
        FROM locations l
        LEFT JOIN location_stock ls ON ls.location_id = l.id AND ls.product_id = ?
        WHERE l.is_active = TRUE
        ORDER BY l.name
        "#,
    )
    .bind(product_id)
    .fetch_all(pool.get_ref())
    .await?;

    let total: i64 = rows.iter().map(|r| r.quantity).sum();

    Ok(HttpResponse::Ok().json(json!({
        "product_id": product_id,
        "locations": rows,
        "total": total
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_is_scoped_or_summed() {
        assert!(product_columns(Some(3)).contains("ls.location_id = 3"));
        assert!(product_columns(None).contains("SUM(ls.quantity)"));
    }

    #[test]
    fn negative_prices_are_rejected() {
        assert!(check_prices(Some(0.0), Some(10.0)).is_ok());
        assert!(check_prices(None, None).is_ok());
        assert!(check_prices(Some(-1.0), None).is_err());
        assert!(check_prices(None, Some(-0.01)).is_err());
    }
}
