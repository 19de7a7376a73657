use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::customer::{CrmLog, Customer, CustomerStatus, LogType},
    service::round2,
    utils::db_utils::{
        PageRequest, SqlFilter, build_update_sql, check_enum_field, execute_update, fetch_page,
    },
};

pub(crate) const CUSTOMER_COLUMNS: &str =
    "id, name, email, phone, address, status, tags, notes, last_contacted_at, created_at";

const UPDATABLE: &[&str] = &["name", "email", "phone", "address", "status", "tags", "notes"];

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCustomer {
    #[schema(example = "Acme Traders")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    pub status: Option<CustomerStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CustomerQuery {
    pub status: Option<CustomerStatus>,
    /// Name, email or phone
    pub search: Option<String>,
    pub tag: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl CustomerQuery {
    fn to_filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::new();
        filter
            .and_eq("status", self.status.map(|s| s.to_string()))
            .and_search(&["name", "email", "phone"], self.search.as_deref());
        if let Some(tag) = self.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            filter.and("FIND_IN_SET(?, tags) > 0", tag);
        }
        filter
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogInteraction {
    pub log_type: LogType,
    #[schema(example = "Called about the April order")]
    pub content: String,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct CustomerPurchases {
    pub sale_count: i64,
    pub total_spent: f64,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_purchase: Option<NaiveDateTime>,
}

/// Tags are stored comma separated; blanks and duplicates are dropped.
fn join_tags(tags: &[String]) -> String {
    let mut cleaned: Vec<&str> = Vec::new();
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !cleaned.contains(&tag) {
            cleaned.push(tag);
        }
    }
    cleaned.join(",")
}

pub(crate) async fn fetch_customer(pool: &MySqlPool, customer_id: u64) -> ApiResult<Customer> {
    sqlx::query_as::<_, Customer>(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?"
    ))
    .bind(customer_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Customer"))
}

#[utoipa::path(
    post,
    path = "/api/customer",
    request_body = CreateCustomer,
    responses(
        (status = 201, description = "Customer created", body = Object, example = json!({
            "message": "Customer created", "id": 14
        })),
        (status = 400, description = "Name missing")
    ),
    security(("bearer_auth" = [])),
    tag = "Customer"
)]
pub async fn create_customer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateCustomer>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;

    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("Customer name is required"));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO customers (name, email, phone, address, status, tags, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.email.trim())
    .bind(payload.phone.trim())
    .bind(payload.address.trim())
    .bind(payload.status.unwrap_or(CustomerStatus::Lead).as_ref())
    .bind(join_tags(&payload.tags))
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await?;

    info!(customer_id = result.last_insert_id(), "Customer created");
    Ok(HttpResponse::Created().json(json!({
        "message": "Customer created",
        "id": result.last_insert_id()
    })))
}

#[utoipa::path(
    get,
    path = "/api/customer",
    params(CustomerQuery),
    responses((status = 200, description = "Paginated customers")),
    security(("bearer_auth" = [])),
    tag = "Customer"
)]
pub async fn list_customers(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CustomerQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;

    let page = fetch_page::<Customer>(
        pool.get_ref(),
        CUSTOMER_COLUMNS,
        "FROM customers",
        &query.to_filter(),
        "name",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/customer/{customer_id}",
    params(("customer_id" = u64, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer", body = Customer),
        (status = 404, description = "Customer not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Customer"
)]
pub async fn get_customer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;
    Ok(HttpResponse::Ok().json(fetch_customer(pool.get_ref(), path.into_inner()).await?))
}

/// Partial update. `tags` may be sent as an array and is stored joined.
#[utoipa::path(
    put,
    path = "/api/customer/{customer_id}",
    params(("customer_id" = u64, Path, description = "Customer ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Customer updated"),
        (status = 400, description = "Unknown field or bad status")
    ),
    security(("bearer_auth" = [])),
    tag = "Customer"
)]
pub async fn update_customer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;
    let customer_id = path.into_inner();

    let mut body = body.into_inner();
    if let Some(tags) = body.get("tags").and_then(Value::as_array) {
        let tags: Vec<String> = tags
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        body["tags"] = Value::String(join_tags(&tags));
    }

    check_enum_field::<CustomerStatus>(&body, "status")?;
    let update = build_update_sql("customers", &body, UPDATABLE, customer_id)?;
    if execute_update(pool.get_ref(), update).await? == 0 {
        fetch_customer(pool.get_ref(), customer_id).await?;
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Customer updated" })))
}

#[utoipa::path(
    delete,
    path = "/api/customer/{customer_id}",
    params(("customer_id" = u64, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer deleted"),
        (status = 404, description = "Customer not found"),
        (status = 409, description = "Customer has quotations or invoices")
    ),
    security(("bearer_auth" = [])),
    tag = "Customer"
)]
pub async fn delete_customer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;
    let customer_id = path.into_inner();

    let documents = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT (SELECT COUNT(*) FROM quotations WHERE customer_id = ?)
             + (SELECT COUNT(*) FROM invoices WHERE customer_id = ?)
        "#,
    )
    .bind(customer_id)
    .bind(customer_id)
    .fetch_one(pool.get_ref())
    .await?;
    if documents > 0 {
        return Err(ApiError::conflict(
            "Customer has quotations or invoices; mark it inactive instead",
        ));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM crm_logs WHERE customer_id = ?")
        .bind(customer_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM customers WHERE id = ?")
        .bind(customer_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Customer"));
    }
    tx.commit().await?;

    info!(customer_id, "Customer deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Customer deleted" })))
}

#[utoipa::path(
    post,
    path = "/api/customer/{customer_id}/logs",
    params(("customer_id" = u64, Path, description = "Customer ID")),
    request_body = LogInteraction,
    responses(
        (status = 201, description = "Interaction logged"),
        (status = 404, description = "Customer not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Customer"
)]
pub async fn log_interaction(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<LogInteraction>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;
    let customer_id = path.into_inner();

    if payload.content.trim().is_empty() {
        return Err(ApiError::validation("Log content is required"));
    }
    fetch_customer(pool.get_ref(), customer_id).await?;

    let now = Local::now().naive_local();
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "INSERT INTO crm_logs (customer_id, author_id, log_type, content, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(customer_id)
    .bind(auth.user_id)
    .bind(payload.log_type.as_ref())
    .bind(payload.content.trim())
    .bind(now)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE customers SET last_contacted_at = ? WHERE id = ?")
        .bind(now)
        .bind(customer_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Interaction logged",
        "id": result.last_insert_id()
    })))
}

#[utoipa::path(
    get,
    path = "/api/customer/{customer_id}/logs",
    params(("customer_id" = u64, Path, description = "Customer ID")),
    responses((status = 200, description = "Interactions, newest first", body = [CrmLog])),
    security(("bearer_auth" = [])),
    tag = "Customer"
)]
pub async fn customer_logs(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;

    let logs = sqlx::query_as::<_, CrmLog>(
        "SELECT id, customer_id, author_id, log_type, content, created_at FROM crm_logs \
         WHERE customer_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(logs))
}

#[utoipa::path(
    get,
    path = "/api/customer/{customer_id}/purchases",
    params(("customer_id" = u64, Path, description = "Customer ID")),
    responses((status = 200, description = "POS purchase history summary", body = CustomerPurchases)),
    security(("bearer_auth" = [])),
    tag = "Customer"
)]
pub async fn customer_purchases(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_sales()?;
    let customer_id = path.into_inner();
    fetch_customer(pool.get_ref(), customer_id).await?;

    let mut purchases = sqlx::query_as::<_, CustomerPurchases>(
        r#"
        SELECT COUNT(*) AS sale_count,
               COALESCE(SUM(total_amount), 0) AS total_spent,
               MAX(created_at) AS last_purchase
        FROM sales
        WHERE customer_id = ? AND status IN ('completed', 'partial_return')
        "#,
    )
    .bind(customer_id)
    .fetch_one(pool.get_ref())
    .await?;
    purchases.total_spent = round2(purchases.total_spent);

    Ok(HttpResponse::Ok().json(purchases))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = vec![" vip".to_string(), "".into(), "wholesale".into(), "vip ".into()];
        assert_eq!(join_tags(&tags), "vip,wholesale");
        assert_eq!(join_tags(&[]), "");
    }

    #[test]
    fn tag_filter_uses_find_in_set() {
        let query = CustomerQuery {
            status: Some(CustomerStatus::Active),
            search: None,
            tag: Some("vip".into()),
            page: None,
            per_page: None,
        };
        assert_eq!(
            query.to_filter().where_clause(),
            "WHERE status = ? AND FIND_IN_SET(?, tags) > 0"
        );
    }
}
