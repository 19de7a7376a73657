use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::location::fetch_location,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::stock::{MovementType, StockTake, StockTakeItem, StockTakeStatus, StockTakeWithItems},
    service::inventory::{StockTakeSummary, adjustment_for, count_difference, stock_take_summary},
    utils::{
        db_utils::{PageRequest, SqlFilter, fetch_page},
        product_cache,
        stock_db::{NewMovement, record_movement, set_stock},
    },
};

const TAKE_COLUMNS: &str =
    "id, uuid, reference, location_id, status, notes, counted_by, created_at, completed_at";
const TAKE_ITEM_COLUMNS: &str = "id, stock_take_id, product_id, system_quantity, \
    physical_quantity, difference, unit_cost, adjustment_value";

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartStockTake {
    pub location_id: u64,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct Count {
    pub product_id: u64,
    #[schema(example = 18)]
    pub physical_quantity: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordCounts {
    pub counts: Vec<Count>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StockTakeQuery {
    pub location_id: Option<u64>,
    pub status: Option<StockTakeStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockTakeReport {
    #[serde(flatten)]
    pub stock_take: StockTake,
    pub summary: StockTakeSummary,
}

/// Creates the header row, referenced `ST-<date>-<seq>`.
pub(crate) async fn insert_stock_take(
    conn: &mut MySqlConnection,
    uuid: Option<&str>,
    location_id: u64,
    notes: &str,
    counted_by: Option<u64>,
    created_at: NaiveDateTime,
) -> ApiResult<(u64, String)> {
    let date = created_at.date();
    let seq = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM stock_takes WHERE DATE(created_at) = ?",
    )
    .bind(date)
    .fetch_one(&mut *conn)
    .await?;
    let reference = format!("ST-{}-{:04}", date.format("%Y%m%d"), seq + 1);

    let result = sqlx::query(
        r#"
        INSERT INTO stock_takes (uuid, reference, location_id, status, notes, counted_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid)
    .bind(&reference)
    .bind(location_id)
    .bind(StockTakeStatus::Draft.as_ref())
    .bind(notes)
    .bind(counted_by)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    Ok((result.last_insert_id(), reference))
}

/// Books an adjustment movement for every changed item and sets location
/// stock to the physical count, then closes the take.
pub(crate) async fn apply_counts(
    conn: &mut MySqlConnection,
    take: &StockTake,
    items: &[StockTakeItem],
    user_id: Option<u64>,
    now: NaiveDateTime,
) -> ApiResult<()> {
    for item in items {
        let Some(adjustment) = adjustment_for(item, take.location_id) else {
            continue;
        };
        record_movement(
            &mut *conn,
            &NewMovement {
                uuid: None,
                product_id: adjustment.product_id,
                movement_type: MovementType::Adjustment,
                from_location_id: adjustment.from_location_id,
                to_location_id: adjustment.to_location_id,
                quantity: adjustment.quantity,
                unit_cost: adjustment.unit_cost,
                reference: &take.reference,
                reason: "Stock take",
                created_by: user_id,
                created_at: now,
            },
        )
        .await?;
        set_stock(&mut *conn, take.location_id, item.product_id, item.physical_quantity).await?;
    }

    sqlx::query("UPDATE stock_takes SET status = ?, completed_at = ? WHERE id = ?")
        .bind(StockTakeStatus::Completed.as_ref())
        .bind(now)
        .bind(take.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn fetch_stock_take(
    conn: &mut MySqlConnection,
    take_id: u64,
    lock: bool,
) -> ApiResult<StockTakeWithItems> {
    let suffix = if lock { " FOR UPDATE" } else { "" };
    let stock_take = sqlx::query_as::<_, StockTake>(&format!(
        "SELECT {TAKE_COLUMNS} FROM stock_takes WHERE id = ?{suffix}"
    ))
    .bind(take_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Stock take"))?;

    let items = sqlx::query_as::<_, StockTakeItem>(&format!(
        "SELECT {TAKE_ITEM_COLUMNS} FROM stock_take_items WHERE stock_take_id = ? ORDER BY product_id{suffix}"
    ))
    .bind(take_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(StockTakeWithItems { stock_take, items })
}

fn ensure_draft(take: &StockTake) -> ApiResult<()> {
    if take.status != StockTakeStatus::Draft.as_ref() {
        return Err(ApiError::validation(format!(
            "Stock take {} is {} and can no longer change",
            take.reference, take.status
        )));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/stock-take",
    request_body = StartStockTake,
    responses(
        (status = 201, description = "Draft stock take with a system snapshot", body = Object, example = json!({
            "message": "Stock take started", "id": 4, "reference": "ST-20260101-0001", "items": 120
        })),
        (status = 404, description = "Location not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Stock Take"
)]
pub async fn start_stock_take(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<StartStockTake>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    fetch_location(pool.get_ref(), payload.location_id).await?;

    let mut tx = pool.begin().await?;
    let (id, reference) = insert_stock_take(
        &mut *tx,
        None,
        payload.location_id,
        payload.notes.trim(),
        Some(auth.user_id),
        Local::now().naive_local(),
    )
    .await?;

    // Physical starts equal to system so uncounted lines do not adjust
    let snapshot = sqlx::query(
        r#"
        INSERT INTO stock_take_items
        (stock_take_id, product_id, system_quantity, physical_quantity, difference, unit_cost, adjustment_value)
        SELECT ?, p.id, COALESCE(ls.quantity, 0), COALESCE(ls.quantity, 0), 0, p.cost_price, 0
        FROM products p
        LEFT JOIN location_stock ls ON ls.product_id = p.id AND ls.location_id = ?
        WHERE p.is_active = TRUE
        "#,
    )
    .bind(id)
    .bind(payload.location_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(
        stock_take_id = id,
        reference = %reference,
        location_id = payload.location_id,
        items = snapshot.rows_affected(),
        "Stock take started"
    );

    Ok(HttpResponse::Created().json(json!({
        "message": "Stock take started",
        "id": id,
        "reference": reference,
        "items": snapshot.rows_affected()
    })))
}

#[utoipa::path(
    put,
    path = "/api/stock-take/{stock_take_id}/counts",
    params(("stock_take_id" = u64, Path, description = "Stock take ID")),
    request_body = RecordCounts,
    responses(
        (status = 200, description = "Counts recorded", body = StockTakeWithItems),
        (status = 400, description = "Negative count, unknown product or completed take")
    ),
    security(("bearer_auth" = [])),
    tag = "Stock Take"
)]
pub async fn record_counts(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RecordCounts>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;
    let take_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let StockTakeWithItems { stock_take, items } = fetch_stock_take(&mut *tx, take_id, true).await?;
    ensure_draft(&stock_take)?;

    for count in &payload.counts {
        let item = items
            .iter()
            .find(|i| i.product_id == count.product_id)
            .ok_or_else(|| {
                ApiError::validation(format!(
                    "Product {} is not part of this stock take",
                    count.product_id
                ))
            })?;
        let (difference, adjustment_value) =
            count_difference(item.system_quantity, count.physical_quantity, item.unit_cost)?;

        sqlx::query(
            "UPDATE stock_take_items SET physical_quantity = ?, difference = ?, adjustment_value = ? WHERE id = ?",
        )
        .bind(count.physical_quantity)
        .bind(difference)
        .bind(adjustment_value)
        .bind(item.id)
        .execute(&mut *tx)
        .await?;
    }

    let updated = fetch_stock_take(&mut *tx, take_id, false).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    get,
    path = "/api/stock-take/{stock_take_id}/summary",
    params(("stock_take_id" = u64, Path, description = "Stock take ID")),
    responses((status = 200, description = "Differences so far", body = StockTakeReport)),
    security(("bearer_auth" = [])),
    tag = "Stock Take"
)]
pub async fn get_summary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;
    let mut conn = pool.acquire().await?;
    let StockTakeWithItems { stock_take, items } =
        fetch_stock_take(&mut conn, path.into_inner(), false).await?;

    Ok(HttpResponse::Ok().json(StockTakeReport {
        summary: stock_take_summary(&items),
        stock_take,
    }))
}

#[utoipa::path(
    put,
    path = "/api/stock-take/{stock_take_id}/complete",
    params(("stock_take_id" = u64, Path, description = "Stock take ID")),
    responses(
        (status = 200, description = "Adjustments booked", body = StockTakeReport),
        (status = 400, description = "Stock take already completed")
    ),
    security(("bearer_auth" = [])),
    tag = "Stock Take"
)]
pub async fn complete_stock_take(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let take_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let StockTakeWithItems { mut stock_take, items } =
        fetch_stock_take(&mut *tx, take_id, true).await?;
    ensure_draft(&stock_take)?;

    let now = Local::now().naive_local();
    apply_counts(&mut *tx, &stock_take, &items, Some(auth.user_id), now).await?;
    tx.commit().await?;

    let summary = stock_take_summary(&items);
    let changed: Vec<u64> = items
        .iter()
        .filter(|i| i.difference != 0)
        .map(|i| i.product_id)
        .collect();
    product_cache::invalidate_products(&changed);

    info!(
        stock_take_id = take_id,
        changed = summary.changed_items,
        value = summary.total_adjustment_value,
        "Stock take completed"
    );

    stock_take.status = StockTakeStatus::Completed.to_string();
    stock_take.completed_at = Some(now);
    Ok(HttpResponse::Ok().json(StockTakeReport { stock_take, summary }))
}

#[utoipa::path(
    get,
    path = "/api/stock-take",
    params(StockTakeQuery),
    responses((status = 200, description = "Paginated stock takes")),
    security(("bearer_auth" = [])),
    tag = "Stock Take"
)]
pub async fn list_stock_takes(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<StockTakeQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;

    let mut filter = SqlFilter::new();
    filter
        .and_eq("location_id", query.location_id)
        .and_eq("status", query.status.map(|s| s.to_string()));

    let page = fetch_page::<StockTake>(
        pool.get_ref(),
        TAKE_COLUMNS,
        "FROM stock_takes",
        &filter,
        "created_at DESC, id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/stock-take/{stock_take_id}",
    params(("stock_take_id" = u64, Path, description = "Stock take ID")),
    responses(
        (status = 200, description = "Stock take with items", body = StockTakeWithItems),
        (status = 404, description = "Stock take not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Stock Take"
)]
pub async fn get_stock_take(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;
    let mut conn = pool.acquire().await?;
    let take = fetch_stock_take(&mut conn, path.into_inner(), false).await?;
    Ok(HttpResponse::Ok().json(take))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(status: &str) -> StockTake {
        StockTake {
            id: 1,
            uuid: None,
            reference: "ST-20260101-0001".into(),
            location_id: 2,
            status: status.into(),
            notes: String::new(),
            counted_by: None,
            created_at: NaiveDateTime::default(),
            completed_at: None,
        }
    }

    #[test]
    fn completed_takes_are_frozen() {
        assert!(ensure_draft(&take("draft")).is_ok());
        assert!(ensure_draft(&take("completed")).is_err());
    }
}
