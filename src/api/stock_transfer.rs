use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use std::str::FromStr;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::stock::{
        MovementType, StockTransfer, StockTransferItem, TransferStatus, TransferWithItems,
    },
    service::inventory::{
        TransferAction, TransferLine, ValuedTransferLine, next_transfer_status,
        prepare_transfer_lines,
    },
    utils::{
        db_utils::{PageRequest, SqlFilter, fetch_page},
        product_cache,
        stock_db::{NewMovement, add_stock, record_movement, remove_stock},
    },
};

const TRANSFER_COLUMNS: &str = "id, uuid, transfer_number, from_location_id, to_location_id, \
    status, notes, requested_by, created_at, completed_at";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTransfer {
    pub from_location_id: u64,
    pub to_location_id: u64,
    pub items: Vec<TransferLine>,
    #[serde(default)]
    pub notes: String,
    /// Skip the draft state and go straight to pending
    #[serde(default)]
    pub submit: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TransferQuery {
    pub status: Option<TransferStatus>,
    /// Matches either end of the transfer
    pub location_id: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// A transfer header about to be written.
pub(crate) struct NewTransfer<'a> {
    pub uuid: Option<&'a str>,
    pub from_location_id: u64,
    pub to_location_id: u64,
    pub status: TransferStatus,
    pub notes: &'a str,
    pub requested_by: Option<u64>,
    pub created_at: NaiveDateTime,
}

/// Inserts a transfer and its lines, numbering it `TRF-<date>-<seq>`.
pub(crate) async fn insert_transfer(
    conn: &mut MySqlConnection,
    transfer: &NewTransfer<'_>,
    lines: &[ValuedTransferLine],
) -> ApiResult<(u64, String)> {
    let date = transfer.created_at.date();
    let seq = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM stock_transfers WHERE DATE(created_at) = ?",
    )
    .bind(date)
    .fetch_one(&mut *conn)
    .await?;
    let number = format!("TRF-{}-{:04}", date.format("%Y%m%d"), seq + 1);

    let result = sqlx::query(
        r#"
        INSERT INTO stock_transfers
        (uuid, transfer_number, from_location_id, to_location_id, status, notes, requested_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(transfer.uuid)
    .bind(&number)
    .bind(transfer.from_location_id)
    .bind(transfer.to_location_id)
    .bind(transfer.status.as_ref())
    .bind(transfer.notes)
    .bind(transfer.requested_by)
    .bind(transfer.created_at)
    .execute(&mut *conn)
    .await?;
    let transfer_id = result.last_insert_id();

    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO stock_transfer_items (transfer_id, product_id, quantity, unit_cost, total_value)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(transfer_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_cost)
        .bind(line.total_value)
        .execute(&mut *conn)
        .await?;
    }

    Ok((transfer_id, number))
}

async fn fetch_transfer(
    conn: &mut MySqlConnection,
    transfer_id: u64,
    lock: bool,
) -> ApiResult<TransferWithItems> {
    let suffix = if lock { " FOR UPDATE" } else { "" };
    let transfer = sqlx::query_as::<_, StockTransfer>(&format!(
        "SELECT {TRANSFER_COLUMNS} FROM stock_transfers WHERE id = ?{suffix}"
    ))
    .bind(transfer_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Transfer"))?;

    let items = sqlx::query_as::<_, StockTransferItem>(
        "SELECT id, transfer_id, product_id, quantity, unit_cost, total_value \
         FROM stock_transfer_items WHERE transfer_id = ? ORDER BY id",
    )
    .bind(transfer_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(TransferWithItems { transfer, items })
}

#[utoipa::path(
    post,
    path = "/api/stock-transfer",
    request_body = CreateTransfer,
    responses(
        (status = 201, description = "Transfer created", body = Object, example = json!({
            "message": "Transfer created", "id": 12, "transfer_number": "TRF-20260101-0001", "status": "draft"
        })),
        (status = 400, description = "Same location, no items or bad quantity")
    ),
    security(("bearer_auth" = [])),
    tag = "Stock Transfer"
)]
pub async fn create_transfer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTransfer>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    let lines = prepare_transfer_lines(
        payload.from_location_id,
        payload.to_location_id,
        &payload.items,
    )?;
    let status = if payload.submit {
        TransferStatus::Pending
    } else {
        TransferStatus::Draft
    };

    let mut tx = pool.begin().await?;
    let (id, number) = insert_transfer(
        &mut *tx,
        &NewTransfer {
            uuid: None,
            from_location_id: payload.from_location_id,
            to_location_id: payload.to_location_id,
            status,
            notes: payload.notes.trim(),
            requested_by: Some(auth.user_id),
            created_at: Local::now().naive_local(),
        },
        &lines,
    )
    .await?;
    tx.commit().await?;

    info!(transfer_id = id, transfer_number = %number, status = %status, "Transfer created");

    Ok(HttpResponse::Created().json(json!({
        "message": "Transfer created",
        "id": id,
        "transfer_number": number,
        "status": status
    })))
}

/// Moves a transfer through its state machine and applies the stock side
/// effects of the step, all in one transaction.
async fn transition(
    auth: &AuthUser,
    pool: &MySqlPool,
    transfer_id: u64,
    action: TransferAction,
) -> ApiResult<TransferStatus> {
    auth.require_manager()?;

    let mut tx = pool.begin().await?;
    let TransferWithItems { transfer, items } = fetch_transfer(&mut *tx, transfer_id, true).await?;

    let current = TransferStatus::from_str(&transfer.status)
        .map_err(|_| ApiError::Internal(format!("Unknown transfer status {}", transfer.status)))?;
    let next = next_transfer_status(current, action)?;
    let now = Local::now().naive_local();

    match (action, current) {
        (TransferAction::Dispatch, _) => {
            for item in &items {
                let label = format!("product {} at the source location", item.product_id);
                remove_stock(
                    &mut *tx,
                    transfer.from_location_id,
                    item.product_id,
                    item.quantity,
                    &label,
                )
                .await?;
            }
        }
        (TransferAction::Receive, _) => {
            for item in &items {
                add_stock(&mut *tx, transfer.to_location_id, item.product_id, item.quantity)
                    .await?;
                record_movement(
                    &mut *tx,
                    &NewMovement {
                        uuid: None,
                        product_id: item.product_id,
                        movement_type: MovementType::Transfer,
                        from_location_id: Some(transfer.from_location_id),
                        to_location_id: Some(transfer.to_location_id),
                        quantity: item.quantity,
                        unit_cost: item.unit_cost,
                        reference: &transfer.transfer_number,
                        reason: &transfer.notes,
                        created_by: Some(auth.user_id),
                        created_at: now,
                    },
                )
                .await?;
            }
        }
        (TransferAction::Cancel, TransferStatus::InTransit) => {
            for item in &items {
                add_stock(&mut *tx, transfer.from_location_id, item.product_id, item.quantity)
                    .await?;
            }
        }
        _ => {}
    }

    let completed_at = (next == TransferStatus::Completed).then_some(now);
    sqlx::query("UPDATE stock_transfers SET status = ?, completed_at = COALESCE(?, completed_at) WHERE id = ?")
        .bind(next.as_ref())
        .bind(completed_at)
        .bind(transfer_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if matches!(action, TransferAction::Dispatch | TransferAction::Receive)
        || current == TransferStatus::InTransit
    {
        let ids: Vec<u64> = items.iter().map(|i| i.product_id).collect();
        product_cache::invalidate_products(&ids);
    }

    info!(
        transfer_id,
        from = %current,
        to = %next,
        "Transfer status changed"
    );
    Ok(next)
}

#[utoipa::path(
    put,
    path = "/api/stock-transfer/{transfer_id}/submit",
    params(("transfer_id" = u64, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Transfer submitted"),
        (status = 400, description = "Transition not allowed from the current status"),
        (status = 404, description = "Transfer not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Stock Transfer"
)]
pub async fn submit_transfer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let status = transition(&auth, pool.get_ref(), path.into_inner(), TransferAction::Submit).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Transfer submitted", "status": status })))
}

#[utoipa::path(
    put,
    path = "/api/stock-transfer/{transfer_id}/dispatch",
    params(("transfer_id" = u64, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Transfer dispatched"),
        (status = 400, description = "Transition not allowed from the current status"),
        (status = 409, description = "Insufficient stock at the source"),
        (status = 404, description = "Transfer not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Stock Transfer"
)]
pub async fn dispatch_transfer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let status = transition(&auth, pool.get_ref(), path.into_inner(), TransferAction::Dispatch).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Transfer dispatched", "status": status })))
}

#[utoipa::path(
    put,
    path = "/api/stock-transfer/{transfer_id}/receive",
    params(("transfer_id" = u64, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Transfer received"),
        (status = 400, description = "Transition not allowed from the current status"),
        (status = 404, description = "Transfer not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Stock Transfer"
)]
pub async fn receive_transfer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let status = transition(&auth, pool.get_ref(), path.into_inner(), TransferAction::Receive).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Transfer received", "status": status })))
}

#[utoipa::path(
    put,
    path = "/api/stock-transfer/{transfer_id}/cancel",
    params(("transfer_id" = u64, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Transfer cancelled"),
        (status = 400, description = "Transition not allowed from the current status"),
        (status = 404, description = "Transfer not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Stock Transfer"
)]
pub async fn cancel_transfer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let status = transition(&auth, pool.get_ref(), path.into_inner(), TransferAction::Cancel).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Transfer cancelled", "status": status })))
}

#[utoipa::path(
    get,
    path = "/api/stock-transfer",
    params(TransferQuery),
    responses((status = 200, description = "Paginated transfers")),
    security(("bearer_auth" = [])),
    tag = "Stock Transfer"
)]
pub async fn list_transfers(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TransferQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;

    let mut filter = SqlFilter::new();
    filter.and_eq("status", query.status.map(|s| s.to_string()));
    if let Some(location_id) = query.location_id {
        filter.and("? IN (from_location_id, to_location_id)", location_id);
    }

    let page = fetch_page::<StockTransfer>(
        pool.get_ref(),
        TRANSFER_COLUMNS,
        "FROM stock_transfers",
        &filter,
        "created_at DESC, id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/stock-transfer/{transfer_id}",
    params(("transfer_id" = u64, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Transfer with items", body = TransferWithItems),
        (status = 404, description = "Transfer not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Stock Transfer"
)]
pub async fn get_transfer(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;
    let mut conn = pool.acquire().await?;
    let transfer = fetch_transfer(&mut conn, path.into_inner(), false).await?;
    Ok(HttpResponse::Ok().json(transfer))
}
