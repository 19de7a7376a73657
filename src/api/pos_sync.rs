//! Endpoints the offline till agent talks to.
//!
//! Pushes are idempotent on the client id of each record (`pos_transaction_id`
//! for sales, `uuid` for the rest). Every record is written in its own
//! transaction so one bad record never blocks the rest of the batch.

use actix_web::{HttpResponse, web};
use async_trait::async_trait;
use chrono::{DateTime, Local, SubsecRound, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{
        location::{LOCATION_COLUMNS, fetch_location},
        product::product_columns,
        stock_take::{apply_counts, insert_stock_take},
        stock_transfer::{NewTransfer, insert_transfer},
    },
    auth::{auth::AuthUser, handlers::device_subject, jwt::generate_access_token},
    config::Config,
    error::{ApiError, ApiResult},
    model::{
        device::PosDevice,
        location::Location,
        product::Product,
        role::Role,
        stock::{MovementType, StockTake, StockTakeItem, StockTakeStatus, TransferStatus},
        sync::{
            CatalogResponse, PushResult, RejectedRecord, SyncKind, SyncMovement, SyncSale,
            SyncStockTake, SyncTransfer,
        },
    },
    service::inventory::{TransferLine, count_difference, merge_counts, prepare_transfer_lines},
    utils::{
        product_cache,
        stock_db::{NewMovement, apply_movement, insert_sale, locked_quantity},
        txn_filter,
    },
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterDevice {
    #[schema(example = "till-1")]
    pub device_id: String,
    #[schema(example = "Front counter")]
    pub name: String,
    pub location_id: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CatalogQuery {
    /// Defaults to the device's location
    pub location_id: Option<u64>,
    /// Only products changed after this instant
    #[param(value_type = Option<String>)]
    pub since: Option<DateTime<Utc>>,
}

/// A record a till creates offline.
#[async_trait]
trait Ingest: Send + Sync {
    const KIND: SyncKind;

    fn client_id(&self) -> &str;

    /// Locations the record writes to; a device may only touch its own.
    fn locations(&self) -> Vec<u64>;

    /// Writes the record on `conn` and returns the products whose stock moved.
    async fn write(&self, conn: &mut MySqlConnection, user_id: Option<u64>) -> ApiResult<Vec<u64>>;
}

#[async_trait]
impl Ingest for SyncSale {
    const KIND: SyncKind = SyncKind::Sale;

    fn client_id(&self) -> &str {
        &self.pos_transaction_id
    }

    fn locations(&self) -> Vec<u64> {
        vec![self.location_id]
    }

    async fn write(&self, conn: &mut MySqlConnection, user_id: Option<u64>) -> ApiResult<Vec<u64>> {
        if self.items.is_empty() {
            return Err(ApiError::validation("Sale has no items"));
        }
        // The goods already left the shop, so shortfalls are only logged
        insert_sale(conn, self, user_id, true).await?;
        Ok(self.items.iter().map(|i| i.product_id).collect())
    }
}

#[async_trait]
impl Ingest for SyncMovement {
    const KIND: SyncKind = SyncKind::Movement;

    fn client_id(&self) -> &str {
        &self.uuid
    }

    fn locations(&self) -> Vec<u64> {
        self.from_location_id.into_iter().chain(self.to_location_id).collect()
    }

    async fn write(&self, conn: &mut MySqlConnection, user_id: Option<u64>) -> ApiResult<Vec<u64>> {
        if self.movement_type == MovementType::Sale {
            return Err(ApiError::validation(
                "Sale movements are derived from pushed sales",
            ));
        }
        apply_movement(
            conn,
            &NewMovement {
                uuid: Some(&self.uuid),
                product_id: self.product_id,
                movement_type: self.movement_type,
                from_location_id: self.from_location_id,
                to_location_id: self.to_location_id,
                quantity: self.quantity,
                unit_cost: self.unit_cost,
                reference: &self.reference,
                reason: &self.reason,
                created_by: user_id,
                created_at: self.created_at,
            },
            true,
        )
        .await?;
        Ok(vec![self.product_id])
    }
}

#[async_trait]
impl Ingest for SyncTransfer {
    const KIND: SyncKind = SyncKind::Transfer;

    fn client_id(&self) -> &str {
        &self.uuid
    }

    fn locations(&self) -> Vec<u64> {
        vec![self.from_location_id]
    }

    /// Arrives as a pending request; stock moves when it is dispatched.
    async fn write(&self, conn: &mut MySqlConnection, user_id: Option<u64>) -> ApiResult<Vec<u64>> {
        let lines: Vec<TransferLine> = self
            .items
            .iter()
            .map(|i| TransferLine {
                product_id: i.product_id,
                quantity: i.quantity,
                unit_cost: i.unit_cost,
            })
            .collect();
        let lines = prepare_transfer_lines(self.from_location_id, self.to_location_id, &lines)?;

        insert_transfer(
            conn,
            &NewTransfer {
                uuid: Some(&self.uuid),
                from_location_id: self.from_location_id,
                to_location_id: self.to_location_id,
                status: TransferStatus::Pending,
                notes: &self.notes,
                requested_by: user_id,
                created_at: self.created_at,
            },
            &lines,
        )
        .await?;
        Ok(Vec::new())
    }
}

#[async_trait]
impl Ingest for SyncStockTake {
    const KIND: SyncKind = SyncKind::StockTake;

    fn client_id(&self) -> &str {
        &self.uuid
    }

    fn locations(&self) -> Vec<u64> {
        vec![self.location_id]
    }

    /// Counted at the till, so it completes on arrival. Differences are taken
    /// against the server's stock at ingest time.
    async fn write(&self, conn: &mut MySqlConnection, user_id: Option<u64>) -> ApiResult<Vec<u64>> {
        if self.items.is_empty() {
            return Err(ApiError::validation("Stock take has no items"));
        }

        let (take_id, reference) = insert_stock_take(
            &mut *conn,
            Some(&self.uuid),
            self.location_id,
            &self.notes,
            user_id,
            self.created_at,
        )
        .await?;

        let counts: Vec<(u64, i64)> = self
            .items
            .iter()
            .map(|i| (i.product_id, i.physical_quantity))
            .collect();
        let counts = merge_counts(&counts)?;

        let mut items = Vec::with_capacity(counts.len());
        for (product_id, physical_quantity) in counts {
            let unit_cost = self
                .items
                .iter()
                .find(|i| i.product_id == product_id)
                .map(|i| i.unit_cost)
                .unwrap_or_default();
            let system = locked_quantity(&mut *conn, self.location_id, product_id).await?;
            let (difference, adjustment_value) =
                count_difference(system, physical_quantity, unit_cost)?;

            let result = sqlx::query(
                r#"
                INSERT INTO stock_take_items
                (stock_take_id, product_id, system_quantity, physical_quantity, difference, unit_cost, adjustment_value)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(take_id)
            .bind(product_id)
            .bind(system)
            .bind(physical_quantity)
            .bind(difference)
            .bind(unit_cost)
            .bind(adjustment_value)
            .execute(&mut *conn)
            .await?;

            items.push(StockTakeItem {
                id: result.last_insert_id(),
                stock_take_id: take_id,
                product_id,
                system_quantity: system,
                physical_quantity,
                difference,
                unit_cost,
                adjustment_value,
            });
        }

        let take = StockTake {
            id: take_id,
            uuid: Some(self.uuid.clone()),
            reference,
            location_id: self.location_id,
            status: StockTakeStatus::Draft.to_string(),
            notes: self.notes.clone(),
            counted_by: user_id,
            created_at: self.created_at,
            completed_at: None,
        };
        apply_counts(conn, &take, &items, user_id, Local::now().naive_local()).await?;

        Ok(items
            .iter()
            .filter(|i| i.difference != 0)
            .map(|i| i.product_id)
            .collect())
    }
}

fn seen_record_sql(kind: SyncKind) -> &'static str {
    match kind {
        SyncKind::Sale => "SELECT COUNT(*) FROM sales WHERE pos_transaction_id = ?",
        SyncKind::Movement => "SELECT COUNT(*) FROM stock_movements WHERE uuid = ?",
        SyncKind::Transfer => "SELECT COUNT(*) FROM stock_transfers WHERE uuid = ?",
        SyncKind::StockTake => "SELECT COUNT(*) FROM stock_takes WHERE uuid = ?",
    }
}

async fn already_ingested_in_db(pool: &MySqlPool, kind: SyncKind, id: &str) -> ApiResult<bool> {
    let count = sqlx::query_scalar::<_, i64>(seen_record_sql(kind))
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Filter first, database second: a filter miss is definitive.
async fn already_ingested(pool: &MySqlPool, kind: SyncKind, id: &str) -> ApiResult<bool> {
    if !txn_filter::might_exist(kind, id) {
        return Ok(false);
    }
    already_ingested_in_db(pool, kind, id).await
}

/// Created-by for pushed rows: staff pushing by hand are users, devices are not.
fn pushing_user(auth: &AuthUser) -> Option<u64> {
    (auth.role != Role::Device).then_some(auth.user_id)
}

fn check_location(auth: &AuthUser, locations: &[u64]) -> Result<(), String> {
    if auth.role != Role::Device {
        return Ok(());
    }
    match auth.location_id {
        Some(own) if locations.iter().all(|l| *l == own) => Ok(()),
        Some(own) => Err(format!("Device is registered to location {own}")),
        None => Err("Device has no location".to_string()),
    }
}

async fn touch_device(pool: &MySqlPool, auth: &AuthUser) -> ApiResult<()> {
    if auth.role == Role::Device {
        sqlx::query("UPDATE pos_devices SET last_sync_at = ? WHERE id = ?")
            .bind(Local::now().naive_local())
            .bind(auth.user_id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

async fn ingest_one<T: Ingest>(
    pool: &MySqlPool,
    record: &T,
    user_id: Option<u64>,
) -> ApiResult<Vec<u64>> {
    let mut tx = pool.begin().await?;
    let touched = record.write(&mut *tx, user_id).await?;
    tx.commit().await?;
    Ok(touched)
}

async fn push<T: Ingest>(auth: &AuthUser, pool: &MySqlPool, records: &[T]) -> ApiResult<PushResult> {
    auth.require_sync()?;

    let mut result = PushResult::default();
    let mut touched = Vec::new();
    let user_id = pushing_user(auth);

    for record in records {
        let id = record.client_id().to_string();
        if id.trim().is_empty() {
            result.rejected.push(RejectedRecord {
                id,
                error: "Missing client id".into(),
            });
            continue;
        }

        if already_ingested(pool, T::KIND, &id).await? {
            debug!(kind = %T::KIND, id = %id, "Duplicate push");
            result.duplicates.push(id);
            continue;
        }

        if let Err(error) = check_location(auth, &record.locations()) {
            result.rejected.push(RejectedRecord { id, error });
            continue;
        }

        match ingest_one(pool, record, user_id).await {
            Ok(products) => {
                txn_filter::insert(T::KIND, &id);
                touched.extend(products);
                result.accepted.push(id);
            }
            // Lost a race with another push of the same record
            Err(ApiError::Conflict(_)) if already_ingested_in_db(pool, T::KIND, &id).await? => {
                txn_filter::insert(T::KIND, &id);
                result.duplicates.push(id);
            }
            Err(e) => {
                warn!(kind = %T::KIND, id = %id, error = %e, "Rejected pushed record");
                result.rejected.push(RejectedRecord {
                    id,
                    error: e.to_string(),
                });
            }
        }
    }

    product_cache::invalidate_products(&touched);
    touch_device(pool, auth).await?;

    info!(
        kind = %T::KIND,
        accepted = result.accepted.len(),
        duplicates = result.duplicates.len(),
        rejected = result.rejected.len(),
        "Sync push processed"
    );
    Ok(result)
}

/// Registers (or re-registers) a till and hands it a device token.
#[utoipa::path(
    post,
    path = "/api/pos/sync/devices",
    request_body = RegisterDevice,
    responses(
        (status = 200, description = "Device registered", body = Object, example = json!({
            "device": {"id": 3, "device_id": "till-1", "name": "Front counter", "location_id": 1, "last_sync_at": null, "is_active": true},
            "access_token": "eyJ...",
            "expires_in": 604800
        })),
        (status = 404, description = "Location not found")
    ),
    security(("bearer_auth" = [])),
    tag = "POS Sync"
)]
pub async fn register_device(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<RegisterDevice>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    let device_id = payload.device_id.trim();
    if device_id.is_empty() || payload.name.trim().is_empty() {
        return Err(ApiError::validation("device_id and name are required"));
    }
    fetch_location(pool.get_ref(), payload.location_id).await?;

    sqlx::query(
        r#"
        INSERT INTO pos_devices (device_id, name, location_id)
        VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE name = VALUES(name), location_id = VALUES(location_id), is_active = TRUE
        "#,
    )
    .bind(device_id)
    .bind(payload.name.trim())
    .bind(payload.location_id)
    .execute(pool.get_ref())
    .await?;

    let device = sqlx::query_as::<_, PosDevice>(
        "SELECT id, device_id, name, location_id, last_sync_at, is_active FROM pos_devices WHERE device_id = ?",
    )
    .bind(device_id)
    .fetch_one(pool.get_ref())
    .await?;

    // Tills stay offline for long stretches, so they get the long lifetime
    let subject = device_subject(device.id, &device.device_id, device.location_id);
    let access_token =
        generate_access_token(&subject, &config.jwt_secret, config.refresh_token_ttl)?;

    info!(device_id = %device.device_id, location_id = device.location_id, "Device registered");

    Ok(HttpResponse::Ok().json(json!({
        "device": device,
        "access_token": access_token,
        "expires_in": config.refresh_token_ttl
    })))
}

#[utoipa::path(
    post,
    path = "/api/pos/sync/sales",
    request_body = Vec<SyncSale>,
    responses((status = 200, description = "Per-record outcome", body = PushResult)),
    security(("bearer_auth" = [])),
    tag = "POS Sync"
)]
pub async fn push_sales(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<Vec<SyncSale>>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(push(&auth, pool.get_ref(), &payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/pos/sync/movements",
    request_body = Vec<SyncMovement>,
    responses((status = 200, description = "Per-record outcome", body = PushResult)),
    security(("bearer_auth" = [])),
    tag = "POS Sync"
)]
pub async fn push_movements(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<Vec<SyncMovement>>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(push(&auth, pool.get_ref(), &payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/pos/sync/transfers",
    request_body = Vec<SyncTransfer>,
    responses((status = 200, description = "Per-record outcome", body = PushResult)),
    security(("bearer_auth" = [])),
    tag = "POS Sync"
)]
pub async fn push_transfers(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<Vec<SyncTransfer>>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(push(&auth, pool.get_ref(), &payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/pos/sync/stock-takes",
    request_body = Vec<SyncStockTake>,
    responses((status = 200, description = "Per-record outcome", body = PushResult)),
    security(("bearer_auth" = [])),
    tag = "POS Sync"
)]
pub async fn push_stock_takes(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<Vec<SyncStockTake>>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(push(&auth, pool.get_ref(), &payload).await?))
}

/// `updated_at` columns hold whole seconds, so the watermark does too and the
/// pull compares with `>=`. Rows stamped in the watermark's second are sent
/// again on the next pull, which the till's upsert absorbs.
pub(crate) fn pull_watermark(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(0)
}

/// Products changed since `since` (catalogue or stock at the location), all
/// locations, and the server time to send as the next `since`.
#[utoipa::path(
    get,
    path = "/api/pos/sync/catalog",
    params(CatalogQuery),
    responses((status = 200, description = "Catalogue delta", body = CatalogResponse)),
    security(("bearer_auth" = [])),
    tag = "POS Sync"
)]
pub async fn pull_catalog(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CatalogQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_sync()?;

    let location_id = query
        .location_id
        .or(auth.location_id)
        .ok_or_else(|| ApiError::validation("location_id is required"))?;
    if let Err(message) = check_location(&auth, &[location_id]) {
        return Err(ApiError::Forbidden(message));
    }

    // Taken before reading so nothing changed mid-read is skipped next time
    let server_time = pull_watermark(Utc::now());

    let columns = product_columns(Some(location_id));
    let products = match query.since {
        Some(since) => {
            sqlx::query_as::<_, Product>(&format!(
                r#"
                SELECT {columns} FROM products p
                WHERE p.updated_at >= ?
                   OR EXISTS (SELECT 1 FROM location_stock ls
                              WHERE ls.product_id = p.id AND ls.location_id = ? AND ls.updated_at >= ?)
                ORDER BY p.id
                "#
            ))
            .bind(since)
            .bind(location_id)
            .bind(since)
            .fetch_all(pool.get_ref())
            .await?
        }
        None => {
            sqlx::query_as::<_, Product>(&format!(
                "SELECT {columns} FROM products p ORDER BY p.id"
            ))
            .fetch_all(pool.get_ref())
            .await?
        }
    };

    let locations = sqlx::query_as::<_, Location>(&format!(
        "SELECT {LOCATION_COLUMNS} FROM locations ORDER BY id"
    ))
    .fetch_all(pool.get_ref())
    .await?;

    touch_device(pool.get_ref(), &auth).await?;
    debug!(location_id, products = products.len(), "Catalog pulled");

    Ok(HttpResponse::Ok().json(CatalogResponse {
        products,
        locations,
        server_time,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn caller(role: Role, location_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 3,
            username: "device:till-1".into(),
            role,
            employee_id: None,
            location_id,
        }
    }

    #[test]
    fn devices_only_write_to_their_own_location() {
        let till = caller(Role::Device, Some(2));
        assert!(check_location(&till, &[2]).is_ok());
        assert_eq!(
            check_location(&till, &[2, 5]).unwrap_err(),
            "Device is registered to location 2"
        );
        assert!(check_location(&caller(Role::Device, None), &[2]).is_err());
        assert!(check_location(&caller(Role::Manager, None), &[9]).is_ok());
    }

    #[test]
    fn devices_are_not_recorded_as_users() {
        assert_eq!(pushing_user(&caller(Role::Device, Some(1))), None);
        assert_eq!(pushing_user(&caller(Role::Cashier, Some(1))), Some(3));
    }

    #[test]
    fn movement_locations_cover_both_sides() {
        let movement = SyncMovement {
            uuid: "m-1".into(),
            product_id: 1,
            movement_type: MovementType::Transfer,
            from_location_id: Some(1),
            to_location_id: Some(4),
            quantity: 2,
            unit_cost: 1.0,
            reference: String::new(),
            reason: String::new(),
            created_at: chrono::NaiveDateTime::default(),
        };
        assert_eq!(movement.locations(), vec![1, 4]);
        assert_eq!(movement.client_id(), "m-1");
    }

    #[test]
    fn watermark_keeps_changes_later_in_the_same_second() {
        let second = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();
        let pulled_at = second + chrono::Duration::milliseconds(500);
        let watermark = pull_watermark(pulled_at);
        assert_eq!(watermark, second);

        // committed at .700 after the pull, stored by MySQL as whole seconds
        let stored = (pulled_at + chrono::Duration::milliseconds(200)).trunc_subsecs(0);
        assert!(stored >= watermark);
    }
}
