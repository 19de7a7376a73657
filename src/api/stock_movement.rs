use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::stock::{MovementType, StockMovement},
    utils::{
        db_utils::{PageRequest, SqlFilter, fetch_page},
        product_cache,
        stock_db::{NewMovement, apply_movement},
    },
};

pub(crate) const MOVEMENT_COLUMNS: &str = "id, uuid, product_id, movement_type, from_location_id, \
    to_location_id, quantity, unit_cost, total_value, reference, reason, created_by, created_at";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMovement {
    pub product_id: u64,
    pub movement_type: MovementType,
    pub from_location_id: Option<u64>,
    pub to_location_id: Option<u64>,
    #[schema(example = 24)]
    pub quantity: i64,
    #[serde(default)]
    pub unit_cost: f64,
    #[serde(default)]
    #[schema(example = "PO-2291")]
    pub reference: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MovementQuery {
    pub product_id: Option<u64>,
    /// Matches either side of the movement
    pub location_id: Option<u64>,
    pub movement_type: Option<MovementType>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl MovementQuery {
    pub(crate) fn to_filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::new();
        filter
            .and_eq("product_id", self.product_id)
            .and_eq("movement_type", self.movement_type.map(|t| t.to_string()));
        if let Some(location_id) = self.location_id {
            filter.and("? IN (from_location_id, to_location_id)", location_id);
        }
        if let Some(from) = self.from {
            filter.and("DATE(created_at) >= ?", from);
        }
        if let Some(to) = self.to {
            filter.and("DATE(created_at) <= ?", to);
        }
        filter
    }
}

/// Manual stock movement. Stock at every location involved changes in the
/// same transaction as the movement row.
#[utoipa::path(
    post,
    path = "/api/stock-movement",
    request_body = CreateMovement,
    responses(
        (status = 201, description = "Movement recorded", body = Object, example = json!({
            "message": "Movement recorded", "id": 311
        })),
        (status = 400, description = "Location rules or quantity violated"),
        (status = 409, description = "Insufficient stock at the source")
    ),
    security(("bearer_auth" = [])),
    tag = "Stock Movement"
)]
pub async fn create_movement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateMovement>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    if payload.movement_type == MovementType::Sale {
        return Err(ApiError::validation("Sales are recorded through checkout"));
    }
    if payload.unit_cost < 0.0 {
        return Err(ApiError::validation("Unit cost cannot be negative"));
    }

    let mut tx = pool.begin().await?;
    let exists = sqlx::query_scalar::<_, u64>("SELECT id FROM products WHERE id = ?")
        .bind(payload.product_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Product"));
    }

    let id = apply_movement(
        &mut *tx,
        &NewMovement {
            uuid: None,
            product_id: payload.product_id,
            movement_type: payload.movement_type,
            from_location_id: payload.from_location_id,
            to_location_id: payload.to_location_id,
            quantity: payload.quantity,
            unit_cost: payload.unit_cost,
            reference: payload.reference.trim(),
            reason: payload.reason.trim(),
            created_by: Some(auth.user_id),
            created_at: Local::now().naive_local(),
        },
        false,
    )
    .await?;
    tx.commit().await?;

    product_cache::invalidate_products(&[payload.product_id]);
    info!(
        movement_id = id,
        product_id = payload.product_id,
        movement_type = %payload.movement_type,
        quantity = payload.quantity,
        "Stock movement recorded"
    );

    Ok(HttpResponse::Created().json(json!({
        "message": "Movement recorded",
        "id": id
    })))
}

#[utoipa::path(
    get,
    path = "/api/stock-movement",
    params(MovementQuery),
    responses((status = 200, description = "Paginated movements, newest first")),
    security(("bearer_auth" = [])),
    tag = "Stock Movement"
)]
pub async fn list_movements(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MovementQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_pos()?;

    let page = fetch_page::<StockMovement>(
        pool.get_ref(),
        MOVEMENT_COLUMNS,
        "FROM stock_movements",
        &query.to_filter(),
        "created_at DESC, id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_filter_matches_either_side() {
        let query = MovementQuery {
            location_id: Some(3),
            movement_type: Some(MovementType::StockIn),
            ..Default::default()
        };
        let filter = query.to_filter();
        assert_eq!(
            filter.where_clause(),
            "WHERE movement_type = ? AND ? IN (from_location_id, to_location_id)"
        );
    }
}
