use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::location::{Location, LocationType},
    utils::db_utils::{build_update_sql, check_enum_field, execute_update},
};

pub(crate) const LOCATION_COLUMNS: &str =
    "id, name, code, location_type, address, is_active, updated_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateLocation {
    #[schema(example = "Lilongwe City Centre")]
    pub name: String,
    #[schema(example = "LLW-01")]
    pub code: String,
    pub location_type: Option<LocationType>,
    #[serde(default)]
    pub address: String,
}

#[derive(Deserialize, IntoParams)]
pub struct LocationQuery {
    #[serde(default)]
    pub active_only: bool,
}

pub(crate) async fn fetch_location(pool: &MySqlPool, location_id: u64) -> ApiResult<Location> {
    sqlx::query_as::<_, Location>(&format!(
        "SELECT {LOCATION_COLUMNS} FROM locations WHERE id = ?"
    ))
    .bind(location_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Location"))
}

#[utoipa::path(
    post,
    path = "/api/location",
    request_body = CreateLocation,
    responses(
        (status = 201, description = "Location created", body = Object, example = json!({
            "message": "Location created", "id": 2
        })),
        (status = 409, description = "Location code already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Location"
)]
pub async fn create_location(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLocation>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    if payload.name.trim().is_empty() || payload.code.trim().is_empty() {
        return Err(ApiError::validation("Location name and code are required"));
    }

    let result = sqlx::query(
        "INSERT INTO locations (name, code, location_type, address) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.name.trim())
    .bind(payload.code.trim().to_uppercase())
    .bind(payload.location_type.unwrap_or(LocationType::Store).as_ref())
    .bind(payload.address.trim())
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Location code already exists"),
        other => other,
    })?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Location created",
        "id": result.last_insert_id()
    })))
}

#[utoipa::path(
    get,
    path = "/api/location",
    params(LocationQuery),
    responses((status = 200, description = "Locations", body = [Location])),
    security(("bearer_auth" = [])),
    tag = "Location"
)]
pub async fn list_locations(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LocationQuery>,
) -> ApiResult<HttpResponse> {
    let where_clause = if query.active_only {
        "WHERE is_active = TRUE"
    } else {
        ""
    };
    let locations = sqlx::query_as::<_, Location>(&format!(
        "SELECT {LOCATION_COLUMNS} FROM locations {where_clause} ORDER BY name"
    ))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(locations))
}

#[utoipa::path(
    get,
    path = "/api/location/{location_id}",
    params(("location_id" = u64, Path, description = "Location ID")),
    responses(
        (status = 200, description = "Location", body = Location),
        (status = 404, description = "Location not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Location"
)]
pub async fn get_location(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(fetch_location(pool.get_ref(), path.into_inner()).await?))
}

#[utoipa::path(
    put,
    path = "/api/location/{location_id}",
    params(("location_id" = u64, Path, description = "Location ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Location updated"),
        (status = 400, description = "Unknown field")
    ),
    security(("bearer_auth" = [])),
    tag = "Location"
)]
pub async fn update_location(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let location_id = path.into_inner();

    check_enum_field::<LocationType>(&body, "location_type")?;
    let update = build_update_sql(
        "locations",
        &body,
        &["name", "code", "location_type", "address"],
        location_id,
    )?;
    if execute_update(pool.get_ref(), update).await? == 0 {
        fetch_location(pool.get_ref(), location_id).await?;
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Location updated" })))
}

/// A location that still holds stock cannot be switched off.
#[utoipa::path(
    put,
    path = "/api/location/{location_id}/deactivate",
    params(("location_id" = u64, Path, description = "Location ID")),
    responses(
        (status = 200, description = "Location deactivated"),
        (status = 409, description = "Location still holds stock", body = Object, example = json!({
            "code": "CONFLICT", "message": "Location still holds 42 units of stock"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Location"
)]
pub async fn deactivate_location(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let location_id = path.into_inner();
    fetch_location(pool.get_ref(), location_id).await?;

    let held = sqlx::query_scalar::<_, i64>(
        "SELECT CAST(COALESCE(SUM(quantity), 0) AS SIGNED) FROM location_stock WHERE location_id = ? AND quantity > 0",
    )
    .bind(location_id)
    .fetch_one(pool.get_ref())
    .await?;

    if held > 0 {
        return Err(ApiError::conflict(format!(
            "Location still holds {held} units of stock"
        )));
    }

    sqlx::query("UPDATE locations SET is_active = FALSE WHERE id = ?")
        .bind(location_id)
        .execute(pool.get_ref())
        .await?;

    info!(location_id, "Location deactivated");
    Ok(HttpResponse::Ok().json(json!({ "message": "Location deactivated" })))
}
