use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::department::{Department, Position},
    utils::db_utils::{build_update_sql, execute_update},
};

#[derive(Deserialize, ToSchema)]
pub struct CreateDepartment {
    #[schema(example = "Finance")]
    pub name: String,
    #[schema(example = "FIN")]
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreatePosition {
    #[schema(example = "Accountant")]
    pub title: String,
    pub department_id: u64,
    #[serde(default = "default_level")]
    pub level: i32,
    pub min_salary: Option<f64>,
    pub max_salary: Option<f64>,
}

fn default_level() -> i32 {
    1
}

fn check_salary_band(min: Option<f64>, max: Option<f64>) -> ApiResult<()> {
    if let (Some(min), Some(max)) = (min, max)
        && min > max
    {
        return Err(ApiError::validation(
            "Minimum salary cannot exceed maximum salary",
        ));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/department",
    request_body = CreateDepartment,
    responses(
        (status = 201, description = "Department created", body = Object, example = json!({
            "message": "Department created successfully", "id": 3
        })),
        (status = 409, description = "Department code already exists")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateDepartment>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    if payload.name.trim().is_empty() || payload.code.trim().is_empty() {
        return Err(ApiError::validation("Department name and code are required"));
    }

    let result = sqlx::query("INSERT INTO departments (name, code, description) VALUES (?, ?, ?)")
        .bind(payload.name.trim())
        .bind(payload.code.trim().to_uppercase())
        .bind(&payload.description)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, code = %payload.code, "Failed to create department");
            ApiError::from(e)
        })?;

    info!(department_id = result.last_insert_id(), "Department created");

    Ok(HttpResponse::Created().json(json!({
        "message": "Department created successfully",
        "id": result.last_insert_id()
    })))
}

#[utoipa::path(
    get,
    path = "/api/department",
    responses((status = 200, description = "All departments", body = [Department])),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn list_departments(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> ApiResult<HttpResponse> {
    let rows = sqlx::query_as::<_, Department>(
        "SELECT id, name, code, description FROM departments ORDER BY name",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/department/{id}",
    params(("id", Path, description = "Department ID")),
    responses(
        (status = 200, description = "Department found", body = Department),
        (status = 404, description = "Department not found")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn get_department(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let department = sqlx::query_as::<_, Department>(
        "SELECT id, name, code, description FROM departments WHERE id = ?",
    )
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Department"))?;

    Ok(HttpResponse::Ok().json(department))
}

#[utoipa::path(
    put,
    path = "/api/department/{id}",
    params(("id", Path, description = "Department ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Department updated", body = Object, example = json!({
            "message": "Department updated successfully"
        }))
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn update_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let update = build_update_sql(
        "departments",
        &body,
        &["name", "code", "description"],
        path.into_inner(),
    )?;
    execute_update(pool.get_ref(), update).await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Department updated successfully" })))
}

#[utoipa::path(
    delete,
    path = "/api/department/{id}",
    params(("id", Path, description = "Department ID")),
    responses(
        (status = 200, description = "Department deleted"),
        (status = 404, description = "Department not found"),
        (status = 409, description = "Department still has employees")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn delete_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let department_id = path.into_inner();

    let staffed = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM employees WHERE department_id = ?)",
    )
    .bind(department_id)
    .fetch_one(pool.get_ref())
    .await?;

    if staffed {
        return Err(ApiError::conflict("Department still has employees"));
    }

    let res = sqlx::query("DELETE FROM departments WHERE id = ?")
        .bind(department_id)
        .execute(pool.get_ref())
        .await?;

    if res.rows_affected() == 0 {
        return Err(ApiError::not_found("Department"));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

const POSITION_COLUMNS: &str = "id, title, department_id, level, min_salary, max_salary";

#[utoipa::path(
    post,
    path = "/api/position",
    request_body = CreatePosition,
    responses(
        (status = 201, description = "Position created"),
        (status = 400, description = "Invalid salary band")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn create_position(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePosition>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    if payload.title.trim().is_empty() {
        return Err(ApiError::validation("Position title is required"));
    }
    if !(1..=5).contains(&payload.level) {
        return Err(ApiError::validation("Position level must be between 1 and 5"));
    }
    check_salary_band(payload.min_salary, payload.max_salary)?;

    let result = sqlx::query(
        r#"
        INSERT INTO positions (title, department_id, level, min_salary, max_salary)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.title.trim())
    .bind(payload.department_id)
    .bind(payload.level)
    .bind(payload.min_salary)
    .bind(payload.max_salary)
    .execute(pool.get_ref())
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Position created successfully",
        "id": result.last_insert_id()
    })))
}

#[derive(Deserialize)]
pub struct PositionQuery {
    pub department_id: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/position",
    params(("department_id" = Option<u64>, Query, description = "Only this department")),
    responses((status = 200, description = "Positions", body = [Position])),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn list_positions(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PositionQuery>,
) -> ApiResult<HttpResponse> {
    let rows = match query.department_id {
        Some(department_id) => {
            sqlx::query_as::<_, Position>(&format!(
                "SELECT {POSITION_COLUMNS} FROM positions WHERE department_id = ? ORDER BY level, title"
            ))
            .bind(department_id)
            .fetch_all(pool.get_ref())
            .await?
        }
        None => {
            sqlx::query_as::<_, Position>(&format!(
                "SELECT {POSITION_COLUMNS} FROM positions ORDER BY department_id, level, title"
            ))
            .fetch_all(pool.get_ref())
            .await?
        }
    };

    Ok(HttpResponse::Ok().json(rows))
}

async fn fetch_position(pool: &MySqlPool, id: u64) -> ApiResult<Position> {
    sqlx::query_as::<_, Position>(&format!(
        "SELECT {POSITION_COLUMNS} FROM positions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Position"))
}

#[utoipa::path(
    get,
    path = "/api/position/{id}",
    params(("id", Path, description = "Position ID")),
    responses(
        (status = 200, description = "Position found", body = Position),
        (status = 404, description = "Position not found")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn get_position(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let position = fetch_position(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(position))
}

#[utoipa::path(
    put,
    path = "/api/position/{id}",
    params(("id", Path, description = "Position ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Position updated"),
        (status = 400, description = "Invalid salary band")
    ),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn update_position(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let position_id = path.into_inner();

    // The band is checked against the merged row, not just the payload
    let current = fetch_position(pool.get_ref(), position_id).await?;
    let min = match body.get("min_salary") {
        Some(v) => v.as_f64(),
        None => current.min_salary,
    };
    let max = match body.get("max_salary") {
        Some(v) => v.as_f64(),
        None => current.max_salary,
    };
    check_salary_band(min, max)?;

    let update = build_update_sql(
        "positions",
        &body,
        &["title", "department_id", "level", "min_salary", "max_salary"],
        position_id,
    )?;
    execute_update(pool.get_ref(), update).await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Position updated successfully" })))
}

#[utoipa::path(
    delete,
    path = "/api/position/{id}",
    params(("id", Path, description = "Position ID")),
    responses((status = 200, description = "Position deleted")),
    tag = "Department",
    security(("bearer_auth" = []))
)]
pub async fn delete_position(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let res = sqlx::query("DELETE FROM positions WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if res.rows_affected() == 0 {
        return Err(ApiError::not_found("Position"));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salary_band_must_be_ordered() {
        assert!(check_salary_band(Some(100.0), Some(200.0)).is_ok());
        assert!(check_salary_band(Some(100.0), Some(100.0)).is_ok());
        assert!(check_salary_band(None, Some(1.0)).is_ok());
        assert!(check_salary_band(Some(300.0), Some(200.0)).is_err());
    }
}
