use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::shift::{ScheduledShift, Shift},
    utils::db_utils::{SqlFilter, fetch_all_as},
};

#[derive(Deserialize, ToSchema)]
pub struct CreateShift {
    #[schema(example = "Night")]
    pub name: String,
    #[schema(example = "22:00:00", value_type = String)]
    pub start_time: NaiveTime,
    /// May be earlier than `start_time` for shifts that cross midnight
    #[schema(example = "06:00:00", value_type = String)]
    pub end_time: NaiveTime,
    pub location_id: Option<u64>,
    #[serde(default = "default_break")]
    pub break_minutes: i32,
}

fn default_break() -> i32 {
    60
}

#[derive(Deserialize, ToSchema)]
pub struct AssignShift {
    pub employee_id: u64,
    pub shift_id: u64,
    #[schema(value_type = String, format = "date", example = "2026-03-02")]
    pub date: NaiveDate,
}

#[derive(Deserialize, IntoParams)]
pub struct ScheduleQuery {
    pub employee_id: Option<u64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
pub struct OnShiftQuery {
    pub location_id: Option<u64>,
    /// Defaults to today
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct StaffOnShift {
    pub employee_id: u64,
    pub full_name: String,
    pub shift_name: String,
    #[schema(value_type = String)]
    pub start_time: NaiveTime,
    #[schema(value_type = String)]
    pub end_time: NaiveTime,
}

/// Paid minutes of a shift, wrapping past midnight when it ends before it starts.
pub fn shift_minutes(start: NaiveTime, end: NaiveTime, break_minutes: i32) -> i64 {
    let mut span = (end - start).num_minutes();
    if span <= 0 {
        span += 24 * 60;
    }
    (span - break_minutes as i64).max(0)
}

#[utoipa::path(
    post,
    path = "/api/shift",
    request_body = CreateShift,
    responses(
        (status = 201, description = "Shift created", body = Object, example = json!({
            "message": "Shift created", "id": 2, "paid_minutes": 420
        })),
        (status = 400, description = "Invalid shift")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn create_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateShift>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("Shift name is required"));
    }
    if payload.break_minutes < 0 {
        return Err(ApiError::validation("Break cannot be negative"));
    }
    let paid_minutes = shift_minutes(payload.start_time, payload.end_time, payload.break_minutes);
    if paid_minutes == 0 {
        return Err(ApiError::validation("Break is longer than the shift"));
    }

    let result = sqlx::query(
        "INSERT INTO shifts (name, start_time, end_time, location_id, break_minutes) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(payload.name.trim())
    .bind(payload.start_time)
    .bind(payload.end_time)
    .bind(payload.location_id)
    .bind(payload.break_minutes)
    .execute(pool.get_ref())
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Shift created",
        "id": result.last_insert_id(),
        "paid_minutes": paid_minutes
    })))
}

#[utoipa::path(
    get,
    path = "/api/shift",
    responses((status = 200, description = "All shifts", body = [Shift])),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn list_shifts(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let shifts = sqlx::query_as::<_, Shift>(
        "SELECT id, name, start_time, end_time, location_id, break_minutes FROM shifts ORDER BY start_time",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(shifts))
}

/// One shift per employee per day; assigning again replaces it.
#[utoipa::path(
    post,
    path = "/api/shift/assign",
    request_body = AssignShift,
    responses(
        (status = 200, description = "Shift assigned"),
        (status = 404, description = "Shift not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn assign_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<AssignShift>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let shift_exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM shifts WHERE id = ?)")
        .bind(payload.shift_id)
        .fetch_one(pool.get_ref())
        .await?;
    if !shift_exists {
        return Err(ApiError::not_found("Shift"));
    }

    sqlx::query(
        r#"
        INSERT INTO shift_assignments (employee_id, shift_id, date)
        VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE shift_id = VALUES(shift_id)
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.shift_id)
    .bind(payload.date)
    .execute(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Shift assigned" })))
}

#[utoipa::path(
    get,
    path = "/api/shift/schedule",
    params(ScheduleQuery),
    responses((status = 200, description = "Assignments with shift times", body = [ScheduledShift])),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn employee_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ScheduleQuery>,
) -> ApiResult<HttpResponse> {
    let employee_id = if auth.is_hr() {
        query.employee_id
    } else {
        Some(auth.resolve_employee(query.employee_id)?)
    };

    let mut filter = SqlFilter::new();
    filter
        .and_eq("a.employee_id", employee_id)
        .and_between("a.date", query.from, query.to);

    let sql = format!(
        r#"
        SELECT a.id AS assignment_id, a.employee_id, a.date, s.id AS shift_id,
               s.name AS shift_name, s.start_time, s.end_time
        FROM shift_assignments a
        JOIN shifts s ON s.id = a.shift_id
        {}
        ORDER BY a.date, s.start_time
        "#,
        filter.where_clause()
    );
    let rows = fetch_all_as::<ScheduledShift>(pool.get_ref(), &sql, filter.values()).await?;

    Ok(HttpResponse::Ok().json(rows))
}

/// Staff picker for the till.
#[utoipa::path(
    get,
    path = "/api/shift/on-shift",
    params(OnShiftQuery),
    responses((status = 200, description = "Employees working that day", body = [StaffOnShift])),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn staff_on_shift(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<OnShiftQuery>,
) -> ApiResult<HttpResponse> {
    let date = query.date.unwrap_or_else(|| Local::now().date_naive());

    let mut filter = SqlFilter::new();
    filter.and("a.date = ?", date).and_raw("e.status <> 'terminated'");
    if let Some(location_id) = query.location_id {
        filter.and("(s.location_id = ? OR s.location_id IS NULL)", location_id);
    }

    let sql = format!(
        r#"
        SELECT e.id AS employee_id, CONCAT(e.first_name, ' ', e.last_name) AS full_name,
               s.name AS shift_name, s.start_time, s.end_time
        FROM shift_assignments a
        JOIN shifts s ON s.id = a.shift_id
        JOIN employees e ON e.id = a.employee_id
        {}
        ORDER BY s.start_time, full_name
        "#,
        filter.where_clause()
    );
    let rows = fetch_all_as::<StaffOnShift>(pool.get_ref(), &sql, filter.values()).await?;

    Ok(HttpResponse::Ok().json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn day_shift_minutes() {
        assert_eq!(shift_minutes(t(8, 0), t(16, 0), 60), 420);
    }

    #[test]
    fn night_shift_wraps_midnight() {
        assert_eq!(shift_minutes(t(22, 0), t(6, 0), 30), 450);
    }

    #[test]
    fn break_longer_than_shift_is_zero() {
        assert_eq!(shift_minutes(t(9, 0), t(10, 0), 90), 0);
    }
}
