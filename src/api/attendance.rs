use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::attendance::{Attendance, AttendanceStatus},
    service::attendance::{overtime_hours, status_for_clock_in, summarize, worked_hours},
    utils::db_utils::{PageRequest, SqlFilter, fetch_all_as, fetch_page},
};

pub(crate) const ATTENDANCE_COLUMNS: &str =
    "id, employee_id, date, clock_in, clock_out, status, hours_worked, overtime_hours, notes";

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ClockReq {
    /// HR may clock someone else in or out
    pub employee_id: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordAttendanceReq {
    pub employee_id: u64,
    #[schema(value_type = String, format = "date", example = "2026-03-02")]
    pub date: NaiveDate,
    /// One of `absent`, `leave` or `half_day`
    pub status: AttendanceStatus,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AttendanceQuery {
    pub employee_id: Option<u64>,
    pub status: Option<AttendanceStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl AttendanceQuery {
    fn filter(&self, auth: &AuthUser) -> ApiResult<SqlFilter> {
        let employee_id = if auth.is_hr() {
            self.employee_id
        } else {
            Some(auth.resolve_employee(self.employee_id)?)
        };
        let mut filter = SqlFilter::new();
        filter
            .and_eq("employee_id", employee_id)
            .and_eq("status", self.status.map(|s| s.to_string()))
            .and_between("date", self.from, self.to);
        Ok(filter)
    }
}

/// Clock-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/clock-in",
    request_body = ClockReq,
    responses(
        (status = 200, description = "Clocked in successfully", body = Object, example = json!({
            "message": "Clocked in successfully", "status": "present"
        })),
        (status = 409, description = "Already clocked in", body = Object, example = json!({
            "code": "CONFLICT", "message": "Already clocked in"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn clock_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: Option<web::Json<ClockReq>>,
) -> ApiResult<HttpResponse> {
    let requested = body.and_then(|b| b.employee_id);
    let employee_id = auth.resolve_employee(requested)?;

    let now = Local::now().naive_local();
    let today = now.date();

    let existing = sqlx::query_as::<_, (u64, Option<chrono::NaiveDateTime>)>(
        "SELECT id, clock_out FROM attendance WHERE employee_id = ? AND date = ?",
    )
    .bind(employee_id)
    .bind(today)
    .fetch_optional(pool.get_ref())
    .await?;

    match existing {
        Some((_, None)) => return Err(ApiError::conflict("Already clocked in")),
        Some((_, Some(_))) => {
            return Err(ApiError::conflict("Attendance already recorded for today"));
        }
        None => {}
    }

    let status = status_for_clock_in(now.time(), config.policy.late_after);

    sqlx::query(
        r#"
        INSERT INTO attendance (employee_id, date, clock_in, status)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(today)
    .bind(now)
    .bind(status.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        // lost a race with a concurrent clock-in
        ApiError::Conflict(_) => ApiError::conflict("Already clocked in"),
        other => {
            error!(error = %other, employee_id, "Clock-in failed");
            other
        }
    })?;

    info!(employee_id, status = %status, "Clocked in");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Clocked in successfully",
        "status": status
    })))
}

/// Clock-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/clock-out",
    request_body = ClockReq,
    responses(
        (status = 200, description = "Clocked out successfully", body = Object, example = json!({
            "message": "Clocked out successfully", "hours_worked": 8.5, "overtime_hours": 0.5
        })),
        (status = 400, description = "No active check-in found for today", body = Object, example = json!({
            "code": "VALIDATION_FAILED", "message": "No active check-in found for today"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn clock_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: Option<web::Json<ClockReq>>,
) -> ApiResult<HttpResponse> {
    let requested = body.and_then(|b| b.employee_id);
    let employee_id = auth.resolve_employee(requested)?;

    let now = Local::now().naive_local();

    let open = sqlx::query_as::<_, (u64, chrono::NaiveDateTime)>(
        r#"
        SELECT id, clock_in FROM attendance
        WHERE employee_id = ? AND date = ? AND clock_in IS NOT NULL AND clock_out IS NULL
        ORDER BY clock_in DESC
        LIMIT 1
        "#,
    )
    .bind(employee_id)
    .bind(now.date())
    .fetch_optional(pool.get_ref())
    .await?;

    let Some((record_id, clocked_in)) = open else {
        return Err(ApiError::validation("No active check-in found for today"));
    };

    let hours = worked_hours(clocked_in, now)?;
    let overtime = overtime_hours(hours, config.policy.standard_daily_hours);

    sqlx::query(
        "UPDATE attendance SET clock_out = ?, hours_worked = ?, overtime_hours = ? WHERE id = ?",
    )
    .bind(now)
    .bind(hours)
    .bind(overtime)
    .bind(record_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, employee_id, "Clock-out failed");
        ApiError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Clocked out successfully",
        "hours_worked": hours,
        "overtime_hours": overtime
    })))
}

/// HR entry for days with no clocking: absence, leave or half days.
#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = RecordAttendanceReq,
    responses(
        (status = 201, description = "Attendance recorded"),
        (status = 400, description = "Status must be absent, leave or half_day"),
        (status = 409, description = "Attendance already recorded for that day")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn record_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<RecordAttendanceReq>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    if !matches!(
        payload.status,
        AttendanceStatus::Absent | AttendanceStatus::Leave | AttendanceStatus::HalfDay
    ) {
        return Err(ApiError::validation(
            "Only absent, leave or half_day can be recorded directly",
        ));
    }

    let result = sqlx::query(
        "INSERT INTO attendance (employee_id, date, status, notes) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.employee_id)
    .bind(payload.date)
    .bind(payload.status.as_ref())
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Attendance already recorded for that day"),
        other => other,
    })?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Attendance recorded",
        "id": result.last_insert_id()
    })))
}

#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses((status = 200, description = "Paginated attendance records")),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceQuery>,
) -> ApiResult<HttpResponse> {
    let filter = query.filter(&auth)?;

    let page = fetch_page::<Attendance>(
        pool.get_ref(),
        ATTENDANCE_COLUMNS,
        "FROM attendance",
        &filter,
        "date DESC, id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/attendance/summary",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Attendance summary", body = crate::service::attendance::AttendanceSummary)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn attendance_summary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceQuery>,
) -> ApiResult<HttpResponse> {
    let filter = query.filter(&auth)?;

    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance {}",
        filter.where_clause()
    );
    let records = fetch_all_as::<Attendance>(pool.get_ref(), &sql, filter.values()).await?;

    Ok(HttpResponse::Ok().json(summarize(&records)))
}
