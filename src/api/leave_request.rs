use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::leave_request::{LeaveRequest, LeaveStatus, LeaveType},
    service::leave::{
        balance_column, check_balance, ensure_pending, inclusive_days, leave_balances, leave_stats,
    },
    utils::db_utils::{PageRequest, SqlFilter, fetch_all_as, fetch_page},
};

const LEAVE_COLUMNS: &str = "id, employee_id, leave_type, start_date, end_date, days_requested, \
    status, reason, rejection_reason, approved_by, approved_at, created_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    /// HR may file on behalf of an employee
    pub employee_id: Option<u64>,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-03", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "sick")]
    pub leave_type: LeaveType,
    #[schema(example = "Flu")]
    pub reason: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RejectLeave {
    #[schema(example = "Peak season")]
    pub reason: String,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    #[schema(example = 123)]
    /// Filter by employee ID
    pub employee_id: Option<u64>,
    pub status: Option<LeaveStatus>,
    pub leave_type: Option<LeaveType>,
    /// Requests starting on or after this date
    #[schema(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl LeaveFilter {
    fn to_filter(&self, auth: &AuthUser) -> ApiResult<SqlFilter> {
        // Non-HR callers only ever see their own requests
        let employee_id = if auth.is_hr() {
            self.employee_id
        } else {
            Some(auth.resolve_employee(self.employee_id)?)
        };
        let mut filter = SqlFilter::new();
        filter
            .and_eq("employee_id", employee_id)
            .and_eq("status", self.status.map(|s| s.to_string()))
            .and_eq("leave_type", self.leave_type.map(|t| t.to_string()))
            .and_between("start_date", self.from, self.to);
        Ok(filter)
    }
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveRequest>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

async fn lock_leave(conn: &mut MySqlConnection, leave_id: u64) -> ApiResult<LeaveRequest> {
    sqlx::query_as::<_, LeaveRequest>(&format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ? FOR UPDATE"
    ))
    .bind(leave_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Leave request"))
}

fn parse_leave_type(raw: &str) -> ApiResult<LeaveType> {
    raw.parse()
        .map_err(|_| ApiError::Internal(format!("Stored leave type '{raw}' is unknown")))
}

/* =========================
Create leave
========================= */
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body = CreateLeave,
    responses(
        (status = 201, description = "Leave request created", body = Object, example = json!({
            "message": "Leave request submitted", "id": 4, "days_requested": 3, "status": "pending"
        })),
        (status = 400, description = "Invalid dates or missing reason"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeave>,
) -> ApiResult<HttpResponse> {
    let employee_id = auth.resolve_employee(payload.employee_id)?;

    if payload.reason.trim().is_empty() {
        return Err(ApiError::validation("A reason is required"));
    }
    let days = inclusive_days(payload.start_date, payload.end_date)?;

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests (employee_id, leave_type, start_date, end_date, days_requested, reason)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.leave_type.as_ref())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(days)
    .bind(payload.reason.trim())
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, employee_id, "Create leave failed");
        ApiError::from(e)
    })?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Leave request submitted",
        "id": result.last_insert_id(),
        "days_requested": days,
        "status": LeaveStatus::Pending
    })))
}

/* =========================
Approve leave (HR/Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to approve")
    ),
    responses(
        (status = 200, description = "Leave approved successfully", body = Object, example = json!({
            "message": "Leave approved"
        })),
        (status = 400, description = "Not pending, or insufficient balance", body = Object, example = json!({
            "code": "VALIDATION_FAILED", "message": "Insufficient annual leave balance"
        })),
        (status = 404, description = "Leave request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let leave_id = path.into_inner();

    let mut tx = pool.begin().await?;

    let leave = lock_leave(&mut tx, leave_id).await?;
    ensure_pending(&leave.status)?;

    let leave_type = parse_leave_type(&leave.leave_type)?;
    if let Some(column) = balance_column(leave_type) {
        let balance = sqlx::query_scalar::<_, i32>(&format!(
            "SELECT {column} FROM employees WHERE id = ? FOR UPDATE"
        ))
        .bind(leave.employee_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee"))?;

        check_balance(leave_type, balance, leave.days_requested)?;

        sqlx::query(&format!(
            "UPDATE employees SET {column} = {column} - ? WHERE id = ?"
        ))
        .bind(leave.days_requested)
        .bind(leave.employee_id)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?, approved_by = ?, approved_at = NOW()
        WHERE id = ?
        "#,
    )
    .bind(LeaveStatus::Approved.as_ref())
    .bind(auth.user_id)
    .bind(leave_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await.map_err(|e| {
        error!(error = %e, leave_id, "Approve leave failed");
        ApiError::from(e)
    })?;

    info!(leave_id, approved_by = auth.user_id, "Leave approved");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Leave approved"
    })))
}

/* =========================
Reject leave (HR/Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to reject")
    ),
    request_body = RejectLeave,
    responses(
        (status = 200, description = "Leave rejected successfully", body = Object, example = json!({
            "message": "Leave rejected"
        })),
        (status = 400, description = "Leave request already processed"),
        (status = 404, description = "Leave request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RejectLeave>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let leave_id = path.into_inner();

    if payload.reason.trim().is_empty() {
        return Err(ApiError::validation("A rejection reason is required"));
    }

    let mut tx = pool.begin().await?;
    let leave = lock_leave(&mut tx, leave_id).await?;
    ensure_pending(&leave.status)?;

    sqlx::query(
        "UPDATE leave_requests SET status = ?, rejection_reason = ?, approved_by = ? WHERE id = ?",
    )
    .bind(LeaveStatus::Rejected.as_ref())
    .bind(payload.reason.trim())
    .bind(auth.user_id)
    .bind(leave_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Leave rejected"
    })))
}

/* =========================
Cancel leave
========================= */
/// Owners may withdraw a pending request. HR may also cancel an approved
/// one, which hands the deducted days back.
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/cancel",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to cancel")
    ),
    responses(
        (status = 200, description = "Leave cancelled", body = Object, example = json!({
            "message": "Leave cancelled", "restored_days": 0
        })),
        (status = 400, description = "Request can no longer be cancelled"),
        (status = 403, description = "Not your request")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let leave_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let leave = lock_leave(&mut tx, leave_id).await?;

    if !auth.is_hr() && auth.employee_id != Some(leave.employee_id) {
        return Err(ApiError::Forbidden("Not your leave request".into()));
    }

    let mut restored_days = 0;
    if leave.status == LeaveStatus::Approved.as_ref() && auth.is_hr() {
        let leave_type = parse_leave_type(&leave.leave_type)?;
        if let Some(column) = balance_column(leave_type) {
            sqlx::query(&format!(
                "UPDATE employees SET {column} = {column} + ? WHERE id = ?"
            ))
            .bind(leave.days_requested)
            .bind(leave.employee_id)
            .execute(&mut *tx)
            .await?;
            restored_days = leave.days_requested;
        }
    } else {
        ensure_pending(&leave.status)?;
    }

    sqlx::query("UPDATE leave_requests SET status = ? WHERE id = ?")
        .bind(LeaveStatus::Cancelled.as_ref())
        .bind(leave_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(leave_id, restored_days, "Leave cancelled");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Leave cancelled",
        "restored_days": restored_days
    })))
}

/* =========================
Get leave by ID
========================= */
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request")
    ),
    responses(
        (status = 200, description = "Leave request", body = LeaveRequest),
        (status = 404, description = "Leave request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let leave = sqlx::query_as::<_, LeaveRequest>(&format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ?"
    ))
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Leave request"))?;

    auth.resolve_employee(Some(leave.employee_id))?;

    Ok(HttpResponse::Ok().json(leave))
}

/* =========================
List leaves
========================= */
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave requests", body = LeaveListResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> ApiResult<HttpResponse> {
    let filter = query.to_filter(&auth)?;

    let page = fetch_page::<LeaveRequest>(
        pool.get_ref(),
        LEAVE_COLUMNS,
        "FROM leave_requests",
        &filter,
        "created_at DESC, id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/leave/stats",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Leave statistics", body = crate::service::leave::LeaveStats)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave_stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> ApiResult<HttpResponse> {
    let filter = query.to_filter(&auth)?;
    let sql = format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests {}",
        filter.where_clause()
    );
    let requests = fetch_all_as::<LeaveRequest>(pool.get_ref(), &sql, filter.values()).await?;

    Ok(HttpResponse::Ok().json(leave_stats(&requests)))
}

#[derive(Deserialize, IntoParams)]
pub struct BalanceQuery {
    pub employee_id: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/leave/balances",
    params(BalanceQuery),
    responses(
        (status = 200, description = "Allotment, used and remaining days per leave type", body = [crate::service::leave::LeaveBalance])
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave_balances(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<BalanceQuery>,
) -> ApiResult<HttpResponse> {
    let employee_id = auth.resolve_employee(query.employee_id)?;

    let requests = sqlx::query_as::<_, LeaveRequest>(&format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE employee_id = ? AND status = ?"
    ))
    .bind(employee_id)
    .bind(LeaveStatus::Approved.as_ref())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "employee_id": employee_id,
        "balances": leave_balances(&config.policy, &requests)
    })))
}
