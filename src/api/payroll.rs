use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::employee::fetch_employee,
    auth::auth::AuthUser,
    config::{Config, Policy},
    error::{ApiError, ApiResult},
    model::{
        employee::SalaryType,
        payroll::{PayrollSlip, PayrollStatus},
    },
    service::payroll::{
        PayrollCalculation, PayslipComponents, calculate, ensure_editable, ensure_payable,
        payslip_totals, summarize,
    },
    utils::db_utils::{PageRequest, SqlFilter, fetch_all_as, fetch_page},
};

pub(crate) const PAYROLL_COLUMNS: &str = "id, employee_id, period_start, period_end, basic_salary, \
    overtime_pay, bonuses, allowances, tax, insurance, other_deductions, gross_salary, net_salary, \
    days_worked, hours_worked, overtime_hours, status, payment_date, payment_method, created_at";

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct PeriodQuery {
    #[schema(example = 1001)]
    pub employee_id: u64,
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub period_start: NaiveDate,
    #[schema(example = "2026-01-31", value_type = String, format = "date")]
    pub period_end: NaiveDate,
}

#[derive(Deserialize, ToSchema)]
pub struct GeneratePayslip {
    #[schema(example = 1001)]
    pub employee_id: u64,
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub period_start: NaiveDate,
    #[schema(example = "2026-01-31", value_type = String, format = "date")]
    pub period_end: NaiveDate,
    #[serde(default)]
    #[schema(example = 5000.0)]
    pub bonuses: f64,
    #[serde(default)]
    pub allowances: f64,
    #[serde(default)]
    pub insurance: f64,
    #[serde(default)]
    pub other_deductions: f64,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePayroll {
    pub basic_salary: Option<f64>,
    pub overtime_pay: Option<f64>,
    #[schema(example = 6000.0)]
    pub bonuses: Option<f64>,
    pub allowances: Option<f64>,
    pub insurance: Option<f64>,
    pub other_deductions: Option<f64>,
}

#[derive(Deserialize, ToSchema)]
pub struct MarkPaid {
    #[schema(example = "bank_transfer")]
    pub payment_method: String,
    /// Defaults to today
    #[schema(value_type = Option<String>, format = "date")]
    pub payment_date: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct PayrollQuery {
    #[schema(example = 1)]
    pub page: Option<u32>,
    #[schema(example = 10)]
    pub per_page: Option<u32>,
    #[schema(example = 1001)]
    pub employee_id: Option<u64>,
    pub status: Option<PayrollStatus>,
    /// Slips whose period starts on or after this date
    #[schema(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedPayrollResponse {
    pub data: Vec<PayrollSlip>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(sqlx::FromRow)]
struct SlipWithDepartment {
    #[sqlx(flatten)]
    slip: PayrollSlip,
    department: String,
}

fn check_period(start: NaiveDate, end: NaiveDate) -> ApiResult<()> {
    if end < start {
        return Err(ApiError::validation("Period end cannot be before period start"));
    }
    Ok(())
}

/// Salary terms plus completed attendance in the period.
async fn compute(
    pool: &MySqlPool,
    policy: &Policy,
    employee_id: u64,
    start: NaiveDate,
    end: NaiveDate,
) -> ApiResult<PayrollCalculation> {
    check_period(start, end)?;

    let employee = fetch_employee(pool, employee_id).await?;
    let salary_type: SalaryType = employee.salary_type.parse().map_err(|_| {
        ApiError::Internal(format!("Unknown salary type '{}'", employee.salary_type))
    })?;

    let daily_hours = sqlx::query_scalar::<_, f64>(
        r#"
        SELECT COALESCE(hours_worked, 0) FROM attendance
        WHERE employee_id = ? AND date BETWEEN ? AND ?
        AND clock_in IS NOT NULL AND clock_out IS NOT NULL
        "#,
    )
    .bind(employee_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    calculate(employee.salary, salary_type, &daily_hours, policy)
}

async fn fetch_slip(pool: &MySqlPool, payroll_id: u64) -> ApiResult<PayrollSlip> {
    sqlx::query_as::<_, PayrollSlip>(&format!(
        "SELECT {PAYROLL_COLUMNS} FROM payroll_slips WHERE id = ?"
    ))
    .bind(payroll_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Payslip"))
}

#[utoipa::path(
    get,
    path = "/api/payroll/calculate",
    params(PeriodQuery),
    responses(
        (status = 200, description = "Earnings for the period", body = PayrollCalculation),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn calculate_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<PeriodQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let calc = compute(
        pool.get_ref(),
        &config.policy,
        query.employee_id,
        query.period_start,
        query.period_end,
    )
    .await?;

    Ok(HttpResponse::Ok().json(calc))
}

#[utoipa::path(
    post,
    path = "/api/payroll",
    request_body = GeneratePayslip,
    responses(
        (status = 201, description = "Payslip generated", body = Object, example = json!({
            "message": "Payslip generated", "id": 7, "gross_salary": 455000.0, "net_salary": 386750.0
        })),
        (status = 409, description = "Payslip already exists for this period"),
        (status = 401),
        (status = 403)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn generate_payslip(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<GeneratePayslip>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let calc = compute(
        pool.get_ref(),
        &config.policy,
        payload.employee_id,
        payload.period_start,
        payload.period_end,
    )
    .await?;

    let components = PayslipComponents {
        basic_salary: calc.basic_salary,
        overtime_pay: calc.overtime_pay,
        bonuses: payload.bonuses,
        allowances: payload.allowances,
        insurance: payload.insurance,
        other_deductions: payload.other_deductions,
    };
    let totals = payslip_totals(&components, config.policy.payroll_tax_rate)?;

    let result = sqlx::query(
        r#"
        INSERT INTO payroll_slips
        (employee_id, period_start, period_end, basic_salary, overtime_pay, bonuses, allowances,
         tax, insurance, other_deductions, gross_salary, net_salary, days_worked, hours_worked,
         overtime_hours, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.period_start)
    .bind(payload.period_end)
    .bind(components.basic_salary)
    .bind(components.overtime_pay)
    .bind(components.bonuses)
    .bind(components.allowances)
    .bind(totals.tax)
    .bind(components.insurance)
    .bind(components.other_deductions)
    .bind(totals.gross_salary)
    .bind(totals.net_salary)
    .bind(calc.days_worked)
    .bind(calc.hours_worked)
    .bind(calc.overtime_hours)
    .bind(PayrollStatus::Processed.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Payslip already exists for this period"),
        other => {
            error!(error = %other, employee_id = payload.employee_id, "Generate payslip failed");
            other
        }
    })?;

    info!(
        payroll_id = result.last_insert_id(),
        employee_id = payload.employee_id,
        "Payslip generated"
    );

    Ok(HttpResponse::Created().json(json!({
        "message": "Payslip generated",
        "id": result.last_insert_id(),
        "gross_salary": totals.gross_salary,
        "net_salary": totals.net_salary
    })))
}

#[utoipa::path(
    put,
    path = "/api/payroll/{payroll_id}",
    request_body = UpdatePayroll,
    params(
        ("payroll_id", description = "Payroll ID")
    ),
    responses(
        (status = 200, description = "Payslip recomputed", body = crate::service::payroll::PayslipTotals),
        (status = 400, description = "Payslip already paid"),
        (status = 404, description = "Payslip not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn update_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
    payload: web::Json<UpdatePayroll>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let payroll_id = path.into_inner();

    let slip = fetch_slip(pool.get_ref(), payroll_id).await?;
    ensure_editable(&slip.status)?;

    let merged = PayslipComponents {
        basic_salary: payload.basic_salary.unwrap_or(slip.basic_salary),
        overtime_pay: payload.overtime_pay.unwrap_or(slip.overtime_pay),
        bonuses: payload.bonuses.unwrap_or(slip.bonuses),
        allowances: payload.allowances.unwrap_or(slip.allowances),
        insurance: payload.insurance.unwrap_or(slip.insurance),
        other_deductions: payload.other_deductions.unwrap_or(slip.other_deductions),
    };
    let totals = payslip_totals(&merged, config.policy.payroll_tax_rate)?;

    sqlx::query(
        r#"
        UPDATE payroll_slips
        SET basic_salary = ?, overtime_pay = ?, bonuses = ?, allowances = ?, insurance = ?,
            other_deductions = ?, tax = ?, gross_salary = ?, net_salary = ?
        WHERE id = ?
        "#,
    )
    .bind(merged.basic_salary)
    .bind(merged.overtime_pay)
    .bind(merged.bonuses)
    .bind(merged.allowances)
    .bind(merged.insurance)
    .bind(merged.other_deductions)
    .bind(totals.tax)
    .bind(totals.gross_salary)
    .bind(totals.net_salary)
    .bind(payroll_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, payroll_id, "Update payroll failed");
        ApiError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(totals))
}

#[utoipa::path(
    put,
    path = "/api/payroll/{payroll_id}/pay",
    request_body = MarkPaid,
    params(
        ("payroll_id", description = "Payroll ID")
    ),
    responses(
        (status = 200, description = "Payslip marked paid", body = Object, example = json!({
            "message": "Payslip marked as paid"
        })),
        (status = 400, description = "Payslip is not processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn mark_paid(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<MarkPaid>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let payroll_id = path.into_inner();

    if payload.payment_method.trim().is_empty() {
        return Err(ApiError::validation("Payment method is required"));
    }

    let slip = fetch_slip(pool.get_ref(), payroll_id).await?;
    ensure_payable(&slip.status)?;

    let payment_date = payload
        .payment_date
        .unwrap_or_else(|| Local::now().date_naive());

    sqlx::query(
        "UPDATE payroll_slips SET status = ?, payment_method = ?, payment_date = ? WHERE id = ? AND status = ?",
    )
    .bind(PayrollStatus::Paid.as_ref())
    .bind(payload.payment_method.trim())
    .bind(payment_date)
    .bind(payroll_id)
    .bind(PayrollStatus::Processed.as_ref())
    .execute(pool.get_ref())
    .await?;

    info!(payroll_id, "Payslip paid");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Payslip marked as paid"
    })))
}

#[utoipa::path(
    get,
    path = "/api/payroll/{payroll_id}",
    params(
        ("payroll_id", description = "Payroll ID")
    ),
    responses(
        (status = 200, description = "Payslip", body = PayrollSlip),
        (status = 404, description = "Payslip not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let slip = fetch_slip(pool.get_ref(), path.into_inner()).await?;
    auth.resolve_employee(Some(slip.employee_id))?;

    Ok(HttpResponse::Ok().json(slip))
}

impl PayrollQuery {
    fn to_filter(&self, auth: &AuthUser) -> ApiResult<SqlFilter> {
        let employee_id = if auth.is_hr() {
            self.employee_id
        } else {
            Some(auth.resolve_employee(self.employee_id)?)
        };
        let mut filter = SqlFilter::new();
        filter
            .and_eq("p.employee_id", employee_id)
            .and_eq("p.status", self.status.map(|s| s.to_string()))
            .and_between("p.period_start", self.from, self.to);
        Ok(filter)
    }
}

#[utoipa::path(
    get,
    path = "/api/payroll",
    params(PayrollQuery),
    responses(
        (status = 200, description = "Paginated payslips", body = PaginatedPayrollResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_payrolls(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PayrollQuery>,
) -> ApiResult<HttpResponse> {
    let filter = query.to_filter(&auth)?;

    let page = fetch_page::<PayrollSlip>(
        pool.get_ref(),
        "p.*",
        "FROM payroll_slips p",
        &filter,
        "p.period_start DESC, p.id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

pub(crate) async fn slips_with_departments(
    pool: &MySqlPool,
    filter: &SqlFilter,
) -> ApiResult<Vec<(PayrollSlip, String)>> {
    let sql = format!(
        r#"
        SELECT p.*, COALESCE(d.name, 'Unassigned') AS department
        FROM payroll_slips p
        JOIN employees e ON e.id = p.employee_id
        LEFT JOIN departments d ON d.id = e.department_id
        {}
        "#,
        filter.where_clause()
    );
    let rows = fetch_all_as::<SlipWithDepartment>(pool, &sql, filter.values()).await?;
    Ok(rows.into_iter().map(|r| (r.slip, r.department)).collect())
}

#[utoipa::path(
    get,
    path = "/api/payroll/summary",
    params(PayrollQuery),
    responses(
        (status = 200, description = "Payroll totals", body = crate::service::payroll::PayrollSummary)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn payroll_summary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PayrollQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let filter = query.to_filter(&auth)?;

    let slips = slips_with_departments(pool.get_ref(), &filter).await?;
    Ok(HttpResponse::Ok().json(summarize(&slips)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_must_be_ordered() {
        let jan1 = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let jan31 = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert!(check_period(jan1, jan31).is_ok());
        assert!(check_period(jan1, jan1).is_ok());
        assert!(check_period(jan31, jan1).is_err());
    }
}
