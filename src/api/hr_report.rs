use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{
        attendance::ATTENDANCE_COLUMNS,
        employee::EMPLOYEE_COLUMNS,
        payroll::slips_with_departments,
    },
    auth::auth::AuthUser,
    error::ApiResult,
    model::{attendance::Attendance, employee::Employee, leave_request::LeaveStatus},
    service::{
        attendance::summarize as attendance_summary,
        export::{ExportFormat, csv_response, metrics_csv, rows_to_csv},
        hr_stats::{DepartmentHeadcount, average_salary, headcount_report},
        payroll::summarize as payroll_totals,
        round2,
    },
    utils::db_utils::{SqlFilter, fetch_all_as},
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub department_id: Option<u64>,
    #[serde(default)]
    #[param(value_type = Option<String>)]
    pub format: ExportFormat,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HrOverview {
    pub active_headcount: i64,
    pub total_headcount: i64,
    pub pending_leave: i64,
    pub total_net_payroll: f64,
    pub average_salary: f64,
    pub by_department: Vec<DepartmentHeadcount>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PayrollReport {
    pub slip_count: i64,
    pub total_gross: f64,
    pub total_net: f64,
    pub total_deductions: f64,
    pub average_base_salary: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceReport {
    pub records: i64,
    pub average_attendance: f64,
    pub average_hours: f64,
    pub total_overtime: f64,
}

#[derive(sqlx::FromRow)]
struct EmployeeWithDepartment {
    #[sqlx(flatten)]
    employee: Employee,
    department: String,
}

async fn employees_with_departments(
    pool: &MySqlPool,
    department_id: Option<u64>,
) -> ApiResult<Vec<(Employee, String)>> {
    let mut filter = SqlFilter::new();
    filter.and_eq("e.department_id", department_id);

    let columns = EMPLOYEE_COLUMNS
        .split(", ")
        .map(|c| format!("e.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        r#"
        SELECT {columns}, COALESCE(d.name, 'Unassigned') AS department
        FROM employees e
        LEFT JOIN departments d ON d.id = e.department_id
        {}
        "#,
        filter.where_clause()
    );

    let rows = fetch_all_as::<EmployeeWithDepartment>(pool, &sql, filter.values()).await?;
    Ok(rows.into_iter().map(|r| (r.employee, r.department)).collect())
}

fn payroll_filter(query: &ReportQuery) -> SqlFilter {
    let mut filter = SqlFilter::new();
    filter
        .and_between("p.period_start", query.from, query.to)
        .and_eq("e.department_id", query.department_id);
    filter
}

#[utoipa::path(
    get,
    path = "/api/hr/reports/overview",
    params(ReportQuery),
    responses((status = 200, description = "HR overview", body = HrOverview)),
    security(("bearer_auth" = [])),
    tag = "HR Reports"
)]
pub async fn overview(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let employees = employees_with_departments(pool.get_ref(), query.department_id).await?;
    let headcount = headcount_report(&employees);

    let pending_leave = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM leave_requests WHERE status = ?",
    )
    .bind(LeaveStatus::Pending.as_ref())
    .fetch_one(pool.get_ref())
    .await?;

    let slips = slips_with_departments(pool.get_ref(), &payroll_filter(&query)).await?;
    let payroll = payroll_totals(&slips);

    let report = HrOverview {
        active_headcount: headcount.active,
        total_headcount: headcount.total,
        pending_leave,
        total_net_payroll: payroll.total_net,
        average_salary: average_salary(&employees),
        by_department: headcount.by_department,
    };

    if query.format == ExportFormat::Csv {
        return Ok(csv_response("hr-overview", rows_to_csv(&report.by_department)));
    }
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/hr/reports/headcount",
    params(ReportQuery),
    responses((status = 200, description = "Headcount breakdown", body = crate::service::hr_stats::HeadcountReport)),
    security(("bearer_auth" = [])),
    tag = "HR Reports"
)]
pub async fn headcount(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let employees = employees_with_departments(pool.get_ref(), query.department_id).await?;
    let report = headcount_report(&employees);

    if query.format == ExportFormat::Csv {
        return Ok(csv_response("headcount", rows_to_csv(&report.by_department)));
    }
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/hr/reports/payroll",
    params(ReportQuery),
    responses((status = 200, description = "Payroll report", body = PayrollReport)),
    security(("bearer_auth" = [])),
    tag = "HR Reports"
)]
pub async fn payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let slips = slips_with_departments(pool.get_ref(), &payroll_filter(&query)).await?;
    let totals = payroll_totals(&slips);
    let average_base_salary = if slips.is_empty() {
        0.0
    } else {
        round2(slips.iter().map(|(s, _)| s.basic_salary).sum::<f64>() / slips.len() as f64)
    };

    let report = PayrollReport {
        slip_count: totals.slip_count,
        total_gross: totals.total_gross,
        total_net: totals.total_net,
        total_deductions: totals.total_deductions,
        average_base_salary,
    };

    if query.format == ExportFormat::Csv {
        let body = metrics_csv(&[
            ("slip_count", report.slip_count.to_string()),
            ("total_gross", report.total_gross.to_string()),
            ("total_net", report.total_net.to_string()),
            ("total_deductions", report.total_deductions.to_string()),
            ("average_base_salary", report.average_base_salary.to_string()),
        ]);
        return Ok(csv_response("payroll-report", body));
    }
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/hr/reports/attendance",
    params(ReportQuery),
    responses((status = 200, description = "Attendance report", body = AttendanceReport)),
    security(("bearer_auth" = [])),
    tag = "HR Reports"
)]
pub async fn attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let mut filter = SqlFilter::new();
    filter.and_between("a.date", query.from, query.to);
    if let Some(department_id) = query.department_id {
        filter.and(
            "a.employee_id IN (SELECT id FROM employees WHERE department_id = ?)",
            department_id,
        );
    }

    let columns = ATTENDANCE_COLUMNS
        .split(", ")
        .map(|c| format!("a.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {columns} FROM attendance a {}",
        filter.where_clause()
    );
    let records = fetch_all_as::<Attendance>(pool.get_ref(), &sql, filter.values()).await?;
    let summary = attendance_summary(&records);

    let report = AttendanceReport {
        records: summary.total,
        average_attendance: summary.attendance_rate,
        average_hours: summary.average_hours,
        total_overtime: summary.total_overtime,
    };

    if query.format == ExportFormat::Csv {
        let body = metrics_csv(&[
            ("records", report.records.to_string()),
            ("average_attendance", report.average_attendance.to_string()),
            ("average_hours", report.average_hours.to_string()),
            ("total_overtime", report.total_overtime.to_string()),
        ]);
        return Ok(csv_response("attendance-report", body));
    }
    Ok(HttpResponse::Ok().json(report))
}
