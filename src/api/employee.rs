use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::employee::{Employee, EmployeeStatus, EmploymentType, SalaryType},
    utils::db_utils::{
        PageRequest, SqlFilter, build_update_sql, check_enum_field, execute_update, fetch_page,
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

/// Columns a client may change through `update_employee`.
const UPDATABLE: &[&str] = &[
    "employee_code",
    "first_name",
    "last_name",
    "email",
    "phone",
    "department_id",
    "position_id",
    "location_id",
    "hire_date",
    "probation_end_date",
    "salary",
    "salary_type",
    "employment_type",
    "status",
];

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "EMP-3000")]
    pub employee_code: String,
    #[schema(example = "Mary")]
    pub first_name: String,
    #[schema(example = "Phiri")]
    pub last_name: String,
    #[schema(example = "mary@email.com", format = "email")]
    pub email: String,
    pub phone: Option<String>,
    #[schema(example = 1)]
    pub department_id: Option<u64>,
    #[schema(example = 2)]
    pub position_id: Option<u64>,
    pub location_id: Option<u64>,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub hire_date: NaiveDate,
    #[schema(format = "date", value_type = Option<String>)]
    pub probation_end_date: Option<NaiveDate>,
    #[schema(example = 450000.0)]
    pub salary: f64,
    pub salary_type: Option<SalaryType>,
    pub employment_type: Option<EmploymentType>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub department_id: Option<u64>,
    pub position_id: Option<u64>,
    pub location_id: Option<u64>,
    pub status: Option<EmployeeStatus>,
    pub employment_type: Option<EmploymentType>,
    /// Name, email or employee code
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Employee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 10)]
    pub total: i64,
}

pub(crate) const EMPLOYEE_COLUMNS: &str = "id, employee_code, first_name, last_name, email, phone, \
    department_id, position_id, location_id, hire_date, probation_end_date, salary, salary_type, \
    employment_type, status, annual_leave_balance, sick_leave_balance";

pub(crate) async fn fetch_employee(pool: &MySqlPool, employee_id: u64) -> ApiResult<Employee> {
    sqlx::query_as::<_, Employee>(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"
    ))
    .bind(employee_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Employee"))
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employee",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created successfully", body = Object, example = json!({
            "message": "Employee created successfully", "id": 12
        })),
        (status = 409, description = "Employee code already used"),
        (status = 500, description = "Internal server error", body = Object, example = json!({
            "code": "DATABASE_ERROR",
            "message": "Something went wrong, Contact with system admin"
        }))
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreateEmployee>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    if payload.first_name.trim().is_empty() || payload.employee_code.trim().is_empty() {
        return Err(ApiError::validation("Employee code and first name are required"));
    }
    if payload.salary < 0.0 {
        return Err(ApiError::validation("Salary cannot be negative"));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO employees
        (employee_code, first_name, last_name, email, phone, department_id, position_id,
         location_id, hire_date, probation_end_date, salary, salary_type, employment_type,
         status, annual_leave_balance, sick_leave_balance)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_code.trim())
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(payload.email.trim())
    .bind(&payload.phone)
    .bind(payload.department_id)
    .bind(payload.position_id)
    .bind(payload.location_id)
    .bind(payload.hire_date)
    .bind(payload.probation_end_date)
    .bind(payload.salary)
    .bind(payload.salary_type.unwrap_or(SalaryType::Monthly).as_ref())
    .bind(payload.employment_type.unwrap_or(EmploymentType::FullTime).as_ref())
    .bind(EmployeeStatus::Probation.as_ref())
    .bind(config.policy.annual_leave_allotment)
    .bind(config.policy.sick_leave_allotment)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, code = %payload.employee_code, "Failed to create employee");
        ApiError::from(e)
    })?;

    info!(employee_id = result.last_insert_id(), "Employee created");

    Ok(HttpResponse::Created().json(json!({
        "message": "Employee created successfully",
        "id": result.last_insert_id()
    })))
}

#[utoipa::path(
    get,
    path = "/api/employee",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse)
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let mut filter = SqlFilter::new();
    filter
        .and_eq("department_id", query.department_id)
        .and_eq("position_id", query.position_id)
        .and_eq("location_id", query.location_id)
        .and_eq("status", query.status.map(|s| s.to_string()))
        .and_eq("employment_type", query.employment_type.map(|t| t.to_string()))
        .and_search(
            &["first_name", "last_name", "email", "employee_code"],
            query.search.as_deref(),
        );

    let page = fetch_page::<Employee>(
        pool.get_ref(),
        EMPLOYEE_COLUMNS,
        "FROM employees",
        &filter,
        "id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employee/{employee_id}",
    params(
        ("employee_id", Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "code": "NOT_FOUND", "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let employee_id = path.into_inner();
    auth.resolve_employee(Some(employee_id))?;

    let employee = fetch_employee(pool.get_ref(), employee_id).await?;
    Ok(HttpResponse::Ok().json(employee))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employee/{employee_id}",
    params(
        ("employee_id", Path, description = "Employee ID")
    ),
    request_body = Object,
    responses(
        (status = 200, description = "Employee updated successfully", body = Object, example = json!({
            "message": "Employee updated successfully"
        })),
        (status = 400, description = "Unknown or invalid field"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();

    check_enum_field::<EmployeeStatus>(&body, "status")?;
    check_enum_field::<EmploymentType>(&body, "employment_type")?;
    check_enum_field::<SalaryType>(&body, "salary_type")?;

    let update = build_update_sql("employees", &body, UPDATABLE, employee_id)?;
    let affected = execute_update(pool.get_ref(), update).await?;

    if affected == 0 {
        // MySQL reports 0 when nothing changed, so tell the two apart
        fetch_employee(pool.get_ref(), employee_id).await?;
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": "Employee updated successfully"
    })))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/employee/{employee_id}",
    params(
        ("employee_id", Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let employee_id = path.into_inner();

    let res = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, employee_id, "Failed to delete employee");
            ApiError::from(e)
        })?;

    if res.rows_affected() == 0 {
        return Err(ApiError::not_found("Employee"));
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": "Successfully deleted"
    })))
}
