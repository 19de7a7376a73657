use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::ToSchema;

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::benefit::{Benefit, BenefitType},
    service::hr_stats::benefit_stats,
};

const BENEFIT_COLUMNS: &str =
    "id, name, benefit_type, provider, employer_contribution, employee_contribution, enrolled, status";

#[derive(Deserialize, ToSchema)]
pub struct CreateBenefit {
    #[schema(example = "Medical aid")]
    pub name: String,
    pub benefit_type: BenefitType,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub employer_contribution: f64,
    #[serde(default)]
    pub employee_contribution: f64,
    #[serde(default)]
    pub enrolled: i32,
}

#[utoipa::path(
    post,
    path = "/api/benefit",
    request_body = CreateBenefit,
    responses(
        (status = 201, description = "Benefit created"),
        (status = 400, description = "Invalid contribution")
    ),
    security(("bearer_auth" = [])),
    tag = "Benefit"
)]
pub async fn create_benefit(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateBenefit>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("Benefit name is required"));
    }
    if payload.employer_contribution < 0.0
        || payload.employee_contribution < 0.0
        || payload.enrolled < 0
    {
        return Err(ApiError::validation("Contributions and enrolment cannot be negative"));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO benefits (name, benefit_type, provider, employer_contribution, employee_contribution, enrolled)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.benefit_type.as_ref())
    .bind(payload.provider.trim())
    .bind(payload.employer_contribution)
    .bind(payload.employee_contribution)
    .bind(payload.enrolled)
    .execute(pool.get_ref())
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Benefit created",
        "id": result.last_insert_id()
    })))
}

async fn all_benefits(pool: &MySqlPool) -> ApiResult<Vec<Benefit>> {
    Ok(sqlx::query_as::<_, Benefit>(&format!(
        "SELECT {BENEFIT_COLUMNS} FROM benefits ORDER BY name"
    ))
    .fetch_all(pool)
    .await?)
}

#[utoipa::path(
    get,
    path = "/api/benefit",
    responses((status = 200, description = "Benefits", body = [Benefit])),
    security(("bearer_auth" = [])),
    tag = "Benefit"
)]
pub async fn list_benefits(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(all_benefits(pool.get_ref()).await?))
}

#[utoipa::path(
    get,
    path = "/api/benefit/stats",
    responses(
        (status = 200, description = "Benefit statistics", body = crate::service::hr_stats::BenefitStats)
    ),
    security(("bearer_auth" = [])),
    tag = "Benefit"
)]
pub async fn get_benefit_stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let benefits = all_benefits(pool.get_ref()).await?;
    Ok(HttpResponse::Ok().json(benefit_stats(&benefits)))
}
