use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::performance::{PerformanceReview, ReviewStatus},
    service::hr_stats::{next_review_status, overall_rating, performance_stats},
    utils::db_utils::{PageRequest, SqlFilter, fetch_all_as, fetch_page},
};

const REVIEW_COLUMNS: &str = "id, employee_id, reviewer_id, period_start, period_end, \
    quality_of_work, productivity, communication, teamwork, punctuality, overall_rating, \
    strengths, improvements, goals, status, created_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateReview {
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub period_start: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub period_end: NaiveDate,
    #[schema(example = 4)]
    pub quality_of_work: i32,
    pub productivity: i32,
    pub communication: i32,
    pub teamwork: i32,
    pub punctuality: i32,
    #[serde(default)]
    pub strengths: String,
    #[serde(default)]
    pub improvements: String,
    #[serde(default)]
    pub goals: String,
}

#[derive(Deserialize, IntoParams)]
pub struct ReviewQuery {
    pub employee_id: Option<u64>,
    pub status: Option<ReviewStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ReviewQuery {
    fn to_filter(&self, auth: &AuthUser) -> ApiResult<SqlFilter> {
        let employee_id = if auth.is_hr() {
            self.employee_id
        } else {
            Some(auth.resolve_employee(self.employee_id)?)
        };
        let mut filter = SqlFilter::new();
        filter
            .and_eq("employee_id", employee_id)
            .and_eq("status", self.status.map(|s| s.to_string()))
            .and_between("period_start", self.from, self.to);
        Ok(filter)
    }
}

async fn fetch_review(pool: &MySqlPool, review_id: u64) -> ApiResult<PerformanceReview> {
    sqlx::query_as::<_, PerformanceReview>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM performance_reviews WHERE id = ?"
    ))
    .bind(review_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Performance review"))
}

#[utoipa::path(
    post,
    path = "/api/performance",
    request_body = CreateReview,
    responses(
        (status = 201, description = "Review created as draft", body = Object, example = json!({
            "message": "Review created", "id": 5, "overall_rating": 4.2
        })),
        (status = 400, description = "Ratings must be between 1 and 5")
    ),
    security(("bearer_auth" = [])),
    tag = "Performance"
)]
pub async fn create_review(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateReview>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    if payload.period_end < payload.period_start {
        return Err(ApiError::validation("Review period end cannot be before its start"));
    }

    let overall = overall_rating(&[
        payload.quality_of_work,
        payload.productivity,
        payload.communication,
        payload.teamwork,
        payload.punctuality,
    ])?;

    let result = sqlx::query(
        r#"
        INSERT INTO performance_reviews
        (employee_id, reviewer_id, period_start, period_end, quality_of_work, productivity,
         communication, teamwork, punctuality, overall_rating, strengths, improvements, goals, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(auth.employee_id)
    .bind(payload.period_start)
    .bind(payload.period_end)
    .bind(payload.quality_of_work)
    .bind(payload.productivity)
    .bind(payload.communication)
    .bind(payload.teamwork)
    .bind(payload.punctuality)
    .bind(overall)
    .bind(&payload.strengths)
    .bind(&payload.improvements)
    .bind(&payload.goals)
    .bind(ReviewStatus::Draft.as_ref())
    .execute(pool.get_ref())
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Review created",
        "id": result.last_insert_id(),
        "overall_rating": overall
    })))
}

async fn transition(
    pool: &MySqlPool,
    review_id: u64,
    target: ReviewStatus,
) -> ApiResult<ReviewStatus> {
    let review = fetch_review(pool, review_id).await?;
    let next = next_review_status(&review.status, target)?;

    sqlx::query("UPDATE performance_reviews SET status = ? WHERE id = ? AND status = ?")
        .bind(next.as_ref())
        .bind(review_id)
        .bind(&review.status)
        .execute(pool)
        .await?;

    info!(review_id, status = %next, "Review status changed");
    Ok(next)
}

#[utoipa::path(
    put,
    path = "/api/performance/{review_id}/submit",
    params(("review_id" = u64, Path, description = "Review ID")),
    responses(
        (status = 200, description = "Review submitted"),
        (status = 400, description = "Only draft reviews can be submitted")
    ),
    security(("bearer_auth" = [])),
    tag = "Performance"
)]
pub async fn submit_review(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let status = transition(pool.get_ref(), path.into_inner(), ReviewStatus::Submitted).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Review submitted", "status": status })))
}

/// The reviewed employee confirms they have read a submitted review.
#[utoipa::path(
    put,
    path = "/api/performance/{review_id}/acknowledge",
    params(("review_id" = u64, Path, description = "Review ID")),
    responses(
        (status = 200, description = "Review acknowledged"),
        (status = 400, description = "Only submitted reviews can be acknowledged")
    ),
    security(("bearer_auth" = [])),
    tag = "Performance"
)]
pub async fn acknowledge_review(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let review_id = path.into_inner();
    let review = fetch_review(pool.get_ref(), review_id).await?;
    auth.resolve_employee(Some(review.employee_id))?;

    let status = transition(pool.get_ref(), review_id, ReviewStatus::Acknowledged).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Review acknowledged", "status": status })))
}

#[utoipa::path(
    get,
    path = "/api/performance",
    params(ReviewQuery),
    responses((status = 200, description = "Paginated reviews")),
    security(("bearer_auth" = [])),
    tag = "Performance"
)]
pub async fn list_reviews(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ReviewQuery>,
) -> ApiResult<HttpResponse> {
    let filter = query.to_filter(&auth)?;
    let page = fetch_page::<PerformanceReview>(
        pool.get_ref(),
        REVIEW_COLUMNS,
        "FROM performance_reviews",
        &filter,
        "period_end DESC, id DESC",
        PageRequest::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/performance/{review_id}",
    params(("review_id" = u64, Path, description = "Review ID")),
    responses(
        (status = 200, description = "Review", body = PerformanceReview),
        (status = 404, description = "Review not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Performance"
)]
pub async fn get_review(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let review = fetch_review(pool.get_ref(), path.into_inner()).await?;
    auth.resolve_employee(Some(review.employee_id))?;
    Ok(HttpResponse::Ok().json(review))
}

#[utoipa::path(
    get,
    path = "/api/performance/stats",
    params(ReviewQuery),
    responses(
        (status = 200, description = "Rating statistics", body = crate::service::hr_stats::PerformanceStats)
    ),
    security(("bearer_auth" = [])),
    tag = "Performance"
)]
pub async fn get_performance_stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ReviewQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let filter = query.to_filter(&auth)?;

    let sql = format!(
        "SELECT {REVIEW_COLUMNS} FROM performance_reviews {}",
        filter.where_clause()
    );
    let reviews = fetch_all_as::<PerformanceReview>(pool.get_ref(), &sql, filter.values()).await?;

    Ok(HttpResponse::Ok().json(performance_stats(&reviews)))
}
