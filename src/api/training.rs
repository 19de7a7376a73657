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
    model::training::{TrainingProgram, TrainingStatus},
    service::hr_stats::{ensure_capacity, training_stats},
    utils::db_utils::{SqlFilter, fetch_all_as},
};

const TRAINING_COLUMNS: &str = "id, title, category, start_date, end_date, max_participants, \
    current_participants, cost, status";

#[derive(Deserialize, ToSchema)]
pub struct CreateTraining {
    #[schema(example = "Customer service basics")]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    #[schema(example = 20)]
    pub max_participants: i32,
    #[serde(default)]
    pub cost: f64,
}

#[derive(Deserialize, IntoParams)]
pub struct TrainingQuery {
    pub status: Option<TrainingStatus>,
    pub category: Option<String>,
}

impl TrainingQuery {
    fn to_filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::new();
        filter
            .and_eq("status", self.status.map(|s| s.to_string()))
            .and_eq("category", self.category.as_deref());
        filter
    }
}

#[utoipa::path(
    post,
    path = "/api/training",
    request_body = CreateTraining,
    responses(
        (status = 201, description = "Training program created"),
        (status = 400, description = "Invalid dates or capacity")
    ),
    security(("bearer_auth" = [])),
    tag = "Training"
)]
pub async fn create_training(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTraining>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    if payload.title.trim().is_empty() {
        return Err(ApiError::validation("Title is required"));
    }
    if payload.end_date < payload.start_date {
        return Err(ApiError::validation("End date cannot be before start date"));
    }
    if payload.max_participants < 1 {
        return Err(ApiError::validation("A program needs room for at least one participant"));
    }
    if payload.cost < 0.0 {
        return Err(ApiError::validation("Cost cannot be negative"));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO training_programs (title, category, start_date, end_date, max_participants, cost, status)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.title.trim())
    .bind(payload.category.trim())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.max_participants)
    .bind(payload.cost)
    .bind(TrainingStatus::Upcoming.as_ref())
    .execute(pool.get_ref())
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Training program created",
        "id": result.last_insert_id()
    })))
}

#[utoipa::path(
    get,
    path = "/api/training",
    params(TrainingQuery),
    responses((status = 200, description = "Training programs", body = [TrainingProgram])),
    security(("bearer_auth" = [])),
    tag = "Training"
)]
pub async fn list_trainings(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TrainingQuery>,
) -> ApiResult<HttpResponse> {
    let filter = query.to_filter();
    let sql = format!(
        "SELECT {TRAINING_COLUMNS} FROM training_programs {} ORDER BY start_date DESC",
        filter.where_clause()
    );
    let programs = fetch_all_as::<TrainingProgram>(pool.get_ref(), &sql, filter.values()).await?;

    Ok(HttpResponse::Ok().json(programs))
}

#[utoipa::path(
    post,
    path = "/api/training/{training_id}/enroll",
    params(("training_id" = u64, Path, description = "Training program ID")),
    responses(
        (status = 200, description = "Enrolled", body = Object, example = json!({
            "message": "Enrolled", "current_participants": 12
        })),
        (status = 409, description = "Training program is full")
    ),
    security(("bearer_auth" = [])),
    tag = "Training"
)]
pub async fn enroll(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let training_id = path.into_inner();
    let mut tx = pool.begin().await?;

    let program = sqlx::query_as::<_, TrainingProgram>(&format!(
        "SELECT {TRAINING_COLUMNS} FROM training_programs WHERE id = ? FOR UPDATE"
    ))
    .bind(training_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Training program"))?;

    ensure_capacity(&program)?;

    sqlx::query(
        "UPDATE training_programs SET current_participants = current_participants + 1 WHERE id = ?",
    )
    .bind(training_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let current_participants = program.current_participants + 1;
    info!(training_id, current_participants, "Enrolled in training");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Enrolled",
        "current_participants": current_participants
    })))
}

#[utoipa::path(
    get,
    path = "/api/training/stats",
    params(TrainingQuery),
    responses(
        (status = 200, description = "Training statistics", body = crate::service::hr_stats::TrainingStats)
    ),
    security(("bearer_auth" = [])),
    tag = "Training"
)]
pub async fn get_training_stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TrainingQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let filter = query.to_filter();
    let sql = format!(
        "SELECT {TRAINING_COLUMNS} FROM training_programs {}",
        filter.where_clause()
    );
    let programs = fetch_all_as::<TrainingProgram>(pool.get_ref(), &sql, filter.values()).await?;

    Ok(HttpResponse::Ok().json(training_stats(&programs)))
}
