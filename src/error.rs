use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

/// Stable, machine-readable codes. Clients match on these, never on the message.
pub mod code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const DATABASE: &str = "DATABASE_ERROR";
    pub const INTERNAL: &str = "INTERNAL";
}

/// Error type returned by every handler and by the computation layer.
///
/// Renders as `{"code": "NOT_FOUND", "message": "Employee not found"}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    /// Details are logged, never sent to the client.
    #[error("database error: {0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => code::NOT_FOUND,
            ApiError::Conflict(_) => code::CONFLICT,
            ApiError::Validation(_) => code::VALIDATION_FAILED,
            ApiError::Unauthorized(_) => code::UNAUTHENTICATED,
            ApiError::Forbidden(_) => code::PERMISSION_DENIED,
            ApiError::Database(_) => code::DATABASE,
            ApiError::Internal(_) => code::INTERNAL,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Database(_) | ApiError::Internal(_) => {
                "Something went wrong, Contact with system admin".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "code": self.code(),
            "message": self.public_message(),
        }))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => ApiError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let mapped = db_err
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .and_then(|my| constraint_error(my.number()));
                mapped.unwrap_or_else(|| {
                    tracing::error!(error = %e, "Database error");
                    ApiError::Database(e.to_string())
                })
            }
            _ => {
                tracing::error!(error = %e, "Database error");
                ApiError::Database(e.to_string())
            }
        }
    }
}

/// MySQL integrity errors a caller can fix; anything else stays a database error.
fn constraint_error(number: u16) -> Option<ApiError> {
    match number {
        1062 => Some(ApiError::Conflict("Record already exists".to_string())),
        1452 => Some(ApiError::validation("Referenced record does not exist")),
        1451 => Some(ApiError::validation("Record is still referenced")),
        _ => None,
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn status_code_mapping() {
        assert_eq!(ApiError::not_found("Employee").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Database("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), code::NOT_FOUND);
    }

    #[test]
    fn integrity_errors_are_told_apart() {
        assert!(matches!(constraint_error(1062), Some(ApiError::Conflict(_))));
        assert!(matches!(
            constraint_error(1452),
            Some(ApiError::Validation(m)) if m == "Referenced record does not exist"
        ));
        assert!(matches!(
            constraint_error(1451),
            Some(ApiError::Validation(m)) if m == "Record is still referenced"
        ));
        // Check constraint violations are not conflicts
        assert!(constraint_error(3819).is_none());
    }

    #[actix_web::test]
    async fn database_details_are_not_leaked() {
        let resp = ApiError::Database("secret table missing".into()).error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], "DATABASE_ERROR");
        assert!(!value["message"].as_str().unwrap().contains("secret"));
    }

    #[actix_web::test]
    async fn validation_message_is_rendered() {
        let resp = ApiError::validation("Cart is empty").error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], "VALIDATION_FAILED");
        assert_eq!(value["message"], "Cart is empty");
    }
}
