use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

// Error taxonomy for the whole API. Handlers return Result<_, ApiError> and
// the status code is decided here, at the transport boundary only.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    BusinessRule(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal Server Error")]
    Internal(String),
    #[error("Internal Server Error")]
    Database(#[from] sqlx::Error),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BusinessRule(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) | ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Database(e) => log::error!("Database error: {}", e),
            ApiError::Internal(e) => log::error!("Internal error: {}", e),
            _ => {}
        }

        HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
    }
}

// Storage-level constraint violations are the one error class handled
// reactively instead of pre-checked.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        let cases = [
            (ApiError::Validation("bad input".into()), 400),
            (ApiError::BusinessRule("Insufficient stock".into()), 400),
            (ApiError::Unauthenticated("Not authenticated".into()), 401),
            (ApiError::Forbidden("no".into()), 403),
            (ApiError::NotFound("gone".into()), 404),
            (ApiError::Conflict("twice".into()), 409),
            (ApiError::Internal("boom".into()), 500),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status_code().as_u16(), expected, "{:?}", err);
        }
    }

    #[actix_web::test]
    async fn response_body_carries_a_detail_field() {
        let response = ApiError::NotFound("Order with id 7 not found.".into()).error_response();
        assert_eq!(response.status().as_u16(), 404);

        let body = to_bytes(response.into_body()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["detail"], "Order with id 7 not found.");
    }

    #[actix_web::test]
    async fn internal_errors_do_not_leak_details() {
        let response = ApiError::Internal("argon2 exploded".into()).error_response();
        assert_eq!(response.status().as_u16(), 500);

        let body = to_bytes(response.into_body()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["detail"], "Internal Server Error");
    }
}
