use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::db::DatabaseError;
use crate::services::certificate_issuance::IssuanceError;
use crate::services::CertificateFileError;

pub const FILE_UNAVAILABLE_MESSAGE: &str = "Certificate file not available.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Certificate file error: {0}")]
    FileUnavailable(String),
}

impl AppError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Authorization(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Database(err) => match err {
                DatabaseError::NotFound => (StatusCode::NOT_FOUND, "Resource not found".to_string()),
                DatabaseError::Duplicate => (StatusCode::CONFLICT, "Resource already exists".to_string()),
                DatabaseError::InvalidInput(message) => (StatusCode::UNPROCESSABLE_ENTITY, message.clone()),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                ),
            },
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, "Authentication failed".to_string()),
            AppError::Authorization(message) => (StatusCode::FORBIDDEN, message.clone()),
            AppError::Validation(message) => (StatusCode::UNPROCESSABLE_ENTITY, message.clone()),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            AppError::FileUnavailable(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                FILE_UNAVAILABLE_MESSAGE.to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        // Server-side causes are logged, never returned.
        let details = if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {}", self);
            message.clone()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "details": details,
            }
        }));

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<CertificateFileError> for AppError {
    fn from(err: CertificateFileError) -> Self {
        match err {
            CertificateFileError::NotFound => AppError::NotFound("Certificate not found.".to_string()),
            CertificateFileError::Database(DatabaseError::InvalidInput(message)) => AppError::Validation(message),
            other => AppError::FileUnavailable(other.to_string()),
        }
    }
}

impl From<IssuanceError> for AppError {
    fn from(err: IssuanceError) -> Self {
        match err {
            IssuanceError::NotEligible(message) => AppError::Validation(message),
            IssuanceError::Database(err) => AppError::Database(err),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::renderer::RenderError;

    #[test]
    fn maps_errors_to_statuses() {
        let cases = [
            (AppError::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::forbidden("no"), StatusCode::FORBIDDEN),
            (AppError::validation("bad"), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::not_found("gone"), StatusCode::NOT_FOUND),
            (AppError::Database(DatabaseError::Duplicate), StatusCode::CONFLICT),
            (AppError::Database(DatabaseError::NotFound), StatusCode::NOT_FOUND),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn rendering_failures_hide_details_behind_a_fixed_message() {
        let err: AppError = CertificateFileError::Rendering(RenderError::Encode("boom".into())).into();
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, FILE_UNAVAILABLE_MESSAGE);
    }

    #[tokio::test]
    async fn server_errors_do_not_expose_their_cause() {
        use http_body_util::BodyExt;

        let err: AppError = CertificateFileError::Rendering(RenderError::Encode("zlib stream broke".into())).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["message"], FILE_UNAVAILABLE_MESSAGE);
        assert_eq!(body["error"]["details"], FILE_UNAVAILABLE_MESSAGE);
        assert!(!body.to_string().contains("zlib"));
    }

    #[test]
    fn missing_certificate_is_not_found() {
        let err: AppError = CertificateFileError::NotFound.into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
