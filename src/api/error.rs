use crate::services::temp_avatar::StagingError;
use crate::utils::validation::ValidationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Anyhow error: {0}")]
    Anyhow(anyhow::Error),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ValidationError>() {
            Some(v) => match v.code {
                "FILE_TOO_LARGE" => AppError::PayloadTooLarge(v.message.clone()),
                "INVALID_MIME_TYPE" | "UNRECOGNIZED_IMAGE" => {
                    AppError::UnsupportedMediaType(v.message.clone())
                }
                _ => AppError::BadRequest(v.message.clone()),
            },
            None => AppError::Anyhow(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Staging(e) => {
                tracing::error!("Staging error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::validation::{validate_avatar_image, validate_file_size};

    #[test]
    fn test_validation_errors_map_to_statuses() {
        let too_big: AppError = validate_file_size(10, 1).unwrap_err().into();
        assert_eq!(too_big.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);

        let not_image: AppError = validate_avatar_image(Some("text/plain"), b"hello")
            .unwrap_err()
            .into();
        assert_eq!(
            not_image.into_response().status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );

        let empty: AppError = validate_file_size(0, 1).unwrap_err().into();
        assert_eq!(empty.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_other_errors_are_masked() {
        let err = AppError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
