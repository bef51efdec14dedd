use api_types::ErrorBody;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{catalog::CatalogError, config::Environment};

#[derive(Debug)]
pub struct ErrorResponse {
    status: StatusCode,
    error: String,
    message: Option<String>,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Map a catalog failure onto the HTTP taxonomy: client mistakes become 4xx with a
/// specific message, everything else a 500 carrying `fallback_message`. Internal
/// detail is only exposed outside production.
pub(crate) fn catalog_error(
    error: CatalogError,
    fallback_message: &str,
    environment: Environment,
) -> ErrorResponse {
    match error {
        CatalogError::NotFound => ErrorResponse::new(StatusCode::NOT_FOUND, "Image not found"),
        CatalogError::MissingFile => {
            ErrorResponse::new(StatusCode::BAD_REQUEST, "No image file provided")
        }
        CatalogError::MultipleFiles => {
            ErrorResponse::new(StatusCode::BAD_REQUEST, "Only one image can be uploaded at a time")
        }
        CatalogError::UnsupportedContentType(_) => ErrorResponse::new(
            StatusCode::BAD_REQUEST,
            "Invalid file type. Only JPEG, PNG, GIF, and WebP images are allowed.",
        ),
        CatalogError::FileTooLarge { limit } => ErrorResponse::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("File too large (max {}MB)", limit / (1024 * 1024)),
        ),
        CatalogError::InvalidImage(detail) => {
            ErrorResponse::new(StatusCode::BAD_REQUEST, "Uploaded file is not a valid image")
                .with_message(detail)
        }
        other => {
            tracing::error!(error = %other, "{fallback_message}");
            let response = ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, fallback_message);
            if environment.is_production() {
                response
            } else {
                response.with_message(other.to_string())
            }
        }
    }
}

pub(crate) fn multipart_error(error: MultipartError) -> ErrorResponse {
    let status = error.status();
    if status.is_server_error() {
        tracing::error!(error = %error, "Failed to read multipart body");
    }
    ErrorResponse::new(status, "Invalid upload form").with_message(error.body_text())
}
