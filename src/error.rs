use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::parser::ParsingError;

/// Errors surfaced to API callers. "Nothing to do" is never an error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ParsingError),
    /// The body was not JSON of the expected shape.
    #[error("{0}")]
    Json(#[from] JsonRejection),
    #[error("{0}")]
    Storage(#[from] sqlx::Error),
}

/// `Json` extractor whose rejections are reported like validation errors.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Payload<T>(pub T);

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::Storage(error) => {
                error!(%error, "storage error");
                StatusCode::INTERNAL_SERVER_ERROR
            },
        };

        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
