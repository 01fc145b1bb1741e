pub mod health;
pub mod jobs;

use axum::{Json, http::StatusCode, response::IntoResponse};
use nhanhoc_common::error::NhanhocError;

pub struct ApiError(pub NhanhocError);

impl From<NhanhocError> for ApiError {
    fn from(value: NhanhocError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0 {
            NhanhocError::JobNotFound(_) | NhanhocError::UnknownOperation(_) => {
                StatusCode::NOT_FOUND
            }
            NhanhocError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            NhanhocError::JobStillRunning(_) | NhanhocError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            NhanhocError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(serde_json::json!({
                "code": self.0.error_code(),
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}
