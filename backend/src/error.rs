use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("user should be logged in")]
    Unauthenticated,
    #[error("username is required")]
    MissingUsername,
    #[error("user not found")]
    UserNotFound,
    #[error("city or user not found")]
    CityNotFound,
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::MissingUsername => StatusCode::BAD_REQUEST,
            ServiceError::UserNotFound | ServiceError::CityNotFound => StatusCode::NOT_FOUND,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServiceError::Store(err) => {
                tracing::error!(error = %err, "storage failure");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}
