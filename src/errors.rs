use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::services::portal_service::PortalError;
use crate::store::StoreError;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<PortalError> for AppError {
    fn from(err: PortalError) -> Self {
        let message = err.to_string();
        match &err {
            PortalError::StorageUnavailable(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
            }
            PortalError::DownloadFailed { source, .. }
            | PortalError::DeleteFailed { source, .. }
                if matches!(source, StoreError::NotFound(_)) =>
            {
                Self::not_found(message)
            }
            _ => Self::internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portal_errors_map_to_http_statuses() {
        let unavailable: AppError =
            PortalError::StorageUnavailable("no credentials".into()).into();
        assert_eq!(unavailable.status, StatusCode::SERVICE_UNAVAILABLE);

        let missing: AppError = PortalError::DownloadFailed {
            key: "a.txt".into(),
            source: StoreError::NotFound("a.txt".into()),
        }
        .into();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let transport: AppError = PortalError::UploadFailed {
            key: "a.txt".into(),
            source: StoreError::Backend("timeout".into()),
        }
        .into();
        assert_eq!(transport.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(transport.message.contains("a.txt"));
    }
}
