use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use shared::{ErrorDetail, ErrorResponse};

use crate::ai::AiError;
use crate::cad::{BuildError, ScriptError};
use crate::executor::ExecError;
use crate::storage::StorageError;
use crate::users::StoreError;

/// Errors returned by HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    InvalidInput { message: String, field: Option<&'static str> },

    #[error("{0}")]
    Execution(String),

    #[error("Model generation limit reached ({max} models max)")]
    LimitExceeded { user_id: String, current: u32, max: u32 },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Storage(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::InvalidInput { message: message.into(), field: None }
    }

    pub fn invalid_field(message: impl Into<String>, field: &'static str) -> Self {
        ApiError::InvalidInput { message: message.into(), field: Some(field) }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput { .. } | ApiError::Execution(_) => StatusCode::BAD_REQUEST,
            ApiError::LimitExceeded { .. } | ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput { .. } => "INVALID_INPUT",
            ApiError::Execution(_) => "EXECUTION_ERROR",
            ApiError::LimitExceeded { .. } => "USER_LIMIT_EXCEEDED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unauthorized(_) => "AUTHENTICATION_ERROR",
            ApiError::Forbidden(_) => "AUTHORIZATION_ERROR",
            ApiError::Storage(_) => "STORAGE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::InvalidInput { field: Some(field), .. } => Some(json!({ "field": field })),
            ApiError::LimitExceeded { user_id, current, max } => Some(json!({
                "user_id": user_id,
                "current_count": current,
                "max_count": max,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}: {}", self.kind(), self);
        }

        // internal details stay in the log
        let message = match &self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorDetail {
                message,
                kind: self.kind().to_string(),
                details: self.details(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LimitExceeded { user_id, current, max } => {
                ApiError::LimitExceeded { user_id, current, max }
            }
            StoreError::UnknownUser(id) => ApiError::NotFound(format!("User not found: {}", id)),
            StoreError::Io(e) => ApiError::Storage(format!("User data write failed: {}", e)),
            StoreError::Json(e) => ApiError::Storage(format!("User data encode failed: {}", e)),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err.to_string())
    }
}

impl From<ExecError> for ApiError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::EmptyCode | ExecError::EmptyModelId | ExecError::Validation(_) => {
                ApiError::Execution(format!("Code execution failed: {}", err))
            }
            ExecError::Storage(e) => e.into(),
        }
    }
}

impl From<ScriptError> for ApiError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Build(BuildError::Export(msg)) => ApiError::Internal(msg),
            other => ApiError::Execution(format!("Script failed: {}", other)),
        }
    }
}

impl From<AiError> for ApiError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::EmptyPrompt => ApiError::invalid_field("No prompt provided", "prompt"),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<BuildError> for ApiError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Export(msg) => ApiError::Internal(msg),
            other => ApiError::invalid(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::invalid("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        let limit = ApiError::LimitExceeded { user_id: "u".into(), current: 10, max: 10 };
        assert_eq!(limit.status(), StatusCode::FORBIDDEN);
        assert_eq!(limit.to_string(), "Model generation limit reached (10 models max)");
        assert_eq!(limit.details().unwrap()["max_count"], 10);
    }

    #[test]
    fn store_errors_convert() {
        let err: ApiError = StoreError::UnknownUser("ghost".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err: ApiError =
            StoreError::LimitExceeded { user_id: "u".into(), current: 3, max: 3 }.into();
        assert_eq!(err.kind(), "USER_LIMIT_EXCEEDED");
    }

    #[test]
    fn validation_is_bad_request() {
        let err: ApiError = ExecError::Validation("Missing 'model' variable assignment".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("Missing 'model'"));
    }
}
