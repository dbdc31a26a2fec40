//! Consistent JSON error responses: `{"error": {"code": .., "message": ..}}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use tradeflow_auth::AuthzError;
use tradeflow_core::DomainError;
use tradeflow_infra::DispatchError;
use tradeflow_infra::flows::FlowError;
use tradeflow_reporting::RenderError;

pub type ApiResult<T = Response> = Result<T, ApiError>;

/// An error already mapped to its HTTP status and error code.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        json_error(self.status, self.code, self.message)
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": code,
                "message": message.into(),
            }
        })),
    )
        .into_response()
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(msg) => ApiError::validation(msg),
            DispatchError::InvariantViolation(msg) => ApiError::new(StatusCode::CONFLICT, "invariant_violation", msg),
            DispatchError::NotFound => ApiError::new(StatusCode::NOT_FOUND, "not_found", "not found"),
            DispatchError::Concurrency(msg) => ApiError::new(StatusCode::CONFLICT, "conflict", msg),
            DispatchError::Unauthorized => ApiError::new(StatusCode::FORBIDDEN, "unauthorized", "not allowed to perform this action"),
            DispatchError::TenantIsolation(msg) => ApiError::new(StatusCode::FORBIDDEN, "tenant_isolation", msg),
            other @ (DispatchError::Deserialize(_) | DispatchError::Store(_) | DispatchError::Publish(_)) => {
                tracing::error!(error = %other, "command failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
            }
        }
    }
}

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::Dispatch(e) => e.into(),
            err @ FlowError::CompensationFailed { .. } => {
                tracing::error!(error = %err, "flow left a reservation behind");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string())
            }
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        DispatchError::from(err).into()
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::new(StatusCode::FORBIDDEN, "forbidden", err.to_string())
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::UnknownReport(what) => ApiError::not_found(&format!("report {what}")),
            other => {
                tracing::error!(error = %other, "rendering failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "render_error", other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_documented_statuses() {
        let cases = [
            (DispatchError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (DispatchError::InvariantViolation("x".into()), StatusCode::CONFLICT),
            (DispatchError::NotFound, StatusCode::NOT_FOUND),
            (DispatchError::Concurrency("x".into()), StatusCode::CONFLICT),
            (DispatchError::Unauthorized, StatusCode::FORBIDDEN),
            (DispatchError::Publish("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn compensation_failure_is_internal() {
        let err = FlowError::CompensationFailed {
            step: "create delivery order",
            cause: DispatchError::Validation("bad".into()),
            compensation: DispatchError::Concurrency("busy".into()),
        };
        assert_eq!(ApiError::from(err).status(), StatusCode::INTERNAL_SERVER_ERROR);
        let plain = FlowError::Dispatch(DispatchError::Validation("bad".into()));
        assert_eq!(ApiError::from(plain).code(), "validation_error");
    }

    #[test]
    fn forbidden_carries_the_permission() {
        let err = ApiError::from(AuthzError::Forbidden("users.manage".into()));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(err.message.contains("users.manage"));
    }

    #[test]
    fn display_shows_code_and_message() {
        let err = ApiError::from(DispatchError::InvariantViolation("customer C-1 is suspended".into()));
        assert_eq!(err.to_string(), "invariant_violation: customer C-1 is suspended");
    }
}
