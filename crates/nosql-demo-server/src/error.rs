use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nosql_demo_core::DemoError;

// ---------------------------------------------------------------------------
// Internal sentinels for explicit 403 / 404 / 409 errors
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 409 through the `anyhow::Error` chain.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct ConflictError(String);

/// Carries an explicit HTTP 404 through the `anyhow::Error` chain.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct NotFoundError(String);

/// Carries an explicit HTTP 403 through the `anyhow::Error` chain.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct ForbiddenError(String);

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 409 Conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self(ConflictError(msg.into()).into())
    }

    /// Construct a 404 Not Found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }

    /// Construct a 403 Forbidden error.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self(ForbiddenError(msg.into()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(c) = self.0.downcast_ref::<ConflictError>() {
            let body = serde_json::json!({ "error": c.0.clone() });
            return (StatusCode::CONFLICT, axum::Json(body)).into_response();
        }
        if let Some(n) = self.0.downcast_ref::<NotFoundError>() {
            let body = serde_json::json!({ "error": n.0.clone() });
            return (StatusCode::NOT_FOUND, axum::Json(body)).into_response();
        }
        if let Some(f) = self.0.downcast_ref::<ForbiddenError>() {
            let body = serde_json::json!({ "error": f.0.clone() });
            return (StatusCode::FORBIDDEN, axum::Json(body)).into_response();
        }

        let status = if let Some(e) = self.0.downcast_ref::<DemoError>() {
            match e {
                DemoError::MissingSetting { .. }
                | DemoError::InvalidEndpoint { .. }
                | DemoError::SettingsFile { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                DemoError::Credential(_) => StatusCode::UNAUTHORIZED,
                DemoError::Database { .. } | DemoError::Chat { .. } | DemoError::Transport(_) => {
                    StatusCode::BAD_GATEWAY
                }
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
