use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::pool::PoolError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

fn masked(detail: String, generic: &str) -> String {
    if is_production() {
        generic.to_string()
    } else {
        detail
    }
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::Pool(e) => match e {
                PoolError::PoolExhausted { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "POOL_EXHAUSTED")
                }
                PoolError::PoolClosed => (StatusCode::SERVICE_UNAVAILABLE, "POOL_CLOSED"),
                PoolError::ConnectFailed(_) | PoolError::Rejected(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "DATABASE_UNAVAILABLE")
                }
                PoolError::InvalidHandle | PoolError::Config(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "POOL_ERROR")
                }
            },
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let log_message = self.to_string();

        let client_message = match &self {
            AppError::Config(_) => masked(log_message.clone(), "Configuration error"),
            // Backend messages may carry host names and user names
            AppError::Pool(PoolError::ConnectFailed(_) | PoolError::Rejected(_)) => {
                masked(log_message.clone(), "Database temporarily unavailable")
            }
            AppError::Pool(_) => log_message.clone(),
            AppError::Io(_) | AppError::Internal(_) => {
                masked(log_message.clone(), "Internal server error")
            }
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
