use spin_sdk::http::Response;
use thiserror::Error;

/// Typed failure returned by every operation.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or empty required field.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found with ID {1}")]
    NotFound(&'static str, String),

    /// Caller is known but lacks rights over the target.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No valid bearer token on the request.
    #[error("user is not authenticated")]
    Unauthenticated,

    #[error("a user cannot follow themselves")]
    SelfReference,

    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Lost a race on a uniqueness constraint or a contended record; re-read and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        AppError::NotFound(kind, id.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn status(&self) -> u16 {
        match self {
            AppError::Validation(_) | AppError::SelfReference => 400,
            AppError::Unauthenticated => 401,
            AppError::Unauthorized(_) => 403,
            AppError::NotFound(..) => 404,
            AppError::Duplicate(_) | AppError::Conflict(_) => 409,
            AppError::StoreUnavailable(_) => 503,
        }
    }

    /// Whether repeating the same call may succeed without changing inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_) | AppError::StoreUnavailable(_))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::StoreUnavailable(format!("unreadable record: {}", err))
    }
}

impl From<AppError> for Response {
    fn from(err: AppError) -> Self {
        let body = serde_json::json!({
            "success": false,
            "message": err.to_string(),
        });
        Response::builder()
            .status(err.status())
            .header("Content-Type", "application/json")
            .body(body.to_string().into_bytes())
            .build()
    }
}
