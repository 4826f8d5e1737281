use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

/// Errors surfaced by the attendance and leave operations.
///
/// Every domain kind is detected by a precondition check before any
/// mutation. `Storage` is the only infrastructure failure and is the one
/// callers may retry.
#[derive(Debug, Display, strum_macros::IntoStaticStr)]
pub enum AppError {
    #[display(fmt = "Already checked in today")]
    AlreadyCheckedIn,

    #[display(fmt = "No active check-in found for today")]
    NotCheckedIn,

    #[display(fmt = "Already checked out today")]
    AlreadyCheckedOut,

    #[display(fmt = "Already on a break, end the current break first")]
    BreakAlreadyOpen,

    #[display(fmt = "No ongoing break found")]
    NoOpenBreak,

    #[display(fmt = "{}", _0)]
    InvalidLocation(String),

    #[display(fmt = "{}", _0)]
    InvalidDateRange(String),

    #[display(fmt = "This leave type requires {} days advance notice", _0)]
    InsufficientNotice(u32),

    #[display(fmt = "Requested {} days but only {} available", requested, available)]
    InsufficientBalance { requested: f64, available: f64 },

    #[display(fmt = "Application is not pending")]
    NotPending,

    #[display(fmt = "Schedule binding overlaps an active binding from {}", _0)]
    ScheduleOverlap(chrono::NaiveDate),

    #[display(fmt = "{}", _0)]
    Forbidden(String),

    #[display(fmt = "{} not found", _0)]
    NotFound(&'static str),

    #[display(fmt = "{}", _0)]
    Validation(String),

    #[display(fmt = "Invalid credentials")]
    Unauthorized,

    #[display(fmt = "Storage failure: {}", _0)]
    Storage(String),
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// Symbolic kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyCheckedIn
            | AppError::AlreadyCheckedOut
            | AppError::BreakAlreadyOpen
            | AppError::NotPending
            | AppError::ScheduleOverlap(_) => StatusCode::CONFLICT,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::Storage(detail) = self {
            tracing::error!(error = %detail, "Storage failure");
            return HttpResponse::InternalServerError().json(json!({
                "error": self.kind(),
                "message": "Internal Server Error"
            }));
        }

        HttpResponse::build(self.status_code()).json(json!({
            "error": self.kind(),
            "message": self.to_string()
        }))
    }
}
