use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Billing provider unavailable: {0}")]
    OracleUnavailable(String),

    #[error("No authenticated account")]
    IdentityMissing,

    #[error("Subscription cache write failed: {0}")]
    CacheWriteFailed(String),

    #[error("Subscription operation failed: {0}")]
    LifecycleOperationFailed(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    OracleUnavailable,
    IdentityMissing,
    CacheWriteFailed,
    LifecycleOperationFailed,
    DatabaseError,
    InvalidInput,
    Forbidden,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::OracleUnavailable => "ORACLE_UNAVAILABLE",
            ErrorCode::IdentityMissing => "IDENTITY_MISSING",
            ErrorCode::CacheWriteFailed => "CACHE_WRITE_FAILED",
            ErrorCode::LifecycleOperationFailed => "LIFECYCLE_OPERATION_FAILED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
