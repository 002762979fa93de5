use thiserror::Error;
use uuid::Uuid;

/// Main error type for the rewards engine
#[derive(Error, Debug)]
pub enum EconomyError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Catalog file error: {0}")]
    CatalogFile(#[from] toml::de::Error),

    // Ledger errors
    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(i64),

    #[error("Insufficient {currency} balance: have {balance}, need {requested}")]
    InsufficientBalance {
        currency: String,
        balance: i64,
        requested: i64,
    },

    // Cap errors
    #[error("Cap exceeded for {period} window: earned {earned}, cap {cap}, requested {requested}")]
    CapExceeded {
        period: String,
        earned: i64,
        cap: i64,
        requested: i64,
    },

    // Claim errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Outcome {0} already claimed")]
    AlreadyClaimed(Uuid),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Outcome {0} expired")]
    Expired(Uuid),

    // Catalog publish errors
    #[error("Catalog weights sum to {actual}, expected {expected}")]
    WeightSumError { expected: u32, actual: u64 },

    #[error("Catalog segment error: {0}")]
    DuplicateSegmentError(String),

    // Contention errors
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl EconomyError {
    /// Only lock/transaction contention is worth retrying; every other
    /// domain error is terminal for the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EconomyError::ConcurrencyConflict(_))
    }

    /// Stable machine-readable code surfaced to API clients
    pub fn code(&self) -> &'static str {
        match self {
            EconomyError::InvalidAmount(_) => "INVALID_AMOUNT",
            EconomyError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            EconomyError::CapExceeded { .. } => "CAP_EXCEEDED",
            EconomyError::NotFound(_) => "NOT_FOUND",
            EconomyError::AlreadyClaimed(_) => "ALREADY_CLAIMED",
            EconomyError::Forbidden(_) => "FORBIDDEN",
            EconomyError::Expired(_) => "EXPIRED",
            EconomyError::WeightSumError { .. } => "WEIGHT_SUM_ERROR",
            EconomyError::DuplicateSegmentError(_) => "DUPLICATE_SEGMENT_ERROR",
            EconomyError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            EconomyError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            EconomyError::Validation(_) | EconomyError::CatalogFile(_) => "VALIDATION_FAILED",
            _ => "INTERNAL",
        }
    }
}

/// Result type alias for EconomyError
pub type Result<T> = std::result::Result<T, EconomyError>;
