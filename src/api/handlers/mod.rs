pub mod admin;
pub mod leaderboard;
pub mod playzone;
pub mod system;

pub use admin::*;
pub use leaderboard::*;
pub use playzone::*;
pub use system::*;

use axum::{http::StatusCode, Json};
use tracing::{error, warn};

use crate::api::types::ErrorResponse;
use crate::domain::{Currency, GameType};
use crate::error::EconomyError;

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub fn status_for(err: &EconomyError) -> StatusCode {
    match err {
        EconomyError::InvalidAmount(_)
        | EconomyError::Validation(_)
        | EconomyError::CatalogFile(_) => StatusCode::BAD_REQUEST,
        EconomyError::Forbidden(_) => StatusCode::FORBIDDEN,
        EconomyError::NotFound(_) => StatusCode::NOT_FOUND,
        EconomyError::AlreadyClaimed(_)
        | EconomyError::ConcurrencyConflict(_)
        | EconomyError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        EconomyError::Expired(_) => StatusCode::GONE,
        EconomyError::InsufficientBalance { .. }
        | EconomyError::CapExceeded { .. }
        | EconomyError::WeightSumError { .. }
        | EconomyError::DuplicateSegmentError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map an engine error to its wire form
pub fn api_error(err: EconomyError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "request failed");
    } else {
        warn!(code = err.code(), error = %err, "request refused");
    }
    (
        status,
        Json(ErrorResponse {
            success: false,
            code: err.code().to_string(),
            error: err.to_string(),
            retryable: err.is_retryable(),
        }),
    )
}

pub(crate) fn parse_game(raw: &str) -> std::result::Result<GameType, ApiError> {
    GameType::try_from(raw).map_err(|e| api_error(EconomyError::Validation(e)))
}

pub(crate) fn parse_currency(raw: &str) -> std::result::Result<Currency, ApiError> {
    Currency::try_from(raw).map_err(|e| api_error(EconomyError::Validation(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&EconomyError::InvalidAmount(-1)), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&EconomyError::Expired(Uuid::new_v4())), StatusCode::GONE);
        assert_eq!(
            status_for(&EconomyError::CapExceeded {
                period: "daily".into(),
                earned: 480,
                cap: 500,
                requested: 50,
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&EconomyError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body_carries_code() {
        let (status, Json(body)) =
            api_error(EconomyError::ConcurrencyConflict("agent amy busy".into()));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.code, "CONCURRENCY_CONFLICT");
        assert!(body.retryable);
        assert!(!body.success);
    }

    #[test]
    fn test_parse_game_aliases() {
        assert_eq!(parse_game("spin").unwrap(), GameType::SpinWheel);
        assert_eq!(parse_game("scratch-card").unwrap(), GameType::ScratchCard);
        assert_eq!(parse_game("dice").unwrap_err().0, StatusCode::BAD_REQUEST);
    }
}
