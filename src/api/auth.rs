use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::Json;

use crate::api::state::AppState;
use crate::api::types::ErrorResponse;

pub const ADMIN_TOKEN_HEADER: &str = "x-playzone-admin-token";

fn extract_bearer_token(raw: &str) -> Option<&str> {
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .map(str::trim)
}

/// Admin routes are open when no token is configured. Otherwise the token
/// must arrive in the admin header or as a bearer token.
pub fn ensure_admin_authorized(
    state: &AppState,
    headers: &HeaderMap,
) -> std::result::Result<(), (StatusCode, Json<ErrorResponse>)> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(());
    };

    let token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(extract_bearer_token)
        });

    if token.is_some_and(|v| v == expected) {
        return Ok(());
    }

    Err((
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            success: false,
            code: "UNAUTHORIZED".to_string(),
            error: "admin auth failed (missing/invalid token)".to_string(),
            retryable: false,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::config::AppConfig;
    use crate::engine::{Economy, SystemClock};
    use axum::http::HeaderValue;
    use std::sync::Arc;

    fn state(token: Option<&str>) -> AppState {
        let economy = Economy::new(
            Arc::new(MemoryStore::new()),
            &AppConfig::default(),
            Arc::new(SystemClock),
        );
        AppState::new(Arc::new(economy)).with_admin_token(token.map(str::to_string))
    }

    #[test]
    fn test_open_without_token() {
        assert!(ensure_admin_authorized(&state(None), &HeaderMap::new()).is_ok());
        assert!(ensure_admin_authorized(&state(Some("  ")), &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_header_or_bearer() {
        let state = state(Some("s3cret"));
        assert!(ensure_admin_authorized(&state, &HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_TOKEN_HEADER, HeaderValue::from_static("s3cret"));
        assert!(ensure_admin_authorized(&state, &headers).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(ensure_admin_authorized(&state, &headers).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        let (status, _) = ensure_admin_authorized(&state, &headers).unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
