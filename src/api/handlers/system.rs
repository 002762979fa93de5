use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::{api_error, ApiResult};
use crate::api::{state::AppState, types::*};

/// GET /health -- lightweight liveness/readiness probe
pub async fn health_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let ok = state.economy.store.ping().await.is_ok();
    let resp = HealthResponse {
        status: if ok {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        store: if ok {
            "connected".to_string()
        } else {
            "disconnected".to_string()
        },
        uptime_secs: state.uptime_seconds(),
    };

    if ok {
        Ok(Json(resp))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(resp)))
    }
}

/// GET /agent/:id/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ApiResult<BalanceResponse> {
    let economy = &state.economy;
    let agent = economy.agents.get(&agent_id).await.map_err(api_error)?;
    let balances = economy.ledger.balances(&agent_id).await.map_err(api_error)?;
    let progress = economy.tiers.progress(&agent).await.map_err(api_error)?;

    Ok(Json(BalanceResponse {
        agent_id,
        points: balances.points,
        tokens: balances.tokens,
        xp: balances.xp,
        level: progress.level,
        period_xp: progress.period_xp,
        tier: progress.tier.name,
    }))
}

/// GET /agent/:id/outcomes/:oid
pub async fn get_outcome(
    State(state): State<AppState>,
    Path((agent_id, outcome_id)): Path<(String, Uuid)>,
) -> ApiResult<OutcomeView> {
    let outcome = state
        .economy
        .claims
        .outcome(&agent_id, outcome_id)
        .await
        .map_err(api_error)?;
    Ok(Json(outcome.into()))
}
