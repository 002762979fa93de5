use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use tracing::info;

use super::{api_error, parse_currency, parse_game, ApiResult};
use crate::api::{auth::ensure_admin_authorized, state::AppState, types::*};
use crate::domain::{CycleId, RewardDefinition};

/// POST /admin/agents
pub async fn register_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterAgentRequest>,
) -> ApiResult<AgentView> {
    ensure_admin_authorized(&state, &headers)?;
    let agent = state
        .economy
        .agents
        .register(&req.agent_id, &req.display_name, req.department.as_deref())
        .await
        .map_err(api_error)?;
    Ok(Json(agent.into()))
}

/// GET /admin/agents
pub async fn list_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AgentListQuery>,
) -> ApiResult<Vec<AgentView>> {
    ensure_admin_authorized(&state, &headers)?;
    let agents = state
        .economy
        .agents
        .list(query.active_only)
        .await
        .map_err(api_error)?;
    Ok(Json(agents.into_iter().map(Into::into).collect()))
}

/// POST /admin/agents/:id/deactivate
pub async fn deactivate_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
) -> ApiResult<SuccessResponse> {
    ensure_admin_authorized(&state, &headers)?;
    state
        .economy
        .agents
        .deactivate(&agent_id)
        .await
        .map_err(api_error)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /admin/catalogs
pub async fn publish_catalog(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PublishCatalogRequest>,
) -> ApiResult<CatalogResponse> {
    ensure_admin_authorized(&state, &headers)?;
    let game_type = parse_game(&req.game_type)?;
    let rewards: Vec<RewardDefinition> = req.segments.into_iter().map(Into::into).collect();
    let version = state
        .economy
        .catalog
        .publish(game_type, rewards)
        .await
        .map_err(api_error)?;
    Ok(Json(CatalogResponse::from(version.as_ref())))
}

/// GET /admin/catalogs/:game_type
pub async fn get_catalog(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(game_type): Path<String>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<CatalogResponse> {
    ensure_admin_authorized(&state, &headers)?;
    let game_type = parse_game(&game_type)?;
    let catalog = &state.economy.catalog;
    let version = match query.version {
        Some(v) => catalog.version(game_type, v).await,
        None => catalog.get_version(game_type),
    }
    .map_err(api_error)?;
    Ok(Json(CatalogResponse::from(version.as_ref())))
}

/// POST /admin/metrics/award
pub async fn award_metric(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AwardRequest>,
) -> ApiResult<AwardResponse> {
    ensure_admin_authorized(&state, &headers)?;
    let receipt = state
        .economy
        .awards
        .award(&req.agent_id, req.points, &req.reference_id)
        .await
        .map_err(api_error)?;
    Ok(Json(receipt.into()))
}

/// POST /admin/ledger/adjust
pub async fn adjust_ledger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdjustRequest>,
) -> ApiResult<AdjustResponse> {
    ensure_admin_authorized(&state, &headers)?;
    let currency = parse_currency(&req.currency)?;
    let economy = &state.economy;
    let tx = economy
        .adjust(&req.agent_id, currency, req.delta, &req.reference_id)
        .await
        .map_err(api_error)?;
    let new_balance = economy
        .ledger
        .balance(&req.agent_id, currency)
        .await
        .map_err(api_error)?;

    Ok(Json(AdjustResponse {
        success: true,
        transaction_id: tx.id,
        currency: currency.as_str().to_string(),
        new_balance,
    }))
}

/// POST /admin/challenges/:cid/complete/:agent_id
pub async fn complete_challenge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((challenge_id, agent_id)): Path<(String, String)>,
) -> ApiResult<AwardResponse> {
    ensure_admin_authorized(&state, &headers)?;
    let receipt = state
        .economy
        .challenges
        .complete(&agent_id, &challenge_id)
        .await
        .map_err(api_error)?;
    Ok(Json(receipt.into()))
}

/// POST /admin/tiers/:cycle_id/recompute
pub async fn recompute_tiers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(cycle_id): Path<String>,
) -> ApiResult<RecomputeResponse> {
    ensure_admin_authorized(&state, &headers)?;
    let cycle_id = CycleId::parse(&cycle_id).map_err(api_error)?;
    let economy = &state.economy;
    let assignments = economy
        .tiers
        .recompute_cycle(&cycle_id)
        .await
        .map_err(api_error)?;
    economy.leaderboard.refresh().await.map_err(api_error)?;

    info!(cycle = %cycle_id, ranked = assignments.len(), "tier recompute requested");
    Ok(Json(RecomputeResponse {
        success: true,
        cycle_id: cycle_id.to_string(),
        assignments: assignments.into_iter().map(Into::into).collect(),
    }))
}
