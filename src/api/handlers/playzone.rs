use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use super::{api_error, ApiResult};
use crate::api::{state::AppState, types::*};
use crate::domain::GameType;
use crate::engine::{DrawReceipt, DrawRequest};

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Body `requestId` first, then the `Idempotency-Key` header
fn request_key(headers: &HeaderMap, body: &DrawBody) -> Option<String> {
    body.request_id
        .clone()
        .or_else(|| {
            headers
                .get(IDEMPOTENCY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

async fn draw(
    state: &AppState,
    agent_id: String,
    game_type: GameType,
    headers: &HeaderMap,
    body: Option<Json<DrawBody>>,
) -> std::result::Result<DrawReceipt, super::ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let mut request = DrawRequest::new(agent_id, game_type);
    if let Some(cost) = body.token_cost {
        request = request.with_token_cost(cost);
    }
    if let Some(key) = request_key(headers, &body) {
        request = request.with_request_key(key);
    }
    state.economy.claims.draw(request).await.map_err(api_error)
}

/// POST /agent/:id/playzone/spin
pub async fn spin(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<DrawBody>>,
) -> ApiResult<SpinResponse> {
    let receipt = draw(&state, agent_id, GameType::SpinWheel, &headers, body).await?;
    Ok(Json(SpinResponse {
        success: true,
        segment_index: receipt.segment_index,
        outcome_id: receipt.outcome_id,
        catalog_version: receipt.catalog_version,
        expires_at: receipt.expires_at,
        replayed: receipt.replayed,
    }))
}

/// POST /agent/:id/playzone/scratch
pub async fn scratch(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<DrawBody>>,
) -> ApiResult<ScratchResponse> {
    let receipt = draw(&state, agent_id, GameType::ScratchCard, &headers, body).await?;
    Ok(Json(ScratchResponse {
        success: true,
        outcome_id: receipt.outcome_id,
        expires_at: receipt.expires_at,
        replayed: receipt.replayed,
    }))
}

/// POST /agent/:id/playzone/spin/claim
pub async fn claim_spin(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(body): Json<ClaimBody>,
) -> ApiResult<ClaimResponse> {
    let receipt = state
        .economy
        .claims
        .claim(&agent_id, body.outcome_id, Some(GameType::SpinWheel))
        .await
        .map_err(api_error)?;
    Ok(Json(receipt.into()))
}

/// POST /agent/:id/playzone/scratch/claim
pub async fn claim_scratch(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(body): Json<ClaimBody>,
) -> ApiResult<ClaimResponse> {
    let receipt = state
        .economy
        .claims
        .claim(&agent_id, body.outcome_id, Some(GameType::ScratchCard))
        .await
        .map_err(api_error)?;
    Ok(Json(receipt.into()))
}

/// GET /agent/:id/playzone/challenges
pub async fn list_challenges(State(state): State<AppState>) -> Json<Vec<ChallengeView>> {
    Json(
        state
            .economy
            .challenges
            .list()
            .iter()
            .map(|c| ChallengeView {
                id: c.id.clone(),
                title: c.title.clone(),
                bonus_points: c.bonus_points,
            })
            .collect(),
    )
}

/// POST /agent/:id/playzone/challenge/:cid/accept
pub async fn accept_challenge(
    State(state): State<AppState>,
    Path((agent_id, challenge_id)): Path<(String, String)>,
) -> ApiResult<SuccessResponse> {
    state
        .economy
        .challenges
        .accept(&agent_id, &challenge_id)
        .await
        .map_err(api_error)?;
    Ok(Json(SuccessResponse { success: true }))
}
