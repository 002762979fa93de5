use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{api_error, ApiResult};
use crate::api::{state::AppState, types::*};
use crate::engine::LeaderboardPage;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

async fn read_page(
    state: &AppState,
    query: &LeaderboardQuery,
) -> std::result::Result<(LeaderboardPage, String, Option<String>), super::ApiError> {
    let leaderboard = &state.economy.leaderboard;
    let snapshot = leaderboard.current().await.map_err(api_error)?;
    let size = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let page = leaderboard
        .page(query.cursor, size, query.department.as_deref())
        .await
        .map_err(api_error)?;
    Ok((
        page,
        snapshot.cycle_id.to_string(),
        snapshot.last_computed_cycle.as_ref().map(|c| c.to_string()),
    ))
}

/// GET /agent/:id/leaderboard
pub async fn agent_leaderboard(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<LeaderboardResponse> {
    let economy = &state.economy;
    let agent = economy.agents.get(&agent_id).await.map_err(api_error)?;
    let (page, cycle_id, last_computed_cycle) = read_page(&state, &query).await?;

    let progress = economy.tiers.progress(&agent).await.map_err(api_error)?;
    // Deactivated agents keep their progress but hold no rank
    let rank = economy.leaderboard.rank_of(&agent_id).await.ok().map(|e| e.rank);

    Ok(Json(LeaderboardResponse {
        success: true,
        cycle_id,
        last_computed_cycle,
        entries: page.entries.into_iter().map(Into::into).collect(),
        next_cursor: page.next_cursor,
        total: page.total,
        me: Some(AgentSummary::new(progress, rank)),
    }))
}

/// GET /leadership/leaderboards
pub async fn leadership_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<LeaderboardResponse> {
    let (page, cycle_id, last_computed_cycle) = read_page(&state, &query).await?;
    Ok(Json(LeaderboardResponse {
        success: true,
        cycle_id,
        last_computed_cycle,
        entries: page.entries.into_iter().map(Into::into).collect(),
        next_cursor: page.next_cursor,
        total: page.total,
        me: None,
    }))
}
