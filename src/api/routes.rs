use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_handler))
        // Playzone endpoints
        .route("/agent/:id/playzone/spin", post(handlers::spin))
        .route("/agent/:id/playzone/spin/claim", post(handlers::claim_spin))
        .route("/agent/:id/playzone/scratch", post(handlers::scratch))
        .route(
            "/agent/:id/playzone/scratch/claim",
            post(handlers::claim_scratch),
        )
        .route(
            "/agent/:id/playzone/challenges",
            get(handlers::list_challenges),
        )
        .route(
            "/agent/:id/playzone/challenge/:cid/accept",
            post(handlers::accept_challenge),
        )
        // Agent read endpoints
        .route("/agent/:id/balance", get(handlers::get_balance))
        .route("/agent/:id/outcomes/:oid", get(handlers::get_outcome))
        // Leaderboard endpoints
        .route("/agent/:id/leaderboard", get(handlers::agent_leaderboard))
        .route(
            "/leadership/leaderboards",
            get(handlers::leadership_leaderboard),
        )
        // Admin endpoints
        .route(
            "/admin/agents",
            get(handlers::list_agents).post(handlers::register_agent),
        )
        .route(
            "/admin/agents/:id/deactivate",
            post(handlers::deactivate_agent),
        )
        .route("/admin/catalogs", post(handlers::publish_catalog))
        .route("/admin/catalogs/:game_type", get(handlers::get_catalog))
        .route("/admin/metrics/award", post(handlers::award_metric))
        .route("/admin/ledger/adjust", post(handlers::adjust_ledger))
        .route(
            "/admin/challenges/:cid/complete/:agent_id",
            post(handlers::complete_challenge),
        )
        .route(
            "/admin/tiers/:cycle_id/recompute",
            post(handlers::recompute_tiers),
        )
        // Add state, tracing and CORS
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
