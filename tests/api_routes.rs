use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use playzone::adapters::MemoryStore;
use playzone::api::{create_router, AppState};
use playzone::config::ChallengeConfig;
use playzone::domain::{GameType, RewardDefinition};
use playzone::engine::{Economy, SystemClock};
use playzone::AppConfig;

async fn economy() -> Arc<Economy> {
    let mut config = AppConfig::default();
    config.challenges = vec![ChallengeConfig {
        id: "qa-streak".to_string(),
        title: "Five perfect QA scores".to_string(),
        bonus_points: 150,
    }];
    let economy = Economy::new(Arc::new(MemoryStore::new()), &config, Arc::new(SystemClock));
    for game in GameType::all() {
        economy
            .catalog
            .publish(
                game,
                vec![
                    RewardDefinition {
                        segment_index: 0,
                        label: "Nothing".to_string(),
                        point_value: 0,
                        xp_value: 0,
                        weight: 0,
                    },
                    RewardDefinition {
                        segment_index: 1,
                        label: "200 Points".to_string(),
                        point_value: 200,
                        xp_value: 20,
                        weight: 100,
                    },
                ],
            )
            .await
            .unwrap();
    }
    Arc::new(economy)
}

fn app(economy: Arc<Economy>, admin_token: Option<&str>) -> Router {
    create_router(AppState::new(economy).with_admin_token(admin_token.map(str::to_string)))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn grant_tokens(app: &Router, agent: &str, amount: i64) {
    let (status, _) = send(
        app,
        "POST",
        "/admin/ledger/adjust",
        Some(json!({
            "agentId": agent,
            "currency": "tokens",
            "delta": amount,
            "referenceId": format!("grant-{}", amount),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health() {
    let app = app(economy().await, None);
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_spin_and_claim_round() {
    let app = app(economy().await, None);
    grant_tokens(&app, "amy", 100).await;

    let (status, drawn) = send(
        &app,
        "POST",
        "/agent/amy/playzone/spin",
        Some(json!({ "tokenCost": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(drawn["success"], true);
    assert_eq!(drawn["segmentIndex"], 1);
    let outcome_id = drawn["outcomeId"].as_str().unwrap().to_string();

    let (status, pending) = send(&app, "GET", &format!("/agent/amy/outcomes/{}", outcome_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["status"], "pending");
    assert!(pending["reward"].is_null());

    let claim = json!({ "outcomeId": outcome_id });
    let (status, claimed) = send(&app, "POST", "/agent/amy/playzone/spin/claim", Some(claim.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claimed["reward"]["label"], "200 Points");
    assert_eq!(claimed["reward"]["points"], 200);
    assert_eq!(claimed["reward"]["xp"], 20);
    assert_eq!(claimed["newBalance"], 200);

    let (status, again) = send(&app, "POST", "/agent/amy/playzone/spin/claim", Some(claim)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["newBalance"], 200);
    assert_eq!(again["replayed"], true);

    let (_, balance) = send(&app, "GET", "/agent/amy/balance", None).await;
    assert_eq!(balance["points"], 200);
    assert_eq!(balance["tokens"], 0);
    assert_eq!(balance["xp"], 20);
}

#[tokio::test]
async fn test_scratch_with_empty_body_and_idempotency_header() {
    let app = app(economy().await, None);
    grant_tokens(&app, "ben", 100).await;

    let request = || {
        Request::builder()
            .method("POST")
            .uri("/agent/ben/playzone/scratch")
            .header("idempotency-key", "card-1")
            .body(Body::empty())
            .unwrap()
    };
    let first = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first: Value = serde_json::from_slice(
        &axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap(),
    )
    .unwrap();

    let second = app.clone().oneshot(request()).await.unwrap();
    let second: Value = serde_json::from_slice(
        &axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap(),
    )
    .unwrap();
    assert_eq!(first["outcomeId"], second["outcomeId"]);
    assert_eq!(second["replayed"], true);

    let (_, balance) = send(&app, "GET", "/agent/ben/balance", None).await;
    assert_eq!(balance["tokens"], 50);
}

#[tokio::test]
async fn test_domain_errors_carry_codes() {
    let app = app(economy().await, None);

    let (status, body) = send(&app, "POST", "/agent/cho/playzone/spin", Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INSUFFICIENT_BALANCE");
    assert_eq!(body["success"], false);

    grant_tokens(&app, "cho", 100).await;
    let (status, body) = send(
        &app,
        "POST",
        "/agent/cho/playzone/spin",
        Some(json!({ "tokenCost": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (_, drawn) = send(&app, "POST", "/agent/cho/playzone/spin", Some(json!({}))).await;
    let claim = json!({ "outcomeId": drawn["outcomeId"] });

    let (status, body) = send(&app, "POST", "/agent/dee/playzone/spin/claim", Some(claim.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = send(&app, "POST", "/agent/cho/playzone/scratch/claim", Some(claim)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_challenge_accept_and_complete() {
    let app = app(economy().await, None);

    let (status, body) = send(
        &app,
        "POST",
        "/admin/challenges/qa-streak/complete/eve",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = send(
        &app,
        "POST",
        "/agent/eve/playzone/challenge/qa-streak/accept",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = send(
        &app,
        "POST",
        "/admin/challenges/qa-streak/complete/eve",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["points"], 150);
    assert_eq!(body["newBalance"], 150);
}

#[tokio::test]
async fn test_leaderboards() {
    let app = app(economy().await, None);
    for (agent, points, dept) in [("amy", 300, "support"), ("ben", 100, "sales"), ("cho", 200, "support")] {
        let (status, _) = send(
            &app,
            "POST",
            "/admin/agents",
            Some(json!({ "agentId": agent, "displayName": agent.to_uppercase(), "department": dept })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(
            &app,
            "POST",
            "/admin/metrics/award",
            Some(json!({ "agentId": agent, "points": points, "referenceId": "kpi-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, board) = send(&app, "GET", "/leadership/leaderboards?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["total"], 3);
    assert_eq!(board["entries"][0]["agentId"], "amy");
    assert_eq!(board["entries"][1]["agentId"], "cho");
    assert_eq!(board["nextCursor"], 2);
    assert!(board.get("me").is_none());

    let (status, mine) = send(&app, "GET", "/agent/ben/leaderboard?department=sales", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["entries"][0]["agentId"], "ben");
    assert_eq!(mine["entries"][0]["rank"], 3);
    assert_eq!(mine["me"]["rank"], 3);
    assert_eq!(mine["me"]["lifetimeXp"], 10);

    let (status, _) = send(&app, "GET", "/agent/nobody/leaderboard", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_catalog_admin_routes() {
    let app = app(economy().await, None);

    let (status, body) = send(
        &app,
        "POST",
        "/admin/catalogs",
        Some(json!({
            "gameType": "spin-wheel",
            "segments": [
                { "segmentIndex": 0, "label": "A", "pointValue": 10, "weight": 60 },
                { "segmentIndex": 1, "label": "B", "pointValue": 20, "weight": 30 },
            ],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "WEIGHT_SUM_ERROR");

    let (status, body) = send(
        &app,
        "POST",
        "/admin/catalogs",
        Some(json!({
            "gameType": "spin",
            "segments": [
                { "segmentIndex": 0, "label": "A", "pointValue": 10, "weight": 70 },
                { "segmentIndex": 1, "label": "B", "pointValue": 20, "weight": 30 },
            ],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 2);
    assert_eq!(body["fingerprint"].as_str().unwrap().len(), 64);

    let (_, active) = send(&app, "GET", "/admin/catalogs/spin-wheel", None).await;
    assert_eq!(active["version"], 2);
    let (_, first) = send(&app, "GET", "/admin/catalogs/spin-wheel?version=1", None).await;
    assert_eq!(first["segments"][1]["label"], "200 Points");
}

#[tokio::test]
async fn test_admin_routes_require_token_when_configured() {
    let app = app(economy().await, Some("s3cret"));

    let (status, body) = send(&app, "GET", "/admin/agents", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let request = Request::builder()
        .method("GET")
        .uri("/admin/agents")
        .header("x-playzone-admin-token", "s3cret")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_deactivated_agent_cannot_play() {
    let app = app(economy().await, None);
    grant_tokens(&app, "fay", 100).await;

    let (status, _) = send(&app, "POST", "/admin/agents/fay/deactivate", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/agent/fay/playzone/spin", Some(json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = send(&app, "POST", "/admin/agents/ghost/deactivate", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
