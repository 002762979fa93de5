use chrono::{TimeZone, Utc};
use futures::future::join_all;
use std::sync::Arc;

use playzone::adapters::{EconomyStore, MemoryStore};
use playzone::domain::{
    CycleId, Currency, GameType, OutcomeStatus, RewardDefinition, TransitionType, TxSource,
};
use playzone::engine::{DrawRequest, Economy, ManualClock};
use playzone::{AppConfig, EconomyError};

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 21, 10, 0, 0).unwrap(),
    ))
}

fn single_prize(label: &str, points: i64, xp: i64) -> Vec<RewardDefinition> {
    vec![RewardDefinition {
        segment_index: 0,
        label: label.to_string(),
        point_value: points,
        xp_value: xp,
        weight: 100,
    }]
}

async fn economy_with_prize(game: GameType, points: i64) -> (Arc<Economy>, Arc<dyn EconomyStore>) {
    let store: Arc<dyn EconomyStore> = Arc::new(MemoryStore::new());
    let economy = Economy::new(store.clone(), &AppConfig::default(), clock());
    economy
        .catalog
        .publish(game, single_prize("Prize", points, points / 10))
        .await
        .unwrap();
    (Arc::new(economy), store)
}

#[tokio::test]
async fn test_token_draw_then_claim_credits_once() {
    let (economy, store) = economy_with_prize(GameType::SpinWheel, 500).await;
    economy
        .adjust("amy", Currency::Tokens, 100, "starter-tokens")
        .await
        .unwrap();

    let receipt = economy
        .claims
        .draw(DrawRequest::new("amy", GameType::SpinWheel).with_token_cost(100))
        .await
        .unwrap();
    assert_eq!(economy.ledger.balance("amy", Currency::Tokens).await.unwrap(), 0);
    let pending = store.get_outcome(receipt.outcome_id).await.unwrap().unwrap();
    assert_eq!(pending.status, OutcomeStatus::Pending);

    let first = economy
        .claims
        .claim("amy", receipt.outcome_id, Some(GameType::SpinWheel))
        .await
        .unwrap();
    assert_eq!(first.reward.points, 500);
    assert_eq!(first.new_balance, 500);

    let second = economy
        .claims
        .claim("amy", receipt.outcome_id, Some(GameType::SpinWheel))
        .await
        .unwrap();
    assert!(second.replayed);
    assert_eq!(second.reward, first.reward);
    assert_eq!(second.new_balance, 500);

    let claimed = store.get_outcome(receipt.outcome_id).await.unwrap().unwrap();
    assert_eq!(claimed.status, OutcomeStatus::Claimed);

    let point_credits = economy
        .ledger
        .history("amy")
        .await
        .unwrap()
        .into_iter()
        .filter(|tx| tx.currency == Currency::Points && tx.source == TxSource::SpinClaim)
        .count();
    assert_eq!(point_credits, 1);
    assert_eq!(
        economy.ledger.reconcile("amy", Currency::Points).await.unwrap(),
        500
    );
}

#[tokio::test]
async fn test_claim_over_daily_cap_is_capped() {
    let (economy, store) = economy_with_prize(GameType::ScratchCard, 50).await;
    economy
        .adjust("ben", Currency::Tokens, 50, "starter-tokens")
        .await
        .unwrap();
    economy.awards.award("ben", 480, "csat-week-43").await.unwrap();

    let receipt = economy
        .claims
        .draw(DrawRequest::new("ben", GameType::ScratchCard))
        .await
        .unwrap();
    let err = economy
        .claims
        .claim("ben", receipt.outcome_id, Some(GameType::ScratchCard))
        .await
        .unwrap_err();
    assert!(matches!(err, EconomyError::CapExceeded { earned: 480, cap: 500, .. }));
    assert_eq!(err.code(), "CAP_EXCEEDED");

    let outcome = store.get_outcome(receipt.outcome_id).await.unwrap().unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Capped);
    assert_eq!(economy.ledger.balance("ben", Currency::Points).await.unwrap(), 480);
}

#[tokio::test]
async fn test_concurrent_double_claim_credits_once() {
    let (economy, _store) = economy_with_prize(GameType::SpinWheel, 100).await;
    economy
        .adjust("cho", Currency::Tokens, 100, "starter-tokens")
        .await
        .unwrap();
    let receipt = economy
        .claims
        .draw(DrawRequest::new("cho", GameType::SpinWheel))
        .await
        .unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let economy = economy.clone();
            let outcome_id = receipt.outcome_id;
            tokio::spawn(async move { economy.claims.claim("cho", outcome_id, None).await })
        })
        .collect();
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| !r.replayed).count(), 1);
    assert!(results.iter().all(|r| r.new_balance == 100));
    assert_eq!(economy.ledger.balance("cho", Currency::Points).await.unwrap(), 100);
}

#[tokio::test]
async fn test_concurrent_claims_never_overflow_cap() {
    let (economy, store) = economy_with_prize(GameType::ScratchCard, 30).await;
    economy
        .adjust("dee", Currency::Tokens, 20 * 50, "starter-tokens")
        .await
        .unwrap();

    let mut outcome_ids = Vec::new();
    for _ in 0..20 {
        let receipt = economy
            .claims
            .draw(DrawRequest::new("dee", GameType::ScratchCard))
            .await
            .unwrap();
        outcome_ids.push(receipt.outcome_id);
    }

    let handles: Vec<_> = outcome_ids
        .iter()
        .map(|id| {
            let economy = economy.clone();
            let id = *id;
            tokio::spawn(async move { economy.claims.claim("dee", id, None).await })
        })
        .collect();
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let claimed = results.iter().filter(|r| r.is_ok()).count();
    let capped = results
        .iter()
        .filter(|r| matches!(r, Err(EconomyError::CapExceeded { .. })))
        .count();
    assert_eq!(claimed, 16);
    assert_eq!(capped, 4);
    assert_eq!(economy.ledger.balance("dee", Currency::Points).await.unwrap(), 480);

    let mut statuses = Vec::new();
    for id in &outcome_ids {
        statuses.push(store.get_outcome(*id).await.unwrap().unwrap().status);
    }
    assert_eq!(statuses.iter().filter(|s| **s == OutcomeStatus::Capped).count(), 4);
}

#[tokio::test]
async fn test_draw_without_tokens_is_refused_and_writes_nothing() {
    let (economy, _store) = economy_with_prize(GameType::SpinWheel, 10).await;
    let err = economy
        .claims
        .draw(DrawRequest::new("eve", GameType::SpinWheel))
        .await
        .unwrap_err();
    assert!(matches!(err, EconomyError::InsufficientBalance { .. }));
    assert!(economy.ledger.history("eve").await.unwrap().is_empty());
}

async fn ranked_week(points: &[(&str, i64)]) -> Vec<(String, u32, TransitionType)> {
    let clock = clock();
    let store: Arc<dyn EconomyStore> = Arc::new(MemoryStore::new());
    let economy = Economy::new(store, &AppConfig::default(), clock.clone());
    for (agent, pts) in points {
        economy.agents.register(agent, agent, None).await.unwrap();
        economy.awards.award(agent, *pts, "week-kpi").await.unwrap();
    }

    clock.set(Utc.with_ymd_and_hms(2026, 10, 27, 0, 0, 0).unwrap());
    let cycle = CycleId::parse("2026-W43").unwrap();
    economy
        .tiers
        .recompute_cycle(&cycle)
        .await
        .unwrap()
        .into_iter()
        .map(|a| (a.agent_id, a.rank, a.transition))
        .collect()
}

#[tokio::test]
async fn test_tier_ranking_is_deterministic() {
    let input = [
        ("a1", 400),
        ("a2", 300),
        ("a3", 300),
        ("a4", 250),
        ("a5", 200),
        ("a6", 150),
        ("a7", 120),
        ("a8", 100),
        ("a9", 50),
        ("a10", 10),
    ];
    let first = ranked_week(&input).await;
    let second = ranked_week(&input).await;
    assert_eq!(first, second);

    assert_eq!(first[0], ("a1".to_string(), 1, TransitionType::Promoted));
    assert_eq!(first[1].0, "a2");
    assert_eq!(first[2].0, "a3");
    assert_eq!(first[1].2, TransitionType::Promoted);
    assert_eq!(first[2].2, TransitionType::Safe);
    assert_eq!(first[9].2, TransitionType::Demoted);
}
