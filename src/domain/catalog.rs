use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

use crate::error::{EconomyError, Result};

/// Integer weights of an active catalog must sum exactly to this.
pub const WEIGHT_TOTAL: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameType {
    SpinWheel,
    ScratchCard,
}

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::SpinWheel => "spin-wheel",
            GameType::ScratchCard => "scratch-card",
        }
    }

    pub fn all() -> [GameType; 2] {
        [GameType::SpinWheel, GameType::ScratchCard]
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for GameType {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s {
            "spin-wheel" | "spin" => Ok(GameType::SpinWheel),
            "scratch-card" | "scratch" => Ok(GameType::ScratchCard),
            _ => Err(format!("Invalid game type: {}", s)),
        }
    }
}

/// One prize segment. `segment_index` is the position the client renders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RewardDefinition {
    pub segment_index: u32,
    pub label: String,
    pub point_value: i64,
    pub xp_value: i64,
    pub weight: u32,
}

/// Immutable, ordered prize table for one game type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCatalogVersion {
    pub game_type: GameType,
    pub version: u32,
    pub rewards: Vec<RewardDefinition>,
    pub fingerprint: String,
    pub published_at: DateTime<Utc>,
}

impl RewardCatalogVersion {
    /// Build a version from a segment list. Call [`validate_rewards`] first;
    /// the catalog registry does so on publish.
    pub fn new(game_type: GameType, version: u32, rewards: Vec<RewardDefinition>) -> Self {
        let fingerprint = fingerprint(game_type, &rewards);
        Self {
            game_type,
            version,
            rewards,
            fingerprint,
            published_at: Utc::now(),
        }
    }

    pub fn segment(&self, index: u32) -> Option<&RewardDefinition> {
        self.rewards.get(index as usize)
    }

    pub fn total_weight(&self) -> u64 {
        self.rewards.iter().map(|r| r.weight as u64).sum()
    }

    pub fn validate(&self) -> Result<()> {
        validate_rewards(&self.rewards)
    }
}

/// Check that a segment list may become an active catalog.
///
/// Segments must be declared in index order `0..N-1` with no duplicates,
/// values must be non-negative and integer weights must sum exactly to
/// [`WEIGHT_TOTAL`]. Nothing is ever renormalized.
pub fn validate_rewards(rewards: &[RewardDefinition]) -> Result<()> {
    if rewards.is_empty() {
        return Err(EconomyError::Validation(
            "catalog must contain at least one segment".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(rewards.len());
    for (position, reward) in rewards.iter().enumerate() {
        if !seen.insert(reward.segment_index) {
            return Err(EconomyError::DuplicateSegmentError(format!(
                "segment index {} declared more than once",
                reward.segment_index
            )));
        }
        if reward.segment_index as usize != position {
            return Err(EconomyError::DuplicateSegmentError(format!(
                "segment index {} declared at position {}; indices must be contiguous 0..{}",
                reward.segment_index,
                position,
                rewards.len() - 1
            )));
        }
        if reward.point_value < 0 || reward.xp_value < 0 {
            return Err(EconomyError::Validation(format!(
                "segment {} has a negative value",
                reward.segment_index
            )));
        }
        if reward.label.trim().is_empty() {
            return Err(EconomyError::Validation(format!(
                "segment {} has an empty label",
                reward.segment_index
            )));
        }
    }

    let actual: u64 = rewards.iter().map(|r| r.weight as u64).sum();
    if actual != WEIGHT_TOTAL as u64 {
        return Err(EconomyError::WeightSumError {
            expected: WEIGHT_TOTAL,
            actual,
        });
    }

    Ok(())
}

/// SHA-256 over the canonical segment list, for auditing which odds were live.
pub fn fingerprint(game_type: GameType, rewards: &[RewardDefinition]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(game_type.as_str().as_bytes());
    for reward in rewards {
        hasher.update(reward.segment_index.to_le_bytes());
        hasher.update(reward.label.as_bytes());
        hasher.update([0u8]);
        hasher.update(reward.point_value.to_le_bytes());
        hasher.update(reward.xp_value.to_le_bytes());
        hasher.update(reward.weight.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward(index: u32, weight: u32) -> RewardDefinition {
        RewardDefinition {
            segment_index: index,
            label: format!("Prize {}", index),
            point_value: 10 * index as i64,
            xp_value: index as i64,
            weight,
        }
    }

    #[test]
    fn test_valid_catalog() {
        let rewards = vec![reward(0, 50), reward(1, 30), reward(2, 20)];
        assert!(validate_rewards(&rewards).is_ok());
    }

    #[test]
    fn test_weight_sum_must_be_exact() {
        let rewards = vec![reward(0, 50), reward(1, 30), reward(2, 19)];
        match validate_rewards(&rewards) {
            Err(EconomyError::WeightSumError { expected, actual }) => {
                assert_eq!(expected, 100);
                assert_eq!(actual, 99);
            }
            other => panic!("expected WeightSumError, got {:?}", other),
        }
    }

    #[test]
    fn test_all_zero_weights_rejected() {
        let rewards = vec![reward(0, 0), reward(1, 0)];
        assert!(matches!(
            validate_rewards(&rewards),
            Err(EconomyError::WeightSumError { actual: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_segment_rejected() {
        let rewards = vec![reward(0, 50), reward(0, 50)];
        assert!(matches!(
            validate_rewards(&rewards),
            Err(EconomyError::DuplicateSegmentError(_))
        ));
    }

    #[test]
    fn test_gap_in_segments_rejected() {
        let rewards = vec![reward(0, 50), reward(2, 50)];
        assert!(matches!(
            validate_rewards(&rewards),
            Err(EconomyError::DuplicateSegmentError(_))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_odds() {
        let a = vec![reward(0, 50), reward(1, 50)];
        let b = vec![reward(0, 60), reward(1, 40)];
        assert_ne!(
            fingerprint(GameType::SpinWheel, &a),
            fingerprint(GameType::SpinWheel, &b)
        );
        assert_eq!(
            fingerprint(GameType::SpinWheel, &a),
            fingerprint(GameType::SpinWheel, &a.clone())
        );
    }
}
