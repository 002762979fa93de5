use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::catalog::GameType;

/// Draw outcome lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Drawn, entry fee paid, reward not yet credited
    Pending,
    /// Reward credited to the ledger
    Claimed,
    /// Not claimed before `expires_at`
    Expired,
    /// Claim refused by an earning cap; the reward is forfeited
    Capped,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Pending => "pending",
            OutcomeStatus::Claimed => "claimed",
            OutcomeStatus::Expired => "expired",
            OutcomeStatus::Capped => "capped",
        }
    }

    /// Check if this status can transition to another status
    pub fn can_transition_to(&self, target: OutcomeStatus) -> bool {
        use OutcomeStatus::*;

        matches!(
            (self, target),
            (Pending, Claimed) | (Pending, Expired) | (Pending, Capped)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutcomeStatus::Pending)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OutcomeStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(OutcomeStatus::Pending),
            "claimed" => Ok(OutcomeStatus::Claimed),
            "expired" => Ok(OutcomeStatus::Expired),
            "capped" => Ok(OutcomeStatus::Capped),
            _ => Err(format!("Invalid outcome status: {}", s)),
        }
    }
}

/// Result of one play. The credited value is always taken from here, never
/// from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawOutcome {
    pub id: Uuid,
    pub agent_id: String,
    pub game_type: GameType,
    pub catalog_version: u32,
    pub segment_index: u32,
    pub label: String,
    pub point_value: i64,
    pub xp_value: i64,
    pub status: OutcomeStatus,
    /// Client-supplied replay key for the draw request
    pub request_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DrawOutcome {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == OutcomeStatus::Pending && now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_moves() {
        use OutcomeStatus::*;
        assert!(Pending.can_transition_to(Claimed));
        assert!(Pending.can_transition_to(Expired));
        assert!(Pending.can_transition_to(Capped));
        for terminal in [Claimed, Expired, Capped] {
            assert!(terminal.is_terminal());
            for target in [Pending, Claimed, Expired, Capped] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }
}
