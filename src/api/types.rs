use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Agent, DrawOutcome, OutcomeStatus, RewardCatalogVersion, RewardDefinition, TierAssignment};
use crate::engine::{AwardReceipt, ClaimReceipt, LeaderboardEntry, Progress};

// ============================================================================
// Common Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    /// Stable machine code, e.g. `CAP_EXCEEDED`
    pub code: String,
    pub error: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub uptime_secs: i64,
}

// ============================================================================
// Playzone Types
// ============================================================================

/// Body of a draw. Both fields are optional; scratch cards send `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawBody {
    pub token_cost: Option<i64>,
    /// Replay key; an `Idempotency-Key` header works too
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinResponse {
    pub success: bool,
    pub segment_index: u32,
    pub outcome_id: Uuid,
    pub catalog_version: u32,
    pub expires_at: DateTime<Utc>,
    pub replayed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScratchResponse {
    pub success: bool,
    pub outcome_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub replayed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimBody {
    pub outcome_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardView {
    pub label: String,
    pub points: i64,
    pub xp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub success: bool,
    pub reward: RewardView,
    pub new_balance: i64,
    pub replayed: bool,
}

impl From<ClaimReceipt> for ClaimResponse {
    fn from(receipt: ClaimReceipt) -> Self {
        Self {
            success: true,
            reward: RewardView {
                label: receipt.reward.label,
                points: receipt.reward.points,
                xp: receipt.reward.xp,
            },
            new_balance: receipt.new_balance,
            replayed: receipt.replayed,
        }
    }
}

/// An outcome as shown to its owner. The prize stays hidden until the
/// outcome leaves `pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeView {
    pub outcome_id: Uuid,
    pub game_type: String,
    pub status: String,
    pub segment_index: u32,
    pub catalog_version: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub reward: Option<RewardView>,
}

impl From<DrawOutcome> for OutcomeView {
    fn from(outcome: DrawOutcome) -> Self {
        let reward = (outcome.status != OutcomeStatus::Pending).then(|| RewardView {
            label: outcome.label.clone(),
            points: outcome.point_value,
            xp: outcome.xp_value,
        });
        Self {
            outcome_id: outcome.id,
            game_type: outcome.game_type.as_str().to_string(),
            status: outcome.status.as_str().to_string(),
            segment_index: outcome.segment_index,
            catalog_version: outcome.catalog_version,
            created_at: outcome.created_at,
            expires_at: outcome.expires_at,
            resolved_at: outcome.resolved_at,
            reward,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeView {
    pub id: String,
    pub title: String,
    pub bonus_points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub agent_id: String,
    pub points: i64,
    pub tokens: i64,
    pub xp: i64,
    pub level: i64,
    pub period_xp: i64,
    pub tier: String,
}

// ============================================================================
// Leaderboard Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
    pub cursor: Option<usize>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntryView {
    pub rank: u32,
    pub percentile: Option<Decimal>,
    pub agent_id: String,
    pub name: String,
    pub department: Option<String>,
    pub xp: i64,
    pub period_xp: i64,
    pub level: i64,
    pub points: i64,
    pub tier: String,
    pub last_transition: Option<String>,
}

impl From<LeaderboardEntry> for LeaderboardEntryView {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            rank: entry.rank,
            percentile: entry.percentile,
            agent_id: entry.agent_id,
            name: entry.display_name,
            department: entry.department,
            xp: entry.cycle_xp,
            period_xp: entry.period_xp,
            level: entry.level,
            points: entry.points,
            tier: entry.tier_name,
            last_transition: entry.last_transition.map(|t| t.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub agent_id: String,
    pub rank: Option<u32>,
    pub level: i64,
    pub lifetime_xp: i64,
    pub period_xp: i64,
    pub tier: String,
}

impl AgentSummary {
    pub fn new(progress: Progress, rank: Option<u32>) -> Self {
        Self {
            agent_id: progress.agent_id,
            rank,
            level: progress.level,
            lifetime_xp: progress.lifetime_xp,
            period_xp: progress.period_xp,
            tier: progress.tier.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub success: bool,
    pub cycle_id: String,
    pub last_computed_cycle: Option<String>,
    pub entries: Vec<LeaderboardEntryView>,
    pub next_cursor: Option<usize>,
    pub total: usize,
    /// Present on the per-agent route
    #[serde(skip_serializing_if = "Option::is_none")]
    pub me: Option<AgentSummary>,
}

// ============================================================================
// Admin Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentRequest {
    pub agent_id: String,
    #[serde(default)]
    pub display_name: String,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentView {
    pub agent_id: String,
    pub display_name: String,
    pub department: Option<String>,
    pub tier: usize,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Agent> for AgentView {
    fn from(agent: Agent) -> Self {
        Self {
            agent_id: agent.id,
            display_name: agent.display_name,
            department: agent.department,
            tier: agent.current_tier,
            active: agent.active,
            created_at: agent.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentListQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentBody {
    pub segment_index: u32,
    pub label: String,
    pub point_value: i64,
    #[serde(default)]
    pub xp_value: i64,
    pub weight: u32,
}

impl From<SegmentBody> for RewardDefinition {
    fn from(body: SegmentBody) -> Self {
        Self {
            segment_index: body.segment_index,
            label: body.label,
            point_value: body.point_value,
            xp_value: body.xp_value,
            weight: body.weight,
        }
    }
}

impl From<&RewardDefinition> for SegmentBody {
    fn from(def: &RewardDefinition) -> Self {
        Self {
            segment_index: def.segment_index,
            label: def.label.clone(),
            point_value: def.point_value,
            xp_value: def.xp_value,
            weight: def.weight,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishCatalogRequest {
    pub game_type: String,
    pub segments: Vec<SegmentBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub game_type: String,
    pub version: u32,
    pub fingerprint: String,
    pub published_at: DateTime<Utc>,
    pub segments: Vec<SegmentBody>,
}

impl From<&RewardCatalogVersion> for CatalogResponse {
    fn from(version: &RewardCatalogVersion) -> Self {
        Self {
            game_type: version.game_type.as_str().to_string(),
            version: version.version,
            fingerprint: version.fingerprint.clone(),
            published_at: version.published_at,
            segments: version.rewards.iter().map(SegmentBody::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogQuery {
    pub version: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardRequest {
    pub agent_id: String,
    pub points: i64,
    pub reference_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardResponse {
    pub success: bool,
    pub requested: i64,
    pub points: i64,
    pub xp: i64,
    pub partial: bool,
    pub replayed: bool,
    pub new_balance: i64,
}

impl From<AwardReceipt> for AwardResponse {
    fn from(receipt: AwardReceipt) -> Self {
        Self {
            success: true,
            requested: receipt.requested,
            points: receipt.points,
            xp: receipt.xp,
            partial: receipt.partial,
            replayed: receipt.replayed,
            new_balance: receipt.balance,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustRequest {
    pub agent_id: String,
    pub currency: String,
    /// Positive credits, negative debits
    pub delta: i64,
    pub reference_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustResponse {
    pub success: bool,
    pub transaction_id: Uuid,
    pub currency: String,
    pub new_balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    pub agent_id: String,
    pub rank: u32,
    pub percentile: Decimal,
    pub cycle_xp: i64,
    pub lifetime_points: i64,
    pub tier: String,
    pub transition: String,
}

impl From<TierAssignment> for AssignmentView {
    fn from(a: TierAssignment) -> Self {
        Self {
            agent_id: a.agent_id,
            rank: a.rank,
            percentile: a.percentile,
            cycle_xp: a.cycle_xp,
            lifetime_points: a.lifetime_points,
            tier: a.tier_name,
            transition: a.transition.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeResponse {
    pub success: bool,
    pub cycle_id: String,
    pub assignments: Vec<AssignmentView>,
}
