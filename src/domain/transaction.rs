use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Ledger currency tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// Spendable reward points
    Points,
    /// Spin credits used as entry fees
    Tokens,
    /// Experience, ranked per cycle
    Xp,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Points => "points",
            Currency::Tokens => "tokens",
            Currency::Xp => "xp",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Currency {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "points" => Ok(Currency::Points),
            "tokens" => Ok(Currency::Tokens),
            "xp" => Ok(Currency::Xp),
            _ => Err(format!("Invalid currency: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Credit,
    Debit,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Credit => "credit",
            TxKind::Debit => "debit",
        }
    }

    /// Sign applied to the amount when summing a balance
    pub fn sign(&self) -> i64 {
        match self {
            TxKind::Credit => 1,
            TxKind::Debit => -1,
        }
    }
}

impl TryFrom<&str> for TxKind {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "credit" => Ok(TxKind::Credit),
            "debit" => Ok(TxKind::Debit),
            _ => Err(format!("Invalid transaction kind: {}", s)),
        }
    }
}

/// Why a transaction was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxSource {
    MetricAward,
    SpinEntry,
    SpinClaim,
    ScratchEntry,
    ScratchClaim,
    ChallengeBonus,
    ManualAdjustment,
}

impl TxSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxSource::MetricAward => "metric-award",
            TxSource::SpinEntry => "spin-entry",
            TxSource::SpinClaim => "spin-claim",
            TxSource::ScratchEntry => "scratch-entry",
            TxSource::ScratchClaim => "scratch-claim",
            TxSource::ChallengeBonus => "challenge-bonus",
            TxSource::ManualAdjustment => "manual-adjustment",
        }
    }
}

impl fmt::Display for TxSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for TxSource {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "metric-award" => Ok(TxSource::MetricAward),
            "spin-entry" => Ok(TxSource::SpinEntry),
            "spin-claim" => Ok(TxSource::SpinClaim),
            "scratch-entry" => Ok(TxSource::ScratchEntry),
            "scratch-claim" => Ok(TxSource::ScratchClaim),
            "challenge-bonus" => Ok(TxSource::ChallengeBonus),
            "manual-adjustment" => Ok(TxSource::ManualAdjustment),
            _ => Err(format!("Invalid transaction source: {}", s)),
        }
    }
}

/// Deduplication key, unique per (agent, source, reference).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(agent_id: &str, source: TxSource, reference_id: &str) -> Self {
        Self(format!("{}:{}:{}", source.as_str(), agent_id, reference_id))
    }

    /// Rebuild a key read back from storage
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable ledger entry. Corrections are compensating entries, never edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub agent_id: String,
    pub kind: TxKind,
    pub currency: Currency,
    /// Always positive; direction comes from `kind`
    pub amount: i64,
    pub source: TxSource,
    pub idempotency_key: IdempotencyKey,
    /// Per-agent commit order
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn signed_amount(&self) -> i64 {
        self.kind.sign() * self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_scopes_agent_and_source() {
        let a = IdempotencyKey::new("agent-1", TxSource::SpinClaim, "o-1");
        let b = IdempotencyKey::new("agent-2", TxSource::SpinClaim, "o-1");
        let c = IdempotencyKey::new("agent-1", TxSource::ScratchClaim, "o-1");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "spin-claim:agent-1:o-1");
    }

    #[test]
    fn test_source_round_trips_through_str() {
        for source in [
            TxSource::MetricAward,
            TxSource::SpinClaim,
            TxSource::ChallengeBonus,
            TxSource::ManualAdjustment,
        ] {
            assert_eq!(TxSource::try_from(source.as_str()), Ok(source));
        }
        assert!(TxSource::try_from("bogus").is_err());
    }
}
