use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::cap::{midnight, PeriodKind};
use crate::error::{EconomyError, Result};

/// Identifies a ranking cycle: `2026-W43` (ISO week) or `2026-10` (month).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CycleId {
    kind: PeriodKind,
    start: NaiveDate,
}

impl CycleId {
    /// The cycle of `kind` that contains `at`
    pub fn containing(kind: PeriodKind, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            start: kind.period_start(at).date_naive(),
        }
    }

    /// The cycle immediately before this one
    pub fn previous(&self) -> Self {
        let just_before = self.start_at() - chrono::Duration::seconds(1);
        Self::containing(self.kind, just_before)
    }

    pub fn kind(&self) -> PeriodKind {
        self.kind
    }

    pub fn start_at(&self) -> DateTime<Utc> {
        midnight(self.start)
    }

    pub fn end_at(&self) -> DateTime<Utc> {
        self.kind.period_end(self.start_at())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || EconomyError::Validation(format!("Invalid cycle id: {}", raw));

        if let Some((year, week)) = raw.split_once("-W") {
            let year: i32 = year.parse().map_err(|_| invalid())?;
            let week: u32 = week.parse().map_err(|_| invalid())?;
            let start = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(invalid)?;
            return Ok(Self {
                kind: PeriodKind::Weekly,
                start,
            });
        }

        let (year, month) = raw.split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        Ok(Self {
            kind: PeriodKind::Monthly,
            start,
        })
    }
}

/// Chronological: earlier cycles sort first.
impl Ord for CycleId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for CycleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PeriodKind::Weekly => {
                let week = self.start.iso_week();
                write!(f, "{}-W{:02}", week.year(), week.week())
            }
            PeriodKind::Monthly => write!(f, "{}-{:02}", self.start.year(), self.start.month()),
            PeriodKind::Daily => write!(f, "{}", self.start.format("%Y-%m-%d")),
        }
    }
}

impl TryFrom<String> for CycleId {
    type Error = EconomyError;

    fn try_from(raw: String) -> Result<Self> {
        CycleId::parse(&raw)
    }
}

impl From<CycleId> for String {
    fn from(id: CycleId) -> Self {
        id.to_string()
    }
}

/// Band an agent landed in for a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    Promoted,
    Safe,
    /// Demotion zone
    Demoted,
}

impl TransitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionType::Promoted => "promoted",
            TransitionType::Safe => "safe",
            TransitionType::Demoted => "demoted",
        }
    }

    /// Apply the band to a rung on a ladder of `rungs` tiers
    pub fn apply(&self, current: usize, rungs: usize) -> usize {
        let top = rungs.saturating_sub(1);
        match self {
            TransitionType::Promoted => (current + 1).min(top),
            TransitionType::Safe => current.min(top),
            TransitionType::Demoted => current.saturating_sub(1).min(top),
        }
    }
}

impl TryFrom<&str> for TransitionType {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s {
            "promoted" => Ok(TransitionType::Promoted),
            "safe" => Ok(TransitionType::Safe),
            "demoted" => Ok(TransitionType::Demoted),
            _ => Err(format!("Invalid transition type: {}", s)),
        }
    }
}

/// A rung on the tier ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub index: usize,
    pub name: String,
}

impl Tier {
    /// Rung `index` of `ladder`, clamped to the top rung
    pub fn on_ladder(index: usize, ladder: &[String]) -> Self {
        let index = index.min(ladder.len().saturating_sub(1));
        Self {
            index,
            name: ladder.get(index).cloned().unwrap_or_default(),
        }
    }
}

/// One agent's standing for one cycle. Written once, superseded by the next
/// cycle, never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAssignment {
    pub agent_id: String,
    pub cycle_id: CycleId,
    /// 1-based
    pub rank: u32,
    /// rank / population * 100, rounded to 2dp
    pub percentile: Decimal,
    pub cycle_xp: i64,
    pub lifetime_points: i64,
    /// Rung on the tier ladder after applying the transition
    pub tier: usize,
    pub tier_name: String,
    pub transition: TransitionType,
    pub computed_at: DateTime<Utc>,
}
