use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of an earning-cap window (and of ranking cycles)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Daily,
    Weekly,
    Monthly,
}

impl PeriodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKind::Daily => "daily",
            PeriodKind::Weekly => "weekly",
            PeriodKind::Monthly => "monthly",
        }
    }

    pub fn all() -> [PeriodKind; 3] {
        [PeriodKind::Daily, PeriodKind::Weekly, PeriodKind::Monthly]
    }

    /// Start of the window containing `now`: midnight UTC, ISO week start
    /// (Monday) or the first of the month.
    pub fn period_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = now.date_naive();
        let start = match self {
            PeriodKind::Daily => date,
            PeriodKind::Weekly => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            PeriodKind::Monthly => date.with_day(1).unwrap_or(date),
        };
        midnight(start)
    }

    /// Exclusive end of the window starting at `start`
    pub fn period_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            PeriodKind::Daily => start + Duration::days(1),
            PeriodKind::Weekly => start + Duration::weeks(1),
            PeriodKind::Monthly => start
                .checked_add_months(Months::new(1))
                .unwrap_or(start + Duration::days(31)),
        }
    }
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PeriodKind {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "daily" => Ok(PeriodKind::Daily),
            "weekly" => Ok(PeriodKind::Weekly),
            "monthly" => Ok(PeriodKind::Monthly),
            _ => Err(format!("Invalid period kind: {}", s)),
        }
    }
}

pub(crate) fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Per-agent, per-period earned counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapWindow {
    pub agent_id: String,
    pub period: PeriodKind,
    pub period_start: DateTime<Utc>,
    pub amount_earned: i64,
    pub cap: i64,
}

impl CapWindow {
    pub fn remaining(&self) -> i64 {
        (self.cap - self.amount_earned).max(0)
    }
}

/// Result of a check-and-increment against one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapReservation {
    pub allowed: bool,
    pub remaining: i64,
    pub amount_earned: i64,
}
