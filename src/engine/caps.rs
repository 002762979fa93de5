//! Cap Enforcer
//!
//! Tracks points earned per agent per day/week/month against configured
//! caps. Each reservation is a single check-and-increment in the store, so
//! concurrent reservations can never push a window past its cap.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::adapters::EconomyStore;
use crate::config::CapsConfig;
use crate::domain::{CapWindow, PeriodKind};
use crate::error::{EconomyError, Result};

/// Answer to a single-window reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapDecision {
    pub allowed: bool,
    /// Headroom left after this call; `i64::MAX` for a disabled cap
    pub remaining: i64,
}

/// Reservations taken across every enabled window, released as a unit if
/// the credit they guard never commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapHold {
    pub agent_id: String,
    pub amount: i64,
    windows: Vec<(PeriodKind, DateTime<Utc>)>,
}

/// First window that refused a multi-window reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapDenial {
    pub period: PeriodKind,
    pub earned: i64,
    pub cap: i64,
    pub remaining: i64,
}

impl CapDenial {
    pub fn into_error(self, requested: i64) -> EconomyError {
        EconomyError::CapExceeded {
            period: self.period.to_string(),
            earned: self.earned,
            cap: self.cap,
            requested,
        }
    }
}

pub struct CapEnforcer {
    store: Arc<dyn EconomyStore>,
    config: CapsConfig,
}

impl CapEnforcer {
    pub fn new(store: Arc<dyn EconomyStore>, config: CapsConfig) -> Self {
        Self { store, config }
    }

    /// Reserve `amount` in the agent's `period` window containing `now`.
    pub async fn try_reserve(
        &self,
        agent_id: &str,
        period: PeriodKind,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<CapDecision> {
        if amount < 0 {
            return Err(EconomyError::InvalidAmount(amount));
        }

        let limit = self.config.limit(period);
        if !limit.enabled {
            return Ok(CapDecision {
                allowed: true,
                remaining: i64::MAX,
            });
        }

        let start = period.period_start(now);
        let reservation = self
            .store
            .reserve_cap(agent_id, period, start, amount, limit.cap)
            .await?;

        if reservation.allowed {
            debug!(
                agent = agent_id,
                period = period.as_str(),
                amount,
                earned = reservation.amount_earned,
                cap = limit.cap,
                "cap reserved"
            );
        } else {
            warn!(
                agent = agent_id,
                period = period.as_str(),
                amount,
                earned = reservation.amount_earned,
                cap = limit.cap,
                "cap refused"
            );
        }

        Ok(CapDecision {
            allowed: reservation.allowed,
            remaining: reservation.remaining,
        })
    }

    /// Reserve `amount` in every enabled window. All-or-nothing: windows
    /// reserved before a refusal are released again.
    pub async fn reserve_all(
        &self,
        agent_id: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<CapHold, CapDenial>> {
        let mut hold = CapHold {
            agent_id: agent_id.to_string(),
            amount,
            windows: Vec::new(),
        };

        for period in PeriodKind::all() {
            let limit = self.config.limit(period);
            if !limit.enabled {
                continue;
            }

            let decision = match self.try_reserve(agent_id, period, amount, now).await {
                Ok(decision) => decision,
                Err(e) => {
                    self.release(&hold).await?;
                    return Err(e);
                }
            };
            if !decision.allowed {
                self.release(&hold).await?;
                return Ok(Err(CapDenial {
                    period,
                    earned: limit.cap - decision.remaining,
                    cap: limit.cap,
                    remaining: decision.remaining,
                }));
            }
            hold.windows.push((period, period.period_start(now)));
        }

        Ok(Ok(hold))
    }

    /// Give back a hold whose credit failed
    pub async fn release(&self, hold: &CapHold) -> Result<()> {
        for (period, start) in &hold.windows {
            self.store
                .release_cap(&hold.agent_id, *period, *start, hold.amount)
                .await?;
            debug!(
                agent = %hold.agent_id,
                period = period.as_str(),
                amount = hold.amount,
                "cap released"
            );
        }
        Ok(())
    }

    /// Smallest headroom across enabled windows; `None` when no cap applies
    pub async fn headroom(&self, agent_id: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        let mut smallest: Option<i64> = None;
        for period in PeriodKind::all() {
            let limit = self.config.limit(period);
            if !limit.enabled {
                continue;
            }
            let earned = self
                .store
                .cap_window(agent_id, period, period.period_start(now))
                .await?
                .map(|w| w.amount_earned)
                .unwrap_or(0);
            let remaining = (limit.cap - earned).max(0);
            smallest = Some(smallest.map_or(remaining, |s| s.min(remaining)));
        }
        Ok(smallest)
    }

    /// First enabled window at `at` that cannot fit `amount`
    pub async fn denial_at(
        &self,
        agent_id: &str,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<CapDenial>> {
        for period in PeriodKind::all() {
            let limit = self.config.limit(period);
            if !limit.enabled {
                continue;
            }
            let earned = self
                .window(agent_id, period, at)
                .await?
                .map(|w| w.amount_earned)
                .unwrap_or(0);
            if earned + amount > limit.cap {
                return Ok(Some(CapDenial {
                    period,
                    earned,
                    cap: limit.cap,
                    remaining: (limit.cap - earned).max(0),
                }));
            }
        }
        Ok(None)
    }

    pub async fn window(
        &self,
        agent_id: &str,
        period: PeriodKind,
        now: DateTime<Utc>,
    ) -> Result<Option<CapWindow>> {
        self.store
            .cap_window(agent_id, period, period.period_start(now))
            .await
    }
}
