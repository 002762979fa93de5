pub mod agent;
pub mod cap;
pub mod catalog;
pub mod outcome;
pub mod tier;
pub mod transaction;

pub use agent::Agent;
pub use cap::{CapReservation, CapWindow, PeriodKind};
pub use catalog::{validate_rewards, GameType, RewardCatalogVersion, RewardDefinition, WEIGHT_TOTAL};
pub use outcome::{DrawOutcome, OutcomeStatus};
pub use tier::{CycleId, Tier, TierAssignment, TransitionType};
pub use transaction::{Currency, IdempotencyKey, Transaction, TxKind, TxSource};
