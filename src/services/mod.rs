pub mod scheduler;
pub mod sweeper;

pub use scheduler::{CycleScheduler, SchedulerStats};
pub use sweeper::{ExpirySweeper, SweeperStats};
