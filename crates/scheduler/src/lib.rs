pub mod digest;
pub mod sweep;
pub mod tiers;

pub use digest::{DigestScheduler, ScheduleError, MAX_INTERVAL_HOURS, MIN_INTERVAL_HOURS};
pub use sweep::run_sweep_loop;
pub use tiers::{due_for_poll, effective_tier, tier_after_failure, tier_after_success};
