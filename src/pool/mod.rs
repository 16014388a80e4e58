//! Pool Engine
//!
//! The authoritative work pool and its satellites: the recent-history dedup
//! set, the client-side staging buffer, observational stats, disk spillover
//! and the watermark maintainer that drives it.
//!
//! All pool state lives behind a single mutex so check-then-act sequences
//! (dedup-then-insert, pop-then-record) are atomic as a unit. Lock scopes are
//! method-local and never cross an await point.

mod engine;
mod error;
pub mod persist;
pub mod stability;
mod stats;

pub use engine::{PoolEngine, QueueOutcome};
pub use error::{PersistError, PersistResult};
pub use persist::{RestoreOptions, SaveOptions};
pub use stats::NodeStats;

#[cfg(test)]
mod tests;
