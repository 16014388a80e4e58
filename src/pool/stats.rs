//! Observational counters
//!
//! Stats are labels and counters only; control logic never reads them. The
//! snapshot serializes with the kebab-case keys peers and operators expect.

use serde::Serialize;

/// Mutable counters held inside the pool mutex
#[derive(Debug, Default)]
pub(crate) struct StatsCore {
    pub items_served: u64,
    pub items_processed: u64,
    pub idle: u64,
    pub retry_queuing: usize,
}

/// Point-in-time stats snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStats {
    pub sid: String,
    pub id: String,
    pub role: String,
    #[serde(rename = "items-served")]
    pub items_served: u64,
    #[serde(rename = "items-processed")]
    pub items_processed: u64,
    #[serde(rename = "pool-size")]
    pub pool_size: usize,
    pub idle: u64,
    #[serde(rename = "retry-queuing")]
    pub retry_queuing: usize,
    #[serde(rename = "local-pool-size")]
    pub local_pool_size: usize,
}
