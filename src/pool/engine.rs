//! Pool engine internals
//!
//! Owns the three item sequences and the stats counters behind one mutex:
//!
//! - `pool`: the authoritative FIFO, server role only
//! - `recent`: bounded history of dequeued items, the dedup horizon
//! - `local`: client-side staging buffer before forwarding
//!
//! Dedup spans `pool` and `recent`: an item is never in both, and re-queuing
//! an item still inside the horizon is silently dropped. Linear membership
//! scans are fine at the pool sizes the watermark maintainer allows.

use crate::core::config::NodeConfig;
use crate::node::role::{Lifecycle, Role};
use crate::notifications::{NodeEvent, NotificationHub};
use crate::pool::stats::{NodeStats, StatsCore};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

/// Entries evicted from the recent history in one batch once it overflows.
/// Batching trades a little dedup precision for far fewer evictions.
const RECENT_EVICT_BATCH: usize = 25;

/// What happened to a queued item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Inserted into the server pool; carries the new pool length
    Queued(usize),
    /// Already pooled or recently served; carries the unchanged pool length
    Duplicate(usize),
    /// Staged into the local pool for a later drain; carries its length
    Staged(usize),
    /// Forwarded to the server; carries the remaining local-pool length
    Forwarded(usize),
    /// A retry timer was scheduled for a disconnected client
    Retrying,
}

struct PoolCore {
    pool: VecDeque<String>,
    recent: VecDeque<String>,
    local: VecDeque<String>,
    stats: StatsCore,
}

pub struct PoolEngine {
    core: Mutex<PoolCore>,
    config: Arc<RwLock<NodeConfig>>,
    lifecycle: Arc<Lifecycle>,
    hub: NotificationHub,
}

impl PoolEngine {
    pub fn new(
        config: Arc<RwLock<NodeConfig>>,
        lifecycle: Arc<Lifecycle>,
        hub: NotificationHub,
    ) -> Self {
        Self {
            core: Mutex::new(PoolCore {
                pool: VecDeque::new(),
                recent: VecDeque::new(),
                local: VecDeque::new(),
                stats: StatsCore::default(),
            }),
            config,
            lifecycle,
            hub,
        }
    }

    pub fn role(&self) -> Role {
        self.lifecycle.role()
    }

    /// Whether the item is pooled or was served within the dedup horizon.
    pub fn exists(&self, item: &str) -> bool {
        let core = self.core.lock().unwrap();
        core.pool.iter().any(|i| i == item) || core.recent.iter().any(|i| i == item)
    }

    /// Server-side insert with deduplication. Front insert when prioritized.
    pub fn insert(&self, item: String, prioritize: bool) -> QueueOutcome {
        let mut core = self.core.lock().unwrap();
        let duplicate =
            core.pool.iter().any(|i| i == &item) || core.recent.iter().any(|i| i == &item);
        if duplicate {
            return QueueOutcome::Duplicate(core.pool.len());
        }
        if prioritize {
            core.pool.push_front(item);
        } else {
            core.pool.push_back(item);
        }
        QueueOutcome::Queued(core.pool.len())
    }

    /// Next item in FIFO order, optionally preserving it on the pool.
    ///
    /// Dequeued items move into the recent history, which evicts its oldest
    /// `RECENT_EVICT_BATCH` entries in one step when it overflows. An `empty`
    /// event fires when the pool drains to the configured minimum, and also
    /// on a fruitless call while active and alive.
    pub fn next(&self, preserve: bool) -> Option<String> {
        let (recent_max, pool_min) = {
            let config = self.config.read().unwrap();
            (config.recent_pool_max_size, config.pool_min_size)
        };
        let mut core = self.core.lock().unwrap();

        if self.lifecycle.is_active() && !core.pool.is_empty() {
            if preserve {
                return core.pool.front().cloned();
            }
            let item = core.pool.pop_front()?;
            core.recent.push_back(item.clone());
            if core.recent.len() > recent_max {
                let evict = core.recent.len().min(RECENT_EVICT_BATCH);
                core.recent.drain(..evict);
            }
            if core.pool.len() == pool_min {
                self.hub.publish(NodeEvent::empty());
            }
            core.stats.items_served += 1;
            Some(item)
        } else {
            if self.lifecycle.is_active()
                && self.lifecycle.is_alive()
                && core.pool.len() <= pool_min
            {
                self.hub.publish(NodeEvent::empty());
            }
            None
        }
    }

    /// Stage an item in the local pool; front when prioritized.
    pub fn stage_local(&self, item: String, front: bool) -> usize {
        let mut core = self.core.lock().unwrap();
        if front {
            core.local.push_front(item);
        } else {
            core.local.push_back(item);
        }
        core.local.len()
    }

    /// Pop the most recently staged item (the priority fast path).
    pub fn pop_local_back(&self) -> Option<String> {
        self.core.lock().unwrap().local.pop_back()
    }

    /// Take the whole local pool in FIFO order.
    pub fn drain_local(&self) -> Vec<String> {
        self.core.lock().unwrap().local.drain(..).collect()
    }

    /// Remove the last `num_items` (default: all) from the tail of the
    /// resident pool: server pool under server role, local pool otherwise.
    /// These are the most recent arrivals; shedding them preserves FIFO
    /// fairness for items already near the front.
    pub fn shed_tail(&self, num_items: Option<usize>) -> Vec<String> {
        let mut core = self.core.lock().unwrap();
        let source = if self.lifecycle.role() == Role::Server {
            &mut core.pool
        } else {
            &mut core.local
        };
        let keep = source.len().saturating_sub(num_items.unwrap_or(source.len()));
        source.split_off(keep).into()
    }

    pub fn pool_len(&self) -> usize {
        self.core.lock().unwrap().pool.len()
    }

    pub fn recent_len(&self) -> usize {
        self.core.lock().unwrap().recent.len()
    }

    pub fn local_len(&self) -> usize {
        self.core.lock().unwrap().local.len()
    }

    pub fn record_idle(&self) {
        self.core.lock().unwrap().stats.idle += 1;
    }

    pub fn record_processed(&self) {
        self.core.lock().unwrap().stats.items_processed += 1;
    }

    /// Count of in-flight retry timers.
    pub fn retry_pending(&self) -> usize {
        self.core.lock().unwrap().stats.retry_queuing
    }

    pub fn retry_started(&self) {
        self.core.lock().unwrap().stats.retry_queuing += 1;
    }

    pub fn retry_finished(&self) {
        let mut core = self.core.lock().unwrap();
        core.stats.retry_queuing = core.stats.retry_queuing.saturating_sub(1);
    }

    pub fn stats(&self, sid: &str) -> NodeStats {
        let id = self.config.read().unwrap().id.clone();
        let core = self.core.lock().unwrap();
        NodeStats {
            sid: sid.to_string(),
            id,
            role: self.lifecycle.role().to_string(),
            items_served: core.stats.items_served,
            items_processed: core.stats.items_processed,
            pool_size: core.pool.len(),
            idle: core.stats.idle,
            retry_queuing: core.stats.retry_queuing,
            local_pool_size: core.local.len(),
        }
    }
}
