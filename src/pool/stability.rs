//! Stability maintainer
//!
//! A fixed high/low-watermark policy bounding memory residency. Every tick
//! the resident size is compared against `MAX_POOL_SIZE`: overflow spills the
//! excess down to the half mark; a server draining below the quarter mark
//! refills up to half from disk. A roleless node counts as half-full so
//! neither branch fires.

use crate::core::config::NodeConfig;
use crate::node::role::Role;
use crate::pool::engine::PoolEngine;
use crate::pool::persist::{self, RestoreOptions, SaveOptions};
use std::time::Duration;

pub const MAX_POOL_SIZE: usize = 2000;
pub const STABILITY_INTERVAL: Duration = Duration::from_secs(60);

/// One watermark check. Runs on the maintainer tick, independent of `run()`.
pub async fn sustain_stability(engine: &PoolEngine, config: &NodeConfig) {
    let half = MAX_POOL_SIZE.div_ceil(2);
    let quarter = MAX_POOL_SIZE.div_ceil(4);

    let resident = match engine.role() {
        Role::Server => engine.pool_len(),
        Role::Client => engine.local_len(),
        Role::None => MAX_POOL_SIZE / 2,
    };

    if resident >= MAX_POOL_SIZE {
        let opts = SaveOptions {
            num_items: Some(resident - half),
            ..Default::default()
        };
        match persist::save(engine, config, opts).await {
            Ok(n) => log::debug!("Spilled {} items to disk", n),
            Err(e) => log::error!("Spillover save failed: {}", e),
        }
    } else if engine.role() == Role::Server && resident <= quarter {
        let opts = RestoreOptions {
            num_items: half,
            ..Default::default()
        };
        match persist::restore(engine, config, opts).await {
            Ok(0) => {}
            Ok(n) => log::debug!("Restored {} items from disk", n),
            Err(e) => log::error!("Spillover restore failed: {}", e),
        }
    }
}
