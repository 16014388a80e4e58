//! Node configuration and key-overlay merging
//!
//! Options are merged by key overlay: defaults, then a config file, then
//! caller overrides, then any `config` commands received at runtime, where later
//! values win. `ConfigPatch` is the explicit partial form used everywhere a
//! subset of options arrives (TOML file, `config` command payload).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transport::Endpoint;

/// Complete set of recognized node options.
///
/// Field names serialize in camelCase so the wire and file spellings match
/// the option names peers exchange (`recentPoolMaxSize`, `queueStackSize`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    /// Capacity of the recently-dequeued history used for deduplication.
    pub recent_pool_max_size: usize,
    /// An `empty` event fires whenever the pool drains to this length.
    pub pool_min_size: usize,
    /// Self-rescheduling interval for `run()` in milliseconds; 0 means the
    /// caller drives `run()` explicitly.
    pub run_interval: u64,
    /// Maximum number of concurrently pending queue-retry timers before new
    /// items overflow straight into the local pool.
    pub queue_stack_size: usize,
    /// Channel namespace prefixed to the socket name.
    pub appspace: String,
    /// Shared channel identifier; also names the persistence file.
    pub id: String,
    /// Transport reconnect interval in milliseconds.
    pub retry: u64,
    /// Quiets per-connection transport chatter.
    pub silent: bool,
    pub network_host: String,
    pub network_port: u16,
    /// Directory holding local-socket endpoints.
    pub socket_root: String,
    /// Persistence directory.
    pub path: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            recent_pool_max_size: 250,
            pool_min_size: 0,
            run_interval: 0,
            queue_stack_size: 42,
            appspace: "appspace.".to_string(),
            id: "id".to_string(),
            retry: 5000,
            silent: true,
            network_host: "localhost".to_string(),
            network_port: 8000,
            socket_root: "/tmp/".to_string(),
            path: PathBuf::from("./"),
        }
    }
}

impl NodeConfig {
    /// Apply a partial configuration, replacing only the fields it carries.
    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(v) = patch.recent_pool_max_size {
            self.recent_pool_max_size = v;
        }
        if let Some(v) = patch.pool_min_size {
            self.pool_min_size = v;
        }
        if let Some(v) = patch.run_interval {
            self.run_interval = v;
        }
        if let Some(v) = patch.queue_stack_size {
            self.queue_stack_size = v;
        }
        if let Some(v) = patch.appspace {
            self.appspace = v;
        }
        if let Some(v) = patch.id {
            self.id = v;
        }
        if let Some(v) = patch.retry {
            self.retry = v;
        }
        if let Some(v) = patch.silent {
            self.silent = v;
        }
        if let Some(v) = patch.network_host {
            self.network_host = v;
        }
        if let Some(v) = patch.network_port {
            self.network_port = v;
        }
        if let Some(v) = patch.socket_root {
            self.socket_root = v;
        }
        if let Some(v) = patch.path {
            self.path = v;
        }
    }

    /// Merge a JSON object (the payload of a `config` command) into this
    /// configuration. Unknown or mistyped keys are ignored with a warning.
    pub fn apply_value(&mut self, value: &serde_json::Value) {
        match serde_json::from_value::<ConfigPatch>(value.clone()) {
            Ok(patch) => self.apply(patch),
            Err(e) => log::warn!("Ignoring malformed config payload: {}", e),
        }
    }

    /// Default persistence filename for this node.
    pub fn pool_filename(&self) -> String {
        format!("{}.pool", self.id)
    }

    /// Transport endpoint for this node's channel identifier.
    ///
    /// Local sockets on Unix, TCP elsewhere, mirroring the platform split the
    /// mesh has always used.
    pub fn endpoint(&self) -> Endpoint {
        #[cfg(unix)]
        {
            Endpoint::Unix(PathBuf::from(format!(
                "{}{}{}",
                self.socket_root, self.appspace, self.id
            )))
        }
        #[cfg(not(unix))]
        {
            Endpoint::Tcp(self.network_host.clone(), self.network_port)
        }
    }
}

/// Partial configuration: every recognized option, all optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub recent_pool_max_size: Option<usize>,
    pub pool_min_size: Option<usize>,
    pub run_interval: Option<u64>,
    pub queue_stack_size: Option<usize>,
    pub appspace: Option<String>,
    pub id: Option<String>,
    pub retry: Option<u64>,
    pub silent: Option<bool>,
    pub network_host: Option<String>,
    pub network_port: Option<u16>,
    pub socket_root: Option<String>,
    pub path: Option<PathBuf>,
}
