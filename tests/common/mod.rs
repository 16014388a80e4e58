//! Shared helpers for integration tests
#![allow(dead_code)]

use std::time::Duration;
use tokio::time::{sleep, Instant};
use workmesh::core::config::NodeConfig;

/// Config bound to a throwaway directory: unique socket path, fast reconnect
/// and persistence rooted in the tempdir.
pub fn mesh_config(dir: &tempfile::TempDir, id: &str) -> NodeConfig {
    NodeConfig {
        id: id.to_string(),
        socket_root: format!("{}/", dir.path().display()),
        path: dir.path().to_path_buf(),
        retry: 50,
        ..Default::default()
    }
}

/// Poll until `cond` holds, panicking after five seconds.
pub async fn wait_until<F>(mut cond: F, what: &str)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}
