//! Disk spillover: save and restore
//!
//! The persistence format is newline-delimited text, one item per line, no
//! embedded newlines, default filename `<id>.pool` under the configured
//! persistence directory.
//!
//! `save` sheds the newest arrivals off the pool tail; `restore` re-queues
//! them at the tail. A shed subset therefore re-enters behind items that
//! arrived after it was shed. Documented behavior consumers rely on, not a
//! bug to fix.

use crate::core::config::NodeConfig;
use crate::node::role::Role;
use crate::pool::engine::PoolEngine;
use crate::pool::error::{PersistError, PersistResult};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Options for [`save`]; every field has a sensible default.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Target filename, default `<id>.pool`
    pub filename: Option<String>,
    /// Target directory, default the configured persistence path
    pub path: Option<PathBuf>,
    /// How many tail items to shed, default all
    pub num_items: Option<usize>,
    /// Block on the write (shutdown flushes) instead of async I/O
    pub sync: bool,
}

/// Options for [`restore`].
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub filename: Option<String>,
    pub path: Option<PathBuf>,
    /// How many lines to consume back into the pool
    pub num_items: usize,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            filename: None,
            path: None,
            num_items: 250,
        }
    }
}

fn target_path(config: &NodeConfig, filename: Option<&str>, dir: Option<&Path>) -> PathBuf {
    let dir = dir.unwrap_or(&config.path);
    let filename = filename
        .map(str::to_string)
        .unwrap_or_else(|| config.pool_filename());
    dir.join(filename)
}

/// Shed tail items to disk.
///
/// Splices the last `num_items` (default all) off the resident pool, joins
/// them newline-delimited and appends to the target file. Nothing to shed
/// means no file touch. Returns the number of items written.
pub async fn save(
    engine: &PoolEngine,
    config: &NodeConfig,
    opts: SaveOptions,
) -> PersistResult<usize> {
    let items = engine.shed_tail(opts.num_items);
    if items.is_empty() {
        return Ok(0);
    }
    let target = target_path(config, opts.filename.as_deref(), opts.path.as_deref());
    let data = join_lines(&items);
    if opts.sync {
        append_sync(&target, &data)?;
    } else {
        append(&target, &data).await?;
    }
    Ok(items.len())
}

/// Synchronous [`save`], for shutdown paths that must not yield.
pub fn save_blocking(
    engine: &PoolEngine,
    config: &NodeConfig,
    opts: SaveOptions,
) -> PersistResult<usize> {
    let items = engine.shed_tail(opts.num_items);
    if items.is_empty() {
        return Ok(0);
    }
    let target = target_path(config, opts.filename.as_deref(), opts.path.as_deref());
    append_sync(&target, &join_lines(&items))?;
    Ok(items.len())
}

/// Pull items from disk back into the pool. Server-only.
///
/// Consumes the first `num_items` non-empty lines through the dedup insert
/// path and rewrites the remainder back, truncating what was consumed.
/// A non-server caller or a missing file is a warned no-op.
pub async fn restore(
    engine: &PoolEngine,
    config: &NodeConfig,
    opts: RestoreOptions,
) -> PersistResult<usize> {
    if engine.role() != Role::Server {
        log::warn!("Only servers can restore items from disk");
        return Ok(0);
    }
    let target = target_path(config, opts.filename.as_deref(), opts.path.as_deref());
    if !target.exists() {
        log::warn!("Pool file {} does not exist, nothing to restore", target.display());
        return Ok(0);
    }

    let contents = tokio::fs::read_to_string(&target)
        .await
        .map_err(|e| PersistError::io(&target, e))?;

    let mut consumed = 0;
    let mut remaining = String::new();
    for line in contents.lines() {
        if line.is_empty() {
            continue;
        }
        if consumed < opts.num_items {
            engine.insert(line.to_string(), false);
            consumed += 1;
        } else {
            remaining.push_str(line);
            remaining.push('\n');
        }
    }

    tokio::fs::write(&target, remaining)
        .await
        .map_err(|e| PersistError::io(&target, e))?;

    Ok(consumed)
}

fn join_lines(items: &[String]) -> String {
    let mut data = items.join("\n");
    data.push('\n');
    data
}

async fn append(path: &Path, text: &str) -> PersistResult<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| PersistError::io(path, e))?;
    file.write_all(text.as_bytes())
        .await
        .map_err(|e| PersistError::io(path, e))?;
    file.flush().await.map_err(|e| PersistError::io(path, e))?;
    Ok(())
}

fn append_sync(path: &Path, text: &str) -> PersistResult<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PersistError::io(path, e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| PersistError::io(path, e))?;
    Ok(())
}
