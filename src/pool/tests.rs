//! Tests for the pool engine, spillover and the stability maintainer

use crate::core::config::NodeConfig;
use crate::node::role::{Lifecycle, Role};
use crate::notifications::{NodeEventType, NotificationHub};
use crate::pool::engine::{PoolEngine, QueueOutcome};
use crate::pool::persist::{self, RestoreOptions, SaveOptions};
use crate::pool::stability;
use std::sync::{Arc, RwLock};

fn test_engine(role: Role, config: NodeConfig) -> (PoolEngine, NotificationHub) {
    let lifecycle = Arc::new(Lifecycle::new());
    if role != Role::None {
        lifecycle.try_set_role(role).unwrap();
    }
    let hub = NotificationHub::new();
    let engine = PoolEngine::new(
        Arc::new(RwLock::new(config)),
        lifecycle,
        hub.clone(),
    );
    (engine, hub)
}

fn server_engine() -> (PoolEngine, NotificationHub) {
    test_engine(Role::Server, NodeConfig::default())
}

mod engine_tests {
    use super::*;

    #[test]
    fn test_dedup_suppresses_resubmission() {
        let (engine, _hub) = server_engine();

        assert_eq!(engine.insert("a".to_string(), false), QueueOutcome::Queued(1));
        assert!(engine.exists("a"));
        assert_eq!(
            engine.insert("a".to_string(), false),
            QueueOutcome::Duplicate(1)
        );
        assert_eq!(engine.pool_len(), 1);
    }

    #[test]
    fn test_dedup_covers_recently_served_items() {
        let (engine, _hub) = server_engine();

        engine.insert("a".to_string(), false);
        assert_eq!(engine.next(false), Some("a".to_string()));

        // Served but still inside the dedup horizon
        assert!(engine.exists("a"));
        assert_eq!(
            engine.insert("a".to_string(), false),
            QueueOutcome::Duplicate(0)
        );
    }

    #[test]
    fn test_fifo_order() {
        let (engine, _hub) = server_engine();

        for item in ["a", "b", "c"] {
            engine.insert(item.to_string(), false);
        }

        assert_eq!(engine.next(false), Some("a".to_string()));
        assert_eq!(engine.next(false), Some("b".to_string()));
        assert_eq!(engine.next(false), Some("c".to_string()));
        assert_eq!(engine.next(false), None);
    }

    #[test]
    fn test_priority_insert_goes_to_front() {
        let (engine, _hub) = server_engine();

        for item in ["a", "b", "c"] {
            engine.insert(item.to_string(), false);
        }
        engine.insert("d".to_string(), true);

        assert_eq!(engine.next(false), Some("d".to_string()));
        assert_eq!(engine.next(false), Some("a".to_string()));
    }

    #[test]
    fn test_preserve_peeks_without_removal() {
        let (engine, _hub) = server_engine();
        engine.insert("a".to_string(), false);

        assert_eq!(engine.next(true), Some("a".to_string()));
        assert_eq!(engine.pool_len(), 1);
        assert_eq!(engine.next(false), Some("a".to_string()));
        assert_eq!(engine.pool_len(), 0);
    }

    #[test]
    fn test_recent_pool_batch_eviction() {
        let (engine, _hub) = server_engine();
        let max = NodeConfig::default().recent_pool_max_size;

        for i in 0..(max + 1) {
            engine.insert(format!("item-{}", i), false);
        }
        for _ in 0..max {
            engine.next(false);
        }
        // At capacity, nothing evicted yet
        assert_eq!(engine.recent_len(), max);

        // One past capacity drops 25 oldest entries in a single step
        engine.next(false);
        assert_eq!(engine.recent_len(), max + 1 - 25);
    }

    #[test]
    fn test_empty_event_on_draining_to_minimum() {
        let (engine, hub) = server_engine();
        let mut events = hub.subscribe("watcher");

        engine.insert("only".to_string(), false);
        engine.next(false);

        let event = events.try_recv().expect("empty event expected");
        assert_eq!(event.event_type, NodeEventType::Empty);
        assert!(events.try_recv().is_err(), "exactly one event expected");
    }

    #[test]
    fn test_empty_event_on_fruitless_draw() {
        let (engine, hub) = server_engine();
        let mut events = hub.subscribe("watcher");

        assert_eq!(engine.next(false), None);

        let event = events.try_recv().expect("empty event expected");
        assert_eq!(event.event_type, NodeEventType::Empty);
    }

    #[test]
    fn test_paused_engine_emits_nothing_and_serves_nothing() {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.try_set_role(Role::Server).unwrap();
        lifecycle.set_active(false);
        let hub = NotificationHub::new();
        let engine = PoolEngine::new(
            Arc::new(RwLock::new(NodeConfig::default())),
            lifecycle,
            hub.clone(),
        );
        let mut events = hub.subscribe("watcher");

        engine.insert("a".to_string(), false);
        assert_eq!(engine.next(false), None);
        assert!(events.try_recv().is_err());
        assert_eq!(engine.pool_len(), 1);
    }

    #[test]
    fn test_local_pool_staging() {
        let (engine, _hub) = test_engine(Role::Client, NodeConfig::default());

        assert_eq!(engine.stage_local("a".to_string(), false), 1);
        assert_eq!(engine.stage_local("b".to_string(), false), 2);
        assert_eq!(engine.stage_local("c".to_string(), true), 3);

        // Priority staging lands at the front
        assert_eq!(engine.drain_local(), vec!["c", "a", "b"]);
        assert_eq!(engine.local_len(), 0);
    }

    #[test]
    fn test_pop_local_back_takes_single_staged_item() {
        let (engine, _hub) = test_engine(Role::Client, NodeConfig::default());

        engine.stage_local("solo".to_string(), true);
        assert_eq!(engine.pop_local_back(), Some("solo".to_string()));
        assert_eq!(engine.pop_local_back(), None);
    }

    #[test]
    fn test_shed_tail_takes_newest_server_items() {
        let (engine, _hub) = server_engine();
        for item in ["a", "b", "c", "d"] {
            engine.insert(item.to_string(), false);
        }

        assert_eq!(engine.shed_tail(Some(2)), vec!["c", "d"]);
        assert_eq!(engine.pool_len(), 2);
        assert_eq!(engine.next(false), Some("a".to_string()));
    }

    #[test]
    fn test_shed_tail_defaults_to_everything() {
        let (engine, _hub) = server_engine();
        for item in ["a", "b"] {
            engine.insert(item.to_string(), false);
        }

        assert_eq!(engine.shed_tail(None), vec!["a", "b"]);
        assert_eq!(engine.pool_len(), 0);
    }

    #[test]
    fn test_shed_tail_uses_local_pool_off_server_role() {
        let (engine, _hub) = test_engine(Role::Client, NodeConfig::default());
        engine.stage_local("x".to_string(), false);
        engine.stage_local("y".to_string(), false);

        assert_eq!(engine.shed_tail(Some(1)), vec!["y"]);
        assert_eq!(engine.local_len(), 1);
    }

    #[test]
    fn test_stats_snapshot() {
        let (engine, _hub) = server_engine();
        engine.insert("a".to_string(), false);
        engine.insert("b".to_string(), false);
        engine.next(false);
        engine.record_processed();
        engine.record_idle();

        let stats = engine.stats("sid-1");
        assert_eq!(stats.sid, "sid-1");
        assert_eq!(stats.role, "server");
        assert_eq!(stats.items_served, 1);
        assert_eq!(stats.items_processed, 1);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.pool_size, 1);
        assert_eq!(stats.local_pool_size, 0);
    }
}

mod persist_tests {
    use super::*;

    fn dir_config(dir: &tempfile::TempDir) -> NodeConfig {
        NodeConfig {
            path: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_save_then_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir_config(&dir);
        let (engine, _hub) = server_engine();
        for i in 0..5 {
            engine.insert(format!("item-{}", i), false);
        }

        let saved = persist::save(&engine, &config, SaveOptions::default())
            .await
            .unwrap();
        assert_eq!(saved, 5);
        assert_eq!(engine.pool_len(), 0);

        let restored = persist::restore(&engine, &config, RestoreOptions::default())
            .await
            .unwrap();
        assert_eq!(restored, 5);
        assert_eq!(engine.pool_len(), 5);
        // Tail order is reproduced
        assert_eq!(engine.next(false), Some("item-0".to_string()));

        // Everything was consumed; the file is left empty
        let contents = std::fs::read_to_string(dir.path().join("id.pool")).unwrap();
        assert!(contents.is_empty());
    }

    #[tokio::test]
    async fn test_restore_truncates_consumed_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir_config(&dir);
        let (engine, _hub) = server_engine();
        for i in 0..6 {
            engine.insert(format!("item-{}", i), false);
        }
        persist::save(&engine, &config, SaveOptions::default())
            .await
            .unwrap();

        let opts = RestoreOptions {
            num_items: 4,
            ..Default::default()
        };
        assert_eq!(persist::restore(&engine, &config, opts).await.unwrap(), 4);
        assert_eq!(engine.pool_len(), 4);

        let contents = std::fs::read_to_string(dir.path().join("id.pool")).unwrap();
        assert_eq!(contents, "item-4\nitem-5\n");
    }

    #[tokio::test]
    async fn test_restore_refused_off_server_role() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir_config(&dir);
        let (engine, _hub) = test_engine(Role::Client, NodeConfig::default());

        let restored = persist::restore(&engine, &config, RestoreOptions::default())
            .await
            .unwrap();
        assert_eq!(restored, 0);
    }

    #[tokio::test]
    async fn test_restore_missing_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir_config(&dir);
        let (engine, _hub) = server_engine();

        let restored = persist::restore(&engine, &config, RestoreOptions::default())
            .await
            .unwrap();
        assert_eq!(restored, 0);
    }

    #[tokio::test]
    async fn test_save_with_nothing_to_shed_touches_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir_config(&dir);
        let (engine, _hub) = server_engine();

        let saved = persist::save(&engine, &config, SaveOptions::default())
            .await
            .unwrap();
        assert_eq!(saved, 0);
        assert!(!dir.path().join("id.pool").exists());
    }

    #[tokio::test]
    async fn test_save_appends_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir_config(&dir);
        let (engine, _hub) = server_engine();

        engine.insert("a".to_string(), false);
        persist::save(&engine, &config, SaveOptions::default())
            .await
            .unwrap();
        engine.insert("b".to_string(), false);
        persist::save(&engine, &config, SaveOptions::default())
            .await
            .unwrap();

        let contents = std::fs::read_to_string(dir.path().join("id.pool")).unwrap();
        assert_eq!(contents, "a\nb\n");
    }

    #[tokio::test]
    async fn test_save_blocking_matches_async_format() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir_config(&dir);
        let (engine, _hub) = server_engine();
        engine.insert("a".to_string(), false);

        let opts = SaveOptions {
            sync: true,
            ..Default::default()
        };
        assert_eq!(persist::save_blocking(&engine, &config, opts).unwrap(), 1);

        let contents = std::fs::read_to_string(dir.path().join("id.pool")).unwrap();
        assert_eq!(contents, "a\n");
    }
}

mod stability_tests {
    use super::*;

    #[tokio::test]
    async fn test_overflow_spills_down_to_half_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let (engine, _hub) = server_engine();
        for i in 0..stability::MAX_POOL_SIZE {
            engine.insert(format!("item-{}", i), false);
        }

        stability::sustain_stability(&engine, &config).await;

        assert_eq!(engine.pool_len(), stability::MAX_POOL_SIZE / 2);
        let contents = std::fs::read_to_string(dir.path().join("id.pool")).unwrap();
        assert_eq!(contents.lines().count(), stability::MAX_POOL_SIZE / 2);
    }

    #[tokio::test]
    async fn test_starved_server_refills_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let (engine, _hub) = server_engine();
        for i in 0..stability::MAX_POOL_SIZE {
            engine.insert(format!("item-{}", i), false);
        }
        stability::sustain_stability(&engine, &config).await;

        // Drain below the quarter watermark
        let _ = engine.shed_tail(Some(600));
        assert_eq!(engine.pool_len(), 400);

        stability::sustain_stability(&engine, &config).await;

        assert_eq!(engine.pool_len(), 400 + stability::MAX_POOL_SIZE / 2);
        let contents = std::fs::read_to_string(dir.path().join("id.pool")).unwrap();
        assert!(contents.is_empty());
    }

    #[tokio::test]
    async fn test_roleless_node_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let (engine, _hub) = test_engine(Role::None, NodeConfig::default());

        stability::sustain_stability(&engine, &config).await;

        assert!(!dir.path().join("id.pool").exists());
    }

    #[tokio::test]
    async fn test_mid_range_pool_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let (engine, _hub) = server_engine();
        for i in 0..1000 {
            engine.insert(format!("item-{}", i), false);
        }

        stability::sustain_stability(&engine, &config).await;

        assert_eq!(engine.pool_len(), 1000);
        assert!(!dir.path().join("id.pool").exists());
    }
}
