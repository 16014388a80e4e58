//! End-to-end mesh scenarios: one server hub, multiple clients, command relay

mod common;

use common::{mesh_config, wait_until};
use serde_json::json;
use serial_test::serial;
use workmesh::node::{Command, Node};
use workmesh::pool::QueueOutcome;

#[tokio::test]
#[serial]
async fn test_client_forwards_items_to_server() {
    let dir = tempfile::tempdir().unwrap();
    let config = mesh_config(&dir, "mesh-forward");

    let server = Node::new(config.clone(), None);
    server.serve().await.unwrap();

    let client = Node::new(config, None);
    client.promote_to_client();
    wait_until(|| client.is_connected(), "client connect").await;

    assert_eq!(client.queue("job-1", false), QueueOutcome::Forwarded(0));

    wait_until(|| server.stats().pool_size == 1, "item arrival").await;
    assert_eq!(server.next(false), Some("job-1".to_string()));
}

#[tokio::test]
#[serial]
async fn test_priority_items_jump_the_pool() {
    let dir = tempfile::tempdir().unwrap();
    let config = mesh_config(&dir, "mesh-priority");

    let server = Node::new(config.clone(), None);
    server.serve().await.unwrap();

    let client = Node::new(config, None);
    client.promote_to_client();
    wait_until(|| client.is_connected(), "client connect").await;

    client.queue("steady-1", false);
    client.queue("steady-2", false);
    wait_until(|| server.stats().pool_size == 2, "steady items").await;

    client.queue("urgent", true);
    wait_until(|| server.stats().pool_size == 3, "priority item").await;

    assert_eq!(server.next(false), Some("urgent".to_string()));
    assert_eq!(server.next(false), Some("steady-1".to_string()));
}

#[tokio::test]
#[serial]
async fn test_stop_command_spreads_mesh_wide() {
    let dir = tempfile::tempdir().unwrap();
    let config = mesh_config(&dir, "mesh-stop");

    let server = Node::new(config.clone(), None);
    server.serve().await.unwrap();

    let sender = Node::new(config.clone(), None);
    sender.promote_to_client();
    let bystander = Node::new(config, None);
    bystander.promote_to_client();
    wait_until(
        || sender.is_connected() && bystander.is_connected(),
        "clients connect",
    )
    .await;

    sender.exec(Command::named("stop"));

    // The hub executes locally and relays liveness to every peer
    wait_until(|| !server.is_alive(), "server stops").await;
    wait_until(
        || !sender.is_alive() && !bystander.is_alive(),
        "clients stop",
    )
    .await;
}

#[tokio::test]
#[serial]
async fn test_relay_command_passes_through_the_hub() {
    let dir = tempfile::tempdir().unwrap();
    let config = mesh_config(&dir, "mesh-relay");

    let server = Node::new(config.clone(), None);
    server.serve().await.unwrap();

    let sender = Node::new(config.clone(), None);
    sender.promote_to_client();
    let bystander = Node::new(config, None);
    bystander.promote_to_client();
    wait_until(
        || sender.is_connected() && bystander.is_connected(),
        "clients connect",
    )
    .await;

    sender.exec(Command::with_value("spread", json!({"name": "pause"})));

    wait_until(
        || !sender.is_active() && !bystander.is_active(),
        "clients pause",
    )
    .await;
    // Relaying is not executing: the hub itself stays active
    assert!(server.is_active());
}

#[tokio::test]
#[serial]
async fn test_scoped_command_skips_other_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let config = mesh_config(&dir, "mesh-scope");

    let server = Node::new(config.clone(), None);
    server.serve().await.unwrap();

    let client = Node::new(config, None);
    client.promote_to_client();
    wait_until(|| client.is_connected(), "client connect").await;

    // Scoped to a session nobody holds, then an unscoped marker behind it
    client.exec(Command::named("pause").scoped("no-such-session"));
    client.exec(Command::named("stop"));

    // Frames are processed in order: once the marker landed, the scoped
    // command has definitely been seen, and ignored.
    wait_until(|| !server.is_alive(), "marker command").await;
    assert!(server.is_active(), "scoped pause must not execute");
}

#[tokio::test]
#[serial]
async fn test_config_command_reconfigures_the_hub() {
    let dir = tempfile::tempdir().unwrap();
    let config = mesh_config(&dir, "mesh-config");

    let server = Node::new(config.clone(), None);
    server.serve().await.unwrap();

    let client = Node::new(config, None);
    client.promote_to_client();
    wait_until(|| client.is_connected(), "client connect").await;

    client.exec(Command::with_value("config", json!({"poolMinSize": 3})));

    wait_until(|| server.config().pool_min_size == 3, "config overlay").await;
    // Unrelated options keep their values
    assert_eq!(server.config().queue_stack_size, 42);
}

#[tokio::test]
#[serial]
async fn test_disconnected_client_falls_back_to_backpressure() {
    let dir = tempfile::tempdir().unwrap();
    let config = mesh_config(&dir, "mesh-drop");

    let server = Node::new(config.clone(), None);
    server.serve().await.unwrap();

    let client = Node::new(config, None);
    client.promote_to_client();
    wait_until(|| client.is_connected(), "client connect").await;

    // Hub goes away; the client notices and keeps queueing locally
    server.terminate(false, true);
    wait_until(|| !client.is_connected(), "client disconnect").await;

    assert_eq!(client.queue("held-back", false), QueueOutcome::Retrying);
    assert_eq!(client.stats().retry_queuing, 1);
}
