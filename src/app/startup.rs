//! Process startup and role entrypoints

use crate::app::cli::{config as cli_config, Args, NodeCommand};
use crate::core::config::{ConfigPatch, NodeConfig};
use crate::core::logging::init_logging;
use crate::node::{Command, Node};
use crate::notifications::NodeEventType;
use clap::Parser;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// How long a one-shot client waits for the server before giving up and
/// staging locally.
const CONNECT_WAIT: Duration = Duration::from_secs(5);
/// Grace period letting the transport writer drain before a one-shot exits.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

pub fn startup() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_level.as_deref(), args.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = runtime.block_on(run(args));
    std::process::exit(code);
}

async fn run(args: Args) -> i32 {
    let mut config = NodeConfig::default();
    if let Some(patch) = cli_config::load_config_file(args.config_file.clone()).await {
        config.apply(patch);
    }
    if let Some(id) = args.id.clone() {
        config.apply(ConfigPatch {
            id: Some(id),
            ..Default::default()
        });
    }

    log::info!("workmesh {} ({})", crate::VERSION, crate::BUILD_DATE);

    match args.command {
        NodeCommand::Serve { run_interval } => {
            if let Some(ms) = run_interval {
                config.run_interval = ms;
            }
            serve(config, args.sid).await
        }
        NodeCommand::Queue { items, priority } => {
            queue_items(config, args.sid, items, priority).await
        }
        NodeCommand::Exec {
            name,
            value,
            target,
        } => exec(config, args.sid, name, value, target).await,
    }
}

async fn serve(config: NodeConfig, sid: Option<String>) -> i32 {
    let node = Node::new(config, sid);
    node.install_exit_hooks();

    if let Err(e) = node.serve().await {
        log::error!("{}", e);
        return 1;
    }
    log::info!("Node {} serving", node.sid());

    let mut events = node.subscribe("cli");
    let mut shutdown_rx = node.subscribe_shutdown();

    if node.config().run_interval > 0 {
        node.run();
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => match event.event_type {
                    NodeEventType::Process => {
                        log::info!("process {}", event.item.unwrap_or_default())
                    }
                    NodeEventType::Empty => log::debug!("pool empty"),
                },
                None => break,
            },
            _ = shutdown_rx.recv() => break,
        }
    }

    // Signal-triggered termination already flushed synchronously; a second
    // terminate sheds nothing and is harmless.
    if let Some(flush) = node.terminate(false, false) {
        let _ = flush.await;
    }
    0
}

async fn queue_items(
    config: NodeConfig,
    sid: Option<String>,
    items: Vec<String>,
    priority: bool,
) -> i32 {
    let node = Node::new(config, sid);
    node.promote_to_client();
    wait_for_connection(&node).await;

    for item in items {
        let outcome = node.queue(item.clone(), priority);
        log::info!("queue {:?} -> {:?}", item, outcome);
    }

    sleep(DRAIN_GRACE).await;
    if let Some(flush) = node.terminate(false, false) {
        let _ = flush.await;
    }
    0
}

async fn exec(
    config: NodeConfig,
    sid: Option<String>,
    name: String,
    value: Option<String>,
    target: Option<String>,
) -> i32 {
    let node = Node::new(config, sid);
    node.promote_to_client();
    wait_for_connection(&node).await;
    if !node.is_connected() {
        log::error!("No server reachable; command not sent");
        return 1;
    }

    let value = value.map(|raw| {
        serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
    });
    let mut command = Command::named(name);
    command.value = value;
    command.sid = target;
    node.exec(command);

    sleep(DRAIN_GRACE).await;
    node.terminate(false, false);
    0
}

async fn wait_for_connection(node: &Node) {
    let deadline = Instant::now() + CONNECT_WAIT;
    while !node.is_connected() && Instant::now() < deadline {
        sleep(Duration::from_millis(50)).await;
    }
    if !node.is_connected() {
        log::warn!("No server reachable; items will stage locally");
    }
}
