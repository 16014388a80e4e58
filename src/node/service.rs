//! The node itself
//!
//! A `Node` is cheap to clone and fully thread-safe; every handle shares the
//! same pool engine, lifecycle flags and transport. Construct it inside a
//! Tokio runtime; the stability maintainer and all timers are spawned
//! against the ambient runtime.
//!
//! `queue()`, `next()` and `run()` never fail the caller: transport and
//! persistence trouble is logged and absorbed, and the node keeps staging
//! work locally until the mesh heals.

use crate::core::config::NodeConfig;
use crate::core::sched::Scheduler;
use crate::core::shutdown::{self, ShutdownCoordinator};
use crate::node::command::Command;
use crate::node::role::{Lifecycle, Role};
use crate::notifications::{NodeEvent, NotificationHub};
use crate::pool::persist::{self, RestoreOptions, SaveOptions};
use crate::pool::stability;
use crate::pool::{NodeStats, PersistResult, PoolEngine, QueueOutcome};
use crate::transport::{
    ClientEvent, Frame, ServerEvent, TransportClient, TransportResult, TransportServer,
};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Delay before a staged retry replays a queue call that found no connection.
const QUEUE_RETRY_DELAY: Duration = Duration::from_millis(5000);
/// Grace period between a terminate flush and the forced process exit.
const KILL_DELAY: Duration = Duration::from_millis(1000);

#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    sid: String,
    config: Arc<RwLock<NodeConfig>>,
    lifecycle: Arc<Lifecycle>,
    engine: PoolEngine,
    hub: NotificationHub,
    shutdown: ShutdownCoordinator,
    scheduler: Scheduler,
    server: Mutex<Option<TransportServer>>,
    client: Mutex<Option<TransportClient>>,
}

impl Node {
    /// Build a node with the given configuration. `sid` defaults to a random
    /// session id; it cannot change afterwards.
    pub fn new(config: NodeConfig, sid: Option<String>) -> Self {
        let sid = sid.unwrap_or_else(random_sid);
        let config = Arc::new(RwLock::new(config));
        let lifecycle = Arc::new(Lifecycle::new());
        let hub = NotificationHub::new();
        let shutdown = ShutdownCoordinator::new();
        let scheduler = Scheduler::new(shutdown.sender());
        let engine = PoolEngine::new(config.clone(), lifecycle.clone(), hub.clone());

        let node = Self {
            inner: Arc::new(NodeInner {
                sid,
                config,
                lifecycle,
                engine,
                hub,
                shutdown,
                scheduler,
                server: Mutex::new(None),
                client: Mutex::new(None),
            }),
        };
        node.spawn_stability();
        node
    }

    pub fn sid(&self) -> &str {
        &self.inner.sid
    }

    pub fn role(&self) -> Role {
        self.inner.lifecycle.role()
    }

    pub fn is_active(&self) -> bool {
        self.inner.lifecycle.is_active()
    }

    pub fn set_active(&self, value: bool) {
        self.inner.lifecycle.set_active(value);
    }

    pub fn is_alive(&self) -> bool {
        self.inner.lifecycle.is_alive()
    }

    pub fn set_alive(&self, value: bool) {
        self.inner.lifecycle.set_alive(value);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lifecycle.is_connected()
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> NodeConfig {
        self.inner.config.read().unwrap().clone()
    }

    /// Overlay a JSON object onto the configuration (later values win).
    pub fn configure(&self, value: &serde_json::Value) {
        self.inner.config.write().unwrap().apply_value(value);
    }

    pub fn stats(&self) -> NodeStats {
        self.inner.engine.stats(&self.inner.sid)
    }

    /// Register for `empty`/`process` events.
    pub fn subscribe(&self, subscriber_id: impl Into<String>) -> UnboundedReceiver<NodeEvent> {
        self.inner.hub.subscribe(subscriber_id)
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.inner.shutdown.subscribe()
    }

    /// Whether this item is already pooled or was served recently.
    pub fn exists(&self, item: &str) -> bool {
        self.inner.engine.exists(item)
    }

    /// Submit a work item.
    ///
    /// A server inserts into its own pool (duplicates are silently dropped).
    /// A connected client stages and immediately forwards. A disconnected
    /// client (a roleless node is promoted by this call) applies
    /// backpressure: priority items go straight to the local pool, normal
    /// items retry after a delay until the concurrent-retry budget is spent,
    /// then overflow into the local pool.
    pub fn queue(&self, item: impl Into<String>, prioritize: bool) -> QueueOutcome {
        let item = item.into();
        if self.role() == Role::None {
            self.promote_to_client();
        }
        match self.role() {
            Role::Server => self.inner.engine.insert(item, prioritize),
            _ => self.queue_via_client(item, prioritize),
        }
    }

    fn queue_via_client(&self, item: String, prioritize: bool) -> QueueOutcome {
        let engine = &self.inner.engine;

        if self.is_connected() {
            let staged_len = engine.stage_local(item, prioritize);
            let client = self.inner.client.lock().unwrap().clone();
            let Some(client) = client else {
                return QueueOutcome::Staged(staged_len);
            };
            if prioritize && staged_len == 1 {
                if let Some(staged) = engine.pop_local_back() {
                    if let Err(e) = client.emit(Frame::PriorityItem(staged)) {
                        log::warn!("Priority forward failed: {}", e);
                    }
                }
            } else {
                for staged in engine.drain_local() {
                    if let Err(e) = client.emit(Frame::Item(staged)) {
                        log::warn!("Forward failed: {}", e);
                    }
                }
            }
            return QueueOutcome::Forwarded(engine.local_len());
        }

        if prioritize {
            // Delivered once a connection and drain occur; no retry churn
            return QueueOutcome::Staged(engine.stage_local(item, false));
        }

        let queue_stack_size = self.inner.config.read().unwrap().queue_stack_size;
        if engine.retry_pending() >= queue_stack_size {
            // Overflow valve: too many timers in flight already
            QueueOutcome::Staged(engine.stage_local(item, false))
        } else {
            engine.retry_started();
            let weak = Arc::downgrade(&self.inner);
            self.inner.scheduler.schedule(QUEUE_RETRY_DELAY, async move {
                if let Some(inner) = weak.upgrade() {
                    let node = Node { inner };
                    node.queue(item, false);
                    node.inner.engine.retry_finished();
                }
            });
            QueueOutcome::Retrying
        }
    }

    /// Next pooled item in FIFO order; `preserve` peeks without removing.
    pub fn next(&self, preserve: bool) -> Option<String> {
        self.inner.engine.next(preserve)
    }

    /// Dequeue one item and publish it as a `process` event for an external
    /// consumer; an empty draw counts as idle. With a nonzero `runInterval`
    /// the call reschedules itself; with zero the caller drives the loop and
    /// owns overlap avoidance.
    pub fn run(&self) {
        match self.inner.engine.next(false) {
            Some(item) => {
                self.inner.engine.record_processed();
                self.inner.hub.publish(NodeEvent::process(item));
            }
            None => self.inner.engine.record_idle(),
        }

        let interval = self.inner.config.read().unwrap().run_interval;
        if interval > 0 {
            let weak = Arc::downgrade(&self.inner);
            self.inner
                .scheduler
                .schedule(Duration::from_millis(interval), async move {
                    if let Some(inner) = weak.upgrade() {
                        Node { inner }.run();
                    }
                });
        }
    }

    /// Become the authoritative server: bind the endpoint and start
    /// accepting peers. Refused (warn, no-op) once the node is a client.
    pub async fn serve(&self) -> TransportResult<()> {
        match self.inner.lifecycle.try_set_role(Role::Server) {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(current) => {
                log::warn!("Cannot serve from a {} node", current);
                return Ok(());
            }
        }

        let (endpoint, id, silent) = {
            let config = self.inner.config.read().unwrap();
            (config.endpoint(), config.id.clone(), config.silent)
        };
        log::info!("Initializing {} server on {}", id, endpoint);

        let (server, events) =
            TransportServer::bind(endpoint, self.inner.shutdown.sender(), silent).await?;
        *self.inner.server.lock().unwrap() = Some(server);
        self.spawn_server_dispatch(events);
        Ok(())
    }

    /// Become a client of the mesh: start the supervised connect loop.
    /// Guarded: repeat calls are no-ops, and a server stays a server.
    pub fn promote_to_client(&self) {
        match self.inner.lifecycle.try_set_role(Role::Client) {
            Ok(true) => self.start_client(),
            Ok(false) => {}
            Err(current) => log::warn!("Cannot promote a {} node to client", current),
        }
    }

    fn start_client(&self) {
        let (endpoint, retry, silent) = {
            let config = self.inner.config.read().unwrap();
            (
                config.endpoint(),
                Duration::from_millis(config.retry),
                config.silent,
            )
        };
        let (client, events) =
            TransportClient::spawn(endpoint, retry, self.inner.shutdown.sender(), silent);
        *self.inner.client.lock().unwrap() = Some(client);
        self.spawn_client_dispatch(events);
    }

    /// Send a command to the server hub for execution and relay.
    pub fn exec(&self, command: Command) {
        let client = self.inner.client.lock().unwrap().clone();
        match client {
            Some(client) => {
                if let Err(e) = client.emit(Frame::Command(command)) {
                    log::warn!("Failed to send command: {}", e);
                }
            }
            None => log::warn!("exec requires the client role"),
        }
    }

    /// Execute a command locally. Returns the value the server hub should
    /// re-broadcast, if any.
    ///
    /// Commands scoped to a different session id, and commands with an empty
    /// or unknown name, do nothing.
    pub fn run_command(&self, command: &Command) -> Option<Command> {
        if command.name.is_empty() {
            return None;
        }
        if let Some(sid) = &command.sid {
            if sid != &self.inner.sid {
                return None;
            }
        }

        match command.name.as_str() {
            "pause" => {
                self.set_active(false);
                None
            }
            "resume" => {
                self.set_active(true);
                None
            }
            "alive" | "start" | "stop" => {
                let value = match command.name.as_str() {
                    "stop" => false,
                    "start" => true,
                    _ => command
                        .value
                        .as_ref()
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                };
                self.set_alive(value);
                Some(Command::with_value(
                    "alive",
                    serde_json::Value::Bool(self.is_alive()),
                ))
            }
            "terminate" | "kill" => {
                self.terminate(true, false);
                Some(Command::with_value("alive", serde_json::Value::Bool(false)))
            }
            "config" => {
                if let Some(value) = &command.value {
                    self.configure(value);
                }
                None
            }
            "spread" | "relay" => match &command.value {
                Some(value) => match serde_json::from_value::<Command>(value.clone()) {
                    Ok(relayed) => Some(relayed),
                    Err(e) => {
                        log::warn!("Relay payload is not a command: {}", e);
                        None
                    }
                },
                None => None,
            },
            "log" => {
                if let Some(value) = &command.value {
                    log::info!("{}", value);
                }
                None
            }
            other => {
                log::debug!("Ignoring unknown command '{}'", other);
                None
            }
        }
    }

    /// Shed pool items to disk. See [`SaveOptions`].
    pub async fn save(&self, opts: SaveOptions) -> PersistResult<usize> {
        persist::save(&self.inner.engine, &self.config(), opts).await
    }

    /// Pull previously shed items back into the pool. Server-only.
    pub async fn restore(&self, opts: RestoreOptions) -> PersistResult<usize> {
        persist::restore(&self.inner.engine, &self.config(), opts).await
    }

    /// Stop the node: drop `alive` and `active`, cancel every pending timer,
    /// flush the resident pool to disk, and when `kill_process` schedule
    /// a process exit once the flush has landed.
    ///
    /// Returns the flush task when the flush runs asynchronously, so callers
    /// that are about to leave the runtime can await durability.
    pub fn terminate(&self, kill_process: bool, write_sync: bool) -> Option<JoinHandle<()>> {
        self.set_alive(false);
        self.set_active(false);
        self.inner.shutdown.trigger_shutdown();

        if write_sync {
            let opts = SaveOptions {
                sync: true,
                ..Default::default()
            };
            if let Err(e) = persist::save_blocking(&self.inner.engine, &self.config(), opts) {
                log::error!("Shutdown flush failed: {}", e);
            }
            if kill_process {
                schedule_exit();
            }
            None
        } else {
            let weak = Arc::downgrade(&self.inner);
            Some(tokio::spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    let config = inner.config.read().unwrap().clone();
                    if let Err(e) =
                        persist::save(&inner.engine, &config, SaveOptions::default()).await
                    {
                        log::error!("Shutdown flush failed: {}", e);
                    }
                }
                if kill_process {
                    schedule_exit();
                }
            }))
        }
    }

    /// Wire process signals and the panic hook to the forced-terminate path.
    pub fn install_exit_hooks(&self) {
        let node = self.clone();
        shutdown::setup_signal_handlers(move || {
            log::info!("Signal received, terminating");
            node.terminate(true, true);
        });

        let node = self.clone();
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            log::error!("Uncaught panic: {}", info);
            node.terminate(true, true);
            default_hook(info);
        }));
    }

    fn spawn_stability(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .scheduler
            .every(stability::STABILITY_INTERVAL, move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        let config = inner.config.read().unwrap().clone();
                        stability::sustain_stability(&inner.engine, &config).await;
                    }
                }
            });
    }

    fn spawn_server_dispatch(&self, mut events: UnboundedReceiver<ServerEvent>) {
        let weak = Arc::downgrade(&self.inner);
        let mut shutdown_rx = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        let Some(inner) = weak.upgrade() else { break };
                        let node = Node { inner };
                        node.handle_server_event(event);
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::Frame {
                frame: Frame::Item(item),
                ..
            } => {
                self.queue(item, false);
            }
            ServerEvent::Frame {
                frame: Frame::PriorityItem(item),
                ..
            } => {
                self.queue(item, true);
            }
            ServerEvent::Frame {
                frame: Frame::Command(command),
                ..
            } => {
                if let Some(spread) = self.run_command(&command) {
                    let server = self.inner.server.lock().unwrap();
                    if let Some(server) = server.as_ref() {
                        server.broadcast(&Frame::Command(spread));
                    }
                }
            }
            ServerEvent::PeerConnected(_) | ServerEvent::PeerDisconnected(_) => {}
        }
    }

    fn spawn_client_dispatch(&self, mut events: UnboundedReceiver<ClientEvent>) {
        let weak = Arc::downgrade(&self.inner);
        let mut shutdown_rx = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        let Some(inner) = weak.upgrade() else { break };
                        let node = Node { inner };
                        match event {
                            ClientEvent::Connected => node.inner.lifecycle.set_connected(true),
                            ClientEvent::Disconnected => node.inner.lifecycle.set_connected(false),
                            ClientEvent::Frame(Frame::Command(command)) => {
                                node.run_command(&command);
                            }
                            ClientEvent::Frame(other) => {
                                log::debug!("Ignoring {:?} frame on client", other)
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }
}

fn random_sid() -> String {
    let full = uuid::Uuid::new_v4().simple().to_string();
    full[..8].to_string()
}

fn schedule_exit() {
    // The panic hook may land here with no runtime on the current thread
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async {
                tokio::time::sleep(KILL_DELAY).await;
                std::process::exit(0);
            });
        }
        Err(_) => {
            std::thread::spawn(|| {
                std::thread::sleep(KILL_DELAY);
                std::process::exit(0);
            });
        }
    }
}
