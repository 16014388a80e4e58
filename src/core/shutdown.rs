//! Shutdown Coordination
//!
//! A broadcast-based shutdown coordinator: every timer and dispatch task
//! subscribes, so one trigger cancels them all as a unit. Signal handling is
//! wired separately by the CLI layer so library users (and tests) can drive
//! termination directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Coordinates graceful shutdown across a node's background tasks
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        // Large enough to absorb bursts of shutdown signals without dropping
        let (shutdown_tx, _) = broadcast::channel(8);
        Self {
            shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Sender handle for components that spawn their own cancellable tasks
    pub fn sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Trigger shutdown
    pub fn trigger_shutdown(&self) {
        // Release pairs with the Acquire in is_shutdown_requested() so
        // observers see every store preceding the trigger
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Install process signal handlers that invoke `on_signal` once, forcing an
/// immediate exit (status 130) on a repeated signal.
pub fn setup_signal_handlers<F>(on_signal: F)
where
    F: Fn() + Send + Sync + 'static,
{
    let on_signal = Arc::new(on_signal);

    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }

        use std::sync::atomic::AtomicUsize;
        use tokio::signal::unix::{signal, SignalKind};
        let signal_count = Arc::new(AtomicUsize::new(0));
        let signals = [
            SignalKind::interrupt(),
            SignalKind::terminate(),
            SignalKind::hangup(),
            SignalKind::quit(),
        ];

        for kind in signals {
            let callback = on_signal.clone();
            let sig_ctr = signal_count.clone();

            tokio::spawn(async move {
                if let Ok(mut sig) = signal(kind) {
                    if sig.recv().await.is_some() {
                        let prev = sig_ctr.fetch_add(1, Ordering::AcqRel);
                        if prev >= 1 {
                            std::process::exit(130);
                        }
                        callback();
                    }
                }
            });
        }

        // Fallback for terminals where the specific UNIX signals are not
        // delivered as expected
        {
            let callback = on_signal.clone();
            let sig_ctr = signal_count.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let prev = sig_ctr.fetch_add(1, Ordering::AcqRel);
                    if prev >= 1 {
                        log::warn!("Ctrl-C received again; exiting");
                        std::process::exit(130);
                    }
                    callback();
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal();
            }
        });
    }
}
