use crate::services::temp_avatar::TempAvatarStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Periodically evicts staged uploads nobody came back for.
pub struct ExpirySweeper {
    store: Arc<TempAvatarStore>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<TempAvatarStore>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            interval,
            shutdown,
        }
    }

    /// Starts the sweeper on the current runtime.
    pub fn spawn(store: Arc<TempAvatarStore>, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = Self::new(store, interval, shutdown_rx);
        let task = tokio::spawn(sweeper.run());

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Temp avatar sweeper started");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Temp avatar sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.perform_sweep().await;
                }
            }
        }
    }

    async fn perform_sweep(&self) {
        let evicted = self.store.sweep_expired().await;

        if evicted > 0 {
            tracing::info!("🧹 Swept {} expired temp avatars", evicted);
        } else {
            tracing::debug!("🧹 Sweep found no expired temp avatars");
        }
    }
}

/// Owns the running sweeper. Dropping it also stops the sweep.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the sweeper and waits for it to finish its current pass.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Temp avatar sweeper task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
