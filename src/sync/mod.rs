//! Real-time analysis-progress synchronization.
//!
//! One [`SessionSync`] instance owns the push channel, the fallback poller,
//! and the reconciler for exactly one session identifier; it is constructed
//! and torn down with the observing view's lifetime. Data flow:
//!
//! ```text
//! channel -> raw event batches -> reconciler -> store -> views
//! poller  -> coarse status/progress -------------^ (only while channel down)
//! ```

pub mod channel;
pub mod event;
pub mod poller;
pub mod reconciler;
pub mod store;

use crate::api::{ApiClient, ProbeError};
use crate::data::Connectivity;
use channel::{run_channel, ChannelState, ChannelUpdate, ReconnectPolicy};
use poller::{run_poller, PollerConfig};
use reconciler::Reconciler;
use store::SessionStore;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncConfig {
    pub reconnect: ReconnectPolicy,
    pub poller: PollerConfig,
}

/// Handle to the sync tasks for one session. Dropping it (or calling
/// [`SessionSync::shutdown`]) closes the channel with a normal-closure
/// teardown reason and cancels all pending timers.
pub struct SessionSync {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionSync {
    /// Spawn channel, poller, and supervisor tasks for one session.
    pub fn spawn(
        api: ApiClient,
        session_id: String,
        config: SyncConfig,
        store: SessionStore,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (terminal_tx, terminal_rx) = watch::channel(store.snapshot().status.is_terminal());
        let (update_tx, update_rx) = mpsc::channel(64);

        let channel_task = tokio::spawn(run_channel(
            api.channel_url(&session_id),
            config.reconnect,
            update_tx,
            state_tx,
            terminal_rx,
            shutdown_rx.clone(),
        ));
        let poller_task = tokio::spawn(run_poller(
            api.clone(),
            session_id.clone(),
            config.poller,
            store.clone(),
            state_rx,
            shutdown_rx.clone(),
        ));
        let supervisor_task = tokio::spawn(supervise(
            api,
            session_id,
            store,
            update_rx,
            terminal_tx,
            shutdown_rx,
        ));

        Self {
            shutdown: shutdown_tx,
            tasks: vec![channel_task, poller_task, supervisor_task],
        }
    }

    /// Signal teardown. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal teardown and wait for the tasks to wind down (the channel
    /// sends its close frame during this window).
    pub async fn wait(mut self) {
        self.shutdown();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for SessionSync {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Consume channel updates, fold event batches through the reconciler, and
/// commit each batch as a single store update.
async fn supervise(
    api: ApiClient,
    session_id: String,
    store: SessionStore,
    mut updates: mpsc::Receiver<ChannelUpdate>,
    terminal: watch::Sender<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Pre-connect probe: seed coarse state before the channel opens, through
    // the same restricted write the poller uses.
    match api.fetch_status(&session_id).await {
        Ok(probe) => {
            store.apply_poll(probe.status, probe.progress);
            let _ = terminal.send(store.snapshot().status.is_terminal());
        }
        Err(ProbeError::NotFound) => {
            tracing::debug!(session = %session_id, "initial probe: session not provisioned yet");
        }
        Err(ProbeError::Other(e)) => tracing::warn!("initial status probe failed: {e}"),
    }

    let mut reconciler = Reconciler::new();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            update = updates.recv() => {
                let Some(update) = update else { return };
                match update {
                    ChannelUpdate::Connecting { visible } => {
                        store.set_connectivity(if visible {
                            Connectivity::Reconnecting
                        } else {
                            Connectivity::Connecting
                        });
                    }
                    ChannelUpdate::Open => store.set_connectivity(Connectivity::Open),
                    ChannelUpdate::Batch(events) => {
                        let mut snapshot = store.snapshot();
                        let folded = reconciler.apply_batch(&mut snapshot, events);
                        if folded > 0 {
                            tracing::debug!(session = %session_id, folded, "committing event batch");
                        }
                        store.commit(snapshot);
                        let _ = terminal.send(store.snapshot().status.is_terminal());
                    }
                    ChannelUpdate::Disconnected { had_opened } => {
                        // Closed-before-open is retried silently.
                        if had_opened {
                            store.set_connectivity(Connectivity::Reconnecting);
                        }
                    }
                    ChannelUpdate::Fatal(err) => {
                        tracing::warn!(session = %session_id, "channel failed: {err}");
                        store.set_connectivity_lost(err.to_string());
                    }
                    ChannelUpdate::Closed => {
                        if !store.snapshot().status.is_terminal() {
                            store.set_connectivity(Connectivity::Lost);
                        }
                    }
                }
            }
        }
    }
}
