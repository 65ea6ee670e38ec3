//! Session/agent state store: the observer-subscribable snapshot.
//!
//! Single-writer, multi-reader. The supervisor commits full reconciled
//! snapshots; the poller goes through [`SessionStore::apply_poll`], which is
//! restricted to coarse status/progress. Views clone a consistent snapshot
//! and subscribe to a version counter for change notification.

use crate::data::{Connectivity, SessionSnapshot, SessionStatus};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

#[derive(Clone)]
pub struct SessionStore {
    snapshot: Arc<RwLock<SessionSnapshot>>,
    version: Arc<watch::Sender<u64>>,
}

impl SessionStore {
    pub fn new(snapshot: SessionSnapshot) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
            version: Arc::new(version),
        }
    }

    /// Clone out the current snapshot. Always a value consistent with some
    /// prefix of the applied event stream.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot
            .read()
            .map(|g| g.clone())
            .unwrap_or_else(|e| {
                tracing::warn!("session snapshot lock poisoned: {e}");
                e.into_inner().clone()
            })
    }

    /// Receiver that changes whenever the snapshot does.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Replace the snapshot with a fully reconciled one. Supervisor only;
    /// one batch of events maps to exactly one commit.
    pub fn commit(&self, snapshot: SessionSnapshot) {
        self.write(|current| *current = snapshot);
    }

    /// Poll-restricted write: coarse status and progress only, never agent
    /// detail. Ignored entirely once the session is terminal, and progress
    /// is ignored once the channel has delivered fine-grained updates.
    pub fn apply_poll(&self, status: SessionStatus, progress: Option<f64>) {
        self.write(|current| {
            if current.status.is_terminal() {
                return;
            }
            current.status = status;
            if let Some(p) = progress {
                if !current.channel_progress_seen {
                    let coarse = p.clamp(0.0, 100.0).round() as u8;
                    current.progress = current.progress.max(coarse);
                }
            }
        });
    }

    /// Update the connectivity flag shown to views. Never touches session
    /// status, so a channel closure cannot regress a terminal state.
    pub fn set_connectivity(&self, connectivity: Connectivity) {
        self.write(|current| {
            current.connectivity = connectivity;
            if connectivity != Connectivity::Lost {
                current.connectivity_error = None;
            }
        });
    }

    /// Mark the channel permanently down with a one-shot operator-facing
    /// description.
    pub fn set_connectivity_lost(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.write(|current| {
            current.connectivity = Connectivity::Lost;
            current.connectivity_error = Some(reason);
        });
    }

    /// Atomically reset session and agent state for a rerun, keeping the
    /// session identity. The caller re-establishes the channel afterwards.
    pub fn reset_for_rerun(&self) {
        self.write(|current| {
            let fresh = SessionSnapshot {
                session_id: current.session_id.clone(),
                week: current.week.clone(),
                ..SessionSnapshot::default()
            };
            *current = fresh;
        });
    }

    fn write(&self, f: impl FnOnce(&mut SessionSnapshot)) {
        match self.snapshot.write() {
            Ok(mut guard) => f(&mut guard),
            Err(e) => {
                tracing::warn!("session snapshot lock poisoned: {e}");
                f(&mut e.into_inner())
            }
        }
        self.version.send_modify(|v| *v += 1);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionSnapshot::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AgentId, AgentStatus};

    #[test]
    fn poll_write_never_touches_agent_detail() {
        let store = SessionStore::default();
        store.apply_poll(SessionStatus::Processing, Some(30.0));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Processing);
        assert_eq!(snapshot.progress, 30);
        assert!(snapshot
            .agents
            .iter()
            .all(|a| a.status == AgentStatus::Idle && a.logs.is_empty()));
    }

    #[test]
    fn poll_progress_is_ignored_after_channel_progress() {
        let store = SessionStore::default();
        let mut snapshot = store.snapshot();
        snapshot.progress = 50;
        snapshot.channel_progress_seen = true;
        snapshot.status = SessionStatus::Processing;
        store.commit(snapshot);

        store.apply_poll(SessionStatus::Processing, Some(80.0));
        assert_eq!(store.snapshot().progress, 50);
    }

    #[test]
    fn poll_cannot_regress_terminal_status() {
        let store = SessionStore::default();
        let mut snapshot = store.snapshot();
        snapshot.status = SessionStatus::Completed;
        snapshot.progress = 100;
        store.commit(snapshot);

        store.apply_poll(SessionStatus::Processing, Some(10.0));
        let after = store.snapshot();
        assert_eq!(after.status, SessionStatus::Completed);
        assert_eq!(after.progress, 100);
    }

    #[test]
    fn rerun_resets_agents_but_keeps_identity() {
        let store = SessionStore::new(SessionSnapshot::for_session(
            "run-7",
            Some("2026-W34".into()),
        ));
        let mut snapshot = store.snapshot();
        snapshot.status = SessionStatus::Failed;
        snapshot.agent_mut(AgentId::Revenue).unwrap().status = AgentStatus::Error;
        store.commit(snapshot);

        store.reset_for_rerun();
        let fresh = store.snapshot();
        assert_eq!(fresh.session_id.as_deref(), Some("run-7"));
        assert_eq!(fresh.week.as_deref(), Some("2026-W34"));
        assert_eq!(fresh.status, SessionStatus::Initializing);
        assert_eq!(fresh.progress, 0);
        assert!(fresh
            .agents
            .iter()
            .all(|a| a.status == AgentStatus::Idle));
    }

    #[test]
    fn subscribers_see_every_commit() {
        let store = SessionStore::default();
        let rx = store.subscribe();
        let before = *rx.borrow();
        store.commit(SessionSnapshot::default());
        store.set_connectivity(Connectivity::Open);
        assert_eq!(*rx.borrow(), before + 2);
    }
}
