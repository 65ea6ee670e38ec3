//! Fallback status poller.
//!
//! Gives the operator coarse visibility while the push channel is down. The
//! activation guard and stop conditions live in [`PollGate`], a pure struct,
//! so they are testable without timers or a server.

use crate::api::{ApiClient, ProbeError, StatusProbe};
use crate::data::SessionStatus;
use crate::sync::channel::ChannelState;
use crate::sync::store::SessionStore;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Consecutive not-found responses tolerated before concluding the
    /// session never materialized.
    pub not_found_tolerance: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            not_found_tolerance: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Poll,
    Skip,
    Stop,
}

/// Pure activation guard and termination accounting for the poller.
#[derive(Debug)]
pub struct PollGate {
    consecutive_not_found: u32,
    tolerance: u32,
}

impl PollGate {
    pub fn new(tolerance: u32) -> Self {
        Self {
            consecutive_not_found: 0,
            tolerance,
        }
    }

    /// Decide whether this tick should probe at all.
    ///
    /// The poller only runs while the channel is neither open nor attempting
    /// a connection, and stops for good once the session is terminal.
    pub fn before_tick(&self, channel: ChannelState, session: SessionStatus) -> TickDecision {
        if session.is_terminal() {
            return TickDecision::Stop;
        }
        match channel {
            ChannelState::Open | ChannelState::Connecting | ChannelState::Reconnecting => {
                TickDecision::Skip
            }
            ChannelState::Down => TickDecision::Poll,
        }
    }

    /// Account for a probe result. `Stop` on a terminal status or once the
    /// not-found tolerance is exhausted; any other error keeps the schedule.
    pub fn after_probe(&mut self, result: &Result<StatusProbe, ProbeError>) -> TickDecision {
        match result {
            Ok(probe) => {
                self.consecutive_not_found = 0;
                if probe.status.is_terminal() {
                    TickDecision::Stop
                } else {
                    TickDecision::Poll
                }
            }
            Err(ProbeError::NotFound) => {
                self.consecutive_not_found += 1;
                if self.consecutive_not_found >= self.tolerance {
                    TickDecision::Stop
                } else {
                    TickDecision::Poll
                }
            }
            Err(ProbeError::Other(_)) => TickDecision::Poll,
        }
    }
}

/// Poll session status on a fixed interval until terminal, not-found
/// exhaustion, or shutdown.
pub async fn run_poller(
    api: ApiClient,
    session_id: String,
    config: PollerConfig,
    store: SessionStore,
    channel_state: watch::Receiver<ChannelState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut gate = PollGate::new(config.not_found_tolerance);
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
                continue;
            }
        }

        match gate.before_tick(*channel_state.borrow(), store.snapshot().status) {
            TickDecision::Stop => return,
            TickDecision::Skip => continue,
            TickDecision::Poll => {}
        }

        let result = api.fetch_status(&session_id).await;
        match &result {
            Ok(probe) => store.apply_poll(probe.status, probe.progress),
            Err(ProbeError::NotFound) => {
                tracing::debug!(session = %session_id, "status probe: session not found");
            }
            Err(ProbeError::Other(e)) => {
                // Logged and swallowed; polling continues on schedule.
                tracing::warn!("status poll failed: {e}");
            }
        }

        if gate.after_probe(&result) == TickDecision::Stop {
            tracing::debug!(session = %session_id, "poller self-terminating");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(status: SessionStatus) -> Result<StatusProbe, ProbeError> {
        Ok(StatusProbe {
            status,
            progress: None,
        })
    }

    #[test]
    fn skips_while_channel_is_open_or_connecting() {
        let gate = PollGate::new(3);
        for state in [
            ChannelState::Open,
            ChannelState::Connecting,
            ChannelState::Reconnecting,
        ] {
            assert_eq!(
                gate.before_tick(state, SessionStatus::Processing),
                TickDecision::Skip
            );
        }
    }

    #[test]
    fn polls_only_when_channel_is_down() {
        let gate = PollGate::new(3);
        assert_eq!(
            gate.before_tick(ChannelState::Down, SessionStatus::Processing),
            TickDecision::Poll
        );
    }

    #[test]
    fn stops_once_session_is_terminal() {
        let gate = PollGate::new(3);
        assert_eq!(
            gate.before_tick(ChannelState::Down, SessionStatus::Completed),
            TickDecision::Stop
        );
        assert_eq!(
            gate.before_tick(ChannelState::Down, SessionStatus::Failed),
            TickDecision::Stop
        );
    }

    #[test]
    fn stops_after_consecutive_not_found() {
        let mut gate = PollGate::new(3);
        assert_eq!(
            gate.after_probe(&Err(ProbeError::NotFound)),
            TickDecision::Poll
        );
        assert_eq!(
            gate.after_probe(&Err(ProbeError::NotFound)),
            TickDecision::Poll
        );
        assert_eq!(
            gate.after_probe(&Err(ProbeError::NotFound)),
            TickDecision::Stop
        );
    }

    #[test]
    fn success_resets_not_found_counter() {
        let mut gate = PollGate::new(2);
        assert_eq!(
            gate.after_probe(&Err(ProbeError::NotFound)),
            TickDecision::Poll
        );
        assert_eq!(
            gate.after_probe(&probe(SessionStatus::Processing)),
            TickDecision::Poll
        );
        // Counter reset: one more miss does not stop.
        assert_eq!(
            gate.after_probe(&Err(ProbeError::NotFound)),
            TickDecision::Poll
        );
    }

    #[test]
    fn other_errors_keep_the_schedule() {
        let mut gate = PollGate::new(1);
        let err: Result<StatusProbe, ProbeError> =
            Err(ProbeError::Other(anyhow::anyhow!("timeout")));
        assert_eq!(gate.after_probe(&err), TickDecision::Poll);
    }

    #[test]
    fn terminal_probe_stops_polling() {
        let mut gate = PollGate::new(3);
        assert_eq!(
            gate.after_probe(&probe(SessionStatus::Failed)),
            TickDecision::Stop
        );
    }
}
