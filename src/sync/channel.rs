//! Event channel adapter: owns the push connection for one session.
//!
//! Connects to the session-scoped WebSocket endpoint, forwards inbound event
//! batches upward, and applies the reconnection policy. Transport errors are
//! handled here; the supervisor only ever sees the distilled
//! [`ChannelUpdate`]s and the [`ChannelError`] taxonomy.

use crate::sync::event::{parse_events, PipelineEvent};
use crate::util::send_or_log;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Close reason used for intentional teardown; a closure carrying it never
/// triggers reconnection.
pub const TEARDOWN_REASON: &str = "teardown";

/// Liveness probe sent once immediately after the channel opens.
const KEEPALIVE_PROBE: &str = r#"{"type":"ping"}"#;

/// Distinct failure classes surfaced to the caller. All are fatal: none of
/// these closures is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("protocol violation on event channel: {0}")]
    Protocol(String),
    #[error("unsupported payload on event channel: {0}")]
    UnsupportedData(String),
    #[error("event channel rejected by policy: {0}")]
    PolicyViolation(String),
    #[error("server error on event channel: {0}")]
    ServerError(String),
    #[error("event channel gave up after {attempts} reconnect attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Connection lifecycle and data, as seen by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    /// A connection attempt is starting. `visible` is false while the
    /// channel has never been open (session may not be provisioned yet).
    Connecting { visible: bool },
    Open,
    Batch(Vec<PipelineEvent>),
    /// The connection dropped; another attempt follows after the delay.
    Disconnected { had_opened: bool },
    /// No further attempts will be made.
    Fatal(ChannelError),
    /// Intentional close (teardown, server-side normal closure, or session
    /// already terminal).
    Closed,
}

/// Coarse channel state published for the poller's activation guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Connecting,
    Open,
    Reconnecting,
    /// Closed for good; the fallback poller may take over.
    Down,
}

/// Reconnection policy: bounded attempts with a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// What to do after a connection ends.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseDisposition {
    /// Normal closure; never reconnect.
    Intentional,
    /// Contract mismatch, not flakiness; surface and stop.
    Fatal(ChannelError),
    /// Abnormal closure; retry within policy.
    Retry,
}

/// Classify a close frame into the reconnect decision.
///
/// Close codes are consumed as signals: normal closure means intentional,
/// the protocol/unsupported/policy/server-error codes are fatal, everything
/// else (including a missing frame, e.g. code 1006) is retried.
pub fn classify_close(frame: Option<&CloseFrame>) -> CloseDisposition {
    let Some(frame) = frame else {
        return CloseDisposition::Retry;
    };
    let reason = frame.reason.as_str().to_string();
    match frame.code {
        CloseCode::Normal => CloseDisposition::Intentional,
        CloseCode::Protocol => CloseDisposition::Fatal(ChannelError::Protocol(reason)),
        CloseCode::Unsupported | CloseCode::Invalid => {
            CloseDisposition::Fatal(ChannelError::UnsupportedData(reason))
        }
        CloseCode::Policy => CloseDisposition::Fatal(ChannelError::PolicyViolation(reason)),
        CloseCode::Error => CloseDisposition::Fatal(ChannelError::ServerError(reason)),
        _ => CloseDisposition::Retry,
    }
}

fn teardown_frame() -> CloseFrame {
    CloseFrame {
        code: CloseCode::Normal,
        reason: TEARDOWN_REASON.into(),
    }
}

/// Run the channel for one session until teardown, intentional close, or a
/// fatal condition.
///
/// `terminal` reflects whether the session has reached a sticky terminal
/// status; once it has, no reconnection attempt is scheduled.
pub async fn run_channel(
    url: String,
    policy: ReconnectPolicy,
    updates: mpsc::Sender<ChannelUpdate>,
    state: watch::Sender<ChannelState>,
    terminal: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempts: u32 = 0;
    let mut ever_opened = false;

    loop {
        if *shutdown.borrow() {
            publish(&state, ChannelState::Down);
            send_or_log(&updates, ChannelUpdate::Closed, "channel update").await;
            return;
        }

        publish(
            &state,
            if ever_opened {
                ChannelState::Reconnecting
            } else {
                ChannelState::Connecting
            },
        );
        send_or_log(
            &updates,
            ChannelUpdate::Connecting {
                visible: ever_opened,
            },
            "channel update",
        )
        .await;

        let connected = tokio::select! {
            result = tokio::time::timeout(policy.connect_timeout, connect_async(url.as_str())) => result,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    publish(&state, ChannelState::Down);
                    send_or_log(&updates, ChannelUpdate::Closed, "channel update").await;
                    return;
                }
                continue;
            }
        };

        let mut ws = match connected {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                // Closed before ever opening: the session is likely not yet
                // provisioned server-side. Retry silently.
                tracing::debug!("channel connect failed: {e}");
                if !retry_or_give_up(
                    &mut attempts,
                    false,
                    &policy,
                    &updates,
                    &state,
                    &terminal,
                    &mut shutdown,
                )
                .await
                {
                    return;
                }
                continue;
            }
            Err(_) => {
                tracing::debug!("channel connect timed out");
                if !retry_or_give_up(
                    &mut attempts,
                    false,
                    &policy,
                    &updates,
                    &state,
                    &terminal,
                    &mut shutdown,
                )
                .await
                {
                    return;
                }
                continue;
            }
        };

        ever_opened = true;
        attempts = 0;
        publish(&state, ChannelState::Open);
        send_or_log(&updates, ChannelUpdate::Open, "channel update").await;

        if let Err(e) = ws.send(Message::Text(KEEPALIVE_PROBE.into())).await {
            tracing::warn!("keepalive probe failed: {e}");
        }

        let disposition = loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = ws.close(Some(teardown_frame())).await;
                        publish(&state, ChannelState::Down);
                        send_or_log(&updates, ChannelUpdate::Closed, "channel update").await;
                        return;
                    }
                }
                inbound = ws.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match parse_events(&text) {
                            Ok(events) => {
                                let batch: Vec<PipelineEvent> = events
                                    .into_iter()
                                    .filter(|event| {
                                        if event == &PipelineEvent::Unknown {
                                            tracing::warn!("dropping event of unknown type");
                                        }
                                        !event.is_ignorable()
                                    })
                                    .collect();
                                if !batch.is_empty() {
                                    send_or_log(
                                        &updates,
                                        ChannelUpdate::Batch(batch),
                                        "event batch",
                                    )
                                    .await;
                                }
                            }
                            Err(e) => tracing::warn!("undecodable channel frame: {e}"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Heartbeat echo; never forwarded as a domain event.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break classify_close(frame.as_ref());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("channel transport error: {e}");
                        break CloseDisposition::Retry;
                    }
                    None => break CloseDisposition::Retry,
                }
            }
        };

        match disposition {
            CloseDisposition::Intentional => {
                publish(&state, ChannelState::Down);
                send_or_log(&updates, ChannelUpdate::Closed, "channel update").await;
                return;
            }
            CloseDisposition::Fatal(err) => {
                publish(&state, ChannelState::Down);
                send_or_log(&updates, ChannelUpdate::Fatal(err), "channel update").await;
                return;
            }
            CloseDisposition::Retry => {
                if !retry_or_give_up(
                    &mut attempts,
                    true,
                    &policy,
                    &updates,
                    &state,
                    &terminal,
                    &mut shutdown,
                )
                .await
                {
                    return;
                }
            }
        }
    }
}

/// Account for one failed connection and wait out the reconnect delay.
///
/// Returns false when the loop should end (terminal session, attempts
/// exhausted, or shutdown during the delay).
async fn retry_or_give_up(
    attempts: &mut u32,
    had_opened: bool,
    policy: &ReconnectPolicy,
    updates: &mpsc::Sender<ChannelUpdate>,
    state: &watch::Sender<ChannelState>,
    terminal: &watch::Receiver<bool>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    if *terminal.borrow() {
        // The session already reached a sticky terminal status; a reconnect
        // could only regress it.
        publish(state, ChannelState::Down);
        send_or_log(updates, ChannelUpdate::Closed, "channel update").await;
        return false;
    }

    *attempts += 1;
    if *attempts >= policy.max_attempts {
        publish(state, ChannelState::Down);
        send_or_log(
            updates,
            ChannelUpdate::Fatal(ChannelError::RetriesExhausted {
                attempts: *attempts,
            }),
            "channel update",
        )
        .await;
        return false;
    }

    send_or_log(
        updates,
        ChannelUpdate::Disconnected { had_opened },
        "channel update",
    )
    .await;
    publish(
        state,
        if had_opened {
            ChannelState::Reconnecting
        } else {
            ChannelState::Connecting
        },
    );

    tokio::select! {
        _ = tokio::time::sleep(policy.delay) => true,
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}

fn publish(state: &watch::Sender<ChannelState>, value: ChannelState) {
    let _ = state.send(value);
}
