//! Event reconciliation: folds raw pipeline events into session/agent state.
//!
//! Pure with respect to the transport: the supervisor hands in a snapshot
//! and a batch of events, and every mutation from that batch lands in one
//! store commit. Dedup and ordering correction happen here, so the
//! invariants are testable without a socket.

use crate::data::{
    AgentStatus, Connectivity, LogEntry, RetryIndicator, SessionError, SessionSnapshot,
    SessionStatus,
};
use crate::sync::event::{CompletionPayload, EventKey, PipelineEvent};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Maximum number of key insights surfaced per completion payload.
const MAX_INSIGHTS: usize = 3;

/// Folds batches of inbound events into a consistent state delta.
///
/// One reconciler instance owns the seen-event set for exactly one run; a
/// rerun spawns fresh sync tasks and with them a fresh reconciler.
#[derive(Debug, Default)]
pub struct Reconciler {
    seen: HashSet<EventKey>,
    /// Session-lifetime arrival counter, used as the dedup stamp for events
    /// without a timestamp.
    sequence: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one batch of events to the snapshot.
    ///
    /// Duplicates (by type + agent + timestamp-or-position) are dropped,
    /// `agent_started` is folded before `agent_completed` for the same agent
    /// regardless of arrival order, and the derived session status is
    /// recomputed afterwards. Returns the number of events folded.
    pub fn apply_batch(
        &mut self,
        snapshot: &mut SessionSnapshot,
        batch: Vec<PipelineEvent>,
    ) -> usize {
        let mut accepted = Vec::with_capacity(batch.len());
        for event in batch {
            if event.is_ignorable() {
                continue;
            }
            let key = event.key(self.sequence);
            self.sequence += 1;
            if !self.seen.insert(key) {
                tracing::debug!(kind = event.kind(), "dropping duplicate event");
                continue;
            }
            accepted.push(event);
        }

        let ordered = order_batch(accepted);
        let folded = ordered.len();
        for event in ordered {
            fold(snapshot, event);
        }

        snapshot.status = derive_status(snapshot);
        if snapshot.status == SessionStatus::Completed {
            // Agents-completed wins the completion tie-break; pin progress so
            // the two signals cannot disagree.
            snapshot.progress = 100;
        }
        folded
    }
}

/// Enforce started-before-completed for the same agent within one batch.
///
/// This is the only reordering performed; everything else keeps arrival
/// order.
fn order_batch(batch: Vec<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut consumed = vec![false; batch.len()];
    let mut ordered = Vec::with_capacity(batch.len());

    for i in 0..batch.len() {
        if consumed[i] {
            continue;
        }
        if let PipelineEvent::AgentCompleted { agent, .. } = &batch[i] {
            let late_start = (i + 1..batch.len()).find(|&j| {
                !consumed[j]
                    && matches!(&batch[j], PipelineEvent::AgentStarted { agent: a, .. } if a == agent)
            });
            if let Some(j) = late_start {
                consumed[j] = true;
                ordered.push(batch[j].clone());
            }
        }
        consumed[i] = true;
        ordered.push(batch[i].clone());
    }

    ordered
}

fn fold(snapshot: &mut SessionSnapshot, event: PipelineEvent) {
    match event {
        PipelineEvent::AgentStarted {
            agent,
            message,
            timestamp,
        } => {
            let at = stamp(timestamp);
            if let Some(state) = snapshot.agent_mut(agent) {
                state.status = AgentStatus::Running;
                let line = message.unwrap_or_else(|| format!("{} processing", agent.label()));
                state.logs.push(LogEntry::new(line, at));
            }
        }

        PipelineEvent::AgentProgress {
            agent,
            message,
            timestamp,
        } => {
            let at = stamp(timestamp);
            if let (Some(state), Some(line)) = (snapshot.agent_mut(agent), message) {
                if !state.logs.iter().any(|l| l.message == line) {
                    state.logs.push(LogEntry::new(line, at));
                }
            }
        }

        PipelineEvent::AgentCompleted {
            agent,
            message,
            data,
            timestamp,
        } => {
            let at = stamp(timestamp);
            if let Some(state) = snapshot.agent_mut(agent) {
                state.status = AgentStatus::Completed;
                let payload = data.unwrap_or_default();
                state.confidence = payload.confidence.or(state.confidence);

                let line = message.unwrap_or_else(|| format!("{} completed", agent.label()));
                state.logs.push(LogEntry::new(line, at));
                for extra in completion_lines(&payload) {
                    state.logs.push(LogEntry::new(extra, at));
                }
            }
        }

        PipelineEvent::ProgressUpdate {
            progress,
            timestamp: _,
        } => {
            let value = progress.clamp(0.0, 100.0).round() as u8;
            // Monotonic while connected; only an explicit failure resets.
            snapshot.progress = snapshot.progress.max(value);
            snapshot.channel_progress_seen = true;
            snapshot.retrying = None;
            if progress >= 100.0 {
                snapshot.progress = 100;
            }
        }

        PipelineEvent::Completed { timestamp: _ } => {
            snapshot.progress = 100;
            snapshot.retrying = None;
        }

        PipelineEvent::Warning {
            message,
            is_transient: _,
            timestamp: _,
        } => {
            snapshot.retrying = Some(RetryIndicator {
                attempt: None,
                max_attempts: None,
                notice: message,
            });
        }

        PipelineEvent::Retry {
            message,
            retry_attempt,
            max_retries,
            timestamp: _,
        } => {
            snapshot.error = None;
            snapshot.retrying = Some(RetryIndicator {
                attempt: retry_attempt,
                max_attempts: max_retries,
                notice: message,
            });
        }

        PipelineEvent::Error {
            message,
            error,
            can_retry,
            timestamp: _,
        }
        | PipelineEvent::AnalysisFailed {
            message,
            error,
            can_retry,
            timestamp: _,
        } => {
            snapshot.progress = 0;
            snapshot.retrying = None;
            snapshot.error = Some(SessionError {
                message: message
                    .or(error)
                    .unwrap_or_else(|| "Analysis failed".to_string()),
                can_retry: can_retry.unwrap_or(false),
            });
        }

        PipelineEvent::Pong | PipelineEvent::Unknown => {}
    }
}

/// Recompute session status from the folded snapshot.
///
/// Failure wins over completion; all-agents-completed wins over the
/// server-reported progress figure.
fn derive_status(snapshot: &SessionSnapshot) -> SessionStatus {
    if snapshot.error.is_some() && snapshot.retrying.is_none() {
        SessionStatus::Failed
    } else if snapshot.all_agents_completed() || snapshot.progress >= 100 {
        SessionStatus::Completed
    } else if snapshot.connectivity == Connectivity::Connecting && !snapshot.any_agent_started() {
        SessionStatus::Initializing
    } else {
        SessionStatus::Processing
    }
}

/// Expand the optional fields of a completion payload into log lines.
fn completion_lines(payload: &CompletionPayload) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(metrics) = &payload.metrics {
        if !metrics.is_empty() {
            let mut pairs: Vec<_> = metrics.iter().collect();
            pairs.sort_by_key(|(k, _)| k.as_str());
            let summary = pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("Metrics: {summary}"));
        }
    }

    if let Some(insights) = &payload.key_insights {
        for insight in insights.iter().take(MAX_INSIGHTS) {
            lines.push(format!("Insight: {insight}"));
        }
    }

    if let Some(cache_hit) = payload.cache_hit {
        lines.push(if cache_hit {
            "Served from cache".to_string()
        } else {
            "Cache miss".to_string()
        });
    }

    if let Some(secs) = payload.execution_time {
        lines.push(format!("Finished in {secs:.1}s"));
    }

    lines
}

fn stamp(timestamp: Option<DateTime<Utc>>) -> DateTime<Utc> {
    timestamp.unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AgentId;

    fn started(agent: AgentId) -> PipelineEvent {
        PipelineEvent::AgentStarted {
            agent,
            message: None,
            timestamp: None,
        }
    }

    fn completed(agent: AgentId, confidence: f64) -> PipelineEvent {
        PipelineEvent::AgentCompleted {
            agent,
            message: None,
            data: Some(CompletionPayload {
                confidence: Some(confidence),
                ..Default::default()
            }),
            timestamp: None,
        }
    }

    #[test]
    fn reversed_batch_still_runs_before_completing() {
        let mut reconciler = Reconciler::new();
        let mut snapshot = SessionSnapshot::default();

        reconciler.apply_batch(
            &mut snapshot,
            vec![completed(AgentId::Revenue, 0.9), started(AgentId::Revenue)],
        );

        let agent = snapshot.agent(AgentId::Revenue).unwrap();
        assert_eq!(agent.status, AgentStatus::Completed);
        // The processing line must precede the completion line.
        assert!(agent.logs[0].message.contains("processing"));
        assert!(agent.logs[1].message.contains("completed"));
    }

    #[test]
    fn ordering_correction_only_touches_the_matching_agent() {
        let mut reconciler = Reconciler::new();
        let mut snapshot = SessionSnapshot::default();

        reconciler.apply_batch(
            &mut snapshot,
            vec![
                completed(AgentId::Revenue, 0.9),
                started(AgentId::Product),
                started(AgentId::Revenue),
            ],
        );

        assert_eq!(
            snapshot.agent(AgentId::Product).unwrap().status,
            AgentStatus::Running
        );
        assert_eq!(
            snapshot.agent(AgentId::Revenue).unwrap().status,
            AgentStatus::Completed
        );
    }

    #[test]
    fn completion_payload_expands_into_log_lines() {
        let payload = CompletionPayload {
            confidence: Some(0.9),
            metrics: Some(
                [("tickets".to_string(), serde_json::json!(42))]
                    .into_iter()
                    .collect(),
            ),
            key_insights: Some(vec![
                "a".into(),
                "b".into(),
                "c".into(),
                "d".into(), // beyond the cap, dropped
            ]),
            cache_hit: Some(false),
            execution_time: Some(3.25),
        };

        let lines = completion_lines(&payload);
        assert_eq!(lines[0], "Metrics: tickets=42");
        assert_eq!(
            lines[1..4],
            ["Insight: a".to_string(), "Insight: b".into(), "Insight: c".into()]
        );
        assert_eq!(lines[4], "Cache miss");
        assert_eq!(lines[5], "Finished in 3.2s");
    }

    #[test]
    fn empty_payload_adds_no_extra_lines() {
        assert!(completion_lines(&CompletionPayload::default()).is_empty());
    }

    #[test]
    fn fresh_reconciler_accepts_a_replayed_run() {
        let mut reconciler = Reconciler::new();
        let mut snapshot = SessionSnapshot::default();
        let event = PipelineEvent::AgentProgress {
            agent: AgentId::Support,
            message: Some("checking backlog".into()),
            timestamp: Some("2026-08-01T10:00:00Z".parse().unwrap()),
        };

        assert_eq!(reconciler.apply_batch(&mut snapshot, vec![event.clone()]), 1);
        assert_eq!(reconciler.apply_batch(&mut snapshot, vec![event.clone()]), 0);

        // Rerun path: new sync tasks, new reconciler, no seen-set carryover.
        let mut reconciler = Reconciler::new();
        let mut fresh = SessionSnapshot::default();
        assert_eq!(reconciler.apply_batch(&mut fresh, vec![event]), 1);
    }
}
