//! Wire format for inbound pipeline events.
//!
//! Events are immutable facts pushed by the analysis backend. The reconciler
//! derives state from them but never mutates an event after receipt. The
//! payload is a tagged union keyed by `type`, with an explicit optional-field
//! schema per variant instead of a free-form blob.

use crate::data::AgentId;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

/// Structured payload attached to `agent_completed` events.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct CompletionPayload {
    /// 0.0-1.0 confidence reported by the agent.
    pub confidence: Option<f64>,
    /// Named metrics computed by the agent.
    pub metrics: Option<HashMap<String, serde_json::Value>>,
    /// Headline findings; the reconciler surfaces at most three.
    pub key_insights: Option<Vec<String>>,
    /// Whether the agent answered from cache.
    pub cache_hit: Option<bool>,
    /// Wall-clock execution time in seconds.
    pub execution_time: Option<f64>,
}

/// An inbound notification from the pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    AgentStarted {
        agent: AgentId,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    AgentProgress {
        agent: AgentId,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    AgentCompleted {
        agent: AgentId,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        data: Option<CompletionPayload>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    /// The only event type allowed to move the session-level progress bar.
    ProgressUpdate {
        progress: f64,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    Warning {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        is_transient: Option<bool>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    Retry {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        retry_attempt: Option<u32>,
        #[serde(default)]
        max_retries: Option<u32>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        can_retry: Option<bool>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    AnalysisFailed {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        can_retry: Option<bool>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    Completed {
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Keepalive echo from the far end; never forwarded as a domain event.
    Pong,
    /// Event types this build does not know about. Logged and dropped.
    #[serde(other)]
    Unknown,
}

impl PipelineEvent {
    /// Stable tag for dedup keys and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentStarted { .. } => "agent_started",
            Self::AgentProgress { .. } => "agent_progress",
            Self::AgentCompleted { .. } => "agent_completed",
            Self::ProgressUpdate { .. } => "progress_update",
            Self::Warning { .. } => "warning",
            Self::Retry { .. } => "retry",
            Self::Error { .. } => "error",
            Self::AnalysisFailed { .. } => "analysis_failed",
            Self::Completed { .. } => "completed",
            Self::Pong => "pong",
            Self::Unknown => "unknown",
        }
    }

    pub fn agent(&self) -> Option<AgentId> {
        match self {
            Self::AgentStarted { agent, .. }
            | Self::AgentProgress { agent, .. }
            | Self::AgentCompleted { agent, .. } => Some(*agent),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::AgentStarted { timestamp, .. }
            | Self::AgentProgress { timestamp, .. }
            | Self::AgentCompleted { timestamp, .. }
            | Self::ProgressUpdate { timestamp, .. }
            | Self::Warning { timestamp, .. }
            | Self::Retry { timestamp, .. }
            | Self::Error { timestamp, .. }
            | Self::AnalysisFailed { timestamp, .. }
            | Self::Completed { timestamp, .. } => *timestamp,
            Self::Pong | Self::Unknown => None,
        }
    }

    /// True for keepalive echoes and unrecognized types, which are dropped
    /// before reconciliation.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::Pong | Self::Unknown)
    }

    /// Identity under which this event is applied at most once.
    ///
    /// Keyed by type + agent + timestamp; events without a timestamp fall
    /// back to their position in the session-lifetime arrival sequence, so a
    /// replayed batch dedups while distinct untimestamped events do not
    /// collide.
    pub fn key(&self, sequence: u64) -> EventKey {
        let stamp = match self.timestamp() {
            Some(ts) => Stamp::At(ts.timestamp_millis()),
            None => Stamp::Seq(sequence),
        };
        EventKey {
            kind: self.kind(),
            agent: self.agent(),
            stamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Stamp {
    At(i64),
    Seq(u64),
}

/// Dedup identity of one event: type + agent + timestamp-or-position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    kind: &'static str,
    agent: Option<AgentId>,
    stamp: Stamp,
}

/// Parse one channel text frame into a batch of events.
///
/// The backend sends either a single event object or an array of them per
/// frame; both are accepted. Array elements are decoded individually: one
/// out-of-contract element (say, an agent outside the roster) is logged and
/// skipped without dropping its valid siblings.
pub fn parse_events(text: &str) -> Result<Vec<PipelineEvent>, serde_json::Error> {
    if text.trim_start().starts_with('[') {
        let values: Vec<serde_json::Value> = serde_json::from_str(text)?;
        Ok(values
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!("skipping undecodable event in batch: {e}");
                    None
                }
            })
            .collect())
    } else {
        serde_json::from_str(text).map(|event| vec![event])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agent_completed_with_payload() {
        let json = r#"{
            "type": "agent_completed",
            "agent": "revenue",
            "message": "Revenue analysis done",
            "data": {
                "confidence": 0.94,
                "key_insights": ["MRR up 4%"],
                "cache_hit": true,
                "execution_time": 12.5
            }
        }"#;
        let events = parse_events(json).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            PipelineEvent::AgentCompleted { agent, data, .. } => {
                assert_eq!(*agent, AgentId::Revenue);
                let data = data.as_ref().unwrap();
                assert_eq!(data.confidence, Some(0.94));
                assert_eq!(data.cache_hit, Some(true));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parses_array_frame_as_batch() {
        let json = r#"[
            {"type": "agent_started", "agent": "product"},
            {"type": "progress_update", "progress": 40}
        ]"#;
        let events = parse_events(json).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), "agent_started");
        assert_eq!(events[1].kind(), "progress_update");
    }

    #[test]
    fn bad_batch_element_is_skipped_not_fatal() {
        let json = r#"[
            {"type": "agent_started", "agent": "revenue"},
            {"type": "agent_started", "agent": "astrology"},
            {"type": "progress_update", "progress": 20}
        ]"#;
        let events = parse_events(json).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].agent(), Some(AgentId::Revenue));
        assert_eq!(events[1].kind(), "progress_update");
    }

    #[test]
    fn unknown_type_maps_to_ignorable_variant() {
        let events = parse_events(r#"{"type": "telemetry_blip"}"#).unwrap();
        assert_eq!(events[0], PipelineEvent::Unknown);
        assert!(events[0].is_ignorable());
    }

    #[test]
    fn pong_is_ignorable() {
        let events = parse_events(r#"{"type": "pong"}"#).unwrap();
        assert!(events[0].is_ignorable());
    }

    #[test]
    fn identical_events_share_a_key() {
        let json = r#"{"type": "agent_progress", "agent": "support",
                       "message": "x", "timestamp": "2026-08-01T10:00:00Z"}"#;
        let a = &parse_events(json).unwrap()[0];
        let b = &parse_events(json).unwrap()[0];
        assert_eq!(a.key(0), b.key(99));
    }

    #[test]
    fn untimestamped_events_key_by_sequence() {
        let json = r#"{"type": "progress_update", "progress": 10}"#;
        let event = &parse_events(json).unwrap()[0];
        assert_ne!(event.key(0), event.key(1));
    }
}
