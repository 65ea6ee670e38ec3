use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall status of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Initializing,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    /// Terminal statuses are sticky: the poller stops and channel
    /// closures may not regress them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The fixed roster of pipeline stages. Agents are never created or
/// destroyed during a run; they reset to idle only on rerun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    Revenue,
    Product,
    Support,
    Synthesizer,
    Evaluation,
    Governance,
}

impl AgentId {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Revenue => "Revenue",
            Self::Product => "Product",
            Self::Support => "Support",
            Self::Synthesizer => "Synthesizer",
            Self::Evaluation => "Evaluation",
            Self::Governance => "Governance",
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::Revenue => "Revenue trend analysis",
            Self::Product => "Product usage analysis",
            Self::Support => "Support ticket analysis",
            Self::Synthesizer => "Cross-domain synthesis",
            Self::Evaluation => "Output quality evaluation",
            Self::Governance => "Guardrail and policy review",
        }
    }

    /// Iterator over all agents in pipeline order.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::Revenue,
            Self::Product,
            Self::Support,
            Self::Synthesizer,
            Self::Evaluation,
            Self::Governance,
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl AgentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Error => "Error",
        }
    }
}

/// One line in an agent's activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            timestamp,
        }
    }
}

/// Reconciled state of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    pub status: AgentStatus,
    pub logs: Vec<LogEntry>,
    pub confidence: Option<f64>,
}

impl AgentState {
    pub fn new(id: AgentId) -> Self {
        Self {
            id,
            status: AgentStatus::Idle,
            logs: Vec::new(),
            confidence: None,
        }
    }

    pub fn last_log(&self) -> Option<&LogEntry> {
        self.logs.last()
    }
}

/// A pipeline-level failure surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionError {
    pub message: String,
    pub can_retry: bool,
}

/// Transient retry indicator shown while the pipeline recovers on its own.
///
/// Set by `warning` and `retry` events; cleared by the next successful
/// progress event or by a hard failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RetryIndicator {
    pub attempt: Option<u32>,
    pub max_attempts: Option<u32>,
    /// Visible-but-non-fatal message accompanying the indicator.
    pub notice: Option<String>,
}

/// Push-channel health as seen by the views.
///
/// Low-level transport errors never cross into the snapshot; only this flag
/// does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    #[default]
    Connecting,
    Open,
    Reconnecting,
    /// Channel is down and no further attempts will be made.
    Lost,
}

impl Connectivity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::Open => "Live",
            Self::Reconnecting => "Reconnecting",
            Self::Lost => "Disconnected",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// The authoritative snapshot of one analysis run: session-level status and
/// the full agent roster. Cloned out to views; mutated only through the
/// store.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub week: Option<String>,
    pub status: SessionStatus,
    /// 0-100. Monotonic non-decreasing while connected, except an explicit
    /// failure resets it to 0.
    pub progress: u8,
    pub error: Option<SessionError>,
    pub retrying: Option<RetryIndicator>,
    pub agents: Vec<AgentState>,
    pub connectivity: Connectivity,
    /// One-shot description of a fatal channel condition (retries exhausted
    /// or a protocol-class closure). Transport errors never appear here raw.
    pub connectivity_error: Option<String>,
    /// Set once the channel has delivered a progress_update; from then on
    /// the poller may no longer touch progress.
    pub channel_progress_seen: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            session_id: None,
            week: None,
            status: SessionStatus::Initializing,
            progress: 0,
            error: None,
            retrying: None,
            agents: AgentId::all().map(AgentState::new).collect(),
            connectivity: Connectivity::Connecting,
            connectivity_error: None,
            channel_progress_seen: false,
        }
    }
}

impl SessionSnapshot {
    pub fn for_session(session_id: impl Into<String>, week: Option<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            week,
            ..Self::default()
        }
    }

    pub fn agent(&self, id: AgentId) -> Option<&AgentState> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut AgentState> {
        self.agents.iter_mut().find(|a| a.id == id)
    }

    pub fn all_agents_completed(&self) -> bool {
        self.agents
            .iter()
            .all(|a| a.status == AgentStatus::Completed)
    }

    pub fn any_agent_started(&self) -> bool {
        self.agents.iter().any(|a| a.status != AgentStatus::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_is_fixed_and_ordered() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.agents.len(), 6);
        assert_eq!(snapshot.agents[0].id, AgentId::Revenue);
        assert_eq!(snapshot.agents[5].id, AgentId::Governance);
    }

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Processing.is_terminal());
        assert!(!SessionStatus::Initializing.is_terminal());
    }

    #[test]
    fn agent_id_round_trips_through_snake_case() {
        let json = serde_json::to_string(&AgentId::Synthesizer).unwrap();
        assert_eq!(json, "\"synthesizer\"");
        let back: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AgentId::Synthesizer);
    }

    #[test]
    fn fresh_snapshot_has_no_agent_started() {
        let snapshot = SessionSnapshot::default();
        assert!(!snapshot.any_agent_started());
        assert!(!snapshot.all_agents_completed());
    }
}
