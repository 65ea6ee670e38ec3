use crate::api::ApiClient;
use crate::config::Config;
use crate::data::{AgentState, SessionSnapshot, SessionStatus};
use crate::sync::store::SessionStore;
use crate::sync::SessionSync;
use crate::tui::message::Message;
use anyhow::Result;
use std::sync::Arc;

/// Braille spinner frames for the live-run indicator
pub const SPINNER_FRAMES: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

pub struct App {
    pub config: Arc<Config>,
    api: ApiClient,
    pub store: SessionStore,
    sync: Option<SessionSync>,

    /// Snapshot rendered this frame; refreshed from the store on tick.
    pub snapshot: SessionSnapshot,
    pub selected_agent: usize,
    pub log_scroll: usize,
    /// Transient operator feedback (trigger failures etc.), not pipeline state.
    pub status_line: Option<String>,
    pub spinner_frame: usize,
    week: Option<String>,
}

impl App {
    pub fn new(config: Config, week: Option<String>) -> Result<Self> {
        let api = ApiClient::new(&config.server.base_url)?;
        let week = week.or_else(|| config.server.default_week.clone());
        let store = SessionStore::default();
        let snapshot = store.snapshot();
        Ok(Self {
            config: Arc::new(config),
            api,
            store,
            sync: None,
            snapshot,
            selected_agent: 0,
            log_scroll: 0,
            status_line: None,
            spinner_frame: 0,
            week,
        })
    }

    /// Attach to an existing session: reset the store to that identity and
    /// spawn the sync tasks.
    pub fn attach(&mut self, session_id: String) {
        if let Some(old) = self.sync.take() {
            old.shutdown();
        }
        self.store = SessionStore::new(SessionSnapshot::for_session(
            session_id.clone(),
            self.week.clone(),
        ));
        self.sync = Some(SessionSync::spawn(
            self.api.clone(),
            session_id,
            self.config.sync.to_sync_config(),
            self.store.clone(),
        ));
        self.snapshot = self.store.snapshot();
        self.log_scroll = 0;
    }

    /// Process a message and update app state (Elm Architecture update
    /// function). Returns `Ok(true)` if the app should quit.
    pub async fn update(&mut self, msg: Message) -> Result<bool> {
        match msg {
            Message::Quit => {
                // Graceful teardown: the channel sends its close frame
                // before we drop out of the loop.
                if let Some(sync) = self.sync.take() {
                    sync.wait().await;
                }
                return Ok(true);
            }
            Message::SelectNextAgent => {
                if self.selected_agent + 1 < self.snapshot.agents.len() {
                    self.selected_agent += 1;
                    self.log_scroll = 0;
                }
            }
            Message::SelectPrevAgent => {
                if self.selected_agent > 0 {
                    self.selected_agent -= 1;
                    self.log_scroll = 0;
                }
            }
            Message::ScrollLogsDown => {
                self.log_scroll = self.log_scroll.saturating_add(1);
            }
            Message::ScrollLogsUp => {
                self.log_scroll = self.log_scroll.saturating_sub(1);
            }
            Message::StartRun => self.start_run().await,
            Message::Rerun => self.rerun(),
            Message::None => {}
        }
        Ok(false)
    }

    /// Trigger a fresh analysis run, unless one is already in flight.
    async fn start_run(&mut self) {
        if self.sync.is_some() && !self.snapshot.status.is_terminal() {
            self.status_line = Some("A run is already in progress".to_string());
            return;
        }
        match self.api.trigger_analysis(self.week.as_deref()).await {
            Ok(session_id) => {
                self.status_line = Some(format!("Started analysis {session_id}"));
                self.attach(session_id);
            }
            Err(e) => {
                tracing::warn!("failed to trigger analysis: {e:#}");
                self.status_line = Some(format!("Trigger failed: {e}"));
            }
        }
    }

    /// Reset local state to initial and re-establish the channel for the
    /// current session. Offered after a failure; a no-op without a session.
    fn rerun(&mut self) {
        let Some(session_id) = self.snapshot.session_id.clone() else {
            self.status_line = Some("No session to rerun".to_string());
            return;
        };
        if let Some(old) = self.sync.take() {
            old.shutdown();
        }
        self.store.reset_for_rerun();
        self.sync = Some(SessionSync::spawn(
            self.api.clone(),
            session_id,
            self.config.sync.to_sync_config(),
            self.store.clone(),
        ));
        self.snapshot = self.store.snapshot();
        self.log_scroll = 0;
        self.status_line = None;
    }

    /// Refresh the rendered snapshot and advance the spinner.
    pub fn on_tick(&mut self) {
        self.snapshot = self.store.snapshot();
        if self.snapshot.status == SessionStatus::Processing {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES.len();
        }
    }

    pub fn selected_agent_state(&self) -> Option<&AgentState> {
        self.snapshot.agents.get(self.selected_agent)
    }

    pub fn has_active_run(&self) -> bool {
        self.sync.is_some()
    }
}
