//! Message enum for the Elm Architecture (TEA) pattern.
//!
//! All operator actions are represented as messages, dispatched from key
//! events and folded by `App::update()`.

/// All possible operator actions in the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Quit the application (tears down the sync tasks first)
    Quit,
    /// Select the previous agent in the roster
    SelectPrevAgent,
    /// Select the next agent in the roster
    SelectNextAgent,
    /// Scroll the selected agent's log up
    ScrollLogsUp,
    /// Scroll the selected agent's log down
    ScrollLogsDown,
    /// Trigger a new analysis run
    StartRun,
    /// Reset local state and re-establish the channel for the current run
    Rerun,
    /// No operation (unhandled key)
    None,
}
