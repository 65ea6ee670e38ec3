//! Key event dispatch: maps raw key presses to messages.

use crate::tui::message::Message;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

pub fn dispatch(key: KeyEvent) -> Message {
    // Ignore release/repeat events (emitted on some platforms).
    if key.kind != KeyEventKind::Press {
        return Message::None;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Message::Quit,
        KeyCode::Char('j') | KeyCode::Down => Message::SelectNextAgent,
        KeyCode::Char('k') | KeyCode::Up => Message::SelectPrevAgent,
        KeyCode::Char('J') | KeyCode::PageDown => Message::ScrollLogsDown,
        KeyCode::Char('K') | KeyCode::PageUp => Message::ScrollLogsUp,
        KeyCode::Char('s') => Message::StartRun,
        KeyCode::Char('r') => Message::Rerun,
        _ => Message::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn quit_keys() {
        assert_eq!(dispatch(press(KeyCode::Char('q'))), Message::Quit);
        assert_eq!(dispatch(press(KeyCode::Esc)), Message::Quit);
    }

    #[test]
    fn vim_style_agent_navigation() {
        assert_eq!(dispatch(press(KeyCode::Char('j'))), Message::SelectNextAgent);
        assert_eq!(dispatch(press(KeyCode::Char('k'))), Message::SelectPrevAgent);
    }

    #[test]
    fn run_control_keys() {
        assert_eq!(dispatch(press(KeyCode::Char('s'))), Message::StartRun);
        assert_eq!(dispatch(press(KeyCode::Char('r'))), Message::Rerun);
    }

    #[test]
    fn unknown_key_is_noop() {
        assert_eq!(dispatch(press(KeyCode::Char('z'))), Message::None);
    }
}
