//! Keyboard input processing for the TUI.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Input action from keyboard events. Keys that map to no action fall
/// through to the input line editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Submit the input line.
    Submit,
    /// Stop the active reply stream.
    Stop,
    /// Quit the application.
    Quit,
    /// Start a fresh conversation.
    NewChat,
    /// Scroll the transcript up one line.
    ScrollUp,
    /// Scroll the transcript down one line.
    ScrollDown,
    /// Page up through the transcript.
    PageUp,
    /// Page down through the transcript.
    PageDown,
}

/// Convert a key event to an action. `is_streaming` changes what Esc
/// means: stop the stream while one is active, otherwise nothing.
pub fn key_to_action(key: KeyEvent, is_streaming: bool) -> Option<InputAction> {
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) if is_streaming => Some(InputAction::Stop),
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(InputAction::Quit),
        (KeyCode::Char('d'), KeyModifiers::CONTROL) => Some(InputAction::Quit),
        (KeyCode::Esc, _) if is_streaming => Some(InputAction::Stop),

        (KeyCode::Enter, KeyModifiers::NONE) => Some(InputAction::Submit),
        (KeyCode::Char('n'), KeyModifiers::CONTROL) => Some(InputAction::NewChat),

        (KeyCode::Up, KeyModifiers::NONE) => Some(InputAction::ScrollUp),
        (KeyCode::Down, KeyModifiers::NONE) => Some(InputAction::ScrollDown),
        (KeyCode::PageUp, _) => Some(InputAction::PageUp),
        (KeyCode::PageDown, _) => Some(InputAction::PageDown),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_esc_stops_only_while_streaming() {
        assert_eq!(
            key_to_action(key(KeyCode::Esc, KeyModifiers::NONE), true),
            Some(InputAction::Stop)
        );
        assert_eq!(key_to_action(key(KeyCode::Esc, KeyModifiers::NONE), false), None);
    }

    #[test]
    fn test_ctrl_c_stops_stream_then_quits() {
        let ctrl_c = key(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(key_to_action(ctrl_c, true), Some(InputAction::Stop));
        assert_eq!(key_to_action(ctrl_c, false), Some(InputAction::Quit));
    }

    #[test]
    fn test_plain_characters_fall_through_to_editor() {
        assert_eq!(key_to_action(key(KeyCode::Char('h'), KeyModifiers::NONE), false), None);
        assert_eq!(
            key_to_action(key(KeyCode::Backspace, KeyModifiers::NONE), false),
            None
        );
    }

    #[test]
    fn test_enter_submits() {
        assert_eq!(
            key_to_action(key(KeyCode::Enter, KeyModifiers::NONE), false),
            Some(InputAction::Submit)
        );
    }
}
