use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use plib_core::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    None,
    Quit,
    ForceQuit,
    ToggleHelp,
    Mode(Key),
}

pub fn map_key(key: KeyEvent) -> InputAction {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            InputAction::ForceQuit
        }
        KeyCode::Char('q') => InputAction::Quit,
        KeyCode::Char('?') => InputAction::ToggleHelp,
        KeyCode::Char(ch) => InputAction::Mode(Key::Char(ch)),
        KeyCode::Enter => InputAction::Mode(Key::Enter),
        KeyCode::Esc => InputAction::Mode(Key::Esc),
        KeyCode::Up => InputAction::Mode(Key::Up),
        KeyCode::Down => InputAction::Mode(Key::Down),
        _ => InputAction::None,
    }
}
