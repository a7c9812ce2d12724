use crate::app::App;
use crate::input::InputAction;
use plib_core::Key;

pub fn dispatch(app: &mut App, action: InputAction) {
    match action {
        InputAction::None => {}
        InputAction::ForceQuit => app.should_quit = true,
        // Modes above the base may need the letter, e.g. as a token.
        InputAction::Quit if app.depth() > 1 => app.handle_key(Key::Char('q')),
        InputAction::Quit => app.should_quit = true,
        InputAction::ToggleHelp => app.show_help = !app.show_help,
        InputAction::Mode(Key::Esc) if app.show_help => app.show_help = false,
        InputAction::Mode(key) => app.handle_key(key),
    }
}
