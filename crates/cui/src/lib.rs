//! Terminal front end: one full-screen view over the program stack.

mod actions;
mod app;
mod input;
mod view;

use anyhow::{Context, Result};
use app::App;
use crossterm::event::{self, Event as CEvent, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{execute, ExecutableCommand};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::{self, stdout, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Directory holding `config.json`, `library.json` and `status.json`.
    pub dir: PathBuf,
    pub seed: Option<u64>,
}

pub fn run(options: LaunchOptions) -> Result<()> {
    let mut app = App::bootstrap(&options)?;

    ensure_interactive_terminal()?;

    enable_raw_mode().map_err(|err| {
        anyhow::anyhow!(
            "failed to enable raw mode; ensure the process owns an interactive terminal: {err}"
        )
    })?;
    let mut stdout = stdout();
    stdout
        .execute(EnterAlternateScreen)
        .context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let run_result = run_loop(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;
    app.save().context("save session")?;
    info!("session closed");
    run_result
}

fn run_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(120);
    while !app.should_quit {
        terminal.draw(|frame| view::draw(frame, app))?;
        if event::poll(tick_rate)? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let action = input::map_key(key);
                actions::dispatch(app, action);
            }
        } else {
            app.on_tick();
        }
    }
    Ok(())
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("leave alternate screen")?;
    terminal.show_cursor().context("show cursor")?;
    Ok(())
}

fn ensure_interactive_terminal() -> Result<()> {
    if io::stdin().is_terminal() && io::stdout().is_terminal() {
        return Ok(());
    }
    anyhow::bail!(
        "plib browse requires an interactive TTY (run directly in a terminal, not a piped/headless shell)"
    );
}
