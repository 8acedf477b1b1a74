//! Terminal client.

mod app;
mod commands;
mod input;
mod ui;

pub use app::App;

use std::io::stdout;
use std::sync::mpsc::Receiver;

use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use gridshare_core::TransportEvent;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

/// Restores the terminal however the event loop ends.
struct Cleanup;

impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = stdout().execute(DisableMouseCapture);
        let _ = stdout().execute(LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Take over the terminal and run until the user quits.
pub fn run(app: &mut App, live: &Receiver<TransportEvent>) -> anyhow::Result<()> {
    terminal::enable_raw_mode()?;
    let _cleanup = Cleanup;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableMouseCapture)?;

    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    input::run_app(&mut terminal, app, live)?;
    Ok(())
}
