//! Terminal user interface for bitsend.

pub mod app;
pub mod event;
pub mod lightning;
pub mod send;
mod ui;

use std::io;
use std::time::Duration;

use anyhow::Result;
use bitsend_core::Config;
use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

pub use app::App;
pub use lightning::{LightningSend, Navigation, SendStep};
pub use send::{ProposalQueue, SendForm};

const TICK_RATE: Duration = Duration::from_millis(100);

/// Run the terminal UI against the regtest backend described by `config`.
///
/// # Errors
///
/// Returns an error if the backend cannot be reached or the terminal fails
pub async fn run(config: Config) -> Result<()> {
    let backend = bitsend_nodes::regtest_backend(&config)?;
    let mut app = App::new(config, backend);
    app.init().await;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut events = event::EventHandler::new(TICK_RATE);
    let result = app.run(&mut terminal, &mut events).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    result
}
