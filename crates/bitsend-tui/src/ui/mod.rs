//! Screen rendering.

mod layout;
mod lightning;
mod send;

use ratatui::Frame;

use crate::app::{App, UiMode};

/// Render the entire UI.
pub fn render(frame: &mut Frame, app: &App) {
    match app.ui_mode {
        UiMode::Summary => layout::render_summary(frame, app),
        UiMode::Send => send::render(frame, app),
        UiMode::LightningSend => lightning::render(frame, app),
    }
}
