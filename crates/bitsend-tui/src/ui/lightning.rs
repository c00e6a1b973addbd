//! Lightning send workflow.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use tokio::time::Instant;

use super::layout::{centered_rect, field_style, render_status_bar};
use crate::app::App;
use crate::lightning::{LightningSend, SendStep};

pub fn render(frame: &mut Frame, app: &App) {
    let Some(screen) = app.lightning.as_ref() else {
        return;
    };

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(4)])
        .split(frame.area());

    let area = centered_rect(85, 70, main_chunks[0]);
    let (title, lines, help) = match screen.step {
        SendStep::SelectInvoice => (" Send Lightning Payment ", select_invoice(screen), "Enter: Continue | ^V: Paste | Esc: Back"),
        SendStep::Confirm => (" Confirm Payment ", confirm(screen), "Enter: Send | Esc: Back"),
        SendStep::Sending => (" Sending ", sending(screen), ""),
        SendStep::Success => (" Payment Sent ", success(), "Enter/Esc: New payment"),
    };

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);

    render_status_bar(frame, app, main_chunks[1], vec![Span::raw(help)]);
}

fn select_invoice(screen: &LightningSend) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    if let Some(error) = &screen.send_error {
        lines.push(Line::from(Span::styled(
            format!("⚠ {error}"),
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )));
        lines.push(Line::from(""));
    }

    lines.push(Line::from(vec![
        Span::styled("Invoice: ", field_style(true)),
        Span::raw(screen.raw_input.clone()),
        Span::styled("_", Style::default().fg(Color::Yellow)),
    ]));
    if let Some(error) = &screen.raw_input_error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    }
    lines
}

fn confirm(screen: &LightningSend) -> Vec<Line<'static>> {
    let Some(invoice) = screen.invoice() else {
        return vec![Line::from("No invoice")];
    };

    let mut lines = vec![Line::from(vec![
        Span::styled("Amount: ", Style::default().fg(Color::Cyan)),
        Span::styled(
            format!("{} sats", invoice.amount_sat()),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
    ])];
    if let Some(description) = &invoice.description {
        lines.push(Line::from(vec![
            Span::styled("Memo:   ", Style::default().fg(Color::Cyan)),
            Span::raw(description.clone()),
        ]));
    }
    lines
}

fn sending(screen: &LightningSend) -> Vec<Line<'static>> {
    vec![Line::from(Span::styled(
        screen.spinner_text(Instant::now()),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
    ))]
}

fn success() -> Vec<Line<'static>> {
    vec![Line::from(Span::styled(
        "Payment sent successfully",
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
    ))]
}
