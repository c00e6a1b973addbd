//! Summary screen and layout helpers shared by the other screens.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table},
};

use crate::app::App;

/// Render the summary: coin balances on top, accounts below.
pub fn render_summary(frame: &mut Frame, app: &App) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(4)])
        .split(frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(main_chunks[0]);

    render_coins_panel(frame, app, chunks[0]);
    render_accounts_panel(frame, app, chunks[1]);
    render_status_bar(
        frame,
        app,
        main_chunks[1],
        vec![
            Span::raw("↑↓/k/j: Navigate | "),
            Span::styled("s/Enter", Style::default().fg(Color::Green)),
            Span::raw(": Send | "),
            Span::styled("l", Style::default().fg(Color::Yellow)),
            Span::raw(": Lightning | "),
            Span::styled("r", Style::default().fg(Color::Cyan)),
            Span::raw(": Refresh | "),
            Span::raw("q: Quit"),
        ],
    );
}

fn render_coins_panel(frame: &mut Frame, app: &App, area: Rect) {
    let rows: Vec<Row> = app
        .coin_rows
        .iter()
        .map(|row| {
            let balance = row
                .balance
                .as_ref()
                .map_or_else(|| "---".to_string(), ToString::to_string);
            Row::new(vec![
                Cell::from(row.coin_name.clone()),
                Cell::from(balance),
            ])
        })
        .collect();

    let title = app.fiat_total.as_ref().map_or_else(
        || " Balances ".to_string(),
        |total| format!(" Balances (total {total}) "),
    );

    let table = Table::new(rows, [Constraint::Percentage(50), Constraint::Percentage(50)])
        .header(
            Row::new(vec!["Coin", "Available"])
                .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        )
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        );

    frame.render_widget(table, area);
}

fn render_accounts_panel(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .accounts
        .iter()
        .enumerate()
        .map(|(i, account)| {
            let label = format!("{} ({})", account.name, account.coin_code.ticker());
            let content = if i == app.selected_account {
                Line::from(vec![
                    Span::raw("> "),
                    Span::styled(label, Style::default().add_modifier(Modifier::BOLD)),
                ])
            } else {
                Line::from(format!("  {label}"))
            };
            ListItem::new(content)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Accounts ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    frame.render_widget(list, area);
}

/// Render the status bar (bottom) with screen-specific key help.
pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect, help: Vec<Span<'static>>) {
    let mut status_lines = vec![Line::from(help)];

    if let Some(ref msg) = app.status_message {
        status_lines.push(Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Cyan)),
            Span::raw(msg.clone()),
        ]));
    }

    let status = Paragraph::new(status_lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    frame.render_widget(status, area);
}

/// Border style of an input, highlighted when focused.
pub fn field_style(focused: bool) -> Style {
    if focused {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    }
}

/// Helper to create a centered rect.
pub fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
