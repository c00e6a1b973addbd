//! On-chain send form.

use bitsend_core::FeeTargetCode;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use super::layout::{centered_rect, field_style, render_status_bar};
use crate::app::{App, SendField};
use crate::send::SendForm;

pub fn render(frame: &mut Frame, app: &App) {
    let Some(form) = app.send.as_ref() else {
        return;
    };

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(4)])
        .split(frame.area());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(main_chunks[0]);

    render_fields(frame, app, form, chunks[0]);
    render_proposal(frame, form, chunks[1]);

    let mut help = vec![
        Span::raw("Tab/↑↓: Field | "),
        Span::styled("Enter", Style::default().fg(Color::Green)),
        Span::raw(": Send | "),
        Span::styled("^P", Style::default().fg(Color::Cyan)),
        Span::raw(": Payment URI | "),
    ];
    if form.coin_control {
        help.push(Span::styled("^O", Style::default().fg(Color::Cyan)));
        help.push(Span::raw(": Coin control | "));
    }
    help.push(Span::styled("^V", Style::default().fg(Color::Cyan)));
    help.push(Span::raw(": Paste | Esc: Back"));
    render_status_bar(frame, app, main_chunks[1], help);

    if form.active_coin_control {
        render_coin_control(frame, app, form);
    }
    if form.active_scan_qr {
        render_uri_input(frame, app);
    }
    if form.is_confirming {
        render_confirming(frame, form);
    }
    if form.is_sent {
        render_banner(frame, " Sent ", "Your transaction was sent.", Color::Green);
    }
    if form.is_aborted {
        render_banner(frame, " Aborted ", "The transaction was aborted.", Color::Yellow);
    }
    if let Some(alert) = &form.alert {
        render_banner(frame, " Alert ", alert, Color::Red);
    }
}

fn input_line(label: &str, value: &str, focused: bool, suffix: &str) -> Line<'static> {
    let mut spans = vec![
        Span::styled(format!("{label:<14}"), field_style(focused)),
        Span::raw(value.to_string()),
    ];
    if focused {
        spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
    }
    if !suffix.is_empty() {
        spans.push(Span::styled(
            format!(" {suffix}"),
            Style::default().fg(Color::DarkGray),
        ));
    }
    Line::from(spans)
}

fn error_line(error: Option<&String>) -> Option<Line<'static>> {
    error.map(|e| {
        Line::from(Span::styled(
            format!("              {e}"),
            Style::default().fg(Color::Red),
        ))
    })
}

fn render_fields(frame: &mut Frame, app: &App, form: &SendForm, area: Rect) {
    let focused = |field: SendField| app.send_field == field;
    let coin_unit = form.balance.as_ref().map_or_else(
        || form.btc_unit.label(form.account.coin_code.ticker()),
        |balance| balance.available.unit.clone(),
    );

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Balance:      ", Style::default().fg(Color::Cyan)),
            Span::raw(
                form.balance
                    .as_ref()
                    .map_or_else(|| "loading...".to_string(), |b| b.available.to_string()),
            ),
        ]),
        Line::from(""),
        input_line(
            "Address:",
            &form.recipient_address,
            focused(SendField::Address),
            "",
        ),
    ];
    lines.extend(error_line(form.errors.address.as_ref()));

    let amount = if form.send_all {
        form.proposed_amount
            .as_ref()
            .map_or_else(String::new, |a| a.amount.clone())
    } else {
        form.amount.clone()
    };
    lines.push(input_line(
        "Amount:",
        &amount,
        focused(SendField::Amount),
        &coin_unit,
    ));
    lines.extend(error_line(form.errors.amount.as_ref()));
    lines.push(input_line(
        "Fiat:",
        &form.fiat_amount,
        focused(SendField::Fiat),
        &form.base_currency_unit(),
    ));
    lines.push(Line::from(vec![
        Span::styled("Send all:     ", field_style(focused(SendField::SendAll))),
        Span::raw(if form.send_all { "[x]" } else { "[ ]" }),
        Span::styled("  (space)", Style::default().fg(Color::DarkGray)),
    ]));

    let target = form.fee_target.map_or("-", FeeTargetCode::label);
    lines.push(Line::from(vec![
        Span::styled("Fee:          ", field_style(focused(SendField::FeeTarget))),
        Span::styled("< ", Style::default().fg(Color::DarkGray)),
        Span::raw(target),
        Span::styled(" >  (use ←/→)", Style::default().fg(Color::DarkGray)),
    ]));
    if form.fee_target == Some(FeeTargetCode::Custom) {
        lines.push(input_line(
            "Fee rate:",
            &form.custom_fee,
            focused(SendField::CustomFee),
            "sat/vB",
        ));
    }
    lines.extend(error_line(form.errors.fee.as_ref()));
    lines.push(input_line("Note:", &form.note, focused(SendField::Note), ""));

    if !form.selected_utxos.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("{} coins selected", form.selected_utxos.len()),
            Style::default().fg(Color::Magenta),
        )));
    }

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(format!(" Send from {} ", form.account.name))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_proposal(frame: &mut Frame, form: &SendForm, area: Rect) {
    let row = |label: &'static str, value: Option<String>| {
        Line::from(vec![
            Span::styled(label, Style::default().fg(Color::Cyan)),
            Span::raw(value.unwrap_or_else(|| "-".to_string())),
        ])
    };

    let mut lines = vec![
        row("Amount: ", form.proposed_amount.as_ref().map(ToString::to_string)),
        row("Fee:    ", form.proposed_fee.as_ref().map(ToString::to_string)),
        row("Total:  ", form.proposed_total.as_ref().map(ToString::to_string)),
        Line::from(""),
    ];
    if form.is_updating_proposal {
        lines.push(Line::from(Span::styled(
            "Updating proposal...",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    } else if form.can_send() {
        lines.push(Line::from(Span::styled(
            "Ready to send (Enter)",
            Style::default().fg(Color::Green),
        )));
    }
    if form.paired {
        lines.push(Line::from(Span::styled(
            "Paired with mobile app",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .title(" Proposal ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    frame.render_widget(paragraph, area);
}

fn render_coin_control(frame: &mut Frame, app: &App, form: &SendForm) {
    let area = centered_rect(80, 60, frame.area());
    frame.render_widget(Clear, area);

    let items: Vec<ListItem> = form
        .utxos
        .iter()
        .enumerate()
        .map(|(i, utxo)| {
            let mark = if form.selected_utxos.contains(&utxo.outpoint) {
                "[x]"
            } else {
                "[ ]"
            };
            let cursor = if i == app.utxo_cursor { "> " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{cursor}{mark} ")),
                Span::styled(utxo.amount.to_string(), Style::default().fg(Color::Green)),
                Span::raw(format!("  {}", utxo.address)),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Coin control (space: select, Esc: close) ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );
    frame.render_widget(list, area);
}

fn render_uri_input(frame: &mut Frame, app: &App) {
    let area = centered_rect(70, 20, frame.area());
    frame.render_widget(Clear, area);

    let paragraph = Paragraph::new(vec![
        input_line("URI:", &app.uri_input, true, ""),
        Line::from(Span::styled(
            "bitcoin:<address>?amount=<btc>   Enter: apply | Esc: cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .block(
        Block::default()
            .title(" Payment URI ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    )
    .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_confirming(frame: &mut Frame, form: &SendForm) {
    let area = centered_rect(60, 30, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Address: ", Style::default().fg(Color::Cyan)),
            Span::raw(form.recipient_address.clone()),
        ]),
        Line::from(vec![
            Span::styled("Total:   ", Style::default().fg(Color::Cyan)),
            Span::raw(
                form.proposed_total
                    .as_ref()
                    .map_or_else(String::new, ToString::to_string),
            ),
        ]),
        Line::from(""),
    ];
    if let Some(progress) = form.sign_progress {
        lines.push(Line::from(format!(
            "Signing {}/{}...",
            progress.step + 1,
            progress.steps
        )));
    }
    if form.sign_confirm {
        lines.push(Line::from(Span::styled(
            "Confirm the transaction on your device",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
    }

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .title(" Confirm transaction ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    frame.render_widget(paragraph, area);
}

fn render_banner(frame: &mut Frame, title: &str, message: &str, color: Color) {
    let area = centered_rect(60, 20, frame.area());
    frame.render_widget(Clear, area);

    let paragraph = Paragraph::new(message.to_string())
        .style(Style::default().fg(color))
        .block(
            Block::default()
                .title(title.to_string())
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}
