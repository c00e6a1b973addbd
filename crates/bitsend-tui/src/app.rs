use anyhow::Result;
use bitsend_core::summary::{CoinRow, coin_rows};
use bitsend_core::{Account, Backend, Config, FeeTargetCode};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Terminal;
use ratatui::backend::Backend as TerminalBackend;
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::event::{Event, EventHandler};
use crate::lightning::{LightningSend, Navigation, SendStep};
use crate::send::SendForm;
use crate::ui;

/// Commands that need the backend and run between frames.
#[derive(Debug, Clone)]
pub enum AppCommand {
    RefreshSummary,
}

/// UI mode - what screen we're showing
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum UiMode {
    /// Coin balances, entry point to both send screens
    #[default]
    Summary,
    /// On-chain send form
    Send,
    /// Lightning payment workflow
    LightningSend,
}

/// Focused input of the send form
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SendField {
    #[default]
    Address,
    Amount,
    Fiat,
    SendAll,
    FeeTarget,
    CustomFee,
    Note,
}

impl SendField {
    const ORDER: [Self; 7] = [
        Self::Address,
        Self::Amount,
        Self::Fiat,
        Self::SendAll,
        Self::FeeTarget,
        Self::CustomFee,
        Self::Note,
    ];

    fn index(self) -> usize {
        Self::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }

    fn next(self) -> Self {
        Self::ORDER[(self.index() + 1) % Self::ORDER.len()]
    }

    fn prev(self) -> Self {
        Self::ORDER[(self.index() + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }
}

/// Application state
pub struct App {
    /// Is the application running
    pub running: bool,
    /// Current UI mode
    pub ui_mode: UiMode,
    backend: Backend,
    config: Config,
    /// Accounts as last loaded
    pub accounts: Vec<Account>,
    /// Per-coin balance rows
    pub coin_rows: Vec<CoinRow>,
    /// Sum of all coin balances in the active currency
    pub fiat_total: Option<String>,
    /// Selected account index
    pub selected_account: usize,
    /// Status message
    pub status_message: Option<String>,
    /// Open send form
    pub send: Option<SendForm>,
    pub send_field: SendField,
    /// Text typed into the payment URI overlay
    pub uri_input: String,
    /// Highlighted row of the coin control panel
    pub utxo_cursor: usize,
    /// Open Lightning screen
    pub lightning: Option<LightningSend>,
    command_tx: mpsc::UnboundedSender<AppCommand>,
    command_rx: mpsc::UnboundedReceiver<AppCommand>,
}

impl App {
    #[must_use]
    pub fn new(config: Config, backend: Backend) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Self {
            running: true,
            ui_mode: UiMode::Summary,
            backend,
            config,
            accounts: Vec::new(),
            coin_rows: Vec::new(),
            fiat_total: None,
            selected_account: 0,
            status_message: None,
            send: None,
            send_field: SendField::default(),
            uri_input: String::new(),
            utxo_cursor: 0,
            lightning: None,
            command_tx,
            command_rx,
        }
    }

    pub fn lightning_enabled(&self) -> bool {
        self.backend.lightning.is_some()
    }

    /// Initialize the app.
    pub async fn init(&mut self) {
        if let Err(e) = self.refresh_summary().await {
            tracing::error!("failed to load accounts: {e}");
            self.status_message = Some(format!("Backend not available: {e}"));
        }
    }

    /// Reload accounts and balances for the summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the account list cannot be loaded
    pub async fn refresh_summary(&mut self) -> Result<()> {
        let accounts = self.backend.accounts.accounts().await?;

        let mut balances = HashMap::new();
        for account in &accounts {
            match self.backend.accounts.get_balance(&account.code).await {
                Ok(balance) => {
                    balances.insert(account.code.clone(), balance);
                }
                Err(e) => tracing::warn!(code = %account.code, "failed to load balance: {e}"),
            }
        }

        self.coin_rows = coin_rows(
            &accounts,
            &balances,
            self.lightning_enabled(),
            self.config.btc_unit,
        );
        self.fiat_total = self.total_in_fiat().await;
        self.selected_account = self
            .selected_account
            .min(accounts.len().saturating_sub(1));
        self.accounts = accounts;
        Ok(())
    }

    async fn total_in_fiat(&self) -> Option<String> {
        let currency = &self.config.active_currency;
        if currency == "BTC" {
            return None;
        }

        let mut total = 0.0;
        for row in &self.coin_rows {
            let Some(balance) = &row.balance else {
                continue;
            };
            let converted = self
                .backend
                .accounts
                .convert_to_currency(&balance.amount, row.coin_code, currency)
                .await
                .ok()?;
            total += converted.parse::<f64>().ok()?;
        }
        Some(format!("{total:.2} {currency}"))
    }

    /// Run the main application loop
    ///
    /// # Errors
    ///
    /// Returns an error if drawing or event handling fails
    pub async fn run<B: TerminalBackend>(
        &mut self,
        terminal: &mut Terminal<B>,
        events: &mut EventHandler,
    ) -> Result<()> {
        while self.running {
            terminal.draw(|frame| ui::render(frame, self))?;

            match events.next().await? {
                Event::Key(key) => self.handle_key(key),
                Event::Paste(text) => self.insert_text(&text),
                Event::Tick | Event::Resize(..) => {}
            }

            self.process_screens();

            while let Ok(cmd) = self.command_rx.try_recv() {
                match cmd {
                    AppCommand::RefreshSummary => {
                        if let Err(e) = self.refresh_summary().await {
                            self.status_message = Some(format!("Failed to refresh: {e}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply the backend results the open screen has received.
    pub fn process_screens(&mut self) {
        if let Some(form) = self.send.as_mut() {
            form.process_pending();
        }
        if let Some(screen) = self.lightning.as_mut() {
            screen.process_pending();
            if screen.exit_requested {
                self.close_screen();
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match self.ui_mode {
            UiMode::Summary => self.handle_summary_key(key.code),
            UiMode::Send => self.handle_send_key(key),
            UiMode::LightningSend => self.handle_lightning_key(key),
        }
    }

    fn handle_summary_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_account = self.selected_account.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let max = self.accounts.len().saturating_sub(1);
                self.selected_account = self.selected_account.saturating_add(1).min(max);
            }
            KeyCode::Enter | KeyCode::Char('s') => self.open_send(),
            KeyCode::Char('l') => self.open_lightning(),
            KeyCode::Char('r') => {
                let _ = self.command_tx.send(AppCommand::RefreshSummary);
            }
            _ => {}
        }
    }

    fn open_send(&mut self) {
        let Some(account) = self.accounts.get(self.selected_account).cloned() else {
            self.status_message = Some("No account selected".to_string());
            return;
        };

        let mut form = SendForm::new(self.backend.clone(), account, &self.config);
        form.init();
        self.send = Some(form);
        self.send_field = SendField::Address;
        self.uri_input.clear();
        self.utxo_cursor = 0;
        self.status_message = None;
        self.ui_mode = UiMode::Send;
    }

    fn open_lightning(&mut self) {
        let Some(lightning) = self.backend.lightning.clone() else {
            self.status_message = Some("Lightning is not configured".to_string());
            return;
        };

        self.lightning = Some(LightningSend::new(lightning, self.config.banner_timeout()));
        self.status_message = None;
        self.ui_mode = UiMode::LightningSend;
    }

    /// Leave the open screen for the summary.
    fn close_screen(&mut self) {
        self.send = None;
        self.lightning = None;
        self.ui_mode = UiMode::Summary;
        let _ = self.command_tx.send(AppCommand::RefreshSummary);
    }

    fn handle_send_key(&mut self, key: KeyEvent) {
        let Some(form) = self.send.as_mut() else {
            return;
        };

        if form.alert.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                form.take_alert();
            }
            return;
        }
        if form.is_confirming {
            return;
        }

        if form.active_scan_qr {
            match key.code {
                KeyCode::Esc => form.toggle_scan_qr(),
                KeyCode::Enter => {
                    let uri = std::mem::take(&mut self.uri_input);
                    form.parse_qr_result(&uri);
                }
                KeyCode::Backspace => {
                    self.uri_input.pop();
                }
                KeyCode::Char('v') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.paste_clipboard();
                }
                KeyCode::Char(c) => self.uri_input.push(c),
                _ => {}
            }
            return;
        }

        if form.active_coin_control {
            match key.code {
                KeyCode::Esc => form.toggle_coin_control(),
                KeyCode::Char('o') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    form.toggle_coin_control();
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    self.utxo_cursor = self.utxo_cursor.saturating_sub(1);
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    let max = form.utxos.len().saturating_sub(1);
                    self.utxo_cursor = self.utxo_cursor.saturating_add(1).min(max);
                }
                KeyCode::Char(' ') | KeyCode::Enter => {
                    if let Some(outpoint) = form.utxos.get(self.utxo_cursor).map(|u| u.outpoint.clone()) {
                        form.toggle_utxo(&outpoint);
                    }
                }
                _ => {}
            }
            return;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('p') => {
                    self.uri_input.clear();
                    form.toggle_scan_qr();
                }
                KeyCode::Char('o') if form.coin_control => {
                    self.utxo_cursor = 0;
                    form.toggle_coin_control();
                }
                KeyCode::Char('v') => self.paste_clipboard(),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Esc => {
                if form.should_leave_on_escape() {
                    self.close_screen();
                }
            }
            KeyCode::Tab | KeyCode::Down => self.send_field = self.send_field.next(),
            KeyCode::BackTab | KeyCode::Up => self.send_field = self.send_field.prev(),
            KeyCode::Enter => {
                if form.can_send() {
                    form.send();
                }
            }
            KeyCode::Left | KeyCode::Right if self.send_field == SendField::FeeTarget => {
                let targets = FeeTargetCode::ALL;
                let current = form
                    .fee_target
                    .and_then(|t| targets.iter().position(|c| *c == t))
                    .unwrap_or(0);
                let next = if key.code == KeyCode::Right {
                    (current + 1) % targets.len()
                } else {
                    (current + targets.len() - 1) % targets.len()
                };
                form.fee_target_change(targets[next]);
            }
            KeyCode::Char(' ') if self.send_field == SendField::SendAll => {
                let send_all = !form.send_all;
                form.on_send_all_change(send_all);
            }
            KeyCode::Char(c) => edit_send_field(form, self.send_field, |value| value.push(c)),
            KeyCode::Backspace => edit_send_field(form, self.send_field, |value| {
                value.pop();
            }),
            _ => {}
        }
    }

    fn handle_lightning_key(&mut self, key: KeyEvent) {
        let Some(screen) = self.lightning.as_mut() else {
            return;
        };

        match (screen.step, key.code) {
            (_, KeyCode::Esc) => {
                if screen.back() == Navigation::Leave {
                    self.close_screen();
                }
            }
            (SendStep::SelectInvoice, KeyCode::Enter) => screen.parse_input(),
            (SendStep::SelectInvoice, KeyCode::Char('v'))
                if key.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                self.paste_clipboard();
            }
            (SendStep::SelectInvoice, KeyCode::Char(c)) => screen.raw_input.push(c),
            (SendStep::SelectInvoice, KeyCode::Backspace) => {
                screen.raw_input.pop();
            }
            (SendStep::Confirm, KeyCode::Enter) => screen.send_payment(),
            (SendStep::Success, KeyCode::Enter) => {
                screen.back();
            }
            _ => {}
        }
    }

    fn paste_clipboard(&mut self) {
        match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.get_text()) {
            Ok(text) => self.insert_text(&text),
            Err(e) => {
                tracing::warn!("clipboard unavailable: {e}");
                self.status_message = Some("Clipboard unavailable".to_string());
            }
        }
    }

    /// Insert pasted text into whatever input has focus.
    pub fn insert_text(&mut self, text: &str) {
        let text = text.trim();
        match self.ui_mode {
            UiMode::Send => {
                let Some(form) = self.send.as_mut() else {
                    return;
                };
                if form.active_scan_qr {
                    self.uri_input.push_str(text);
                } else if !form.active_coin_control && !form.is_confirming {
                    edit_send_field(form, self.send_field, |value| value.push_str(text));
                }
            }
            UiMode::LightningSend => {
                if let Some(screen) = self
                    .lightning
                    .as_mut()
                    .filter(|screen| screen.step == SendStep::SelectInvoice)
                {
                    let input = format!("{}{text}", screen.raw_input);
                    screen.set_raw_input(&input);
                }
            }
            UiMode::Summary => {}
        }
    }
}

/// Apply `edit` to the text behind `field` and notify the form.
fn edit_send_field(form: &mut SendForm, field: SendField, edit: impl FnOnce(&mut String)) {
    match field {
        SendField::Address => {
            let mut value = form.recipient_address.clone();
            edit(&mut value);
            form.on_address_change(&value);
        }
        SendField::Amount if !form.send_all => {
            let mut value = form.amount.clone();
            edit(&mut value);
            form.on_coin_amount_change(&value);
        }
        SendField::Fiat if !form.send_all => {
            let mut value = form.fiat_amount.clone();
            edit(&mut value);
            form.on_fiat_input(&value);
        }
        SendField::CustomFee if form.fee_target == Some(FeeTargetCode::Custom) => {
            let mut value = form.custom_fee.clone();
            edit(&mut value);
            form.set_custom_fee(&value);
        }
        SendField::Note => {
            let mut value = form.note.clone();
            edit(&mut value);
            form.on_note_change(&value);
        }
        _ => {}
    }
}
