//! On-chain send form.
//!
//! The form owns its view state and a message receiver. Every backend call
//! runs in a spawned task that reports back over the form's channel; the
//! UI loop applies those messages with [`SendForm::process_pending`].

use std::time::Duration;

use bitsend_core::uri::{PaymentRequest, parse_payment_uri};
use bitsend_core::{
    Account, Amount, Backend, BackendEvent, Balance, BtcUnit, Config, DeviceKind, FeeTargetCode,
    ProposalErrors, SendResult, SignProgress, TxInput, TxProposalResult, Utxo,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Amount error shown when a conversion fails.
pub const INVALID_AMOUNT: &str = "invalid amount";

/// Alert shown when a paired BitBox has no mobile channel.
pub const PAIRING_ALERT: &str =
    "Please pair your BitBox with the mobile app before sending a transaction";

/// Alert shown for a scanned URI with an unsupported scheme.
pub const INVALID_FORMAT_ALERT: &str = "invalid format";

/// Identities of issued proposal requests, oldest first.
///
/// Only the newest request may update the form. A response that arrives
/// while a newer request is outstanding is dropped.
#[derive(Debug, Default)]
pub struct ProposalQueue {
    pending: Vec<u64>,
    next_id: u64,
}

impl ProposalQueue {
    /// Record a new request and return its id.
    pub fn issue(&mut self) -> u64 {
        self.next_id += 1;
        self.pending.push(self.next_id);
        self.next_id
    }

    /// Settle request `id`, returning whether its response should be
    /// applied.
    ///
    /// Applying the newest request also retires every older one, so a
    /// slower response can never overwrite it later.
    pub fn settle(&mut self, id: u64) -> bool {
        if self.pending.last() == Some(&id) {
            self.pending.clear();
            true
        } else {
            self.pending.retain(|pending| *pending != id);
            false
        }
    }

    /// Forget request `id` after a failure. Returns whether it was the
    /// newest.
    pub fn fail(&mut self, id: u64) -> bool {
        let latest = self.pending.last() == Some(&id);
        self.pending.retain(|pending| *pending != id);
        latest
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Results reported back to the form by its background tasks.
#[derive(Debug)]
pub enum SendMessage {
    BalanceLoaded(Balance),
    Pairing {
        paired: bool,
        no_mobile_channel_error: bool,
    },
    UtxosLoaded(Vec<Utxo>),
    /// The debounce window of generation `generation` elapsed.
    ProposalDue {
        generation: u64,
        input: TxInput,
        update_fiat: bool,
    },
    ProposalSettled {
        id: u64,
        update_fiat: bool,
        result: bitsend_core::Result<TxProposalResult>,
    },
    FiatConverted(Option<String>),
    CoinConverted(Option<String>),
    QrParsed {
        request: PaymentRequest,
        /// The amount in the account's unit, `None` if it did not parse.
        amount: Option<String>,
    },
    Confirming,
    SendFinished(bitsend_core::Result<SendResult>),
    SentDismissed,
    AbortDismissed,
    Event(BackendEvent),
}

/// State of the on-chain send screen for one account.
pub struct SendForm {
    backend: Backend,
    pub account: Account,

    pub balance: Option<Balance>,
    pub proposed_fee: Option<Amount>,
    pub proposed_amount: Option<Amount>,
    pub proposed_total: Option<Amount>,
    pub recipient_address: String,
    pub valid: bool,
    pub amount: String,
    pub fiat_amount: String,
    pub fiat_unit: String,
    pub send_all: bool,
    pub fee_target: Option<FeeTargetCode>,
    pub custom_fee: String,
    pub note: String,

    pub is_confirming: bool,
    pub is_sent: bool,
    pub is_aborted: bool,
    pub is_updating_proposal: bool,
    pub errors: ProposalErrors,
    pub alert: Option<String>,

    pub paired: bool,
    pub no_mobile_channel_error: bool,
    pub sign_progress: Option<SignProgress>,
    pub sign_confirm: bool,

    pub coin_control: bool,
    pub btc_unit: BtcUnit,
    pub active_coin_control: bool,
    pub active_scan_qr: bool,
    pub utxos: Vec<Utxo>,
    pub selected_utxos: Vec<String>,

    proposals: ProposalQueue,
    debounce: Duration,
    debounce_generation: u64,
    debounce_timer: Option<JoinHandle<()>>,
    banner_timeout: Duration,
    banner_timer: Option<JoinHandle<()>>,
    forwarder: Option<JoinHandle<()>>,

    tx: mpsc::UnboundedSender<SendMessage>,
    rx: mpsc::UnboundedReceiver<SendMessage>,
}

impl SendForm {
    pub fn new(backend: Backend, account: Account, config: &Config) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let bitcoin_based = account.coin_code.is_bitcoin_based();

        Self {
            backend,
            account,
            balance: None,
            proposed_fee: None,
            proposed_amount: None,
            proposed_total: None,
            recipient_address: String::new(),
            valid: false,
            amount: String::new(),
            fiat_amount: String::new(),
            fiat_unit: config.active_currency.clone(),
            send_all: false,
            fee_target: None,
            custom_fee: String::new(),
            note: String::new(),
            is_confirming: false,
            is_sent: false,
            is_aborted: false,
            is_updating_proposal: false,
            errors: ProposalErrors::default(),
            alert: None,
            paired: false,
            no_mobile_channel_error: false,
            sign_progress: None,
            sign_confirm: false,
            coin_control: config.coin_control && bitcoin_based,
            btc_unit: config.btc_unit,
            active_coin_control: false,
            active_scan_qr: false,
            utxos: Vec::new(),
            selected_utxos: Vec::new(),
            proposals: ProposalQueue::default(),
            debounce: config.proposal_debounce(),
            debounce_generation: 0,
            debounce_timer: None,
            banner_timeout: config.banner_timeout(),
            banner_timer: None,
            forwarder: None,
            tx,
            rx,
        }
    }

    /// Load the balance and pairing state and subscribe to backend events.
    pub fn init(&mut self) {
        self.load_balance();
        self.load_pairing();
        self.fee_target_change(FeeTargetCode::Normal);

        let mut subscription = self.backend.events.subscribe();
        let tx = self.tx.clone();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if tx.send(SendMessage::Event(event)).is_err() {
                    break;
                }
            }
        }));
    }

    fn load_balance(&self) {
        let accounts = self.backend.accounts.clone();
        let code = self.account.code.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match accounts.get_balance(&code).await {
                Ok(balance) => {
                    let _ = tx.send(SendMessage::BalanceLoaded(balance));
                }
                Err(e) => tracing::warn!(%code, "failed to load balance: {e}"),
            }
        });
    }

    fn load_pairing(&self) {
        let devices = self.backend.devices.clone();
        let bitcoin_based = self.account.coin_code.is_bitcoin_based();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let device = match devices.devices().await {
                Ok(list) => list.into_iter().next(),
                Err(e) => {
                    tracing::warn!("failed to list devices: {e}");
                    return;
                }
            };
            let Some(device) = device.filter(|d| d.kind == DeviceKind::BitBox01) else {
                return;
            };

            let mobile_channel = devices.has_mobile_channel(&device.id).await;
            let info = devices.get_device_info(&device.id).await;
            match (mobile_channel, info) {
                (Ok(mobile_channel), Ok(info)) => {
                    let _ = tx.send(SendMessage::Pairing {
                        paired: mobile_channel && info.pairing,
                        no_mobile_channel_error: info.pairing && !mobile_channel && bitcoin_based,
                    });
                }
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(device = %device.id, "failed to query pairing: {e}");
                }
            }
        });
    }

    /// Proposal input for the current form, if it is complete.
    pub fn valid_tx_input(&self) -> Option<TxInput> {
        let fee_target = self.fee_target?;
        if self.recipient_address.is_empty()
            || (!self.send_all && self.amount.is_empty())
            || (fee_target == FeeTargetCode::Custom && self.custom_fee.is_empty())
        {
            return None;
        }

        Some(TxInput {
            address: self.recipient_address.clone(),
            amount: self.amount.clone(),
            fee_target,
            custom_fee: self.custom_fee.clone(),
            send_all: self.send_all,
            selected_utxos: self.selected_utxos.clone(),
        })
    }

    /// Request a new proposal once input has been quiet for the debounce
    /// window.
    pub fn validate_and_display_fee(&mut self, update_fiat: bool) {
        self.proposed_total = None;
        self.errors.address = None;
        self.errors.amount = None;
        self.errors.fee = None;

        self.cancel_debounce();
        let Some(input) = self.valid_tx_input() else {
            self.proposals.clear();
            self.valid = false;
            self.is_updating_proposal = false;
            return;
        };

        self.is_updating_proposal = true;
        let generation = self.debounce_generation;
        let delay = self.debounce;
        let tx = self.tx.clone();
        self.debounce_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SendMessage::ProposalDue {
                generation,
                input,
                update_fiat,
            });
        }));
    }

    fn cancel_debounce(&mut self) {
        if let Some(timer) = self.debounce_timer.take() {
            timer.abort();
        }
        self.debounce_generation += 1;
    }

    fn issue_proposal(&mut self, input: TxInput, update_fiat: bool) {
        let id = self.proposals.issue();
        tracing::debug!(id, pending = self.proposals.len(), "proposing transaction");

        let accounts = self.backend.accounts.clone();
        let code = self.account.code.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = accounts.propose_tx(&code, &input).await;
            let _ = tx.send(SendMessage::ProposalSettled {
                id,
                update_fiat,
                result,
            });
        });
    }

    fn apply_proposal(&mut self, result: TxProposalResult, update_fiat: bool) {
        self.valid = result.is_ok();
        self.is_updating_proposal = false;
        match result {
            Ok(proposal) => {
                self.errors = ProposalErrors::default();
                let amount = proposal.amount.amount.clone();
                self.proposed_fee = Some(proposal.fee);
                self.proposed_amount = Some(proposal.amount);
                self.proposed_total = Some(proposal.total);
                if update_fiat {
                    self.convert_to_fiat(&amount);
                }
            }
            Err(code) => {
                let errors = ProposalErrors::from_code(&code);
                if let Some(alert) = errors.alert.clone() {
                    self.alert = Some(alert);
                }
                self.errors = errors;
            }
        }
    }

    pub fn on_address_change(&mut self, address: &str) {
        self.recipient_address = address.to_string();
        self.validate_and_display_fee(true);
    }

    pub fn on_coin_amount_change(&mut self, amount: &str) {
        self.amount = amount.to_string();
        self.convert_to_fiat(amount);
        self.validate_and_display_fee(true);
    }

    pub fn on_send_all_change(&mut self, send_all: bool) {
        self.send_all = send_all;
        if !send_all {
            let amount = self.amount.clone();
            self.convert_to_fiat(&amount);
        }
        self.validate_and_display_fee(true);
    }

    pub fn on_fiat_input(&mut self, fiat: &str) {
        self.fiat_amount = fiat.to_string();
        if fiat.is_empty() {
            self.amount.clear();
            return;
        }

        let accounts = self.backend.accounts.clone();
        let (amount, coin, unit) = (fiat.to_string(), self.account.coin_code, self.fiat_unit.clone());
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let converted = accounts.convert_from_currency(&amount, coin, &unit).await;
            if let Err(e) = &converted {
                tracing::debug!(%amount, %unit, "fiat conversion failed: {e}");
            }
            let _ = tx.send(SendMessage::CoinConverted(converted.ok()));
        });
    }

    /// Convert `amount` to the fiat unit; an empty amount clears the fiat
    /// field.
    pub fn convert_to_fiat(&mut self, amount: &str) {
        if amount.is_empty() {
            self.fiat_amount.clear();
            return;
        }

        let accounts = self.backend.accounts.clone();
        let (amount, coin, unit) = (amount.to_string(), self.account.coin_code, self.fiat_unit.clone());
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let converted = accounts.convert_to_currency(&amount, coin, &unit).await;
            if let Err(e) = &converted {
                tracing::debug!(%amount, %unit, "coin conversion failed: {e}");
            }
            let _ = tx.send(SendMessage::FiatConverted(converted.ok()));
        });
    }

    pub fn fee_target_change(&mut self, fee_target: FeeTargetCode) {
        self.fee_target = Some(fee_target);
        self.custom_fee.clear();
        self.validate_and_display_fee(self.send_all);
    }

    pub fn set_custom_fee(&mut self, custom_fee: &str) {
        self.custom_fee = custom_fee.to_string();
        self.validate_and_display_fee(true);
    }

    pub fn on_selected_utxos_change(&mut self, selected: Vec<String>) {
        self.selected_utxos = selected;
        self.validate_and_display_fee(true);
    }

    /// Select or deselect one coin in the coin control panel.
    pub fn toggle_utxo(&mut self, outpoint: &str) {
        let mut selected = self.selected_utxos.clone();
        if let Some(pos) = selected.iter().position(|o| o == outpoint) {
            selected.remove(pos);
        } else {
            selected.push(outpoint.to_string());
        }
        self.on_selected_utxos_change(selected);
    }

    /// Open or close the coin control panel. Closing drops the selection.
    pub fn toggle_coin_control(&mut self) {
        if self.active_coin_control {
            self.selected_utxos.clear();
        } else {
            let accounts = self.backend.accounts.clone();
            let code = self.account.code.clone();
            let tx = self.tx.clone();
            tokio::spawn(async move {
                match accounts.get_utxos(&code).await {
                    Ok(utxos) => {
                        let _ = tx.send(SendMessage::UtxosLoaded(utxos));
                    }
                    Err(e) => tracing::warn!(%code, "failed to load utxos: {e}"),
                }
            });
        }
        self.active_coin_control = !self.active_coin_control;
    }

    pub fn toggle_scan_qr(&mut self) {
        self.active_scan_qr = !self.active_scan_qr;
    }

    /// Fill the form from a scanned or pasted payment URI.
    pub fn parse_qr_result(&mut self, uri: &str) {
        self.active_scan_qr = false;
        let request = match parse_payment_uri(uri, self.account.coin_code.is_bitcoin_based()) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("rejected payment uri: {e}");
                self.alert = Some(INVALID_FORMAT_ALERT.to_string());
                return;
            }
        };

        match request.amount.clone() {
            Some(amount) if self.account.coin_code.is_btc_family() => {
                let accounts = self.backend.accounts.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let parsed = accounts.parse_external_btc_amount(&amount).await;
                    if let Err(e) = &parsed {
                        tracing::debug!(%amount, "external amount rejected: {e}");
                    }
                    let _ = tx.send(SendMessage::QrParsed {
                        request,
                        amount: parsed.ok(),
                    });
                });
            }
            amount => self.apply_payment_request(request, amount),
        }
    }

    /// Take the address and, when the URI carried one, the amount. An amount
    /// already typed survives a URI without one.
    fn apply_payment_request(&mut self, request: PaymentRequest, amount: Option<String>) {
        self.recipient_address = request.address;
        self.send_all = false;
        self.fiat_amount.clear();

        if let Some(amount) = amount {
            self.amount = amount;
        }
        let amount = self.amount.clone();
        self.convert_to_fiat(&amount);
        self.validate_and_display_fee(true);
    }

    fn reject_payment_amount(&mut self, request: PaymentRequest) {
        self.recipient_address = request.address;
        self.send_all = false;
        self.fiat_amount.clear();
        self.errors.amount = Some(INVALID_AMOUNT.to_string());
    }

    pub fn on_note_change(&mut self, note: &str) {
        self.note = note.to_string();

        let accounts = self.backend.accounts.clone();
        let code = self.account.code.clone();
        let note = note.to_string();
        tokio::spawn(async move {
            if let Err(e) = accounts.propose_tx_note(&code, &note).await {
                tracing::warn!(%code, "failed to store note: {e}");
            }
        });
    }

    /// Unlock the keystore, then sign and broadcast the current proposal.
    pub fn send(&mut self) {
        if self.no_mobile_channel_error {
            self.alert = Some(PAIRING_ALERT.to_string());
            return;
        }

        let accounts = self.backend.accounts.clone();
        let code = self.account.code.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match accounts.connect_keystore(&code).await {
                Ok(connected) if connected.success => {}
                Ok(_) => {
                    tracing::info!(%code, "keystore not connected, send cancelled");
                    return;
                }
                Err(e) => {
                    tracing::warn!(%code, "failed to connect keystore: {e}");
                    return;
                }
            }

            let _ = tx.send(SendMessage::Confirming);
            let result = accounts.send_tx(&code).await;
            let _ = tx.send(SendMessage::SendFinished(result));
        });
    }

    fn finish_send(&mut self, result: bitsend_core::Result<SendResult>) {
        match result {
            Ok(SendResult::Success { txid }) => {
                tracing::info!(code = %self.account.code, %txid, "sent");
                self.clear_form();
                self.is_sent = true;
                self.start_banner(SendMessage::SentDismissed);
            }
            Ok(SendResult::Aborted) => {
                self.is_aborted = true;
                self.start_banner(SendMessage::AbortDismissed);
            }
            Ok(failed) => self.alert = failed.failure_message(),
            Err(e) => {
                tracing::error!(code = %self.account.code, "send failed: {e}");
                self.alert = Some(format!("An unknown error occurred: {e}"));
            }
        }
        self.is_confirming = false;
        self.sign_progress = None;
        self.sign_confirm = false;
    }

    fn clear_form(&mut self) {
        self.recipient_address.clear();
        self.proposed_amount = None;
        self.proposed_fee = None;
        self.proposed_total = None;
        self.fiat_amount.clear();
        self.amount.clear();
        self.note.clear();
        self.custom_fee.clear();
        self.send_all = false;
        self.selected_utxos.clear();
    }

    fn start_banner(&mut self, dismiss: SendMessage) {
        if let Some(timer) = self.banner_timer.take() {
            timer.abort();
        }
        let delay = self.banner_timeout;
        let tx = self.tx.clone();
        self.banner_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(dismiss);
        }));
    }

    pub fn can_send(&self) -> bool {
        self.valid_tx_input().is_some() && self.valid && !self.is_updating_proposal
    }

    /// Escape leaves the screen unless a panel is open on top of the form.
    pub fn should_leave_on_escape(&self) -> bool {
        !self.active_coin_control && !self.active_scan_qr
    }

    /// Unit the fiat field is labelled with.
    pub fn base_currency_unit(&self) -> String {
        if self.fiat_unit == "BTC" && self.btc_unit == BtcUnit::Sat {
            "sat".to_string()
        } else {
            self.fiat_unit.clone()
        }
    }

    pub fn take_alert(&mut self) -> Option<String> {
        self.alert.take()
    }

    /// Apply every message that has arrived so far.
    pub fn process_pending(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.apply(message);
        }
    }

    /// Wait for the next message and apply it. Returns `false` once no
    /// task can send any more.
    pub async fn recv_and_apply(&mut self) -> bool {
        match self.rx.recv().await {
            Some(message) => {
                self.apply(message);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, message: SendMessage) {
        match message {
            SendMessage::BalanceLoaded(balance) => self.balance = Some(balance),
            SendMessage::Pairing {
                paired,
                no_mobile_channel_error,
            } => {
                self.paired = paired;
                self.no_mobile_channel_error = no_mobile_channel_error;
            }
            SendMessage::UtxosLoaded(utxos) => self.utxos = utxos,
            SendMessage::ProposalDue {
                generation,
                input,
                update_fiat,
            } => {
                if generation == self.debounce_generation {
                    self.debounce_timer = None;
                    self.issue_proposal(input, update_fiat);
                }
            }
            SendMessage::ProposalSettled {
                id,
                update_fiat,
                result,
            } => match result {
                Ok(result) => {
                    if self.proposals.settle(id) {
                        self.apply_proposal(result, update_fiat);
                    } else {
                        tracing::debug!(id, "discarding stale proposal");
                    }
                }
                Err(e) => {
                    tracing::warn!(id, "proposal request failed: {e}");
                    self.valid = false;
                    if self.proposals.fail(id) {
                        self.is_updating_proposal = false;
                    }
                }
            },
            SendMessage::FiatConverted(fiat) => match fiat {
                Some(fiat) => self.fiat_amount = fiat,
                None => self.errors.amount = Some(INVALID_AMOUNT.to_string()),
            },
            SendMessage::CoinConverted(amount) => match amount {
                Some(amount) => {
                    self.amount = amount;
                    self.validate_and_display_fee(false);
                }
                None => self.errors.amount = Some(INVALID_AMOUNT.to_string()),
            },
            SendMessage::QrParsed {
                request,
                amount: Some(amount),
            } => self.apply_payment_request(request, Some(amount)),
            SendMessage::QrParsed {
                request,
                amount: None,
            } => self.reject_payment_amount(request),
            SendMessage::Confirming => {
                self.is_confirming = true;
                self.sign_progress = None;
            }
            SendMessage::SendFinished(result) => self.finish_send(result),
            SendMessage::SentDismissed => self.is_sent = false,
            SendMessage::AbortDismissed => self.is_aborted = false,
            SendMessage::Event(event) => self.apply_event(event),
        }
    }

    fn apply_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::SignProgress(progress) => {
                self.sign_progress = Some(progress);
                self.sign_confirm = false;
            }
            BackendEvent::SignConfirm => self.sign_confirm = true,
            BackendEvent::SyncDone(code) if code == self.account.code => self.load_balance(),
            BackendEvent::SyncDone(_) => {}
        }
    }
}

impl Drop for SendForm {
    fn drop(&mut self) {
        for handle in [
            self.debounce_timer.take(),
            self.banner_timer.take(),
            self.forwarder.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_response_wins() {
        let mut queue = ProposalQueue::default();
        let first = queue.issue();
        let second = queue.issue();

        assert!(queue.settle(second));
        assert!(queue.is_empty());
        assert!(!queue.settle(first));
    }

    #[test]
    fn test_stale_response_is_dropped() {
        let mut queue = ProposalQueue::default();
        let first = queue.issue();
        let second = queue.issue();

        assert!(!queue.settle(first));
        assert_eq!(queue.len(), 1);
        assert!(queue.settle(second));
    }

    #[test]
    fn test_failure_reports_latest() {
        let mut queue = ProposalQueue::default();
        let first = queue.issue();
        let second = queue.issue();

        assert!(!queue.fail(first));
        assert!(queue.fail(second));
        assert!(queue.is_empty());
    }
}
