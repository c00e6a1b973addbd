//! Lightning send workflow.

use std::sync::Arc;
use std::time::Duration;

use bitsend_core::{InputType, LightningApi, LightningError, LnInvoice};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long the spinner says "connecting" before it says "sending".
const CONNECTING_PHASE: Duration = Duration::from_secs(4);

pub const INVALID_INPUT: &str = "Invalid input";

/// Shown when a payment is started without a decoded invoice.
pub const NO_INVOICE: &str = "no invoice found";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SendStep {
    #[default]
    SelectInvoice,
    Confirm,
    Sending,
    Success,
}

/// Where a back action leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Stay,
    Leave,
}

#[derive(Debug)]
enum LightningMessage {
    Parsed(Result<InputType, LightningError>),
    PaymentFinished(Result<(), LightningError>),
    ReturnHome,
}

/// State of the Lightning send screen.
pub struct LightningSend {
    lightning: Arc<dyn LightningApi>,
    pub step: SendStep,
    pub raw_input: String,
    pub raw_input_error: Option<String>,
    pub parsed_input: Option<InputType>,
    pub send_error: Option<String>,
    /// Set when the success screen has been shown long enough.
    pub exit_requested: bool,
    sending_since: Option<Instant>,
    success_timeout: Duration,
    success_timer: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<LightningMessage>,
    rx: mpsc::UnboundedReceiver<LightningMessage>,
}

impl LightningSend {
    pub fn new(lightning: Arc<dyn LightningApi>, success_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            lightning,
            step: SendStep::SelectInvoice,
            raw_input: String::new(),
            raw_input_error: None,
            parsed_input: None,
            send_error: None,
            exit_requested: false,
            sending_since: None,
            success_timeout,
            success_timer: None,
            tx,
            rx,
        }
    }

    /// The decoded invoice, once one has been accepted.
    pub fn invoice(&self) -> Option<&LnInvoice> {
        match &self.parsed_input {
            Some(InputType::Bolt11 { invoice }) => Some(invoice),
            _ => None,
        }
    }

    pub fn set_raw_input(&mut self, input: &str) {
        self.raw_input = input.to_string();
    }

    /// Ask the node what the raw input is.
    pub fn parse_input(&mut self) {
        self.raw_input_error = None;

        let lightning = Arc::clone(&self.lightning);
        let input = self.raw_input.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let parsed = lightning.parse_input(&input).await;
            let _ = tx.send(LightningMessage::Parsed(parsed));
        });
    }

    /// Pay the decoded invoice.
    pub fn send_payment(&mut self) {
        let Some(bolt11) = self.invoice().map(|invoice| invoice.bolt11.clone()) else {
            self.step = SendStep::SelectInvoice;
            self.send_error = Some(NO_INVOICE.to_string());
            return;
        };

        self.step = SendStep::Sending;
        self.send_error = None;
        self.sending_since = Some(Instant::now());

        let lightning = Arc::clone(&self.lightning);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = lightning.send_payment(&bolt11).await;
            let _ = tx.send(LightningMessage::PaymentFinished(result));
        });
    }

    pub fn back(&mut self) -> Navigation {
        match self.step {
            SendStep::SelectInvoice => Navigation::Leave,
            SendStep::Confirm | SendStep::Success => {
                self.reset();
                Navigation::Stay
            }
            SendStep::Sending => Navigation::Stay,
        }
    }

    fn reset(&mut self) {
        if let Some(timer) = self.success_timer.take() {
            timer.abort();
        }
        self.step = SendStep::SelectInvoice;
        self.send_error = None;
        self.parsed_input = None;
    }

    pub fn spinner_text(&self, now: Instant) -> &'static str {
        match self.sending_since {
            Some(since) if now.duration_since(since) >= CONNECTING_PHASE => "Sending payment...",
            _ => "Connecting to the network...",
        }
    }

    pub fn process_pending(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.apply(message);
        }
    }

    pub async fn recv_and_apply(&mut self) -> bool {
        match self.rx.recv().await {
            Some(message) => {
                self.apply(message);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, message: LightningMessage) {
        match message {
            // Only the invoice step accepts parse results; a late one would
            // reopen Confirm under an in-flight payment.
            LightningMessage::Parsed(_) if self.step != SendStep::SelectInvoice => {
                tracing::debug!(step = ?self.step, "dropping late parse result");
            }
            LightningMessage::Parsed(Ok(parsed @ InputType::Bolt11 { .. })) => {
                self.parsed_input = Some(parsed);
                self.step = SendStep::Confirm;
            }
            LightningMessage::Parsed(Ok(other)) => {
                tracing::debug!(?other, "not an invoice");
                self.raw_input_error = Some(INVALID_INPUT.to_string());
            }
            LightningMessage::Parsed(Err(e)) => self.raw_input_error = Some(e.user_message()),
            LightningMessage::PaymentFinished(Ok(())) => {
                self.step = SendStep::Success;
                self.sending_since = None;
                let delay = self.success_timeout;
                let tx = self.tx.clone();
                self.success_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(LightningMessage::ReturnHome);
                }));
            }
            LightningMessage::PaymentFinished(Err(e)) => {
                tracing::warn!("lightning payment failed: {e}");
                self.step = SendStep::SelectInvoice;
                self.sending_since = None;
                self.send_error = Some(e.user_message());
            }
            LightningMessage::ReturnHome => {
                self.success_timer = None;
                self.exit_requested = true;
            }
        }
    }
}

impl Drop for LightningSend {
    fn drop(&mut self) {
        if let Some(timer) = self.success_timer.take() {
            timer.abort();
        }
    }
}
