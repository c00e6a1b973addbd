//! Scripted in-memory backend for exercising the screens without Docker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bitsend_core::history::TransactionData;
use bitsend_core::{
    Account, AccountApi, AccountCode, Amount, Backend, Balance, CoinCode, Config, ConnectResult,
    Device, DeviceApi, DeviceInfo, DeviceKind, Error, EventBus, InputType, LightningApi,
    LightningError, LnInvoice, Result, SdkError, SendResult, TxInput, TxProposal,
    TxProposalResult, Utxo,
};

/// Price of one coin in the mock's only fiat currency.
pub const USD_RATE: f64 = 50_000.0;

pub const ACCOUNT: &str = "rbtc-0";

/// Reply the mock gives to a proposal for a given amount.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(TxProposalResult),
    /// The call itself fails.
    Transport(String),
}

#[derive(Debug, Clone)]
struct Script {
    delay: Duration,
    reply: Scripted,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub fn rbtc_account() -> Account {
    Account {
        code: AccountCode::new(ACCOUNT),
        coin_code: CoinCode::Rbtc,
        coin_name: "Bitcoin Regtest".to_string(),
        name: "Regtest wallet".to_string(),
        block_explorer_tx_prefix: String::new(),
    }
}

/// Accounts and devices with scripted answers. Records every call it
/// cares about.
pub struct MockWallet {
    pub events: EventBus,
    accounts: Vec<Account>,
    scripts: Mutex<HashMap<String, Script>>,
    proposals: Mutex<Vec<TxInput>>,
    notes: Mutex<Vec<String>>,
    balance_calls: Mutex<usize>,
    send_calls: Mutex<usize>,
    connect_calls: Mutex<usize>,
    connect_success: Mutex<bool>,
    send_result: Mutex<SendResult>,
    utxos: Vec<Utxo>,
    devices: Mutex<Vec<Device>>,
    mobile_channel: Mutex<bool>,
    pairing: Mutex<bool>,
}

impl MockWallet {
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            accounts: vec![rbtc_account()],
            scripts: Mutex::new(HashMap::new()),
            proposals: Mutex::new(Vec::new()),
            notes: Mutex::new(Vec::new()),
            balance_calls: Mutex::new(0),
            send_calls: Mutex::new(0),
            connect_calls: Mutex::new(0),
            connect_success: Mutex::new(true),
            send_result: Mutex::new(SendResult::Success {
                txid: "f".repeat(64),
            }),
            utxos: vec![
                Utxo {
                    outpoint: format!("{}:0", "a".repeat(64)),
                    address: "bcrt1qfirst".to_string(),
                    amount: Amount::new("0.50000000", "RBTC"),
                },
                Utxo {
                    outpoint: format!("{}:1", "b".repeat(64)),
                    address: "bcrt1qsecond".to_string(),
                    amount: Amount::new("0.25000000", "RBTC"),
                },
            ],
            devices: Mutex::new(Vec::new()),
            mobile_channel: Mutex::new(false),
            pairing: Mutex::new(false),
        }
    }

    /// Answer proposals for `amount` with `reply` after `delay`.
    pub fn script(&self, amount: &str, delay: Duration, reply: Scripted) {
        lock(&self.scripts).insert(amount.to_string(), Script { delay, reply });
    }

    pub fn set_send_result(&self, result: SendResult) {
        *lock(&self.send_result) = result;
    }

    pub fn set_connect_success(&self, success: bool) {
        *lock(&self.connect_success) = success;
    }

    /// Attach a BitBox01 with the given pairing state.
    pub fn attach_bitbox01(&self, mobile_channel: bool, pairing: bool) {
        lock(&self.devices).push(Device {
            id: "bitbox-1".to_string(),
            kind: DeviceKind::BitBox01,
        });
        *lock(&self.mobile_channel) = mobile_channel;
        *lock(&self.pairing) = pairing;
    }

    pub fn proposals(&self) -> Vec<TxInput> {
        lock(&self.proposals).clone()
    }

    pub fn notes(&self) -> Vec<String> {
        lock(&self.notes).clone()
    }

    pub fn balance_calls(&self) -> usize {
        *lock(&self.balance_calls)
    }

    pub fn send_calls(&self) -> usize {
        *lock(&self.send_calls)
    }

    pub fn connect_calls(&self) -> usize {
        *lock(&self.connect_calls)
    }

    fn proposal_for(input: &TxInput) -> TxProposal {
        let amount = if input.send_all { "0.75000000" } else { &input.amount };
        TxProposal {
            amount: Amount::new(amount, "RBTC"),
            fee: Amount::new("0.00000141", "RBTC"),
            total: Amount::new(format!("{amount}+fee"), "RBTC"),
        }
    }
}

fn parse_number(amount: &str) -> Result<f64> {
    amount
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
        .ok_or_else(|| Error::InvalidAmount(amount.to_string()))
}

#[async_trait]
impl AccountApi for MockWallet {
    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.clone())
    }

    async fn get_balance(&self, code: &AccountCode) -> Result<Balance> {
        if code.as_str() != ACCOUNT {
            return Err(Error::AccountNotFound(code.to_string()));
        }
        *lock(&self.balance_calls) += 1;
        Ok(Balance {
            has_available: true,
            available: Amount::new("0.75000000", "RBTC"),
            has_incoming: false,
            incoming: Amount::new("0.00000000", "RBTC"),
        })
    }

    async fn get_utxos(&self, _code: &AccountCode) -> Result<Vec<Utxo>> {
        Ok(self.utxos.clone())
    }

    async fn get_transactions(&self, _code: &AccountCode) -> Result<Vec<TransactionData>> {
        Ok(Vec::new())
    }

    async fn connect_keystore(&self, _code: &AccountCode) -> Result<ConnectResult> {
        *lock(&self.connect_calls) += 1;
        Ok(ConnectResult {
            success: *lock(&self.connect_success),
        })
    }

    async fn send_tx(&self, _code: &AccountCode) -> Result<SendResult> {
        *lock(&self.send_calls) += 1;
        Ok(lock(&self.send_result).clone())
    }

    async fn propose_tx(&self, _code: &AccountCode, input: &TxInput) -> Result<TxProposalResult> {
        lock(&self.proposals).push(input.clone());
        let script = lock(&self.scripts).get(&input.amount).cloned();

        let Some(Script { delay, reply }) = script else {
            return Ok(Ok(Self::proposal_for(input)));
        };
        tokio::time::sleep(delay).await;
        match reply {
            Scripted::Reply(result) => Ok(result),
            Scripted::Transport(message) => Err(Error::Backend(message)),
        }
    }

    async fn propose_tx_note(&self, _code: &AccountCode, note: &str) -> Result<()> {
        lock(&self.notes).push(note.to_string());
        Ok(())
    }

    async fn convert_to_currency(&self, amount: &str, _coin: CoinCode, fiat: &str) -> Result<String> {
        if fiat != "USD" {
            return Err(Error::UnknownCurrency(fiat.to_string()));
        }
        Ok(format!("{:.2}", parse_number(amount)? * USD_RATE))
    }

    async fn convert_from_currency(&self, amount: &str, _coin: CoinCode, fiat: &str) -> Result<String> {
        if fiat != "USD" {
            return Err(Error::UnknownCurrency(fiat.to_string()));
        }
        Ok(format!("{:.8}", parse_number(amount)? / USD_RATE))
    }

    async fn parse_external_btc_amount(&self, amount: &str) -> Result<String> {
        Ok(format!("{:.8}", parse_number(amount)?))
    }
}

#[async_trait]
impl DeviceApi for MockWallet {
    async fn devices(&self) -> Result<Vec<Device>> {
        Ok(lock(&self.devices).clone())
    }

    async fn has_mobile_channel(&self, _device_id: &str) -> Result<bool> {
        Ok(*lock(&self.mobile_channel))
    }

    async fn get_device_info(&self, _device_id: &str) -> Result<DeviceInfo> {
        Ok(DeviceInfo {
            pairing: *lock(&self.pairing),
        })
    }
}

/// Lightning node with per-input answers.
#[derive(Default)]
pub struct MockLightning {
    inputs: Mutex<HashMap<String, std::result::Result<InputType, SdkError>>>,
    payment_delay: Mutex<Duration>,
    payment_error: Mutex<Option<SdkError>>,
    payments: Mutex<Vec<String>>,
}

impl MockLightning {
    pub fn script_input(&self, raw: &str, result: std::result::Result<InputType, SdkError>) {
        lock(&self.inputs).insert(raw.to_string(), result);
    }

    pub fn fail_payments(&self, error: SdkError) {
        *lock(&self.payment_error) = Some(error);
    }

    pub fn set_payment_delay(&self, delay: Duration) {
        *lock(&self.payment_delay) = delay;
    }

    pub fn payments(&self) -> Vec<String> {
        lock(&self.payments).clone()
    }
}

#[async_trait]
impl LightningApi for MockLightning {
    async fn parse_input(&self, input: &str) -> std::result::Result<InputType, LightningError> {
        match lock(&self.inputs).get(input).cloned() {
            Some(result) => result.map_err(LightningError::from),
            None => Err(Error::Backend(format!("unscripted input {input}")).into()),
        }
    }

    async fn send_payment(&self, bolt11: &str) -> std::result::Result<(), LightningError> {
        lock(&self.payments).push(bolt11.to_string());
        let delay = *lock(&self.payment_delay);
        tokio::time::sleep(delay).await;
        match lock(&self.payment_error).clone() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

pub fn invoice(bolt11: &str, amount_msat: Option<u64>, description: Option<&str>) -> InputType {
    InputType::Bolt11 {
        invoice: LnInvoice {
            bolt11: bolt11.to_string(),
            payee_pubkey: format!("02{}", "cd".repeat(32)),
            payment_hash: "e".repeat(64),
            description: description.map(ToString::to_string),
            amount_msat,
            timestamp: 1_700_000_000,
            expiry: 3600,
        },
    }
}

/// A wallet, a Lightning node and the backend bundling them.
pub struct Harness {
    pub wallet: Arc<MockWallet>,
    pub lightning: Arc<MockLightning>,
    pub backend: Backend,
    pub config: Config,
}

impl Harness {
    pub fn new() -> Self {
        let events = EventBus::new();
        let wallet = Arc::new(MockWallet::new(events.clone()));
        let lightning = Arc::new(MockLightning::default());

        let config = Config::default();

        let backend = Backend {
            accounts: wallet.clone(),
            devices: wallet.clone(),
            lightning: Some(lightning.clone() as Arc<dyn LightningApi>),
            events,
        };

        Self {
            wallet,
            lightning,
            backend,
            config,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply messages arriving at `screen` for `duration` of (paused) time.
#[macro_export]
macro_rules! run_for {
    ($screen:expr, $duration:expr) => {{
        let deadline = tokio::time::Instant::now() + $duration;
        while let Ok(true) = tokio::time::timeout_at(deadline, $screen.recv_and_apply()).await {}
    }};
}
