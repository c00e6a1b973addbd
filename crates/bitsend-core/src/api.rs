//! The backend boundary the screens talk to.
//!
//! Everything that builds, signs or routes a payment sits behind these
//! traits. The screens only sequence calls and render the replies.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::account::{Account, AccountCode, Balance, CoinCode, Utxo};
use crate::history::TransactionData;
use crate::lightning::{InputType, LightningError};
use crate::proposal::{ConnectResult, SendResult, TxInput, TxProposalResult};
use crate::Result;

/// On-chain account operations.
#[async_trait]
pub trait AccountApi: Send + Sync {
    /// All accounts the backend manages.
    async fn accounts(&self) -> Result<Vec<Account>>;

    async fn get_balance(&self, code: &AccountCode) -> Result<Balance>;

    /// Spendable outputs for coin control.
    async fn get_utxos(&self, code: &AccountCode) -> Result<Vec<Utxo>>;

    async fn get_transactions(&self, code: &AccountCode) -> Result<Vec<TransactionData>>;

    /// Make sure the keystore that signs for `code` is available.
    async fn connect_keystore(&self, code: &AccountCode) -> Result<ConnectResult>;

    /// Sign and broadcast the last successful proposal.
    async fn send_tx(&self, code: &AccountCode) -> Result<SendResult>;

    /// Build (but do not sign) a transaction for `input`.
    async fn propose_tx(&self, code: &AccountCode, input: &TxInput) -> Result<TxProposalResult>;

    /// Attach a note to the transaction being proposed.
    async fn propose_tx_note(&self, code: &AccountCode, note: &str) -> Result<()>;

    /// Coin amount to fiat. `fiat` may be `BTC`, meaning the user's BTC unit.
    async fn convert_to_currency(&self, amount: &str, coin: CoinCode, fiat: &str) -> Result<String>;

    /// Fiat amount to coin amount.
    async fn convert_from_currency(&self, amount: &str, coin: CoinCode, fiat: &str) -> Result<String>;

    /// Normalize an amount from an external source (always decimal BTC) to
    /// the user's unit.
    async fn parse_external_btc_amount(&self, amount: &str) -> Result<String>;
}

/// Lightning payments.
#[async_trait]
pub trait LightningApi: Send + Sync {
    /// Classify and decode raw input such as a BOLT11 invoice.
    async fn parse_input(&self, input: &str) -> std::result::Result<InputType, LightningError>;

    /// Pay a BOLT11 invoice.
    async fn send_payment(&self, bolt11: &str) -> std::result::Result<(), LightningError>;
}

/// Hardware wallet family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    #[serde(rename = "bitbox")]
    BitBox01,
    #[serde(rename = "bitbox02")]
    BitBox02,
}

/// A connected device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub kind: DeviceKind,
}

/// Pairing state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub pairing: bool,
}

/// Connected hardware devices.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn devices(&self) -> Result<Vec<Device>>;

    async fn has_mobile_channel(&self, device_id: &str) -> Result<bool>;

    async fn get_device_info(&self, device_id: &str) -> Result<DeviceInfo>;
}

/// Signing progress of a multi-step signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignProgress {
    pub steps: u32,
    pub step: u32,
}

/// Notifications pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    SignProgress(SignProgress),
    /// The device asks the user to confirm on screen.
    SignConfirm,
    /// An account finished syncing; balances may have changed.
    SyncDone(AccountCode),
}

const EVENT_CAPACITY: usize = 64;

/// Fan-out of backend events to every open screen.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BackendEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: BackendEvent) {
        tracing::debug!(?event, "backend event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        tracing::trace!(%id, "event subscription opened");
        Subscription {
            id,
            rx: self.tx.subscribe(),
        }
    }
}

/// A live subscription; dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    rx: broadcast::Receiver<BackendEvent>,
}

impl Subscription {
    /// Next event, or `None` once the bus is gone. Lagged events are
    /// skipped.
    pub async fn recv(&mut self) -> Option<BackendEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(id = %self.id, skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        tracing::trace!(id = %self.id, "event subscription closed");
    }
}

/// Everything a screen may call, bundled.
#[derive(Clone)]
pub struct Backend {
    pub accounts: Arc<dyn AccountApi>,
    pub devices: Arc<dyn DeviceApi>,
    pub lightning: Option<Arc<dyn LightningApi>>,
    pub events: EventBus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_fan_out() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(BackendEvent::SignConfirm);

        assert_eq!(first.recv().await, Some(BackendEvent::SignConfirm));
        assert_eq!(second.recv().await, Some(BackendEvent::SignConfirm));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(BackendEvent::SyncDone("rbtc-0".into()));
    }
}
