//! Core types, backend API and configuration for bitsend.
//!
//! This crate provides the types exchanged with the wallet backend, the
//! traits the screens call through, configuration management and error
//! types used across the bitsend workspace.

pub mod account;
pub mod api;
mod config;
mod error;
pub mod history;
pub mod lightning;
pub mod proposal;
pub mod summary;
pub mod units;
pub mod uri;

pub use account::{Account, AccountCode, Amount, Balance, CoinCode, Utxo, find_account};
pub use api::{
    AccountApi, Backend, BackendEvent, Device, DeviceApi, DeviceInfo, DeviceKind, EventBus,
    LightningApi, SignProgress, Subscription,
};
pub use config::{AccountConfig, BitcoindConfig, Config, LndConfig};
pub use error::{Error, Result};
pub use lightning::{InputType, LightningError, LnInvoice, SdkError, SdkErrorKind};
pub use proposal::{
    ConnectResult, FeeTargetCode, ProposalErrorCode, ProposalErrors, SendResult, TxInput,
    TxProposal, TxProposalResult,
};
pub use units::BtcUnit;
