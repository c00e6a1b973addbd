//! Lightning payment input types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::msat_to_sat;

/// A decoded BOLT11 invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LnInvoice {
    pub bolt11: String,
    pub payee_pubkey: String,
    pub payment_hash: String,
    pub description: Option<String>,
    pub amount_msat: Option<u64>,
    pub timestamp: u64,
    pub expiry: u64,
}

impl LnInvoice {
    /// Amount to pay in whole satoshis; zero for amountless invoices.
    pub fn amount_sat(&self) -> u64 {
        msat_to_sat(self.amount_msat.unwrap_or(0))
    }
}

/// What a raw user input turned out to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputType {
    Bolt11 { invoice: LnInvoice },
    BitcoinAddress { address: String },
    NodeId { node_id: String },
    Url { url: String },
}

/// Category of a Lightning SDK failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SdkErrorKind {
    Generic,
    InvalidInvoice,
    InvoiceExpired,
    PaymentFailed,
    PaymentTimeout,
    ServiceConnectivity,
}

/// Error reported by the Lightning node itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SdkError {
    pub kind: SdkErrorKind,
    pub message: String,
}

impl SdkError {
    pub fn new(kind: SdkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors of the Lightning API.
#[derive(Debug, Error)]
pub enum LightningError {
    /// The node rejected the request; the message is meant for the user.
    #[error(transparent)]
    Sdk(#[from] SdkError),

    /// Anything else between us and the node.
    #[error(transparent)]
    Backend(#[from] crate::Error),
}

impl LightningError {
    /// Message to show for this error: the SDK message for node errors,
    /// the full error text otherwise.
    pub fn user_message(&self) -> String {
        match self {
            Self::Sdk(err) => err.message.clone(),
            Self::Backend(err) => err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amountless_invoice() {
        let invoice = LnInvoice {
            bolt11: "lnbcrt1".into(),
            payee_pubkey: String::new(),
            payment_hash: String::new(),
            description: None,
            amount_msat: None,
            timestamp: 0,
            expiry: 3600,
        };
        assert_eq!(invoice.amount_sat(), 0);
    }

    #[test]
    fn test_user_message() {
        let sdk = LightningError::from(SdkError::new(SdkErrorKind::PaymentFailed, "no route"));
        assert_eq!(sdk.user_message(), "no route");

        let other = LightningError::from(crate::Error::Docker("socket gone".into()));
        assert_eq!(other.user_message(), "docker error: socket gone");
    }
}
