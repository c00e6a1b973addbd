//! Transaction proposals and send results.

use serde::{Deserialize, Serialize};

use crate::account::Amount;

/// Fee policy for an on-chain transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeTargetCode {
    Low,
    Economy,
    Normal,
    High,
    Custom,
}

impl FeeTargetCode {
    /// All targets in the order they are offered.
    pub const ALL: [Self; 5] = [
        Self::Low,
        Self::Economy,
        Self::Normal,
        Self::High,
        Self::Custom,
    ];

    /// Confirmation target in blocks, `None` for a custom fee rate.
    pub const fn blocks(self) -> Option<u16> {
        match self {
            Self::Low => Some(144),
            Self::Economy => Some(24),
            Self::Normal => Some(6),
            Self::High => Some(2),
            Self::Custom => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Economy => "Economy",
            Self::Normal => "Normal",
            Self::High => "High",
            Self::Custom => "Custom (sat/vB)",
        }
    }
}

/// Input of a transaction proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInput {
    pub address: String,
    pub amount: String,
    pub fee_target: FeeTargetCode,
    pub custom_fee: String,
    pub send_all: bool,
    /// Outpoints (`txid:vout`) chosen through coin control.
    pub selected_utxos: Vec<String>,
}

/// A transaction the backend is ready to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxProposal {
    pub amount: Amount,
    pub fee: Amount,
    pub total: Amount,
}

/// Why the backend refused to build a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProposalErrorCode {
    InvalidAddress,
    InvalidAmount,
    InsufficientFunds,
    FeeTooLow,
    FeesNotAvailable,
    InvalidFee,
    Unknown(String),
}

impl std::fmt::Display for ProposalErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress => f.write_str("Please enter a valid address"),
            Self::InvalidAmount => f.write_str("Invalid amount"),
            Self::InsufficientFunds => f.write_str("Insufficient funds"),
            Self::FeeTooLow => f.write_str("Fee too low"),
            Self::FeesNotAvailable => {
                f.write_str("Fee estimation is not available, please use a custom fee")
            }
            Self::InvalidFee => f.write_str("Invalid fee rate"),
            Self::Unknown(message) => write!(f, "An unknown error occurred: {message}"),
        }
    }
}

/// Outcome of a proposal request.
pub type TxProposalResult = std::result::Result<TxProposal, ProposalErrorCode>;

/// Inline errors of the send form, plus an alert for errors no field owns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalErrors {
    pub address: Option<String>,
    pub amount: Option<String>,
    pub fee: Option<String>,
    pub alert: Option<String>,
}

impl ProposalErrors {
    /// Route an error code to the field it belongs to.
    pub fn from_code(code: &ProposalErrorCode) -> Self {
        let message = Some(code.to_string());
        match code {
            ProposalErrorCode::InvalidAddress => Self {
                address: message,
                ..Self::default()
            },
            ProposalErrorCode::InvalidAmount | ProposalErrorCode::InsufficientFunds => Self {
                amount: message,
                ..Self::default()
            },
            ProposalErrorCode::FeeTooLow
            | ProposalErrorCode::FeesNotAvailable
            | ProposalErrorCode::InvalidFee => Self {
                fee: message,
                ..Self::default()
            },
            ProposalErrorCode::Unknown(_) => Self {
                alert: message,
                ..Self::default()
            },
        }
    }
}

/// Result of unlocking the keystore before signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResult {
    pub success: bool,
}

/// Outcome of signing and broadcasting the current proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SendResult {
    Success {
        txid: String,
    },
    Aborted,
    Failed {
        error_code: Option<String>,
        error_message: Option<String>,
    },
}

/// Error code for ERC20 sends the account cannot pay gas for.
pub const ERC20_INSUFFICIENT_GAS_FUNDS: &str = "erc20InsufficientGasFunds";

impl SendResult {
    /// Text shown to the user for a failed send.
    pub fn failure_message(&self) -> Option<String> {
        let Self::Failed {
            error_code,
            error_message,
        } = self
        else {
            return None;
        };

        if error_code.as_deref() == Some(ERC20_INSUFFICIENT_GAS_FUNDS) {
            return Some("Insufficient funds to pay for the gas fee".to_string());
        }
        Some(match error_message {
            Some(message) => format!("An unknown error occurred: {message}"),
            None => "An unknown error occurred".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_route_to_fields() {
        let errors = ProposalErrors::from_code(&ProposalErrorCode::InvalidAddress);
        assert!(errors.address.is_some());
        assert!(errors.amount.is_none());

        let errors = ProposalErrors::from_code(&ProposalErrorCode::InsufficientFunds);
        assert_eq!(errors.amount.as_deref(), Some("Insufficient funds"));

        let errors = ProposalErrors::from_code(&ProposalErrorCode::FeesNotAvailable);
        assert!(errors.fee.is_some());

        let errors = ProposalErrors::from_code(&ProposalErrorCode::Unknown("boom".into()));
        assert_eq!(
            errors.alert.as_deref(),
            Some("An unknown error occurred: boom")
        );
    }

    #[test]
    fn test_failure_message_selection() {
        let gas = SendResult::Failed {
            error_code: Some(ERC20_INSUFFICIENT_GAS_FUNDS.into()),
            error_message: Some("ignored".into()),
        };
        assert_eq!(
            gas.failure_message().unwrap(),
            "Insufficient funds to pay for the gas fee"
        );

        let other = SendResult::Failed {
            error_code: None,
            error_message: Some("rejected".into()),
        };
        assert_eq!(
            other.failure_message().unwrap(),
            "An unknown error occurred: rejected"
        );

        assert!(SendResult::Aborted.failure_message().is_none());
    }
}
