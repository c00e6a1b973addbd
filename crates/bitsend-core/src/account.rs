//! Accounts, coins and balances.

use serde::{Deserialize, Serialize};

/// Identifier of an account as known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountCode(pub String);

impl AccountCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// Coin an account holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinCode {
    Btc,
    Tbtc,
    Rbtc,
    Ltc,
    Tltc,
    Eth,
    Sepeth,
}

impl CoinCode {
    /// UTXO-based coins (as opposed to account-based Ethereum).
    pub fn is_bitcoin_based(self) -> bool {
        matches!(
            self,
            Self::Btc | Self::Tbtc | Self::Rbtc | Self::Ltc | Self::Tltc
        )
    }

    /// Coins whose external amounts go through the backend's BTC amount parser.
    pub fn is_btc_family(self) -> bool {
        matches!(self, Self::Btc | Self::Tbtc | Self::Rbtc)
    }

    /// Unit label of the coin, e.g. `RBTC`.
    pub const fn ticker(self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Tbtc => "TBTC",
            Self::Rbtc => "RBTC",
            Self::Ltc => "LTC",
            Self::Tltc => "TLTC",
            Self::Eth => "ETH",
            Self::Sepeth => "SEPETH",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Btc => "Bitcoin",
            Self::Tbtc => "Bitcoin Testnet",
            Self::Rbtc => "Bitcoin Regtest",
            Self::Ltc => "Litecoin",
            Self::Tltc => "Litecoin Testnet",
            Self::Eth => "Ethereum",
            Self::Sepeth => "Ethereum Sepolia",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Btc => "btc",
            Self::Tbtc => "tbtc",
            Self::Rbtc => "rbtc",
            Self::Ltc => "ltc",
            Self::Tltc => "tltc",
            Self::Eth => "eth",
            Self::Sepeth => "sepeth",
        }
    }
}

impl std::fmt::Display for CoinCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A wallet account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub code: AccountCode,
    pub coin_code: CoinCode,
    pub coin_name: String,
    pub name: String,
    #[serde(default)]
    pub block_explorer_tx_prefix: String,
}

/// Find an account by code.
pub fn find_account<'a>(accounts: &'a [Account], code: &AccountCode) -> Option<&'a Account> {
    accounts.iter().find(|account| &account.code == code)
}

/// An amount formatted by the backend in some unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub amount: String,
    pub unit: String,
}

impl Amount {
    pub fn new(amount: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            unit: unit.into(),
        }
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.unit)
    }
}

/// Spendable and incoming balance of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub has_available: bool,
    pub available: Amount,
    pub has_incoming: bool,
    pub incoming: Amount,
}

/// A spendable output, used for coin control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// `txid:vout`.
    pub outpoint: String,
    pub address: String,
    pub amount: Amount,
}
