//! Configuration management.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::account::{AccountCode, CoinCode};
use crate::proposal::FeeTargetCode;
use crate::units::BtcUnit;
use crate::{Error, Result};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory (logs).
    pub data_dir: PathBuf,
    /// Docker socket path.
    pub docker_socket: Option<String>,
    /// Unit BTC-family amounts are entered and shown in.
    pub btc_unit: BtcUnit,
    /// Offer manual UTXO selection on bitcoin-based accounts.
    pub coin_control: bool,
    /// Fiat currency amounts are converted to, or `BTC`.
    pub active_currency: String,
    /// Price of one coin in each fiat currency.
    pub fiat_rates: BTreeMap<String, f64>,
    /// sat/vB used when the node cannot estimate a fee for a target.
    pub fallback_fee_rates: BTreeMap<FeeTargetCode, u64>,
    /// Quiet period after the last edit before a proposal is requested.
    pub proposal_debounce_ms: u64,
    /// How long sent/aborted messages stay on screen.
    pub banner_timeout_ms: u64,
    /// Bitcoin Core container.
    pub bitcoind: BitcoindConfig,
    /// LND container; Lightning is disabled when absent.
    pub lnd: Option<LndConfig>,
    /// Accounts, each backed by a bitcoind wallet.
    pub accounts: Vec<AccountConfig>,
}

/// How to reach `bitcoin-cli`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoindConfig {
    /// Container name or id.
    pub container: String,
    pub rpc_user: String,
    pub rpc_password: String,
}

/// How to reach `lncli`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LndConfig {
    /// Container name or id.
    pub container: String,
    /// Chain network flag passed to lncli.
    pub network: String,
}

/// An account and the bitcoind wallet holding its keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub code: AccountCode,
    pub coin_code: CoinCode,
    pub name: String,
    pub wallet: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("", "", "bitsend")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".bitsend"));

        Self {
            data_dir,
            docker_socket: None,
            btc_unit: BtcUnit::Default,
            coin_control: true,
            active_currency: "USD".to_string(),
            fiat_rates: BTreeMap::from([
                ("USD".to_string(), 60_000.0),
                ("EUR".to_string(), 55_000.0),
                ("CHF".to_string(), 52_000.0),
            ]),
            fallback_fee_rates: BTreeMap::from([
                (FeeTargetCode::Low, 1),
                (FeeTargetCode::Economy, 2),
                (FeeTargetCode::Normal, 5),
                (FeeTargetCode::High, 10),
            ]),
            proposal_debounce_ms: 400,
            banner_timeout_ms: 5000,
            bitcoind: BitcoindConfig {
                container: "polar-btc-bitcoin-1".to_string(),
                rpc_user: "polaruser".to_string(),
                rpc_password: "polarpass".to_string(),
            },
            lnd: Some(LndConfig {
                container: "polar-lnd-lnd-1".to_string(),
                network: "regtest".to_string(),
            }),
            accounts: vec![AccountConfig {
                code: AccountCode::new("rbtc-0"),
                coin_code: CoinCode::Rbtc,
                name: "Bitcoin Regtest".to_string(),
                wallet: "default".to_string(),
            }],
        }
    }
}

impl Config {
    /// Load configuration from disk or create default.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing the defaults there if the
    /// file does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Write the configuration to `path` as pretty JSON.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn proposal_debounce(&self) -> Duration {
        Duration::from_millis(self.proposal_debounce_ms)
    }

    pub fn banner_timeout(&self) -> Duration {
        Duration::from_millis(self.banner_timeout_ms)
    }

    /// Log file used while the terminal UI owns the screen.
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("bitsend.log")
    }

    fn validate(&self) -> Result<()> {
        if let Some(account) = self
            .accounts
            .iter()
            .find(|account| !account.coin_code.is_bitcoin_based())
        {
            return Err(Error::Config(format!(
                "account '{}': {} accounts cannot be backed by bitcoind",
                account.code, account.coin_code
            )));
        }
        if let Some((currency, rate)) = self
            .fiat_rates
            .iter()
            .find(|(_, rate)| !rate.is_finite() || **rate <= 0.0)
        {
            return Err(Error::Config(format!("invalid rate {rate} for {currency}")));
        }
        Ok(())
    }

    /// Get configuration file path.
    fn config_path() -> Result<PathBuf> {
        ProjectDirs::from("", "", "bitsend")
            .map(|dirs| dirs.config_dir().join("config.json"))
            .ok_or_else(|| Error::Config("could not determine config directory".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_file() {
        let dir = std::env::temp_dir().join(format!("bitsend-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.proposal_debounce(), Duration::from_millis(400));

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.accounts.len(), 1);
        assert_eq!(loaded.fallback_fee_rates[&FeeTargetCode::Normal], 5);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{ "btc_unit": "sat" }"#).unwrap();
        assert_eq!(config.btc_unit, BtcUnit::Sat);
        assert_eq!(config.active_currency, "USD");
    }

    #[test]
    fn test_rejects_account_based_coins() {
        let mut config = Config::default();
        config.accounts[0].coin_code = CoinCode::Eth;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
