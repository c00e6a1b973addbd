//! On-chain accounts backed by bitcoind wallets.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bitsend_core::api::{AccountApi, BackendEvent, Device, DeviceApi, DeviceInfo, EventBus, SignProgress};
use bitsend_core::history::{TransactionData, TxKind};
use bitsend_core::units::{BtcUnit, SATS_PER_BTC, btc_to_sats, format_sats, parse_amount};
use bitsend_core::{
    Account, AccountCode, AccountConfig, Amount, Balance, BitcoindConfig, CoinCode, Config,
    ConnectResult, Error, FeeTargetCode, ProposalErrorCode, Result, SendResult, TxInput,
    TxProposal, TxProposalResult, Utxo,
};
use bitsend_docker::ContainerManager;
use chrono::DateTime;
use serde_json::{Value, json};
use tokio::sync::Mutex;

/// Number of wallet transactions fetched for the history.
const HISTORY_LIMIT: &str = "1000";

/// Fiat code meaning "show the coin itself".
const BTC_FIAT: &str = "BTC";

/// Proposal state kept between `propose_tx` and `send_tx`.
#[derive(Debug, Default)]
struct Draft {
    psbt: Option<String>,
    note: String,
}

/// Accounts backed by wallets of a bitcoind node, reached via `bitcoin-cli`.
pub struct BitcoindWallet {
    containers: Arc<ContainerManager>,
    node: BitcoindConfig,
    accounts: Vec<AccountConfig>,
    unit: BtcUnit,
    fiat_rates: BTreeMap<String, f64>,
    fallback_fee_rates: BTreeMap<FeeTargetCode, u64>,
    events: EventBus,
    drafts: Mutex<HashMap<AccountCode, Draft>>,
    /// Notes of broadcast transactions, by txid.
    notes: Mutex<HashMap<String, String>>,
}

impl BitcoindWallet {
    pub fn new(containers: Arc<ContainerManager>, config: &Config, events: EventBus) -> Self {
        Self {
            containers,
            node: config.bitcoind.clone(),
            accounts: config.accounts.clone(),
            unit: config.btc_unit,
            fiat_rates: config.fiat_rates.clone(),
            fallback_fee_rates: config.fallback_fee_rates.clone(),
            events,
            drafts: Mutex::new(HashMap::new()),
            notes: Mutex::new(HashMap::new()),
        }
    }

    fn account(&self, code: &AccountCode) -> Result<&AccountConfig> {
        self.accounts
            .iter()
            .find(|account| &account.code == code)
            .ok_or_else(|| Error::AccountNotFound(code.to_string()))
    }

    fn amount(&self, sats: u64, coin: CoinCode) -> Amount {
        Amount::new(format_sats(sats, self.unit), self.unit.label(coin.ticker()))
    }

    /// Build a `bitcoin-cli` invocation against `wallet`.
    fn cli(&self, wallet: Option<&str>, args: &[&str]) -> Vec<String> {
        let mut cmd = vec![
            "bitcoin-cli".to_string(),
            "-regtest".to_string(),
            format!("-rpcuser={}", self.node.rpc_user),
            format!("-rpcpassword={}", self.node.rpc_password),
        ];
        if let Some(wallet) = wallet {
            cmd.push(format!("-rpcwallet={wallet}"));
        }
        cmd.extend(args.iter().map(ToString::to_string));
        cmd
    }

    async fn call(&self, wallet: Option<&str>, args: &[&str]) -> Result<String> {
        let output = self
            .containers
            .exec_checked(&self.node.container, self.cli(wallet, args))
            .await?;
        Ok(output.trim().to_string())
    }

    async fn call_json(&self, wallet: Option<&str>, args: &[&str]) -> Result<Value> {
        let output = self.call(wallet, args).await?;
        serde_json::from_str(&output).map_err(|e| {
            Error::Backend(format!("unexpected bitcoin-cli output ({e}): {output}"))
        })
    }

    /// Fee rate in sat/vB for `input`, or the proposal error explaining why
    /// there is none.
    #[allow(clippy::cast_precision_loss)]
    async fn fee_rate(&self, input: &TxInput) -> Result<std::result::Result<f64, ProposalErrorCode>> {
        let Some(blocks) = input.fee_target.blocks() else {
            return Ok(custom_fee_rate(&input.custom_fee));
        };

        let estimate = self
            .call_json(None, &["estimatesmartfee", &blocks.to_string()])
            .await?;
        if let Some(rate) = estimate_to_sat_per_vb(&estimate) {
            return Ok(Ok(rate));
        }

        tracing::debug!(target = ?input.fee_target, "no fee estimate, using fallback rate");
        Ok(self
            .fallback_fee_rates
            .get(&input.fee_target)
            .map(|rate| *rate as f64)
            .ok_or(ProposalErrorCode::FeesNotAvailable))
    }

    /// Sats available to a send-all: the selected coins, or the whole
    /// trusted balance.
    async fn spendable(&self, wallet: &str, selected: &[String]) -> Result<u64> {
        if selected.is_empty() {
            let balances = self.call_json(Some(wallet), &["getbalances"]).await?;
            return Ok(btc_to_sats(balances["mine"]["trusted"].as_f64().unwrap_or(0.0)));
        }

        let unspent = self.call_json(Some(wallet), &["listunspent"]).await?;
        Ok(unspent
            .as_array()
            .into_iter()
            .flatten()
            .filter(|utxo| selected.contains(&outpoint(utxo)))
            .map(|utxo| btc_to_sats(utxo["amount"].as_f64().unwrap_or(0.0)))
            .sum())
    }
}

#[async_trait]
impl AccountApi for BitcoindWallet {
    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self
            .accounts
            .iter()
            .map(|account| Account {
                code: account.code.clone(),
                coin_code: account.coin_code,
                coin_name: account.coin_code.name().to_string(),
                name: account.name.clone(),
                block_explorer_tx_prefix: String::new(),
            })
            .collect())
    }

    async fn get_balance(&self, code: &AccountCode) -> Result<Balance> {
        let account = self.account(code)?;
        let balances = self
            .call_json(Some(&account.wallet), &["getbalances"])
            .await?;
        let mine = &balances["mine"];

        let available = btc_to_sats(mine["trusted"].as_f64().unwrap_or(0.0));
        let incoming = btc_to_sats(mine["untrusted_pending"].as_f64().unwrap_or(0.0))
            + btc_to_sats(mine["immature"].as_f64().unwrap_or(0.0));

        Ok(Balance {
            has_available: available > 0,
            available: self.amount(available, account.coin_code),
            has_incoming: incoming > 0,
            incoming: self.amount(incoming, account.coin_code),
        })
    }

    async fn get_utxos(&self, code: &AccountCode) -> Result<Vec<Utxo>> {
        let account = self.account(code)?;
        let unspent = self
            .call_json(Some(&account.wallet), &["listunspent"])
            .await?;

        Ok(unspent
            .as_array()
            .into_iter()
            .flatten()
            .filter(|utxo| utxo["spendable"].as_bool().unwrap_or(true))
            .map(|utxo| Utxo {
                outpoint: outpoint(utxo),
                address: utxo["address"].as_str().unwrap_or_default().to_string(),
                amount: self.amount(
                    btc_to_sats(utxo["amount"].as_f64().unwrap_or(0.0)),
                    account.coin_code,
                ),
            })
            .collect())
    }

    async fn get_transactions(&self, code: &AccountCode) -> Result<Vec<TransactionData>> {
        let account = self.account(code)?;
        let listed = self
            .call_json(
                Some(&account.wallet),
                &["listtransactions", "*", HISTORY_LIMIT, "0", "true"],
            )
            .await?;

        let notes = self.notes.lock().await;
        let mut txs = group_transactions(&listed);
        for tx in &mut txs {
            tx.note = notes.get(&tx.txid).cloned();
        }
        Ok(txs)
    }

    async fn connect_keystore(&self, code: &AccountCode) -> Result<ConnectResult> {
        let account = self.account(code)?;
        match self.call(Some(&account.wallet), &["getwalletinfo"]).await {
            Ok(_) => Ok(ConnectResult { success: true }),
            Err(Error::CommandFailed { output, .. }) => {
                tracing::warn!(wallet = %account.wallet, %output, "wallet not available");
                Ok(ConnectResult { success: false })
            }
            Err(e) => Err(e),
        }
    }

    async fn send_tx(&self, code: &AccountCode) -> Result<SendResult> {
        let account = self.account(code)?;
        let Some(Draft { psbt: Some(psbt), note }) = self.drafts.lock().await.remove(code) else {
            return Ok(SendResult::Failed {
                error_code: None,
                error_message: Some("no transaction proposal".to_string()),
            });
        };

        self.events
            .publish(BackendEvent::SignProgress(SignProgress { steps: 1, step: 0 }));
        let processed = self
            .call_json(Some(&account.wallet), &["walletprocesspsbt", &psbt])
            .await?;
        if !processed["complete"].as_bool().unwrap_or(false) {
            return Ok(SendResult::Failed {
                error_code: None,
                error_message: Some("the wallet could not sign all inputs".to_string()),
            });
        }
        self.events.publish(BackendEvent::SignConfirm);

        let hex = match processed["hex"].as_str() {
            Some(hex) => hex.to_string(),
            None => {
                let signed = processed["psbt"].as_str().unwrap_or_default();
                let finalized = self
                    .call_json(Some(&account.wallet), &["finalizepsbt", signed])
                    .await?;
                finalized["hex"]
                    .as_str()
                    .ok_or_else(|| Error::Backend("finalizepsbt returned no hex".to_string()))?
                    .to_string()
            }
        };

        let txid = match self
            .call(Some(&account.wallet), &["sendrawtransaction", &hex])
            .await
        {
            Ok(txid) => txid,
            Err(Error::CommandFailed { output, .. }) => {
                return Ok(SendResult::Failed {
                    error_code: None,
                    error_message: Some(output),
                });
            }
            Err(e) => return Err(e),
        };

        tracing::info!(%code, %txid, "transaction broadcast");
        if !note.is_empty() {
            self.notes.lock().await.insert(txid.clone(), note);
        }
        self.events.publish(BackendEvent::SyncDone(code.clone()));

        Ok(SendResult::Success { txid })
    }

    async fn propose_tx(&self, code: &AccountCode, input: &TxInput) -> Result<TxProposalResult> {
        let account = self.account(code)?;

        let validated = self
            .call_json(None, &["validateaddress", &input.address])
            .await?;
        if !validated["isvalid"].as_bool().unwrap_or(false) {
            return Ok(Err(ProposalErrorCode::InvalidAddress));
        }

        let fee_rate = match self.fee_rate(input).await? {
            Ok(rate) => rate,
            Err(code) => return Ok(Err(code)),
        };

        let amount = if input.send_all {
            let spendable = self.spendable(&account.wallet, &input.selected_utxos).await?;
            if spendable == 0 {
                return Ok(Err(ProposalErrorCode::InsufficientFunds));
            }
            spendable
        } else {
            match parse_amount(&input.amount, self.unit) {
                Ok(sats) if sats > 0 => sats,
                _ => return Ok(Err(ProposalErrorCode::InvalidAmount)),
            }
        };

        let inputs: Vec<Value> = input
            .selected_utxos
            .iter()
            .filter_map(|outpoint| outpoint.split_once(':'))
            .map(|(txid, vout)| json!({ "txid": txid, "vout": vout.parse::<u32>().unwrap_or(0) }))
            .collect();
        let outputs = json!([{ input.address.as_str(): format_sats(amount, BtcUnit::Default) }]);
        let mut options = json!({
            "fee_rate": fee_rate,
            "add_inputs": input.selected_utxos.is_empty(),
        });
        if input.send_all {
            options["subtractFeeFromOutputs"] = json!([0]);
        }

        let inputs_arg = format!("inputs={}", Value::Array(inputs));
        let outputs_arg = format!("outputs={outputs}");
        let options_arg = format!("options={options}");
        let output = self
            .containers
            .exec(
                &self.node.container,
                self.cli(
                    Some(&account.wallet),
                    &[
                        "-named",
                        "walletcreatefundedpsbt",
                        &inputs_arg,
                        &outputs_arg,
                        &options_arg,
                    ],
                ),
            )
            .await?;
        if !output.success() {
            let code = proposal_error(output.message());
            tracing::debug!(?code, message = output.message(), "proposal rejected");
            return Ok(Err(code));
        }

        let funded: Value = serde_json::from_str(output.stdout.trim())?;
        let fee = btc_to_sats(funded["fee"].as_f64().unwrap_or(0.0));
        let psbt = funded["psbt"]
            .as_str()
            .ok_or_else(|| Error::Backend("walletcreatefundedpsbt returned no psbt".to_string()))?
            .to_string();

        let sent = if input.send_all {
            amount.saturating_sub(fee)
        } else {
            amount
        };

        self.drafts
            .lock()
            .await
            .entry(code.clone())
            .or_default()
            .psbt = Some(psbt);

        Ok(Ok(TxProposal {
            amount: self.amount(sent, account.coin_code),
            fee: self.amount(fee, account.coin_code),
            total: self.amount(sent + fee, account.coin_code),
        }))
    }

    async fn propose_tx_note(&self, code: &AccountCode, note: &str) -> Result<()> {
        self.account(code)?;
        self.drafts
            .lock()
            .await
            .entry(code.clone())
            .or_default()
            .note = note.to_string();
        Ok(())
    }

    async fn convert_to_currency(&self, amount: &str, _coin: CoinCode, fiat: &str) -> Result<String> {
        to_fiat(amount, fiat, self.unit, &self.fiat_rates)
    }

    async fn convert_from_currency(&self, amount: &str, _coin: CoinCode, fiat: &str) -> Result<String> {
        from_fiat(amount, fiat, self.unit, &self.fiat_rates)
    }

    async fn parse_external_btc_amount(&self, amount: &str) -> Result<String> {
        let sats = parse_amount(amount, BtcUnit::Default)?;
        Ok(format_sats(sats, self.unit))
    }
}

/// A software wallet has no hardware devices attached.
#[async_trait]
impl DeviceApi for BitcoindWallet {
    async fn devices(&self) -> Result<Vec<Device>> {
        Ok(Vec::new())
    }

    async fn has_mobile_channel(&self, device_id: &str) -> Result<bool> {
        Err(Error::DeviceNotFound(device_id.to_string()))
    }

    async fn get_device_info(&self, device_id: &str) -> Result<DeviceInfo> {
        Err(Error::DeviceNotFound(device_id.to_string()))
    }
}

fn outpoint(utxo: &Value) -> String {
    format!(
        "{}:{}",
        utxo["txid"].as_str().unwrap_or_default(),
        utxo["vout"].as_u64().unwrap_or(0)
    )
}

fn custom_fee_rate(custom_fee: &str) -> std::result::Result<f64, ProposalErrorCode> {
    match custom_fee.trim().parse::<f64>() {
        Ok(rate) if rate.is_finite() && rate >= 1.0 => Ok(rate),
        Ok(rate) if rate.is_finite() && rate >= 0.0 => Err(ProposalErrorCode::FeeTooLow),
        _ => Err(ProposalErrorCode::InvalidFee),
    }
}

/// `estimatesmartfee` reports BTC/kvB; convert to sat/vB.
#[allow(clippy::cast_precision_loss)]
fn estimate_to_sat_per_vb(estimate: &Value) -> Option<f64> {
    estimate["feerate"]
        .as_f64()
        .filter(|rate| *rate > 0.0)
        .map(|rate| rate * SATS_PER_BTC as f64 / 1000.0)
}

/// Map a bitcoin-cli error onto the code the form knows how to show.
fn proposal_error(message: &str) -> ProposalErrorCode {
    let lower = message.to_lowercase();
    if lower.contains("insufficient funds") || lower.contains("too small to pay the fee") {
        ProposalErrorCode::InsufficientFunds
    } else if lower.contains("invalid bitcoin address") || lower.contains("invalid address") {
        ProposalErrorCode::InvalidAddress
    } else if (lower.contains("fee rate") && (lower.contains("lower than") || lower.contains("too low")))
        || lower.contains("min relay fee not met")
    {
        ProposalErrorCode::FeeTooLow
    } else if lower.contains("invalid amount")
        || lower.contains("amount out of range")
        || lower.contains("amount too small")
        || lower.contains("dust")
    {
        ProposalErrorCode::InvalidAmount
    } else {
        ProposalErrorCode::Unknown(message.to_string())
    }
}

fn to_fiat(amount: &str, fiat: &str, unit: BtcUnit, rates: &BTreeMap<String, f64>) -> Result<String> {
    let sats = parse_amount(amount, unit)?;
    if fiat == BTC_FIAT {
        return Ok(format_sats(sats, unit));
    }
    let rate = rates
        .get(fiat)
        .ok_or_else(|| Error::UnknownCurrency(fiat.to_string()))?;

    #[allow(clippy::cast_precision_loss)]
    let value = sats as f64 / SATS_PER_BTC as f64 * rate;
    Ok(format!("{value:.2}"))
}

fn from_fiat(amount: &str, fiat: &str, unit: BtcUnit, rates: &BTreeMap<String, f64>) -> Result<String> {
    if fiat == BTC_FIAT {
        return Ok(format_sats(parse_amount(amount, unit)?, unit));
    }
    let rate = rates
        .get(fiat)
        .ok_or_else(|| Error::UnknownCurrency(fiat.to_string()))?;
    let value: f64 = amount
        .trim()
        .parse()
        .ok()
        .filter(|value: &f64| value.is_finite() && *value >= 0.0)
        .ok_or_else(|| Error::InvalidAmount(amount.to_string()))?;

    Ok(format_sats(btc_to_sats(value / rate), unit))
}

/// Fold `listtransactions` entries into one record per txid.
fn group_transactions(listed: &Value) -> Vec<TransactionData> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&Value>> = HashMap::new();
    for entry in listed.as_array().into_iter().flatten() {
        let txid = entry["txid"].as_str().unwrap_or_default().to_string();
        if !groups.contains_key(&txid) {
            order.push(txid.clone());
        }
        groups.entry(txid).or_default().push(entry);
    }

    order
        .into_iter()
        .filter_map(|txid| {
            let entries = groups.remove(&txid)?;
            let sum = |category: &[&str]| -> u64 {
                entries
                    .iter()
                    .filter(|e| category.contains(&e["category"].as_str().unwrap_or_default()))
                    .map(|e| btc_to_sats(e["amount"].as_f64().unwrap_or(0.0)))
                    .sum()
            };
            let has = |category: &str| entries.iter().any(|e| e["category"] == category);

            let received = sum(&["receive", "generate"]);
            let kind = match (has("send"), received > 0) {
                (true, true) => TxKind::SendSelf,
                (true, false) => TxKind::Send,
                (false, true) => TxKind::Receive,
                (false, false) => return None,
            };
            let amount = match kind {
                TxKind::Send => sum(&["send"]),
                TxKind::Receive | TxKind::SendSelf => received,
            };

            let first = entries.first()?;
            let fee = entries
                .iter()
                .find_map(|e| e["fee"].as_f64())
                .map(btc_to_sats);
            let confirmed = first["confirmations"].as_i64().unwrap_or(0) > 0;
            let timestamp = if confirmed {
                first["blocktime"]
                    .as_i64()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
            } else {
                None
            };

            Some(TransactionData {
                txid,
                timestamp,
                height: first["blockheight"].as_u64().unwrap_or(0),
                kind,
                amount,
                fee,
                note: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> BTreeMap<String, f64> {
        BTreeMap::from([("USD".to_string(), 50_000.0)])
    }

    #[test]
    fn test_proposal_error_mapping() {
        assert_eq!(
            proposal_error("error code: -4\nerror message:\nInsufficient funds"),
            ProposalErrorCode::InsufficientFunds
        );
        assert_eq!(
            proposal_error("error message:\nInvalid Bitcoin address: foo"),
            ProposalErrorCode::InvalidAddress
        );
        assert_eq!(
            proposal_error("Fee rate (0.500 sat/vB) is lower than the minimum fee rate setting"),
            ProposalErrorCode::FeeTooLow
        );
        assert_eq!(
            proposal_error("Transaction amount too small"),
            ProposalErrorCode::InvalidAmount
        );
        assert!(matches!(
            proposal_error("wallet is locked"),
            ProposalErrorCode::Unknown(_)
        ));
    }

    #[test]
    fn test_custom_fee_rate() {
        assert_eq!(custom_fee_rate("12.5"), Ok(12.5));
        assert_eq!(custom_fee_rate("0.5"), Err(ProposalErrorCode::FeeTooLow));
        assert_eq!(custom_fee_rate("fast"), Err(ProposalErrorCode::InvalidFee));
        assert_eq!(custom_fee_rate("-3"), Err(ProposalErrorCode::InvalidFee));
    }

    #[test]
    fn test_estimate_conversion() {
        let estimate = json!({ "feerate": 0.0002, "blocks": 6 });
        let rate = estimate_to_sat_per_vb(&estimate).unwrap();
        assert!((rate - 20.0).abs() < 1e-9);

        let missing = json!({ "errors": ["Insufficient data or no feerate found"], "blocks": 0 });
        assert!(estimate_to_sat_per_vb(&missing).is_none());
    }

    #[test]
    fn test_fiat_conversions() {
        assert_eq!(to_fiat("0.01", "USD", BtcUnit::Default, &rates()).unwrap(), "500.00");
        assert_eq!(
            from_fiat("500", "USD", BtcUnit::Default, &rates()).unwrap(),
            "0.01000000"
        );
        assert_eq!(from_fiat("500", "USD", BtcUnit::Sat, &rates()).unwrap(), "1000000");
        assert_eq!(to_fiat("2100", "BTC", BtcUnit::Sat, &rates()).unwrap(), "2100");
        assert!(matches!(
            to_fiat("1", "JPY", BtcUnit::Default, &rates()),
            Err(Error::UnknownCurrency(_))
        ));
        assert!(matches!(
            from_fiat("-5", "USD", BtcUnit::Default, &rates()),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_group_transactions() {
        let listed = json!([
            { "txid": "a", "category": "receive", "amount": 1.0, "confirmations": 3,
              "blocktime": 1_600_000_000, "blockheight": 101 },
            { "txid": "b", "category": "send", "amount": -0.5, "fee": -0.0001,
              "confirmations": 0 },
            { "txid": "c", "category": "send", "amount": -0.2, "fee": -0.00002,
              "confirmations": 1, "blocktime": 1_600_000_600, "blockheight": 102 },
            { "txid": "c", "category": "receive", "amount": 0.2,
              "confirmations": 1, "blocktime": 1_600_000_600, "blockheight": 102 },
            { "txid": "d", "category": "immature", "amount": 50.0, "confirmations": 1 }
        ]);

        let txs = group_transactions(&listed);
        assert_eq!(txs.len(), 3);

        assert_eq!(txs[0].kind, TxKind::Receive);
        assert_eq!(txs[0].amount, 100_000_000);
        assert_eq!(txs[0].height, 101);
        assert!(txs[0].timestamp.is_some());

        assert_eq!(txs[1].kind, TxKind::Send);
        assert_eq!(txs[1].amount, 50_000_000);
        assert_eq!(txs[1].fee, Some(10_000));
        assert!(txs[1].timestamp.is_none());

        assert_eq!(txs[2].kind, TxKind::SendSelf);
        assert_eq!(txs[2].fee, Some(2_000));
    }
}
