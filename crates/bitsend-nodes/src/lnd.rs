//! Lightning payments through an LND node.

use std::sync::Arc;

use async_trait::async_trait;
use bitsend_core::{
    Error, InputType, LightningApi, LightningError, LnInvoice, LndConfig, SdkError, SdkErrorKind,
};
use bitsend_docker::ContainerManager;
use serde_json::Value;

/// Invoice prefixes for mainnet, testnet, signet and regtest.
const BOLT11_PREFIXES: &[&str] = &["lnbcrt", "lntbs", "lnbc", "lntb"];

/// Address prefixes accepted as on-chain destinations.
const ADDRESS_PREFIXES: &[&str] = &["bcrt1", "bc1", "tb1"];

/// Length of a hex-encoded compressed public key.
const NODE_ID_LEN: usize = 66;

/// What [`classify`] makes of a raw input before asking the node.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Classified {
    Bolt11(String),
    Other(InputType),
}

/// Wraps `lncli` in an LND container.
pub struct LndWallet {
    containers: Arc<ContainerManager>,
    node: LndConfig,
}

impl LndWallet {
    pub fn new(containers: Arc<ContainerManager>, node: LndConfig) -> Self {
        Self { containers, node }
    }

    fn cli(&self, args: &[&str]) -> Vec<String> {
        let mut cmd = vec![
            "lncli".to_string(),
            format!("--network={}", self.node.network),
            "--tlscertpath=/home/lnd/.lnd/tls.cert".to_string(),
            format!(
                "--macaroonpath=/home/lnd/.lnd/data/chain/bitcoin/{}/admin.macaroon",
                self.node.network
            ),
        ];
        cmd.extend(args.iter().map(ToString::to_string));
        cmd
    }

    async fn decode(&self, bolt11: &str) -> Result<LnInvoice, LightningError> {
        let output = self
            .containers
            .exec(&self.node.container, self.cli(&["decodepayreq", bolt11]))
            .await?;
        if !output.success() {
            return Err(SdkError::new(
                SdkErrorKind::InvalidInvoice,
                rpc_description(output.message()),
            )
            .into());
        }

        let decoded: Value = serde_json::from_str(output.stdout.trim()).map_err(Error::from)?;
        let invoice = invoice_from_decoded(bolt11, &decoded);
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        if invoice.timestamp + invoice.expiry < now {
            return Err(SdkError::new(SdkErrorKind::InvoiceExpired, "Invoice has expired").into());
        }
        Ok(invoice)
    }
}

#[async_trait]
impl LightningApi for LndWallet {
    async fn parse_input(&self, input: &str) -> Result<InputType, LightningError> {
        match classify(input)? {
            Classified::Bolt11(bolt11) => {
                let invoice = self.decode(&bolt11).await?;
                tracing::debug!(hash = %invoice.payment_hash, "decoded invoice");
                Ok(InputType::Bolt11 { invoice })
            }
            Classified::Other(parsed) => Ok(parsed),
        }
    }

    async fn send_payment(&self, bolt11: &str) -> Result<(), LightningError> {
        let output = self
            .containers
            .exec(
                &self.node.container,
                self.cli(&["payinvoice", "--json", "--force", bolt11]),
            )
            .await?;

        if !output.success() {
            let message = rpc_description(output.message());
            tracing::warn!(%message, "payment rejected");
            return Err(SdkError::new(SdkErrorKind::PaymentFailed, message).into());
        }

        let status = last_json_value(&output.stdout).ok_or_else(|| {
            Error::Backend(format!("unexpected payinvoice output: {}", output.stdout.trim()))
        })?;
        payment_outcome(&status)?;
        tracing::info!(hash = %status["payment_hash"].as_str().unwrap_or_default(), "payment settled");
        Ok(())
    }
}

/// Sort an input into a BOLT11 invoice to decode, or a final answer.
fn classify(raw: &str) -> Result<Classified, SdkError> {
    let trimmed = raw.trim();
    let input = trimmed
        .get(..10)
        .filter(|scheme| scheme.eq_ignore_ascii_case("lightning:"))
        .map_or(trimmed, |_| &trimmed[10..]);
    let lower = input.to_ascii_lowercase();

    if BOLT11_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return Ok(Classified::Bolt11(lower));
    }

    if let Some(rest) = lower.strip_prefix("bitcoin:") {
        let address = rest.split('?').next().unwrap_or_default();
        return Ok(Classified::Other(InputType::BitcoinAddress {
            address: address.to_string(),
        }));
    }
    if ADDRESS_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return Ok(Classified::Other(InputType::BitcoinAddress {
            address: input.to_string(),
        }));
    }

    if input.len() == NODE_ID_LEN && input.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(Classified::Other(InputType::NodeId {
            node_id: lower,
        }));
    }

    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(Classified::Other(InputType::Url {
            url: input.to_string(),
        }));
    }

    Err(SdkError::new(SdkErrorKind::Generic, "Unrecognized input type"))
}

/// lncli prints numbers as strings.
fn number(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn invoice_from_decoded(bolt11: &str, decoded: &Value) -> LnInvoice {
    LnInvoice {
        bolt11: bolt11.to_string(),
        payee_pubkey: decoded["destination"].as_str().unwrap_or_default().to_string(),
        payment_hash: decoded["payment_hash"].as_str().unwrap_or_default().to_string(),
        description: decoded["description"]
            .as_str()
            .filter(|d| !d.is_empty())
            .map(ToString::to_string),
        amount_msat: number(&decoded["num_msat"]).filter(|msat| *msat > 0),
        timestamp: number(&decoded["timestamp"]).unwrap_or(0),
        expiry: number(&decoded["expiry"]).unwrap_or(0),
    }
}

/// gRPC errors read `[lncli] rpc error: code = X desc = <text>`; keep the text.
fn rpc_description(message: &str) -> String {
    message
        .split_once("desc = ")
        .map_or(message, |(_, desc)| desc)
        .trim()
        .to_string()
}

/// `payinvoice --json` may stream several updates; the last one is final.
fn last_json_value(output: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(output)
        .into_iter::<Value>()
        .map_while(Result::ok)
        .last()
}

fn payment_outcome(status: &Value) -> Result<(), SdkError> {
    if status["status"] == "SUCCEEDED" {
        return Ok(());
    }

    let reason = status["failure_reason"].as_str().unwrap_or("FAILURE_REASON_ERROR");
    let (kind, message) = match reason {
        "FAILURE_REASON_TIMEOUT" => (SdkErrorKind::PaymentTimeout, "Payment timed out"),
        "FAILURE_REASON_NO_ROUTE" => (SdkErrorKind::PaymentFailed, "No route found"),
        "FAILURE_REASON_INSUFFICIENT_BALANCE" => {
            (SdkErrorKind::PaymentFailed, "Insufficient balance")
        }
        "FAILURE_REASON_INCORRECT_PAYMENT_DETAILS" => {
            (SdkErrorKind::PaymentFailed, "Incorrect payment details")
        }
        _ => (SdkErrorKind::PaymentFailed, "Payment failed"),
    };
    Err(SdkError::new(kind, message))
}
