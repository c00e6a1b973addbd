//! Payment URI parsing for scanned or pasted recipients.

use url::Url;

/// Schemes accepted in a payment URI.
const PAYMENT_SCHEMES: &[&str] = &["bitcoin", "litecoin", "ethereum"];

/// Recipient extracted from a payment URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub address: String,
    /// Raw `amount` parameter, only read for bitcoin-based coins.
    pub amount: Option<String>,
}

/// The URI uses a scheme we cannot pay to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid format: unsupported scheme '{0}'")]
pub struct InvalidFormat(pub String);

/// Parse a payment URI such as `bitcoin:bcrt1q...?amount=0.1`.
///
/// Input that does not parse as a URI at all is taken verbatim as the
/// address.
///
/// # Errors
///
/// Returns [`InvalidFormat`] when the input is a URI with a scheme other than
/// `bitcoin:`, `litecoin:` or `ethereum:`.
pub fn parse_payment_uri(
    uri: &str,
    bitcoin_based: bool,
) -> Result<PaymentRequest, InvalidFormat> {
    let uri = uri.trim();
    let Ok(url) = Url::parse(uri) else {
        return Ok(PaymentRequest {
            address: uri.to_string(),
            amount: None,
        });
    };

    if !PAYMENT_SCHEMES.contains(&url.scheme()) {
        return Err(InvalidFormat(url.scheme().to_string()));
    }

    let amount = if bitcoin_based {
        url.query_pairs()
            .find(|(key, _)| key == "amount")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    } else {
        None
    };

    Ok(PaymentRequest {
        address: url.path().to_string(),
        amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_address() {
        let request = parse_payment_uri("bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080", true).unwrap();
        assert_eq!(request.address, "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080");
        assert_eq!(request.amount, None);
    }

    #[test]
    fn test_bitcoin_uri_with_amount() {
        let request = parse_payment_uri("bitcoin:bc1qexample?amount=0.001&label=shop", true).unwrap();
        assert_eq!(request.address, "bc1qexample");
        assert_eq!(request.amount.as_deref(), Some("0.001"));
    }

    #[test]
    fn test_amount_ignored_for_account_based_coins() {
        let request = parse_payment_uri("ethereum:0xabc?amount=1", false).unwrap();
        assert_eq!(request.address, "0xabc");
        assert_eq!(request.amount, None);
    }

    #[test]
    fn test_unknown_scheme() {
        let err = parse_payment_uri("https://example.com/pay", true).unwrap_err();
        assert_eq!(err, InvalidFormat("https".into()));
    }
}
