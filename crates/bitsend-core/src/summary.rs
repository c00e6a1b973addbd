//! Per-coin balance summary.

use std::collections::HashMap;

use crate::account::{Account, AccountCode, Amount, Balance, CoinCode};
use crate::units::{BtcUnit, format_sats, parse_amount};

/// One row of the coin balance table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinRow {
    pub coin_code: CoinCode,
    pub coin_name: String,
    /// `None` while unknown, e.g. Bitcoin listed only for Lightning.
    pub balance: Option<Amount>,
}

/// Coins to list, in the order their first account appears.
///
/// Wallets with Lightning always show a Bitcoin row, even without an
/// on-chain Bitcoin account.
pub fn coins_with_lightning(accounts: &[Account], lightning_enabled: bool) -> Vec<(CoinCode, String)> {
    let mut coins: Vec<(CoinCode, String)> = Vec::new();
    for account in accounts {
        if !coins.iter().any(|(code, _)| *code == account.coin_code) {
            coins.push((account.coin_code, account.coin_name.clone()));
        }
    }

    if lightning_enabled && !coins.iter().any(|(code, _)| *code == CoinCode::Btc) {
        coins.push((CoinCode::Btc, "Bitcoin".to_string()));
    }

    coins
}

/// Build the table rows, summing the available balance of each coin's
/// accounts.
pub fn coin_rows(
    accounts: &[Account],
    balances: &HashMap<AccountCode, Balance>,
    lightning_enabled: bool,
    unit: BtcUnit,
) -> Vec<CoinRow> {
    coins_with_lightning(accounts, lightning_enabled)
        .into_iter()
        .map(|(coin_code, coin_name)| {
            let coin_balances: Vec<&Balance> = accounts
                .iter()
                .filter(|account| account.coin_code == coin_code)
                .filter_map(|account| balances.get(&account.code))
                .collect();

            let balance = coin_balances.first().map(|first| {
                let total: u64 = coin_balances
                    .iter()
                    .filter_map(|balance| parse_amount(&balance.available.amount, unit).ok())
                    .sum();
                Amount::new(format_sats(total, unit), first.available.unit.clone())
            });

            CoinRow {
                coin_code,
                coin_name,
                balance,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(code: &str, coin_code: CoinCode, coin_name: &str) -> Account {
        Account {
            code: code.into(),
            coin_code,
            coin_name: coin_name.into(),
            name: code.into(),
            block_explorer_tx_prefix: String::new(),
        }
    }

    fn balance(amount: &str) -> Balance {
        Balance {
            has_available: true,
            available: Amount::new(amount, "RBTC"),
            has_incoming: false,
            incoming: Amount::new("0", "RBTC"),
        }
    }

    #[test]
    fn test_grouping_keeps_first_seen_order() {
        let accounts = vec![
            account("ltc-0", CoinCode::Ltc, "Litecoin"),
            account("btc-0", CoinCode::Btc, "Bitcoin"),
            account("ltc-1", CoinCode::Ltc, "Litecoin 2"),
        ];
        let coins = coins_with_lightning(&accounts, true);
        assert_eq!(
            coins,
            vec![
                (CoinCode::Ltc, "Litecoin".to_string()),
                (CoinCode::Btc, "Bitcoin".to_string())
            ]
        );
    }

    #[test]
    fn test_lightning_adds_bitcoin() {
        let accounts = vec![account("eth-0", CoinCode::Eth, "Ethereum")];
        assert_eq!(coins_with_lightning(&accounts, false).len(), 1);

        let coins = coins_with_lightning(&accounts, true);
        assert_eq!(coins.last().unwrap(), &(CoinCode::Btc, "Bitcoin".to_string()));
    }

    #[test]
    fn test_rows_sum_accounts() {
        let accounts = vec![
            account("rbtc-0", CoinCode::Rbtc, "Bitcoin Regtest"),
            account("rbtc-1", CoinCode::Rbtc, "Bitcoin Regtest"),
        ];
        let balances = HashMap::from([
            (AccountCode::new("rbtc-0"), balance("0.50000000")),
            (AccountCode::new("rbtc-1"), balance("0.25000000")),
        ]);

        let rows = coin_rows(&accounts, &balances, true, BtcUnit::Default);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].balance.as_ref().unwrap().amount, "0.75000000");
        assert_eq!(rows[1].coin_code, CoinCode::Btc);
        assert!(rows[1].balance.is_none());
    }
}
