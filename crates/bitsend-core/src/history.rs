//! Transaction history with running balances.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Direction of a wallet transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TxKind {
    Receive,
    Send,
    SendSelf,
}

/// A wallet transaction as reported by the backend. Amounts are in satoshis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionData {
    pub txid: String,
    /// Block time; `None` while unconfirmed.
    pub timestamp: Option<DateTime<Utc>>,
    pub height: u64,
    pub kind: TxKind,
    pub amount: u64,
    pub fee: Option<u64>,
    pub note: Option<String>,
}

impl TransactionData {
    /// Balance change caused by this transaction.
    #[allow(clippy::cast_possible_wrap)]
    pub fn delta(&self) -> i64 {
        let fee = self.fee.unwrap_or(0) as i64;
        match self.kind {
            TxKind::Receive => self.amount as i64,
            TxKind::Send => -(self.amount as i64) - fee,
            TxKind::SendSelf => -fee,
        }
    }
}

/// A transaction with the account balance right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedTransaction {
    pub tx: TransactionData,
    pub balance: i64,
}

/// Balance at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeseriesEntry {
    pub time: DateTime<Utc>,
    pub value: i64,
}

/// Transactions ordered newest first, unconfirmed ones on top.
#[derive(Debug, Clone, Default)]
pub struct OrderedTransactions(Vec<OrderedTransaction>);

impl OrderedTransactions {
    pub fn new(mut txs: Vec<TransactionData>) -> Self {
        txs.sort_by(|a, b| match (a.timestamp, b.timestamp) {
            (None, None) => b.height.cmp(&a.height),
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(ta), Some(tb)) => tb.cmp(&ta).then(b.height.cmp(&a.height)),
        });

        let mut balance = 0i64;
        let mut ordered: Vec<OrderedTransaction> = txs
            .into_iter()
            .rev()
            .map(|tx| {
                balance += tx.delta();
                OrderedTransaction { tx, balance }
            })
            .collect();
        ordered.reverse();

        Self(ordered)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OrderedTransaction> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Balance after the newest transaction.
    pub fn balance(&self) -> i64 {
        self.0.first().map_or(0, |entry| entry.balance)
    }

    /// Sample the confirmed balance every `interval` from `start` to `end`
    /// inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if `interval` is not positive or `end`
    /// is before `start`.
    pub fn timeseries(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: TimeDelta,
    ) -> Result<Vec<TimeseriesEntry>> {
        if interval <= TimeDelta::zero() {
            return Err(Error::InvalidRange(format!(
                "interval must be positive, got {interval}"
            )));
        }
        if end < start {
            return Err(Error::InvalidRange(format!("{end} is before {start}")));
        }

        // Oldest first, confirmed only.
        let confirmed: Vec<(DateTime<Utc>, i64)> = self
            .0
            .iter()
            .rev()
            .filter_map(|entry| entry.tx.timestamp.map(|ts| (ts, entry.balance)))
            .collect();

        let mut entries = Vec::new();
        let mut next = 0;
        let mut value = 0;
        let mut time = start;
        while time <= end {
            while let Some(&(ts, balance)) = confirmed.get(next) {
                if ts > time {
                    break;
                }
                value = balance;
                next += 1;
            }
            entries.push(TimeseriesEntry { time, value });
            time += interval;
        }

        Ok(entries)
    }
}

impl<'a> IntoIterator for &'a OrderedTransactions {
    type Item = &'a OrderedTransaction;
    type IntoIter = std::slice::Iter<'a, OrderedTransaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
