//! The ledger: an append-only list of postings with a cached balance.

use chrono::{DateTime, Utc};
use rkyv::Archive;
use serde::{Deserialize, Serialize};

use crate::codec::Consistency;

/// Root ledger structure.
///
/// This is the value that gets written to `.ledger` snapshots.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
pub struct Ledger {
    /// Human-readable ledger name.
    pub name: String,

    /// When the ledger was created (RFC 3339).
    pub created_at: String,

    /// Postings in the order they were recorded.
    pub entries: Vec<LedgerEntry>,

    /// Cached sum of all posting amounts, in minor units.
    pub balance_minor: i64,

    /// Sequence number of the most recent posting (0 when empty).
    pub last_sequence: u64,
}

/// A single posting.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
pub struct LedgerEntry {
    /// Monotonic sequence number, starting at 1.
    pub sequence: u64,

    /// Account the posting applies to.
    pub account: String,

    /// Signed amount in minor units (cents).
    pub amount_minor: i64,

    /// Optional free-form note.
    pub memo: Option<String>,

    /// When the posting was recorded (RFC 3339).
    pub recorded_at: String,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now().to_rfc3339(),
            entries: Vec::new(),
            balance_minor: 0,
            last_sequence: 0,
        }
    }

    /// Append a posting and return its sequence number.
    ///
    /// Returns `None`, leaving the ledger unchanged, if the posting would
    /// overflow the balance or the sequence counter.
    pub fn record(
        &mut self,
        account: impl Into<String>,
        amount_minor: i64,
        memo: Option<String>,
    ) -> Option<u64> {
        let balance = self.balance_minor.checked_add(amount_minor)?;
        let sequence = self.last_sequence.checked_add(1)?;

        self.balance_minor = balance;
        self.last_sequence = sequence;
        self.entries.push(LedgerEntry {
            sequence,
            account: account.into(),
            amount_minor,
            memo,
            recorded_at: Utc::now().to_rfc3339(),
        });
        Some(sequence)
    }

    /// Sum of postings for one account.
    ///
    /// Widened so a single account can run past `i64` while the ledger as a
    /// whole stays in range.
    pub fn account_balance(&self, account: &str) -> i128 {
        self.entries
            .iter()
            .filter(|entry| entry.account == account)
            .map(|entry| i128::from(entry.amount_minor))
            .sum()
    }

    /// Parse the created_at timestamp.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl Consistency for Ledger {
    /// The cached balance matches the postings, and sequence numbers are
    /// strictly increasing up to `last_sequence`.
    fn is_consistent(&self) -> bool {
        let sum: i128 = self
            .entries
            .iter()
            .map(|entry| i128::from(entry.amount_minor))
            .sum();
        if sum != i128::from(self.balance_minor) {
            return false;
        }

        let increasing = self
            .entries
            .windows(2)
            .all(|pair| pair[0].sequence < pair[1].sequence);
        let tail = self.entries.last().map_or(0, |entry| entry.sequence);

        increasing && tail == self.last_sequence
    }
}
