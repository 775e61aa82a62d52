use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents, FriendId};

pub type TransactionId = Uuid;

/// Which side of the pair performed an action (paid a bill, settled up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Account,
    Friend,
}

impl Party {
    pub fn as_str(&self) -> &'static str {
        match self {
            Party::Account => "account",
            Party::Friend => "friend",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "account" => Some(Party::Account),
            "friend" => Some(Party::Friend),
            _ => None,
        }
    }
}

impl std::fmt::Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The two kinds of monetary events a pair's ledger records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransactionKind {
    /// A bill split between the account and the friend. The payer covered
    /// the whole bill, so the other side's share is what changes the balance.
    Expense {
        total_cents: Cents,
        account_share_cents: Cents,
        friend_share_cents: Cents,
        payer: Party,
        description: String,
    },
    /// A direct payment reducing an existing balance.
    Settlement { amount_cents: Cents, settler: Party },
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Expense { .. } => "expense",
            TransactionKind::Settlement { .. } => "settlement",
        }
    }
}

/// An immutable fact in a pair's append-only ledger.
/// Transactions are never mutated or reordered after creation; corrections
/// are made by recording new transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub friend_id: FriendId,
    /// Monotonically increasing append order, authoritative for history
    /// ordering (timestamps are for display only)
    pub sequence: i64,
    pub kind: TransactionKind,
    pub created_at: DateTime<Utc>,
    /// Running balance of the pair including this transaction
    pub balance_after_cents: Cents,
}

impl Transaction {
    /// Create a new transaction. Sequence number must be assigned by the repository.
    pub fn new(
        account_id: AccountId,
        friend_id: FriendId,
        kind: TransactionKind,
        created_at: DateTime<Utc>,
        balance_after_cents: Cents,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            friend_id,
            sequence: 0, // Will be set by repository
            kind,
            created_at,
            balance_after_cents,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match &self.kind {
            TransactionKind::Expense { description, .. } => Some(description),
            TransactionKind::Settlement { .. } => None,
        }
    }
}

/// Fallback description for an expense recorded without one.
pub fn default_expense_description(created_at: DateTime<Utc>) -> String {
    format!("Bill split - {}", created_at.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_roundtrip() {
        for party in [Party::Account, Party::Friend] {
            let s = party.as_str();
            assert_eq!(Party::from_str(s), Some(party));
        }
        assert_eq!(Party::from_str("nobody"), None);
    }

    #[test]
    fn test_kind_discriminator() {
        let expense = TransactionKind::Expense {
            total_cents: 10000,
            account_share_cents: 4000,
            friend_share_cents: 6000,
            payer: Party::Account,
            description: "Dinner".into(),
        };
        assert_eq!(expense.as_str(), "expense");

        let settlement = TransactionKind::Settlement {
            amount_cents: 6000,
            settler: Party::Friend,
        };
        assert_eq!(settlement.as_str(), "settlement");
    }

    #[test]
    fn test_default_expense_description() {
        let date = "2026-03-01T12:00:00Z".parse().unwrap();
        assert_eq!(default_expense_description(date), "Bill split - 2026-03-01");
    }
}
