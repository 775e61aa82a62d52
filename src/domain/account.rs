use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type AccountId = Uuid;

/// The authenticated owner of a set of friend ledgers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(name: String, email: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            created_at: Utc::now(),
        }
    }
}

/// Account-wide totals derived from all friend balances.
/// Never stored - recomputed from the ledgers on every read so they
/// cannot drift from the underlying balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTotals {
    /// Sum of positive friend balances (money friends owe you)
    pub total_owed_to_you_cents: Cents,
    /// Sum of absolute negative friend balances (money you owe friends)
    pub total_you_owe_cents: Cents,
    /// total_owed_to_you - total_you_owe
    pub net_balance_cents: Cents,
}
