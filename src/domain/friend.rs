use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents, EPSILON_CENTS};

pub type FriendId = Uuid;

/// A relationship endpoint: one counterparty the account splits bills with.
///
/// The stored balance is from the account's point of view: positive means
/// the friend owes the account, negative means the account owes the friend.
/// It must always equal the fold of the pair's transactions in append order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Friend {
    pub id: FriendId,
    /// The account owning this relationship
    pub account_id: AccountId,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    /// Current balance in cents, maintained by the repository on every append
    pub balance_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl Friend {
    pub fn new(account_id: AccountId, name: String, email: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            name,
            email,
            avatar_url: None,
            balance_cents: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_avatar_url(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    /// A friend can only be removed once the pair is settled.
    pub fn is_settled(&self) -> bool {
        self.balance_cents.abs() <= EPSILON_CENTS
    }
}
