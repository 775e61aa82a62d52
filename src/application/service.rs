use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{
    self, default_expense_description, Account, AccountId, AccountTotals, Cents, Friend, FriendId,
    Party, Transaction, TransactionKind,
};
use crate::storage::Repository;

use super::AppError;

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, API, TUI, etc.).
pub struct LedgerService {
    repo: Repository,
    /// One mutex per (account, friend) pair. Every mutating operation on a
    /// pair runs under its lock, so two concurrent appends can never both
    /// read the same prior balance, and a removal can never interleave with
    /// an append. Entries stay for the process lifetime; re-creating one
    /// while a waiter still holds the old Arc would split the pair across
    /// two locks.
    pair_locks: Mutex<HashMap<(AccountId, FriendId), Arc<Mutex<()>>>>,
}

/// One page of a pair's transaction history, most recent first.
pub struct HistoryPage {
    pub items: Vec<Transaction>,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub total_count: i64,
}

/// An account together with its recomputed aggregate totals.
pub struct AccountSummary {
    pub account: Account,
    pub totals: AccountTotals,
    pub friend_count: usize,
}

/// A friend whose stored balance disagrees with the ledger replay.
pub struct BalanceMismatch {
    pub friend_name: String,
    pub stored_cents: Cents,
    pub replayed_cents: Cents,
}

/// A transaction whose balance_after snapshot breaks the running chain.
pub struct ChainBreak {
    pub friend_name: String,
    pub sequence: i64,
    pub expected_cents: Cents,
    pub recorded_cents: Cents,
}

/// Full ledger audit: stored balances vs replay, snapshot chains, and
/// structural counters.
pub struct IntegrityReport {
    pub account_count: i64,
    pub friend_count: i64,
    pub transaction_count: i64,
    pub orphan_transactions: i64,
    pub invalid_amounts: i64,
    pub balance_mismatches: Vec<BalanceMismatch>,
    pub chain_breaks: Vec<ChainBreak>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_transactions == 0
            && self.invalid_amounts == 0
            && self.balance_mismatches.is_empty()
            && self.chain_breaks.is_empty()
    }
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            pair_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    async fn pair_lock(&self, account_id: AccountId, friend_id: FriendId) -> Arc<Mutex<()>> {
        let mut locks = self.pair_locks.lock().await;
        locks
            .entry((account_id, friend_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ========================
    // Account operations
    // ========================

    /// Create a new account.
    pub async fn create_account(&self, name: String, email: String) -> Result<Account, AppError> {
        if self.repo.get_account_by_email(&email).await?.is_some() {
            return Err(AppError::AccountAlreadyExists(email));
        }

        let account = Account::new(name, email);
        self.repo.save_account(&account).await?;
        info!(account = %account.id, email = %account.email, "created account");
        Ok(account)
    }

    /// Get an account by ID.
    pub async fn get_account(&self, account_id: AccountId) -> Result<Account, AppError> {
        self.repo
            .get_account(account_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))
    }

    /// Get an account by email.
    pub async fn get_account_by_email(&self, email: &str) -> Result<Account, AppError> {
        self.repo
            .get_account_by_email(email)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(email.to_string()))
    }

    /// Update an account's profile fields.
    pub async fn update_account(
        &self,
        account_id: AccountId,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<Account, AppError> {
        let mut account = self.get_account(account_id).await?;

        if let Some(email) = email {
            if email != account.email && self.repo.get_account_by_email(&email).await?.is_some() {
                return Err(AppError::AccountAlreadyExists(email));
            }
            account.email = email;
        }
        if let Some(name) = name {
            account.name = name;
        }

        self.repo.update_account(&account).await?;
        Ok(account)
    }

    /// Get an account with its recomputed totals. The totals are never
    /// cached; they are derived from the current friend balances on every
    /// call, so they cannot drift from the ledgers.
    pub async fn account_summary(&self, account_id: AccountId) -> Result<AccountSummary, AppError> {
        let account = self.get_account(account_id).await?;
        let balances = self.repo.friend_balances(account_id).await?;
        let friend_count = balances.len();
        let totals = domain::aggregate_totals(balances);

        Ok(AccountSummary {
            account,
            totals,
            friend_count,
        })
    }

    /// Recomputed aggregate totals for an account.
    pub async fn account_totals(&self, account_id: AccountId) -> Result<AccountTotals, AppError> {
        self.get_account(account_id).await?;
        let balances = self.repo.friend_balances(account_id).await?;
        Ok(domain::aggregate_totals(balances))
    }

    // ========================
    // Friend operations
    // ========================

    /// Add a friend to an account.
    pub async fn add_friend(
        &self,
        account_id: AccountId,
        name: String,
        email: String,
        avatar_url: Option<String>,
    ) -> Result<Friend, AppError> {
        self.get_account(account_id).await?;

        if self
            .repo
            .get_friend_by_name(account_id, &name)
            .await?
            .is_some()
        {
            return Err(AppError::FriendAlreadyExists(name));
        }

        let mut friend = Friend::new(account_id, name, email);
        if let Some(url) = avatar_url {
            friend = friend.with_avatar_url(url);
        }

        self.repo.save_friend(&friend).await?;
        info!(account = %account_id, friend = %friend.id, name = %friend.name, "added friend");
        Ok(friend)
    }

    /// Get a friend by ID.
    pub async fn get_friend(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
    ) -> Result<Friend, AppError> {
        self.repo
            .get_friend(account_id, friend_id)
            .await?
            .ok_or_else(|| AppError::FriendNotFound(friend_id.to_string()))
    }

    /// Get a friend by name within an account.
    pub async fn get_friend_by_name(
        &self,
        account_id: AccountId,
        name: &str,
    ) -> Result<Friend, AppError> {
        self.repo
            .get_friend_by_name(account_id, name)
            .await?
            .ok_or_else(|| AppError::FriendNotFound(name.to_string()))
    }

    /// List all friends of an account with their current balances.
    pub async fn list_friends(&self, account_id: AccountId) -> Result<Vec<Friend>, AppError> {
        self.get_account(account_id).await?;
        Ok(self.repo.list_friends(account_id).await?)
    }

    /// Update a friend's profile fields. Balances are untouchable here.
    pub async fn update_friend(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
        name: Option<String>,
        email: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<Friend, AppError> {
        let mut friend = self.get_friend(account_id, friend_id).await?;

        if let Some(name) = name {
            if name != friend.name
                && self
                    .repo
                    .get_friend_by_name(account_id, &name)
                    .await?
                    .is_some()
            {
                return Err(AppError::FriendAlreadyExists(name));
            }
            friend.name = name;
        }
        if let Some(email) = email {
            friend.email = email;
        }
        if let Some(url) = avatar_url {
            friend.avatar_url = Some(url);
        }

        self.repo.update_friend(&friend).await?;
        Ok(friend)
    }

    /// Whether a friend could be removed right now (balance settled).
    /// Advisory only: remove_friend re-checks under the pair lock, since a
    /// transaction may land between this call and the removal.
    pub async fn can_remove_friend(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
    ) -> Result<bool, AppError> {
        let friend = self.get_friend(account_id, friend_id).await?;
        Ok(friend.is_settled())
    }

    /// Remove a friend and the pair's entire transaction history.
    /// Refused while a non-zero balance exists. The balance is re-read under
    /// the pair lock, so an append racing with this removal either lands
    /// before the check (and blocks the removal) or after the pair is gone
    /// (and fails with FriendNotFound).
    pub async fn remove_friend(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
    ) -> Result<Friend, AppError> {
        let lock = self.pair_lock(account_id, friend_id).await;
        let _guard = lock.lock().await;

        let friend = self.get_friend(account_id, friend_id).await?;
        if !friend.is_settled() {
            return Err(AppError::BalanceNotZero {
                name: friend.name,
                balance_cents: friend.balance_cents,
            });
        }

        self.repo.delete_friend(account_id, friend_id).await?;

        info!(account = %account_id, friend = %friend.id, name = %friend.name, "removed friend");
        Ok(friend)
    }

    // ========================
    // Ledger operations
    // ========================

    /// Record a bill split with a friend. Returns the created transaction,
    /// whose balance_after already carries the authoritative new balance -
    /// no follow-up read is needed for correctness.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_expense(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
        total_cents: Cents,
        account_share_cents: Cents,
        friend_share_cents: Cents,
        payer: Party,
        description: Option<String>,
    ) -> Result<Transaction, AppError> {
        let lock = self.pair_lock(account_id, friend_id).await;
        let _guard = lock.lock().await;

        let friend = self.get_friend(account_id, friend_id).await?;
        let now = Utc::now();
        let kind = TransactionKind::Expense {
            total_cents,
            account_share_cents,
            friend_share_cents,
            payer,
            description: description.unwrap_or_else(|| default_expense_description(now)),
        };

        domain::validate(&kind, friend.balance_cents)?;
        let new_balance = domain::apply(friend.balance_cents, &kind);

        let mut transaction = Transaction::new(account_id, friend_id, kind, now, new_balance);
        self.repo.append_transaction(&mut transaction).await?;

        info!(
            account = %account_id,
            friend = %friend_id,
            sequence = transaction.sequence,
            balance_after = new_balance,
            "recorded expense"
        );
        Ok(transaction)
    }

    /// Record a settlement paying a pair's balance down toward zero.
    pub async fn settle(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
        amount_cents: Cents,
        settler: Party,
    ) -> Result<Transaction, AppError> {
        let lock = self.pair_lock(account_id, friend_id).await;
        let _guard = lock.lock().await;

        let friend = self.get_friend(account_id, friend_id).await?;
        let kind = TransactionKind::Settlement {
            amount_cents,
            settler,
        };

        domain::validate(&kind, friend.balance_cents)?;
        let new_balance = domain::apply(friend.balance_cents, &kind);

        let mut transaction = Transaction::new(account_id, friend_id, kind, Utc::now(), new_balance);
        self.repo.append_transaction(&mut transaction).await?;

        info!(
            account = %account_id,
            friend = %friend_id,
            sequence = transaction.sequence,
            balance_after = new_balance,
            "recorded settlement"
        );
        Ok(transaction)
    }

    /// Current balance of a pair, from the account's point of view.
    pub async fn get_balance(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
    ) -> Result<Cents, AppError> {
        let friend = self.get_friend(account_id, friend_id).await?;
        Ok(friend.balance_cents)
    }

    /// One page of a pair's history, most recent first. Ordering follows
    /// append order, not timestamps, so it stays deterministic even for
    /// transactions created in the same instant. Pages are 1-indexed;
    /// a page past the end yields an empty item set, not an error.
    pub async fn list_history(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
        page: u32,
        page_size: u32,
    ) -> Result<HistoryPage, AppError> {
        if page == 0 || page_size == 0 {
            return Err(AppError::InvalidPagination { page, page_size });
        }

        self.get_friend(account_id, friend_id).await?;

        let total_count = self
            .repo
            .count_transactions_for_pair(account_id, friend_id)
            .await?;
        let total_pages = (total_count as u64).div_ceil(page_size as u64) as u32;

        let offset = (page as i64 - 1) * page_size as i64;
        let items = if offset < total_count {
            self.repo
                .list_history_page(account_id, friend_id, page_size as i64, offset)
                .await?
        } else {
            Vec::new()
        };

        debug!(
            account = %account_id,
            friend = %friend_id,
            page,
            returned = items.len(),
            "listed history page"
        );

        Ok(HistoryPage {
            items,
            page,
            page_size,
            total_pages,
            total_count,
        })
    }

    /// A pair's full ledger in append order (oldest first).
    pub async fn list_pair_transactions(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
    ) -> Result<Vec<Transaction>, AppError> {
        self.get_friend(account_id, friend_id).await?;
        Ok(self
            .repo
            .list_transactions_for_pair(account_id, friend_id)
            .await?)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Audit the whole database: every friend's stored balance against the
    /// SQL replay, every pair's balance_after chain against a fold from
    /// zero, plus structural counters.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let stats = self.repo.get_integrity_stats().await?;

        let mut balance_mismatches = Vec::new();
        let mut chain_breaks = Vec::new();

        for friend in self.repo.list_all_friends().await? {
            let replayed = self.repo.replay_balance(friend.account_id, friend.id).await?;
            if replayed != friend.balance_cents {
                balance_mismatches.push(BalanceMismatch {
                    friend_name: friend.name.clone(),
                    stored_cents: friend.balance_cents,
                    replayed_cents: replayed,
                });
            }

            let transactions = self
                .repo
                .list_transactions_for_pair(friend.account_id, friend.id)
                .await?;
            let mut running = 0;
            for tx in &transactions {
                running = domain::apply(running, &tx.kind);
                if tx.balance_after_cents != running {
                    chain_breaks.push(ChainBreak {
                        friend_name: friend.name.clone(),
                        sequence: tx.sequence,
                        expected_cents: running,
                        recorded_cents: tx.balance_after_cents,
                    });
                }
            }
        }

        Ok(IntegrityReport {
            account_count: stats.account_count,
            friend_count: stats.friend_count,
            transaction_count: stats.transaction_count,
            orphan_transactions: stats.orphan_transactions,
            invalid_amounts: stats.invalid_amounts,
            balance_mismatches,
            chain_breaks,
        })
    }
}
