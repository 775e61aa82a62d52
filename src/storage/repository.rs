use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, Cents, Friend, FriendId, Party, Transaction, TransactionKind,
};

use super::MIGRATION_001_INITIAL;

/// Statistics for ledger integrity verification.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub account_count: i64,
    pub friend_count: i64,
    pub transaction_count: i64,
    pub orphan_transactions: i64,
    pub invalid_amounts: i64,
}

/// Repository for persisting and querying accounts, friends and their ledgers.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given path.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Account operations
    // ========================

    /// Save a new account to the database.
    pub async fn save_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, email, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(&account.email)
        .bind(account.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    /// Get an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, created_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    /// Get an account by email.
    pub async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, created_at
            FROM accounts
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account by email")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    /// Update an account's profile fields (name, email).
    pub async fn update_account(&self, account: &Account) -> Result<()> {
        sqlx::query("UPDATE accounts SET name = ?, email = ? WHERE id = ?")
            .bind(&account.name)
            .bind(&account.email)
            .bind(account.id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update account")?;
        Ok(())
    }

    fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            name: row.get("name"),
            email: row.get("email"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Friend operations
    // ========================

    /// Save a new friend to the database.
    pub async fn save_friend(&self, friend: &Friend) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO friends (id, account_id, name, email, avatar_url, balance_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(friend.id.to_string())
        .bind(friend.account_id.to_string())
        .bind(&friend.name)
        .bind(&friend.email)
        .bind(&friend.avatar_url)
        .bind(friend.balance_cents)
        .bind(friend.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save friend")?;
        Ok(())
    }

    /// Get a friend by ID, scoped to the owning account.
    pub async fn get_friend(&self, account_id: AccountId, id: FriendId) -> Result<Option<Friend>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, name, email, avatar_url, balance_cents, created_at
            FROM friends
            WHERE id = ? AND account_id = ?
            "#,
        )
        .bind(id.to_string())
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch friend")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_friend(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a friend by name within an account.
    pub async fn get_friend_by_name(
        &self,
        account_id: AccountId,
        name: &str,
    ) -> Result<Option<Friend>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, name, email, avatar_url, balance_cents, created_at
            FROM friends
            WHERE account_id = ? AND name = ?
            "#,
        )
        .bind(account_id.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch friend by name")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_friend(&row)?)),
            None => Ok(None),
        }
    }

    /// List all friends of an account, with their stored balances.
    pub async fn list_friends(&self, account_id: AccountId) -> Result<Vec<Friend>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, name, email, avatar_url, balance_cents, created_at
            FROM friends
            WHERE account_id = ?
            ORDER BY name
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list friends")?;

        rows.iter().map(Self::row_to_friend).collect()
    }

    /// List all friends across all accounts. Used by integrity checking.
    pub async fn list_all_friends(&self) -> Result<Vec<Friend>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, name, email, avatar_url, balance_cents, created_at
            FROM friends
            ORDER BY account_id, name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list all friends")?;

        rows.iter().map(Self::row_to_friend).collect()
    }

    /// Update a friend's profile fields (name, email, avatar).
    /// The stored balance is only ever touched by append_transaction.
    pub async fn update_friend(&self, friend: &Friend) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE friends SET name = ?, email = ?, avatar_url = ?
            WHERE id = ? AND account_id = ?
            "#,
        )
        .bind(&friend.name)
        .bind(&friend.email)
        .bind(&friend.avatar_url)
        .bind(friend.id.to_string())
        .bind(friend.account_id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update friend")?;
        Ok(())
    }

    /// Delete a friend together with the pair's full transaction history.
    /// Both deletes run in one SQL transaction; the relationship is never
    /// left partially removed.
    pub async fn delete_friend(&self, account_id: AccountId, id: FriendId) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin delete transaction")?;

        sqlx::query("DELETE FROM transactions WHERE account_id = ? AND friend_id = ?")
            .bind(account_id.to_string())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to delete pair history")?;

        sqlx::query("DELETE FROM friends WHERE id = ? AND account_id = ?")
            .bind(id.to_string())
            .bind(account_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to delete friend")?;

        tx.commit().await.context("Failed to commit delete")?;
        Ok(())
    }

    /// Balances of all friend ledgers for an account, for aggregate totals.
    pub async fn friend_balances(&self, account_id: AccountId) -> Result<Vec<Cents>> {
        let rows = sqlx::query("SELECT balance_cents FROM friends WHERE account_id = ?")
            .bind(account_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch friend balances")?;

        Ok(rows.iter().map(|row| row.get("balance_cents")).collect())
    }

    fn row_to_friend(row: &sqlx::sqlite::SqliteRow) -> Result<Friend> {
        let id_str: String = row.get("id");
        let account_id_str: String = row.get("account_id");
        let created_at_str: String = row.get("created_at");

        Ok(Friend {
            id: Uuid::parse_str(&id_str).context("Invalid friend ID")?,
            account_id: Uuid::parse_str(&account_id_str).context("Invalid account ID")?,
            name: row.get("name"),
            email: row.get("email"),
            avatar_url: row.get("avatar_url"),
            balance_cents: row.get("balance_cents"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Transaction operations
    // ========================

    /// Append a transaction to its pair's ledger and move the stored balance
    /// to `balance_after_cents`, as one SQL transaction. Automatically
    /// assigns the next sequence number. On any failure nothing is visible:
    /// either both writes land or neither does.
    pub async fn append_transaction(&self, transaction: &mut Transaction) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin append transaction")?;

        // Get and increment sequence number inside the same transaction
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .context("Failed to get next sequence number")?;
        transaction.sequence = row.get("value");

        let (total, account_share, friend_share, payer, amount, settler, description) =
            match &transaction.kind {
                TransactionKind::Expense {
                    total_cents,
                    account_share_cents,
                    friend_share_cents,
                    payer,
                    description,
                } => (
                    Some(*total_cents),
                    Some(*account_share_cents),
                    Some(*friend_share_cents),
                    Some(payer.as_str()),
                    None,
                    None,
                    Some(description.as_str()),
                ),
                TransactionKind::Settlement {
                    amount_cents,
                    settler,
                } => (
                    None,
                    None,
                    None,
                    None,
                    Some(*amount_cents),
                    Some(settler.as_str()),
                    None,
                ),
            };

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, account_id, friend_id, sequence, kind,
                total_cents, account_share_cents, friend_share_cents, payer,
                amount_cents, settler, description, created_at, balance_after_cents
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.account_id.to_string())
        .bind(transaction.friend_id.to_string())
        .bind(transaction.sequence)
        .bind(transaction.kind.as_str())
        .bind(total)
        .bind(account_share)
        .bind(friend_share)
        .bind(payer)
        .bind(amount)
        .bind(settler)
        .bind(description)
        .bind(transaction.created_at.to_rfc3339())
        .bind(transaction.balance_after_cents)
        .execute(&mut *tx)
        .await
        .context("Failed to insert transaction")?;

        sqlx::query("UPDATE friends SET balance_cents = ? WHERE id = ? AND account_id = ?")
            .bind(transaction.balance_after_cents)
            .bind(transaction.friend_id.to_string())
            .bind(transaction.account_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to update stored balance")?;

        tx.commit().await.context("Failed to commit append")?;
        Ok(())
    }

    /// List a pair's full ledger in append order (oldest first).
    pub async fn list_transactions_for_pair(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, friend_id, sequence, kind,
                   total_cents, account_share_cents, friend_share_cents, payer,
                   amount_cents, settler, description, created_at, balance_after_cents
            FROM transactions
            WHERE account_id = ? AND friend_id = ?
            ORDER BY sequence
            "#,
        )
        .bind(account_id.to_string())
        .bind(friend_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pair transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// One page of a pair's ledger, most recent first.
    pub async fn list_history_page(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, friend_id, sequence, kind,
                   total_cents, account_share_cents, friend_share_cents, payer,
                   amount_cents, settler, description, created_at, balance_after_cents
            FROM transactions
            WHERE account_id = ? AND friend_id = ?
            ORDER BY sequence DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(account_id.to_string())
        .bind(friend_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch history page")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Count the transactions in a pair's ledger.
    pub async fn count_transactions_for_pair(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
    ) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM transactions WHERE account_id = ? AND friend_id = ?",
        )
        .bind(account_id.to_string())
        .bind(friend_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count pair transactions")?;

        Ok(row.get("count"))
    }

    /// Replay a pair's balance using SQL aggregation, without loading rows.
    /// Must always agree with the stored balance on the friend row.
    pub async fn replay_balance(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
    ) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(
                CASE kind
                    WHEN 'expense' THEN
                        CASE payer WHEN 'account' THEN friend_share_cents
                                   ELSE -account_share_cents END
                    ELSE
                        CASE settler WHEN 'friend' THEN -amount_cents
                                     ELSE amount_cents END
                END), 0) as balance
            FROM transactions
            WHERE account_id = ? AND friend_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .bind(friend_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to replay balance")?;

        Ok(row.get("balance"))
    }

    /// Get statistics for integrity checking.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let account_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM accounts")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let friend_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM friends")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let transaction_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM transactions")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        // Transactions whose pair no longer exists (deletion removes both,
        // so any orphan means a broken delete)
        let orphan_transactions: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM transactions t
            WHERE NOT EXISTS (
                SELECT 1 FROM friends f
                WHERE f.id = t.friend_id AND f.account_id = t.account_id
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        // Rows that could only exist if validation was bypassed
        let invalid_amounts: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM transactions
            WHERE (kind = 'expense'
                   AND (total_cents <= 0 OR account_share_cents < 0 OR friend_share_cents < 0))
               OR (kind = 'settlement' AND amount_cents <= 0)
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        Ok(IntegrityStats {
            account_count,
            friend_count,
            transaction_count,
            orphan_transactions,
            invalid_amounts,
        })
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let account_id_str: String = row.get("account_id");
        let friend_id_str: String = row.get("friend_id");
        let kind_str: String = row.get("kind");
        let created_at_str: String = row.get("created_at");

        let kind = match kind_str.as_str() {
            "expense" => {
                let payer_str: String = row.get("payer");
                TransactionKind::Expense {
                    total_cents: row.get("total_cents"),
                    account_share_cents: row.get("account_share_cents"),
                    friend_share_cents: row.get("friend_share_cents"),
                    payer: Party::from_str(&payer_str)
                        .ok_or_else(|| anyhow::anyhow!("Invalid payer: {}", payer_str))?,
                    description: row.get::<Option<String>, _>("description").unwrap_or_default(),
                }
            }
            "settlement" => {
                let settler_str: String = row.get("settler");
                TransactionKind::Settlement {
                    amount_cents: row.get("amount_cents"),
                    settler: Party::from_str(&settler_str)
                        .ok_or_else(|| anyhow::anyhow!("Invalid settler: {}", settler_str))?,
                }
            }
            other => anyhow::bail!("Invalid transaction kind: {}", other),
        };

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            account_id: Uuid::parse_str(&account_id_str).context("Invalid account ID")?,
            friend_id: Uuid::parse_str(&friend_id_str).context("Invalid friend ID")?,
            sequence: row.get("sequence"),
            kind,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at")?
                .with_timezone(&Utc),
            balance_after_cents: row.get("balance_after_cents"),
        })
    }
}
