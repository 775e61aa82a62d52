use anyhow::Result;
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{format_cents, AccountId, FriendId, TransactionKind};

/// Exporter for converting ledger data to CSV.
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export a pair's full transaction history to CSV, oldest first.
    pub async fn export_history_csv<W: Write>(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
        writer: W,
    ) -> Result<usize> {
        let transactions = self
            .service
            .list_pair_transactions(account_id, friend_id)
            .await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "created_at",
            "kind",
            "description",
            "total",
            "your_share",
            "friend_share",
            "paid_by",
            "amount",
            "settled_by",
            "balance_after",
        ])?;

        let mut count = 0;
        for tx in &transactions {
            let record = match &tx.kind {
                TransactionKind::Expense {
                    total_cents,
                    account_share_cents,
                    friend_share_cents,
                    payer,
                    description,
                } => [
                    tx.id.to_string(),
                    tx.sequence.to_string(),
                    tx.created_at.to_rfc3339(),
                    "expense".to_string(),
                    description.clone(),
                    format_cents(*total_cents),
                    format_cents(*account_share_cents),
                    format_cents(*friend_share_cents),
                    payer.to_string(),
                    String::new(),
                    String::new(),
                    format_cents(tx.balance_after_cents),
                ],
                TransactionKind::Settlement {
                    amount_cents,
                    settler,
                } => [
                    tx.id.to_string(),
                    tx.sequence.to_string(),
                    tx.created_at.to_rfc3339(),
                    "settlement".to_string(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    format_cents(*amount_cents),
                    settler.to_string(),
                    format_cents(tx.balance_after_cents),
                ],
            };
            csv_writer.write_record(&record)?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export a pair's full transaction history as pretty-printed JSON,
    /// oldest first.
    pub async fn export_history_json<W: Write>(
        &self,
        account_id: AccountId,
        friend_id: FriendId,
        writer: W,
    ) -> Result<usize> {
        let transactions = self
            .service
            .list_pair_transactions(account_id, friend_id)
            .await?;
        serde_json::to_writer_pretty(writer, &transactions)?;
        Ok(transactions.len())
    }

    /// Export an account's friend roster with current balances to CSV.
    pub async fn export_friends_csv<W: Write>(
        &self,
        account_id: AccountId,
        writer: W,
    ) -> Result<usize> {
        let friends = self.service.list_friends(account_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["name", "email", "balance", "created_at"])?;

        let mut count = 0;
        for friend in &friends {
            csv_writer.write_record([
                friend.name.clone(),
                friend.email.clone(),
                format_cents(friend.balance_cents),
                friend.created_at.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }
}
