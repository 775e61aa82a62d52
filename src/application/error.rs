use thiserror::Error;

use crate::domain::{Cents, TransactionError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("An account with email {0} already exists")]
    AccountAlreadyExists(String),

    #[error("Friend not found: {0}")]
    FriendNotFound(String),

    #[error("Friend already exists: {0}")]
    FriendAlreadyExists(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionError),

    #[error("Cannot remove {name}: outstanding balance of {balance_cents} cents")]
    BalanceNotZero { name: String, balance_cents: Cents },

    #[error("Invalid pagination: page {page}, page size {page_size} (both must be >= 1)")]
    InvalidPagination { page: u32, page_size: u32 },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
