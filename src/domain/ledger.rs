use super::{AccountTotals, Cents, Party, Transaction, TransactionKind, EPSILON_CENTS};

/// Signed balance delta of a transaction, from the account's point of view.
///
/// For an expense, only the non-paying side's share moves the balance: the
/// payer covered the whole bill and is owed the other side's share. A
/// settlement moves the balance toward zero from whichever side paid.
pub fn effect(kind: &TransactionKind) -> Cents {
    match kind {
        TransactionKind::Expense {
            account_share_cents,
            friend_share_cents,
            payer,
            ..
        } => match payer {
            Party::Account => *friend_share_cents,
            Party::Friend => -*account_share_cents,
        },
        TransactionKind::Settlement {
            amount_cents,
            settler,
        } => match settler {
            Party::Friend => -*amount_cents,
            Party::Account => *amount_cents,
        },
    }
}

/// Apply a transaction to a prior balance. Pure and exact: amounts are
/// integer cents, so no rounding happens here.
pub fn apply(prior_balance: Cents, kind: &TransactionKind) -> Cents {
    prior_balance + effect(kind)
}

/// Validate a transaction against the pair's prior balance.
/// Runs before any effect is computed; a failure leaves the ledger untouched.
pub fn validate(kind: &TransactionKind, prior_balance: Cents) -> Result<(), TransactionError> {
    match kind {
        TransactionKind::Expense {
            total_cents,
            account_share_cents,
            friend_share_cents,
            ..
        } => {
            if *total_cents <= 0 {
                return Err(TransactionError::NonPositiveTotal {
                    total: *total_cents,
                });
            }
            if *account_share_cents < 0 || *friend_share_cents < 0 {
                return Err(TransactionError::NegativeShare {
                    account_share: *account_share_cents,
                    friend_share: *friend_share_cents,
                });
            }
            if (account_share_cents + friend_share_cents - total_cents).abs() > EPSILON_CENTS {
                return Err(TransactionError::SharesMismatch {
                    total: *total_cents,
                    account_share: *account_share_cents,
                    friend_share: *friend_share_cents,
                });
            }
            Ok(())
        }
        TransactionKind::Settlement {
            amount_cents,
            settler,
        } => {
            if *amount_cents <= 0 {
                return Err(TransactionError::NonPositiveSettlement {
                    amount: *amount_cents,
                });
            }
            // A settlement pays a balance down, never past zero. Overpayment
            // would flip the direction of the debt, which is a different
            // economic event and must be recorded as its own expense.
            if *amount_cents > prior_balance.abs() {
                return Err(TransactionError::SettlementExceedsBalance {
                    balance: prior_balance,
                    amount: *amount_cents,
                });
            }
            // Only the owing side can settle; the other direction would move
            // the balance away from zero.
            let debtor = if prior_balance > 0 {
                Party::Friend
            } else {
                Party::Account
            };
            if *settler != debtor {
                return Err(TransactionError::SettlementWrongDirection {
                    balance: prior_balance,
                    settler: *settler,
                });
            }
            Ok(())
        }
    }
}

/// Replay a pair's full ledger from zero, in append order.
/// The result must equal the stored balance; used as the correctness oracle.
pub fn replay(transactions: &[Transaction]) -> Cents {
    transactions
        .iter()
        .fold(0, |balance, tx| balance + effect(&tx.kind))
}

/// Compute account-wide totals from the balances of all its friend ledgers.
pub fn aggregate_totals<I>(balances: I) -> AccountTotals
where
    I: IntoIterator<Item = Cents>,
{
    let mut total_owed_to_you = 0;
    let mut total_you_owe = 0;

    for balance in balances {
        if balance > 0 {
            total_owed_to_you += balance;
        } else {
            total_you_owe += -balance;
        }
    }

    AccountTotals {
        total_owed_to_you_cents: total_owed_to_you,
        total_you_owe_cents: total_you_owe,
        net_balance_cents: total_owed_to_you - total_you_owe,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    NonPositiveTotal {
        total: Cents,
    },
    NegativeShare {
        account_share: Cents,
        friend_share: Cents,
    },
    SharesMismatch {
        total: Cents,
        account_share: Cents,
        friend_share: Cents,
    },
    NonPositiveSettlement {
        amount: Cents,
    },
    SettlementExceedsBalance {
        balance: Cents,
        amount: Cents,
    },
    SettlementWrongDirection {
        balance: Cents,
        settler: Party,
    },
}

impl std::fmt::Display for TransactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionError::NonPositiveTotal { total } => {
                write!(f, "Bill total must be positive, got {} cents", total)
            }
            TransactionError::NegativeShare {
                account_share,
                friend_share,
            } => {
                write!(
                    f,
                    "Shares must be non-negative, got account {} / friend {} cents",
                    account_share, friend_share
                )
            }
            TransactionError::SharesMismatch {
                total,
                account_share,
                friend_share,
            } => {
                write!(
                    f,
                    "Shares ({} + {} cents) do not add up to the bill total ({} cents)",
                    account_share, friend_share, total
                )
            }
            TransactionError::NonPositiveSettlement { amount } => {
                write!(f, "Settlement amount must be positive, got {} cents", amount)
            }
            TransactionError::SettlementExceedsBalance { balance, amount } => {
                write!(
                    f,
                    "Settlement of {} cents exceeds the outstanding balance ({} cents)",
                    amount, balance
                )
            }
            TransactionError::SettlementWrongDirection { balance, settler } => {
                write!(
                    f,
                    "Settlement by the {} side cannot pay down a balance of {} cents",
                    settler, balance
                )
            }
        }
    }
}

impl std::error::Error for TransactionError {}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn expense(total: Cents, account_share: Cents, friend_share: Cents, payer: Party) -> TransactionKind {
        TransactionKind::Expense {
            total_cents: total,
            account_share_cents: account_share,
            friend_share_cents: friend_share,
            payer,
            description: "Test".into(),
        }
    }

    fn settlement(amount: Cents, settler: Party) -> TransactionKind {
        TransactionKind::Settlement {
            amount_cents: amount,
            settler,
        }
    }

    #[test]
    fn test_expense_paid_by_account_adds_friend_share() {
        let kind = expense(10000, 4000, 6000, Party::Account);
        assert_eq!(effect(&kind), 6000);
        assert_eq!(apply(0, &kind), 6000);
    }

    #[test]
    fn test_expense_paid_by_friend_subtracts_account_share() {
        let kind = expense(10000, 4000, 6000, Party::Friend);
        assert_eq!(effect(&kind), -4000);
        assert_eq!(apply(500, &kind), -3500);
    }

    #[test]
    fn test_settlement_moves_balance_toward_zero() {
        assert_eq!(apply(6000, &settlement(6000, Party::Friend)), 0);
        assert_eq!(apply(-2500, &settlement(2500, Party::Account)), 0);
    }

    #[test]
    fn test_validate_rejects_non_positive_total() {
        let result = validate(&expense(0, 0, 0, Party::Account), 0);
        assert!(matches!(
            result,
            Err(TransactionError::NonPositiveTotal { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_negative_share() {
        let result = validate(&expense(1000, -200, 1200, Party::Account), 0);
        assert!(matches!(
            result,
            Err(TransactionError::NegativeShare { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_shares_mismatch() {
        let result = validate(&expense(10000, 4000, 5000, Party::Account), 0);
        assert!(matches!(
            result,
            Err(TransactionError::SharesMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_accepts_one_cent_share_slack() {
        // 33.33 + 66.66 vs a 99.98 total: off by one cent, still accepted
        assert!(validate(&expense(9998, 3333, 6666, Party::Account), 0).is_ok());
    }

    #[test]
    fn test_validate_rejects_settlement_overpayment() {
        let result = validate(&settlement(6001, Party::Friend), 6000);
        assert!(matches!(
            result,
            Err(TransactionError::SettlementExceedsBalance { .. })
        ));
        // Exact payoff is fine
        assert!(validate(&settlement(6000, Party::Friend), 6000).is_ok());
        // Works on negative balances too
        assert!(validate(&settlement(2500, Party::Account), -2500).is_ok());
        assert!(validate(&settlement(2501, Party::Account), -2500).is_err());
    }

    #[test]
    fn test_validate_rejects_settlement_from_wrong_side() {
        // Friend owes: only the friend can settle
        let result = validate(&settlement(100, Party::Account), 6000);
        assert!(matches!(
            result,
            Err(TransactionError::SettlementWrongDirection { .. })
        ));
        // Account owes: only the account can settle
        let result = validate(&settlement(100, Party::Friend), -6000);
        assert!(matches!(
            result,
            Err(TransactionError::SettlementWrongDirection { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_non_positive_settlement() {
        let result = validate(&settlement(0, Party::Friend), 6000);
        assert!(matches!(
            result,
            Err(TransactionError::NonPositiveSettlement { .. })
        ));
    }

    #[test]
    fn test_replay_folds_in_order() {
        let account_id = Uuid::new_v4();
        let friend_id = Uuid::new_v4();
        let mut balance = 0;
        let mut transactions = Vec::new();

        for kind in [
            expense(10000, 4000, 6000, Party::Account), // +6000
            expense(3000, 1000, 2000, Party::Friend),   // -1000
            settlement(5000, Party::Friend),            // -5000
        ] {
            balance = apply(balance, &kind);
            transactions.push(Transaction::new(
                account_id,
                friend_id,
                kind,
                Utc::now(),
                balance,
            ));
        }

        assert_eq!(replay(&transactions), 0);
        assert_eq!(replay(&transactions), balance);
    }

    #[test]
    fn test_aggregate_totals() {
        let totals = aggregate_totals([5000, -2000, 0]);
        assert_eq!(totals.total_owed_to_you_cents, 5000);
        assert_eq!(totals.total_you_owe_cents, 2000);
        assert_eq!(totals.net_balance_cents, 3000);
    }

    #[test]
    fn test_aggregate_totals_empty() {
        let totals = aggregate_totals([]);
        assert_eq!(totals.total_owed_to_you_cents, 0);
        assert_eq!(totals.total_you_owe_cents, 0);
        assert_eq!(totals.net_balance_cents, 0);
    }
}
