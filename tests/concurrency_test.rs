mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{account_with_friend, account_with_friends, test_service};
use splitbook::application::AppError;
use splitbook::domain::{self, Party};

#[tokio::test]
async fn test_concurrent_appends_do_not_lose_updates() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, friend) = account_with_friend(&service).await?;
    let service = Arc::new(service);

    // +10.00: account paid, friend's share is the whole bill
    let plus = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .add_expense(account.id, friend.id, 1000, 0, 1000, Party::Account, None)
                .await
        })
    };
    // -4.00: friend paid, account's share is the whole bill
    let minus = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .add_expense(account.id, friend.id, 400, 400, 0, Party::Friend, None)
            .await
        })
    };

    plus.await??;
    minus.await??;

    // Whichever order the two landed in, neither update may be lost
    assert_eq!(service.get_balance(account.id, friend.id).await?, 600);

    let transactions = service.list_pair_transactions(account.id, friend.id).await?;
    assert_eq!(transactions.len(), 2);
    assert_eq!(domain::replay(&transactions), 600);
    Ok(())
}

#[tokio::test]
async fn test_many_concurrent_appends_sum_exactly() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, friend) = account_with_friend(&service).await?;
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .add_expense(account.id, friend.id, 100, 0, 100, Party::Account, None)
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(service.get_balance(account.id, friend.id).await?, 2000);

    let transactions = service.list_pair_transactions(account.id, friend.id).await?;
    assert_eq!(transactions.len(), 20);
    // The snapshot chain is intact: appends were serialized, not interleaved
    let mut running = 0;
    for tx in &transactions {
        running = domain::apply(running, &tx.kind);
        assert_eq!(tx.balance_after_cents, running);
    }
    Ok(())
}

#[tokio::test]
async fn test_different_pairs_proceed_in_parallel() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, friends) = account_with_friends(&service, &["Sam", "Kim"]).await?;
    let service = Arc::new(service);

    let sam = friends[0].id;
    let kim = friends[1].id;

    let a = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .add_expense(account.id, sam, 1000, 0, 1000, Party::Account, None)
                .await
        })
    };
    let b = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .add_expense(account.id, kim, 2000, 0, 2000, Party::Account, None)
                .await
        })
    };

    a.await??;
    b.await??;

    assert_eq!(service.get_balance(account.id, sam).await?, 1000);
    assert_eq!(service.get_balance(account.id, kim).await?, 2000);
    Ok(())
}

#[tokio::test]
async fn test_removal_and_append_cannot_interleave_unsafely() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, friend) = account_with_friend(&service).await?;
    let service = Arc::new(service);

    // Race an append against a removal of a settled pair. Exactly one of two
    // outcomes is legal: the append lands first and the removal is refused,
    // or the removal lands first and the append fails with FriendNotFound.
    let append = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .add_expense(account.id, friend.id, 1000, 0, 1000, Party::Account, None)
                .await
        })
    };
    let removal = {
        let service = service.clone();
        tokio::spawn(async move { service.remove_friend(account.id, friend.id).await })
    };

    let append_result = append.await?;
    let removal_result = removal.await?;

    match (append_result, removal_result) {
        (Ok(tx), Err(AppError::BalanceNotZero { balance_cents, .. })) => {
            assert_eq!(tx.balance_after_cents, 1000);
            assert_eq!(balance_cents, 1000);
            assert_eq!(service.get_balance(account.id, friend.id).await?, 1000);
        }
        (Err(AppError::FriendNotFound(_)), Ok(_)) => {
            let result = service.get_balance(account.id, friend.id).await;
            assert!(matches!(result, Err(AppError::FriendNotFound(_))));
        }
        (append, removal) => panic!(
            "unsafe interleaving: append {:?}, removal {:?}",
            append.map(|tx| tx.balance_after_cents),
            removal.map(|f| f.name)
        ),
    }
    Ok(())
}
