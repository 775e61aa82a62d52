mod common;

use anyhow::Result;
use common::{account_with_friend, account_with_friends, test_service};
use splitbook::application::AppError;
use splitbook::domain::Party;
use uuid::Uuid;

#[tokio::test]
async fn test_remove_refused_while_balance_outstanding() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, friend) = account_with_friend(&service).await?;

    service
        .add_expense(account.id, friend.id, 10000, 4000, 6000, Party::Account, None)
        .await?;

    assert!(!service.can_remove_friend(account.id, friend.id).await?);
    let result = service.remove_friend(account.id, friend.id).await;
    match result {
        Err(AppError::BalanceNotZero {
            name,
            balance_cents,
        }) => {
            assert_eq!(name, "Sam");
            assert_eq!(balance_cents, 6000);
        }
        other => panic!("expected BalanceNotZero, got {:?}", other.map(|f| f.name)),
    }

    // Nothing was deleted
    assert_eq!(service.list_friends(account.id).await?.len(), 1);
    let history = service.list_history(account.id, friend.id, 1, 10).await?;
    assert_eq!(history.total_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_remove_deletes_friend_and_history_together() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, friend) = account_with_friend(&service).await?;

    service
        .add_expense(account.id, friend.id, 10000, 4000, 6000, Party::Account, None)
        .await?;
    service
        .settle(account.id, friend.id, 6000, Party::Friend)
        .await?;

    service.remove_friend(account.id, friend.id).await?;

    assert!(service.list_friends(account.id).await?.is_empty());
    let result = service.list_history(account.id, friend.id, 1, 10).await;
    assert!(matches!(result, Err(AppError::FriendNotFound(_))));

    // No orphan rows left behind
    let report = service.check_integrity().await?;
    assert!(report.is_clean());
    assert_eq!(report.transaction_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_remove_allowed_within_one_cent() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, friend) = account_with_friend(&service).await?;

    // Leave a one-cent residue: 10.00 split 4.99/5.01, then settle 5.00
    service
        .add_expense(account.id, friend.id, 1000, 499, 501, Party::Account, None)
        .await?;
    service
        .settle(account.id, friend.id, 500, Party::Friend)
        .await?;

    assert_eq!(service.get_balance(account.id, friend.id).await?, 1);
    assert!(service.can_remove_friend(account.id, friend.id).await?);
    service.remove_friend(account.id, friend.id).await?;
    Ok(())
}

#[tokio::test]
async fn test_aggregate_totals_across_friends() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, friends) = account_with_friends(&service, &["Sam", "Kim", "Lou"]).await?;

    // Sam owes 50.00
    service
        .add_expense(account.id, friends[0].id, 10000, 5000, 5000, Party::Account, None)
        .await?;
    // You owe Kim 20.00
    service
        .add_expense(account.id, friends[1].id, 5000, 2000, 3000, Party::Friend, None)
        .await?;
    // Lou is settled

    let totals = service.account_totals(account.id).await?;
    assert_eq!(totals.total_owed_to_you_cents, 5000);
    assert_eq!(totals.total_you_owe_cents, 2000);
    assert_eq!(totals.net_balance_cents, 3000);

    let summary = service.account_summary(account.id).await?;
    assert_eq!(summary.friend_count, 3);
    assert_eq!(summary.totals, totals);
    Ok(())
}

#[tokio::test]
async fn test_pairs_are_independent() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, friends) = account_with_friends(&service, &["Sam", "Kim"]).await?;

    service
        .add_expense(account.id, friends[0].id, 10000, 4000, 6000, Party::Account, None)
        .await?;

    assert_eq!(service.get_balance(account.id, friends[0].id).await?, 6000);
    assert_eq!(service.get_balance(account.id, friends[1].id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_friend_name_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, _friend) = account_with_friend(&service).await?;

    let result = service
        .add_friend(account.id, "Sam".into(), "other@example.com".into(), None)
        .await;
    assert!(matches!(result, Err(AppError::FriendAlreadyExists(_))));
    Ok(())
}

#[tokio::test]
async fn test_duplicate_account_email_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service
        .create_account("Ada".into(), "ada@example.com".into())
        .await?;

    let result = service
        .create_account("Other Ada".into(), "ada@example.com".into())
        .await;
    assert!(matches!(result, Err(AppError::AccountAlreadyExists(_))));
    Ok(())
}

#[tokio::test]
async fn test_unknown_account_and_friend_are_not_found() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, _friend) = account_with_friend(&service).await?;

    let result = service.get_account(Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::AccountNotFound(_))));

    let result = service.get_balance(account.id, Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::FriendNotFound(_))));

    let result = service.remove_friend(account.id, Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::FriendNotFound(_))));

    let result = service
        .add_expense(account.id, Uuid::new_v4(), 1000, 500, 500, Party::Account, None)
        .await;
    assert!(matches!(result, Err(AppError::FriendNotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_update_profiles() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (account, friend) = account_with_friend(&service).await?;

    let account = service
        .update_account(account.id, Some("Ada L.".into()), None)
        .await?;
    assert_eq!(account.name, "Ada L.");
    assert_eq!(account.email, "ada@example.com");

    let friend = service
        .update_friend(
            account.id,
            friend.id,
            None,
            Some("sam@new.example.com".into()),
            Some("https://example.com/sam.png".into()),
        )
        .await?;
    assert_eq!(friend.name, "Sam");
    assert_eq!(friend.email, "sam@new.example.com");
    assert_eq!(friend.avatar_url.as_deref(), Some("https://example.com/sam.png"));

    // Profile updates never touch the balance
    assert_eq!(service.get_balance(account.id, friend.id).await?, 0);
    Ok(())
}
