// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use splitbook::application::LedgerService;
use splitbook::domain::{Account, Friend};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Create an account with a single friend, the most common fixture.
pub async fn account_with_friend(service: &LedgerService) -> Result<(Account, Friend)> {
    let account = service
        .create_account("Ada".into(), "ada@example.com".into())
        .await?;
    let friend = service
        .add_friend(account.id, "Sam".into(), "sam@example.com".into(), None)
        .await?;
    Ok((account, friend))
}

/// Create an account with several friends.
pub async fn account_with_friends(
    service: &LedgerService,
    names: &[&str],
) -> Result<(Account, Vec<Friend>)> {
    let account = service
        .create_account("Ada".into(), "ada@example.com".into())
        .await?;

    let mut friends = Vec::new();
    for name in names {
        let email = format!("{}@example.com", name.to_lowercase());
        friends.push(
            service
                .add_friend(account.id, name.to_string(), email, None)
                .await?,
        );
    }
    Ok((account, friends))
}
