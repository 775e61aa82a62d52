use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::application::LedgerService;
use crate::domain::{format_cents, parse_cents, Account, Friend, Party, TransactionKind};

/// Splitbook - Pairwise Bill-Splitting Ledger
#[derive(Parser)]
#[command(name = "splitbook")]
#[command(about = "A bill-splitting ledger tracking who owes whom, one friend at a time")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "splitbook.db")]
    pub database: String,

    /// Account email to act as (stands in for the deployment's auth layer)
    #[arg(short, long, global = true)]
    pub account: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Friend management commands
    #[command(subcommand)]
    Friend(FriendCommands),

    /// Record a bill split with a friend
    Expense {
        /// Friend name
        friend: String,

        /// Total bill amount (e.g., "100.00")
        total: String,

        /// Your share of the bill
        #[arg(long)]
        your_share: String,

        /// The friend's share of the bill
        #[arg(long)]
        their_share: String,

        /// Who paid the bill: "you" or "them"
        #[arg(long, default_value = "you")]
        paid_by: String,

        /// Description of the bill
        #[arg(short = 'm', long)]
        description: Option<String>,
    },

    /// Record a settlement paying a balance down
    Settle {
        /// Friend name
        friend: String,

        /// Settled amount (e.g., "60.00")
        amount: String,

        /// Who paid the settlement: "you" or "them"
        #[arg(long, default_value = "them")]
        settled_by: String,
    },

    /// Show the current balance with a friend
    Balance {
        /// Friend name
        friend: String,
    },

    /// Show account totals across all friends
    Summary,

    /// Show transaction history with a friend, most recent first
    History {
        /// Friend name
        friend: String,

        /// Page number (1-indexed)
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Transactions per page
        #[arg(long, default_value = "10")]
        page_size: u32,
    },

    /// Verify ledger integrity
    Check,

    /// Export data to CSV
    Export {
        /// What to export: history, friends, json
        export_type: String,

        /// Friend name (required for history)
        #[arg(long)]
        friend: Option<String>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a new account
    Create {
        /// Display name
        name: String,

        /// Email (must be unique)
        #[arg(short, long)]
        email: String,
    },

    /// Show the account profile and totals
    Show,

    /// Update the account profile
    Update {
        /// New display name
        #[arg(long)]
        name: Option<String>,

        /// New email
        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum FriendCommands {
    /// Add a friend
    Add {
        /// Friend name (must be unique within the account)
        name: String,

        /// Friend email
        #[arg(short, long)]
        email: String,

        /// Avatar URL
        #[arg(long)]
        avatar: Option<String>,
    },

    /// List all friends with balances
    List,

    /// Show detailed friend information
    Show {
        /// Friend name
        name: String,
    },

    /// Update a friend's profile
    Update {
        /// Friend name
        name: String,

        /// New name
        #[arg(long)]
        new_name: Option<String>,

        /// New email
        #[arg(long)]
        email: Option<String>,

        /// New avatar URL
        #[arg(long)]
        avatar: Option<String>,
    },

    /// Remove a friend (only once the balance is settled)
    Remove {
        /// Friend name
        name: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        if let Commands::Init = self.command {
            LedgerService::init(&self.database).await?;
            println!("Initialized database: {}", self.database);
            return Ok(());
        }

        let service = LedgerService::connect(&self.database).await?;

        match self.command {
            Commands::Init => unreachable!(),

            Commands::Account(cmd) => run_account_command(&service, self.account, cmd).await?,

            Commands::Friend(cmd) => {
                let account = resolve_account(&service, &self.account).await?;
                run_friend_command(&service, &account, cmd).await?;
            }

            Commands::Expense {
                friend,
                total,
                your_share,
                their_share,
                paid_by,
                description,
            } => {
                let account = resolve_account(&service, &self.account).await?;
                let friend = resolve_friend(&service, &account, &friend).await?;
                let payer = parse_party(&paid_by)?;

                let transaction = service
                    .add_expense(
                        account.id,
                        friend.id,
                        parse_amount(&total)?,
                        parse_amount(&your_share)?,
                        parse_amount(&their_share)?,
                        payer,
                        description,
                    )
                    .await?;

                println!(
                    "Recorded expense of {} with {}",
                    format_cents(amount_of(&transaction.kind)),
                    friend.name
                );
                print_balance_line(&friend.name, transaction.balance_after_cents);
            }

            Commands::Settle {
                friend,
                amount,
                settled_by,
            } => {
                let account = resolve_account(&service, &self.account).await?;
                let friend = resolve_friend(&service, &account, &friend).await?;
                let settler = parse_party(&settled_by)?;

                let transaction = service
                    .settle(account.id, friend.id, parse_amount(&amount)?, settler)
                    .await?;

                println!(
                    "Recorded settlement of {} with {}",
                    format_cents(amount_of(&transaction.kind)),
                    friend.name
                );
                print_balance_line(&friend.name, transaction.balance_after_cents);
            }

            Commands::Balance { friend } => {
                let account = resolve_account(&service, &self.account).await?;
                let friend = resolve_friend(&service, &account, &friend).await?;
                let balance = service.get_balance(account.id, friend.id).await?;
                print_balance_line(&friend.name, balance);
            }

            Commands::Summary => {
                let account = resolve_account(&service, &self.account).await?;
                let summary = service.account_summary(account.id).await?;

                println!("Account: {} <{}>", summary.account.name, summary.account.email);
                println!("  Friends:          {}", summary.friend_count);
                println!(
                    "  Owed to you:      {}",
                    format_cents(summary.totals.total_owed_to_you_cents)
                );
                println!(
                    "  You owe:          {}",
                    format_cents(summary.totals.total_you_owe_cents)
                );
                println!(
                    "  Net balance:      {}",
                    format_cents(summary.totals.net_balance_cents)
                );
            }

            Commands::History {
                friend,
                page,
                page_size,
            } => {
                let account = resolve_account(&service, &self.account).await?;
                let friend = resolve_friend(&service, &account, &friend).await?;
                let history = service
                    .list_history(account.id, friend.id, page, page_size)
                    .await?;

                if history.items.is_empty() {
                    println!("No transactions found with {}", friend.name);
                } else {
                    println!("Transaction history with {}", friend.name);
                    println!();
                    for tx in &history.items {
                        match &tx.kind {
                            TransactionKind::Expense {
                                total_cents,
                                account_share_cents,
                                friend_share_cents,
                                payer,
                                description,
                            } => {
                                println!(
                                    "  [{}] {}  {}",
                                    tx.created_at.format("%Y-%m-%d %H:%M"),
                                    description,
                                    format_cents(*total_cents)
                                );
                                println!(
                                    "      your share {} / {}'s share {}, paid by {}",
                                    format_cents(*account_share_cents),
                                    friend.name,
                                    format_cents(*friend_share_cents),
                                    party_label(*payer, &friend.name)
                                );
                            }
                            TransactionKind::Settlement {
                                amount_cents,
                                settler,
                            } => {
                                println!(
                                    "  [{}] Settlement  {}",
                                    tx.created_at.format("%Y-%m-%d %H:%M"),
                                    format_cents(*amount_cents)
                                );
                                println!("      settled by {}", party_label(*settler, &friend.name));
                            }
                        }
                        println!(
                            "      balance after: {}",
                            format_cents(tx.balance_after_cents)
                        );
                    }
                    println!();
                    println!(
                        "Page {} of {} ({} transactions)",
                        history.page, history.total_pages, history.total_count
                    );
                }
            }

            Commands::Check => {
                let report = service.check_integrity().await?;

                println!("Ledger integrity check");
                println!("  Accounts:     {}", report.account_count);
                println!("  Friends:      {}", report.friend_count);
                println!("  Transactions: {}", report.transaction_count);
                println!();

                if report.is_clean() {
                    println!("No problems found.");
                } else {
                    if report.orphan_transactions > 0 {
                        println!("  Orphan transactions: {}", report.orphan_transactions);
                    }
                    if report.invalid_amounts > 0 {
                        println!("  Invalid amounts: {}", report.invalid_amounts);
                    }
                    for mismatch in &report.balance_mismatches {
                        println!(
                            "  Balance mismatch for {}: stored {}, replayed {}",
                            mismatch.friend_name,
                            format_cents(mismatch.stored_cents),
                            format_cents(mismatch.replayed_cents)
                        );
                    }
                    for chain_break in &report.chain_breaks {
                        println!(
                            "  Snapshot mismatch for {} at sequence {}: expected {}, recorded {}",
                            chain_break.friend_name,
                            chain_break.sequence,
                            format_cents(chain_break.expected_cents),
                            format_cents(chain_break.recorded_cents)
                        );
                    }
                    anyhow::bail!("Ledger integrity check failed");
                }
            }

            Commands::Export {
                export_type,
                friend,
                output,
            } => {
                let account = resolve_account(&service, &self.account).await?;
                run_export_command(&service, &account, &export_type, friend.as_deref(), output.as_deref())
                    .await?;
            }
        }

        Ok(())
    }
}

async fn run_account_command(
    service: &LedgerService,
    account_email: Option<String>,
    cmd: AccountCommands,
) -> Result<()> {
    match cmd {
        AccountCommands::Create { name, email } => {
            let account = service.create_account(name, email).await?;
            println!("Created account: {} <{}>", account.name, account.email);
        }

        AccountCommands::Show => {
            let account = resolve_account(service, &account_email).await?;
            let summary = service.account_summary(account.id).await?;

            println!("Account: {}", account.name);
            println!("  ID:          {}", account.id);
            println!("  Email:       {}", account.email);
            println!(
                "  Created:     {}",
                account.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("  Friends:     {}", summary.friend_count);
            println!(
                "  Owed to you: {}",
                format_cents(summary.totals.total_owed_to_you_cents)
            );
            println!(
                "  You owe:     {}",
                format_cents(summary.totals.total_you_owe_cents)
            );
            println!(
                "  Net:         {}",
                format_cents(summary.totals.net_balance_cents)
            );
        }

        AccountCommands::Update { name, email } => {
            let account = resolve_account(service, &account_email).await?;
            let account = service.update_account(account.id, name, email).await?;
            println!("Updated account: {} <{}>", account.name, account.email);
        }
    }
    Ok(())
}

async fn run_friend_command(
    service: &LedgerService,
    account: &Account,
    cmd: FriendCommands,
) -> Result<()> {
    match cmd {
        FriendCommands::Add {
            name,
            email,
            avatar,
        } => {
            let friend = service
                .add_friend(account.id, name, email, avatar)
                .await?;
            println!("Added friend: {} <{}>", friend.name, friend.email);
        }

        FriendCommands::List => {
            let friends = service.list_friends(account.id).await?;
            if friends.is_empty() {
                println!("No friends yet.");
            } else {
                println!("{:<20} {:<28} {:>12}", "NAME", "EMAIL", "BALANCE");
                println!("{}", "-".repeat(62));
                for friend in friends {
                    println!(
                        "{:<20} {:<28} {:>12}",
                        friend.name,
                        friend.email,
                        format_cents(friend.balance_cents)
                    );
                }
            }
        }

        FriendCommands::Show { name } => {
            let friend = resolve_friend(service, account, &name).await?;
            let history = service.list_history(account.id, friend.id, 1, 1).await?;

            println!("Friend: {}", friend.name);
            println!("  ID:           {}", friend.id);
            println!("  Email:        {}", friend.email);
            if let Some(avatar) = &friend.avatar_url {
                println!("  Avatar:       {}", avatar);
            }
            println!(
                "  Added:        {}",
                friend.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("  Transactions: {}", history.total_count);
            print_balance_line(&friend.name, friend.balance_cents);
        }

        FriendCommands::Update {
            name,
            new_name,
            email,
            avatar,
        } => {
            let friend = resolve_friend(service, account, &name).await?;
            let friend = service
                .update_friend(account.id, friend.id, new_name, email, avatar)
                .await?;
            println!("Updated friend: {} <{}>", friend.name, friend.email);
        }

        FriendCommands::Remove { name } => {
            let friend = resolve_friend(service, account, &name).await?;
            service.remove_friend(account.id, friend.id).await?;
            println!(
                "Removed {} and the transaction history you shared.",
                friend.name
            );
        }
    }
    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    account: &Account,
    export_type: &str,
    friend_name: Option<&str>,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "history" => {
            let name = friend_name
                .context("--friend is required when exporting history")?;
            let friend = resolve_friend(service, account, name).await?;
            let count = exporter
                .export_history_csv(account.id, friend.id, writer)
                .await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        "json" => {
            let name = friend_name
                .context("--friend is required when exporting history as JSON")?;
            let friend = resolve_friend(service, account, name).await?;
            let count = exporter
                .export_history_json(account.id, friend.id, writer)
                .await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        "friends" => {
            let count = exporter.export_friends_csv(account.id, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} friends", count);
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: history, friends, json",
                export_type
            );
        }
    }

    Ok(())
}

/// Resolve the acting account from the --account email flag.
/// In a server deployment this is what the auth layer does with a token.
async fn resolve_account(service: &LedgerService, email: &Option<String>) -> Result<Account> {
    let email = email
        .as_deref()
        .context("No account given. Pass --account <email>")?;
    Ok(service.get_account_by_email(email).await?)
}

async fn resolve_friend(service: &LedgerService, account: &Account, name: &str) -> Result<Friend> {
    Ok(service.get_friend_by_name(account.id, name).await?)
}

fn parse_amount(input: &str) -> Result<i64> {
    parse_cents(input).with_context(|| format!("Invalid amount: {}", input))
}

fn parse_party(input: &str) -> Result<Party> {
    match input.to_lowercase().as_str() {
        "you" | "me" | "account" => Ok(Party::Account),
        "them" | "friend" => Ok(Party::Friend),
        other => anyhow::bail!("Invalid party '{}'. Use \"you\" or \"them\"", other),
    }
}

fn party_label(party: Party, friend_name: &str) -> String {
    match party {
        Party::Account => "You".to_string(),
        Party::Friend => friend_name.to_string(),
    }
}

fn amount_of(kind: &TransactionKind) -> i64 {
    match kind {
        TransactionKind::Expense { total_cents, .. } => *total_cents,
        TransactionKind::Settlement { amount_cents, .. } => *amount_cents,
    }
}

fn print_balance_line(friend_name: &str, balance: i64) {
    if balance > 0 {
        println!("{} owes you {}", friend_name, format_cents(balance));
    } else if balance < 0 {
        println!("You owe {} {}", friend_name, format_cents(-balance));
    } else {
        println!("You and {} are settled up.", friend_name);
    }
}
