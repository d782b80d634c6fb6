use crate::config::LedgerConfig;
use crate::csv_io::{stream_tracking_events, write_leaderboard};
use crate::errors::LedgerError;
use crate::event_store::TrackingLog;
use crate::ledger_actor::{Ledger, LedgerHandle};
use crate::models::{parse_amount, RegistrationProfile, StorefrontId};
use crate::ranking::{rank_now, RankingKey, SortOrder};
use crate::seed::demo_storefronts;
use crate::server;
use crate::storage::{FileStore, LedgerStorage};
use crate::tracking::{TrackingCollector, TrackingEnvelope};
use anyhow::{bail, Result};
use chrono::Utc;
use clap::Subcommand;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::BufReader;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register an account and its storefront, then log in
    Register {
        #[arg(long)]
        store_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        url: String,
    },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Show the logged-in account
    Whoami,
    /// Record a sale against a storefront (defaults to the logged-in one)
    Record {
        #[arg(long)]
        amount: String,
        #[arg(long)]
        storefront: Option<String>,
        #[arg(long)]
        order_id: Option<String>,
    },
    /// Submit one tracking event as the embeddable snippet would
    Track {
        #[arg(long)]
        api_key: String,
        #[arg(long, default_value = "purchase")]
        event: String,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        order_id: Option<String>,
    },
    Stats {
        #[arg(long)]
        storefront: Option<String>,
    },
    /// Most recent transactions of a storefront
    Activity {
        #[arg(long)]
        storefront: Option<String>,
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// Print the leaderboard as CSV
    Leaderboard {
        #[arg(long, value_enum, default_value = "revenue")]
        key: RankingKey,
        #[arg(long, value_enum, default_value = "desc")]
        order: SortOrder,
        #[arg(long)]
        limit: Option<usize>,
    },
    Summary,
    /// Add the demo storefronts if they are not present yet
    Seed,
    /// Recompute aggregates from transaction history and report drift
    Verify,
    /// Ingest a CSV file of tracking events
    Ingest { input: PathBuf },
    /// Run the tracking collector over TCP
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, default_value = "1000")]
        max_connections: usize,
    },
}

pub async fn run(command: Command, config: LedgerConfig) -> Result<()> {
    let storage: Arc<dyn LedgerStorage> = Arc::new(FileStore::open(config.snapshot_path()).await?);
    let ledger = Ledger::open(storage, &config).await?;

    let result = dispatch(command, &ledger, &config).await;
    ledger.close().await?;
    result
}

async fn dispatch(command: Command, ledger: &LedgerHandle, config: &LedgerConfig) -> Result<()> {
    match command {
        Command::Register {
            store_name,
            email,
            password,
            url,
        } => {
            let account = ledger
                .register_account(RegistrationProfile {
                    store_name,
                    email: email.clone(),
                    secret: password.clone(),
                    store_url: url,
                })
                .await?;
            ledger.login(&email, &password).await?;

            println!("account_id={}", account.id);
            println!("api_key={}", account.api_key);
        }
        Command::Login { email, password } => {
            let account = ledger.login(&email, &password).await?;
            println!("logged in as {} ({})", account.email, account.store_name);
        }
        Command::Logout => {
            ledger.logout().await?;
            println!("logged out");
        }
        Command::Whoami => match ledger.current_account().await? {
            Some(account) => {
                println!("account_id={}", account.id);
                println!("email={}", account.email);
                println!("store_name={}", account.store_name);
                println!("api_key={}", account.api_key);
            }
            None => return Err(LedgerError::NotLoggedIn.into()),
        },
        Command::Record {
            amount,
            storefront,
            order_id,
        } => {
            let storefront_id = target_storefront(ledger, storefront).await?;
            let amount = parse_amount(&amount)?;
            let tx = ledger.record_order(&storefront_id, amount, order_id).await?;
            println!("transaction={} storefront={} amount={}", tx.id, tx.storefront_id, tx.amount);
        }
        Command::Track {
            api_key,
            event,
            amount,
            order_id,
        } => {
            let collector = open_collector(ledger, config).await?;
            let outcome = collector
                .ingest(TrackingEnvelope {
                    api_key: Some(api_key),
                    event,
                    amount,
                    order_id,
                    ..TrackingEnvelope::default()
                })
                .await?;
            println!("{}", outcome.ack());
        }
        Command::Stats { storefront } => {
            let storefront_id = target_storefront(ledger, storefront).await?;
            let stats = ledger.storefront_stats(&storefront_id).await?;
            println!("revenue={:.2}", stats.revenue);
            println!("orders={}", stats.orders);
            println!("rank={}", stats.rank);
            println!("avg_order_value={:.2}", stats.avg_order_value);
        }
        Command::Activity { storefront, limit } => {
            let storefront_id = target_storefront(ledger, storefront).await?;
            for tx in ledger.recent_transactions(&storefront_id, limit).await? {
                println!("{},{},{}", tx.id, tx.timestamp.to_rfc3339(), tx.amount);
            }
        }
        Command::Leaderboard { key, order, limit } => {
            let storefronts = ledger.storefronts().await?;
            let mut entries = rank_now(&storefronts, key, order);
            if let Some(limit) = limit {
                entries.truncate(limit);
            }
            write_leaderboard(tokio::io::stdout(), &entries).await?;
        }
        Command::Summary => {
            let summary = ledger.summary().await?;
            println!("total_storefronts={}", summary.total_storefronts);
            println!("total_revenue={:.2}", summary.total_revenue);
            println!("total_orders={}", summary.total_orders);
        }
        Command::Seed => {
            let inserted = ledger.seed_storefronts(demo_storefronts(Utc::now())).await?;
            println!("seeded {inserted} storefronts");
        }
        Command::Verify => {
            let issues = ledger.verify_consistency().await?;
            if !issues.is_empty() {
                for issue in &issues {
                    eprintln!("{issue}");
                }
                bail!("ledger inconsistent: {} issue(s)", issues.len());
            }
            println!("ledger consistent");
        }
        Command::Ingest { input } => {
            let collector = open_collector(ledger, config).await?;
            let (accepted, rejected) = ingest_file(&collector, input).await?;
            println!("accepted={accepted} rejected={rejected}");
        }
        Command::Serve {
            bind,
            max_connections,
        } => {
            let collector = open_collector(ledger, config).await?;
            server::run(bind, max_connections, collector).await?;
        }
    }

    Ok(())
}

async fn target_storefront(
    ledger: &LedgerHandle,
    explicit: Option<String>,
) -> Result<StorefrontId, LedgerError> {
    match explicit {
        Some(id) => Ok(StorefrontId::new(id)),
        None => ledger
            .current_account()
            .await?
            .map(|account| account.storefront_id())
            .ok_or(LedgerError::NotLoggedIn),
    }
}

async fn open_collector(ledger: &LedgerHandle, config: &LedgerConfig) -> Result<TrackingCollector> {
    let log = TrackingLog::open(config.tracking_log_path()).await?;
    Ok(TrackingCollector::new(ledger.clone()).with_log(Arc::new(log)))
}

async fn ingest_file(collector: &TrackingCollector, input: PathBuf) -> Result<(usize, usize)> {
    let file = File::open(&input).await?;
    let mut stream = stream_tracking_events(BufReader::new(file));

    let (mut accepted, mut rejected) = (0, 0);
    while let Some(result) = stream.next().await {
        match result {
            Ok(envelope) => match collector.ingest(envelope).await {
                Ok(_) => accepted += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "Tracking event rejected");
                    rejected += 1;
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "CSV parse error");
                rejected += 1;
            }
        }
    }

    Ok((accepted, rejected))
}
