use anyhow::bail;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use leaderboard_ledger::storage::{FileStore, InMemoryStore, LedgerSnapshot, LedgerStorage};
use leaderboard_ledger::{
    CredentialParams, Ledger, LedgerConfig, LedgerError, LedgerHandle, RegistrationProfile,
    Storefront, StorefrontId, TransactionId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn fast_config() -> LedgerConfig {
    LedgerConfig {
        credentials: CredentialParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        },
        ..LedgerConfig::default()
    }
}

async fn open_in_memory() -> LedgerHandle {
    let storage: Arc<dyn LedgerStorage> = Arc::new(InMemoryStore::new());
    Ledger::open(storage, &fast_config()).await.unwrap()
}

fn profile(email: &str) -> RegistrationProfile {
    RegistrationProfile {
        store_name: "Corner Shop".to_string(),
        email: email.to_string(),
        secret: "hunter22".to_string(),
        store_url: "https://corner.example".to_string(),
    }
}

fn seeded(id: &str, revenue: Decimal, age_days: i64) -> Storefront {
    Storefront::seeded(
        id,
        id.to_uppercase(),
        format!("{id}@example.com"),
        format!("https://{id}.example"),
        revenue,
        10,
        Utc::now() - Duration::days(age_days),
    )
}

/// Storage whose saves can be switched to fail.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    failing: AtomicBool,
}

#[async_trait]
impl LedgerStorage for FlakyStore {
    async fn load(&self) -> anyhow::Result<Option<LedgerSnapshot>> {
        self.inner.load().await
    }

    async fn save(&self, snapshot: &LedgerSnapshot) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        self.inner.save(snapshot).await
    }
}

// ============================================================================
// REGISTRATION & AUTHENTICATION
// ============================================================================

#[tokio::test]
async fn test_register_creates_account_and_zero_storefront() {
    let ledger = open_in_memory().await;

    let account = ledger.register_account(profile("owner@corner.example")).await.unwrap();
    assert!(account.api_key.starts_with("ecl_"));
    assert_ne!(account.credential, "hunter22");

    let storefronts = ledger.storefronts().await.unwrap();
    assert_eq!(storefronts.len(), 1);
    assert_eq!(storefronts[0].id, account.storefront_id());
    assert_eq!(storefronts[0].revenue, Decimal::ZERO);
    assert_eq!(storefronts[0].orders, 0);
    assert_eq!(storefronts[0].name, "Corner Shop");
}

#[tokio::test]
async fn test_duplicate_email_rejected_and_state_unchanged() {
    let ledger = open_in_memory().await;
    ledger.register_account(profile("owner@corner.example")).await.unwrap();
    let before = ledger.snapshot().await.unwrap();

    let result = ledger.register_account(profile("owner@corner.example")).await;
    assert_eq!(result.unwrap_err(), LedgerError::DuplicateEmail);

    let after = ledger.snapshot().await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_invalid_profile_rejected() {
    let ledger = open_in_memory().await;

    let mut bad_email = profile("not-an-email");
    assert!(matches!(
        ledger.register_account(bad_email.clone()).await,
        Err(LedgerError::InvalidProfile(_))
    ));

    bad_email.email = "owner@corner.example".to_string();
    bad_email.secret = String::new();
    assert!(matches!(
        ledger.register_account(bad_email).await,
        Err(LedgerError::InvalidProfile(_))
    ));
}

#[tokio::test]
async fn test_api_keys_are_unique() {
    let ledger = open_in_memory().await;
    let a = ledger.register_account(profile("a@corner.example")).await.unwrap();
    let b = ledger.register_account(profile("b@corner.example")).await.unwrap();

    assert_ne!(a.api_key, b.api_key);
    assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn test_authenticate_exact_match_only() {
    let ledger = open_in_memory().await;
    let account = ledger.register_account(profile("Owner@corner.example")).await.unwrap();

    let found = ledger.authenticate("Owner@corner.example", "hunter22").await.unwrap();
    assert_eq!(found.id, account.id);

    // Emails are case-sensitive
    assert_eq!(
        ledger.authenticate("owner@corner.example", "hunter22").await.unwrap_err(),
        LedgerError::AuthFailed
    );
    assert_eq!(
        ledger.authenticate("Owner@corner.example", "Hunter22").await.unwrap_err(),
        LedgerError::AuthFailed
    );
    assert_eq!(
        ledger.authenticate("nobody@corner.example", "hunter22").await.unwrap_err(),
        LedgerError::AuthFailed
    );
}

#[tokio::test]
async fn test_login_logout_session_pointer() {
    let ledger = open_in_memory().await;
    let account = ledger.register_account(profile("owner@corner.example")).await.unwrap();

    assert!(ledger.current_account().await.unwrap().is_none());
    assert_eq!(
        ledger.login("owner@corner.example", "wrong").await.unwrap_err(),
        LedgerError::AuthFailed
    );

    ledger.login("owner@corner.example", "hunter22").await.unwrap();
    let current = ledger.current_account().await.unwrap().unwrap();
    assert_eq!(current.id, account.id);

    ledger.logout().await.unwrap();
    assert!(ledger.current_account().await.unwrap().is_none());
    assert_eq!(ledger.logout().await.unwrap_err(), LedgerError::NotLoggedIn);
}

#[tokio::test(flavor = "current_thread")]
async fn test_credentials_checked_on_single_threaded_runtime() {
    let ledger = open_in_memory().await;

    let (registered, summary) = tokio::join!(
        ledger.register_account(profile("solo@corner.example")),
        ledger.summary()
    );
    let account = registered.unwrap();
    summary.unwrap();

    let (logged_in, failed) = tokio::join!(
        ledger.login("solo@corner.example", "hunter22"),
        ledger.authenticate("solo@corner.example", "nope")
    );
    assert_eq!(logged_in.unwrap().id, account.id);
    assert_eq!(failed.unwrap_err(), LedgerError::AuthFailed);
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

#[tokio::test]
async fn test_record_transaction_updates_aggregates() {
    let ledger = open_in_memory().await;
    let account = ledger.register_account(profile("owner@corner.example")).await.unwrap();
    let id = account.storefront_id();

    let first = ledger.record_transaction(&id, dec!(19.99)).await.unwrap();
    let second = ledger.record_transaction(&id, dec!(30.01)).await.unwrap();

    assert_eq!(first.amount, dec!(19.99));
    assert!(second.id > first.id);

    let stats = ledger.storefront_stats(&id).await.unwrap();
    assert_eq!(stats.revenue, dec!(50.00));
    assert_eq!(stats.orders, 2);
    assert_eq!(stats.avg_order_value, dec!(25));
}

#[tokio::test]
async fn test_amount_precision_preserved() {
    let ledger = open_in_memory().await;
    let account = ledger.register_account(profile("owner@corner.example")).await.unwrap();

    ledger
        .record_transaction(&account.storefront_id(), dec!(19.99))
        .await
        .unwrap();

    let snapshot = ledger.snapshot().await.unwrap();
    assert_eq!(snapshot.transactions[0].amount, dec!(19.99));
    assert_eq!(snapshot.transactions[0].amount.to_string(), "19.99");
}

#[tokio::test]
async fn test_non_positive_amounts_rejected() {
    let ledger = open_in_memory().await;
    let account = ledger.register_account(profile("owner@corner.example")).await.unwrap();
    let id = account.storefront_id();

    for amount in [Decimal::ZERO, dec!(-5), dec!(-0.01)] {
        assert_eq!(
            ledger.record_transaction(&id, amount).await.unwrap_err(),
            LedgerError::InvalidAmount
        );
    }

    let snapshot = ledger.snapshot().await.unwrap();
    assert!(snapshot.transactions.is_empty());
    assert_eq!(snapshot.storefronts[0].orders, 0);
}

#[tokio::test]
async fn test_unknown_storefront_rejected() {
    let ledger = open_in_memory().await;
    let missing = StorefrontId::new("ghost");

    assert_eq!(
        ledger.record_transaction(&missing, dec!(10)).await.unwrap_err(),
        LedgerError::UnknownStorefront
    );
    assert_eq!(
        ledger.storefront_stats(&missing).await.unwrap_err(),
        LedgerError::UnknownStorefront
    );
}

#[tokio::test]
async fn test_revenue_overflow_rejected_and_ledger_keeps_serving() {
    let ledger = open_in_memory().await;
    let id = ledger.register_account(profile("big@corner.example")).await.unwrap().storefront_id();

    ledger.record_transaction(&id, Decimal::MAX).await.unwrap();
    assert_eq!(
        ledger.record_transaction(&id, dec!(1)).await.unwrap_err(),
        LedgerError::InvalidAmount
    );

    let stats = ledger.storefront_stats(&id).await.unwrap();
    assert_eq!(stats.revenue, Decimal::MAX);
    assert_eq!(stats.orders, 1);
    assert_eq!(ledger.snapshot().await.unwrap().transactions.len(), 1);
    assert!(ledger.verify_consistency().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_summary_saturates_instead_of_overflowing() {
    let ledger = open_in_memory().await;
    ledger
        .seed_storefronts(vec![
            seeded("whale1", Decimal::MAX, 1),
            seeded("whale2", Decimal::MAX, 2),
        ])
        .await
        .unwrap();

    let summary = ledger.summary().await.unwrap();
    assert_eq!(summary.total_storefronts, 2);
    assert_eq!(summary.total_revenue, Decimal::MAX);
    assert_eq!(summary.total_orders, 20);

    // Still answering afterwards
    assert_eq!(ledger.storefronts().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_aggregates_match_transaction_history() {
    let ledger = open_in_memory().await;
    let a = ledger.register_account(profile("a@corner.example")).await.unwrap().storefront_id();
    let b = ledger.register_account(profile("b@corner.example")).await.unwrap().storefront_id();

    let amounts = [dec!(1.10), dec!(2.25), dec!(99.99), dec!(0.01), dec!(15)];
    for (i, amount) in amounts.iter().enumerate() {
        let target = if i % 2 == 0 { &a } else { &b };
        ledger.record_transaction(target, *amount).await.unwrap();
    }

    let snapshot = ledger.snapshot().await.unwrap();
    for storefront in &snapshot.storefronts {
        let own: Vec<_> = snapshot
            .transactions
            .iter()
            .filter(|tx| tx.storefront_id == storefront.id)
            .collect();
        let sum: Decimal = own.iter().map(|tx| tx.amount).sum();
        assert_eq!(storefront.revenue, sum);
        assert_eq!(storefront.orders, own.len() as u64);
    }

    assert!(ledger.verify_consistency().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recent_transactions_newest_first() {
    let ledger = open_in_memory().await;
    let id = ledger.register_account(profile("a@corner.example")).await.unwrap().storefront_id();

    for amount in [dec!(1), dec!(2), dec!(3)] {
        ledger.record_transaction(&id, amount).await.unwrap();
    }

    let recent = ledger.recent_transactions(&id, 2).await.unwrap();
    let amounts: Vec<_> = recent.iter().map(|tx| tx.amount).collect();
    assert_eq!(amounts, vec![dec!(3), dec!(2)]);
}

// ============================================================================
// STATS & SEEDING
// ============================================================================

#[tokio::test]
async fn test_stats_rank_by_revenue() {
    let ledger = open_in_memory().await;
    let seeds = vec![
        seeded("store1", dec!(45670), 30),
        seeded("store2", dec!(38920), 25),
        seeded("store3", dec!(32150), 20),
        seeded("store4", dec!(28900), 15),
        seeded("store5", dec!(25600), 10),
    ];
    assert_eq!(ledger.seed_storefronts(seeds).await.unwrap(), 5);

    let stats = ledger.storefront_stats(&StorefrontId::new("store3")).await.unwrap();
    assert_eq!(stats.rank, 3);
    assert_eq!(stats.revenue, dec!(32150));
    assert_eq!(stats.avg_order_value, dec!(3215));

    assert!(ledger.verify_consistency().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stats_zero_orders_average() {
    let ledger = open_in_memory().await;
    let id = ledger.register_account(profile("a@corner.example")).await.unwrap().storefront_id();

    let stats = ledger.storefront_stats(&id).await.unwrap();
    assert_eq!(stats.orders, 0);
    assert_eq!(stats.avg_order_value, Decimal::ZERO);
    assert_eq!(stats.rank, 1);
}

#[tokio::test]
async fn test_stats_rank_ties_keep_insertion_order() {
    let ledger = open_in_memory().await;
    ledger
        .seed_storefronts(vec![
            seeded("later", dec!(500), 1),
            seeded("earlier", dec!(500), 9),
        ])
        .await
        .unwrap();

    let later = ledger.storefront_stats(&StorefrontId::new("later")).await.unwrap();
    let earlier = ledger.storefront_stats(&StorefrontId::new("earlier")).await.unwrap();
    assert_eq!(later.rank, 1);
    assert_eq!(earlier.rank, 2);
}

#[tokio::test]
async fn test_seed_skips_existing_and_rejects_negative() {
    let ledger = open_in_memory().await;
    assert_eq!(ledger.seed_storefronts(vec![seeded("s1", dec!(10), 1)]).await.unwrap(), 1);
    assert_eq!(ledger.seed_storefronts(vec![seeded("s1", dec!(99), 1)]).await.unwrap(), 0);

    let result = ledger.seed_storefronts(vec![seeded("s2", dec!(-1), 1)]).await;
    assert_eq!(result.unwrap_err(), LedgerError::InvalidAmount);

    let summary = ledger.summary().await.unwrap();
    assert_eq!(summary.total_storefronts, 1);
    assert_eq!(summary.total_revenue, dec!(10));
}

// ============================================================================
// PERSISTENCE & ATOMICITY
// ============================================================================

#[tokio::test]
async fn test_failed_save_leaves_state_unchanged() {
    let store = Arc::new(FlakyStore::default());
    let storage: Arc<dyn LedgerStorage> = store.clone();
    let ledger = Ledger::open(storage, &fast_config()).await.unwrap();

    let id = ledger.register_account(profile("a@corner.example")).await.unwrap().storefront_id();
    ledger.record_transaction(&id, dec!(10)).await.unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let result = ledger.record_transaction(&id, dec!(5)).await;
    assert!(matches!(result, Err(LedgerError::Storage(_))));

    let stats = ledger.storefront_stats(&id).await.unwrap();
    assert_eq!(stats.revenue, dec!(10));
    assert_eq!(stats.orders, 1);
    assert_eq!(ledger.snapshot().await.unwrap().transactions.len(), 1);

    store.failing.store(false, Ordering::SeqCst);
    let tx = ledger.record_transaction(&id, dec!(5)).await.unwrap();
    assert_eq!(tx.id, TransactionId(2));
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ledger.json");

    let id = {
        let storage: Arc<dyn LedgerStorage> = Arc::new(FileStore::open(&path).await.unwrap());
        let ledger = Ledger::open(storage, &fast_config()).await.unwrap();

        let account = ledger.register_account(profile("a@corner.example")).await.unwrap();
        ledger.login("a@corner.example", "hunter22").await.unwrap();
        let id = account.storefront_id();
        ledger.record_transaction(&id, dec!(19.99)).await.unwrap();
        ledger.close().await.unwrap();
        id
    };

    let storage: Arc<dyn LedgerStorage> = Arc::new(FileStore::open(&path).await.unwrap());
    let ledger = Ledger::open(storage, &fast_config()).await.unwrap();

    let stats = ledger.storefront_stats(&id).await.unwrap();
    assert_eq!(stats.revenue, dec!(19.99));
    assert_eq!(stats.orders, 1);
    assert!(ledger.current_account().await.unwrap().is_some());
    ledger.authenticate("a@corner.example", "hunter22").await.unwrap();

    let next = ledger.record_transaction(&id, dec!(1)).await.unwrap();
    assert_eq!(next.id, TransactionId(2));
}

#[tokio::test]
async fn test_concurrent_records_lose_no_updates() {
    let ledger = open_in_memory().await;
    let id = ledger.register_account(profile("a@corner.example")).await.unwrap().storefront_id();

    let mut handles = vec![];
    for _ in 0..10 {
        let ledger = ledger.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..20 {
                ledger.record_transaction(&id, dec!(1.25)).await.unwrap();
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let stats = ledger.storefront_stats(&id).await.unwrap();
    assert_eq!(stats.orders, 200);
    assert_eq!(stats.revenue, dec!(250.00));
    assert!(ledger.verify_consistency().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_closed_ledger_reports_unavailable() {
    let ledger = open_in_memory().await;
    ledger.close().await.unwrap();

    assert_eq!(ledger.summary().await.unwrap_err(), LedgerError::ActorUnavailable);
}
