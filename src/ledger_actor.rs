use crate::config::LedgerConfig;
use crate::credentials::{constant_time_eq, generate_api_key, CredentialHasher};
use crate::errors::LedgerError;
use crate::models::{
    Account, AccountId, ConsistencyIssue, LedgerSummary, RegistrationProfile, Storefront,
    StorefrontId, StorefrontStats, Transaction,
};
use crate::ranking::revenue_standing;
use crate::storage::{LedgerSnapshot, LedgerStorage};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

type Reply<T> = oneshot::Sender<Result<T, LedgerError>>;

pub enum LedgerMessage {
    RegisterAccount {
        profile: RegistrationProfile,
        reply: Reply<Account>,
    },
    Authenticate {
        email: String,
        secret: String,
        reply: Reply<Account>,
    },
    Login {
        email: String,
        secret: String,
        reply: Reply<Account>,
    },
    Logout {
        reply: Reply<()>,
    },
    CurrentAccount {
        reply: Reply<Option<Account>>,
    },
    RecordTransaction {
        storefront_id: StorefrontId,
        amount: Decimal,
        order_id: Option<String>,
        reply: Reply<Transaction>,
    },
    RecordTrackedPurchase {
        api_key: String,
        amount: Decimal,
        order_id: Option<String>,
        reply: Reply<Transaction>,
    },
    ResolveApiKey {
        api_key: String,
        reply: Reply<Account>,
    },
    StorefrontStats {
        storefront_id: StorefrontId,
        reply: Reply<StorefrontStats>,
    },
    RecentTransactions {
        storefront_id: StorefrontId,
        limit: usize,
        reply: Reply<Vec<Transaction>>,
    },
    SeedStorefronts {
        seeds: Vec<Storefront>,
        reply: Reply<usize>,
    },
    VerifyConsistency {
        reply: oneshot::Sender<Vec<ConsistencyIssue>>,
    },
    Summary {
        reply: oneshot::Sender<LedgerSummary>,
    },
    Storefronts {
        reply: oneshot::Sender<Vec<Storefront>>,
    },
    Snapshot {
        reply: oneshot::Sender<LedgerSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Sole owner of ledger state. Every mutation is staged on a copy, written
/// through to storage, and only then swapped in.
pub struct LedgerActor {
    state: LedgerSnapshot,
    storage: Arc<dyn LedgerStorage>,
    hasher: CredentialHasher,
    dummy_credential: String,
    receiver: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    pub async fn new(
        state: LedgerSnapshot,
        storage: Arc<dyn LedgerStorage>,
        hasher: CredentialHasher,
        receiver: mpsc::Receiver<LedgerMessage>,
    ) -> Result<Self, LedgerError> {
        // Verified against when no email matches, so failed logins cost the same.
        let dummy_credential = hasher.hash_blocking("no-such-account".to_string()).await?;

        Ok(Self {
            state,
            storage,
            hasher,
            dummy_credential,
            receiver,
        })
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                LedgerMessage::RegisterAccount { profile, reply } => {
                    let _ = reply.send(self.register_account(profile).await);
                }
                LedgerMessage::Authenticate {
                    email,
                    secret,
                    reply,
                } => {
                    let _ = reply.send(self.authenticate(&email, &secret).await);
                }
                LedgerMessage::Login {
                    email,
                    secret,
                    reply,
                } => {
                    let _ = reply.send(self.login(&email, &secret).await);
                }
                LedgerMessage::Logout { reply } => {
                    let _ = reply.send(self.logout().await);
                }
                LedgerMessage::CurrentAccount { reply } => {
                    let _ = reply.send(Ok(self.current_account()));
                }
                LedgerMessage::RecordTransaction {
                    storefront_id,
                    amount,
                    order_id,
                    reply,
                } => {
                    let result = self.record_transaction(storefront_id, amount, order_id).await;
                    let _ = reply.send(result);
                }
                LedgerMessage::RecordTrackedPurchase {
                    api_key,
                    amount,
                    order_id,
                    reply,
                } => {
                    let result = match self.resolve_api_key(&api_key).map(Account::storefront_id) {
                        Ok(storefront_id) => {
                            self.record_transaction(storefront_id, amount, order_id).await
                        }
                        Err(e) => {
                            warn!("Tracked purchase rejected: unknown api key");
                            Err(e)
                        }
                    };
                    let _ = reply.send(result);
                }
                LedgerMessage::ResolveApiKey { api_key, reply } => {
                    let _ = reply.send(self.resolve_api_key(&api_key).cloned());
                }
                LedgerMessage::StorefrontStats {
                    storefront_id,
                    reply,
                } => {
                    let _ = reply.send(self.storefront_stats(&storefront_id));
                }
                LedgerMessage::RecentTransactions {
                    storefront_id,
                    limit,
                    reply,
                } => {
                    let _ = reply.send(self.recent_transactions(&storefront_id, limit));
                }
                LedgerMessage::SeedStorefronts { seeds, reply } => {
                    let _ = reply.send(self.seed_storefronts(seeds).await);
                }
                LedgerMessage::VerifyConsistency { reply } => {
                    let _ = reply.send(self.verify_consistency());
                }
                LedgerMessage::Summary { reply } => {
                    let _ = reply.send(self.summary());
                }
                LedgerMessage::Storefronts { reply } => {
                    let _ = reply.send(self.state.storefronts.clone());
                }
                LedgerMessage::Snapshot { reply } => {
                    let _ = reply.send(self.state.clone());
                }
                LedgerMessage::Shutdown { reply } => {
                    let _ = reply.send(());
                    break;
                }
            }
        }

        debug!("Ledger actor terminated");
    }

    async fn commit(&mut self, staged: LedgerSnapshot) -> Result<(), LedgerError> {
        if let Err(e) = self.storage.save(&staged).await {
            error!(error = ?e, "Failed to persist ledger - keeping previous state");
            return Err(LedgerError::Storage(format!("{e:#}")));
        }

        self.state = staged;
        Ok(())
    }

    async fn register_account(
        &mut self,
        profile: RegistrationProfile,
    ) -> Result<Account, LedgerError> {
        profile.validate()?;

        if self.state.accounts.iter().any(|a| a.email == profile.email) {
            return Err(LedgerError::DuplicateEmail);
        }

        let credential = self.hasher.hash_blocking(profile.secret).await?;

        let account = Account {
            id: AccountId::generate(),
            email: profile.email,
            credential,
            api_key: generate_api_key(),
            store_name: profile.store_name,
            store_url: profile.store_url,
            created_at: Utc::now(),
        };

        let mut staged = self.state.clone();
        staged.accounts.push(account.clone());
        staged.storefronts.push(Storefront::for_account(&account));
        self.commit(staged).await?;

        info!(account_id = %account.id, email = %account.email, "Account registered");
        Ok(account)
    }

    async fn authenticate(&self, email: &str, secret: &str) -> Result<Account, LedgerError> {
        // Full scan without early exit.
        let mut matched = None;
        for account in &self.state.accounts {
            if constant_time_eq(&account.email, email) && matched.is_none() {
                matched = Some(account.clone());
            }
        }

        let credential = matched
            .as_ref()
            .map_or_else(|| self.dummy_credential.clone(), |a| a.credential.clone());
        let verified = self
            .hasher
            .verify_blocking(secret.to_string(), credential)
            .await;

        match matched {
            Some(account) if verified => Ok(account),
            _ => Err(LedgerError::AuthFailed),
        }
    }

    async fn login(&mut self, email: &str, secret: &str) -> Result<Account, LedgerError> {
        let account = self.authenticate(email, secret).await?;

        let mut staged = self.state.clone();
        staged.session = Some(account.id.clone());
        self.commit(staged).await?;

        info!(account_id = %account.id, "Session opened");
        Ok(account)
    }

    async fn logout(&mut self) -> Result<(), LedgerError> {
        if self.state.session.is_none() {
            return Err(LedgerError::NotLoggedIn);
        }

        let mut staged = self.state.clone();
        staged.session = None;
        self.commit(staged).await
    }

    fn current_account(&self) -> Option<Account> {
        let id = self.state.session.as_ref()?;
        self.state.accounts.iter().find(|a| &a.id == id).cloned()
    }

    fn resolve_api_key(&self, api_key: &str) -> Result<&Account, LedgerError> {
        if api_key.trim().is_empty() {
            return Err(LedgerError::InvalidApiKey);
        }

        let mut matched = None;
        for account in &self.state.accounts {
            if constant_time_eq(&account.api_key, api_key) && matched.is_none() {
                matched = Some(account);
            }
        }

        matched.ok_or(LedgerError::InvalidApiKey)
    }

    async fn record_transaction(
        &mut self,
        storefront_id: StorefrontId,
        amount: Decimal,
        order_id: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let index = self
            .state
            .storefronts
            .iter()
            .position(|s| s.id == storefront_id)
            .ok_or(LedgerError::UnknownStorefront)?;

        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        let id = self.state.next_transaction_id();
        let transaction = Transaction {
            id,
            storefront_id,
            amount,
            timestamp: Utc::now(),
            order_id,
        };

        let current = &self.state.storefronts[index];
        let revenue = current
            .revenue
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount)?;
        let orders = current
            .orders
            .checked_add(1)
            .ok_or(LedgerError::InvalidAmount)?;

        let mut staged = self.state.clone();
        staged.transactions.push(transaction.clone());
        staged.next_transaction_id = id.0 + 1;
        let storefront = &mut staged.storefronts[index];
        storefront.revenue = revenue;
        storefront.orders = orders;
        self.commit(staged).await?;

        info!(
            transaction_id = %transaction.id,
            storefront_id = %transaction.storefront_id,
            amount = %transaction.amount,
            "Transaction recorded"
        );
        Ok(transaction)
    }

    fn storefront_stats(&self, storefront_id: &StorefrontId) -> Result<StorefrontStats, LedgerError> {
        let storefront = self
            .state
            .storefronts
            .iter()
            .find(|s| &s.id == storefront_id)
            .ok_or(LedgerError::UnknownStorefront)?;
        let rank = revenue_standing(&self.state.storefronts, storefront_id)
            .ok_or(LedgerError::UnknownStorefront)?;

        Ok(StorefrontStats {
            revenue: storefront.revenue,
            orders: storefront.orders,
            rank,
            avg_order_value: storefront.avg_order_value(),
        })
    }

    fn recent_transactions(
        &self,
        storefront_id: &StorefrontId,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError> {
        if !self.state.storefronts.iter().any(|s| &s.id == storefront_id) {
            return Err(LedgerError::UnknownStorefront);
        }

        // Ids grow with append order, so newest first is a reverse walk.
        Ok(self
            .state
            .transactions
            .iter()
            .rev()
            .filter(|tx| &tx.storefront_id == storefront_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn seed_storefronts(&mut self, seeds: Vec<Storefront>) -> Result<usize, LedgerError> {
        if seeds.iter().any(|s| s.opening_revenue < Decimal::ZERO || s.revenue < Decimal::ZERO) {
            return Err(LedgerError::InvalidAmount);
        }

        let mut staged = self.state.clone();
        let mut inserted = 0;
        for seed in seeds {
            if staged.storefronts.iter().any(|s| s.id == seed.id) {
                warn!(storefront_id = %seed.id, "Seed skipped, storefront already exists");
                continue;
            }
            staged.storefronts.push(Storefront {
                revenue: seed.opening_revenue,
                orders: seed.opening_orders,
                ..seed
            });
            inserted += 1;
        }

        if inserted > 0 {
            self.commit(staged).await?;
            info!(inserted, "Seed storefronts added");
        }

        Ok(inserted)
    }

    fn verify_consistency(&self) -> Vec<ConsistencyIssue> {
        let mut totals: HashMap<&StorefrontId, (Decimal, u64)> = self
            .state
            .storefronts
            .iter()
            .map(|s| (&s.id, (s.opening_revenue, s.opening_orders)))
            .collect();

        let mut issues = Vec::new();
        for tx in &self.state.transactions {
            match totals.get_mut(&tx.storefront_id) {
                // Saturate: a stored aggregate can never exceed the representable maximum.
                Some((revenue, orders)) => {
                    *revenue = revenue.saturating_add(tx.amount);
                    *orders = orders.saturating_add(1);
                }
                None => issues.push(ConsistencyIssue::DanglingTransaction {
                    transaction_id: tx.id,
                    storefront_id: tx.storefront_id.clone(),
                }),
            }
        }

        for storefront in &self.state.storefronts {
            let Some(&(expected_revenue, expected_orders)) = totals.get(&storefront.id) else {
                continue;
            };
            if storefront.revenue != expected_revenue || storefront.orders != expected_orders {
                issues.push(ConsistencyIssue::AggregateDrift {
                    storefront_id: storefront.id.clone(),
                    stored_revenue: storefront.revenue,
                    expected_revenue,
                    stored_orders: storefront.orders,
                    expected_orders,
                });
            }
        }

        issues
    }

    /// Totals saturate at the representable maximum rather than overflow.
    fn summary(&self) -> LedgerSummary {
        let storefronts = &self.state.storefronts;
        LedgerSummary {
            total_storefronts: storefronts.len(),
            total_revenue: storefronts
                .iter()
                .fold(Decimal::ZERO, |total, s| total.saturating_add(s.revenue)),
            total_orders: storefronts
                .iter()
                .fold(0u64, |total, s| total.saturating_add(s.orders)),
        }
    }
}

/// Entry point for opening a ledger over a storage backend.
pub struct Ledger;

impl Ledger {
    /// Load the last committed snapshot (or start empty) and spawn the actor.
    pub async fn open(
        storage: Arc<dyn LedgerStorage>,
        config: &LedgerConfig,
    ) -> Result<LedgerHandle, LedgerError> {
        let state = storage
            .load()
            .await
            .map_err(|e| LedgerError::Storage(format!("{e:#}")))?
            .unwrap_or_default();

        debug!(
            accounts = state.accounts.len(),
            storefronts = state.storefronts.len(),
            transactions = state.transactions.len(),
            "Ledger loaded"
        );

        let hasher = CredentialHasher::new(config.credentials)?;
        let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let actor = LedgerActor::new(state, storage, hasher, rx).await?;

        tokio::spawn(async move {
            actor.run().await;
        });

        Ok(LedgerHandle::new(tx))
    }
}

#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> LedgerMessage,
    ) -> Result<T, LedgerError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| LedgerError::ActorUnavailable)?;

        reply_rx
            .await
            .map_err(|_| LedgerError::ActorUnavailable)?
    }

    async fn query<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T, LedgerError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| LedgerError::ActorUnavailable)?;

        reply_rx.await.map_err(|_| LedgerError::ActorUnavailable)
    }

    pub async fn register_account(
        &self,
        profile: RegistrationProfile,
    ) -> Result<Account, LedgerError> {
        self.request(|reply| LedgerMessage::RegisterAccount { profile, reply })
            .await
    }

    pub async fn authenticate(&self, email: &str, secret: &str) -> Result<Account, LedgerError> {
        let (email, secret) = (email.to_string(), secret.to_string());
        self.request(|reply| LedgerMessage::Authenticate {
            email,
            secret,
            reply,
        })
        .await
    }

    pub async fn login(&self, email: &str, secret: &str) -> Result<Account, LedgerError> {
        let (email, secret) = (email.to_string(), secret.to_string());
        self.request(|reply| LedgerMessage::Login {
            email,
            secret,
            reply,
        })
        .await
    }

    pub async fn logout(&self) -> Result<(), LedgerError> {
        self.request(|reply| LedgerMessage::Logout { reply }).await
    }

    pub async fn current_account(&self) -> Result<Option<Account>, LedgerError> {
        self.request(|reply| LedgerMessage::CurrentAccount { reply })
            .await
    }

    pub async fn record_transaction(
        &self,
        storefront_id: &StorefrontId,
        amount: Decimal,
    ) -> Result<Transaction, LedgerError> {
        self.record_order(storefront_id, amount, None).await
    }

    /// [`record_transaction`](Self::record_transaction) carrying an external order reference.
    pub async fn record_order(
        &self,
        storefront_id: &StorefrontId,
        amount: Decimal,
        order_id: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let storefront_id = storefront_id.clone();
        self.request(|reply| LedgerMessage::RecordTransaction {
            storefront_id,
            amount,
            order_id,
            reply,
        })
        .await
    }

    pub async fn record_tracked_purchase(
        &self,
        api_key: &str,
        amount: Decimal,
        order_id: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let api_key = api_key.to_string();
        self.request(|reply| LedgerMessage::RecordTrackedPurchase {
            api_key,
            amount,
            order_id,
            reply,
        })
        .await
    }

    pub async fn resolve_api_key(&self, api_key: &str) -> Result<Account, LedgerError> {
        let api_key = api_key.to_string();
        self.request(|reply| LedgerMessage::ResolveApiKey { api_key, reply })
            .await
    }

    pub async fn storefront_stats(
        &self,
        storefront_id: &StorefrontId,
    ) -> Result<StorefrontStats, LedgerError> {
        let storefront_id = storefront_id.clone();
        self.request(|reply| LedgerMessage::StorefrontStats {
            storefront_id,
            reply,
        })
        .await
    }

    pub async fn recent_transactions(
        &self,
        storefront_id: &StorefrontId,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let storefront_id = storefront_id.clone();
        self.request(|reply| LedgerMessage::RecentTransactions {
            storefront_id,
            limit,
            reply,
        })
        .await
    }

    pub async fn seed_storefronts(&self, seeds: Vec<Storefront>) -> Result<usize, LedgerError> {
        self.request(|reply| LedgerMessage::SeedStorefronts { seeds, reply })
            .await
    }

    pub async fn verify_consistency(&self) -> Result<Vec<ConsistencyIssue>, LedgerError> {
        self.query(|reply| LedgerMessage::VerifyConsistency { reply })
            .await
    }

    pub async fn summary(&self) -> Result<LedgerSummary, LedgerError> {
        self.query(|reply| LedgerMessage::Summary { reply }).await
    }

    pub async fn storefronts(&self) -> Result<Vec<Storefront>, LedgerError> {
        self.query(|reply| LedgerMessage::Storefronts { reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        self.query(|reply| LedgerMessage::Snapshot { reply }).await
    }

    /// Stop the actor once queued requests ahead of this one are answered.
    pub async fn close(&self) -> Result<(), LedgerError> {
        self.query(|reply| LedgerMessage::Shutdown { reply }).await
    }
}
