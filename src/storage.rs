use crate::models::{Account, AccountId, Storefront, Transaction, TransactionId};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Full ledger state, persisted as one self-contained document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub storefronts: Vec<Storefront>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub session: Option<AccountId>,
    #[serde(default)]
    pub next_transaction_id: u64,
}

impl LedgerSnapshot {
    /// Next free transaction id, never below anything already issued.
    pub fn next_transaction_id(&self) -> TransactionId {
        let after_max = self
            .transactions
            .iter()
            .map(|tx| tx.id.0 + 1)
            .max()
            .unwrap_or(1);
        TransactionId(self.next_transaction_id.max(after_max))
    }
}

/// Trait for ledger persistence backends
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    async fn load(&self) -> Result<Option<LedgerSnapshot>>;
    async fn save(&self, snapshot: &LedgerSnapshot) -> Result<()>;
}

/// In-memory storage, for tests and throwaway ledgers
#[derive(Default)]
pub struct InMemoryStore {
    snapshot: Arc<RwLock<Option<LedgerSnapshot>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStorage for InMemoryStore {
    async fn load(&self) -> Result<Option<LedgerSnapshot>> {
        let snapshot = self.snapshot.read().await;
        Ok(snapshot.clone())
    }

    async fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let mut stored = self.snapshot.write().await;
        *stored = Some(snapshot.clone());
        Ok(())
    }
}

/// JSON file storage with write-to-temp, fsync, rename commits
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LedgerStorage for FileStore {
    async fn load(&self) -> Result<Option<LedgerSnapshot>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(None);
        }

        let bytes = fs::read(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let snapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("decoding {}", self.path.display()))?;

        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let data = serde_json::to_vec_pretty(snapshot)?;
        let temp_path = self.path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .with_context(|| format!("creating {}", temp_path.display()))?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("committing {}", self.path.display()))?;

        Ok(())
    }
}
