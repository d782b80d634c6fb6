use std::path::PathBuf;

/// Argon2id cost parameters used when hashing account secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for CredentialParams {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub data_dir: PathBuf,
    /// Bound on queued requests to the ledger actor.
    pub mailbox_capacity: usize,
    pub credentials: CredentialParams,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".leaderboard"),
            mailbox_capacity: 1000,
            credentials: CredentialParams::default(),
        }
    }
}

impl LedgerConfig {
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("ledger.json")
    }

    pub fn tracking_log_path(&self) -> PathBuf {
        self.data_dir.join("tracking.jsonl")
    }
}
