pub mod cli;
pub mod config;
pub mod credentials;
pub mod csv_io;
pub mod errors;
pub mod event_store;
pub mod ledger_actor;
pub mod models;
pub mod ranking;
pub mod seed;
pub mod server;
pub mod storage;
pub mod tracking;

pub use config::{CredentialParams, LedgerConfig};
pub use errors::LedgerError;
pub use ledger_actor::{Ledger, LedgerHandle};
pub use models::{
    Account, AccountId, ConsistencyIssue, LedgerSummary, RegistrationProfile, Storefront,
    StorefrontId, StorefrontStats, Transaction, TransactionId,
};
pub use ranking::{rank, rank_now, RankedStorefront, RankingKey, SortOrder};
pub use storage::{FileStore, InMemoryStore, LedgerSnapshot, LedgerStorage};
pub use tracking::{IngestOutcome, TrackingCollector, TrackingEnvelope};
