use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("authentication failed")]
    AuthFailed,
    #[error("unknown storefront")]
    UnknownStorefront,
    #[error("invalid amount")]
    InvalidAmount,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("invalid profile: {0}")]
    InvalidProfile(&'static str),
    #[error("no account is logged in")]
    NotLoggedIn,
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("ledger actor unavailable")]
    ActorUnavailable,
}

impl LedgerError {
    /// Short machine-readable tag, used in collector acknowledgements.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::DuplicateEmail => "duplicate_email",
            LedgerError::AuthFailed => "auth_failed",
            LedgerError::UnknownStorefront => "unknown_storefront",
            LedgerError::InvalidAmount => "invalid_amount",
            LedgerError::InvalidApiKey => "invalid_api_key",
            LedgerError::InvalidProfile(_) => "invalid_profile",
            LedgerError::NotLoggedIn => "not_logged_in",
            LedgerError::Storage(_) => "storage",
            LedgerError::ActorUnavailable => "unavailable",
        }
    }
}
