use crate::errors::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorefrontId(String);

impl StorefrontId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorefrontId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&AccountId> for StorefrontId {
    fn from(id: &AccountId) -> Self {
        Self(id.0.clone())
    }
}

impl From<&str> for StorefrontId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registration input for a new account and its storefront.
#[derive(Debug, Clone)]
pub struct RegistrationProfile {
    pub store_name: String,
    pub email: String,
    pub secret: String,
    pub store_url: String,
}

impl RegistrationProfile {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.store_name.trim().is_empty() {
            return Err(LedgerError::InvalidProfile("store name cannot be empty"));
        }

        match self.email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(LedgerError::InvalidProfile("email must look like local@domain")),
        }

        if self.secret.is_empty() {
            return Err(LedgerError::InvalidProfile("secret cannot be empty"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    /// Argon2id PHC string, never the plaintext secret.
    pub credential: String,
    pub api_key: String,
    pub store_name: String,
    pub store_url: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn storefront_id(&self) -> StorefrontId {
        StorefrontId::from(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storefront {
    pub id: StorefrontId,
    pub name: String,
    pub email: String,
    pub url: String,
    pub revenue: Decimal,
    pub orders: u64,
    /// Revenue carried in from before the ledger tracked this storefront.
    #[serde(default)]
    pub opening_revenue: Decimal,
    #[serde(default)]
    pub opening_orders: u64,
    pub created_at: DateTime<Utc>,
}

impl Storefront {
    /// Zero-valued storefront for a freshly registered account.
    pub fn for_account(account: &Account) -> Self {
        Self {
            id: account.storefront_id(),
            name: account.store_name.clone(),
            email: account.email.clone(),
            url: account.store_url.clone(),
            revenue: Decimal::ZERO,
            orders: 0,
            opening_revenue: Decimal::ZERO,
            opening_orders: 0,
            created_at: account.created_at,
        }
    }

    /// Pre-seeded storefront whose current totals become its opening baseline.
    pub fn seeded(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        url: impl Into<String>,
        revenue: Decimal,
        orders: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: StorefrontId::new(id),
            name: name.into(),
            email: email.into(),
            url: url.into(),
            revenue,
            orders,
            opening_revenue: revenue,
            opening_orders: orders,
            created_at,
        }
    }

    pub fn avg_order_value(&self) -> Decimal {
        if self.orders == 0 {
            Decimal::ZERO
        } else {
            self.revenue / Decimal::from(self.orders)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub storefront_id: StorefrontId,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorefrontStats {
    pub revenue: Decimal,
    pub orders: u64,
    pub rank: usize,
    pub avg_order_value: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSummary {
    pub total_storefronts: usize,
    pub total_revenue: Decimal,
    pub total_orders: u64,
}

/// Drift between stored aggregates and the transaction history.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsistencyIssue {
    AggregateDrift {
        storefront_id: StorefrontId,
        stored_revenue: Decimal,
        expected_revenue: Decimal,
        stored_orders: u64,
        expected_orders: u64,
    },
    DanglingTransaction {
        transaction_id: TransactionId,
        storefront_id: StorefrontId,
    },
}

impl fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyIssue::AggregateDrift {
                storefront_id,
                stored_revenue,
                expected_revenue,
                stored_orders,
                expected_orders,
            } => write!(
                f,
                "storefront {storefront_id}: revenue {stored_revenue} (expected {expected_revenue}), orders {stored_orders} (expected {expected_orders})"
            ),
            ConsistencyIssue::DanglingTransaction {
                transaction_id,
                storefront_id,
            } => write!(
                f,
                "transaction {transaction_id} references missing storefront {storefront_id}"
            ),
        }
    }
}

/// Parse a user-supplied amount, accepting only positive decimals.
pub fn parse_amount(s: &str) -> Result<Decimal, LedgerError> {
    let amount = Decimal::from_str(s.trim()).map_err(|_| LedgerError::InvalidAmount)?;
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(amount)
}
