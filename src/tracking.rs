//! Collector side of the embeddable tracking snippet.
//!
//! Events arrive keyed by an account's API key. Purchases become ledger
//! transactions on the storefront that key belongs to; every other event is
//! only acknowledged and logged.

use crate::errors::LedgerError;
use crate::event_store::{TrackedEventRecord, TrackingLog};
use crate::ledger_actor::LedgerHandle;
use crate::models::{parse_amount, StorefrontId, Transaction};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const PURCHASE_EVENT: &str = "purchase";

/// Wire shape of a tracking event, shared by CSV rows and JSON bodies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingEnvelope {
    #[serde(default, alias = "apiKey")]
    pub api_key: Option<String>,
    pub event: String,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default, alias = "orderId")]
    pub order_id: Option<String>,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Recorded(Transaction),
    Observed {
        storefront_id: StorefrontId,
        event: String,
    },
}

impl IngestOutcome {
    /// One-line acknowledgement sent back to collector clients.
    pub fn ack(&self) -> String {
        match self {
            IngestOutcome::Recorded(tx) => format!(
                "accepted,{PURCHASE_EVENT},{},{},{}",
                tx.storefront_id, tx.id, tx.amount
            ),
            IngestOutcome::Observed {
                storefront_id,
                event,
            } => format!("accepted,{event},{storefront_id}"),
        }
    }
}

#[derive(Clone)]
pub struct TrackingCollector {
    ledger: LedgerHandle,
    log: Option<Arc<TrackingLog>>,
}

impl TrackingCollector {
    pub fn new(ledger: LedgerHandle) -> Self {
        Self { ledger, log: None }
    }

    pub fn with_log(mut self, log: Arc<TrackingLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub async fn ingest(&self, envelope: TrackingEnvelope) -> Result<IngestOutcome, LedgerError> {
        let api_key = envelope
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(LedgerError::InvalidApiKey)?;
        let event = envelope.event.trim().to_lowercase();

        let outcome = if event == PURCHASE_EVENT {
            let amount = envelope
                .amount
                .as_deref()
                .ok_or(LedgerError::InvalidAmount)
                .and_then(parse_amount)?;
            let transaction = self
                .ledger
                .record_tracked_purchase(api_key, amount, envelope.order_id.clone())
                .await?;
            IngestOutcome::Recorded(transaction)
        } else {
            let account = self.ledger.resolve_api_key(api_key).await?;
            IngestOutcome::Observed {
                storefront_id: account.storefront_id(),
                event: event.clone(),
            }
        };

        tracing::debug!(event = %event, "Tracking event accepted");

        if let Some(log) = &self.log {
            let record = Self::record_for(&outcome, &envelope, event);
            if let Err(e) = log.append(&record).await {
                tracing::error!(error = ?e, "Failed to append tracking log - ledger already updated");
            }
        }

        Ok(outcome)
    }

    fn record_for(
        outcome: &IngestOutcome,
        envelope: &TrackingEnvelope,
        event: String,
    ) -> TrackedEventRecord {
        let (storefront_id, amount, transaction_id) = match outcome {
            IngestOutcome::Recorded(tx) => (tx.storefront_id.clone(), Some(tx.amount), Some(tx.id)),
            IngestOutcome::Observed { storefront_id, .. } => (storefront_id.clone(), None, None),
        };

        TrackedEventRecord {
            received_at: Utc::now(),
            storefront_id,
            event,
            amount,
            transaction_id,
            order_id: envelope.order_id.clone(),
            session_id: envelope.session_id.clone(),
            url: envelope.url.clone(),
        }
    }
}
