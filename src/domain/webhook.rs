use {
    super::dispute::{DisputeSnapshot, DisputeStatus},
    super::id::{EventId, ProviderKey},
    super::refund::RefundStatus,
    super::transaction::TransactionStatus,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// One inbound delivery, appended before anything is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub provider: ProviderKey,
    /// Known once the payload has been verified and parsed.
    pub provider_event_id: Option<String>,
    pub event_type: Option<String>,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub signature: String,
    pub verified: bool,
    pub processed: bool,
    pub result: Option<WebhookResult>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    pub fn received(provider: ProviderKey, payload: Vec<u8>, signature: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            provider,
            provider_event_id: None,
            event_type: None,
            payload,
            signature,
            verified: false,
            processed: false,
            result: None,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}

/// How a webhook points at its transaction. Adapters fill whatever the
/// provider payload carries; the provider id is tried first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRef {
    pub provider_txn_id: Option<String>,
    pub transaction_id: Option<Uuid>,
}

impl TransactionRef {
    pub fn is_empty(&self) -> bool {
        self.provider_txn_id.is_none() && self.transaction_id.is_none()
    }
}

/// Provider-neutral meaning of a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WebhookOutcome {
    PaymentProcessing,
    PaymentSucceeded,
    PaymentFailed { reason: Option<String> },
    PaymentCanceled,
    /// `refund_id` is the engine's own id when the provider echoes it back.
    RefundSucceeded {
        provider_refund_id: String,
        refund_id: Option<Uuid>,
    },
    RefundFailed {
        provider_refund_id: String,
        refund_id: Option<Uuid>,
        reason: Option<String>,
    },
    Dispute(DisputeSnapshot),
    /// Event types the engine does not act on.
    Ignored,
}

/// Output of `GatewayAdapter::process_webhook`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub transaction_ref: TransactionRef,
    pub outcome: WebhookOutcome,
}

/// What processing an event did. Persisted on the event row and returned
/// verbatim for duplicate deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookResult {
    Applied {
        transaction_id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    },
    /// The transaction was already where the event wanted it.
    Unchanged {
        transaction_id: Uuid,
        status: TransactionStatus,
    },
    RefundSettled {
        transaction_id: Uuid,
        refund_id: Uuid,
        status: RefundStatus,
    },
    DisputeRecorded {
        transaction_id: Uuid,
        dispute_id: Uuid,
        status: DisputeStatus,
    },
    Ignored {
        reason: String,
    },
    Rejected {
        code: String,
        message: String,
    },
    SignatureRejected,
}

impl WebhookResult {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Unchanged { .. } => "unchanged",
            Self::RefundSettled { .. } => "refund_settled",
            Self::DisputeRecorded { .. } => "dispute_recorded",
            Self::Ignored { .. } => "ignored",
            Self::Rejected { .. } => "rejected",
            Self::SignatureRejected => "signature_rejected",
        }
    }
}

/// Returned to the webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookReceipt {
    pub event_row_id: Uuid,
    pub duplicate: bool,
    /// `None` when processing was deferred to the reprocessor.
    pub result: Option<WebhookResult>,
}

/// Outcome of trying to become the single processor of an event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventClaim {
    Acquired,
    /// Another delivery row owns the key.
    HeldBy(Uuid),
}
