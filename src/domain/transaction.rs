use {
    super::error::EngineError,
    super::fee::Fees,
    super::id::ProviderKey,
    super::money::{Currency, MoneyAmount},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    PartiallyRefunded,
    Refunded,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 7] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::PartiallyRefunded,
        Self::Refunded,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::PartiallyRefunded => "partially_refunded",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// The full lifecycle table. Anything not listed is a `StateError`.
    pub fn can_transition_to(&self, next: &TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, PartiallyRefunded)
                | (Completed, Refunded)
                | (PartiallyRefunded, PartiallyRefunded)
                | (PartiallyRefunded, Refunded)
                | (Refunded, PartiallyRefunded)
        )
    }

    pub fn accepts_refunds(&self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyRefunded)
    }

    /// Whether a charge has been captured at some point.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartiallyRefunded | Self::Refunded
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for TransactionStatus {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| EngineError::Validation(format!("unknown transaction status: {s}")))
    }
}

/// Caller-supplied part of a new transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub order_id: String,
    pub user_id: Option<String>,
    pub method_id: String,
    pub provider: ProviderKey,
    pub amount: MoneyAmount,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    /// Internally generated; doubles as the provider idempotency key.
    pub id: Uuid,
    pub order_id: String,
    pub user_id: Option<String>,
    pub method_id: String,
    pub provider: ProviderKey,
    pub provider_txn_id: Option<String>,
    pub amount: MoneyAmount,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub fee: MoneyAmount,
    pub net_amount: MoneyAmount,
    pub refunded_amount: MoneyAmount,
    /// Sum of refunds sent to the provider but not yet settled.
    #[serde(skip)]
    pub refund_reserved: MoneyAmount,
    #[serde(skip)]
    pub provider_payload: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn pending(new: NewTransaction, fees: Fees) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            order_id: new.order_id,
            user_id: new.user_id,
            method_id: new.method_id,
            provider: new.provider,
            provider_txn_id: None,
            amount: new.amount,
            currency: new.currency,
            status: TransactionStatus::Pending,
            fee: fees.fee,
            net_amount: fees.net,
            refunded_amount: MoneyAmount::ZERO,
            refund_reserved: MoneyAmount::ZERO,
            provider_payload: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Amount still available for new refunds.
    pub fn refundable(&self) -> MoneyAmount {
        self.amount
            .saturating_sub(self.refunded_amount)
            .saturating_sub(self.refund_reserved)
    }

    /// Provider payload decoded as JSON when it is JSON, `null` otherwise.
    pub fn payload_json(&self) -> serde_json::Value {
        self.provider_payload
            .as_deref()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
            .unwrap_or(serde_json::Value::Null)
    }
}

/// A conditional status update: applied only while the row is still in
/// `expected`.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub expected: TransactionStatus,
    pub to: TransactionStatus,
    pub provider_txn_id: Option<String>,
    pub provider_payload: Option<Vec<u8>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusChange {
    pub fn new(expected: TransactionStatus, to: TransactionStatus) -> Self {
        Self {
            expected,
            to,
            provider_txn_id: None,
            provider_payload: None,
            completed_at: None,
        }
    }

    pub fn with_provider_txn_id(mut self, id: impl Into<String>) -> Self {
        self.provider_txn_id = Some(id.into());
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.provider_payload = Some(payload);
        self
    }

    pub fn completed_now(mut self) -> Self {
        self.completed_at = Some(Utc::now());
        self
    }
}

/// Status a transaction lands in once `refunded_amount` reaches `total`.
pub fn status_after_refund(refunded: MoneyAmount, total: MoneyAmount) -> TransactionStatus {
    if refunded >= total {
        TransactionStatus::Refunded
    } else {
        TransactionStatus::PartiallyRefunded
    }
}
