use {
    super::error::EngineError,
    super::money::MoneyAmount,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Completed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RefundStatus {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(EngineError::Validation(format!(
                "unknown refund status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Refund {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub provider_refund_id: Option<String>,
    pub amount: MoneyAmount,
    pub reason: String,
    pub status: RefundStatus,
    #[serde(skip)]
    pub provider_payload: Option<Vec<u8>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    pub fn pending(transaction_id: Uuid, amount: MoneyAmount, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            transaction_id,
            provider_refund_id: None,
            amount,
            reason: reason.into(),
            status: RefundStatus::Pending,
            provider_payload: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Provider confirmation attached when a pending refund is settled.
#[derive(Debug, Clone, Default)]
pub struct RefundSettlement {
    pub provider_refund_id: Option<String>,
    pub provider_payload: Option<Vec<u8>>,
    pub failure_reason: Option<String>,
}
