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
pub enum DisputeStatus {
    NeedsResponse,
    UnderReview,
    Won,
    Lost,
    Refunded,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsResponse => "needs_response",
            Self::UnderReview => "under_review",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Refunded => "refunded",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::NeedsResponse | Self::UnderReview)
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for DisputeStatus {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "needs_response" => Ok(Self::NeedsResponse),
            "under_review" => Ok(Self::UnderReview),
            "won" => Ok(Self::Won),
            "lost" => Ok(Self::Lost),
            "refunded" => Ok(Self::Refunded),
            other => Err(EngineError::Validation(format!(
                "unknown dispute status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dispute {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub provider_dispute_id: String,
    pub amount: MoneyAmount,
    pub reason: String,
    pub status: DisputeStatus,
    pub evidence_due_by: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Latest provider view of a dispute, as carried by a webhook. Applied as
/// an upsert keyed on `provider_dispute_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeSnapshot {
    pub provider_dispute_id: String,
    pub amount: MoneyAmount,
    pub reason: String,
    pub status: DisputeStatus,
    pub evidence_due_by: Option<DateTime<Utc>>,
}
