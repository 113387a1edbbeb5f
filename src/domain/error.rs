use {
    super::transaction::TransactionStatus,
    derive_more::Display,
    serde::{Deserialize, Serialize},
    thiserror::Error,
    uuid::Uuid,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),

    #[error("webhook signature: {0}")]
    Signature(String),

    #[error("state: transaction {transaction_id} is {actual}, expected {expected}")]
    State {
        transaction_id: Uuid,
        expected: String,
        actual: TransactionStatus,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn state(
        transaction_id: Uuid,
        expected: impl Into<String>,
        actual: TransactionStatus,
    ) -> Self {
        Self::State {
            transaction_id,
            expected: expected.into(),
            actual,
        }
    }

    /// Stable code used in `{success: false, error}` results and in the
    /// webhook log.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Gateway(_) => "gateway_error",
            Self::Signature(_) => "signature_error",
            Self::State { .. } => "state_error",
            Self::NotFound(_) => "not_found",
            Self::Database(_) | Self::Serialization(_) => "internal_error",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Serialization(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    /// The provider answered and refused the operation.
    #[display("declined")]
    Declined,
    /// The provider could not be reached or returned a server error.
    #[display("unavailable")]
    Unavailable,
    /// No answer within the configured gateway timeout.
    #[display("timeout")]
    Timeout,
    /// Accepted by the provider but not final yet; a webhook settles it.
    #[display("in_progress")]
    InProgress,
    #[display("invalid_response")]
    InvalidResponse,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Declined,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn in_progress(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::InProgress,
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::InvalidResponse,
            message: message.into(),
        }
    }

    /// A timed-out call may still have reached the provider, so the
    /// transaction must keep its last known state.
    pub fn is_timeout(&self) -> bool {
        self.kind == GatewayErrorKind::Timeout
    }

    /// Outcome still open at the provider: the local state must not move.
    pub fn is_unsettled(&self) -> bool {
        matches!(self.kind, GatewayErrorKind::Timeout | GatewayErrorKind::InProgress)
    }
}
