use {
    super::error::{EngineError, GatewayError},
    super::id::ProviderKey,
    super::money::{Currency, MoneyAmount},
    super::webhook::NormalizedEvent,
    async_trait::async_trait,
    uuid::Uuid,
};

#[derive(Debug, Clone)]
pub struct IntentRequest {
    /// Idempotency key: retries with the same id must not charge twice.
    pub transaction_id: Uuid,
    pub amount: MoneyAmount,
    pub currency: Currency,
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CreatedIntent {
    pub provider_txn_id: String,
    pub provider_payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ConfirmedIntent {
    pub provider_payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    /// Idempotency key for the provider refund call.
    pub refund_id: Uuid,
    pub transaction_id: Uuid,
    pub provider_txn_id: String,
    pub amount: MoneyAmount,
    pub currency: Currency,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct CreatedRefund {
    pub provider_refund_id: String,
    pub provider_payload: Vec<u8>,
}

/// One implementation per payment provider, selected by provider key.
#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn provider(&self) -> &ProviderKey;

    /// HTTP header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    async fn create_intent(&self, request: IntentRequest) -> Result<CreatedIntent, GatewayError>;

    /// `Err(in_progress)` when the provider accepted the confirmation but
    /// has not captured yet.
    async fn confirm(
        &self,
        provider_txn_id: &str,
        confirmation: serde_json::Value,
    ) -> Result<ConfirmedIntent, GatewayError>;

    async fn refund(&self, request: RefundRequest) -> Result<CreatedRefund, GatewayError>;

    /// Constant-time check. Malformed input yields `false`, never a panic.
    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool;

    /// Pure translation of a provider payload; performs no persistence.
    fn process_webhook(&self, payload: &[u8]) -> Result<NormalizedEvent, EngineError>;
}
