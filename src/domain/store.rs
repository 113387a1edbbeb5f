use {
    super::dispute::{Dispute, DisputeSnapshot},
    super::error::EngineError,
    super::id::{EventId, ProviderKey},
    super::money::Currency,
    super::refund::{Refund, RefundSettlement},
    super::transaction::{StatusChange, Transaction, TransactionStatus},
    super::webhook::{EventClaim, WebhookEvent, WebhookResult},
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    uuid::Uuid,
};

#[derive(Debug, Clone)]
pub struct HistoryFilter {
    pub user_id: Option<String>,
    pub order_id: Option<String>,
    pub limit: i64,
}

/// One aggregate bucket as returned by the store; `services::stats` folds
/// these into the reporting shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsRow {
    pub status: TransactionStatus,
    pub method_id: String,
    pub currency: Currency,
    pub count: i64,
    pub amount: i64,
    pub fee: i64,
    pub refunded: i64,
}

/// Persistence port. Every mutating method is a single conditional update
/// (or one short database transaction) so concurrent workers serialize on
/// the row instead of on an in-process lock.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_transaction(&self, txn: &Transaction) -> Result<(), EngineError>;

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, EngineError>;

    async fn find_transaction_by_provider_txn_id(
        &self,
        provider: &ProviderKey,
        provider_txn_id: &str,
    ) -> Result<Option<Transaction>, EngineError>;

    /// Applies `change` only if the row is still in `change.expected`.
    /// `None` means the guard failed (or the row does not exist).
    async fn transition(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Option<Transaction>, EngineError>;

    /// Inserts the pending `refund` and adds its amount to the transaction's
    /// in-flight reservation, both or neither. Refused (`None`) unless the
    /// transaction accepts refunds and `refunded + reserved + amount <= amount`.
    async fn reserve_refund(&self, refund: &Refund) -> Result<Option<Transaction>, EngineError>;

    async fn get_refund(&self, id: Uuid) -> Result<Option<Refund>, EngineError>;

    async fn find_refund_by_provider_id(
        &self,
        transaction_id: Uuid,
        provider_refund_id: &str,
    ) -> Result<Option<Refund>, EngineError>;

    /// `pending -> completed` for the refund and, in the same unit, moves its
    /// amount from the reservation into `refunded_amount` and recomputes the
    /// transaction status. `None` if the refund is no longer pending.
    async fn complete_refund(
        &self,
        refund_id: Uuid,
        settlement: &RefundSettlement,
    ) -> Result<Option<(Refund, Transaction)>, EngineError>;

    /// `pending -> failed` and releases the reservation.
    async fn fail_refund(
        &self,
        refund_id: Uuid,
        settlement: &RefundSettlement,
    ) -> Result<Option<Refund>, EngineError>;

    async fn list_refunds(&self, transaction_id: Uuid) -> Result<Vec<Refund>, EngineError>;

    async fn upsert_dispute(
        &self,
        transaction_id: Uuid,
        snapshot: &DisputeSnapshot,
    ) -> Result<Dispute, EngineError>;

    async fn list_disputes(&self, transaction_id: Uuid) -> Result<Vec<Dispute>, EngineError>;

    async fn insert_webhook_event(&self, event: &WebhookEvent) -> Result<(), EngineError>;

    async fn get_webhook_event(&self, id: Uuid) -> Result<Option<WebhookEvent>, EngineError>;

    async fn mark_webhook_verified(&self, id: Uuid, verified: bool) -> Result<(), EngineError>;

    async fn set_webhook_identity(
        &self,
        id: Uuid,
        event_id: &EventId,
        event_type: &str,
    ) -> Result<(), EngineError>;

    /// First row to claim `(provider, event_id)` owns its processing.
    /// Claiming again from the owning row returns `Acquired`.
    async fn claim_webhook_event(
        &self,
        provider: &ProviderKey,
        event_id: &EventId,
        row_id: Uuid,
    ) -> Result<EventClaim, EngineError>;

    async fn finish_webhook_event(
        &self,
        id: Uuid,
        result: &WebhookResult,
    ) -> Result<(), EngineError>;

    /// Verified rows that were never marked processed, oldest first.
    async fn list_unprocessed_webhook_events(
        &self,
        received_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WebhookEvent>, EngineError>;

    /// Newest first.
    async fn list_transactions(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<Transaction>, EngineError>;

    async fn stats_rows(&self, since: DateTime<Utc>) -> Result<Vec<StatsRow>, EngineError>;
}
