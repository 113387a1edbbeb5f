pub mod dispute_repo;
pub mod refund_repo;
pub mod transaction_repo;
pub mod webhook_repo;

use {
    crate::domain::{
        dispute::{Dispute, DisputeSnapshot},
        error::EngineError,
        id::{EventId, ProviderKey},
        refund::{Refund, RefundSettlement},
        store::{HistoryFilter, StatsRow, Store},
        transaction::{StatusChange, Transaction},
        webhook::{EventClaim, WebhookEvent, WebhookResult},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

/// Applies the embedded migrations under `migrations/`.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_transaction(&self, txn: &Transaction) -> Result<(), EngineError> {
        transaction_repo::insert(&self.pool, txn).await
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, EngineError> {
        transaction_repo::get(&self.pool, id).await
    }

    async fn find_transaction_by_provider_txn_id(
        &self,
        provider: &ProviderKey,
        provider_txn_id: &str,
    ) -> Result<Option<Transaction>, EngineError> {
        transaction_repo::find_by_provider_txn_id(&self.pool, provider, provider_txn_id).await
    }

    async fn transition(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Option<Transaction>, EngineError> {
        transaction_repo::transition(&self.pool, id, change).await
    }

    async fn reserve_refund(&self, refund: &Refund) -> Result<Option<Transaction>, EngineError> {
        transaction_repo::reserve_refund(&self.pool, refund).await
    }

    async fn get_refund(&self, id: Uuid) -> Result<Option<Refund>, EngineError> {
        refund_repo::get(&self.pool, id).await
    }

    async fn find_refund_by_provider_id(
        &self,
        transaction_id: Uuid,
        provider_refund_id: &str,
    ) -> Result<Option<Refund>, EngineError> {
        refund_repo::find_by_provider_id(&self.pool, transaction_id, provider_refund_id).await
    }

    async fn complete_refund(
        &self,
        refund_id: Uuid,
        settlement: &RefundSettlement,
    ) -> Result<Option<(Refund, Transaction)>, EngineError> {
        refund_repo::complete(&self.pool, refund_id, settlement).await
    }

    async fn fail_refund(
        &self,
        refund_id: Uuid,
        settlement: &RefundSettlement,
    ) -> Result<Option<Refund>, EngineError> {
        refund_repo::fail(&self.pool, refund_id, settlement).await
    }

    async fn list_refunds(&self, transaction_id: Uuid) -> Result<Vec<Refund>, EngineError> {
        refund_repo::list(&self.pool, transaction_id).await
    }

    async fn upsert_dispute(
        &self,
        transaction_id: Uuid,
        snapshot: &DisputeSnapshot,
    ) -> Result<Dispute, EngineError> {
        dispute_repo::upsert(&self.pool, transaction_id, snapshot).await
    }

    async fn list_disputes(&self, transaction_id: Uuid) -> Result<Vec<Dispute>, EngineError> {
        dispute_repo::list(&self.pool, transaction_id).await
    }

    async fn insert_webhook_event(&self, event: &WebhookEvent) -> Result<(), EngineError> {
        webhook_repo::insert(&self.pool, event).await
    }

    async fn get_webhook_event(&self, id: Uuid) -> Result<Option<WebhookEvent>, EngineError> {
        webhook_repo::get(&self.pool, id).await
    }

    async fn mark_webhook_verified(&self, id: Uuid, verified: bool) -> Result<(), EngineError> {
        webhook_repo::mark_verified(&self.pool, id, verified).await
    }

    async fn set_webhook_identity(
        &self,
        id: Uuid,
        event_id: &EventId,
        event_type: &str,
    ) -> Result<(), EngineError> {
        webhook_repo::set_identity(&self.pool, id, event_id, event_type).await
    }

    async fn claim_webhook_event(
        &self,
        provider: &ProviderKey,
        event_id: &EventId,
        row_id: Uuid,
    ) -> Result<EventClaim, EngineError> {
        webhook_repo::claim(&self.pool, provider, event_id, row_id).await
    }

    async fn finish_webhook_event(
        &self,
        id: Uuid,
        result: &WebhookResult,
    ) -> Result<(), EngineError> {
        webhook_repo::finish(&self.pool, id, result).await
    }

    async fn list_unprocessed_webhook_events(
        &self,
        received_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WebhookEvent>, EngineError> {
        webhook_repo::list_unprocessed(&self.pool, received_before, limit).await
    }

    async fn list_transactions(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<Transaction>, EngineError> {
        transaction_repo::list(&self.pool, filter).await
    }

    async fn stats_rows(&self, since: DateTime<Utc>) -> Result<Vec<StatsRow>, EngineError> {
        transaction_repo::stats(&self.pool, since).await
    }
}
