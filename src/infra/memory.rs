use {
    crate::domain::{
        dispute::{Dispute, DisputeSnapshot},
        error::EngineError,
        id::{EventId, ProviderKey},
        refund::{Refund, RefundSettlement, RefundStatus},
        store::{HistoryFilter, StatsRow, Store},
        transaction::{StatusChange, Transaction, status_after_refund},
        webhook::{EventClaim, WebhookEvent, WebhookResult},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    std::{collections::HashMap, sync::Arc},
    tokio::sync::RwLock,
    uuid::Uuid,
};

#[derive(Default)]
struct State {
    transactions: HashMap<Uuid, Transaction>,
    refunds: HashMap<Uuid, Refund>,
    disputes: HashMap<Uuid, Dispute>,
    events: HashMap<Uuid, WebhookEvent>,
    claims: HashMap<(ProviderKey, String), Uuid>,
}

/// Thread-safe in-memory store with the same conditional-update semantics
/// as the Postgres store. Every method takes the lock once, so each call is
/// atomic with respect to the others.
#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every logged delivery, oldest first.
    pub async fn webhook_events(&self) -> Vec<WebhookEvent> {
        let state = self.state.read().await;
        let mut events: Vec<WebhookEvent> = state.events.values().cloned().collect();
        events.sort_by_key(|e| (e.received_at, e.id));
        events
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_transaction(&self, txn: &Transaction) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        if state.transactions.contains_key(&txn.id) {
            return Err(EngineError::Validation(format!(
                "transaction {} already exists",
                txn.id
            )));
        }
        state.transactions.insert(txn.id, txn.clone());
        Ok(())
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, EngineError> {
        let state = self.state.read().await;
        Ok(state.transactions.get(&id).cloned())
    }

    async fn find_transaction_by_provider_txn_id(
        &self,
        provider: &ProviderKey,
        provider_txn_id: &str,
    ) -> Result<Option<Transaction>, EngineError> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .find(|t| &t.provider == provider && t.provider_txn_id.as_deref() == Some(provider_txn_id))
            .cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Option<Transaction>, EngineError> {
        let mut state = self.state.write().await;
        let Some(txn) = state.transactions.get_mut(&id) else {
            return Ok(None);
        };
        if txn.status != change.expected {
            return Ok(None);
        }

        txn.status = change.to;
        if let Some(provider_txn_id) = &change.provider_txn_id {
            txn.provider_txn_id = Some(provider_txn_id.clone());
        }
        if let Some(payload) = &change.provider_payload {
            txn.provider_payload = Some(payload.clone());
        }
        if change.completed_at.is_some() {
            txn.completed_at = change.completed_at;
        }
        txn.updated_at = Utc::now();
        Ok(Some(txn.clone()))
    }

    async fn reserve_refund(&self, refund: &Refund) -> Result<Option<Transaction>, EngineError> {
        let mut guard = self.state.write().await;
        let State {
            refunds,
            transactions,
            ..
        } = &mut *guard;

        let Some(txn) = transactions.get_mut(&refund.transaction_id) else {
            return Ok(None);
        };
        if !txn.status.accepts_refunds() || refund.amount > txn.refundable() {
            return Ok(None);
        }
        let reserved = txn
            .refund_reserved
            .checked_add(refund.amount)
            .ok_or_else(|| EngineError::Validation("refund reservation overflow".into()))?;

        txn.refund_reserved = reserved;
        txn.updated_at = Utc::now();
        refunds.insert(refund.id, refund.clone());
        Ok(Some(txn.clone()))
    }

    async fn get_refund(&self, id: Uuid) -> Result<Option<Refund>, EngineError> {
        let state = self.state.read().await;
        Ok(state.refunds.get(&id).cloned())
    }

    async fn find_refund_by_provider_id(
        &self,
        transaction_id: Uuid,
        provider_refund_id: &str,
    ) -> Result<Option<Refund>, EngineError> {
        let state = self.state.read().await;
        Ok(state
            .refunds
            .values()
            .find(|r| {
                r.transaction_id == transaction_id
                    && r.provider_refund_id.as_deref() == Some(provider_refund_id)
            })
            .cloned())
    }

    async fn complete_refund(
        &self,
        refund_id: Uuid,
        settlement: &RefundSettlement,
    ) -> Result<Option<(Refund, Transaction)>, EngineError> {
        let mut guard = self.state.write().await;
        let State {
            refunds,
            transactions,
            ..
        } = &mut *guard;

        let Some(refund) = refunds.get_mut(&refund_id) else {
            return Ok(None);
        };
        if refund.status != RefundStatus::Pending {
            return Ok(None);
        }
        let txn = transactions.get_mut(&refund.transaction_id).ok_or_else(|| {
            EngineError::NotFound(format!("transaction {}", refund.transaction_id))
        })?;

        let refunded = txn
            .refunded_amount
            .checked_add(refund.amount)
            .filter(|r| *r <= txn.amount)
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "refund {} would exceed transaction amount {}",
                    refund.id, txn.amount
                ))
            })?;

        let now = Utc::now();
        txn.refunded_amount = refunded;
        txn.refund_reserved = txn.refund_reserved.saturating_sub(refund.amount);
        txn.status = status_after_refund(refunded, txn.amount);
        txn.updated_at = now;

        refund.status = RefundStatus::Completed;
        if settlement.provider_refund_id.is_some() {
            refund.provider_refund_id = settlement.provider_refund_id.clone();
        }
        if settlement.provider_payload.is_some() {
            refund.provider_payload = settlement.provider_payload.clone();
        }
        refund.updated_at = now;

        Ok(Some((refund.clone(), txn.clone())))
    }

    async fn fail_refund(
        &self,
        refund_id: Uuid,
        settlement: &RefundSettlement,
    ) -> Result<Option<Refund>, EngineError> {
        let mut guard = self.state.write().await;
        let State {
            refunds,
            transactions,
            ..
        } = &mut *guard;

        let Some(refund) = refunds.get_mut(&refund_id) else {
            return Ok(None);
        };
        if refund.status != RefundStatus::Pending {
            return Ok(None);
        }

        let now = Utc::now();
        if let Some(txn) = transactions.get_mut(&refund.transaction_id) {
            txn.refund_reserved = txn.refund_reserved.saturating_sub(refund.amount);
            txn.updated_at = now;
        }

        refund.status = RefundStatus::Failed;
        if settlement.provider_refund_id.is_some() {
            refund.provider_refund_id = settlement.provider_refund_id.clone();
        }
        if settlement.provider_payload.is_some() {
            refund.provider_payload = settlement.provider_payload.clone();
        }
        refund.failure_reason = settlement.failure_reason.clone();
        refund.updated_at = now;

        Ok(Some(refund.clone()))
    }

    async fn list_refunds(&self, transaction_id: Uuid) -> Result<Vec<Refund>, EngineError> {
        let state = self.state.read().await;
        let mut refunds: Vec<Refund> = state
            .refunds
            .values()
            .filter(|r| r.transaction_id == transaction_id)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| (r.created_at, r.id));
        Ok(refunds)
    }

    async fn upsert_dispute(
        &self,
        transaction_id: Uuid,
        snapshot: &DisputeSnapshot,
    ) -> Result<Dispute, EngineError> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        if let Some(existing) = state
            .disputes
            .values_mut()
            .find(|d| d.provider_dispute_id == snapshot.provider_dispute_id)
        {
            existing.amount = snapshot.amount;
            existing.reason = snapshot.reason.clone();
            existing.status = snapshot.status;
            existing.evidence_due_by = snapshot.evidence_due_by;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let dispute = Dispute {
            id: Uuid::now_v7(),
            transaction_id,
            provider_dispute_id: snapshot.provider_dispute_id.clone(),
            amount: snapshot.amount,
            reason: snapshot.reason.clone(),
            status: snapshot.status,
            evidence_due_by: snapshot.evidence_due_by,
            created_at: now,
            updated_at: now,
        };
        state.disputes.insert(dispute.id, dispute.clone());
        Ok(dispute)
    }

    async fn list_disputes(&self, transaction_id: Uuid) -> Result<Vec<Dispute>, EngineError> {
        let state = self.state.read().await;
        let mut disputes: Vec<Dispute> = state
            .disputes
            .values()
            .filter(|d| d.transaction_id == transaction_id)
            .cloned()
            .collect();
        disputes.sort_by_key(|d| (d.created_at, d.id));
        Ok(disputes)
    }

    async fn insert_webhook_event(&self, event: &WebhookEvent) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        state.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_webhook_event(&self, id: Uuid) -> Result<Option<WebhookEvent>, EngineError> {
        let state = self.state.read().await;
        Ok(state.events.get(&id).cloned())
    }

    async fn mark_webhook_verified(&self, id: Uuid, verified: bool) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        let event = state
            .events
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("webhook event {id}")))?;
        event.verified = verified;
        Ok(())
    }

    async fn set_webhook_identity(
        &self,
        id: Uuid,
        event_id: &EventId,
        event_type: &str,
    ) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        let event = state
            .events
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("webhook event {id}")))?;
        event.provider_event_id = Some(event_id.as_str().to_string());
        event.event_type = Some(event_type.to_string());
        Ok(())
    }

    async fn claim_webhook_event(
        &self,
        provider: &ProviderKey,
        event_id: &EventId,
        row_id: Uuid,
    ) -> Result<EventClaim, EngineError> {
        let mut state = self.state.write().await;
        let owner = *state
            .claims
            .entry((provider.clone(), event_id.as_str().to_string()))
            .or_insert(row_id);
        if owner == row_id {
            Ok(EventClaim::Acquired)
        } else {
            Ok(EventClaim::HeldBy(owner))
        }
    }

    async fn finish_webhook_event(
        &self,
        id: Uuid,
        result: &WebhookResult,
    ) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        let event = state
            .events
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("webhook event {id}")))?;
        event.processed = true;
        event.result = Some(result.clone());
        event.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn list_unprocessed_webhook_events(
        &self,
        received_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WebhookEvent>, EngineError> {
        let state = self.state.read().await;
        let mut events: Vec<WebhookEvent> = state
            .events
            .values()
            .filter(|e| e.verified && !e.processed && e.received_at < received_before)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.received_at, e.id));
        events.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(events)
    }

    async fn list_transactions(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<Transaction>, EngineError> {
        let state = self.state.read().await;
        let mut txns: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| {
                filter
                    .user_id
                    .as_deref()
                    .is_none_or(|u| t.user_id.as_deref() == Some(u))
                    && filter.order_id.as_deref().is_none_or(|o| t.order_id == o)
            })
            .cloned()
            .collect();
        txns.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        txns.truncate(usize::try_from(filter.limit).unwrap_or(0));
        Ok(txns)
    }

    async fn stats_rows(&self, since: DateTime<Utc>) -> Result<Vec<StatsRow>, EngineError> {
        let state = self.state.read().await;
        let mut rows: Vec<StatsRow> = Vec::new();

        for txn in state.transactions.values().filter(|t| t.created_at >= since) {
            let idx = match rows.iter().position(|r| {
                r.status == txn.status && r.method_id == txn.method_id && r.currency == txn.currency
            }) {
                Some(idx) => idx,
                None => {
                    rows.push(StatsRow {
                        status: txn.status,
                        method_id: txn.method_id.clone(),
                        currency: txn.currency,
                        count: 0,
                        amount: 0,
                        fee: 0,
                        refunded: 0,
                    });
                    rows.len() - 1
                }
            };
            let row = &mut rows[idx];
            row.count += 1;
            row.amount += txn.amount.minor_units();
            row.fee += txn.fee.minor_units();
            row.refunded += txn.refunded_amount.minor_units();
        }

        Ok(rows)
    }
}
