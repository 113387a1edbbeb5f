use {
    crate::{
        adapters::Gateways,
        domain::{
            error::{EngineError, GatewayError},
            fee::{self, Fees},
            gateway::{GatewayAdapter, IntentRequest},
            id::ProviderKey,
            method::PaymentMethod,
            money::{Currency, MoneyAmount},
            refund::{Refund, RefundSettlement},
            store::{HistoryFilter, Store},
            transaction::{NewTransaction, StatusChange, Transaction, TransactionStatus},
            webhook::{TransactionRef, WebhookResult},
        },
        services::{registry::MethodRegistry, stats::{self, Stats}},
    },
    chrono::Utc,
    std::{future::Future, sync::Arc, time::Duration},
    uuid::Uuid,
};

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 500;
pub const MAX_STATS_WINDOW_DAYS: i64 = 366;

/// Bound on CAS retries when a webhook walks a transaction through more
/// than one status while other writers are active.
const MAX_WEBHOOK_STEPS: usize = 8;

#[derive(Debug, Clone)]
pub struct CreateIntent {
    pub order_id: String,
    pub user_id: Option<String>,
    pub method_id: String,
    pub amount: MoneyAmount,
    pub currency: Currency,
    /// Passed through to the provider untouched.
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct IntentCreated {
    pub transaction: Transaction,
    pub fees: Fees,
}

enum Step {
    Done,
    Move(TransactionStatus),
    Reject,
}

/// How a transaction in `current` moves toward the status a provider event
/// reports. Success walks `pending -> processing -> completed` one legal
/// step at a time.
fn webhook_step(current: TransactionStatus, target: TransactionStatus) -> Step {
    use TransactionStatus::*;
    match (current, target) {
        (Pending, Processing | Completed) => Step::Move(Processing),
        (Processing, Completed) => Step::Move(Completed),
        (Processing, Processing) => Step::Done,
        (Completed | PartiallyRefunded | Refunded, Processing | Completed) => Step::Done,
        (Pending | Processing, Failed) => Step::Move(Failed),
        (Pending, Cancelled) => Step::Move(Cancelled),
        // Cancelling is only legal before the provider started processing.
        (Processing, Cancelled) => Step::Move(Failed),
        (Failed | Cancelled, Failed | Cancelled) => Step::Done,
        _ => Step::Reject,
    }
}

/// Owns the transaction lifecycle. Every status write goes through
/// [`Orchestrator::transition`] or one of the refund settlement helpers,
/// all of which are conditional updates in the store.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn Store>,
    registry: Arc<MethodRegistry>,
    gateways: Gateways,
    gateway_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<MethodRegistry>,
        gateways: Gateways,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            gateways,
            gateway_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    pub fn gateways(&self) -> &Gateways {
        &self.gateways
    }

    pub fn list_methods(
        &self,
        amount: Option<MoneyAmount>,
        currency: Currency,
        country: &str,
    ) -> Vec<&PaymentMethod> {
        self.registry.list_available(amount, currency, country)
    }

    /// Runs a provider call under the configured timeout.
    pub async fn call_gateway<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        match tokio::time::timeout(self.gateway_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::timeout(format!(
                "no response within {}ms",
                self.gateway_timeout.as_millis()
            ))),
        }
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Transaction, EngineError> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("transaction {id}")))
    }

    #[tracing::instrument(
        name = "create_intent",
        skip_all,
        fields(order_id = %request.order_id, method_id = %request.method_id, transaction_id = tracing::field::Empty)
    )]
    pub async fn create_intent(&self, request: CreateIntent) -> Result<IntentCreated, EngineError> {
        if request.order_id.trim().is_empty() {
            return Err(EngineError::Validation("order_id must not be empty".into()));
        }
        if request.amount.is_zero() {
            return Err(EngineError::Validation("amount must be positive".into()));
        }

        let method =
            self.registry
                .require_usable(&request.method_id, request.amount, request.currency)?;
        let gateway = self.gateways.get(&method.provider)?;
        let fees = fee::calculate(request.amount, &method.fees)?;

        let txn = Transaction::pending(
            NewTransaction {
                order_id: request.order_id,
                user_id: request.user_id,
                method_id: method.id.clone(),
                provider: method.provider.clone(),
                amount: request.amount,
                currency: request.currency,
            },
            fees,
        );
        self.store.insert_transaction(&txn).await?;
        tracing::Span::current().record("transaction_id", tracing::field::display(txn.id));
        tracing::info!(
            amount = %txn.amount,
            currency = %txn.currency,
            fee = %fees.fee,
            "transaction persisted as pending"
        );

        let transaction = self.submit_intent(&*gateway, txn, request.extra).await?;
        Ok(IntentCreated { transaction, fees })
    }

    /// Re-issues the provider intent for a transaction still in `pending`,
    /// reusing its id as the idempotency key.
    pub async fn retry_intent(&self, id: Uuid) -> Result<Transaction, EngineError> {
        let txn = self.get_transaction(id).await?;
        if txn.status != TransactionStatus::Pending {
            return Err(EngineError::state(id, TransactionStatus::Pending.as_str(), txn.status));
        }
        let gateway = self.gateways.get(&txn.provider)?;
        tracing::info!(transaction_id = %id, "retrying provider intent");
        self.submit_intent(&*gateway, txn, serde_json::Value::Null)
            .await
    }

    async fn submit_intent(
        &self,
        gateway: &dyn GatewayAdapter,
        txn: Transaction,
        extra: serde_json::Value,
    ) -> Result<Transaction, EngineError> {
        let request = IntentRequest {
            transaction_id: txn.id,
            amount: txn.amount,
            currency: txn.currency,
            extra,
        };

        let created = match self.call_gateway(gateway.create_intent(request)).await {
            Ok(created) => created,
            Err(err) => return Err(self.gateway_failed(&txn, err).await),
        };

        let change = StatusChange::new(TransactionStatus::Pending, TransactionStatus::Processing)
            .with_provider_txn_id(created.provider_txn_id.clone())
            .with_payload(created.provider_payload);
        if let Some(updated) = self.try_transition(txn.id, &change).await? {
            return Ok(updated);
        }

        // Lost the race: a webhook already moved the transaction on.
        let current = self.get_transaction(txn.id).await?;
        if !matches!(
            current.status,
            TransactionStatus::Processing
                | TransactionStatus::Completed
                | TransactionStatus::PartiallyRefunded
                | TransactionStatus::Refunded
        ) {
            return Err(EngineError::state(
                txn.id,
                TransactionStatus::Pending.as_str(),
                current.status,
            ));
        }
        if current.provider_txn_id.is_some() {
            return Ok(current);
        }

        // Attach the provider id without changing the status.
        let attach = StatusChange::new(current.status, current.status)
            .with_provider_txn_id(created.provider_txn_id);
        tracing::debug!(
            transaction_id = %txn.id,
            status = %current.status,
            "webhook advanced transaction first, attaching provider id"
        );
        Ok(self.store.transition(txn.id, &attach).await?.unwrap_or(current))
    }

    /// `processing -> completed` on provider success, `-> failed` otherwise.
    #[tracing::instrument(name = "confirm", skip(self, confirmation))]
    pub async fn confirm(
        &self,
        transaction_id: Uuid,
        confirmation: serde_json::Value,
    ) -> Result<Transaction, EngineError> {
        let txn = self.get_transaction(transaction_id).await?;
        if txn.status != TransactionStatus::Processing {
            return Err(EngineError::state(
                transaction_id,
                TransactionStatus::Processing.as_str(),
                txn.status,
            ));
        }
        let provider_txn_id = txn.provider_txn_id.clone().ok_or_else(|| {
            EngineError::Validation(format!(
                "transaction {transaction_id} has no provider transaction id"
            ))
        })?;
        let gateway = self.gateways.get(&txn.provider)?;

        let confirmed = match self
            .call_gateway(gateway.confirm(&provider_txn_id, confirmation))
            .await
        {
            Ok(confirmed) => confirmed,
            Err(err) => return Err(self.gateway_failed(&txn, err).await),
        };

        let change = StatusChange::new(TransactionStatus::Processing, TransactionStatus::Completed)
            .with_payload(confirmed.provider_payload)
            .completed_now();
        self.transition(transaction_id, &change).await
    }

    /// `pending -> cancelled`.
    pub async fn cancel(&self, transaction_id: Uuid) -> Result<Transaction, EngineError> {
        let change = StatusChange::new(TransactionStatus::Pending, TransactionStatus::Cancelled);
        self.transition(transaction_id, &change).await
    }

    /// Moves a transaction to `failed` after a provider error. Timeouts and
    /// in-progress answers leave it where it was; a webhook decides later.
    async fn gateway_failed(&self, txn: &Transaction, err: GatewayError) -> EngineError {
        if err.is_unsettled() {
            tracing::warn!(
                transaction_id = %txn.id,
                status = %txn.status,
                error = %err,
                "gateway outcome not final, leaving transaction in last known state"
            );
            return err.into();
        }

        tracing::warn!(transaction_id = %txn.id, from = %txn.status, error = %err, "gateway call failed");
        let change = StatusChange::new(txn.status, TransactionStatus::Failed);
        match self.try_transition(txn.id, &change).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(transaction_id = %txn.id, "transaction changed concurrently, not marking failed")
            }
            Err(e) => return e,
        }
        err.into()
    }

    /// The single entry point for status changes. A lost race surfaces as
    /// a `StateError` carrying the status the row actually has.
    pub async fn transition(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Transaction, EngineError> {
        if let Some(updated) = self.try_transition(id, change).await? {
            return Ok(updated);
        }
        let current = self.get_transaction(id).await?;
        tracing::debug!(
            transaction_id = %id,
            expected = %change.expected,
            actual = %current.status,
            "conditional transition lost"
        );
        Err(EngineError::state(id, change.expected.as_str(), current.status))
    }

    /// `Ok(None)` when the row was no longer in `change.expected`.
    async fn try_transition(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Option<Transaction>, EngineError> {
        if !change.expected.can_transition_to(&change.to) {
            let current = self.get_transaction(id).await?;
            return Err(EngineError::state(
                id,
                format!("a status that can move to {}", change.to),
                current.status,
            ));
        }

        let updated = self.store.transition(id, change).await?;
        if updated.is_some() {
            tracing::info!(transaction_id = %id, from = %change.expected, to = %change.to, "transaction transitioned");
        }
        Ok(updated)
    }

    /// Finds the transaction a webhook refers to, by provider id first.
    pub async fn resolve_transaction(
        &self,
        provider: &ProviderKey,
        reference: &TransactionRef,
    ) -> Result<Transaction, EngineError> {
        if let Some(provider_txn_id) = &reference.provider_txn_id
            && let Some(txn) = self
                .store
                .find_transaction_by_provider_txn_id(provider, provider_txn_id)
                .await?
        {
            return Ok(txn);
        }

        if let Some(id) = reference.transaction_id
            && let Some(txn) = self.store.get_transaction(id).await?
            && &txn.provider == provider
        {
            return Ok(txn);
        }

        Err(EngineError::NotFound(format!(
            "transaction for provider {provider} (provider id {:?}, id {:?})",
            reference.provider_txn_id, reference.transaction_id
        )))
    }

    /// Drives a transaction toward the status a verified provider event
    /// reports, through the same conditional transitions as the
    /// synchronous path.
    pub async fn apply_provider_status(
        &self,
        id: Uuid,
        target: TransactionStatus,
    ) -> Result<WebhookResult, EngineError> {
        let mut current = self.get_transaction(id).await?;
        let from = current.status;

        for _ in 0..MAX_WEBHOOK_STEPS {
            match webhook_step(current.status, target) {
                Step::Done if current.status == from => {
                    return Ok(WebhookResult::Unchanged {
                        transaction_id: id,
                        status: from,
                    });
                }
                Step::Done => {
                    return Ok(WebhookResult::Applied {
                        transaction_id: id,
                        from,
                        to: current.status,
                    });
                }
                Step::Reject => {
                    return Err(EngineError::state(
                        id,
                        format!("a status that can reach {target}"),
                        current.status,
                    ));
                }
                Step::Move(to) => {
                    let mut change = StatusChange::new(current.status, to);
                    if to == TransactionStatus::Completed {
                        change = change.completed_now();
                    }
                    current = match self.try_transition(id, &change).await? {
                        Some(updated) => updated,
                        None => self.get_transaction(id).await?,
                    };
                }
            }
        }

        Err(EngineError::state(
            id,
            format!("a stable status to reach {target}"),
            current.status,
        ))
    }

    /// Inserts the pending refund and reserves its amount. When refused,
    /// explains why from the row's current state.
    pub async fn reserve_refund(&self, refund: &Refund) -> Result<Transaction, EngineError> {
        if let Some(txn) = self.store.reserve_refund(refund).await? {
            tracing::info!(
                transaction_id = %txn.id,
                refund_id = %refund.id,
                amount = %refund.amount,
                reserved = %txn.refund_reserved,
                "refund reserved"
            );
            return Ok(txn);
        }

        let current = self.get_transaction(refund.transaction_id).await?;
        if !current.status.accepts_refunds() {
            return Err(EngineError::state(
                current.id,
                "completed or partially_refunded",
                current.status,
            ));
        }
        Err(EngineError::Validation(format!(
            "refund of {} exceeds remaining refundable balance {}",
            refund.amount,
            current.refundable()
        )))
    }

    /// `None` when the refund was already settled by another path.
    pub async fn settle_refund(
        &self,
        refund_id: Uuid,
        settlement: &RefundSettlement,
    ) -> Result<Option<(Refund, Transaction)>, EngineError> {
        let settled = self.store.complete_refund(refund_id, settlement).await?;
        if let Some((refund, txn)) = &settled {
            tracing::info!(
                transaction_id = %txn.id,
                refund_id = %refund.id,
                refunded = %txn.refunded_amount,
                to = %txn.status,
                "refund completed"
            );
        }
        Ok(settled)
    }

    pub async fn release_refund(
        &self,
        refund_id: Uuid,
        settlement: &RefundSettlement,
    ) -> Result<Option<Refund>, EngineError> {
        let failed = self.store.fail_refund(refund_id, settlement).await?;
        if let Some(refund) = &failed {
            tracing::warn!(
                transaction_id = %refund.transaction_id,
                refund_id = %refund.id,
                reason = refund.failure_reason.as_deref().unwrap_or(""),
                "refund failed, reservation released"
            );
        }
        Ok(failed)
    }

    pub async fn get_transaction_history(
        &self,
        user_id: Option<String>,
        order_id: Option<String>,
        limit: i64,
    ) -> Result<Vec<Transaction>, EngineError> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(EngineError::Validation(format!(
                "limit must be between 1 and {MAX_HISTORY_LIMIT}, got {limit}"
            )));
        }
        self.store
            .list_transactions(&HistoryFilter {
                user_id,
                order_id,
                limit,
            })
            .await
    }

    pub async fn get_stats(&self, window_days: i64) -> Result<Stats, EngineError> {
        if !(1..=MAX_STATS_WINDOW_DAYS).contains(&window_days) {
            return Err(EngineError::Validation(format!(
                "window_days must be between 1 and {MAX_STATS_WINDOW_DAYS}, got {window_days}"
            )));
        }
        let since = Utc::now() - chrono::Duration::days(window_days);
        let rows = self.store.stats_rows(since).await?;
        Ok(stats::fold(window_days, since, rows))
    }
}
