use {
    super::{orchestrator::Orchestrator, refunds::RefundManager},
    crate::domain::{
        error::EngineError,
        gateway::GatewayAdapter,
        id::ProviderKey,
        store::Store,
        transaction::TransactionStatus,
        webhook::{
            EventClaim, NormalizedEvent, WebhookEvent, WebhookOutcome, WebhookReceipt,
            WebhookResult,
        },
    },
    chrono::{DateTime, Utc},
    std::sync::Arc,
    uuid::Uuid,
};

/// Ingests provider callbacks: log, verify, deduplicate, apply.
#[derive(Clone)]
pub struct WebhookProcessor {
    store: Arc<dyn Store>,
    orchestrator: Orchestrator,
    refunds: RefundManager,
}

impl WebhookProcessor {
    pub fn new(orchestrator: Orchestrator, refunds: RefundManager) -> Self {
        Self {
            store: orchestrator.store().clone(),
            orchestrator,
            refunds,
        }
    }

    /// Handles one delivery. Once the raw event is logged and verified the
    /// caller gets a receipt even if processing had to be deferred.
    pub async fn receive(
        &self,
        provider: &ProviderKey,
        payload: Vec<u8>,
        signature: String,
    ) -> Result<WebhookReceipt, EngineError> {
        let gateway = self.orchestrator.gateways().get(provider)?;

        let event = WebhookEvent::received(provider.clone(), payload, signature);
        self.store.insert_webhook_event(&event).await?;
        tracing::debug!(event_row_id = %event.id, provider = %provider, "webhook logged");

        if !gateway.verify_signature(&event.payload, &event.signature) {
            self.store
                .finish_webhook_event(event.id, &WebhookResult::SignatureRejected)
                .await?;
            tracing::warn!(event_row_id = %event.id, provider = %provider, "webhook signature rejected");
            return Err(EngineError::Signature(format!(
                "invalid {} signature",
                gateway.signature_header()
            )));
        }
        self.store.mark_webhook_verified(event.id, true).await?;

        match self.process(&*gateway, event.id, &event.payload).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                tracing::error!(event_row_id = %event.id, error = %e, "webhook processing deferred");
                Ok(WebhookReceipt {
                    event_row_id: event.id,
                    duplicate: false,
                    result: None,
                })
            }
        }
    }

    /// Re-runs verified events that never got a result. Returns how many
    /// were finished.
    pub async fn reprocess(
        &self,
        received_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<usize, EngineError> {
        let pending = self
            .store
            .list_unprocessed_webhook_events(received_before, limit)
            .await?;

        let mut finished = 0;
        for event in pending {
            let gateway = match self.orchestrator.gateways().get(&event.provider) {
                Ok(gateway) => gateway,
                Err(e) => {
                    let result = WebhookResult::Rejected {
                        code: e.code().to_string(),
                        message: e.to_string(),
                    };
                    self.store.finish_webhook_event(event.id, &result).await?;
                    finished += 1;
                    continue;
                }
            };

            match self.process(&*gateway, event.id, &event.payload).await {
                Ok(WebhookReceipt {
                    result: Some(result),
                    ..
                }) => {
                    tracing::info!(event_row_id = %event.id, result = result.label(), "webhook reprocessed");
                    finished += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(event_row_id = %event.id, error = %e, "webhook reprocessing failed");
                }
            }
        }
        Ok(finished)
    }

    async fn process(
        &self,
        gateway: &dyn GatewayAdapter,
        row_id: Uuid,
        payload: &[u8],
    ) -> Result<WebhookReceipt, EngineError> {
        let provider = gateway.provider();

        let normalized = match gateway.process_webhook(payload) {
            Ok(normalized) => normalized,
            Err(e) => {
                tracing::warn!(event_row_id = %row_id, error = %e, "unreadable webhook payload");
                let result = WebhookResult::Rejected {
                    code: e.code().to_string(),
                    message: e.to_string(),
                };
                self.store.finish_webhook_event(row_id, &result).await?;
                return Ok(WebhookReceipt {
                    event_row_id: row_id,
                    duplicate: false,
                    result: Some(result),
                });
            }
        };
        tracing::Span::current()
            .record("event_id", tracing::field::display(&normalized.event_id))
            .record("event_type", tracing::field::display(&normalized.event_type));

        self.store
            .set_webhook_identity(row_id, &normalized.event_id, &normalized.event_type)
            .await?;

        if let EventClaim::HeldBy(owner) = self
            .store
            .claim_webhook_event(provider, &normalized.event_id, row_id)
            .await?
        {
            let cached = self
                .store
                .get_webhook_event(owner)
                .await?
                .filter(|e| e.processed)
                .and_then(|e| e.result);
            if let Some(result) = &cached {
                self.store.finish_webhook_event(row_id, result).await?;
            }
            tracing::info!(
                event_id = %normalized.event_id,
                owner = %owner,
                cached = cached.is_some(),
                "duplicate webhook delivery"
            );
            return Ok(WebhookReceipt {
                event_row_id: row_id,
                duplicate: true,
                result: cached,
            });
        }

        let result = match self.apply(provider, &normalized).await {
            Ok(result) => result,
            Err(e) if e.is_internal() => return Err(e),
            Err(e) => {
                tracing::warn!(event_id = %normalized.event_id, error = %e, "webhook rejected");
                WebhookResult::Rejected {
                    code: e.code().to_string(),
                    message: e.to_string(),
                }
            }
        };

        self.store.finish_webhook_event(row_id, &result).await?;
        tracing::info!(event_id = %normalized.event_id, result = result.label(), "webhook processed");
        Ok(WebhookReceipt {
            event_row_id: row_id,
            duplicate: false,
            result: Some(result),
        })
    }

    async fn apply(
        &self,
        provider: &ProviderKey,
        event: &NormalizedEvent,
    ) -> Result<WebhookResult, EngineError> {
        let target = match &event.outcome {
            WebhookOutcome::Ignored => {
                return Ok(WebhookResult::Ignored {
                    reason: format!("event type {} not handled", event.event_type),
                });
            }
            WebhookOutcome::PaymentProcessing => Some(TransactionStatus::Processing),
            WebhookOutcome::PaymentSucceeded => Some(TransactionStatus::Completed),
            WebhookOutcome::PaymentFailed { .. } => Some(TransactionStatus::Failed),
            WebhookOutcome::PaymentCanceled => Some(TransactionStatus::Cancelled),
            _ => None,
        };

        let txn = self
            .orchestrator
            .resolve_transaction(provider, &event.transaction_ref)
            .await?;

        if let Some(target) = target {
            if let WebhookOutcome::PaymentFailed {
                reason: Some(reason),
            } = &event.outcome
            {
                tracing::info!(transaction_id = %txn.id, reason, "provider reported payment failure");
            }
            return self.orchestrator.apply_provider_status(txn.id, target).await;
        }

        match &event.outcome {
            WebhookOutcome::RefundSucceeded {
                provider_refund_id,
                refund_id,
            } => {
                self.refunds
                    .apply_refund_event(&txn, provider_refund_id, *refund_id, true, None)
                    .await
            }
            WebhookOutcome::RefundFailed {
                provider_refund_id,
                refund_id,
                reason,
            } => {
                self.refunds
                    .apply_refund_event(&txn, provider_refund_id, *refund_id, false, reason.clone())
                    .await
            }
            WebhookOutcome::Dispute(snapshot) => self.refunds.record_dispute(&txn, snapshot).await,
            _ => Ok(WebhookResult::Ignored {
                reason: format!("event type {} not handled", event.event_type),
            }),
        }
    }
}
