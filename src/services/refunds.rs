use {
    super::orchestrator::Orchestrator,
    crate::domain::{
        dispute::{Dispute, DisputeSnapshot},
        error::EngineError,
        gateway::RefundRequest,
        money::MoneyAmount,
        refund::{Refund, RefundSettlement, RefundStatus},
        transaction::Transaction,
        webhook::WebhookResult,
    },
    uuid::Uuid,
};

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund: Refund,
    pub transaction: Transaction,
}

/// Partial-refund accounting and dispute tracking on top of the
/// orchestrator. Disputes are only written from provider events.
#[derive(Clone)]
pub struct RefundManager {
    orchestrator: Orchestrator,
}

impl RefundManager {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Refunds `amount`, or the whole remaining balance when `None`.
    #[tracing::instrument(name = "refund", skip(self, reason))]
    pub async fn refund(
        &self,
        transaction_id: Uuid,
        amount: Option<MoneyAmount>,
        reason: String,
    ) -> Result<RefundOutcome, EngineError> {
        let txn = self.orchestrator.get_transaction(transaction_id).await?;
        if !txn.status.accepts_refunds() {
            return Err(EngineError::state(
                transaction_id,
                "completed or partially_refunded",
                txn.status,
            ));
        }

        let store = self.orchestrator.store();
        if let Some(open) = store
            .list_disputes(transaction_id)
            .await?
            .into_iter()
            .find(|d| d.status.is_open())
        {
            return Err(EngineError::Validation(format!(
                "transaction has an open dispute {} ({})",
                open.provider_dispute_id, open.status
            )));
        }

        let remaining = txn.refundable();
        let amount = amount.unwrap_or(remaining);
        if amount.is_zero() {
            return Err(EngineError::Validation(if remaining.is_zero() {
                "nothing left to refund".to_string()
            } else {
                "refund amount must be positive".to_string()
            }));
        }
        if amount > remaining {
            return Err(EngineError::Validation(format!(
                "refund of {amount} exceeds remaining refundable balance {remaining}"
            )));
        }
        let provider_txn_id = txn.provider_txn_id.clone().ok_or_else(|| {
            EngineError::Validation(format!(
                "transaction {transaction_id} has no provider transaction id"
            ))
        })?;
        let gateway = self.orchestrator.gateways().get(&txn.provider)?;

        let refund = Refund::pending(transaction_id, amount, reason);
        self.orchestrator.reserve_refund(&refund).await?;

        let request = RefundRequest {
            refund_id: refund.id,
            transaction_id,
            provider_txn_id,
            amount,
            currency: txn.currency,
            reason: refund.reason.clone(),
        };
        let created = match self.orchestrator.call_gateway(gateway.refund(request)).await {
            Ok(created) => created,
            Err(err) if err.is_unsettled() => {
                tracing::warn!(refund_id = %refund.id, error = %err, "refund outcome unknown, left pending");
                return Err(err.into());
            }
            Err(err) => {
                let settlement = RefundSettlement {
                    failure_reason: Some(err.to_string()),
                    ..Default::default()
                };
                self.orchestrator
                    .release_refund(refund.id, &settlement)
                    .await?;
                return Err(err.into());
            }
        };

        let settlement = RefundSettlement {
            provider_refund_id: Some(created.provider_refund_id),
            provider_payload: Some(created.provider_payload),
            failure_reason: None,
        };
        if let Some((refund, transaction)) = self
            .orchestrator
            .settle_refund(refund.id, &settlement)
            .await?
        {
            return Ok(RefundOutcome {
                refund,
                transaction,
            });
        }

        // Settled by a webhook in the meantime.
        let refund = store
            .get_refund(refund.id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("refund {}", refund.id)))?;
        let transaction = self.orchestrator.get_transaction(transaction_id).await?;
        Ok(RefundOutcome {
            refund,
            transaction,
        })
    }

    /// Settles a pending refund reported by a provider event. The refund is
    /// found by provider id, or by the engine id the provider echoed back
    /// when the synchronous call never returned one. Refunds the engine
    /// never issued are ignored.
    pub async fn apply_refund_event(
        &self,
        txn: &Transaction,
        provider_refund_id: &str,
        refund_id: Option<Uuid>,
        succeeded: bool,
        failure_reason: Option<String>,
    ) -> Result<WebhookResult, EngineError> {
        let store = self.orchestrator.store();
        let mut refund = store
            .find_refund_by_provider_id(txn.id, provider_refund_id)
            .await?;
        if refund.is_none() {
            if let Some(id) = refund_id {
                refund = store
                    .get_refund(id)
                    .await?
                    .filter(|r| r.transaction_id == txn.id);
            }
        }
        let Some(refund) = refund else {
            return Ok(WebhookResult::Ignored {
                reason: format!("refund {provider_refund_id} not issued by this engine"),
            });
        };

        if refund.status == RefundStatus::Pending {
            let settlement = RefundSettlement {
                provider_refund_id: Some(provider_refund_id.to_string()),
                provider_payload: None,
                failure_reason,
            };
            let applied = if succeeded {
                self.orchestrator
                    .settle_refund(refund.id, &settlement)
                    .await?
                    .map(|(r, _)| r)
            } else {
                self.orchestrator.release_refund(refund.id, &settlement).await?
            };
            if let Some(applied) = applied {
                return Ok(WebhookResult::RefundSettled {
                    transaction_id: txn.id,
                    refund_id: applied.id,
                    status: applied.status,
                });
            }
        }

        let current = store
            .get_refund(refund.id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("refund {}", refund.id)))?;
        Ok(WebhookResult::RefundSettled {
            transaction_id: txn.id,
            refund_id: current.id,
            status: current.status,
        })
    }

    pub async fn record_dispute(
        &self,
        txn: &Transaction,
        snapshot: &DisputeSnapshot,
    ) -> Result<WebhookResult, EngineError> {
        if !txn.status.is_settled() {
            return Err(EngineError::state(
                txn.id,
                "a captured status for a dispute",
                txn.status,
            ));
        }
        let dispute = self
            .orchestrator
            .store()
            .upsert_dispute(txn.id, snapshot)
            .await?;
        tracing::info!(
            transaction_id = %txn.id,
            dispute_id = %dispute.id,
            status = %dispute.status,
            "dispute recorded"
        );
        Ok(WebhookResult::DisputeRecorded {
            transaction_id: txn.id,
            dispute_id: dispute.id,
            status: dispute.status,
        })
    }

    pub async fn list_refunds(&self, transaction_id: Uuid) -> Result<Vec<Refund>, EngineError> {
        self.orchestrator.store().list_refunds(transaction_id).await
    }

    pub async fn list_disputes(&self, transaction_id: Uuid) -> Result<Vec<Dispute>, EngineError> {
        self.orchestrator.store().list_disputes(transaction_id).await
    }
}
