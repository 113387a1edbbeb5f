//! In-process provider for sandbox payment methods and tests.
//!
//! Provider ids are derived from the engine's idempotency keys, so a
//! retried `create_intent` for the same transaction returns the same
//! intent. Webhooks are JSON signed with a hex HMAC-SHA256 in
//! `X-Sandbox-Signature`:
//!
//! ```json
//! {"id": "evt_1", "type": "payment.succeeded",
//!  "data": {"payment_id": "sbx_pi_...", "transaction_id": "..."}}
//! ```

use {
    super::signature,
    crate::domain::{
        dispute::{DisputeSnapshot, DisputeStatus},
        error::{EngineError, GatewayError},
        gateway::{
            ConfirmedIntent, CreatedIntent, CreatedRefund, GatewayAdapter, IntentRequest,
            RefundRequest,
        },
        id::{EventId, ProviderKey},
        money::MoneyAmount,
        webhook::{NormalizedEvent, TransactionRef, WebhookOutcome},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde::Deserialize,
    std::{
        collections::VecDeque,
        sync::{Mutex, MutexGuard},
        time::Duration,
    },
    uuid::Uuid,
};

pub const SIGNATURE_HEADER: &str = "X-Sandbox-Signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxOp {
    CreateIntent,
    Confirm,
    Refund,
}

pub struct SandboxGateway {
    key: ProviderKey,
    webhook_secret: String,
    latency: Option<Duration>,
    scripted: Mutex<VecDeque<(SandboxOp, GatewayError)>>,
}

impl SandboxGateway {
    pub fn new(key: ProviderKey, webhook_secret: impl Into<String>) -> Self {
        Self {
            key,
            webhook_secret: webhook_secret.into(),
            latency: None,
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    /// Delay every provider call, to widen race windows.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The next call of `op` fails with `error`.
    pub fn fail_next(&self, op: SandboxOp, error: GatewayError) {
        self.scripted().push_back((op, error));
    }

    /// Signature the sandbox would send for `payload`.
    pub fn sign(&self, payload: &[u8]) -> String {
        signature::hmac_sha256_hex(self.webhook_secret.as_bytes(), payload).unwrap_or_default()
    }

    pub fn intent_id(transaction_id: Uuid) -> String {
        format!("sbx_pi_{}", transaction_id.simple())
    }

    pub fn refund_id(refund_id: Uuid) -> String {
        format!("sbx_re_{}", refund_id.simple())
    }

    /// Inverse of [`Self::refund_id`].
    pub fn engine_refund_id(provider_refund_id: &str) -> Option<Uuid> {
        provider_refund_id
            .strip_prefix("sbx_re_")
            .and_then(|simple| Uuid::parse_str(simple).ok())
    }

    fn scripted(&self) -> MutexGuard<'_, VecDeque<(SandboxOp, GatewayError)>> {
        self.scripted.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn call(&self, op: SandboxOp, data: &serde_json::Value) -> Result<(), GatewayError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = {
            let mut queue = self.scripted();
            queue
                .iter()
                .position(|(o, _)| *o == op)
                .and_then(|idx| queue.remove(idx))
        };
        if let Some((_, err)) = scripted {
            return Err(err);
        }

        // Like provider test cards: the caller's data can ask for a failure.
        match data.get("simulate").and_then(|v| v.as_str()) {
            Some("decline") => Err(GatewayError::declined("sandbox: card declined")),
            Some("unavailable") => Err(GatewayError::unavailable("sandbox: provider unavailable")),
            Some("in_progress") => Err(GatewayError::in_progress("sandbox: capture pending")),
            _ => Ok(()),
        }
    }
}

fn to_payload(value: serde_json::Value) -> Result<Vec<u8>, GatewayError> {
    serde_json::to_vec(&value).map_err(|e| GatewayError::invalid_response(e.to_string()))
}

#[async_trait]
impl GatewayAdapter for SandboxGateway {
    fn provider(&self) -> &ProviderKey {
        &self.key
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    async fn create_intent(&self, request: IntentRequest) -> Result<CreatedIntent, GatewayError> {
        self.call(SandboxOp::CreateIntent, &request.extra).await?;
        let provider_txn_id = Self::intent_id(request.transaction_id);
        let provider_payload = to_payload(serde_json::json!({
            "id": provider_txn_id,
            "object": "payment_intent",
            "amount": request.amount.minor_units(),
            "currency": request.currency.as_str(),
            "status": "requires_confirmation",
            "metadata": { "transaction_id": request.transaction_id },
        }))?;
        Ok(CreatedIntent {
            provider_txn_id,
            provider_payload,
        })
    }

    async fn confirm(
        &self,
        provider_txn_id: &str,
        confirmation: serde_json::Value,
    ) -> Result<ConfirmedIntent, GatewayError> {
        self.call(SandboxOp::Confirm, &confirmation).await?;
        let provider_payload = to_payload(serde_json::json!({
            "id": provider_txn_id,
            "object": "payment_intent",
            "status": "succeeded",
        }))?;
        Ok(ConfirmedIntent { provider_payload })
    }

    async fn refund(&self, request: RefundRequest) -> Result<CreatedRefund, GatewayError> {
        self.call(SandboxOp::Refund, &serde_json::Value::Null).await?;
        let provider_refund_id = Self::refund_id(request.refund_id);
        let provider_payload = to_payload(serde_json::json!({
            "id": provider_refund_id,
            "object": "refund",
            "payment_id": request.provider_txn_id,
            "amount": request.amount.minor_units(),
            "currency": request.currency.as_str(),
            "reason": request.reason,
            "status": "succeeded",
        }))?;
        Ok(CreatedRefund {
            provider_refund_id,
            provider_payload,
        })
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        signature::verify_hex(self.webhook_secret.as_bytes(), payload, signature)
    }

    fn process_webhook(&self, payload: &[u8]) -> Result<NormalizedEvent, EngineError> {
        let event: SandboxEvent = serde_json::from_slice(payload)
            .map_err(|e| EngineError::Validation(format!("malformed sandbox event: {e}")))?;
        let data = event.data;

        let transaction_ref = TransactionRef {
            provider_txn_id: data.payment_id.clone(),
            transaction_id: data.transaction_id,
        };

        let outcome = match event.event_type.as_str() {
            "payment.processing" => WebhookOutcome::PaymentProcessing,
            "payment.succeeded" => WebhookOutcome::PaymentSucceeded,
            "payment.failed" => WebhookOutcome::PaymentFailed {
                reason: data.reason.clone(),
            },
            "payment.canceled" => WebhookOutcome::PaymentCanceled,
            "refund.succeeded" | "refund.failed" => {
                let provider_refund_id = data.refund_id.clone().ok_or_else(|| {
                    EngineError::Validation(format!("{} without refund_id", event.event_type))
                })?;
                let refund_id = Self::engine_refund_id(&provider_refund_id);
                if event.event_type == "refund.succeeded" {
                    WebhookOutcome::RefundSucceeded {
                        provider_refund_id,
                        refund_id,
                    }
                } else {
                    WebhookOutcome::RefundFailed {
                        provider_refund_id,
                        refund_id,
                        reason: data.reason.clone(),
                    }
                }
            }
            "dispute.created" | "dispute.updated" | "dispute.closed" => {
                let dispute = data.dispute.ok_or_else(|| {
                    EngineError::Validation(format!("{} without dispute", event.event_type))
                })?;
                WebhookOutcome::Dispute(DisputeSnapshot {
                    provider_dispute_id: dispute.id,
                    amount: MoneyAmount::new(dispute.amount)?,
                    reason: dispute.reason,
                    status: DisputeStatus::try_from(dispute.status.as_str())?,
                    evidence_due_by: dispute.evidence_due_by,
                })
            }
            _ => WebhookOutcome::Ignored,
        };

        Ok(NormalizedEvent {
            event_id: EventId::new(event.id)?,
            event_type: event.event_type,
            transaction_ref,
            outcome,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SandboxEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: SandboxEventData,
}

#[derive(Debug, Default, Deserialize)]
struct SandboxEventData {
    payment_id: Option<String>,
    transaction_id: Option<Uuid>,
    refund_id: Option<String>,
    reason: Option<String>,
    dispute: Option<SandboxDispute>,
}

#[derive(Debug, Deserialize)]
struct SandboxDispute {
    id: String,
    amount: i64,
    #[serde(default)]
    reason: String,
    status: String,
    evidence_due_by: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> SandboxGateway {
        SandboxGateway::new(ProviderKey::new("sandbox").unwrap(), "whsec_test")
    }

    #[test]
    fn translates_payment_succeeded() {
        let payload = br#"{"id":"evt_1","type":"payment.succeeded","data":{"payment_id":"sbx_pi_1"}}"#;
        let event = gateway().process_webhook(payload).unwrap();
        assert_eq!(event.event_id.as_str(), "evt_1");
        assert_eq!(event.outcome, WebhookOutcome::PaymentSucceeded);
        assert_eq!(event.transaction_ref.provider_txn_id.as_deref(), Some("sbx_pi_1"));
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        let payload = br#"{"id":"evt_2","type":"customer.created"}"#;
        let event = gateway().process_webhook(payload).unwrap();
        assert_eq!(event.outcome, WebhookOutcome::Ignored);
        assert!(event.transaction_ref.is_empty());
    }

    #[test]
    fn garbage_payload_is_an_error() {
        assert!(gateway().process_webhook(b"not json").is_err());
    }

    #[test]
    fn signs_and_verifies() {
        let gw = gateway();
        let sig = gw.sign(b"payload");
        assert!(gw.verify_signature(b"payload", &sig));
        assert!(!gw.verify_signature(b"payload2", &sig));
        assert!(!gw.verify_signature(b"payload", "not-hex"));
    }

    #[test]
    fn refund_events_carry_the_engine_refund_id() {
        let id = Uuid::now_v7();
        let payload = serde_json::json!({
            "id": "evt_re",
            "type": "refund.succeeded",
            "data": {"payment_id": "sbx_pi_1", "refund_id": SandboxGateway::refund_id(id)},
        });
        let event = gateway()
            .process_webhook(payload.to_string().as_bytes())
            .unwrap();
        assert_eq!(
            event.outcome,
            WebhookOutcome::RefundSucceeded {
                provider_refund_id: SandboxGateway::refund_id(id),
                refund_id: Some(id),
            }
        );
        assert_eq!(SandboxGateway::engine_refund_id("re_dashboard"), None);
    }

    #[tokio::test]
    async fn create_intent_is_idempotent_per_transaction() {
        let gw = gateway();
        let request = IntentRequest {
            transaction_id: Uuid::now_v7(),
            amount: MoneyAmount::new(500).unwrap(),
            currency: crate::domain::money::Currency::Usd,
            extra: serde_json::Value::Null,
        };
        let a = gw.create_intent(request.clone()).await.unwrap();
        let b = gw.create_intent(request).await.unwrap();
        assert_eq!(a.provider_txn_id, b.provider_txn_id);
    }
}
