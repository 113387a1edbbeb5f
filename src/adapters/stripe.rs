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
        money::{Currency, MoneyAmount},
        webhook::{NormalizedEvent, TransactionRef, WebhookOutcome},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde::Deserialize,
    std::collections::HashMap,
    uuid::Uuid,
};

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Stripe's default replay window for webhook signatures.
const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub struct StripeGateway {
    key: ProviderKey,
    client: stripe::Client,
    webhook_secret: String,
    tolerance_secs: i64,
}

impl StripeGateway {
    pub fn new(secret_key: &str, webhook_secret: impl Into<String>) -> Result<Self, EngineError> {
        Ok(Self {
            key: ProviderKey::new("stripe")?,
            client: stripe::Client::new(secret_key),
            webhook_secret: webhook_secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        })
    }

    /// Builds a `Stripe-Signature` header value for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let message = signed_message(&timestamp.to_string(), payload);
        let sig = signature::hmac_sha256_hex(self.webhook_secret.as_bytes(), &message)
            .unwrap_or_default();
        format!("t={timestamp},v1={sig}")
    }

    fn idempotent_client(&self, key: String) -> stripe::Client {
        self.client
            .clone()
            .with_strategy(stripe::RequestStrategy::Idempotent(key))
    }
}

fn signed_message(raw_timestamp: &str, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(raw_timestamp.len() + 1 + payload.len());
    message.extend_from_slice(raw_timestamp.as_bytes());
    message.push(b'.');
    message.extend_from_slice(payload);
    message
}

fn to_stripe_currency(currency: Currency) -> stripe::Currency {
    match currency {
        Currency::Usd => stripe::Currency::USD,
        Currency::Eur => stripe::Currency::EUR,
        Currency::Gbp => stripe::Currency::GBP,
        Currency::Jpy => stripe::Currency::JPY,
    }
}

fn map_stripe_error(err: stripe::StripeError) -> GatewayError {
    match err {
        stripe::StripeError::Stripe(req) => {
            let message = req
                .message
                .unwrap_or_else(|| format!("http {}", req.http_status));
            classify_http_status(req.http_status, message)
        }
        stripe::StripeError::Timeout => GatewayError::timeout("stripe client timeout"),
        other => GatewayError::unavailable(other.to_string()),
    }
}

/// 409 (idempotent request still in flight) and 429 (rate limit) are
/// transient; other 4xx answers are refusals.
fn classify_http_status(http_status: u16, message: String) -> GatewayError {
    match http_status {
        409 | 429 => GatewayError::unavailable(message),
        400..=499 => GatewayError::declined(message),
        _ => GatewayError::unavailable(message),
    }
}

/// Async methods and manual capture report success later by webhook.
fn check_confirmed_status(
    provider_txn_id: &str,
    status: stripe::PaymentIntentStatus,
) -> Result<(), GatewayError> {
    use stripe::PaymentIntentStatus::*;
    match status {
        Succeeded => Ok(()),
        Processing | RequiresCapture | RequiresAction => Err(GatewayError::in_progress(format!(
            "payment intent {provider_txn_id} is {status:?} after confirmation"
        ))),
        other => Err(GatewayError::declined(format!(
            "payment intent {provider_txn_id} is {other:?} after confirmation"
        ))),
    }
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, GatewayError> {
    serde_json::to_vec(value).map_err(|e| GatewayError::invalid_response(e.to_string()))
}

#[async_trait]
impl GatewayAdapter for StripeGateway {
    fn provider(&self) -> &ProviderKey {
        &self.key
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    async fn create_intent(&self, request: IntentRequest) -> Result<CreatedIntent, GatewayError> {
        let mut params = stripe::CreatePaymentIntent::new(
            request.amount.minor_units(),
            to_stripe_currency(request.currency),
        );
        params.metadata = Some(HashMap::from([(
            "transaction_id".to_string(),
            request.transaction_id.to_string(),
        )]));
        if let Some(pm) = request.extra.get("payment_method").and_then(|v| v.as_str()) {
            let pm = pm
                .parse::<stripe::PaymentMethodId>()
                .map_err(|e| GatewayError::declined(format!("invalid payment method: {e}")))?;
            params.payment_method = Some(pm);
        }

        let client = self.idempotent_client(format!("intent-{}", request.transaction_id));
        let intent = stripe::PaymentIntent::create(&client, params)
            .await
            .map_err(map_stripe_error)?;

        Ok(CreatedIntent {
            provider_txn_id: intent.id.to_string(),
            provider_payload: to_payload(&intent)?,
        })
    }

    async fn confirm(
        &self,
        provider_txn_id: &str,
        _confirmation: serde_json::Value,
    ) -> Result<ConfirmedIntent, GatewayError> {
        let client = self.idempotent_client(format!("confirm-{provider_txn_id}"));
        let intent = stripe::PaymentIntent::confirm(
            &client,
            provider_txn_id,
            stripe::PaymentIntentConfirmParams::default(),
        )
        .await
        .map_err(map_stripe_error)?;

        check_confirmed_status(provider_txn_id, intent.status)?;
        Ok(ConfirmedIntent {
            provider_payload: to_payload(&intent)?,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<CreatedRefund, GatewayError> {
        let intent_id = request
            .provider_txn_id
            .parse::<stripe::PaymentIntentId>()
            .map_err(|e| GatewayError::declined(format!("invalid PaymentIntent id: {e}")))?;

        let mut params = stripe::CreateRefund::new();
        params.payment_intent = Some(intent_id);
        params.amount = Some(request.amount.minor_units());
        params.metadata = Some(HashMap::from([
            ("transaction_id".to_string(), request.transaction_id.to_string()),
            ("refund_id".to_string(), request.refund_id.to_string()),
            ("reason".to_string(), request.reason.clone()),
        ]));

        let client = self.idempotent_client(format!("refund-{}", request.refund_id));
        let refund = stripe::Refund::create(&client, params)
            .await
            .map_err(map_stripe_error)?;

        if matches!(refund.status.as_deref(), Some("failed") | Some("canceled")) {
            return Err(GatewayError::declined(
                refund
                    .failure_reason
                    .clone()
                    .map(|r| format!("{r:?}"))
                    .unwrap_or_else(|| "refund failed".into()),
            ));
        }

        Ok(CreatedRefund {
            provider_refund_id: refund.id.to_string(),
            provider_payload: to_payload(&refund)?,
        })
    }

    fn verify_signature(&self, payload: &[u8], header: &str) -> bool {
        let Some(parsed) = signature::parse_timestamped(header) else {
            return false;
        };
        if (Utc::now().timestamp() - parsed.timestamp).abs() > self.tolerance_secs {
            return false;
        }
        let message = signed_message(parsed.raw_timestamp, payload);
        parsed
            .signatures
            .iter()
            .any(|sig| signature::verify_hex(self.webhook_secret.as_bytes(), &message, sig))
    }

    fn process_webhook(&self, payload: &[u8]) -> Result<NormalizedEvent, EngineError> {
        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| EngineError::Validation(format!("malformed stripe event: {e}")))?;
        let object = event.data.object;

        let outcome = match event.event_type.as_str() {
            "payment_intent.processing" => WebhookOutcome::PaymentProcessing,
            "payment_intent.succeeded" => WebhookOutcome::PaymentSucceeded,
            "payment_intent.payment_failed" => WebhookOutcome::PaymentFailed {
                reason: object.last_payment_error.as_ref().and_then(|e| e.message.clone()),
            },
            "payment_intent.canceled" => WebhookOutcome::PaymentCanceled,
            "refund.created" | "refund.updated" | "charge.refund.updated" => {
                let refund_id = object
                    .metadata
                    .get("refund_id")
                    .and_then(|id| Uuid::parse_str(id).ok());
                match object.status.as_deref() {
                    Some("succeeded") => WebhookOutcome::RefundSucceeded {
                        provider_refund_id: object.id.clone(),
                        refund_id,
                    },
                    Some("failed") | Some("canceled") => WebhookOutcome::RefundFailed {
                        provider_refund_id: object.id.clone(),
                        refund_id,
                        reason: object.failure_reason.clone(),
                    },
                    _ => WebhookOutcome::Ignored,
                }
            }
            t if t.starts_with("charge.dispute.") => {
                let status = object.status.as_deref().unwrap_or_default();
                WebhookOutcome::Dispute(DisputeSnapshot {
                    provider_dispute_id: object.id.clone(),
                    amount: MoneyAmount::new(object.amount.unwrap_or_default())?,
                    reason: object.reason.clone().unwrap_or_default(),
                    status: dispute_status(status)?,
                    evidence_due_by: object
                        .evidence_details
                        .as_ref()
                        .and_then(|d| d.due_by)
                        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
                })
            }
            _ => WebhookOutcome::Ignored,
        };

        // Payment intent events carry their own id; refunds and disputes
        // point at the intent they belong to.
        let provider_txn_id = if event.event_type.starts_with("payment_intent.") {
            Some(object.id.clone())
        } else {
            object.payment_intent.clone()
        };
        let transaction_id = object
            .metadata
            .get("transaction_id")
            .and_then(|id| Uuid::parse_str(id).ok());

        Ok(NormalizedEvent {
            event_id: EventId::new(event.id)?,
            event_type: event.event_type,
            transaction_ref: TransactionRef {
                provider_txn_id,
                transaction_id,
            },
            outcome,
        })
    }
}

fn dispute_status(status: &str) -> Result<DisputeStatus, EngineError> {
    match status {
        "warning_needs_response" | "needs_response" => Ok(DisputeStatus::NeedsResponse),
        "warning_under_review" | "under_review" => Ok(DisputeStatus::UnderReview),
        "warning_closed" | "won" => Ok(DisputeStatus::Won),
        "lost" => Ok(DisputeStatus::Lost),
        "charge_refunded" => Ok(DisputeStatus::Refunded),
        other => Err(EngineError::Validation(format!(
            "unknown stripe dispute status: {other}"
        ))),
    }
}

// Only the fields the engine reads. The typed `stripe::Event` rejects
// payloads from API versions newer than the crate.
#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripeObject,
}

#[derive(Debug, Deserialize)]
struct StripeObject {
    id: String,
    status: Option<String>,
    amount: Option<i64>,
    reason: Option<String>,
    payment_intent: Option<String>,
    failure_reason: Option<String>,
    last_payment_error: Option<StripeLastError>,
    evidence_details: Option<StripeEvidenceDetails>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StripeLastError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeEvidenceDetails {
    due_by: Option<i64>,
}
