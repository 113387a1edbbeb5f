#![allow(dead_code)]

use paycore::AppState;
use paycore::adapters::Gateways;
use paycore::adapters::sandbox::SandboxGateway;
use paycore::domain::error::EngineError;
use paycore::domain::id::ProviderKey;
use paycore::domain::method::{FeeSchedule, PaymentMethod};
use paycore::domain::money::{Currency, MoneyAmount};
use paycore::domain::transaction::{Transaction, TransactionStatus};
use paycore::domain::webhook::WebhookReceipt;
use paycore::infra::memory::MemoryStore;
use paycore::services::orchestrator::CreateIntent;
use paycore::services::registry::MethodRegistry;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

pub const WEBHOOK_SECRET: &str = "whsec_sandbox_test";
pub const CARD: &str = "card";
pub const DISABLED: &str = "card_disabled";

pub struct Harness {
    pub state: AppState,
    pub store: MemoryStore,
    pub sandbox: Arc<SandboxGateway>,
}

pub fn sandbox_key() -> ProviderKey {
    ProviderKey::new("sandbox").unwrap()
}

pub fn usd(minor_units: i64) -> MoneyAmount {
    MoneyAmount::new(minor_units).unwrap()
}

fn method(id: &str, enabled: bool) -> PaymentMethod {
    PaymentMethod {
        id: id.into(),
        provider: sandbox_key(),
        display_name: format!("Sandbox {id}"),
        enabled,
        sandbox: true,
        currencies: [Currency::Usd, Currency::Eur].into(),
        countries: ["US".to_string(), "DE".to_string()].into(),
        min_amount: usd(100),
        max_amount: usd(1_000_000),
        fees: FeeSchedule::new(dec!(0.029), usd(30)),
    }
}

pub fn registry() -> MethodRegistry {
    MethodRegistry::new([method(CARD, true), method(DISABLED, false)]).unwrap()
}

pub fn harness() -> Harness {
    harness_with(
        SandboxGateway::new(sandbox_key(), WEBHOOK_SECRET),
        Duration::from_secs(5),
    )
}

pub fn harness_with(gateway: SandboxGateway, gateway_timeout: Duration) -> Harness {
    let store = MemoryStore::new();
    let sandbox = Arc::new(gateway);
    let gateways = Gateways::new().with(sandbox.clone());
    let state = AppState::new(
        Arc::new(store.clone()),
        Arc::new(registry()),
        gateways,
        gateway_timeout,
    );
    Harness {
        state,
        store,
        sandbox,
    }
}

pub fn intent(order_id: &str, amount: i64) -> CreateIntent {
    CreateIntent {
        order_id: order_id.into(),
        user_id: Some("user_1".into()),
        method_id: CARD.into(),
        amount: usd(amount),
        currency: Currency::Usd,
        extra: serde_json::Value::Null,
    }
}

/// A transaction already in `processing`.
pub async fn processing_txn(h: &Harness, amount: i64) -> Transaction {
    let created = h
        .state
        .orchestrator
        .create_intent(intent("order_processing", amount))
        .await
        .unwrap();
    assert_eq!(created.transaction.status, TransactionStatus::Processing);
    created.transaction
}

/// A transaction already in `completed`.
pub async fn completed_txn(h: &Harness, amount: i64) -> Transaction {
    let txn = processing_txn(h, amount).await;
    let txn = h
        .state
        .orchestrator
        .confirm(txn.id, serde_json::Value::Null)
        .await
        .unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
    txn
}

pub fn event_body(event_id: &str, event_type: &str, data: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": data,
    }))
    .unwrap()
}

pub fn payment_event(event_id: &str, event_type: &str, txn: &Transaction) -> Vec<u8> {
    event_body(
        event_id,
        event_type,
        serde_json::json!({
            "payment_id": txn.provider_txn_id,
            "transaction_id": txn.id,
        }),
    )
}

/// Delivers a correctly signed sandbox webhook.
pub async fn deliver(h: &Harness, body: Vec<u8>) -> Result<WebhookReceipt, EngineError> {
    let signature = h.sandbox.sign(&body);
    h.state
        .webhooks
        .receive(&sandbox_key(), body, signature)
        .await
}

pub async fn reload(h: &Harness, txn: &Transaction) -> Transaction {
    h.state.orchestrator.get_transaction(txn.id).await.unwrap()
}
