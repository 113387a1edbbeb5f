mod common;

use common::*;
use paycore::adapters::sandbox::{SandboxGateway, SandboxOp};
use paycore::domain::error::{EngineError, GatewayError, GatewayErrorKind};
use paycore::domain::money::Currency;
use paycore::domain::transaction::TransactionStatus;
use std::time::Duration;

// ── create_intent ───────────────────────────────────────────────────────────

#[tokio::test]
async fn create_intent_computes_fees_and_moves_to_processing() {
    let h = harness();

    let created = h
        .state
        .orchestrator
        .create_intent(intent("order_1", 10_000))
        .await
        .unwrap();

    let txn = created.transaction;
    assert_eq!(created.fees.fee.minor_units(), 320);
    assert_eq!(created.fees.net.minor_units(), 9_680);
    assert_eq!(txn.fee.minor_units(), 320);
    assert_eq!(txn.net_amount.minor_units(), 9_680);
    assert_eq!(txn.status, TransactionStatus::Processing);
    assert_eq!(txn.provider_txn_id, Some(SandboxGateway::intent_id(txn.id)));
    assert_eq!(txn.payload_json()["status"], "requires_confirmation");

    let stored = reload(&h, &txn).await;
    assert_eq!(stored, txn);
}

#[tokio::test]
async fn amount_outside_method_bounds_is_rejected_before_persisting() {
    let h = harness();

    for amount in [99, 1_000_001] {
        let err = h
            .state
            .orchestrator
            .create_intent(intent("order_bounds", amount))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "{amount}: {err:?}");
    }

    let history = h
        .state
        .orchestrator
        .get_transaction_history(None, Some("order_bounds".into()), 10)
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn disabled_unknown_and_unsupported_methods_are_rejected() {
    let h = harness();

    let mut disabled = intent("order_m", 1_000);
    disabled.method_id = DISABLED.into();
    let mut unknown = intent("order_m", 1_000);
    unknown.method_id = "wire".into();
    let mut yen = intent("order_m", 1_000);
    yen.currency = Currency::Jpy;
    let zero = intent("order_m", 0);

    for request in [disabled, unknown, yen, zero] {
        let err = h
            .state
            .orchestrator
            .create_intent(request)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "{err:?}");
    }
}

#[tokio::test]
async fn declined_intent_marks_transaction_failed() {
    let h = harness();

    let mut request = intent("order_decline", 5_000);
    request.extra = serde_json::json!({ "simulate": "decline" });
    let err = h
        .state
        .orchestrator
        .create_intent(request)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Gateway(GatewayError {
            kind: GatewayErrorKind::Declined,
            ..
        })
    ));

    let history = h
        .state
        .orchestrator
        .get_transaction_history(None, Some("order_decline".into()), 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TransactionStatus::Failed);
    assert!(history[0].provider_txn_id.is_none());
}

#[tokio::test]
async fn gateway_timeout_leaves_transaction_pending_and_retry_resumes_it() {
    let h = harness();
    h.sandbox
        .fail_next(SandboxOp::CreateIntent, GatewayError::timeout("sandbox: no answer"));

    let err = h
        .state
        .orchestrator
        .create_intent(intent("order_timeout", 2_500))
        .await
        .unwrap_err();
    assert!(matches!(&err, EngineError::Gateway(e) if e.is_timeout()));

    let history = h
        .state
        .orchestrator
        .get_transaction_history(None, Some("order_timeout".into()), 10)
        .await
        .unwrap();
    let pending = &history[0];
    assert_eq!(pending.status, TransactionStatus::Pending);

    let retried = h.state.orchestrator.retry_intent(pending.id).await.unwrap();
    assert_eq!(retried.status, TransactionStatus::Processing);
    assert_eq!(retried.provider_txn_id, Some(SandboxGateway::intent_id(pending.id)));
}

#[tokio::test]
async fn slow_provider_hits_the_gateway_timeout() {
    let h = harness_with(
        SandboxGateway::new(sandbox_key(), WEBHOOK_SECRET).with_latency(Duration::from_millis(200)),
        Duration::from_millis(20),
    );

    let err = h
        .state
        .orchestrator
        .create_intent(intent("order_slow", 2_500))
        .await
        .unwrap_err();
    assert!(matches!(&err, EngineError::Gateway(e) if e.is_timeout()));

    let history = h
        .state
        .orchestrator
        .get_transaction_history(None, Some("order_slow".into()), 10)
        .await
        .unwrap();
    assert_eq!(history[0].status, TransactionStatus::Pending);
}

#[tokio::test]
async fn retry_requires_pending() {
    let h = harness();
    let txn = processing_txn(&h, 1_000).await;

    let err = h.state.orchestrator.retry_intent(txn.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::State {
            actual: TransactionStatus::Processing,
            ..
        }
    ));
}

// ── confirm / cancel ────────────────────────────────────────────────────────

#[tokio::test]
async fn confirm_completes_and_stamps_completion_time() {
    let h = harness();
    let txn = processing_txn(&h, 4_200).await;
    assert!(txn.completed_at.is_none());

    let confirmed = h
        .state
        .orchestrator
        .confirm(txn.id, serde_json::json!({ "payment_method": "pm_card_visa" }))
        .await
        .unwrap();

    assert_eq!(confirmed.status, TransactionStatus::Completed);
    assert!(confirmed.completed_at.is_some());
    assert_eq!(confirmed.payload_json()["status"], "succeeded");
}

#[tokio::test]
async fn confirm_on_completed_is_a_state_error_and_changes_nothing() {
    let h = harness();
    let txn = completed_txn(&h, 4_200).await;

    let err = h
        .state
        .orchestrator
        .confirm(txn.id, serde_json::Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::State {
            actual: TransactionStatus::Completed,
            ..
        }
    ));
    assert_eq!(reload(&h, &txn).await, txn);
}

#[tokio::test]
async fn declined_confirmation_fails_the_transaction() {
    let h = harness();
    let txn = processing_txn(&h, 4_200).await;

    let err = h
        .state
        .orchestrator
        .confirm(txn.id, serde_json::json!({ "simulate": "decline" }))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Gateway(_)));
    assert_eq!(reload(&h, &txn).await.status, TransactionStatus::Failed);
}

#[tokio::test]
async fn unfinished_confirmation_stays_processing_until_the_success_event() {
    let h = harness();
    let txn = processing_txn(&h, 4_200).await;

    let err = h
        .state
        .orchestrator
        .confirm(txn.id, serde_json::json!({ "simulate": "in_progress" }))
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        EngineError::Gateway(GatewayError {
            kind: GatewayErrorKind::InProgress,
            ..
        })
    ));
    assert_eq!(reload(&h, &txn).await.status, TransactionStatus::Processing);

    deliver(&h, payment_event("evt_async_capture", "payment.succeeded", &txn))
        .await
        .unwrap();
    let current = reload(&h, &txn).await;
    assert_eq!(current.status, TransactionStatus::Completed);
    assert!(current.completed_at.is_some());
}

#[tokio::test]
async fn cancel_only_applies_to_pending() {
    let h = harness();
    h.sandbox
        .fail_next(SandboxOp::CreateIntent, GatewayError::timeout("sandbox: no answer"));
    h.state
        .orchestrator
        .create_intent(intent("order_cancel", 1_000))
        .await
        .unwrap_err();
    let pending = h
        .state
        .orchestrator
        .get_transaction_history(None, Some("order_cancel".into()), 1)
        .await
        .unwrap()
        .remove(0);

    let cancelled = h.state.orchestrator.cancel(pending.id).await.unwrap();
    assert_eq!(cancelled.status, TransactionStatus::Cancelled);

    let processing = processing_txn(&h, 1_000).await;
    let err = h.state.orchestrator.cancel(processing.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::State {
            actual: TransactionStatus::Processing,
            ..
        }
    ));
    assert_eq!(reload(&h, &processing).await.status, TransactionStatus::Processing);
}

#[tokio::test]
async fn unknown_transaction_is_not_found() {
    let h = harness();
    let err = h
        .state
        .orchestrator
        .get_transaction(uuid::Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

// ── history / stats ─────────────────────────────────────────────────────────

#[tokio::test]
async fn history_filters_by_user_and_order_newest_first() {
    let h = harness();
    let orch = &h.state.orchestrator;

    let first = orch.create_intent(intent("order_a", 1_000)).await.unwrap();
    let second = orch.create_intent(intent("order_b", 2_000)).await.unwrap();
    let mut other = intent("order_c", 3_000);
    other.user_id = Some("user_2".into());
    orch.create_intent(other).await.unwrap();

    let mine = orch
        .get_transaction_history(Some("user_1".into()), None, 50)
        .await
        .unwrap();
    let ids: Vec<_> = mine.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![second.transaction.id, first.transaction.id]);

    let limited = orch
        .get_transaction_history(Some("user_1".into()), None, 1)
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);

    let by_order = orch
        .get_transaction_history(None, Some("order_c".into()), 50)
        .await
        .unwrap();
    assert_eq!(by_order.len(), 1);
    assert_eq!(by_order[0].user_id.as_deref(), Some("user_2"));
}

#[tokio::test]
async fn history_limit_is_bounded() {
    let h = harness();
    for limit in [0, -1, 501] {
        let err = h
            .state
            .orchestrator
            .get_transaction_history(None, None, limit)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "{limit}");
    }
}

#[tokio::test]
async fn stats_group_by_status_and_method() {
    let h = harness();
    completed_txn(&h, 10_000).await;
    processing_txn(&h, 2_000).await;
    let mut declined = intent("order_declined", 5_000);
    declined.extra = serde_json::json!({ "simulate": "decline" });
    h.state
        .orchestrator
        .create_intent(declined)
        .await
        .unwrap_err();

    let stats = h.state.orchestrator.get_stats(30).await.unwrap();
    assert_eq!(stats.window_days, 30);
    assert_eq!(stats.total.count, 3);
    assert_eq!(stats.total.totals[&Currency::Usd].amount, 17_000);

    let completed = &stats.by_status["completed"];
    assert_eq!(completed.count, 1);
    assert_eq!(completed.totals[&Currency::Usd].fee, 320);
    assert_eq!(stats.by_status["failed"].count, 1);
    assert_eq!(stats.by_method[CARD].count, 3);

    for window in [0, 367] {
        assert!(matches!(
            h.state.orchestrator.get_stats(window).await,
            Err(EngineError::Validation(_))
        ));
    }
}

#[tokio::test]
async fn list_methods_filters_by_currency_and_country() {
    let h = harness();
    let methods = h.state.orchestrator.list_methods(None, Currency::Usd, "us");
    let ids: Vec<_> = methods.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec![CARD]);

    assert!(h.state.orchestrator.list_methods(None, Currency::Gbp, "US").is_empty());
    assert!(h.state.orchestrator.list_methods(Some(usd(50)), Currency::Usd, "US").is_empty());
}
