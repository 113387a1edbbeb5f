mod common;

use common::*;
use paycore::adapters::sandbox::{SandboxGateway, SandboxOp};
use paycore::domain::error::{EngineError, GatewayError};
use paycore::domain::refund::RefundStatus;
use paycore::domain::transaction::TransactionStatus;
use paycore::domain::webhook::WebhookResult;

fn reason() -> String {
    "requested_by_customer".into()
}

#[tokio::test]
async fn partial_refund_then_excess_is_rejected_with_remaining_balance() {
    let h = harness();
    let txn = completed_txn(&h, 10_000).await;

    let first = h
        .state
        .refunds
        .refund(txn.id, Some(usd(4_000)), reason())
        .await
        .unwrap();
    assert_eq!(first.refund.status, RefundStatus::Completed);
    assert_eq!(
        first.refund.provider_refund_id,
        Some(SandboxGateway::refund_id(first.refund.id))
    );
    assert_eq!(first.transaction.status, TransactionStatus::PartiallyRefunded);
    assert_eq!(first.transaction.refunded_amount.minor_units(), 4_000);

    let err = h
        .state
        .refunds
        .refund(txn.id, Some(usd(7_000)), reason())
        .await
        .unwrap_err();
    match err {
        EngineError::Validation(msg) => assert!(msg.contains("6000"), "{msg}"),
        other => panic!("expected validation error, got {other:?}"),
    }

    let current = reload(&h, &txn).await;
    assert_eq!(current.refunded_amount.minor_units(), 4_000);
    assert_eq!(current.status, TransactionStatus::PartiallyRefunded);
    assert_eq!(h.state.refunds.list_refunds(txn.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn refunds_adding_up_to_the_amount_end_in_refunded() {
    let h = harness();
    let txn = completed_txn(&h, 10_000).await;

    h.state
        .refunds
        .refund(txn.id, Some(usd(4_000)), reason())
        .await
        .unwrap();
    let second = h
        .state
        .refunds
        .refund(txn.id, Some(usd(6_000)), reason())
        .await
        .unwrap();

    assert_eq!(second.transaction.status, TransactionStatus::Refunded);
    assert_eq!(second.transaction.refunded_amount.minor_units(), 10_000);

    let err = h
        .state
        .refunds
        .refund(txn.id, Some(usd(1)), reason())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::State {
            actual: TransactionStatus::Refunded,
            ..
        }
    ));
}

#[tokio::test]
async fn omitted_amount_refunds_the_remaining_balance() {
    let h = harness();
    let txn = completed_txn(&h, 10_000).await;

    h.state
        .refunds
        .refund(txn.id, Some(usd(2_500)), reason())
        .await
        .unwrap();
    let rest = h.state.refunds.refund(txn.id, None, reason()).await.unwrap();

    assert_eq!(rest.refund.amount.minor_units(), 7_500);
    assert_eq!(rest.transaction.status, TransactionStatus::Refunded);
}

#[tokio::test]
async fn zero_amount_is_rejected() {
    let h = harness();
    let txn = completed_txn(&h, 10_000).await;

    let err = h
        .state
        .refunds
        .refund(txn.id, Some(usd(0)), reason())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn refund_requires_a_captured_transaction() {
    let h = harness();
    let txn = processing_txn(&h, 10_000).await;

    let err = h
        .state
        .refunds
        .refund(txn.id, Some(usd(1_000)), reason())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::State {
            actual: TransactionStatus::Processing,
            ..
        }
    ));
    assert!(h.state.refunds.list_refunds(txn.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn provider_failure_fails_the_refund_and_releases_the_reservation() {
    let h = harness();
    let txn = completed_txn(&h, 10_000).await;
    h.sandbox
        .fail_next(SandboxOp::Refund, GatewayError::declined("sandbox: refund refused"));

    let err = h
        .state
        .refunds
        .refund(txn.id, Some(usd(6_000)), reason())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Gateway(_)));

    let refunds = h.state.refunds.list_refunds(txn.id).await.unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].status, RefundStatus::Failed);
    assert!(refunds[0].failure_reason.is_some());

    let current = reload(&h, &txn).await;
    assert_eq!(current.status, TransactionStatus::Completed);
    assert_eq!(current.refunded_amount.minor_units(), 0);
    assert_eq!(current.refund_reserved.minor_units(), 0);

    // The released amount can be refunded again.
    let retry = h
        .state
        .refunds
        .refund(txn.id, Some(usd(10_000)), reason())
        .await
        .unwrap();
    assert_eq!(retry.transaction.status, TransactionStatus::Refunded);
}

#[tokio::test]
async fn timed_out_refund_stays_pending_and_keeps_its_reservation() {
    let h = harness();
    let txn = completed_txn(&h, 10_000).await;
    h.sandbox
        .fail_next(SandboxOp::Refund, GatewayError::timeout("sandbox: no answer"));

    let err = h
        .state
        .refunds
        .refund(txn.id, Some(usd(6_000)), reason())
        .await
        .unwrap_err();
    assert!(matches!(&err, EngineError::Gateway(e) if e.is_timeout()));

    let refunds = h.state.refunds.list_refunds(txn.id).await.unwrap();
    assert_eq!(refunds[0].status, RefundStatus::Pending);

    let current = reload(&h, &txn).await;
    assert_eq!(current.refund_reserved.minor_units(), 6_000);
    assert_eq!(current.refundable().minor_units(), 4_000);

    let err = h
        .state
        .refunds
        .refund(txn.id, Some(usd(5_000)), reason())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn timed_out_refund_is_settled_by_the_provider_event() {
    let h = harness();
    let txn = completed_txn(&h, 10_000).await;
    h.sandbox
        .fail_next(SandboxOp::Refund, GatewayError::timeout("sandbox: no answer"));
    h.state
        .refunds
        .refund(txn.id, Some(usd(4_000)), reason())
        .await
        .unwrap_err();
    let pending = h.state.refunds.list_refunds(txn.id).await.unwrap().remove(0);
    assert!(pending.provider_refund_id.is_none());

    let body = event_body(
        "evt_late_refund",
        "refund.succeeded",
        serde_json::json!({
            "payment_id": txn.provider_txn_id,
            "refund_id": SandboxGateway::refund_id(pending.id),
        }),
    );
    let receipt = deliver(&h, body).await.unwrap();
    assert_eq!(
        receipt.result,
        Some(WebhookResult::RefundSettled {
            transaction_id: txn.id,
            refund_id: pending.id,
            status: RefundStatus::Completed,
        })
    );

    let refund = h.state.refunds.list_refunds(txn.id).await.unwrap().remove(0);
    assert_eq!(refund.status, RefundStatus::Completed);
    assert_eq!(refund.provider_refund_id, Some(SandboxGateway::refund_id(pending.id)));

    let current = reload(&h, &txn).await;
    assert_eq!(current.status, TransactionStatus::PartiallyRefunded);
    assert_eq!(current.refunded_amount.minor_units(), 4_000);
    assert_eq!(current.refund_reserved.minor_units(), 0);
    assert_eq!(current.refundable().minor_units(), 6_000);
}

#[tokio::test]
async fn timed_out_refund_failed_by_the_provider_releases_the_reservation() {
    let h = harness();
    let txn = completed_txn(&h, 10_000).await;
    h.sandbox
        .fail_next(SandboxOp::Refund, GatewayError::timeout("sandbox: no answer"));
    h.state
        .refunds
        .refund(txn.id, Some(usd(4_000)), reason())
        .await
        .unwrap_err();
    let pending = h.state.refunds.list_refunds(txn.id).await.unwrap().remove(0);

    let body = event_body(
        "evt_late_refund_failed",
        "refund.failed",
        serde_json::json!({
            "payment_id": txn.provider_txn_id,
            "refund_id": SandboxGateway::refund_id(pending.id),
            "reason": "insufficient_funds",
        }),
    );
    deliver(&h, body).await.unwrap();

    let refund = h.state.refunds.list_refunds(txn.id).await.unwrap().remove(0);
    assert_eq!(refund.status, RefundStatus::Failed);
    let current = reload(&h, &txn).await;
    assert_eq!(current.status, TransactionStatus::Completed);
    assert_eq!(current.refund_reserved.minor_units(), 0);
    assert_eq!(current.refundable().minor_units(), 10_000);
}

#[tokio::test]
async fn open_dispute_blocks_refunds_until_it_closes() {
    let h = harness();
    let txn = completed_txn(&h, 10_000).await;

    let dispute = |status: &str| {
        serde_json::json!({
            "payment_id": txn.provider_txn_id,
            "dispute": {
                "id": "dp_1",
                "amount": 10_000,
                "reason": "fraudulent",
                "status": status,
            },
        })
    };

    deliver(&h, event_body("evt_dp_open", "dispute.created", dispute("needs_response")))
        .await
        .unwrap();
    let err = h
        .state
        .refunds
        .refund(txn.id, Some(usd(1_000)), reason())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    deliver(&h, event_body("evt_dp_won", "dispute.closed", dispute("won")))
        .await
        .unwrap();
    let disputes = h.state.refunds.list_disputes(txn.id).await.unwrap();
    assert_eq!(disputes.len(), 1);

    let outcome = h
        .state
        .refunds
        .refund(txn.id, Some(usd(1_000)), reason())
        .await
        .unwrap();
    assert_eq!(outcome.transaction.status, TransactionStatus::PartiallyRefunded);
}
