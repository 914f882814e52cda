//! Comprehensive tests for domain_billing

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use core_kernel::{BillId, Currency, LineItemId};
use domain_billing::{
    AddLineItem, BillCommand, BillStatus, BillingConfig, BillingError, BillingService,
    InMemoryLedgerStore, OrchestratorState, RetryPolicy,
};
use test_utils::{
    assert_bill_closed, assert_bill_consistent, assert_failed_precondition,
    assert_invalid_argument, assert_not_found, line_item, line_items_strategy, memory_service,
    service_over, BillBuilder, ConfigFixtures, IdFixtures, MoneyFixtures, SubmitLineItemBuilder,
};

// ============================================================================
// Bill Lifecycle Tests
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_add_two_items_and_close() {
        let (_store, service) = memory_service();
        let bill = service.create_bill("USD", None).await.unwrap();
        assert_eq!(bill.status, BillStatus::Open);
        assert_eq!(bill.total_minor, 0);

        let espresso = MoneyFixtures::usd_1250();
        let croissant = MoneyFixtures::usd_725();
        service
            .submit_add_line_item(bill.id, line_item("Espresso", espresso.amount_minor(), "USD"))
            .await
            .unwrap();
        service
            .submit_add_line_item(bill.id, line_item("Croissant", croissant.amount_minor(), "USD"))
            .await
            .unwrap();

        let snapshot = service.submit_close(bill.id).await.unwrap();
        assert_bill_closed(&snapshot, 1975, 2);
        assert_eq!(snapshot.bill.total().to_decimal().to_string(), "19.75");

        let stored = service.get_bill(bill.id).await.unwrap();
        assert_eq!(stored, snapshot);
    }

    #[tokio::test]
    async fn test_close_empty_bill_then_add_is_rejected() {
        let (_store, service) = memory_service();
        let bill = service.create_bill("USD", None).await.unwrap();

        let snapshot = service.submit_close(bill.id).await.unwrap();
        assert_bill_closed(&snapshot, 0, 0);
        assert_eq!(snapshot.bill.total(), MoneyFixtures::usd_zero());

        let result = service
            .submit_add_line_item(bill.id, line_item("Late", 100, "USD"))
            .await;
        assert_failed_precondition(&result);

        let stored = service.get_bill(bill.id).await.unwrap();
        assert_eq!(stored.bill.total_minor, 0);
        assert!(stored.items.is_empty());
    }

    #[tokio::test]
    async fn test_double_close_fails() {
        let (_store, service) = memory_service();
        let bill = service.create_bill("GEL", None).await.unwrap();

        service.submit_close(bill.id).await.unwrap();
        assert_failed_precondition(&service.submit_close(bill.id).await);
    }

    #[tokio::test]
    async fn test_orchestrator_stops_after_close() {
        let (_store, service) = memory_service();
        let bill = service.create_bill("USD", None).await.unwrap();
        assert!(service.mailbox().is_running(bill.id).await);

        service.submit_close(bill.id).await.unwrap();
        assert!(!service.mailbox().is_running(bill.id).await);
        assert_eq!(service.mailbox().running().await, 0);
    }

    #[tokio::test]
    async fn test_closed_bills_release_mailbox_slots() {
        let (_store, service) = memory_service();
        let mut closed = Vec::new();
        for amount in [100, 200, 300] {
            let bill = service.create_bill("USD", None).await.unwrap();
            service
                .submit_add_line_item(bill.id, line_item("Tea", amount, "USD"))
                .await
                .unwrap();
            service.submit_close(bill.id).await.unwrap();
            closed.push(bill.id);
        }

        let mut slots = usize::MAX;
        for _ in 0..100 {
            slots = service.mailbox().slot_count().await;
            if slots == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(slots, 0);

        // Touching a closed bill again must not leave an entry behind.
        for id in closed {
            assert_failed_precondition(&service.mailbox().close(id).await);
        }
        assert_eq!(service.mailbox().slot_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_with_explicit_id_is_idempotent() {
        let (_store, service) = memory_service();
        let id = IdFixtures::bill_id();

        let first = service.create_bill("USD", Some(id)).await.unwrap();
        let second = service.create_bill("usd", Some(id)).await.unwrap();
        assert_eq!(first, second);

        let mismatch = service.create_bill("GEL", Some(id)).await;
        assert_failed_precondition(&mismatch);
    }

    #[tokio::test]
    async fn test_list_bills_by_status() {
        let (_store, service) = memory_service();
        let open = service.create_bill("USD", None).await.unwrap();
        let closed = service.create_bill("USD", None).await.unwrap();
        service.submit_close(closed.id).await.unwrap();

        let open_bills = service.list_bills(Some(BillStatus::Open)).await.unwrap();
        assert_eq!(open_bills.len(), 1);
        assert_eq!(open_bills[0].id, open.id);

        let closed_bills = service.list_bills(Some(BillStatus::Closed)).await.unwrap();
        assert_eq!(closed_bills.len(), 1);
        assert_eq!(closed_bills[0].id, closed.id);

        assert_eq!(service.list_bills(None).await.unwrap().len(), 2);
    }
}

// ============================================================================
// Validation Tests
// ============================================================================

mod validation_tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_currency_rejected() {
        let (_store, service) = memory_service();
        assert_invalid_argument(&service.create_bill("EUR", None).await);

        let bill = service.create_bill("USD", None).await.unwrap();
        let result = service
            .submit_add_line_item(bill.id, line_item("Coffee", 100, "JPY"))
            .await;
        assert_invalid_argument(&result);
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let (_store, service) = memory_service();
        let bill = service.create_bill("USD", None).await.unwrap();

        for amount in [0, -1, -500] {
            let request = SubmitLineItemBuilder::new().with_amount_minor(amount).build();
            assert_invalid_argument(&service.submit_add_line_item(bill.id, request).await);
        }
        assert_eq!(service.get_bill(bill.id).await.unwrap().bill.total_minor, 0);
    }

    #[tokio::test]
    async fn test_currency_mismatch_rejected() {
        let (_store, service) = memory_service();
        let bill = service.create_bill("GEL", None).await.unwrap();

        let result = service
            .submit_add_line_item(bill.id, line_item("Khachapuri", 1500, "USD"))
            .await;
        assert_failed_precondition(&result);

        service
            .submit_add_line_item(bill.id, line_item("Khachapuri", 1500, "GEL"))
            .await
            .unwrap();
        let snapshot = service.submit_close(bill.id).await.unwrap();
        assert_bill_closed(&snapshot, 1500, 1);
    }

    #[tokio::test]
    async fn test_orchestrator_rejects_foreign_currency() {
        let (store, service) = memory_service();
        let bill = service.create_bill("USD", None).await.unwrap();
        let lari = MoneyFixtures::gel_3000();

        let result = service
            .mailbox()
            .add_line_item(
                bill.id,
                AddLineItem {
                    line_item_id: LineItemId::new_v7(),
                    description: "Khachapuri".to_string(),
                    amount_minor: lari.amount_minor(),
                    currency: lari.currency(),
                },
            )
            .await;

        assert_failed_precondition(&result);
        assert_eq!(store.line_item_count().await, 0);
        assert!(service.mailbox().is_running(bill.id).await);
        assert_eq!(service.get_bill(bill.id).await.unwrap().bill.total_minor, 0);
    }

    #[tokio::test]
    async fn test_unknown_bill_not_found() {
        let (_store, service) = memory_service();
        let missing = BillId::new_v7();

        assert_not_found(&service.get_bill(missing).await);
        assert_not_found(&service.submit_close(missing).await);
        assert_not_found(
            &service
                .submit_add_line_item(missing, line_item("Ghost", 100, "USD"))
                .await,
        );
        assert!(!service.mailbox().is_running(missing).await);
    }
}

// ============================================================================
// Idempotency and Concurrency Tests
// ============================================================================

mod idempotency_tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_line_item_counted_once() {
        let (store, service) = memory_service();
        let bill = service.create_bill("USD", None).await.unwrap();
        let request = SubmitLineItemBuilder::new()
            .with_id(IdFixtures::line_item_id())
            .with_amount_minor(999)
            .build();

        let first = service
            .submit_add_line_item(bill.id, request.clone())
            .await
            .unwrap();
        let second = service.submit_add_line_item(bill.id, request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.id, IdFixtures::line_item_id());
        assert_eq!(store.line_item_count().await, 1);

        let snapshot = service.submit_close(bill.id).await.unwrap();
        assert_bill_closed(&snapshot, 999, 1);
    }

    #[tokio::test]
    async fn test_concurrent_adds_all_counted() {
        let (_store, service) = memory_service();
        let service = Arc::new(service);
        let bill = service.create_bill("USD", None).await.unwrap();

        let mut handles = Vec::new();
        for i in 1..=20i64 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .submit_add_line_item(bill.id, line_item("Round", i * 100, "USD"))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = service.submit_close(bill.id).await.unwrap();
        assert_bill_closed(&snapshot, 21_000, 20);
    }

    #[tokio::test]
    async fn test_commands_apply_in_enqueue_order() {
        let (_store, service) = memory_service();
        let bill = service.create_bill("USD", None).await.unwrap();
        let mailbox = service.mailbox();

        let (add, add_reply) = BillCommand::add_line_item(AddLineItem {
            line_item_id: LineItemId::new_v7(),
            description: "Before close".to_string(),
            amount_minor: 400,
            currency: Currency::USD,
        });
        mailbox.send(bill.id, add).await.unwrap();

        let (close, close_reply) = BillCommand::close();
        mailbox.send(bill.id, close).await.unwrap();

        let (late, late_reply) = BillCommand::add_line_item(AddLineItem {
            line_item_id: LineItemId::new_v7(),
            description: "After close".to_string(),
            amount_minor: 600,
            currency: Currency::USD,
        });
        let late_sent = mailbox.send(bill.id, late).await;

        add_reply.await.unwrap().unwrap();
        let snapshot = close_reply.await.unwrap().unwrap();
        assert_bill_closed(&snapshot, 400, 1);

        match late_sent {
            Ok(()) => assert_failed_precondition(&late_reply.await.unwrap()),
            Err(err) => assert!(matches!(err, BillingError::FailedPrecondition(_))),
        }
        assert_eq!(service.get_bill(bill.id).await.unwrap().bill.total_minor, 400);
    }
}

// ============================================================================
// Recovery and Failure Tests
// ============================================================================

mod recovery_tests {
    use super::*;

    #[tokio::test]
    async fn test_restart_recovers_running_total() {
        let (store, service) = memory_service();
        let bill = service.create_bill("USD", None).await.unwrap();
        service
            .submit_add_line_item(bill.id, line_item("Espresso", 1250, "USD"))
            .await
            .unwrap();
        drop(service);

        let restarted = service_over(&store);
        assert!(!restarted.mailbox().is_running(bill.id).await);

        restarted
            .submit_add_line_item(bill.id, line_item("Croissant", 725, "USD"))
            .await
            .unwrap();
        assert!(restarted.mailbox().is_running(bill.id).await);

        let snapshot = restarted.submit_close(bill.id).await.unwrap();
        assert_bill_closed(&snapshot, 1975, 2);
    }

    #[tokio::test]
    async fn test_recover_open_bills_skips_closed() {
        let (store, service) = memory_service();
        let first = service.create_bill("USD", None).await.unwrap();
        let second = service.create_bill("GEL", None).await.unwrap();
        let closed = service.create_bill("USD", None).await.unwrap();
        service.submit_close(closed.id).await.unwrap();
        drop(service);

        let restarted = service_over(&store);
        assert_eq!(restarted.recover().await.unwrap(), 2);
        assert!(restarted.mailbox().is_running(first.id).await);
        assert!(restarted.mailbox().is_running(second.id).await);
        assert!(!restarted.mailbox().is_running(closed.id).await);
    }

    #[tokio::test]
    async fn test_redelivered_item_after_restart_counted_once() {
        let (store, service) = memory_service();
        let bill = service.create_bill("USD", None).await.unwrap();
        let request = line_item("Espresso", 1250, "USD");
        service
            .submit_add_line_item(bill.id, request.clone())
            .await
            .unwrap();
        drop(service);

        let restarted = service_over(&store);
        restarted.submit_add_line_item(bill.id, request).await.unwrap();

        let snapshot = restarted.submit_close(bill.id).await.unwrap();
        assert_bill_closed(&snapshot, 1250, 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let (store, service) = memory_service();
        let bill = service.create_bill("USD", None).await.unwrap();

        store.inject_failures(2);
        service
            .submit_add_line_item(bill.id, line_item("Flaky", 300, "USD"))
            .await
            .unwrap();

        store.inject_lost_acks(1);
        service
            .submit_add_line_item(bill.id, line_item("Lost ack", 200, "USD"))
            .await
            .unwrap();

        let snapshot = service.submit_close(bill.id).await.unwrap();
        assert_bill_closed(&snapshot, 500, 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_leave_bill_open() {
        let (store, service) = memory_service();
        let bill = service.create_bill("USD", None).await.unwrap();
        let command = AddLineItem {
            line_item_id: LineItemId::new_v7(),
            description: "Unlucky".to_string(),
            amount_minor: 100,
            currency: Currency::USD,
        };

        // One initial attempt plus three retries, all failing.
        store.inject_failures(4);
        let result = service.mailbox().add_line_item(bill.id, command.clone()).await;
        assert!(matches!(result, Err(BillingError::Internal(_))));
        assert!(service.mailbox().is_running(bill.id).await);
        assert_eq!(store.line_item_count().await, 0);

        service.mailbox().add_line_item(bill.id, command).await.unwrap();
        let snapshot = service.submit_close(bill.id).await.unwrap();
        assert_bill_closed(&snapshot, 100, 1);
    }

    #[tokio::test]
    async fn test_committed_insert_with_lost_ack_is_counted_at_close() {
        let store = InMemoryLedgerStore::new();
        let service = BillingService::new(
            Arc::new(store.clone()),
            BillingConfig {
                retry: RetryPolicy::none(),
                ..ConfigFixtures::billing_config()
            },
        );
        let bill = service.create_bill("USD", None).await.unwrap();

        // The write commits but its acknowledgment is lost, with no retry.
        store.inject_lost_acks(1);
        let added = service
            .submit_add_line_item(bill.id, line_item("Committed", 500, "USD"))
            .await
            .unwrap();
        assert_eq!(added.amount_minor, 500);
        assert_eq!(store.line_item_count().await, 1);

        let snapshot = service.submit_close(bill.id).await.unwrap();
        assert_bill_closed(&snapshot, 500, 1);
        assert_bill_consistent(&service.get_bill(bill.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_close_after_failed_close_uses_stored_items() {
        let store = InMemoryLedgerStore::new();
        let service = BillingService::new(
            Arc::new(store.clone()),
            BillingConfig {
                retry: RetryPolicy::none(),
                ..ConfigFixtures::billing_config()
            },
        );
        let bill = service.create_bill("USD", None).await.unwrap();
        service
            .submit_add_line_item(bill.id, line_item("Espresso", 1250, "USD"))
            .await
            .unwrap();

        store.inject_failures(1);
        let failed = service.mailbox().close(bill.id).await;
        assert!(matches!(failed, Err(BillingError::Internal(_))));
        assert_eq!(service.get_bill(bill.id).await.unwrap().bill.status, BillStatus::Open);

        let snapshot = service.submit_close(bill.id).await.unwrap();
        assert_bill_closed(&snapshot, 1250, 1);
    }

    #[tokio::test]
    async fn test_timeout_outcome_is_unknown_but_applied() {
        let store = domain_billing::InMemoryLedgerStore::new();
        let service = BillingService::new(
            Arc::new(store.clone()),
            ConfigFixtures::impatient_config(Duration::from_millis(50)),
        );
        let bill = service.create_bill("USD", None).await.unwrap();

        store.set_latency(Duration::from_millis(100));
        let result = service
            .submit_add_line_item(bill.id, line_item("Slow", 700, "USD"))
            .await;
        assert!(matches!(result, Err(BillingError::Timeout { .. })));
        store.set_latency(Duration::ZERO);

        let mut total = 0;
        for _ in 0..100 {
            total = service.get_bill(bill.id).await.unwrap().bill.total_minor;
            if total == 700 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(total, 700);
    }
}

// ============================================================================
// Replay Property Tests
// ============================================================================

mod replay_tests {
    use super::*;

    proptest! {
        #[test]
        fn replay_is_deterministic_and_order_independent(
            items in line_items_strategy(BillId::new_v7(), 30)
        ) {
            let bill_id = items.first().map(|i| i.bill_id).unwrap_or_else(BillId::new_v7);
            let bill = BillBuilder::new().with_id(bill_id).build();

            let forward = OrchestratorState::replay(&bill, items.clone()).unwrap();
            let reversed = OrchestratorState::replay(&bill, items.iter().rev().cloned()).unwrap();
            let doubled = OrchestratorState::replay(
                &bill,
                items.iter().cloned().chain(items.iter().cloned()),
            ).unwrap();

            let expected: i64 = items.iter().map(|i| i.amount_minor).sum();
            prop_assert_eq!(forward.running_total().amount_minor(), expected);
            prop_assert_eq!(&forward, &reversed);
            prop_assert_eq!(&forward, &doubled);
        }
    }

    #[test]
    fn test_replayed_snapshot_is_consistent() {
        let bill = BillBuilder::new().with_total_minor(300).build();
        let items = vec![
            test_utils::LineItemBuilder::new(bill.id).with_amount_minor(100).build(),
            test_utils::LineItemBuilder::new(bill.id).with_amount_minor(200).build(),
        ];
        let state = OrchestratorState::replay(&bill, items).unwrap();

        assert_bill_consistent(&domain_billing::BillSnapshot {
            bill,
            items: state.items().to_vec(),
        });
    }
}
