//! PostgreSQL ledger store integration tests
//!
//! These start a PostgreSQL container and are ignored by default:
//!
//! ```text
//! cargo test -p infra_db -- --ignored
//! ```

use core_kernel::{BillId, Currency, HealthCheckable, LineItemId, PortError};
use domain_billing::{BillStatus, BillingService, LedgerStore, NewBill, NewLineItem};
use test_utils::{
    assert_bill_closed, assert_failed_precondition, create_isolated_test_database, line_item,
    ConfigFixtures,
};

fn new_item(bill_id: BillId, amount_minor: i64) -> NewLineItem {
    NewLineItem {
        id: LineItemId::new_v7(),
        bill_id,
        description: "Integration item".to_string(),
        amount_minor,
        currency: Currency::USD,
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_insert_bill_is_idempotent() {
    let db = create_isolated_test_database().await.unwrap();
    let store = db.ledger_store();
    let id = BillId::new_v7();

    assert!(store.insert_bill(&NewBill { id, currency: Currency::USD }).await.unwrap());
    assert!(!store.insert_bill(&NewBill { id, currency: Currency::GEL }).await.unwrap());

    let bill = store.get_bill(id).await.unwrap().unwrap();
    assert_eq!(bill.currency, Currency::USD);
    assert_eq!(bill.status, BillStatus::Open);
    assert_eq!(bill.total_minor, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_line_item_insert_bumps_total_once() {
    let db = create_isolated_test_database().await.unwrap();
    let store = db.ledger_store();
    let id = BillId::new_v7();
    store.insert_bill(&NewBill { id, currency: Currency::USD }).await.unwrap();

    let item = new_item(id, 1250);
    assert!(!store.insert_line_item(&item).await.unwrap().is_duplicate());
    assert!(store.insert_line_item(&item).await.unwrap().is_duplicate());
    store.insert_line_item(&new_item(id, 725)).await.unwrap();

    let bill = store.get_bill(id).await.unwrap().unwrap();
    assert_eq!(bill.total_minor, 1975);
    assert_eq!(store.list_line_items(id).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_closed_bill_rejects_writes() {
    let db = create_isolated_test_database().await.unwrap();
    let store = db.ledger_store();
    let id = BillId::new_v7();
    store.insert_bill(&NewBill { id, currency: Currency::USD }).await.unwrap();

    let closed = store.close_bill(id, 0).await.unwrap().unwrap();
    assert_eq!(closed.status, BillStatus::Closed);
    assert!(closed.closed_at.is_some());
    assert!(store.close_bill(id, 0).await.unwrap().is_none());

    let err = store.insert_line_item(&new_item(id, 100)).await.unwrap_err();
    assert!(matches!(err, PortError::Conflict { .. }));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_close_keeps_stored_total() {
    let db = create_isolated_test_database().await.unwrap();
    let store = db.ledger_store();
    let id = BillId::new_v7();
    store.insert_bill(&NewBill { id, currency: Currency::USD }).await.unwrap();
    store.insert_line_item(&new_item(id, 500)).await.unwrap();

    assert!(store.close_bill(id, 0).await.unwrap().is_none());
    let bill = store.get_bill(id).await.unwrap().unwrap();
    assert_eq!(bill.status, BillStatus::Open);
    assert_eq!(bill.total_minor, 500);

    let closed = store.close_bill(id, 500).await.unwrap().unwrap();
    assert_eq!(closed.status, BillStatus::Closed);
    assert_eq!(closed.total_minor, 500);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_currency_mismatch_and_missing_bill() {
    let db = create_isolated_test_database().await.unwrap();
    let store = db.ledger_store();
    let id = BillId::new_v7();
    store.insert_bill(&NewBill { id, currency: Currency::GEL }).await.unwrap();

    let err = store.insert_line_item(&new_item(id, 100)).await.unwrap_err();
    assert!(matches!(err, PortError::Conflict { .. }));

    let err = store
        .insert_line_item(&new_item(BillId::new_v7(), 100))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_list_bills_filters_by_status() {
    let db = create_isolated_test_database().await.unwrap();
    let store = db.ledger_store();

    let open = BillId::new_v7();
    let closed = BillId::new_v7();
    store.insert_bill(&NewBill { id: open, currency: Currency::USD }).await.unwrap();
    store.insert_bill(&NewBill { id: closed, currency: Currency::USD }).await.unwrap();
    store.close_bill(closed, 0).await.unwrap();

    let open_bills = store.list_bills(Some(BillStatus::Open)).await.unwrap();
    assert_eq!(open_bills.len(), 1);
    assert_eq!(open_bills[0].id, open);
    assert_eq!(store.list_bills(None).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_service_end_to_end_on_postgres() {
    let db = create_isolated_test_database().await.unwrap();
    let service = db.billing_service(ConfigFixtures::billing_config());

    let bill = service.create_bill("USD", None).await.unwrap();
    service
        .submit_add_line_item(bill.id, line_item("Espresso", 1250, "USD"))
        .await
        .unwrap();
    service
        .submit_add_line_item(bill.id, line_item("Croissant", 725, "USD"))
        .await
        .unwrap();

    let snapshot = service.submit_close(bill.id).await.unwrap();
    assert_bill_closed(&snapshot, 1975, 2);

    let late = service
        .submit_add_line_item(bill.id, line_item("Late", 100, "USD"))
        .await;
    assert_failed_precondition(&late);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_open_bill_recovered_by_new_service() {
    let db = create_isolated_test_database().await.unwrap();
    let service = db.billing_service(ConfigFixtures::billing_config());
    let bill = service.create_bill("GEL", None).await.unwrap();
    service
        .submit_add_line_item(bill.id, line_item("Khachapuri", 1500, "GEL"))
        .await
        .unwrap();
    drop(service);

    let restarted = db.billing_service(ConfigFixtures::billing_config());
    assert_eq!(restarted.recover().await.unwrap(), 1);
    service_adds_and_closes(&restarted, bill.id).await;
}

async fn service_adds_and_closes(service: &BillingService, bill_id: BillId) {
    service
        .submit_add_line_item(bill_id, line_item("Lobiani", 900, "GEL"))
        .await
        .unwrap();
    let snapshot = service.submit_close(bill_id).await.unwrap();
    assert_bill_closed(&snapshot, 2400, 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_health_check_reports_healthy() {
    let db = create_isolated_test_database().await.unwrap();
    let health = db.ledger_store().health_check().await;
    assert!(health.is_ready());
}
