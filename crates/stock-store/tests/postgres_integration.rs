//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p stock-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use common::{DepartmentId, ItemId, Money, OperationId, UserId, VendorId};
use sqlx::PgPool;
use stock_store::{
    AdjustmentType, ItemDetails, LotTag, NewAdjustment, NewLot, PostgresStockStore, StockStore,
    StockTransaction, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStockStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStockStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE stock_adjustments, lot_tags, stock_lots, items RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStockStore::new(pool)
}

fn details(name: &str) -> ItemDetails {
    ItemDetails {
        name: name.to_string(),
        unit: "kg".to_string(),
        category_id: None,
        price: Money::from_cents(199),
        threshold: 3,
        media: vec!["rice.png".to_string()],
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn lot(item_id: ItemId, quantity: i64, received_on: NaiveDate) -> NewLot {
    NewLot {
        item_id,
        quantity,
        received_on,
        expires_on: None,
        lot_code: None,
    }
}

#[tokio::test]
async fn insert_and_read_item() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let item_id = tx.insert_item(&details("Rice"), 20).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let item = tx.get_item(item_id).await.unwrap().unwrap();
    assert_eq!(item.name, "Rice");
    assert_eq!(item.opening_stock, 20);
    assert_eq!(item.on_hand, 0);
    assert_eq!(item.media, vec!["rice.png".to_string()]);
    assert_eq!(item.price, Money::from_cents(199));
}

#[tokio::test]
async fn rollback_discards_item() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
    tx.rollback().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(tx.get_item(item_id).await.unwrap().is_none());
}

#[tokio::test]
async fn active_lots_are_fifo_ordered() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
    let late = tx.insert_lot(&lot(item_id, 5, day(9))).await.unwrap();
    let first = tx.insert_lot(&lot(item_id, 5, day(1))).await.unwrap();
    let second = tx.insert_lot(&lot(item_id, 5, day(1))).await.unwrap();
    tx.insert_lot(&lot(item_id, 0, day(1))).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let ids: Vec<_> = tx
        .active_lots(item_id)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.id)
        .collect();
    assert_eq!(ids, vec![first, second, late]);
    assert_eq!(tx.lots_for_item(item_id).await.unwrap().len(), 4);
    assert_eq!(tx.sum_lot_quantities(item_id).await.unwrap(), 15);
}

#[tokio::test]
async fn decrement_reports_underflow_and_missing_lot() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
    let lot_id = tx.insert_lot(&lot(item_id, 4, day(1))).await.unwrap();

    assert_eq!(tx.decrement_lot(lot_id, 4).await.unwrap(), 0);
    assert!(matches!(
        tx.decrement_lot(lot_id, 1).await,
        Err(StoreError::LotUnderflow { available: 0, .. })
    ));
    assert!(matches!(
        tx.decrement_lot(stock_store::LotId::new(9_999), 1).await,
        Err(StoreError::LotNotFound(_))
    ));
}

#[tokio::test]
async fn tag_upsert_replaces_same_kind() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
    let lot_id = tx.insert_lot(&lot(item_id, 4, day(1))).await.unwrap();
    tx.upsert_lot_tag(lot_id, LotTag::Vendor(VendorId::new(1)))
        .await
        .unwrap();
    tx.upsert_lot_tag(lot_id, LotTag::Vendor(VendorId::new(2)))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert_eq!(
        tx.lot_tags(lot_id).await.unwrap(),
        vec![LotTag::Vendor(VendorId::new(2))]
    );
}

#[tokio::test]
async fn adjustments_are_queryable_and_immutable() {
    let store = get_test_store().await;
    let operation_id = OperationId::new();

    let mut tx = store.begin().await.unwrap();
    let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
    let lot_id = tx.insert_lot(&lot(item_id, 4, day(1))).await.unwrap();
    let adjustment_id = tx
        .insert_adjustment(&NewAdjustment {
            operation_id,
            item_id,
            lot_id,
            quantity: 4,
            adjustment_type: AdjustmentType::Addition,
            reason: "opening stock".to_string(),
            actor_id: UserId::new(7),
            department_id: DepartmentId::new(2),
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let history = tx.adjustments_for_item(item_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, adjustment_id);
    assert_eq!(history[0].adjustment_type, AdjustmentType::Addition);
    assert_eq!(history[0].actor_id, UserId::new(7));
    assert_eq!(tx.adjustments_for_lot(lot_id).await.unwrap().len(), 1);
    assert_eq!(
        tx.adjustments_for_operation(operation_id)
            .await
            .unwrap()
            .len(),
        1
    );
    drop(tx);

    let update = sqlx::query("UPDATE stock_adjustments SET quantity = 1 WHERE id = $1")
        .bind(adjustment_id.as_i64())
        .execute(store.pool())
        .await;
    assert!(update.is_err());
}

#[tokio::test]
async fn delete_item_cascades_to_lots() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
    let lot_id = tx.insert_lot(&lot(item_id, 4, day(1))).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(tx.delete_item(item_id).await.unwrap());
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(tx.get_lot(lot_id).await.unwrap().is_none());
    assert!(!tx.delete_item(item_id).await.unwrap());
}

#[tokio::test]
async fn lot_for_missing_item_is_rejected() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let result = tx.insert_lot(&lot(ItemId::new(424_242), 1, day(1))).await;
    assert!(matches!(result, Err(StoreError::ItemNotFound(_))));
}
