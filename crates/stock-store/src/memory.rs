use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::OperationId;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    AdjustmentId, ItemId, LotId, Result, StoreError,
    records::{Adjustment, Item, ItemDetails, LotTag, NewAdjustment, NewLot, StockLot, TagKind},
    store::{StockStore, StockTransaction},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    items: BTreeMap<ItemId, Item>,
    lots: BTreeMap<LotId, StockLot>,
    tags: BTreeMap<(LotId, TagKind), LotTag>,
    adjustments: BTreeMap<AdjustmentId, Adjustment>,
    last_item_id: i64,
    last_lot_id: i64,
    last_adjustment_id: i64,
}

impl MemoryState {
    fn require_item(&self, item_id: ItemId) -> Result<()> {
        if self.items.contains_key(&item_id) {
            Ok(())
        } else {
            Err(StoreError::ItemNotFound(item_id))
        }
    }

    fn lots_of(&self, item_id: ItemId) -> Vec<StockLot> {
        let mut lots: Vec<_> = self
            .lots
            .values()
            .filter(|lot| lot.item_id == item_id)
            .cloned()
            .collect();
        lots.sort_by_key(StockLot::fifo_key);
        lots
    }
}

/// In-memory stock store implementation for testing.
///
/// Transactions are serialized through a single async mutex: a transaction
/// holds the lock from `begin` until it finishes. Each transaction keeps a
/// copy of the state taken at `begin` and restores it on rollback or drop.
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<Mutex<MemoryState>>,
    fail_on_adjustment: Arc<AtomicBool>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryStockStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every adjustment insert fail with `Unavailable` while set.
    ///
    /// Used to exercise rollback after lots were already mutated.
    pub fn set_fail_on_adjustment(&self, fail: bool) {
        self.fail_on_adjustment.store(fail, Ordering::SeqCst);
    }

    /// Makes every commit fail with `Unavailable` and roll back while set.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of lots stored.
    pub async fn lot_count(&self) -> usize {
        self.state.lock().await.lots.len()
    }

    /// Returns the total number of adjustments stored.
    pub async fn adjustment_count(&self) -> usize {
        self.state.lock().await.adjustments.len()
    }

    /// Returns the total number of lot tags stored.
    pub async fn tag_count(&self) -> usize {
        self.state.lock().await.tags.len()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(InMemoryTransaction {
            guard: Some(guard),
            snapshot: Some(snapshot),
            fail_on_adjustment: Arc::clone(&self.fail_on_adjustment),
            fail_on_commit: Arc::clone(&self.fail_on_commit),
        })
    }
}

/// Transaction over an [`InMemoryStockStore`].
pub struct InMemoryTransaction {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    snapshot: Option<MemoryState>,
    fail_on_adjustment: Arc<AtomicBool>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryTransaction {
    fn state(&mut self) -> Result<&mut MemoryState> {
        self.guard.as_deref_mut().ok_or(StoreError::Closed)
    }

    fn restore(&mut self) {
        if let (Some(guard), Some(snapshot)) = (self.guard.as_mut(), self.snapshot.take()) {
            **guard = snapshot;
        }
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.guard.is_some() {
            tracing::debug!("in-memory transaction dropped without commit, rolling back");
            self.restore();
        }
    }
}

#[async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn insert_item(&mut self, details: &ItemDetails, opening_stock: i64) -> Result<ItemId> {
        let state = self.state()?;
        state.last_item_id += 1;
        let id = ItemId::new(state.last_item_id);
        let now = Utc::now();
        state.items.insert(
            id,
            Item {
                id,
                name: details.name.clone(),
                unit: details.unit.clone(),
                category_id: details.category_id,
                price: details.price,
                threshold: details.threshold,
                opening_stock,
                on_hand: 0,
                media: details.media.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn lock_item(&mut self, item_id: ItemId) -> Result<Option<Item>> {
        // The whole store is already held exclusively by this transaction.
        self.get_item(item_id).await
    }

    async fn get_item(&mut self, item_id: ItemId) -> Result<Option<Item>> {
        Ok(self.state()?.items.get(&item_id).cloned())
    }

    async fn list_items(&mut self) -> Result<Vec<Item>> {
        Ok(self.state()?.items.values().cloned().collect())
    }

    async fn update_item_details(
        &mut self,
        item_id: ItemId,
        details: &ItemDetails,
    ) -> Result<()> {
        let item = self
            .state()?
            .items
            .get_mut(&item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;
        item.name = details.name.clone();
        item.unit = details.unit.clone();
        item.category_id = details.category_id;
        item.price = details.price;
        item.threshold = details.threshold;
        item.media = details.media.clone();
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn set_on_hand(&mut self, item_id: ItemId, on_hand: i64) -> Result<()> {
        let item = self
            .state()?
            .items
            .get_mut(&item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;
        item.on_hand = on_hand;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_item(&mut self, item_id: ItemId) -> Result<bool> {
        let state = self.state()?;
        if state.items.remove(&item_id).is_none() {
            return Ok(false);
        }
        let lot_ids: Vec<LotId> = state
            .lots
            .values()
            .filter(|lot| lot.item_id == item_id)
            .map(|lot| lot.id)
            .collect();
        state.lots.retain(|_, lot| lot.item_id != item_id);
        state.tags.retain(|(lot_id, _), _| !lot_ids.contains(lot_id));
        state.adjustments.retain(|_, adj| adj.item_id != item_id);
        Ok(true)
    }

    async fn insert_lot(&mut self, lot: &NewLot) -> Result<LotId> {
        let state = self.state()?;
        state.require_item(lot.item_id)?;
        if lot.quantity < 0 {
            return Err(StoreError::Unavailable(format!(
                "lot quantity check violated: {}",
                lot.quantity
            )));
        }
        state.last_lot_id += 1;
        let id = LotId::new(state.last_lot_id);
        state.lots.insert(
            id,
            StockLot {
                id,
                item_id: lot.item_id,
                quantity: lot.quantity,
                received_on: lot.received_on,
                expires_on: lot.expires_on,
                lot_code: lot.lot_code.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_lot(&mut self, lot_id: LotId) -> Result<Option<StockLot>> {
        Ok(self.state()?.lots.get(&lot_id).cloned())
    }

    async fn active_lots(&mut self, item_id: ItemId) -> Result<Vec<StockLot>> {
        let mut lots = self.state()?.lots_of(item_id);
        lots.retain(StockLot::is_active);
        Ok(lots)
    }

    async fn lots_for_item(&mut self, item_id: ItemId) -> Result<Vec<StockLot>> {
        Ok(self.state()?.lots_of(item_id))
    }

    async fn decrement_lot(&mut self, lot_id: LotId, amount: i64) -> Result<i64> {
        let lot = self
            .state()?
            .lots
            .get_mut(&lot_id)
            .ok_or(StoreError::LotNotFound(lot_id))?;
        if amount > lot.quantity {
            return Err(StoreError::LotUnderflow {
                lot_id,
                requested: amount,
                available: lot.quantity,
            });
        }
        lot.quantity -= amount;
        Ok(lot.quantity)
    }

    async fn sum_lot_quantities(&mut self, item_id: ItemId) -> Result<i64> {
        self.state()?
            .lots
            .values()
            .filter(|lot| lot.item_id == item_id)
            .try_fold(0i64, |total, lot| total.checked_add(lot.quantity))
            .ok_or_else(|| {
                StoreError::Corrupt(format!("lot quantities of item {item_id} overflow"))
            })
    }

    async fn upsert_lot_tag(&mut self, lot_id: LotId, tag: LotTag) -> Result<()> {
        let state = self.state()?;
        if !state.lots.contains_key(&lot_id) {
            return Err(StoreError::LotNotFound(lot_id));
        }
        state.tags.insert((lot_id, tag.kind()), tag);
        Ok(())
    }

    async fn lot_tags(&mut self, lot_id: LotId) -> Result<Vec<LotTag>> {
        Ok(self
            .state()?
            .tags
            .range((lot_id, TagKind::Vendor)..=(lot_id, TagKind::Manufacturer))
            .map(|(_, tag)| *tag)
            .collect())
    }

    async fn insert_adjustment(&mut self, adjustment: &NewAdjustment) -> Result<AdjustmentId> {
        if self.fail_on_adjustment.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "adjustment log rejected the write".to_string(),
            ));
        }
        let state = self.state()?;
        state.require_item(adjustment.item_id)?;
        if !state.lots.contains_key(&adjustment.lot_id) {
            return Err(StoreError::LotNotFound(adjustment.lot_id));
        }
        state.last_adjustment_id += 1;
        let id = AdjustmentId::new(state.last_adjustment_id);
        state.adjustments.insert(
            id,
            Adjustment {
                id,
                operation_id: adjustment.operation_id,
                item_id: adjustment.item_id,
                lot_id: adjustment.lot_id,
                quantity: adjustment.quantity,
                adjustment_type: adjustment.adjustment_type,
                reason: adjustment.reason.clone(),
                actor_id: adjustment.actor_id,
                department_id: adjustment.department_id,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn adjustments_for_item(&mut self, item_id: ItemId) -> Result<Vec<Adjustment>> {
        Ok(self
            .state()?
            .adjustments
            .values()
            .filter(|adj| adj.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn adjustments_for_lot(&mut self, lot_id: LotId) -> Result<Vec<Adjustment>> {
        Ok(self
            .state()?
            .adjustments
            .values()
            .filter(|adj| adj.lot_id == lot_id)
            .cloned()
            .collect())
    }

    async fn adjustments_for_operation(
        &mut self,
        operation_id: OperationId,
    ) -> Result<Vec<Adjustment>> {
        Ok(self
            .state()?
            .adjustments
            .values()
            .filter(|adj| adj.operation_id == operation_id)
            .cloned()
            .collect())
    }

    async fn commit(mut self) -> Result<()> {
        if self.guard.is_some() && self.fail_on_commit.load(Ordering::SeqCst) {
            self.restore();
            self.guard = None;
            return Err(StoreError::Unavailable("commit rejected".to_string()));
        }
        self.snapshot = None;
        self.guard.take().ok_or(StoreError::Closed)?;
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        if self.guard.is_none() {
            return Err(StoreError::Closed);
        }
        self.restore();
        self.guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use common::{DepartmentId, Money, UserId, VendorId};

    use super::*;
    use crate::records::AdjustmentType;

    fn details(name: &str) -> ItemDetails {
        ItemDetails {
            name: name.to_string(),
            unit: "kg".to_string(),
            category_id: None,
            price: Money::from_cents(250),
            threshold: 5,
            media: vec![],
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn new_lot(item_id: ItemId, quantity: i64, received_on: NaiveDate) -> NewLot {
        NewLot {
            item_id,
            quantity,
            received_on,
            expires_on: None,
            lot_code: None,
        }
    }

    #[tokio::test]
    async fn commit_makes_writes_visible() {
        let store = InMemoryStockStore::new();
        let mut tx = store.begin().await.unwrap();
        let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
        tx.insert_lot(&new_lot(item_id, 10, day(1))).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_item(item_id).await.unwrap().is_some());
        assert_eq!(tx.sum_lot_quantities(item_id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = InMemoryStockStore::new();
        let mut tx = store.begin().await.unwrap();
        let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_item(item_id).await.unwrap().is_none());
        assert_eq!(store.lot_count().await, 0);
    }

    #[tokio::test]
    async fn drop_without_commit_rolls_back() {
        let store = InMemoryStockStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_item(&details("Beans"), 0).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.list_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn active_lots_follow_fifo_order() {
        let store = InMemoryStockStore::new();
        let mut tx = store.begin().await.unwrap();
        let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
        let late = tx.insert_lot(&new_lot(item_id, 3, day(5))).await.unwrap();
        let early_a = tx.insert_lot(&new_lot(item_id, 3, day(2))).await.unwrap();
        let early_b = tx.insert_lot(&new_lot(item_id, 3, day(2))).await.unwrap();
        let empty = tx.insert_lot(&new_lot(item_id, 0, day(1))).await.unwrap();

        let active: Vec<_> = tx
            .active_lots(item_id)
            .await
            .unwrap()
            .into_iter()
            .map(|lot| lot.id)
            .collect();
        assert_eq!(active, vec![early_a, early_b, late]);

        let all: Vec<_> = tx
            .lots_for_item(item_id)
            .await
            .unwrap()
            .into_iter()
            .map(|lot| lot.id)
            .collect();
        assert_eq!(all, vec![empty, early_a, early_b, late]);
    }

    #[tokio::test]
    async fn decrement_refuses_underflow() {
        let store = InMemoryStockStore::new();
        let mut tx = store.begin().await.unwrap();
        let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
        let lot_id = tx.insert_lot(&new_lot(item_id, 4, day(1))).await.unwrap();

        assert_eq!(tx.decrement_lot(lot_id, 3).await.unwrap(), 1);
        let err = tx.decrement_lot(lot_id, 2).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::LotUnderflow {
                requested: 2,
                available: 1,
                ..
            }
        ));
        assert!(matches!(
            tx.decrement_lot(LotId::new(99), 1).await,
            Err(StoreError::LotNotFound(_))
        ));
    }

    #[tokio::test]
    async fn tag_upsert_keeps_one_row_per_kind() {
        let store = InMemoryStockStore::new();
        let mut tx = store.begin().await.unwrap();
        let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
        let lot_id = tx.insert_lot(&new_lot(item_id, 4, day(1))).await.unwrap();

        tx.upsert_lot_tag(lot_id, LotTag::Vendor(VendorId::new(1)))
            .await
            .unwrap();
        tx.upsert_lot_tag(lot_id, LotTag::Vendor(VendorId::new(2)))
            .await
            .unwrap();
        tx.upsert_lot_tag(lot_id, LotTag::Department(DepartmentId::new(3)))
            .await
            .unwrap();

        let tags = tx.lot_tags(lot_id).await.unwrap();
        assert_eq!(
            tags,
            vec![
                LotTag::Vendor(VendorId::new(2)),
                LotTag::Department(DepartmentId::new(3)),
            ]
        );
        tx.commit().await.unwrap();
        assert_eq!(store.tag_count().await, 2);
    }

    #[tokio::test]
    async fn delete_item_cascades() {
        let store = InMemoryStockStore::new();
        let mut tx = store.begin().await.unwrap();
        let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
        let lot_id = tx.insert_lot(&new_lot(item_id, 4, day(1))).await.unwrap();
        tx.upsert_lot_tag(lot_id, LotTag::Vendor(VendorId::new(1)))
            .await
            .unwrap();
        tx.insert_adjustment(&NewAdjustment {
            operation_id: OperationId::new(),
            item_id,
            lot_id,
            quantity: 4,
            adjustment_type: AdjustmentType::Addition,
            reason: "opening stock".to_string(),
            actor_id: UserId::new(1),
            department_id: DepartmentId::new(1),
        })
        .await
        .unwrap();

        assert!(tx.delete_item(item_id).await.unwrap());
        assert!(!tx.delete_item(item_id).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.lot_count().await, 0);
        assert_eq!(store.tag_count().await, 0);
        assert_eq!(store.adjustment_count().await, 0);
    }

    #[tokio::test]
    async fn overflowing_lot_sum_is_reported() {
        let store = InMemoryStockStore::new();
        let mut tx = store.begin().await.unwrap();
        let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
        tx.insert_lot(&new_lot(item_id, i64::MAX, day(1)))
            .await
            .unwrap();
        assert_eq!(tx.sum_lot_quantities(item_id).await.unwrap(), i64::MAX);

        tx.insert_lot(&new_lot(item_id, 1, day(2))).await.unwrap();
        assert!(matches!(
            tx.sum_lot_quantities(item_id).await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn failing_commit_rolls_back() {
        let store = InMemoryStockStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_item(&details("Rice"), 0).await.unwrap();

        store.set_fail_on_commit(true);
        assert!(matches!(tx.commit().await, Err(StoreError::Unavailable(_))));
        store.set_fail_on_commit(false);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.list_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_adjustment_insert_reports_unavailable() {
        let store = InMemoryStockStore::new();
        store.set_fail_on_adjustment(true);
        let mut tx = store.begin().await.unwrap();
        let item_id = tx.insert_item(&details("Rice"), 0).await.unwrap();
        let lot_id = tx.insert_lot(&new_lot(item_id, 4, day(1))).await.unwrap();

        let result = tx
            .insert_adjustment(&NewAdjustment {
                operation_id: OperationId::new(),
                item_id,
                lot_id,
                quantity: 4,
                adjustment_type: AdjustmentType::Addition,
                reason: String::new(),
                actor_id: UserId::new(1),
                department_id: DepartmentId::new(1),
            })
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
