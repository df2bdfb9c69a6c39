use async_trait::async_trait;
use common::OperationId;

use crate::{
    AdjustmentId, ItemId, LotId, Result,
    records::{Adjustment, Item, ItemDetails, LotTag, NewAdjustment, NewLot, StockLot},
};

/// Entry point to a transactional stock store.
///
/// Every read and write happens inside a [`StockTransaction`]. Implementations
/// must be thread-safe (Send + Sync) and cheap to clone into request handlers.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// The transaction type handed out by [`StockStore::begin`].
    type Transaction: StockTransaction;

    /// Opens a new transaction.
    ///
    /// The transaction sees at least read-committed data and holds row locks
    /// on the item and lot rows it locks until it is committed, rolled back
    /// or dropped. Dropping an unfinished transaction rolls it back.
    async fn begin(&self) -> Result<Self::Transaction>;
}

/// One unit of work against the stock store.
///
/// Nothing written through a transaction is visible to other transactions
/// until [`StockTransaction::commit`] succeeds.
#[async_trait]
pub trait StockTransaction: Send + Sized {
    /// Inserts an item and returns its store-assigned ID.
    ///
    /// The on-hand quantity of a new item starts at zero; stock arrives
    /// through lots.
    async fn insert_item(&mut self, details: &ItemDetails, opening_stock: i64) -> Result<ItemId>;

    /// Loads an item and locks its row for the rest of the transaction.
    ///
    /// Returns None if the item does not exist.
    async fn lock_item(&mut self, item_id: ItemId) -> Result<Option<Item>>;

    /// Loads an item without locking it.
    async fn get_item(&mut self, item_id: ItemId) -> Result<Option<Item>>;

    /// Lists every item in ID order.
    async fn list_items(&mut self) -> Result<Vec<Item>>;

    /// Overwrites the descriptive fields of an item.
    async fn update_item_details(&mut self, item_id: ItemId, details: &ItemDetails)
    -> Result<()>;

    /// Writes the derived on-hand quantity of an item.
    async fn set_on_hand(&mut self, item_id: ItemId, on_hand: i64) -> Result<()>;

    /// Deletes an item together with its lots, tags and adjustments.
    ///
    /// Returns false if the item did not exist.
    async fn delete_item(&mut self, item_id: ItemId) -> Result<bool>;

    /// Inserts a lot and returns its store-assigned ID.
    async fn insert_lot(&mut self, lot: &NewLot) -> Result<LotId>;

    /// Loads a single lot.
    async fn get_lot(&mut self, lot_id: LotId) -> Result<Option<StockLot>>;

    /// Returns the item's lots holding stock, oldest receipt first.
    ///
    /// Ordered by (received date, lot ID) ascending. The returned rows are
    /// locked for update.
    async fn active_lots(&mut self, item_id: ItemId) -> Result<Vec<StockLot>>;

    /// Returns every lot of the item, exhausted ones included, in FIFO order.
    async fn lots_for_item(&mut self, item_id: ItemId) -> Result<Vec<StockLot>>;

    /// Subtracts `amount` from a lot and returns the remaining quantity.
    ///
    /// Fails with `LotUnderflow` instead of letting the quantity go negative,
    /// and with `LotNotFound` if the lot does not exist.
    async fn decrement_lot(&mut self, lot_id: LotId, amount: i64) -> Result<i64>;

    /// Sums the quantity of every lot belonging to the item.
    async fn sum_lot_quantities(&mut self, item_id: ItemId) -> Result<i64>;

    /// Attaches a tag to a lot, replacing any tag of the same kind.
    async fn upsert_lot_tag(&mut self, lot_id: LotId, tag: LotTag) -> Result<()>;

    /// Returns the tags of a lot ordered by kind.
    async fn lot_tags(&mut self, lot_id: LotId) -> Result<Vec<LotTag>>;

    /// Appends an adjustment and returns its store-assigned ID.
    async fn insert_adjustment(&mut self, adjustment: &NewAdjustment) -> Result<AdjustmentId>;

    /// Returns the adjustments of an item in append order.
    async fn adjustments_for_item(&mut self, item_id: ItemId) -> Result<Vec<Adjustment>>;

    /// Returns the adjustments of a lot in append order.
    async fn adjustments_for_lot(&mut self, lot_id: LotId) -> Result<Vec<Adjustment>>;

    /// Returns the adjustments written by one logical operation.
    async fn adjustments_for_operation(
        &mut self,
        operation_id: OperationId,
    ) -> Result<Vec<Adjustment>>;

    /// Makes every write of the transaction durable and visible.
    async fn commit(self) -> Result<()>;

    /// Discards every write of the transaction.
    async fn rollback(self) -> Result<()>;
}
