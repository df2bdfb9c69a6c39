//! Item aggregate updater.

use common::ItemId;
use stock_store::StockTransaction;

use crate::error::{LedgerError, Result};

/// Keeps an item's on-hand quantity equal to the sum of its lots.
///
/// The value is always re-derived from the lots, never incremented.
pub struct ItemAggregateUpdater<'t, T: StockTransaction> {
    tx: &'t mut T,
}

impl<'t, T: StockTransaction> ItemAggregateUpdater<'t, T> {
    pub fn new(tx: &'t mut T) -> Self {
        Self { tx }
    }

    /// Re-sums the item's lots, stores the total and returns it.
    pub async fn recompute(&mut self, item_id: ItemId) -> Result<i64> {
        let total = self.tx.sum_lot_quantities(item_id).await?;
        if total < 0 {
            return Err(LedgerError::InvariantViolation(format!(
                "lots of item {item_id} sum to {total}"
            )));
        }
        self.tx.set_on_hand(item_id, total).await?;
        tracing::trace!(%item_id, on_hand = total, "on-hand recomputed");
        Ok(total)
    }
}
