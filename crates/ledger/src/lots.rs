//! Lot store: the per-item collection of dated stock lots.

use chrono::NaiveDate;
use common::{ItemId, LotId};
use stock_store::{LotTag, NewLot, StockLot, StockTransaction};

use crate::error::{LedgerError, Result};
use crate::item::LotDetails;

/// Lot reads and writes within one transaction.
///
/// Lots are the only source of truth for stock. A lot's quantity never goes
/// below zero, and exhausted lots are kept for history.
pub struct LotStore<'t, T: StockTransaction> {
    tx: &'t mut T,
    today: NaiveDate,
}

impl<'t, T: StockTransaction> LotStore<'t, T> {
    /// Wraps a transaction. `today` dates lots received without a date.
    pub fn new(tx: &'t mut T, today: NaiveDate) -> Self {
        Self { tx, today }
    }

    /// Returns the item's lots holding stock, oldest receipt first.
    ///
    /// Ties on the receipt date are broken by lot ID, which follows insertion
    /// order. The rows stay locked until the transaction ends.
    pub async fn list_active_lots(&mut self, item_id: ItemId) -> Result<Vec<StockLot>> {
        let mut lots = self.tx.active_lots(item_id).await?;
        if let Some(lot) = lots.iter().find(|lot| !lot.is_active()) {
            return Err(LedgerError::InvariantViolation(format!(
                "lot {} listed as active with quantity {}",
                lot.id, lot.quantity
            )));
        }
        lots.sort_by_key(StockLot::fifo_key);
        Ok(lots)
    }

    /// Creates a lot holding `quantity` units.
    pub async fn create_lot(
        &mut self,
        item_id: ItemId,
        quantity: i64,
        details: &LotDetails,
    ) -> Result<LotId> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "lot quantity must be positive, got {quantity}"
            )));
        }
        let lot = NewLot {
            item_id,
            quantity,
            received_on: details.received_on.unwrap_or(self.today),
            expires_on: details.expires_on,
            lot_code: details.lot_code.clone(),
        };
        let lot_id = self.tx.insert_lot(&lot).await?;
        tracing::debug!(%item_id, %lot_id, quantity, received_on = %lot.received_on, "lot created");
        Ok(lot_id)
    }

    /// Takes `amount` units out of a lot and returns what is left.
    pub async fn decrement_lot(&mut self, lot_id: LotId, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "decrement must be positive, got {amount}"
            )));
        }
        let lot = self
            .tx
            .get_lot(lot_id)
            .await?
            .ok_or_else(|| LedgerError::InvariantViolation(format!("lot {lot_id} not found")))?;
        if amount > lot.quantity {
            return Err(LedgerError::InvariantViolation(format!(
                "lot {lot_id} holds {}, cannot take {amount}",
                lot.quantity
            )));
        }
        let remaining = self.tx.decrement_lot(lot_id, amount).await?;
        tracing::trace!(%lot_id, amount, remaining, "lot decremented");
        Ok(remaining)
    }

    /// Sums the quantities of the item's lots.
    pub async fn current_quantity(&mut self, item_id: ItemId) -> Result<i64> {
        Ok(self.tx.sum_lot_quantities(item_id).await?)
    }

    /// Returns every lot of the item, exhausted ones included.
    pub async fn lots_for_item(&mut self, item_id: ItemId) -> Result<Vec<StockLot>> {
        Ok(self.tx.lots_for_item(item_id).await?)
    }

    /// Attaches a vendor, department or manufacturer to a lot.
    ///
    /// Replaces any tag of the same kind, so repeating a tag is a no-op.
    pub async fn tag_lot(&mut self, lot_id: LotId, tag: LotTag) -> Result<()> {
        if self.tx.get_lot(lot_id).await?.is_none() {
            return Err(LedgerError::InvalidArgument(format!(
                "lot {lot_id} does not exist"
            )));
        }
        self.tx.upsert_lot_tag(lot_id, tag).await?;
        Ok(())
    }

    /// Returns the tags of a lot.
    pub async fn tags(&mut self, lot_id: LotId) -> Result<Vec<LotTag>> {
        Ok(self.tx.lot_tags(lot_id).await?)
    }
}
