//! FIFO allocation engine.
//!
//! Additions always open a new lot. Subtractions drain the oldest active lots
//! first: the draw plan is computed in full before any lot is written, so a
//! shortfall is detected without touching storage.

use common::{ItemId, LotId};
use serde::{Deserialize, Serialize};
use stock_store::{StockLot, StockTransaction};

use crate::error::{LedgerError, Result};
use crate::item::LotDetails;
use crate::lots::LotStore;

/// Quantity taken from (or put into) one lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: LotId,
    pub quantity: i64,
}

/// Active stock could not cover a subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub requested: i64,
    pub available: i64,
}

/// Plans a FIFO subtraction of `amount` across `lots`.
///
/// `lots` must already be in FIFO order. Each lot gives up to its full
/// quantity; only the last lot touched may be left partially full. Lots
/// with no stock are skipped.
pub fn plan_fifo(lots: &[StockLot], amount: i64) -> std::result::Result<Vec<LotDraw>, Shortfall> {
    // Lots holding more than i64::MAX in total can cover any request.
    let available = lots
        .iter()
        .try_fold(0i64, |total, lot| total.checked_add(lot.quantity.max(0)))
        .unwrap_or(i64::MAX);
    if amount > available {
        return Err(Shortfall {
            requested: amount,
            available,
        });
    }

    let mut remaining = amount;
    let mut draws = Vec::new();
    for lot in lots.iter().filter(|lot| lot.is_active()) {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(lot.quantity);
        draws.push(LotDraw {
            lot_id: lot.id,
            quantity: take,
        });
        remaining -= take;
    }
    Ok(draws)
}

/// Applies additions and FIFO subtractions to an item's lots.
pub struct AllocationEngine<'t, T: StockTransaction> {
    lots: LotStore<'t, T>,
}

impl<'t, T: StockTransaction> AllocationEngine<'t, T> {
    pub fn new(lots: LotStore<'t, T>) -> Self {
        Self { lots }
    }

    /// Receives `quantity` units into one new lot.
    ///
    /// Additions never merge into an existing lot. Fails with
    /// `InvalidArgument` if the item's total would no longer fit in an `i64`.
    pub async fn add(
        &mut self,
        item_id: ItemId,
        quantity: i64,
        details: &LotDetails,
    ) -> Result<LotDraw> {
        validate_amount(quantity)?;
        let current = self.lots.current_quantity(item_id).await?;
        if current.checked_add(quantity).is_none() {
            return Err(LedgerError::InvalidArgument(format!(
                "adding {quantity} to {current} on hand exceeds the largest storable quantity"
            )));
        }
        let lot_id = self.lots.create_lot(item_id, quantity, details).await?;
        for tag in &details.tags {
            self.lots.tag_lot(lot_id, *tag).await?;
        }
        Ok(LotDraw { lot_id, quantity })
    }

    /// Takes `amount` units from the item's oldest active lots.
    ///
    /// Fails with `InsufficientStock` before writing anything if the active
    /// lots hold less than `amount`.
    pub async fn subtract_fifo(&mut self, item_id: ItemId, amount: i64) -> Result<Vec<LotDraw>> {
        validate_amount(amount)?;
        let active = self.lots.list_active_lots(item_id).await?;
        let draws = plan_fifo(&active, amount).map_err(|shortfall| {
            LedgerError::InsufficientStock {
                item_id,
                requested: shortfall.requested,
                available: shortfall.available,
            }
        })?;
        for draw in &draws {
            self.lots.decrement_lot(draw.lot_id, draw.quantity).await?;
        }
        tracing::debug!(%item_id, amount, lots = draws.len(), "fifo subtraction applied");
        Ok(draws)
    }
}

fn validate_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(LedgerError::InvalidArgument(format!(
            "adjustment quantity must be positive, got {amount}"
        )));
    }
    Ok(())
}
