//! Append-only log of stock adjustments.

use common::{ItemId, LotId, OperationId};
use stock_store::{Adjustment, AdjustmentId, AdjustmentType, NewAdjustment, StockTransaction};

use crate::allocation::LotDraw;
use crate::error::{LedgerError, Result};
use crate::item::AdjustmentContext;

/// Writes and reads adjustment records within one transaction.
///
/// Records are never updated or deleted. One logical operation writes one
/// record per lot it touched, all sharing the operation's ID.
pub struct AdjustmentLog<'t, T: StockTransaction> {
    tx: &'t mut T,
}

impl<'t, T: StockTransaction> AdjustmentLog<'t, T> {
    pub fn new(tx: &'t mut T) -> Self {
        Self { tx }
    }

    /// Appends one adjustment.
    pub async fn record(&mut self, adjustment: &NewAdjustment) -> Result<AdjustmentId> {
        if adjustment.quantity <= 0 {
            return Err(LedgerError::InvariantViolation(format!(
                "adjustment for lot {} has non-positive quantity {}",
                adjustment.lot_id, adjustment.quantity
            )));
        }
        Ok(self.tx.insert_adjustment(adjustment).await?)
    }

    /// Appends one adjustment per lot draw of an operation.
    pub async fn record_draws(
        &mut self,
        operation_id: OperationId,
        item_id: ItemId,
        adjustment_type: AdjustmentType,
        draws: &[LotDraw],
        context: &AdjustmentContext,
    ) -> Result<Vec<AdjustmentId>> {
        let mut ids = Vec::with_capacity(draws.len());
        for draw in draws {
            let id = self
                .record(&NewAdjustment {
                    operation_id,
                    item_id,
                    lot_id: draw.lot_id,
                    quantity: draw.quantity,
                    adjustment_type,
                    reason: context.reason.clone(),
                    actor_id: context.actor_id,
                    department_id: context.department_id,
                })
                .await?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Adjustments of an item, oldest first.
    pub async fn history_for_item(&mut self, item_id: ItemId) -> Result<Vec<Adjustment>> {
        Ok(self.tx.adjustments_for_item(item_id).await?)
    }

    /// Adjustments of a lot, oldest first.
    pub async fn history_for_lot(&mut self, lot_id: LotId) -> Result<Vec<Adjustment>> {
        Ok(self.tx.adjustments_for_lot(lot_id).await?)
    }

    /// Adjustments written by one operation.
    pub async fn history_for_operation(
        &mut self,
        operation_id: OperationId,
    ) -> Result<Vec<Adjustment>> {
        Ok(self.tx.adjustments_for_operation(operation_id).await?)
    }
}
