//! Stock coordinator: the public entry point of the ledger.

use std::cmp::Ordering;
use std::time::Instant;

use common::{DepartmentId, ItemId, LotId};
use stock_store::{
    Adjustment, AdjustmentType, Item, LotTag, StockLot, StockStore, StockTransaction,
};

use crate::adjustment_log::AdjustmentLog;
use crate::aggregate::ItemAggregateUpdater;
use crate::allocation::{AllocationEngine, LotDraw};
use crate::error::{LedgerError, Result};
use crate::item::{AdjustmentContext, ItemData, ItemUpdate, ItemView, LotDetails};
use crate::lots::LotStore;
use crate::scope::TransactionScope;
use crate::state::AdjustmentState;

/// Runs every ledger operation as one atomic transaction.
///
/// Each public method opens a [`TransactionScope`], validates its input,
/// mutates lots, logs adjustments, re-derives the item's on-hand quantity
/// and commits. Any failure rolls the whole operation back. Concurrent
/// operations on the same item are serialized by the store's row locks.
pub struct StockCoordinator<S: StockStore> {
    store: S,
}

#[derive(Debug, Clone, Copy)]
enum StockChange<'a> {
    Add { quantity: i64, lot: &'a LotDetails },
    Subtract { quantity: i64 },
}

impl StockChange<'_> {
    fn adjustment_type(&self) -> AdjustmentType {
        match self {
            StockChange::Add { .. } => AdjustmentType::Addition,
            StockChange::Subtract { .. } => AdjustmentType::Subtraction,
        }
    }
}

impl<S: StockStore> StockCoordinator<S> {
    /// Creates a coordinator over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Adds or removes stock.
    ///
    /// An addition opens one new lot dated today. A subtraction drains the
    /// oldest active lots first and fails with `InsufficientStock` if they
    /// cannot cover `quantity`. Returns the IDs of the lots touched, in the
    /// order they were touched.
    #[tracing::instrument(skip(self, context), fields(reason = %context.reason))]
    pub async fn adjust_stock(
        &self,
        item_id: ItemId,
        quantity: i64,
        adjustment_type: AdjustmentType,
        context: AdjustmentContext,
    ) -> Result<Vec<LotId>> {
        let no_lot_details = LotDetails::default();
        let change = match adjustment_type {
            AdjustmentType::Addition => StockChange::Add {
                quantity,
                lot: &no_lot_details,
            },
            AdjustmentType::Subtraction => StockChange::Subtract { quantity },
        };
        let draws = self.run_change(item_id, change, &context).await?;
        Ok(draws.into_iter().map(|draw| draw.lot_id).collect())
    }

    /// Receives stock into a new lot carrying the given dates, code and tags.
    #[tracing::instrument(skip(self, lot, context), fields(reason = %context.reason))]
    pub async fn receive_stock(
        &self,
        item_id: ItemId,
        quantity: i64,
        lot: LotDetails,
        context: AdjustmentContext,
    ) -> Result<LotId> {
        lot.validate()?;
        let change = StockChange::Add {
            quantity,
            lot: &lot,
        };
        let draws = self.run_change(item_id, change, &context).await?;
        draws
            .first()
            .map(|draw| draw.lot_id)
            .ok_or_else(|| LedgerError::InvariantViolation("addition created no lot".to_string()))
    }

    /// Creates an item, receiving its opening stock into a first lot.
    ///
    /// The opening lot carries the vendor, department and manufacturer of
    /// `data`. Nothing is written if any step fails.
    #[tracing::instrument(skip(self, data), fields(name = %data.name, opening_stock = data.opening_stock))]
    pub async fn create_item(&self, data: ItemData) -> Result<ItemId> {
        data.validate()?;
        let start = Instant::now();

        let mut scope = TransactionScope::begin(&self.store).await?;
        let outcome = create_in(&mut scope, &data).await;
        let item_id = scope.finish(outcome).await?;

        metrics::counter!("stock_items_created_total").increment(1);
        if data.opening_stock > 0 {
            record_adjustment_metrics(AdjustmentType::Addition, 1);
        }
        metrics::histogram!("stock_operation_duration_seconds", "operation" => "create_item")
            .record(start.elapsed().as_secs_f64());
        tracing::info!(%item_id, "item created");
        Ok(item_id)
    }

    /// Rewrites an item's details and, if a target quantity is given, moves
    /// stock to it.
    ///
    /// A target above current stock is received as an addition; a target
    /// below it is taken out FIFO. An equal target writes no adjustment.
    #[tracing::instrument(skip(self, update), fields(target = ?update.target_quantity))]
    pub async fn update_item(&self, item_id: ItemId, update: ItemUpdate) -> Result<()> {
        update.validate()?;
        let start = Instant::now();

        let mut scope = TransactionScope::begin(&self.store).await?;
        let outcome = update_in(&mut scope, item_id, &update).await;
        let outcome = observe_insufficient(outcome);
        let applied = scope.finish(outcome).await?;

        if let Some((adjustment_type, rows)) = applied {
            record_adjustment_metrics(adjustment_type, rows);
        }
        metrics::histogram!("stock_operation_duration_seconds", "operation" => "update_item")
            .record(start.elapsed().as_secs_f64());
        tracing::info!(%item_id, "item updated");
        Ok(())
    }

    /// Deletes an item with its lots, tags and adjustment history.
    #[tracing::instrument(skip(self))]
    pub async fn delete_item(&self, item_id: ItemId) -> Result<()> {
        let mut scope = TransactionScope::begin(&self.store).await?;
        let outcome = match scope.tx() {
            Ok(tx) => match tx.delete_item(item_id).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(LedgerError::ItemNotFound(item_id)),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e),
        };
        scope.finish(outcome).await?;
        tracing::info!(%item_id, "item deleted");
        Ok(())
    }

    /// Loads an item with its remaining stock and low-stock flag.
    ///
    /// Returns None if the item does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_item(&self, item_id: ItemId) -> Result<Option<ItemView>> {
        let mut scope = TransactionScope::begin(&self.store).await?;
        let outcome = view_in(&mut scope, item_id).await;
        scope.finish(outcome).await
    }

    /// Lists every item at or below its reorder threshold.
    #[tracing::instrument(skip(self))]
    pub async fn low_stock_items(&self) -> Result<Vec<ItemView>> {
        let mut scope = TransactionScope::begin(&self.store).await?;
        let outcome = low_stock_in(&mut scope).await;
        scope.finish(outcome).await
    }

    /// Attaches a vendor, department or manufacturer to a lot.
    ///
    /// A lot holds one tag per kind; tagging again replaces the old value.
    #[tracing::instrument(skip(self))]
    pub async fn tag_lot(&self, lot_id: LotId, tag: LotTag) -> Result<()> {
        let mut scope = TransactionScope::begin(&self.store).await?;
        let today = scope.today();
        let outcome = match scope.tx() {
            Ok(tx) => LotStore::new(tx, today).tag_lot(lot_id, tag).await,
            Err(e) => Err(e),
        };
        scope.finish(outcome).await
    }

    /// Returns every lot of an item in FIFO order, exhausted ones included.
    #[tracing::instrument(skip(self))]
    pub async fn lots(&self, item_id: ItemId) -> Result<Vec<StockLot>> {
        let mut scope = TransactionScope::begin(&self.store).await?;
        let outcome = lots_in(&mut scope, item_id).await;
        scope.finish(outcome).await
    }

    /// Returns the adjustment history of an item, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn adjustments(&self, item_id: ItemId) -> Result<Vec<Adjustment>> {
        let mut scope = TransactionScope::begin(&self.store).await?;
        let outcome = history_in(&mut scope, item_id).await;
        scope.finish(outcome).await
    }

    /// Returns the adjustment history of one lot, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn lot_adjustments(&self, lot_id: LotId) -> Result<Vec<Adjustment>> {
        let mut scope = TransactionScope::begin(&self.store).await?;
        let outcome = match scope.tx() {
            Ok(tx) => AdjustmentLog::new(tx).history_for_lot(lot_id).await,
            Err(e) => Err(e),
        };
        scope.finish(outcome).await
    }

    async fn run_change(
        &self,
        item_id: ItemId,
        change: StockChange<'_>,
        context: &AdjustmentContext,
    ) -> Result<Vec<LotDraw>> {
        context.validate()?;
        let quantity = match change {
            StockChange::Add { quantity, .. } | StockChange::Subtract { quantity } => quantity,
        };
        if quantity <= 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "adjustment quantity must be positive, got {quantity}"
            )));
        }
        let start = Instant::now();

        let mut scope = TransactionScope::begin(&self.store).await?;
        let outcome = match lock_item(&mut scope, item_id).await {
            Ok(_) => apply_change(&mut scope, item_id, change, context).await,
            Err(e) => Err(e),
        };
        let draws = scope.finish(observe_insufficient(outcome)).await?;

        record_adjustment_metrics(change.adjustment_type(), draws.len());
        metrics::histogram!("stock_operation_duration_seconds", "operation" => "adjust_stock")
            .record(start.elapsed().as_secs_f64());
        tracing::info!(
            %item_id,
            adjustment_type = %change.adjustment_type(),
            quantity,
            lots = draws.len(),
            "stock adjusted"
        );
        Ok(draws)
    }
}

fn record_adjustment_metrics(adjustment_type: AdjustmentType, rows: usize) {
    metrics::counter!("stock_adjustments_total", "type" => adjustment_type.as_str()).increment(1);
    metrics::counter!("stock_adjustment_rows_total").increment(rows as u64);
}

fn observe_insufficient<R>(outcome: Result<R>) -> Result<R> {
    if let Err(LedgerError::InsufficientStock {
        item_id,
        requested,
        available,
    }) = &outcome
    {
        metrics::counter!("stock_insufficient_total").increment(1);
        tracing::warn!(%item_id, requested, available, "insufficient stock");
    }
    outcome
}

async fn lock_item<T: StockTransaction>(
    scope: &mut TransactionScope<T>,
    item_id: ItemId,
) -> Result<Item> {
    scope
        .tx()?
        .lock_item(item_id)
        .await?
        .ok_or(LedgerError::ItemNotFound(item_id))
}

/// Mutates lots, logs the change and re-derives on-hand, in that order.
async fn apply_change<T: StockTransaction>(
    scope: &mut TransactionScope<T>,
    item_id: ItemId,
    change: StockChange<'_>,
    context: &AdjustmentContext,
) -> Result<Vec<LotDraw>> {
    let today = scope.today();
    let operation_id = scope.operation_id();

    let draws = {
        let mut engine = AllocationEngine::new(LotStore::new(scope.tx()?, today));
        match change {
            StockChange::Add { quantity, lot } => vec![engine.add(item_id, quantity, lot).await?],
            StockChange::Subtract { quantity } => engine.subtract_fifo(item_id, quantity).await?,
        }
    };
    scope.advance(AdjustmentState::LotsMutated)?;

    AdjustmentLog::new(scope.tx()?)
        .record_draws(
            operation_id,
            item_id,
            change.adjustment_type(),
            &draws,
            context,
        )
        .await?;
    scope.advance(AdjustmentState::Logged)?;

    let on_hand = ItemAggregateUpdater::new(scope.tx()?)
        .recompute(item_id)
        .await?;
    scope.advance(AdjustmentState::Aggregated)?;

    tracing::debug!(%item_id, %operation_id, on_hand, "ledger change applied");
    Ok(draws)
}

async fn create_in<T: StockTransaction>(
    scope: &mut TransactionScope<T>,
    data: &ItemData,
) -> Result<ItemId> {
    let item_id = scope
        .tx()?
        .insert_item(&data.details(), data.opening_stock)
        .await?;
    if data.opening_stock > 0 {
        let lot = data.opening_lot();
        let change = StockChange::Add {
            quantity: data.opening_stock,
            lot: &lot,
        };
        apply_change(scope, item_id, change, &data.opening_context()).await?;
    }
    Ok(item_id)
}

async fn update_in<T: StockTransaction>(
    scope: &mut TransactionScope<T>,
    item_id: ItemId,
    update: &ItemUpdate,
) -> Result<Option<(AdjustmentType, usize)>> {
    lock_item(scope, item_id).await?;
    scope
        .tx()?
        .update_item_details(item_id, &update.details())
        .await?;

    let Some(target) = update.target_quantity else {
        return Ok(None);
    };
    let today = scope.today();
    let current = LotStore::new(scope.tx()?, today)
        .current_quantity(item_id)
        .await?;
    let change = match target.cmp(&current) {
        Ordering::Greater => StockChange::Add {
            quantity: target - current,
            lot: &update.lot,
        },
        Ordering::Less => StockChange::Subtract {
            quantity: current - target,
        },
        Ordering::Equal => return Ok(None),
    };
    let draws = apply_change(scope, item_id, change, &update.context()).await?;
    Ok(Some((change.adjustment_type(), draws.len())))
}

async fn view_in<T: StockTransaction>(
    scope: &mut TransactionScope<T>,
    item_id: ItemId,
) -> Result<Option<ItemView>> {
    let Some(item) = scope.tx()?.get_item(item_id).await? else {
        return Ok(None);
    };
    Ok(Some(build_view(scope, item).await?))
}

async fn low_stock_in<T: StockTransaction>(
    scope: &mut TransactionScope<T>,
) -> Result<Vec<ItemView>> {
    let items = scope.tx()?.list_items().await?;
    let mut views = Vec::new();
    for item in items.into_iter().filter(Item::is_low_stock) {
        views.push(build_view(scope, item).await?);
    }
    Ok(views)
}

async fn build_view<T: StockTransaction>(
    scope: &mut TransactionScope<T>,
    item: Item,
) -> Result<ItemView> {
    let today = scope.today();
    let mut lots = LotStore::new(scope.tx()?, today);
    let active: Vec<StockLot> = lots
        .lots_for_item(item.id)
        .await?
        .into_iter()
        .filter(StockLot::is_active)
        .collect();
    let department_id = match active.first() {
        Some(oldest) => department_of(lots.tags(oldest.id).await?),
        None => None,
    };
    Ok(ItemView::new(item, &active, department_id))
}

fn department_of(tags: Vec<LotTag>) -> Option<DepartmentId> {
    tags.into_iter().find_map(|tag| match tag {
        LotTag::Department(id) => Some(id),
        _ => None,
    })
}

async fn lots_in<T: StockTransaction>(
    scope: &mut TransactionScope<T>,
    item_id: ItemId,
) -> Result<Vec<StockLot>> {
    if scope.tx()?.get_item(item_id).await?.is_none() {
        return Err(LedgerError::ItemNotFound(item_id));
    }
    let today = scope.today();
    LotStore::new(scope.tx()?, today)
        .lots_for_item(item_id)
        .await
}

async fn history_in<T: StockTransaction>(
    scope: &mut TransactionScope<T>,
    item_id: ItemId,
) -> Result<Vec<Adjustment>> {
    if scope.tx()?.get_item(item_id).await?.is_none() {
        return Err(LedgerError::ItemNotFound(item_id));
    }
    AdjustmentLog::new(scope.tx()?)
        .history_for_item(item_id)
        .await
}
