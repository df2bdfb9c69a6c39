//! Stock ledger with FIFO lot allocation.
//!
//! Stock for an item lives in dated lots. Additions open a new lot;
//! subtractions drain the oldest lots first. Every change to a lot is
//! recorded as an immutable adjustment, and the item's on-hand quantity is
//! re-derived from its lots inside the same transaction.
//!
//! [`StockCoordinator`] is the entry point. Each of its operations runs as
//! one transaction through these steps:
//! 1. Mutate lots ([`AllocationEngine`])
//! 2. Log adjustments ([`AdjustmentLog`])
//! 3. Recompute on-hand ([`ItemAggregateUpdater`])
//! 4. Commit
//!
//! If any step fails, the transaction is rolled back and nothing is visible.

pub mod adjustment_log;
pub mod aggregate;
pub mod allocation;
pub mod coordinator;
pub mod error;
pub mod item;
pub mod lots;
pub mod scope;
pub mod state;
pub mod telemetry;

pub use adjustment_log::AdjustmentLog;
pub use aggregate::ItemAggregateUpdater;
pub use allocation::{AllocationEngine, LotDraw, Shortfall, plan_fifo};
pub use coordinator::StockCoordinator;
pub use error::{LedgerError, Result};
pub use item::{
    AdjustmentContext, ItemData, ItemUpdate, ItemView, LotDetails, OPENING_STOCK_REASON,
    STOCK_CORRECTION_REASON,
};
pub use lots::LotStore;
pub use scope::TransactionScope;
pub use state::AdjustmentState;
