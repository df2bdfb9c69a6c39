//! Ledger error types.

use common::ItemId;
use stock_store::{ParseAdjustmentTypeError, StoreError};
use thiserror::Error;

/// Errors that can occur during ledger operations.
///
/// Every failing operation has rolled its transaction back before one of
/// these reaches the caller.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed input, rejected before any storage access.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The active lots of the item cannot cover a subtraction.
    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: i64,
        available: i64,
    },

    /// A lot would go negative or the ledger is otherwise inconsistent.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The item does not exist.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// The storage layer could not execute the operation.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LotUnderflow { .. } | StoreError::LotNotFound(_) | StoreError::Closed => {
                LedgerError::InvariantViolation(e.to_string())
            }
            StoreError::ItemNotFound(item_id) => LedgerError::ItemNotFound(item_id),
            other => LedgerError::StorageUnavailable(other),
        }
    }
}

impl From<ParseAdjustmentTypeError> for LedgerError {
    fn from(e: ParseAdjustmentTypeError) -> Self {
        LedgerError::InvalidArgument(e.to_string())
    }
}

/// Convenience type alias for ledger results.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use common::LotId;

    use super::*;

    #[test]
    fn lot_underflow_is_an_invariant_violation() {
        let err: LedgerError = StoreError::LotUnderflow {
            lot_id: LotId::new(1),
            requested: 5,
            available: 2,
        }
        .into();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
    }

    #[test]
    fn missing_item_keeps_its_id() {
        let err: LedgerError = StoreError::ItemNotFound(ItemId::new(3)).into();
        assert!(matches!(err, LedgerError::ItemNotFound(id) if id == ItemId::new(3)));
    }

    #[test]
    fn other_store_errors_mean_unavailable() {
        let err: LedgerError = StoreError::Unavailable("connection reset".into()).into();
        assert!(matches!(err, LedgerError::StorageUnavailable(_)));
    }

    #[test]
    fn unknown_adjustment_type_is_invalid_argument() {
        let err: LedgerError = "transfer"
            .parse::<stock_store::AdjustmentType>()
            .unwrap_err()
            .into();
        assert!(matches!(err, LedgerError::InvalidArgument(msg) if msg.contains("transfer")));
    }
}
