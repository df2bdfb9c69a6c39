use thiserror::Error;

use crate::{ItemId, LotId};

/// Errors that can occur when interacting with the stock store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A decrement asked for more than the lot holds.
    #[error("Lot {lot_id} holds {available}, cannot take {requested}")]
    LotUnderflow {
        lot_id: LotId,
        requested: i64,
        available: i64,
    },

    /// The lot does not exist.
    #[error("Lot not found: {0}")]
    LotNotFound(LotId),

    /// A row referenced an item that does not exist.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// The transaction was already committed or rolled back.
    #[error("Transaction already finished")]
    Closed,

    /// The store refused to execute the statement.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be mapped back into a record.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for stock store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
