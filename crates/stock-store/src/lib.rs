pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use common::{AdjustmentId, ItemId, LotId};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use memory::{InMemoryStockStore, InMemoryTransaction};
pub use postgres::{PgStockTransaction, PostgresStockStore};
pub use records::{
    Adjustment, AdjustmentType, Item, ItemDetails, LotTag, NewAdjustment, NewLot,
    ParseAdjustmentTypeError, StockLot, TagKind,
};
pub use store::{StockStore, StockTransaction};
