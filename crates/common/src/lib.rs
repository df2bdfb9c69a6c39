//! Shared identifiers and value types for the stock ledger.

pub mod types;

pub use types::{
    AdjustmentId, CategoryId, DepartmentId, ItemId, LotId, ManufacturerId, Money, OperationId,
    UserId, VendorId,
};
