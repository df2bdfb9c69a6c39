use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Implements the shared surface of a store-assigned row identifier.
///
/// Row identifiers are allocated by the store in insertion order, so their
/// natural ordering doubles as a creation-order tie breaker.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identifier value.
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier value.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

row_id!(
    /// Identifier of a stocked item (the aggregate root of the ledger).
    ItemId
);
row_id!(
    /// Identifier of a stock lot.
    LotId
);
row_id!(
    /// Identifier of an adjustment row.
    AdjustmentId
);
row_id!(
    /// Identifier of the user performing a stock change.
    UserId
);
row_id!(
    /// Identifier of a department.
    DepartmentId
);
row_id!(
    /// Identifier of a vendor.
    VendorId
);
row_id!(
    /// Identifier of a manufacturer.
    ManufacturerId
);
row_id!(
    /// Identifier of an item category.
    CategoryId
);

/// Groups every adjustment row written by one logical stock change.
///
/// A FIFO subtraction touching three lots writes three adjustment rows that
/// share the same operation ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Creates a new random operation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an operation ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OperationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Money amount represented in cents to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_ids_order_by_raw_value() {
        assert!(LotId::new(1) < LotId::new(2));
        assert_eq!(LotId::from(7).as_i64(), 7);
    }

    #[test]
    fn row_id_serializes_transparently() {
        let json = serde_json::to_string(&ItemId::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: ItemId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ItemId::new(42));
    }

    #[test]
    fn operation_id_new_creates_unique_ids() {
        assert_ne!(OperationId::new(), OperationId::new());
    }

    #[test]
    fn operation_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        assert_eq!(OperationId::from_uuid(uuid).as_uuid(), uuid);
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(1050).to_string(), "10.50");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Money::zero().to_string(), "0.00");
    }
}
