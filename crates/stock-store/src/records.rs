//! Row records exchanged with the stock store.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use common::{
    AdjustmentId, CategoryId, DepartmentId, ItemId, LotId, ManufacturerId, Money, OperationId,
    UserId, VendorId,
};
use serde::{Deserialize, Serialize};

/// Direction of a stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    /// Stock received into a new lot.
    Addition,
    /// Stock drawn out of existing lots.
    Subtraction,
}

impl AdjustmentType {
    /// Returns the stored name of the adjustment type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Addition => "addition",
            AdjustmentType::Subtraction => "subtraction",
        }
    }

    /// Applies the direction to an unsigned quantity.
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            AdjustmentType::Addition => quantity,
            AdjustmentType::Subtraction => -quantity,
        }
    }
}

impl std::fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown adjustment type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAdjustmentTypeError {
    pub value: String,
}

impl std::fmt::Display for ParseAdjustmentTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown adjustment type: {}", self.value)
    }
}

impl std::error::Error for ParseAdjustmentTypeError {}

impl FromStr for AdjustmentType {
    type Err = ParseAdjustmentTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "addition" => Ok(AdjustmentType::Addition),
            "subtraction" => Ok(AdjustmentType::Subtraction),
            other => Err(ParseAdjustmentTypeError {
                value: other.to_string(),
            }),
        }
    }
}

/// Descriptive fields of an item, written on create and on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub name: String,
    pub unit: String,
    pub category_id: Option<CategoryId>,
    pub price: Money,
    pub threshold: i64,
    pub media: Vec<String>,
}

/// A stocked item with its derived on-hand quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub unit: String,
    pub category_id: Option<CategoryId>,
    pub price: Money,
    pub threshold: i64,
    pub opening_stock: i64,
    pub on_hand: i64,
    pub media: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Returns true if on-hand stock is at or below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.on_hand <= self.threshold
    }
}

/// A dated batch of stock for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLot {
    pub id: LotId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub received_on: NaiveDate,
    pub expires_on: Option<NaiveDate>,
    pub lot_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StockLot {
    /// Returns true if the lot still holds stock.
    pub fn is_active(&self) -> bool {
        self.quantity > 0
    }

    /// FIFO sort key: oldest receipt first, insertion order on ties.
    pub fn fifo_key(&self) -> (NaiveDate, LotId) {
        (self.received_on, self.id)
    }
}

/// A lot about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLot {
    pub item_id: ItemId,
    pub quantity: i64,
    pub received_on: NaiveDate,
    pub expires_on: Option<NaiveDate>,
    pub lot_code: Option<String>,
}

/// Kind of relationship attached to a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Vendor,
    Department,
    Manufacturer,
}

impl TagKind {
    /// Returns the stored name of the tag kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::Vendor => "vendor",
            TagKind::Department => "department",
            TagKind::Manufacturer => "manufacturer",
        }
    }
}

impl FromStr for TagKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vendor" => Ok(TagKind::Vendor),
            "department" => Ok(TagKind::Department),
            "manufacturer" => Ok(TagKind::Manufacturer),
            other => Err(format!("unknown tag kind: {other}")),
        }
    }
}

/// A vendor, department or manufacturer attached to a lot.
///
/// A lot carries at most one tag per kind; writing a tag of a kind the lot
/// already has replaces the previous value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LotTag {
    Vendor(VendorId),
    Department(DepartmentId),
    Manufacturer(ManufacturerId),
}

impl LotTag {
    /// Returns the kind of this tag.
    pub fn kind(&self) -> TagKind {
        match self {
            LotTag::Vendor(_) => TagKind::Vendor,
            LotTag::Department(_) => TagKind::Department,
            LotTag::Manufacturer(_) => TagKind::Manufacturer,
        }
    }

    /// Returns the raw identifier of the tagged entity.
    pub fn raw_id(&self) -> i64 {
        match self {
            LotTag::Vendor(id) => id.as_i64(),
            LotTag::Department(id) => id.as_i64(),
            LotTag::Manufacturer(id) => id.as_i64(),
        }
    }

    /// Rebuilds a tag from its stored kind and identifier.
    pub fn from_parts(kind: TagKind, raw_id: i64) -> Self {
        match kind {
            TagKind::Vendor => LotTag::Vendor(VendorId::new(raw_id)),
            TagKind::Department => LotTag::Department(DepartmentId::new(raw_id)),
            TagKind::Manufacturer => LotTag::Manufacturer(ManufacturerId::new(raw_id)),
        }
    }
}

/// An adjustment about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAdjustment {
    pub operation_id: OperationId,
    pub item_id: ItemId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub adjustment_type: AdjustmentType,
    pub reason: String,
    pub actor_id: UserId,
    pub department_id: DepartmentId,
}

/// An immutable audit record of one quantity change to one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: AdjustmentId,
    pub operation_id: OperationId,
    pub item_id: ItemId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub adjustment_type: AdjustmentType,
    pub reason: String,
    pub actor_id: UserId,
    pub department_id: DepartmentId,
    pub created_at: DateTime<Utc>,
}

impl Adjustment {
    /// Returns the quantity with the adjustment direction applied.
    pub fn signed_quantity(&self) -> i64 {
        self.adjustment_type.signed(self.quantity)
    }
}
