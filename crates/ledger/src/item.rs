//! Inputs and views exchanged with ledger callers.

use chrono::NaiveDate;
use common::{CategoryId, DepartmentId, ItemId, ManufacturerId, Money, UserId, VendorId};
use serde::{Deserialize, Serialize};
use stock_store::{Item, ItemDetails, LotTag, StockLot};

use crate::error::{LedgerError, Result};

/// Reason recorded on the adjustment created for an item's opening stock.
pub const OPENING_STOCK_REASON: &str = "opening stock";

/// Reason recorded when an edit moves stock to a new target quantity.
pub const STOCK_CORRECTION_REASON: &str = "stock count correction";

/// Who is adjusting stock and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentContext {
    pub reason: String,
    pub actor_id: UserId,
    pub department_id: DepartmentId,
}

impl AdjustmentContext {
    pub fn new(reason: impl Into<String>, actor_id: UserId, department_id: DepartmentId) -> Self {
        Self {
            reason: reason.into(),
            actor_id,
            department_id,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.reason.trim().is_empty() {
            return Err(LedgerError::InvalidArgument(
                "adjustment reason must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Metadata for a lot created by an addition.
///
/// Everything is optional: a lot received without a date is dated to the
/// day of the operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDetails {
    pub received_on: Option<NaiveDate>,
    pub expires_on: Option<NaiveDate>,
    pub lot_code: Option<String>,
    pub tags: Vec<LotTag>,
}

impl LotDetails {
    /// Lot details carrying only a receipt date.
    pub fn received(on: NaiveDate) -> Self {
        Self {
            received_on: Some(on),
            ..Self::default()
        }
    }

    /// Adds a tag, replacing any earlier tag of the same kind.
    pub fn with_tag(mut self, tag: LotTag) -> Self {
        self.tags.retain(|t| t.kind() != tag.kind());
        self.tags.push(tag);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let (Some(received), Some(expires)) = (self.received_on, self.expires_on)
            && expires < received
        {
            return Err(LedgerError::InvalidArgument(format!(
                "lot expires on {expires}, before it was received on {received}"
            )));
        }
        Ok(())
    }
}

/// Everything needed to create an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemData {
    pub name: String,
    pub unit: String,
    pub category_id: Option<CategoryId>,
    pub price: Money,
    pub threshold: i64,
    pub media: Vec<String>,
    /// Quantity received into the item's first lot. Zero creates no lot.
    pub opening_stock: i64,
    pub received_on: Option<NaiveDate>,
    pub expires_on: Option<NaiveDate>,
    pub lot_code: Option<String>,
    pub vendor_id: Option<VendorId>,
    pub department_id: Option<DepartmentId>,
    pub manufacturer_id: Option<ManufacturerId>,
    /// User recorded on the opening-stock adjustment.
    pub actor_id: UserId,
    /// Department recorded on the opening-stock adjustment.
    pub actor_department_id: DepartmentId,
}

impl ItemData {
    pub(crate) fn validate(&self) -> Result<()> {
        validate_details(
            &self.name,
            &self.unit,
            self.price,
            self.threshold,
            &self.media,
        )?;
        if self.opening_stock < 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "opening stock must not be negative, got {}",
                self.opening_stock
            )));
        }
        self.opening_lot().validate()
    }

    pub(crate) fn details(&self) -> ItemDetails {
        ItemDetails {
            name: self.name.trim().to_string(),
            unit: self.unit.trim().to_string(),
            category_id: self.category_id,
            price: self.price,
            threshold: self.threshold,
            media: self.media.clone(),
        }
    }

    pub(crate) fn opening_lot(&self) -> LotDetails {
        let tags = [
            self.vendor_id.map(LotTag::Vendor),
            self.department_id.map(LotTag::Department),
            self.manufacturer_id.map(LotTag::Manufacturer),
        ]
        .into_iter()
        .flatten()
        .collect();
        LotDetails {
            received_on: self.received_on,
            expires_on: self.expires_on,
            lot_code: self.lot_code.clone(),
            tags,
        }
    }

    pub(crate) fn opening_context(&self) -> AdjustmentContext {
        AdjustmentContext::new(
            OPENING_STOCK_REASON,
            self.actor_id,
            self.actor_department_id,
        )
    }
}

/// A full edit of an item's descriptive fields, optionally moving stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub name: String,
    pub unit: String,
    pub category_id: Option<CategoryId>,
    pub price: Money,
    pub threshold: i64,
    pub media: Vec<String>,
    /// Counted quantity the item should hold after the edit. The difference
    /// to current stock is applied as an addition or a FIFO subtraction.
    pub target_quantity: Option<i64>,
    /// Metadata for the lot created when the target is above current stock.
    pub lot: LotDetails,
    pub actor_id: UserId,
    pub actor_department_id: DepartmentId,
    /// Reason recorded on the correcting adjustment, if one is needed. Blank
    /// means the default correction reason.
    pub reason: Option<String>,
}

impl ItemUpdate {
    pub(crate) fn validate(&self) -> Result<()> {
        validate_details(
            &self.name,
            &self.unit,
            self.price,
            self.threshold,
            &self.media,
        )?;
        if let Some(target) = self.target_quantity
            && target < 0
        {
            return Err(LedgerError::InvalidArgument(format!(
                "target quantity must not be negative, got {target}"
            )));
        }
        self.lot.validate()?;
        self.context().validate()
    }

    pub(crate) fn details(&self) -> ItemDetails {
        ItemDetails {
            name: self.name.trim().to_string(),
            unit: self.unit.trim().to_string(),
            category_id: self.category_id,
            price: self.price,
            threshold: self.threshold,
            media: self.media.clone(),
        }
    }

    pub(crate) fn context(&self) -> AdjustmentContext {
        AdjustmentContext::new(
            self.reason
                .as_deref()
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .unwrap_or(STOCK_CORRECTION_REASON),
            self.actor_id,
            self.actor_department_id,
        )
    }
}

fn validate_details(
    name: &str,
    unit: &str,
    price: Money,
    threshold: i64,
    media: &[String],
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(LedgerError::InvalidArgument(
            "item name must not be empty".to_string(),
        ));
    }
    if unit.trim().is_empty() {
        return Err(LedgerError::InvalidArgument(
            "item unit must not be empty".to_string(),
        ));
    }
    if price.is_negative() {
        return Err(LedgerError::InvalidArgument(format!(
            "price must not be negative, got {price}"
        )));
    }
    if threshold < 0 {
        return Err(LedgerError::InvalidArgument(format!(
            "threshold must not be negative, got {threshold}"
        )));
    }
    if media.iter().any(|m| m.trim().is_empty()) {
        return Err(LedgerError::InvalidArgument(
            "media references must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// An item as presented to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: ItemId,
    pub name: String,
    pub unit: String,
    pub category_id: Option<CategoryId>,
    /// Department tag of the oldest active lot.
    pub department_id: Option<DepartmentId>,
    pub price: Money,
    pub threshold: i64,
    pub opening_stock: i64,
    pub remaining_stock: i64,
    pub is_low_stock: bool,
    pub active_lots: usize,
    pub media: Vec<String>,
}

impl ItemView {
    pub(crate) fn new(
        item: Item,
        active_lots: &[StockLot],
        department_id: Option<DepartmentId>,
    ) -> Self {
        let is_low_stock = item.is_low_stock();
        Self {
            id: item.id,
            name: item.name,
            unit: item.unit,
            category_id: item.category_id,
            department_id,
            price: item.price,
            threshold: item.threshold,
            opening_stock: item.opening_stock,
            remaining_stock: item.on_hand,
            is_low_stock,
            active_lots: active_lots.len(),
            media: item.media,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> ItemData {
        ItemData {
            name: " Rice ".to_string(),
            unit: "kg".to_string(),
            category_id: None,
            price: Money::from_cents(250),
            threshold: 5,
            media: vec![],
            opening_stock: 20,
            received_on: None,
            expires_on: None,
            lot_code: None,
            vendor_id: Some(VendorId::new(3)),
            department_id: None,
            manufacturer_id: Some(ManufacturerId::new(8)),
            actor_id: UserId::new(1),
            actor_department_id: DepartmentId::new(1),
        }
    }

    #[test]
    fn test_valid_item_data() {
        assert!(data().validate().is_ok());
        assert_eq!(data().details().name, "Rice");
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut d = data();
        d.name = "   ".to_string();
        assert!(matches!(d.validate(), Err(LedgerError::InvalidArgument(_))));
    }

    #[test]
    fn test_negative_fields_rejected() {
        let mut d = data();
        d.opening_stock = -1;
        assert!(d.validate().is_err());

        let mut d = data();
        d.price = Money::from_cents(-1);
        assert!(d.validate().is_err());

        let mut d = data();
        d.threshold = -2;
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_expiry_before_receipt_rejected() {
        let mut d = data();
        d.received_on = NaiveDate::from_ymd_opt(2024, 5, 10);
        d.expires_on = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert!(matches!(d.validate(), Err(LedgerError::InvalidArgument(_))));
    }

    #[test]
    fn test_opening_lot_carries_present_tags() {
        let lot = data().opening_lot();
        assert_eq!(
            lot.tags,
            vec![
                LotTag::Vendor(VendorId::new(3)),
                LotTag::Manufacturer(ManufacturerId::new(8)),
            ]
        );
        assert_eq!(data().opening_context().reason, OPENING_STOCK_REASON);
    }

    #[test]
    fn test_with_tag_replaces_same_kind() {
        let lot = LotDetails::default()
            .with_tag(LotTag::Vendor(VendorId::new(1)))
            .with_tag(LotTag::Vendor(VendorId::new(2)));
        assert_eq!(lot.tags, vec![LotTag::Vendor(VendorId::new(2))]);
    }

    #[test]
    fn test_blank_reason_rejected() {
        let ctx = AdjustmentContext::new("  ", UserId::new(1), DepartmentId::new(1));
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn test_update_defaults_to_correction_reason() {
        let update = ItemUpdate {
            name: "Rice".to_string(),
            unit: "kg".to_string(),
            category_id: None,
            price: Money::zero(),
            threshold: 0,
            media: vec![],
            target_quantity: Some(-4),
            lot: LotDetails::default(),
            actor_id: UserId::new(1),
            actor_department_id: DepartmentId::new(1),
            reason: None,
        };
        assert_eq!(update.context().reason, STOCK_CORRECTION_REASON);

        let blank = ItemUpdate {
            reason: Some("  ".to_string()),
            target_quantity: None,
            ..update.clone()
        };
        assert_eq!(blank.context().reason, STOCK_CORRECTION_REASON);
        assert!(blank.validate().is_ok());

        assert!(matches!(
            update.validate(),
            Err(LedgerError::InvalidArgument(_))
        ));
    }
}
