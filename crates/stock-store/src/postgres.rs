use async_trait::async_trait;
use common::{
    AdjustmentId, CategoryId, DepartmentId, ItemId, LotId, Money, OperationId, UserId,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreConfig, StoreError,
    records::{
        Adjustment, AdjustmentType, Item, ItemDetails, LotTag, NewAdjustment, NewLot, StockLot,
        TagKind,
    },
    store::{StockStore, StockTransaction},
};

const ITEM_COLUMNS: &str = "id, name, unit, category_id, price_cents, threshold, opening_stock, on_hand, media, created_at, updated_at";
const LOT_COLUMNS: &str = "id, item_id, quantity, received_on, expires_on, lot_code, created_at";
const ADJUSTMENT_COLUMNS: &str = "id, operation_id, item_id, lot_id, quantity, adjustment_type, reason, actor_id, department_id, created_at";

/// PostgreSQL-backed stock store implementation.
///
/// Same-item writers serialize on the item row lock taken by
/// [`StockTransaction::lock_item`]; writers on different items never share a
/// lock.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    /// Creates a new PostgreSQL stock store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool using the given configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await?;
        tracing::info!(
            max_connections = config.max_connections,
            "connected to stock database"
        );
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_item(row: PgRow) -> Result<Item> {
        let media: serde_json::Value = row.try_get("media")?;
        Ok(Item {
            id: ItemId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            unit: row.try_get("unit")?,
            category_id: row
                .try_get::<Option<i64>, _>("category_id")?
                .map(CategoryId::new),
            price: Money::from_cents(row.try_get("price_cents")?),
            threshold: row.try_get("threshold")?,
            opening_stock: row.try_get("opening_stock")?,
            on_hand: row.try_get("on_hand")?,
            media: serde_json::from_value(media)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_lot(row: PgRow) -> Result<StockLot> {
        Ok(StockLot {
            id: LotId::new(row.try_get("id")?),
            item_id: ItemId::new(row.try_get("item_id")?),
            quantity: row.try_get("quantity")?,
            received_on: row.try_get("received_on")?,
            expires_on: row.try_get("expires_on")?,
            lot_code: row.try_get("lot_code")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_adjustment(row: PgRow) -> Result<Adjustment> {
        let adjustment_type: String = row.try_get("adjustment_type")?;
        Ok(Adjustment {
            id: AdjustmentId::new(row.try_get("id")?),
            operation_id: OperationId::from_uuid(row.try_get::<Uuid, _>("operation_id")?),
            item_id: ItemId::new(row.try_get("item_id")?),
            lot_id: LotId::new(row.try_get("lot_id")?),
            quantity: row.try_get("quantity")?,
            adjustment_type: adjustment_type
                .parse()
                .map_err(|e: crate::records::ParseAdjustmentTypeError| {
                    StoreError::Corrupt(e.to_string())
                })?,
            reason: row.try_get("reason")?,
            actor_id: UserId::new(row.try_get("actor_id")?),
            department_id: DepartmentId::new(row.try_get("department_id")?),
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Maps a foreign-key violation on `item_id` to `ItemNotFound`.
fn map_item_fk(e: sqlx::Error, item_id: ItemId) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_foreign_key_violation()
    {
        return StoreError::ItemNotFound(item_id);
    }
    StoreError::Database(e)
}

#[async_trait]
impl StockStore for PostgresStockStore {
    type Transaction = PgStockTransaction;

    async fn begin(&self) -> Result<PgStockTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PgStockTransaction { tx })
    }
}

/// Transaction over a [`PostgresStockStore`].
///
/// Dropping it without committing rolls back, as `sqlx` does for every
/// unfinished transaction.
pub struct PgStockTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockTransaction for PgStockTransaction {
    async fn insert_item(&mut self, details: &ItemDetails, opening_stock: i64) -> Result<ItemId> {
        let media = serde_json::to_value(&details.media)?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO items (name, unit, category_id, price_cents, threshold, opening_stock, on_hand, media)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7)
            RETURNING id
            "#,
        )
        .bind(&details.name)
        .bind(&details.unit)
        .bind(details.category_id.map(|c| c.as_i64()))
        .bind(details.price.cents())
        .bind(details.threshold)
        .bind(opening_stock)
        .bind(media)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(ItemId::new(id))
    }

    async fn lock_item(&mut self, item_id: ItemId) -> Result<Option<Item>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 FOR UPDATE"
        ))
        .bind(item_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(PostgresStockStore::row_to_item).transpose()
    }

    async fn get_item(&mut self, item_id: ItemId) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(item_id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(PostgresStockStore::row_to_item).transpose()
    }

    async fn list_items(&mut self) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY id ASC"))
            .fetch_all(&mut *self.tx)
            .await?;

        rows.into_iter().map(PostgresStockStore::row_to_item).collect()
    }

    async fn update_item_details(
        &mut self,
        item_id: ItemId,
        details: &ItemDetails,
    ) -> Result<()> {
        let media = serde_json::to_value(&details.media)?;
        let result = sqlx::query(
            r#"
            UPDATE items
            SET name = $2, unit = $3, category_id = $4, price_cents = $5,
                threshold = $6, media = $7, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(item_id.as_i64())
        .bind(&details.name)
        .bind(&details.unit)
        .bind(details.category_id.map(|c| c.as_i64()))
        .bind(details.price.cents())
        .bind(details.threshold)
        .bind(media)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ItemNotFound(item_id));
        }
        Ok(())
    }

    async fn set_on_hand(&mut self, item_id: ItemId, on_hand: i64) -> Result<()> {
        let result =
            sqlx::query("UPDATE items SET on_hand = $2, updated_at = NOW() WHERE id = $1")
                .bind(item_id.as_i64())
                .bind(on_hand)
                .execute(&mut *self.tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ItemNotFound(item_id));
        }
        Ok(())
    }

    async fn delete_item(&mut self, item_id: ItemId) -> Result<bool> {
        // Lots, tags and adjustments go with the item through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(item_id.as_i64())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_lot(&mut self, lot: &NewLot) -> Result<LotId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock_lots (item_id, quantity, received_on, expires_on, lot_code)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(lot.item_id.as_i64())
        .bind(lot.quantity)
        .bind(lot.received_on)
        .bind(lot.expires_on)
        .bind(&lot.lot_code)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_item_fk(e, lot.item_id))?;

        Ok(LotId::new(id))
    }

    async fn get_lot(&mut self, lot_id: LotId) -> Result<Option<StockLot>> {
        let row = sqlx::query(&format!("SELECT {LOT_COLUMNS} FROM stock_lots WHERE id = $1"))
            .bind(lot_id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(PostgresStockStore::row_to_lot).transpose()
    }

    async fn active_lots(&mut self, item_id: ItemId) -> Result<Vec<StockLot>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM stock_lots
            WHERE item_id = $1 AND quantity > 0
            ORDER BY received_on ASC, id ASC
            FOR UPDATE
            "#
        ))
        .bind(item_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(PostgresStockStore::row_to_lot).collect()
    }

    async fn lots_for_item(&mut self, item_id: ItemId) -> Result<Vec<StockLot>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM stock_lots
            WHERE item_id = $1
            ORDER BY received_on ASC, id ASC
            "#
        ))
        .bind(item_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(PostgresStockStore::row_to_lot).collect()
    }

    async fn decrement_lot(&mut self, lot_id: LotId, amount: i64) -> Result<i64> {
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE stock_lots
            SET quantity = quantity - $2
            WHERE id = $1 AND quantity >= $2
            RETURNING quantity
            "#,
        )
        .bind(lot_id.as_i64())
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(remaining);
        }

        let available: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM stock_lots WHERE id = $1")
                .bind(lot_id.as_i64())
                .fetch_optional(&mut *self.tx)
                .await?;

        match available {
            Some(available) => Err(StoreError::LotUnderflow {
                lot_id,
                requested: amount,
                available,
            }),
            None => Err(StoreError::LotNotFound(lot_id)),
        }
    }

    async fn sum_lot_quantities(&mut self, item_id: ItemId) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM stock_lots WHERE item_id = $1",
        )
        .bind(item_id.as_i64())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(total)
    }

    async fn upsert_lot_tag(&mut self, lot_id: LotId, tag: LotTag) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lot_tags (lot_id, kind, tag_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (lot_id, kind) DO UPDATE SET
                tag_id = EXCLUDED.tag_id,
                updated_at = NOW()
            "#,
        )
        .bind(lot_id.as_i64())
        .bind(tag.kind().as_str())
        .bind(tag.raw_id())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return StoreError::LotNotFound(lot_id);
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn lot_tags(&mut self, lot_id: LotId) -> Result<Vec<LotTag>> {
        let rows = sqlx::query("SELECT kind, tag_id FROM lot_tags WHERE lot_id = $1")
            .bind(lot_id.as_i64())
            .fetch_all(&mut *self.tx)
            .await?;

        let mut tags = rows
            .into_iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                let kind: TagKind = kind.parse().map_err(StoreError::Corrupt)?;
                Ok(LotTag::from_parts(kind, row.try_get("tag_id")?))
            })
            .collect::<Result<Vec<_>>>()?;
        tags.sort_by_key(LotTag::kind);
        Ok(tags)
    }

    async fn insert_adjustment(&mut self, adjustment: &NewAdjustment) -> Result<AdjustmentId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock_adjustments
                (operation_id, item_id, lot_id, quantity, adjustment_type, reason, actor_id, department_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(adjustment.operation_id.as_uuid())
        .bind(adjustment.item_id.as_i64())
        .bind(adjustment.lot_id.as_i64())
        .bind(adjustment.quantity)
        .bind(adjustment.adjustment_type.as_str())
        .bind(&adjustment.reason)
        .bind(adjustment.actor_id.as_i64())
        .bind(adjustment.department_id.as_i64())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_item_fk(e, adjustment.item_id))?;

        Ok(AdjustmentId::new(id))
    }

    async fn adjustments_for_item(&mut self, item_id: ItemId) -> Result<Vec<Adjustment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM stock_adjustments WHERE item_id = $1 ORDER BY id ASC"
        ))
        .bind(item_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(PostgresStockStore::row_to_adjustment)
            .collect()
    }

    async fn adjustments_for_lot(&mut self, lot_id: LotId) -> Result<Vec<Adjustment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM stock_adjustments WHERE lot_id = $1 ORDER BY id ASC"
        ))
        .bind(lot_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(PostgresStockStore::row_to_adjustment)
            .collect()
    }

    async fn adjustments_for_operation(
        &mut self,
        operation_id: OperationId,
    ) -> Result<Vec<Adjustment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM stock_adjustments WHERE operation_id = $1 ORDER BY id ASC"
        ))
        .bind(operation_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(PostgresStockStore::row_to_adjustment)
            .collect()
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
