//! Authoritative inventory and order store.
//!
//! # Purchase commit
//!
//! One transaction runs three statements:
//!
//! 1. `UPDATE items SET remaining_stock = remaining_stock - 1 WHERE id = $1 AND remaining_stock > 0`
//! 2. `INSERT INTO orders ...`
//! 3. `INSERT INTO purchases ... ON CONFLICT (user_id, item_id) DO NOTHING`
//!
//! If step 1 touches no row the item is sold out (or missing). If step 3
//! inserts nothing the buyer already owns an order and the transaction is
//! rolled back, undoing steps 1 and 2. Concurrent commits for the same row
//! serialize on the row lock taken by step 1, and the `CHECK
//! (remaining_stock >= 0)` constraint backs up the guard.

use crate::db_err;
use chrono::{DateTime, Utc};
use flashgate_core::providers::{CommitOutcome, InventoryStore, ProviderFuture};
use flashgate_core::{
    Item, ItemId, Money, Order, OrderId, OrderStatus, SaleWindow, StoreError, UserId,
};
use sqlx::PgPool;

const ORDER_COLUMNS: &str =
    "id, user_id, item_id, item_name, price_cents, quantity, status, created_at, paid_at";

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    name: String,
    price_cents: i64,
    remaining_stock: i64,
    sale_start: DateTime<Utc>,
    sale_end: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: ItemId(row.id),
            name: row.name,
            price: Money::from_cents(row.price_cents),
            remaining_stock: row.remaining_stock,
            sale_window: SaleWindow::new(row.sale_start, row.sale_end),
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    item_id: i64,
    item_name: String,
    price_cents: i64,
    quantity: i32,
    status: String,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
            key: format!("orders:{}", row.id),
            reason: format!("unknown status {:?}", row.status),
        })?;

        Ok(Self {
            id: OrderId(row.id),
            user_id: UserId(row.user_id),
            item_id: ItemId(row.item_id),
            item_name: row.item_name,
            price: Money::from_cents(row.price_cents),
            quantity: row.quantity,
            status,
            created_at: row.created_at,
            paid_at: row.paid_at,
        })
    }
}

/// `PostgreSQL` [`InventoryStore`].
#[derive(Clone)]
pub struct PostgresInventory {
    pool: PgPool,
}

impl PostgresInventory {
    /// Create a store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an item, or refresh the listing of the one with the same id.
    ///
    /// Used to stage a sale ahead of its window. The stock of an existing
    /// item is left alone: once a row exists, `remaining_stock` only moves
    /// through committed purchases, so re-staging on restart cannot hand out
    /// units that were already sold.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the write fails.
    pub async fn stage_item(&self, item: &Item) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO items (id, name, price_cents, remaining_stock, sale_start, sale_end)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                sale_start = EXCLUDED.sale_start,
                sale_end = EXCLUDED.sale_end
            ",
        )
        .bind(item.id.0)
        .bind(&item.name)
        .bind(item.price.cents())
        .bind(item.remaining_stock)
        .bind(item.sale_window.start)
        .bind(item.sale_window.end)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to stage item"))?;

        tracing::info!(item_id = %item.id, initial_stock = item.remaining_stock, "Item staged");
        Ok(())
    }

    async fn load_item(&self, item: ItemId) -> Result<Option<Item>, StoreError> {
        let row: Option<ItemRow> = sqlx::query_as(
            "SELECT id, name, price_cents, remaining_stock, sale_start, sale_end FROM items WHERE id = $1",
        )
        .bind(item.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to load item"))?;

        Ok(row.map(Item::from))
    }

    async fn load_items(&self) -> Result<Vec<Item>, StoreError> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT id, name, price_cents, remaining_stock, sale_start, sale_end FROM items ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to load items"))?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn find_purchase(&self, user: UserId, item: ItemId) -> Result<Option<OrderId>, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT order_id FROM purchases WHERE user_id = $1 AND item_id = $2")
                .bind(user.0)
                .bind(item.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("Failed to load purchase"))?;

        Ok(row.map(|(id,)| OrderId(id)))
    }

    async fn commit(&self, user: UserId, item: ItemId) -> Result<CommitOutcome, StoreError> {
        if let Some(order_id) = self.find_purchase(user, item).await? {
            return Ok(CommitOutcome::AlreadyPurchased(order_id));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        let decremented: Option<(String, i64)> = sqlx::query_as(
            r"
            UPDATE items
            SET remaining_stock = remaining_stock - 1
            WHERE id = $1 AND remaining_stock > 0
            RETURNING name, price_cents
            ",
        )
        .bind(item.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("Failed to decrement stock"))?;

        let Some((item_name, price_cents)) = decremented else {
            tx.rollback().await.map_err(db_err("Failed to roll back"))?;
            return Ok(match self.load_item(item).await? {
                Some(_) => CommitOutcome::SoldOut,
                None => CommitOutcome::ItemMissing,
            });
        };

        let order: OrderRow = sqlx::query_as(&format!(
            r"
            INSERT INTO orders (user_id, item_id, item_name, price_cents, quantity, status)
            VALUES ($1, $2, $3, $4, 1, $5)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(user.0)
        .bind(item.0)
        .bind(&item_name)
        .bind(price_cents)
        .bind(OrderStatus::Unpaid.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to insert order"))?;

        let recorded = sqlx::query(
            r"
            INSERT INTO purchases (user_id, item_id, order_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, item_id) DO NOTHING
            ",
        )
        .bind(user.0)
        .bind(item.0)
        .bind(order.id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to insert purchase"))?;

        if recorded.rows_affected() == 0 {
            tx.rollback().await.map_err(db_err("Failed to roll back"))?;
            let existing = self.find_purchase(user, item).await?;
            tracing::info!(user_id = %user, item_id = %item, "Concurrent purchase already committed");
            return existing
                .map(CommitOutcome::AlreadyPurchased)
                .ok_or_else(|| StoreError::Corrupt {
                    key: format!("purchases:{user}:{item}"),
                    reason: "conflicting purchase row vanished".into(),
                });
        }

        tx.commit().await.map_err(db_err("Failed to commit purchase"))?;

        let order = Order::try_from(order)?;
        tracing::info!(
            order_id = %order.id,
            user_id = %user,
            item_id = %item,
            "Order committed"
        );
        Ok(CommitOutcome::Committed(order))
    }

    async fn load_order(&self, order: OrderId) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(order.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("Failed to load order"))?;

        row.map(Order::try_from).transpose()
    }

    async fn load_orders_for(&self, user: UserId) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to load orders"))?;

        rows.into_iter().map(Order::try_from).collect()
    }
}

impl InventoryStore for PostgresInventory {
    fn item(&self, item: ItemId) -> ProviderFuture<'_, Option<Item>> {
        Box::pin(self.load_item(item))
    }

    fn items(&self) -> ProviderFuture<'_, Vec<Item>> {
        Box::pin(self.load_items())
    }

    fn purchase_of(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, Option<OrderId>> {
        Box::pin(self.find_purchase(user, item))
    }

    fn commit_purchase(&self, user: UserId, item: ItemId) -> ProviderFuture<'_, CommitOutcome> {
        Box::pin(self.commit(user, item))
    }

    fn order(&self, order: OrderId) -> ProviderFuture<'_, Option<Order>> {
        Box::pin(self.load_order(order))
    }

    fn orders_for(&self, user: UserId) -> ProviderFuture<'_, Vec<Order>> {
        Box::pin(self.load_orders_for(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_order_status_is_corrupt() {
        let row = OrderRow {
            id: 7,
            user_id: 1,
            item_id: 2,
            item_name: "Flash item".into(),
            price_cents: 100,
            quantity: 1,
            status: "refunded".into(),
            created_at: Utc::now(),
            paid_at: None,
        };

        assert!(matches!(
            Order::try_from(row),
            Err(StoreError::Corrupt { key, .. }) if key == "orders:7"
        ));
    }
}
