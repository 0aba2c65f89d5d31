//! Diner orders and their item snapshots.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub menu_id: i64,
    pub description: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub franchise_id: i64,
    pub store_id: i64,
    pub date: String,
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn total_price(&self) -> f64 {
        self.items.iter().map(|item| item.price).sum()
    }
}

/// Item copied from the menu at order time.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItemSnapshot {
    pub menu_id: i64,
    pub description: String,
    pub price: f64,
}

#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: i64,
    franchise_id: i64,
    store_id: i64,
    date: String,
}

/// One page of a diner's order history.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub more: bool,
}

/// Persist an order header and its item snapshots in a single transaction.
pub async fn add_diner_order(
    pool: &SqlitePool,
    diner_id: i64,
    franchise_id: i64,
    store_id: i64,
    items: &[OrderItemSnapshot],
) -> Result<Order, sqlx::Error> {
    let date = chrono::Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;

    let order_id = sqlx::query(
        "INSERT INTO diner_order (diner_id, franchise_id, store_id, date) VALUES (?, ?, ?, ?)",
    )
    .bind(diner_id)
    .bind(franchise_id)
    .bind(store_id)
    .bind(&date)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let mut stored = Vec::with_capacity(items.len());
    for item in items {
        let id = sqlx::query(
            "INSERT INTO order_item (order_id, menu_id, description, price) VALUES (?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(item.menu_id)
        .bind(&item.description)
        .bind(item.price)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        stored.push(OrderItem {
            id,
            menu_id: item.menu_id,
            description: item.description.clone(),
            price: item.price,
        });
    }

    tx.commit().await?;

    Ok(Order {
        id: order_id,
        franchise_id,
        store_id,
        date,
        items: stored,
    })
}

async fn order_items(
    conn: &mut SqliteConnection,
    order_id: i64,
) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as::<_, OrderItem>(
        "SELECT id, menu_id, description, price FROM order_item WHERE order_id = ? ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await
}

/// Orders of a diner, newest first. `page` is 1-based.
pub async fn get_orders(
    pool: &SqlitePool,
    diner_id: i64,
    page: i64,
    page_size: i64,
) -> Result<OrderPage, sqlx::Error> {
    let page_size = page_size.max(1);
    let offset = (page.max(1) - 1).saturating_mul(page_size);
    let mut conn = pool.acquire().await?;

    // One extra row tells whether another page exists
    let mut rows = sqlx::query_as::<_, OrderRow>(
        r#"
        SELECT id, franchise_id, store_id, date FROM diner_order
        WHERE diner_id = ?
        ORDER BY id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(diner_id)
    .bind(page_size.saturating_add(1))
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    let more = rows.len() as i64 > page_size;
    rows.truncate(page_size as usize);

    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let items = order_items(&mut conn, row.id).await?;
        orders.push(Order {
            id: row.id,
            franchise_id: row.franchise_id,
            store_id: row.store_id,
            date: row.date,
            items,
        });
    }

    Ok(OrderPage { orders, more })
}

/// Number of orders stored for a diner.
pub async fn count_orders(pool: &SqlitePool, diner_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM diner_order WHERE diner_id = ?")
        .bind(diner_id)
        .fetch_one(pool)
        .await
}
