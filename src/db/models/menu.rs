//! Menu items.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MenuItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub image: String,
    pub price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMenuItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    pub price: Option<f64>,
}

pub async fn get_menu(pool: &SqlitePool) -> Result<Vec<MenuItem>, sqlx::Error> {
    sqlx::query_as::<_, MenuItem>(
        "SELECT id, title, description, image, price FROM menu ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

pub async fn add_menu_item(
    pool: &SqlitePool,
    title: &str,
    description: &str,
    image: &str,
    price: f64,
) -> Result<MenuItem, sqlx::Error> {
    let id = sqlx::query("INSERT INTO menu (title, description, image, price) VALUES (?, ?, ?, ?)")
        .bind(title)
        .bind(description)
        .bind(image)
        .bind(price)
        .execute(pool)
        .await?
        .last_insert_rowid();

    Ok(MenuItem {
        id,
        title: title.to_string(),
        description: description.to_string(),
        image: image.to_string(),
        price,
    })
}

/// Menu items with the given ids. Ids that do not exist are simply absent
/// from the result.
pub async fn find_menu_items(
    pool: &SqlitePool,
    ids: &[i64],
) -> Result<Vec<MenuItem>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, title, description, image, price FROM menu WHERE id IN (",
    );
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    query.build_query_as::<MenuItem>().fetch_all(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory;

    #[tokio::test]
    async fn test_find_menu_items_skips_unknown_ids() {
        let pool = init_in_memory().await.unwrap();
        let veggie = add_menu_item(&pool, "Veggie", "A garden of delight", "pizza1.png", 0.0038)
            .await
            .unwrap();
        let pepperoni = add_menu_item(&pool, "Pepperoni", "Spicy treat", "pizza2.png", 0.0042)
            .await
            .unwrap();

        let mut found = find_menu_items(&pool, &[pepperoni.id, 404, veggie.id])
            .await
            .unwrap();
        found.sort_by_key(|item| item.id);
        assert_eq!(found, vec![veggie, pepperoni]);

        assert!(find_menu_items(&pool, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_menu_keeps_fractional_prices() {
        let pool = init_in_memory().await.unwrap();
        add_menu_item(&pool, "Student", "No topping", "pizza5.png", 0.0001)
            .await
            .unwrap();
        let menu = get_menu(&pool).await.unwrap();
        assert_eq!(menu.len(), 1);
        assert!((menu[0].price - 0.0001).abs() < f64::EPSILON);
    }
}
