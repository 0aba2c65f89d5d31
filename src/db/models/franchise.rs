//! Franchises, their stores, and the franchisee role assignments that tie
//! users to them.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::user::{add_role, RoleAssignment};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FranchiseAdmin {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_revenue: Option<f64>,
}

/// A franchise as returned to clients. `admins` is only filled in for
/// callers allowed to see who runs the franchise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Franchise {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admins: Option<Vec<FranchiseAdmin>>,
    pub stores: Vec<StoreSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: i64,
    pub franchise_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FranchiseRow {
    pub id: i64,
    pub name: String,
}

/// Franchises whose name matches a LIKE pattern, ordered by id.
/// Returns the requested window plus whether more rows follow it.
pub async fn list_franchises(
    pool: &SqlitePool,
    name_pattern: &str,
    offset: i64,
    limit: i64,
) -> Result<(Vec<FranchiseRow>, bool), sqlx::Error> {
    let limit = limit.max(1);
    let mut rows = sqlx::query_as::<_, FranchiseRow>(
        "SELECT id, name FROM franchise WHERE name LIKE ? ORDER BY id LIMIT ? OFFSET ?",
    )
    .bind(name_pattern)
    .bind(limit + 1)
    .bind(offset.max(0))
    .fetch_all(pool)
    .await?;

    let more = rows.len() as i64 > limit;
    rows.truncate(limit as usize);
    Ok((rows, more))
}

pub async fn get_franchise(
    pool: &SqlitePool,
    franchise_id: i64,
) -> Result<Option<FranchiseRow>, sqlx::Error> {
    sqlx::query_as::<_, FranchiseRow>("SELECT id, name FROM franchise WHERE id = ?")
        .bind(franchise_id)
        .fetch_optional(pool)
        .await
}

/// Ids of the franchises a user holds a franchisee role for.
pub async fn franchise_ids_for_user(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT DISTINCT object_id FROM user_role WHERE user_id = ? AND role = 'franchisee' ORDER BY object_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Whether `user_id` currently holds the franchisee role for the franchise.
pub async fn is_franchise_admin(
    pool: &SqlitePool,
    franchise_id: i64,
    user_id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM user_role WHERE user_id = ? AND role = 'franchisee' AND object_id = ?)",
    )
    .bind(user_id)
    .bind(franchise_id)
    .fetch_one(pool)
    .await
}

pub async fn franchise_admins(
    pool: &SqlitePool,
    franchise_id: i64,
) -> Result<Vec<FranchiseAdmin>, sqlx::Error> {
    sqlx::query_as::<_, FranchiseAdmin>(
        r#"
        SELECT u.id, u.name, u.email FROM user_role ur
        INNER JOIN user u ON ur.user_id = u.id
        WHERE ur.role = 'franchisee' AND ur.object_id = ?
        ORDER BY u.id
        "#,
    )
    .bind(franchise_id)
    .fetch_all(pool)
    .await
}

/// Stores of a franchise, with revenue summed over their orders when requested.
pub async fn franchise_stores(
    pool: &SqlitePool,
    franchise_id: i64,
    with_revenue: bool,
) -> Result<Vec<StoreSummary>, sqlx::Error> {
    if with_revenue {
        sqlx::query_as::<_, StoreSummary>(
            r#"
            SELECT s.id, s.name,
                   CAST(COALESCE(SUM(oi.price), 0) AS REAL) AS total_revenue
            FROM store s
            LEFT JOIN diner_order o ON o.store_id = s.id AND o.franchise_id = s.franchise_id
            LEFT JOIN order_item oi ON oi.order_id = o.id
            WHERE s.franchise_id = ?
            GROUP BY s.id, s.name
            ORDER BY s.id
            "#,
        )
        .bind(franchise_id)
        .fetch_all(pool)
        .await
    } else {
        sqlx::query_as::<_, StoreSummary>(
            "SELECT id, name, NULL AS total_revenue FROM store WHERE franchise_id = ? ORDER BY id",
        )
        .bind(franchise_id)
        .fetch_all(pool)
        .await
    }
}

/// Create a franchise and grant each admin a franchisee role scoped to it.
pub async fn create_franchise(
    pool: &SqlitePool,
    name: &str,
    admin_ids: &[i64],
) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let franchise_id = sqlx::query("INSERT INTO franchise (name) VALUES (?)")
        .bind(name)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    for admin_id in admin_ids {
        add_role(&mut tx, *admin_id, &RoleAssignment::franchisee(franchise_id)).await?;
    }

    tx.commit().await?;
    Ok(franchise_id)
}

/// Delete a franchise with its stores and franchisee roles. Either every
/// statement takes effect or none does.
pub async fn delete_franchise(pool: &SqlitePool, franchise_id: i64) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM store WHERE franchise_id = ?")
        .bind(franchise_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM user_role WHERE role = 'franchisee' AND object_id = ?")
        .bind(franchise_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM franchise WHERE id = ?")
        .bind(franchise_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn create_store(
    pool: &SqlitePool,
    franchise_id: i64,
    name: &str,
) -> Result<Store, sqlx::Error> {
    let id = sqlx::query("INSERT INTO store (franchise_id, name) VALUES (?, ?)")
        .bind(franchise_id)
        .bind(name)
        .execute(pool)
        .await?
        .last_insert_rowid();

    Ok(Store {
        id,
        franchise_id,
        name: name.to_string(),
    })
}

/// Returns whether a store was removed.
pub async fn delete_store(
    pool: &SqlitePool,
    franchise_id: i64,
    store_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM store WHERE franchise_id = ? AND id = ?")
        .bind(franchise_id)
        .bind(store_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{add_diner_order, add_user, get_user, init_in_memory, OrderItemSnapshot};

    #[tokio::test]
    async fn test_create_franchise_grants_roles() {
        let pool = init_in_memory().await.unwrap();
        let owner = add_user(&pool, "O", "o@x.com", "h", &[RoleAssignment::diner()])
            .await
            .unwrap();

        let id = create_franchise(&pool, "pizzaPocket", &[owner.id]).await.unwrap();

        let roles = get_user(&pool, owner.id).await.unwrap().unwrap().roles;
        assert!(roles.contains(&RoleAssignment::franchisee(id)));
        assert_eq!(franchise_ids_for_user(&pool, owner.id).await.unwrap(), vec![id]);
        assert!(is_franchise_admin(&pool, id, owner.id).await.unwrap());
        assert!(!is_franchise_admin(&pool, id + 1, owner.id).await.unwrap());
        assert_eq!(franchise_admins(&pool, id).await.unwrap()[0].email, "o@x.com");
    }

    #[tokio::test]
    async fn test_store_revenue() {
        let pool = init_in_memory().await.unwrap();
        let diner = add_user(&pool, "D", "d@x.com", "h", &[RoleAssignment::diner()])
            .await
            .unwrap();
        let franchise_id = create_franchise(&pool, "f", &[]).await.unwrap();
        let busy = create_store(&pool, franchise_id, "SLC").await.unwrap();
        let idle = create_store(&pool, franchise_id, "Provo").await.unwrap();

        let item = OrderItemSnapshot {
            menu_id: 1,
            description: "Veggie".to_string(),
            price: 0.05,
        };
        add_diner_order(&pool, diner.id, franchise_id, busy.id, &[item.clone(), item])
            .await
            .unwrap();

        let stores = franchise_stores(&pool, franchise_id, true).await.unwrap();
        assert_eq!(stores.len(), 2);
        assert!((stores[0].total_revenue.unwrap() - 0.10).abs() < 1e-9);
        assert_eq!(stores[1].id, idle.id);
        assert_eq!(stores[1].total_revenue, Some(0.0));

        let public = franchise_stores(&pool, franchise_id, false).await.unwrap();
        assert!(public.iter().all(|s| s.total_revenue.is_none()));
    }

    #[tokio::test]
    async fn test_delete_franchise_cascades() {
        let pool = init_in_memory().await.unwrap();
        let owner = add_user(&pool, "O", "o@x.com", "h", &[RoleAssignment::diner()])
            .await
            .unwrap();
        let id = create_franchise(&pool, "gone", &[owner.id]).await.unwrap();
        create_store(&pool, id, "s").await.unwrap();

        delete_franchise(&pool, id).await.unwrap();

        assert!(get_franchise(&pool, id).await.unwrap().is_none());
        assert!(franchise_stores(&pool, id, false).await.unwrap().is_empty());
        assert_eq!(
            get_user(&pool, owner.id).await.unwrap().unwrap().roles,
            vec![RoleAssignment::diner()]
        );
    }

    #[tokio::test]
    async fn test_delete_franchise_rolls_back_on_failure() {
        let pool = init_in_memory().await.unwrap();
        let id = create_franchise(&pool, "sticky", &[]).await.unwrap();
        create_store(&pool, id, "s").await.unwrap();

        sqlx::query(
            "CREATE TRIGGER block_store_delete BEFORE DELETE ON store BEGIN SELECT RAISE(ABORT, 'blocked'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        assert!(delete_franchise(&pool, id).await.is_err());
        assert!(get_franchise(&pool, id).await.unwrap().is_some());
        assert_eq!(franchise_stores(&pool, id, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_franchises_pages_and_filters() {
        let pool = init_in_memory().await.unwrap();
        for name in ["alpha", "beta", "alphabet"] {
            create_franchise(&pool, name, &[]).await.unwrap();
        }

        let (rows, more) = list_franchises(&pool, "%", 0, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(more);

        let (rows, more) = list_franchises(&pool, "alpha%", 0, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!more);
    }
}
