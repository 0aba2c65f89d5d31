//! Franchise and store administration.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::db::{self, Franchise, FranchiseRow, Role, Store};
use crate::DbPool;

use super::error::{EngineError, EngineResult};
use super::session::{authorize, has_role, Identity};

#[derive(Debug, Clone, Deserialize)]
pub struct AdminEmail {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFranchiseRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub admins: Vec<AdminEmail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateStoreRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FranchiseQuery {
    /// Zero-based page
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Name filter, `*` matches any run of characters
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FranchiseList {
    pub franchises: Vec<Franchise>,
    pub more: bool,
}

const DEFAULT_LIST_LIMIT: i64 = 10;
const MAX_LIST_LIMIT: i64 = 100;

/// Translate a `*` wildcard filter into a LIKE pattern.
fn like_pattern(filter: Option<&str>) -> String {
    match filter.map(str::trim).filter(|f| !f.is_empty()) {
        Some(filter) => filter.replace('*', "%"),
        None => "%".to_string(),
    }
}

#[derive(Clone)]
pub struct FranchiseManager {
    db: DbPool,
}

impl FranchiseManager {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Build the client view of a franchise. Admin details and store revenue
    /// are only included when `detailed` is set.
    async fn view(&self, row: FranchiseRow, detailed: bool) -> EngineResult<Franchise> {
        let admins = if detailed {
            Some(db::franchise_admins(&self.db, row.id).await?)
        } else {
            None
        };
        let stores = db::franchise_stores(&self.db, row.id, detailed).await?;
        Ok(Franchise {
            id: row.id,
            name: row.name,
            admins,
            stores,
        })
    }

    /// List franchises. Admins see admins and revenue; everyone else sees
    /// names and stores.
    pub async fn list_franchises(
        &self,
        identity: Option<&Identity>,
        query: &FranchiseQuery,
    ) -> EngineResult<FranchiseList> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        let offset = query.page.unwrap_or(0).max(0).saturating_mul(limit);
        let pattern = like_pattern(query.name.as_deref());

        let (rows, more) = db::list_franchises(&self.db, &pattern, offset, limit).await?;

        let detailed = identity.is_some_and(|i| has_role(i, Role::Admin));
        let mut franchises = Vec::with_capacity(rows.len());
        for row in rows {
            franchises.push(self.view(row, detailed).await?);
        }

        Ok(FranchiseList { franchises, more })
    }

    /// Franchises run by `user_id`, with full detail. Only the user themself
    /// or an admin gets an answer; anyone else gets an empty list.
    pub async fn list_user_franchises(
        &self,
        identity: &Identity,
        user_id: i64,
    ) -> EngineResult<Vec<Franchise>> {
        if identity.id != user_id && !has_role(identity, Role::Admin) {
            return Ok(Vec::new());
        }

        let mut franchises = Vec::new();
        for franchise_id in db::franchise_ids_for_user(&self.db, user_id).await? {
            if let Some(row) = db::get_franchise(&self.db, franchise_id).await? {
                franchises.push(self.view(row, true).await?);
            }
        }
        Ok(franchises)
    }

    pub async fn create_franchise(
        &self,
        identity: &Identity,
        request: &CreateFranchiseRequest,
    ) -> EngineResult<Franchise> {
        authorize(identity, Role::Admin, "unable to create a franchise")?;

        let name = request.name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("franchise name is required"));
        }

        let emails: Vec<String> = request.admins.iter().map(|a| a.email.trim().to_string()).collect();
        let mut admin_ids = Vec::with_capacity(emails.len());
        for (email, id) in db::find_user_ids_by_email(&self.db, &emails).await? {
            match id {
                Some(id) => admin_ids.push(id),
                None => {
                    return Err(EngineError::not_found(format!(
                        "unknown user for franchise admin {} provided",
                        email
                    )))
                }
            }
        }

        let franchise_id = db::create_franchise(&self.db, name, &admin_ids)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    EngineError::Conflict("franchise already exists".to_string())
                }
                _ => EngineError::Database(e),
            })?;
        info!(franchise_id, franchise_name = name, acting_user = identity.id, "Created franchise");

        let row = FranchiseRow {
            id: franchise_id,
            name: name.to_string(),
        };
        self.view(row, true).await
    }

    /// Delete a franchise together with its stores and franchisee roles.
    pub async fn delete_franchise(&self, identity: &Identity, franchise_id: i64) -> EngineResult<()> {
        authorize(identity, Role::Admin, "unable to delete a franchise")?;

        db::delete_franchise(&self.db, franchise_id).await.map_err(|e| {
            error!(franchise_id, error = %e, "Franchise delete rolled back");
            EngineError::internal("unable to delete franchise")
        })?;

        info!(franchise_id, acting_user = identity.id, "Deleted franchise");
        Ok(())
    }

    /// Admins manage any franchise. Franchisee membership is read from the
    /// store rather than the token, so it matches what the listings show.
    async fn can_manage_stores(&self, identity: &Identity, franchise_id: i64) -> EngineResult<bool> {
        if has_role(identity, Role::Admin) {
            return Ok(true);
        }
        Ok(db::is_franchise_admin(&self.db, franchise_id, identity.id).await?)
    }

    pub async fn create_store(
        &self,
        identity: &Identity,
        franchise_id: i64,
        request: &CreateStoreRequest,
    ) -> EngineResult<Store> {
        if !self.can_manage_stores(identity, franchise_id).await? {
            return Err(EngineError::forbidden("unable to create a store"));
        }

        let name = request.name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("store name is required"));
        }

        if db::get_franchise(&self.db, franchise_id).await?.is_none() {
            return Err(EngineError::not_found("unknown franchise"));
        }

        let store = db::create_store(&self.db, franchise_id, name).await?;
        info!(franchise_id, store_id = store.id, "Created store");
        Ok(store)
    }

    pub async fn delete_store(
        &self,
        identity: &Identity,
        franchise_id: i64,
        store_id: i64,
    ) -> EngineResult<()> {
        if !self.can_manage_stores(identity, franchise_id).await? {
            return Err(EngineError::forbidden("unable to delete a store"));
        }

        let removed = db::delete_store(&self.db, franchise_id, store_id).await?;
        info!(franchise_id, store_id, removed, "Delete store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{add_user, init_in_memory, RoleAssignment};

    fn identity(id: i64, roles: Vec<RoleAssignment>) -> Identity {
        Identity {
            id,
            name: "n".to_string(),
            email: format!("{}@x.com", id),
            roles,
        }
    }

    fn admin() -> Identity {
        identity(1000, vec![RoleAssignment::admin()])
    }

    fn create_request(name: &str, admins: &[&str]) -> CreateFranchiseRequest {
        CreateFranchiseRequest {
            name: name.to_string(),
            admins: admins
                .iter()
                .map(|e| AdminEmail { email: e.to_string() })
                .collect(),
        }
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(like_pattern(None), "%");
        assert_eq!(like_pattern(Some("")), "%");
        assert_eq!(like_pattern(Some("pizza*")), "pizza%");
        assert_eq!(like_pattern(Some("*pocket*")), "%pocket%");
    }

    #[tokio::test]
    async fn test_create_franchise_requires_admin() {
        let manager = FranchiseManager::new(init_in_memory().await.unwrap());
        let diner = identity(1, vec![RoleAssignment::diner()]);

        let err = manager
            .create_franchise(&diner, &create_request("f", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(m) if m == "unable to create a franchise"));
    }

    #[tokio::test]
    async fn test_create_franchise_with_unknown_admin() {
        let manager = FranchiseManager::new(init_in_memory().await.unwrap());
        let err = manager
            .create_franchise(&admin(), &create_request("f", &["ghost@x.com"]))
            .await
            .unwrap_err();
        assert!(
            matches!(err, EngineError::NotFound(m) if m == "unknown user for franchise admin ghost@x.com provided")
        );
    }

    #[tokio::test]
    async fn test_franchisee_lifecycle() {
        let pool = init_in_memory().await.unwrap();
        let manager = FranchiseManager::new(pool.clone());
        let owner = add_user(&pool, "O", "o@x.com", "h", &[RoleAssignment::diner()])
            .await
            .unwrap();

        let franchise = manager
            .create_franchise(&admin(), &create_request("pizzaPocket", &["o@x.com"]))
            .await
            .unwrap();
        assert_eq!(franchise.admins.as_ref().unwrap()[0].id, owner.id);

        // Roles as they were before the franchise existed
        let owner_identity = identity(owner.id, vec![RoleAssignment::diner()]);
        let store = manager
            .create_store(&owner_identity, franchise.id, &CreateStoreRequest { name: "SLC".to_string() })
            .await
            .unwrap();

        let mine = manager.list_user_franchises(&owner_identity, owner.id).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].stores[0].id, store.id);
        assert_eq!(mine[0].stores[0].total_revenue, Some(0.0));

        let stranger = identity(owner.id + 1, vec![RoleAssignment::diner()]);
        assert!(manager.list_user_franchises(&stranger, owner.id).await.unwrap().is_empty());
        let err = manager
            .delete_store(&stranger, franchise.id, store.id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(m) if m == "unable to delete a store"));

        manager.delete_store(&owner_identity, franchise.id, store.id).await.unwrap();
        manager.delete_franchise(&admin(), franchise.id).await.unwrap();
        assert!(manager.list_user_franchises(&owner_identity, owner.id).await.unwrap().is_empty());
        let err = manager
            .create_store(&owner_identity, franchise.id, &CreateStoreRequest { name: "SLC".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_list_views_depend_on_role() {
        let pool = init_in_memory().await.unwrap();
        let manager = FranchiseManager::new(pool.clone());
        add_user(&pool, "O", "o@x.com", "h", &[RoleAssignment::diner()])
            .await
            .unwrap();
        let franchise = manager
            .create_franchise(&admin(), &create_request("pizzaPocket", &["o@x.com"]))
            .await
            .unwrap();
        manager
            .create_store(&admin(), franchise.id, &CreateStoreRequest { name: "SLC".to_string() })
            .await
            .unwrap();

        let query = FranchiseQuery::default();
        let public = manager.list_franchises(None, &query).await.unwrap();
        assert!(public.franchises[0].admins.is_none());
        assert!(public.franchises[0].stores[0].total_revenue.is_none());

        let detailed = manager.list_franchises(Some(&admin()), &query).await.unwrap();
        assert_eq!(detailed.franchises[0].admins.as_ref().unwrap().len(), 1);
        assert!(detailed.franchises[0].stores[0].total_revenue.is_some());

        let filtered = FranchiseQuery {
            name: Some("nothing*".to_string()),
            ..FranchiseQuery::default()
        };
        assert!(manager.list_franchises(None, &filtered).await.unwrap().franchises.is_empty());
    }

    #[tokio::test]
    async fn test_create_store_for_unknown_franchise() {
        let manager = FranchiseManager::new(init_in_memory().await.unwrap());
        let err = manager
            .create_store(&admin(), 77, &CreateStoreRequest { name: "s".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
