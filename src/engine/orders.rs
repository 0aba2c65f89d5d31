//! Order placement and menu management.
//!
//! An order is validated against the menu, persisted, then handed to the
//! factory. The persisted order stays in place when the factory refuses or
//! cannot be reached; the caller gets a failure response that still carries
//! the factory's report URL when one was returned.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::api::metrics::{record_fulfillment, record_order_placed};
use crate::db::{self, MenuItem, NewMenuItem, Order, OrderItemSnapshot, Role};
use crate::factory::{FactoryClient, FactoryDiner, FactoryOrderRequest, FulfillmentOutcome};
use crate::DbPool;

use super::error::{EngineError, EngineResult};
use super::session::{authorize, Identity};

/// One requested pizza. Description and price sent by the client are
/// ignored; the menu is the source of truth for both.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub menu_id: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub franchise_id: i64,
    pub store_id: i64,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
}

/// Result of placing an order. In both cases the order has been stored.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderPlacement {
    Fulfilled {
        order: Order,
        jwt: String,
        report_url: Option<String>,
    },
    FulfillmentFailed {
        order: Order,
        message: String,
        report_url: Option<String>,
    },
}

impl OrderPlacement {
    pub fn order(&self) -> &Order {
        match self {
            OrderPlacement::Fulfilled { order, .. } => order,
            OrderPlacement::FulfillmentFailed { order, .. } => order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHistory {
    pub diner_id: i64,
    pub orders: Vec<Order>,
    pub page: i64,
    pub more: bool,
}

#[derive(Clone)]
pub struct OrderWorkflow {
    db: DbPool,
    factory: Arc<dyn FactoryClient>,
    page_size: i64,
}

impl OrderWorkflow {
    pub fn new(db: DbPool, factory: Arc<dyn FactoryClient>, page_size: i64) -> Self {
        Self {
            db,
            factory,
            page_size: page_size.max(1),
        }
    }

    pub async fn get_menu(&self) -> EngineResult<Vec<MenuItem>> {
        Ok(db::get_menu(&self.db).await?)
    }

    /// Add an item to the menu (admins only) and return the whole menu.
    pub async fn add_menu_item(
        &self,
        identity: &Identity,
        item: &NewMenuItem,
    ) -> EngineResult<Vec<MenuItem>> {
        authorize(identity, Role::Admin, "unable to add menu item")?;

        let title = item.title.trim();
        if title.is_empty() {
            return Err(EngineError::validation("title is required"));
        }
        let price = match item.price {
            Some(price) if price.is_finite() && price >= 0.0 => price,
            _ => return Err(EngineError::validation("price must be a non-negative number")),
        };

        let added = db::add_menu_item(&self.db, title, &item.description, &item.image, price).await?;
        info!(menu_id = added.id, title = %added.title, "Added menu item");

        self.get_menu().await
    }

    /// A page of the caller's own orders, newest first. `page` is 1-based.
    pub async fn get_orders(&self, identity: &Identity, page: Option<i64>) -> EngineResult<OrderHistory> {
        let page = page.unwrap_or(1).max(1);
        let result = db::get_orders(&self.db, identity.id, page, self.page_size).await?;
        Ok(OrderHistory {
            diner_id: identity.id,
            orders: result.orders,
            page,
            more: result.more,
        })
    }

    /// Validate, persist and fulfill an order for the authenticated diner.
    pub async fn place_order(
        &self,
        identity: &Identity,
        request: &PlaceOrderRequest,
    ) -> EngineResult<OrderPlacement> {
        if request.items.is_empty() {
            return Err(EngineError::validation("an order needs at least one item"));
        }

        let snapshots = self.snapshot_items(&request.items).await?;

        let started = Instant::now();
        let order = db::add_diner_order(
            &self.db,
            identity.id,
            request.franchise_id,
            request.store_id,
            &snapshots,
        )
        .await?;
        let latency = started.elapsed().as_secs_f64();

        record_order_placed(order.items.len(), order.total_price(), latency);
        info!(
            order_id = order.id,
            diner_id = identity.id,
            store_id = order.store_id,
            pizzas = order.items.len(),
            "Order stored"
        );

        let factory_request = FactoryOrderRequest {
            diner: FactoryDiner {
                id: identity.id,
                name: identity.name.clone(),
                email: identity.email.clone(),
            },
            order,
        };

        let started = Instant::now();
        let outcome = self.factory.submit_order(&factory_request).await;
        record_fulfillment(outcome.is_fulfilled(), started.elapsed().as_secs_f64());

        let order = factory_request.order;
        Ok(match outcome {
            FulfillmentOutcome::Fulfilled { jwt, report_url } => OrderPlacement::Fulfilled {
                order,
                jwt,
                report_url,
            },
            FulfillmentOutcome::Failed {
                status,
                message,
                report_url,
            } => {
                warn!(
                    order_id = order.id,
                    status = ?status,
                    reason = %message,
                    "Order stored but not fulfilled"
                );
                OrderPlacement::FulfillmentFailed {
                    order,
                    message,
                    report_url,
                }
            }
        })
    }

    /// Resolve every requested item against the menu. A single unknown id
    /// rejects the whole order.
    async fn snapshot_items(&self, items: &[OrderItemRequest]) -> EngineResult<Vec<OrderItemSnapshot>> {
        let mut ids: Vec<i64> = items.iter().map(|item| item.menu_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let menu: HashMap<i64, MenuItem> = db::find_menu_items(&self.db, &ids)
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        items
            .iter()
            .map(|item| {
                menu.get(&item.menu_id)
                    .map(|entry| OrderItemSnapshot {
                        menu_id: entry.id,
                        description: entry.description.clone(),
                        price: entry.price,
                    })
                    .ok_or_else(|| EngineError::not_found("No ID found"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{add_menu_item, add_user, count_orders, init_in_memory, RoleAssignment};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Factory double that answers with a fixed outcome and records requests.
    struct ScriptedFactory {
        outcome: FulfillmentOutcome,
        seen: Mutex<Vec<FactoryOrderRequest>>,
    }

    impl ScriptedFactory {
        fn new(outcome: FulfillmentOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl FactoryClient for ScriptedFactory {
        async fn submit_order(&self, request: &FactoryOrderRequest) -> FulfillmentOutcome {
            self.seen.lock().unwrap().push(request.clone());
            self.outcome.clone()
        }
    }

    fn fulfilled() -> FulfillmentOutcome {
        FulfillmentOutcome::Fulfilled {
            jwt: "factory-jwt".to_string(),
            report_url: Some("http://factory/report/1".to_string()),
        }
    }

    async fn setup(outcome: FulfillmentOutcome) -> (OrderWorkflow, Arc<ScriptedFactory>, Identity, DbPool) {
        let pool = init_in_memory().await.unwrap();
        let user = add_user(&pool, "Diner", "d@x.com", "h", &[RoleAssignment::diner()])
            .await
            .unwrap();
        let factory = ScriptedFactory::new(outcome);
        let workflow = OrderWorkflow::new(pool.clone(), factory.clone(), 10);
        let identity = Identity {
            id: user.id,
            name: user.name,
            email: user.email,
            roles: user.roles,
        };
        (workflow, factory, identity, pool)
    }

    fn request(menu_ids: &[i64]) -> PlaceOrderRequest {
        PlaceOrderRequest {
            franchise_id: 1,
            store_id: 1,
            items: menu_ids
                .iter()
                .map(|id| OrderItemRequest {
                    menu_id: *id,
                    description: Some("client says".to_string()),
                    price: Some(100.0),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_place_order_snapshots_menu_prices() {
        let (workflow, factory, diner, pool) = setup(fulfilled()).await;
        let veggie = add_menu_item(&pool, "Veggie", "A garden of delight", "p.png", 0.0038)
            .await
            .unwrap();

        let placement = workflow.place_order(&diner, &request(&[veggie.id, veggie.id])).await.unwrap();
        let OrderPlacement::Fulfilled { order, jwt, report_url } = placement else {
            panic!("expected a fulfilled order");
        };
        assert_eq!(jwt, "factory-jwt");
        assert_eq!(report_url.as_deref(), Some("http://factory/report/1"));
        assert_eq!(order.items.len(), 2);
        assert!(order.items.iter().all(|i| i.price == 0.0038 && i.description == "A garden of delight"));

        let seen = factory.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].diner.email, "d@x.com");
        assert_eq!(seen[0].order, order);
    }

    #[tokio::test]
    async fn test_unknown_menu_item_stores_nothing() {
        let (workflow, factory, diner, pool) = setup(fulfilled()).await;
        let veggie = add_menu_item(&pool, "Veggie", "d", "p.png", 0.0038).await.unwrap();

        let err = workflow
            .place_order(&diner, &request(&[veggie.id, veggie.id + 1000]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(m) if m == "No ID found"));
        assert_eq!(count_orders(&pool, diner.id).await.unwrap(), 0);
        assert!(factory.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_order_is_rejected() {
        let (workflow, _, diner, _) = setup(fulfilled()).await;
        let err = workflow.place_order(&diner, &request(&[])).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_failed_fulfillment_keeps_order() {
        let (workflow, _, diner, pool) = setup(FulfillmentOutcome::Failed {
            status: Some(500),
            message: "oven on fire".to_string(),
            report_url: Some("http://factory/report/2".to_string()),
        })
        .await;
        let veggie = add_menu_item(&pool, "Veggie", "d", "p.png", 0.0038).await.unwrap();

        let placement = workflow.place_order(&diner, &request(&[veggie.id])).await.unwrap();
        let OrderPlacement::FulfillmentFailed { report_url, .. } = &placement else {
            panic!("expected a failed fulfillment");
        };
        assert_eq!(report_url.as_deref(), Some("http://factory/report/2"));
        assert_eq!(count_orders(&pool, diner.id).await.unwrap(), 1);
        assert_eq!(placement.order().items.len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_skips_factory() {
        let (workflow, factory, diner, pool) = setup(fulfilled()).await;
        pool.close().await;

        let err = workflow.place_order(&diner, &request(&[1])).await.unwrap_err();
        assert!(matches!(err, EngineError::Database(_)));
        assert!(factory.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_history_is_per_diner() {
        let (workflow, _, diner, pool) = setup(fulfilled()).await;
        let veggie = add_menu_item(&pool, "Veggie", "d", "p.png", 0.0038).await.unwrap();
        workflow.place_order(&diner, &request(&[veggie.id])).await.unwrap();

        let history = workflow.get_orders(&diner, None).await.unwrap();
        assert_eq!(history.diner_id, diner.id);
        assert_eq!(history.page, 1);
        assert_eq!(history.orders.len(), 1);

        let other = Identity { id: diner.id + 1, ..diner.clone() };
        assert!(workflow.get_orders(&other, Some(1)).await.unwrap().orders.is_empty());
    }

    #[tokio::test]
    async fn test_add_menu_item_requires_admin() {
        let (workflow, _, diner, _) = setup(fulfilled()).await;
        let item = NewMenuItem {
            title: "Student".to_string(),
            description: "No topping, no sauce, just carbs".to_string(),
            image: "pizza9.png".to_string(),
            price: Some(0.0001),
        };

        let err = workflow.add_menu_item(&diner, &item).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(m) if m == "unable to add menu item"));

        let admin = Identity {
            roles: vec![RoleAssignment::admin()],
            ..diner
        };
        let menu = workflow.add_menu_item(&admin, &item).await.unwrap();
        assert_eq!(menu.len(), 1);

        let priceless = NewMenuItem { price: None, ..item };
        assert!(matches!(
            workflow.add_menu_item(&admin, &priceless).await.unwrap_err(),
            EngineError::Validation(_)
        ));
    }
}
