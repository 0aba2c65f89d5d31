pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod factory;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::engine::{FranchiseManager, OrderWorkflow, SessionManager, TokenKeys};
use crate::factory::FactoryClient;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub sessions: SessionManager,
    pub orders: OrderWorkflow,
    pub franchises: FranchiseManager,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, factory: Arc<dyn FactoryClient>) -> Self {
        let keys = TokenKeys::new(&config.auth.signing_secret(), config.auth.token_ttl_hours);
        let sessions = SessionManager::new(db.clone(), keys);
        let orders = OrderWorkflow::new(db.clone(), factory, config.orders.page_size);
        let franchises = FranchiseManager::new(db.clone());
        Self {
            config,
            db,
            sessions,
            orders,
            franchises,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
