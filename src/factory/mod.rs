//! Pizza factory integration.
//!
//! The factory is the external fulfillment service that actually bakes an
//! order and hands back a tracking token plus a report URL.
//!
//! This module provides:
//! - The [`FactoryClient`] trait the order workflow depends on
//! - [`HttpFactoryClient`], the reqwest-backed implementation

pub mod client;

pub use client::HttpFactoryClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::Order;

/// The diner an order is baked for, as the factory sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoryDiner {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Body of `POST {factory}/api/order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoryOrderRequest {
    pub diner: FactoryDiner,
    pub order: Order,
}

/// Result of asking the factory to fulfill an order.
#[derive(Debug, Clone, PartialEq)]
pub enum FulfillmentOutcome {
    Fulfilled {
        /// Opaque tracking credential issued by the factory
        jwt: String,
        report_url: Option<String>,
    },
    Failed {
        /// HTTP status of the factory response, `None` if none arrived
        status: Option<u16>,
        message: String,
        report_url: Option<String>,
    },
}

impl FulfillmentOutcome {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, FulfillmentOutcome::Fulfilled { .. })
    }
}

#[async_trait]
pub trait FactoryClient: Send + Sync {
    /// Submit an order for fulfillment. Transport failures, timeouts and
    /// rejections all come back as [`FulfillmentOutcome::Failed`].
    async fn submit_order(&self, request: &FactoryOrderRequest) -> FulfillmentOutcome;
}
