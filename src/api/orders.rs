use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{MenuItem, NewMenuItem, Order};
use crate::engine::{OrderHistory, OrderPlacement, PlaceOrderRequest};
use crate::AppState;

use super::auth::AuthUser;
use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub page: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order: Order,
    pub jwt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
}

/// GET /api/order/menu
pub async fn get_menu(State(state): State<Arc<AppState>>) -> Result<Json<Vec<MenuItem>>, ApiError> {
    Ok(Json(state.orders.get_menu().await?))
}

/// PUT /api/order/menu
pub async fn add_menu_item(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<NewMenuItem>, JsonRejection>,
) -> Result<Json<Vec<MenuItem>>, ApiError> {
    let Json(item) = payload?;
    Ok(Json(state.orders.add_menu_item(&identity, &item).await?))
}

/// GET /api/order?page=
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    query: Result<Query<OrdersQuery>, QueryRejection>,
) -> Result<Json<OrderHistory>, ApiError> {
    let Query(query) = query?;
    Ok(Json(state.orders.get_orders(&identity, query.page).await?))
}

/// POST /api/order
///
/// The order is stored before the factory is called; a factory failure
/// answers 500 but leaves the stored order in place.
pub async fn place_order(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(request) = payload?;
    match state.orders.place_order(&identity, &request).await? {
        OrderPlacement::Fulfilled {
            order,
            jwt,
            report_url,
        } => Ok(Json(OrderResponse {
            order,
            jwt,
            report_url,
        })),
        OrderPlacement::FulfillmentFailed { report_url, .. } => {
            Err(ApiError::internal("Failed to fulfill order at factory").with_report_url(report_url))
        }
    }
}
