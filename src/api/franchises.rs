use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use std::sync::Arc;

use crate::db::{Franchise, Store};
use crate::engine::{CreateFranchiseRequest, CreateStoreRequest, FranchiseList, FranchiseQuery};
use crate::AppState;

use super::auth::{AuthUser, MessageResponse, OptionalAuth};
use super::error::ApiError;

/// GET /api/franchise?page=&limit=&name=
pub async fn list_franchises(
    State(state): State<Arc<AppState>>,
    OptionalAuth(identity): OptionalAuth,
    query: Result<Query<FranchiseQuery>, QueryRejection>,
) -> Result<Json<FranchiseList>, ApiError> {
    let Query(query) = query?;
    let list = state
        .franchises
        .list_franchises(identity.as_ref(), &query)
        .await?;
    Ok(Json(list))
}

/// GET /api/franchise/:userId
pub async fn list_user_franchises(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<Franchise>>, ApiError> {
    let Path(user_id) = path?;
    let franchises = state
        .franchises
        .list_user_franchises(&identity, user_id)
        .await?;
    Ok(Json(franchises))
}

/// POST /api/franchise
pub async fn create_franchise(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<CreateFranchiseRequest>, JsonRejection>,
) -> Result<Json<Franchise>, ApiError> {
    let Json(request) = payload?;
    let franchise = state
        .franchises
        .create_franchise(&identity, &request)
        .await?;
    Ok(Json(franchise))
}

/// DELETE /api/franchise/:franchiseId
pub async fn delete_franchise(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(franchise_id) = path?;
    state
        .franchises
        .delete_franchise(&identity, franchise_id)
        .await?;
    Ok(Json(MessageResponse {
        message: "franchise deleted",
    }))
}

/// POST /api/franchise/:franchiseId/store
pub async fn create_store(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CreateStoreRequest>, JsonRejection>,
) -> Result<Json<Store>, ApiError> {
    let Path(franchise_id) = path?;
    let Json(request) = payload?;
    let store = state
        .franchises
        .create_store(&identity, franchise_id, &request)
        .await?;
    Ok(Json(store))
}

/// DELETE /api/franchise/:franchiseId/store/:storeId
pub async fn delete_store(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path((franchise_id, store_id)) = path?;
    state
        .franchises
        .delete_store(&identity, franchise_id, store_id)
        .await?;
    Ok(Json(MessageResponse {
        message: "store deleted",
    }))
}
