use axum::{
    async_trait,
    body::Body,
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequestParts, Path, State,
    },
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::User;
use crate::engine::{AuthResponse, AuthState, Identity};
use crate::AppState;

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// The bearer token from the `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware that authenticates every request and attaches the resulting
/// [`AuthState`]. It never rejects; handlers decide what they require.
pub async fn set_auth_user(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth = state.sessions.authenticate(bearer_token(request.headers())).await;
    request.extensions_mut().insert(auth);
    next.run(request).await
}

/// Extractor for routes that require an authenticated caller.
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthState>() {
            Some(AuthState::Authenticated(identity)) => Ok(AuthUser(identity.clone())),
            _ => Err(ApiError::unauthorized()),
        }
    }
}

/// Extractor for routes that behave differently for authenticated callers.
pub struct OptionalAuth(pub Option<Identity>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(
            parts
                .extensions
                .get::<AuthState>()
                .and_then(AuthState::identity)
                .cloned(),
        ))
    }
}

/// POST /api/auth
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(request) = payload?;
    let response = state
        .sessions
        .register(
            request.name.as_deref(),
            request.email.as_deref(),
            request.password.as_deref(),
        )
        .await?;
    Ok(Json(response))
}

/// PUT /api/auth
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(request) = payload?;
    let response = state
        .sessions
        .login(request.email.as_deref(), request.password.as_deref())
        .await?;
    Ok(Json(response))
}

/// DELETE /api/auth
pub async fn logout(
    State(state): State<Arc<AppState>>,
    AuthUser(_identity): AuthUser,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    state.sessions.logout(bearer_token(&headers)).await?;
    Ok(Json(MessageResponse {
        message: "logout successful",
    }))
}

/// PUT /api/auth/:userId
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Path(user_id) = path?;
    let Json(request) = payload?;
    let user = state
        .sessions
        .update_user(
            &identity,
            user_id,
            request.email.as_deref(),
            request.password.as_deref(),
        )
        .await?;
    Ok(Json(user))
}

/// GET /api/user/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.sessions.me(&identity).await?))
}
