pub mod auth;
pub mod error;
mod franchises;
pub mod metrics;
mod orders;

use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route(
            "/",
            post(auth::register).put(auth::login).delete(auth::logout),
        )
        .route("/:user_id", put(auth::update_user));

    let user_routes = Router::new().route("/me", get(auth::me));

    let order_routes = Router::new()
        .route("/", get(orders::list_orders).post(orders::place_order))
        .route("/menu", get(orders::get_menu).put(orders::add_menu_item));

    let franchise_routes = Router::new()
        .route(
            "/",
            get(franchises::list_franchises).post(franchises::create_franchise),
        )
        .route(
            "/:id",
            get(franchises::list_user_franchises).delete(franchises::delete_franchise),
        )
        .route("/:id/store", post(franchises::create_store))
        .route("/:id/store/:store_id", delete(franchises::delete_store));

    // Every API route sees the caller's AuthState; handlers decide what they require
    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/user", user_routes)
        .nest("/order", order_routes)
        .nest("/franchise", franchise_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::set_auth_user,
        ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api", api_routes)
        .fallback(unknown_endpoint)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The storefront is a browser app served from another origin.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "welcome to JWT Pizza",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn unknown_endpoint() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "unknown endpoint" })),
    )
}
