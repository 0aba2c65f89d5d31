#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use pizza_service::config::Config;
use pizza_service::factory::{FactoryClient, FactoryOrderRequest, FulfillmentOutcome};
use pizza_service::{api, db, AppState};

pub const ADMIN_EMAIL: &str = "a@jwt.com";
pub const ADMIN_PASSWORD: &str = "admin";

/// Factory double that answers every order the same way.
pub struct FixedFactory(pub FulfillmentOutcome);

#[async_trait]
impl FactoryClient for FixedFactory {
    async fn submit_order(&self, _request: &FactoryOrderRequest) -> FulfillmentOutcome {
        self.0.clone()
    }
}

pub fn fulfilling_factory() -> FixedFactory {
    FixedFactory(FulfillmentOutcome::Fulfilled {
        jwt: "factory.tracking.jwt".to_string(),
        report_url: Some("http://factory.test/report/1".to_string()),
    })
}

pub fn failing_factory() -> FixedFactory {
    FixedFactory(FulfillmentOutcome::Failed {
        status: Some(500),
        message: "oven on fire".to_string(),
        report_url: Some("http://factory.test/report/9".to_string()),
    })
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
}

impl TestApp {
    pub async fn new(factory: FixedFactory) -> Self {
        let mut config = Config::default();
        config.auth.jwt_secret = Some("integration-test-secret".to_string());

        let pool = db::init_in_memory().await.unwrap();
        let state = Arc::new(AppState::new(config, pool, Arc::new(factory)));
        state
            .sessions
            .ensure_admin_user("Pizza Admin", ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .unwrap();

        let router = api::create_router(state.clone());
        Self { state, router }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    /// Register a diner and return `(user_id, token)`.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> (i64, String) {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth",
                None,
                Some(serde_json::json!({ "name": name, "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {}", body);
        (
            body["user"]["id"].as_i64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.request(
            Method::PUT,
            "/api/auth",
            None,
            Some(serde_json::json!({ "email": email, "password": password })),
        )
        .await
    }

    pub async fn admin_token(&self) -> String {
        let (status, body) = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }
}
