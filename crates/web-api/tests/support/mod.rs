use std::sync::Arc;
use std::time::Duration;

use application::{
    ChatService, ChatServiceDependencies, ChatSettings, LocalEventBus, MemoryStore,
    MessageRateLimiter, SystemClock,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use domain::UserId;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;
use web_api::{router, AppState, JwtConfig, JwtService};

pub struct TestUser {
    pub id: UserId,
    pub token: String,
}

pub struct TestServer {
    router: Router,
    jwt: JwtService,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_rate_limit(6, Duration::from_secs(30))
    }

    pub fn with_rate_limit(max_messages: u32, window: Duration) -> Self {
        let bus = LocalEventBus::default();
        let deps = ChatServiceDependencies::in_memory(
            Arc::new(MemoryStore::new()),
            Arc::new(MessageRateLimiter::new(max_messages, window)),
            Arc::new(SystemClock),
            Arc::new(bus.clone()),
            ChatSettings::default(),
        );
        let jwt = JwtService::new(JwtConfig {
            secret: "web-api-test-secret-with-enough-length".to_string(),
            expiration_hours: 1,
        });
        let state = AppState::new(
            Arc::new(ChatService::new(deps)),
            Arc::new(jwt.clone()),
            bus,
        );

        Self {
            router: router(state),
            jwt,
        }
    }

    /// 新用户及其 token
    pub fn user(&self) -> TestUser {
        let id = UserId::from(Uuid::new_v4());
        let token = self.jwt.generate_token(id).expect("token");
        TestUser { id, token }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<&TestUser>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.request_with_token(method, uri, user.map(|user| user.token.as_str()), body)
            .await
    }

    pub async fn request_with_token(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).expect("json body")))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json response")
        };
        (status, json)
    }

    /// 发起并接受好友请求
    pub async fn befriend(&self, a: &TestUser, b: &TestUser) {
        let (status, _) = self
            .request(Method::POST, &format!("/api/v1/buddies/{}/request", b.id), Some(a), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = self
            .request(Method::POST, &format!("/api/v1/buddies/{}/accept", a.id), Some(b), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}
