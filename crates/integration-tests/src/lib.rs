//! Integration tests for Mealtrack.
//!
//! Tests drive the real router in-process over the in-memory store and
//! session layer, so full request/response cycles (including session
//! cookies and event fan-out) run without a database or a listening
//! socket.
//!
//! # Test Categories
//!
//! - `auth` - Login, logout, and session identity
//! - `meal_workflow` - End-to-end status workflow scenarios
//! - `notifications` - Event fan-out to user rooms

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use secrecy::SecretString;
use tower::ServiceExt;

use mealtrack_core::Role;
use mealtrack_server::config::ServerConfig;
use mealtrack_server::middleware::create_memory_session_layer;
use mealtrack_server::notify::Notifier;
use mealtrack_server::services::auth::AuthService;
use mealtrack_server::state::AppState;
use mealtrack_server::store::MemoryStore;
use mealtrack_server::build_router;

/// Password used for every test account.
pub const TEST_PASSWORD: &str = "integration-pass-1";

/// An in-process application instance.
pub struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    state: AppState,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    /// Build an app over a fresh in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rollback(false)
    }

    /// Build an app with the status rollback flag set.
    #[must_use]
    pub fn with_rollback(allow_status_rollback: bool) -> Self {
        let config = ServerConfig {
            database_url: SecretString::from("postgres://unused"),
            host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            port: 0,
            session_secret: SecretString::from("x".repeat(32)),
            allowed_origin: "http://localhost:3000".to_string(),
            allow_status_rollback,
            seed_demo_users: false,
            sentry_dsn: None,
        };

        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(config, store.clone());
        let router = build_router(state.clone(), create_memory_session_layer());

        Self {
            router,
            store,
            state,
        }
    }

    /// The shared store, for direct seeding.
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        self.store.as_ref()
    }

    /// The notification bus, for subscribing test receivers.
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        self.state.notifier()
    }

    /// Register a staff account with [`TEST_PASSWORD`].
    ///
    /// # Panics
    ///
    /// Panics if registration fails.
    pub async fn register_user(&self, name: &str, email: &str, role: Role) -> mealtrack_core::UserId {
        #[allow(clippy::unwrap_used)]
        let user = AuthService::new(self.store())
            .register(name, email, TEST_PASSWORD, role)
            .await
            .unwrap();
        user.id
    }

    /// Login and return the session cookie for later requests.
    ///
    /// # Panics
    ///
    /// Panics if the login does not succeed or no cookie is set.
    pub async fn login(&self, email: &str, role: Role) -> SessionCookie {
        let response = self
            .request(
                "POST",
                "/api/auth/login",
                None,
                Some(serde_json::json!({
                    "email": email,
                    "password": TEST_PASSWORD,
                    "role": role.to_string(),
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {:?}", response.body);

        response.cookie.expect("login response set no session cookie")
    }

    /// Issue a request against the in-process router.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    #[allow(clippy::unwrap_used)]
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        cookie: Option<&SessionCookie>,
        body: Option<serde_json::Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie.0.as_str());
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|value| SessionCookie(value.to_string()));

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };

        TestResponse {
            status,
            body,
            cookie,
        }
    }

    /// GET shorthand.
    pub async fn get(&self, path: &str, cookie: Option<&SessionCookie>) -> TestResponse {
        self.request("GET", path, cookie, None).await
    }
}

/// A captured session cookie (`name=value`).
#[derive(Debug, Clone)]
pub struct SessionCookie(pub String);

/// A decoded response from the in-process router.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: serde_json::Value,
    pub cookie: Option<SessionCookie>,
}
