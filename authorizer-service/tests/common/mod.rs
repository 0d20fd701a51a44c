//! Shared setup for authorizer integration tests.
//!
//! Drives the full router in-process against the in-memory stores and the
//! fixture signing key; no Postgres or Redis needed.

#![allow(dead_code)]

use authorizer_service::{
    build_router,
    config::{
        AuthorizerConfig, DatabaseConfig, Environment, JwtConfig, RateLimitConfig, RedisConfig,
        SecurityConfig, StoreConfig, SwaggerConfig, SwaggerMode,
    },
    models::{
        Application, AuthorizationEntry, ClaimsEnvelope, Metadata, Permission, Role, RoleScope,
        User,
    },
    services::{MockAuthorizationStore, MockSessionStore, SigningKeys},
    utils::CredentialVerifier,
    AppState,
};
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/signing_key.pem");

/// `kid` derived from the fixture key's modulus.
pub const TEST_KID: &str = "HZ5SGerXKOU";

pub const TEST_PASSWORD: &str = "correct horse battery";

/// Stores passwords as `plain:<password>` so tests skip argon2's cost.
pub struct PlainCredentials;

impl CredentialVerifier for PlainCredentials {
    fn verify(&self, hash: &str, plaintext: &str) -> bool {
        hash.strip_prefix("plain:") == Some(plaintext)
    }

    fn hash(&self, plaintext: &str) -> Result<String, anyhow::Error> {
        Ok(format!("plain:{}", plaintext))
    }
}

pub fn test_config() -> AuthorizerConfig {
    AuthorizerConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "authorizer-service-test".to_string(),
        service_version: "0.0.0-test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 0,
            run_migrations: false,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        jwt: JwtConfig {
            private_key_pem: Some(TEST_PRIVATE_KEY.to_string()),
            private_key_paths: vec![],
            issuer: "authorizer-test".to_string(),
            access_token_expiry_minutes: 60,
            refresh_token_expiry_days: 7,
            token_reuse_max_age_seconds: 3600,
        },
        store: StoreConfig {
            operation_timeout_seconds: 5,
            permission_sync_batch_size: 100,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            session_cookie_secure: false,
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
    }
}

/// A decoded HTTP response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl TestResponse {
    /// Every `set-cookie` header value.
    pub fn cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MockAuthorizationStore>,
    pub sessions: Arc<MockSessionStore>,
}

impl TestApp {
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: AuthorizerConfig) -> anyhow::Result<Self> {
        let store = Arc::new(MockAuthorizationStore::new());
        let sessions = Arc::new(MockSessionStore::new());
        let keys = SigningKeys::load(&config.jwt)?;

        let state = AppState::new(
            config,
            store.clone(),
            sessions.clone(),
            Arc::new(PlainCredentials),
            keys,
        );
        let router = build_router(state.clone()).await?;

        Ok(Self {
            router,
            state,
            store,
            sessions,
        })
    }

    pub async fn send(&self, request: Request<Body>) -> anyhow::Result<TestResponse> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()))
        };

        Ok(TestResponse {
            status,
            headers,
            body,
        })
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> anyhow::Result<TestResponse> {
        self.send(request(Method::GET, uri, None, bearer)?).await
    }

    pub async fn post(
        &self,
        uri: &str,
        body: serde_json::Value,
        bearer: Option<&str>,
    ) -> anyhow::Result<TestResponse> {
        self.send(request(Method::POST, uri, Some(body), bearer)?)
            .await
    }

    pub async fn patch(
        &self,
        uri: &str,
        body: serde_json::Value,
        bearer: Option<&str>,
    ) -> anyhow::Result<TestResponse> {
        self.send(request(Method::PATCH, uri, Some(body), bearer)?)
            .await
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        application: Option<&str>,
    ) -> anyhow::Result<TestResponse> {
        self.post(
            "/authorizer/v1/auth/login",
            serde_json::json!({
                "email": email,
                "password": password,
                "application": application,
            }),
            None,
        )
        .await
    }

    // ==================== Seeding ====================

    pub fn seed_user(&self, email: &str) -> User {
        let user = User::new(
            email.to_string(),
            email.split('@').next().unwrap_or(email).to_string(),
            None,
            None,
            format!("plain:{}", TEST_PASSWORD),
        );
        self.store.insert_user(user.clone());
        user
    }

    pub fn seed_application(&self, code: &str) -> Application {
        let application = Application::new(
            code.to_string(),
            format!("{} application", code),
            None,
            Metadata::new(),
        );
        self.store.insert_application(application.clone());
        application
    }

    pub fn seed_role(&self, application: Option<&Application>, code: &str) -> Role {
        let scope = match application {
            Some(app) => RoleScope::Application(app.id),
            None => RoleScope::Global,
        };
        let role = Role::new(scope, code.to_string(), code.to_string(), None);
        self.store.insert_role(role.clone());
        role
    }

    pub fn seed_permission(&self, application: &Application, code: &str) -> Permission {
        let permission = Permission::new(application.id, code.to_string(), String::new(), 1, None);
        self.store.insert_permission(permission.clone());
        permission
    }

    /// A user holding a global role, logged in over HTTP.
    pub async fn admin_token(&self) -> anyhow::Result<(User, String)> {
        let admin = self.seed_user("admin@example.com");
        let role = self.seed_role(None, "superadmin");
        self.store.grant_role(admin.id, role.id);

        let response = self.login(&admin.email, TEST_PASSWORD, None).await?;
        anyhow::ensure!(
            response.status == StatusCode::OK,
            "admin login failed: {}",
            response.body
        );
        let token = access_token(&response)?;
        Ok((admin, token))
    }

    /// Sign a token for `user` carrying exactly `authorization`.
    pub fn token_with(
        &self,
        user: &User,
        authorization: Vec<AuthorizationEntry>,
    ) -> anyhow::Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = ClaimsEnvelope {
            iss: "authorizer-test".to_string(),
            sub: user.id.to_string(),
            aud: authorization.iter().map(|e| e.app.clone()).collect(),
            iat: now,
            exp: now + 3600,
            username: user.username.clone(),
            email: user.email.clone(),
            authorization,
        };
        Ok(self.state.tokens.issue(&claims)?)
    }
}

pub fn entry(app: &str, roles: &[&str], permissions: &[&str]) -> AuthorizationEntry {
    AuthorizationEntry {
        app: app.to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}

pub fn request(
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
    bearer: Option<&str>,
) -> anyhow::Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json)?))?,
        None => builder.body(Body::empty())?,
    };
    Ok(request)
}

pub fn access_token(response: &TestResponse) -> anyhow::Result<String> {
    response.body["access_token"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("no access_token in {}", response.body))
}

pub fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.com", prefix, Uuid::new_v4().simple())
}
