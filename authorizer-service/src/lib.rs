pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::Request,
    middleware::{from_fn, from_fn_with_state, Next},
    routing::{get, post, MethodRouter},
    Router,
};
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AuthorizerConfig, Environment, SwaggerMode};
use crate::middleware::{metrics_middleware, permission, require_permission};
use crate::services::{
    AssignmentManager, AuthService, AuthorizationStore, ClaimsResolver, Deadline,
    DirectoryService, PermissionSynchronizer, RefreshSessions, ReusePolicy, SessionStore,
    SigningKeys, TokenService,
};
use crate::utils::CredentialVerifier;
use service_core::error::AppError;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::metrics::metrics,
        handlers::well_known::jwks,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::users::register,
        handlers::users::get_user,
        handlers::users::list_users,
        handlers::users::update_user,
        handlers::applications::create_application,
        handlers::applications::list_applications,
        handlers::roles::create_role,
        handlers::roles::grant_permissions,
        handlers::assignment::assign_roles,
        handlers::permissions::sync_permissions,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::LoginRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::TokenResponse,
            dtos::auth::UpdateUserRequest,
            dtos::auth::UserListResponse,
            dtos::admin::CreateApplicationRequest,
            dtos::admin::CreateRoleRequest,
            dtos::admin::RoleResponse,
            dtos::admin::GrantPermissionsRequest,
            dtos::admin::AssignRolesRequest,
            dtos::admin::PermissionResponse,
            dtos::admin::RolePermissionsResponse,
            dtos::admin::UserRolesResponse,
            dtos::admin::PermissionDeclarationDto,
            dtos::admin::SyncPermissionsRequest,
            models::SanitizedUser,
            models::Application,
            services::SyncReport,
            services::Jwk,
            services::Jwks,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login, refresh and logout"),
        (name = "Users", description = "User registration, lookup and profile updates"),
        (name = "Admin", description = "Applications, roles, assignments and permission catalogs"),
        (name = "Well-Known", description = "Public service metadata"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthorizerConfig,
    pub store: Arc<dyn AuthorizationStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub tokens: TokenService,
    pub auth_service: AuthService,
    pub directory: DirectoryService,
    pub assignments: AssignmentManager,
    pub permission_sync: PermissionSynchronizer,
    pub login_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire every service from its collaborators and the loaded configuration.
    pub fn new(
        config: AuthorizerConfig,
        store: Arc<dyn AuthorizationStore>,
        sessions: Arc<dyn SessionStore>,
        credentials: Arc<dyn CredentialVerifier>,
        keys: SigningKeys,
    ) -> Self {
        let tokens = TokenService::new(Arc::new(keys), config.jwt.issuer.clone());
        let claims = ClaimsResolver::new(
            store.clone(),
            config.jwt.issuer.clone(),
            config.jwt.access_token_validity(),
        );
        let refresh_sessions = RefreshSessions::new(sessions.clone(), config.jwt.refresh_token_ttl());
        let auth_service = AuthService::new(
            store.clone(),
            credentials,
            claims,
            tokens.clone(),
            refresh_sessions,
            ReusePolicy::from_seconds(config.jwt.token_reuse_max_age_seconds),
        );

        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        Self {
            directory: DirectoryService::new(store.clone()),
            assignments: AssignmentManager::new(store.clone()),
            permission_sync: PermissionSynchronizer::new(
                store.clone(),
                config.store.permission_sync_batch_size,
            ),
            config,
            store,
            sessions,
            tokens,
            auth_service,
            login_rate_limiter,
            ip_rate_limiter,
        }
    }

    /// Deadline for one request's store work.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.config.store.operation_timeout())
    }
}

/// Method router gated on one `AUTHORIZER` permission.
fn gated(route: MethodRouter<AppState>, required: &'static str) -> MethodRouter<AppState> {
    route.route_layer(from_fn(move |req: Request, next: Next| {
        require_permission(required, req, next)
    }))
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Login route with its own rate limiter
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let admin_routes = Router::new()
        .route("/users", gated(get(handlers::list_users), permission::USER_READ))
        .route(
            "/applications",
            gated(post(handlers::create_application), permission::APPLICATION_CREATE).merge(
                gated(get(handlers::list_applications), permission::APPLICATION_READ),
            ),
        )
        .route(
            "/roles",
            gated(post(handlers::create_role), permission::ROLE_CREATE),
        )
        .route(
            "/roles/:role_id/permissions",
            gated(
                post(handlers::grant_permissions),
                permission::ROLE_GRANT_PERMISSIONS,
            ),
        )
        .route(
            "/users/:user_id/applications/:application_id/roles",
            gated(post(handlers::assign_roles), permission::USER_ASSIGN_ROLES),
        )
        .route(
            "/permissions/sync",
            gated(post(handlers::sync_permissions), permission::PERMISSION_SYNC),
        );

    // Everything here requires a bearer token
    let authenticated_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route(
            "/users/:user_id",
            get(handlers::get_user).patch(handlers::update_user),
        )
        .merge(admin_routes)
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let api = Router::new()
        .merge(login_route)
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/users", post(handlers::register))
        .merge(authenticated_routes);

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/.well-known/jwks.json", get(handlers::well_known::jwks))
        .nest("/authorizer/v1", api);

    let swagger_enabled = match state.config.environment {
        Environment::Dev => true,
        Environment::Prod => state.config.swagger.enabled == SwaggerMode::Public,
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // Still publish the OpenAPI JSON for programmatic access
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { service_core::axum::Json(ApiDoc::openapi()) }),
        );
    }

    let origins = &state.config.security.allowed_origins;
    let allowed_origins = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| {
            match o.parse::<service_core::axum::http::HeaderValue>() {
                Ok(origin) => Some(origin),
                Err(e) => {
                    tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                    None
                }
            }
        }))
    };

    let ip_limiter = state.ip_rate_limiter.clone();

    let app = app
        .with_state(state)
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([
                    service_core::axum::http::Method::GET,
                    service_core::axum::http::Method::POST,
                    service_core::axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    service_core::axum::http::header::AUTHORIZATION,
                    service_core::axum::http::header::CONTENT_TYPE,
                    service_core::axum::http::header::HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<service_core::axum::Json<serde_json::Value>, AppError> {
    let deadline = state.deadline();

    deadline
        .run("health.store", state.store.health_check())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Authorization store health check failed");
            AppError::from(e)
        })?;

    deadline
        .run("health.sessions", state.sessions.health_check())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Session store health check failed");
            AppError::from(e)
        })?;

    Ok(service_core::axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "postgresql": "up",
            "redis": "up"
        }
    })))
}
