use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::auth::{LoginRequest, RefreshRequest, TokenResponse},
    middleware::AuthUser,
    services::{LoginCommand, RefreshCommand},
    utils::ValidatedJson,
    AppState,
};

/// Cookie carrying the caller's last access token, offered for reuse at login.
pub const TOKEN_COOKIE: &str = "jwt_user_token";

/// Login with email and password
///
/// A still-valid access token in the `jwt_user_token` cookie is returned
/// as-is when it is young enough; otherwise fresh claims are resolved and a
/// new token pair is issued.
#[utoipa::path(
    post,
    path = "/authorizer/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Invalid input", body = crate::dtos::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = crate::dtos::ErrorResponse),
        (status = 404, description = "Unknown application", body = crate::dtos::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::dtos::ErrorResponse),
        (status = 429, description = "Too many attempts", body = crate::dtos::ErrorResponse),
        (status = 503, description = "Store unavailable", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let presented_token = jar.get(TOKEN_COOKIE).map(|c| c.value().to_string());

    let outcome = state
        .auth_service
        .login(
            LoginCommand {
                email: req.email,
                password: req.password,
                application: req.application,
                presented_token,
            },
            state.deadline(),
        )
        .await?;

    let response = TokenResponse::new(
        outcome.access_token,
        outcome.refresh_token,
        &outcome.claims,
        outcome.reused,
    );
    let cookie = Cookie::build((TOKEN_COOKIE, response.access_token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.security.session_cookie_secure)
        .max_age(time::Duration::seconds(response.expires_in))
        .build();

    Ok((jar.add(cookie), (StatusCode::OK, Json(response))))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/authorizer/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed", body = TokenResponse),
        (status = 401, description = "Invalid or expired refresh token", body = crate::dtos::ErrorResponse),
        (status = 503, description = "Store unavailable", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .auth_service
        .refresh(
            RefreshCommand {
                refresh_token: req.refresh_token,
                application: req.application,
            },
            state.deadline(),
        )
        .await?;

    Ok((
        StatusCode::OK,
        Json(TokenResponse::new(
            outcome.access_token,
            Some(outcome.refresh_token),
            &outcome.claims,
            false,
        )),
    ))
}

/// Drop the caller's refresh token
#[utoipa::path(
    post,
    path = "/authorizer/v1/auth/logout",
    responses(
        (status = 200, description = "Logged out successfully"),
        (status = 401, description = "Invalid token", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user
        .0
        .user_id()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;

    state.auth_service.logout(user_id, state.deadline()).await?;

    Ok((
        jar.remove(Cookie::build(TOKEN_COOKIE).path("/").build()),
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Logged out successfully"
            })),
        ),
    ))
}
