use service_core::{
    axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::auth::{ListUsersQuery, RegisterRequest, UpdateUserRequest, UserListResponse},
    middleware::{
        permission::{ADMIN_APPLICATION, USER_READ, USER_UPDATE},
        AuthUser,
    },
    models::ClaimsEnvelope,
    services::{RegisterCommand, UpdateProfileCommand},
    utils::ValidatedJson,
    AppState,
};

/// Register a new user
#[utoipa::path(
    post,
    path = "/authorizer/v1/users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = crate::models::SanitizedUser),
        (status = 409, description = "Email already registered", body = crate::dtos::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .auth_service
        .register(
            RegisterCommand {
                email: req.email,
                username: req.username,
                full_name: req.full_name,
                phone: req.phone,
                password: req.password,
            },
            state.deadline(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(user.sanitized())))
}

/// Get a user by id
///
/// Callers may read their own record; anyone else needs `AUTHORIZER:user.read`.
#[utoipa::path(
    get,
    path = "/authorizer/v1/users/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User found", body = crate::models::SanitizedUser),
        (status = 403, description = "Not allowed to read this user", body = crate::dtos::ErrorResponse),
        (status = 404, description = "User not found", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_self_or(&user.0, user_id, USER_READ)?;

    let found = state
        .auth_service
        .get_user(user_id, state.deadline())
        .await?;
    Ok(Json(found.sanitized()))
}

/// List users, newest first
#[utoipa::path(
    get,
    path = "/authorizer/v1/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "One page of users", body = UserListResponse),
        (status = 403, description = "Missing AUTHORIZER:user.read", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = state
        .auth_service
        .list_users(query.page, query.limit, state.deadline())
        .await?;

    Ok(Json(UserListResponse {
        users: page.users.iter().map(|u| u.sanitized()).collect(),
        page: page.page,
        limit: page.limit,
    }))
}

/// Update a user's profile
///
/// Callers may update their own profile; anyone else needs `AUTHORIZER:user.update`.
#[utoipa::path(
    patch,
    path = "/authorizer/v1/users/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "User id")
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Profile updated", body = crate::models::SanitizedUser),
        (status = 400, description = "Nothing to update", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Not allowed to update this user", body = crate::dtos::ErrorResponse),
        (status = 404, description = "User not found", body = crate::dtos::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_self_or(&user.0, user_id, USER_UPDATE)?;

    let updated = state
        .auth_service
        .update_user(
            user_id,
            UpdateProfileCommand {
                full_name: req.full_name,
                phone: req.phone,
            },
            state.deadline(),
        )
        .await?;
    Ok(Json(updated.sanitized()))
}

/// The caller is `user_id` or holds `AUTHORIZER:<permission>`.
fn require_self_or(
    caller: &ClaimsEnvelope,
    user_id: Uuid,
    permission: &'static str,
) -> Result<(), AppError> {
    if caller.user_id() == Some(user_id) || caller.has_permission(ADMIN_APPLICATION, permission) {
        return Ok(());
    }
    tracing::warn!(
        user_id = %caller.sub,
        target_user_id = %user_id,
        required_permission = permission,
        "Insufficient permissions"
    );
    Err(AppError::Forbidden(anyhow::anyhow!(
        "Insufficient permissions. Required: {}:{}",
        ADMIN_APPLICATION,
        permission
    )))
}
