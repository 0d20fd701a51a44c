use service_core::{
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::admin::{
        CreateRoleRequest, GrantPermissionsRequest, PermissionResponse, RolePermissionsResponse,
        RoleResponse,
    },
    services::NewRole,
    utils::ValidatedJson,
    AppState,
};

/// Create a role
///
/// Omitting `application_code` creates a global role.
#[utoipa::path(
    post,
    path = "/authorizer/v1/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = RoleResponse),
        (status = 403, description = "Missing AUTHORIZER:role.create", body = crate::dtos::ErrorResponse),
        (status = 404, description = "Unknown application", body = crate::dtos::ErrorResponse),
        (status = 409, description = "Role code already in use", body = crate::dtos::ErrorResponse)
    ),
    tag = "Admin",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_role(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = state
        .directory
        .create_role(
            NewRole {
                application_code: req.application_code,
                code: req.code,
                name: req.name,
                description: req.description,
            },
            state.deadline(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(RoleResponse::from(&role))))
}

/// Replace a role's permission set
#[utoipa::path(
    post,
    path = "/authorizer/v1/roles/{role_id}/permissions",
    params(
        ("role_id" = Uuid, Path, description = "Role id")
    ),
    request_body = GrantPermissionsRequest,
    responses(
        (status = 200, description = "Permission set replaced", body = RolePermissionsResponse),
        (status = 400, description = "Global role or malformed codes", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Missing AUTHORIZER:role.grant_permissions", body = crate::dtos::ErrorResponse),
        (status = 404, description = "Unknown role or permission", body = crate::dtos::ErrorResponse)
    ),
    tag = "Admin",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn grant_permissions(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<GrantPermissionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let permissions = state
        .assignments
        .grant_permissions_to_role(role_id, &req.permissions, state.deadline())
        .await?;

    Ok(Json(RolePermissionsResponse {
        role_id,
        permissions: permissions.iter().map(PermissionResponse::from).collect(),
    }))
}
