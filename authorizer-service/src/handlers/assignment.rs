use service_core::{
    axum::{
        extract::{Path, State},
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::admin::{AssignRolesRequest, RoleResponse, UserRolesResponse},
    utils::ValidatedJson,
    AppState,
};

/// Replace a user's roles within one application
#[utoipa::path(
    post,
    path = "/authorizer/v1/users/{user_id}/applications/{application_id}/roles",
    params(
        ("user_id" = Uuid, Path, description = "User id"),
        ("application_id" = Uuid, Path, description = "Application id")
    ),
    request_body = AssignRolesRequest,
    responses(
        (status = 200, description = "Role set replaced", body = UserRolesResponse),
        (status = 403, description = "Missing AUTHORIZER:user.assign_roles", body = crate::dtos::ErrorResponse),
        (status = 404, description = "Unknown user, application or role", body = crate::dtos::ErrorResponse)
    ),
    tag = "Admin",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn assign_roles(
    State(state): State<AppState>,
    Path((user_id, application_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<AssignRolesRequest>,
) -> Result<impl IntoResponse, AppError> {
    let roles = state
        .assignments
        .assign_roles_to_user(user_id, application_id, &req.roles, state.deadline())
        .await?;

    Ok(Json(UserRolesResponse {
        user_id,
        application_id,
        roles: roles.iter().map(RoleResponse::from).collect(),
    }))
}
