use service_core::{
    axum::{extract::State, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::admin::SyncPermissionsRequest,
    middleware::AuthUser,
    services::{PermissionDeclaration, SyncRequest},
    utils::ValidatedJson,
    AppState,
};

/// Synchronize an application's permission catalog
///
/// Upserts every declared permission in batches. Records absent from the
/// request are left untouched. A failed batch reports how many records were
/// already committed; re-sending the same request is safe.
#[utoipa::path(
    post,
    path = "/authorizer/v1/permissions/sync",
    request_body = SyncPermissionsRequest,
    responses(
        (status = 200, description = "Catalog synchronized", body = crate::services::SyncReport),
        (status = 400, description = "Invalid catalog", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Missing AUTHORIZER:permission.sync", body = crate::dtos::ErrorResponse),
        (status = 404, description = "Unknown application", body = crate::dtos::ErrorResponse),
        (status = 502, description = "A batch failed after earlier batches committed", body = crate::dtos::ErrorResponse)
    ),
    tag = "Admin",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn sync_permissions(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<SyncPermissionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let report = state
        .permission_sync
        .sync(
            SyncRequest {
                application_code: req.application_code,
                permissions: req
                    .permissions
                    .into_iter()
                    .map(|p| PermissionDeclaration {
                        code: p.code,
                        description: p.description,
                    })
                    .collect(),
                version: req.version,
                requested_by: user.0.user_id(),
            },
            state.deadline(),
        )
        .await?;

    Ok(Json(report))
}
