use service_core::{
    axum::{extract::Request, middleware::Next, response::Response},
    error::AppError,
};

use crate::models::ClaimsEnvelope;

/// Application code under which the authorizer's own admin permissions live.
pub const ADMIN_APPLICATION: &str = "AUTHORIZER";

pub const APPLICATION_CREATE: &str = "application.create";
pub const APPLICATION_READ: &str = "application.read";
pub const ROLE_CREATE: &str = "role.create";
pub const ROLE_GRANT_PERMISSIONS: &str = "role.grant_permissions";
pub const USER_ASSIGN_ROLES: &str = "user.assign_roles";
pub const USER_READ: &str = "user.read";
pub const USER_UPDATE: &str = "user.update";
pub const PERMISSION_SYNC: &str = "permission.sync";

/// Gate a route on one `AUTHORIZER` permission. Runs after `auth_middleware`.
pub async fn require_permission(
    permission: &'static str,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = req.extensions().get::<ClaimsEnvelope>().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!(
            "Auth claims missing from request extensions"
        ))
    })?;

    if !claims.has_permission(ADMIN_APPLICATION, permission) {
        tracing::warn!(
            user_id = %claims.sub,
            app = ADMIN_APPLICATION,
            required_permission = permission,
            "Insufficient permissions"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Insufficient permissions. Required: {}:{}",
            ADMIN_APPLICATION,
            permission
        )));
    }

    Ok(next.run(req).await)
}
