use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Metadata, Permission, Role};

// ==================== Applications ====================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateApplicationRequest {
    #[validate(length(min = 1, max = 64, message = "Code must be 1-64 characters"))]
    #[schema(example = "BILLING")]
    pub code: String,

    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    #[schema(example = "Billing")]
    pub name: String,

    pub description: Option<String>,

    /// Stored and returned unchanged.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Metadata,
}

// ==================== Roles ====================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoleRequest {
    /// Owning application. Omit to create a global role.
    #[schema(example = "BILLING")]
    pub application_code: Option<String>,

    #[validate(length(min = 1, max = 64, message = "Code must be 1-64 characters"))]
    #[schema(example = "clerk")]
    pub code: String,

    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    #[schema(example = "Billing clerk")]
    pub name: String,

    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    pub id: Uuid,
    /// `None` for global roles.
    pub application_id: Option<Uuid>,
    #[schema(example = "clerk")]
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    /// `GLOBAL` for global roles.
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Role> for RoleResponse {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id,
            application_id: role.application_id(),
            code: role.code.clone(),
            name: role.name.clone(),
            description: role.description.clone(),
            scope: role.scope_marker().map(str::to_string),
            created_at: role.created_at,
        }
    }
}

// ==================== Assignment ====================

/// Full desired permission set of a role. An empty list clears it.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GrantPermissionsRequest {
    #[schema(example = json!(["invoice.read", "invoice.write"]))]
    pub permissions: Vec<String>,
}

/// Full desired role set of a user within one application. An empty list
/// clears it.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AssignRolesRequest {
    #[schema(example = json!(["clerk"]))]
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionResponse {
    pub id: Uuid,
    pub application_id: Uuid,
    #[schema(example = "invoice.read")]
    pub code: String,
    pub description: String,
    pub version: i32,
}

impl From<&Permission> for PermissionResponse {
    fn from(permission: &Permission) -> Self {
        Self {
            id: permission.id,
            application_id: permission.application_id,
            code: permission.code.clone(),
            description: permission.description.clone(),
            version: permission.version,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RolePermissionsResponse {
    pub role_id: Uuid,
    pub permissions: Vec<PermissionResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserRolesResponse {
    pub user_id: Uuid,
    pub application_id: Uuid,
    pub roles: Vec<RoleResponse>,
}

// ==================== Permission sync ====================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PermissionDeclarationDto {
    #[validate(length(min = 1, max = 128, message = "Code must be 1-128 characters"))]
    #[schema(example = "invoice.read")]
    pub code: String,

    #[serde(default)]
    #[schema(example = "Read invoices")]
    pub description: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SyncPermissionsRequest {
    #[validate(length(min = 1, message = "Application code is required"))]
    #[schema(example = "BILLING")]
    pub application_code: String,

    #[validate(range(min = 1, message = "Version must be at least 1"))]
    #[schema(example = 1)]
    pub version: i32,

    #[validate(nested)]
    pub permissions: Vec<PermissionDeclarationDto>,
}
