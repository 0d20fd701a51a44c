//! Role and user assignment with replace semantics.
//!
//! Every call states the complete desired set for its target. Codes are all
//! resolved first; the store then swaps the association rows in a single
//! transaction. An empty set clears the target.

use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use super::deadline::Deadline;
use super::error::ServiceError;
use super::store::AuthorizationStore;
use crate::models::{Application, Permission, Role, RoleScope};

#[derive(Clone)]
pub struct AssignmentManager {
    store: Arc<dyn AuthorizationStore>,
}

impl AssignmentManager {
    pub fn new(store: Arc<dyn AuthorizationStore>) -> Self {
        Self { store }
    }

    /// Make `permission_codes` the exact permission set of the role. Every
    /// code must exist in the role's application.
    pub async fn grant_permissions_to_role(
        &self,
        role_id: Uuid,
        permission_codes: &[String],
        deadline: Deadline,
    ) -> Result<Vec<Permission>, ServiceError> {
        let codes = normalize_codes("permission", permission_codes)?;

        deadline
            .run("grant_permissions_to_role", async {
                let role = self
                    .store
                    .get_role_by_id(role_id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("role", role_id))?;

                let application_id = match role.scope {
                    RoleScope::Application(id) => id,
                    RoleScope::Global if codes.is_empty() => {
                        self.store.replace_role_permissions(role.id, &[]).await?;
                        return Ok(Vec::new());
                    }
                    RoleScope::Global => {
                        return Err(ServiceError::InvalidInput(format!(
                            "role '{}' is global and already grants every permission",
                            role.code
                        )));
                    }
                };
                let application = self.application(application_id).await?;

                let mut permissions = Vec::with_capacity(codes.len());
                for code in &codes {
                    let permission = self
                        .store
                        .get_permission_by_application_and_code(application.id, code)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::not_found(
                                "permission",
                                format!("{}/{}", application.code, code),
                            )
                        })?;
                    permissions.push(permission);
                }

                let ids: Vec<Uuid> = permissions.iter().map(|p| p.id).collect();
                self.store.replace_role_permissions(role.id, &ids).await?;

                tracing::info!(
                    role_id = %role.id,
                    application = %application.code,
                    permissions = ids.len(),
                    "Replaced role permissions"
                );
                Ok::<_, ServiceError>(permissions)
            })
            .await
    }

    /// Make `role_codes` the user's exact role set within one application.
    /// Roles held in other applications and global roles are untouched.
    pub async fn assign_roles_to_user(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        role_codes: &[String],
        deadline: Deadline,
    ) -> Result<Vec<Role>, ServiceError> {
        let codes = normalize_codes("role", role_codes)?;

        deadline
            .run("assign_roles_to_user", async {
                let user = self
                    .store
                    .get_user_by_id(user_id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("user", user_id))?;
                let application = self.application(application_id).await?;

                let mut roles = Vec::with_capacity(codes.len());
                for code in &codes {
                    let role = self
                        .store
                        .get_role_by_application_and_code(application.id, code)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::not_found(
                                "role",
                                format!("{}/{}", application.code, code),
                            )
                        })?;
                    roles.push(role);
                }

                let ids: Vec<Uuid> = roles.iter().map(|r| r.id).collect();
                self.store
                    .replace_user_roles(user.id, application.id, &ids)
                    .await?;

                tracing::info!(
                    user_id = %user.id,
                    application = %application.code,
                    roles = ids.len(),
                    "Replaced user roles"
                );
                Ok::<_, ServiceError>(roles)
            })
            .await
    }

    async fn application(&self, id: Uuid) -> Result<Application, ServiceError> {
        self.store
            .get_application_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("application", id))
    }
}

fn normalize_codes(entity: &str, codes: &[String]) -> Result<BTreeSet<String>, ServiceError> {
    let mut normalized = BTreeSet::new();
    for code in codes {
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::InvalidInput(format!(
                "{} codes must not be empty",
                entity
            )));
        }
        normalized.insert(code.to_string());
    }
    Ok(normalized)
}
