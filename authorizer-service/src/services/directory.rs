//! Administrative creation of applications and roles.

use std::sync::Arc;

use super::deadline::Deadline;
use super::error::ServiceError;
use super::store::AuthorizationStore;
use crate::models::{Application, Metadata, Role, RoleScope, GLOBAL_APPLICATION};

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct NewRole {
    /// Owning application; `None` creates a global role.
    pub application_code: Option<String>,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct DirectoryService {
    store: Arc<dyn AuthorizationStore>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn AuthorizationStore>) -> Self {
        Self { store }
    }

    pub async fn create_application(
        &self,
        new: NewApplication,
        deadline: Deadline,
    ) -> Result<Application, ServiceError> {
        let code = validate_code("application", &new.code)?;
        if code.eq_ignore_ascii_case(GLOBAL_APPLICATION) {
            return Err(ServiceError::InvalidInput(format!(
                "application code '{}' is reserved",
                code
            )));
        }
        let name = required("application name", &new.name)?;

        let application = Application::new(code, name, new.description, new.metadata);
        deadline
            .run(
                "create_application",
                self.store.create_application(&application),
            )
            .await?;

        tracing::info!(application_id = %application.id, code = %application.code, "Created application");
        Ok(application)
    }

    pub async fn list_applications(
        &self,
        deadline: Deadline,
    ) -> Result<Vec<Application>, ServiceError> {
        deadline
            .run("list_applications", self.store.list_applications())
            .await
    }

    pub async fn create_role(&self, new: NewRole, deadline: Deadline) -> Result<Role, ServiceError> {
        let code = validate_code("role", &new.code)?;
        let name = required("role name", &new.name)?;
        let application_code = new
            .application_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        deadline
            .run("create_role", async {
                let scope = match application_code {
                    Some(app_code) => {
                        let application = self
                            .store
                            .get_application_by_code(app_code)
                            .await?
                            .ok_or_else(|| ServiceError::not_found("application", app_code))?;
                        RoleScope::Application(application.id)
                    }
                    None => RoleScope::Global,
                };

                let role = Role::new(scope, code, name, new.description);
                self.store.create_role(&role).await?;

                tracing::info!(
                    role_id = %role.id,
                    code = %role.code,
                    global = role.is_global(),
                    "Created role"
                );
                Ok::<_, ServiceError>(role)
            })
            .await
    }
}

fn required(field: &str, value: &str) -> Result<String, ServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::InvalidInput(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn validate_code(entity: &str, code: &str) -> Result<String, ServiceError> {
    let code = required(&format!("{} code", entity), code)?;
    if code.chars().any(char::is_whitespace) {
        return Err(ServiceError::InvalidInput(format!(
            "{} code '{}' must not contain whitespace",
            entity, code
        )));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MockAuthorizationStore;
    use std::time::Duration;

    fn directory() -> DirectoryService {
        DirectoryService::new(Arc::new(MockAuthorizationStore::new()))
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    fn new_app(code: &str) -> NewApplication {
        NewApplication {
            code: code.to_string(),
            name: "Billing".to_string(),
            description: None,
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_create_application_and_conflict() -> Result<(), anyhow::Error> {
        let directory = directory();
        let mut app = new_app("BILLING");
        app.metadata
            .insert("owner".to_string(), serde_json::json!({"team": "payments"}));

        let created = directory.create_application(app, deadline()).await?;
        assert_eq!(created.metadata["owner"]["team"], "payments");

        let err = directory
            .create_application(new_app("BILLING"), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        assert_eq!(directory.list_applications(deadline()).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_reserved_and_malformed_codes() {
        let directory = directory();
        for code in ["GLOBAL", "global", "", "two words"] {
            let err = directory
                .create_application(new_app(code), deadline())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)), "{}", code);
        }
    }

    #[tokio::test]
    async fn test_create_scoped_and_global_roles() -> Result<(), anyhow::Error> {
        let directory = directory();
        let app = directory
            .create_application(new_app("BILLING"), deadline())
            .await?;

        let scoped = directory
            .create_role(
                NewRole {
                    application_code: Some("BILLING".to_string()),
                    code: "clerk".to_string(),
                    name: "Clerk".to_string(),
                    description: None,
                },
                deadline(),
            )
            .await?;
        assert_eq!(scoped.scope, RoleScope::Application(app.id));

        let global = directory
            .create_role(
                NewRole {
                    application_code: None,
                    code: "clerk".to_string(),
                    name: "Superuser clerk".to_string(),
                    description: None,
                },
                deadline(),
            )
            .await?;
        assert!(global.is_global());
        Ok(())
    }

    #[tokio::test]
    async fn test_role_for_unknown_application() {
        let err = directory()
            .create_role(
                NewRole {
                    application_code: Some("MISSING".to_string()),
                    code: "clerk".to_string(),
                    name: "Clerk".to_string(),
                    description: None,
                },
                deadline(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
