//! Authorization store capability.
//!
//! The engines only see this trait; `PgAuthorizationStore` backs it in
//! production and `MockAuthorizationStore` in tests and local runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::error::ServiceError;
use crate::models::{Application, Permission, Role, RoleScope, User};

#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    // ==================== Users ====================

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, ServiceError>;
    /// Fails with `Conflict` when the email is taken.
    async fn create_user(&self, user: &User) -> Result<(), ServiceError>;
    /// Live users, newest first.
    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>, ServiceError>;
    /// Overwrite the profile fields of a live user. `None` when there is no
    /// such user.
    async fn update_user(
        &self,
        id: Uuid,
        full_name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<User>, ServiceError>;

    // ==================== Applications ====================

    async fn get_application_by_code(&self, code: &str)
        -> Result<Option<Application>, ServiceError>;
    async fn get_application_by_id(&self, id: Uuid) -> Result<Option<Application>, ServiceError>;
    /// Every non-deleted application, ordered by code.
    async fn list_applications(&self) -> Result<Vec<Application>, ServiceError>;
    /// Fails with `Conflict` when the code is taken.
    async fn create_application(&self, application: &Application) -> Result<(), ServiceError>;

    // ==================== Roles ====================

    async fn get_role_by_id(&self, id: Uuid) -> Result<Option<Role>, ServiceError>;
    async fn get_role_by_application_and_code(
        &self,
        application_id: Uuid,
        code: &str,
    ) -> Result<Option<Role>, ServiceError>;
    async fn get_global_roles_by_user(&self, user_id: Uuid) -> Result<Vec<Role>, ServiceError>;
    async fn get_roles_by_user_and_application(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<Vec<Role>, ServiceError>;
    /// Fails with `Conflict` when the code is taken within the role's scope.
    async fn create_role(&self, role: &Role) -> Result<(), ServiceError>;

    // ==================== Permissions ====================

    async fn get_permission_by_application_and_code(
        &self,
        application_id: Uuid,
        code: &str,
    ) -> Result<Option<Permission>, ServiceError>;
    async fn get_permissions_by_role(&self, role_id: Uuid)
        -> Result<Vec<Permission>, ServiceError>;
    /// Distinct permissions granted by any of `role_ids`.
    async fn get_permissions_by_roles(
        &self,
        role_ids: &[Uuid],
    ) -> Result<Vec<Permission>, ServiceError>;
    /// Upsert one batch atomically, keyed on `(application_id, code)`. On
    /// conflict only description, version and updated_at change.
    async fn upsert_permissions(&self, batch: &[Permission]) -> Result<(), ServiceError>;

    // ==================== Associations ====================

    /// Atomically replace the full permission set granted by a role.
    async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<(), ServiceError>;
    /// Atomically replace the user's roles within one application. Roles in
    /// other applications and global roles are left alone.
    async fn replace_user_roles(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        role_ids: &[Uuid],
    ) -> Result<(), ServiceError>;
}

#[derive(Default)]
struct MockState {
    users: HashMap<Uuid, User>,
    applications: HashMap<Uuid, Application>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    user_roles: HashSet<(Uuid, Uuid)>,
    role_permissions: HashSet<(Uuid, Uuid)>,
    upsert_calls: usize,
    fail_upsert_call: Option<usize>,
    unavailable: bool,
}

impl MockState {
    fn check_available(&self) -> Result<(), ServiceError> {
        if self.unavailable {
            return Err(ServiceError::Dependency(
                "mock store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn live_role(&self, id: &Uuid) -> Option<&Role> {
        self.roles.get(id).filter(|r| r.deleted_at.is_none())
    }
}

/// In-memory store with the same replace and upsert semantics as Postgres.
#[derive(Default)]
pub struct MockAuthorizationStore {
    state: Mutex<MockState>,
}

impl MockAuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_user(&self, user: User) {
        self.state().users.insert(user.id, user);
    }

    pub fn insert_application(&self, application: Application) {
        self.state().applications.insert(application.id, application);
    }

    pub fn insert_role(&self, role: Role) {
        self.state().roles.insert(role.id, role);
    }

    pub fn insert_permission(&self, permission: Permission) {
        self.state().permissions.insert(permission.id, permission);
    }

    pub fn grant_role(&self, user_id: Uuid, role_id: Uuid) {
        self.state().user_roles.insert((user_id, role_id));
    }

    pub fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) {
        self.state().role_permissions.insert((role_id, permission_id));
    }

    /// Make the `n`th call (1-based) to `upsert_permissions` fail without
    /// applying anything.
    pub fn fail_upsert_on_call(&self, n: usize) {
        self.state().fail_upsert_call = Some(n);
    }

    /// Make every store call fail with a dependency error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    pub fn upsert_calls(&self) -> usize {
        self.state().upsert_calls
    }

    /// All permission rows of an application, including soft-deleted ones.
    pub fn permissions_for_application(&self, application_id: Uuid) -> Vec<Permission> {
        let mut perms: Vec<Permission> = self
            .state()
            .permissions
            .values()
            .filter(|p| p.application_id == application_id)
            .cloned()
            .collect();
        perms.sort_by(|a, b| a.code.cmp(&b.code));
        perms
    }

    pub fn role_ids_for_user(&self, user_id: Uuid) -> BTreeSet<Uuid> {
        self.state()
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, r)| *r)
            .collect()
    }
}

#[async_trait]
impl AuthorizationStore for MockAuthorizationStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        self.state().check_available()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let state = self.state();
        state.check_available()?;
        Ok(state
            .users
            .values()
            .find(|u| u.deleted_at.is_none() && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, ServiceError> {
        let state = self.state();
        state.check_available()?;
        Ok(state
            .users
            .get(&id)
            .filter(|u| u.deleted_at.is_none())
            .cloned())
    }

    async fn create_user(&self, user: &User) -> Result<(), ServiceError> {
        let mut state = self.state();
        state.check_available()?;
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(ServiceError::Conflict(format!(
                "email '{}' is already registered",
                user.email
            )));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>, ServiceError> {
        let state = self.state();
        state.check_available()?;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| u.deleted_at.is_none())
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(users
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn update_user(
        &self,
        id: Uuid,
        full_name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<User>, ServiceError> {
        let mut state = self.state();
        state.check_available()?;
        let Some(user) = state
            .users
            .get_mut(&id)
            .filter(|u| u.deleted_at.is_none())
        else {
            return Ok(None);
        };
        user.full_name = full_name.map(str::to_string);
        user.phone = phone.map(str::to_string);
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn get_application_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Application>, ServiceError> {
        let state = self.state();
        state.check_available()?;
        Ok(state
            .applications
            .values()
            .find(|a| a.deleted_at.is_none() && a.code == code)
            .cloned())
    }

    async fn get_application_by_id(&self, id: Uuid) -> Result<Option<Application>, ServiceError> {
        let state = self.state();
        state.check_available()?;
        Ok(state
            .applications
            .get(&id)
            .filter(|a| a.deleted_at.is_none())
            .cloned())
    }

    async fn list_applications(&self) -> Result<Vec<Application>, ServiceError> {
        let state = self.state();
        state.check_available()?;
        let mut apps: Vec<Application> = state
            .applications
            .values()
            .filter(|a| a.deleted_at.is_none())
            .cloned()
            .collect();
        apps.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(apps)
    }

    async fn create_application(&self, application: &Application) -> Result<(), ServiceError> {
        let mut state = self.state();
        state.check_available()?;
        if state
            .applications
            .values()
            .any(|a| a.code == application.code)
        {
            return Err(ServiceError::Conflict(format!(
                "application code '{}' already exists",
                application.code
            )));
        }
        state
            .applications
            .insert(application.id, application.clone());
        Ok(())
    }

    async fn get_role_by_id(&self, id: Uuid) -> Result<Option<Role>, ServiceError> {
        let state = self.state();
        state.check_available()?;
        Ok(state.live_role(&id).cloned())
    }

    async fn get_role_by_application_and_code(
        &self,
        application_id: Uuid,
        code: &str,
    ) -> Result<Option<Role>, ServiceError> {
        let state = self.state();
        state.check_available()?;
        Ok(state
            .roles
            .values()
            .find(|r| {
                r.deleted_at.is_none()
                    && r.scope == RoleScope::Application(application_id)
                    && r.code == code
            })
            .cloned())
    }

    async fn get_global_roles_by_user(&self, user_id: Uuid) -> Result<Vec<Role>, ServiceError> {
        let state = self.state();
        state.check_available()?;
        Ok(state
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .filter_map(|(_, r)| state.live_role(r))
            .filter(|r| r.is_global())
            .cloned()
            .collect())
    }

    async fn get_roles_by_user_and_application(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<Vec<Role>, ServiceError> {
        let state = self.state();
        state.check_available()?;
        Ok(state
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .filter_map(|(_, r)| state.live_role(r))
            .filter(|r| r.scope == RoleScope::Application(application_id))
            .cloned()
            .collect())
    }

    async fn create_role(&self, role: &Role) -> Result<(), ServiceError> {
        let mut state = self.state();
        state.check_available()?;
        if state
            .roles
            .values()
            .any(|r| r.deleted_at.is_none() && r.scope == role.scope && r.code == role.code)
        {
            return Err(ServiceError::Conflict(format!(
                "role code '{}' already exists in this scope",
                role.code
            )));
        }
        state.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn get_permission_by_application_and_code(
        &self,
        application_id: Uuid,
        code: &str,
    ) -> Result<Option<Permission>, ServiceError> {
        let state = self.state();
        state.check_available()?;
        Ok(state
            .permissions
            .values()
            .find(|p| p.deleted_at.is_none() && p.application_id == application_id && p.code == code)
            .cloned())
    }

    async fn get_permissions_by_role(
        &self,
        role_id: Uuid,
    ) -> Result<Vec<Permission>, ServiceError> {
        self.get_permissions_by_roles(&[role_id]).await
    }

    async fn get_permissions_by_roles(
        &self,
        role_ids: &[Uuid],
    ) -> Result<Vec<Permission>, ServiceError> {
        let state = self.state();
        state.check_available()?;
        let permission_ids: BTreeSet<Uuid> = state
            .role_permissions
            .iter()
            .filter(|(r, _)| role_ids.contains(r))
            .map(|(_, p)| *p)
            .collect();
        Ok(permission_ids
            .iter()
            .filter_map(|id| state.permissions.get(id))
            .filter(|p| p.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn upsert_permissions(&self, batch: &[Permission]) -> Result<(), ServiceError> {
        let mut state = self.state();
        state.check_available()?;
        state.upsert_calls += 1;
        if state.fail_upsert_call == Some(state.upsert_calls) {
            return Err(ServiceError::Dependency(format!(
                "injected failure on upsert call {}",
                state.upsert_calls
            )));
        }

        let now = Utc::now();
        for incoming in batch {
            let existing = state.permissions.values_mut().find(|p| {
                p.application_id == incoming.application_id && p.code == incoming.code
            });
            match existing {
                Some(p) => {
                    p.description = incoming.description.clone();
                    p.version = incoming.version;
                    p.updated_at = now;
                    p.deleted_at = None;
                }
                None => {
                    state.permissions.insert(incoming.id, incoming.clone());
                }
            }
        }
        Ok(())
    }

    async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<(), ServiceError> {
        let mut state = self.state();
        state.check_available()?;
        state.role_permissions.retain(|(r, _)| *r != role_id);
        state
            .role_permissions
            .extend(permission_ids.iter().map(|p| (role_id, *p)));
        Ok(())
    }

    async fn replace_user_roles(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        role_ids: &[Uuid],
    ) -> Result<(), ServiceError> {
        let mut state = self.state();
        state.check_available()?;
        let in_application: HashSet<Uuid> = state
            .roles
            .values()
            .filter(|r| r.scope == RoleScope::Application(application_id))
            .map(|r| r.id)
            .collect();
        state
            .user_roles
            .retain(|(u, r)| !(*u == user_id && in_application.contains(r)));
        state
            .user_roles
            .extend(role_ids.iter().map(|r| (user_id, *r)));
        Ok(())
    }
}
