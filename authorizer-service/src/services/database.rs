//! PostgreSQL implementation of the authorization store.

use async_trait::async_trait;
use sqlx::{postgres::PgPool, types::Json};
use uuid::Uuid;

use super::error::ServiceError;
use super::store::AuthorizationStore;
use crate::models::{Application, Permission, Role, RoleRow, User, GLOBAL_SCOPE};

const USER_COLUMNS: &str = "id, email, username, full_name, phone, password_hash, is_active, \
     created_at, updated_at, deleted_at";

const APPLICATION_COLUMNS: &str =
    "id, code, name, description, metadata, created_at, updated_at, deleted_at";

const ROLE_COLUMNS: &str = "r.id, r.application_id, r.code, r.name, r.description, r.scope, \
     r.created_at, r.updated_at, r.deleted_at";

const PERMISSION_COLUMNS: &str = "p.id, p.application_id, p.code, p.description, p.version, \
     p.created_by, p.created_at, p.updated_at, p.deleted_at";

/// Map a unique violation to `Conflict`, everything else to a database failure.
fn conflict_or_database(err: sqlx::Error, conflict: impl FnOnce() -> String) -> ServiceError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return ServiceError::Conflict(conflict());
        }
    }
    ServiceError::Database(err)
}

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct PgAuthorizationStore {
    pool: PgPool,
}

impl PgAuthorizationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AuthorizationStore for PgAuthorizationStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                ServiceError::Database(e)
            })?;
        Ok(())
    }

    // ==================== Users ====================

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let sql = format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1) AND deleted_at IS NULL",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, ServiceError> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_user(&self, user: &User) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users
                (id, email, username, full_name, phone, password_hash, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_or_database(e, || format!("email '{}' is already registered", user.email))
        })?;
        Ok(())
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>, ServiceError> {
        let sql = format!(
            "SELECT {} FROM users WHERE deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_user(
        &self,
        id: Uuid,
        full_name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<User>, ServiceError> {
        let sql = format!(
            "UPDATE users SET full_name = $2, phone = $3, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(full_name)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ==================== Applications ====================

    async fn get_application_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Application>, ServiceError> {
        let sql = format!(
            "SELECT {} FROM applications WHERE code = $1 AND deleted_at IS NULL",
            APPLICATION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Application>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_application_by_id(&self, id: Uuid) -> Result<Option<Application>, ServiceError> {
        let sql = format!(
            "SELECT {} FROM applications WHERE id = $1 AND deleted_at IS NULL",
            APPLICATION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Application>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_applications(&self) -> Result<Vec<Application>, ServiceError> {
        let sql = format!(
            "SELECT {} FROM applications WHERE deleted_at IS NULL ORDER BY code",
            APPLICATION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Application>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_application(&self, application: &Application) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO applications (id, code, name, description, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(application.id)
        .bind(&application.code)
        .bind(&application.name)
        .bind(&application.description)
        .bind(Json(&application.metadata))
        .bind(application.created_at)
        .bind(application.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_or_database(e, || {
                format!("application code '{}' already exists", application.code)
            })
        })?;
        Ok(())
    }

    // ==================== Roles ====================

    async fn get_role_by_id(&self, id: Uuid) -> Result<Option<Role>, ServiceError> {
        let sql = format!(
            "SELECT {} FROM roles r WHERE r.id = $1 AND r.deleted_at IS NULL",
            ROLE_COLUMNS
        );
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Role::from))
    }

    async fn get_role_by_application_and_code(
        &self,
        application_id: Uuid,
        code: &str,
    ) -> Result<Option<Role>, ServiceError> {
        let sql = format!(
            "SELECT {} FROM roles r \
             WHERE r.application_id = $1 AND r.code = $2 \
               AND r.scope IS DISTINCT FROM $3 AND r.deleted_at IS NULL",
            ROLE_COLUMNS
        );
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(application_id)
            .bind(code)
            .bind(GLOBAL_SCOPE)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Role::from))
    }

    async fn get_global_roles_by_user(&self, user_id: Uuid) -> Result<Vec<Role>, ServiceError> {
        let sql = format!(
            "SELECT {} FROM roles r \
             INNER JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1 AND r.deleted_at IS NULL \
               AND (r.scope = $2 OR r.application_id IS NULL) \
             ORDER BY r.code",
            ROLE_COLUMNS
        );
        let rows = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(user_id)
            .bind(GLOBAL_SCOPE)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn get_roles_by_user_and_application(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<Vec<Role>, ServiceError> {
        let sql = format!(
            "SELECT {} FROM roles r \
             INNER JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1 AND r.application_id = $2 \
               AND r.scope IS DISTINCT FROM $3 AND r.deleted_at IS NULL \
             ORDER BY r.code",
            ROLE_COLUMNS
        );
        let rows = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(user_id)
            .bind(application_id)
            .bind(GLOBAL_SCOPE)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn create_role(&self, role: &Role) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO roles
                (id, application_id, code, name, description, scope, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(role.id)
        .bind(role.application_id())
        .bind(&role.code)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.scope_marker())
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_or_database(e, || {
                format!("role code '{}' already exists in this scope", role.code)
            })
        })?;
        Ok(())
    }

    // ==================== Permissions ====================

    async fn get_permission_by_application_and_code(
        &self,
        application_id: Uuid,
        code: &str,
    ) -> Result<Option<Permission>, ServiceError> {
        let sql = format!(
            "SELECT {} FROM permissions p \
             WHERE p.application_id = $1 AND p.code = $2 AND p.deleted_at IS NULL",
            PERMISSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(application_id)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?)
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
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT DISTINCT {} FROM permissions p \
             INNER JOIN role_permissions rp ON rp.permission_id = p.id \
             WHERE rp.role_id = ANY($1) AND p.deleted_at IS NULL \
             ORDER BY p.code",
            PERMISSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Permission>(&sql)
            .bind(role_ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn upsert_permissions(&self, batch: &[Permission]) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        for permission in batch {
            sqlx::query(
                r#"
                INSERT INTO permissions
                    (id, application_id, code, description, version, created_by, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (application_id, code) DO UPDATE
                SET description = EXCLUDED.description,
                    version = EXCLUDED.version,
                    updated_at = EXCLUDED.updated_at,
                    deleted_at = NULL
                "#,
            )
            .bind(permission.id)
            .bind(permission.application_id)
            .bind(&permission.code)
            .bind(&permission.description)
            .bind(permission.version)
            .bind(permission.created_by)
            .bind(permission.created_at)
            .bind(permission.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ==================== Associations ====================

    async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        if !permission_ids.is_empty() {
            sqlx::query(
                "INSERT INTO role_permissions (role_id, permission_id) \
                 SELECT $1, UNNEST($2::uuid[])",
            )
            .bind(role_id)
            .bind(permission_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn replace_user_roles(
        &self,
        user_id: Uuid,
        application_id: Uuid,
        role_ids: &[Uuid],
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM user_roles ur USING roles r \
             WHERE ur.role_id = r.id AND ur.user_id = $1 AND r.application_id = $2 \
               AND r.scope IS DISTINCT FROM $3",
        )
        .bind(user_id)
        .bind(application_id)
        .bind(GLOBAL_SCOPE)
        .execute(&mut *tx)
        .await?;

        if !role_ids.is_empty() {
            sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) \
                 SELECT $1, UNNEST($2::uuid[])",
            )
            .bind(user_id)
            .bind(role_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
