//! Roles, either bound to one application or global.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Scope marker stored on global roles.
pub const GLOBAL_SCOPE: &str = "GLOBAL";

/// Where a role applies.
///
/// A global role is a superuser marker: it is visible to every application's
/// claim resolution and implicitly grants every permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleScope {
    Global,
    Application(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: Uuid,
    pub scope: RoleScope,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    pub fn new(scope: RoleScope, code: String, name: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            scope,
            code,
            name,
            description,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn application_id(&self) -> Option<Uuid> {
        match self.scope {
            RoleScope::Application(id) => Some(id),
            RoleScope::Global => None,
        }
    }

    pub fn is_global(&self) -> bool {
        self.scope == RoleScope::Global
    }

    /// Column value for the `scope` marker.
    pub fn scope_marker(&self) -> Option<&'static str> {
        match self.scope {
            RoleScope::Global => Some(GLOBAL_SCOPE),
            RoleScope::Application(_) => None,
        }
    }
}

/// Row shape of the `roles` table.
#[derive(Debug, Clone, FromRow)]
pub struct RoleRow {
    pub id: Uuid,
    pub application_id: Option<Uuid>,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        let marked_global = row
            .scope
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(GLOBAL_SCOPE));

        let scope = match row.application_id {
            Some(app_id) if !marked_global => RoleScope::Application(app_id),
            _ => RoleScope::Global,
        };

        Self {
            id: row.id,
            scope,
            code: row.code,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(application_id: Option<Uuid>, scope: Option<&str>) -> RoleRow {
        RoleRow {
            id: Uuid::now_v7(),
            application_id,
            code: "admin".to_string(),
            name: "Admin".to_string(),
            description: None,
            scope: scope.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_scope_from_row() {
        let app = Uuid::now_v7();

        assert_eq!(Role::from(row(Some(app), None)).scope, RoleScope::Application(app));
        assert_eq!(Role::from(row(None, None)).scope, RoleScope::Global);
        assert_eq!(Role::from(row(None, Some("GLOBAL"))).scope, RoleScope::Global);
        // The marker wins over a stray application binding.
        assert_eq!(Role::from(row(Some(app), Some("global"))).scope, RoleScope::Global);
    }

    #[test]
    fn test_scope_marker() {
        let global = Role::new(RoleScope::Global, "root".into(), "Root".into(), None);
        assert_eq!(global.scope_marker(), Some(GLOBAL_SCOPE));
        assert_eq!(global.application_id(), None);

        let app = Uuid::now_v7();
        let scoped = Role::new(RoleScope::Application(app), "viewer".into(), "Viewer".into(), None);
        assert_eq!(scoped.scope_marker(), None);
        assert_eq!(scoped.application_id(), Some(app));
    }
}
