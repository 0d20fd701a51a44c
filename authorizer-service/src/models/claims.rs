//! The signed payload: who the user is and what they may do, per application.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pseudo-application code for the entry contributed by global roles.
pub const GLOBAL_APPLICATION: &str = "GLOBAL";

/// Permission granted by a global entry.
pub const WILDCARD_PERMISSION: &str = "*";

/// One application's (or GLOBAL's) roles and permissions.
///
/// `roles` and `permissions` are sorted and free of duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationEntry {
    pub app: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl AuthorizationEntry {
    pub fn is_global(&self) -> bool {
        self.app == GLOBAL_APPLICATION
    }

    pub fn grants(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == WILDCARD_PERMISSION || p == permission)
    }
}

/// Registered JWT claims plus the user's identity and authorization entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsEnvelope {
    pub iss: String,
    /// User id.
    pub sub: String,
    /// Application codes covered by `authorization`, plus GLOBAL when present.
    pub aud: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub username: String,
    pub email: String,
    pub authorization: Vec<AuthorizationEntry>,
}

impl ClaimsEnvelope {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn entry(&self, app: &str) -> Option<&AuthorizationEntry> {
        self.authorization.iter().find(|e| e.app == app)
    }

    pub fn is_global(&self) -> bool {
        self.authorization.iter().any(AuthorizationEntry::is_global)
    }

    /// A GLOBAL entry authorizes everything; otherwise the application's entry
    /// must list the permission or the wildcard.
    pub fn has_permission(&self, app: &str, permission: &str) -> bool {
        self.is_global() || self.entry(app).is_some_and(|e| e.grants(permission))
    }

    /// Seconds left before expiry, relative to `now`.
    pub fn expires_in(&self, now: i64) -> i64 {
        (self.exp - now).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(authorization: Vec<AuthorizationEntry>) -> ClaimsEnvelope {
        ClaimsEnvelope {
            iss: "authorizer".to_string(),
            sub: Uuid::now_v7().to_string(),
            aud: authorization.iter().map(|e| e.app.clone()).collect(),
            iat: 1_700_000_000,
            exp: 1_700_003_600,
            username: "jdoe".to_string(),
            email: "jdoe@example.com".to_string(),
            authorization,
        }
    }

    #[test]
    fn test_has_permission_scoped() {
        let claims = envelope(vec![AuthorizationEntry {
            app: "BILLING".to_string(),
            roles: vec!["clerk".to_string()],
            permissions: vec!["invoice.read".to_string()],
        }]);

        assert!(claims.has_permission("BILLING", "invoice.read"));
        assert!(!claims.has_permission("BILLING", "invoice.write"));
        assert!(!claims.has_permission("LEDGER", "invoice.read"));
    }

    #[test]
    fn test_global_entry_grants_everything() {
        let claims = envelope(vec![AuthorizationEntry {
            app: GLOBAL_APPLICATION.to_string(),
            roles: vec!["superadmin".to_string()],
            permissions: vec![WILDCARD_PERMISSION.to_string()],
        }]);

        assert!(claims.is_global());
        assert!(claims.has_permission("ANY_APP", "anything.at_all"));
    }

    #[test]
    fn test_wire_shape() {
        let claims = envelope(vec![AuthorizationEntry {
            app: "BILLING".to_string(),
            roles: vec!["clerk".to_string()],
            permissions: vec![],
        }]);
        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["aud"], serde_json::json!(["BILLING"]));
        assert_eq!(json["authorization"][0]["app"], "BILLING");
        assert_eq!(json["authorization"][0]["roles"][0], "clerk");
        assert!(json["authorization"][0]["permissions"].as_array().unwrap().is_empty());
        assert_eq!(claims.expires_in(1_700_003_000), 600);
        assert_eq!(claims.expires_in(1_800_000_000), 0);
    }
}
