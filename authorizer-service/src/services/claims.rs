//! Claims resolution: turn a user plus an optional application scope into the
//! authorization entries that get signed into an access token.

use chrono::{Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use super::deadline::Deadline;
use super::error::ServiceError;
use super::store::AuthorizationStore;
use crate::models::{
    Application, AuthorizationEntry, ClaimsEnvelope, User, GLOBAL_APPLICATION, WILDCARD_PERMISSION,
};

#[derive(Clone)]
pub struct ClaimsResolver {
    store: Arc<dyn AuthorizationStore>,
    issuer: String,
    validity: Duration,
}

impl ClaimsResolver {
    pub fn new(store: Arc<dyn AuthorizationStore>, issuer: String, validity: Duration) -> Self {
        Self {
            store,
            issuer,
            validity,
        }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Resolve the user's claims.
    ///
    /// With an application code only that application is considered and an
    /// unknown code fails with `NotFound`. Without one every application is
    /// walked. Global roles always contribute a leading GLOBAL entry with the
    /// wildcard permission. Applications where the user holds no role are
    /// omitted.
    pub async fn build_claims(
        &self,
        user: &User,
        application_code: Option<&str>,
        deadline: Deadline,
    ) -> Result<ClaimsEnvelope, ServiceError> {
        deadline
            .run("build_claims", self.resolve(user, application_code))
            .await
    }

    async fn resolve(
        &self,
        user: &User,
        application_code: Option<&str>,
    ) -> Result<ClaimsEnvelope, ServiceError> {
        let mut authorization = Vec::new();

        let global_roles = self.store.get_global_roles_by_user(user.id).await?;
        if !global_roles.is_empty() {
            let roles: BTreeSet<String> = global_roles.into_iter().map(|r| r.code).collect();
            authorization.push(AuthorizationEntry {
                app: GLOBAL_APPLICATION.to_string(),
                roles: roles.into_iter().collect(),
                permissions: vec![WILDCARD_PERMISSION.to_string()],
            });
        }

        for application in self.target_applications(application_code).await? {
            if let Some(entry) = self.application_entry(user.id, &application).await? {
                authorization.push(entry);
            }
        }

        let now = Utc::now();
        let claims = ClaimsEnvelope {
            iss: self.issuer.clone(),
            sub: user.id.to_string(),
            aud: authorization.iter().map(|e| e.app.clone()).collect(),
            iat: now.timestamp(),
            exp: (now + self.validity).timestamp(),
            username: user.username.clone(),
            email: user.email.clone(),
            authorization,
        };

        tracing::debug!(
            user_id = %user.id,
            entries = claims.authorization.len(),
            global = claims.is_global(),
            "Resolved claims"
        );

        Ok(claims)
    }

    async fn target_applications(
        &self,
        application_code: Option<&str>,
    ) -> Result<Vec<Application>, ServiceError> {
        match application_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => {
                let application = self
                    .store
                    .get_application_by_code(code)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("application", code))?;
                Ok(vec![application])
            }
            None => self.store.list_applications().await,
        }
    }

    async fn application_entry(
        &self,
        user_id: Uuid,
        application: &Application,
    ) -> Result<Option<AuthorizationEntry>, ServiceError> {
        let roles = self
            .store
            .get_roles_by_user_and_application(user_id, application.id)
            .await?;
        if roles.is_empty() {
            return Ok(None);
        }

        let role_ids: Vec<Uuid> = roles.iter().map(|r| r.id).collect();
        let role_codes: BTreeSet<String> = roles.into_iter().map(|r| r.code).collect();

        // A role only ever carries its own application's permissions.
        let permission_codes: BTreeSet<String> = self
            .store
            .get_permissions_by_roles(&role_ids)
            .await?
            .into_iter()
            .filter(|p| p.application_id == application.id)
            .map(|p| p.code)
            .collect();

        Ok(Some(AuthorizationEntry {
            app: application.code.clone(),
            roles: role_codes.into_iter().collect(),
            permissions: permission_codes.into_iter().collect(),
        }))
    }
}
