use chrono::Utc;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use super::claims::ClaimsResolver;
use super::deadline::Deadline;
use super::error::ServiceError;
use super::jwt::TokenService;
use super::metrics::{self, LOGIN_ISSUED, LOGIN_REJECTED, LOGIN_REUSED};
use super::session::RefreshSessions;
use super::store::AuthorizationStore;
use crate::models::{ClaimsEnvelope, User};
use crate::utils::CredentialVerifier;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const DEFAULT_USER_PAGE_SIZE: u32 = 50;
pub const MAX_USER_PAGE_SIZE: u32 = 100;

/// Verified against when the login has no usable account, so every
/// rejection runs exactly one hash verification.
const DECOY_PASSWORD: &str = "decoy-password-never-issued";

/// How long a previously issued access token may be handed back at login
/// instead of minting a new one.
///
/// A reused token is not re-resolved, so role or permission changes made
/// after it was issued stay invisible until it expires or ages out of this
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReusePolicy {
    Disabled,
    MaxAge(chrono::Duration),
}

impl ReusePolicy {
    /// Zero or negative disables reuse.
    pub fn from_seconds(seconds: i64) -> Self {
        if seconds <= 0 {
            ReusePolicy::Disabled
        } else {
            ReusePolicy::MaxAge(chrono::Duration::seconds(seconds))
        }
    }

    fn admits(&self, claims: &ClaimsEnvelope, now: i64) -> bool {
        match self {
            ReusePolicy::Disabled => false,
            ReusePolicy::MaxAge(max_age) => {
                let age = now - claims.iat;
                (0..=max_age.num_seconds()).contains(&age)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginCommand {
    pub email: String,
    pub password: String,
    /// Restrict claims to one application. Empty or absent means all.
    pub application: Option<String>,
    /// An access token from an earlier login, offered for reuse.
    pub presented_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub access_token: String,
    /// Absent when the presented token was reused.
    pub refresh_token: Option<String>,
    pub claims: ClaimsEnvelope,
    pub reused: bool,
}

#[derive(Debug, Clone)]
pub struct RefreshCommand {
    pub refresh_token: String,
    pub application: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub access_token: String,
    pub refresh_token: String,
    pub claims: ClaimsEnvelope,
}

#[derive(Debug, Clone)]
pub struct RegisterCommand {
    pub email: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub password: String,
}

/// Profile fields to change. `None` leaves a field as is; a blank value
/// clears it.
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileCommand {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

/// One page of users, newest first.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub page: u32,
    pub limit: u32,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthorizationStore>,
    credentials: Arc<dyn CredentialVerifier>,
    claims: ClaimsResolver,
    tokens: TokenService,
    sessions: RefreshSessions,
    reuse: ReusePolicy,
    decoy_hash: Arc<OnceLock<Option<String>>>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AuthorizationStore>,
        credentials: Arc<dyn CredentialVerifier>,
        claims: ClaimsResolver,
        tokens: TokenService,
        sessions: RefreshSessions,
        reuse: ReusePolicy,
    ) -> Self {
        Self {
            store,
            credentials,
            claims,
            tokens,
            sessions,
            reuse,
            decoy_hash: Arc::new(OnceLock::new()),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn refresh_ttl(&self) -> std::time::Duration {
        self.sessions.ttl()
    }

    // ==================== Login ====================

    pub async fn login(
        &self,
        command: LoginCommand,
        deadline: Deadline,
    ) -> Result<LoginOutcome, ServiceError> {
        let email = normalize_email(&command.email);
        if email.is_empty() {
            return Err(ServiceError::InvalidInput("email is required".to_string()));
        }
        if command.password.is_empty() {
            return Err(ServiceError::InvalidInput(
                "password is required".to_string(),
            ));
        }

        let result = self.authenticate(&email, &command, deadline).await;

        match &result {
            Ok(outcome) if outcome.reused => metrics::record_login(LOGIN_REUSED),
            Ok(_) => metrics::record_login(LOGIN_ISSUED),
            Err(ServiceError::InvalidCredentials) => metrics::record_login(LOGIN_REJECTED),
            Err(_) => {}
        }
        result
    }

    async fn authenticate(
        &self,
        email: &str,
        command: &LoginCommand,
        deadline: Deadline,
    ) -> Result<LoginOutcome, ServiceError> {
        let user = deadline
            .run("login.lookup_user", self.store.get_user_by_email(email))
            .await?;

        // Unknown, disabled and wrong-password logins all fail the same way.
        let user = match user {
            Some(user) if user.can_authenticate() => user,
            Some(_) => {
                self.verify_decoy(&command.password);
                tracing::info!(reason = "inactive", "Login rejected");
                return Err(ServiceError::InvalidCredentials);
            }
            None => {
                self.verify_decoy(&command.password);
                tracing::info!(reason = "unknown_user", "Login rejected");
                return Err(ServiceError::InvalidCredentials);
            }
        };
        if !self
            .credentials
            .verify(&user.password_hash, &command.password)
        {
            tracing::info!(user_id = %user.id, reason = "password_mismatch", "Login rejected");
            return Err(ServiceError::InvalidCredentials);
        }

        if let Some(presented) = command
            .presented_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            if let Some(claims) = self.reusable_claims(presented, &user) {
                tracing::info!(user_id = %user.id, "Reusing presented access token");
                return Ok(LoginOutcome {
                    user,
                    access_token: presented.to_string(),
                    refresh_token: None,
                    claims,
                    reused: true,
                });
            }
        }

        let claims = self
            .claims
            .build_claims(&user, command.application.as_deref(), deadline)
            .await?;
        let access_token = self.tokens.issue(&claims)?;
        let refresh_token = TokenService::generate_refresh_token();
        deadline
            .run(
                "login.store_refresh_token",
                self.sessions.store(user.id, &refresh_token),
            )
            .await?;

        tracing::info!(
            user_id = %user.id,
            applications = claims.authorization.len(),
            "Issued access token"
        );

        Ok(LoginOutcome {
            user,
            access_token,
            refresh_token: Some(refresh_token),
            claims,
            reused: false,
        })
    }

    fn verify_decoy(&self, password: &str) {
        let decoy = self.decoy_hash.get_or_init(|| {
            self.credentials
                .hash(DECOY_PASSWORD)
                .map_err(|e| tracing::error!(error = %e, "Failed to hash decoy password"))
                .ok()
        });
        if let Some(hash) = decoy {
            let _ = self.credentials.verify(hash, password);
        }
    }

    /// Claims of `token` if it may be handed back to `user` as-is.
    fn reusable_claims(&self, token: &str, user: &User) -> Option<ClaimsEnvelope> {
        let claims = self.tokens.validate(token).ok()?;
        if claims.user_id() != Some(user.id) {
            tracing::warn!(user_id = %user.id, "Presented token belongs to another subject");
            return None;
        }
        self.reuse
            .admits(&claims, Utc::now().timestamp())
            .then_some(claims)
    }

    // ==================== Refresh ====================

    /// Exchange a refresh token for new claims and a rotated refresh token.
    pub async fn refresh(
        &self,
        command: RefreshCommand,
        deadline: Deadline,
    ) -> Result<RefreshOutcome, ServiceError> {
        let presented = command.refresh_token.trim();
        if presented.is_empty() {
            return Err(ServiceError::InvalidInput(
                "refresh token is required".to_string(),
            ));
        }

        let user_id = deadline
            .run("refresh.resolve_token", self.sessions.resolve(presented))
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        let user = deadline
            .run("refresh.lookup_user", self.store.get_user_by_id(user_id))
            .await?;
        let user = match user {
            Some(user) if user.can_authenticate() => user,
            _ => {
                tracing::warn!(user_id = %user_id, "Refresh for missing or disabled user");
                deadline
                    .run("refresh.revoke", self.sessions.revoke(user_id))
                    .await?;
                return Err(ServiceError::InvalidToken);
            }
        };

        let claims = self
            .claims
            .build_claims(&user, command.application.as_deref(), deadline)
            .await?;
        let access_token = self.tokens.issue(&claims)?;
        let refresh_token = TokenService::generate_refresh_token();
        deadline
            .run(
                "refresh.rotate_token",
                self.sessions.store(user.id, &refresh_token),
            )
            .await?;

        tracing::info!(user_id = %user.id, "Refreshed access token");

        Ok(RefreshOutcome {
            access_token,
            refresh_token,
            claims,
        })
    }

    // ==================== Logout ====================

    /// Drop the user's refresh token. Issued access tokens stay valid until
    /// they expire.
    pub async fn logout(&self, user_id: Uuid, deadline: Deadline) -> Result<(), ServiceError> {
        deadline
            .run("logout", self.sessions.revoke(user_id))
            .await?;
        tracing::info!(user_id = %user_id, "Logged out");
        Ok(())
    }

    // ==================== Registration ====================

    pub async fn register(
        &self,
        command: RegisterCommand,
        deadline: Deadline,
    ) -> Result<User, ServiceError> {
        let email = normalize_email(&command.email);
        if email.is_empty() {
            return Err(ServiceError::InvalidInput("email is required".to_string()));
        }
        if command.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ServiceError::InvalidInput(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let username = command
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());

        let password_hash = self.credentials.hash(&command.password)?;
        let user = User::new(
            email,
            username,
            non_blank(command.full_name),
            non_blank(command.phone),
            password_hash,
        );

        deadline
            .run("register", self.store.create_user(&user))
            .await?;

        tracing::info!(user_id = %user.id, "Registered user");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: Uuid, deadline: Deadline) -> Result<User, ServiceError> {
        deadline
            .run("get_user", self.store.get_user_by_id(user_id))
            .await?
            .ok_or_else(|| ServiceError::not_found("user", user_id))
    }

    /// Page numbers start at 1. The page size defaults to 50 and is capped
    /// at 100.
    pub async fn list_users(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
        deadline: Deadline,
    ) -> Result<UserPage, ServiceError> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit
            .unwrap_or(DEFAULT_USER_PAGE_SIZE)
            .clamp(1, MAX_USER_PAGE_SIZE);
        let offset = i64::from(page - 1) * i64::from(limit);

        let users = deadline
            .run("list_users", self.store.list_users(i64::from(limit), offset))
            .await?;
        Ok(UserPage { users, page, limit })
    }

    pub async fn update_user(
        &self,
        user_id: Uuid,
        command: UpdateProfileCommand,
        deadline: Deadline,
    ) -> Result<User, ServiceError> {
        if command.full_name.is_none() && command.phone.is_none() {
            return Err(ServiceError::InvalidInput(
                "at least one of full_name or phone is required".to_string(),
            ));
        }

        let existing = self.get_user(user_id, deadline).await?;
        let full_name = match command.full_name {
            Some(value) => non_blank(Some(value)),
            None => existing.full_name,
        };
        let phone = match command.phone {
            Some(value) => non_blank(Some(value)),
            None => existing.phone,
        };

        let user = deadline
            .run(
                "update_user",
                self.store
                    .update_user(user_id, full_name.as_deref(), phone.as_deref()),
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("user", user_id))?;

        tracing::info!(user_id = %user.id, "Updated user profile");
        Ok(user)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
