//! Services layer for the authorizer.
//!
//! Claims resolution, token issuance, permission catalog sync and role
//! assignment, all written against the store traits in `store` and `session`.

pub mod assignment;
pub mod auth;
pub mod claims;
mod database;
pub mod deadline;
pub mod directory;
pub mod error;
pub mod jwt;
pub mod keys;
pub mod metrics;
pub mod permission_sync;
pub mod session;
pub mod store;

pub use assignment::AssignmentManager;
pub use auth::{
    AuthService, LoginCommand, LoginOutcome, RefreshCommand, RefreshOutcome, RegisterCommand,
    ReusePolicy, UpdateProfileCommand, UserPage,
};
pub use claims::ClaimsResolver;
pub use database::PgAuthorizationStore;
pub use deadline::Deadline;
pub use directory::{DirectoryService, NewApplication, NewRole};
pub use error::{ErrorKind, ServiceError};
pub use jwt::TokenService;
pub use keys::{Jwk, Jwks, SigningKeys};
pub use permission_sync::{PermissionDeclaration, PermissionSynchronizer, SyncReport, SyncRequest};
pub use session::{MockSessionStore, RedisSessionStore, RefreshSessions, SessionStore};
pub use store::{AuthorizationStore, MockAuthorizationStore};
