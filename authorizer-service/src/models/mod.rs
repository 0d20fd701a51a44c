//! Domain models for the authorizer.

pub mod application;
pub mod claims;
pub mod permission;
pub mod role;
pub mod user;

pub use application::{Application, Metadata};
pub use claims::{AuthorizationEntry, ClaimsEnvelope, GLOBAL_APPLICATION, WILDCARD_PERMISSION};
pub use permission::Permission;
pub use role::{Role, RoleRow, RoleScope, GLOBAL_SCOPE};
pub use user::{SanitizedUser, User};
