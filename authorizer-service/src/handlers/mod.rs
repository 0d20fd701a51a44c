//! HTTP handlers for the authorizer.

pub mod applications;
pub mod assignment;
pub mod auth;
pub mod metrics;
pub mod permissions;
pub mod roles;
pub mod users;
pub mod well_known;

pub use applications::*;
pub use assignment::*;
pub use auth::*;
pub use permissions::*;
pub use roles::*;
pub use users::*;
