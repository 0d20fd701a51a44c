pub mod auth;
pub mod metrics;
pub mod permission;

pub use auth::{auth_middleware, AuthUser};
pub use metrics::metrics_middleware;
pub use permission::require_permission;
