use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::{ClaimsEnvelope, SanitizedUser};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "password123", min_length = 8)]
    pub password: String,

    #[validate(length(max = 64, message = "Username must be at most 64 characters"))]
    #[schema(example = "jdoe")]
    pub username: Option<String>,

    #[schema(example = "John Doe")]
    pub full_name: Option<String>,

    #[validate(length(max = 32, message = "Phone must be at most 32 characters"))]
    #[schema(example = "+14155550100")]
    pub phone: Option<String>,
}

/// Partial profile update. An omitted field is left unchanged; an empty
/// string clears it.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(max = 128, message = "Full name must be at most 128 characters"))]
    #[schema(example = "John Doe")]
    pub full_name: Option<String>,

    #[validate(length(max = 32, message = "Phone must be at most 32 characters"))]
    #[schema(example = "+14155550100")]
    pub phone: Option<String>,
}

/// Query params for listing users.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUsersQuery {
    /// 1-based page number. Defaults to 1.
    pub page: Option<u32>,
    /// Page size. Defaults to 50, capped at 100.
    pub limit: Option<u32>,
}

/// One page of users, newest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<SanitizedUser>,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,

    /// Restrict claims to one application code. Omit for all applications.
    #[schema(example = "BILLING")]
    pub application: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    #[schema(example = "q1Yx3r0b6m0kJ8m2w9qf3m6kz1p4l0s8c7v5b2n1x0A")]
    pub refresh_token: String,

    #[schema(example = "BILLING")]
    pub application: Option<String>,
}

/// Token pair returned by login and refresh.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Absent when a presented token was reused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Seconds until the access token expires.
    #[schema(example = 3600)]
    pub expires_in: i64,
    pub reused: bool,
}

impl TokenResponse {
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        claims: &ClaimsEnvelope,
        reused: bool,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: claims.expires_in(chrono::Utc::now().timestamp()),
            reused,
        }
    }
}
