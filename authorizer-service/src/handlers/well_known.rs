use crate::AppState;
use service_core::axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};

/// Get JSON Web Key Set (JWKS)
///
/// Always exactly one key: the active signing key.
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    responses(
        (status = 200, description = "Public JWKS returned", body = crate::services::Jwks)
    ),
    tag = "Well-Known"
)]
pub async fn jwks(State(state): State<AppState>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(state.tokens.jwks()),
    )
}
