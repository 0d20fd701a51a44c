use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::admin::CreateApplicationRequest,
    services::NewApplication,
    utils::ValidatedJson,
    AppState,
};

/// Register an application
#[utoipa::path(
    post,
    path = "/authorizer/v1/applications",
    request_body = CreateApplicationRequest,
    responses(
        (status = 201, description = "Application created", body = crate::models::Application),
        (status = 400, description = "Invalid or reserved code", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Missing AUTHORIZER:application.create", body = crate::dtos::ErrorResponse),
        (status = 409, description = "Code already in use", body = crate::dtos::ErrorResponse)
    ),
    tag = "Admin",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_application(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateApplicationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let application = state
        .directory
        .create_application(
            NewApplication {
                code: req.code,
                name: req.name,
                description: req.description,
                metadata: req.metadata,
            },
            state.deadline(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(application)))
}

/// List applications
#[utoipa::path(
    get,
    path = "/authorizer/v1/applications",
    responses(
        (status = 200, description = "All live applications", body = [crate::models::Application])
    ),
    tag = "Admin",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_applications(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let applications = state.directory.list_applications(state.deadline()).await?;
    Ok(Json(applications))
}
