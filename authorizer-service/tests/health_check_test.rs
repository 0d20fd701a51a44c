mod common;

use axum::http::StatusCode;
use common::TestApp;

#[tokio::test]
async fn health_check_returns_200() -> anyhow::Result<()> {
    let app = TestApp::spawn().await?;

    let response = app.get("/health", None).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["service"], "authorizer-service-test");
    assert_eq!(response.body["checks"]["postgresql"], "up");
    assert_eq!(response.body["checks"]["redis"], "up");
    Ok(())
}

#[tokio::test]
async fn health_check_reports_store_outage() -> anyhow::Result<()> {
    let app = TestApp::spawn().await?;
    app.store.set_unavailable(true);

    let response = app.get("/health", None).await?;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn security_headers_and_request_id_applied() -> anyhow::Result<()> {
    let app = TestApp::spawn().await?;

    let response = app.get("/health", None).await?;

    assert!(response.headers.contains_key("x-request-id"));
    assert_eq!(response.headers["x-content-type-options"], "nosniff");
    Ok(())
}

#[tokio::test]
async fn metrics_endpoint_exposes_counters() -> anyhow::Result<()> {
    authorizer_service::services::metrics::init_metrics()?;
    let app = TestApp::spawn().await?;

    app.get("/health", None).await?;
    let response = app.get("/metrics", None).await?;

    assert_eq!(response.status, StatusCode::OK);
    let text = response.body.as_str().unwrap_or_default();
    assert!(text.contains("http_requests_total"), "{}", text);
    Ok(())
}
