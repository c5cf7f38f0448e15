// Router tests for the HTTP shell
// Uses a lazily connected pool: none of these routes needs a live database

use api::{create_router, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::config::{ParamKind, ReportDefinition, ReportParam, Settings};
use common::db::PgConnectionPool;
use proptest::prelude::*;
use std::sync::Arc;
use tower::ServiceExt;

fn settings(root_path: &str) -> Settings {
    let mut settings = Settings::default();
    settings.server.root_path = root_path.to_string();
    settings.database.min_connections = 0;
    settings.reports = vec![
        ReportDefinition {
            name: "filings".to_string(),
            description: "Filings for a GSTIN".to_string(),
            query: "SELECT * FROM filings WHERE gstin = %s".to_string(),
            params: vec![ReportParam::new("gstin", ParamKind::Text)],
        },
        ReportDefinition {
            name: "turnover".to_string(),
            description: "Turnover for a financial year".to_string(),
            query: "SELECT * FROM returns WHERE year = %s".to_string(),
            params: vec![ReportParam::new("year", ParamKind::Int)],
        },
    ];
    settings
}

fn app(settings: Settings) -> Router {
    let pool = Arc::new(PgConnectionPool::new(&settings.database));
    create_router(AppState::new(pool, settings, None))
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_docs_page_links_openapi_document() {
    let (status, body) = get(app(settings("/")), "/docs").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("swagger-ui"));
    assert!(body.contains(r#"url: "/openapi.json""#));
}

#[tokio::test]
async fn test_root_path_prefixes_every_route() {
    let (status, body) = get(app(settings("/gstin")), "/gstin/docs").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#"url: "/gstin/openapi.json""#));

    let (status, _) = get(app(settings("/gstin")), "/docs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_openapi_document_describes_reports() {
    let (status, body) = get(app(settings("/")), "/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["info"]["title"], "APIs for GSTIN9R");
    assert!(doc["paths"]["/reports/{name}"].is_object());
    assert_eq!(
        doc["paths"]["/reports/{name}"]["get"]["parameters"][0]["schema"]["enum"][0],
        "filings"
    );
}

#[tokio::test]
async fn test_report_catalogue_lists_configured_reports() {
    let (status, body) = get(app(settings("/")), "/reports").await;

    assert_eq!(status, StatusCode::OK);
    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["data"][0]["name"], "filings");
    assert_eq!(doc["data"][0]["params"][0]["name"], "gstin");
    assert_eq!(doc["data"][1]["params"][0]["type"], "int");
}

#[tokio::test]
async fn test_unknown_report_is_not_found() {
    let (status, body) = get(app(settings("/")), "/reports/missing").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["error"], "not_found");
    assert!(doc["trace_id"].is_string());
}

#[tokio::test]
async fn test_missing_report_parameter_is_rejected_before_touching_database() {
    let (status, body) = get(app(settings("/")), "/reports/filings").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("gstin"));
}

#[tokio::test]
async fn test_non_numeric_value_for_integer_parameter_is_rejected() {
    let (status, body) = get(app(settings("/")), "/reports/turnover?year=FY24").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["error"], "validation_error");
    assert!(doc["message"].as_str().unwrap().contains("year"));
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let (status, _) = get(app(settings("/")), "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// *For any* root path prefix, the docs page is served beneath it and points at the
/// prefixed OpenAPI document.
#[test]
fn property_docs_follow_root_path() {
    proptest!(|(prefix in "/[a-z]{1,12}")| {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (status, body) = runtime.block_on(async {
            get(app(settings(&prefix)), &format!("{}/docs", prefix)).await
        });

        prop_assert_eq!(status, StatusCode::OK);
        let expected = format!("url: \"{}/openapi.json\"", prefix);
        prop_assert!(body.contains(&expected));
    });
}
