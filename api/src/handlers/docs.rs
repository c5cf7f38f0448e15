// Interactive API documentation: Swagger UI page and the OpenAPI document it renders

use axum::{extract::State, response::Html, Json};
use serde_json::{json, Value};

use crate::state::AppState;

const SWAGGER_UI_VERSION: &str = "5";

/// Path of the OpenAPI document relative to the service root
pub const OPENAPI_PATH: &str = "/openapi.json";

/// URL of the OpenAPI document as seen by a browser, honouring the root path prefix
pub fn openapi_url(root_path: &str) -> String {
    format!("{}{}", root_path.trim_end_matches('/'), OPENAPI_PATH)
}

/// Swagger UI page
#[tracing::instrument(skip(state))]
pub async fn swagger_ui(State(state): State<AppState>) -> Html<String> {
    Html(render_swagger_ui(
        "APIs for Reports",
        &openapi_url(state.config.root_path()),
    ))
}

fn render_swagger_ui(title: &str, spec_url: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/swagger-ui-dist@{version}/swagger-ui.css">
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://cdn.jsdelivr.net/npm/swagger-ui-dist@{version}/swagger-ui-bundle.js"></script>
    <script>
        window.ui = SwaggerUIBundle({{
            url: "{spec_url}",
            dom_id: "#swagger-ui",
            layout: "BaseLayout",
            deepLinking: true,
            showExtensions: true,
            showCommonExtensions: true,
            presets: [SwaggerUIBundle.presets.apis, SwaggerUIBundle.SwaggerUIStandalonePreset]
        }});
    </script>
</body>
</html>"##,
        title = title,
        version = SWAGGER_UI_VERSION,
        spec_url = spec_url,
    )
}

/// OpenAPI document for the service
#[tracing::instrument(skip(state))]
pub async fn openapi_spec(State(state): State<AppState>) -> Json<Value> {
    Json(build_openapi(&state))
}

fn build_openapi(state: &AppState) -> Value {
    let report_names: Vec<&str> = state
        .config
        .reports
        .iter()
        .map(|r| r.name.as_str())
        .collect();

    let error_response = json!({
        "description": "Error",
        "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ErrorResponse" } } }
    });

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "APIs for GSTIN9R",
            "description": "APIs for GSTIN9R",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "servers": [{ "url": state.config.root_path() }],
        "paths": {
            "/health": {
                "get": {
                    "summary": "Database health check",
                    "responses": {
                        "200": { "description": "Database reachable" },
                        "503": error_response,
                    }
                }
            },
            "/reports": {
                "get": {
                    "summary": "List available reports",
                    "responses": { "200": { "description": "Report catalogue" } }
                }
            },
            "/reports/{name}": {
                "get": {
                    "summary": "Run a report",
                    "description": "Declared report parameters are passed as query-string values.",
                    "parameters": [{
                        "name": "name",
                        "in": "path",
                        "required": true,
                        "schema": { "type": "string", "enum": report_names },
                    }],
                    "responses": {
                        "200": { "description": "Report rows" },
                        "400": error_response,
                        "404": error_response,
                        "503": error_response,
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "ErrorResponse": {
                    "type": "object",
                    "required": ["error", "message", "trace_id"],
                    "properties": {
                        "error": { "type": "string" },
                        "message": { "type": "string" },
                        "trace_id": { "type": "string" },
                    }
                }
            }
        }
    })
}
