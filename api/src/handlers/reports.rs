// Report endpoints: a catalogue of configured read queries and their execution

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;
use common::config::{ReportDefinition, ReportParam};
use common::db::{Row, SqlValue};
use common::errors::ValidationError;

/// Routes mounted under `/reports`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reports))
        .route("/:name", get(run_report))
}

#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub name: String,
    pub description: String,
    pub params: Vec<ReportParam>,
}

#[derive(Debug, Serialize)]
pub struct ReportOutput {
    pub report: String,
    pub row_count: usize,
    pub rows: Vec<Row>,
}

/// List configured reports
#[tracing::instrument(skip(state))]
pub async fn list_reports(State(state): State<AppState>) -> SuccessResponse<Vec<ReportSummary>> {
    let reports = state
        .config
        .reports
        .iter()
        .map(|r| ReportSummary {
            name: r.name.clone(),
            description: r.description.clone(),
            params: r.params.clone(),
        })
        .collect();

    SuccessResponse::new(reports)
}

/// Run a configured report, binding its declared parameters from the query string
///
/// Each value is parsed into the parameter's declared type so that integer and boolean
/// columns compare against typed binds rather than text.
#[tracing::instrument(skip(state, query))]
pub async fn run_report(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<SuccessResponse<ReportOutput>, ErrorResponse> {
    let report = state
        .report(&name)
        .ok_or_else(|| ValidationError::UnknownReport(name.clone()))?;
    let params = bind_params(report, &query)?;

    let mut db = state.database();
    let result = db.execute_query(&report.query, &params).await?;
    let rows = result.into_rows().unwrap_or_default();

    tracing::info!(report = %name, rows = rows.len(), "Report generated");

    Ok(SuccessResponse::new(ReportOutput {
        report: name,
        row_count: rows.len(),
        rows,
    }))
}

/// Values for the report's declared parameters, in declaration order
fn bind_params(
    report: &ReportDefinition,
    query: &HashMap<String, String>,
) -> Result<Vec<SqlValue>, ValidationError> {
    report
        .params
        .iter()
        .map(|param| {
            let raw = query
                .get(&param.name)
                .ok_or_else(|| ValidationError::MissingField(param.name.clone()))?;
            param.parse(raw)
        })
        .collect()
}
