use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use triage_core::{BatchReport, BatchResponse, FailureStatus, TriageError, TriageResult};
use triage_correlation::{render_html_table, TriagePipeline};
use triage_storage::TriageStore;

pub struct HubState {
    pipeline: TriagePipeline,
    store: Mutex<TriageStore>,
}

impl HubState {
    pub fn new(pipeline: TriagePipeline, store: TriageStore) -> Self {
        Self {
            pipeline,
            store: Mutex::new(store),
        }
    }

    fn triage(&self, incident_ids: &[u64]) -> Result<BatchReport, TriageError> {
        let store = self.store.lock().map_err(|_| TriageError::Upstream {
            message: "triage store lock poisoned".to_string(),
        })?;
        self.pipeline
            .triage_batch(&*store, &*store, incident_ids, Utc::now())
    }
}

pub fn router(hub: Arc<HubState>) -> Router {
    Router::new()
        .route("/api/resource", get(api_resource))
        .route("/show_table", post(show_table))
        .route("/health", get(|| async { "ok" }))
        .with_state(hub)
}

/// Accepts `incident_id` repeated and/or comma separated. No ids at all
/// selects the recent candidate incidents.
fn parse_incident_ids(pairs: &[(String, String)]) -> Result<Vec<u64>, String> {
    let mut ids = Vec::new();
    for (key, value) in pairs {
        if key != "incident_id" {
            continue;
        }
        for raw in value.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let id = raw
                .parse::<u64>()
                .map_err(|_| format!("incident_id {raw:?} is not a number"))?;
            ids.push(id);
        }
    }
    Ok(ids)
}

async fn api_resource(
    State(hub): State<Arc<HubState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let incident_ids = match parse_incident_ids(&pairs) {
        Ok(ids) => ids,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let requested = incident_ids.len();
    let outcome = tokio::task::spawn_blocking(move || hub.triage(&incident_ids)).await;
    match outcome {
        Ok(Ok(batch)) => {
            let response = batch.to_response();
            info!(
                event = "api_resource",
                requested,
                rows = response.results.len(),
                failures = response.failures.len(),
            );
            Json(response).into_response()
        }
        Ok(Err(err)) => {
            error!(event = "api_resource_failed", error = %err);
            let status = match (&err, err.status()) {
                (TriageError::MalformedInput { .. }, _) => StatusCode::BAD_REQUEST,
                (_, FailureStatus::Error) => StatusCode::BAD_GATEWAY,
                (_, FailureStatus::NoData) => StatusCode::NOT_FOUND,
            };
            error_response(status, err.to_string())
        }
        Err(err) => {
            error!(event = "api_resource_failed", error = %err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "triage task failed")
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TableRequest {
    Rows(Vec<TriageResult>),
    Response(BatchResponse),
}

async fn show_table(Json(request): Json<TableRequest>) -> Html<String> {
    let rows = match request {
        TableRequest::Rows(rows) => rows,
        TableRequest::Response(response) => response.results,
    };
    Html(render_html_table(&rows))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}
