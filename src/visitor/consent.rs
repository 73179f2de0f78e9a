use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde_json::{json, Value};

use crate::{analytics::ConsentReport, backend::Backend, AppState};

/// Tracking failures never reach the visitor.
#[debug_handler(state = AppState)]
pub(crate) async fn consent(
    State(backend): State<Arc<dyn Backend>>,
    Json(report): Json<ConsentReport>,
) -> Json<Value> {
    let Some(event) = report.into_event() else {
        return Json(json!({ "recorded": false }));
    };

    match backend.record_event(event).await {
        Ok(event) => {
            tracing::debug!("recorded analytics event {}", event.id);
            Json(json!({ "recorded": true }))
        }
        Err(err) => {
            tracing::warn!("analytics event not recorded: {err}");
            Json(json!({ "recorded": false }))
        }
    }
}
