use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};

use crate::{analytics::{self, AnalyticsSummary}, auth::Admin, backend::Backend, AppResult, AppState};

#[debug_handler(state = AppState)]
pub(crate) async fn summary(
    _admin: Admin,
    State(backend): State<Arc<dyn Backend>>,
) -> AppResult<Json<AnalyticsSummary>> {
    let events = backend.analytics_events().await?;
    Ok(Json(analytics::summarize(&events)))
}
