mod analytics;
mod inbox;
mod tickets;
mod ws;

use axum::{routing::{get, patch, post}, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/state", get(inbox::state))
        .route("/ws", get(ws::admin_ws))
        .route("/conversations", get(inbox::conversations))
        .route("/conversations/refresh", post(inbox::refresh))
        .route("/conversations/{id}/select", post(inbox::select))
        .route("/conversations/{id}/archive", post(inbox::archive))
        .route("/conversations/{id}/tickets", post(tickets::create))
        .route("/deselect", post(inbox::deselect))
        .route("/messages", post(inbox::send))
        .route("/tickets/{id}", patch(tickets::edit))
        .route("/tickets/{id}/close", post(tickets::close))
        .route("/error/dismiss", post(inbox::dismiss))
        .route("/error/retry", post(inbox::retry))
        .route("/analytics", get(analytics::summary))
}
