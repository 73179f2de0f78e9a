mod chat;
mod consent;

use axum::{routing::post, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/conversations", post(chat::open_conversation))
        .route("/chat/conversations/{id}/messages", post(chat::send_message))
        .route("/chat/bot", post(chat::bot))
        .route("/analytics/consent", post(consent::consent))
}
