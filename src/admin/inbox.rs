use std::sync::Arc;

use axum::{debug_handler, extract::{Path, Query, State}, Json};
use serde::Deserialize;

use crate::{
    auth::Admin,
    chat::{inbox::{self, Tab}, AdminChat, ChatError, ChatResult, ChatState},
    models::{Conversation, Message},
    AppResult, AppState,
};

#[derive(Deserialize)]
pub(crate) struct TabQuery {
    #[serde(default)]
    tab: Tab,
}

#[derive(Deserialize)]
pub(crate) struct SendMessageQuery {
    pub(crate) text: String,
}

/// Backend failures of a load end up in the state as a retryable fault, so
/// the caller gets the state rather than an error status.
fn surfaced(result: ChatResult<()>) -> AppResult<()> {
    match result {
        Err(ChatError::Backend(err)) => {
            tracing::warn!("load failed: {err}");
            Ok(())
        }
        other => Ok(other?),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn state(
    _admin: Admin,
    State(chat): State<Arc<AdminChat>>,
) -> Json<ChatState> {
    Json(chat.snapshot())
}

#[debug_handler(state = AppState)]
pub(crate) async fn conversations(
    _admin: Admin,
    State(chat): State<Arc<AdminChat>>,
    Query(TabQuery { tab }): Query<TabQuery>,
) -> Json<Vec<Conversation>> {
    Json(inbox::filter(&chat.snapshot().conversations, tab))
}

#[debug_handler(state = AppState)]
pub(crate) async fn refresh(
    _admin: Admin,
    State(chat): State<Arc<AdminChat>>,
) -> AppResult<Json<ChatState>> {
    surfaced(chat.load_conversations().await)?;
    Ok(Json(chat.snapshot()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn select(
    _admin: Admin,
    State(chat): State<Arc<AdminChat>>,
    Path(id): Path<String>,
) -> AppResult<Json<ChatState>> {
    surfaced(chat.select_conversation(&id).await)?;
    Ok(Json(chat.snapshot()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn deselect(
    _admin: Admin,
    State(chat): State<Arc<AdminChat>>,
) -> Json<ChatState> {
    chat.deselect().await;
    Json(chat.snapshot())
}

#[debug_handler(state = AppState)]
pub(crate) async fn archive(
    _admin: Admin,
    State(chat): State<Arc<AdminChat>>,
    Path(id): Path<String>,
) -> AppResult<Json<ChatState>> {
    chat.archive_conversation(&id).await?;
    Ok(Json(chat.snapshot()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn send(
    _admin: Admin,
    State(chat): State<Arc<AdminChat>>,
    Json(SendMessageQuery { text }): Json<SendMessageQuery>,
) -> AppResult<Json<Message>> {
    Ok(Json(chat.send_message(&text).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn dismiss(
    _admin: Admin,
    State(chat): State<Arc<AdminChat>>,
) -> Json<ChatState> {
    chat.dismiss_error();
    Json(chat.snapshot())
}

#[debug_handler(state = AppState)]
pub(crate) async fn retry(
    _admin: Admin,
    State(chat): State<Arc<AdminChat>>,
) -> AppResult<Json<ChatState>> {
    surfaced(chat.retry().await)?;
    Ok(Json(chat.snapshot()))
}
