use std::sync::Arc;

use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::{
    backend::Backend,
    chat::ChatError,
    chatbot::{self, CannedResponse, Reply},
    models::{Conversation, Message, NewConversation, NewMessage, SenderRole},
    AppResult, AppState,
};

#[derive(Deserialize)]
pub(crate) struct VisitorMessage {
    text: String,
}

#[derive(Serialize)]
pub(crate) struct Opened {
    conversation: Conversation,
    welcome: &'static str,
}

#[debug_handler(state = AppState)]
pub(crate) async fn open_conversation(
    State(backend): State<Arc<dyn Backend>>,
    Json(new): Json<NewConversation>,
) -> AppResult<(StatusCode, Json<Opened>)> {
    let conversation = backend.open_conversation(new).await?;
    tracing::info!("visitor opened conversation {}", conversation.id);

    Ok((
        StatusCode::CREATED,
        Json(Opened {
            conversation,
            welcome: chatbot::WELCOME,
        }),
    ))
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_message(
    State(backend): State<Arc<dyn Backend>>,
    Path(conversation_id): Path<String>,
    Json(VisitorMessage { text }): Json<VisitorMessage>,
) -> AppResult<Json<Message>> {
    let body = text.trim();
    if body.is_empty() {
        return Err(ChatError::EmptyMessage.into());
    }

    let message = backend
        .insert_message(NewMessage {
            conversation_id,
            sender: SenderRole::Visitor,
            body: body.to_owned(),
        })
        .await?;

    Ok(Json(message))
}

#[debug_handler(state = AppState)]
pub(crate) async fn bot(
    State(catalog): State<Arc<Vec<CannedResponse>>>,
    Json(VisitorMessage { text }): Json<VisitorMessage>,
) -> Json<Reply> {
    Json(chatbot::reply(&text, &catalog))
}
