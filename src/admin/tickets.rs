use std::sync::Arc;

use axum::{debug_handler, extract::{Path, State}, Json};

use crate::{
    auth::Admin,
    chat::AdminChat,
    models::{NewTicket, Ticket, TicketEdit},
    AppResult, AppState,
};

#[debug_handler(state = AppState)]
pub(crate) async fn create(
    _admin: Admin,
    State(chat): State<Arc<AdminChat>>,
    Path(conversation_id): Path<String>,
    Json(new): Json<NewTicket>,
) -> AppResult<Json<Ticket>> {
    Ok(Json(chat.create_ticket(&conversation_id, new).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn close(
    _admin: Admin,
    State(chat): State<Arc<AdminChat>>,
    Path(id): Path<String>,
) -> AppResult<Json<Ticket>> {
    Ok(Json(chat.close_ticket(&id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn edit(
    _admin: Admin,
    State(chat): State<Arc<AdminChat>>,
    Path(id): Path<String>,
    Json(edit): Json<TicketEdit>,
) -> AppResult<Json<Ticket>> {
    Ok(Json(chat.edit_ticket(&id, edit).await?))
}
