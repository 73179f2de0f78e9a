use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{ws::Message as Frame, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};

use crate::{auth::Admin, chat::AdminChat, AppState};

use super::inbox::SendMessageQuery;

/// Streams a state snapshot on every change. Text frames `{"text": ...}` are
/// sent as admin messages.
#[debug_handler(state = AppState)]
pub async fn admin_ws(
    Admin { email }: Admin,
    State(chat): State<Arc<AdminChat>>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| {
        tracing::info!("{email} connected to the inbox feed");
        let mut rx = chat.watch();
        let (mut sender, mut receiver) = stream.split();

        let mut snapshot_task = tokio::spawn(async move {
            loop {
                let snapshot = serde_json::to_string(&*rx.borrow_and_update());
                let Ok(snapshot) = snapshot else {
                    break;
                };
                if sender.send(Frame::Text(snapshot.into())).await.is_err() {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });

        let mut command_task = tokio::spawn(async move {
            while let Some(Ok(frame)) = receiver.next().await {
                let Ok(SendMessageQuery { text }) = serde_json::from_slice(&frame.into_data()) else {
                    continue
                };

                if let Err(err) = chat.send_message(&text).await {
                    tracing::debug!("ws send rejected: {err}");
                }
            }
        });

        tokio::select! {
            _ = &mut snapshot_task => command_task.abort(),
            _ = &mut command_task => snapshot_task.abort(),
        };
        tracing::info!("{email} left the inbox feed");
    })
}
