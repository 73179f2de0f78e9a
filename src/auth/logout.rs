use std::sync::Arc;

use axum::{debug_handler, extract::{Query, State}, response::Redirect};
use serde::Deserialize;
use tower_sessions::Session;

use super::local_redirect;
use crate::{backend::Backend, session::AUTH_TOKEN, AppResult, AppState};

#[derive(Deserialize)]
pub struct LogoutQuery {
    pub return_url: Option<String>,
}

#[debug_handler(state = AppState)]
pub async fn logout(
    Query(LogoutQuery { return_url }): Query<LogoutQuery>,
    State(backend): State<Arc<dyn Backend>>,
    session: Session,
) -> AppResult<Redirect> {
    if let Some(token) = session.get::<String>(AUTH_TOKEN).await? {
        backend.sign_out(&token).await?;
    }
    session.clear().await;
    Ok(Redirect::to(local_redirect(return_url.as_deref(), "/")))
}
