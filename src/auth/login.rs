use std::sync::Arc;

use axum::{debug_handler, extract::State, response::Redirect, Form};
use serde::Deserialize;
use tower_sessions::Session;

use super::local_redirect;
use crate::{backend::Backend, session::AUTH_TOKEN, AppResult, AppState};

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub return_url: Option<String>,
}

#[debug_handler(state = AppState)]
pub async fn login(
    State(backend): State<Arc<dyn Backend>>,
    session: Session,

    Form(LoginForm { email, password, return_url }): Form<LoginForm>,
) -> AppResult<Redirect> {
    let auth = backend.sign_in(&email, &password).await?;

    session.cycle_id().await?;
    session.insert(AUTH_TOKEN, auth.token).await?;

    tracing::info!("welcome {}", auth.email);

    Ok(Redirect::to(local_redirect(return_url.as_deref(), "/admin/state")))
}
