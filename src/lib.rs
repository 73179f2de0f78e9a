pub mod admin;
pub mod analytics;
pub mod auth;
pub mod backend;
pub mod chat;
pub mod chatbot;
pub mod config;
pub mod models;
pub mod session;
pub mod visitor;

use std::sync::Arc;

use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}, Router};

use backend::{Backend, BackendError};
use chat::{AdminChat, ChatError};
use chatbot::CannedResponse;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub chat: Arc<AdminChat>,
    pub catalog: Arc<Vec<CannedResponse>>,
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .nest("/admin", admin::router())
        .merge(visitor::router())
        .with_state(app_state)
}

#[derive(Debug, thiserror::Error)]
#[error("not signed in")]
pub struct Unauthorized;

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        if self.0.is::<Unauthorized>() {
            return StatusCode::UNAUTHORIZED;
        }
        let backend_status = |err: &BackendError| match err {
            BackendError::NotFound(..) => StatusCode::NOT_FOUND,
            BackendError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            BackendError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if let Some(err) = self.0.downcast_ref::<ChatError>() {
            return match err {
                ChatError::EmptyMessage | ChatError::MissingTicketTitle | ChatError::EmptyTicketEdit => StatusCode::BAD_REQUEST,
                ChatError::NoSelection => StatusCode::CONFLICT,
                ChatError::UnknownConversation(_) => StatusCode::NOT_FOUND,
                ChatError::Backend(err) => backend_status(err),
            };
        }
        if let Some(err) = self.0.downcast_ref::<BackendError>() {
            return backend_status(err);
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{:#}", self.0);
            return (
                status,
                format!("{}\n\n{}", self.0, self.0.backtrace()),
            )
                .into_response();
        }
        (status, self.0.to_string()).into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(anyhow::Error);
apperr_impl!(serde_json::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);
apperr_impl!(BackendError);
apperr_impl!(ChatError);
apperr_impl!(Unauthorized);
