use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    routing::{get, post},
    Router,
};
use tower_sessions::Session;

use crate::{backend::Backend, session::AUTH_TOKEN, AppError, AppState, Unauthorized};

mod login;
mod logout;

pub use login::login;
pub use logout::logout;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
}

/// `return_url` if it stays on this site, else `fallback`.
pub(crate) fn local_redirect<'a>(return_url: Option<&'a str>, fallback: &'a str) -> &'a str {
    match return_url {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\") => url,
        _ => fallback,
    }
}

/// A request from a signed-in admin. Rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct Admin {
    pub email: String,
}

impl<S> FromRequestParts<S> for Admin
where
    S: Send + Sync,
    Arc<dyn Backend>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::from(msg))?;

        let Some(token) = session.get::<String>(AUTH_TOKEN).await? else {
            return Err(Unauthorized.into());
        };

        let backend = Arc::<dyn Backend>::from_ref(state);
        match backend.session_user(&token).await? {
            Some(email) => Ok(Admin { email }),
            None => {
                // signed out elsewhere
                session.remove::<String>(AUTH_TOKEN).await?;
                Err(Unauthorized.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::local_redirect;

    #[test]
    fn redirects_stay_on_site() {
        assert_eq!(local_redirect(Some("/admin/conversations"), "/"), "/admin/conversations");
        assert_eq!(local_redirect(None, "/admin/state"), "/admin/state");
        assert_eq!(local_redirect(Some("https://evil.example"), "/"), "/");
        assert_eq!(local_redirect(Some("//evil.example"), "/"), "/");
        assert_eq!(local_redirect(Some("/\\evil.example"), "/"), "/");
        assert_eq!(local_redirect(Some(""), "/"), "/");
    }
}
