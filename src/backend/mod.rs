//! The hosted-service contract the admin inbox runs against: record queries,
//! push subscriptions and the auth calls. `SqliteBackend` is the adapter the
//! binary ships with.

mod sqlite;

pub use sqlite::SqliteBackend;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::models::{
    AnalyticsEvent, Conversation, Message, NewAnalyticsEvent, NewConversation, NewMessage,
    NewTicket, Ticket, TicketEdit,
};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} {1} not found")]
    NotFound(&'static str, String),

    #[error("invalid credentials")]
    InvalidCredentials,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Row change delivered on the conversation-list channel.
#[derive(Debug, Clone)]
pub enum ConversationChange {
    Inserted(Conversation),
    Updated(Conversation),
}

impl ConversationChange {
    pub fn conversation(&self) -> &Conversation {
        match self {
            ConversationChange::Inserted(c) | ConversationChange::Updated(c) => c,
        }
    }
}

/// What a push subscription yields.
#[derive(Debug, Clone)]
pub enum Push<T> {
    Row(T),
    /// The receiver fell behind and this many rows were dropped.
    Lagged(u64),
}

type Filter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A live push channel. Dropping it unsubscribes.
pub struct Subscription<T> {
    name: String,
    rx: broadcast::Receiver<T>,
    filter: Filter<T>,
}

impl<T: Clone> Subscription<T> {
    pub fn new(name: impl Into<String>, rx: broadcast::Receiver<T>) -> Self {
        Self::filtered(name, rx, |_| true)
    }

    pub fn filtered(
        name: impl Into<String>,
        rx: broadcast::Receiver<T>,
        filter: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        tracing::debug!("subscribed to {name}");
        Self {
            name,
            rx,
            filter: Box::new(filter),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next matching row, `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<Push<T>> {
        loop {
            match self.rx.recv().await {
                Ok(row) if (self.filter)(&row) => return Some(Push::Row(row)),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => return Some(Push::Lagged(n)),
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        tracing::debug!("unsubscribed from {}", self.name);
    }
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub email: String,
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Every conversation, most recently updated first.
    async fn conversations(&self) -> BackendResult<Vec<Conversation>>;

    /// Every ticket, most recently created first.
    async fn tickets(&self) -> BackendResult<Vec<Ticket>>;

    /// History of one conversation, oldest first.
    async fn messages(&self, conversation_id: &str) -> BackendResult<Vec<Message>>;

    async fn open_conversation(&self, new: NewConversation) -> BackendResult<Conversation>;

    /// Stores the message and bumps the conversation's `updated_at`.
    async fn insert_message(&self, new: NewMessage) -> BackendResult<Message>;

    async fn archive_conversation(&self, id: &str) -> BackendResult<Conversation>;

    async fn insert_ticket(&self, conversation_id: &str, new: NewTicket) -> BackendResult<Ticket>;

    async fn edit_ticket(&self, id: &str, edit: TicketEdit) -> BackendResult<Ticket>;

    async fn close_ticket(&self, id: &str) -> BackendResult<Ticket>;

    async fn record_event(&self, new: NewAnalyticsEvent) -> BackendResult<AnalyticsEvent>;

    /// Every analytics event, most recent first.
    async fn analytics_events(&self) -> BackendResult<Vec<AnalyticsEvent>>;

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession>;

    async fn sign_out(&self, token: &str) -> BackendResult<()>;

    /// Email of the admin owning `token`, if the session is still live.
    async fn session_user(&self, token: &str) -> BackendResult<Option<String>>;

    /// Newly inserted messages of one conversation.
    fn subscribe_messages(&self, conversation_id: &str) -> Subscription<Message>;

    /// Inserts and updates of any conversation.
    fn subscribe_conversations(&self) -> Subscription<ConversationChange>;
}
