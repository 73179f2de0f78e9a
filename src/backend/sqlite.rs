use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{
    AnalyticsEvent, Conversation, ConversationStatus, Message, NewAnalyticsEvent,
    NewConversation, NewMessage, NewTicket, Ticket, TicketEdit, TicketStatus,
};

use super::{
    AuthSession, Backend, BackendError, BackendResult, ConversationChange, Subscription,
};

const SCHEMA: &str = include_str!("schema.sql");

/// SQLite-backed stand-in for the hosted service. Row inserts and updates are
/// fanned out to subscribers over broadcast channels after the write commits.
pub struct SqliteBackend {
    db_pool: SqlitePool,
    messages_tx: broadcast::Sender<Message>,
    conversations_tx: broadcast::Sender<ConversationChange>,
    admin_email: String,
    admin_password: String,
}

impl SqliteBackend {
    pub async fn connect(
        database_url: &str,
        push_capacity: usize,
        admin_email: impl Into<String>,
        admin_password: impl Into<String>,
    ) -> BackendResult<Self> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;

        Self::with_pool(db_pool, push_capacity, admin_email, admin_password).await
    }

    /// Single-connection in-memory database. The connection is never recycled,
    /// so the data lives as long as the backend.
    pub async fn in_memory(
        admin_email: impl Into<String>,
        admin_password: impl Into<String>,
    ) -> BackendResult<Self> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(db_pool, 64, admin_email, admin_password).await
    }

    pub async fn with_pool(
        db_pool: SqlitePool,
        push_capacity: usize,
        admin_email: impl Into<String>,
        admin_password: impl Into<String>,
    ) -> BackendResult<Self> {
        sqlx::raw_sql(SCHEMA).execute(&db_pool).await?;

        Ok(Self {
            db_pool,
            messages_tx: broadcast::channel(push_capacity).0,
            conversations_tx: broadcast::channel(push_capacity).0,
            admin_email: admin_email.into(),
            admin_password: admin_password.into(),
        })
    }

    /// Closes the pool. Every later query fails.
    pub async fn close(&self) {
        self.db_pool.close().await;
    }

    async fn conversation(&self, id: &str) -> BackendResult<Conversation> {
        sqlx::query_as("SELECT id,visitor_name,visitor_email,status,created_at,updated_at FROM conversations WHERE id=?")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| BackendError::NotFound("conversation", id.to_owned()))
    }

    async fn ticket(&self, id: &str) -> BackendResult<Ticket> {
        sqlx::query_as("SELECT id,conversation_id,title,description,priority,status,created_at,updated_at FROM tickets WHERE id=?")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| BackendError::NotFound("ticket", id.to_owned()))
    }

    fn publish_conversation(&self, change: ConversationChange) {
        // no receivers is fine
        let _ = self.conversations_tx.send(change);
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn conversations(&self) -> BackendResult<Vec<Conversation>> {
        Ok(
            sqlx::query_as("SELECT id,visitor_name,visitor_email,status,created_at,updated_at FROM conversations ORDER BY updated_at DESC, id DESC")
                .fetch_all(&self.db_pool)
                .await?
        )
    }

    async fn tickets(&self) -> BackendResult<Vec<Ticket>> {
        Ok(
            sqlx::query_as("SELECT id,conversation_id,title,description,priority,status,created_at,updated_at FROM tickets ORDER BY created_at DESC, id DESC")
                .fetch_all(&self.db_pool)
                .await?
        )
    }

    async fn messages(&self, conversation_id: &str) -> BackendResult<Vec<Message>> {
        Ok(
            sqlx::query_as("SELECT id,conversation_id,sender,body,created_at FROM messages WHERE conversation_id=? ORDER BY created_at ASC, id ASC")
                .bind(conversation_id)
                .fetch_all(&self.db_pool)
                .await?
        )
    }

    async fn open_conversation(&self, NewConversation { visitor_name, visitor_email }: NewConversation) -> BackendResult<Conversation> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        sqlx::query("INSERT INTO conversations (id,visitor_name,visitor_email,status,created_at,updated_at) VALUES (?,?,?,?,?,?)")
            .bind(&id)
            .bind(&visitor_name)
            .bind(&visitor_email)
            .bind(ConversationStatus::Active)
            .bind(now)
            .bind(now)
            .execute(&self.db_pool)
            .await?;

        let conversation = Conversation {
            id,
            visitor_name,
            visitor_email,
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
            ticket: None,
        };
        self.publish_conversation(ConversationChange::Inserted(conversation.clone()));
        Ok(conversation)
    }

    async fn insert_message(&self, NewMessage { conversation_id, sender, body }: NewMessage) -> BackendResult<Message> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();

        let mut tx = self.db_pool.begin().await?;
        let conversation: Conversation = sqlx::query_as("UPDATE conversations SET updated_at=? WHERE id=? RETURNING id,visitor_name,visitor_email,status,created_at,updated_at")
            .bind(now)
            .bind(&conversation_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| BackendError::NotFound("conversation", conversation_id.clone()))?;
        sqlx::query("INSERT INTO messages (id,conversation_id,sender,body,created_at) VALUES (?,?,?,?,?)")
            .bind(&id)
            .bind(&conversation_id)
            .bind(sender)
            .bind(&body)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let message = Message {
            id,
            conversation_id,
            sender,
            body,
            created_at: now,
            delivery: Default::default(),
        };
        // committed: nothing below may fail
        let _ = self.messages_tx.send(message.clone());
        self.publish_conversation(ConversationChange::Updated(conversation));

        Ok(message)
    }

    async fn archive_conversation(&self, id: &str) -> BackendResult<Conversation> {
        let updated = sqlx::query("UPDATE conversations SET status=? WHERE id=?")
            .bind(ConversationStatus::Archived)
            .bind(id)
            .execute(&self.db_pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(BackendError::NotFound("conversation", id.to_owned()));
        }

        let conversation = self.conversation(id).await?;
        self.publish_conversation(ConversationChange::Updated(conversation.clone()));
        Ok(conversation)
    }

    async fn insert_ticket(&self, conversation_id: &str, NewTicket { title, description, priority }: NewTicket) -> BackendResult<Ticket> {
        // the owning conversation must exist
        self.conversation(conversation_id).await?;

        let ticket = Ticket {
            id: Uuid::now_v7().to_string(),
            conversation_id: conversation_id.to_owned(),
            title,
            description,
            priority,
            status: TicketStatus::Open,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        sqlx::query("INSERT INTO tickets (id,conversation_id,title,description,priority,status,created_at,updated_at) VALUES (?,?,?,?,?,?,?,?)")
            .bind(&ticket.id)
            .bind(&ticket.conversation_id)
            .bind(&ticket.title)
            .bind(&ticket.description)
            .bind(ticket.priority)
            .bind(ticket.status)
            .bind(ticket.created_at)
            .bind(ticket.updated_at)
            .execute(&self.db_pool)
            .await?;

        Ok(ticket)
    }

    async fn edit_ticket(&self, id: &str, TicketEdit { title, description, priority }: TicketEdit) -> BackendResult<Ticket> {
        let updated = sqlx::query(
            "UPDATE tickets SET title=COALESCE(?,title), description=COALESCE(?,description), priority=COALESCE(?,priority), updated_at=? WHERE id=?"
        )
            .bind(title)
            .bind(description)
            .bind(priority)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db_pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(BackendError::NotFound("ticket", id.to_owned()));
        }

        self.ticket(id).await
    }

    async fn close_ticket(&self, id: &str) -> BackendResult<Ticket> {
        let updated = sqlx::query("UPDATE tickets SET status=?, updated_at=? WHERE id=?")
            .bind(TicketStatus::Closed)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db_pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(BackendError::NotFound("ticket", id.to_owned()));
        }

        self.ticket(id).await
    }

    async fn record_event(&self, new: NewAnalyticsEvent) -> BackendResult<AnalyticsEvent> {
        let event = AnalyticsEvent {
            id: Uuid::now_v7().to_string(),
            event_type: new.event_type,
            user_agent: new.user_agent,
            language: new.language,
            screen_resolution: new.screen_resolution,
            referrer: new.referrer,
            timezone: new.timezone,
            platform: new.platform,
            page_url: new.page_url,
            created_at: Utc::now(),
        };
        sqlx::query("INSERT INTO analytics_events (id,event_type,user_agent,language,screen_resolution,referrer,timezone,platform,page_url,created_at) VALUES (?,?,?,?,?,?,?,?,?,?)")
            .bind(&event.id)
            .bind(&event.event_type)
            .bind(&event.user_agent)
            .bind(&event.language)
            .bind(&event.screen_resolution)
            .bind(&event.referrer)
            .bind(&event.timezone)
            .bind(&event.platform)
            .bind(&event.page_url)
            .bind(event.created_at)
            .execute(&self.db_pool)
            .await?;

        Ok(event)
    }

    async fn analytics_events(&self) -> BackendResult<Vec<AnalyticsEvent>> {
        Ok(
            sqlx::query_as("SELECT id,event_type,user_agent,language,screen_resolution,referrer,timezone,platform,page_url,created_at FROM analytics_events ORDER BY created_at DESC, id DESC")
                .fetch_all(&self.db_pool)
                .await?
        )
    }

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        if !email.eq_ignore_ascii_case(&self.admin_email) || password != self.admin_password {
            return Err(BackendError::InvalidCredentials);
        }

        let token = Uuid::now_v7().simple().to_string();
        sqlx::query("INSERT INTO auth_sessions (token,email,created_at) VALUES (?,?,?)")
            .bind(&token)
            .bind(&self.admin_email)
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await?;

        Ok(AuthSession {
            token,
            email: self.admin_email.clone(),
        })
    }

    async fn sign_out(&self, token: &str) -> BackendResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE token=?")
            .bind(token)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn session_user(&self, token: &str) -> BackendResult<Option<String>> {
        let email: Option<(String,)> = sqlx::query_as("SELECT email FROM auth_sessions WHERE token=?")
            .bind(token)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(email.map(|(email,)| email))
    }

    fn subscribe_messages(&self, conversation_id: &str) -> Subscription<Message> {
        let wanted = conversation_id.to_owned();
        Subscription::filtered(
            format!("admin-messages:{conversation_id}"),
            self.messages_tx.subscribe(),
            move |message: &Message| message.conversation_id == wanted,
        )
    }

    fn subscribe_conversations(&self) -> Subscription<ConversationChange> {
        Subscription::new("admin-conversations-list", self.conversations_tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use crate::{backend::Push, models::{Priority, SenderRole}};

    use super::*;

    async fn backend() -> SqliteBackend {
        SqliteBackend::in_memory("admin@estospaces.com", "hunter2").await.unwrap()
    }

    #[tokio::test]
    async fn insert_message_bumps_conversation() {
        let backend = backend().await;
        let conversation = backend.open_conversation(NewConversation::default()).await.unwrap();

        let message = backend
            .insert_message(NewMessage {
                conversation_id: conversation.id.clone(),
                sender: SenderRole::Visitor,
                body: "Hi".to_owned(),
            })
            .await
            .unwrap();

        let listed = backend.conversations().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].updated_at >= message.created_at);
        assert_eq!(backend.messages(&conversation.id).await.unwrap(), vec![message]);
    }

    #[tokio::test]
    async fn insert_message_publishes_bumped_conversation() {
        let backend = backend().await;
        let conversation = backend.open_conversation(NewConversation::default()).await.unwrap();
        let mut changes = backend.subscribe_conversations();

        backend
            .insert_message(NewMessage {
                conversation_id: conversation.id.clone(),
                sender: SenderRole::Admin,
                body: "Hello".to_owned(),
            })
            .await
            .unwrap();

        let stored = backend.conversations().await.unwrap().remove(0);
        match changes.next().await {
            Some(Push::Row(ConversationChange::Updated(updated))) => {
                assert_eq!(updated.id, conversation.id);
                assert_eq!(updated.updated_at, stored.updated_at);
            }
            other => panic!("expected an update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn insert_message_into_unknown_conversation_fails() {
        let backend = backend().await;
        let err = backend
            .insert_message(NewMessage {
                conversation_id: "nope".to_owned(),
                sender: SenderRole::Admin,
                body: "Hello".to_owned(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::NotFound("conversation", _)));
        assert!(backend.messages("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_subscription_is_scoped_to_conversation() {
        let backend = backend().await;
        let a = backend.open_conversation(NewConversation::default()).await.unwrap();
        let b = backend.open_conversation(NewConversation::default()).await.unwrap();
        let mut sub = backend.subscribe_messages(&a.id);

        for conversation_id in [&b.id, &a.id] {
            backend
                .insert_message(NewMessage {
                    conversation_id: conversation_id.clone(),
                    sender: SenderRole::Visitor,
                    body: "ping".to_owned(),
                })
                .await
                .unwrap();
        }

        let Some(Push::Row(message)) = sub.next().await else {
            panic!("expected a row");
        };
        assert_eq!(message.conversation_id, a.id);
    }

    #[tokio::test]
    async fn ticket_edit_keeps_unset_fields() {
        let backend = backend().await;
        let conversation = backend.open_conversation(NewConversation::default()).await.unwrap();
        let ticket = backend
            .insert_ticket(&conversation.id, NewTicket {
                title: "Viewing".to_owned(),
                description: "Wants a viewing on Friday".to_owned(),
                priority: Priority::Low,
            })
            .await
            .unwrap();

        let edited = backend
            .edit_ticket(&ticket.id, TicketEdit {
                priority: Some(Priority::High),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(edited.title, "Viewing");
        assert_eq!(edited.priority, Priority::High);
        assert!(edited.is_open());

        let closed = backend.close_ticket(&ticket.id).await.unwrap();
        assert_eq!(closed.status, TicketStatus::Closed);
    }

    #[tokio::test]
    async fn sign_in_and_out() {
        let backend = backend().await;
        assert!(matches!(
            backend.sign_in("admin@estospaces.com", "wrong").await,
            Err(BackendError::InvalidCredentials)
        ));

        let session = backend.sign_in("Admin@Estospaces.com", "hunter2").await.unwrap();
        assert_eq!(backend.session_user(&session.token).await.unwrap().as_deref(), Some("admin@estospaces.com"));

        backend.sign_out(&session.token).await.unwrap();
        assert_eq!(backend.session_user(&session.token).await.unwrap(), None);
    }
}
