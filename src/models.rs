use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: String,
    pub visitor_name: Option<String>,
    pub visitor_email: Option<String>,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Most recent open ticket, else the most recent one. Never stored on the row.
    #[sqlx(skip)]
    #[serde(default)]
    pub ticket: Option<Ticket>,
}

impl Conversation {
    pub fn is_archived(&self) -> bool {
        self.status == ConversationStatus::Archived
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewConversation {
    pub visitor_name: Option<String>,
    pub visitor_email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SenderRole {
    Visitor,
    Admin,
}

/// Where a message in a local timeline came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Loaded from history or received on the push channel.
    #[default]
    Stored,
    /// Written locally, not yet acknowledged by the backend.
    Pending,
    /// Our own write, acknowledged. A push echo of it must be ignored.
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender: SenderRole,
    pub body: String,
    pub created_at: DateTime<Utc>,

    #[sqlx(skip)]
    #[serde(default)]
    pub delivery: Delivery,
}

impl Message {
    pub fn is_pending(&self) -> bool {
        self.delivery == Delivery::Pending
    }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender: SenderRole,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ticket {
    pub id: String,
    pub conversation_id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTicket {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
}

/// Partial edit of a ticket's descriptive fields. Status is changed only by closing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
}

impl TicketEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.priority.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnalyticsEvent {
    pub id: String,
    pub event_type: String,
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub screen_resolution: Option<String>,
    pub referrer: Option<String>,
    pub timezone: Option<String>,
    pub platform: Option<String>,
    pub page_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAnalyticsEvent {
    pub event_type: String,
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub screen_resolution: Option<String>,
    pub referrer: Option<String>,
    pub timezone: Option<String>,
    pub platform: Option<String>,
    pub page_url: Option<String>,
}
