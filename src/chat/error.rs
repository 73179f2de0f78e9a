use serde::Serialize;
use thiserror::Error;

use crate::backend::BackendError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("no conversation selected")]
    NoSelection,

    #[error("conversation {0} is not in the inbox")]
    UnknownConversation(String),

    #[error("ticket needs a title")]
    MissingTicketTitle,

    #[error("ticket edit changes nothing")]
    EmptyTicketEdit,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Which operation put the inbox into its error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    LoadConversations,
    LoadMessages,
    Send,
    Archive,
}

impl FaultKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, FaultKind::LoadConversations | FaultKind::LoadMessages)
    }

    fn summary(self) -> &'static str {
        match self {
            FaultKind::LoadConversations => "Failed to load conversations",
            FaultKind::LoadMessages => "Failed to load messages",
            FaultKind::Send => "Failed to send message",
            FaultKind::Archive => "Failed to archive conversation",
        }
    }
}

/// Inline, dismissible error shown above the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub retryable: bool,
}

impl Fault {
    pub fn new(kind: FaultKind, err: &ChatError) -> Self {
        Self {
            kind,
            message: format!("{}: {err}", kind.summary()),
            retryable: kind.is_retryable(),
        }
    }
}
