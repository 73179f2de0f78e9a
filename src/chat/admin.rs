use std::{mem::take, sync::Arc};

use chrono::Utc;
use serde::Serialize;
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::{Backend, ConversationChange, Push, Subscription},
    models::{Conversation, Message, NewMessage, NewTicket, SenderRole, Ticket, TicketEdit},
};

use super::{ChatError, ChatResult, Fault, FaultKind, inbox, timeline};

/// Everything the dashboard renders.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatState {
    pub conversations: Vec<Conversation>,
    pub selected: Option<Conversation>,
    pub messages: Vec<Message>,
    pub loading: bool,
    pub error: Option<Fault>,

    /// Bumped on every selection change. Results started under an older
    /// epoch are dropped.
    #[serde(skip)]
    epoch: u64,

    /// Bumped by every inbox reload. Only the latest reload may land.
    #[serde(skip)]
    inbox_generation: u64,

    /// Changes pushed while a reload is in flight, replayed over its result.
    #[serde(skip)]
    inbox_changes: Option<Vec<ConversationChange>>,
}

impl ChatState {
    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_ref().map(|c| c.id.as_str())
    }

    fn clear_selection(&mut self) {
        self.epoch += 1;
        self.selected = None;
        self.messages.clear();
        self.loading = false;
    }
}

type SharedState = Arc<watch::Sender<ChatState>>;

/// Admin side of the live chat. Owns the selection, its message timeline, the
/// conversation list and the push subscriptions feeding them.
pub struct AdminChat {
    backend: Arc<dyn Backend>,
    state: SharedState,
    message_feed: Mutex<Option<JoinHandle<()>>>,
    conversation_feed: Mutex<Option<JoinHandle<()>>>,
}

impl AdminChat {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Arc::new(watch::channel(ChatState::default()).0),
            message_feed: Mutex::new(None),
            conversation_feed: Mutex::new(None),
        }
    }

    pub fn watch(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// Subscribes to conversation changes, then loads the list.
    pub async fn start(&self) -> ChatResult<()> {
        let mut feed = self.conversation_feed.lock().await;
        stop(feed.take()).await;
        *feed = Some(spawn_conversation_feed(
            self.backend.clone(),
            self.state.clone(),
            self.backend.subscribe_conversations(),
        ));
        drop(feed);

        self.load_conversations().await
    }

    pub async fn shutdown(&self) {
        stop(self.message_feed.lock().await.take()).await;
        stop(self.conversation_feed.lock().await.take()).await;
    }

    pub async fn load_conversations(&self) -> ChatResult<()> {
        self.state.send_modify(|s| s.error = None);

        reload_inbox(self.backend.as_ref(), &self.state)
            .await
            .inspect_err(|err| {
                let fault = Fault::new(FaultKind::LoadConversations, err);
                self.state.send_modify(|s| s.error = Some(fault));
            })
    }

    pub async fn select_conversation(&self, id: &str) -> ChatResult<()> {
        let conversation = self
            .state
            .borrow()
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| ChatError::UnknownConversation(id.to_owned()))?;

        let mut feed = self.message_feed.lock().await;
        stop(feed.take()).await;

        let mut epoch = 0;
        self.state.send_modify(|s| {
            s.epoch += 1;
            epoch = s.epoch;
            s.selected = Some(conversation);
            s.messages.clear();
            s.loading = true;
            s.error = None;
        });

        // subscribe before fetching so rows inserted meanwhile are not missed
        *feed = Some(spawn_message_feed(
            self.backend.clone(),
            self.state.clone(),
            self.backend.subscribe_messages(id),
            id.to_owned(),
            epoch,
        ));
        drop(feed);

        match self.backend.messages(id).await {
            Ok(history) => {
                self.state.send_if_modified(|s| {
                    if s.epoch != epoch {
                        debug!("dropping stale history of {id}");
                        return false;
                    }
                    s.loading = false;
                    s.messages = timeline::absorb_history(take(&mut s.messages), history);
                    true
                });
                Ok(())
            }
            Err(err) => {
                let err = ChatError::from(err);
                let fault = Fault::new(FaultKind::LoadMessages, &err);
                self.state.send_if_modified(|s| {
                    if s.epoch != epoch {
                        return false;
                    }
                    s.loading = false;
                    s.error = Some(fault);
                    true
                });
                Err(err)
            }
        }
    }

    pub async fn deselect(&self) {
        let mut feed = self.message_feed.lock().await;
        stop(feed.take()).await;
        self.state.send_modify(ChatState::clear_selection);
    }

    /// Shows `text` right away, then swaps in the stored row once the backend
    /// has it. On failure the provisional entry is taken back out.
    pub async fn send_message(&self, text: &str) -> ChatResult<Message> {
        let body = text.trim();
        if body.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let mut target = None;
        self.state.send_if_modified(|s| {
            let Some(conversation_id) = s.selected_id().map(str::to_owned) else {
                return false;
            };
            let pending = timeline::provisional(&conversation_id, body, Utc::now());
            target = Some((conversation_id, pending.id.clone(), s.epoch));
            s.error = None;
            s.messages = timeline::append_pending(take(&mut s.messages), pending);
            true
        });
        let Some((conversation_id, temp_id, epoch)) = target else {
            return Err(ChatError::NoSelection);
        };

        let sent = self
            .backend
            .insert_message(NewMessage {
                conversation_id,
                sender: SenderRole::Admin,
                body: body.to_owned(),
            })
            .await;

        match sent {
            Ok(stored) => {
                let confirmed = stored.clone();
                self.state.send_if_modified(|s| {
                    if s.epoch != epoch {
                        return false;
                    }
                    s.messages = timeline::confirm(take(&mut s.messages), &temp_id, confirmed);
                    true
                });
                Ok(stored)
            }
            Err(err) => {
                let err = ChatError::from(err);
                warn!("send failed, rolling back {temp_id}: {err}");
                let fault = Fault::new(FaultKind::Send, &err);
                self.state.send_modify(|s| {
                    if s.epoch == epoch {
                        s.messages = timeline::rollback(take(&mut s.messages), &temp_id);
                    }
                    s.error = Some(fault);
                });
                Err(err)
            }
        }
    }

    pub async fn archive_conversation(&self, id: &str) -> ChatResult<()> {
        if let Err(err) = self.backend.archive_conversation(id).await {
            let err = ChatError::from(err);
            error!("Error archiving conversation {id}: {err}");
            let fault = Fault::new(FaultKind::Archive, &err);
            self.state.send_modify(|s| s.error = Some(fault));
            return Err(err);
        }

        let mut feed = self.message_feed.lock().await;
        let was_selected = self.state.borrow().selected_id() == Some(id);
        if was_selected {
            stop(feed.take()).await;
        }
        self.state.send_modify(|s| {
            s.conversations = inbox::mark_archived(take(&mut s.conversations), id);
            if was_selected {
                s.clear_selection();
            }
        });

        info!("archived conversation {id}");
        Ok(())
    }

    pub async fn create_ticket(&self, conversation_id: &str, new: NewTicket) -> ChatResult<Ticket> {
        if new.title.trim().is_empty() {
            return Err(ChatError::MissingTicketTitle);
        }

        let ticket = self
            .backend
            .insert_ticket(conversation_id, new)
            .await
            .inspect_err(|err| error!("Error creating ticket: {err}"))?;

        info!("opened ticket {} on {conversation_id}", ticket.id);
        self.reload_after_ticket_change().await;
        Ok(ticket)
    }

    pub async fn close_ticket(&self, id: &str) -> ChatResult<Ticket> {
        let ticket = self
            .backend
            .close_ticket(id)
            .await
            .inspect_err(|err| error!("Error closing ticket: {err}"))?;

        info!("closed ticket {id}");
        self.reload_after_ticket_change().await;
        Ok(ticket)
    }

    pub async fn edit_ticket(&self, id: &str, edit: TicketEdit) -> ChatResult<Ticket> {
        if edit.is_empty() {
            return Err(ChatError::EmptyTicketEdit);
        }

        let ticket = self
            .backend
            .edit_ticket(id, edit)
            .await
            .inspect_err(|err| error!("Error updating ticket: {err}"))?;

        self.reload_after_ticket_change().await;
        Ok(ticket)
    }

    pub fn dismiss_error(&self) -> bool {
        self.state.send_if_modified(|s| s.error.take().is_some())
    }

    /// Re-runs the load that failed. Send and archive failures are only cleared.
    pub async fn retry(&self) -> ChatResult<()> {
        let Some(fault) = self.state.borrow().error.clone() else {
            return Ok(());
        };

        match fault.kind {
            FaultKind::LoadConversations => self.load_conversations().await,
            FaultKind::LoadMessages => {
                let selected = self.state.borrow().selected_id().map(str::to_owned);
                match selected {
                    Some(id) => self.select_conversation(&id).await,
                    None => {
                        self.dismiss_error();
                        Ok(())
                    }
                }
            }
            FaultKind::Send | FaultKind::Archive => {
                self.dismiss_error();
                Ok(())
            }
        }
    }

    async fn reload_after_ticket_change(&self) {
        if let Err(err) = self.load_conversations().await {
            warn!("ticket saved but the inbox did not reload: {err}");
        }
    }
}

impl Drop for AdminChat {
    fn drop(&mut self) {
        for feed in [self.message_feed.get_mut(), self.conversation_feed.get_mut()] {
            if let Some(handle) = feed.take() {
                handle.abort();
            }
        }
    }
}

async fn stop(feed: Option<JoinHandle<()>>) {
    if let Some(handle) = feed {
        handle.abort();
        let _ = handle.await;
    }
}

/// Conversations, most recent first, each with its tracked ticket.
async fn fetch_inbox(backend: &dyn Backend) -> ChatResult<Vec<Conversation>> {
    let conversations = backend.conversations().await?;
    let tickets = backend.tickets().await.unwrap_or_else(|err| {
        warn!("tickets unavailable, listing conversations without them: {err}");
        Vec::new()
    });
    Ok(inbox::attach_tickets(conversations, &tickets))
}

/// Replaces the list with a fresh fetch, replaying whatever the feed applied
/// meanwhile. A reload overtaken by a newer one is dropped.
async fn reload_inbox(backend: &dyn Backend, state: &SharedState) -> ChatResult<()> {
    let mut generation = 0;
    state.send_modify(|s| {
        s.inbox_generation += 1;
        generation = s.inbox_generation;
        s.inbox_changes = Some(Vec::new());
        s.loading = true;
    });

    let fetched = fetch_inbox(backend).await;

    state.send_if_modified(|s| {
        if s.inbox_generation != generation {
            debug!("dropping inbox reload {generation}, superseded by {}", s.inbox_generation);
            return false;
        }
        let pushed = s.inbox_changes.take().unwrap_or_default();
        s.loading = false;
        if let Ok(conversations) = &fetched {
            s.conversations = inbox::absorb_fetched(conversations.clone(), pushed);
        }
        true
    });

    fetched.map(|_| ())
}

fn spawn_message_feed(
    backend: Arc<dyn Backend>,
    state: SharedState,
    mut subscription: Subscription<Message>,
    conversation_id: String,
    epoch: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("listening on {}", subscription.name());
        while let Some(push) = subscription.next().await {
            match push {
                Push::Row(message) => {
                    let id = message.id.clone();
                    state.send_if_modified(|s| {
                        if s.epoch != epoch {
                            return false;
                        }
                        match timeline::merge_pushed(take(&mut s.messages), message) {
                            Ok(messages) => {
                                s.messages = messages;
                                true
                            }
                            Err((messages, skip)) => {
                                debug!("skipping pushed message {id}: {skip:?}");
                                s.messages = messages;
                                false
                            }
                        }
                    });
                }
                Push::Lagged(missed) => {
                    warn!("{} missed {missed} rows, resyncing", subscription.name());
                    match backend.messages(&conversation_id).await {
                        Ok(history) => {
                            state.send_if_modified(|s| {
                                if s.epoch != epoch {
                                    return false;
                                }
                                s.messages = timeline::absorb_history(take(&mut s.messages), history);
                                true
                            });
                        }
                        Err(err) => warn!("resync of {conversation_id} failed: {err}"),
                    }
                }
            }
        }
        info!("{} closed", subscription.name());
    })
}

fn spawn_conversation_feed(
    backend: Arc<dyn Backend>,
    state: SharedState,
    mut subscription: Subscription<ConversationChange>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(push) = subscription.next().await {
            match push {
                Push::Row(change) => {
                    debug!("conversation {} changed", change.conversation().id);
                    state.send_modify(|s| {
                        if let Some(pushed) = s.inbox_changes.as_mut() {
                            pushed.push(change.clone());
                        }
                        if s.selected_id() == Some(change.conversation().id.as_str()) {
                            let ticket = s.selected.as_ref().and_then(|c| c.ticket.clone());
                            s.selected = Some(Conversation {
                                ticket,
                                ..change.conversation().clone()
                            });
                        }
                        s.conversations = inbox::apply_change(take(&mut s.conversations), change);
                    });
                }
                Push::Lagged(missed) => {
                    warn!("conversation list missed {missed} changes, reloading");
                    if let Err(err) = reload_inbox(backend.as_ref(), &state).await {
                        warn!("conversation reload failed: {err}");
                    }
                }
            }
        }
    })
}
