//! Conversation list, most recently active first.

use serde::Deserialize;

use crate::{
    backend::ConversationChange,
    models::{Conversation, ConversationStatus, Ticket},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Active,
    Archived,
}

/// The ticket a conversation shows: its most recent open one, else its most
/// recent one. `tickets` must be ordered most recent first.
pub fn tracked_ticket<'a>(conversation_id: &str, tickets: &'a [Ticket]) -> Option<&'a Ticket> {
    let mut own = tickets.iter().filter(|t| t.conversation_id == conversation_id);
    let latest = own.clone().next();
    own.find(|t| t.is_open()).or(latest)
}

pub fn attach_tickets(conversations: Vec<Conversation>, tickets: &[Ticket]) -> Vec<Conversation> {
    conversations
        .into_iter()
        .map(|c| Conversation {
            ticket: tracked_ticket(&c.id, tickets).cloned(),
            ..c
        })
        .collect()
}

pub fn apply_change(conversations: Vec<Conversation>, change: ConversationChange) -> Vec<Conversation> {
    match change {
        ConversationChange::Inserted(inserted) => {
            if conversations.iter().any(|c| c.id == inserted.id) {
                return conversations;
            }
            std::iter::once(inserted).chain(conversations).collect()
        }
        ConversationChange::Updated(updated) => {
            let mut prior_ticket = None;
            let rest: Vec<Conversation> = conversations
                .into_iter()
                .filter_map(|c| {
                    if c.id == updated.id {
                        prior_ticket = c.ticket;
                        None
                    } else {
                        Some(c)
                    }
                })
                .collect();

            // the row carries no ticket, keep the one we had
            let updated = Conversation {
                ticket: updated.ticket.or(prior_ticket),
                ..updated
            };
            std::iter::once(updated).chain(rest).collect()
        }
    }
}

/// A fetched list with the changes pushed while it was in flight laid over it,
/// in arrival order. Updated rows keep the ticket the fetch attached.
pub fn absorb_fetched(fetched: Vec<Conversation>, pushed: Vec<ConversationChange>) -> Vec<Conversation> {
    pushed.into_iter().fold(fetched, apply_change)
}

/// Marks `id` archived without moving it.
pub fn mark_archived(conversations: Vec<Conversation>, id: &str) -> Vec<Conversation> {
    conversations
        .into_iter()
        .map(|c| {
            if c.id == id {
                Conversation {
                    status: ConversationStatus::Archived,
                    ..c
                }
            } else {
                c
            }
        })
        .collect()
}

pub fn filter(conversations: &[Conversation], tab: Tab) -> Vec<Conversation> {
    conversations
        .iter()
        .filter(|c| match tab {
            Tab::Active => !c.is_archived(),
            Tab::Archived => c.is_archived(),
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::models::{Priority, TicketStatus};

    use super::*;

    fn conv(id: &str) -> Conversation {
        let at = Utc.timestamp_opt(1_760_000_000, 0).unwrap();
        Conversation {
            id: id.to_owned(),
            visitor_name: None,
            visitor_email: None,
            status: ConversationStatus::Active,
            created_at: at,
            updated_at: at,
            ticket: None,
        }
    }

    fn ticket(id: &str, conversation_id: &str, status: TicketStatus) -> Ticket {
        let at = Utc.timestamp_opt(1_760_000_000, 0).unwrap();
        Ticket {
            id: id.to_owned(),
            conversation_id: conversation_id.to_owned(),
            title: "Callback".to_owned(),
            description: String::new(),
            priority: Priority::Medium,
            status,
            created_at: at,
            updated_at: at,
        }
    }

    fn ids(conversations: &[Conversation]) -> Vec<&str> {
        conversations.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn open_ticket_wins_over_newer_closed_one() {
        // most recent first
        let tickets = vec![
            ticket("t3", "c1", TicketStatus::Closed),
            ticket("t2", "c1", TicketStatus::Open),
            ticket("t1", "c2", TicketStatus::Closed),
        ];

        assert_eq!(tracked_ticket("c1", &tickets).map(|t| t.id.as_str()), Some("t2"));
        assert_eq!(tracked_ticket("c2", &tickets).map(|t| t.id.as_str()), Some("t1"));
        assert_eq!(tracked_ticket("c3", &tickets), None);
    }

    #[test]
    fn insert_prepends_unless_known() {
        let list = vec![conv("a"), conv("b")];

        let list = apply_change(list, ConversationChange::Inserted(conv("c")));
        assert_eq!(ids(&list), ["c", "a", "b"]);

        let list = apply_change(list, ConversationChange::Inserted(conv("a")));
        assert_eq!(ids(&list), ["c", "a", "b"]);
    }

    #[test]
    fn update_moves_to_front_and_keeps_ticket() {
        let mut b = conv("b");
        b.ticket = Some(ticket("t1", "b", TicketStatus::Open));
        let list = vec![conv("a"), b];

        let list = apply_change(list, ConversationChange::Updated(conv("b")));

        assert_eq!(ids(&list), ["b", "a"]);
        assert_eq!(list[0].ticket.as_ref().map(|t| t.id.as_str()), Some("t1"));
    }

    #[test]
    fn pushed_changes_survive_a_stale_fetch() {
        let mut a = conv("a");
        a.ticket = Some(ticket("t1", "a", TicketStatus::Open));
        let fetched = vec![conv("b"), a];

        let list = absorb_fetched(
            fetched,
            vec![
                ConversationChange::Inserted(conv("c")),
                ConversationChange::Updated(conv("a")),
                ConversationChange::Inserted(conv("b")),
            ],
        );

        assert_eq!(ids(&list), ["a", "c", "b"]);
        assert_eq!(list[0].ticket.as_ref().map(|t| t.id.as_str()), Some("t1"));
    }

    #[test]
    fn archive_keeps_position_and_splits_tabs() {
        let list = mark_archived(vec![conv("a"), conv("b"), conv("c")], "b");

        assert_eq!(ids(&list), ["a", "b", "c"]);
        assert_eq!(ids(&filter(&list, Tab::Active)), ["a", "c"]);
        assert_eq!(ids(&filter(&list, Tab::Archived)), ["b"]);
    }
}
