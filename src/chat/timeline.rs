//! Message timeline of the selected conversation.
//!
//! Every function takes the previous snapshot and returns the next one, so the
//! send path and the push path can both be applied against whatever the
//! latest state is when they land.

use chrono::{DateTime, Utc};

use crate::models::{Delivery, Message, SenderRole};

pub const TEMP_ID_PREFIX: &str = "temp-";

/// Why a pushed row was not added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Authored by the admin side, already shown through the optimistic path.
    OwnMessage,
    /// A row with the same id is already in the timeline.
    Duplicate,
}

pub fn temp_id() -> String {
    format!("{TEMP_ID_PREFIX}{}-{}", Utc::now().timestamp_millis(), rand::random::<u32>())
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Local admin message shown before the backend has stored it.
pub fn provisional(conversation_id: &str, body: &str, now: DateTime<Utc>) -> Message {
    Message {
        id: temp_id(),
        conversation_id: conversation_id.to_owned(),
        sender: SenderRole::Admin,
        body: body.to_owned(),
        created_at: now,
        delivery: Delivery::Pending,
    }
}

pub fn contains(messages: &[Message], id: &str) -> bool {
    messages.iter().any(|m| m.id == id)
}

pub fn append_pending(mut messages: Vec<Message>, pending: Message) -> Vec<Message> {
    messages.push(pending);
    messages
}

/// Swaps the pending entry `temp_id` for the stored row, in place. If the row
/// already made it into the timeline some other way, the pending entry is
/// just dropped.
pub fn confirm(messages: Vec<Message>, temp_id: &str, stored: Message) -> Vec<Message> {
    let stored = Message {
        delivery: Delivery::Confirmed,
        ..stored
    };

    if contains(&messages, &stored.id) {
        return rollback(messages, temp_id);
    }

    let mut messages: Vec<Message> = messages
        .into_iter()
        .map(|m| if m.id == temp_id { stored.clone() } else { m })
        .collect();
    messages.sort_by_key(|m| m.created_at);
    messages
}

pub fn rollback(messages: Vec<Message>, temp_id: &str) -> Vec<Message> {
    messages.into_iter().filter(|m| m.id != temp_id).collect()
}

/// Decides whether a row from the push channel belongs in the timeline.
pub fn admit(messages: &[Message], pushed: &Message) -> Result<(), Skip> {
    if pushed.sender == SenderRole::Admin {
        return Err(Skip::OwnMessage);
    }
    if contains(messages, &pushed.id) {
        return Err(Skip::Duplicate);
    }
    Ok(())
}

/// Inserts after every entry created at or before `message`.
pub fn insert_ordered(mut messages: Vec<Message>, message: Message) -> Vec<Message> {
    let at = messages.partition_point(|m| m.created_at <= message.created_at);
    messages.insert(at, message);
    messages
}

pub fn merge_pushed(messages: Vec<Message>, pushed: Message) -> Result<Vec<Message>, (Vec<Message>, Skip)> {
    match admit(&messages, &pushed) {
        Ok(()) => Ok(insert_ordered(messages, pushed)),
        Err(skip) => Err((messages, skip)),
    }
}

/// Lays freshly fetched history under the current timeline. Entries the
/// history does not know about yet (pending sends, rows pushed while the
/// fetch was in flight) are kept.
pub fn absorb_history(current: Vec<Message>, history: Vec<Message>) -> Vec<Message> {
    let mut merged = history;
    for message in current {
        if !contains(&merged, &message.id) {
            merged.push(message);
        }
    }
    merged.sort_by_key(|m| m.created_at);
    merged
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    fn msg(id: &str, sender: SenderRole, body: &str, secs: i64) -> Message {
        Message {
            id: id.to_owned(),
            conversation_id: "c1".to_owned(),
            sender,
            body: body.to_owned(),
            created_at: at(secs),
            delivery: Delivery::Stored,
        }
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn pushed_visitor_message_is_added_once() {
        let loaded = vec![
            msg("A", SenderRole::Visitor, "Hi", 0),
            msg("B", SenderRole::Admin, "Hello", 1),
        ];
        let c = msg("C", SenderRole::Visitor, "Are you open?", 2);

        let once = merge_pushed(loaded, c.clone()).unwrap();
        let (twice, skip) = merge_pushed(once, c).unwrap_err();

        assert_eq!(skip, Skip::Duplicate);
        assert_eq!(ids(&twice), ["A", "B", "C"]);
    }

    #[test]
    fn admin_echo_is_skipped() {
        let loaded = vec![msg("A", SenderRole::Visitor, "Hi", 0)];
        let echo = msg("m9", SenderRole::Admin, "On my way", 1);

        let (kept, skip) = merge_pushed(loaded, echo).unwrap_err();
        assert_eq!(skip, Skip::OwnMessage);
        assert_eq!(ids(&kept), ["A"]);
    }

    #[test]
    fn confirm_replaces_pending_by_temp_id() {
        let pending = provisional("c1", "Thanks", at(5));
        let temp = pending.id.clone();
        assert!(is_temp_id(&temp));

        let messages = append_pending(vec![msg("A", SenderRole::Visitor, "Hi", 0)], pending);
        let stored = msg("m123", SenderRole::Admin, "Thanks", 5);
        let messages = confirm(messages, &temp, stored);

        assert_eq!(ids(&messages), ["A", "m123"]);
        assert_eq!(messages[1].body, "Thanks");
        assert_eq!(messages[1].delivery, Delivery::Confirmed);
    }

    #[test]
    fn confirm_matches_id_not_body() {
        let first = provisional("c1", "ok", at(1));
        let second = provisional("c1", "ok", at(2));
        let second_id = second.id.clone();
        let messages = append_pending(append_pending(vec![], first.clone()), second);

        let messages = confirm(messages, &second_id, msg("m2", SenderRole::Admin, "ok", 2));

        assert_eq!(ids(&messages), [first.id.as_str(), "m2"]);
        assert!(messages[0].is_pending());
    }

    #[test]
    fn confirm_after_resync_does_not_duplicate() {
        let pending = provisional("c1", "Thanks", at(3));
        let temp = pending.id.clone();
        let stored = msg("m123", SenderRole::Admin, "Thanks", 3);

        let messages = append_pending(vec![], pending);
        let messages = absorb_history(messages, vec![stored.clone()]);
        let messages = confirm(messages, &temp, stored);

        assert_eq!(ids(&messages), ["m123"]);
    }

    #[test]
    fn rollback_removes_only_the_pending_entry() {
        let pending = provisional("c1", "Thanks", at(5));
        let temp = pending.id.clone();
        let messages = append_pending(vec![msg("A", SenderRole::Visitor, "Hi", 0)], pending);

        assert_eq!(ids(&rollback(messages, &temp)), ["A"]);
    }

    #[test]
    fn late_push_lands_in_time_order() {
        let messages = vec![
            msg("A", SenderRole::Visitor, "Hi", 0),
            msg("C", SenderRole::Admin, "Hello", 10),
        ];
        let b = msg("B", SenderRole::Visitor, "anyone?", 5);

        assert_eq!(ids(&merge_pushed(messages, b).unwrap()), ["A", "B", "C"]);
    }

    #[test]
    fn history_keeps_rows_pushed_during_fetch() {
        let pushed = msg("C", SenderRole::Visitor, "still there?", 9);
        let history = vec![
            msg("A", SenderRole::Visitor, "Hi", 0),
            msg("B", SenderRole::Admin, "Hello", 1),
        ];

        let merged = absorb_history(vec![pushed], history);
        assert_eq!(ids(&merged), ["A", "B", "C"]);
    }

    fn permutations(n: usize) -> Vec<Vec<usize>> {
        if n == 0 {
            return vec![vec![]];
        }
        permutations(n - 1)
            .into_iter()
            .flat_map(|order| {
                (0..=order.len()).map(move |at| {
                    let mut next = order.clone();
                    next.insert(at, n - 1);
                    next
                })
            })
            .collect()
    }

    #[test]
    fn interleavings_never_duplicate_ids() {
        #[derive(Clone, Copy, Debug)]
        enum Step {
            Send,
            Confirm,
            PushVisitor,
            PushVisitorAgain,
            PushEcho,
        }

        let steps = [Step::Send, Step::Confirm, Step::PushVisitor, Step::PushVisitorAgain, Step::PushEcho];
        let stored = msg("m1", SenderRole::Admin, "Thanks", 4);
        let visitor = msg("v1", SenderRole::Visitor, "Great", 4);

        for order in permutations(steps.len()) {
            let mut messages = vec![msg("A", SenderRole::Visitor, "Hi", 0)];
            let mut temp = None;
            for step in order.iter().map(|i| steps[*i]) {
                messages = match step {
                    Step::Send => {
                        let pending = provisional("c1", "Thanks", at(4));
                        temp = Some(pending.id.clone());
                        append_pending(messages, pending)
                    }
                    // a confirmation cannot arrive before the send
                    Step::Confirm => match &temp {
                        Some(temp) => confirm(messages, temp, stored.clone()),
                        None => messages,
                    },
                    Step::PushVisitor | Step::PushVisitorAgain => {
                        merge_pushed(messages, visitor.clone()).unwrap_or_else(|(m, _)| m)
                    }
                    Step::PushEcho => merge_pushed(messages, stored.clone()).unwrap_or_else(|(m, _)| m),
                };
            }

            let mut seen = ids(&messages);
            let len = seen.len();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), len, "duplicate ids after {order:?}");
            assert_eq!(messages.iter().filter(|m| m.id == "v1").count(), 1);
        }
    }
}
