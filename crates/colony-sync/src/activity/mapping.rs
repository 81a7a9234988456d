//! Mapping of push messages onto activity events.
//!
//! [`map_message`] is pure: it looks at the message type, the payload and
//! the known rooms, and either produces an [`EventDraft`] or rejects the
//! message. Unknown types, missing room ids and odd payload shapes are all
//! rejections, never errors.

use colony_types::{ActivityKind, Message, Room, RoomId};
use serde::Deserialize;
use serde_json::Value;

use super::feed::EventDraft;
use crate::channels::{RUNS_CHANNEL, parse_room_channel};

/// Longest label, in characters, before it is cut with an ellipsis.
const MAX_LABEL_CHARS: usize = 60;

/// How task-run messages that carry no room id are attributed.
///
/// Run notifications arrive on the shared `runs` channel, which is not
/// room scoped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscopedRunPolicy {
    /// Attribute to the active room only when exactly one room is active;
    /// otherwise drop the event.
    #[default]
    SoleActiveRoom,
    /// Attribute to the first active room in the listing, even when several
    /// rooms are active.
    FirstActiveRoom,
}

impl UnscopedRunPolicy {
    fn resolve(self, rooms: &[Room]) -> Option<RoomId> {
        let mut active = rooms.iter().filter(|room| room.is_active());
        let first = active.next()?;
        match self {
            Self::FirstActiveRoom => Some(first.id),
            Self::SoleActiveRoom => active.next().is_none().then_some(first.id),
        }
    }
}

/// Activity kind for a message type, if the type is visualised.
pub fn kind_for(message_type: &str) -> Option<ActivityKind> {
    let kind = match message_type {
        "decision:created" => ActivityKind::DecisionProposed,
        "vote:cast" => ActivityKind::VoteCast,
        "decision:resolved" => ActivityKind::DecisionResolved,
        "escalation:created" => ActivityKind::EscalationRaised,
        "message:sent" => ActivityKind::MessageSent,
        "goal:updated" => ActivityKind::GoalUpdated,
        "skill:created" => ActivityKind::SkillCreated,
        "wallet:transfer" => ActivityKind::WalletTransfer,
        "run:started" => ActivityKind::TaskStarted,
        "run:completed" => ActivityKind::TaskCompleted,
        "run:failed" => ActivityKind::TaskFailed,
        _ => return None,
    };
    Some(kind)
}

/// Turn a push message into an event draft, or `None` when it should not
/// produce an event.
///
/// The room comes from `data.roomId` when present, else from a `room:{id}`
/// channel name. Messages on the shared runs channel without either fall
/// back to `policy`.
pub fn map_message(
    message: &Message,
    rooms: &[Room],
    policy: UnscopedRunPolicy,
) -> Option<EventDraft> {
    let kind = kind_for(&message.kind)?;
    let room_id = room_from_data(&message.data)
        .or_else(|| parse_room_channel(&message.channel))
        .or_else(|| {
            (message.channel == RUNS_CHANNEL)
                .then(|| policy.resolve(rooms))
                .flatten()
        })?;
    Some(EventDraft::new(kind, room_id, label_for(kind, &message.data)))
}

fn room_from_data(data: &Value) -> Option<RoomId> {
    match data.get("roomId")? {
        Value::Number(n) => n.as_u64().map(RoomId::new),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// First non-empty text among `keys`, numbers rendered as-is.
fn field(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match data.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn label_for(kind: ActivityKind, data: &Value) -> String {
    let label = match kind {
        ActivityKind::DecisionProposed => field(data, &["title", "proposal"])
            .map_or_else(|| "Decision proposed".to_owned(), |t| format!("Proposed: {t}")),
        ActivityKind::VoteCast => {
            let voter = field(data, &["voterName", "workerName"]);
            let vote = field(data, &["vote"]);
            match (voter, vote) {
                (Some(voter), Some(vote)) => format!("{voter} voted {vote}"),
                (Some(voter), None) => format!("{voter} voted"),
                (None, Some(vote)) => format!("Vote cast: {vote}"),
                (None, None) => "Vote cast".to_owned(),
            }
        }
        ActivityKind::DecisionResolved => field(data, &["outcome", "status"])
            .map_or_else(|| "Decision resolved".to_owned(), |o| format!("Decision {o}")),
        ActivityKind::EscalationRaised => field(data, &["question", "reason"])
            .map_or_else(|| "Escalation raised".to_owned(), |q| format!("Escalation: {q}")),
        ActivityKind::MessageSent => {
            let from = field(data, &["fromName", "from"]);
            let body = field(data, &["content", "subject"]);
            match (from, body) {
                (Some(from), Some(body)) => format!("{from}: {body}"),
                (Some(from), None) => format!("{from} sent a message"),
                (None, Some(body)) => body,
                (None, None) => "Message sent".to_owned(),
            }
        }
        ActivityKind::GoalUpdated => field(data, &["description", "title"])
            .map_or_else(|| "Goal updated".to_owned(), |g| format!("Goal: {g}")),
        ActivityKind::SkillCreated => field(data, &["name"])
            .map_or_else(|| "New skill".to_owned(), |n| format!("New skill: {n}")),
        ActivityKind::WalletTransfer => field(data, &["amount"])
            .map_or_else(|| "Wallet transfer".to_owned(), |a| format!("Transferred {a}")),
        ActivityKind::TaskStarted => task_label("started", data),
        ActivityKind::TaskCompleted => task_label("completed", data),
        ActivityKind::TaskFailed => task_label("failed", data),
        ActivityKind::WorkerThinking
        | ActivityKind::WorkerActing
        | ActivityKind::WorkerVoting
        | ActivityKind::WorkerRateLimited
        | ActivityKind::WorkerBlocked => "Worker activity".to_owned(),
    };
    truncate(label)
}

fn task_label(verb: &str, data: &Value) -> String {
    field(data, &["taskName", "name"])
        .map_or_else(|| format!("Task {verb}"), |name| format!("Task {verb}: {name}"))
}

fn truncate(label: String) -> String {
    if label.chars().count() <= MAX_LABEL_CHARS {
        return label;
    }
    let mut cut: String = label
        .chars()
        .take(MAX_LABEL_CHARS.saturating_sub(1))
        .collect();
    cut.push('…');
    cut
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use colony_types::RoomStatus;
    use serde_json::json;

    use super::*;

    fn room(id: u64, status: RoomStatus) -> Room {
        Room {
            id: RoomId::new(id),
            name: format!("room {id}"),
            status,
        }
    }

    fn map(channel: &str, kind: &str, data: Value, rooms: &[Room]) -> Option<EventDraft> {
        map_message(
            &Message::new(channel, kind, data),
            rooms,
            UnscopedRunPolicy::default(),
        )
    }

    #[test]
    fn room_channel_message_maps_with_channel_room() {
        let draft = map(
            "room:3",
            "vote:cast",
            json!({ "voterName": "scout", "vote": "yes" }),
            &[],
        )
        .unwrap();
        assert_eq!(draft.kind, ActivityKind::VoteCast);
        assert_eq!(draft.room_id, RoomId::new(3));
        assert_eq!(draft.label, "scout voted yes");
    }

    #[test]
    fn payload_room_id_wins_over_channel() {
        let draft = map("room:3", "goal:updated", json!({ "roomId": 8 }), &[]).unwrap();
        assert_eq!(draft.room_id, RoomId::new(8));
        let draft = map("runs", "run:started", json!({ "roomId": "5" }), &[]).unwrap();
        assert_eq!(draft.room_id, RoomId::new(5));
        assert_eq!(draft.label, "Task started");
    }

    #[test]
    fn every_catalog_type_has_a_kind() {
        let types = [
            ("decision:created", ActivityKind::DecisionProposed),
            ("vote:cast", ActivityKind::VoteCast),
            ("decision:resolved", ActivityKind::DecisionResolved),
            ("escalation:created", ActivityKind::EscalationRaised),
            ("message:sent", ActivityKind::MessageSent),
            ("goal:updated", ActivityKind::GoalUpdated),
            ("skill:created", ActivityKind::SkillCreated),
            ("wallet:transfer", ActivityKind::WalletTransfer),
            ("run:started", ActivityKind::TaskStarted),
            ("run:completed", ActivityKind::TaskCompleted),
            ("run:failed", ActivityKind::TaskFailed),
        ];
        for (message_type, kind) in types {
            assert_eq!(kind_for(message_type), Some(kind), "{message_type}");
        }
    }

    #[test]
    fn unknown_type_and_missing_room_are_rejected() {
        assert!(map("room:1", "room:renamed", json!({}), &[]).is_none());
        assert!(map("room:1", "", Value::Null, &[]).is_none());
        assert!(map("lobby", "vote:cast", json!({}), &[]).is_none());
        assert!(map("room:abc", "vote:cast", json!({}), &[]).is_none());
    }

    #[test]
    fn malformed_payloads_never_panic() {
        let payloads = [
            Value::Null,
            json!([1, 2, 3]),
            json!("text"),
            json!({ "roomId": -4 }),
            json!({ "roomId": 1.5 }),
            json!({ "roomId": { "nested": true } }),
            json!({ "title": 12, "vote": null, "content": [] }),
        ];
        for data in payloads {
            let _ = map("room:2", "decision:created", data.clone(), &[]);
            let _ = map("runs", "run:failed", data, &[]);
        }
        let draft = map("room:2", "decision:created", json!({ "roomId": -4 }), &[]).unwrap();
        assert_eq!(draft.room_id, RoomId::new(2));
    }

    #[test]
    fn unscoped_run_attributed_to_sole_active_room() {
        let rooms = [room(1, RoomStatus::Paused), room(2, RoomStatus::Active)];
        let draft = map("runs", "run:completed", json!({ "taskName": "scan" }), &rooms).unwrap();
        assert_eq!(draft.room_id, RoomId::new(2));
        assert_eq!(draft.label, "Task completed: scan");
    }

    #[test]
    fn unscoped_run_with_several_active_rooms_depends_on_policy() {
        let rooms = [room(4, RoomStatus::Active), room(6, RoomStatus::Active)];
        let message = Message::new(RUNS_CHANNEL, "run:started", json!({}));

        assert!(map_message(&message, &rooms, UnscopedRunPolicy::SoleActiveRoom).is_none());
        let draft = map_message(&message, &rooms, UnscopedRunPolicy::FirstActiveRoom).unwrap();
        assert_eq!(draft.room_id, RoomId::new(4));

        assert!(map_message(&message, &[], UnscopedRunPolicy::FirstActiveRoom).is_none());
    }

    #[test]
    fn fallback_applies_only_to_the_runs_channel() {
        let rooms = [room(1, RoomStatus::Active)];
        assert!(map("tasks", "run:started", json!({}), &rooms).is_none());
    }

    #[test]
    fn long_labels_are_truncated_on_char_boundaries() {
        let content = "é".repeat(200);
        let draft = map(
            "room:1",
            "message:sent",
            json!({ "from": "queen", "content": content }),
            &[],
        )
        .unwrap();
        assert_eq!(draft.label.chars().count(), MAX_LABEL_CHARS);
        assert!(draft.label.starts_with("queen: é"));
        assert!(draft.label.ends_with('…'));
    }
}
