use crate::config::CoreConfig;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    Create,
    Update,
    Remove,
}

/// An attribute or collection change of one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocUpdate {
    pub object_id: String,
    pub object_class: String,
    pub action: UpdateAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    /// The only kind that can be combined with its neighbours.
    DocUpdate(DocUpdate),
    Chat { text: String },
}

/// An entry of a document's activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityMessage {
    pub id: String,
    pub attached_to: String,
    pub attached_to_class: String,
    pub created_by: String,
    pub created_on: Option<i64>,
    pub modified_on: i64,
    pub kind: MessageKind,
}

impl ActivityMessage {
    pub fn timestamp(&self) -> i64 {
        self.created_on.unwrap_or(self.modified_on)
    }

    pub fn doc_update(&self) -> Option<&DocUpdate> {
        match &self.kind {
            MessageKind::DocUpdate(update) => Some(update),
            MessageKind::Chat { .. } => None,
        }
    }
}

/// Oldest first.
pub fn activity_messages_comparator(a: &ActivityMessage, b: &ActivityMessage) -> Ordering {
    a.timestamp().cmp(&b.timestamp())
}

/// One display unit: the newest message of the unit plus every message id it
/// stands for, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedMessage {
    pub message: ActivityMessage,
    pub combined_ids: Vec<String>,
}

impl CombinedMessage {
    fn single(message: ActivityMessage) -> Self {
        Self {
            combined_ids: vec![message.id.clone()],
            message,
        }
    }
}

/// Ordering and grouping of activity messages for display.
pub trait MessageCombiner: Send + Sync {
    fn compare(&self, a: &ActivityMessage, b: &ActivityMessage) -> Ordering {
        activity_messages_comparator(a, b)
    }

    /// Group messages already sorted by `compare`. Units come out newest first.
    fn combine(&self, sorted: Vec<ActivityMessage>) -> Vec<CombinedMessage>;
}

/// Folds consecutive doc-update messages about the same object, by the same
/// author, no further apart than `window_ms`.
#[derive(Debug, Clone, Copy)]
pub struct WindowCombiner {
    pub window_ms: i64,
}

impl WindowCombiner {
    pub fn new(window_ms: i64) -> Self {
        Self { window_ms }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.combine_window_ms)
    }

    fn joins(&self, unit: &CombinedMessage, next: &ActivityMessage) -> bool {
        let (Some(prev), Some(update)) = (unit.message.doc_update(), next.doc_update()) else {
            return false;
        };
        prev.action == UpdateAction::Update
            && update.action == UpdateAction::Update
            && prev.object_id == update.object_id
            && unit.message.attached_to == next.attached_to
            && unit.message.created_by == next.created_by
            && next.timestamp().abs_diff(unit.message.timestamp()) <= self.window_ms.unsigned_abs()
    }
}

impl MessageCombiner for WindowCombiner {
    fn combine(&self, sorted: Vec<ActivityMessage>) -> Vec<CombinedMessage> {
        let mut units: Vec<CombinedMessage> = Vec::new();
        for message in sorted {
            let joins = units.last().map_or(false, |unit| self.joins(unit, &message));
            if let (true, Some(unit)) = (joins, units.last_mut()) {
                unit.combined_ids.insert(0, message.id.clone());
                unit.message = message;
            } else {
                units.push(CombinedMessage::single(message));
            }
        }
        units.reverse();
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(id: &str, object: &str, by: &str, at: i64) -> ActivityMessage {
        ActivityMessage {
            id: id.into(),
            attached_to: object.into(),
            attached_to_class: "tracker:class:Issue".into(),
            created_by: by.into(),
            created_on: Some(at),
            modified_on: at,
            kind: MessageKind::DocUpdate(DocUpdate {
                object_id: object.into(),
                object_class: "tracker:class:Issue".into(),
                action: UpdateAction::Update,
            }),
        }
    }

    fn chat(id: &str, object: &str, at: i64) -> ActivityMessage {
        ActivityMessage {
            id: id.into(),
            attached_to: object.into(),
            attached_to_class: "tracker:class:Issue".into(),
            created_by: "alice".into(),
            created_on: Some(at),
            modified_on: at,
            kind: MessageKind::Chat { text: "hi".into() },
        }
    }

    fn ids(units: &[CombinedMessage]) -> Vec<(String, Vec<String>)> {
        units
            .iter()
            .map(|u| (u.message.id.clone(), u.combined_ids.clone()))
            .collect()
    }

    #[test]
    fn comparator_falls_back_to_modified_on() {
        let mut a = chat("a", "doc", 0);
        a.created_on = None;
        a.modified_on = 50;
        let b = chat("b", "doc", 40);
        assert_eq!(activity_messages_comparator(&a, &b), Ordering::Greater);
    }

    #[test]
    fn combines_close_updates_newest_first() {
        let combiner = WindowCombiner::new(1000);
        let units = combiner.combine(vec![
            update("m1", "doc", "alice", 100),
            update("m2", "doc", "alice", 500),
            update("m3", "doc", "alice", 900),
        ]);
        assert_eq!(
            ids(&units),
            vec![("m3".to_string(), vec!["m3".to_string(), "m2".to_string(), "m1".to_string()])]
        );
    }

    #[test]
    fn splits_on_window_author_and_object() {
        let combiner = WindowCombiner::new(100);
        let units = combiner.combine(vec![
            update("m1", "doc", "alice", 0),
            update("m2", "doc", "alice", 500),
            update("m3", "doc", "bob", 510),
            update("m4", "other", "bob", 520),
        ]);
        let primaries: Vec<String> = units.iter().map(|u| u.message.id.clone()).collect();
        assert_eq!(primaries, vec!["m4", "m3", "m2", "m1"]);
        assert!(units.iter().all(|u| u.combined_ids.len() == 1));
    }

    #[test]
    fn chat_messages_are_never_combined() {
        let combiner = WindowCombiner::new(10_000);
        let units = combiner.combine(vec![
            chat("c1", "doc", 1),
            chat("c2", "doc", 2),
            update("u1", "doc", "alice", 3),
        ]);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].message.id, "u1");
    }

    #[test]
    fn create_actions_start_their_own_unit() {
        let combiner = WindowCombiner::new(10_000);
        let mut created = update("m1", "doc", "alice", 0);
        if let MessageKind::DocUpdate(ref mut u) = created.kind {
            u.action = UpdateAction::Create;
        }
        let units = combiner.combine(vec![created, update("m2", "doc", "alice", 1)]);
        assert_eq!(units.len(), 2);
    }

    #[test]
    fn window_applies_in_either_sort_direction() {
        let combiner = WindowCombiner::new(100);
        let units = combiner.combine(vec![update("m2", "doc", "alice", 500), update("m1", "doc", "alice", 0)]);
        assert_eq!(units.len(), 2, "messages 500ms apart must not join a 100ms window");
    }

    #[test]
    fn window_comes_from_config() {
        let config = CoreConfig::from_toml_str("combine_window_ms = 50").expect("config");
        let combiner = WindowCombiner::from_config(&config);
        assert_eq!(combiner.window_ms, 50);
        let units = combiner.combine(vec![update("m1", "doc", "alice", 0), update("m2", "doc", "alice", 40)]);
        assert_eq!(units.len(), 1);
        let units = combiner.combine(vec![update("m1", "doc", "alice", 0), update("m2", "doc", "alice", 60)]);
        assert_eq!(units.len(), 2);
    }

    #[test]
    fn empty_input_yields_no_units() {
        assert!(WindowCombiner::new(10).combine(Vec::new()).is_empty());
    }
}
