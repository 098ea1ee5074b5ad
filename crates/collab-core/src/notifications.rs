use crate::activity::{ActivityMessage, MessageCombiner};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// What an inbox notification points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// Backed by an activity message. `message` is the joined lookup and may be
    /// missing when the message is not loaded.
    Activity {
        attached_to: String,
        message: Option<ActivityMessage>,
    },
    /// Stands on its own and is never combined.
    Common {
        header: Option<String>,
        body: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxNotification {
    pub id: String,
    /// The notify context this notification is grouped under.
    pub context_id: String,
    pub user: String,
    pub is_viewed: bool,
    pub created_on: Option<i64>,
    pub modified_on: i64,
    pub kind: NotificationKind,
}

impl InboxNotification {
    pub fn timestamp(&self) -> i64 {
        self.created_on.unwrap_or(self.modified_on)
    }

    pub fn is_activity(&self) -> bool {
        matches!(self.kind, NotificationKind::Activity { .. })
    }
}

/// A notification as shown in the inbox, standing for one or more records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInboxNotification {
    #[serde(flatten)]
    pub notification: InboxNotification,
    pub combined_ids: Vec<String>,
}

impl DisplayInboxNotification {
    pub fn single(notification: InboxNotification) -> Self {
        Self {
            combined_ids: vec![notification.id.clone()],
            notification,
        }
    }

    /// Ids an action on this entry applies to.
    pub fn action_ids(&self) -> Vec<String> {
        if self.notification.is_activity() {
            self.combined_ids.clone()
        } else {
            vec![self.notification.id.clone()]
        }
    }
}

/// Notifications grouped by notify context id.
pub type NotificationsByContext = BTreeMap<String, Vec<InboxNotification>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxFilter {
    #[default]
    All,
    Unread,
    Read,
}

impl InboxFilter {
    pub fn accepts(self, notification: &InboxNotification) -> bool {
        match self {
            InboxFilter::All => true,
            InboxFilter::Unread => !notification.is_viewed,
            InboxFilter::Read => notification.is_viewed,
        }
    }
}

impl fmt::Display for InboxFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboxFilter::All => write!(f, "all"),
            InboxFilter::Unread => write!(f, "unread"),
            InboxFilter::Read => write!(f, "read"),
        }
    }
}

impl FromStr for InboxFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(InboxFilter::All),
            "unread" => Ok(InboxFilter::Unread),
            "read" => Ok(InboxFilter::Read),
            other => Err(format!("unknown inbox filter: {other}")),
        }
    }
}

/// Build the inbox display list.
///
/// Activity notifications are folded through `combiner`; each combined unit
/// becomes one entry whose `combined_ids` lists every notification of the unit.
/// `object_class` narrows doc-update messages to one object class; other message
/// kinds are kept. The result is newest first, ties in input order.
pub fn display_inbox_notifications(
    by_context: &NotificationsByContext,
    filter: InboxFilter,
    object_class: Option<&str>,
    combiner: &dyn MessageCombiner,
) -> Vec<DisplayInboxNotification> {
    let mut entries: Vec<DisplayInboxNotification> = Vec::new();
    // (notification, id of the message it refers to, looked-up message)
    let mut activity: Vec<(&InboxNotification, &str, Option<&ActivityMessage>)> = Vec::new();

    for notification in by_context.values().flatten().filter(|n| filter.accepts(n)) {
        match &notification.kind {
            NotificationKind::Activity {
                attached_to,
                message,
            } => activity.push((notification, attached_to.as_str(), message.as_ref())),
            NotificationKind::Common { .. } => {
                entries.push(DisplayInboxNotification::single(notification.clone()))
            }
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut messages: Vec<ActivityMessage> = activity
        .iter()
        .filter_map(|&(_, _, message)| message)
        .filter(|&message| seen.insert(message.id.as_str()))
        .filter(|message| match (object_class, message.doc_update()) {
            (Some(class), Some(update)) => update.object_class == class,
            _ => true,
        })
        .cloned()
        .collect();
    messages.sort_by(|a, b| combiner.compare(a, b));

    let message_count = messages.len();
    let mut skipped = 0usize;
    for unit in combiner.combine(messages) {
        let Some(&(primary, _, _)) = activity
            .iter()
            .find(|&&(_, attached_to, _)| attached_to == unit.message.id)
        else {
            skipped += 1;
            continue;
        };
        let combined_ids: Vec<String> = activity
            .iter()
            .filter(|&&(_, attached_to, _)| {
                attached_to == unit.message.id || unit.combined_ids.iter().any(|id| id == attached_to)
            })
            .map(|&(n, _, _)| n.id.clone())
            .collect();
        entries.push(DisplayInboxNotification {
            notification: primary.clone(),
            combined_ids,
        });
    }

    // Stable: equal timestamps keep their order.
    entries.sort_by(|a, b| b.notification.timestamp().cmp(&a.notification.timestamp()));

    tracing::debug!(
        "Inbox display ({}): {} activity notifications, {} messages, {} entries, {} units skipped",
        filter,
        activity.len(),
        message_count,
        entries.len(),
        skipped
    );
    entries
}

/// True when the unfiltered inbox has anything unread.
pub fn has_inbox_notifications(
    by_context: &NotificationsByContext,
    combiner: &dyn MessageCombiner,
) -> bool {
    display_inbox_notifications(by_context, InboxFilter::All, None, combiner)
        .iter()
        .any(|n| !n.notification.is_viewed)
}
