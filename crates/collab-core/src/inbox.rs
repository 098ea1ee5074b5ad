use crate::error::Result;
use crate::notifications::{DisplayInboxNotification, InboxNotification, NotificationsByContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-user, per-document notification state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocNotifyContext {
    pub id: String,
    pub user: String,
    pub attached_to: String,
    pub attached_to_class: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub is_pinned: bool,
    pub last_viewed_timestamp: Option<i64>,
}

/// A single field change on a notify context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextUpdate {
    Hidden(bool),
    Pinned(bool),
    LastViewed(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorUpdate {
    Push(String),
    Pull(String),
}

/// The current user's inbox.
#[async_trait]
pub trait InboxClient: Send + Sync {
    async fn notifications(&self) -> anyhow::Result<Vec<InboxNotification>>;
    async fn notifications_by_context(&self) -> anyhow::Result<NotificationsByContext>;
    async fn read_notifications(&self, ids: &[String]) -> anyhow::Result<()>;
    async fn unread_notifications(&self, ids: &[String]) -> anyhow::Result<()>;
    async fn delete_notifications(&self, ids: &[String]) -> anyhow::Result<()>;
}

/// Workspace operations the inbox actions need beyond the inbox itself.
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    fn current_account(&self) -> &str;
    async fn update_context(&self, context: &DocNotifyContext, update: ContextUpdate) -> anyhow::Result<()>;
    async fn remove_context(&self, context: &DocNotifyContext) -> anyhow::Result<()>;
    /// Collaborators of a document, `None` when the document is missing or
    /// does not carry the collaborators mixin.
    async fn find_collaborators(&self, class: &str, id: &str) -> anyhow::Result<Option<Vec<String>>>;
    async fn update_collaborators(&self, class: &str, id: &str, update: CollaboratorUpdate) -> anyhow::Result<()>;
    async fn find_context_notification(&self, context_id: &str) -> anyhow::Result<Option<InboxNotification>>;
    async fn message_exists(&self, message_id: &str) -> anyhow::Result<bool>;
}

fn now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ----------------------------------------------------------------------------
// Notification actions
// ----------------------------------------------------------------------------

async fn any_with_viewed(inbox: &dyn InboxClient, doc: &DisplayInboxNotification, viewed: bool) -> Result<bool> {
    let ids = doc.action_ids();
    Ok(inbox
        .notifications()
        .await?
        .iter()
        .any(|n| n.is_viewed == viewed && ids.contains(&n.id)))
}

pub async fn has_mark_as_read_action(inbox: &dyn InboxClient, doc: &DisplayInboxNotification) -> Result<bool> {
    any_with_viewed(inbox, doc, false).await
}

pub async fn has_mark_as_unread_action(inbox: &dyn InboxClient, doc: &DisplayInboxNotification) -> Result<bool> {
    any_with_viewed(inbox, doc, true).await
}

pub async fn mark_as_read(inbox: &dyn InboxClient, doc: &DisplayInboxNotification) -> Result<()> {
    inbox.read_notifications(&doc.action_ids()).await?;
    Ok(())
}

pub async fn mark_as_unread(inbox: &dyn InboxClient, doc: &DisplayInboxNotification) -> Result<()> {
    inbox.unread_notifications(&doc.action_ids()).await?;
    Ok(())
}

pub async fn delete_notification(inbox: &dyn InboxClient, doc: &DisplayInboxNotification) -> Result<()> {
    let ids = doc.action_ids();
    tracing::debug!("Deleting {} inbox notifications", ids.len());
    inbox.delete_notifications(&ids).await?;
    Ok(())
}

// ----------------------------------------------------------------------------
// Notify context actions
// ----------------------------------------------------------------------------

pub fn has_pin_action(context: &DocNotifyContext) -> bool {
    !context.hidden && !context.is_pinned
}

pub fn has_unpin_action(context: &DocNotifyContext) -> bool {
    !context.hidden && context.is_pinned
}

pub fn has_hidden_context(contexts: &[DocNotifyContext]) -> bool {
    contexts.iter().any(|c| c.hidden)
}

pub fn is_context_hidden(context: &DocNotifyContext) -> bool {
    context.hidden
}

pub fn is_context_visible(context: &DocNotifyContext) -> bool {
    !context.hidden
}

pub async fn hide_context(workspace: &dyn WorkspaceClient, context: &DocNotifyContext) -> Result<()> {
    workspace.update_context(context, ContextUpdate::Hidden(true)).await?;
    Ok(())
}

pub async fn unhide_context(workspace: &dyn WorkspaceClient, context: &DocNotifyContext) -> Result<()> {
    workspace.update_context(context, ContextUpdate::Hidden(false)).await?;
    Ok(())
}

pub async fn pin_context(workspace: &dyn WorkspaceClient, context: &DocNotifyContext) -> Result<()> {
    workspace.update_context(context, ContextUpdate::Pinned(true)).await?;
    Ok(())
}

pub async fn unpin_context(workspace: &dyn WorkspaceClient, context: &DocNotifyContext) -> Result<()> {
    workspace.update_context(context, ContextUpdate::Pinned(false)).await?;
    Ok(())
}

async fn context_notifications(inbox: &dyn InboxClient, context: &DocNotifyContext) -> Result<Vec<InboxNotification>> {
    let mut by_context = inbox.notifications_by_context().await?;
    Ok(by_context.remove(&context.id).unwrap_or_default())
}

fn ids_of(notifications: &[InboxNotification]) -> Vec<String> {
    notifications.iter().map(|n| n.id.clone()).collect()
}

/// Anything unviewed in the context.
pub async fn can_read_context(inbox: &dyn InboxClient, context: &DocNotifyContext) -> Result<bool> {
    Ok(context_notifications(inbox, context)
        .await?
        .iter()
        .any(|n| !n.is_viewed))
}

/// Everything viewed, and at least one notification.
pub async fn can_unread_context(inbox: &dyn InboxClient, context: &DocNotifyContext) -> Result<bool> {
    let notifications = context_notifications(inbox, context).await?;
    Ok(!notifications.is_empty() && notifications.iter().all(|n| n.is_viewed))
}

pub async fn read_context(
    inbox: &dyn InboxClient,
    workspace: &dyn WorkspaceClient,
    context: &DocNotifyContext,
) -> Result<()> {
    let notifications = context_notifications(inbox, context).await?;
    inbox.read_notifications(&ids_of(&notifications)).await?;
    workspace
        .update_context(context, ContextUpdate::LastViewed(now()))
        .await?;
    Ok(())
}

/// Marks the context unread by flagging its first notification only.
pub async fn unread_context(inbox: &dyn InboxClient, context: &DocNotifyContext) -> Result<()> {
    let notifications = context_notifications(inbox, context).await?;
    let Some(first) = notifications.first() else {
        return Ok(());
    };
    inbox.unread_notifications(&[first.id.clone()]).await?;
    Ok(())
}

pub async fn delete_context_notifications(
    inbox: &dyn InboxClient,
    workspace: &dyn WorkspaceClient,
    context: Option<&DocNotifyContext>,
) -> Result<()> {
    let Some(context) = context else {
        return Ok(());
    };
    let notifications = context_notifications(inbox, context).await?;
    inbox.delete_notifications(&ids_of(&notifications)).await?;
    workspace
        .update_context(context, ContextUpdate::LastViewed(now()))
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Join,
    Leave,
}

async fn update_me_in_collaborators(
    workspace: &dyn WorkspaceClient,
    class: &str,
    id: &str,
    membership: Membership,
) -> Result<()> {
    let me = workspace.current_account().to_string();
    let Some(collaborators) = workspace.find_collaborators(class, id).await? else {
        tracing::debug!("{} {} has no collaborators, nothing to update", class, id);
        return Ok(());
    };
    let present = collaborators.contains(&me);
    let update = match membership {
        Membership::Leave if present => CollaboratorUpdate::Pull(me),
        Membership::Join if !present => CollaboratorUpdate::Push(me),
        _ => return Ok(()),
    };
    workspace.update_collaborators(class, id, update).await?;
    Ok(())
}

/// Add the current account to the document's collaborators.
pub async fn subscribe(workspace: &dyn WorkspaceClient, class: &str, id: &str) -> Result<()> {
    update_me_in_collaborators(workspace, class, id, Membership::Join).await
}

/// Leave the document's collaborators and drop the notify context.
pub async fn unsubscribe(workspace: &dyn WorkspaceClient, context: &DocNotifyContext) -> Result<()> {
    update_me_in_collaborators(
        workspace,
        &context.attached_to_class,
        &context.attached_to,
        Membership::Leave,
    )
    .await?;
    workspace.remove_context(context).await?;
    tracing::info!("Unsubscribed from {}", context.attached_to);
    Ok(())
}
