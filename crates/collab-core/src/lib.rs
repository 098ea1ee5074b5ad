pub mod activity;
pub mod backlinks;
pub mod config;
pub mod error;
pub mod inbox;
pub mod location;
pub mod notifications;
pub mod reference;
pub mod schema;
pub mod store;
pub mod tx;

pub use activity::{ActivityMessage, CombinedMessage, MessageCombiner, WindowCombiner};
pub use backlinks::{
    get_backlinks, guess_backlink_tx, reconcile_backlinks, Backlink, BacklinkData, BacklinkTrigger,
    DocumentEvent,
};
pub use config::CoreConfig;
pub use error::{Error, Result};
pub use notifications::{
    display_inbox_notifications, has_inbox_notifications, DisplayInboxNotification, InboxFilter,
    InboxNotification, NotificationKind,
};
pub use reference::{extract_references, MarkupReferenceExtractor, Reference, ReferenceExtractor};
pub use schema::{Document, Hierarchy, SchemaRegistry};
pub use store::{DocumentStore, MemoryStore, TransactionExecutor};
pub use tx::{Tx, TxFactory};
