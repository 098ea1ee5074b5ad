use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_BACKLINK_CLASS: &str = "chunter:class:Backlink";
pub const DEFAULT_BACKLINKS_SPACE: &str = "chunter:space:Backlinks";
pub const DEFAULT_BACKLINKS_COLLECTION: &str = "backlinks";
pub const DEFAULT_INBOX_APP: &str = "inbox";

/// Runtime settings for the backlink trigger and the inbox helpers.
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Class id stamped on created backlink records.
    pub backlink_class: String,
    /// Space all backlink transactions are written to.
    pub backlinks_space: String,
    /// Collection name backlinks are attached under.
    pub backlinks_collection: String,
    /// Third path segment that identifies the inbox application in a location.
    pub inbox_app: String,
    /// Doc-update messages closer than this (ms) are combined into one display unit.
    pub combine_window_ms: i64,
    /// Bound of the trigger event channel.
    pub trigger_channel_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            backlink_class: DEFAULT_BACKLINK_CLASS.to_string(),
            backlinks_space: DEFAULT_BACKLINKS_SPACE.to_string(),
            backlinks_collection: DEFAULT_BACKLINKS_COLLECTION.to_string(),
            inbox_app: DEFAULT_INBOX_APP.to_string(),
            combine_window_ms: 10 * 60 * 1000,
            trigger_channel_capacity: 1000,
        }
    }
}

impl CoreConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: CoreConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        tracing::info!("Loading collab-core config from {}", path.display());
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<()> {
        if self.backlinks_collection.trim().is_empty() {
            return Err(Error::Config("backlinks_collection must not be empty".into()));
        }
        if self.inbox_app.trim().is_empty() {
            return Err(Error::Config("inbox_app must not be empty".into()));
        }
        if self.combine_window_ms < 0 {
            return Err(Error::Config(format!(
                "combine_window_ms must be non-negative, got {}",
                self.combine_window_ms
            )));
        }
        if self.trigger_channel_capacity == 0 {
            return Err(Error::Config("trigger_channel_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
