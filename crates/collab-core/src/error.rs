use thiserror::Error;

/// Errors surfaced by the backlink and inbox core.
///
/// Lookups that find nothing are not errors: they come back as `None` or are
/// skipped. Collaborator failures pass through `Store` untouched.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed markup: {reason}")]
    Extraction { reason: String },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid location: {0}")]
    InvalidLocation(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn extraction(reason: impl Into<String>) -> Self {
        Error::Extraction {
            reason: reason.into(),
        }
    }
}
