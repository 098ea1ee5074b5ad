use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::inbox::WorkspaceClient;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

const QUERY_MESSAGE: &str = "message";

/// An application location: `/<app>/<workspace>/<component>?query#fragment`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: Vec<String>,
    pub fragment: Option<String>,
    /// `None` values are keys that are explicitly unset.
    pub query: BTreeMap<String, Option<String>>,
}

impl Location {
    /// Parse an absolute URL or a path relative to the application root.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse("http://localhost")
            .and_then(|base| base.join(input))
            .map_err(|e| Error::InvalidLocation(format!("{input}: {e}")))?;

        let path = url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let query = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), Some(v.into_owned())))
            .collect();
        let fragment = url.fragment().filter(|f| !f.is_empty()).map(str::to_string);

        Ok(Self {
            path,
            fragment,
            query,
        })
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.get(key).and_then(|v| v.as_deref())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path.join("/"))?;
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.query {
            if let Some(value) = value {
                serializer.append_pair(key, value);
            }
        }
        let query = serializer.finish();
        if !query.is_empty() {
            write!(f, "?{query}")?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub loc: Location,
    pub default_location: Location,
}

fn inbox_path(loc: &Location, inbox_app: &str) -> Vec<String> {
    let segment = |i: usize| loc.path.get(i).cloned().unwrap_or_default();
    vec![segment(0), segment(1), inbox_app.to_string()]
}

fn inbox_root(loc: &Location, inbox_app: &str) -> ResolvedLocation {
    let root = Location {
        path: inbox_path(loc, inbox_app),
        ..Default::default()
    };
    ResolvedLocation {
        loc: root.clone(),
        default_location: root,
    }
}

/// Resolve an inbox deep link.
///
/// Returns `None` for locations outside the inbox. A link to a context the
/// user has no notifications in falls back to the inbox root; a `message` query
/// survives only when that message exists.
pub async fn resolve_location(
    workspace: &dyn WorkspaceClient,
    loc: &Location,
    config: &CoreConfig,
) -> Result<Option<ResolvedLocation>> {
    if loc.path.get(2).map(String::as_str) != Some(config.inbox_app.as_str()) {
        return Ok(None);
    }

    let Some(context_id) = loc.fragment.as_deref() else {
        return Ok(Some(inbox_root(loc, &config.inbox_app)));
    };

    if workspace.find_context_notification(context_id).await?.is_none() {
        tracing::debug!("No inbox notification for context {}, opening inbox root", context_id);
        return Ok(Some(inbox_root(loc, &config.inbox_app)));
    }

    let message = match loc.query_value(QUERY_MESSAGE) {
        Some(id) => workspace.message_exists(id).await?.then(|| id.to_string()),
        None => None,
    };
    let query = BTreeMap::from([(QUERY_MESSAGE.to_string(), message)]);
    let path = inbox_path(loc, &config.inbox_app);

    Ok(Some(ResolvedLocation {
        loc: Location {
            path: path.clone(),
            fragment: Some(context_id.to_string()),
            query: query.clone(),
        },
        default_location: Location {
            path,
            fragment: None,
            query,
        },
    }))
}
