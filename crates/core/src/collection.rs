use crate::security::Permission;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Every collection lives below this root.
pub const ROOT_COLLECTION: &str = "/db";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid collection uri '{uri}': {reason}")]
pub struct InvalidUri {
    pub uri: String,
    pub reason: &'static str,
}

/// Normalised absolute collection path such as `/db/apps/data`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionUri(Arc<str>);

impl CollectionUri {
    pub fn root() -> Self {
        Self(Arc::from(ROOT_COLLECTION))
    }

    pub fn parse(input: &str) -> Result<Self, InvalidUri> {
        let invalid = |reason| InvalidUri { uri: input.to_owned(), reason };
        let trimmed = input.trim();
        if !trimmed.starts_with('/') {
            return Err(invalid("must be absolute"));
        }
        let segments: Vec<&str> = trimmed.trim_end_matches('/').split('/').skip(1).collect();
        if segments.first() != Some(&"db") {
            return Err(invalid("must start with /db"));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(invalid("contains an empty path segment"));
        }
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(invalid("relative segments are not allowed"));
        }
        Ok(Self(Arc::from(format!("/{}", segments.join("/")))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn is_root(&self) -> bool {
        self.0.as_ref() == ROOT_COLLECTION
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit_once('/').map(|(parent, _)| Self(Arc::from(parent)))
    }

    /// True when `self` is `other` or lies somewhere below it.
    pub fn is_descendant_of(&self, other: &CollectionUri) -> bool {
        self == other
            || self.0.strip_prefix(other.as_str()).is_some_and(|rest| rest.starts_with('/'))
    }

    pub fn join(&self, segment: &str) -> Result<Self, InvalidUri> {
        Self::parse(&format!("{}/{}", self.0, segment))
    }
}

impl fmt::Display for CollectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CollectionUri {
    type Err = InvalidUri;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A stored collection. Ordered and compared by its uri only.
#[derive(Debug, Clone)]
pub struct Collection {
    uri: CollectionUri,
    permissions: Permission,
}

impl Collection {
    pub fn new(uri: CollectionUri, permissions: Permission) -> Self {
        Self { uri, permissions }
    }

    pub fn uri(&self) -> &CollectionUri {
        &self.uri
    }

    pub fn permissions(&self) -> &Permission {
        &self.permissions
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for Collection {}

impl PartialOrd for Collection {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Collection {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.uri.cmp(&other.uri)
    }
}
