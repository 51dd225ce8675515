use std::borrow::Borrow;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Remote address of an image the site renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct AssetUrl(String);

impl AssetUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AssetUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for AssetUrl {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetUrl {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for AssetUrl {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Raw bytes of an asset as they travel between the network, the cache and
/// the in-memory handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAsset {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl CachedAsset {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Session-local handle to the bytes of a cached asset.
///
/// The handle string is what a renderer uses as its image source. It is never
/// persisted; the bytes are released once the last clone is dropped, which in
/// practice is when the owning `SyncState` goes away with the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReference {
    handle: String,
    bytes: Bytes,
    content_type: Option<String>,
}

impl LocalReference {
    pub(crate) fn new(namespace: &str, sequence: u64, asset: CachedAsset) -> Self {
        Self {
            handle: format!("blob:{namespace}/{sequence}"),
            bytes: asset.bytes,
            content_type: asset.content_type,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

/// Outcome recorded in the sync mapping for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Local(LocalReference),
    /// Caching or fetching failed; render straight from the network.
    Remote(AssetUrl),
}

impl Resolved {
    pub fn src(&self) -> &str {
        match self {
            Resolved::Local(local) => local.handle(),
            Resolved::Remote(url) => url.as_str(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Resolved::Local(_))
    }

    pub fn local(&self) -> Option<&LocalReference> {
        match self {
            Resolved::Local(local) => Some(local),
            Resolved::Remote(_) => None,
        }
    }
}
