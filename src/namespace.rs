//! Namespace scoping for identity records.
//!
//! Every entity, alias, and group lives in exactly one namespace. The store
//! does not manage namespaces itself; it consults a [`NamespaceService`]
//! provided by the embedding application to resolve IDs and ancestry. A
//! namespace that stops resolving makes its records eligible for cleanup
//! during restore.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Identifier of a namespace.
///
/// Namespace IDs are short opaque strings assigned by the embedding
/// application; the root namespace is always `"root"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceId(String);

impl NamespaceId {
    /// ID of the root namespace.
    pub const ROOT: &'static str = "root";

    /// Creates a namespace ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The root namespace ID.
    #[must_use]
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the root namespace ID.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Returns true if no ID has been assigned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NamespaceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NamespaceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// An isolation boundary for identity records.
///
/// The path is the slash-separated location of the namespace; the root
/// namespace has the empty path and every other path ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Unique, stable namespace ID.
    pub id: NamespaceId,
    /// Canonical path, e.g. `""` (root) or `"eng/platform/"`.
    pub path: String,
}

impl Namespace {
    /// Creates a namespace with the given ID and path.
    #[must_use]
    pub fn new(id: impl Into<NamespaceId>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// The root namespace.
    #[must_use]
    pub fn root() -> Self {
        Self {
            id: NamespaceId::root(),
            path: String::new(),
        }
    }
}

/// Read-only namespace directory the identity store consults.
///
/// Implementations must be cheap to call; lookups happen on write paths and
/// once per record during restore.
pub trait NamespaceService: Send + Sync {
    /// Resolves a namespace by ID. Returns `None` when the namespace is
    /// unknown or has been deleted.
    fn namespace_by_id(&self, id: &NamespaceId) -> Option<Namespace>;

    /// Returns true when `ancestor` is `descendant` itself or lies on its
    /// path to the root.
    fn is_ancestor(&self, ancestor: &NamespaceId, descendant: &NamespaceId) -> bool;
}

/// Fixed namespace directory, seeded with the root namespace.
///
/// Suitable for embedding applications with a static namespace layout and
/// for tests. Namespaces can be registered and removed at runtime.
#[derive(Debug)]
pub struct StaticNamespaces {
    inner: RwLock<HashMap<NamespaceId, Namespace>>,
}

impl StaticNamespaces {
    /// Creates a directory containing only the root namespace.
    #[must_use]
    pub fn new() -> Self {
        let mut map = HashMap::new();
        let root = Namespace::root();
        map.insert(root.id.clone(), root);
        Self {
            inner: RwLock::new(map),
        }
    }

    /// Registers a namespace, replacing any previous entry with the same ID.
    pub fn register(&self, ns: Namespace) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(ns.id.clone(), ns);
    }

    /// Removes a namespace, simulating its deletion.
    pub fn remove(&self, id: &NamespaceId) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(id);
    }
}

impl Default for StaticNamespaces {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceService for StaticNamespaces {
    fn namespace_by_id(&self, id: &NamespaceId) -> Option<Namespace> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(id).cloned()
    }

    fn is_ancestor(&self, ancestor: &NamespaceId, descendant: &NamespaceId) -> bool {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let (Some(ancestor), Some(descendant)) = (map.get(ancestor), map.get(descendant)) else {
            return false;
        };
        descendant.path.starts_with(&ancestor.path)
    }
}
