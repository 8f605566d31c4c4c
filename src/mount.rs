//! Authentication mount directory.
//!
//! Aliases are keyed by the accessor of the auth mount that produced them.
//! The store never manages mounts; it validates accessors against a
//! [`MountValidator`] supplied by the embedding application, and copies the
//! mount's type and path onto the alias for display purposes.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Properties of an auth mount, looked up by accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    /// Stable accessor string, e.g. `"auth_userpass_b2c31f"`.
    pub accessor: String,
    /// Backend type, e.g. `"userpass"`.
    pub mount_type: String,
    /// Mount path, e.g. `"auth/userpass/"`.
    pub path: String,
    /// True when the mount is local to this node and never replicated.
    pub local: bool,
}

/// Resolves mount accessors to mount properties.
///
/// Returning `None` marks the accessor invalid; alias writes against it are
/// rejected.
pub trait MountValidator: Send + Sync {
    /// Looks up a mount by accessor.
    fn validate_accessor(&self, accessor: &str) -> Option<MountInfo>;
}

/// Fixed mount table for embedding applications and tests.
#[derive(Debug, Default)]
pub struct StaticMounts {
    inner: RwLock<HashMap<String, MountInfo>>,
}

impl StaticMounts {
    /// Creates an empty mount table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mount, replacing any previous entry with the same accessor.
    pub fn register(&self, mount: MountInfo) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(mount.accessor.clone(), mount);
    }

    /// Removes a mount, simulating its unmount.
    pub fn remove(&self, accessor: &str) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(accessor);
    }
}

impl MountValidator for StaticMounts {
    fn validate_accessor(&self, accessor: &str) -> Option<MountInfo> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(accessor).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn userpass() -> MountInfo {
        MountInfo {
            accessor: "auth_userpass_b2c31f".to_string(),
            mount_type: "userpass".to_string(),
            path: "auth/userpass/".to_string(),
            local: false,
        }
    }

    #[test]
    fn test_register_and_validate() {
        let mounts = StaticMounts::new();
        mounts.register(userpass());

        let info = mounts.validate_accessor("auth_userpass_b2c31f").unwrap();
        assert_eq!(info.mount_type, "userpass");
        assert!(!info.local);
    }

    #[test]
    fn test_unknown_accessor() {
        let mounts = StaticMounts::new();
        assert!(mounts.validate_accessor("auth_ghost_000000").is_none());
    }

    #[test]
    fn test_remove_invalidates() {
        let mounts = StaticMounts::new();
        mounts.register(userpass());
        mounts.remove("auth_userpass_b2c31f");
        assert!(mounts.validate_accessor("auth_userpass_b2c31f").is_none());
    }
}
