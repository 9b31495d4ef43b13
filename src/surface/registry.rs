//! Resource locator registry
//!
//! Mints opaque `blob:` locators for in-memory artifacts and revokes them.
//! Locators are only meaningful for the lifetime of the process.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

const LOCATOR_PREFIX: &str = "blob:open-capture/";

/// Opaque reference a presentation layer uses to render an artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceLocator(String);

impl ResourceLocator {
    fn mint() -> Self {
        Self(format!("{LOCATOR_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bytes behind a locator
#[derive(Debug)]
pub struct Resource {
    pub mime_type: String,
    pub data: Arc<Vec<u8>>,
}

/// Process-lifetime table of live resources
#[derive(Default)]
pub struct ResourceRegistry {
    entries: RwLock<HashMap<ResourceLocator, Arc<Resource>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes and return a fresh locator for them
    pub fn register(&self, mime_type: &str, data: Arc<Vec<u8>>) -> ResourceLocator {
        let locator = ResourceLocator::mint();
        let size = data.len();
        self.entries.write().insert(
            locator.clone(),
            Arc::new(Resource {
                mime_type: mime_type.to_string(),
                data,
            }),
        );
        tracing::debug!("Registered {} ({}, {} bytes)", locator, mime_type, size);
        locator
    }

    pub fn resolve(&self, locator: &ResourceLocator) -> Option<Arc<Resource>> {
        self.entries.read().get(locator).cloned()
    }

    /// Release a locator; returns false when it was not live
    pub fn revoke(&self, locator: &ResourceLocator) -> bool {
        let removed = self.entries.write().remove(locator).is_some();
        if removed {
            tracing::debug!("Revoked {}", locator);
        }
        removed
    }

    pub fn contains(&self, locator: &ResourceLocator) -> bool {
        self.entries.read().contains_key(locator)
    }

    /// Number of live locators
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_resolve_revoke() {
        let registry = ResourceRegistry::new();
        let locator = registry.register("image/png", Arc::new(vec![1, 2, 3]));

        assert!(locator.as_str().starts_with("blob:open-capture/"));
        let resource = registry.resolve(&locator).unwrap();
        assert_eq!(resource.mime_type, "image/png");
        assert_eq!(*resource.data, vec![1, 2, 3]);

        assert!(registry.revoke(&locator));
        assert!(!registry.revoke(&locator));
        assert!(registry.resolve(&locator).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_locators_are_unique() {
        let registry = ResourceRegistry::new();
        let data = Arc::new(vec![0u8]);
        let a = registry.register("video/x-raw-rgba", data.clone());
        let b = registry.register("video/x-raw-rgba", data);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }
}
