//! Session-scoped `blob:` URLs for staged file bytes.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::debug;
use uuid::Uuid;

const OBJECT_URL_PREFIX: &str = "blob:score-intake/";

type Entries = HashMap<String, Arc<[u8]>>;

#[derive(Clone, Default)]
pub struct ObjectUrlRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bytes: impl Into<Arc<[u8]>>) -> ObjectUrl {
        let url = format!("{OBJECT_URL_PREFIX}{}", Uuid::new_v4());
        self.lock().insert(url.clone(), bytes.into());
        ObjectUrl {
            url,
            registry: self.clone(),
        }
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<[u8]>> {
        self.lock().get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn revoke(&self, url: &str) {
        if self.lock().remove(url).is_some() {
            debug!(url, "object url revoked");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owning handle for a registered URL; the URL is revoked when this drops.
pub struct ObjectUrl {
    url: String,
    registry: ObjectUrlRegistry,
}

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObjectUrl").field(&self.url).finish()
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}
