//! Shared application state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use storyloom_core::clock::Clock;

use crate::host::DocumentHost;

/// Lazily-populated registry of hosted documents. Hosts live for the
/// process lifetime once created.
#[derive(Default)]
pub struct DocumentRegistry {
    hosts: Mutex<HashMap<Uuid, Arc<DocumentHost>>>,
}

impl DocumentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the host for a document, creating it on first access.
    #[must_use]
    pub fn get_or_create(&self, document_id: Uuid) -> Arc<DocumentHost> {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(document_id)
            .or_insert_with(|| Arc::new(DocumentHost::new(document_id)))
            .clone()
    }

    /// Returns the host for a document if one exists.
    #[must_use]
    pub fn get(&self, document_id: Uuid) -> Option<Arc<DocumentHost>> {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&document_id)
            .cloned()
    }

    /// Number of documents currently hosted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no documents are hosted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Hosted documents.
    pub registry: Arc<DocumentRegistry>,
    /// Clock used to stamp accepted commands.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Arc::new(DocumentRegistry::new()),
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_returns_same_host_for_same_document() {
        let registry = DocumentRegistry::new();
        let document_id = Uuid::new_v4();

        let first = registry.get_or_create(document_id);
        let second = registry.get_or_create(document_id);

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_get_returns_none_before_creation() {
        let registry = DocumentRegistry::new();
        assert!(registry.get(Uuid::new_v4()).is_none());
    }
}
