use crate::error::IngestError;
use crate::models::Document;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-process registry of ingested documents, keyed by document id.
///
/// Documents are handed out as `Arc<Document>`; the lock is held only for the
/// map operation itself.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: RwLock<HashMap<String, Arc<Document>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, document: Document) -> Result<Arc<Document>, IngestError> {
        let mut documents = self.write();
        if documents.contains_key(&document.id) {
            return Err(IngestError::DuplicateDocument(document.id));
        }

        let document = Arc::new(document);
        documents.insert(document.id.clone(), Arc::clone(&document));
        Ok(document)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Document>> {
        self.read().get(id).cloned()
    }

    /// Order is unspecified.
    pub fn list_all(&self) -> Vec<Arc<Document>> {
        self.read().values().cloned().collect()
    }

    pub fn delete(&self, id: &str) -> bool {
        self.remove(id).is_some()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Document>> {
        self.write().remove(id)
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Document>>> {
        self.documents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Document>>> {
        self.documents.write().unwrap_or_else(PoisonError::into_inner)
    }
}
