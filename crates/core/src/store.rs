//! In-memory storage layer: collections, document descriptors and users.
//!
//! The store owns every [`Document`]; callers work with shared handles and
//! [`DocumentSet`]s built through a [`Broker`], which binds store access to
//! the principal an operation runs as.

use crate::collection::{Collection, CollectionUri, InvalidUri};
use crate::document::{DocId, Document, ResourceType};
use crate::document_set::DocumentSet;
use crate::lock::{LockError, LockManager, LockMode, LockOptions};
use crate::security::{ADMIN_USER, AccessMode, DBA_GROUP, GUEST_USER, Permission, Subject};
use crate::settings::Settings;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidUri(#[from] InvalidUri),
    #[error("invalid document path '{0}'")]
    InvalidPath(String),
    #[error("collection {0} not found")]
    CollectionNotFound(CollectionUri),
    #[error("document {0} not found")]
    DocumentNotFound(String),
    #[error("resource {0} already exists")]
    AlreadyExists(String),
    #[error("user '{subject}' lacks {mode:?} permission on {resource}")]
    PermissionDenied { subject: String, resource: String, mode: AccessMode },
    #[error(transparent)]
    Lock(#[from] LockError),
}

#[derive(Debug, Default)]
struct StoreState {
    collections: BTreeMap<CollectionUri, Arc<Collection>>,
    documents: HashMap<DocId, Arc<Document>>,
    paths: HashMap<String, DocId>,
}

#[derive(Debug)]
pub struct Store {
    lock_manager: LockManager,
    next_id: AtomicU32,
    state: RwLock<StoreState>,
    users: RwLock<HashMap<String, Subject>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(LockOptions::default())
    }
}

impl Store {
    pub fn new(lock_options: LockOptions) -> Self {
        let root = CollectionUri::root();
        let mut state = StoreState::default();
        state.collections.insert(
            root.clone(),
            Arc::new(Collection::new(root, Permission::new(ADMIN_USER, DBA_GROUP, 0o755))),
        );
        let mut users = HashMap::new();
        users.insert(ADMIN_USER.to_owned(), Subject::dba(ADMIN_USER));
        users.insert(GUEST_USER.to_owned(), Subject::guest());
        Self {
            lock_manager: LockManager::new(lock_options),
            next_id: AtomicU32::new(1),
            state: RwLock::new(state),
            users: RwLock::new(users),
        }
    }

    pub fn with_settings(settings: &Settings) -> Self {
        Self::new(settings.lock_manager.lock_options())
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub fn register_user(&self, subject: Subject) {
        self.users.write().insert(subject.name().to_owned(), subject);
    }

    pub fn user(&self, name: &str) -> Option<Subject> {
        self.users.read().get(name).cloned()
    }

    /// Creates `uri` and any missing ancestors. Existing collections are returned as is.
    pub fn create_collection(&self, uri: &CollectionUri, permissions: Permission) -> Arc<Collection> {
        let mut state = self.state.write();
        if let Some(existing) = state.collections.get(uri) {
            return Arc::clone(existing);
        }
        let mut missing = Vec::new();
        let mut cursor = uri.parent();
        while let Some(parent) = cursor {
            if state.collections.contains_key(&parent) {
                break;
            }
            cursor = parent.parent();
            missing.push(parent);
        }
        for ancestor in missing.into_iter().rev() {
            debug!(collection = %ancestor, "creating collection");
            state.collections.insert(ancestor.clone(), Arc::new(Collection::new(ancestor, permissions.clone())));
        }
        debug!(collection = %uri, "creating collection");
        let collection = Arc::new(Collection::new(uri.clone(), permissions));
        state.collections.insert(uri.clone(), Arc::clone(&collection));
        collection
    }

    pub fn collection(&self, uri: &CollectionUri) -> Option<Arc<Collection>> {
        self.state.read().collections.get(uri).cloned()
    }

    pub fn collections(&self) -> Vec<Arc<Collection>> {
        self.state.read().collections.values().cloned().collect()
    }

    /// Stores a new resource at `path` (e.g. `/db/a/one.xml`) and assigns its id.
    pub fn store_document(
        &self,
        path: &str,
        resource_type: ResourceType,
        permissions: Permission,
    ) -> Result<Arc<Document>, StoreError> {
        let (collection_uri, name) = split_path(path)?;
        let mut state = self.state.write();
        let collection = state
            .collections
            .get(&collection_uri)
            .cloned()
            .ok_or_else(|| StoreError::CollectionNotFound(collection_uri.clone()))?;
        let uri = format!("{collection_uri}/{name}");
        if state.paths.contains_key(&uri) {
            return Err(StoreError::AlreadyExists(uri));
        }
        let id = DocId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let lock = self.lock_manager.document_lock(id);
        let doc = Arc::new(Document::new(id, name, resource_type, permissions, lock).with_collection(collection));
        state.paths.insert(uri, id);
        state.documents.insert(id, Arc::clone(&doc));
        info!(document = %doc.uri(), id = %id, kind = %resource_type, "document stored");
        Ok(doc)
    }

    /// Removes the document at `path`. Waits for the document's write lock,
    /// so running queries holding read locks finish first. Fails with
    /// [`StoreError::DocumentNotFound`] when another caller removed the
    /// document in the meantime.
    pub fn remove_document(&self, path: &str) -> Result<Arc<Document>, StoreError> {
        let doc = self.document_by_path(path).ok_or_else(|| StoreError::DocumentNotFound(path.to_owned()))?;
        let guard = DocumentSet::from_iter([Arc::clone(&doc)]).lock(LockMode::Write)?;
        let removed = {
            let mut state = self.state.write();
            let removed = state.documents.remove(&doc.id()).is_some();
            let uri = doc.uri();
            // The path may already name a newer document.
            if removed && state.paths.get(&uri) == Some(&doc.id()) {
                state.paths.remove(&uri);
            }
            removed
        };
        guard.unlock()?;
        if !removed {
            return Err(StoreError::DocumentNotFound(path.to_owned()));
        }
        self.lock_manager.purge();
        info!(document = %doc.uri(), id = %doc.id(), "document removed");
        Ok(doc)
    }

    pub fn document(&self, id: DocId) -> Option<Arc<Document>> {
        self.state.read().documents.get(&id).cloned()
    }

    pub fn document_by_path(&self, path: &str) -> Option<Arc<Document>> {
        let (collection, name) = split_path(path).ok()?;
        let state = self.state.read();
        let id = state.paths.get(&format!("{collection}/{name}"))?;
        state.documents.get(id).cloned()
    }

    /// Documents stored directly in `uri`, or anywhere below it when `recursive`.
    pub fn documents_in(&self, uri: &CollectionUri, recursive: bool) -> Vec<Arc<Document>> {
        let state = self.state.read();
        let mut docs: Vec<Arc<Document>> = state
            .documents
            .values()
            .filter(|doc| {
                doc.collection().is_some_and(|c| {
                    if recursive { c.uri().is_descendant_of(uri) } else { c.uri() == uri }
                })
            })
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.id());
        docs
    }

    pub fn document_count(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn broker(&self, subject: Subject) -> Broker<'_> {
        Broker { store: self, subject }
    }
}

/// Store access on behalf of one principal.
#[derive(Debug, Clone)]
pub struct Broker<'a> {
    store: &'a Store,
    subject: Subject,
}

impl<'a> Broker<'a> {
    pub fn store(&self) -> &'a Store {
        self.store
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// All documents in `uri` and its descendants the principal may see.
    ///
    /// The collection itself must exist and be readable; unreadable
    /// sub-collections and documents are left out without an error.
    pub fn collection_documents(&self, uri: &CollectionUri, check_permissions: bool) -> Result<DocumentSet, StoreError> {
        let collection = self.store.collection(uri).ok_or_else(|| StoreError::CollectionNotFound(uri.clone()))?;
        if check_permissions && !collection.permissions().validate(&self.subject, AccessMode::READ) {
            return Err(StoreError::PermissionDenied {
                subject: self.subject.name().to_owned(),
                resource: uri.to_string(),
                mode: AccessMode::READ,
            });
        }
        let docs = self.store.documents_in(uri, true).into_iter().filter(|doc| {
            !check_permissions
                || doc.collection().is_none_or(|c| c.permissions().validate(&self.subject, AccessMode::READ))
        });
        let mut set = DocumentSet::new();
        set.add_all(docs, Some(&self.subject), check_permissions);
        Ok(set)
    }

    /// The document at `path`; `None` when it does not exist or, with
    /// `check_permissions`, when the principal may not read it.
    pub fn document(&self, path: &str, check_permissions: bool) -> Result<Option<Arc<Document>>, StoreError> {
        split_path(path)?;
        Ok(self
            .store
            .document_by_path(path)
            .filter(|doc| !check_permissions || doc.permissions().validate(&self.subject, AccessMode::READ)))
    }
}

fn split_path(path: &str) -> Result<(CollectionUri, &str), StoreError> {
    let trimmed = path.trim();
    let (collection, name) = trimmed.rsplit_once('/').ok_or_else(|| StoreError::InvalidPath(path.to_owned()))?;
    if name.is_empty() {
        return Err(StoreError::InvalidPath(path.to_owned()));
    }
    Ok((CollectionUri::parse(collection)?, name))
}
