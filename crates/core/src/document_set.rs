//! The set of documents a query or operation works on.
//!
//! A [`DocumentSet`] maps document ids to shared descriptors, tracks the
//! collections those documents belong to and coordinates locking of all
//! contained documents. Set algebra is defined purely over document ids.

use crate::collection::{Collection, CollectionUri};
use crate::document::{DocId, Document};
use crate::lock::{LockError, LockMode};
use crate::node_set::{NodeId, NodeProxy, NodeSet};
use crate::security::{AccessMode, Subject};
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock, OnceLock};
use thiserror::Error;
use tracing::{debug, error, warn};

static EMPTY_DOCUMENT_SET: LazyLock<DocumentSet> = LazyLock::new(DocumentSet::new);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentSetError {
    #[error("node {node:?} of document {document} is not a document node")]
    MalformedInput { document: DocId, node: NodeId },
}

#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    docs: HashMap<DocId, Arc<Document>>,
    collections: BTreeMap<CollectionUri, Arc<Collection>>,
    // Ascending by id; rebuilt lazily after every mutation.
    ordered: OnceLock<Vec<Arc<Document>>>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { docs: HashMap::with_capacity(capacity), ..Self::default() }
    }

    /// The shared, immutable "no documents" set.
    pub fn empty() -> &'static DocumentSet {
        &EMPTY_DOCUMENT_SET
    }

    pub fn clear(&mut self) {
        self.docs.clear();
        self.collections.clear();
        self.invalidate();
    }

    /// Adds `doc` unless a document with the same id is already present.
    pub fn add(&mut self, doc: Arc<Document>) -> bool {
        self.add_with(doc, true)
    }

    /// Adds `doc`, optionally skipping the duplicate check.
    ///
    /// With `check_duplicates == false` the caller guarantees that the id is
    /// not yet present; this is not re-validated.
    pub fn add_with(&mut self, doc: Arc<Document>, check_duplicates: bool) -> bool {
        let id = doc.id();
        if check_duplicates && self.docs.contains_key(&id) {
            return false;
        }
        if let Some(collection) = doc.collection() {
            self.collections
                .entry(collection.uri().clone())
                .or_insert_with(|| Arc::clone(collection));
        }
        self.docs.insert(id, doc);
        self.invalidate();
        true
    }

    /// Adds the document behind a document node.
    pub fn add_node(&mut self, node: &NodeProxy) -> Result<bool, DocumentSetError> {
        if !node.is_document_node() {
            return Err(DocumentSetError::MalformedInput { document: node.doc_id(), node: node.node_id() });
        }
        Ok(self.add(Arc::clone(node.doc())))
    }

    /// Bulk add. With `check_permissions`, documents `subject` may not read
    /// are skipped silently. Returns the number of documents added.
    ///
    /// Without a `subject` there is no one to check against and every
    /// document is added, even when `check_permissions` is set.
    pub fn add_all<I>(&mut self, docs: I, subject: Option<&Subject>, check_permissions: bool) -> usize
    where
        I: IntoIterator<Item = Arc<Document>>,
    {
        let mut added = 0;
        let mut skipped = 0;
        for doc in docs {
            if let Some(subject) = subject.filter(|_| check_permissions)
                && !doc.permissions().validate(subject, AccessMode::READ)
            {
                skipped += 1;
                continue;
            }
            if self.add(doc) {
                added += 1;
            }
        }
        if skipped > 0 {
            debug!(added, skipped, "documents without read permission left out of document set");
        }
        added
    }

    pub fn extend_from(&mut self, other: &DocumentSet) {
        for doc in other.docs.values() {
            self.add(Arc::clone(doc));
        }
    }

    /// Keeps only the documents for which `keep` returns true and rebuilds
    /// the collection index. Returns the number of documents dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&Document) -> bool) -> usize {
        let before = self.docs.len();
        self.docs.retain(|_, doc| keep(doc));
        let dropped = before - self.docs.len();
        if dropped > 0 {
            self.collections = self
                .docs
                .values()
                .filter_map(|doc| doc.collection())
                .map(|c| (c.uri().clone(), Arc::clone(c)))
                .collect();
            self.invalidate();
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Documents in ascending id order.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Document>> {
        self.ordered().iter()
    }

    /// Document at `pos` in ascending id order.
    pub fn get(&self, pos: usize) -> Option<&Arc<Document>> {
        self.ordered().get(pos)
    }

    pub fn doc(&self, id: DocId) -> Option<&Arc<Document>> {
        self.docs.get(&id)
    }

    pub fn contains(&self, id: DocId) -> bool {
        self.docs.contains_key(&id)
    }

    /// Subset test: every document of `other` is also in `self`.
    pub fn contains_all(&self, other: &DocumentSet) -> bool {
        if other.len() > self.len() {
            return false;
        }
        other.docs.keys().all(|id| self.docs.contains_key(id))
    }

    /// Collections of the contained documents, ordered by uri.
    pub fn collections(&self) -> impl Iterator<Item = &Arc<Collection>> {
        self.collections.values()
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    /// File names of all documents, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.docs.values().map(|d| d.file_name().to_owned()).collect();
        names.sort();
        names
    }

    pub fn union(&self, other: &DocumentSet) -> DocumentSet {
        let mut result = DocumentSet::with_capacity(self.len() + other.len());
        result.extend_from(other);
        result.extend_from(self);
        result
    }

    pub fn intersection(&self, other: &DocumentSet) -> DocumentSet {
        let (small, large) = if self.len() <= other.len() { (self, other) } else { (other, self) };
        let mut result = DocumentSet::with_capacity(small.len());
        for (id, doc) in &small.docs {
            if large.contains(*id) {
                result.add_with(Arc::clone(doc), false);
            }
        }
        result
    }

    /// Smallest contained id; `None` means unknown (empty set).
    pub fn min_doc_id(&self) -> Option<DocId> {
        self.docs.keys().min().copied()
    }

    /// Largest contained id; `None` means unknown (empty set).
    pub fn max_doc_id(&self) -> Option<DocId> {
        self.docs.keys().max().copied()
    }

    /// One document node per XML document. Binary resources are left out.
    pub fn to_node_set(&self) -> NodeSet {
        let mut nodes = NodeSet::with_capacity(self.len());
        for doc in self.iter().filter(|d| d.is_xml()) {
            nodes.add(NodeProxy::document_node(Arc::clone(doc)));
        }
        nodes
    }

    /// Locks every contained document in `mode`.
    ///
    /// Locks are taken in ascending document id order so that callers with
    /// overlapping sets cannot deadlock each other. Acquisition is
    /// all-or-nothing: on failure the locks already taken are released in
    /// reverse order before the error is returned.
    pub fn lock(&self, mode: LockMode) -> Result<DocumentSetLock, LockError> {
        let docs = self.ordered();
        let mut acquired: Vec<Arc<Document>> = Vec::with_capacity(docs.len());
        for doc in docs {
            if let Err(err) = doc.update_lock().acquire(mode) {
                warn!(document = %doc.uri(), %mode, %err, "document set lock failed; rolling back");
                for held in acquired.iter().rev() {
                    if let Err(release_err) = held.update_lock().release(mode) {
                        error!(document = %held.uri(), %release_err, "rollback release failed");
                    }
                }
                return Err(err);
            }
            acquired.push(Arc::clone(doc));
        }
        debug!(documents = acquired.len(), %mode, "document set locked");
        Ok(DocumentSetLock { docs: acquired, mode, _thread_bound: PhantomData })
    }

    fn ordered(&self) -> &Vec<Arc<Document>> {
        self.ordered.get_or_init(|| {
            let mut docs: Vec<Arc<Document>> = self.docs.values().cloned().collect();
            docs.sort_unstable_by_key(|d| d.id());
            docs
        })
    }

    fn invalidate(&mut self) {
        self.ordered.take();
    }
}

impl PartialEq for DocumentSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.docs.keys().all(|id| other.docs.contains_key(id))
    }
}

impl Eq for DocumentSet {}

impl FromIterator<Arc<Document>> for DocumentSet {
    fn from_iter<T: IntoIterator<Item = Arc<Document>>>(iter: T) -> Self {
        let mut set = DocumentSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<Arc<Document>> for DocumentSet {
    fn extend<T: IntoIterator<Item = Arc<Document>>>(&mut self, iter: T) {
        for doc in iter {
            self.add(doc);
        }
    }
}

impl<'a> IntoIterator for &'a DocumentSet {
    type Item = &'a Arc<Document>;
    type IntoIter = std::slice::Iter<'a, Arc<Document>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Locks held on all documents of a [`DocumentSet`].
///
/// Released by [`DocumentSetLock::unlock`] or, on every other exit path,
/// when dropped. Lock holds belong to the acquiring thread, so the guard
/// cannot be sent to another thread.
#[must_use = "the document locks are released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct DocumentSetLock {
    docs: Vec<Arc<Document>>,
    mode: LockMode,
    _thread_bound: PhantomData<*const ()>,
}

impl DocumentSetLock {
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Releases all locks, reporting the first release failure.
    pub fn unlock(mut self) -> Result<(), LockError> {
        self.release_all()
    }

    fn release_all(&mut self) -> Result<(), LockError> {
        let mut first_err = None;
        let count = self.docs.len();
        while let Some(doc) = self.docs.pop() {
            if let Err(err) = doc.update_lock().release(self.mode) {
                first_err.get_or_insert(err);
            }
        }
        if count > 0 {
            debug!(documents = count, mode = %self.mode, "document set unlocked");
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for DocumentSetLock {
    fn drop(&mut self) {
        if let Err(err) = self.release_all() {
            error!(%err, "failed to release document set lock");
        }
    }
}
