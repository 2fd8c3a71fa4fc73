//! Document-ordered node sets over stored documents.
//!
//! Node storage is not part of this crate, so a [`NodeProxy`] addresses a
//! node by document and [`NodeId`]; whole documents use the reserved
//! [`NodeId::DOCUMENT`] marker.

use crate::document::{DocId, Document};
use crate::document_set::DocumentSet;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Position of a node inside its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Marker addressing the document node itself.
    pub const DOCUMENT: NodeId = NodeId(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub fn is_document(self) -> bool {
        self == Self::DOCUMENT
    }
}

/// A node reference: owning document plus node position.
#[derive(Clone)]
pub struct NodeProxy {
    doc: Arc<Document>,
    node: NodeId,
}

impl NodeProxy {
    pub fn new(doc: Arc<Document>, node: NodeId) -> Self {
        Self { doc, node }
    }

    pub fn document_node(doc: Arc<Document>) -> Self {
        Self::new(doc, NodeId::DOCUMENT)
    }

    pub fn doc(&self) -> &Arc<Document> {
        &self.doc
    }

    pub fn doc_id(&self) -> DocId {
        self.doc.id()
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn is_document_node(&self) -> bool {
        self.node.is_document()
    }

    fn key(&self) -> (DocId, NodeId) {
        (self.doc.id(), self.node)
    }
}

impl fmt::Debug for NodeProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeProxy").field("doc", &self.doc.id()).field("node", &self.node).finish()
    }
}

impl PartialEq for NodeProxy {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for NodeProxy {}

impl Hash for NodeProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for NodeProxy {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeProxy {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Duplicate-free node sequence kept in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: Vec<NodeProxy>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { nodes: Vec::with_capacity(capacity) }
    }

    /// Inserts `node` at its document-order position; duplicates are ignored.
    pub fn add(&mut self, node: NodeProxy) -> bool {
        // Appending in order is the common case.
        if self.nodes.last().is_none_or(|last| *last < node) {
            self.nodes.push(node);
            return true;
        }
        match self.nodes.binary_search(&node) {
            Ok(_) => false,
            Err(pos) => {
                self.nodes.insert(pos, node);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&NodeProxy> {
        self.nodes.get(pos)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeProxy> {
        self.nodes.iter()
    }

    pub fn contains(&self, node: &NodeProxy) -> bool {
        self.nodes.binary_search(node).is_ok()
    }

    pub fn union(&self, other: &NodeSet) -> NodeSet {
        let mut out = Vec::with_capacity(self.len() + other.len());
        let (mut a, mut b) = (self.nodes.iter().peekable(), other.nodes.iter().peekable());
        loop {
            let next = match (a.peek(), b.peek()) {
                (Some(x), Some(y)) => match x.cmp(y) {
                    Ordering::Less => a.next(),
                    Ordering::Greater => b.next(),
                    Ordering::Equal => {
                        b.next();
                        a.next()
                    }
                },
                (Some(_), None) => a.next(),
                (None, Some(_)) => b.next(),
                (None, None) => break,
            };
            out.extend(next.cloned());
        }
        NodeSet { nodes: out }
    }

    pub fn intersection(&self, other: &NodeSet) -> NodeSet {
        let nodes = self.nodes.iter().filter(|n| other.contains(n)).cloned().collect();
        NodeSet { nodes }
    }

    pub fn except(&self, other: &NodeSet) -> NodeSet {
        let nodes = self.nodes.iter().filter(|n| !other.contains(n)).cloned().collect();
        NodeSet { nodes }
    }

    /// The set of documents the nodes belong to.
    pub fn documents(&self) -> DocumentSet {
        let mut docs = DocumentSet::new();
        for node in &self.nodes {
            docs.add(Arc::clone(node.doc()));
        }
        docs
    }

    pub fn into_vec(self) -> Vec<NodeProxy> {
        self.nodes
    }
}

impl FromIterator<NodeProxy> for NodeSet {
    fn from_iter<T: IntoIterator<Item = NodeProxy>>(iter: T) -> Self {
        let mut nodes: Vec<NodeProxy> = iter.into_iter().collect();
        nodes.sort();
        nodes.dedup();
        NodeSet { nodes }
    }
}

impl IntoIterator for NodeSet {
    type Item = NodeProxy;
    type IntoIter = std::vec::IntoIter<NodeProxy>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a> IntoIterator for &'a NodeSet {
    type Item = &'a NodeProxy;
    type IntoIter = std::slice::Iter<'a, NodeProxy>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
