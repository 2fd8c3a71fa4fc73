//! In-memory descriptors of stored resources.

use crate::collection::Collection;
use crate::lock::DocumentLock;
use crate::security::Permission;
use std::fmt;
use std::sync::Arc;

/// Store-assigned document identifier, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId(u32);

impl DocId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DocId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Xml,
    Binary,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceType::Xml => "xml",
            ResourceType::Binary => "binary",
        })
    }
}

/// Handle to a stored document. Owned by the store and shared as `Arc<Document>`.
#[derive(Debug)]
pub struct Document {
    id: DocId,
    file_name: Arc<str>,
    collection: Option<Arc<Collection>>,
    permissions: Permission,
    resource_type: ResourceType,
    update_lock: Arc<DocumentLock>,
}

impl Document {
    pub fn new(
        id: DocId,
        file_name: impl Into<Arc<str>>,
        resource_type: ResourceType,
        permissions: Permission,
        update_lock: Arc<DocumentLock>,
    ) -> Self {
        Self {
            id,
            file_name: file_name.into(),
            collection: None,
            permissions,
            resource_type,
            update_lock,
        }
    }

    pub fn with_collection(mut self, collection: Arc<Collection>) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn id(&self) -> DocId {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn collection(&self) -> Option<&Arc<Collection>> {
        self.collection.as_ref()
    }

    pub fn permissions(&self) -> &Permission {
        &self.permissions
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn is_xml(&self) -> bool {
        self.resource_type == ResourceType::Xml
    }

    pub fn update_lock(&self) -> &Arc<DocumentLock> {
        &self.update_lock
    }

    /// Full path of the document, e.g. `/db/a/one.xml`.
    pub fn uri(&self) -> String {
        match &self.collection {
            Some(collection) => format!("{}/{}", collection.uri(), self.file_name),
            None => self.file_name.to_string(),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (doc {})", self.uri(), self.id)
    }
}
