pub mod collection;
pub mod document;
pub mod document_set;
pub mod lock;
pub mod node_set;
pub mod security;
pub mod settings;
pub mod store;

pub use collection::{Collection, CollectionUri, InvalidUri, ROOT_COLLECTION};
pub use document::{DocId, Document, ResourceType};
pub use document_set::{DocumentSet, DocumentSetError, DocumentSetLock};
pub use lock::{DocumentLock, LockError, LockManager, LockMode, LockOptions};
pub use node_set::{NodeId, NodeProxy, NodeSet};
pub use security::{AccessMode, Permission, Subject};
pub use settings::{Settings, SettingsError};
pub use store::{Broker, Store, StoreError};
