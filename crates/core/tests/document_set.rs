use rstest::{fixture, rstest};
use std::sync::Arc;
use xqdb_core::{
    CollectionUri, DocId, Document, DocumentSet, DocumentSetError, NodeId, NodeProxy, Permission, ResourceType, Store,
    Subject,
};

struct Db {
    store: Store,
}

impl Db {
    fn put(&self, path: &str, kind: ResourceType, mode: u32) -> Arc<Document> {
        self.store.store_document(path, kind, Permission::new("admin", "dba", mode)).unwrap()
    }

    fn set(&self, docs: &[&Arc<Document>]) -> DocumentSet {
        docs.iter().map(|d| Arc::clone(d)).collect()
    }
}

#[fixture]
fn db() -> Db {
    let store = Store::default();
    for uri in ["/db/a", "/db/b"] {
        store.create_collection(&CollectionUri::parse(uri).unwrap(), Permission::new("admin", "dba", 0o755));
    }
    Db { store }
}

fn ids(set: &DocumentSet) -> Vec<u32> {
    set.iter().map(|d| d.id().get()).collect()
}

#[rstest]
fn union_and_intersection_track_collections(db: Db) {
    let d1 = db.put("/db/a/one.xml", ResourceType::Xml, 0o644);
    let d2 = db.put("/db/a/two.xml", ResourceType::Xml, 0o644);
    let d3 = db.put("/db/b/three.xml", ResourceType::Xml, 0o644);

    let a = db.set(&[&d1, &d2]);
    let b = db.set(&[&d2, &d3]);
    assert!(!a.contains_all(&b));
    assert!(!b.contains_all(&a));

    let union = a.union(&b);
    assert_eq!(ids(&union), vec![d1.id().get(), d2.id().get(), d3.id().get()]);
    assert_eq!(union.collection_count(), 2);
    assert!(union.contains_all(&a));
    assert!(union.contains_all(&b));

    let common = a.intersection(&b);
    assert_eq!(ids(&common), vec![d2.id().get()]);
    let uris: Vec<String> = common.collections().map(|c| c.uri().to_string()).collect();
    assert_eq!(uris, vec!["/db/a"]);
    assert!(a.contains_all(&common) && b.contains_all(&common));
}

#[rstest]
fn larger_set_is_never_contained(db: Db) {
    let d1 = db.put("/db/a/one.xml", ResourceType::Xml, 0o644);
    let d2 = db.put("/db/a/two.xml", ResourceType::Xml, 0o644);
    let small = db.set(&[&d1]);
    let large = db.set(&[&d1, &d2]);

    assert!(!small.contains_all(&large));
    assert!(large.contains_all(&small));
    assert!(small.contains_all(&small));
    assert!(small.contains_all(DocumentSet::empty()));
    assert!(!DocumentSet::empty().contains_all(&small));
}

#[rstest]
fn retain_drops_documents_and_their_collections(db: Db) {
    let d1 = db.put("/db/a/one.xml", ResourceType::Xml, 0o644);
    let d2 = db.put("/db/b/two.xml", ResourceType::Xml, 0o644);
    let d3 = db.put("/db/b/three.xml", ResourceType::Xml, 0o644);
    let mut set = db.set(&[&d1, &d2, &d3]);

    assert_eq!(set.retain(|doc| doc.id() != d1.id()), 1);
    assert_eq!(ids(&set), vec![d2.id().get(), d3.id().get()]);
    let uris: Vec<String> = set.collections().map(|c| c.uri().to_string()).collect();
    assert_eq!(uris, vec!["/db/b"]);
    assert_eq!(set.retain(|_| true), 0);
}

#[rstest]
fn set_algebra_is_symmetric(db: Db) {
    let docs: Vec<_> = (0..5).map(|i| db.put(&format!("/db/a/{i}.xml"), ResourceType::Xml, 0o644)).collect();
    let a = db.set(&[&docs[0], &docs[1], &docs[3]]);
    let b = db.set(&[&docs[1], &docs[2], &docs[3], &docs[4]]);

    assert_eq!(a.union(&b), b.union(&a));
    assert_eq!(a.intersection(&b), b.intersection(&a));
    assert_eq!(a.union(&b).len(), a.len() + b.len() - a.intersection(&b).len());
    assert_eq!(a.union(DocumentSet::empty()), a);
    assert!(a.intersection(DocumentSet::empty()).is_empty());
}

#[rstest]
fn adding_is_idempotent(db: Db) {
    let d = db.put("/db/a/one.xml", ResourceType::Xml, 0o644);
    let mut set = DocumentSet::new();
    assert!(set.add(Arc::clone(&d)));
    assert!(!set.add(Arc::clone(&d)));
    set.extend([Arc::clone(&d)]);
    assert_eq!(set.len(), 1);
    assert_eq!(set.collection_count(), 1);
}

#[rstest]
fn min_and_max_ids() {
    let store = Store::default();
    let lock_for = |id: u32| store.lock_manager().document_lock(DocId::new(id));
    let set: DocumentSet = [5, 1, 9]
        .into_iter()
        .map(|id| {
            Arc::new(Document::new(DocId::new(id), format!("{id}.xml"), ResourceType::Xml, Permission::new("admin", "dba", 0o644), lock_for(id)))
        })
        .collect();
    assert_eq!(set.min_doc_id(), Some(DocId::new(1)));
    assert_eq!(set.max_doc_id(), Some(DocId::new(9)));
    assert_eq!(DocumentSet::empty().min_doc_id(), None);
    assert_eq!(DocumentSet::empty().max_doc_id(), None);
}

#[rstest]
fn node_set_skips_binary_resources(db: Db) {
    let xml = db.put("/db/a/doc.xml", ResourceType::Xml, 0o644);
    let bin = db.put("/db/a/image.png", ResourceType::Binary, 0o644);
    let set = db.set(&[&bin, &xml]);

    let nodes = set.to_node_set();
    assert_eq!(nodes.len(), 1);
    let node = nodes.get(0).unwrap();
    assert!(node.is_document_node());
    assert_eq!(node.doc_id(), xml.id());

    assert_eq!(nodes.documents(), db.set(&[&xml]));
}

#[rstest]
fn add_node_requires_a_document_node(db: Db) {
    let d = db.put("/db/a/doc.xml", ResourceType::Xml, 0o644);
    let mut set = DocumentSet::new();
    assert_eq!(set.add_node(&NodeProxy::document_node(Arc::clone(&d))), Ok(true));
    let err = set.add_node(&NodeProxy::new(Arc::clone(&d), NodeId::new(3))).unwrap_err();
    assert_eq!(err, DocumentSetError::MalformedInput { document: d.id(), node: NodeId::new(3) });
}

#[rstest]
#[case(Subject::guest(), true, vec!["open.xml"])]
#[case(Subject::guest(), false, vec!["open.xml", "secret.xml"])]
#[case(Subject::dba("admin"), true, vec!["open.xml", "secret.xml"])]
fn add_all_filters_by_read_permission(db: Db, #[case] subject: Subject, #[case] check: bool, #[case] expected: Vec<&str>) {
    let open = db.put("/db/a/open.xml", ResourceType::Xml, 0o644);
    let secret = db.put("/db/a/secret.xml", ResourceType::Xml, 0o600);

    let mut set = DocumentSet::new();
    let added = set.add_all([open, secret], Some(&subject), check);
    assert_eq!(added, expected.len());
    assert_eq!(set.names(), expected);
}

#[rstest]
fn positional_access_follows_document_ids(db: Db) {
    let docs: Vec<_> = ["c.xml", "a.xml", "b.xml"]
        .iter()
        .map(|name| db.put(&format!("/db/b/{name}"), ResourceType::Xml, 0o644))
        .collect();
    let set = db.set(&[&docs[2], &docs[0], &docs[1]]);
    let by_position: Vec<&str> = (0..set.len()).map(|i| set.get(i).unwrap().file_name()).collect();
    assert_eq!(by_position, vec!["c.xml", "a.xml", "b.xml"]);
    assert!(set.get(3).is_none());
    assert_eq!(set.doc(docs[1].id()).map(|d| d.file_name()), Some("a.xml"));
}

#[rstest]
fn add_all_without_subject_skips_the_permission_check(db: Db) {
    let open = db.put("/db/a/open.xml", ResourceType::Xml, 0o644);
    let secret = db.put("/db/a/secret.xml", ResourceType::Xml, 0o600);

    let mut set = DocumentSet::new();
    assert_eq!(set.add_all([open, secret], None, true), 2);
    assert_eq!(set.names(), vec!["open.xml", "secret.xml"]);
}
