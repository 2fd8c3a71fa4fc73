//! Query execution against the store.
//!
//! Execution runs in three steps: every `collection()` and `doc()` call is
//! resolved to the documents it addresses, the union of those documents is
//! locked for reading, and then the tree is evaluated. The lock is held for
//! the whole evaluation and released before results are handed back.

use crate::analyze::{AnalyzeFlags, ContextId};
use crate::compiler::{CompiledQuery, compile};
use crate::error::{Error, ErrorCode};
use crate::expr::{Builtin, Comparison, ExprId, ExprKind, ExprTree, Logical, SetOp};
use crate::runtime::{DynamicContext, StaticContext};
use crate::xdm::{AtomicValue, Item, Sequence, effective_boolean_value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use xqdb_core::{Broker, CollectionUri, DocumentSet, LockMode, NodeSet, StoreError};

/// Compiles and executes `source` in one go.
pub fn evaluate_query(
    source: &str,
    static_ctx: &StaticContext,
    broker: &Broker<'_>,
    dyn_ctx: &DynamicContext,
) -> Result<Sequence, Error> {
    let query = compile(source, static_ctx)?;
    execute(&query, broker, dyn_ctx)
}

pub fn execute(query: &CompiledQuery, broker: &Broker<'_>, dyn_ctx: &DynamicContext) -> Result<Sequence, Error> {
    let mut resources = resolve_resources(query, broker, dyn_ctx)?;
    let mut documents = DocumentSet::new();
    for set in resources.values() {
        documents.extend_from(set);
    }

    let guard = documents.lock(LockMode::Read)?;
    // Drop documents removed while their locks were pending.
    let store = broker.store();
    let removed = documents.retain(|doc| store.document(doc.id()).is_some());
    if removed > 0 {
        for set in resources.values_mut() {
            set.retain(|doc| store.document(doc.id()).is_some());
        }
        debug!(removed, "documents removed before their locks were granted; left out");
    }
    debug!(documents = documents.len(), user = %broker.subject(), "query documents locked");
    let result = match query.tree().root() {
        Some(root) => Evaluator::new(query.tree(), dyn_ctx, &resources).eval(root),
        None => Ok(Vec::new()),
    };
    let released = guard.unlock();
    let items = result?;
    released?;
    debug!(items = items.len(), "query evaluated");
    Ok(items)
}

/// The documents each `collection()`/`doc()` call of `query` addresses.
fn resolve_resources(
    query: &CompiledQuery,
    broker: &Broker<'_>,
    dyn_ctx: &DynamicContext,
) -> Result<HashMap<ExprId, DocumentSet>, Error> {
    let tree = query.tree();
    let mut resources = HashMap::new();
    for id in tree.reachable() {
        let ExprKind::Call { function, args } = tree.kind(id) else { continue };
        if !function.is_resource_access() {
            continue;
        }
        let uris = args.iter().map(|arg| literal_string(tree, *arg)).collect::<Result<Vec<_>, _>>()?;
        let set = match function {
            Builtin::Doc => resolve_documents(&uris, broker, dyn_ctx)?,
            _ => resolve_collections(&uris, query.static_context(), broker, dyn_ctx)?,
        };
        resources.insert(id, set);
    }
    Ok(resources)
}

fn literal_string(tree: &ExprTree, id: ExprId) -> Result<&str, Error> {
    match tree.kind(id) {
        ExprKind::Literal(AtomicValue::String(s)) => Ok(s),
        _ => Err(Error::static_code(ErrorCode::XQDB0001, "resource uri must be a string literal")),
    }
}

fn resolve_collections(
    uris: &[&str],
    static_ctx: &StaticContext,
    broker: &Broker<'_>,
    dyn_ctx: &DynamicContext,
) -> Result<DocumentSet, Error> {
    let uris: Vec<CollectionUri> = if uris.is_empty() {
        let default = static_ctx.default_collection.clone().ok_or_else(|| {
            Error::dynamic(ErrorCode::FODC0002, "collection() called without a default collection")
        })?;
        vec![default]
    } else {
        let mut parsed = Vec::with_capacity(uris.len());
        for uri in uris {
            match CollectionUri::parse(uri) {
                Ok(uri) => parsed.push(uri),
                Err(err) => failed_retrieval(err.into(), dyn_ctx)?,
            }
        }
        parsed
    };

    let mut documents = DocumentSet::new();
    for uri in &uris {
        match broker.collection_documents(uri, dyn_ctx.check_permissions) {
            Ok(set) => documents.extend_from(&set),
            Err(err) => failed_retrieval(err, dyn_ctx)?,
        }
    }
    Ok(documents)
}

fn resolve_documents(uris: &[&str], broker: &Broker<'_>, dyn_ctx: &DynamicContext) -> Result<DocumentSet, Error> {
    let mut documents = DocumentSet::new();
    for uri in uris {
        match broker.document(uri, dyn_ctx.check_permissions) {
            Ok(Some(doc)) if doc.is_xml() => {
                documents.add(doc);
            }
            Ok(_) => failed_retrieval(StoreError::DocumentNotFound((*uri).to_owned()), dyn_ctx)?,
            Err(err) => failed_retrieval(err, dyn_ctx)?,
        }
    }
    Ok(documents)
}

/// Missing or unreadable resources contribute nothing unless the context
/// asks for an error.
fn failed_retrieval(err: StoreError, dyn_ctx: &DynamicContext) -> Result<(), Error> {
    if matches!(err, StoreError::Lock(_)) || dyn_ctx.raise_error_on_failed_retrieval {
        return Err(err.into());
    }
    debug!(%err, "resource not available; using the empty sequence");
    Ok(())
}

#[derive(Debug, Clone)]
struct Focus {
    item: Item,
    position: usize,
    size: usize,
}

struct Evaluator<'a> {
    tree: &'a ExprTree,
    dyn_ctx: &'a DynamicContext,
    resources: &'a HashMap<ExprId, DocumentSet>,
    bindings: Vec<(Arc<str>, Item)>,
    focus: HashMap<ContextId, Focus>,
}

impl<'a> Evaluator<'a> {
    fn new(tree: &'a ExprTree, dyn_ctx: &'a DynamicContext, resources: &'a HashMap<ExprId, DocumentSet>) -> Self {
        Self { tree, dyn_ctx, resources, bindings: Vec::new(), focus: HashMap::new() }
    }

    fn eval(&mut self, id: ExprId) -> Result<Sequence, Error> {
        let tree = self.tree;
        match tree.kind(id) {
            ExprKind::Literal(value) => Ok(vec![Item::Atomic(value.clone())]),
            ExprKind::VarRef(name) => self.variable(name),
            ExprKind::ContextItem => Ok(vec![self.focus_of(id)?.item.clone()]),
            ExprKind::Sequence(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(self.eval(*item)?);
                }
                Ok(out)
            }
            ExprKind::Filter { input, predicates } => {
                let mut seq = self.eval(*input)?;
                for predicate in predicates {
                    seq = self.apply_predicate(id, seq, *predicate)?;
                }
                Ok(seq)
            }
            ExprKind::For { var, input, where_clause, body } => {
                let input = self.eval(*input)?;
                let size = input.len();
                let mut out = Vec::new();
                for (index, item) in input.into_iter().enumerate() {
                    let focus = Focus { item: item.clone(), position: index + 1, size };
                    self.bindings.push((Arc::clone(var), item));
                    let step = self.for_step(id, focus, *where_clause, *body);
                    self.bindings.pop();
                    out.extend(step?);
                }
                Ok(out)
            }
            ExprKind::Compare { left, op, right } => {
                let left = self.eval(*left)?;
                let right = self.eval(*right)?;
                Ok(vec![Item::from(general_compare(&left, *op, &right)?)])
            }
            ExprKind::Logical { left, op, right } => {
                let left = effective_boolean_value(&self.eval(*left)?)?;
                let value = match (op, left) {
                    (Logical::And, false) => false,
                    (Logical::Or, true) => true,
                    _ => effective_boolean_value(&self.eval(*right)?)?,
                };
                Ok(vec![Item::from(value)])
            }
            ExprKind::SetOp { left, op, right } => {
                let left = node_set(self.eval(*left)?, *op)?;
                let right = node_set(self.eval(*right)?, *op)?;
                let result = match op {
                    SetOp::Union => left.union(&right),
                    SetOp::Intersect => left.intersection(&right),
                    SetOp::Except => left.except(&right),
                };
                Ok(result.into_iter().map(Item::Node).collect())
            }
            ExprKind::Call { function, args } => self.call(id, *function, args),
        }
    }

    fn for_step(
        &mut self,
        id: ExprId,
        focus: Focus,
        where_clause: Option<ExprId>,
        body: ExprId,
    ) -> Result<Sequence, Error> {
        if let Some(condition) = where_clause {
            let keep =
                self.with_focus(ContextId::from(id), focus, |ev| effective_boolean_value(&ev.eval(condition)?))?;
            if !keep {
                return Ok(Vec::new());
            }
        }
        self.eval(body)
    }

    fn apply_predicate(&mut self, filter: ExprId, seq: Sequence, predicate: ExprId) -> Result<Sequence, Error> {
        let positional = self
            .tree
            .node(predicate)
            .analysis()
            .is_some_and(|a| a.flags.contains(AnalyzeFlags::POSITIONAL_PREDICATE));
        if positional && let ExprKind::Literal(AtomicValue::Integer(n)) = self.tree.kind(predicate) {
            let selected = usize::try_from(*n).ok().and_then(|n| n.checked_sub(1)).and_then(|i| seq.into_iter().nth(i));
            return Ok(selected.into_iter().collect());
        }

        let context = ContextId::from(filter);
        let size = seq.len();
        let mut out = Vec::new();
        for (index, item) in seq.into_iter().enumerate() {
            let position = index + 1;
            let focus = Focus { item: item.clone(), position, size };
            let value = self.with_focus(context, focus, |ev| ev.eval(predicate))?;
            let keep = match value.as_slice() {
                [Item::Atomic(AtomicValue::Integer(n))] => usize::try_from(*n).is_ok_and(|n| n == position),
                [Item::Atomic(AtomicValue::Double(d))] => *d == position as f64,
                _ => effective_boolean_value(&value)?,
            };
            if keep {
                out.push(item);
            }
        }
        Ok(out)
    }

    fn with_focus<T>(
        &mut self,
        context: ContextId,
        focus: Focus,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let previous = self.focus.insert(context, focus);
        let result = f(self);
        match previous {
            Some(previous) => {
                self.focus.insert(context, previous);
            }
            None => {
                self.focus.remove(&context);
            }
        }
        result
    }

    /// The focus established for the context id `id` was analysed with.
    fn focus_of(&self, id: ExprId) -> Result<&Focus, Error> {
        self.tree
            .node(id)
            .analysis()
            .map(|a| a.context_id)
            .filter(|c| !c.is_none())
            .and_then(|c| self.focus.get(&c))
            .ok_or_else(|| Error::dynamic(ErrorCode::XPDY0002, "the context item is absent"))
    }

    fn variable(&self, name: &str) -> Result<Sequence, Error> {
        if let Some((_, item)) = self.bindings.iter().rev().find(|(bound, _)| &**bound == name) {
            return Ok(vec![item.clone()]);
        }
        self.dyn_ctx
            .variables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::dynamic(ErrorCode::XPDY0002, format!("no value supplied for variable ${name}")))
    }

    fn call(&mut self, id: ExprId, function: Builtin, args: &[ExprId]) -> Result<Sequence, Error> {
        let single = |value: AtomicValue| -> Result<Sequence, Error> { Ok(vec![Item::Atomic(value)]) };
        match function {
            Builtin::Collection | Builtin::Doc => Ok(self
                .resources
                .get(&id)
                .map(|docs| docs.to_node_set().into_iter().map(Item::Node).collect())
                .unwrap_or_default()),
            Builtin::Count => {
                let count = self.eval(args[0])?.len();
                single(AtomicValue::Integer(i64::try_from(count).unwrap_or(i64::MAX)))
            }
            Builtin::Exists => single(AtomicValue::Boolean(!self.eval(args[0])?.is_empty())),
            Builtin::Empty => single(AtomicValue::Boolean(self.eval(args[0])?.is_empty())),
            Builtin::Not => single(AtomicValue::Boolean(!effective_boolean_value(&self.eval(args[0])?)?)),
            Builtin::True => single(AtomicValue::Boolean(true)),
            Builtin::False => single(AtomicValue::Boolean(false)),
            Builtin::Position => {
                let position = self.focus_of(id)?.position;
                single(AtomicValue::Integer(i64::try_from(position).unwrap_or(i64::MAX)))
            }
            Builtin::Last => {
                let size = self.focus_of(id)?.size;
                single(AtomicValue::Integer(i64::try_from(size).unwrap_or(i64::MAX)))
            }
            Builtin::DocumentName | Builtin::DocumentId | Builtin::CollectionName => {
                let arg = self.eval(args[0])?;
                let node = match arg.as_slice() {
                    [] => return Ok(Vec::new()),
                    [Item::Node(node)] => node,
                    _ => {
                        return Err(Error::dynamic(
                            ErrorCode::XPTY0004,
                            format!("{function} expects a single node, got {} item(s)", arg.len()),
                        ));
                    }
                };
                let doc = node.doc();
                match function {
                    Builtin::DocumentName => single(AtomicValue::String(doc.file_name().to_owned())),
                    Builtin::DocumentId => single(AtomicValue::Integer(i64::from(doc.id().get()))),
                    _ => Ok(doc
                        .collection()
                        .map(|c| vec![Item::Atomic(AtomicValue::String(c.uri().to_string()))])
                        .unwrap_or_default()),
                }
            }
        }
    }
}

fn general_compare(left: &[Item], op: Comparison, right: &[Item]) -> Result<bool, Error> {
    for l in left {
        let l = l.atomize();
        for r in right {
            if holds(op, l.compare(&r.atomize())?) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn holds(op: Comparison, ordering: Option<Ordering>) -> bool {
    match ordering {
        None => op == Comparison::Ne,
        Some(ord) => match op {
            Comparison::Eq => ord == Ordering::Equal,
            Comparison::Ne => ord != Ordering::Equal,
            Comparison::Lt => ord == Ordering::Less,
            Comparison::Le => ord != Ordering::Greater,
            Comparison::Gt => ord == Ordering::Greater,
            Comparison::Ge => ord != Ordering::Less,
        },
    }
}

fn node_set(seq: Sequence, op: SetOp) -> Result<NodeSet, Error> {
    seq.into_iter()
        .map(|item| match item {
            Item::Node(node) => Ok(node),
            Item::Atomic(value) => Err(Error::dynamic(
                ErrorCode::XPTY0004,
                format!("{op:?} operands must be nodes, found atomic value '{value}'"),
            )),
        })
        .collect()
}
