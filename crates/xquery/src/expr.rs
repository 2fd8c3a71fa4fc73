//! Compiled expression trees and the static-analysis pass over them.
//!
//! Expressions live in an arena ([`ExprTree`]) and refer to each other by
//! [`ExprId`]. Parent links are plain ids as well, so a node can locate and
//! rewrite the slot it occupies without owning its parent.

use crate::analyze::{AnalyzeContext, AnalyzeFlags, ContextId};
use crate::error::{Error, ErrorCode};
use crate::runtime::StaticContext;
use crate::xdm::AtomicValue;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logical {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

/// Functions known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Collection,
    Doc,
    Count,
    Exists,
    Empty,
    Not,
    True,
    False,
    Position,
    Last,
    DocumentName,
    DocumentId,
    CollectionName,
}

impl Builtin {
    /// Resolves a function name. Unprefixed names and `fn:` select the
    /// standard functions, `util:` the document helpers.
    pub fn resolve(prefix: Option<&str>, local: &str) -> Option<Self> {
        use Builtin::*;
        match (prefix.unwrap_or("fn"), local) {
            ("fn", "collection") => Some(Collection),
            ("fn", "doc") => Some(Doc),
            ("fn", "count") => Some(Count),
            ("fn", "exists") => Some(Exists),
            ("fn", "empty") => Some(Empty),
            ("fn", "not") => Some(Not),
            ("fn", "true") => Some(True),
            ("fn", "false") => Some(False),
            ("fn", "position") => Some(Position),
            ("fn", "last") => Some(Last),
            ("util", "document-name") => Some(DocumentName),
            ("util", "document-id") => Some(DocumentId),
            ("util", "collection-name") => Some(CollectionName),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        use Builtin::*;
        match self {
            Collection => "fn:collection",
            Doc => "fn:doc",
            Count => "fn:count",
            Exists => "fn:exists",
            Empty => "fn:empty",
            Not => "fn:not",
            True => "fn:true",
            False => "fn:false",
            Position => "fn:position",
            Last => "fn:last",
            DocumentName => "util:document-name",
            DocumentId => "util:document-id",
            CollectionName => "util:collection-name",
        }
    }

    /// Minimum and maximum number of arguments; `None` is unbounded.
    pub fn arity(self) -> (usize, Option<usize>) {
        use Builtin::*;
        match self {
            Collection => (0, None),
            True | False | Position | Last => (0, Some(0)),
            Doc | Count | Exists | Empty | Not | DocumentName | DocumentId | CollectionName => (1, Some(1)),
        }
    }

    pub fn accepts(self, argc: usize) -> bool {
        let (min, max) = self.arity();
        argc >= min && max.is_none_or(|max| argc <= max)
    }

    /// Functions whose arguments name stored resources.
    pub fn is_resource_access(self) -> bool {
        matches!(self, Builtin::Collection | Builtin::Doc)
    }

    /// Functions that read the focus established by a predicate or `where`.
    pub fn needs_focus(self) -> bool {
        matches!(self, Builtin::Position | Builtin::Last)
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type Children = SmallVec<[ExprId; 4]>;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(AtomicValue),
    VarRef(Arc<str>),
    ContextItem,
    Sequence(Children),
    Filter { input: ExprId, predicates: SmallVec<[ExprId; 2]> },
    For { var: Arc<str>, input: ExprId, where_clause: Option<ExprId>, body: ExprId },
    Compare { left: ExprId, op: Comparison, right: ExprId },
    Logical { left: ExprId, op: Logical, right: ExprId },
    SetOp { left: ExprId, op: SetOp, right: ExprId },
    Call { function: Builtin, args: SmallVec<[ExprId; 2]> },
}

impl ExprKind {
    /// Direct children in evaluation order.
    pub fn children(&self) -> Children {
        match self {
            ExprKind::Literal(_) | ExprKind::VarRef(_) | ExprKind::ContextItem => Children::new(),
            ExprKind::Sequence(items) => items.clone(),
            ExprKind::Filter { input, predicates } => {
                let mut out = Children::new();
                out.push(*input);
                out.extend(predicates.iter().copied());
                out
            }
            ExprKind::For { input, where_clause, body, .. } => {
                let mut out = Children::new();
                out.push(*input);
                out.extend(*where_clause);
                out.push(*body);
                out
            }
            ExprKind::Compare { left, right, .. }
            | ExprKind::Logical { left, right, .. }
            | ExprKind::SetOp { left, right, .. } => SmallVec::from_slice(&[*left, *right]),
            ExprKind::Call { args, .. } => args.iter().copied().collect(),
        }
    }

    fn replace_child(&mut self, old: ExprId, new: ExprId) -> bool {
        let swap = |slot: &mut ExprId| {
            if *slot == old {
                *slot = new;
                true
            } else {
                false
            }
        };
        match self {
            ExprKind::Literal(_) | ExprKind::VarRef(_) | ExprKind::ContextItem => false,
            ExprKind::Sequence(items) => items.iter_mut().any(swap),
            ExprKind::Filter { input, predicates } => swap(input) || predicates.iter_mut().any(swap),
            ExprKind::For { input, where_clause, body, .. } => {
                swap(input) || where_clause.as_mut().is_some_and(swap) || swap(body)
            }
            ExprKind::Compare { left, right, .. }
            | ExprKind::Logical { left, right, .. }
            | ExprKind::SetOp { left, right, .. } => swap(left) || swap(right),
            ExprKind::Call { args, .. } => args.iter_mut().any(swap),
        }
    }
}

/// What the analysis pass recorded for one expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisInfo {
    pub parent: Option<ExprId>,
    pub flags: AnalyzeFlags,
    pub context_id: ContextId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprNode {
    kind: ExprKind,
    parent: Option<ExprId>,
    analysis: Option<AnalysisInfo>,
}

impl ExprNode {
    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<ExprId> {
        self.parent
    }

    /// `None` until the node has been reached by [`ExprTree::analyze`].
    pub fn analysis(&self) -> Option<&AnalysisInfo> {
        self.analysis.as_ref()
    }
}

/// Arena owning every expression of one compiled query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExprTree {
    nodes: Vec<ExprNode>,
    root: Option<ExprId>,
}

impl ExprTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node. Children must already be in the tree; their parent
    /// links are pointed at the new node. Fails with `XQDB0002` once the
    /// tree holds as many nodes as an [`ExprId`] can address.
    pub fn push(&mut self, kind: ExprKind) -> Result<ExprId, Error> {
        let id = next_id(self.nodes.len())?;
        for child in kind.children() {
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(ExprNode { kind, parent: None, analysis: None });
        Ok(id)
    }

    pub fn set_root(&mut self, root: ExprId) {
        self.nodes[root.index()].parent = None;
        self.root = Some(root);
    }

    pub fn root(&self) -> Option<ExprId> {
        self.root
    }

    /// # Panics
    /// If `id` does not belong to this tree.
    pub fn node(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: ExprId) -> Option<&ExprNode> {
        self.nodes.get(id.index())
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.node(id).kind
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids reachable from the root, parents before children.
    pub fn reachable(&self) -> Vec<ExprId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<ExprId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.kind(id).children().into_iter().rev());
        }
        out
    }

    /// Points the slot of `parent` that holds `old` at `new`, or the root
    /// when `parent` is `None`. Returns `false` if `old` was not found.
    pub fn replace_child(&mut self, parent: Option<ExprId>, old: ExprId, new: ExprId) -> bool {
        let replaced = match parent {
            Some(parent) => self.nodes[parent.index()].kind.replace_child(old, new),
            None if self.root == Some(old) => {
                self.root = Some(new);
                true
            }
            None => false,
        };
        if replaced {
            self.nodes[new.index()].parent = parent;
            self.nodes[old.index()].parent = None;
        }
        replaced
    }

    /// Runs the analysis pass from the root with a fresh context.
    ///
    /// Records left by an earlier run are discarded first. Fails with the
    /// first static error found; the tree must not be evaluated then.
    pub fn analyze(&mut self, static_ctx: &StaticContext) -> Result<(), Error> {
        for node in &mut self.nodes {
            node.analysis = None;
        }
        let Some(root) = self.root else {
            return Ok(());
        };
        let mut analyzer = Analyzer { tree: self, static_ctx, scope: Vec::new() };
        analyzer.analyze(root, AnalyzeContext::new())?;
        debug!(expressions = self.nodes.len(), "analysis finished");
        Ok(())
    }
}

struct Analyzer<'a> {
    tree: &'a mut ExprTree,
    static_ctx: &'a StaticContext,
    scope: Vec<Arc<str>>,
}

impl Analyzer<'_> {
    fn analyze(&mut self, id: ExprId, ctx: AnalyzeContext) -> Result<(), Error> {
        trace!(expr = %id, flags = ?ctx.flags(), context = %ctx.context_id(), "analyze");
        let node = &mut self.tree.nodes[id.index()];
        debug_assert!(node.analysis.is_none(), "expression {id} analysed twice");
        node.analysis = Some(AnalysisInfo { parent: ctx.parent(), flags: ctx.flags(), context_id: ctx.context_id() });

        match node.kind.clone() {
            ExprKind::Literal(_) => Ok(()),
            ExprKind::VarRef(name) => {
                if self.scope.contains(&name) || self.static_ctx.is_variable_declared(&name) {
                    Ok(())
                } else {
                    Err(Error::static_code(ErrorCode::XPST0008, format!("variable ${name} is not declared")))
                }
            }
            ExprKind::ContextItem => require_focus(&ctx, "the context item"),
            ExprKind::Sequence(items) if items.len() == 1 && self.static_ctx.enable_query_rewriting => {
                let item = items[0];
                self.tree.replace_child(ctx.parent(), id, item);
                self.tree.nodes[id.index()].analysis = None;
                debug!(replaced = %id, by = %item, "single item sequence inlined");
                self.analyze(item, ctx)
            }
            ExprKind::Filter { input, predicates } => {
                self.analyze(input, ctx.for_child(id))?;
                for predicate in predicates {
                    let mut pctx = ctx.for_child(id);
                    pctx.set_context_id(ContextId::from(id));
                    pctx.add_flag(AnalyzeFlags::IN_PREDICATE);
                    if matches!(self.tree.kind(predicate), ExprKind::Literal(AtomicValue::Integer(_))) {
                        pctx.add_flag(AnalyzeFlags::POSITIONAL_PREDICATE);
                    } else {
                        pctx.remove_flag(AnalyzeFlags::POSITIONAL_PREDICATE);
                    }
                    self.analyze(predicate, pctx)?;
                }
                Ok(())
            }
            ExprKind::For { var, input, where_clause, body } => {
                self.analyze(input, ctx.for_child(id))?;
                self.scope.push(var);
                let result = self.analyze_for_body(id, &ctx, where_clause, body);
                self.scope.pop();
                result
            }
            ExprKind::Call { function, args } => {
                if function.needs_focus() {
                    require_focus(&ctx, function.name())?;
                }
                self.analyze_children(id, &ctx, &args)?;
                if function.is_resource_access() {
                    // re-read: inlining may have replaced the arguments
                    for arg in self.tree.kind(id).children() {
                        if !matches!(self.tree.kind(arg), ExprKind::Literal(AtomicValue::String(_))) {
                            return Err(Error::static_code(
                                ErrorCode::XQDB0001,
                                format!("{function} expects string literal arguments so its documents can be locked before evaluation"),
                            ));
                        }
                    }
                }
                Ok(())
            }
            kind => self.analyze_children(id, &ctx, &kind.children()),
        }
    }

    fn analyze_for_body(
        &mut self,
        id: ExprId,
        ctx: &AnalyzeContext,
        where_clause: Option<ExprId>,
        body: ExprId,
    ) -> Result<(), Error> {
        if let Some(where_clause) = where_clause {
            let mut wctx = ctx.for_child(id);
            wctx.add_flag(AnalyzeFlags::IN_WHERE_CLAUSE);
            wctx.set_context_id(ContextId::from(id));
            self.analyze(where_clause, wctx)?;
        }
        self.analyze(body, ctx.for_child(id))
    }

    fn analyze_children(&mut self, id: ExprId, ctx: &AnalyzeContext, children: &[ExprId]) -> Result<(), Error> {
        for child in children {
            self.analyze(*child, ctx.for_child(id))?;
        }
        Ok(())
    }
}

fn next_id(len: usize) -> Result<ExprId, Error> {
    u32::try_from(len)
        .map(ExprId)
        .map_err(|_| Error::static_code(ErrorCode::XQDB0002, "query has too many expressions"))
}

fn require_focus(ctx: &AnalyzeContext, what: &str) -> Result<(), Error> {
    if ctx.context_id().is_none() {
        return Err(Error::static_code(
            ErrorCode::XPDY0002,
            format!("{what} is used outside of a predicate or where clause"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rstest::rstest;

    fn literal(tree: &mut ExprTree, i: i64) -> ExprId {
        tree.push(ExprKind::Literal(AtomicValue::Integer(i))).unwrap()
    }

    #[rstest]
    fn push_links_parents() {
        let mut tree = ExprTree::new();
        let a = literal(&mut tree, 1);
        let b = literal(&mut tree, 2);
        let cmp = tree.push(ExprKind::Compare { left: a, op: Comparison::Lt, right: b }).unwrap();
        tree.set_root(cmp);
        assert_eq!(tree.node(a).parent(), Some(cmp));
        assert_eq!(tree.node(b).parent(), Some(cmp));
        assert_eq!(tree.reachable(), vec![cmp, a, b]);
    }

    #[rstest]
    fn ids_stop_at_the_addressable_limit() {
        assert_eq!(next_id(7).unwrap(), ExprId(7));
        assert_eq!(next_id(u32::MAX as usize).unwrap(), ExprId(u32::MAX));
        let err = next_id(u32::MAX as usize + 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::XQDB0002);
        assert_eq!(err.kind, ErrorKind::Static);
    }

    #[rstest]
    fn replace_child_updates_links() {
        let mut tree = ExprTree::new();
        let a = literal(&mut tree, 1);
        let seq = tree.push(ExprKind::Sequence(SmallVec::from_slice(&[a]))).unwrap();
        let b = literal(&mut tree, 2);
        let cmp = tree.push(ExprKind::Compare { left: seq, op: Comparison::Eq, right: b }).unwrap();
        tree.set_root(cmp);

        assert!(tree.replace_child(Some(cmp), seq, a));
        assert_eq!(tree.kind(cmp), &ExprKind::Compare { left: a, op: Comparison::Eq, right: b });
        assert_eq!(tree.node(a).parent(), Some(cmp));
        assert_eq!(tree.node(seq).parent(), None);
        assert!(!tree.replace_child(Some(cmp), seq, a));
    }

    #[rstest]
    #[case(Builtin::Collection, 0, true)]
    #[case(Builtin::Collection, 3, true)]
    #[case(Builtin::Count, 0, false)]
    #[case(Builtin::Position, 1, false)]
    fn arity_checks(#[case] function: Builtin, #[case] argc: usize, #[case] ok: bool) {
        assert_eq!(function.accepts(argc), ok);
    }

    #[rstest]
    #[case(None, "count", Some(Builtin::Count))]
    #[case(Some("fn"), "doc", Some(Builtin::Doc))]
    #[case(Some("util"), "document-name", Some(Builtin::DocumentName))]
    #[case(Some("util"), "count", None)]
    #[case(None, "document-name", None)]
    fn resolves_prefixed_names(#[case] prefix: Option<&str>, #[case] local: &str, #[case] expected: Option<Builtin>) {
        assert_eq!(Builtin::resolve(prefix, local), expected);
    }
}
