//! State threaded through the static-analysis pass of a compiled query.
//!
//! Every expression receives an [`AnalyzeContext`] from its parent before it
//! analyses its own children. The context carries three things:
//!
//! * the structural parent, as a handle into the expression arena, so a node
//!   may rewrite the slot it occupies;
//! * execution hints encoded as [`AnalyzeFlags`];
//! * a [`ContextId`] naming the expression that established the current
//!   context item (a predicate's filter or a `where` clause's `for`).
//!
//! Constructing a context with a parent and flags starts without a context
//! id. Only a clone carries the id along, so establishing expressions must
//! stamp it explicitly for the sub-expressions that need it.

use crate::expr::ExprId;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Execution hints passed from an expression to its children.
    ///
    /// The set is opaque: any bit may be set, only the named ones carry
    /// meaning for the built-in expressions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AnalyzeFlags: u32 {
        const IN_PREDICATE = 1;
        const IN_WHERE_CLAUSE = 1 << 1;
        const POSITIONAL_PREDICATE = 1 << 2;

        const _ = !0;
    }
}

/// Identifies the expression that established a context item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContextId(Option<u32>);

impl ContextId {
    /// No context item is established.
    pub const NONE: ContextId = ContextId(None);

    pub const fn new(id: u32) -> Self {
        Self(Some(id))
    }

    pub fn get(self) -> Option<u32> {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0.is_none()
    }
}

impl From<ExprId> for ContextId {
    fn from(id: ExprId) -> Self {
        ContextId::new(id.get())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "#{id}"),
            None => f.write_str("none"),
        }
    }
}

/// Parent, flags and context id handed to an expression's analysis.
///
/// `Clone` copies all three fields verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeContext {
    parent: Option<ExprId>,
    flags: AnalyzeFlags,
    context_id: ContextId,
}

impl AnalyzeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for analysing a child of `parent`. The context id starts out
    /// as [`ContextId::NONE`].
    pub fn with_parent(parent: ExprId, flags: AnalyzeFlags) -> Self {
        Self { parent: Some(parent), flags, context_id: ContextId::NONE }
    }

    /// Copy of `self` with the parent replaced, keeping flags and context id.
    pub fn for_child(&self, parent: ExprId) -> Self {
        Self { parent: Some(parent), ..self.clone() }
    }

    pub fn flags(&self) -> AnalyzeFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: AnalyzeFlags) {
        self.flags = flags;
    }

    pub fn add_flag(&mut self, flag: AnalyzeFlags) {
        self.flags |= flag;
    }

    pub fn remove_flag(&mut self, flag: AnalyzeFlags) {
        self.flags &= !flag;
    }

    pub fn has_flag(&self, flag: AnalyzeFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn set_context_id(&mut self, context_id: ContextId) {
        self.context_id = context_id;
    }

    pub fn parent(&self) -> Option<ExprId> {
        self.parent
    }

    pub fn set_parent(&mut self, parent: Option<ExprId>) {
        self.parent = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn default_context_is_blank() {
        let ctx = AnalyzeContext::new();
        assert_eq!(ctx.parent(), None);
        assert!(ctx.flags().is_empty());
        assert!(ctx.context_id().is_none());
    }

    #[rstest]
    fn with_parent_does_not_inherit_context_id() {
        let mut outer = AnalyzeContext::new();
        outer.set_context_id(ContextId::new(3));
        let inner = AnalyzeContext::with_parent(ExprId::new(1), outer.flags() | AnalyzeFlags::IN_PREDICATE);
        assert_eq!(inner.parent(), Some(ExprId::new(1)));
        assert!(inner.has_flag(AnalyzeFlags::IN_PREDICATE));
        assert_eq!(inner.context_id(), ContextId::NONE);
    }

    #[rstest]
    fn clone_copies_everything() {
        let mut ctx = AnalyzeContext::with_parent(ExprId::new(2), AnalyzeFlags::IN_WHERE_CLAUSE);
        ctx.set_context_id(ContextId::new(9));
        let copy = ctx.clone();
        assert_eq!(copy, ctx);

        let child = ctx.for_child(ExprId::new(5));
        assert_eq!(child.parent(), Some(ExprId::new(5)));
        assert_eq!(child.context_id(), ContextId::new(9));
        assert_eq!(child.flags(), AnalyzeFlags::IN_WHERE_CLAUSE);
    }

    #[rstest]
    fn flags_compose_bitwise() {
        let mut ctx = AnalyzeContext::new();
        ctx.add_flag(AnalyzeFlags::IN_PREDICATE);
        ctx.add_flag(AnalyzeFlags::from_bits_retain(1 << 20));
        ctx.remove_flag(AnalyzeFlags::IN_PREDICATE);
        assert_eq!(ctx.flags().bits(), 1 << 20);
        ctx.set_flags(AnalyzeFlags::empty());
        assert!(!ctx.has_flag(AnalyzeFlags::from_bits_retain(1 << 20)));
    }

    #[rstest]
    #[case(ContextId::NONE, "none")]
    #[case(ContextId::new(7), "#7")]
    fn context_id_display(#[case] id: ContextId, #[case] expected: &str) {
        assert_eq!(id.to_string(), expected);
    }
}
