use crate::xdm::Sequence;
use std::collections::{BTreeSet, HashMap};
use xqdb_core::CollectionUri;
use xqdb_core::settings::XQuerySettings;

/// Compile-time context. A compiled query keeps its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticContext {
    /// External variables a query may reference.
    pub variables: BTreeSet<String>,
    /// Target of `collection()` without arguments.
    pub default_collection: Option<CollectionUri>,
    pub enable_query_rewriting: bool,
}

impl Default for StaticContext {
    fn default() -> Self {
        Self { variables: BTreeSet::new(), default_collection: Some(CollectionUri::root()), enable_query_rewriting: true }
    }
}

impl StaticContext {
    pub fn is_variable_declared(&self, name: &str) -> bool {
        self.variables.contains(name)
    }
}

#[derive(Debug, Default)]
pub struct StaticContextBuilder {
    ctx: StaticContext,
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, settings: &XQuerySettings) -> Self {
        self.ctx.enable_query_rewriting = settings.enable_query_rewriting;
        self
    }

    /// Declares an external variable, without the leading `$`.
    pub fn with_variable(mut self, name: impl Into<String>) -> Self {
        self.ctx.variables.insert(name.into());
        self
    }

    pub fn with_default_collection(mut self, uri: CollectionUri) -> Self {
        self.ctx.default_collection = Some(uri);
        self
    }

    pub fn without_default_collection(mut self) -> Self {
        self.ctx.default_collection = None;
        self
    }

    pub fn with_query_rewriting(mut self, enabled: bool) -> Self {
        self.ctx.enable_query_rewriting = enabled;
        self
    }

    pub fn build(self) -> StaticContext {
        self.ctx
    }
}

/// Per-execution context: variable values and retrieval policy.
#[derive(Debug, Clone)]
pub struct DynamicContext {
    pub variables: HashMap<String, Sequence>,
    /// Leave out resources the executing user may not read.
    pub check_permissions: bool,
    /// Fail with `FODC0002` instead of yielding `()` for missing resources.
    pub raise_error_on_failed_retrieval: bool,
}

impl Default for DynamicContext {
    fn default() -> Self {
        Self { variables: HashMap::new(), check_permissions: true, raise_error_on_failed_retrieval: false }
    }
}

#[derive(Debug, Default)]
pub struct DynamicContextBuilder {
    ctx: DynamicContext,
}

impl DynamicContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, settings: &XQuerySettings) -> Self {
        self.ctx.check_permissions = settings.check_permissions;
        self.ctx.raise_error_on_failed_retrieval = settings.raise_error_on_failed_retrieval;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Sequence>) -> Self {
        self.ctx.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_check_permissions(mut self, check: bool) -> Self {
        self.ctx.check_permissions = check;
        self
    }

    pub fn with_raise_error_on_failed_retrieval(mut self, raise: bool) -> Self {
        self.ctx.raise_error_on_failed_retrieval = raise;
        self
    }

    pub fn build(self) -> DynamicContext {
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdm::Item;
    use rstest::rstest;

    #[rstest]
    fn builders_follow_settings() {
        let settings = XQuerySettings {
            enable_query_rewriting: false,
            raise_error_on_failed_retrieval: true,
            check_permissions: false,
        };
        let static_ctx = StaticContextBuilder::new().with_settings(&settings).with_variable("limit").build();
        assert!(!static_ctx.enable_query_rewriting);
        assert!(static_ctx.is_variable_declared("limit"));
        assert_eq!(static_ctx.default_collection, Some(CollectionUri::root()));

        let dyn_ctx = DynamicContextBuilder::new()
            .with_settings(&settings)
            .with_variable("limit", vec![Item::from(3_i64)])
            .build();
        assert!(!dyn_ctx.check_permissions);
        assert!(dyn_ctx.raise_error_on_failed_retrieval);
        assert_eq!(dyn_ctx.variables["limit"], vec![Item::from(3_i64)]);
    }
}
