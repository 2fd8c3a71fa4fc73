use crate::error::{Error, ErrorCode};
use crate::expr::{Builtin, Comparison, ExprId, ExprKind, ExprTree, Logical, SetOp};
use crate::parser::{ast, parse_query};
use crate::runtime::StaticContext;
use crate::xdm::AtomicValue;
use smallvec::SmallVec;
use std::sync::{Arc, OnceLock};
use tracing::debug;

static DEFAULT_STATIC_CONTEXT: OnceLock<StaticContext> = OnceLock::new();

fn default_static_ctx() -> &'static StaticContext {
    DEFAULT_STATIC_CONTEXT.get_or_init(StaticContext::default)
}

/// A parsed, lowered and analysed query, ready for execution.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    tree: ExprTree,
    static_ctx: Arc<StaticContext>,
    source: String,
}

impl CompiledQuery {
    pub fn tree(&self) -> &ExprTree {
        &self.tree
    }

    pub fn static_context(&self) -> &StaticContext {
        &self.static_ctx
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Compile using the default static context.
pub fn compile_query(query: &str) -> Result<CompiledQuery, Error> {
    compile(query, default_static_ctx())
}

pub fn compile(query: &str, static_ctx: &StaticContext) -> Result<CompiledQuery, Error> {
    let ast = parse_query(query).map_err(|e| Error::static_code(ErrorCode::XPST0003, e.to_string()).with_source(e))?;
    let mut tree = ExprTree::new();
    let root = lower(&mut tree, &ast)?;
    tree.set_root(root);
    tree.analyze(static_ctx)?;
    debug!(expressions = tree.len(), "query compiled");
    Ok(CompiledQuery { tree, static_ctx: Arc::new(static_ctx.clone()), source: query.to_owned() })
}

fn lower(tree: &mut ExprTree, expr: &ast::Expr) -> Result<ExprId, Error> {
    use ast::Expr as E;
    let kind = match expr {
        E::Literal(literal) => ExprKind::Literal(match literal {
            ast::Literal::Integer(i) => AtomicValue::Integer(*i),
            ast::Literal::Double(d) => AtomicValue::Double(*d),
            ast::Literal::String(s) => AtomicValue::String(s.clone()),
        }),
        E::VarRef(name) => ExprKind::VarRef(Arc::from(name.to_string())),
        E::ContextItem => ExprKind::ContextItem,
        E::Sequence(items) => ExprKind::Sequence(lower_all(tree, items)?),
        E::Filter { input, predicates } => {
            let input = lower(tree, input)?;
            ExprKind::Filter { input, predicates: lower_all(tree, predicates)? }
        }
        E::For { var, input, where_clause, body } => {
            let input = lower(tree, input)?;
            let where_clause = where_clause.as_deref().map(|w| lower(tree, w)).transpose()?;
            let body = lower(tree, body)?;
            ExprKind::For { var: Arc::from(var.to_string()), input, where_clause, body }
        }
        E::GeneralComparison { left, op, right } => {
            let op = match op {
                ast::GeneralComp::Eq => Comparison::Eq,
                ast::GeneralComp::Ne => Comparison::Ne,
                ast::GeneralComp::Lt => Comparison::Lt,
                ast::GeneralComp::Le => Comparison::Le,
                ast::GeneralComp::Gt => Comparison::Gt,
                ast::GeneralComp::Ge => Comparison::Ge,
            };
            ExprKind::Compare { left: lower(tree, left)?, op, right: lower(tree, right)? }
        }
        E::Binary { left, op, right } => {
            let op = match op {
                ast::BinaryOp::And => Logical::And,
                ast::BinaryOp::Or => Logical::Or,
            };
            ExprKind::Logical { left: lower(tree, left)?, op, right: lower(tree, right)? }
        }
        E::SetOp { left, op, right } => {
            let op = match op {
                ast::SetOp::Union => SetOp::Union,
                ast::SetOp::Intersect => SetOp::Intersect,
                ast::SetOp::Except => SetOp::Except,
            };
            ExprKind::SetOp { left: lower(tree, left)?, op, right: lower(tree, right)? }
        }
        E::FunctionCall { name, args } => {
            let function = Builtin::resolve(name.prefix.as_deref(), &name.local).ok_or_else(|| {
                Error::static_code(ErrorCode::XPST0017, format!("unknown function {name}#{}", args.len()))
            })?;
            if !function.accepts(args.len()) {
                return Err(Error::static_code(
                    ErrorCode::XPST0017,
                    format!("{function} does not accept {} argument(s)", args.len()),
                ));
            }
            ExprKind::Call { function, args: lower_all(tree, args)? }
        }
    };
    tree.push(kind)
}

fn lower_all<A>(tree: &mut ExprTree, exprs: &[ast::Expr]) -> Result<SmallVec<A>, Error>
where
    A: smallvec::Array<Item = ExprId>,
{
    exprs.iter().map(|e| lower(tree, e)).collect()
}
