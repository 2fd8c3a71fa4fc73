pub mod analyze;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod parser;
pub mod runtime;
pub mod xdm;

pub use analyze::{AnalyzeContext, AnalyzeFlags, ContextId};
pub use compiler::{CompiledQuery, compile, compile_query};
pub use error::{Error, ErrorCode, ErrorKind};
pub use evaluator::{evaluate_query, execute};
pub use expr::{ExprId, ExprKind, ExprTree};
pub use parser::{ParseError, XQueryParser, parse_query};
pub use runtime::{DynamicContext, DynamicContextBuilder, StaticContext, StaticContextBuilder};
pub use xdm::{AtomicValue, Item, Sequence};
