//! Syntax tree produced by the parser, before names are resolved.

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralComp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    pub fn parse(s: &str) -> Self {
        match s.split_once(':') {
            Some((prefix, local)) => QName { prefix: Some(prefix.to_owned()), local: local.to_owned() },
            None => QName { prefix: None, local: s.to_owned() },
        }
    }
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{prefix}:{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    VarRef(QName),
    ContextItem,
    /// Comma-separated items; also every parenthesized expression.
    Sequence(Vec<Expr>),
    Filter {
        input: Box<Expr>,
        predicates: Vec<Expr>,
    },
    For {
        var: QName,
        input: Box<Expr>,
        where_clause: Option<Box<Expr>>,
        body: Box<Expr>,
    },
    GeneralComparison {
        left: Box<Expr>,
        op: GeneralComp,
        right: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    SetOp {
        left: Box<Expr>,
        op: SetOp,
        right: Box<Expr>,
    },
    FunctionCall {
        name: QName,
        args: Vec<Expr>,
    },
}
