use pest::Parser;
use pest::error::{Error as PestError, LineColLocation};
use pest::iterators::Pair;
use thiserror::Error;

pub mod ast;

use ast::{BinaryOp, Expr, GeneralComp, Literal, QName, SetOp};

#[derive(pest_derive::Parser)]
#[grammar = "xquery.pest"]
pub struct XQueryParser;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    fn at(pair: &Pair<'_, Rule>, message: impl Into<String>) -> Self {
        let (line, column) = pair.line_col();
        Self { message: message.into(), line, column }
    }
}

impl From<PestError<Rule>> for ParseError {
    fn from(err: PestError<Rule>) -> Self {
        let (line, column) = match err.line_col {
            LineColLocation::Pos(pos) | LineColLocation::Span(pos, _) => pos,
        };
        Self { message: err.variant.message().into_owned(), line, column }
    }
}

/// Parses a query into its syntax tree.
pub fn parse_query(input: &str) -> Result<Expr, ParseError> {
    let mut pairs = XQueryParser::parse(Rule::query, input)?;
    let missing = || ParseError { message: "empty query".into(), line: 1, column: 1 };
    let query = pairs.next().ok_or_else(missing)?;
    let expr = query.into_inner().find(|p| p.as_rule() == Rule::expr).ok_or_else(missing)?;
    build(expr)
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::K_FOR
            | Rule::K_IN
            | Rule::K_WHERE
            | Rule::K_RETURN
            | Rule::K_OR
            | Rule::K_AND
            | Rule::K_UNION
            | Rule::K_INTERSECT
            | Rule::K_EXCEPT
    )
}

fn next_part<'i>(
    parts: &mut impl Iterator<Item = Pair<'i, Rule>>,
    parent: &Pair<'i, Rule>,
    what: &str,
) -> Result<Pair<'i, Rule>, ParseError> {
    parts.next().ok_or_else(|| ParseError::at(parent, format!("expected {what}")))
}

fn build(pair: Pair<'_, Rule>) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::expr => {
            let mut items = pair.into_inner().map(build).collect::<Result<Vec<_>, _>>()?;
            if items.len() == 1 { Ok(items.remove(0)) } else { Ok(Expr::Sequence(items)) }
        }
        Rule::parenthesized_expr => {
            let items = match pair.into_inner().next() {
                Some(expr) => expr.into_inner().map(build).collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            Ok(Expr::Sequence(items))
        }
        Rule::for_expr => build_for(pair),
        Rule::or_expr => fold(pair, |left, _, right| Ok(binary(left, BinaryOp::Or, right))),
        Rule::and_expr => fold(pair, |left, _, right| Ok(binary(left, BinaryOp::And, right))),
        Rule::comparison_expr => fold(pair, |left, op, right| {
            let op = match op.as_str() {
                "=" => GeneralComp::Eq,
                "!=" => GeneralComp::Ne,
                "<" => GeneralComp::Lt,
                "<=" => GeneralComp::Le,
                ">" => GeneralComp::Gt,
                ">=" => GeneralComp::Ge,
                other => return Err(ParseError::at(op, format!("unknown comparison operator '{other}'"))),
            };
            Ok(Expr::GeneralComparison { left: Box::new(left), op, right: Box::new(right) })
        }),
        Rule::union_expr => fold(pair, |left, _, right| Ok(set_op(left, SetOp::Union, right))),
        Rule::intersect_except_expr => fold(pair, |left, op, right| {
            let op = if op.as_str().starts_with("intersect") { SetOp::Intersect } else { SetOp::Except };
            Ok(set_op(left, op, right))
        }),
        Rule::filter_expr => {
            let parent = pair.clone();
            let mut parts = pair.into_inner();
            let input = build(next_part(&mut parts, &parent, "primary expression")?)?;
            let predicates = parts.map(build).collect::<Result<Vec<_>, _>>()?;
            if predicates.is_empty() {
                Ok(input)
            } else {
                Ok(Expr::Filter { input: Box::new(input), predicates })
            }
        }
        Rule::predicate => {
            let parent = pair.clone();
            build(next_part(&mut pair.into_inner(), &parent, "predicate expression")?)
        }
        Rule::context_item => Ok(Expr::ContextItem),
        Rule::function_call => {
            let parent = pair.clone();
            let mut parts = pair.into_inner();
            let name = QName::parse(next_part(&mut parts, &parent, "function name")?.as_str());
            let args = parts.map(build).collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::FunctionCall { name, args })
        }
        Rule::var_ref => Ok(Expr::VarRef(var_name(pair)?)),
        Rule::integer_literal => pair
            .as_str()
            .parse::<i64>()
            .map(|i| Expr::Literal(Literal::Integer(i)))
            .map_err(|_| ParseError::at(&pair, format!("integer literal {} is out of range", pair.as_str()))),
        Rule::decimal_literal | Rule::double_literal => pair
            .as_str()
            .parse::<f64>()
            .map(|d| Expr::Literal(Literal::Double(d)))
            .map_err(|_| ParseError::at(&pair, format!("invalid numeric literal {}", pair.as_str()))),
        Rule::string_literal => {
            let value = match pair.into_inner().next() {
                Some(inner) if inner.as_rule() == Rule::dbl_string_inner => inner.as_str().replace("\"\"", "\""),
                Some(inner) => inner.as_str().replace("''", "'"),
                None => String::new(),
            };
            Ok(Expr::Literal(Literal::String(value)))
        }
        other => Err(ParseError::at(&pair, format!("unexpected {other:?}"))),
    }
}

fn build_for(pair: Pair<'_, Rule>) -> Result<Expr, ParseError> {
    let parent = pair.clone();
    let mut parts = pair.into_inner().filter(|p| !is_keyword(p.as_rule()));
    let var = var_name(next_part(&mut parts, &parent, "variable binding")?)?;
    let input = build(next_part(&mut parts, &parent, "binding sequence")?)?;
    let mut rest = next_part(&mut parts, &parent, "return clause")?;
    let where_clause = if rest.as_rule() == Rule::where_clause {
        let clause = rest.clone();
        let condition = next_part(&mut rest.into_inner().filter(|p| !is_keyword(p.as_rule())), &clause, "condition")?;
        rest = next_part(&mut parts, &parent, "return clause")?;
        Some(Box::new(build(condition)?))
    } else {
        None
    };
    Ok(Expr::For { var, input: Box::new(input), where_clause, body: Box::new(build(rest)?) })
}

fn var_name(pair: Pair<'_, Rule>) -> Result<QName, ParseError> {
    let parent = pair.clone();
    Ok(QName::parse(next_part(&mut pair.into_inner(), &parent, "variable name")?.as_str()))
}

/// Left-folds `operand (op operand)*`.
fn fold<F>(pair: Pair<'_, Rule>, combine: F) -> Result<Expr, ParseError>
where
    F: Fn(Expr, &Pair<'_, Rule>, Expr) -> Result<Expr, ParseError>,
{
    let parent = pair.clone();
    let mut parts = pair.into_inner();
    let mut expr = build(next_part(&mut parts, &parent, "operand")?)?;
    while let Some(op) = parts.next() {
        let right = build(next_part(&mut parts, &parent, "operand")?)?;
        expr = combine(expr, &op, right)?;
    }
    Ok(expr)
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::Binary { left: Box::new(left), op, right: Box::new(right) }
}

fn set_op(left: Expr, op: SetOp, right: Expr) -> Expr {
    Expr::SetOp { left: Box::new(left), op, right: Box::new(right) }
}
