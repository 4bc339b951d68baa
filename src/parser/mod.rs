//! Parsing: turns a lexed token stream into an [`Expr`](crate::ast::Expr)
//! tree. Two flavors exist: the classic precedence-climbing grammar used
//! by every operator's arguments, and the vault sub-operator grammar
//! (`|` choice, `(...)` grouping) used only when a vault-family
//! operator's raw argument text requires it.

pub mod classic;
pub mod vaultsub;

use crate::ast::Expr;
use crate::error::Result;
use crate::token::Token;

/// A parsed `(( ... ))` occurrence, prior to being located at a cursor and
/// assigned a phase. `target` carries the `@target` suffix recognized on
/// external operators — the parser splits `name@target` before building
/// the call.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub op: String,
    pub target: Option<String>,
    pub args: Vec<Expr>,
}

/// Operators whose arguments use the vault sub-operator grammar (`|`
/// choice, bare-word concatenation, `(...)` grouping) rather than the
/// classic precedence-climbing grammar.
fn is_vault_family(op: &str) -> bool {
    matches!(op, "vault" | "vault-try")
}

/// Parses the full body of a `(( ... ))` expression.
///
/// `is_known_operator` is used both by the lexer (to distinguish bare
/// operator identifiers from references) and by this function (to decide
/// whether the expression opens with a head operator or is a "pure"
/// expression that gets wrapped in a synthetic `calc` call).
pub fn parse_body(body: &str, is_known_operator: &dyn Fn(&str) -> bool) -> Result<ParsedCall> {
    let tokens = crate::lexer::Lexer::lex(body, is_known_operator)?;

    if let Some(Token::Operator(name)) = tokens.first() {
        let (op, target) = split_target(name);
        if is_vault_family(&op) {
            let rest = tokens[1..].to_vec();
            return Ok(ParsedCall {
                op,
                target,
                args: parse_vault_args(rest)?,
            });
        }
    }

    classic::Parser::new(tokens).parse_top(is_known_operator)
}

/// Splits off a top-level `||` default-fallback (classic grammar) before
/// handing the primary side to the vault sub-operator parser; the default
/// side is an ordinary expression, parsed classically. The primary side
/// itself goes through `vaultsub::parse_primary`, which also detects a
/// space-separated list of `:`-bearing expressions as independent
/// vault-try candidates rather than a single concatenated path.
fn parse_vault_args(tokens: Vec<Token>) -> Result<Vec<Expr>> {
    if let Some(split_at) = find_top_level_logical_or(&tokens) {
        let (primary, rest) = tokens.split_at(split_at);
        let default_tokens = rest[1..].to_vec();
        let primary_expr = vaultsub::parse_primary(primary.to_vec())?;
        let default_expr = classic::parse_single_expr(default_tokens)?;
        return Ok(vec![Expr::LogicalOr {
            left: Box::new(primary_expr),
            right: Box::new(default_expr),
        }]);
    }
    Ok(vec![vaultsub::parse_primary(tokens)?])
}

fn find_top_level_logical_or(tokens: &[Token]) -> Option<usize> {
    let mut depth = 0i32;
    for (i, tok) in tokens.iter().enumerate() {
        match tok {
            Token::OpenParen => depth += 1,
            Token::CloseParen => depth -= 1,
            Token::LogicalOr if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

pub(crate) fn split_target(name: &str) -> (String, Option<String>) {
    match name.split_once('@') {
        Some((op, target)) => (op.to_string(), Some(target.to_string())),
        None => (name.to_string(), None),
    }
}

pub(crate) fn peek_is_eof(tokens: &[Token], pos: usize) -> bool {
    matches!(tokens.get(pos), None | Some(Token::Eof))
}
