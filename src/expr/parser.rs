use super::ast::Expr;
use super::lexer::{lex, Token};
use crate::error::EngineError;

/// Parses a single key expression, requiring the whole input to be consumed.
pub fn parse(input: &str) -> Result<Expr, EngineError> {
    if input.trim().is_empty() {
        return Err(EngineError::InvalidExpression("empty expression".into()));
    }
    let tokens = lex(input)?;
    let mut pos = 0;
    let expr = parse_expr(&tokens, &mut pos, input)?;
    if pos != tokens.len() {
        return Err(EngineError::InvalidExpression(format!(
            "trailing tokens after expression {input:?}"
        )));
    }
    Ok(expr)
}

fn parse_expr(tokens: &[Token], pos: &mut usize, original: &str) -> Result<Expr, EngineError> {
    let head = match tokens.get(*pos) {
        Some(Token::Ident(name)) => name.clone(),
        _ => {
            return Err(EngineError::InvalidExpression(format!(
                "expected identifier in {original:?}"
            )))
        }
    };
    *pos += 1;

    if !matches!(tokens.get(*pos), Some(Token::LParen)) {
        return Ok(Expr::Atom(head));
    }
    *pos += 1; // consume '('

    let mut args = Vec::new();
    if !matches!(tokens.get(*pos), Some(Token::RParen)) {
        loop {
            match tokens.get(*pos) {
                Some(Token::Ident(arg)) => {
                    args.push(arg.clone());
                    *pos += 1;
                }
                _ => {
                    return Err(EngineError::InvalidExpression(format!(
                        "expected argument identifier in {original:?}"
                    )))
                }
            }
            match tokens.get(*pos) {
                Some(Token::Comma) => {
                    *pos += 1;
                }
                _ => break,
            }
        }
    }

    match tokens.get(*pos) {
        Some(Token::RParen) => *pos += 1,
        _ => {
            return Err(EngineError::InvalidExpression(format!(
                "unterminated call in {original:?}"
            )))
        }
    }

    Ok(Expr::Call { head, args })
}

/// Parses then re-renders, producing the grammar's stable whitespace-free
/// form. `canonicalize` is idempotent: `canonicalize(canonicalize(s)) ==
/// canonicalize(s)`.
pub fn canonicalize(input: &str) -> Result<String, EngineError> {
    Ok(parse(input)?.render())
}
