use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    LParen,
    RParen,
    Comma,
}

/// Tokenizes a key expression. Whitespace between tokens is tolerated (it is
/// what `canonicalize` strips); anything outside `[A-Za-z0-9_(),]` and
/// whitespace is a lex error.
pub fn lex(input: &str) -> Result<Vec<Token>, EngineError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            c if c.is_whitespace() => {
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(EngineError::InvalidExpression(format!(
                    "unexpected character '{other}' in expression {input:?}"
                )));
            }
        }
    }

    Ok(tokens)
}
