use crate::Span;
use crate::lexer::{Token, TokenKind, tokenize};
use crate::types::{HashValue, Value};
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected token '{found}' at {span}, expected {expected}", span = .found.span)]
    UnexpectedToken { found: Token, expected: String },
    #[error("unexpected end of input, expected {0}")]
    UnexpectedEof(String),
    #[error("unterminated string literal at {0}")]
    UnterminatedString(Span),
    #[error("invalid hash literal at {0}: {1}")]
    InvalidHashLiteral(Span, String),
}

impl ParseError {
    /// Where the error points in the source, if anywhere.
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::UnexpectedToken { found, .. } => Some(found.span),
            ParseError::UnterminatedString(span) | ParseError::InvalidHashLiteral(span, _) => {
                Some(*span)
            }
            ParseError::UnexpectedEof(_) => None,
        }
    }
}

// Result type alias for convenience
pub type ParseResult<T> = Result<T, ParseError>;

/// Recursive-descent reader over a token sequence. Reads one top-level
/// expression per call, so a program can be evaluated incrementally.
pub struct Reader {
    tokens: Vec<Token>,
    position: usize,
}

impl Reader {
    pub fn new(tokens: Vec<Token>) -> Self {
        Reader {
            tokens,
            position: 0,
        }
    }

    pub fn from_source(input: &str) -> Self {
        Reader::new(tokenize(input))
    }

    /// Index of the next unread token.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.tokens.len()
    }

    /// Reads the next top-level expression. `Ok(None)` signals that every
    /// token has been consumed.
    pub fn read_one(&mut self) -> ParseResult<Option<Value>> {
        match self.next_token() {
            Some(token) => self.read_form(token).map(Some),
            None => Ok(None),
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn read_expr(&mut self, context: &str) -> ParseResult<Value> {
        match self.next_token() {
            Some(token) => self.read_form(token),
            None => Err(ParseError::UnexpectedEof(context.to_string())),
        }
    }

    fn read_form(&mut self, token: Token) -> ParseResult<Value> {
        match &token.kind {
            TokenKind::LParen => {
                let (items, _) = self.read_sequence(TokenKind::RParen)?;
                Ok(Value::list(rewrite_define_shorthand(items)))
            }
            TokenKind::LBracket => {
                let (items, _) = self.read_sequence(TokenKind::RBracket)?;
                Ok(Value::list(items))
            }
            TokenKind::LBrace => {
                let (items, close_span) = self.read_sequence(TokenKind::RBrace)?;
                read_hash_literal(items, token.span.merge(close_span))
            }
            TokenKind::Quote => self.read_wrapped("quote"),
            TokenKind::QuasiQuote => self.read_wrapped("quasiquote"),
            TokenKind::Unquote => self.read_wrapped("unquote"),
            TokenKind::SpliceUnquote => self.read_wrapped("splice-unquote"),
            TokenKind::String(text) => read_string(text, token.span),
            TokenKind::Atom(text) => Ok(read_atom(text)),
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                Err(ParseError::UnexpectedToken {
                    found: token.clone(),
                    expected: "an expression".to_string(),
                })
            }
        }
    }

    /// Reads expressions until `close`, returning them with the closer's
    /// span. Running out of tokens first is an end-of-input error; a
    /// different closer is an unexpected token.
    fn read_sequence(&mut self, close: TokenKind) -> ParseResult<(Vec<Value>, Span)> {
        let mut items = Vec::new();
        loop {
            match self.next_token() {
                None => return Err(ParseError::UnexpectedEof(format!("'{}'", close))),
                Some(token) if token.kind == close => return Ok((items, token.span)),
                Some(token) if token.kind.is_closer() => {
                    return Err(ParseError::UnexpectedToken {
                        found: token,
                        expected: format!("'{}'", close),
                    });
                }
                Some(token) => items.push(self.read_form(token)?),
            }
        }
    }

    /// `'x` becomes `(quote x)`, and likewise for the other prefix markers.
    fn read_wrapped(&mut self, keyword: &str) -> ParseResult<Value> {
        let inner = self.read_expr(&format!("an expression after {}", keyword))?;
        Ok(Value::list(vec![Value::symbol(keyword), inner]))
    }
}

/// Classifies an atom: booleans, nil, numbers, and everything else is a symbol.
fn read_atom(text: &str) -> Value {
    match text {
        "#t" | "true" => Value::Bool(true),
        "#f" | "false" => Value::Bool(false),
        "nil" => Value::Nil,
        _ if looks_numeric(text) => match text.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::symbol(text),
        },
        _ => Value::symbol(text),
    }
}

// `inf` and `nan` parse as floats but are ordinary names here.
fn looks_numeric(text: &str) -> bool {
    let digits = text.trim_start_matches(['+', '-']).trim_start_matches('.');
    digits.starts_with(|c: char| c.is_ascii_digit())
}

fn read_string(text: &str, span: Span) -> ParseResult<Value> {
    if text.len() < 2 || !text.ends_with('"') {
        return Err(ParseError::UnterminatedString(span));
    }
    let body = &text[1..text.len() - 1];
    // An odd run of backslashes means the final quote was escaped.
    if body.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1 {
        return Err(ParseError::UnterminatedString(span));
    }
    Ok(Value::String(unescape(body)))
}

fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => result.push('"'),
            Some('\\') => result.push('\\'),
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}

fn read_hash_literal(items: Vec<Value>, span: Span) -> ParseResult<Value> {
    if items.len() % 2 != 0 {
        return Err(ParseError::InvalidHashLiteral(
            span,
            "expected an even number of forms".to_string(),
        ));
    }
    let mut entries = HashMap::new();
    let mut items = items.into_iter();
    while let (Some(key), Some(value)) = (items.next(), items.next()) {
        let key = match key {
            Value::String(s) | Value::Symbol(s) => s,
            other => {
                return Err(ParseError::InvalidHashLiteral(
                    span,
                    format!("keys must be strings or symbols, got {}", other.type_name()),
                ));
            }
        };
        entries.insert(key, value);
    }
    Ok(Value::Hash(Rc::new(HashValue::new(entries))))
}

/// `(define (name arg...) body)` is read as `(define name (lambda (arg...) body))`.
fn rewrite_define_shorthand(items: Vec<Value>) -> Vec<Value> {
    match define_shorthand(&items) {
        Some(rewritten) => rewritten,
        None => items,
    }
}

fn define_shorthand(items: &[Value]) -> Option<Vec<Value>> {
    let [keyword, Value::List(signature), body @ ..] = items else {
        return None;
    };
    if keyword.as_symbol() != Some("define") {
        return None;
    }
    let (name, params) = signature.split_first()?;

    let mut lambda = vec![Value::symbol("lambda"), Value::list(params.to_vec())];
    match body {
        [] => {}
        [single] => lambda.push(single.clone()),
        [doc @ Value::String(_), single] => {
            lambda.push(doc.clone());
            lambda.push(single.clone());
        }
        many => {
            let mut begin = vec![Value::symbol("begin")];
            begin.extend(many.iter().cloned());
            lambda.push(Value::list(begin));
        }
    }
    Some(vec![
        Value::symbol("define"),
        name.clone(),
        Value::list(lambda),
    ])
}

/// Reads the first expression of `input`, ignoring the rest.
pub fn read_str(input: &str) -> ParseResult<Option<Value>> {
    Reader::from_source(input).read_one()
}

/// Reads every expression of `input`.
pub fn read_all(input: &str) -> ParseResult<Vec<Value>> {
    let mut reader = Reader::from_source(input);
    let mut expressions = Vec::new();
    while let Some(expr) = reader.read_one()? {
        expressions.push(expr);
    }
    Ok(expressions)
}
