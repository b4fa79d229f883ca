use logos::Logos;
use std::fmt;

use crate::Span;

/// Token classes of the surface syntax. Atoms are kept as raw text; the
/// reader decides whether an atom is a number, boolean, nil or symbol.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\f,]+")] // Whitespace and commas separate tokens
#[logos(skip r";[^\n\r]*")] // Line comments
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("'")]
    Quote,
    #[token("`")]
    QuasiQuote,
    #[token("~")]
    Unquote,
    #[token("~@")]
    SpliceUnquote,
    // The closing quote is optional so an unterminated literal is still a
    // single token; the reader rejects it.
    #[regex(r#""([^"\\]|\\.)*"?"#, |lex| lex.slice().to_string())]
    String(String),
    #[regex(r#"[^ \t\n\r\f,;()\[\]{}'`~"][^ \t\n\r\f,;()\[\]{}'`"]*"#, |lex| lex.slice().to_string())]
    Atom(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl TokenKind {
    /// True for the tokens that close a list, vector or hash literal.
    pub fn is_closer(&self) -> bool {
        matches!(
            self,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace
        )
    }
}

// Display reproduces the source text of the token
impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::Quote => write!(f, "'"),
            TokenKind::QuasiQuote => write!(f, "`"),
            TokenKind::Unquote => write!(f, "~"),
            TokenKind::SpliceUnquote => write!(f, "~@"),
            TokenKind::String(s) | TokenKind::Atom(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

/// Splits source text into tokens. Lexing never fails: any byte sequence
/// the rules do not recognise becomes an atom, and the reader reports
/// whatever structural problem remains.
pub fn tokenize(input: &str) -> Vec<Token> {
    TokenKind::lexer(input)
        .spanned()
        .map(|(result, range)| {
            let kind = result.unwrap_or_else(|_| TokenKind::Atom(input[range.clone()].to_string()));
            Token {
                kind,
                span: Span::from(range),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(s: &str) -> TokenKind {
        TokenKind::Atom(s.to_string())
    }

    fn string(s: &str) -> TokenKind {
        TokenKind::String(s.to_string())
    }

    // Helper to simplify testing token sequences
    fn assert_tokens(input: &str, expected: Vec<TokenKind>) {
        let kinds: Vec<TokenKind> = tokenize(input).into_iter().map(|t| t.kind).collect();
        assert_eq!(kinds, expected, "Input: '{}'", input);
    }

    #[test]
    fn test_empty_input() {
        assert_tokens("", vec![]);
        assert_tokens("  \n\t ,,, ", vec![]);
    }

    #[test]
    fn test_delimiters_and_quotes() {
        assert_tokens("()", vec![TokenKind::LParen, TokenKind::RParen]);
        assert_tokens(
            "[ ] { }",
            vec![
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::LBrace,
                TokenKind::RBrace,
            ],
        );
        assert_tokens(
            "(')",
            vec![TokenKind::LParen, TokenKind::Quote, TokenKind::RParen],
        );
        assert_tokens(
            "`(~a ~@b)",
            vec![
                TokenKind::QuasiQuote,
                TokenKind::LParen,
                TokenKind::Unquote,
                atom("a"),
                TokenKind::SpliceUnquote,
                atom("b"),
                TokenKind::RParen,
            ],
        );
    }

    #[test]
    fn test_atoms_are_raw_text() {
        assert_tokens(
            "foo 123 -4.5 #t nil <=? a-b set!",
            vec![
                atom("foo"),
                atom("123"),
                atom("-4.5"),
                atom("#t"),
                atom("nil"),
                atom("<=?"),
                atom("a-b"),
                atom("set!"),
            ],
        );
        assert_tokens("🍕+☕", vec![atom("🍕+☕")]);
    }

    #[test]
    fn test_commas_are_whitespace() {
        assert_tokens(
            "(1,2 , 3)",
            vec![
                TokenKind::LParen,
                atom("1"),
                atom("2"),
                atom("3"),
                TokenKind::RParen,
            ],
        );
    }

    #[test]
    fn test_strings() {
        assert_tokens(r#""hello""#, vec![string(r#""hello""#)]);
        assert_tokens(r#""with space""#, vec![string(r#""with space""#)]);
        assert_tokens(
            r#""esc \" inside" x"#,
            vec![string(r#""esc \" inside""#), atom("x")],
        );
        assert_tokens(r#""a;b""#, vec![string(r#""a;b""#)]);
    }

    #[test]
    fn test_unterminated_string_is_one_token() {
        assert_tokens(r#""hello"#, vec![string(r#""hello"#)]);
        assert_tokens(r#"""#, vec![string(r#"""#)]);
    }

    #[test]
    fn test_comments() {
        let input = "
            (define x 10) ; Define x
            ; Another comment line
              (+ x 5)  ;
              ; Final comment";
        assert_tokens(
            input,
            vec![
                TokenKind::LParen,
                atom("define"),
                atom("x"),
                atom("10"),
                TokenKind::RParen,
                TokenKind::LParen,
                atom("+"),
                atom("x"),
                atom("5"),
                TokenKind::RParen,
            ],
        );
        assert_tokens("; only comment", vec![]);
        assert_tokens("token;comment", vec![atom("token")]);
    }

    #[test]
    fn test_quote_inside_atom_splits() {
        assert_tokens("a'b", vec![atom("a"), TokenKind::Quote, atom("b")]);
        assert_tokens("a~b", vec![atom("a~b")]);
    }

    #[test]
    fn test_display_round_trips_text() {
        let text: Vec<String> = tokenize(r#"(f '[x] "s" ~@y)"#)
            .iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(text, vec!["(", "f", "'", "[", "x", "]", "\"s\"", "~@", "y", ")"]);
    }

    #[test]
    fn test_tokenize_spans() {
        let tokens = tokenize("(+ 1)");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].span, Span::new(0, 1));
        assert_eq!(tokens[1].span, Span::new(1, 2));
        assert_eq!(tokens[2].span, Span::new(3, 4));
        assert_eq!(tokens[3].span, Span::new(4, 5));
    }
}
