//! Lexer implementation using logos
//!
//! The lexer never fails: unexpected characters, unterminated strings and
//! unterminated comments are recorded as syntax errors and scanning
//! continues.

use logos::Logos;

use super::token::{Token, TokenKind};
use crate::common::Span;
use crate::diagnostics::ErrorCode;
use crate::syntax::SyntaxError;

/// Lexer for source code
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, TokenKind>,
    peeked: Option<Token>,
    at_eof: bool,
    errors: Vec<SyntaxError>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            inner: TokenKind::lexer(source),
            peeked: None,
            at_eof: false,
            errors: Vec::new(),
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.peeked.take() {
            return token;
        }

        loop {
            if self.at_eof {
                let len = self.inner.source().len();
                return Token::new(TokenKind::Eof, Span::at(len));
            }

            match self.inner.next() {
                Some(Ok(TokenKind::UnterminatedString(text))) => {
                    let span = Span::from(self.inner.span());
                    self.errors
                        .push(SyntaxError::new(ErrorCode::NewlineInConstant, span, Vec::new()));
                    return Token::new(TokenKind::StringLiteral(format!("{}\"", text)), span);
                }
                Some(Ok(TokenKind::UnterminatedComment)) => {
                    let start = self.inner.span().start;
                    self.errors.push(SyntaxError::new(
                        ErrorCode::UnterminatedComment,
                        Span::new(start, start + 2),
                        Vec::new(),
                    ));
                }
                Some(Ok(kind)) => return Token::new(kind, Span::from(self.inner.span())),
                Some(Err(())) => {
                    let span = Span::from(self.inner.span());
                    let ch = self.inner.slice().chars().next().unwrap_or('?');
                    self.errors.push(SyntaxError::new(
                        ErrorCode::UnexpectedCharacter,
                        span,
                        vec![ch.to_string()],
                    ));
                }
                None => self.at_eof = true,
            }
        }
    }

    /// Peek at the next token without consuming it
    pub fn peek(&mut self) -> &Token {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.next_token(),
        };
        self.peeked.insert(token)
    }

    /// Errors found so far, in source order
    pub fn take_errors(&mut self) -> Vec<SyntaxError> {
        std::mem::take(&mut self.errors)
    }

    /// Tokenize the entire source, ending with `Eof`
    pub fn tokenize_all(mut self) -> (Vec<Token>, Vec<SyntaxError>) {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = matches!(token.kind, TokenKind::Eof);
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        (tokens, self.errors)
    }

    pub fn source(&self) -> &'a str {
        self.inner.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, _) = Lexer::new(source).tokenize_all();
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("public class Calculator"),
            vec![
                TokenKind::Public,
                TokenKind::Class,
                TokenKind::Identifier("Calculator".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_operators_prefer_longest_match() {
        assert_eq!(
            kinds("a <<= b >> c++"),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::LtLtEq,
                TokenKind::Identifier("b".to_string()),
                TokenKind::GtGt,
                TokenKind::Identifier("c".to_string()),
                TokenKind::PlusPlus,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("1 // two\n/* three */ 0x4"),
            vec![
                TokenKind::IntLiteral("1".to_string()),
                TokenKind::HexLiteral("0x4".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(
            kinds(r#""a\"b""#),
            vec![TokenKind::StringLiteral(r#""a\"b""#.to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_unexpected_character_is_reported_and_skipped() {
        let (tokens, errors) = Lexer::new("a # b").tokenize_all();
        assert_eq!(tokens.len(), 3);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::UnexpectedCharacter);
        assert_eq!(errors[0].span, Span::new(2, 3));
    }

    #[test]
    fn test_unterminated_comment_runs_to_end_of_file() {
        let (tokens, errors) = Lexer::new("a /* b * / c").tokenize_all();
        assert_eq!(
            tokens.into_iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::Identifier("a".to_string()), TokenKind::Eof]
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::UnterminatedComment);
        assert_eq!(errors[0].span, Span::new(2, 4));
    }

    #[test]
    fn test_block_comments_end_at_first_close() {
        assert_eq!(
            kinds("/* a ** b */ x /**/ y /* */ */"),
            vec![
                TokenKind::Identifier("x".to_string()),
                TokenKind::Identifier("y".to_string()),
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let (tokens, errors) = Lexer::new("\"abc\nx").tokenize_all();
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral("\"abc\"".to_string()));
        assert_eq!(tokens[0].span, Span::new(0, 4));
        assert_eq!(errors[0].code, ErrorCode::NewlineInConstant);
    }
}
