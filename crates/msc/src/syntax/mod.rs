//! Syntax: lexing, parsing and the syntax tree

pub mod ast;
pub mod lexer;
pub mod parser;
mod tree;

pub use tree::SyntaxTree;

use crate::common::Span;
use crate::diagnostics::ErrorCode;

/// A lexical or syntactic problem, located by byte span
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub code: ErrorCode,
    pub span: Span,
    pub args: Vec<String>,
}

impl SyntaxError {
    pub fn new(code: ErrorCode, span: Span, args: Vec<String>) -> Self {
        Self { code, span, args }
    }
}
