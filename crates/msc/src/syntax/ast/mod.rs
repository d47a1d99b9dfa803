//! Abstract syntax tree

mod expr;
mod item;
mod stmt;
mod types;

pub use expr::*;
pub use item::*;
pub use stmt::*;
pub use types::*;

use crate::common::Span;

/// Identifier with its location
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }

    /// Placeholder for an identifier the parser had to synthesize
    pub fn missing(span: Span) -> Self {
        Self::new("", span)
    }

    pub fn is_missing(&self) -> bool {
        self.name.is_empty()
    }
}
