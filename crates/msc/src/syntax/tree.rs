//! Parsed source file

use std::fmt;
use std::sync::Arc;

use log::debug;

use super::ast::CompilationUnit;
use super::parser::Parser;
use super::SyntaxError;
use crate::common::SourceText;
use crate::diagnostics::{Diagnostic, Location};

/// Immutable parse result for one source text
///
/// Cloning is cheap; clones refer to the same tree, see [`SyntaxTree::same_tree`].
#[derive(Clone)]
pub struct SyntaxTree {
    inner: Arc<TreeInner>,
}

struct TreeInner {
    text: SourceText,
    root: CompilationUnit,
    errors: Vec<SyntaxError>,
}

impl SyntaxTree {
    /// Parse `text` with an empty path
    pub fn parse(text: impl Into<String>) -> Self {
        Self::from_text(SourceText::new(text))
    }

    pub fn parse_with_path(text: impl Into<String>, path: impl Into<String>) -> Self {
        Self::from_text(SourceText::with_path(text, path))
    }

    pub fn from_text(text: SourceText) -> Self {
        let (root, errors) = Parser::new(text.as_str()).parse();
        debug!(
            "parsed '{}': {} members, {} syntax errors",
            text.path(),
            root.members.len(),
            errors.len()
        );
        Self {
            inner: Arc::new(TreeInner { text, root, errors }),
        }
    }

    pub fn text(&self) -> &SourceText {
        &self.inner.text
    }

    pub fn path(&self) -> &str {
        self.inner.text.path()
    }

    pub fn root(&self) -> &CompilationUnit {
        &self.inner.root
    }

    /// Whether `other` is a clone of this tree rather than an equal re-parse
    pub fn same_tree(&self, other: &SyntaxTree) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn has_errors(&self) -> bool {
        !self.inner.errors.is_empty()
    }

    /// Lexical and syntactic diagnostics, in source order
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner
            .errors
            .iter()
            .map(|e| Diagnostic::new(e.code, Location::new(self, e.span), e.args.clone()))
            .collect()
    }
}

impl fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("path", &self.path())
            .field("len", &self.text().len())
            .field("errors", &self.inner.errors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorCode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clones_are_the_same_tree() {
        let tree = SyntaxTree::parse("class A {}");
        let reparsed = SyntaxTree::parse("class A {}");
        assert!(tree.same_tree(&tree.clone()));
        assert!(!tree.same_tree(&reparsed));
        assert_eq!(tree.root(), reparsed.root());
    }

    #[test]
    fn test_diagnostics_carry_location() {
        let tree = SyntaxTree::parse_with_path("class A { int x }", "a.cs");
        let diagnostics = tree.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), ErrorCode::SemicolonExpected);
        assert_eq!(diagnostics[0].to_string(), "a.cs(1,16): error CS1002: ; expected");
    }
}
