//! Diagnostics: severity, location and culture-aware messages

mod catalog;

pub use catalog::{Culture, ErrorCode};

use std::cmp::Ordering;
use std::fmt;

use crate::common::{FileLinePositionSpan, Span};
use crate::syntax::SyntaxTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Hidden,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Hidden => "hidden",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// Where a diagnostic applies
#[derive(Debug, Clone, Default)]
pub enum Location {
    /// No source location, e.g. a bad metadata reference
    #[default]
    None,
    Source { tree: SyntaxTree, span: Span },
}

impl Location {
    pub fn new(tree: &SyntaxTree, span: Span) -> Self {
        Location::Source {
            tree: tree.clone(),
            span,
        }
    }

    pub fn is_in_source(&self) -> bool {
        matches!(self, Location::Source { .. })
    }

    pub fn source_tree(&self) -> Option<&SyntaxTree> {
        match self {
            Location::Source { tree, .. } => Some(tree),
            Location::None => None,
        }
    }

    /// Byte span in the source tree (empty for `None`)
    pub fn source_span(&self) -> Span {
        match self {
            Location::Source { span, .. } => *span,
            Location::None => Span::default(),
        }
    }

    /// Zero-based line/column span, tagged with the tree's path
    pub fn line_span(&self) -> FileLinePositionSpan {
        match self {
            Location::Source { tree, span } => FileLinePositionSpan {
                path: tree.path().to_string(),
                span: tree.text().line_span(*span),
            },
            Location::None => FileLinePositionSpan::default(),
        }
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Location::None, Location::None) => true,
            (Location::Source { tree: a, span: x }, Location::Source { tree: b, span: y }) => {
                a.same_tree(b) && x == y
            }
            _ => false,
        }
    }
}

/// A problem found in the input
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    code: ErrorCode,
    severity: Severity,
    args: Vec<String>,
    location: Location,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, location: Location, args: Vec<String>) -> Self {
        Self {
            code,
            severity: code.default_severity(),
            args,
            location,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Stable identifier such as `CS0161`
    pub fn id(&self) -> &'static str {
        self.code.id()
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    /// Message rendered for `culture`
    pub fn message(&self, culture: Culture) -> String {
        self.code.format(culture, &self.args)
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub(crate) fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// `path(3,16): error CS0161: ...` in the invariant culture
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_in_source() {
            write!(f, "{}: ", self.location.line_span())?;
        }
        write!(
            f,
            "{} {}: {}",
            self.severity,
            self.id(),
            self.message(Culture::Invariant)
        )
    }
}

/// Sort diagnostics: locationless first, then by tree order, span start
/// and id. `trees` gives the tree order of the compilation.
pub(crate) fn sort_diagnostics(diagnostics: &mut [Diagnostic], trees: &[SyntaxTree]) {
    let tree_rank = |location: &Location| match location {
        Location::None => None,
        Location::Source { tree, .. } => Some(
            trees
                .iter()
                .position(|t| t.same_tree(tree))
                .unwrap_or(usize::MAX),
        ),
    };
    diagnostics.sort_by(|a, b| {
        let ordering = match (tree_rank(&a.location), tree_rank(&b.location)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| {
                a.location
                    .source_span()
                    .start
                    .cmp(&b.location.source_span().start)
            }),
        };
        ordering.then_with(|| a.id().cmp(b.id()))
    });
}

/// Accumulates diagnostics during a stage
#[derive(Debug, Default)]
pub(crate) struct DiagnosticBag {
    items: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, code: ErrorCode, location: Location, args: Vec<String>) {
        self.items.push(Diagnostic::new(code, location, args));
    }

    pub fn report(&mut self, code: ErrorCode, tree: &SyntaxTree, span: Span) {
        self.add(code, Location::new(tree, span), Vec::new());
    }

    pub fn report_with(&mut self, code: ErrorCode, tree: &SyntaxTree, span: Span, args: Vec<String>) {
        self.add(code, Location::new(tree, span), args);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locationless_sorts_first() {
        let tree = SyntaxTree::parse("class A {}");
        let mut diagnostics = vec![
            Diagnostic::new(ErrorCode::UnusedLocal, Location::new(&tree, Span::new(6, 7)), vec![]),
            Diagnostic::new(ErrorCode::DivideByZero, Location::new(&tree, Span::new(0, 5)), vec![]),
            Diagnostic::new(
                ErrorCode::MetadataFileNotFound,
                Location::None,
                vec!["x.dll".to_string()],
            ),
        ];
        sort_diagnostics(&mut diagnostics, std::slice::from_ref(&tree));
        let ids: Vec<_> = diagnostics.iter().map(Diagnostic::id).collect();
        assert_eq!(ids, vec!["CS0006", "CS0020", "CS0168"]);
    }

    #[test]
    fn test_display_uses_one_based_position() {
        let tree = SyntaxTree::parse_with_path("class A\n{\n  x\n}", "a.cs");
        let diagnostic =
            Diagnostic::new(ErrorCode::SemicolonExpected, Location::new(&tree, Span::new(12, 13)), vec![]);
        assert_eq!(diagnostic.to_string(), "a.cs(3,3): error CS1002: ; expected");
    }

    #[test]
    fn test_message_follows_culture() {
        let diagnostic = Diagnostic::new(
            ErrorCode::NameNotInContext,
            Location::None,
            vec!["x".to_string()],
        );
        assert_eq!(
            diagnostic.message(Culture::Invariant),
            "The name 'x' does not exist in the current context"
        );
        assert_eq!(
            diagnostic.message(Culture::German),
            "Der Name \"x\" ist im aktuellen Kontext nicht vorhanden."
        );
        assert_eq!(diagnostic.severity(), Severity::Error);
    }
}
