//! Error types and diagnostic reporting

use codespan_reporting::diagnostic::{Diagnostic as Report, Label, Severity as ReportSeverity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, NoColor, StandardStream, WriteColor};
use thiserror::Error;

use crate::diagnostics::{Culture, Diagnostic, Severity};
use crate::syntax::SyntaxTree;

/// Failure of the compiler itself or of its caller's request
///
/// Problems in the compiled *input* are never `CompileError`s; they are
/// [`Diagnostic`]s.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("compilation failed with {errors} error(s)")]
    Failed { errors: usize },

    #[error("could not load image: {0}")]
    Load(#[from] msvm::LoadError),

    #[error("program faulted: {0}")]
    Run(#[from] msvm::RunError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Pretty diagnostic output with source snippets
pub struct DiagnosticReporter {
    files: SimpleFiles<String, String>,
    trees: Vec<(SyntaxTree, usize)>,
    config: term::Config,
    culture: Culture,
}

impl DiagnosticReporter {
    pub fn new() -> Self {
        Self {
            files: SimpleFiles::new(),
            trees: Vec::new(),
            config: term::Config::default(),
            culture: Culture::Invariant,
        }
    }

    pub fn with_culture(mut self, culture: Culture) -> Self {
        self.culture = culture;
        self
    }

    /// Register a tree so its diagnostics show source snippets
    pub fn add_tree(&mut self, tree: &SyntaxTree) -> usize {
        if let Some((_, id)) = self.trees.iter().find(|(t, _)| t.same_tree(tree)) {
            return *id;
        }
        let name = if tree.path().is_empty() {
            "<source>".to_string()
        } else {
            tree.path().to_string()
        };
        let id = self.files.add(name, tree.text().as_str().to_string());
        self.trees.push((tree.clone(), id));
        id
    }

    fn to_report(&self, diagnostic: &Diagnostic) -> Report<usize> {
        let severity = match diagnostic.severity() {
            Severity::Error => ReportSeverity::Error,
            Severity::Warning => ReportSeverity::Warning,
            Severity::Info => ReportSeverity::Note,
            Severity::Hidden => ReportSeverity::Help,
        };
        let mut report = Report::new(severity)
            .with_code(diagnostic.id())
            .with_message(diagnostic.message(self.culture));

        let location = diagnostic.location();
        if let Some(tree) = location.source_tree() {
            if let Some((_, file_id)) = self.trees.iter().find(|(t, _)| t.same_tree(tree)) {
                report = report.with_labels(vec![Label::primary(
                    *file_id,
                    location.source_span().range(),
                )]);
            }
        }
        report
    }

    /// Write diagnostics to any color-capable sink
    pub fn emit(&self, writer: &mut dyn WriteColor, diagnostics: &[Diagnostic]) {
        for diagnostic in diagnostics {
            let report = self.to_report(diagnostic);
            // Rendering failures only lose the pretty form of a report.
            let _ = term::emit(writer, &self.config, &self.files, &report);
        }
    }

    /// Write diagnostics to stderr
    pub fn report(&self, diagnostics: &[Diagnostic]) {
        let writer = StandardStream::stderr(ColorChoice::Auto);
        self.emit(&mut writer.lock(), diagnostics);
    }

    /// Render diagnostics without color
    pub fn render(&self, diagnostics: &[Diagnostic]) -> String {
        let mut out = NoColor::new(Vec::new());
        self.emit(&mut out, diagnostics);
        String::from_utf8_lossy(&out.into_inner()).into_owned()
    }
}

impl Default for DiagnosticReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{ErrorCode, Location};
    use crate::common::Span;

    #[test]
    fn test_render_includes_code_and_snippet() {
        let tree = SyntaxTree::parse_with_path("class A { int x }", "a.cs");
        let diagnostic = Diagnostic::new(
            ErrorCode::SemicolonExpected,
            Location::new(&tree, Span::new(15, 16)),
            vec![],
        );
        let mut reporter = DiagnosticReporter::new();
        reporter.add_tree(&tree);
        let text = reporter.render(&[diagnostic]);
        assert!(text.contains("error[CS1002]: ; expected"));
        assert!(text.contains("a.cs"));
    }

    #[test]
    fn test_render_without_location() {
        let diagnostic = Diagnostic::new(
            ErrorCode::MetadataFileNotFound,
            Location::None,
            vec!["missing.dll".to_string()],
        );
        let text = DiagnosticReporter::new().render(&[diagnostic]);
        assert!(text.contains("Metadata file 'missing.dll' could not be found"));
    }
}
