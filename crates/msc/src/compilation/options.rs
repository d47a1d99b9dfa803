//! Compilation options

use std::collections::BTreeMap;

use crate::diagnostics::{Diagnostic, Severity};

/// Kind of image a compilation produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Executable,
    DynamicallyLinkedLibrary,
}

impl OutputKind {
    pub fn image_kind(self) -> msvm::ImageKind {
        match self {
            OutputKind::Executable => msvm::ImageKind::Executable,
            OutputKind::DynamicallyLinkedLibrary => msvm::ImageKind::Library,
        }
    }
}

/// Options for a compilation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationOptions {
    /// `None` infers the kind from the assembly name: `.exe` means executable
    pub output_kind: Option<OutputKind>,
    /// Full name of the type holding `Main`
    pub main_type_name: Option<String>,
    pub warnings_as_errors: bool,
    /// Diagnostic ids to drop; errors are never dropped
    pub suppressed: Vec<String>,
    /// Opaque settings carried along for tools built on top
    pub extra: BTreeMap<String, String>,
}

impl CompilationOptions {
    pub fn new(output_kind: OutputKind) -> Self {
        Self {
            output_kind: Some(output_kind),
            ..Self::default()
        }
    }

    pub fn with_main_type_name(mut self, name: impl Into<String>) -> Self {
        self.main_type_name = Some(name.into());
        self
    }

    pub fn with_warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }

    pub fn with_suppressed(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suppressed.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Suppress and promote according to these options
    pub(crate) fn apply(&self, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
        diagnostics
            .into_iter()
            .filter(|d| d.is_error() || !self.suppressed.iter().any(|id| id == d.id()))
            .map(|d| {
                if self.warnings_as_errors && d.severity() == Severity::Warning {
                    d.with_severity(Severity::Error)
                } else {
                    d
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{ErrorCode, Location};
    use pretty_assertions::assert_eq;

    fn diagnostic(code: ErrorCode) -> Diagnostic {
        Diagnostic::new(code, Location::None, vec!["x".to_string()])
    }

    #[test]
    fn test_suppression_keeps_errors() {
        let options = CompilationOptions::default().with_suppressed(["CS0168", "CS5001"]);
        let kept = options.apply(vec![
            diagnostic(ErrorCode::UnusedLocal),
            diagnostic(ErrorCode::NoEntryPoint),
        ]);
        let ids: Vec<&str> = kept.iter().map(Diagnostic::id).collect();
        assert_eq!(ids, vec!["CS5001"]);
    }

    #[test]
    fn test_warnings_as_errors() {
        let options = CompilationOptions::default().with_warnings_as_errors(true);
        let promoted = options.apply(vec![diagnostic(ErrorCode::UnusedLocal)]);
        assert_eq!(promoted[0].severity(), Severity::Error);
        assert_eq!(promoted[0].id(), "CS0168");
    }
}
