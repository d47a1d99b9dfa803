//! Compilations: syntax trees, references and options bound together
//!
//! A [`Compilation`] is immutable. Updates return a new compilation that
//! shares the trees and references but has its own analysis cache. The
//! analysis runs at most once per compilation, on first demand.

mod options;
mod reference;

pub use options::{CompilationOptions, OutputKind};
pub use reference::MetadataReference;

use std::io::Write;
use std::sync::{Arc, OnceLock};

use log::{debug, info};

use crate::diagnostics::{sort_diagnostics, Diagnostic, DiagnosticBag, ErrorCode, Location};
use crate::emit;
use crate::sema::{self, Analysis};
use crate::syntax::SyntaxTree;

/// Outcome of [`Compilation::emit`]
#[derive(Debug, Clone)]
pub struct EmitResult {
    success: bool,
    diagnostics: Vec<Diagnostic>,
}

impl EmitResult {
    pub fn success(&self) -> bool {
        self.success
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[derive(Debug)]
struct Analyzed {
    analysis: Analysis,
    reference_diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub struct Compilation {
    assembly_name: String,
    trees: Vec<SyntaxTree>,
    references: Vec<MetadataReference>,
    options: CompilationOptions,
    analyzed: Arc<OnceLock<Analyzed>>,
}

impl Compilation {
    /// An empty compilation with default options
    pub fn create(assembly_name: impl Into<String>) -> Self {
        Self::new(assembly_name, Vec::new(), Vec::new(), CompilationOptions::default())
    }

    pub fn new(
        assembly_name: impl Into<String>,
        trees: impl IntoIterator<Item = SyntaxTree>,
        references: impl IntoIterator<Item = MetadataReference>,
        options: CompilationOptions,
    ) -> Self {
        Self {
            assembly_name: assembly_name.into(),
            trees: trees.into_iter().collect(),
            references: references.into_iter().collect(),
            options,
            analyzed: Arc::default(),
        }
    }

    fn rebuild(&self, update: impl FnOnce(&mut Self)) -> Self {
        let mut next = Self {
            analyzed: Arc::default(),
            ..self.clone()
        };
        update(&mut next);
        next
    }

    pub fn add_syntax_trees(&self, trees: impl IntoIterator<Item = SyntaxTree>) -> Self {
        self.rebuild(|c| c.trees.extend(trees))
    }

    pub fn add_references(&self, references: impl IntoIterator<Item = MetadataReference>) -> Self {
        self.rebuild(|c| c.references.extend(references))
    }

    pub fn with_syntax_trees(&self, trees: impl IntoIterator<Item = SyntaxTree>) -> Self {
        self.rebuild(|c| c.trees = trees.into_iter().collect())
    }

    pub fn with_references(&self, references: impl IntoIterator<Item = MetadataReference>) -> Self {
        self.rebuild(|c| c.references = references.into_iter().collect())
    }

    pub fn with_options(&self, options: CompilationOptions) -> Self {
        self.rebuild(|c| c.options = options)
    }

    pub fn with_assembly_name(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.rebuild(|c| c.assembly_name = name)
    }

    pub fn assembly_name(&self) -> &str {
        &self.assembly_name
    }

    /// Image name: the assembly name without a `.dll`/`.exe` extension
    pub fn module_name(&self) -> &str {
        let name = self.assembly_name.as_str();
        [".dll", ".exe"]
            .iter()
            .find_map(|ext| {
                name.len()
                    .checked_sub(ext.len())
                    .filter(|&at| name.is_char_boundary(at) && name[at..].eq_ignore_ascii_case(ext))
                    .map(|at| &name[..at])
            })
            .unwrap_or(name)
    }

    pub fn syntax_trees(&self) -> &[SyntaxTree] {
        &self.trees
    }

    pub fn references(&self) -> &[MetadataReference] {
        &self.references
    }

    pub fn options(&self) -> &CompilationOptions {
        &self.options
    }

    pub fn output_kind(&self) -> OutputKind {
        self.options.output_kind.unwrap_or_else(|| {
            if self.assembly_name.to_ascii_lowercase().ends_with(".exe") {
                OutputKind::Executable
            } else {
                OutputKind::DynamicallyLinkedLibrary
            }
        })
    }

    fn analyzed(&self) -> &Analyzed {
        self.analyzed.get_or_init(|| {
            info!(
                "analyzing '{}': {} tree(s), {} reference(s)",
                self.assembly_name,
                self.trees.len(),
                self.references.len()
            );
            let mut bag = DiagnosticBag::new();
            let images = reference::resolve(&self.references, &mut bag);
            let analysis = sema::analyze(
                &self.trees,
                &images,
                self.output_kind() == OutputKind::Executable,
                self.options.main_type_name.as_deref(),
            );
            Analyzed {
                analysis,
                reference_diagnostics: bag.into_vec(),
            }
        })
    }

    fn finish(&self, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
        let mut diagnostics = self.options.apply(diagnostics);
        sort_diagnostics(&mut diagnostics, &self.trees);
        diagnostics
    }

    /// Lexical and grammar problems of every tree
    pub fn syntax_diagnostics(&self) -> Vec<Diagnostic> {
        self.finish(self.raw_syntax())
    }

    /// Reference, declaration and entry point problems
    pub fn declaration_diagnostics(&self) -> Vec<Diagnostic> {
        self.finish(self.raw_declarations())
    }

    pub fn method_body_diagnostics(&self) -> Vec<Diagnostic> {
        self.finish(self.analyzed().analysis.body_diagnostics.clone())
    }

    /// Every diagnostic of the compilation
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut all = self.raw_syntax();
        all.extend(self.raw_declarations());
        all.extend(self.analyzed().analysis.body_diagnostics.iter().cloned());
        self.finish(all)
    }

    fn raw_syntax(&self) -> Vec<Diagnostic> {
        self.trees.iter().flat_map(SyntaxTree::diagnostics).collect()
    }

    fn raw_declarations(&self) -> Vec<Diagnostic> {
        let analyzed = self.analyzed();
        analyzed
            .reference_diagnostics
            .iter()
            .chain(&analyzed.analysis.declaration_diagnostics)
            .cloned()
            .collect()
    }

    /// Write the image to `sink`.
    ///
    /// The image is built in memory first; nothing is written when the
    /// compilation has errors.
    pub fn emit<W: Write + ?Sized>(&self, sink: &mut W) -> EmitResult {
        let mut diagnostics = self.diagnostics();
        if diagnostics.iter().any(Diagnostic::is_error) {
            debug!("'{}' has errors; nothing emitted", self.assembly_name);
            return EmitResult {
                success: false,
                diagnostics,
            };
        }

        let kind = self.output_kind().image_kind();
        let written = emit::emit_image(&self.analyzed().analysis, self.module_name(), kind)
            .map_err(|err| err.to_string())
            .and_then(|image| {
                let bytes = image.to_bytes();
                sink.write_all(&bytes)
                    .and_then(|()| sink.flush())
                    .map(|()| bytes.len())
                    .map_err(|err| err.to_string())
            });

        match written {
            Ok(len) => {
                info!("emitted '{}' ({} bytes)", self.assembly_name, len);
                EmitResult {
                    success: true,
                    diagnostics,
                }
            }
            Err(reason) => {
                diagnostics.push(Diagnostic::new(
                    ErrorCode::CantWriteOutput,
                    Location::None,
                    vec![self.assembly_name.clone(), reason],
                ));
                sort_diagnostics(&mut diagnostics, &self.trees);
                EmitResult {
                    success: false,
                    diagnostics,
                }
            }
        }
    }

    /// Lowered instruction listing of every method; `None` when the
    /// compilation has errors
    pub fn ir_listing(&self) -> Option<String> {
        if self.diagnostics().iter().any(Diagnostic::is_error) {
            return None;
        }
        emit::ir_listing(&self.analyzed().analysis, self.module_name()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(diagnostics: &[Diagnostic]) -> Vec<&'static str> {
        diagnostics.iter().map(Diagnostic::id).collect()
    }

    #[test]
    fn test_output_kind_from_name() {
        assert_eq!(Compilation::create("a.exe").output_kind(), OutputKind::Executable);
        assert_eq!(Compilation::create("a.DLL").output_kind(), OutputKind::DynamicallyLinkedLibrary);
        let forced = Compilation::create("a.exe")
            .with_options(CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary));
        assert_eq!(forced.output_kind(), OutputKind::DynamicallyLinkedLibrary);
    }

    #[test]
    fn test_module_name() {
        assert_eq!(Compilation::create("calc.dll").module_name(), "calc");
        assert_eq!(Compilation::create("program.EXE").module_name(), "program");
        assert_eq!(Compilation::create("tool").module_name(), "tool");
    }

    #[test]
    fn test_updates_do_not_touch_original() {
        let empty = Compilation::create("a.dll");
        let with_tree = empty.add_syntax_trees([SyntaxTree::parse("class A { }")]);
        assert_eq!(empty.syntax_trees().len(), 0);
        assert_eq!(with_tree.syntax_trees().len(), 1);
        assert_eq!(with_tree.with_assembly_name("b.dll").assembly_name(), "b.dll");
    }

    #[test]
    fn test_stages_partition_diagnostics() {
        let tree = SyntaxTree::parse("class A { static int F() { int x; } int y }");
        let compilation = Compilation::create("a.dll")
            .add_syntax_trees([tree])
            .add_references([MetadataReference::core_library(), MetadataReference::from_file("missing.dll")]);
        assert_eq!(ids(&compilation.syntax_diagnostics()), vec!["CS1002"]);
        assert_eq!(ids(&compilation.declaration_diagnostics()), vec!["CS0006"]);
        assert_eq!(ids(&compilation.method_body_diagnostics()), vec!["CS0161", "CS0168"]);
        assert_eq!(
            ids(&compilation.diagnostics()),
            vec!["CS0006", "CS0161", "CS0168", "CS1002"]
        );
    }

    #[test]
    fn test_failed_emit_writes_nothing() {
        let compilation = Compilation::create("a.dll")
            .add_syntax_trees([SyntaxTree::parse("class A { static int F() { } }")])
            .add_references([MetadataReference::core_library()]);
        let mut sink = Vec::new();
        let result = compilation.emit(&mut sink);
        assert!(!result.success());
        assert!(sink.is_empty());
        assert!(compilation.ir_listing().is_none());
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_reports_cs0016() {
        let compilation = Compilation::create("a.dll")
            .add_syntax_trees([SyntaxTree::parse("class A { }")])
            .add_references([MetadataReference::core_library()]);
        let result = compilation.emit(&mut BrokenSink);
        assert!(!result.success());
        assert_eq!(ids(result.diagnostics()), vec!["CS0016"]);
        assert_eq!(
            result.diagnostics()[0].message(crate::diagnostics::Culture::Invariant),
            "Could not write to output file 'a.dll' -- 'disk full'"
        );
    }

    #[test]
    fn test_write_failure_precedes_source_warnings() {
        let compilation = Compilation::create("w.dll")
            .add_syntax_trees([SyntaxTree::parse("class W { static void F() { int unused; } }")])
            .add_references([MetadataReference::core_library()]);
        let result = compilation.emit(&mut BrokenSink);
        assert!(!result.success());
        assert_eq!(ids(result.diagnostics()), vec!["CS0016", "CS0168"]);
        assert_eq!(result.diagnostics()[0].location(), &Location::None);
    }
}
