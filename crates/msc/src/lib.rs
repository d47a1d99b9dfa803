//! minisharp - an embeddable compiler for a small C# subset
//!
//! Source text is parsed into syntax trees, bound together with metadata
//! references into a [`Compilation`], checked, and emitted as an `msvm`
//! image that a [`msvm::Host`] can load and run.
//!
//! ## Architecture
//!
//! - **Syntax** (`syntax/`): logos lexer, recovering parser, syntax trees
//! - **Semantics** (`sema/`): symbol table, binder, flow analysis, entry point
//! - **Diagnostics** (`diagnostics/`): codes, localized messages, locations
//! - **Compilation** (`compilation/`): options, references, staged diagnostics
//! - **Emit** (`emit/`): lowering to a labelled IR and a two-pass assembler
//! - **Common** (`common/`): spans, source text, errors, reporting
//! - **Driver** (`driver/`): the `msc` command-line pipeline
//!
//! ```
//! use minisharp::{Compilation, MetadataReference, SyntaxTree};
//!
//! let tree = SyntaxTree::parse("public class Calculator { public static object Evaluate() { return 6 * 7; } }");
//! let compilation = Compilation::create("calc.dll")
//!     .add_syntax_trees([tree])
//!     .add_references([MetadataReference::core_library()]);
//! let mut image = Vec::new();
//! assert!(compilation.emit(&mut image).success());
//! ```

pub mod common;
pub mod compilation;
pub mod diagnostics;
pub mod driver;
mod emit;
mod sema;
pub mod syntax;

// Re-exports for convenience
pub use common::{CompileError, CompileResult, DiagnosticReporter, FileLinePositionSpan, LinePosition, SourceText, Span};
pub use compilation::{Compilation, CompilationOptions, EmitResult, MetadataReference, OutputKind};
pub use diagnostics::{Culture, Diagnostic, ErrorCode, Location, Severity};
pub use syntax::SyntaxTree;
