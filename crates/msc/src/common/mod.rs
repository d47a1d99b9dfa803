//! Common infrastructure shared across stages

mod error;
mod span;
mod stack;
mod text;

pub use error::{CompileError, CompileResult, DiagnosticReporter};
pub use span::Span;
pub(crate) use stack::ensure_sufficient_stack;
pub use text::{FileLinePositionSpan, LinePosition, LinePositionSpan, SourceText};
