//! Parser module for building the AST

#[allow(clippy::module_inception)]
mod parser;

pub use parser::Parser;
