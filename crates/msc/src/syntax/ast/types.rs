//! Type syntax

use std::fmt;

use super::Ident;
use crate::common::Span;

/// Keyword types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredefinedType {
    Void,
    Int,
    Bool,
    String,
    Object,
}

impl PredefinedType {
    pub fn keyword(self) -> &'static str {
        match self {
            PredefinedType::Void => "void",
            PredefinedType::Int => "int",
            PredefinedType::Bool => "bool",
            PredefinedType::String => "string",
            PredefinedType::Object => "object",
        }
    }

    /// Full name of the core library type the keyword aliases
    pub fn metadata_name(self) -> &'static str {
        match self {
            PredefinedType::Void => "System.Void",
            PredefinedType::Int => "System.Int32",
            PredefinedType::Bool => "System.Boolean",
            PredefinedType::String => "System.String",
            PredefinedType::Object => "System.Object",
        }
    }
}

/// A type as written in source
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSyntax {
    pub kind: TypeSyntaxKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeSyntaxKind {
    Predefined(PredefinedType),
    /// `Name` or `A.B.Name`
    Named(Vec<Ident>),
    Array(Box<TypeSyntax>),
    /// Placeholder after a syntax error
    Missing,
}

impl TypeSyntax {
    pub fn new(kind: TypeSyntaxKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn missing(span: Span) -> Self {
        Self::new(TypeSyntaxKind::Missing, span)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeSyntaxKind::Predefined(PredefinedType::Void))
    }

    /// `var` written as a type
    pub fn is_var(&self) -> bool {
        matches!(&self.kind, TypeSyntaxKind::Named(parts) if parts.len() == 1 && parts[0].name == "var")
    }
}

impl fmt::Display for TypeSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeSyntaxKind::Predefined(p) => f.write_str(p.keyword()),
            TypeSyntaxKind::Named(parts) => {
                let names: Vec<&str> = parts.iter().map(|p| p.name.as_str()).collect();
                f.write_str(&names.join("."))
            }
            TypeSyntaxKind::Array(element) => write!(f, "{}[]", element),
            TypeSyntaxKind::Missing => Ok(()),
        }
    }
}
