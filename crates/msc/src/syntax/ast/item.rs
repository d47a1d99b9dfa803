//! Declaration AST nodes: namespaces, classes and members

use super::{Block, Ident, TypeSyntax, VarDeclarator};
use crate::common::Span;

/// Root of a syntax tree
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationUnit {
    pub usings: Vec<UsingDirective>,
    pub members: Vec<NamespaceMember>,
    pub span: Span,
}

/// using System;
#[derive(Debug, Clone, PartialEq)]
pub struct UsingDirective {
    pub name: Vec<Ident>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NamespaceMember {
    Namespace(NamespaceDecl),
    Class(ClassDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceDecl {
    pub name: Vec<Ident>,
    pub usings: Vec<UsingDirective>,
    pub members: Vec<NamespaceMember>,
    pub span: Span,
}

impl NamespaceDecl {
    pub fn dotted_name(&self) -> String {
        let parts: Vec<&str> = self.name.iter().map(|p| p.name.as_str()).collect();
        parts.join(".")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierKind {
    Public,
    Private,
    Internal,
    Protected,
    Static,
}

impl ModifierKind {
    pub fn keyword(self) -> &'static str {
        match self {
            ModifierKind::Public => "public",
            ModifierKind::Private => "private",
            ModifierKind::Internal => "internal",
            ModifierKind::Protected => "protected",
            ModifierKind::Static => "static",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modifier {
    pub kind: ModifierKind,
    pub span: Span,
}

/// Modifier list with convenience queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifiers(pub Vec<Modifier>);

impl Modifiers {
    pub fn has(&self, kind: ModifierKind) -> bool {
        self.0.iter().any(|m| m.kind == kind)
    }

    pub fn is_static(&self) -> bool {
        self.has(ModifierKind::Static)
    }

    pub fn is_public(&self) -> bool {
        self.has(ModifierKind::Public)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub modifiers: Modifiers,
    pub name: Ident,
    pub members: Vec<MemberDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberDecl {
    Method(MethodDecl),
    Field(FieldDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub modifiers: Modifiers,
    pub return_type: TypeSyntax,
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeSyntax,
    pub name: Ident,
    pub span: Span,
}

/// static int count = 0, limit;
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub modifiers: Modifiers,
    pub ty: TypeSyntax,
    pub declarators: Vec<VarDeclarator>,
    pub span: Span,
}
