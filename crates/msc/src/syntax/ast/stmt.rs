//! Statement AST nodes

use super::{Expr, Ident, TypeSyntax};
use crate::common::Span;

/// Statement node
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Block),

    /// int x = 1, y;
    LocalDecl(LocalDecl),

    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    While {
        condition: Expr,
        body: Box<Stmt>,
    },

    For {
        init: Option<ForInit>,
        condition: Option<Expr>,
        update: Vec<Expr>,
        body: Box<Stmt>,
    },

    Return(Option<Expr>),

    Break,

    Continue,

    Expr(Expr),

    /// ;
    Empty,
}

/// `{ ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>, span: Span) -> Self {
        Self { stmts, span }
    }
}

/// Declaration of one or more variables sharing a type
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDecl {
    pub ty: TypeSyntax,
    pub declarators: Vec<VarDeclarator>,
}

/// `name` or `name = init`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclarator {
    pub name: Ident,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Decl(LocalDecl),
    Exprs(Vec<Expr>),
}
