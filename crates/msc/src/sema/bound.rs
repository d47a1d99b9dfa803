//! Bound tree: the typed, resolved form of method bodies

use super::types::{ConstValue, Ty, TypeId};
use crate::common::Span;
use crate::syntax::ast::{BinaryOp, UnaryOp};

/// Index into a method's local list
pub type LocalId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub ty: TypeId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub ty: TypeId,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundExpr {
    pub kind: BoundExprKind,
    pub ty: Ty,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundExprKind {
    Const(ConstValue),
    Local(LocalId),
    /// Declared parameter index, not counting the receiver
    Param(u16),
    This,
    StaticField(FieldRef),
    InstanceField {
        receiver: Box<BoundExpr>,
        field: FieldRef,
    },
    /// `Length` of an array or string
    Length(Box<BoundExpr>),
    Index {
        array: Box<BoundExpr>,
        index: Box<BoundExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<BoundExpr>,
    },
    /// `Add` typed `string` is concatenation; `&&`/`||` short-circuit
    Binary {
        op: BinaryOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    Assign {
        target: Box<BoundExpr>,
        value: Box<BoundExpr>,
    },
    CompoundAssign {
        op: BinaryOp,
        target: Box<BoundExpr>,
        value: Box<BoundExpr>,
    },
    IncDec {
        increment: bool,
        prefix: bool,
        target: Box<BoundExpr>,
    },
    Call {
        method: MethodRef,
        receiver: Option<Box<BoundExpr>>,
        args: Vec<BoundExpr>,
    },
    NewArray {
        element: Ty,
        length: Box<BoundExpr>,
    },
    Error,
}

impl BoundExpr {
    pub fn new(kind: BoundExprKind, ty: Ty, span: Span) -> Self {
        Self { kind, ty, span }
    }

    pub fn constant(value: ConstValue, ty: Ty, span: Span) -> Self {
        Self::new(BoundExprKind::Const(value), ty, span)
    }

    pub fn error(ty: Ty, span: Span) -> Self {
        Self::new(BoundExprKind::Error, ty, span)
    }

    pub fn const_value(&self) -> Option<&ConstValue> {
        match &self.kind {
            BoundExprKind::Const(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, BoundExprKind::Error) || self.ty.is_error()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundStmt {
    pub kind: BoundStmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundStmtKind {
    Block(Vec<BoundStmt>),
    Local {
        local: LocalId,
        init: Option<BoundExpr>,
    },
    Expr(BoundExpr),
    If {
        condition: BoundExpr,
        then_branch: Box<BoundStmt>,
        else_branch: Option<Box<BoundStmt>>,
    },
    While {
        condition: BoundExpr,
        body: Box<BoundStmt>,
    },
    For {
        init: Vec<BoundStmt>,
        condition: Option<BoundExpr>,
        update: Vec<BoundExpr>,
        body: Box<BoundStmt>,
    },
    Return(Option<BoundExpr>),
    Break,
    Continue,
    Empty,
}

impl BoundStmt {
    pub fn new(kind: BoundStmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalSymbol {
    pub name: String,
    pub ty: Ty,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundMethod {
    pub method: MethodRef,
    pub locals: Vec<LocalSymbol>,
    pub body: BoundStmt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundFieldInit {
    pub field: FieldRef,
    pub value: BoundExpr,
}

/// Bound members of one source type; `methods` follows the symbol order
#[derive(Debug, Clone, PartialEq)]
pub struct BoundType {
    pub id: TypeId,
    pub methods: Vec<BoundMethod>,
    pub static_inits: Vec<BoundFieldInit>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundProgram {
    pub types: Vec<BoundType>,
}
