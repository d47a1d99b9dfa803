//! Binder: resolves names and types in method bodies
//!
//! Produces the bound tree and reports binding diagnostics. Every
//! expression gets a type; failed bindings get `Ty::Error`, which
//! converts silently so that one mistake yields one diagnostic.

use super::bound::*;
use super::declare::resolve_type;
use super::scope::Scope;
use super::symbols::{Access, LookupContext, NameLookup, ParamSymbol, SymbolTable};
use super::types::{ConstValue, Ty, TypeId};
use crate::common::{ensure_sufficient_stack, Span};
use crate::diagnostics::{DiagnosticBag, ErrorCode};
use crate::syntax::ast::*;
use crate::syntax::SyntaxTree;

/// What is being bound: a method body or a field initializer
pub(crate) struct MethodContext<'a> {
    pub type_id: TypeId,
    /// `None` for field initializers
    pub method: Option<usize>,
    pub is_static: bool,
    pub return_ty: Ty,
    pub params: &'a [ParamSymbol],
}

#[derive(Debug, Clone, Copy, Default)]
struct LocalUsage {
    read: bool,
    written: bool,
    written_nonconst: bool,
}

/// Methods named in a call position, with how they were reached
struct MethodGroup {
    ty: TypeId,
    name: String,
    receiver: Option<BoundExpr>,
    via_type: bool,
    span: Span,
}

/// Intermediate result of binding a name or member access
enum Resolved {
    Value(BoundExpr),
    Type(TypeId),
    Namespace(String),
    Methods(MethodGroup),
    Error,
}

pub(crate) struct Binder<'a> {
    table: &'a SymbolTable,
    tree: &'a SyntaxTree,
    context: &'a LookupContext,
    method: MethodContext<'a>,
    locals: Vec<LocalSymbol>,
    usage: Vec<LocalUsage>,
    scope: Scope,
    loop_depth: usize,
    diagnostics: &'a mut DiagnosticBag,
}

fn binary_type(op: BinaryOp, left: &Ty, right: &Ty) -> Option<Ty> {
    use BinaryOp::*;
    let ref_like = |t: &Ty| t.is_reference_type() || *t == Ty::Null;
    match (op, left, right) {
        (Add, Ty::String, r) if *r != Ty::Void => Some(Ty::String),
        (Add, l, Ty::String) if *l != Ty::Void => Some(Ty::String),
        (Add | Sub | Mul | Div | Rem | Shl | Shr, Ty::Int, Ty::Int) => Some(Ty::Int),
        (BitAnd | BitOr | BitXor, Ty::Int, Ty::Int) => Some(Ty::Int),
        (BitAnd | BitOr | BitXor | LogicalAnd | LogicalOr, Ty::Bool, Ty::Bool) => Some(Ty::Bool),
        (Eq | Ne, Ty::Int, Ty::Int) | (Eq | Ne, Ty::Bool, Ty::Bool) => Some(Ty::Bool),
        (Eq | Ne, l, r) if ref_like(l) && ref_like(r) => Some(Ty::Bool),
        (Lt | Le | Gt | Ge, Ty::Int, Ty::Int) => Some(Ty::Bool),
        _ => None,
    }
}

/// Fold a binary operation on constants; `Some(None)` means overflow
fn fold_binary(op: BinaryOp, left: &ConstValue, right: &ConstValue) -> Option<Option<ConstValue>> {
    use BinaryOp::*;
    use ConstValue::{Bool, Int, Null, Str};
    let folded = match (op, left, right) {
        (Add, Str(_), _) | (Add, _, Str(_)) => Some(Str(left.concat_text() + &right.concat_text())),
        (Add, Int(a), Int(b)) => a.checked_add(*b).map(Int),
        (Sub, Int(a), Int(b)) => a.checked_sub(*b).map(Int),
        (Mul, Int(a), Int(b)) => a.checked_mul(*b).map(Int),
        (Div, Int(a), Int(b)) => a.checked_div(*b).map(Int),
        (Rem, Int(a), Int(b)) => a.checked_rem(*b).map(Int),
        (Shl, Int(a), Int(b)) => Some(Int(a.wrapping_shl(*b as u32))),
        (Shr, Int(a), Int(b)) => Some(Int(a.wrapping_shr(*b as u32))),
        (BitAnd, Int(a), Int(b)) => Some(Int(a & b)),
        (BitOr, Int(a), Int(b)) => Some(Int(a | b)),
        (BitXor, Int(a), Int(b)) => Some(Int(a ^ b)),
        (Lt, Int(a), Int(b)) => Some(Bool(a < b)),
        (Le, Int(a), Int(b)) => Some(Bool(a <= b)),
        (Gt, Int(a), Int(b)) => Some(Bool(a > b)),
        (Ge, Int(a), Int(b)) => Some(Bool(a >= b)),
        (BitAnd | LogicalAnd, Bool(a), Bool(b)) => Some(Bool(*a && *b)),
        (BitOr | LogicalOr, Bool(a), Bool(b)) => Some(Bool(*a || *b)),
        (BitXor, Bool(a), Bool(b)) => Some(Bool(a != b)),
        (Eq, a, b) if matches!((a, b), (Int(_), Int(_)) | (Bool(_), Bool(_)) | (Str(_), Str(_)) | (Null, Null)) => {
            Some(Bool(a == b))
        }
        (Ne, a, b) if matches!((a, b), (Int(_), Int(_)) | (Bool(_), Bool(_)) | (Str(_), Str(_)) | (Null, Null)) => {
            Some(Bool(a != b))
        }
        _ => return None,
    };
    Some(folded)
}

impl<'a> Binder<'a> {
    pub fn new(
        table: &'a SymbolTable,
        tree: &'a SyntaxTree,
        context: &'a LookupContext,
        method: MethodContext<'a>,
        diagnostics: &'a mut DiagnosticBag,
    ) -> Self {
        Self {
            table,
            tree,
            context,
            method,
            locals: Vec::new(),
            usage: Vec::new(),
            scope: Scope::new(),
            loop_depth: 0,
            diagnostics,
        }
    }

    /// Bind a method body
    pub fn bind_body(mut self, method: MethodRef, body: &Block) -> BoundMethod {
        let body = self.bind_block(body);
        self.report_unused_locals();
        BoundMethod {
            method,
            locals: self.locals,
            body,
        }
    }

    /// Bind a field initializer converted to the field's type
    pub fn bind_initializer(mut self, value: &Expr, ty: &Ty) -> BoundExpr {
        let bound = self.bind_expr(value);
        self.convert(bound, ty)
    }

    fn report(&mut self, code: ErrorCode, span: Span, args: Vec<String>) {
        self.diagnostics.report_with(code, self.tree, span, args);
    }

    fn display(&self, ty: &Ty) -> String {
        self.table.display(ty)
    }

    fn method_display(&self) -> String {
        self.method
            .method
            .map(|index| self.table.method_display(self.method.type_id, index))
            .unwrap_or_default()
    }

    fn this_expr(&self, span: Span) -> BoundExpr {
        BoundExpr::new(BoundExprKind::This, Ty::Class(self.method.type_id), span)
    }

    fn require(&mut self, predefined: PredefinedType, span: Span) {
        if self.table.predefined(predefined).is_none() {
            self.report(
                ErrorCode::PredefinedTypeNotFound,
                span,
                vec![predefined.metadata_name().to_string()],
            );
        }
    }

    fn is_accessible(&self, access: Access, owner: TypeId) -> bool {
        match access {
            Access::Public => true,
            Access::Internal => self.table.get(owner).is_source(),
            Access::Private => owner == self.method.type_id,
        }
    }

    /// Check an implicit conversion, reporting CS0029/CS0037 when missing
    fn convert(&mut self, expr: BoundExpr, target: &Ty) -> BoundExpr {
        if expr.ty.conversion_to(target).exists() {
            return expr;
        }
        if expr.ty == Ty::Null && target.is_value_type() {
            let args = vec![self.display(target)];
            self.report(ErrorCode::NullToValueType, expr.span, args);
        } else {
            let args = vec![self.display(&expr.ty), self.display(target)];
            self.report(ErrorCode::NoImplicitConversion, expr.span, args);
        }
        BoundExpr::error(target.clone(), expr.span)
    }

    // =========================================================================
    // Locals
    // =========================================================================

    fn declare_local(&mut self, name: &Ident, ty: Ty) -> LocalId {
        let id = self.locals.len();
        self.locals.push(LocalSymbol {
            name: name.name.clone(),
            ty,
            span: name.span,
        });
        self.usage.push(LocalUsage::default());

        let shadows_param = self.method.params.iter().any(|p| p.name == name.name);
        if self.scope.lookup_local(&name.name).is_some() {
            self.report(ErrorCode::LocalDuplicate, name.span, vec![name.name.clone()]);
            self.usage[id].read = true;
        } else if shadows_param || self.scope.lookup(&name.name).is_some() {
            self.report(ErrorCode::LocalShadowsOuter, name.span, vec![name.name.clone()]);
            self.usage[id].read = true;
            let _ = self.scope.define(&name.name, id);
        } else {
            let _ = self.scope.define(&name.name, id);
        }
        id
    }

    fn mark_read(&mut self, expr: &BoundExpr) {
        if let BoundExprKind::Local(id) = expr.kind {
            self.usage[id].read = true;
        }
    }

    fn mark_written(&mut self, target: &BoundExpr, constant: bool) {
        if let BoundExprKind::Local(id) = target.kind {
            self.usage[id].written = true;
            self.usage[id].written_nonconst |= !constant;
        }
    }

    fn report_unused_locals(&mut self) {
        for id in 0..self.locals.len() {
            let usage = self.usage[id];
            if usage.read || self.locals[id].ty.is_error() {
                continue;
            }
            let code = if !usage.written {
                ErrorCode::UnusedLocal
            } else if !usage.written_nonconst {
                ErrorCode::UnusedAssignedLocal
            } else {
                continue;
            };
            let local = &self.locals[id];
            let (span, name) = (local.span, local.name.clone());
            self.report(code, span, vec![name]);
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn bind_block(&mut self, block: &Block) -> BoundStmt {
        self.scope.push_child();
        let stmts = block.stmts.iter().map(|s| self.bind_stmt(s)).collect();
        self.scope.pop_to_parent();
        BoundStmt::new(BoundStmtKind::Block(stmts), block.span)
    }

    fn bind_stmt(&mut self, stmt: &Stmt) -> BoundStmt {
        ensure_sufficient_stack(|| {
            let kind = match &stmt.kind {
                StmtKind::Block(block) => return self.bind_block(block),
                StmtKind::LocalDecl(decl) => return self.bind_local_decl(decl, stmt.span),
                StmtKind::If {
                    condition,
                    then_branch,
                    else_branch,
                } => {
                    let condition = self.bind_condition(condition);
                    let then_branch = Box::new(self.bind_stmt(then_branch));
                    let else_branch = else_branch.as_ref().map(|s| Box::new(self.bind_stmt(s)));
                    BoundStmtKind::If {
                        condition,
                        then_branch,
                        else_branch,
                    }
                }
                StmtKind::While { condition, body } => {
                    let condition = self.bind_condition(condition);
                    self.loop_depth += 1;
                    let body = Box::new(self.bind_stmt(body));
                    self.loop_depth -= 1;
                    BoundStmtKind::While { condition, body }
                }
                StmtKind::For {
                    init,
                    condition,
                    update,
                    body,
                } => {
                    self.scope.push_child();
                    let init = match init {
                        None => Vec::new(),
                        Some(ForInit::Decl(decl)) => vec![self.bind_local_decl(decl, stmt.span)],
                        Some(ForInit::Exprs(exprs)) => exprs
                            .iter()
                            .map(|e| BoundStmt::new(BoundStmtKind::Expr(self.bind_expr_statement(e)), e.span))
                            .collect(),
                    };
                    let condition = condition.as_ref().map(|c| self.bind_condition(c));
                    let update = update.iter().map(|e| self.bind_expr_statement(e)).collect();
                    self.loop_depth += 1;
                    let body = Box::new(self.bind_stmt(body));
                    self.loop_depth -= 1;
                    self.scope.pop_to_parent();
                    BoundStmtKind::For {
                        init,
                        condition,
                        update,
                        body,
                    }
                }
                StmtKind::Return(value) => self.bind_return(value.as_ref(), stmt.span),
                StmtKind::Break | StmtKind::Continue => {
                    if self.loop_depth == 0 {
                        self.report(ErrorCode::NoBreakOrContinue, stmt.span, Vec::new());
                        BoundStmtKind::Empty
                    } else if matches!(stmt.kind, StmtKind::Break) {
                        BoundStmtKind::Break
                    } else {
                        BoundStmtKind::Continue
                    }
                }
                StmtKind::Expr(expr) => BoundStmtKind::Expr(self.bind_expr_statement(expr)),
                StmtKind::Empty => BoundStmtKind::Empty,
            };
            BoundStmt::new(kind, stmt.span)
        })
    }

    fn bind_local_decl(&mut self, decl: &LocalDecl, span: Span) -> BoundStmt {
        let implicit =
            decl.ty.is_var() && self.context.lookup_simple(self.table, "var") == NameLookup::NotFound;
        let declared = if implicit {
            None
        } else {
            let ty = resolve_type(self.table, self.context, &decl.ty, self.tree, self.diagnostics);
            if ty == Ty::Void {
                self.report(ErrorCode::VoidLocal, decl.ty.span, Vec::new());
                Some(Ty::Error)
            } else {
                Some(ty)
            }
        };

        let mut stmts = Vec::new();
        for declarator in &decl.declarators {
            let init = declarator.init.as_ref().map(|e| self.bind_expr(e));
            let ty = match (&declared, &init) {
                (Some(ty), _) => ty.clone(),
                (None, None) => {
                    self.report(ErrorCode::ImplicitlyTypedNoInit, declarator.span, Vec::new());
                    Ty::Error
                }
                (None, Some(value)) if matches!(value.ty, Ty::Null | Ty::Void) => {
                    let args = vec![self.display(&value.ty)];
                    self.report(ErrorCode::ImplicitlyTypedBadValue, declarator.span, args);
                    Ty::Error
                }
                (None, Some(value)) => value.ty.clone(),
            };
            let init = init.map(|value| self.convert(value, &ty));
            if declarator.name.is_missing() {
                continue;
            }
            let local = self.declare_local(&declarator.name, ty);
            if let Some(value) = &init {
                let constant = value.const_value().is_some();
                self.usage[local].written = true;
                self.usage[local].written_nonconst |= !constant;
            }
            stmts.push(BoundStmt::new(BoundStmtKind::Local { local, init }, declarator.span));
        }

        if stmts.len() == 1 {
            stmts.remove(0)
        } else {
            BoundStmt::new(BoundStmtKind::Block(stmts), span)
        }
    }

    fn bind_condition(&mut self, condition: &Expr) -> BoundExpr {
        let bound = self.bind_expr(condition);
        self.convert(bound, &Ty::Bool)
    }

    fn bind_return(&mut self, value: Option<&Expr>, span: Span) -> BoundStmtKind {
        let return_ty = self.method.return_ty.clone();
        match value {
            None => {
                if return_ty != Ty::Void && !return_ty.is_error() {
                    let args = vec![self.display(&return_ty)];
                    self.report(ErrorCode::RetObjectRequired, span, args);
                }
                BoundStmtKind::Return(None)
            }
            Some(value) => {
                let bound = self.bind_expr(value);
                if return_ty == Ty::Void {
                    let args = vec![self.method_display()];
                    self.report(ErrorCode::RetNoObjectRequired, span, args);
                    return BoundStmtKind::Return(None);
                }
                BoundStmtKind::Return(Some(self.convert(bound, &return_ty)))
            }
        }
    }

    fn bind_expr_statement(&mut self, expr: &Expr) -> BoundExpr {
        let bound = self.bind_expr(expr);
        let allowed = matches!(
            bound.kind,
            BoundExprKind::Call { .. }
                | BoundExprKind::Assign { .. }
                | BoundExprKind::CompoundAssign { .. }
                | BoundExprKind::IncDec { .. }
                | BoundExprKind::Error
        );
        if !allowed {
            self.report(ErrorCode::IllegalStatement, expr.span, Vec::new());
        }
        bound
    }

    // =========================================================================
    // Names and members
    // =========================================================================

    fn bind_expr(&mut self, expr: &Expr) -> BoundExpr {
        let resolved = self.bind_resolved(expr);
        let bound = self.into_value(resolved, expr.span);
        self.mark_read(&bound);
        bound
    }

    fn bind_resolved(&mut self, expr: &Expr) -> Resolved {
        ensure_sufficient_stack(|| {
            match &expr.kind {
                ExprKind::Name(ident) => self.bind_name(ident),
                ExprKind::Member { object, name } => {
                    let object = self.bind_resolved(object);
                    if let Resolved::Value(value) = &object {
                        self.mark_read(value);
                    }
                    self.bind_member(object, name, expr.span)
                }
                ExprKind::PredefinedType(predefined) => match self.table.predefined(*predefined) {
                    Some(id) => Resolved::Type(id),
                    None => {
                        self.require(*predefined, expr.span);
                        Resolved::Error
                    }
                },
                _ => Resolved::Value(self.bind_value(expr)),
            }
        })
    }

    fn into_value(&mut self, resolved: Resolved, span: Span) -> BoundExpr {
        let kind = match resolved {
            Resolved::Value(value) => return value,
            Resolved::Error => return BoundExpr::error(Ty::Error, span),
            Resolved::Type(_) => "type",
            Resolved::Namespace(_) => "namespace",
            Resolved::Methods(_) => "method",
        };
        let text = self.tree.text().slice(span).to_string();
        self.report(ErrorCode::BadSkKnown, span, vec![text, kind.to_string()]);
        BoundExpr::error(Ty::Error, span)
    }

    fn bind_name(&mut self, ident: &Ident) -> Resolved {
        if ident.is_missing() {
            return Resolved::Error;
        }
        let span = ident.span;
        if let Some(local) = self.scope.lookup(&ident.name) {
            let ty = self.locals[local].ty.clone();
            return Resolved::Value(BoundExpr::new(BoundExprKind::Local(local), ty, span));
        }
        if let Some(index) = self.method.params.iter().position(|p| p.name == ident.name) {
            let ty = self.method.params[index].ty.clone();
            return Resolved::Value(BoundExpr::new(BoundExprKind::Param(index as u16), ty, span));
        }

        let type_id = self.method.type_id;
        let symbol = self.table.get(type_id);
        if let Some((index, field)) = symbol.field_named(&ident.name) {
            let field_ref = FieldRef { ty: type_id, index };
            let ty = field.ty.clone();
            if field.is_static {
                return Resolved::Value(BoundExpr::new(BoundExprKind::StaticField(field_ref), ty, span));
            }
            if self.method.is_static {
                let args = vec![self.table.field_display(type_id, index)];
                self.report(ErrorCode::ObjectRequired, span, args);
                return Resolved::Value(BoundExpr::error(ty, span));
            }
            let receiver = Box::new(self.this_expr(span));
            return Resolved::Value(BoundExpr::new(
                BoundExprKind::InstanceField {
                    receiver,
                    field: field_ref,
                },
                ty,
                span,
            ));
        }
        if symbol.methods_named(&ident.name).next().is_some() {
            return Resolved::Methods(MethodGroup {
                ty: type_id,
                name: ident.name.clone(),
                receiver: None,
                via_type: false,
                span,
            });
        }

        match self.context.lookup_simple(self.table, &ident.name) {
            NameLookup::Type(id) => Resolved::Type(id),
            NameLookup::Namespace(ns) => Resolved::Namespace(ns),
            NameLookup::NotFound => {
                self.report(ErrorCode::NameNotInContext, span, vec![ident.name.clone()]);
                Resolved::Error
            }
        }
    }

    fn bind_member(&mut self, object: Resolved, name: &Ident, span: Span) -> Resolved {
        if name.is_missing() {
            return Resolved::Error;
        }
        match object {
            Resolved::Error => Resolved::Error,
            Resolved::Namespace(ns) => match LookupContext::lookup_in(self.table, &ns, &name.name) {
                NameLookup::Type(id) => Resolved::Type(id),
                NameLookup::Namespace(inner) => Resolved::Namespace(inner),
                NameLookup::NotFound => {
                    self.report(ErrorCode::TypeNotInNamespace, name.span, vec![name.name.clone(), ns]);
                    Resolved::Error
                }
            },
            Resolved::Type(id) => self.bind_type_member(id, name, span),
            Resolved::Methods(group) => {
                let text = self.tree.text().slice(group.span).to_string();
                self.report(ErrorCode::BadSkKnown, group.span, vec![text, "method".to_string()]);
                Resolved::Error
            }
            Resolved::Value(value) => self.bind_instance_member(value, name, span),
        }
    }

    fn bind_type_member(&mut self, id: TypeId, name: &Ident, span: Span) -> Resolved {
        let table = self.table;
        let symbol = table.get(id);
        if let Some((index, field)) = symbol.field_named(&name.name) {
            let display = table.field_display(id, index);
            if !self.is_accessible(field.access, id) {
                self.report(ErrorCode::BadAccess, name.span, vec![display.clone()]);
            }
            if !field.is_static {
                self.report(ErrorCode::ObjectRequired, span, vec![display]);
                return Resolved::Value(BoundExpr::error(field.ty.clone(), span));
            }
            let field_ref = FieldRef { ty: id, index };
            return Resolved::Value(BoundExpr::new(
                BoundExprKind::StaticField(field_ref),
                field.ty.clone(),
                span,
            ));
        }
        if symbol.methods_named(&name.name).next().is_some() {
            return Resolved::Methods(MethodGroup {
                ty: id,
                name: name.name.clone(),
                receiver: None,
                via_type: true,
                span,
            });
        }
        let args = vec![table.display(&table.ty_of(id)), name.name.clone()];
        self.report(ErrorCode::NoSuchMember, name.span, args);
        Resolved::Error
    }

    fn bind_instance_member(&mut self, value: BoundExpr, name: &Ident, span: Span) -> Resolved {
        if value.is_error() {
            return Resolved::Error;
        }
        let table = self.table;
        match &value.ty {
            Ty::Array(_) | Ty::String if name.name == "Length" => {
                return Resolved::Value(BoundExpr::new(
                    BoundExprKind::Length(Box::new(value)),
                    Ty::Int,
                    span,
                ));
            }
            Ty::Null | Ty::Void => {
                let args = vec![".".to_string(), table.display(&value.ty)];
                self.report(ErrorCode::BadUnaryOp, span, args);
                return Resolved::Error;
            }
            _ => {}
        }

        if let Some(id) = table.type_of(&value.ty) {
            let symbol = table.get(id);
            if let Some((index, field)) = symbol.field_named(&name.name) {
                let display = table.field_display(id, index);
                if !self.is_accessible(field.access, id) {
                    self.report(ErrorCode::BadAccess, name.span, vec![display.clone()]);
                }
                if field.is_static {
                    self.report(ErrorCode::StaticViaInstance, span, vec![display]);
                    return Resolved::Value(BoundExpr::error(field.ty.clone(), span));
                }
                return Resolved::Value(BoundExpr::new(
                    BoundExprKind::InstanceField {
                        receiver: Box::new(value),
                        field: FieldRef { ty: id, index },
                    },
                    field.ty.clone(),
                    span,
                ));
            }
            if symbol.methods_named(&name.name).next().is_some() {
                return Resolved::Methods(MethodGroup {
                    ty: id,
                    name: name.name.clone(),
                    receiver: Some(value),
                    via_type: false,
                    span,
                });
            }
        }

        let args = vec![table.display(&value.ty), name.name.clone()];
        self.report(ErrorCode::NoSuchMemberOrExtension, name.span, args);
        Resolved::Error
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn bind_value(&mut self, expr: &Expr) -> BoundExpr {
        ensure_sufficient_stack(|| {
            let span = expr.span;
            match &expr.kind {
                ExprKind::IntLiteral(value) => self.bind_int_literal(*value, span, false),
                ExprKind::StringLiteral(value) => {
                    self.require(PredefinedType::String, span);
                    BoundExpr::constant(ConstValue::Str(value.clone()), Ty::String, span)
                }
                ExprKind::BoolLiteral(value) => {
                    self.require(PredefinedType::Bool, span);
                    BoundExpr::constant(ConstValue::Bool(*value), Ty::Bool, span)
                }
                ExprKind::Null => BoundExpr::constant(ConstValue::Null, Ty::Null, span),
                ExprKind::Binary { op, left, right } => self.bind_binary(*op, left, right, span),
                ExprKind::Unary { op, operand } => self.bind_unary(*op, operand, span),
                ExprKind::Assign { op, target, value } => self.bind_assignment(*op, target, value, span),
                ExprKind::IncDec {
                    increment,
                    prefix,
                    operand,
                } => self.bind_inc_dec(*increment, *prefix, operand, span),
                ExprKind::Call { callee, args } => self.bind_call(callee, args, span),
                ExprKind::Index { array, index } => self.bind_index(array, index, span),
                ExprKind::NewArray { element, length } => self.bind_new_array(element, length, span),
                ExprKind::Name(_) | ExprKind::Member { .. } | ExprKind::PredefinedType(_) => self.bind_expr(expr),
                ExprKind::Missing => BoundExpr::error(Ty::Error, span),
            }
        })
    }

    fn bind_int_literal(&mut self, value: u64, span: Span, negated: bool) -> BoundExpr {
        self.require(PredefinedType::Int, span);
        if negated && value == 1 << 31 {
            return BoundExpr::constant(ConstValue::Int(i32::MIN), Ty::Int, span);
        }
        match i32::try_from(value) {
            Ok(n) => BoundExpr::constant(ConstValue::Int(n), Ty::Int, span),
            Err(_) => {
                self.report(ErrorCode::IntegralConstantTooLarge, span, Vec::new());
                BoundExpr::error(Ty::Int, span)
            }
        }
    }

    fn bind_unary(&mut self, op: UnaryOp, operand: &Expr, span: Span) -> BoundExpr {
        if op == UnaryOp::Neg {
            if let ExprKind::IntLiteral(value) = operand.kind {
                if value == 1 << 31 {
                    return self.bind_int_literal(value, span, true);
                }
            }
        }

        let operand = self.bind_expr(operand);
        if operand.is_error() {
            return BoundExpr::error(Ty::Error, span);
        }
        let ty = match (op, &operand.ty) {
            (UnaryOp::Plus | UnaryOp::Neg | UnaryOp::BitNot, Ty::Int) => Ty::Int,
            (UnaryOp::Not, Ty::Bool) => Ty::Bool,
            _ => {
                let args = vec![op.to_string(), self.display(&operand.ty)];
                self.report(ErrorCode::BadUnaryOp, span, args);
                return BoundExpr::error(Ty::Error, span);
            }
        };

        if let Some(value) = operand.const_value() {
            let folded = match (op, value) {
                (UnaryOp::Plus, ConstValue::Int(n)) => Some(ConstValue::Int(*n)),
                (UnaryOp::Neg, ConstValue::Int(n)) => n.checked_neg().map(ConstValue::Int),
                (UnaryOp::BitNot, ConstValue::Int(n)) => Some(ConstValue::Int(!n)),
                (UnaryOp::Not, ConstValue::Bool(b)) => Some(ConstValue::Bool(!b)),
                _ => None,
            };
            return match folded {
                Some(value) => BoundExpr::constant(value, ty, span),
                None => {
                    self.report(ErrorCode::CheckedOverflow, span, Vec::new());
                    BoundExpr::error(ty, span)
                }
            };
        }

        BoundExpr::new(
            BoundExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
            span,
        )
    }

    fn bind_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: Span) -> BoundExpr {
        let left = self.bind_expr(left);
        let right = self.bind_expr(right);
        if left.is_error() || right.is_error() {
            return BoundExpr::error(Ty::Error, span);
        }
        let Some(ty) = binary_type(op, &left.ty, &right.ty) else {
            let args = vec![op.to_string(), self.display(&left.ty), self.display(&right.ty)];
            self.report(ErrorCode::BadBinaryOps, span, args);
            return BoundExpr::error(Ty::Error, span);
        };
        if matches!(op, BinaryOp::Div | BinaryOp::Rem)
            && ty == Ty::Int
            && right.const_value() == Some(&ConstValue::Int(0))
        {
            self.report(ErrorCode::DivideByZero, span, Vec::new());
            return BoundExpr::error(ty, span);
        }
        if let (Some(a), Some(b)) = (left.const_value(), right.const_value()) {
            match fold_binary(op, a, b) {
                Some(Some(value)) => return BoundExpr::constant(value, ty, span),
                Some(None) => {
                    self.report(ErrorCode::CheckedOverflow, span, Vec::new());
                    return BoundExpr::error(ty, span);
                }
                None => {}
            }
        }
        BoundExpr::new(
            BoundExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            span,
        )
    }

    /// Bind an assignable expression without counting it as a read
    fn bind_target(&mut self, expr: &Expr, code: ErrorCode) -> BoundExpr {
        let resolved = self.bind_resolved(expr);
        let bound = self.into_value(resolved, expr.span);
        match &bound.kind {
            BoundExprKind::Local(_)
            | BoundExprKind::Param(_)
            | BoundExprKind::StaticField(_)
            | BoundExprKind::InstanceField { .. }
            | BoundExprKind::Index { .. }
            | BoundExprKind::Error => bound,
            BoundExprKind::Length(object) => {
                let owner = if object.ty == Ty::String { "string" } else { "System.Array" };
                self.report(ErrorCode::AssgReadonlyProp, expr.span, vec![format!("{}.Length", owner)]);
                BoundExpr::error(bound.ty, expr.span)
            }
            _ => {
                self.report(code, expr.span, Vec::new());
                BoundExpr::error(bound.ty, expr.span)
            }
        }
    }

    fn bind_assignment(&mut self, op: Option<BinaryOp>, target: &Expr, value: &Expr, span: Span) -> BoundExpr {
        let target = self.bind_target(target, ErrorCode::AssgLvalueExpected);
        let value = self.bind_expr(value);
        let ty = target.ty.clone();

        let Some(op) = op else {
            let value = self.convert(value, &ty);
            self.mark_written(&target, value.const_value().is_some());
            return BoundExpr::new(
                BoundExprKind::Assign {
                    target: Box::new(target),
                    value: Box::new(value),
                },
                ty,
                span,
            );
        };

        self.mark_read(&target);
        self.mark_written(&target, false);
        if target.is_error() || value.is_error() {
            return BoundExpr::error(ty, span);
        }
        let Some(result) = binary_type(op, &target.ty, &value.ty) else {
            let args = vec![format!("{}=", op), self.display(&target.ty), self.display(&value.ty)];
            self.report(ErrorCode::BadBinaryOps, span, args);
            return BoundExpr::error(ty, span);
        };
        if !result.conversion_to(&ty).exists() {
            let args = vec![self.display(&result), self.display(&ty)];
            self.report(ErrorCode::NoImplicitConversion, span, args);
            return BoundExpr::error(ty, span);
        }
        if matches!(op, BinaryOp::Div | BinaryOp::Rem) && value.const_value() == Some(&ConstValue::Int(0)) {
            self.report(ErrorCode::DivideByZero, span, Vec::new());
            return BoundExpr::error(ty, span);
        }
        BoundExpr::new(
            BoundExprKind::CompoundAssign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            ty,
            span,
        )
    }

    fn bind_inc_dec(&mut self, increment: bool, prefix: bool, operand: &Expr, span: Span) -> BoundExpr {
        let target = self.bind_target(operand, ErrorCode::IncrementLvalueExpected);
        self.mark_read(&target);
        self.mark_written(&target, false);
        if target.is_error() {
            return BoundExpr::error(Ty::Error, span);
        }
        if target.ty != Ty::Int {
            let op = if increment { "++" } else { "--" };
            let args = vec![op.to_string(), self.display(&target.ty)];
            self.report(ErrorCode::BadUnaryOp, span, args);
            return BoundExpr::error(Ty::Error, span);
        }
        BoundExpr::new(
            BoundExprKind::IncDec {
                increment,
                prefix,
                target: Box::new(target),
            },
            Ty::Int,
            span,
        )
    }

    fn bind_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> BoundExpr {
        let target = self.bind_resolved(callee);
        let args: Vec<BoundExpr> = args.iter().map(|a| self.bind_expr(a)).collect();
        match target {
            Resolved::Methods(group) => self.resolve_call(group, args, span),
            Resolved::Error => BoundExpr::error(Ty::Error, span),
            Resolved::Value(value) if value.is_error() => BoundExpr::error(Ty::Error, span),
            _ => {
                self.report(ErrorCode::MethodNameExpected, callee.span, Vec::new());
                BoundExpr::error(Ty::Error, span)
            }
        }
    }

    /// Pick the overload with the cheapest argument conversions
    fn resolve_call(&mut self, group: MethodGroup, args: Vec<BoundExpr>, span: Span) -> BoundExpr {
        let table = self.table;
        let symbol = table.get(group.ty);
        let candidates: Vec<usize> = symbol
            .methods_named(&group.name)
            .filter(|(_, m)| m.params.len() == args.len())
            .map(|(index, _)| index)
            .collect();
        if candidates.is_empty() {
            let args = vec![group.name.clone(), args.len().to_string()];
            self.report(ErrorCode::BadArgCount, group.span, args);
            return BoundExpr::error(Ty::Error, span);
        }

        let best = candidates
            .iter()
            .filter_map(|&index| {
                let params = &symbol.methods[index].params;
                let cost: Option<u32> = params
                    .iter()
                    .zip(&args)
                    .map(|(p, a)| {
                        let conversion = a.ty.conversion_to(&p.ty);
                        conversion.exists().then(|| conversion.cost())
                    })
                    .sum();
                cost.map(|cost| (cost, index))
            })
            .min_by_key(|(cost, _)| *cost);

        let Some((_, index)) = best else {
            let method = &symbol.methods[candidates[0]];
            let mismatch = args
                .iter()
                .zip(&method.params)
                .enumerate()
                .find(|(_, (a, p))| !a.ty.conversion_to(&p.ty).exists());
            if let Some((position, (arg, param))) = mismatch {
                let message_args = vec![
                    (position + 1).to_string(),
                    table.display(&arg.ty),
                    table.display(&param.ty),
                ];
                self.report(ErrorCode::BadArgType, arg.span, message_args);
            }
            return BoundExpr::error(method.ret.clone(), span);
        };

        let method = &symbol.methods[index];
        let display = table.method_display(group.ty, index);
        if !self.is_accessible(method.access, group.ty) {
            self.report(ErrorCode::BadAccess, group.span, vec![display.clone()]);
        }

        let receiver = if method.is_static {
            if group.receiver.is_some() {
                self.report(ErrorCode::StaticViaInstance, group.span, vec![display]);
            }
            None
        } else if group.via_type || (group.receiver.is_none() && self.method.is_static) {
            self.report(ErrorCode::ObjectRequired, group.span, vec![display]);
            return BoundExpr::error(method.ret.clone(), span);
        } else {
            let receiver = group.receiver.unwrap_or_else(|| self.this_expr(group.span));
            Some(Box::new(receiver))
        };

        BoundExpr::new(
            BoundExprKind::Call {
                method: MethodRef { ty: group.ty, index },
                receiver,
                args,
            },
            method.ret.clone(),
            span,
        )
    }

    fn bind_index(&mut self, array: &Expr, index: &Expr, span: Span) -> BoundExpr {
        let array = self.bind_expr(array);
        let index = self.bind_expr(index);
        let index = self.convert(index, &Ty::Int);
        if array.is_error() {
            return BoundExpr::error(Ty::Error, span);
        }
        match array.ty.clone() {
            Ty::Array(element) => BoundExpr::new(
                BoundExprKind::Index {
                    array: Box::new(array),
                    index: Box::new(index),
                },
                *element,
                span,
            ),
            other => {
                let args = vec![self.display(&other)];
                self.report(ErrorCode::BadIndexLhs, span, args);
                BoundExpr::error(Ty::Error, span)
            }
        }
    }

    fn bind_new_array(&mut self, element: &TypeSyntax, length: &Expr, span: Span) -> BoundExpr {
        let element_ty = resolve_type(self.table, self.context, element, self.tree, self.diagnostics);
        let length = self.bind_expr(length);
        let length = self.convert(length, &Ty::Int);
        if element_ty == Ty::Void {
            self.report(ErrorCode::VoidLocal, element.span, Vec::new());
            return BoundExpr::error(Ty::Error, span);
        }
        if element_ty.is_error() {
            return BoundExpr::error(Ty::Error, span);
        }
        BoundExpr::new(
            BoundExprKind::NewArray {
                element: element_ty.clone(),
                length: Box::new(length),
            },
            Ty::Array(Box::new(element_ty)),
            span,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_binary_typing() {
        assert_eq!(binary_type(BinaryOp::Add, &Ty::String, &Ty::Int), Some(Ty::String));
        assert_eq!(binary_type(BinaryOp::Add, &Ty::Int, &Ty::Int), Some(Ty::Int));
        assert_eq!(binary_type(BinaryOp::Add, &Ty::Int, &Ty::Bool), None);
        assert_eq!(binary_type(BinaryOp::LogicalAnd, &Ty::Bool, &Ty::Bool), Some(Ty::Bool));
        assert_eq!(binary_type(BinaryOp::Eq, &Ty::String, &Ty::Null), Some(Ty::Bool));
        assert_eq!(binary_type(BinaryOp::Lt, &Ty::String, &Ty::String), None);
    }

    #[test]
    fn test_folding() {
        let fold = |op, a: i32, b: i32| fold_binary(op, &ConstValue::Int(a), &ConstValue::Int(b));
        assert_eq!(fold(BinaryOp::Mul, 6, 7), Some(Some(ConstValue::Int(42))));
        assert_eq!(fold(BinaryOp::Add, i32::MAX, 1), Some(None));
        assert_eq!(fold(BinaryOp::Shl, 1, 33), Some(Some(ConstValue::Int(2))));
        assert_eq!(
            fold_binary(BinaryOp::Add, &ConstValue::Str("n=".into()), &ConstValue::Bool(true)),
            Some(Some(ConstValue::Str("n=True".into())))
        );
    }
}
