//! Lowering of bound method bodies to stack instructions

use msvm::image::{LocalToken, MemberRef};
use msvm::{ImageBuilder, OpCode, TypeSig};

use super::assembler::branch_if;
use super::ir::{Inst, Label};
use crate::common::ensure_sufficient_stack;
use crate::sema::bound::*;
use crate::sema::symbols::{SymbolTable, TypeOrigin};
use crate::sema::types::{ConstValue, Ty, TypeId};
use crate::syntax::ast::{BinaryOp, UnaryOp};

/// Instructions and local slots of one method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredBody {
    pub code: Vec<Inst>,
    pub locals: Vec<TypeSig>,
}

/// A storage location whose parts have already been evaluated
#[derive(Debug, Clone, Copy)]
enum Place {
    Local(u16),
    Arg(u16),
    Static(u32),
    /// Receiver held in a scratch local
    Field { token: u32, receiver: u16 },
    /// Array and index held in scratch locals
    Element { array: u16, index: u16 },
}

impl Place {
    /// Stored through values pushed before the new value
    fn has_prefix(self) -> bool {
        matches!(self, Place::Field { .. } | Place::Element { .. })
    }
}

pub struct Lowering<'a> {
    table: &'a SymbolTable,
    builder: &'a mut ImageBuilder,
    is_static: bool,
    code: Vec<Inst>,
    locals: Vec<TypeSig>,
    next_label: u32,
    /// (break, continue) targets of enclosing loops
    loops: Vec<(Label, Label)>,
}

fn element_tag(element: &Ty) -> u8 {
    match element {
        Ty::Bool => 1,
        Ty::Int => 2,
        Ty::String => 3,
        _ => 0,
    }
}

fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Sub => OpCode::Sub,
        BinaryOp::Mul => OpCode::Mul,
        BinaryOp::Div => OpCode::Div,
        BinaryOp::Rem => OpCode::Rem,
        BinaryOp::Shl => OpCode::Shl,
        BinaryOp::Shr => OpCode::Shr,
        BinaryOp::BitAnd | BinaryOp::LogicalAnd => OpCode::And,
        BinaryOp::BitOr | BinaryOp::LogicalOr => OpCode::Or,
        BinaryOp::BitXor => OpCode::Xor,
        BinaryOp::Eq => OpCode::Ceq,
        BinaryOp::Ne => OpCode::Cne,
        BinaryOp::Lt => OpCode::Clt,
        BinaryOp::Le => OpCode::Cle,
        BinaryOp::Gt => OpCode::Cgt,
        BinaryOp::Ge => OpCode::Cge,
    }
}

impl<'a> Lowering<'a> {
    pub fn new(
        table: &'a SymbolTable,
        builder: &'a mut ImageBuilder,
        is_static: bool,
        locals: &[LocalSymbol],
    ) -> Self {
        let locals = locals.iter().map(|local| table.sig(&local.ty)).collect();
        Self {
            table,
            builder,
            is_static,
            code: Vec::new(),
            locals,
            next_label: 0,
            loops: Vec::new(),
        }
    }

    /// Lower a method body; void methods get a trailing `ret`
    pub fn method(mut self, body: &BoundStmt, returns_void: bool) -> LoweredBody {
        self.stmt(body);
        if returns_void && !self.code.last().is_some_and(Inst::ends_flow) {
            self.emit(Inst::Simple(OpCode::Ret));
        }
        self.finish()
    }

    /// Lower static field initializers into one body
    pub fn initializer(mut self, inits: &[BoundFieldInit]) -> LoweredBody {
        for init in inits {
            self.expr(&init.value);
            let token = self.field_token(init.field);
            self.emit(Inst::Field(OpCode::StSFld, token));
        }
        self.emit(Inst::Simple(OpCode::Ret));
        self.finish()
    }

    fn finish(self) -> LoweredBody {
        LoweredBody {
            code: self.code,
            locals: self.locals,
        }
    }

    fn emit(&mut self, inst: Inst) {
        self.code.push(inst);
    }

    fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn scratch(&mut self, ty: &Ty) -> u16 {
        self.locals.push(self.table.sig(ty));
        (self.locals.len() - 1) as u16
    }

    fn image_index(&self, ty: TypeId) -> u16 {
        self.table.image_index(ty).unwrap_or(0)
    }

    fn field_token(&self, field: FieldRef) -> u32 {
        LocalToken::new(self.image_index(field.ty), field.index as u16).encode()
    }

    fn method_token(&mut self, method: MethodRef) -> u32 {
        let ty = self.table.get(method.ty);
        match &ty.origin {
            TypeOrigin::Source(_) => {
                LocalToken::new(self.image_index(method.ty), method.index as u16).encode()
            }
            TypeOrigin::Metadata(assembly) => {
                let symbol = &ty.methods[method.index];
                let member = MemberRef {
                    assembly: assembly.clone(),
                    type_name: ty.full_name.clone(),
                    name: symbol.name.clone(),
                    params: symbol.params.iter().map(|p| self.table.sig(&p.ty)).collect(),
                };
                self.builder.member_ref(member)
            }
        }
    }

    fn arg_slot(&self, index: u16) -> u16 {
        index + u16::from(!self.is_static)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn stmt(&mut self, stmt: &BoundStmt) {
        ensure_sufficient_stack(|| {
            match &stmt.kind {
                BoundStmtKind::Block(stmts) => {
                    for stmt in stmts {
                        self.stmt(stmt);
                    }
                }
                BoundStmtKind::Local { local, init } => {
                    if let Some(value) = init {
                        self.expr(value);
                        self.emit(Inst::Slot(OpCode::StLoc, *local as u16));
                    }
                }
                BoundStmtKind::Expr(expr) => self.expr_discard(expr),
                BoundStmtKind::If {
                    condition,
                    then_branch,
                    else_branch,
                } => {
                    let else_label = self.new_label();
                    self.jump_if(condition, false, else_label);
                    self.stmt(then_branch);
                    match else_branch {
                        Some(else_branch) => {
                            let end = self.new_label();
                            self.emit(Inst::Branch(OpCode::Br, end));
                            self.emit(Inst::Label(else_label));
                            self.stmt(else_branch);
                            self.emit(Inst::Label(end));
                        }
                        None => self.emit(Inst::Label(else_label)),
                    }
                }
                BoundStmtKind::While { condition, body } => {
                    let top = self.new_label();
                    let end = self.new_label();
                    self.emit(Inst::Label(top));
                    self.jump_if(condition, false, end);
                    self.loop_body(body, end, top);
                    self.emit(Inst::Branch(OpCode::Br, top));
                    self.emit(Inst::Label(end));
                }
                BoundStmtKind::For {
                    init,
                    condition,
                    update,
                    body,
                } => {
                    for stmt in init {
                        self.stmt(stmt);
                    }
                    let top = self.new_label();
                    let next = self.new_label();
                    let end = self.new_label();
                    self.emit(Inst::Label(top));
                    if let Some(condition) = condition {
                        self.jump_if(condition, false, end);
                    }
                    self.loop_body(body, end, next);
                    self.emit(Inst::Label(next));
                    for expr in update {
                        self.expr_discard(expr);
                    }
                    self.emit(Inst::Branch(OpCode::Br, top));
                    self.emit(Inst::Label(end));
                }
                BoundStmtKind::Return(value) => {
                    if let Some(value) = value {
                        self.expr(value);
                    }
                    self.emit(Inst::Simple(OpCode::Ret));
                }
                BoundStmtKind::Break => {
                    if let Some(&(target, _)) = self.loops.last() {
                        self.emit(Inst::Branch(OpCode::Br, target));
                    }
                }
                BoundStmtKind::Continue => {
                    if let Some(&(_, target)) = self.loops.last() {
                        self.emit(Inst::Branch(OpCode::Br, target));
                    }
                }
                BoundStmtKind::Empty => {}
            }
        })
    }

    fn loop_body(&mut self, body: &BoundStmt, break_label: Label, continue_label: Label) {
        self.loops.push((break_label, continue_label));
        self.stmt(body);
        self.loops.pop();
    }

    /// Jump to `target` when `condition` evaluates to `value`
    fn jump_if(&mut self, condition: &BoundExpr, value: bool, target: Label) {
        match condition.const_value().and_then(ConstValue::as_bool) {
            Some(constant) if constant == value => self.emit(Inst::Branch(OpCode::Br, target)),
            Some(_) => {}
            None => {
                self.expr(condition);
                self.emit(Inst::Branch(branch_if(value), target));
            }
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Evaluate for side effects only
    fn expr_discard(&mut self, expr: &BoundExpr) {
        match &expr.kind {
            BoundExprKind::Assign { target, value } => self.assign(target, value, false),
            BoundExprKind::CompoundAssign { op, target, value } => {
                self.compound_assign(*op, target, value, false);
            }
            BoundExprKind::IncDec {
                increment, target, ..
            } => self.inc_dec(*increment, true, target, false),
            _ => {
                self.expr(expr);
                if expr.ty != Ty::Void {
                    self.emit(Inst::Simple(OpCode::Pop));
                }
            }
        }
    }

    /// Evaluate and push the value (nothing for void calls)
    fn expr(&mut self, expr: &BoundExpr) {
        ensure_sufficient_stack(|| {
            match &expr.kind {
                BoundExprKind::Const(value) => self.constant(value),
                BoundExprKind::Local(local) => self.emit(Inst::Slot(OpCode::LdLoc, *local as u16)),
                BoundExprKind::Param(index) => {
                    let slot = self.arg_slot(*index);
                    self.emit(Inst::Slot(OpCode::LdArg, slot));
                }
                BoundExprKind::This => self.emit(Inst::Slot(OpCode::LdArg, 0)),
                BoundExprKind::StaticField(field) => {
                    let token = self.field_token(*field);
                    self.emit(Inst::Field(OpCode::LdSFld, token));
                }
                BoundExprKind::InstanceField { receiver, field } => {
                    self.expr(receiver);
                    let token = self.field_token(*field);
                    self.emit(Inst::Field(OpCode::LdFld, token));
                }
                BoundExprKind::Length(object) => {
                    self.expr(object);
                    self.emit(Inst::Simple(OpCode::LdLen));
                }
                BoundExprKind::Index { array, index } => {
                    self.expr(array);
                    self.expr(index);
                    self.emit(Inst::Simple(OpCode::LdElem));
                }
                BoundExprKind::Unary { op, operand } => {
                    self.expr(operand);
                    match op {
                        UnaryOp::Plus => {}
                        UnaryOp::Neg => self.emit(Inst::Simple(OpCode::Neg)),
                        UnaryOp::Not => self.emit(Inst::Simple(OpCode::Not)),
                        UnaryOp::BitNot => self.emit(Inst::Simple(OpCode::BitNot)),
                    }
                }
                BoundExprKind::Binary { op, left, right } => self.binary(*op, left, right, &expr.ty),
                BoundExprKind::Assign { target, value } => self.assign(target, value, true),
                BoundExprKind::CompoundAssign { op, target, value } => {
                    self.compound_assign(*op, target, value, true);
                }
                BoundExprKind::IncDec {
                    increment,
                    prefix,
                    target,
                } => self.inc_dec(*increment, *prefix, target, true),
                BoundExprKind::Call {
                    method,
                    receiver,
                    args,
                } => {
                    if let Some(receiver) = receiver {
                        self.expr(receiver);
                    }
                    for arg in args {
                        self.expr(arg);
                    }
                    let token = self.method_token(*method);
                    let returns = self.table.get(method.ty).methods[method.index].ret != Ty::Void;
                    self.emit(Inst::Call {
                        token,
                        args: (args.len() + usize::from(receiver.is_some())) as u16,
                        returns,
                    });
                }
                BoundExprKind::NewArray { element, length } => {
                    self.expr(length);
                    self.emit(Inst::NewArr(element_tag(element)));
                }
                // Bodies with errors are never lowered
                BoundExprKind::Error => self.emit(Inst::Simple(OpCode::LdNull)),
            }
        })
    }

    fn constant(&mut self, value: &ConstValue) {
        let inst = match value {
            ConstValue::Int(n) => Inst::LdcI4(*n),
            ConstValue::Bool(true) => Inst::Simple(OpCode::LdTrue),
            ConstValue::Bool(false) => Inst::Simple(OpCode::LdFalse),
            ConstValue::Str(s) => Inst::LdStr(self.builder.intern(s)),
            ConstValue::Null => Inst::Simple(OpCode::LdNull),
        };
        self.emit(inst);
    }

    fn binary(&mut self, op: BinaryOp, left: &BoundExpr, right: &BoundExpr, ty: &Ty) {
        match op {
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                // a && b: if !a then false else b
                let short = op == BinaryOp::LogicalOr;
                let skip = self.new_label();
                let end = self.new_label();
                self.jump_if(left, short, skip);
                self.expr(right);
                self.emit(Inst::Branch(OpCode::Br, end));
                self.emit(Inst::Label(skip));
                self.constant(&ConstValue::Bool(short));
                self.emit(Inst::Label(end));
            }
            BinaryOp::Add if *ty == Ty::String => {
                self.expr(left);
                self.expr(right);
                self.emit(Inst::Simple(OpCode::Concat));
            }
            _ => {
                self.expr(left);
                self.expr(right);
                self.emit(Inst::Simple(binary_opcode(op)));
            }
        }
    }

    /// Evaluate the receiver, array and index of a target into scratch locals
    fn place(&mut self, target: &BoundExpr) -> Place {
        match &target.kind {
            BoundExprKind::Param(index) => Place::Arg(self.arg_slot(*index)),
            BoundExprKind::StaticField(field) => Place::Static(self.field_token(*field)),
            BoundExprKind::InstanceField { receiver, field } => {
                self.expr(receiver);
                let slot = self.scratch(&receiver.ty);
                self.emit(Inst::Slot(OpCode::StLoc, slot));
                Place::Field {
                    token: self.field_token(*field),
                    receiver: slot,
                }
            }
            BoundExprKind::Index { array, index } => {
                self.expr(array);
                let array_slot = self.scratch(&array.ty);
                self.emit(Inst::Slot(OpCode::StLoc, array_slot));
                self.expr(index);
                let index_slot = self.scratch(&Ty::Int);
                self.emit(Inst::Slot(OpCode::StLoc, index_slot));
                Place::Element {
                    array: array_slot,
                    index: index_slot,
                }
            }
            BoundExprKind::Local(local) => Place::Local(*local as u16),
            // Only assignable expressions reach here once binding succeeds
            _ => Place::Local(self.scratch(&target.ty)),
        }
    }

    fn push_prefix(&mut self, place: Place) {
        match place {
            Place::Field { receiver, .. } => self.emit(Inst::Slot(OpCode::LdLoc, receiver)),
            Place::Element { array, index } => {
                self.emit(Inst::Slot(OpCode::LdLoc, array));
                self.emit(Inst::Slot(OpCode::LdLoc, index));
            }
            Place::Local(_) | Place::Arg(_) | Place::Static(_) => {}
        }
    }

    fn load(&mut self, place: Place) {
        self.push_prefix(place);
        let inst = match place {
            Place::Local(slot) => Inst::Slot(OpCode::LdLoc, slot),
            Place::Arg(slot) => Inst::Slot(OpCode::LdArg, slot),
            Place::Static(token) => Inst::Field(OpCode::LdSFld, token),
            Place::Field { token, .. } => Inst::Field(OpCode::LdFld, token),
            Place::Element { .. } => Inst::Simple(OpCode::LdElem),
        };
        self.emit(inst);
    }

    /// Store the value on top of the stack, keeping a copy if asked
    fn store(&mut self, place: Place, ty: &Ty, keep: bool) {
        let saved = if keep && place.has_prefix() {
            let slot = self.scratch(ty);
            self.emit(Inst::Simple(OpCode::Dup));
            self.emit(Inst::Slot(OpCode::StLoc, slot));
            Some(slot)
        } else {
            if keep {
                self.emit(Inst::Simple(OpCode::Dup));
            }
            None
        };
        let inst = match place {
            Place::Local(slot) => Inst::Slot(OpCode::StLoc, slot),
            Place::Arg(slot) => Inst::Slot(OpCode::StArg, slot),
            Place::Static(token) => Inst::Field(OpCode::StSFld, token),
            Place::Field { token, .. } => Inst::Field(OpCode::StFld, token),
            Place::Element { .. } => Inst::Simple(OpCode::StElem),
        };
        self.emit(inst);
        if let Some(slot) = saved {
            self.emit(Inst::Slot(OpCode::LdLoc, slot));
        }
    }

    fn assign(&mut self, target: &BoundExpr, value: &BoundExpr, keep: bool) {
        let place = self.place(target);
        self.push_prefix(place);
        self.expr(value);
        self.store(place, &target.ty, keep);
    }

    fn compound_assign(&mut self, op: BinaryOp, target: &BoundExpr, value: &BoundExpr, keep: bool) {
        let place = self.place(target);
        self.push_prefix(place);
        self.load(place);
        self.expr(value);
        let opcode = if op == BinaryOp::Add && target.ty == Ty::String {
            OpCode::Concat
        } else {
            binary_opcode(op)
        };
        self.emit(Inst::Simple(opcode));
        self.store(place, &target.ty, keep);
    }

    fn inc_dec(&mut self, increment: bool, prefix: bool, target: &BoundExpr, keep: bool) {
        let place = self.place(target);
        self.push_prefix(place);
        self.load(place);
        let old = if keep && !prefix {
            let slot = self.scratch(&Ty::Int);
            self.emit(Inst::Simple(OpCode::Dup));
            self.emit(Inst::Slot(OpCode::StLoc, slot));
            Some(slot)
        } else {
            None
        };
        self.emit(Inst::LdcI4(1));
        self.emit(Inst::Simple(if increment { OpCode::Add } else { OpCode::Sub }));
        self.store(place, &Ty::Int, keep && prefix);
        if let Some(slot) = old {
            self.emit(Inst::Slot(OpCode::LdLoc, slot));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;
    use msvm::ImageKind;
    use pretty_assertions::assert_eq;

    fn lower(body: BoundStmt, locals: &[LocalSymbol]) -> LoweredBody {
        let table = SymbolTable::new();
        let mut builder = ImageBuilder::new("test", ImageKind::Library);
        Lowering::new(&table, &mut builder, true, locals).method(&body, true)
    }

    fn int_local() -> LocalSymbol {
        LocalSymbol {
            name: "i".to_string(),
            ty: Ty::Int,
            span: Span::default(),
        }
    }

    #[test]
    fn test_postfix_increment_as_statement() {
        let target = BoundExpr::new(BoundExprKind::Local(0), Ty::Int, Span::default());
        let inc = BoundExpr::new(
            BoundExprKind::IncDec {
                increment: true,
                prefix: false,
                target: Box::new(target),
            },
            Ty::Int,
            Span::default(),
        );
        let body = lower(BoundStmt::new(BoundStmtKind::Expr(inc), Span::default()), &[int_local()]);
        assert_eq!(
            body.code,
            vec![
                Inst::Slot(OpCode::LdLoc, 0),
                Inst::LdcI4(1),
                Inst::Simple(OpCode::Add),
                Inst::Slot(OpCode::StLoc, 0),
                Inst::Simple(OpCode::Ret),
            ]
        );
        assert_eq!(body.locals, vec![TypeSig::Int32]);
    }

    #[test]
    fn test_constant_false_condition_skips_test() {
        let condition = BoundExpr::constant(ConstValue::Bool(false), Ty::Bool, Span::default());
        let body = BoundStmt::new(
            BoundStmtKind::While {
                condition,
                body: Box::new(BoundStmt::new(BoundStmtKind::Empty, Span::default())),
            },
            Span::default(),
        );
        let lowered = lower(body, &[]);
        assert_eq!(
            lowered.code,
            vec![
                Inst::Label(Label(0)),
                Inst::Branch(OpCode::Br, Label(1)),
                Inst::Branch(OpCode::Br, Label(0)),
                Inst::Label(Label(1)),
                Inst::Simple(OpCode::Ret),
            ]
        );
    }
}
