//! Bytecode interpreter

use std::sync::Arc;

use log::trace;

use crate::corlib;
use crate::host::{Assembly, CallTarget};
use crate::image::{LocalToken, MethodDef, TypeSig, EXTERNAL_TOKEN};
use crate::value::ArrayRef;
use crate::{OpCode, RuntimeError, RuntimeResult, Value};

/// Nested call limit before a call fails with `StackOverflow`
pub const MAX_CALL_DEPTH: usize = 256;

/// Invoke a method defined in `assembly`
///
/// Managed calls push onto an explicit frame stack, so call depth is bounded
/// by `MAX_CALL_DEPTH` rather than by the native stack.
pub(crate) fn call(
    assembly: &Arc<Assembly>,
    token: LocalToken,
    args: Vec<Value>,
) -> RuntimeResult<Value> {
    let mut frames = match enter(assembly, token, args, 0)? {
        Entry::Frame(frame) => vec![frame],
        Entry::Native { value, .. } => return Ok(value),
    };

    loop {
        let Some(frame) = frames.last_mut() else {
            return Err(RuntimeError::invalid("empty call stack"));
        };
        match frame.run()? {
            Exit::Call {
                assembly,
                token,
                args,
            } => match enter(assembly, token, args, frames.len())? {
                Entry::Frame(callee) => frames.push(callee),
                Entry::Native {
                    value,
                    returns_value,
                } => {
                    if let Some(caller) = frames.last_mut().filter(|_| returns_value) {
                        caller.push(value);
                    }
                }
            },
            Exit::Return(value) => {
                let Some(finished) = frames.pop() else {
                    return Err(RuntimeError::invalid("empty call stack"));
                };
                trace!("leave {}", finished.method.signature());
                match frames.last_mut() {
                    Some(caller) if finished.method.ret != TypeSig::Void => caller.push(value),
                    Some(_) => {}
                    None => return Ok(value),
                }
            }
        }
    }
}

enum Entry<'a> {
    Frame(Frame<'a>),
    Native { value: Value, returns_value: bool },
}

/// Why a frame stopped running
enum Exit<'a> {
    Call {
        assembly: &'a Arc<Assembly>,
        token: LocalToken,
        args: Vec<Value>,
    },
    Return(Value),
}

fn enter<'a>(
    assembly: &'a Arc<Assembly>,
    token: LocalToken,
    args: Vec<Value>,
    depth: usize,
) -> RuntimeResult<Entry<'a>> {
    if depth >= MAX_CALL_DEPTH {
        return Err(RuntimeError::StackOverflow(MAX_CALL_DEPTH));
    }

    let method = assembly
        .image()
        .method(token)
        .ok_or_else(|| RuntimeError::invalid("call to an undefined method"))?;

    if method.is_intrinsic() {
        let intrinsic = assembly
            .intrinsic(token)
            .ok_or_else(|| RuntimeError::invalid(format!("no native body for '{}'", method.name)))?;
        let value = corlib::invoke(intrinsic, &args, assembly.console())?;
        return Ok(Entry::Native {
            value,
            returns_value: method.ret != TypeSig::Void,
        });
    }

    trace!("enter {} (depth {})", method.signature(), depth);
    Ok(Entry::Frame(Frame::new(assembly, method, args)))
}

struct Frame<'a> {
    assembly: &'a Arc<Assembly>,
    method: &'a MethodDef,
    code: &'a [u8],
    pc: usize,
    args: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl<'a> Frame<'a> {
    fn new(assembly: &'a Arc<Assembly>, method: &'a MethodDef, args: Vec<Value>) -> Self {
        Self {
            assembly,
            method,
            code: assembly.image().method_code(method),
            pc: 0,
            args,
            locals: method.locals.iter().map(Value::default_for).collect(),
            stack: Vec::with_capacity(method.max_stack as usize),
        }
    }

    fn read_u8(&mut self) -> RuntimeResult<u8> {
        let byte = *self
            .code
            .get(self.pc)
            .ok_or_else(|| RuntimeError::invalid("truncated instruction"))?;
        self.pc += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> RuntimeResult<u16> {
        let lo = self.read_u8()? as u16;
        let hi = self.read_u8()? as u16;
        Ok(lo | (hi << 8))
    }

    fn read_u32(&mut self) -> RuntimeResult<u32> {
        let lo = self.read_u16()? as u32;
        let hi = self.read_u16()? as u32;
        Ok(lo | (hi << 16))
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> RuntimeResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::invalid("evaluation stack underflow"))
    }

    fn pop_int(&mut self) -> RuntimeResult<i32> {
        match self.pop()? {
            Value::Int(n) => Ok(n),
            other => Err(RuntimeError::invalid(format!(
                "expected int on the stack, found {}",
                other.type_name()
            ))),
        }
    }

    fn pop_bool(&mut self) -> RuntimeResult<bool> {
        match self.pop()? {
            Value::Bool(b) => Ok(b),
            other => Err(RuntimeError::invalid(format!(
                "expected bool on the stack, found {}",
                other.type_name()
            ))),
        }
    }

    fn pop_array(&mut self) -> RuntimeResult<ArrayRef> {
        match self.pop()? {
            Value::Array(array) => Ok(array),
            Value::Null => Err(RuntimeError::NullReference),
            other => Err(RuntimeError::invalid(format!(
                "expected array on the stack, found {}",
                other.type_name()
            ))),
        }
    }

    fn jump(&mut self, target: u32) -> RuntimeResult<()> {
        let target = target as usize;
        if target > self.code.len() {
            return Err(RuntimeError::invalid("branch target outside method body"));
        }
        self.pc = target;
        Ok(())
    }

    fn int_binary(&mut self, op: OpCode) -> RuntimeResult<()> {
        let right = self.pop_int()?;
        let left = self.pop_int()?;
        let result = match op {
            OpCode::Add => Value::Int(left.wrapping_add(right)),
            OpCode::Sub => Value::Int(left.wrapping_sub(right)),
            OpCode::Mul => Value::Int(left.wrapping_mul(right)),
            OpCode::Div => {
                if right == 0 {
                    return Err(RuntimeError::DivideByZero);
                }
                Value::Int(left.checked_div(right).ok_or(RuntimeError::Overflow)?)
            }
            OpCode::Rem => {
                if right == 0 {
                    return Err(RuntimeError::DivideByZero);
                }
                Value::Int(left.checked_rem(right).ok_or(RuntimeError::Overflow)?)
            }
            OpCode::Shl => Value::Int(left.wrapping_shl(right as u32)),
            OpCode::Shr => Value::Int(left.wrapping_shr(right as u32)),
            OpCode::Clt => Value::Bool(left < right),
            OpCode::Cle => Value::Bool(left <= right),
            OpCode::Cgt => Value::Bool(left > right),
            OpCode::Cge => Value::Bool(left >= right),
            _ => return Err(RuntimeError::invalid(format!("{} is not an int operator", op))),
        };
        self.push(result);
        Ok(())
    }

    /// `and`/`or`/`xor` work on ints and on bools
    fn logical_binary(&mut self, op: OpCode) -> RuntimeResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = match (left, right) {
            (Value::Int(a), Value::Int(b)) => Value::Int(match op {
                OpCode::And => a & b,
                OpCode::Or => a | b,
                _ => a ^ b,
            }),
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(match op {
                OpCode::And => a & b,
                OpCode::Or => a | b,
                _ => a ^ b,
            }),
            _ => return Err(RuntimeError::invalid(format!("bad operands for {}", op))),
        };
        self.push(result);
        Ok(())
    }

    fn load_static(&self, token: LocalToken) -> RuntimeResult<Value> {
        self.assembly
            .load_static(token)
            .ok_or_else(|| RuntimeError::invalid("undefined static field"))
    }

    fn store_static(&self, token: LocalToken, value: Value) -> RuntimeResult<()> {
        if self.assembly.store_static(token, value) {
            Ok(())
        } else {
            Err(RuntimeError::invalid("undefined static field"))
        }
    }

    fn pop_args(&mut self, count: usize) -> RuntimeResult<Vec<Value>> {
        if self.stack.len() < count {
            return Err(RuntimeError::invalid("evaluation stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    /// Native targets run in place; managed targets become an `Exit::Call`
    fn invoke(&mut self, token: u32) -> RuntimeResult<Option<Exit<'a>>> {
        if token & EXTERNAL_TOKEN == 0 {
            let token = LocalToken::decode(token);
            let callee = self
                .assembly
                .image()
                .method(token)
                .ok_or_else(|| RuntimeError::invalid("call to an undefined method"))?;
            // Instance methods take the receiver as a hidden first argument
            let arity = callee.params.len() + usize::from(!callee.is_static());
            let args = self.pop_args(arity)?;
            return Ok(Some(Exit::Call {
                assembly: self.assembly,
                token,
                args,
            }));
        }

        let index = (token & !EXTERNAL_TOKEN) as usize;
        let caller: &'a Arc<Assembly> = self.assembly;
        let target = caller
            .call_target(index)
            .ok_or_else(|| RuntimeError::invalid("member reference out of range"))?;
        match target {
            CallTarget::Managed { assembly, token } => {
                let callee = assembly
                    .image()
                    .method(*token)
                    .ok_or_else(|| RuntimeError::invalid("call to an undefined method"))?;
                let args = self.pop_args(callee.params.len())?;
                Ok(Some(Exit::Call {
                    assembly,
                    token: *token,
                    args,
                }))
            }
            CallTarget::Native {
                intrinsic,
                arity,
                returns_value,
            } => {
                let args = self.pop_args(*arity)?;
                let result = corlib::invoke(*intrinsic, &args, self.assembly.console())?;
                if *returns_value {
                    self.push(result);
                }
                Ok(None)
            }
        }
    }

    /// Run until the method returns or calls a managed method
    fn run(&mut self) -> RuntimeResult<Exit<'a>> {
        loop {
            let byte = self.read_u8()?;
            let op = OpCode::from_u8(byte)
                .ok_or_else(|| RuntimeError::invalid(format!("unknown opcode {:#04x}", byte)))?;

            match op {
                OpCode::Nop => {}
                OpCode::LdcI4 => {
                    let n = self.read_u32()? as i32;
                    self.push(Value::Int(n));
                }
                OpCode::LdStr => {
                    let index = self.read_u32()? as usize;
                    let s = self
                        .assembly
                        .string(index)
                        .ok_or_else(|| RuntimeError::invalid("string index out of range"))?;
                    self.push(Value::Str(s));
                }
                OpCode::LdNull => self.push(Value::Null),
                OpCode::LdTrue => self.push(Value::Bool(true)),
                OpCode::LdFalse => self.push(Value::Bool(false)),
                OpCode::LdArg => {
                    let index = self.read_u16()? as usize;
                    let value = self
                        .args
                        .get(index)
                        .cloned()
                        .ok_or_else(|| RuntimeError::invalid("argument index out of range"))?;
                    self.push(value);
                }
                OpCode::StArg => {
                    let index = self.read_u16()? as usize;
                    let value = self.pop()?;
                    let slot = self
                        .args
                        .get_mut(index)
                        .ok_or_else(|| RuntimeError::invalid("argument index out of range"))?;
                    *slot = value;
                }
                OpCode::LdLoc => {
                    let index = self.read_u16()? as usize;
                    let value = self
                        .locals
                        .get(index)
                        .cloned()
                        .ok_or_else(|| RuntimeError::invalid("local index out of range"))?;
                    self.push(value);
                }
                OpCode::StLoc => {
                    let index = self.read_u16()? as usize;
                    let value = self.pop()?;
                    let slot = self
                        .locals
                        .get_mut(index)
                        .ok_or_else(|| RuntimeError::invalid("local index out of range"))?;
                    *slot = value;
                }
                OpCode::LdSFld => {
                    let token = LocalToken::decode(self.read_u32()?);
                    let value = self.load_static(token)?;
                    self.push(value);
                }
                OpCode::StSFld => {
                    let token = LocalToken::decode(self.read_u32()?);
                    let value = self.pop()?;
                    self.store_static(token, value)?;
                }
                OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::Rem
                | OpCode::Shl
                | OpCode::Shr
                | OpCode::Clt
                | OpCode::Cle
                | OpCode::Cgt
                | OpCode::Cge => self.int_binary(op)?,
                OpCode::And | OpCode::Or | OpCode::Xor => self.logical_binary(op)?,
                OpCode::Neg => {
                    let n = self.pop_int()?;
                    self.push(Value::Int(n.wrapping_neg()));
                }
                OpCode::BitNot => {
                    let n = self.pop_int()?;
                    self.push(Value::Int(!n));
                }
                OpCode::Not => {
                    let b = self.pop_bool()?;
                    self.push(Value::Bool(!b));
                }
                OpCode::Ceq | OpCode::Cne => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let equal = left == right;
                    self.push(Value::Bool(if op == OpCode::Ceq { equal } else { !equal }));
                }
                OpCode::Concat => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.push(Value::from(format!("{}{}", left, right)));
                }
                OpCode::Br => {
                    let target = self.read_u32()?;
                    self.jump(target)?;
                }
                OpCode::BrTrue | OpCode::BrFalse => {
                    let target = self.read_u32()?;
                    let cond = self.pop_bool()?;
                    if cond == (op == OpCode::BrTrue) {
                        self.jump(target)?;
                    }
                }
                OpCode::Call => {
                    let token = self.read_u32()?;
                    if let Some(exit) = self.invoke(token)? {
                        return Ok(exit);
                    }
                }
                OpCode::Ret => {
                    let value = if self.method.ret == TypeSig::Void {
                        Value::Null
                    } else {
                        self.pop()?
                    };
                    return Ok(Exit::Return(value));
                }
                OpCode::Pop => {
                    self.pop()?;
                }
                OpCode::Dup => {
                    let top = self
                        .stack
                        .last()
                        .cloned()
                        .ok_or_else(|| RuntimeError::invalid("evaluation stack underflow"))?;
                    self.push(top);
                }
                OpCode::NewArr => {
                    let element = match self.read_u8()? {
                        1 => TypeSig::Bool,
                        2 => TypeSig::Int32,
                        3 => TypeSig::String,
                        _ => TypeSig::Object,
                    };
                    let length = self.pop_int()?;
                    if length < 0 {
                        return Err(RuntimeError::Overflow);
                    }
                    self.push(Value::Array(ArrayRef::new(element, length as usize)));
                }
                OpCode::LdElem => {
                    let index = self.pop_int()?;
                    let array = self.pop_array()?;
                    let value = usize::try_from(index)
                        .ok()
                        .and_then(|i| array.get(i))
                        .ok_or(RuntimeError::IndexOutOfRange {
                            index,
                            length: array.len(),
                        })?;
                    self.push(value);
                }
                OpCode::StElem => {
                    let value = self.pop()?;
                    let index = self.pop_int()?;
                    let array = self.pop_array()?;
                    let stored = usize::try_from(index).is_ok_and(|i| array.set(i, value));
                    if !stored {
                        return Err(RuntimeError::IndexOutOfRange {
                            index,
                            length: array.len(),
                        });
                    }
                }
                OpCode::LdLen => {
                    let length = match self.pop()? {
                        Value::Array(array) => array.len(),
                        Value::Str(s) => s.encode_utf16().count(),
                        Value::Null => return Err(RuntimeError::NullReference),
                        _ => return Err(RuntimeError::invalid("ldlen on a non-array value")),
                    };
                    self.push(Value::Int(length as i32));
                }
                OpCode::LdFld | OpCode::StFld => {
                    // Instance fields need an object receiver; no value in
                    // this machine is an object, so only the null check applies.
                    self.read_u32()?;
                    if op == OpCode::StFld {
                        self.pop()?;
                    }
                    if self.pop()?.is_null() {
                        return Err(RuntimeError::NullReference);
                    }
                    return Err(RuntimeError::invalid("field access on a non-object value"));
                }
            }
        }
    }
}
