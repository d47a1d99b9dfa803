//! Instruction list produced by lowering, before label resolution

use std::fmt;

use msvm::OpCode;

/// A branch target inside one method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".L{}", self.0)
    }
}

/// One instruction; labels are pseudo-instructions that emit no bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    Label(Label),

    /// Opcode without an operand
    Simple(OpCode),

    LdcI4(i32),

    /// String heap index
    LdStr(u32),

    /// ldarg/starg/ldloc/stloc with a slot index
    Slot(OpCode, u16),

    /// ldsfld/stsfld/ldfld/stfld with a field token
    Field(OpCode, u32),

    Call {
        token: u32,
        /// Values popped, receiver included
        args: u16,
        returns: bool,
    },

    /// Element type tag
    NewArr(u8),

    /// br/brtrue/brfalse
    Branch(OpCode, Label),
}

impl Inst {
    pub fn opcode(&self) -> Option<OpCode> {
        Some(match self {
            Inst::Label(_) => return None,
            Inst::Simple(op) | Inst::Slot(op, _) | Inst::Field(op, _) | Inst::Branch(op, _) => *op,
            Inst::LdcI4(_) => OpCode::LdcI4,
            Inst::LdStr(_) => OpCode::LdStr,
            Inst::Call { .. } => OpCode::Call,
            Inst::NewArr(_) => OpCode::NewArr,
        })
    }

    /// Encoded size in bytes
    pub fn size(&self) -> u32 {
        self.opcode().map_or(0, |op| 1 + op.operand_size() as u32)
    }

    /// Values popped and pushed on the evaluation stack
    pub fn stack_effect(&self) -> (u16, u16) {
        let Some(op) = self.opcode() else {
            return (0, 0);
        };
        if let Inst::Call { args, returns, .. } = self {
            return (*args, u16::from(*returns));
        }
        match op {
            OpCode::Nop | OpCode::Br | OpCode::Ret => (0, 0),
            OpCode::LdcI4
            | OpCode::LdStr
            | OpCode::LdNull
            | OpCode::LdTrue
            | OpCode::LdFalse
            | OpCode::LdArg
            | OpCode::LdLoc
            | OpCode::LdSFld => (0, 1),
            OpCode::StArg | OpCode::StLoc | OpCode::StSFld | OpCode::Pop => (1, 0),
            OpCode::BrTrue | OpCode::BrFalse => (1, 0),
            OpCode::LdFld | OpCode::Neg | OpCode::Not | OpCode::BitNot | OpCode::LdLen | OpCode::NewArr => (1, 1),
            OpCode::StFld => (2, 0),
            OpCode::Dup => (1, 2),
            OpCode::LdElem => (2, 1),
            OpCode::StElem => (3, 0),
            OpCode::Call => (0, 0),
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::Ceq
            | OpCode::Cne
            | OpCode::Clt
            | OpCode::Cle
            | OpCode::Cgt
            | OpCode::Cge
            | OpCode::Concat => (2, 1),
        }
    }

    /// Whether control never falls through to the next instruction
    pub fn ends_flow(&self) -> bool {
        matches!(self, Inst::Simple(OpCode::Ret) | Inst::Branch(OpCode::Br, _))
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Label(label) => write!(f, "{}:", label),
            Inst::Simple(op) => write!(f, "    {}", op),
            Inst::LdcI4(n) => write!(f, "    ldc.i4 {}", n),
            Inst::LdStr(index) => write!(f, "    ldstr #{}", index),
            Inst::Slot(op, slot) => write!(f, "    {} {}", op, slot),
            Inst::Field(op, token) => write!(f, "    {} {:#010x}", op, token),
            Inst::Call { token, .. } => write!(f, "    call {:#010x}", token),
            Inst::NewArr(tag) => write!(f, "    newarr {}", tag),
            Inst::Branch(op, label) => write!(f, "    {} {}", op, label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(Inst::Label(Label(0)).size(), 0);
        assert_eq!(Inst::LdcI4(42).size(), 5);
        assert_eq!(Inst::Slot(OpCode::LdLoc, 1).size(), 3);
        assert_eq!(Inst::Simple(OpCode::Ret).size(), 1);
        assert_eq!(Inst::NewArr(2).size(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(Inst::Branch(OpCode::BrFalse, Label(3)).to_string(), "    brfalse .L3");
        assert_eq!(Inst::Label(Label(3)).to_string(), ".L3:");
    }
}
