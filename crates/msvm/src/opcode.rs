//! Bytecode instruction set
//!
//! The machine is stack based. Operands follow the opcode byte,
//! little-endian. Branch targets are offsets from the start of the
//! method body.

use std::fmt;

macro_rules! opcodes {
    ($($name:ident = $code:literal, $operand:expr, $mnemonic:literal;)*) => {
        /// Instruction opcode
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum OpCode {
            $($name = $code,)*
        }

        impl OpCode {
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $($code => Some(OpCode::$name),)*
                    _ => None,
                }
            }

            /// Size of the inline operand in bytes
            pub fn operand_size(self) -> usize {
                match self {
                    $(OpCode::$name => $operand,)*
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(OpCode::$name => $mnemonic,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, 0, "nop";
    LdcI4 = 0x01, 4, "ldc.i4";
    LdStr = 0x02, 4, "ldstr";
    LdNull = 0x03, 0, "ldnull";
    LdTrue = 0x04, 0, "ldc.true";
    LdFalse = 0x05, 0, "ldc.false";
    LdArg = 0x06, 2, "ldarg";
    StArg = 0x07, 2, "starg";
    LdLoc = 0x08, 2, "ldloc";
    StLoc = 0x09, 2, "stloc";
    LdSFld = 0x0A, 4, "ldsfld";
    StSFld = 0x0B, 4, "stsfld";
    LdFld = 0x0C, 4, "ldfld";
    StFld = 0x0D, 4, "stfld";
    Add = 0x10, 0, "add";
    Sub = 0x11, 0, "sub";
    Mul = 0x12, 0, "mul";
    Div = 0x13, 0, "div";
    Rem = 0x14, 0, "rem";
    Neg = 0x15, 0, "neg";
    Not = 0x16, 0, "not";
    BitNot = 0x17, 0, "bitnot";
    And = 0x18, 0, "and";
    Or = 0x19, 0, "or";
    Xor = 0x1A, 0, "xor";
    Shl = 0x1B, 0, "shl";
    Shr = 0x1C, 0, "shr";
    Ceq = 0x1D, 0, "ceq";
    Cne = 0x1E, 0, "cne";
    Clt = 0x1F, 0, "clt";
    Cle = 0x20, 0, "cle";
    Cgt = 0x21, 0, "cgt";
    Cge = 0x22, 0, "cge";
    Concat = 0x23, 0, "concat";
    Ret = 0x24, 0, "ret";
    Br = 0x30, 4, "br";
    BrTrue = 0x31, 4, "brtrue";
    BrFalse = 0x32, 4, "brfalse";
    Call = 0x38, 4, "call";
    Pop = 0x39, 0, "pop";
    Dup = 0x3A, 0, "dup";
    NewArr = 0x40, 1, "newarr";
    LdElem = 0x41, 0, "ldelem";
    StElem = 0x42, 0, "stelem";
    LdLen = 0x43, 0, "ldlen";
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip() {
        for byte in 0..=u8::MAX {
            if let Some(op) = OpCode::from_u8(byte) {
                assert_eq!(op as u8, byte);
            }
        }
        assert_eq!(OpCode::from_u8(0xFF), None);
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(OpCode::LdcI4.operand_size(), 4);
        assert_eq!(OpCode::LdLoc.operand_size(), 2);
        assert_eq!(OpCode::NewArr.operand_size(), 1);
        assert_eq!(OpCode::Ret.operand_size(), 0);
        assert_eq!(OpCode::Call.to_string(), "call");
    }
}
