//! Two-pass assembler for method bodies
//!
//! The first pass assigns an offset to every label; the second encodes
//! instructions with branch targets resolved to body-relative offsets.

use std::collections::HashMap;

use byteorder::{LittleEndian, WriteBytesExt};
use msvm::OpCode;
use thiserror::Error;

use super::ir::{Inst, Label};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("unresolved label {0}")]
    UnresolvedLabel(Label),

    #[error("label {0} defined twice")]
    DuplicateLabel(Label),
}

/// An encoded method body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    pub code: Vec<u8>,
    pub max_stack: u16,
}

#[derive(Default)]
pub struct Assembler {
    labels: HashMap<Label, u32>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assemble(&mut self, instructions: &[Inst]) -> Result<Assembled, AssemblyError> {
        self.layout_pass(instructions)?;
        let code = self.encode_pass(instructions)?;
        Ok(Assembled {
            code,
            max_stack: max_stack(instructions),
        })
    }

    /// Pass 1: offset of each label
    fn layout_pass(&mut self, instructions: &[Inst]) -> Result<(), AssemblyError> {
        self.labels.clear();
        let mut position = 0u32;
        for inst in instructions {
            if let Inst::Label(label) = inst {
                if self.labels.insert(*label, position).is_some() {
                    return Err(AssemblyError::DuplicateLabel(*label));
                }
            }
            position += inst.size();
        }
        Ok(())
    }

    /// Pass 2: bytes
    fn encode_pass(&self, instructions: &[Inst]) -> Result<Vec<u8>, AssemblyError> {
        let mut code = Vec::new();
        for inst in instructions {
            let Some(op) = inst.opcode() else { continue };
            code.push(op as u8);
            // Writes into a Vec cannot fail
            let _ = match inst {
                Inst::LdcI4(n) => code.write_i32::<LittleEndian>(*n),
                Inst::LdStr(token) | Inst::Field(_, token) | Inst::Call { token, .. } => {
                    code.write_u32::<LittleEndian>(*token)
                }
                Inst::Slot(_, slot) => code.write_u16::<LittleEndian>(*slot),
                Inst::NewArr(tag) => code.write_u8(*tag),
                Inst::Branch(_, label) => {
                    let target = self
                        .labels
                        .get(label)
                        .copied()
                        .ok_or(AssemblyError::UnresolvedLabel(*label))?;
                    code.write_u32::<LittleEndian>(target)
                }
                Inst::Simple(_) | Inst::Label(_) => Ok(()),
            };
        }
        Ok(code)
    }
}

/// Deepest evaluation stack over the body.
///
/// Depth after an unconditional jump is taken from the branches that
/// target the next label.
fn max_stack(instructions: &[Inst]) -> u16 {
    let mut at_label: HashMap<Label, u16> = HashMap::new();
    let mut depth = 0u16;
    let mut max = 0u16;
    let mut falls_through = true;

    for inst in instructions {
        if let Inst::Label(label) = inst {
            if !falls_through {
                depth = at_label.get(label).copied().unwrap_or(0);
            }
            falls_through = true;
            continue;
        }
        let (pops, pushes) = inst.stack_effect();
        depth = depth.saturating_sub(pops);
        if let Inst::Branch(_, label) = inst {
            let entry = at_label.entry(*label).or_insert(depth);
            *entry = (*entry).max(depth);
        }
        depth += pushes;
        max = max.max(depth);
        falls_through = !inst.ends_flow();
    }
    max
}

/// Opcode for `br`-family jumps on a condition
pub fn branch_if(value: bool) -> OpCode {
    if value { OpCode::BrTrue } else { OpCode::BrFalse }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_branch_targets_resolve_to_body_offsets() {
        let program = vec![
            Inst::Label(Label(0)),
            Inst::Simple(OpCode::LdTrue),
            Inst::Branch(OpCode::BrFalse, Label(1)),
            Inst::Branch(OpCode::Br, Label(0)),
            Inst::Label(Label(1)),
            Inst::Simple(OpCode::Ret),
        ];
        let assembled = Assembler::new().assemble(&program).unwrap();
        assert_eq!(
            assembled.code,
            vec![0x04, 0x32, 11, 0, 0, 0, 0x30, 0, 0, 0, 0, 0x24]
        );
        assert_eq!(assembled.max_stack, 1);
    }

    #[test]
    fn test_short_circuit_depth() {
        // a && b
        let program = vec![
            Inst::Simple(OpCode::LdTrue),
            Inst::Branch(OpCode::BrFalse, Label(0)),
            Inst::Simple(OpCode::LdFalse),
            Inst::Branch(OpCode::Br, Label(1)),
            Inst::Label(Label(0)),
            Inst::Simple(OpCode::LdFalse),
            Inst::Label(Label(1)),
            Inst::Simple(OpCode::Pop),
            Inst::Simple(OpCode::Ret),
        ];
        assert_eq!(max_stack(&program), 1);
    }

    #[test]
    fn test_errors() {
        let unresolved = vec![Inst::Branch(OpCode::Br, Label(7))];
        assert_eq!(
            Assembler::new().assemble(&unresolved),
            Err(AssemblyError::UnresolvedLabel(Label(7)))
        );
        let duplicate = vec![Inst::Label(Label(1)), Inst::Label(Label(1))];
        assert_eq!(
            Assembler::new().assemble(&duplicate),
            Err(AssemblyError::DuplicateLabel(Label(1)))
        );
    }
}
