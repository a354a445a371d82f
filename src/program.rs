//! Compiled program representation.
//!
//! Programs are immutable after compilation and shared by reference between
//! every frame executing them. Construction verifies the bytecode invariants
//! (register bounds, constant bounds, branch alignment), so the interpreter
//! can trust the stream it dispatches over.

use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use itertools::Itertools;

use crate::asm::{OpcodeRepr, OperandKind};
use crate::consts::MAX_REGISTERS;
use crate::error::PanicReason;
use crate::scalar::Scalar;

#[derive(Debug, Clone)]
/// One loop of a subroutine, as seen by the cross-frame loop handler.
pub struct LoopSpec {
    /// Loop label, when the source labelled it.
    pub label: Option<Rc<str>>,
    /// Code offsets covered by the loop, including its increment step.
    pub span: Range<usize>,
    /// REDO target: first opcode of the body.
    pub head: usize,
    /// NEXT target: the increment step (or the condition re-check).
    pub incr: usize,
    /// LAST target: first opcode after the loop.
    pub exit: usize,
}

impl LoopSpec {
    fn matches(&self, label: Option<&str>) -> bool {
        match label {
            None => true,
            Some(l) => self.label.as_deref() == Some(l),
        }
    }
}

#[derive(Debug, Clone)]
/// Subroutine metadata: entry offset plus the loop table.
pub struct SubSpec {
    /// Symbol the front-end declared.
    pub name: Rc<str>,
    /// Offset of the first opcode.
    pub entry: usize,
    /// Loops owned by this subroutine, used when a propagated marker needs a
    /// handler at one of its call sites.
    pub loops: Vec<LoopSpec>,
}

impl SubSpec {
    /// Innermost loop containing `pc` that matches `label`.
    pub fn loop_at(&self, pc: usize, label: Option<&str>) -> Option<&LoopSpec> {
        self.loops
            .iter()
            .filter(|l| l.span.contains(&pc) && l.matches(label))
            .max_by_key(|l| l.span.start)
    }
}

#[derive(Debug, Clone)]
/// A verified bytecode program.
pub struct Program {
    code: Vec<i32>,
    constants: Vec<Scalar>,
    register_count: usize,
    branch_targets: Vec<usize>,
    subs: Vec<SubSpec>,
    index: HashMap<Rc<str>, usize>,
}

impl Program {
    /// Assemble and verify a program.
    pub fn new(
        code: Vec<i32>,
        constants: Vec<Scalar>,
        register_count: usize,
        subs: Vec<SubSpec>,
    ) -> Result<Self, PanicReason> {
        let index = subs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();

        let mut program = Self {
            code,
            constants,
            register_count,
            branch_targets: vec![],
            subs,
            index,
        };
        program.verify()?;
        Ok(program)
    }

    /// The bytecode stream.
    pub fn code(&self) -> &[i32] {
        &self.code
    }

    /// The constant pool.
    pub fn constants(&self) -> &[Scalar] {
        &self.constants
    }

    /// Number of registers a frame must provide.
    pub const fn register_count(&self) -> usize {
        self.register_count
    }

    /// Every branch target in the program, sorted and deduplicated.
    pub fn branch_targets(&self) -> &[usize] {
        &self.branch_targets
    }

    /// The subroutine table.
    pub fn subs(&self) -> &[SubSpec] {
        &self.subs
    }

    /// Table index of a subroutine by name.
    pub fn sub_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Walk the stream, checking every invariant of §3: operands decode,
    /// register/constant/subroutine indices are in range, branches land on
    /// opcode starts.
    fn verify(&mut self) -> Result<(), PanicReason> {
        if self.register_count > MAX_REGISTERS {
            return Err(PanicReason::RegisterFileTooLarge);
        }

        let mut starts = vec![false; self.code.len()];
        let mut targets = vec![];
        let mut pc = 0;

        while pc < self.code.len() {
            starts[pc] = true;
            let op = OpcodeRepr::decode(self.code[pc]).ok_or(PanicReason::InvalidOpcode)?;
            let layout = op.layout();
            let mut cursor = pc + 1;

            for kind in layout.fixed {
                let slot = *self
                    .code
                    .get(cursor)
                    .ok_or(PanicReason::TruncatedInstruction)?;
                self.check_operand(*kind, slot, &mut targets)?;
                cursor += 1;
            }

            if layout.arg_list {
                let argc = *self
                    .code
                    .get(cursor)
                    .ok_or(PanicReason::TruncatedInstruction)?;
                if argc < 0 {
                    return Err(PanicReason::TruncatedInstruction);
                }
                cursor += 1;
                for _ in 0..argc {
                    let slot = *self
                        .code
                        .get(cursor)
                        .ok_or(PanicReason::TruncatedInstruction)?;
                    self.check_operand(OperandKind::Reg, slot, &mut targets)?;
                    cursor += 1;
                }
            }

            pc = cursor;
        }

        for spec in &self.subs {
            targets.push(spec.entry);
            for l in &spec.loops {
                targets.extend([l.head, l.incr, l.exit, l.span.start]);
            }
        }

        for target in &targets {
            if !starts.get(*target).copied().unwrap_or(false) {
                return Err(PanicReason::InvalidBranchTarget);
            }
        }

        self.branch_targets = targets.into_iter().sorted().dedup().collect();
        Ok(())
    }

    fn check_operand(
        &self,
        kind: OperandKind,
        slot: i32,
        targets: &mut Vec<usize>,
    ) -> Result<(), PanicReason> {
        match kind {
            OperandKind::Imm => (),
            OperandKind::Reg => {
                if slot < 0 || slot as usize >= self.register_count {
                    return Err(PanicReason::RegisterOutOfRange);
                }
            }
            OperandKind::Const => {
                if slot < 0 || slot as usize >= self.constants.len() {
                    return Err(PanicReason::ConstantOutOfRange);
                }
            }
            OperandKind::OptConst => {
                if slot != -1 && (slot < 0 || slot as usize >= self.constants.len()) {
                    return Err(PanicReason::ConstantOutOfRange);
                }
            }
            OperandKind::Branch => {
                if slot < 0 || slot as usize >= self.code.len() {
                    return Err(PanicReason::InvalidBranchTarget);
                }
                targets.push(slot as usize);
            }
            OperandKind::Sub => {
                if slot < 0 || slot as usize >= self.subs.len() {
                    return Err(PanicReason::UnknownSubroutine);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Opcode;

    fn assemble(ops: &[Opcode]) -> Vec<i32> {
        let mut code = vec![];
        for op in ops {
            op.encode(&mut code);
        }
        code
    }

    fn main_sub(entry: usize) -> Vec<SubSpec> {
        vec![SubSpec {
            name: "main".into(),
            entry,
            loops: vec![],
        }]
    }

    #[test]
    fn accepts_well_formed_programs() {
        let code = assemble(&[
            Opcode::LOADI(0, 7),
            Opcode::ADDAI(0, 1),
            Opcode::RET(0),
        ]);
        let program = Program::new(code, vec![], 1, main_sub(0)).unwrap();
        assert_eq!(program.register_count(), 1);
    }

    #[test]
    fn rejects_register_out_of_range() {
        let code = assemble(&[Opcode::LOADI(3, 7), Opcode::RET(3)]);
        let err = Program::new(code, vec![], 2, main_sub(0)).unwrap_err();
        assert_eq!(err, PanicReason::RegisterOutOfRange);
    }

    #[test]
    fn rejects_branch_into_operand() {
        // JMP lands in the middle of LOADI's operands.
        let code = assemble(&[Opcode::JMP(3), Opcode::LOADI(0, 1), Opcode::RET(0)]);
        let err = Program::new(code, vec![], 1, main_sub(0)).unwrap_err();
        assert_eq!(err, PanicReason::InvalidBranchTarget);
    }

    #[test]
    fn rejects_unknown_opcode() {
        let err = Program::new(vec![0x7f], vec![], 1, main_sub(0)).unwrap_err();
        assert_eq!(err, PanicReason::InvalidOpcode);
    }

    #[test]
    fn rejects_constant_out_of_range() {
        let code = assemble(&[Opcode::LOADC(0, 2), Opcode::RET(0)]);
        let err = Program::new(code, vec![Scalar::Int(1)], 1, main_sub(0)).unwrap_err();
        assert_eq!(err, PanicReason::ConstantOutOfRange);
    }
}
