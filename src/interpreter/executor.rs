//! Dispatch loop.

use std::rc::Rc;

use tracing::trace;

use crate::asm::{OpcodeRepr, RegisterId};
use crate::error::{InterpreterError, PanicReason};
use crate::program::Program;
use crate::scalar::{convert, ops, Scalar};
use crate::state::{ExecuteState, FrameOutcome};

use super::{Frame, Interpreter};

pub(crate) fn slot(code: &[i32], at: usize) -> Result<i32, PanicReason> {
    code.get(at).copied().ok_or(PanicReason::TruncatedInstruction)
}

pub(crate) fn reg(code: &[i32], at: usize) -> Result<RegisterId, PanicReason> {
    usize::try_from(slot(code, at)?).map_err(|_| PanicReason::RegisterOutOfRange)
}

pub(crate) fn branch(code: &[i32], at: usize) -> Result<usize, PanicReason> {
    usize::try_from(slot(code, at)?).map_err(|_| PanicReason::InvalidBranchTarget)
}

pub(crate) fn sub_index(code: &[i32], at: usize) -> Result<usize, PanicReason> {
    usize::try_from(slot(code, at)?).map_err(|_| PanicReason::UnknownSubroutine)
}

impl Interpreter {
    /// Execute one subroutine in a fresh frame until it returns a scalar or
    /// a control-flow marker. The `Tail` state is the trampoline: the frame
    /// is reused in place, so tail chains of any depth cost no native stack.
    pub(crate) fn run_frame(
        &mut self,
        sub: usize,
        args: Vec<Scalar>,
    ) -> Result<FrameOutcome, InterpreterError> {
        let program = Rc::clone(&self.program);
        let entry = program
            .subs()
            .get(sub)
            .ok_or(PanicReason::UnknownSubroutine)?
            .entry;
        let mut frame = Frame::new(program.register_count(), sub, entry, args);

        loop {
            match self.step(&program, &mut frame)? {
                ExecuteState::Proceed => (),
                ExecuteState::Return(value) => return Ok(FrameOutcome::Return(value)),
                ExecuteState::Marker(marker) => return Ok(FrameOutcome::Marker(marker)),
                ExecuteState::Tail { sub, args } => {
                    let entry = program
                        .subs()
                        .get(sub)
                        .ok_or(PanicReason::UnknownSubroutine)?
                        .entry;
                    trace!(sub, "trampoline");
                    frame.reset_for_tail(sub, entry, args);
                }
            }
        }
    }

    fn step(
        &mut self,
        program: &Program,
        frame: &mut Frame,
    ) -> Result<ExecuteState, InterpreterError> {
        use OpcodeRepr::*;

        let code = program.code();
        let op = OpcodeRepr::decode(slot(code, frame.pc)?).ok_or(PanicReason::InvalidOpcode)?;

        match op {
            NOOP => {
                frame.pc += 1;
                Ok(ExecuteState::Proceed)
            }

            LOADI => {
                let rd = reg(code, frame.pc + 1)?;
                let k = slot(code, frame.pc + 2)?;
                frame.set(rd, Scalar::Int(k as i64))?;
                frame.pc += 3;
                Ok(ExecuteState::Proceed)
            }

            LOADC => {
                let rd = reg(code, frame.pc + 1)?;
                let idx = usize::try_from(slot(code, frame.pc + 2)?)
                    .map_err(|_| PanicReason::ConstantOutOfRange)?;
                let value = program
                    .constants()
                    .get(idx)
                    .ok_or(PanicReason::ConstantOutOfRange)?
                    .clone();
                frame.set(rd, value)?;
                frame.pc += 3;
                Ok(ExecuteState::Proceed)
            }

            MOVE => self.unop(frame, code, |a| Ok(a.clone())),

            ADD => self.binop(frame, code, ops::add),
            SUB => self.binop(frame, code, ops::subtract),
            MUL => self.binop(frame, code, ops::multiply),
            DIV => self.binop(frame, code, ops::divide),
            MOD => self.binop(frame, code, ops::modulus),
            NEG => self.unop(frame, code, ops::negate),

            ADDI => self.binop_imm(frame, code, ops::add),
            SUBI => self.binop_imm(frame, code, ops::subtract),
            MULI => self.binop_imm(frame, code, ops::multiply),
            DIVI => self.binop_imm(frame, code, ops::divide),
            MODI => self.binop_imm(frame, code, ops::modulus),

            ADDA => self.assign_op(frame, code, ops::add_assign),
            SUBA => self.assign_op(frame, code, ops::sub_assign),
            MULA => self.assign_op(frame, code, ops::mul_assign),
            DIVA => self.assign_op(frame, code, ops::div_assign),
            MODA => self.assign_op(frame, code, ops::mod_assign),
            CONCATA => self.assign_op(frame, code, ops::concat_assign),

            ADDAI => self.assign_imm(frame, code, ops::add_assign),
            SUBAI => self.assign_imm(frame, code, ops::sub_assign),
            MULAI => self.assign_imm(frame, code, ops::mul_assign),
            DIVAI => self.assign_imm(frame, code, ops::div_assign),
            MODAI => self.assign_imm(frame, code, ops::mod_assign),

            INC => self.mutate(frame, code, ops::increment),
            DEC => self.mutate(frame, code, ops::decrement),

            LT => self.binop(frame, code, ops::lt),
            LE => self.binop(frame, code, ops::le),
            GT => self.binop(frame, code, ops::gt),
            GE => self.binop(frame, code, ops::ge),
            EQ => self.binop(frame, code, ops::eq),
            NE => self.binop(frame, code, ops::ne),
            CMP => self.binop(frame, code, ops::cmp),

            SLT => self.binop(frame, code, ops::slt),
            SLE => self.binop(frame, code, ops::sle),
            SGT => self.binop(frame, code, ops::sgt),
            SGE => self.binop(frame, code, ops::sge),
            SEQ => self.binop(frame, code, ops::seq),
            SNE => self.binop(frame, code, ops::sne),
            SCMP => self.binop(frame, code, ops::scmp),

            CONCAT => self.binop(frame, code, ops::concat),
            REPEAT => self.binop(frame, code, ops::repeat),
            STRLEN => self.unop(frame, code, |a| Ok(ops::length(a))),

            TOBOOL => self.unop(frame, code, |a| Ok(ops::to_bool(a))),
            NOT => self.unop(frame, code, |a| Ok(ops::not(a))),

            JMP => {
                frame.pc = branch(code, frame.pc + 1)?;
                Ok(ExecuteState::Proceed)
            }

            JMPT => self.cond_jump(frame, code, true),
            JMPF => self.cond_jump(frame, code, false),

            RET => {
                let r = reg(code, frame.pc + 1)?;
                Ok(ExecuteState::Return(frame.get(r)?.clone()))
            }

            CALL => self.call(program, frame, code),
            TCALL => self.tail_call(frame, code),
            CALLR => self.call_ref(program, frame, code),

            MARKLAST => self.mark(program, frame, code, crate::state::MarkerKind::Last),
            MARKNEXT => self.mark(program, frame, code, crate::state::MarkerKind::Next),
            MARKREDO => self.mark(program, frame, code, crate::state::MarkerKind::Redo),

            PRINT => self.print(frame, code),
        }
    }

    fn cond_jump(
        &mut self,
        frame: &mut Frame,
        code: &[i32],
        when: bool,
    ) -> Result<ExecuteState, InterpreterError> {
        let r = reg(code, frame.pc + 1)?;
        let target = branch(code, frame.pc + 2)?;
        if convert::to_boolean(frame.get(r)?) == when {
            frame.pc = target;
        } else {
            frame.pc += 3;
        }
        Ok(ExecuteState::Proceed)
    }
}
