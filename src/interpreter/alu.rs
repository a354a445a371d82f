//! Arithmetic, comparison and string opcode helpers.
//!
//! Each helper decodes one operand shape and applies a primitive from
//! [`crate::scalar::ops`]. Exceptions raised by a primitive surface as
//! recoverable interpreter errors.

use crate::error::{InterpreterError, PerlException};
use crate::scalar::ops::OpResult;
use crate::scalar::Scalar;
use crate::state::ExecuteState;

use super::executor::{reg, slot};
use super::{Frame, Interpreter};

impl Interpreter {
    /// `op rd, rs, rt`
    pub(crate) fn binop(
        &mut self,
        frame: &mut Frame,
        code: &[i32],
        f: fn(&Scalar, &Scalar) -> OpResult,
    ) -> Result<ExecuteState, InterpreterError> {
        let rd = reg(code, frame.pc + 1)?;
        let rs = reg(code, frame.pc + 2)?;
        let rt = reg(code, frame.pc + 3)?;

        let value = f(frame.get(rs)?, frame.get(rt)?)?;
        frame.set(rd, value)?;

        frame.pc += 4;
        Ok(ExecuteState::Proceed)
    }

    /// `op rd, rs, K`
    pub(crate) fn binop_imm(
        &mut self,
        frame: &mut Frame,
        code: &[i32],
        f: fn(&Scalar, &Scalar) -> OpResult,
    ) -> Result<ExecuteState, InterpreterError> {
        let rd = reg(code, frame.pc + 1)?;
        let rs = reg(code, frame.pc + 2)?;
        let k = slot(code, frame.pc + 3)?;

        let value = f(frame.get(rs)?, &Scalar::Int(k as i64))?;
        frame.set(rd, value)?;

        frame.pc += 4;
        Ok(ExecuteState::Proceed)
    }

    /// `op rs, rt` — in-place superinstruction.
    pub(crate) fn assign_op(
        &mut self,
        frame: &mut Frame,
        code: &[i32],
        f: fn(&mut Scalar, &Scalar) -> Result<(), PerlException>,
    ) -> Result<ExecuteState, InterpreterError> {
        let rs = reg(code, frame.pc + 1)?;
        let rt = reg(code, frame.pc + 2)?;

        // rs and rt may alias; snapshot the right-hand side first.
        let rhs = frame.get(rt)?.clone();
        f(frame.get_mut(rs)?, &rhs)?;

        frame.pc += 3;
        Ok(ExecuteState::Proceed)
    }

    /// `op rs, K` — in-place superinstruction with immediate.
    pub(crate) fn assign_imm(
        &mut self,
        frame: &mut Frame,
        code: &[i32],
        f: fn(&mut Scalar, &Scalar) -> Result<(), PerlException>,
    ) -> Result<ExecuteState, InterpreterError> {
        let rs = reg(code, frame.pc + 1)?;
        let k = slot(code, frame.pc + 2)?;

        f(frame.get_mut(rs)?, &Scalar::Int(k as i64))?;

        frame.pc += 3;
        Ok(ExecuteState::Proceed)
    }

    /// `op rd, rs`
    pub(crate) fn unop(
        &mut self,
        frame: &mut Frame,
        code: &[i32],
        f: impl FnOnce(&Scalar) -> OpResult,
    ) -> Result<ExecuteState, InterpreterError> {
        let rd = reg(code, frame.pc + 1)?;
        let rs = reg(code, frame.pc + 2)?;

        let value = f(frame.get(rs)?)?;
        frame.set(rd, value)?;

        frame.pc += 3;
        Ok(ExecuteState::Proceed)
    }

    /// `op r` — in-place unary mutation (`++`/`--`).
    pub(crate) fn mutate(
        &mut self,
        frame: &mut Frame,
        code: &[i32],
        f: fn(&mut Scalar) -> Result<(), PerlException>,
    ) -> Result<ExecuteState, InterpreterError> {
        let r = reg(code, frame.pc + 1)?;

        f(frame.get_mut(r)?)?;

        frame.pc += 2;
        Ok(ExecuteState::Proceed)
    }
}
