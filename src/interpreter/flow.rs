//! Calls, markers and the caller check.

use crate::consts::MAX_CALL_DEPTH;
use crate::error::{InterpreterError, PanicReason, PerlException};
use crate::program::Program;
use crate::scalar::{convert, Scalar};
use crate::state::{ControlMarker, ExecuteState, FrameOutcome, MarkerKind};

use super::executor::{reg, slot, sub_index};
use super::{Frame, Interpreter};

impl Interpreter {
    /// `CALL rd, #sub, argc, args…`
    ///
    /// The call site check: a returned marker is dispatched to the innermost
    /// matching loop of this frame, or re-emitted as this frame's result; an
    /// ordinary scalar lands in the destination register.
    pub(crate) fn call(
        &mut self,
        program: &Program,
        frame: &mut Frame,
        code: &[i32],
    ) -> Result<ExecuteState, InterpreterError> {
        let call_site = frame.pc;
        let rd = reg(code, frame.pc + 1)?;
        let sub = sub_index(code, frame.pc + 2)?;
        let (args, next_pc) = read_args(frame, code, frame.pc + 3)?;

        let outcome = self.enter(sub, args)?;
        self.absorb(program, frame, call_site, next_pc, rd, outcome)
    }

    /// `CALLR rd, rf, argc, args…`
    pub(crate) fn call_ref(
        &mut self,
        program: &Program,
        frame: &mut Frame,
        code: &[i32],
    ) -> Result<ExecuteState, InterpreterError> {
        let call_site = frame.pc;
        let rd = reg(code, frame.pc + 1)?;
        let rf = reg(code, frame.pc + 2)?;
        let (args, next_pc) = read_args(frame, code, frame.pc + 3)?;

        let sub = match frame.get(rf)?.unbless() {
            Scalar::Code(c) => program.sub_index(&c.name).ok_or_else(|| {
                PerlException::new(format!("Undefined subroutine &main::{} called", c.name))
            })?,
            _ => return Err(PerlException::new("Not a CODE reference").into()),
        };

        let outcome = self.enter(sub, args)?;
        self.absorb(program, frame, call_site, next_pc, rd, outcome)
    }

    /// `TCALL #sub, argc, args…`
    ///
    /// Allocates the TAILCALL intent and hands it to the frame loop; the
    /// trampoline there reuses the current frame, so the marker never
    /// escapes this frame.
    pub(crate) fn tail_call(
        &mut self,
        frame: &mut Frame,
        code: &[i32],
    ) -> Result<ExecuteState, InterpreterError> {
        let sub = sub_index(code, frame.pc + 1)?;
        let (args, _) = read_args(frame, code, frame.pc + 2)?;
        Ok(ExecuteState::Tail { sub, args })
    }

    /// `MARKLAST/-NEXT/-REDO #label?` — initiate a return carrying the
    /// marker as the frame's result.
    pub(crate) fn mark(
        &mut self,
        program: &Program,
        frame: &mut Frame,
        code: &[i32],
        kind: MarkerKind,
    ) -> Result<ExecuteState, InterpreterError> {
        let operand = slot(code, frame.pc + 1)?;
        let label = if operand < 0 {
            None
        } else {
            let constant = program
                .constants()
                .get(operand as usize)
                .ok_or(PanicReason::ConstantOutOfRange)?;
            Some(convert::to_str(constant).as_str().into())
        };

        Ok(ExecuteState::Marker(ControlMarker {
            kind,
            label,
            location: None,
        }))
    }

    /// `PRINT r`
    pub(crate) fn print(
        &mut self,
        frame: &mut Frame,
        code: &[i32],
    ) -> Result<ExecuteState, InterpreterError> {
        let r = reg(code, frame.pc + 1)?;
        let text = convert::to_str(frame.get(r)?);
        let bytes = crate::io::octets(text.as_str());

        self.output().write(&bytes)?;

        frame.pc += 2;
        Ok(ExecuteState::Proceed)
    }

    fn enter(&mut self, sub: usize, args: Vec<Scalar>) -> Result<FrameOutcome, InterpreterError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(PanicReason::CallDepthExceeded.into());
        }

        self.depth += 1;
        let outcome = self.run_frame(sub, args);
        self.depth -= 1;
        outcome
    }

    fn absorb(
        &mut self,
        program: &Program,
        frame: &mut Frame,
        call_site: usize,
        next_pc: usize,
        rd: usize,
        outcome: FrameOutcome,
    ) -> Result<ExecuteState, InterpreterError> {
        match outcome {
            FrameOutcome::Return(value) => {
                frame.set(rd, value)?;
                frame.pc = next_pc;
                Ok(ExecuteState::Proceed)
            }
            FrameOutcome::Marker(marker) => {
                let spec = program
                    .subs()
                    .get(frame.sub)
                    .ok_or(PanicReason::UnknownSubroutine)?;

                match spec.loop_at(call_site, marker.label.as_deref()) {
                    Some(l) => {
                        frame.pc = match marker.kind {
                            MarkerKind::Last => l.exit,
                            MarkerKind::Next => l.incr,
                            MarkerKind::Redo => l.head,
                        };
                        Ok(ExecuteState::Proceed)
                    }
                    None => Ok(ExecuteState::Marker(marker)),
                }
            }
        }
    }
}

fn read_args(
    frame: &Frame,
    code: &[i32],
    at: usize,
) -> Result<(Vec<Scalar>, usize), InterpreterError> {
    let argc = usize::try_from(slot(code, at)?).map_err(|_| PanicReason::TruncatedInstruction)?;

    let mut args = Vec::with_capacity(argc);
    for i in 0..argc {
        let r = reg(code, at + 1 + i)?;
        args.push(frame.get(r)?.clone());
    }

    Ok((args, at + 1 + argc))
}
