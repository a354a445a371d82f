//! [`Interpreter`] implementation
//!
//! Executes verified [`Program`]s one frame at a time. The dispatch loop is
//! a tight decode-and-match over the `i32` stream; non-tail calls recurse on
//! the native stack (bounded by [`crate::consts::MAX_CALL_DEPTH`]), tail
//! calls reuse the current frame through the trampoline in the frame loop.

use std::rc::Rc;

use tracing::debug;

use crate::error::{InterpreterError, PanicReason, PerlException};
use crate::io::{IoHandle, LayeredHandle, StandardStream};
use crate::program::Program;
use crate::scalar::Scalar;
use crate::state::FrameOutcome;

mod alu;
mod executor;
mod flow;
mod frame;

pub(crate) use frame::Frame;

/// VM interpreter.
///
/// Single-threaded per invocation: a program executes to completion on the
/// caller's thread. Multiple interpreters may run concurrently on different
/// threads, each owning its register files and handles.
pub struct Interpreter {
    program: Rc<Program>,
    depth: usize,
    out: Option<Box<dyn IoHandle>>,
}

impl Interpreter {
    /// Create an interpreter over a compiled program.
    pub fn new(program: Rc<Program>) -> Self {
        Self {
            program,
            depth: 0,
            out: None,
        }
    }

    /// Replace the output handle `PRINT` writes to.
    pub fn with_output(mut self, handle: Box<dyn IoHandle>) -> Self {
        self.out = Some(handle);
        self
    }

    /// The program under execution.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Run a subroutine by name with the given arguments and return its
    /// scalar result.
    ///
    /// A control-flow marker escaping the outermost frame is a scripting
    /// error, reported the way Perl reports it.
    pub fn run(&mut self, sub: &str, args: &[Scalar]) -> Result<Scalar, InterpreterError> {
        let index = self
            .program
            .sub_index(sub)
            .ok_or(PanicReason::UnknownSubroutine)?;

        debug!(sub, args = args.len(), "entering program");

        match self.run_frame(index, args.to_vec())? {
            FrameOutcome::Return(value) => Ok(value),
            FrameOutcome::Marker(marker) => Err(PerlException::new(format!(
                "Can't \"{}\" outside a loop block",
                marker.kind.keyword()
            ))
            .into()),
        }
    }

    pub(crate) fn output(&mut self) -> &mut Box<dyn IoHandle> {
        self.out
            .get_or_insert_with(|| Box::new(LayeredHandle::new(Box::new(StandardStream::stdout()))))
    }
}
