//! Runtime error implementation for the interpreter and the I/O subsystem

use std::io;

use thiserror::Error;

/// Source position attached to exceptions and control-flow markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceLoc {
    /// 1-based line in the originating Perl source.
    pub line: u32,
}

impl SourceLoc {
    /// Create a location for the given line.
    pub const fn line(line: u32) -> Self {
        Self { line }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, Error)]
#[non_exhaustive]
/// Invariant violations of the VM. These mean a malformed program or an
/// implementation bug; there is no recovery path.
pub enum PanicReason {
    /// The bytecode slot can't be mapped to any known opcode.
    #[error("invalid opcode")]
    InvalidOpcode,
    /// A register operand is outside the program's declared register count.
    #[error("register index out of range")]
    RegisterOutOfRange,
    /// A constant-pool operand is outside the pool.
    #[error("constant index out of range")]
    ConstantOutOfRange,
    /// A branch operand does not land on an opcode start.
    #[error("branch target is not an opcode boundary")]
    InvalidBranchTarget,
    /// A call operand names a subroutine the program does not define.
    #[error("unknown subroutine")]
    UnknownSubroutine,
    /// The bytecode stream ended in the middle of an instruction.
    #[error("truncated instruction")]
    TruncatedInstruction,
    /// Non-tail recursion exceeded [`crate::consts::MAX_CALL_DEPTH`].
    #[error("call depth exceeded")]
    CallDepthExceeded,
    /// The program declares more registers than the VM supports.
    #[error("register file too large")]
    RegisterFileTooLarge,
}

/// A Perl-level exception, recoverable via `eval`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct PerlException {
    /// Exception text as the script would observe it in `$@`.
    pub message: String,
    /// Source position, when the front-end provided one.
    pub location: Option<SourceLoc>,
}

impl PerlException {
    /// Create an exception carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Attach a source location.
    pub fn at(mut self, location: SourceLoc) -> Self {
        self.location = Some(location);
        self
    }
}

/// Interpreter runtime error variants.
#[derive(Debug, Error)]
pub enum InterpreterError {
    /// The execution raised a Perl exception. Recoverable by `eval` in the
    /// surrounding script.
    #[error("Exception: {0}")]
    Exception(PerlException),
    /// The execution violated a VM invariant.
    #[error("Panic: {0}")]
    Panic(#[from] PanicReason),
    /// I/O and OS related errors.
    #[error("Unrecoverable error: {0}")]
    Io(#[from] io::Error),
}

impl InterpreterError {
    /// Describe the error as recoverable or halt.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Exception(_))
    }

    /// Return the panic reason, if this error is one.
    pub const fn panic_reason(&self) -> Option<PanicReason> {
        match self {
            Self::Panic(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<PerlException> for InterpreterError {
    fn from(e: PerlException) -> Self {
        Self::Exception(e)
    }
}

impl From<IoError> for InterpreterError {
    fn from(e: IoError) -> Self {
        match e {
            IoError::Os(e) => Self::Io(e),
            other => Self::Exception(PerlException::new(other.to_string())),
        }
    }
}

/// Errors surfaced by I/O handles.
///
/// Handle operations additionally record the error text in the process-wide
/// last-error slot, matching the status-return style most Perl operators
/// expect. See [`crate::io::last_error`].
#[derive(Debug, Error)]
pub enum IoError {
    /// The handle was closed; every operation on it fails with this kind.
    #[error("operation on a closed filehandle")]
    Closed,
    /// The backing shape does not support the operation (seek on a socket,
    /// truncate on a pipe).
    #[error("{0} not supported on this handle")]
    Unsupported(&'static str),
    /// A `binmode` spec named a layer this runtime does not provide. The
    /// layer stack is left unchanged.
    #[error("Unknown PerlIO layer \"{0}\"")]
    UnknownLayer(String),
    /// An `encoding(...)` layer named a charset the runtime cannot map.
    #[error("Cannot find encoding \"{0}\"")]
    UnsupportedCharset(String),
    /// `ungetc` received a value that is not a Unicode scalar.
    #[error("invalid code point {0:#x}")]
    InvalidCodepoint(u32),
    /// Underlying OS failure.
    #[error(transparent)]
    Os(#[from] io::Error),
}

impl IoError {
    /// True for the dedicated closed-handle kind.
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Result alias used across the I/O subsystem.
pub type IoResult<T> = Result<T, IoError>;

/// Errors reported while lowering an AST to bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A variable was used without a `my` declaration in scope.
    #[error("Global symbol \"${0}\" requires explicit package name")]
    UndeclaredVariable(String),
    /// Two subroutines share a name.
    #[error("Subroutine {0} redefined")]
    DuplicateSubroutine(String),
    /// `last`/`next`/`redo` named a label that encloses nothing here and
    /// cannot travel to a caller either (no enclosing subroutine).
    #[error("Label not found for \"{0} {1}\"")]
    UnknownLabel(&'static str, String),
    /// The program needs more registers than the VM supports.
    #[error("register allocation exceeded the VM limit")]
    OutOfRegisters,
    /// A call or code-reference literal named a subroutine the unit does not
    /// define.
    #[error("Undefined subroutine &main::{0} called")]
    UnknownSubroutine(String),
    /// Emitted bytecode failed its own verification; a compiler bug.
    #[error("internal compiler error: {0}")]
    Internal(PanicReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_handle_error_is_distinguished() {
        let err = IoError::Closed;
        assert!(err.is_closed());
        assert!(!IoError::Unsupported("seek").is_closed());
    }

    #[test]
    fn exception_formats_bare_message() {
        let e = PerlException::new("Illegal division by zero").at(SourceLoc::line(3));
        assert_eq!(e.to_string(), "Illegal division by zero");
        assert_eq!(e.location, Some(SourceLoc { line: 3 }));
    }
}
