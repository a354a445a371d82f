//! Runtime state representation for the VM

use std::rc::Rc;

use crate::error::SourceLoc;
use crate::scalar::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Non-local transfer intents carried across frame boundaries.
///
/// `goto &sub` and tail calls are consumed by the trampoline at the return
/// site of the frame that issued them; they never propagate, so they have no
/// kind here.
pub enum MarkerKind {
    /// `last` — leave the matching loop.
    Last,
    /// `next` — jump to the matching loop's increment step.
    Next,
    /// `redo` — restart the matching loop's body.
    Redo,
}

impl MarkerKind {
    /// The source keyword, for diagnostics.
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Last => "last",
            Self::Next => "next",
            Self::Redo => "redo",
        }
    }
}

#[derive(Debug, Clone)]
/// A control-flow marker: a tagged value distinct from any ordinary scalar,
/// returned through the same channel as values and checked at every call
/// site.
pub struct ControlMarker {
    /// Transfer intent.
    pub kind: MarkerKind,
    /// Loop label the transfer names, if any.
    pub label: Option<Rc<str>>,
    /// Source position of the originating statement.
    pub location: Option<SourceLoc>,
}

impl ControlMarker {
    /// Marker for an unlabelled transfer.
    pub fn new(kind: MarkerKind) -> Self {
        Self {
            kind,
            label: None,
            location: None,
        }
    }

    /// Marker naming a loop label.
    pub fn labelled(kind: MarkerKind, label: impl Into<Rc<str>>) -> Self {
        Self {
            kind,
            label: Some(label.into()),
            location: None,
        }
    }
}

#[derive(Debug)]
/// What a finished frame hands back to its caller: an ordinary scalar, or a
/// marker the caller must either dispatch to one of its loops or re-emit.
pub enum FrameOutcome {
    /// Ordinary return value.
    Return(Scalar),
    /// Propagating control-flow marker.
    Marker(ControlMarker),
}

#[derive(Debug)]
/// Resulting state of a single instruction execution.
pub(crate) enum ExecuteState {
    /// The frame should proceed normally with the execution.
    Proceed,
    /// The current frame returned a scalar.
    Return(Scalar),
    /// The current frame returned a control-flow marker.
    Marker(ControlMarker),
    /// A tail call: the trampoline reuses the current frame for the named
    /// subroutine.
    Tail {
        /// Subroutine-table index of the target.
        sub: usize,
        /// Argument scalars, copied out of the old register file before it
        /// is cleared.
        args: Vec<Scalar>,
    },
}
