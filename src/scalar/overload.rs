//! Operator overloading for blessed values.
//!
//! Tables are keyed by the Perl operator symbol (`"+"`, `"."`, `"+="`, …).
//! Before a binary primitive runs, the operands are checked for a blessed
//! wrapper whose table resolves the symbol; a resolved handler replaces the
//! default path entirely. Handlers receive `(self, other, swapped)` the way
//! `use overload` hands them to a method.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::PerlException;

use super::Scalar;

/// Overload handler: `(self, other, swapped) -> result`.
pub type OverloadFn = Rc<dyn Fn(&Scalar, &Scalar, bool) -> Result<Scalar, PerlException>>;

/// Per-package table of operator handlers.
#[derive(Default)]
pub struct OverloadTable {
    handlers: HashMap<String, OverloadFn>,
}

impl OverloadTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an operator symbol.
    pub fn insert(&mut self, op: impl Into<String>, f: OverloadFn) {
        self.handlers.insert(op.into(), f);
    }

    /// Resolve an operator symbol.
    pub fn get(&self, op: &str) -> Option<&OverloadFn> {
        self.handlers.get(op)
    }
}

impl fmt::Debug for OverloadTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Consult both operands for an overload of `op`. Returns `Ok(None)` when
/// neither side resolves a handler and the default path should run.
pub(crate) fn binary(
    op: &str,
    a: &Scalar,
    b: &Scalar,
) -> Result<Option<Scalar>, PerlException> {
    if let Scalar::Blessed(w) = a {
        if let Some(f) = w.overloads.as_ref().and_then(|t| t.get(op)) {
            return f(a, b, false).map(Some);
        }
    }
    if let Scalar::Blessed(w) = b {
        if let Some(f) = w.overloads.as_ref().and_then(|t| t.get(op)) {
            return f(b, a, true).map(Some);
        }
    }
    Ok(None)
}
