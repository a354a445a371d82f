//! Perl scalar representation.
//!
//! A [`Scalar`] is a tagged sum over the value shapes the interpreter
//! manipulates directly. Aggregate references are opaque: the VM preserves
//! identity and existence, nothing more; their bodies belong to the host
//! runtime. Heap payloads are shared by `Rc`, so cloning a scalar between
//! registers is cheap and the memoised representations travel with the
//! payload.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use once_cell::unsync::OnceCell;

pub mod convert;
pub mod ops;
pub mod overload;
pub mod pool;

pub use overload::{OverloadFn, OverloadTable};

/// Memoised numeric form of a string scalar.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Numeric {
    pub int: i64,
    pub num: f64,
    /// Whether the whole string was consumed by the numeric parse.
    pub clean: bool,
}

/// Immutable string payload with a lazily attached numeric form.
pub struct PerlStr {
    text: String,
    numeric: OnceCell<Numeric>,
}

impl PerlStr {
    /// Wrap a string.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            numeric: OnceCell::new(),
        }
    }

    /// The character data.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub(crate) fn numeric(&self) -> Numeric {
        *self.numeric.get_or_init(|| convert::parse_numeric(&self.text))
    }
}

impl fmt::Debug for PerlStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.text, f)
    }
}

impl PartialEq for PerlStr {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl From<&str> for PerlStr {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Code reference payload: a named compiled subroutine.
pub struct CodeValue {
    /// Name resolved against the program's subroutine table at call time.
    pub name: Rc<str>,
}

#[derive(Debug)]
/// Referent of a Perl reference.
pub enum RefValue {
    /// `\$x` — a scalar cell.
    Scalar(RefCell<Scalar>),
    /// List payload backing multi-value returns.
    List(RefCell<Vec<Scalar>>),
    /// Array aggregate; body owned by the host runtime.
    Array,
    /// Hash aggregate; body owned by the host runtime.
    Hash,
}

impl RefValue {
    /// The `ref()` tag for this referent.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "SCALAR",
            Self::List(_) | Self::Array => "ARRAY",
            Self::Hash => "HASH",
        }
    }
}

#[derive(Debug)]
/// A value blessed into a package, optionally carrying operator overloads.
pub struct BlessedValue {
    /// Package the value was blessed into.
    pub package: Rc<str>,
    /// The wrapped scalar.
    pub inner: Scalar,
    /// Overload table consulted before binary primitives.
    pub overloads: Option<Rc<OverloadTable>>,
}

#[derive(Debug, Clone)]
/// A Perl scalar value.
pub enum Scalar {
    /// `undef`.
    Undef,
    /// Boolean, a distinct subtype of integer in Perl practice.
    Bool(bool),
    /// Machine-wide signed integer.
    Int(i64),
    /// Double-precision float.
    Num(f64),
    /// Immutable string.
    Str(Rc<PerlStr>),
    /// Code reference.
    Code(Rc<CodeValue>),
    /// Glob reference, carried by name.
    Glob(Rc<str>),
    /// Array/hash/scalar reference; identity is the `Rc` pointer.
    Ref(Rc<RefValue>),
    /// Blessed wrapper over any of the above.
    Blessed(Rc<BlessedValue>),
}

impl Scalar {
    /// Wrap a string payload.
    pub fn str(text: impl Into<String>) -> Self {
        Self::Str(Rc::new(PerlStr::new(text)))
    }

    /// Create a code reference to a named subroutine.
    pub fn code_ref(name: impl Into<Rc<str>>) -> Self {
        Self::Code(Rc::new(CodeValue { name: name.into() }))
    }

    /// Bless a value into a package.
    pub fn bless(
        inner: Scalar,
        package: impl Into<Rc<str>>,
        overloads: Option<Rc<OverloadTable>>,
    ) -> Self {
        Self::Blessed(Rc::new(BlessedValue {
            package: package.into(),
            inner,
            overloads,
        }))
    }

    /// `defined()`.
    pub const fn is_defined(&self) -> bool {
        !matches!(self, Self::Undef)
    }

    /// Peel blessed wrappers down to the plain value.
    pub fn unbless(&self) -> &Scalar {
        let mut cur = self;
        while let Scalar::Blessed(w) = cur {
            cur = &w.inner;
        }
        cur
    }

    /// The `ref()` tag, or `None` for non-references.
    pub fn ref_type(&self) -> Option<&'static str> {
        match self {
            Self::Code(_) => Some("CODE"),
            Self::Glob(_) => Some("GLOB"),
            Self::Ref(r) => Some(r.tag()),
            Self::Blessed(_) => Some("OBJECT"),
            _ => None,
        }
    }
}

impl Default for Scalar {
    fn default() -> Self {
        Self::Undef
    }
}

/// Structural equality for plain values, pointer identity for references.
impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undef, Self::Undef) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Num(a), Self::Num(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Code(a), Self::Code(b)) => a.name == b.name,
            (Self::Glob(a), Self::Glob(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => Rc::ptr_eq(a, b),
            (Self::Blessed(a), Self::Blessed(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}
