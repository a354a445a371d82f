//! Pre-interned scalars.
//!
//! Small integers, booleans, undef and the empty string dominate operator
//! results in hot loops. Integers and booleans are unboxed variants, so the
//! pool's job here is sharing the heap payloads: the empty string, the
//! boolean string forms and the string forms of small integers.

use std::cell::RefCell;
use std::rc::Rc;

use crate::consts::SMALL_INT_STRINGS;

use super::{PerlStr, Scalar};

thread_local! {
    static EMPTY: Rc<PerlStr> = Rc::new(PerlStr::new(""));
    static TRUE_STR: Rc<PerlStr> = Rc::new(PerlStr::new("1"));
    static INT_STRS: RefCell<Vec<Option<Rc<PerlStr>>>> =
        RefCell::new(vec![None; SMALL_INT_STRINGS as usize + 1]);
}

/// `undef`.
pub const fn undef() -> Scalar {
    Scalar::Undef
}

/// Pooled boolean.
pub const fn boolean(b: bool) -> Scalar {
    Scalar::Bool(b)
}

/// The shared empty-string payload.
pub fn empty_str() -> Rc<PerlStr> {
    EMPTY.with(Rc::clone)
}

/// String form of a boolean: `"1"` or `""`.
pub fn bool_str(b: bool) -> Rc<PerlStr> {
    if b {
        TRUE_STR.with(Rc::clone)
    } else {
        empty_str()
    }
}

/// String form of an integer, interned for `0..=SMALL_INT_STRINGS`.
pub fn int_str(v: i64) -> Rc<PerlStr> {
    if (0..=SMALL_INT_STRINGS).contains(&v) {
        INT_STRS.with(|cache| {
            cache.borrow_mut()[v as usize]
                .get_or_insert_with(|| Rc::new(PerlStr::new(v.to_string())))
                .clone()
        })
    } else {
        Rc::new(PerlStr::new(v.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_int_strings_are_shared() {
        let a = int_str(42);
        let b = int_str(42);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.as_str(), "42");

        let big_a = int_str(100_000);
        let big_b = int_str(100_000);
        assert!(!Rc::ptr_eq(&big_a, &big_b));
    }

    #[test]
    fn empty_string_is_shared() {
        assert!(Rc::ptr_eq(&empty_str(), &bool_str(false)));
    }
}
