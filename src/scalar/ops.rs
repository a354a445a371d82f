//! Primitive operations the interpreter opcodes invoke.
//!
//! Every operation is pure with respect to its arguments except the
//! `*_assign` mutators. Binary primitives consult the overload tables of
//! blessed operands first; compound assignments check the compound key
//! (`"+="`) before falling back to the base operator followed by a
//! destructive set.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::error::PerlException;

use super::convert::{self, NumOperand};
use super::{overload, pool, PerlStr, Scalar};

/// Result of a scalar primitive.
pub type OpResult = Result<Scalar, PerlException>;

/// `a + b`.
pub fn add(a: &Scalar, b: &Scalar) -> OpResult {
    if let Some(r) = overload::binary("+", a, b)? {
        return Ok(r);
    }
    Ok(arith(a, b, i64::checked_add, |x, y| x + y))
}

/// `a - b`.
pub fn subtract(a: &Scalar, b: &Scalar) -> OpResult {
    if let Some(r) = overload::binary("-", a, b)? {
        return Ok(r);
    }
    Ok(arith(a, b, i64::checked_sub, |x, y| x - y))
}

/// `a * b`.
pub fn multiply(a: &Scalar, b: &Scalar) -> OpResult {
    if let Some(r) = overload::binary("*", a, b)? {
        return Ok(r);
    }
    Ok(arith(a, b, i64::checked_mul, |x, y| x * y))
}

/// `a / b`. Integer-exact quotients stay integers.
pub fn divide(a: &Scalar, b: &Scalar) -> OpResult {
    if let Some(r) = overload::binary("/", a, b)? {
        return Ok(r);
    }

    let y = convert::to_double(b);
    if y == 0.0 {
        return Err(PerlException::new("Illegal division by zero"));
    }

    if let (NumOperand::Int(x), NumOperand::Int(y)) = (convert::numeric(a), convert::numeric(b)) {
        if x % y == 0 {
            return Ok(Scalar::Int(x / y));
        }
    }

    Ok(Scalar::Num(convert::to_double(a) / y))
}

/// Perl `%`: integer modulus, result takes the sign of the right operand.
pub fn modulus(a: &Scalar, b: &Scalar) -> OpResult {
    if let Some(r) = overload::binary("%", a, b)? {
        return Ok(r);
    }

    let x = convert::to_int(a);
    let y = convert::to_int(b);
    if y == 0 {
        return Err(PerlException::new("Illegal modulus zero"));
    }

    Ok(Scalar::Int(((x % y) + y) % y))
}

/// Unary `-`.
pub fn negate(a: &Scalar) -> OpResult {
    if let Some(r) = overload::binary("neg", a, &Scalar::Undef)? {
        return Ok(r);
    }
    match convert::numeric(a) {
        NumOperand::Int(x) => Ok(x
            .checked_neg()
            .map(Scalar::Int)
            .unwrap_or(Scalar::Num(-(x as f64)))),
        NumOperand::Float(x) => Ok(Scalar::Num(-x)),
    }
}

/// `a += b`.
pub fn add_assign(dst: &mut Scalar, rhs: &Scalar) -> Result<(), PerlException> {
    assign(dst, rhs, "+=", add)
}

/// `a -= b`.
pub fn sub_assign(dst: &mut Scalar, rhs: &Scalar) -> Result<(), PerlException> {
    assign(dst, rhs, "-=", subtract)
}

/// `a *= b`.
pub fn mul_assign(dst: &mut Scalar, rhs: &Scalar) -> Result<(), PerlException> {
    assign(dst, rhs, "*=", multiply)
}

/// `a /= b`.
pub fn div_assign(dst: &mut Scalar, rhs: &Scalar) -> Result<(), PerlException> {
    assign(dst, rhs, "/=", divide)
}

/// `a %= b`.
pub fn mod_assign(dst: &mut Scalar, rhs: &Scalar) -> Result<(), PerlException> {
    assign(dst, rhs, "%=", modulus)
}

/// `a .= b`.
pub fn concat_assign(dst: &mut Scalar, rhs: &Scalar) -> Result<(), PerlException> {
    assign(dst, rhs, ".=", concat)
}

/// `a x= b`.
pub fn repeat_assign(dst: &mut Scalar, rhs: &Scalar) -> Result<(), PerlException> {
    assign(dst, rhs, "x=", repeat)
}

/// Numeric `<`.
pub fn lt(a: &Scalar, b: &Scalar) -> OpResult {
    bool_cmp("<", a, b, |o| o == Some(Ordering::Less))
}

/// Numeric `<=`.
pub fn le(a: &Scalar, b: &Scalar) -> OpResult {
    bool_cmp("<=", a, b, |o| {
        matches!(o, Some(Ordering::Less | Ordering::Equal))
    })
}

/// Numeric `>`.
pub fn gt(a: &Scalar, b: &Scalar) -> OpResult {
    bool_cmp(">", a, b, |o| o == Some(Ordering::Greater))
}

/// Numeric `>=`.
pub fn ge(a: &Scalar, b: &Scalar) -> OpResult {
    bool_cmp(">=", a, b, |o| {
        matches!(o, Some(Ordering::Greater | Ordering::Equal))
    })
}

/// Numeric `==`.
pub fn eq(a: &Scalar, b: &Scalar) -> OpResult {
    bool_cmp("==", a, b, |o| o == Some(Ordering::Equal))
}

/// Numeric `!=`.
pub fn ne(a: &Scalar, b: &Scalar) -> OpResult {
    bool_cmp("!=", a, b, |o| !matches!(o, Some(Ordering::Equal)))
}

/// Numeric `<=>`: -1, 0, 1, or undef for unordered operands.
pub fn cmp(a: &Scalar, b: &Scalar) -> OpResult {
    if let Some(r) = overload::binary("<=>", a, b)? {
        return Ok(r);
    }
    Ok(match num_cmp(a, b) {
        Some(Ordering::Less) => Scalar::Int(-1),
        Some(Ordering::Equal) => Scalar::Int(0),
        Some(Ordering::Greater) => Scalar::Int(1),
        None => Scalar::Undef,
    })
}

/// String `lt`.
pub fn slt(a: &Scalar, b: &Scalar) -> OpResult {
    str_cmp("lt", a, b, Ordering::is_lt)
}

/// String `le`.
pub fn sle(a: &Scalar, b: &Scalar) -> OpResult {
    str_cmp("le", a, b, Ordering::is_le)
}

/// String `gt`.
pub fn sgt(a: &Scalar, b: &Scalar) -> OpResult {
    str_cmp("gt", a, b, Ordering::is_gt)
}

/// String `ge`.
pub fn sge(a: &Scalar, b: &Scalar) -> OpResult {
    str_cmp("ge", a, b, Ordering::is_ge)
}

/// String `eq`.
pub fn seq(a: &Scalar, b: &Scalar) -> OpResult {
    str_cmp("eq", a, b, Ordering::is_eq)
}

/// String `ne`.
pub fn sne(a: &Scalar, b: &Scalar) -> OpResult {
    str_cmp("ne", a, b, Ordering::is_ne)
}

/// String `cmp`.
pub fn scmp(a: &Scalar, b: &Scalar) -> OpResult {
    if let Some(r) = overload::binary("cmp", a, b)? {
        return Ok(r);
    }
    let ord = convert::to_str(a).as_str().cmp(convert::to_str(b).as_str());
    Ok(Scalar::Int(match ord {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }))
}

/// `a . b`.
pub fn concat(a: &Scalar, b: &Scalar) -> OpResult {
    if let Some(r) = overload::binary(".", a, b)? {
        return Ok(r);
    }

    let left = convert::to_str(a);
    let right = convert::to_str(b);
    if left.as_str().is_empty() && right.as_str().is_empty() {
        return Ok(Scalar::Str(pool::empty_str()));
    }

    let mut s = String::with_capacity(left.as_str().len() + right.as_str().len());
    s.push_str(left.as_str());
    s.push_str(right.as_str());
    Ok(Scalar::Str(Rc::new(PerlStr::new(s))))
}

/// `length(a)` in characters; undef stays undef.
pub fn length(a: &Scalar) -> Scalar {
    if !a.is_defined() {
        return Scalar::Undef;
    }
    Scalar::Int(convert::to_str(a).as_str().chars().count() as i64)
}

/// `a x b`.
pub fn repeat(a: &Scalar, b: &Scalar) -> OpResult {
    if let Some(r) = overload::binary("x", a, b)? {
        return Ok(r);
    }

    let count = convert::to_int(b);
    if count <= 0 {
        return Ok(Scalar::Str(pool::empty_str()));
    }
    Ok(Scalar::str(convert::to_str(a).as_str().repeat(count as usize)))
}

/// Perl `++`: magical string increment for alphanumeric strings, numeric
/// increment otherwise.
pub fn increment(dst: &mut Scalar) -> Result<(), PerlException> {
    if let Some(r) = overload::binary("++", dst, &Scalar::Undef)? {
        *dst = r;
        return Ok(());
    }

    if let Scalar::Str(p) = dst {
        let text = p.as_str();
        if is_magic_incrementable(text) {
            *dst = Scalar::str(magic_increment(text));
            return Ok(());
        }
    }

    let v = add(dst, &Scalar::Int(1))?;
    *dst = v;
    Ok(())
}

/// Perl `--`.
pub fn decrement(dst: &mut Scalar) -> Result<(), PerlException> {
    if let Some(r) = overload::binary("--", dst, &Scalar::Undef)? {
        *dst = r;
        return Ok(());
    }
    let v = subtract(dst, &Scalar::Int(1))?;
    *dst = v;
    Ok(())
}

/// `defined(a)` as a pooled boolean.
pub fn defined(a: &Scalar) -> Scalar {
    pool::boolean(a.is_defined())
}

/// Perl truthiness as a pooled boolean.
pub fn to_bool(a: &Scalar) -> Scalar {
    pool::boolean(convert::to_boolean(a))
}

/// `!a` as a pooled boolean.
pub fn not(a: &Scalar) -> Scalar {
    pool::boolean(!convert::to_boolean(a))
}

fn assign(
    dst: &mut Scalar,
    rhs: &Scalar,
    key: &str,
    base: fn(&Scalar, &Scalar) -> OpResult,
) -> Result<(), PerlException> {
    if let Some(r) = overload::binary(key, dst, rhs)? {
        *dst = r;
        return Ok(());
    }
    let v = base(dst, rhs)?;
    *dst = v;
    Ok(())
}

fn arith(
    a: &Scalar,
    b: &Scalar,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Scalar {
    match (convert::numeric(a), convert::numeric(b)) {
        (NumOperand::Int(x), NumOperand::Int(y)) => match int_op(x, y) {
            Some(v) => Scalar::Int(v),
            // Integer overflow widens to a double, as Perl's IV does.
            None => Scalar::Num(float_op(x as f64, y as f64)),
        },
        (x, y) => Scalar::Num(float_op(widen(x), widen(y))),
    }
}

const fn widen(n: NumOperand) -> f64 {
    match n {
        NumOperand::Int(x) => x as f64,
        NumOperand::Float(x) => x,
    }
}

fn num_cmp(a: &Scalar, b: &Scalar) -> Option<Ordering> {
    match (convert::numeric(a), convert::numeric(b)) {
        (NumOperand::Int(x), NumOperand::Int(y)) => Some(x.cmp(&y)),
        (x, y) => widen(x).partial_cmp(&widen(y)),
    }
}

fn bool_cmp(
    key: &str,
    a: &Scalar,
    b: &Scalar,
    pick: fn(Option<Ordering>) -> bool,
) -> OpResult {
    if let Some(r) = overload::binary(key, a, b)? {
        return Ok(r);
    }
    Ok(pool::boolean(pick(num_cmp(a, b))))
}

fn str_cmp(key: &str, a: &Scalar, b: &Scalar, pick: fn(Ordering) -> bool) -> OpResult {
    if let Some(r) = overload::binary(key, a, b)? {
        return Ok(r);
    }
    let ord = convert::to_str(a).as_str().cmp(convert::to_str(b).as_str());
    Ok(pool::boolean(pick(ord)))
}

fn is_magic_incrementable(text: &str) -> bool {
    if text.is_empty() || !text.bytes().any(|b| b.is_ascii_alphabetic()) {
        return false;
    }
    let mut rest = text.bytes().skip_while(|b| b.is_ascii_alphabetic());
    rest.all(|b| b.is_ascii_digit())
}

fn magic_increment(text: &str) -> String {
    let mut bytes = text.as_bytes().to_vec();
    let mut i = bytes.len();

    loop {
        if i == 0 {
            let prepend = match bytes.first() {
                Some(b'0'..=b'9') => b'1',
                Some(b'A'..=b'Z') => b'A',
                _ => b'a',
            };
            bytes.insert(0, prepend);
            break;
        }
        i -= 1;
        match bytes[i] {
            b'z' => bytes[i] = b'a',
            b'Z' => bytes[i] = b'A',
            b'9' => bytes[i] = b'0',
            c => {
                bytes[i] = c + 1;
                break;
            }
        }
    }

    String::from_utf8(bytes).expect("ascii increment")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_overflow_widens() {
        let r = add(&Scalar::Int(i64::MAX), &Scalar::Int(1)).unwrap();
        assert!(matches!(r, Scalar::Num(_)));
    }

    #[test]
    fn division_by_zero_dies() {
        let err = divide(&Scalar::Int(1), &Scalar::Int(0)).unwrap_err();
        assert_eq!(err.message, "Illegal division by zero");
    }

    #[test]
    fn modulus_takes_sign_of_right_operand() {
        assert_eq!(modulus(&Scalar::Int(-7), &Scalar::Int(3)).unwrap(), Scalar::Int(2));
        assert_eq!(modulus(&Scalar::Int(7), &Scalar::Int(-3)).unwrap(), Scalar::Int(-2));
    }

    #[test]
    fn string_and_numeric_comparison_disagree() {
        let nine = Scalar::str("9");
        let ten = Scalar::str("10");
        assert_eq!(lt(&nine, &ten).unwrap(), Scalar::Bool(true));
        assert_eq!(slt(&nine, &ten).unwrap(), Scalar::Bool(false));
    }

    #[test]
    fn magic_string_increment() {
        let mut s = Scalar::str("az");
        increment(&mut s).unwrap();
        assert_eq!(s, Scalar::str("ba"));

        let mut s = Scalar::str("zz");
        increment(&mut s).unwrap();
        assert_eq!(s, Scalar::str("aaa"));

        let mut s = Scalar::str("a9");
        increment(&mut s).unwrap();
        assert_eq!(s, Scalar::str("b0"));

        let mut s = Scalar::str("19");
        increment(&mut s).unwrap();
        assert_eq!(s, Scalar::Int(20));
    }

    #[test]
    fn compound_assign_falls_back_to_base_operator() {
        let mut s = Scalar::Int(40);
        add_assign(&mut s, &Scalar::Int(2)).unwrap();
        assert_eq!(s, Scalar::Int(42));

        let mut s = Scalar::str("foo");
        concat_assign(&mut s, &Scalar::str("bar")).unwrap();
        assert_eq!(s, Scalar::str("foobar"));
    }
}
