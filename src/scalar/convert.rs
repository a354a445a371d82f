//! Conversions between the scalar representations.
//!
//! Number-from-string follows Perl's prefix rules: leading whitespace, an
//! optional sign, digits, an optional fraction and exponent; whatever follows
//! is ignored. The parse is memoised on the string payload, so hot loops
//! re-reading the same scalar never re-parse.

use std::rc::Rc;

use tracing::warn;

use super::{pool, Numeric, PerlStr, Scalar};

/// Integer value of a scalar.
pub fn to_int(s: &Scalar) -> i64 {
    match s.unbless() {
        Scalar::Undef => 0,
        Scalar::Bool(b) => *b as i64,
        Scalar::Int(i) => *i,
        Scalar::Num(n) => *n as i64,
        Scalar::Str(p) => p.numeric().int,
        Scalar::Code(_) | Scalar::Glob(_) | Scalar::Ref(_) => ref_address(s) as i64,
        Scalar::Blessed(_) => unreachable!("unbless returned a wrapper"),
    }
}

/// Double value of a scalar.
pub fn to_double(s: &Scalar) -> f64 {
    match s.unbless() {
        Scalar::Undef => 0.0,
        Scalar::Bool(b) => *b as u8 as f64,
        Scalar::Int(i) => *i as f64,
        Scalar::Num(n) => *n,
        Scalar::Str(p) => p.numeric().num,
        Scalar::Code(_) | Scalar::Glob(_) | Scalar::Ref(_) => ref_address(s) as f64,
        Scalar::Blessed(_) => unreachable!("unbless returned a wrapper"),
    }
}

/// String form of a scalar. Shared payloads are returned as-is; small
/// integers come from the interned pool.
pub fn to_str(s: &Scalar) -> Rc<PerlStr> {
    match s {
        Scalar::Undef => {
            warn!("Use of uninitialized value in string context");
            pool::empty_str()
        }
        Scalar::Bool(b) => pool::bool_str(*b),
        Scalar::Int(i) => pool::int_str(*i),
        Scalar::Num(n) => Rc::new(PerlStr::new(format_double(*n))),
        Scalar::Str(p) => p.clone(),
        Scalar::Code(c) => Rc::new(PerlStr::new(format!(
            "CODE(0x{:x})",
            Rc::as_ptr(c) as usize
        ))),
        Scalar::Glob(name) => Rc::new(PerlStr::new(format!("*main::{name}"))),
        Scalar::Ref(r) => Rc::new(PerlStr::new(format!(
            "{}(0x{:x})",
            r.tag(),
            Rc::as_ptr(r) as *const u8 as usize
        ))),
        Scalar::Blessed(w) => Rc::new(PerlStr::new(format!(
            "{}={}(0x{:x})",
            w.package,
            w.inner.ref_type().unwrap_or("SCALAR"),
            Rc::as_ptr(w) as usize
        ))),
    }
}

/// Perl truthiness.
pub fn to_boolean(s: &Scalar) -> bool {
    match s.unbless() {
        Scalar::Undef => false,
        Scalar::Bool(b) => *b,
        Scalar::Int(i) => *i != 0,
        Scalar::Num(n) => *n != 0.0,
        Scalar::Str(p) => {
            let t = p.as_str();
            !t.is_empty() && t != "0"
        }
        Scalar::Code(_) | Scalar::Glob(_) | Scalar::Ref(_) => true,
        Scalar::Blessed(_) => unreachable!("unbless returned a wrapper"),
    }
}

/// Numeric operand of a binary primitive: integer when the value is exactly
/// integral, double otherwise.
#[derive(Debug, Clone, Copy)]
pub(crate) enum NumOperand {
    Int(i64),
    Float(f64),
}

pub(crate) fn numeric(s: &Scalar) -> NumOperand {
    match s.unbless() {
        Scalar::Undef => NumOperand::Int(0),
        Scalar::Bool(b) => NumOperand::Int(*b as i64),
        Scalar::Int(i) => NumOperand::Int(*i),
        Scalar::Num(n) => NumOperand::Float(*n),
        Scalar::Str(p) => {
            let m = p.numeric();
            if m.num == m.int as f64 {
                NumOperand::Int(m.int)
            } else {
                NumOperand::Float(m.num)
            }
        }
        _ => NumOperand::Int(to_int(s)),
    }
}

fn ref_address(s: &Scalar) -> usize {
    match s.unbless() {
        Scalar::Code(c) => Rc::as_ptr(c) as usize,
        Scalar::Glob(g) => Rc::as_ptr(g) as *const u8 as usize,
        Scalar::Ref(r) => Rc::as_ptr(r) as *const u8 as usize,
        _ => 0,
    }
}

pub(crate) fn parse_numeric(text: &str) -> Numeric {
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }

    let start = i;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let has_int = i > int_start;

    let mut has_frac = false;
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > frac_start || has_int {
            has_frac = j > frac_start;
            i = j;
        }
    }

    if !has_int && !has_frac {
        if !text.is_empty() {
            warn!("Argument {text:?} isn't numeric in numeric context");
        }
        return Numeric {
            int: 0,
            num: 0.0,
            clean: false,
        };
    }

    let mut has_exp = false;
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            has_exp = true;
            i = j;
        }
    }

    let matched = &text[start..i];
    let num: f64 = matched.parse().unwrap_or(0.0);
    let int = if !has_frac && !has_exp {
        matched.parse::<i64>().unwrap_or_else(|_| saturate(num))
    } else {
        saturate(num)
    };

    let mut rest = i;
    while rest < bytes.len() && bytes[rest].is_ascii_whitespace() {
        rest += 1;
    }
    let clean = rest == bytes.len();
    if !clean {
        warn!("Argument {text:?} isn't numeric in numeric context");
    }

    Numeric { int, num, clean }
}

fn saturate(n: f64) -> i64 {
    if n >= i64::MAX as f64 {
        i64::MAX
    } else if n <= i64::MIN as f64 {
        i64::MIN
    } else {
        n as i64
    }
}

/// `%.15g`-style formatting, matching how Perl stringifies doubles.
pub(crate) fn format_double(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }

    let exp = v.abs().log10().floor() as i32;
    if (-5..15).contains(&exp) {
        let prec = (14 - exp).max(0) as usize;
        let mut s = format!("{v:.prec$}");
        if s.contains('.') {
            while s.ends_with('0') {
                s.pop();
            }
            if s.ends_with('.') {
                s.pop();
            }
        }
        s
    } else {
        let s = format!("{v:.14e}");
        let (mantissa, exponent) = s.split_once('e').expect("exponential format");
        let mut mantissa = mantissa.to_string();
        if mantissa.contains('.') {
            while mantissa.ends_with('0') {
                mantissa.pop();
            }
            if mantissa.ends_with('.') {
                mantissa.pop();
            }
        }
        let e: i32 = exponent.parse().expect("exponent digits");
        let sign = if e < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", e.abs())
    }
}
