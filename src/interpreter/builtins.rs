//! Built-in functions and class constructors
//!
//! Every native callable is a [`Builtin`] variant, including the functions of
//! the native modules (`math`, `time`, `os`, `sys`). Calling a class value
//! (`int("3")`, `ValueError("bad")`) goes through [`Interpreter::construct`].
//!
//! Built-ins run without trace events: the hook only sees frames of
//! interpreted code. The ones that take a callable (`sorted(key=...)`, `min`,
//! `max`) call back into the interpreter, so the callable's own frames are
//! traced.

use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::{ExceptionKind, ExceptionObject, RuntimeError};
use crate::interpreter::format::format_value;
use crate::interpreter::ops::access::{dict_insert, iterable_items};
use crate::interpreter::ops::binary::binary_op;
use crate::interpreter::ops::compare::compare;
use crate::interpreter::ops::index_value;
use crate::memory::iter::{iter_of, IterRef, IterState};
use crate::memory::repr::{try_repr, try_str};
use crate::memory::value::{Class, DictMap, RangeValue, Value};
use crate::parser::ast::{BinOp, CmpOp};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Highest value accepted by `sys.setrecursionlimit`
pub const MAX_RECURSION_LIMIT: usize = 4000;

/// Native functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Print,
    Input,
    Len,
    Repr,
    Abs,
    Min,
    Max,
    Sum,
    Sorted,
    Reversed,
    Enumerate,
    Zip,
    Iter,
    Next,
    Isinstance,
    Callable,
    Round,
    Divmod,
    Pow,
    Ord,
    Chr,
    Any,
    All,
    Hex,
    Bin,
    Oct,
    Format,
    // math
    Sqrt,
    Floor,
    Ceil,
    Gcd,
    Isqrt,
    Log,
    Fabs,
    // time
    Sleep,
    Time,
    PerfCounter,
    // os
    Getpid,
    Abort,
    Kill,
    // sys
    Exit,
    SetRecursionLimit,
    GetRecursionLimit,
}

impl Builtin {
    /// Functions bound in the builtins namespace
    pub const GLOBAL: [Builtin; 27] = [
        Builtin::Print,
        Builtin::Input,
        Builtin::Len,
        Builtin::Repr,
        Builtin::Abs,
        Builtin::Min,
        Builtin::Max,
        Builtin::Sum,
        Builtin::Sorted,
        Builtin::Reversed,
        Builtin::Enumerate,
        Builtin::Zip,
        Builtin::Iter,
        Builtin::Next,
        Builtin::Isinstance,
        Builtin::Callable,
        Builtin::Round,
        Builtin::Divmod,
        Builtin::Pow,
        Builtin::Ord,
        Builtin::Chr,
        Builtin::Any,
        Builtin::All,
        Builtin::Hex,
        Builtin::Bin,
        Builtin::Oct,
        Builtin::Format,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Input => "input",
            Builtin::Len => "len",
            Builtin::Repr => "repr",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Sorted => "sorted",
            Builtin::Reversed => "reversed",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Iter => "iter",
            Builtin::Next => "next",
            Builtin::Isinstance => "isinstance",
            Builtin::Callable => "callable",
            Builtin::Round => "round",
            Builtin::Divmod => "divmod",
            Builtin::Pow => "pow",
            Builtin::Ord => "ord",
            Builtin::Chr => "chr",
            Builtin::Any => "any",
            Builtin::All => "all",
            Builtin::Hex => "hex",
            Builtin::Bin => "bin",
            Builtin::Oct => "oct",
            Builtin::Format => "format",
            Builtin::Sqrt => "sqrt",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
            Builtin::Gcd => "gcd",
            Builtin::Isqrt => "isqrt",
            Builtin::Log => "log",
            Builtin::Fabs => "fabs",
            Builtin::Sleep => "sleep",
            Builtin::Time => "time",
            Builtin::PerfCounter => "perf_counter",
            Builtin::Getpid => "getpid",
            Builtin::Abort => "abort",
            Builtin::Kill => "kill",
            Builtin::Exit => "exit",
            Builtin::SetRecursionLimit => "setrecursionlimit",
            Builtin::GetRecursionLimit => "getrecursionlimit",
        }
    }

    /// `module.name`, unique across all built-ins
    pub fn qualified_name(&self) -> &'static str {
        match self {
            Builtin::Sqrt => "math.sqrt",
            Builtin::Floor => "math.floor",
            Builtin::Ceil => "math.ceil",
            Builtin::Gcd => "math.gcd",
            Builtin::Isqrt => "math.isqrt",
            Builtin::Log => "math.log",
            Builtin::Fabs => "math.fabs",
            Builtin::Sleep => "time.sleep",
            Builtin::Time => "time.time",
            Builtin::PerfCounter => "time.perf_counter",
            Builtin::Getpid => "os.getpid",
            Builtin::Abort => "os.abort",
            Builtin::Kill => "os.kill",
            Builtin::Exit => "sys.exit",
            Builtin::SetRecursionLimit => "sys.setrecursionlimit",
            Builtin::GetRecursionLimit => "sys.getrecursionlimit",
            other => other.name(),
        }
    }
}

/// Arguments of one native call
pub(crate) struct CallArgs {
    name: &'static str,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub(crate) fn new(
        name: &'static str,
        positional: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> Self {
        CallArgs {
            name,
            positional,
            keywords,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.positional.len()
    }

    /// Check the positional count, then reject unknown keywords
    pub(crate) fn expect(&self, min: usize, max: usize, keywords: &[&str]) -> Result<(), RuntimeError> {
        let given = self.positional.len();
        if given < min || given > max {
            let message = if min == max {
                match min {
                    0 => format!("{}() takes no arguments ({} given)", self.name, given),
                    1 => format!("{}() takes exactly one argument ({} given)", self.name, given),
                    n => format!("{}() takes exactly {} arguments ({} given)", self.name, n, given),
                }
            } else if given < min {
                format!(
                    "{} expected at least {} argument{}, got {}",
                    self.name,
                    min,
                    if min == 1 { "" } else { "s" },
                    given
                )
            } else {
                format!(
                    "{} expected at most {} argument{}, got {}",
                    self.name,
                    max,
                    if max == 1 { "" } else { "s" },
                    given
                )
            };
            return Err(RuntimeError::type_error(message));
        }
        if let Some((key, _)) = self
            .keywords
            .iter()
            .find(|(key, _)| !keywords.contains(&key.as_str()))
        {
            let message = if keywords.is_empty() {
                format!("{}() takes no keyword arguments", self.name)
            } else {
                format!("'{}' is an invalid keyword argument for {}()", key, self.name)
            };
            return Err(RuntimeError::type_error(message));
        }
        Ok(())
    }

    pub(crate) fn arg(&self, index: usize) -> &Value {
        self.positional.get(index).unwrap_or(&Value::None)
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Keyword argument, treating an explicit `None` as absent
    pub(crate) fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
            .filter(|value| !matches!(value, Value::None))
    }

    pub(crate) fn int(&self, index: usize) -> Result<i64, RuntimeError> {
        index_value(self.arg(index), "")
    }

    pub(crate) fn float(&self, index: usize) -> Result<f64, RuntimeError> {
        let value = self.arg(index);
        value.as_float().ok_or_else(|| {
            RuntimeError::type_error(format!(
                "must be real number, not {}",
                value.type_name()
            ))
        })
    }

    pub(crate) fn into_positional(self) -> Vec<Value> {
        self.positional
    }

    pub(crate) fn into_parts(self) -> (Vec<Value>, Vec<(String, Value)>) {
        (self.positional, self.keywords)
    }
}

/// A value's items, or the standard "not iterable" `TypeError`
pub(crate) fn items_of(value: &Value) -> Result<Vec<Value>, RuntimeError> {
    iterable_items(
        value,
        &format!("'{}' object is not iterable", value.type_name()),
    )
}

/// Advance a shared iterator; `Ok(None)` when exhausted
pub(crate) fn advance(iterator: &IterRef) -> Result<Option<Value>, RuntimeError> {
    let item = iterator
        .try_borrow_mut()
        .map_err(|_| RuntimeError::value_error("generator already executing"))?
        .next_value()?;
    Ok(item)
}

/// `isinstance` check against one class
pub(crate) fn is_instance(value: &Value, class: &Class) -> bool {
    match (class, value) {
        (Class::Int, Value::Bool(_)) => true,
        (Class::Exception(kind), Value::Exception(exception)) => exception.kind.is_subclass_of(*kind),
        (class, value) => value.class() == *class,
    }
}

/// Stable merge sort over indices with a fallible "less than"
pub(crate) fn stable_order<F>(len: usize, mut less: F) -> Result<Vec<usize>, RuntimeError>
where
    F: FnMut(usize, usize) -> Result<bool, RuntimeError>,
{
    let mut order: Vec<usize> = (0..len).collect();
    let mut merged = Vec::with_capacity(len);
    let mut width = 1;
    while width < len {
        merged.clear();
        let mut start = 0;
        while start < len {
            let mid = (start + width).min(len);
            let end = (start + 2 * width).min(len);
            let (mut i, mut j) = (start, mid);
            while i < mid && j < end {
                if less(order[j], order[i])? {
                    merged.push(order[j]);
                    j += 1;
                } else {
                    merged.push(order[i]);
                    i += 1;
                }
            }
            merged.extend_from_slice(&order[i..mid]);
            merged.extend_from_slice(&order[j..end]);
            start = end;
        }
        std::mem::swap(&mut order, &mut merged);
        width *= 2;
    }
    Ok(order)
}

fn float_to_int(value: f64) -> Result<i64, RuntimeError> {
    if value.is_nan() {
        return Err(RuntimeError::value_error("cannot convert float NaN to integer"));
    }
    if value.is_infinite() {
        return Err(RuntimeError::new(
            ExceptionKind::OverflowError,
            "cannot convert float infinity to integer",
        ));
    }
    let truncated = value.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(RuntimeError::overflow());
    }
    Ok(truncated as i64)
}

/// `int(text, base)`
fn parse_int(text: &str, base: u32) -> Result<i64, RuntimeError> {
    let invalid = || {
        RuntimeError::value_error(format!(
            "invalid literal for int() with base {}: {}",
            base,
            crate::memory::repr::repr_string(&Value::str(text))
        ))
    };
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let lowered = digits.to_ascii_lowercase();
    let (radix, digits) = match (base, lowered.get(..2)) {
        (0 | 16, Some("0x")) => (16, &digits[2..]),
        (0 | 8, Some("0o")) => (8, &digits[2..]),
        (0 | 2, Some("0b")) => (2, &digits[2..]),
        (0, _) => (10, digits),
        (base, _) => (base, digits),
    };
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return Err(invalid());
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    if !cleaned.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }
    let magnitude = i128::from_str_radix(&cleaned, radix).map_err(|_| RuntimeError::overflow())?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).map_err(|_| RuntimeError::overflow())
}

fn parse_float(text: &str) -> Result<f64, RuntimeError> {
    let trimmed = text.trim();
    let cleaned: String = trimmed.chars().filter(|c| *c != '_').collect();
    let valid = !trimmed.is_empty()
        && !trimmed.starts_with('_')
        && !trimmed.ends_with('_')
        && !trimmed.contains("__");
    match cleaned.parse::<f64>() {
        Ok(value) if valid => Ok(value),
        _ => Err(RuntimeError::value_error(format!(
            "could not convert string to float: {}",
            crate::memory::repr::repr_string(&Value::str(text))
        ))),
    }
}

fn radix_string(n: i64, radix: u32) -> String {
    let magnitude = n.unsigned_abs();
    let (prefix, digits) = match radix {
        2 => ("0b", format!("{:b}", magnitude)),
        8 => ("0o", format!("{:o}", magnitude)),
        _ => ("0x", format!("{:x}", magnitude)),
    };
    format!("{}{}{}", if n < 0 { "-" } else { "" }, prefix, digits)
}

fn round_int(n: i64, ndigits: i64) -> Result<i64, RuntimeError> {
    if ndigits >= 0 {
        return Ok(n);
    }
    if ndigits < -18 {
        return Ok(0);
    }
    let unit = 10i64.pow((-ndigits) as u32);
    let (quotient, remainder) = (n.div_euclid(unit), n.rem_euclid(unit));
    let doubled = remainder * 2;
    let rounded = if doubled > unit || (doubled == unit && quotient % 2 != 0) {
        quotient + 1
    } else {
        quotient
    };
    rounded.checked_mul(unit).ok_or_else(RuntimeError::overflow)
}

fn modular_power(base: i64, exponent: i64, modulus: i64) -> Result<i64, RuntimeError> {
    if modulus == 0 {
        return Err(RuntimeError::value_error("pow() 3rd argument cannot be 0"));
    }
    if exponent < 0 {
        return Err(RuntimeError::value_error(
            "base is not invertible for the given modulus",
        ));
    }
    let m = modulus as i128;
    let mut result: i128 = 1;
    let mut base = (base as i128).rem_euclid(m);
    let mut exponent = exponent;
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result * base % m;
        }
        base = base * base % m;
        exponent >>= 1;
    }
    let result = result.rem_euclid(m);
    // Python gives the result the sign of the modulus
    let result = if modulus < 0 && result != 0 { result + m } else { result };
    Ok(result as i64)
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a as i64
}

fn math_domain_error() -> RuntimeError {
    RuntimeError::value_error("math domain error")
}

impl Interpreter<'_> {
    /// Call a native function
    pub(crate) fn call_builtin(
        &mut self,
        builtin: Builtin,
        positional: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        let args = CallArgs::new(builtin.name(), positional, keywords);
        match builtin {
            Builtin::Print => self.builtin_print(args),
            Builtin::Input => {
                args.expect(0, 1, &[])?;
                if let Some(prompt) = args.get(0) {
                    let prompt = try_str(prompt)?;
                    self.terminal.write_stdout(&prompt);
                }
                match self.terminal.read_line() {
                    Some(line) => Ok(Value::str(line)),
                    None => Err(RuntimeError::new(
                        ExceptionKind::EOFError,
                        "EOF when reading a line",
                    )),
                }
            }
            Builtin::Len => {
                args.expect(1, 1, &[])?;
                let value = args.arg(0);
                let len = match value {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => items.borrow().len(),
                    Value::Tuple(items) => items.len(),
                    Value::Dict(map) => map.borrow().len(),
                    Value::Range(range) => range.len(),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "object of type '{}' has no len()",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Int(len as i64))
            }
            Builtin::Repr => {
                args.expect(1, 1, &[])?;
                Ok(Value::str(try_repr(args.arg(0))?))
            }
            Builtin::Abs => {
                args.expect(1, 1, &[])?;
                match args.arg(0) {
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    value => match value.as_int() {
                        Some(n) => n.checked_abs().map(Value::Int).ok_or_else(RuntimeError::overflow),
                        None => Err(RuntimeError::type_error(format!(
                            "bad operand type for abs(): '{}'",
                            value.type_name()
                        ))),
                    },
                }
            }
            Builtin::Min => self.builtin_extreme(args, CmpOp::Lt),
            Builtin::Max => self.builtin_extreme(args, CmpOp::Gt),
            Builtin::Sum => {
                args.expect(1, 2, &["start"])?;
                let mut total = args
                    .get(1)
                    .or_else(|| args.keyword("start"))
                    .cloned()
                    .unwrap_or(Value::Int(0));
                if matches!(total, Value::Str(_)) {
                    return Err(RuntimeError::type_error(
                        "sum() can't sum strings [use ''.join(seq) instead]",
                    ));
                }
                for item in items_of(args.arg(0))? {
                    total = binary_op(BinOp::Add, &total, &item)?;
                }
                Ok(total)
            }
            Builtin::Sorted => {
                args.expect(1, 1, &["key", "reverse"])?;
                let items = items_of(args.arg(0))?;
                let key = args.keyword("key").cloned();
                let reverse = args.keyword("reverse").is_some_and(Value::is_truthy);
                Ok(Value::list(self.sort_values(items, key.as_ref(), reverse)?))
            }
            Builtin::Reversed => {
                args.expect(1, 1, &[])?;
                let value = args.arg(0);
                let state = match value {
                    Value::Range(range) => {
                        let len = range.len();
                        let last = range
                            .get(len.saturating_sub(1))
                            .unwrap_or(range.start);
                        IterState::Range {
                            next: last,
                            remaining: len,
                            step: range.step.saturating_neg(),
                        }
                    }
                    Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Dict(_) => {
                        let mut items = items_of(value)?;
                        items.reverse();
                        let kind = match value {
                            Value::List(_) => "list_reverseiterator",
                            Value::Dict(_) => "dict_reversekeyiterator",
                            _ => "reversed",
                        };
                        IterState::Values {
                            items,
                            index: 0,
                            kind,
                        }
                    }
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "'{}' object is not reversible",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::iterator(state))
            }
            Builtin::Enumerate => {
                args.expect(1, 2, &["start"])?;
                let inner = self.iterator_of(args.arg(0))?;
                let count = match args.get(1).or_else(|| args.keyword("start")) {
                    Some(start) => index_value(start, "")?,
                    None => 0,
                };
                Ok(Value::iterator(IterState::Enumerate { inner, count }))
            }
            Builtin::Zip => {
                args.expect(0, usize::MAX, &[])?;
                let inners = args
                    .into_positional()
                    .iter()
                    .map(|value| self.iterator_of(value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::iterator(IterState::Zip { inners }))
            }
            Builtin::Iter => {
                args.expect(1, 1, &[])?;
                Ok(Value::Iterator(self.iterator_of(args.arg(0))?))
            }
            Builtin::Next => {
                args.expect(1, 2, &[])?;
                let Value::Iterator(state) = args.arg(0) else {
                    return Err(RuntimeError::type_error(format!(
                        "'{}' object is not an iterator",
                        args.arg(0).type_name()
                    )));
                };
                match (advance(state)?, args.get(1)) {
                    (Some(item), _) => Ok(item),
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(RuntimeError::from_object(ExceptionObject::new(
                        ExceptionKind::StopIteration,
                        Vec::new(),
                    ))),
                }
            }
            Builtin::Isinstance => {
                args.expect(2, 2, &[])?;
                let value = args.arg(0);
                let classes = match args.arg(1) {
                    Value::Class(class) => vec![*class],
                    Value::Tuple(items) => items
                        .iter()
                        .map(|item| match item {
                            Value::Class(class) => Ok(*class),
                            _ => Err(()),
                        })
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|_| {
                            RuntimeError::type_error(
                                "isinstance() arg 2 must be a type, a tuple of types, or a union",
                            )
                        })?,
                    _ => {
                        return Err(RuntimeError::type_error(
                            "isinstance() arg 2 must be a type, a tuple of types, or a union",
                        ))
                    }
                };
                Ok(Value::Bool(classes.iter().any(|class| is_instance(value, class))))
            }
            Builtin::Callable => {
                args.expect(1, 1, &[])?;
                Ok(Value::Bool(matches!(
                    args.arg(0),
                    Value::Function(_) | Value::Builtin(_) | Value::Method(_) | Value::Class(_)
                )))
            }
            Builtin::Round => {
                args.expect(1, 2, &["ndigits"])?;
                let ndigits = match args.get(1).or_else(|| args.keyword("ndigits")) {
                    Some(Value::None) | None => None,
                    Some(n) => Some(index_value(n, "")?),
                };
                match (args.arg(0), ndigits) {
                    (Value::Float(f), None) => Ok(Value::Int(float_to_int(f.round_ties_even())?)),
                    (Value::Float(f), Some(n)) => {
                        if !f.is_finite() || n > 308 {
                            return Ok(Value::Float(*f));
                        }
                        let scale = 10f64.powi(n.clamp(-308, 308) as i32);
                        Ok(Value::Float((f * scale).round_ties_even() / scale))
                    }
                    (value, ndigits) => match value.as_int() {
                        Some(n) => Ok(Value::Int(round_int(n, ndigits.unwrap_or(0))?)),
                        None => Err(RuntimeError::type_error(format!(
                            "type {} doesn't define __round__ method",
                            value.type_name()
                        ))),
                    },
                }
            }
            Builtin::Divmod => {
                args.expect(2, 2, &[])?;
                let quotient = binary_op(BinOp::FloorDiv, args.arg(0), args.arg(1))?;
                let remainder = binary_op(BinOp::Mod, args.arg(0), args.arg(1))?;
                Ok(Value::tuple(vec![quotient, remainder]))
            }
            Builtin::Pow => {
                args.expect(2, 3, &[])?;
                match args.get(2) {
                    None | Some(Value::None) => binary_op(BinOp::Pow, args.arg(0), args.arg(1)),
                    Some(_) => {
                        if !(args.arg(0).as_int().is_some()
                            && args.arg(1).as_int().is_some()
                            && args.arg(2).as_int().is_some())
                        {
                            return Err(RuntimeError::type_error(
                                "pow() 3rd argument not allowed unless all arguments are integers",
                            ));
                        }
                        Ok(Value::Int(modular_power(args.int(0)?, args.int(1)?, args.int(2)?)?))
                    }
                }
            }
            Builtin::Ord => {
                args.expect(1, 1, &[])?;
                match args.arg(0) {
                    Value::Str(s) => {
                        let mut chars = s.chars();
                        match (chars.next(), chars.next()) {
                            (Some(c), None) => Ok(Value::Int(c as i64)),
                            _ => Err(RuntimeError::type_error(format!(
                                "ord() expected a character, but string of length {} found",
                                s.chars().count()
                            ))),
                        }
                    }
                    other => Err(RuntimeError::type_error(format!(
                        "ord() expected string of length 1, but {} found",
                        other.type_name()
                    ))),
                }
            }
            Builtin::Chr => {
                args.expect(1, 1, &[])?;
                let code = args.int(0)?;
                u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .map(|c| Value::str(c.to_string()))
                    .ok_or_else(|| RuntimeError::value_error("chr() arg not in range(0x110000)"))
            }
            Builtin::Any => {
                args.expect(1, 1, &[])?;
                Ok(Value::Bool(items_of(args.arg(0))?.iter().any(Value::is_truthy)))
            }
            Builtin::All => {
                args.expect(1, 1, &[])?;
                Ok(Value::Bool(items_of(args.arg(0))?.iter().all(Value::is_truthy)))
            }
            Builtin::Hex | Builtin::Bin | Builtin::Oct => {
                args.expect(1, 1, &[])?;
                let radix = match builtin {
                    Builtin::Hex => 16,
                    Builtin::Bin => 2,
                    _ => 8,
                };
                Ok(Value::str(radix_string(args.int(0)?, radix)))
            }
            Builtin::Format => {
                args.expect(1, 2, &[])?;
                let spec = match args.get(1) {
                    Some(Value::Str(spec)) => spec.to_string(),
                    Some(other) => {
                        return Err(RuntimeError::type_error(format!(
                            "format() argument 2 must be str, not {}",
                            other.type_name()
                        )))
                    }
                    None => String::new(),
                };
                Ok(Value::str(format_value(args.arg(0), &spec)?))
            }
            Builtin::Sqrt => {
                args.expect(1, 1, &[])?;
                let x = args.float(0)?;
                if x < 0.0 {
                    return Err(math_domain_error());
                }
                Ok(Value::Float(x.sqrt()))
            }
            Builtin::Floor | Builtin::Ceil => {
                args.expect(1, 1, &[])?;
                match args.arg(0) {
                    Value::Float(f) => {
                        let rounded = if builtin == Builtin::Floor { f.floor() } else { f.ceil() };
                        Ok(Value::Int(float_to_int(rounded)?))
                    }
                    _ => Ok(Value::Int(args.int(0).map_err(|_| {
                        RuntimeError::type_error(format!(
                            "must be real number, not {}",
                            args.arg(0).type_name()
                        ))
                    })?)),
                }
            }
            Builtin::Gcd => {
                args.expect(0, usize::MAX, &[])?;
                let mut result = 0;
                for index in 0..args.len() {
                    result = gcd(result, args.int(index)?);
                }
                Ok(Value::Int(result))
            }
            Builtin::Isqrt => {
                args.expect(1, 1, &[])?;
                let n = args.int(0)?;
                if n < 0 {
                    return Err(RuntimeError::value_error(
                        "isqrt() argument must be nonnegative",
                    ));
                }
                let mut root = (n as f64).sqrt() as i64;
                while root > 0 && root.checked_mul(root).map_or(true, |square| square > n) {
                    root -= 1;
                }
                while (root + 1).checked_mul(root + 1).is_some_and(|square| square <= n) {
                    root += 1;
                }
                Ok(Value::Int(root))
            }
            Builtin::Log => {
                args.expect(1, 2, &[])?;
                let x = args.float(0)?;
                if x <= 0.0 {
                    return Err(math_domain_error());
                }
                match args.get(1) {
                    None => Ok(Value::Float(x.ln())),
                    Some(_) => {
                        let base = args.float(1)?;
                        if base <= 0.0 {
                            return Err(math_domain_error());
                        }
                        if base == 1.0 {
                            return Err(RuntimeError::zero_division("float division by zero"));
                        }
                        Ok(Value::Float(x.ln() / base.ln()))
                    }
                }
            }
            Builtin::Fabs => {
                args.expect(1, 1, &[])?;
                Ok(Value::Float(args.float(0)?.abs()))
            }
            Builtin::Sleep => {
                args.expect(1, 1, &[])?;
                let seconds = args.float(0)?;
                if seconds.is_nan() || seconds < 0.0 {
                    return Err(RuntimeError::value_error("sleep length must be non-negative"));
                }
                let duration = Duration::try_from_secs_f64(seconds)
                    .map_err(|_| RuntimeError::new(ExceptionKind::OverflowError, "sleep length is too large"))?;
                std::thread::sleep(duration);
                Ok(Value::None)
            }
            Builtin::Time => {
                args.expect(0, 0, &[])?;
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_secs_f64())
                    .unwrap_or(0.0);
                Ok(Value::Float(now))
            }
            Builtin::PerfCounter => {
                args.expect(0, 0, &[])?;
                Ok(Value::Float(self.started.elapsed().as_secs_f64()))
            }
            Builtin::Getpid => {
                args.expect(0, 0, &[])?;
                Ok(Value::Int(std::process::id() as i64))
            }
            Builtin::Abort => {
                args.expect(0, 0, &[])?;
                tracing::debug!("traced program called os.abort()");
                std::process::abort()
            }
            Builtin::Kill => {
                args.expect(2, 2, &[])?;
                crate::interpreter::modules::send_signal(args.int(0)?, args.int(1)?)?;
                Ok(Value::None)
            }
            Builtin::Exit => {
                args.expect(0, 1, &[])?;
                let exit_args = args.into_positional();
                Err(RuntimeError::from_object(ExceptionObject::new(
                    ExceptionKind::SystemExit,
                    exit_args,
                )))
            }
            Builtin::SetRecursionLimit => {
                args.expect(1, 1, &[])?;
                let limit = args.int(0)?;
                if limit < 1 {
                    return Err(RuntimeError::value_error(
                        "recursion limit must be greater or equal than 1",
                    ));
                }
                self.recursion_limit = (limit as usize).min(MAX_RECURSION_LIMIT);
                Ok(Value::None)
            }
            Builtin::GetRecursionLimit => {
                args.expect(0, 0, &[])?;
                Ok(Value::Int(self.recursion_limit as i64))
            }
        }
    }

    fn builtin_print(&mut self, args: CallArgs) -> Result<Value, RuntimeError> {
        args.expect(0, usize::MAX, &["sep", "end", "flush"])?;
        let text_arg = |name: &str, default: &str| -> Result<String, RuntimeError> {
            match args.keyword(name) {
                None => Ok(default.to_string()),
                Some(Value::Str(s)) => Ok(s.to_string()),
                Some(other) => Err(RuntimeError::type_error(format!(
                    "{} must be None or a string, not {}",
                    name,
                    other.type_name()
                ))),
            }
        };
        let sep = text_arg("sep", " ")?;
        let end = text_arg("end", "\n")?;

        let mut line = String::new();
        for (index, value) in args.positional.iter().enumerate() {
            if index > 0 {
                line.push_str(&sep);
            }
            line.push_str(&try_str(value)?);
        }
        line.push_str(&end);
        self.terminal.write_stdout(&line);
        Ok(Value::None)
    }

    /// `min`/`max`: `op` is the comparison a new best must win
    fn builtin_extreme(&mut self, args: CallArgs, op: CmpOp) -> Result<Value, RuntimeError> {
        args.expect(1, usize::MAX, &["key", "default"])?;
        let name = args.name;
        let items = if args.len() == 1 {
            items_of(args.arg(0))?
        } else {
            if args.keyword("default").is_some() {
                return Err(RuntimeError::type_error(format!(
                    "Cannot specify a default for {}() with multiple positional arguments",
                    name
                )));
            }
            args.positional.clone()
        };
        let key = args.keyword("key").cloned();

        let mut best: Option<(Value, Value)> = None;
        for item in items {
            let item_key = match &key {
                Some(key) => self.call_value(key, vec![item.clone()], Vec::new())?,
                None => item.clone(),
            };
            let better = match &best {
                None => true,
                Some((_, best_key)) => compare(op, &item_key, best_key)?,
            };
            if better {
                best = Some((item, item_key));
            }
        }
        match (best, args.keyword("default")) {
            (Some((item, _)), _) => Ok(item),
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(RuntimeError::value_error(format!(
                "{}() arg is an empty sequence",
                name
            ))),
        }
    }

    /// Sort by `key(item)` (or the items themselves), stably
    pub(crate) fn sort_values(
        &mut self,
        items: Vec<Value>,
        key: Option<&Value>,
        reverse: bool,
    ) -> Result<Vec<Value>, RuntimeError> {
        let keys = match key {
            Some(key) => items
                .iter()
                .map(|item| self.call_value(key, vec![item.clone()], Vec::new()))
                .collect::<Result<Vec<_>, _>>()?,
            None => items.clone(),
        };
        let order = stable_order(keys.len(), |a, b| {
            if reverse {
                compare(CmpOp::Gt, &keys[a], &keys[b])
            } else {
                compare(CmpOp::Lt, &keys[a], &keys[b])
            }
        })?;
        Ok(order.into_iter().map(|index| items[index].clone()).collect())
    }

    pub(crate) fn iterator_of(
        &self,
        value: &Value,
    ) -> Result<Rc<RefCell<IterState>>, RuntimeError> {
        iter_of(value).ok_or_else(|| {
            RuntimeError::type_error(format!("'{}' object is not iterable", value.type_name()))
        })
    }

    /// Call a class: conversions and exception instantiation
    pub(crate) fn construct(
        &mut self,
        class: Class,
        positional: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        let args = CallArgs::new(class.name(), positional, keywords);
        match class {
            Class::Int => {
                args.expect(0, 2, &["base"])?;
                let base = match args.get(1).or_else(|| args.keyword("base")) {
                    Some(base) => Some(index_value(base, "")?),
                    None => None,
                };
                match (args.get(0), base) {
                    (None, None) => Ok(Value::Int(0)),
                    (Some(Value::Str(text)), base) => {
                        let base = base.unwrap_or(10);
                        if base != 0 && !(2..=36).contains(&base) {
                            return Err(RuntimeError::value_error(
                                "int() base must be >= 2 and <= 36, or 0",
                            ));
                        }
                        Ok(Value::Int(parse_int(text, base as u32)?))
                    }
                    (_, Some(_)) => Err(RuntimeError::type_error(
                        "int() can't convert non-string with explicit base",
                    )),
                    (Some(Value::Float(f)), None) => Ok(Value::Int(float_to_int(*f)?)),
                    (Some(value), None) => value.as_int().map(Value::Int).ok_or_else(|| {
                        RuntimeError::type_error(format!(
                            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                            value.type_name()
                        ))
                    }),
                }
            }
            Class::Float => {
                args.expect(0, 1, &[])?;
                match args.get(0) {
                    None => Ok(Value::Float(0.0)),
                    Some(Value::Str(text)) => Ok(Value::Float(parse_float(text)?)),
                    Some(value) => value.as_float().map(Value::Float).ok_or_else(|| {
                        RuntimeError::type_error(format!(
                            "float() argument must be a string or a real number, not '{}'",
                            value.type_name()
                        ))
                    }),
                }
            }
            Class::Str => {
                args.expect(0, 1, &[])?;
                match args.get(0) {
                    None => Ok(Value::str("")),
                    Some(value) => Ok(Value::str(try_str(value)?)),
                }
            }
            Class::Bool => {
                args.expect(0, 1, &[])?;
                Ok(Value::Bool(args.get(0).is_some_and(Value::is_truthy)))
            }
            Class::List => {
                args.expect(0, 1, &[])?;
                match args.get(0) {
                    None => Ok(Value::list(Vec::new())),
                    Some(value) => Ok(Value::list(items_of(value)?)),
                }
            }
            Class::Tuple => {
                args.expect(0, 1, &[])?;
                match args.get(0) {
                    None => Ok(Value::tuple(Vec::new())),
                    Some(Value::Tuple(items)) => Ok(Value::Tuple(items.clone())),
                    Some(value) => Ok(Value::tuple(items_of(value)?)),
                }
            }
            Class::Dict => {
                args.expect(0, 1, &[])?;
                let map = RefCell::new(DictMap::new());
                if let Some(source) = args.get(0) {
                    self.dict_update(&map, source)?;
                }
                for (key, value) in &args.keywords {
                    dict_insert(&map, Value::str(key), value.clone())?;
                }
                Ok(Value::Dict(Rc::new(map)))
            }
            Class::Range => {
                args.expect(1, 3, &[])?;
                let ints = (0..args.len())
                    .map(|index| args.int(index))
                    .collect::<Result<Vec<_>, _>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => (0, 0, 1),
                };
                if step == 0 {
                    return Err(RuntimeError::value_error("range() arg 3 must not be zero"));
                }
                Ok(Value::Range(RangeValue { start, stop, step }))
            }
            Class::Type => {
                args.expect(1, 1, &[])?;
                Ok(Value::Class(args.arg(0).class()))
            }
            Class::Exception(kind) => {
                args.expect(0, usize::MAX, &[])?;
                Ok(Value::Exception(Rc::new(ExceptionObject::new(
                    kind,
                    args.into_positional(),
                ))))
            }
            Class::NoneType => {
                args.expect(0, 0, &[])?;
                Ok(Value::None)
            }
            Class::Opaque(name) => Err(RuntimeError::type_error(format!(
                "cannot create '{}' instances",
                name
            ))),
        }
    }

    /// `dict.update(source)` for a mapping or an iterable of pairs
    pub(crate) fn dict_update(&mut self, map: &RefCell<DictMap>, source: &Value) -> Result<(), RuntimeError> {
        if let Value::Dict(other) = source {
            let entries: Vec<(Value, Value)> = other.borrow().values().cloned().collect();
            for (key, value) in entries {
                dict_insert(map, key, value)?;
            }
            return Ok(());
        }
        for (index, element) in items_of(source)?.into_iter().enumerate() {
            let pair = iter_of(&element)
                .map(|_| items_of(&element))
                .transpose()?
                .ok_or_else(|| {
                    RuntimeError::type_error(format!(
                        "cannot convert dictionary update sequence element #{} to a sequence",
                        index
                    ))
                })?;
            match <[Value; 2]>::try_from(pair) {
                Ok([key, value]) => dict_insert(map, key, value)?,
                Err(pair) => {
                    return Err(RuntimeError::value_error(format!(
                        "dictionary update sequence element #{} has length {}; 2 is required",
                        index,
                        pair.len()
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("  42 ", 10).unwrap(), 42);
        assert_eq!(parse_int("-1_000", 10).unwrap(), -1000);
        assert_eq!(parse_int("ff", 16).unwrap(), 255);
        assert_eq!(parse_int("0x1F", 0).unwrap(), 31);
        assert_eq!(parse_int("0b101", 2).unwrap(), 5);

        let err = parse_int("abc", 10).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: invalid literal for int() with base 10: 'abc'"
        );
        assert!(parse_int("99999999999999999999", 10).is_err());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float(" 2.5 ").unwrap(), 2.5);
        assert!(parse_float("inf").unwrap().is_infinite());
        assert!(parse_float("x1").is_err());
    }

    #[test]
    fn test_round_int() {
        assert_eq!(round_int(1234, -2).unwrap(), 1200);
        assert_eq!(round_int(1250, -2).unwrap(), 1200);
        assert_eq!(round_int(1350, -2).unwrap(), 1400);
        assert_eq!(round_int(-1250, -2).unwrap(), -1200);
        assert_eq!(round_int(7, 2).unwrap(), 7);
    }

    #[test]
    fn test_modular_power() {
        assert_eq!(modular_power(2, 10, 1000).unwrap(), 24);
        assert_eq!(modular_power(-2, 3, 5).unwrap(), 2);
        assert_eq!(modular_power(3, 2, -4).unwrap(), -3);
        assert!(modular_power(2, 3, 0).is_err());
    }

    #[test]
    fn test_stable_order() {
        let keys = [3, 1, 2, 1, 3];
        let order = stable_order(keys.len(), |a, b| Ok(keys[a] < keys[b])).unwrap();
        assert_eq!(order, vec![1, 3, 2, 0, 4]);

        let failed = stable_order(3, |_, _| Err(RuntimeError::type_error("boom")));
        assert!(failed.is_err());
    }

    #[test]
    fn test_is_instance() {
        assert!(is_instance(&Value::Bool(true), &Class::Int));
        assert!(!is_instance(&Value::Int(1), &Class::Bool));
        let error = Value::Exception(Rc::new(ExceptionObject::new(
            ExceptionKind::ZeroDivisionError,
            Vec::new(),
        )));
        assert!(is_instance(&error, &Class::Exception(ExceptionKind::ArithmeticError)));
        assert!(!is_instance(&error, &Class::Exception(ExceptionKind::LookupError)));
    }

    #[test]
    fn test_names_are_unique() {
        let mut seen = rustc_hash::FxHashSet::default();
        for builtin in Builtin::GLOBAL {
            assert!(seen.insert(builtin.qualified_name()));
        }
        assert_eq!(Builtin::Sqrt.qualified_name(), "math.sqrt");
    }

    #[test]
    fn test_radix_strings() {
        assert_eq!(radix_string(255, 16), "0xff");
        assert_eq!(radix_string(-5, 2), "-0b101");
        assert_eq!(radix_string(8, 8), "0o10");
    }
}
