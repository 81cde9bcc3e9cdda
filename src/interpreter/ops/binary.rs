// Arithmetic and bitwise binary operators

use super::{check_length, float_pair, int_pair};
use crate::interpreter::errors::{ExceptionKind, RuntimeError};
use crate::interpreter::format::percent_format;
use crate::memory::value::Value;
use crate::parser::ast::BinOp;

/// Evaluate `left <op> right`
pub fn binary_op(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match op {
        BinOp::Add => add(left, right),
        BinOp::Sub => arithmetic(op, left, right, i64::checked_sub, |a, b| a - b),
        BinOp::Mul => multiply(left, right),
        BinOp::Div => true_divide(left, right),
        BinOp::FloorDiv => floor_divide(left, right),
        BinOp::Mod => modulo(left, right),
        BinOp::Pow => power(left, right),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => bitwise(op, left, right),
        BinOp::Shl | BinOp::Shr => shift(op, left, right),
    }
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> RuntimeError {
    let symbol = match op {
        BinOp::Pow => "** or pow()",
        other => other.symbol(),
    };
    RuntimeError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol,
        left.type_name(),
        right.type_name()
    ))
}

fn arithmetic(
    op: BinOp,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    if let Some((a, b)) = float_pair(left, right) {
        return Ok(Value::Float(float_op(a, b)));
    }
    match int_pair(left, right) {
        Some((a, b)) => int_op(a, b).map(Value::Int).ok_or_else(RuntimeError::overflow),
        None => Err(unsupported(op, left, right)),
    }
}

fn add(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => {
            check_length(a.len() + b.len())?;
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Value::str(joined))
        }
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            check_length(items.len())?;
            Ok(Value::list(items))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            let items: Vec<Value> = a.iter().chain(b.iter()).cloned().collect();
            check_length(items.len())?;
            Ok(Value::tuple(items))
        }
        (Value::Str(_) | Value::List(_) | Value::Tuple(_), other) => {
            Err(RuntimeError::type_error(format!(
                "can only concatenate {} (not \"{}\") to {}",
                left.type_name(),
                other.type_name(),
                left.type_name()
            )))
        }
        _ => arithmetic(BinOp::Add, left, right, i64::checked_add, |a, b| a + b),
    }
}

fn repeat_count(count: i64) -> usize {
    count.max(0) as usize
}

fn multiply(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let (sequence, count) = match (left, right) {
        (Value::Str(_) | Value::List(_) | Value::Tuple(_), Value::Int(_) | Value::Bool(_)) => {
            (left, right.as_int().unwrap_or(0))
        }
        (Value::Int(_) | Value::Bool(_), Value::Str(_) | Value::List(_) | Value::Tuple(_)) => {
            (right, left.as_int().unwrap_or(0))
        }
        _ => return arithmetic(BinOp::Mul, left, right, i64::checked_mul, |a, b| a * b),
    };

    let count = repeat_count(count);
    match sequence {
        Value::Str(s) => {
            check_length(s.len().saturating_mul(count))?;
            Ok(Value::str(s.repeat(count)))
        }
        Value::List(items) => {
            let items = items.borrow();
            check_length(items.len().saturating_mul(count))?;
            Ok(Value::list(repeat_items(&items, count)))
        }
        Value::Tuple(items) => {
            check_length(items.len().saturating_mul(count))?;
            Ok(Value::tuple(repeat_items(items, count)))
        }
        _ => Err(unsupported(BinOp::Mul, left, right)),
    }
}

fn repeat_items(items: &[Value], count: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    out
}

fn true_divide(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let (a, b) = match (left.as_float(), right.as_float()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(unsupported(BinOp::Div, left, right)),
    };
    if b == 0.0 {
        let message = if float_pair(left, right).is_some() {
            "float division by zero"
        } else {
            "division by zero"
        };
        return Err(RuntimeError::zero_division(message));
    }
    // Exact for integers that fit in the mantissa
    if let Some((x, y)) = int_pair(left, right) {
        if let (Some(0), Some(quotient)) = (x.checked_rem(y), x.checked_div(y)) {
            return Ok(Value::Float(quotient as f64));
        }
    }
    Ok(Value::Float(a / b))
}

/// Floor division and modulo for integers, with the divisor's sign
pub(crate) fn int_divmod(a: i64, b: i64) -> Result<(i64, i64), RuntimeError> {
    let quotient = a.checked_div(b).ok_or_else(RuntimeError::overflow)?;
    let remainder = a.wrapping_rem(b);
    if remainder != 0 && ((remainder < 0) != (b < 0)) {
        Ok((quotient - 1, remainder + b))
    } else {
        Ok((quotient, remainder))
    }
}

pub(crate) fn float_mod(a: f64, b: f64) -> f64 {
    let remainder = a % b;
    if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
        remainder + b
    } else if remainder == 0.0 {
        0.0_f64.copysign(b)
    } else {
        remainder
    }
}

fn floor_divide(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    if let Some((a, b)) = float_pair(left, right) {
        if b == 0.0 {
            return Err(RuntimeError::zero_division("float floor division by zero"));
        }
        return Ok(Value::Float(((a - float_mod(a, b)) / b).round()));
    }
    match int_pair(left, right) {
        Some((_, 0)) => Err(RuntimeError::zero_division(
            "integer division or modulo by zero",
        )),
        Some((a, b)) => Ok(Value::Int(int_divmod(a, b)?.0)),
        None => Err(unsupported(BinOp::FloorDiv, left, right)),
    }
}

fn modulo(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    if let Value::Str(template) = left {
        return percent_format(template, right).map(Value::str);
    }
    if let Some((a, b)) = float_pair(left, right) {
        if b == 0.0 {
            return Err(RuntimeError::zero_division("float modulo by zero"));
        }
        return Ok(Value::Float(float_mod(a, b)));
    }
    match int_pair(left, right) {
        Some((_, 0)) => Err(RuntimeError::zero_division("integer modulo by zero")),
        Some((a, b)) => Ok(Value::Int(int_divmod(a, b)?.1)),
        None => Err(unsupported(BinOp::Mod, left, right)),
    }
}

fn power(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    if let Some((base, exponent)) = int_pair(left, right) {
        if exponent >= 0 {
            return int_power(base, exponent).map(Value::Int);
        }
        if base == 0 {
            return Err(RuntimeError::zero_division(
                "0.0 cannot be raised to a negative power",
            ));
        }
        return Ok(Value::Float((base as f64).powf(exponent as f64)));
    }

    let (base, exponent) = match float_pair(left, right) {
        Some(pair) => pair,
        None => return Err(unsupported(BinOp::Pow, left, right)),
    };
    if base == 0.0 && exponent < 0.0 {
        return Err(RuntimeError::zero_division(
            "0.0 cannot be raised to a negative power",
        ));
    }
    if base < 0.0 && exponent.fract() != 0.0 && exponent.is_finite() {
        return Err(RuntimeError::value_error(
            "negative number cannot be raised to a fractional power",
        ));
    }
    let result = base.powf(exponent);
    if result.is_infinite() && base.is_finite() && exponent.is_finite() {
        return Err(RuntimeError::new(
            ExceptionKind::OverflowError,
            "(34, 'Numerical result out of range')",
        ));
    }
    Ok(Value::Float(result))
}

pub(crate) fn int_power(base: i64, exponent: i64) -> Result<i64, RuntimeError> {
    match base {
        0 | 1 => return Ok(if exponent == 0 { 1 } else { base }),
        -1 => return Ok(if exponent % 2 == 0 { 1 } else { -1 }),
        _ => {}
    }
    u32::try_from(exponent)
        .ok()
        .and_then(|exponent| base.checked_pow(exponent))
        .ok_or_else(RuntimeError::overflow)
}

fn bitwise(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    if let (Value::Bool(a), Value::Bool(b)) = (left, right) {
        let result = match op {
            BinOp::BitAnd => a & b,
            BinOp::BitOr => a | b,
            _ => a ^ b,
        };
        return Ok(Value::Bool(result));
    }
    if float_pair(left, right).is_some() {
        return Err(unsupported(op, left, right));
    }
    let (a, b) = int_pair(left, right).ok_or_else(|| unsupported(op, left, right))?;
    let result = match op {
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        _ => a ^ b,
    };
    Ok(Value::Int(result))
}

fn shift(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    if float_pair(left, right).is_some() {
        return Err(unsupported(op, left, right));
    }
    let (a, b) = int_pair(left, right).ok_or_else(|| unsupported(op, left, right))?;
    if b < 0 {
        return Err(RuntimeError::value_error("negative shift count"));
    }
    let result = if op == BinOp::Shl {
        if a == 0 {
            0
        } else if b >= 64 {
            return Err(RuntimeError::overflow());
        } else {
            let wide = (a as i128) << b;
            i64::try_from(wide).map_err(|_| RuntimeError::overflow())?
        }
    } else if b >= 64 {
        if a < 0 {
            -1
        } else {
            0
        }
    } else {
        a >> b
    };
    Ok(Value::Int(result))
}

/// `left += right`: lists extend in place, everything else rebinds
pub fn inplace_op(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    if let (BinOp::Add, Value::List(items)) = (op, left) {
        let extra: Vec<Value> = match right {
            Value::List(other) => other.borrow().clone(),
            Value::Tuple(other) => other.to_vec(),
            Value::Str(text) => text.chars().map(|c| Value::str(c.to_string())).collect(),
            other => {
                return Err(RuntimeError::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )))
            }
        };
        check_length(items.borrow().len() + extra.len())?;
        items.borrow_mut().extend(extra);
        return Ok(left.clone());
    }
    if let (BinOp::Mul, Value::List(items)) = (op, left) {
        if let Some(count) = right.as_int() {
            let repeated = {
                let current = items.borrow();
                check_length(current.len().saturating_mul(repeat_count(count)))?;
                repeat_items(&current, repeat_count(count))
            };
            *items.borrow_mut() = repeated;
            return Ok(left.clone());
        }
    }
    binary_op(op, left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Value {
        Value::Int(n)
    }

    #[test]
    fn test_integer_arithmetic() {
        assert!(matches!(binary_op(BinOp::Add, &int(2), &int(3)).unwrap(), Value::Int(5)));
        assert!(matches!(binary_op(BinOp::FloorDiv, &int(-7), &int(2)).unwrap(), Value::Int(-4)));
        assert!(matches!(binary_op(BinOp::Mod, &int(-7), &int(2)).unwrap(), Value::Int(1)));
        assert!(matches!(binary_op(BinOp::Mod, &int(7), &int(-2)).unwrap(), Value::Int(-1)));
        assert!(matches!(binary_op(BinOp::Pow, &int(2), &int(10)).unwrap(), Value::Int(1024)));
        assert!(matches!(binary_op(BinOp::Add, &Value::Bool(true), &Value::Bool(true)).unwrap(), Value::Int(2)));
    }

    #[test]
    fn test_true_division_returns_float() {
        match binary_op(BinOp::Div, &int(7), &int(2)).unwrap() {
            Value::Float(f) => assert_eq!(f, 3.5),
            other => panic!("Expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_division_by_zero() {
        let err = binary_op(BinOp::Div, &int(1), &int(0)).unwrap_err();
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
        let err = binary_op(BinOp::Mod, &int(1), &int(0)).unwrap_err();
        assert!(err.is_kind(ExceptionKind::ZeroDivisionError));
    }

    #[test]
    fn test_overflow() {
        let err = binary_op(BinOp::Mul, &int(i64::MAX), &int(2)).unwrap_err();
        assert!(err.is_kind(ExceptionKind::OverflowError));
        let err = binary_op(BinOp::Pow, &int(10), &int(30)).unwrap_err();
        assert!(err.is_kind(ExceptionKind::OverflowError));
    }

    #[test]
    fn test_sequence_operators() {
        let joined = binary_op(BinOp::Add, &Value::str("ab"), &Value::str("c")).unwrap();
        assert_eq!(joined.as_str(), Some("abc"));

        let repeated = binary_op(BinOp::Mul, &int(2), &Value::list(vec![int(0)])).unwrap();
        assert!(repeated.equals(&Value::list(vec![int(0), int(0)])).unwrap());

        let err = binary_op(BinOp::Add, &Value::str("a"), &int(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: can only concatenate str (not \"int\") to str"
        );

        let err = binary_op(BinOp::Mul, &Value::list(vec![int(0)]), &int(20_000_000)).unwrap_err();
        assert!(err.is_kind(ExceptionKind::MemoryError));
        let err = binary_op(BinOp::Mul, &int(20_000_000), &Value::str("ab")).unwrap_err();
        assert!(err.is_kind(ExceptionKind::MemoryError));

        let empty = binary_op(BinOp::Mul, &Value::list(Vec::new()), &int(20_000_000)).unwrap();
        assert!(empty.equals(&Value::list(Vec::new())).unwrap());
    }

    #[test]
    fn test_unsupported_operands() {
        let err = binary_op(BinOp::Sub, &Value::str("a"), &int(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: unsupported operand type(s) for -: 'str' and 'int'"
        );
    }

    #[test]
    fn test_shifts_and_bits() {
        assert!(matches!(binary_op(BinOp::Shl, &int(1), &int(10)).unwrap(), Value::Int(1024)));
        assert!(matches!(binary_op(BinOp::Shr, &int(-8), &int(1)).unwrap(), Value::Int(-4)));
        assert!(matches!(binary_op(BinOp::BitXor, &int(6), &int(3)).unwrap(), Value::Int(5)));
        assert!(matches!(
            binary_op(BinOp::BitAnd, &Value::Bool(true), &Value::Bool(false)).unwrap(),
            Value::Bool(false)
        ));
    }

    #[test]
    fn test_list_inplace_add_aliases() {
        let list = Value::list(vec![int(1)]);
        let alias = list.clone();
        let result = inplace_op(BinOp::Add, &list, &Value::list(vec![int(2)])).unwrap();
        assert!(result.is_same(&alias));
        if let Value::List(items) = &alias {
            assert_eq!(items.borrow().len(), 2);
        }
    }
}
