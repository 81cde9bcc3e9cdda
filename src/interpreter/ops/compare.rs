// Comparison and membership operators

use super::float_pair;
use crate::interpreter::errors::RuntimeError;
use crate::memory::value::Value;
use crate::parser::ast::CmpOp;
use std::cmp::Ordering;

/// Evaluate one link of a comparison chain
pub fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, RuntimeError> {
    let ordering = |expected: fn(Ordering) -> bool| -> Result<bool, RuntimeError> {
        Ok(partial_order(left, right, op.symbol())?.is_some_and(expected))
    };
    match op {
        CmpOp::Eq => Ok(left.equals(right)?),
        CmpOp::Ne => Ok(!left.equals(right)?),
        CmpOp::Lt => ordering(Ordering::is_lt),
        CmpOp::Le => ordering(Ordering::is_le),
        CmpOp::Gt => ordering(Ordering::is_gt),
        CmpOp::Ge => ordering(Ordering::is_ge),
        CmpOp::Is => Ok(left.is_same(right)),
        CmpOp::IsNot => Ok(!left.is_same(right)),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => Ok(!contains(right, left)?),
    }
}

/// Ordering between two values; `None` when unordered (NaN)
pub fn partial_order(
    left: &Value,
    right: &Value,
    symbol: &str,
) -> Result<Option<Ordering>, RuntimeError> {
    if let Some((a, b)) = float_pair(left, right) {
        return Ok(a.partial_cmp(&b));
    }
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return Ok(Some(a.cmp(&b)));
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => {
            let (a, b) = (a.borrow().clone(), b.borrow().clone());
            sequence_order(&a, &b, symbol)
        }
        (Value::Tuple(a), Value::Tuple(b)) => sequence_order(a, b, symbol),
        _ => Err(RuntimeError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            symbol,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn sequence_order(
    a: &[Value],
    b: &[Value],
    symbol: &str,
) -> Result<Option<Ordering>, RuntimeError> {
    for (x, y) in a.iter().zip(b.iter()) {
        if !(x.is_same(y) || x.equals(y)?) {
            return partial_order(x, y, symbol);
        }
    }
    Ok(Some(a.len().cmp(&b.len())))
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool, RuntimeError> {
    match container {
        Value::Str(text) => match item {
            Value::Str(needle) => Ok(text.contains(&**needle)),
            other => Err(RuntimeError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => {
            let items = items.borrow().clone();
            any_equal(&items, item)
        }
        Value::Tuple(items) => any_equal(items, item),
        Value::Dict(map) => {
            let key = item.to_key()?;
            Ok(map.borrow().contains_key(&key))
        }
        Value::Range(range) => match item {
            Value::Float(f) if f.fract() != 0.0 || !f.is_finite() => Ok(false),
            Value::Float(f) => Ok(range.contains(*f as i64)),
            other => Ok(other.as_int().is_some_and(|n| range.contains(n))),
        },
        Value::Iterator(state) => loop {
            let next = state.borrow_mut().next_value()?;
            match next {
                Some(value) => {
                    if value.is_same(item) || value.equals(item)? {
                        return Ok(true);
                    }
                }
                None => return Ok(false),
            }
        },
        other => Err(RuntimeError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn any_equal(items: &[Value], item: &Value) -> Result<bool, RuntimeError> {
    for candidate in items {
        if candidate.is_same(item) || candidate.equals(item)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chained_semantics() {
        assert!(compare(CmpOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap());
        assert!(compare(CmpOp::Ge, &Value::str("b"), &Value::str("a")).unwrap());
        assert!(!compare(CmpOp::Lt, &Value::Float(f64::NAN), &Value::Int(1)).unwrap());
    }

    #[test]
    fn test_sequence_ordering() {
        let a = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::tuple(vec![Value::Int(1), Value::Int(3)]);
        assert!(compare(CmpOp::Lt, &a, &b).unwrap());
        let short = Value::list(vec![Value::Int(1)]);
        let long = Value::list(vec![Value::Int(1), Value::Int(0)]);
        assert!(compare(CmpOp::Lt, &short, &long).unwrap());
    }

    #[test]
    fn test_unorderable() {
        let err = compare(CmpOp::Lt, &Value::Int(1), &Value::str("a")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: '<' not supported between instances of 'int' and 'str'"
        );
    }

    #[test]
    fn test_membership() {
        let list = Value::list(vec![Value::Int(1), Value::str("x")]);
        assert!(compare(CmpOp::In, &Value::Float(1.0), &list).unwrap());
        assert!(compare(CmpOp::NotIn, &Value::Int(2), &list).unwrap());
        assert!(compare(CmpOp::In, &Value::str("ell"), &Value::str("hello")).unwrap());
        assert!(contains(&Value::Int(3), &Value::Int(1)).is_err());
    }
}
