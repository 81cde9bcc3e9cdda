// Subscript and slice access

use super::check_length;
use crate::interpreter::errors::{ExceptionKind, RuntimeError};
use crate::memory::iter::{collect_values, iter_of};
use crate::memory::value::{DictMap, RangeValue, Value};
use crate::memory::MAX_SEQUENCE_LEN;
use std::cell::RefCell;

/// Evaluated `lower:upper:step`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceArgs {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub step: Option<i64>,
}

/// Evaluated subscript: a single key/index or a slice
#[derive(Debug, Clone)]
pub enum Subscript {
    Item(Value),
    Slice(SliceArgs),
}

/// A slice resolved against a sequence length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SliceBounds {
    start: i64,
    step: i64,
    count: usize,
}

impl SliceBounds {
    fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.count).map(move |k| (self.start + k as i64 * self.step) as usize)
    }
}

fn resolve_slice(len: usize, slice: &SliceArgs) -> Result<SliceBounds, RuntimeError> {
    let len = len as i64;
    let step = slice.step.unwrap_or(1);
    if step == 0 {
        return Err(RuntimeError::value_error("slice step cannot be zero"));
    }

    let clamp = |bound: i64, low: i64, high: i64| -> i64 {
        let bound = if bound < 0 { bound.saturating_add(len) } else { bound };
        bound.clamp(low, high)
    };

    let (start, stop) = if step > 0 {
        (
            slice.lower.map_or(0, |b| clamp(b, 0, len)),
            slice.upper.map_or(len, |b| clamp(b, 0, len)),
        )
    } else {
        (
            slice.lower.map_or(len - 1, |b| clamp(b, -1, len - 1)),
            slice.upper.map_or(-1, |b| clamp(b, -1, len - 1)),
        )
    };

    let count = if step > 0 && start < stop {
        ((stop - start - 1) / step + 1) as usize
    } else if step < 0 && start > stop {
        ((start - stop - 1) / (-step) + 1) as usize
    } else {
        0
    };
    Ok(SliceBounds { start, step, count })
}

/// Map a possibly negative index into `0..len`
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        Some(index as usize)
    } else {
        None
    }
}

fn sequence_index(object: &Value, index: &Value, len: usize) -> Result<usize, RuntimeError> {
    let kind = match object {
        Value::Str(_) => "string",
        other => other.type_name(),
    };
    let n = match index {
        Value::Int(_) | Value::Bool(_) => index.as_int().unwrap_or(0),
        other => {
            return Err(RuntimeError::type_error(format!(
                "{} indices must be integers or slices, not {}",
                kind,
                other.type_name()
            )))
        }
    };
    normalize_index(n, len)
        .ok_or_else(|| RuntimeError::index_error(format!("{} index out of range", kind)))
}

/// `object[subscript]`
pub fn get_subscript(object: &Value, subscript: &Subscript) -> Result<Value, RuntimeError> {
    match subscript {
        Subscript::Item(index) => get_item(object, index),
        Subscript::Slice(slice) => get_slice(object, slice),
    }
}

fn get_item(object: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match object {
        Value::List(items) => {
            let items = items.borrow();
            let i = sequence_index(object, index, items.len())?;
            Ok(items[i].clone())
        }
        Value::Tuple(items) => {
            let i = sequence_index(object, index, items.len())?;
            Ok(items[i].clone())
        }
        Value::Str(text) => {
            let len = text.chars().count();
            let i = sequence_index(object, index, len)?;
            Ok(text
                .chars()
                .nth(i)
                .map(|c| Value::str(c.to_string()))
                .unwrap_or_default())
        }
        Value::Range(range) => {
            let i = sequence_index(object, index, range.len()).map_err(|err| {
                if err.is_kind(ExceptionKind::IndexError) {
                    RuntimeError::index_error("range object index out of range")
                } else {
                    err
                }
            })?;
            Ok(range.get(i).map(Value::Int).unwrap_or_default())
        }
        Value::Dict(map) => {
            let key = index.to_key()?;
            map.borrow()
                .get(&key)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| RuntimeError::key_error(index.clone()))
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn get_slice(object: &Value, slice: &SliceArgs) -> Result<Value, RuntimeError> {
    match object {
        Value::List(items) => {
            let items = items.borrow();
            let bounds = resolve_slice(items.len(), slice)?;
            Ok(Value::list(bounds.positions().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let bounds = resolve_slice(items.len(), slice)?;
            Ok(Value::tuple(bounds.positions().map(|i| items[i].clone()).collect()))
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let bounds = resolve_slice(chars.len(), slice)?;
            Ok(Value::str(bounds.positions().map(|i| chars[i]).collect::<String>()))
        }
        Value::Range(range) => {
            let bounds = resolve_slice(range.len(), slice)?;
            let start = range.start + bounds.start * range.step;
            let step = range.step * bounds.step;
            Ok(Value::Range(RangeValue {
                start,
                stop: start + bounds.count as i64 * step,
                step,
            }))
        }
        Value::Dict(_) => Err(RuntimeError::type_error("unhashable type: 'slice'")),
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Insert into a dictionary, keeping the original key object of an existing entry
pub fn dict_insert(map: &RefCell<DictMap>, key: Value, value: Value) -> Result<(), RuntimeError> {
    let normalized = key.to_key()?;
    let mut map = map.borrow_mut();
    match map.get_mut(&normalized) {
        Some(entry) => entry.1 = value,
        None => {
            map.insert(normalized, (key, value));
        }
    }
    Ok(())
}

/// `object[subscript] = value`
pub fn set_subscript(
    object: &Value,
    subscript: &Subscript,
    value: Value,
) -> Result<(), RuntimeError> {
    match (object, subscript) {
        (Value::List(items), Subscript::Item(index)) => {
            let len = items.borrow().len();
            let i = sequence_index(object, index, len).map_err(|err| {
                if err.is_kind(ExceptionKind::IndexError) {
                    RuntimeError::index_error("list assignment index out of range")
                } else {
                    err
                }
            })?;
            items.borrow_mut()[i] = value;
            Ok(())
        }
        (Value::List(items), Subscript::Slice(slice)) => {
            let replacement = iterable_items(&value, "can only assign an iterable")?;
            let len = items.borrow().len();
            let bounds = resolve_slice(len, slice)?;
            if bounds.step == 1 {
                let start = bounds.start as usize;
                let end = start + bounds.count;
                check_length(len - bounds.count + replacement.len())?;
                items.borrow_mut().splice(start..end, replacement);
                return Ok(());
            }
            if replacement.len() != bounds.count {
                return Err(RuntimeError::value_error(format!(
                    "attempt to assign sequence of size {} to extended slice of size {}",
                    replacement.len(),
                    bounds.count
                )));
            }
            let mut items = items.borrow_mut();
            for (position, item) in bounds.positions().zip(replacement) {
                items[position] = item;
            }
            Ok(())
        }
        (Value::Dict(map), Subscript::Item(key)) => dict_insert(map, key.clone(), value),
        (Value::Dict(_), Subscript::Slice(_)) => {
            Err(RuntimeError::type_error("unhashable type: 'slice'"))
        }
        (other, _) => Err(RuntimeError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `del object[subscript]`
pub fn delete_subscript(object: &Value, subscript: &Subscript) -> Result<(), RuntimeError> {
    match (object, subscript) {
        (Value::List(items), Subscript::Item(index)) => {
            let len = items.borrow().len();
            let i = sequence_index(object, index, len).map_err(|err| {
                if err.is_kind(ExceptionKind::IndexError) {
                    RuntimeError::index_error("list assignment index out of range")
                } else {
                    err
                }
            })?;
            items.borrow_mut().remove(i);
            Ok(())
        }
        (Value::List(items), Subscript::Slice(slice)) => {
            let len = items.borrow().len();
            let bounds = resolve_slice(len, slice)?;
            let mut doomed: Vec<usize> = bounds.positions().collect();
            doomed.sort_unstable_by(|a, b| b.cmp(a));
            let mut items = items.borrow_mut();
            for position in doomed {
                items.remove(position);
            }
            Ok(())
        }
        (Value::Dict(map), Subscript::Item(key)) => {
            let normalized = key.to_key()?;
            map.borrow_mut()
                .shift_remove(&normalized)
                .map(|_| ())
                .ok_or_else(|| RuntimeError::key_error(key.clone()))
        }
        (other, _) => Err(RuntimeError::type_error(format!(
            "'{}' object doesn't support item deletion",
            other.type_name()
        ))),
    }
}

/// Collect an iterable value (no program code can run while doing so)
pub fn iterable_items(value: &Value, message: &str) -> Result<Vec<Value>, RuntimeError> {
    let iter = iter_of(value).ok_or_else(|| RuntimeError::type_error(message))?;
    collect_values(&iter, MAX_SEQUENCE_LEN)?.ok_or_else(RuntimeError::memory_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().map(|n| Value::Int(*n)).collect())
    }

    fn slice(lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> Subscript {
        Subscript::Slice(SliceArgs { lower, upper, step })
    }

    #[test]
    fn test_negative_index() {
        let list = ints(&[1, 2, 3]);
        let item = get_subscript(&list, &Subscript::Item(Value::Int(-1))).unwrap();
        assert!(matches!(item, Value::Int(3)));

        let err = get_subscript(&list, &Subscript::Item(Value::Int(3))).unwrap_err();
        assert_eq!(err.to_string(), "IndexError: list index out of range");
    }

    #[test]
    fn test_slices() {
        let list = ints(&[0, 1, 2, 3, 4, 5]);
        let evens = get_subscript(&list, &slice(None, None, Some(2))).unwrap();
        assert!(evens.equals(&ints(&[0, 2, 4])).unwrap());

        let reversed = get_subscript(&list, &slice(None, None, Some(-1))).unwrap();
        assert!(reversed.equals(&ints(&[5, 4, 3, 2, 1, 0])).unwrap());

        let middle = get_subscript(&list, &slice(Some(-4), Some(-1), None)).unwrap();
        assert!(middle.equals(&ints(&[2, 3, 4])).unwrap());

        let text = get_subscript(&Value::str("hello"), &slice(Some(1), Some(100), None)).unwrap();
        assert_eq!(text.as_str(), Some("ello"));
    }

    #[test]
    fn test_range_slice_stays_lazy() {
        let range = Value::Range(RangeValue { start: 0, stop: 1_000_000_000_000, step: 1 });
        let tail = get_subscript(&range, &slice(Some(-2), None, None)).unwrap();
        assert!(tail.equals(&Value::Range(RangeValue {
            start: 999_999_999_998,
            stop: 1_000_000_000_000,
            step: 1
        }))
        .unwrap());
    }

    #[test]
    fn test_slice_assignment() {
        let list = ints(&[0, 1, 2, 3]);
        set_subscript(&list, &slice(Some(1), Some(3), None), ints(&[9])).unwrap();
        assert!(list.equals(&ints(&[0, 9, 3])).unwrap());

        let err = set_subscript(&list, &slice(None, None, Some(2)), ints(&[1])).unwrap_err();
        assert!(err.to_string().contains("extended slice of size 2"));
    }

    #[test]
    fn test_dict_access() {
        let dict = Value::dict(DictMap::new());
        set_subscript(&dict, &Subscript::Item(Value::str("a")), Value::Int(1)).unwrap();
        let value = get_subscript(&dict, &Subscript::Item(Value::str("a"))).unwrap();
        assert!(matches!(value, Value::Int(1)));

        let err = get_subscript(&dict, &Subscript::Item(Value::str("b"))).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'b'");

        delete_subscript(&dict, &Subscript::Item(Value::str("a"))).unwrap();
        assert!(!dict.is_truthy());
    }

    #[test]
    fn test_immutable_targets() {
        let err = set_subscript(
            &Value::tuple(vec![Value::Int(1)]),
            &Subscript::Item(Value::Int(0)),
            Value::None,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: 'tuple' object does not support item assignment"
        );
    }
}
