//! Iterator state for `for` loops and the iterator built-ins
//!
//! List iteration is live: appending to a list while iterating over it
//! extends the loop. Dictionary iteration works
//! on a snapshot of the keys taken when the iterator is created.

use super::value::{Value, ValueError};
use std::cell::RefCell;
use std::rc::Rc;

/// Shared, mutable iterator state
pub type IterRef = Rc<RefCell<IterState>>;

#[derive(Debug)]
pub enum IterState {
    /// Index into a list (live) or tuple
    Sequence { items: Value, index: usize },
    /// Characters of a string, by byte offset
    Chars { text: Rc<str>, offset: usize },
    Range { next: i64, remaining: usize, step: i64 },
    /// Pre-collected values (dictionary keys, `reversed`)
    Values {
        items: Vec<Value>,
        index: usize,
        kind: &'static str,
    },
    Enumerate { inner: IterRef, count: i64 },
    Zip { inners: Vec<IterRef> },
}

impl IterState {
    /// Name reported by `type(it)`
    pub fn type_name(&self) -> &'static str {
        match self {
            IterState::Sequence { items: Value::Tuple(_), .. } => "tuple_iterator",
            IterState::Sequence { .. } => "list_iterator",
            IterState::Chars { .. } => "str_iterator",
            IterState::Range { .. } => "range_iterator",
            IterState::Values { kind, .. } => kind,
            IterState::Enumerate { .. } => "enumerate",
            IterState::Zip { .. } => "zip",
        }
    }

    /// Advance; `Ok(None)` when exhausted
    pub fn next_value(&mut self) -> Result<Option<Value>, ValueError> {
        match self {
            IterState::Sequence { items, index } => {
                let item = match items {
                    Value::List(list) => list
                        .try_borrow()
                        .map_err(|_| ValueError::Busy("list"))?
                        .get(*index)
                        .cloned(),
                    Value::Tuple(tuple) => tuple.get(*index).cloned(),
                    _ => None,
                };
                if item.is_some() {
                    *index += 1;
                }
                Ok(item)
            }
            IterState::Chars { text, offset } => match text[*offset..].chars().next() {
                Some(ch) => {
                    *offset += ch.len_utf8();
                    Ok(Some(Value::str(ch.encode_utf8(&mut [0; 4]))))
                }
                None => Ok(None),
            },
            IterState::Range {
                next,
                remaining,
                step,
            } => {
                if *remaining == 0 {
                    return Ok(None);
                }
                let value = *next;
                *remaining -= 1;
                if *remaining > 0 {
                    *next = next.wrapping_add(*step);
                }
                Ok(Some(Value::Int(value)))
            }
            IterState::Values { items, index, .. } => {
                let item = items.get(*index).cloned();
                if item.is_some() {
                    *index += 1;
                }
                Ok(item)
            }
            IterState::Enumerate { inner, count } => {
                let item = inner
                    .try_borrow_mut()
                    .map_err(|_| ValueError::Busy("iterator"))?
                    .next_value()?;
                match item {
                    Some(item) => {
                        let pair = Value::tuple(vec![Value::Int(*count), item]);
                        *count += 1;
                        Ok(Some(pair))
                    }
                    None => Ok(None),
                }
            }
            IterState::Zip { inners } => {
                if inners.is_empty() {
                    return Ok(None);
                }
                let mut row = Vec::with_capacity(inners.len());
                for inner in inners.iter() {
                    let item = inner
                        .try_borrow_mut()
                        .map_err(|_| ValueError::Busy("iterator"))?
                        .next_value()?;
                    match item {
                        Some(item) => row.push(item),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::tuple(row)))
            }
        }
    }
}

/// Obtain an iterator over `value`, or `None` if it is not iterable.
/// Iterators are their own iterators.
pub fn iter_of(value: &Value) -> Option<IterRef> {
    let state = match value {
        Value::Iterator(state) => return Some(state.clone()),
        Value::List(_) | Value::Tuple(_) => IterState::Sequence {
            items: value.clone(),
            index: 0,
        },
        Value::Str(text) => IterState::Chars {
            text: text.clone(),
            offset: 0,
        },
        Value::Range(range) => IterState::Range {
            next: range.start,
            remaining: range.len(),
            step: range.step,
        },
        Value::Dict(map) => IterState::Values {
            items: map.try_borrow().ok()?.values().map(|(key, _)| key.clone()).collect(),
            index: 0,
            kind: "dict_keyiterator",
        },
        _ => return None,
    };
    Some(Rc::new(RefCell::new(state)))
}

/// Drain an iterable into a vector, failing once `limit` items are exceeded
pub fn collect_values(iter: &IterRef, limit: usize) -> Result<Option<Vec<Value>>, ValueError> {
    let mut items = Vec::new();
    loop {
        let next = iter
            .try_borrow_mut()
            .map_err(|_| ValueError::Busy("iterator"))?
            .next_value()?;
        match next {
            Some(item) => {
                if items.len() >= limit {
                    return Ok(None);
                }
                items.push(item);
            }
            None => return Ok(Some(items)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::value::RangeValue;

    fn drain(value: &Value) -> Vec<Value> {
        let iter = iter_of(value).unwrap();
        collect_values(&iter, usize::MAX).unwrap().unwrap()
    }

    #[test]
    fn test_list_iteration_is_live() {
        let list = Value::list(vec![Value::Int(1)]);
        let iter = iter_of(&list).unwrap();
        assert!(matches!(iter.borrow_mut().next_value().unwrap(), Some(Value::Int(1))));
        if let Value::List(items) = &list {
            items.borrow_mut().push(Value::Int(2));
        }
        assert!(matches!(iter.borrow_mut().next_value().unwrap(), Some(Value::Int(2))));
        assert!(iter.borrow_mut().next_value().unwrap().is_none());
    }

    #[test]
    fn test_string_and_range() {
        let chars = drain(&Value::str("hé"));
        assert_eq!(chars.len(), 2);
        assert_eq!(chars[1].as_str(), Some("é"));

        let range = drain(&Value::Range(RangeValue { start: 5, stop: 0, step: -2 }));
        let numbers: Vec<i64> = range.iter().filter_map(|v| v.as_int()).collect();
        assert_eq!(numbers, vec![5, 3, 1]);
    }

    #[test]
    fn test_zip_stops_at_shortest() {
        let a = iter_of(&Value::list(vec![Value::Int(1), Value::Int(2)])).unwrap();
        let b = iter_of(&Value::str("x")).unwrap();
        let zip = Rc::new(RefCell::new(IterState::Zip { inners: vec![a, b] }));
        let rows = collect_values(&zip, usize::MAX).unwrap().unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_collect_limit() {
        let iter = iter_of(&Value::Range(RangeValue { start: 0, stop: 10, step: 1 })).unwrap();
        assert!(collect_values(&iter, 5).unwrap().is_none());
    }

    #[test]
    fn test_not_iterable() {
        assert!(iter_of(&Value::Int(3)).is_none());
    }
}
