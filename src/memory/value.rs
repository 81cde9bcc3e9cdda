//! Runtime value representation
//!
//! This module defines the [`Value`] enum, which represents all possible
//! runtime values of the traced language. Scalars are stored inline; mutable
//! containers are shared through `Rc<RefCell<..>>` so that aliasing behaves
//! like reference semantics in the source language.
//!
//! # Value Types
//!
//! - Scalars: [`Value::None`], [`Value::Bool`], [`Value::Int`] (64-bit),
//!   [`Value::Float`], [`Value::Str`]
//! - Containers: [`Value::List`], [`Value::Tuple`], [`Value::Dict`]
//!   (insertion ordered), [`Value::Range`]
//! - Callables: [`Value::Function`], [`Value::Builtin`], [`Value::Method`],
//!   [`Value::Class`]
//! - Other objects: [`Value::Module`], [`Value::Exception`], [`Value::Iterator`]
//!
//! # Equality and Hashing
//!
//! [`Value::equals`] implements value equality (`1 == 1.0 == True`), bounded
//! by a nesting depth so self-referential structures fail instead of
//! overflowing the stack. Dictionary keys are normalized through
//! [`Value::to_key`] so that equal numbers hash alike.

use super::iter::IterState;
use crate::interpreter::builtins::Builtin;
use crate::interpreter::errors::{ExceptionKind, ExceptionObject};
use crate::parser::ast::FunctionDef;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// Maximum container nesting followed by equality, hashing and copying
pub const MAX_VALUE_DEPTH: usize = 200;

/// A variable namespace (module globals or function locals)
pub type Namespace = Rc<RefCell<IndexMap<String, Value>>>;

/// Create an empty namespace
pub fn new_namespace() -> Namespace {
    Rc::new(RefCell::new(IndexMap::new()))
}

/// Dictionary storage: normalized key -> (original key, value)
pub type DictMap = IndexMap<DictKey, (Value, Value)>;

/// Errors from value-level operations that do not need the interpreter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("maximum recursion depth exceeded in comparison")]
    TooDeep,

    #[error("unhashable type: '{0}'")]
    Unhashable(&'static str),

    #[error("{0} object is being modified")]
    Busy(&'static str),
}

/// Runtime values in the interpreter
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<DictMap>>),
    Range(RangeValue),
    Function(Rc<Function>),
    Builtin(Builtin),
    Method(Rc<BoundMethod>),
    Class(Class),
    Module(Rc<Module>),
    Exception(Rc<ExceptionObject>),
    Iterator(Rc<RefCell<IterState>>),
}

/// A user-defined function (from `def` or `lambda`)
#[derive(Debug)]
pub struct Function {
    pub def: Rc<FunctionDef>,
    /// Defaults for the trailing parameters, evaluated at definition time
    pub defaults: Vec<Value>,
    pub globals: Namespace,
    /// Namespaces of enclosing function frames, innermost first
    pub closure: Vec<Namespace>,
    pub filename: Rc<str>,
}

/// A built-in method bound to its receiver (`items.append`)
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: &'static str,
}

/// An imported module
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub namespace: Namespace,
}

/// `range(start, stop, step)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn len(&self) -> usize {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let count = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / (-step) + 1
        } else {
            0
        };
        count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at a non-negative index
    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        Some((self.start as i128 + index as i128 * self.step as i128) as i64)
    }

    pub fn contains(&self, n: i64) -> bool {
        let (start, step) = (self.start as i128, self.step as i128);
        let n = n as i128;
        let in_bounds = if step > 0 {
            n >= start && n < self.stop as i128
        } else {
            n <= start && n > self.stop as i128
        };
        in_bounds && (n - start) % step == 0
    }
}

/// Types that can be named by `type(x)` and passed to `isinstance`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
    Dict,
    Range,
    Type,
    Exception(ExceptionKind),
    /// Non-constructible runtime types (functions, modules, iterators)
    Opaque(&'static str),
}

impl Class {
    pub fn name(&self) -> &'static str {
        match self {
            Class::NoneType => "NoneType",
            Class::Bool => "bool",
            Class::Int => "int",
            Class::Float => "float",
            Class::Str => "str",
            Class::List => "list",
            Class::Tuple => "tuple",
            Class::Dict => "dict",
            Class::Range => "range",
            Class::Type => "type",
            Class::Exception(kind) => kind.name(),
            Class::Opaque(name) => name,
        }
    }
}

/// Normalized, hashable form of a dictionary key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<DictKey>),
    Range(RangeValue),
    Named(&'static str),
    Identity(usize),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(items.into())
    }

    pub fn dict(map: DictMap) -> Value {
        Value::Dict(Rc::new(RefCell::new(map)))
    }

    pub fn iterator(state: IterState) -> Value {
        Value::Iterator(Rc::new(RefCell::new(state)))
    }

    /// Name of this value's type, as `type(x).__name__` reports it
    pub fn type_name(&self) -> &'static str {
        self.class().name()
    }

    /// The class of this value
    pub fn class(&self) -> Class {
        match self {
            Value::None => Class::NoneType,
            Value::Bool(_) => Class::Bool,
            Value::Int(_) => Class::Int,
            Value::Float(_) => Class::Float,
            Value::Str(_) => Class::Str,
            Value::List(_) => Class::List,
            Value::Tuple(_) => Class::Tuple,
            Value::Dict(_) => Class::Dict,
            Value::Range(_) => Class::Range,
            Value::Function(_) => Class::Opaque("function"),
            Value::Builtin(_) | Value::Method(_) => Class::Opaque("builtin_function_or_method"),
            Value::Class(_) => Class::Type,
            Value::Module(_) => Class::Opaque("module"),
            Value::Exception(exc) => Class::Exception(exc.kind),
            Value::Iterator(state) => Class::Opaque(
                state
                    .try_borrow()
                    .map(|state| state.type_name())
                    .unwrap_or("iterator"),
            ),
        }
    }

    /// Truth value testing
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => items.try_borrow().map_or(true, |items| !items.is_empty()),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(map) => map.try_borrow().map_or(true, |map| !map.is_empty()),
            Value::Range(range) => !range.is_empty(),
            _ => true,
        }
    }

    /// Numeric view used by arithmetic (bools are ints)
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            Value::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Identity comparison (`is`)
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b) || (a.is_empty() && b.is_empty()),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Value equality (`==`)
    pub fn equals(&self, other: &Value) -> Result<bool, ValueError> {
        self.equals_at(other, 0)
    }

    fn equals_at(&self, other: &Value, depth: usize) -> Result<bool, ValueError> {
        if depth > MAX_VALUE_DEPTH {
            return Err(ValueError::TooDeep);
        }

        match (self, other) {
            (Value::Float(a), _) => Ok(other.as_float().is_some_and(|b| *a == b)),
            (_, Value::Float(b)) => Ok(self.as_float().is_some_and(|a| a == *b)),
            (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
                Ok(self.as_int() == other.as_int())
            }
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let a = a.try_borrow().map_err(|_| ValueError::Busy("list"))?;
                let b = b.try_borrow().map_err(|_| ValueError::Busy("list"))?;
                sequences_equal(&a, &b, depth)
            }
            (Value::Tuple(a), Value::Tuple(b)) => sequences_equal(a, b, depth),
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let a = a.try_borrow().map_err(|_| ValueError::Busy("dict"))?;
                let b = b.try_borrow().map_err(|_| ValueError::Busy("dict"))?;
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (key, (_, value)) in a.iter() {
                    match b.get(key) {
                        Some((_, other_value)) => {
                            if !identical_or_equal(value, other_value, depth)? {
                                return Ok(false);
                            }
                        }
                        None => return Ok(false),
                    }
                }
                Ok(true)
            }
            (Value::Range(a), Value::Range(b)) => {
                let (len_a, len_b) = (a.len(), b.len());
                Ok(len_a == len_b
                    && (len_a == 0 || (a.start == b.start && (len_a == 1 || a.step == b.step))))
            }
            (Value::Exception(a), Value::Exception(b)) => Ok(Rc::ptr_eq(a, b)),
            _ => Ok(self.is_same(other)),
        }
    }

    /// Normalize into a dictionary key; mutable containers are unhashable
    pub fn to_key(&self) -> Result<DictKey, ValueError> {
        self.to_key_at(0)
    }

    fn to_key_at(&self, depth: usize) -> Result<DictKey, ValueError> {
        if depth > MAX_VALUE_DEPTH {
            return Err(ValueError::TooDeep);
        }
        let key = match self {
            Value::None => DictKey::None,
            Value::Bool(b) => DictKey::Int(*b as i64),
            Value::Int(n) => DictKey::Int(*n),
            Value::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    DictKey::Int(*f as i64)
                } else {
                    DictKey::Float(f.to_bits())
                }
            }
            Value::Str(s) => DictKey::Str(s.clone()),
            Value::Tuple(items) => DictKey::Tuple(
                items
                    .iter()
                    .map(|item| item.to_key_at(depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Range(range) => DictKey::Range(*range),
            Value::Builtin(builtin) => DictKey::Named(builtin.qualified_name()),
            Value::Class(class) => DictKey::Named(class.name()),
            Value::Function(f) => DictKey::Identity(Rc::as_ptr(f) as usize),
            Value::Module(m) => DictKey::Identity(Rc::as_ptr(m) as usize),
            Value::Exception(e) => DictKey::Identity(Rc::as_ptr(e) as usize),
            Value::Iterator(i) => DictKey::Identity(Rc::as_ptr(i) as *const u8 as usize),
            Value::Method(m) => DictKey::Identity(Rc::as_ptr(m) as usize),
            Value::List(_) | Value::Dict(_) => return Err(ValueError::Unhashable(self.type_name())),
        };
        Ok(key)
    }

    /// Structural copy that shares nothing mutable with the original;
    /// aliasing and cycles inside the value are preserved
    pub fn deep_copy(&self) -> Value {
        let mut memo = FxHashMap::default();
        self.deep_copy_with(&mut memo, 0)
    }

    /// Containers nested deeper than [`MAX_VALUE_DEPTH`] are copied as fresh
    /// empty containers, so the copy never shares them with the original
    pub(crate) fn deep_copy_with(&self, memo: &mut FxHashMap<usize, Value>, depth: usize) -> Value {
        if depth > MAX_VALUE_DEPTH {
            return match self {
                Value::List(_) => Value::list(Vec::new()),
                Value::Dict(_) => Value::dict(DictMap::new()),
                Value::Tuple(_) => Value::tuple(Vec::new()),
                other => other.clone(),
            };
        }
        match self {
            Value::List(items) => {
                let id = Rc::as_ptr(items) as usize;
                if let Some(copy) = memo.get(&id) {
                    return copy.clone();
                }
                let copy = Rc::new(RefCell::new(Vec::new()));
                memo.insert(id, Value::List(copy.clone()));
                let Ok(source) = items.try_borrow() else {
                    return Value::List(copy);
                };
                let copied: Vec<Value> = source
                    .iter()
                    .map(|item| item.deep_copy_with(memo, depth + 1))
                    .collect();
                *copy.borrow_mut() = copied;
                Value::List(copy)
            }
            Value::Dict(map) => {
                let id = Rc::as_ptr(map) as usize;
                if let Some(copy) = memo.get(&id) {
                    return copy.clone();
                }
                let copy = Rc::new(RefCell::new(DictMap::new()));
                memo.insert(id, Value::Dict(copy.clone()));
                let Ok(source) = map.try_borrow() else {
                    return Value::Dict(copy);
                };
                let copied: DictMap = source
                    .iter()
                    .map(|(key, (k, v))| {
                        (
                            key.clone(),
                            (k.deep_copy_with(memo, depth + 1), v.deep_copy_with(memo, depth + 1)),
                        )
                    })
                    .collect();
                *copy.borrow_mut() = copied;
                Value::Dict(copy)
            }
            Value::Tuple(items) => Value::Tuple(
                items
                    .iter()
                    .map(|item| item.deep_copy_with(memo, depth + 1))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

fn identical_or_equal(a: &Value, b: &Value, depth: usize) -> Result<bool, ValueError> {
    if a.is_same(b) && !matches!(a, Value::Float(f) if f.is_nan()) {
        return Ok(true);
    }
    a.equals_at(b, depth + 1)
}

fn sequences_equal(a: &[Value], b: &[Value], depth: usize) -> Result<bool, ValueError> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b.iter()) {
        if !identical_or_equal(x, y, depth)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality() {
        assert!(Value::Int(1).equals(&Value::Float(1.0)).unwrap());
        assert!(Value::Bool(true).equals(&Value::Int(1)).unwrap());
        assert!(!Value::Int(1).equals(&Value::str("1")).unwrap());
    }

    #[test]
    fn test_container_equality() {
        let a = Value::list(vec![Value::Int(1), Value::tuple(vec![Value::str("x")])]);
        let b = Value::list(vec![Value::Int(1), Value::tuple(vec![Value::str("x")])]);
        assert!(a.equals(&b).unwrap());
        assert!(!a.is_same(&b));
    }

    #[test]
    fn test_self_referential_comparison_fails() {
        let a = Value::list(Vec::new());
        if let Value::List(items) = &a {
            items.borrow_mut().push(a.clone());
        }
        assert!(a.equals(&a).unwrap());

        let copy = a.deep_copy();
        assert_eq!(a.equals(&copy), Err(ValueError::TooDeep));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let inner = Value::list(vec![Value::Int(1)]);
        let outer = Value::list(vec![inner.clone(), inner.clone()]);
        let copy = outer.deep_copy();

        if let Value::List(items) = &inner {
            items.borrow_mut().push(Value::Int(2));
        }
        assert!(!outer.equals(&copy).unwrap());

        // Aliasing inside the copy is preserved
        if let Value::List(items) = &copy {
            let items = items.borrow();
            assert!(items[0].is_same(&items[1]));
        }
    }

    #[test]
    fn test_deep_copy_never_shares_deep_containers() {
        let innermost = Value::list(vec![Value::Int(1)]);
        let mut outer = innermost.clone();
        for _ in 0..(MAX_VALUE_DEPTH + 50) {
            outer = Value::list(vec![outer]);
        }
        let copy = outer.deep_copy();

        if let Value::List(items) = &innermost {
            items.borrow_mut().push(Value::Int(2));
        }
        assert_ne!(outer.equals(&copy), Ok(true));

        let first = |value: &Value| match value {
            Value::List(items) => items.borrow().first().cloned(),
            _ => None,
        };
        let (mut live, mut copied) = (Some(outer), Some(copy));
        while let (Some(a), Some(b)) = (live, copied) {
            assert!(!a.is_same(&b));
            live = first(&a);
            copied = first(&b);
        }
    }

    #[test]
    fn test_keys_normalize_numbers() {
        assert_eq!(Value::Int(1).to_key().unwrap(), Value::Float(1.0).to_key().unwrap());
        assert_eq!(Value::Bool(true).to_key().unwrap(), DictKey::Int(1));
        assert_eq!(
            Value::list(Vec::new()).to_key(),
            Err(ValueError::Unhashable("list"))
        );
    }

    #[test]
    fn test_range() {
        let r = RangeValue { start: 10, stop: 0, step: -3 };
        assert_eq!(r.len(), 4);
        assert_eq!(r.get(3), Some(1));
        assert!(r.contains(4));
        assert!(!r.contains(5));
        assert!(RangeValue { start: 0, stop: 0, step: 1 }.is_empty());
    }
}
