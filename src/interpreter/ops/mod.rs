//! Operator semantics
//!
//! - [`binary`]: arithmetic and bitwise operators
//! - [`unary`]: `-x`, `+x`, `~x`, `not x`
//! - [`compare`]: equality, ordering and membership
//! - [`access`]: subscripts and slices
//!
//! These are free functions over values: none of them can run program code,
//! so they never need the interpreter.

pub mod access;
pub mod binary;
pub mod compare;
pub mod unary;

use crate::interpreter::errors::RuntimeError;
use crate::memory::value::Value;
use crate::memory::MAX_SEQUENCE_LEN;

/// Both operands as integers (bools count as ints)
#[inline]
pub(crate) fn int_pair(left: &Value, right: &Value) -> Option<(i64, i64)> {
    Some((left.as_int()?, right.as_int()?))
}

/// Both operands as floats, when at least one is a float
#[inline]
pub(crate) fn float_pair(left: &Value, right: &Value) -> Option<(f64, f64)> {
    if matches!(left, Value::Float(_)) || matches!(right, Value::Float(_)) {
        Some((left.as_float()?, right.as_float()?))
    } else {
        None
    }
}

/// Fail with `MemoryError` when a sequence would grow past the limit
#[inline]
pub(crate) fn check_length(len: usize) -> Result<(), RuntimeError> {
    if len > MAX_SEQUENCE_LEN {
        Err(RuntimeError::memory_error())
    } else {
        Ok(())
    }
}

/// Convert an integral value for use as a count or index
pub(crate) fn index_value(value: &Value, what: &str) -> Result<i64, RuntimeError> {
    value.as_int().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "'{}' object cannot be interpreted as an integer{}",
            value.type_name(),
            what
        ))
    })
}
