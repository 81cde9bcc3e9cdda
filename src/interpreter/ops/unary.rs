// Unary operators

use crate::interpreter::errors::RuntimeError;
use crate::memory::value::Value;
use crate::parser::ast::UnOp;

pub fn unary_op(op: UnOp, operand: &Value) -> Result<Value, RuntimeError> {
    let symbol = match op {
        UnOp::Not => return Ok(Value::Bool(!operand.is_truthy())),
        UnOp::Neg => "-",
        UnOp::Pos => "+",
        UnOp::Invert => "~",
    };

    let result = match (op, operand) {
        (UnOp::Neg, Value::Float(f)) => Some(Value::Float(-f)),
        (UnOp::Pos, Value::Float(f)) => Some(Value::Float(*f)),
        (UnOp::Neg, value) => match value.as_int() {
            Some(n) => Some(Value::Int(n.checked_neg().ok_or_else(RuntimeError::overflow)?)),
            None => None,
        },
        (UnOp::Pos, value) => value.as_int().map(Value::Int),
        (UnOp::Invert, Value::Float(_)) => None,
        (UnOp::Invert, value) => value.as_int().map(|n| Value::Int(!n)),
        (UnOp::Not, _) => None,
    };

    result.ok_or_else(|| {
        RuntimeError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            symbol,
            operand.type_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::errors::ExceptionKind;

    #[test]
    fn test_unary() {
        assert!(matches!(unary_op(UnOp::Neg, &Value::Int(3)).unwrap(), Value::Int(-3)));
        assert!(matches!(unary_op(UnOp::Invert, &Value::Int(0)).unwrap(), Value::Int(-1)));
        assert!(matches!(unary_op(UnOp::Pos, &Value::Bool(true)).unwrap(), Value::Int(1)));
        assert!(matches!(unary_op(UnOp::Not, &Value::str("")).unwrap(), Value::Bool(true)));
    }

    #[test]
    fn test_bad_operand() {
        let err = unary_op(UnOp::Neg, &Value::str("x")).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: bad operand type for unary -: 'str'");
        let err = unary_op(UnOp::Neg, &Value::Int(i64::MIN)).unwrap_err();
        assert!(err.is_kind(ExceptionKind::OverflowError));
    }
}
