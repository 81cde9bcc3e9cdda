//! Statement execution
//!
//! Each statement reports a `line` event before it runs. Loop headers report
//! again every time they are re-tested (including the final, failing test),
//! and so do `elif` conditions and `except` clauses as they are tried.
//!
//! An exception escaping a statement is recorded in the current frame by
//! [`Interpreter::report_exception`] before it propagates; a frame reports a
//! given exception only once.

use crate::interpreter::builtins::advance;
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::{ExceptionKind, ExceptionObject, RuntimeError};
use crate::interpreter::hook::HookEvent;
use crate::interpreter::ops::access::{delete_subscript, get_subscript, set_subscript};
use crate::interpreter::ops::binary::inplace_op;
use crate::memory::iter::{collect_values, iter_of};
use crate::memory::value::{Class, Value};
use crate::parser::ast::{ExceptHandler, Expr, Stmt, Target};
use std::rc::Rc;

/// How a statement finished
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Whether an exception of `kind` is caught by `except <class>:`
fn exception_matches(kind: ExceptionKind, class: &Value) -> Result<bool, RuntimeError> {
    match class {
        Value::Class(Class::Exception(handled)) => Ok(kind.is_subclass_of(*handled)),
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if exception_matches(kind, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(RuntimeError::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

/// Split an iterable into exactly `expected` values
fn unpack(value: &Value, expected: usize) -> Result<Vec<Value>, RuntimeError> {
    let iterator = iter_of(value).ok_or_else(|| {
        RuntimeError::type_error(format!(
            "cannot unpack non-iterable {} object",
            value.type_name()
        ))
    })?;
    match collect_values(&iterator, expected)? {
        None => Err(RuntimeError::value_error(format!(
            "too many values to unpack (expected {})",
            expected
        ))),
        Some(items) if items.len() < expected => Err(RuntimeError::value_error(format!(
            "not enough values to unpack (expected {}, got {})",
            expected,
            items.len()
        ))),
        Some(items) => Ok(items),
    }
}

impl Interpreter<'_> {
    /// Execute statements until one breaks the normal flow
    pub(crate) fn execute_block(&mut self, body: &[Stmt]) -> Result<Flow, RuntimeError> {
        for stmt in body {
            let flow = self.execute_statement(stmt)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        self.mark_line(stmt.location().line)?;
        match self.execute_inner(stmt) {
            Err(err) => Err(self.report_exception(err)),
            flow => flow,
        }
    }

    fn execute_inner(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Expr { expr, .. } => {
                self.evaluate_expr(expr)?;
                Ok(Flow::Normal)
            }

            Stmt::Assign { targets, value, .. } => {
                let value = self.evaluate_expr(value)?;
                for target in targets {
                    self.assign_target(target, value.clone())?;
                }
                Ok(Flow::Normal)
            }

            Stmt::AugAssign {
                target, op, value, ..
            } => {
                match target {
                    Target::Name(name, _) => {
                        let current = self.load_name(name)?;
                        let operand = self.evaluate_expr(value)?;
                        let result = inplace_op(*op, &current, &operand)?;
                        self.store_name(name, result)?;
                    }
                    Target::Subscript { object, index, .. } => {
                        let object = self.evaluate_expr(object)?;
                        let subscript = self.evaluate_subscript(index)?;
                        let current = get_subscript(&object, &subscript)?;
                        let operand = self.evaluate_expr(value)?;
                        let result = inplace_op(*op, &current, &operand)?;
                        set_subscript(&object, &subscript, result)?;
                    }
                    Target::Unpack(..) => {
                        return Err(RuntimeError::new(
                            ExceptionKind::SyntaxError,
                            "illegal expression for augmented assignment",
                        ))
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::If {
                branches,
                else_body,
                ..
            } => {
                for (index, (condition, body)) in branches.iter().enumerate() {
                    if index > 0 {
                        self.mark_line(condition.location().line)?;
                    }
                    if self.evaluate_expr(condition)?.is_truthy() {
                        return self.execute_block(body);
                    }
                }
                match else_body {
                    Some(body) => self.execute_block(body),
                    None => Ok(Flow::Normal),
                }
            }

            Stmt::While {
                condition,
                body,
                else_body,
                location,
            } => self.execute_while(condition, body, else_body.as_deref(), location.line),

            Stmt::For {
                target,
                iter,
                body,
                else_body,
                location,
            } => self.execute_for(target, iter, body, else_body.as_deref(), location.line),

            Stmt::FunctionDef { def, .. } => {
                let function = self.make_function(def)?;
                self.store_name(&def.name, function)?;
                Ok(Flow::Normal)
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate_expr(expr)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }

            Stmt::Try {
                body,
                handlers,
                else_body,
                finally_body,
                ..
            } => {
                let outcome = self.execute_try(body, handlers, else_body.as_deref());
                let Some(finally_body) = finally_body else {
                    return outcome;
                };
                if matches!(outcome, Err(RuntimeError::Halted)) {
                    return outcome;
                }
                match self.execute_block(finally_body)? {
                    Flow::Normal => outcome,
                    flow => Ok(flow),
                }
            }

            Stmt::Raise { exception, .. } => self.execute_raise(exception.as_ref()),

            Stmt::Import { names, .. } => {
                for import in names {
                    let module = self.import_module(&import.name)?;
                    self.store_name(import.bound_name(), module)?;
                }
                Ok(Flow::Normal)
            }

            Stmt::ImportFrom { module, names, .. } => {
                let Value::Module(imported) = self.import_module(module)? else {
                    return Ok(Flow::Normal);
                };
                for import in names {
                    let value = imported.namespace.borrow().get(&import.name).cloned();
                    let value = value.ok_or_else(|| {
                        RuntimeError::new(
                            ExceptionKind::ImportError,
                            format!("cannot import name '{}' from '{}'", import.name, module),
                        )
                    })?;
                    self.store_name(import.bound_name(), value)?;
                }
                Ok(Flow::Normal)
            }

            Stmt::Global { .. } | Stmt::Nonlocal { .. } | Stmt::Pass { .. } => Ok(Flow::Normal),

            Stmt::Delete { targets, .. } => {
                for target in targets {
                    self.delete_target(target)?;
                }
                Ok(Flow::Normal)
            }

            Stmt::Assert { test, message, .. } => {
                if self.evaluate_expr(test)?.is_truthy() {
                    return Ok(Flow::Normal);
                }
                let args = match message {
                    Some(message) => vec![self.evaluate_expr(message)?],
                    None => Vec::new(),
                };
                Err(RuntimeError::from_object(ExceptionObject::new(
                    ExceptionKind::AssertionError,
                    args,
                )))
            }

            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),
        }
    }

    fn execute_while(
        &mut self,
        condition: &Expr,
        body: &[Stmt],
        else_body: Option<&[Stmt]>,
        line: usize,
    ) -> Result<Flow, RuntimeError> {
        loop {
            if !self.evaluate_expr(condition)?.is_truthy() {
                return match else_body {
                    Some(else_body) => self.execute_block(else_body),
                    None => Ok(Flow::Normal),
                };
            }
            match self.execute_block(body)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
            self.mark_line(line)?;
        }
    }

    fn execute_for(
        &mut self,
        target: &Target,
        iter: &Expr,
        body: &[Stmt],
        else_body: Option<&[Stmt]>,
        line: usize,
    ) -> Result<Flow, RuntimeError> {
        let iterable = self.evaluate_expr(iter)?;
        let iterator = self.iterator_of(&iterable)?;
        loop {
            let Some(item) = advance(&iterator)? else {
                return match else_body {
                    Some(else_body) => self.execute_block(else_body),
                    None => Ok(Flow::Normal),
                };
            };
            self.assign_target(target, item)?;
            match self.execute_block(body)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
            self.mark_line(line)?;
        }
    }

    /// The `try`, `except` and `else` parts of a `try` statement
    fn execute_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        else_body: Option<&[Stmt]>,
    ) -> Result<Flow, RuntimeError> {
        let raised = match self.execute_block(body) {
            Ok(Flow::Normal) => {
                return match else_body {
                    Some(else_body) => self.execute_block(else_body),
                    None => Ok(Flow::Normal),
                }
            }
            Ok(flow) => return Ok(flow),
            Err(RuntimeError::Halted) => return Err(RuntimeError::Halted),
            Err(RuntimeError::Exception(raised)) => raised,
        };

        for handler in handlers {
            self.mark_line(handler.location.line)?;
            let matched = match &handler.kind {
                None => true,
                Some(class) => {
                    let class = self.evaluate_expr(class)?;
                    exception_matches(raised.object.kind, &class)?
                }
            };
            if !matched {
                continue;
            }

            if let Some(name) = &handler.name {
                self.store_name(name, Value::Exception(raised.object.clone()))?;
            }
            self.handling.push(*raised);
            let result = self.execute_block(&handler.body);
            self.handling.pop();
            if let Some(name) = &handler.name {
                // The handler may already have deleted or rebound it
                let _ = self.delete_name(name);
            }
            return result;
        }
        Err(RuntimeError::Exception(raised))
    }

    fn execute_raise(&mut self, exception: Option<&Expr>) -> Result<Flow, RuntimeError> {
        let Some(exception) = exception else {
            let Some(active) = self.handling.last() else {
                return Err(RuntimeError::new(
                    ExceptionKind::RuntimeError,
                    "No active exception to reraise",
                ));
            };
            let mut raised = active.clone();
            raised.reported_in = Some(self.frame()?.id);
            let object = raised.object.clone();
            self.fire(HookEvent::Exception(&object))?;
            return Err(RuntimeError::Exception(Box::new(raised)));
        };

        let object = match self.evaluate_expr(exception)? {
            Value::Exception(object) => object,
            Value::Class(Class::Exception(kind)) => {
                Rc::new(ExceptionObject::new(kind, Vec::new()))
            }
            _ => {
                return Err(RuntimeError::type_error(
                    "exceptions must derive from BaseException",
                ))
            }
        };
        Err(RuntimeError::from_shared(object))
    }

    /// Bind `value` to an assignment target
    pub(crate) fn assign_target(&mut self, target: &Target, value: Value) -> Result<(), RuntimeError> {
        match target {
            Target::Name(name, _) => self.store_name(name, value),
            Target::Subscript { object, index, .. } => {
                let object = self.evaluate_expr(object)?;
                let subscript = self.evaluate_subscript(index)?;
                set_subscript(&object, &subscript, value)
            }
            Target::Unpack(targets, _) => {
                let items = unpack(&value, targets.len())?;
                for (target, item) in targets.iter().zip(items) {
                    self.assign_target(target, item)?;
                }
                Ok(())
            }
        }
    }

    fn delete_target(&mut self, target: &Target) -> Result<(), RuntimeError> {
        match target {
            Target::Name(name, _) => self.delete_name(name),
            Target::Subscript { object, index, .. } => {
                let object = self.evaluate_expr(object)?;
                let subscript = self.evaluate_subscript(index)?;
                delete_subscript(&object, &subscript)
            }
            Target::Unpack(targets, _) => {
                for target in targets {
                    self.delete_target(target)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_counts() {
        let pair = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(unpack(&pair, 2).unwrap().len(), 2);
        assert_eq!(
            unpack(&pair, 3).unwrap_err().to_string(),
            "ValueError: not enough values to unpack (expected 3, got 2)"
        );
        assert_eq!(
            unpack(&pair, 1).unwrap_err().to_string(),
            "ValueError: too many values to unpack (expected 1)"
        );
        assert_eq!(
            unpack(&Value::Int(5), 2).unwrap_err().to_string(),
            "TypeError: cannot unpack non-iterable int object"
        );
    }

    #[test]
    fn test_exception_matching() {
        let arithmetic = Value::Class(Class::Exception(ExceptionKind::ArithmeticError));
        assert!(exception_matches(ExceptionKind::ZeroDivisionError, &arithmetic).unwrap());

        let pair = Value::tuple(vec![
            Value::Class(Class::Exception(ExceptionKind::KeyError)),
            Value::Class(Class::Exception(ExceptionKind::ValueError)),
        ]);
        assert!(exception_matches(ExceptionKind::ValueError, &pair).unwrap());
        assert!(!exception_matches(ExceptionKind::TypeError, &pair).unwrap());
        assert!(exception_matches(ExceptionKind::TypeError, &Value::Int(1)).is_err());
    }
}
