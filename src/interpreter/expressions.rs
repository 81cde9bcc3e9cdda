// Expression evaluation

use crate::interpreter::builtins::advance;
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::{ExceptionKind, RuntimeError};
use crate::interpreter::format::convert_and_format;
use crate::interpreter::ops::access::{dict_insert, get_subscript, SliceArgs, Subscript};
use crate::interpreter::ops::binary::binary_op;
use crate::interpreter::ops::check_length;
use crate::interpreter::ops::compare::compare;
use crate::interpreter::ops::unary::unary_op;
use crate::memory::iter::IterState;
use crate::memory::value::{DictMap, Value};
use crate::parser::ast::{BoolOp, CompClause, CompKind, Expr, FStringPart, Target};
use std::cell::RefCell;

/// Names a target binds, in order
fn target_names(target: &Target, names: &mut Vec<String>) {
    match target {
        Target::Name(name, _) => names.push(name.clone()),
        Target::Unpack(targets, _) => {
            for target in targets {
                target_names(target, names);
            }
        }
        Target::Subscript { .. } => {}
    }
}

impl Interpreter<'_> {
    pub(crate) fn evaluate_expr(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::IntLiteral(n, _) => Ok(Value::Int(*n)),
            Expr::FloatLiteral(x, _) => Ok(Value::Float(*x)),
            Expr::StringLiteral(text, _) => Ok(Value::str(text)),
            Expr::BoolLiteral(b, _) => Ok(Value::Bool(*b)),
            Expr::NoneLiteral(_) => Ok(Value::None),

            Expr::FString(parts, _) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        FStringPart::Literal(literal) => text.push_str(literal),
                        FStringPart::Field {
                            expr,
                            conversion,
                            spec,
                        } => {
                            let value = self.evaluate_expr(expr)?;
                            text.push_str(&convert_and_format(
                                &value,
                                *conversion,
                                spec.as_deref().unwrap_or(""),
                            )?);
                        }
                    }
                }
                Ok(Value::str(text))
            }

            Expr::Name(name, _) => self.load_name(name),

            Expr::List(elements, _) => Ok(Value::list(self.evaluate_all(elements)?)),
            Expr::Tuple(elements, _) => Ok(Value::tuple(self.evaluate_all(elements)?)),
            Expr::Dict(entries, _) => {
                let map = RefCell::new(DictMap::new());
                for (key, value) in entries {
                    let key = self.evaluate_expr(key)?;
                    let value = self.evaluate_expr(value)?;
                    dict_insert(&map, key, value)?;
                }
                Ok(Value::dict(map.into_inner()))
            }

            Expr::Comprehension { kind, clauses, .. } => self.evaluate_comprehension(kind, clauses),

            Expr::BinaryOp {
                op, left, right, ..
            } => {
                let left = self.evaluate_expr(left)?;
                let right = self.evaluate_expr(right)?;
                binary_op(*op, &left, &right)
            }

            Expr::UnaryOp { op, operand, .. } => {
                let operand = self.evaluate_expr(operand)?;
                unary_op(*op, &operand)
            }

            Expr::BoolOp {
                op, left, right, ..
            } => {
                let left = self.evaluate_expr(left)?;
                let short_circuits = match op {
                    BoolOp::And => !left.is_truthy(),
                    BoolOp::Or => left.is_truthy(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.evaluate_expr(right)
                }
            }

            Expr::Compare { left, rest, .. } => {
                let mut left = self.evaluate_expr(left)?;
                for (op, right) in rest {
                    let right = self.evaluate_expr(right)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }

            Expr::IfExp {
                condition,
                then_expr,
                else_expr,
                ..
            } => {
                if self.evaluate_expr(condition)?.is_truthy() {
                    self.evaluate_expr(then_expr)
                } else {
                    self.evaluate_expr(else_expr)
                }
            }

            Expr::Lambda { def, .. } => self.make_function(def),

            Expr::Call {
                func, args, kwargs, ..
            } => {
                let callee = self.evaluate_expr(func)?;
                let args = self.evaluate_all(args)?;
                let mut keywords = Vec::with_capacity(kwargs.len());
                for (name, value) in kwargs {
                    keywords.push((name.clone(), self.evaluate_expr(value)?));
                }
                self.call_value(&callee, args, keywords)
            }

            Expr::Attribute { object, name, .. } => {
                let object = self.evaluate_expr(object)?;
                self.get_attribute(&object, name)
            }

            Expr::Subscript { object, index, .. } => {
                let object = self.evaluate_expr(object)?;
                let subscript = self.evaluate_subscript(index)?;
                get_subscript(&object, &subscript)
            }

            Expr::Slice { .. } => Err(RuntimeError::new(
                ExceptionKind::SyntaxError,
                "invalid syntax",
            )),
        }
    }

    fn evaluate_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        exprs.iter().map(|expr| self.evaluate_expr(expr)).collect()
    }

    /// Evaluate the part between the brackets of `object[...]`
    pub(crate) fn evaluate_subscript(&mut self, index: &Expr) -> Result<Subscript, RuntimeError> {
        let Expr::Slice {
            lower, upper, step, ..
        } = index
        else {
            return Ok(Subscript::Item(self.evaluate_expr(index)?));
        };

        let mut bound = |expr: &Option<Box<Expr>>| -> Result<Option<i64>, RuntimeError> {
            let Some(expr) = expr else {
                return Ok(None);
            };
            match self.evaluate_expr(expr)? {
                Value::None => Ok(None),
                value => value.as_int().map(Some).ok_or_else(|| {
                    RuntimeError::type_error(
                        "slice indices must be integers or None or have an __index__ method",
                    )
                }),
            }
        };
        Ok(Subscript::Slice(SliceArgs {
            lower: bound(lower)?,
            upper: bound(upper)?,
            step: bound(step)?,
        }))
    }

    /// List, dict and generator comprehensions, evaluated eagerly
    ///
    /// Loop variables live in the current frame only while the comprehension
    /// runs; afterwards any previous bindings are restored.
    fn evaluate_comprehension(
        &mut self,
        kind: &CompKind,
        clauses: &[CompClause],
    ) -> Result<Value, RuntimeError> {
        let mut names = Vec::new();
        for clause in clauses {
            if let CompClause::For { target, .. } = clause {
                target_names(target, &mut names);
            }
        }
        let locals = self.frame()?.locals.clone();
        let saved: Vec<(String, Option<Value>)> = names
            .into_iter()
            .map(|name| {
                let previous = locals.borrow().get(&name).cloned();
                (name, previous)
            })
            .collect();

        let mut produced = Vec::new();
        let result = self.run_clauses(kind, clauses, &mut produced);

        {
            let mut locals = locals.borrow_mut();
            for (name, previous) in saved {
                match previous {
                    Some(value) => {
                        locals.insert(name, value);
                    }
                    None => {
                        locals.shift_remove(&name);
                    }
                }
            }
        }
        result?;

        match kind {
            CompKind::List(_) => Ok(Value::list(produced)),
            CompKind::Generator(_) => Ok(Value::iterator(IterState::Values {
                items: produced,
                index: 0,
                kind: "generator",
            })),
            CompKind::Dict(..) => {
                let map = RefCell::new(DictMap::new());
                for pair in produced {
                    if let Value::Tuple(pair) = pair {
                        dict_insert(&map, pair[0].clone(), pair[1].clone())?;
                    }
                }
                Ok(Value::dict(map.into_inner()))
            }
        }
    }

    fn run_clauses(
        &mut self,
        kind: &CompKind,
        clauses: &[CompClause],
        produced: &mut Vec<Value>,
    ) -> Result<(), RuntimeError> {
        let Some((clause, rest)) = clauses.split_first() else {
            let item = match kind {
                CompKind::List(element) | CompKind::Generator(element) => {
                    self.evaluate_expr(element)?
                }
                CompKind::Dict(key, value) => {
                    let key = self.evaluate_expr(key)?;
                    let value = self.evaluate_expr(value)?;
                    Value::tuple(vec![key, value])
                }
            };
            produced.push(item);
            return check_length(produced.len());
        };

        match clause {
            CompClause::If(condition) => {
                if self.evaluate_expr(condition)?.is_truthy() {
                    self.run_clauses(kind, rest, produced)?;
                }
            }
            CompClause::For { target, iter } => {
                let iterable = self.evaluate_expr(iter)?;
                let iterator = self.iterator_of(&iterable)?;
                while let Some(item) = advance(&iterator)? {
                    self.assign_target(target, item)?;
                    self.run_clauses(kind, rest, produced)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::SourceLocation;

    #[test]
    fn test_target_names() {
        let at = SourceLocation::new(1, 1);
        let target = Target::Unpack(
            vec![
                Target::Name("i".to_string(), at),
                Target::Unpack(
                    vec![Target::Name("k".to_string(), at)],
                    at,
                ),
            ],
            at,
        );
        let mut names = Vec::new();
        target_names(&target, &mut names);
        assert_eq!(names, ["i", "k"]);
    }
}
