//! Scope analysis for function bodies
//!
//! A name is local to a function when the body binds it anywhere (assignment,
//! `for` target, `def`, import, `except ... as`, `del`) and it is not declared
//! `global` or `nonlocal`. Nested function bodies are not entered; only the
//! nested function's own name counts as a binding.

use crate::parser::ast::*;

/// Classify the names of one function body
pub(crate) fn analyze_scope(
    params: &[Param],
    body: &[Stmt],
) -> Result<ScopeInfo, (String, SourceLocation)> {
    let mut scope = ScopeInfo::default();
    let mut bound = Vec::new();
    collect_block(body, &mut scope, &mut bound)?;

    for param in params {
        if scope.globals.contains(&param.name) {
            return Err((
                format!("name '{}' is parameter and global", param.name),
                first_declaration(body).unwrap_or(SourceLocation::new(1, 1)),
            ));
        }
        if scope.nonlocals.contains(&param.name) {
            return Err((
                format!("name '{}' is parameter and nonlocal", param.name),
                first_declaration(body).unwrap_or(SourceLocation::new(1, 1)),
            ));
        }
        scope.locals.insert(param.name.clone());
    }

    for name in bound {
        if !scope.globals.contains(&name) && !scope.nonlocals.contains(&name) {
            scope.locals.insert(name);
        }
    }

    Ok(scope)
}

fn first_declaration(body: &[Stmt]) -> Option<SourceLocation> {
    body.iter().find_map(|stmt| match stmt {
        Stmt::Global { location, .. } | Stmt::Nonlocal { location, .. } => Some(*location),
        _ => None,
    })
}

fn collect_block(
    body: &[Stmt],
    scope: &mut ScopeInfo,
    bound: &mut Vec<String>,
) -> Result<(), (String, SourceLocation)> {
    for stmt in body {
        collect_statement(stmt, scope, bound)?;
    }
    Ok(())
}

fn collect_statement(
    stmt: &Stmt,
    scope: &mut ScopeInfo,
    bound: &mut Vec<String>,
) -> Result<(), (String, SourceLocation)> {
    match stmt {
        Stmt::Assign { targets, .. } => {
            for target in targets {
                collect_target(target, bound);
            }
        }
        Stmt::AugAssign { target, .. } => collect_target(target, bound),
        Stmt::For {
            target,
            body,
            else_body,
            ..
        } => {
            collect_target(target, bound);
            collect_block(body, scope, bound)?;
            if let Some(else_body) = else_body {
                collect_block(else_body, scope, bound)?;
            }
        }
        Stmt::While {
            body, else_body, ..
        } => {
            collect_block(body, scope, bound)?;
            if let Some(else_body) = else_body {
                collect_block(else_body, scope, bound)?;
            }
        }
        Stmt::If {
            branches,
            else_body,
            ..
        } => {
            for (_, branch) in branches {
                collect_block(branch, scope, bound)?;
            }
            if let Some(else_body) = else_body {
                collect_block(else_body, scope, bound)?;
            }
        }
        Stmt::Try {
            body,
            handlers,
            else_body,
            finally_body,
            ..
        } => {
            collect_block(body, scope, bound)?;
            for handler in handlers {
                if let Some(name) = &handler.name {
                    bound.push(name.clone());
                }
                collect_block(&handler.body, scope, bound)?;
            }
            if let Some(else_body) = else_body {
                collect_block(else_body, scope, bound)?;
            }
            if let Some(finally_body) = finally_body {
                collect_block(finally_body, scope, bound)?;
            }
        }
        Stmt::FunctionDef { def, .. } => bound.push(def.name.clone()),
        Stmt::Import { names, .. } => {
            for name in names {
                let bound_name = match &name.alias {
                    Some(alias) => alias.clone(),
                    None => name.name.split('.').next().unwrap_or(&name.name).to_string(),
                };
                bound.push(bound_name);
            }
        }
        Stmt::ImportFrom { names, .. } => {
            for name in names {
                bound.push(name.bound_name().to_string());
            }
        }
        Stmt::Delete { targets, .. } => {
            for target in targets {
                collect_target(target, bound);
            }
        }
        Stmt::Global { names, location } => {
            for name in names {
                if scope.nonlocals.contains(name) {
                    return Err((format!("name '{}' is nonlocal and global", name), *location));
                }
                scope.globals.insert(name.clone());
            }
        }
        Stmt::Nonlocal { names, location } => {
            for name in names {
                if scope.globals.contains(name) {
                    return Err((format!("name '{}' is nonlocal and global", name), *location));
                }
                scope.nonlocals.insert(name.clone());
            }
        }
        Stmt::Expr { .. }
        | Stmt::Return { .. }
        | Stmt::Raise { .. }
        | Stmt::Assert { .. }
        | Stmt::Break { .. }
        | Stmt::Continue { .. }
        | Stmt::Pass { .. } => {}
    }
    Ok(())
}

fn collect_target(target: &Target, bound: &mut Vec<String>) {
    match target {
        Target::Name(name, _) => bound.push(name.clone()),
        Target::Unpack(items, _) => {
            for item in items {
                collect_target(item, bound);
            }
        }
        Target::Subscript { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::parse::parse_source;

    fn scope_of(source: &str) -> ScopeInfo {
        let program = parse_source(source).unwrap();
        match &program.body[0] {
            Stmt::FunctionDef { def, .. } => def.scope.clone(),
            _ => panic!("Expected function definition"),
        }
    }

    #[test]
    fn test_assignments_make_locals() {
        let scope = scope_of(
            "def f(a):\n    b = 1\n    for i, j in x:\n        pass\n    try:\n        pass\n    except E as e:\n        pass\n    def g():\n        h = 1\n",
        );
        for name in ["a", "b", "i", "j", "e", "g"] {
            assert!(scope.locals.contains(name), "{} should be local", name);
        }
        assert!(!scope.locals.contains("h"));
        assert!(!scope.locals.contains("x"));
    }

    #[test]
    fn test_global_and_nonlocal_are_not_locals() {
        let scope = scope_of("def f():\n    global total\n    total = 1\n    def g():\n        nonlocal y\n    y = 2\n");
        assert!(scope.globals.contains("total"));
        assert!(!scope.locals.contains("total"));
        assert!(scope.locals.contains("y"));
    }

    #[test]
    fn test_parameter_declared_global() {
        let err = parse_source("def f(x):\n    global x\n").unwrap_err();
        assert!(err.message.contains("parameter and global"));
    }

    #[test]
    fn test_subscript_assignment_is_not_a_binding() {
        let scope = scope_of("def f():\n    items[0] = 1\n");
        assert!(!scope.locals.contains("items"));
    }
}
