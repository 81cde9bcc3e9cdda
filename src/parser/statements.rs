//! Statement parsing implementation
//!
//! This module handles parsing of every statement form:
//!
//! - Simple statements: expressions, assignments, `pass`, `break`, `continue`,
//!   `return`, `raise`, `global`, `nonlocal`, `del`, `assert`, imports
//! - Compound statements: `if`/`elif`/`else`, `while`, `for`, `try`, `def`
//! - Blocks: an indented suite or simple statements on the header line
//!
//! # Grammar
//!
//! ```text
//! statement    ::= compound_stmt | simple_stmts
//! simple_stmts ::= simple_stmt (';' simple_stmt)* [';'] NEWLINE
//! block        ::= NEWLINE INDENT statement+ DEDENT | simple_stmts
//! ```
//!
//! All parsing methods are implemented as `pub(crate)` methods on the [`Parser`] struct.

use crate::parser::ast::*;
use crate::parser::lexer::Token;
use crate::parser::parse::{ParseError, Parser};
use crate::parser::scope::analyze_scope;
use std::rc::Rc;

impl Parser {
    /// Parse one logical statement; `a; b` on one line yields several nodes
    pub(crate) fn parse_statement(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let loc = self.current_location();

        match self.peek() {
            Token::If(_) => {
                self.advance();
                Ok(vec![self.parse_if_statement(loc)?])
            }
            Token::While(_) => {
                self.advance();
                Ok(vec![self.parse_while_statement(loc)?])
            }
            Token::For(_) => {
                self.advance();
                Ok(vec![self.parse_for_statement(loc)?])
            }
            Token::Try(_) => {
                self.advance();
                Ok(vec![self.parse_try_statement(loc)?])
            }
            Token::Def(_) => {
                self.advance();
                Ok(vec![self.parse_function_def(loc)?])
            }
            _ => self.parse_simple_statements(),
        }
    }

    /// Parse a block after a compound statement header's ':'
    pub(crate) fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if !self.match_token(&Token::Newline(self.current_location())) {
            return self.parse_simple_statements();
        }

        self.expect_token(
            &Token::Indent(self.current_location()),
            "expected an indented block",
        )?;

        self.nested(|p| {
            let mut statements = Vec::new();
            while !p.check(&Token::Dedent(p.current_location())) && !p.is_at_end() {
                if p.match_token(&Token::Newline(p.current_location())) {
                    continue;
                }
                if p.check(&Token::Indent(p.current_location())) {
                    return Err(ParseError::new("unexpected indent", p.current_location()));
                }
                statements.extend(p.parse_statement()?);
            }
            p.expect_token(&Token::Dedent(p.current_location()), "expected dedent")?;
            Ok(statements)
        })
    }

    /// Parse `simple_stmt (';' simple_stmt)* [';'] NEWLINE`
    fn parse_simple_statements(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = vec![self.parse_simple_statement()?];

        while self.match_token(&Token::Semicolon(self.current_location())) {
            if self.check(&Token::Newline(self.current_location())) || self.is_at_end() {
                break;
            }
            statements.push(self.parse_simple_statement()?);
        }

        if !self.is_at_end() {
            self.expect_token(
                &Token::Newline(self.current_location()),
                "invalid syntax: expected end of statement",
            )?;
        }
        Ok(statements)
    }

    fn parse_simple_statement(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.current_location();

        match self.peek() {
            Token::Pass(_) => {
                self.advance();
                Ok(Stmt::Pass { location: loc })
            }
            Token::Break(_) => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(ParseError::new("'break' outside loop", loc));
                }
                Ok(Stmt::Break { location: loc })
            }
            Token::Continue(_) => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(ParseError::new("'continue' not properly in loop", loc));
                }
                Ok(Stmt::Continue { location: loc })
            }
            Token::Return(_) => {
                self.advance();
                if self.function_depth == 0 {
                    return Err(ParseError::new("'return' outside function", loc));
                }
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_testlist()?)
                };
                Ok(Stmt::Return {
                    value,
                    location: loc,
                })
            }
            Token::Raise(_) => {
                self.advance();
                let exception = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_test()?)
                };
                Ok(Stmt::Raise {
                    exception,
                    location: loc,
                })
            }
            Token::Global(_) => {
                self.advance();
                let names = self.parse_name_list()?;
                Ok(Stmt::Global {
                    names,
                    location: loc,
                })
            }
            Token::Nonlocal(_) => {
                self.advance();
                if self.function_depth == 0 {
                    return Err(ParseError::new(
                        "nonlocal declaration not allowed at module level",
                        loc,
                    ));
                }
                let names = self.parse_name_list()?;
                Ok(Stmt::Nonlocal {
                    names,
                    location: loc,
                })
            }
            Token::Del(_) => {
                self.advance();
                let mut targets = Vec::new();
                loop {
                    let expr = self.parse_bitor()?;
                    targets.push(self.expr_to_target(expr)?);
                    if !self.match_token(&Token::Comma(self.current_location()))
                        || self.at_statement_end()
                    {
                        break;
                    }
                }
                Ok(Stmt::Delete {
                    targets,
                    location: loc,
                })
            }
            Token::Assert(_) => {
                self.advance();
                let test = self.parse_test()?;
                let message = if self.match_token(&Token::Comma(self.current_location())) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                Ok(Stmt::Assert {
                    test,
                    message,
                    location: loc,
                })
            }
            Token::Import(_) => {
                self.advance();
                let mut names = Vec::new();
                loop {
                    let name = self.parse_dotted_name()?;
                    let alias = self.parse_alias()?;
                    names.push(ImportName { name, alias });
                    if !self.match_token(&Token::Comma(self.current_location())) {
                        break;
                    }
                }
                Ok(Stmt::Import {
                    names,
                    location: loc,
                })
            }
            Token::From(_) => {
                self.advance();
                let module = self.parse_dotted_name()?;
                self.expect_token(
                    &Token::Import(self.current_location()),
                    "expected 'import'",
                )?;
                if self.check(&Token::Star(self.current_location())) {
                    return Err(ParseError::new(
                        "wildcard imports are not supported",
                        self.current_location(),
                    ));
                }
                let parenthesized = self.match_token(&Token::LParen(self.current_location()));
                let mut names = Vec::new();
                loop {
                    let name = self.expect_identifier()?;
                    let alias = self.parse_alias()?;
                    names.push(ImportName { name, alias });
                    if !self.match_token(&Token::Comma(self.current_location())) {
                        break;
                    }
                    if parenthesized && self.check(&Token::RParen(self.current_location())) {
                        break;
                    }
                }
                if parenthesized {
                    self.expect_rparen("after imported names")?;
                }
                Ok(Stmt::ImportFrom {
                    module,
                    names,
                    location: loc,
                })
            }
            _ => self.parse_expression_statement(loc),
        }
    }

    /// Expression statement, plain/chained/annotated assignment, or augmented assignment
    fn parse_expression_statement(&mut self, loc: SourceLocation) -> Result<Stmt, ParseError> {
        let first = self.parse_testlist()?;

        // Annotated assignment: the annotation is parsed and dropped
        if self.match_token(&Token::Colon(self.current_location())) {
            let target = match &first {
                Expr::Name(..) | Expr::Subscript { .. } => self.expr_to_target(first)?,
                _ => {
                    return Err(ParseError::new(
                        "only single target can be annotated",
                        first.location(),
                    ))
                }
            };
            self.parse_test()?;
            if self.match_token(&Token::Eq(self.current_location())) {
                let value = self.parse_testlist()?;
                return Ok(Stmt::Assign {
                    targets: vec![target],
                    value,
                    location: loc,
                });
            }
            return Ok(Stmt::Pass { location: loc });
        }

        if let Some(op) = self.augmented_operator() {
            self.advance();
            let target = match &first {
                Expr::Name(..) | Expr::Subscript { .. } => self.expr_to_target(first)?,
                _ => {
                    return Err(ParseError::new(
                        "illegal expression for augmented assignment",
                        first.location(),
                    ))
                }
            };
            let value = self.parse_testlist()?;
            return Ok(Stmt::AugAssign {
                target,
                op,
                value,
                location: loc,
            });
        }

        if !self.check(&Token::Eq(self.current_location())) {
            return Ok(Stmt::Expr {
                expr: first,
                location: loc,
            });
        }

        let mut exprs = vec![first];
        while self.match_token(&Token::Eq(self.current_location())) {
            exprs.push(self.parse_testlist()?);
        }
        let value = exprs.pop().ok_or_else(|| ParseError::new("invalid syntax", loc))?;
        let targets = exprs
            .into_iter()
            .map(|expr| self.expr_to_target(expr))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Stmt::Assign {
            targets,
            value,
            location: loc,
        })
    }

    fn augmented_operator(&self) -> Option<BinOp> {
        let op = match self.peek() {
            Token::PlusEq(_) => BinOp::Add,
            Token::MinusEq(_) => BinOp::Sub,
            Token::StarEq(_) => BinOp::Mul,
            Token::SlashEq(_) => BinOp::Div,
            Token::DoubleSlashEq(_) => BinOp::FloorDiv,
            Token::PercentEq(_) => BinOp::Mod,
            Token::DoubleStarEq(_) => BinOp::Pow,
            Token::AmpEq(_) => BinOp::BitAnd,
            Token::PipeEq(_) => BinOp::BitOr,
            Token::CaretEq(_) => BinOp::BitXor,
            Token::LtLtEq(_) => BinOp::Shl,
            Token::GtGtEq(_) => BinOp::Shr,
            _ => return None,
        };
        Some(op)
    }

    /// Convert a parsed expression into an assignment target
    pub(crate) fn expr_to_target(&self, expr: Expr) -> Result<Target, ParseError> {
        match expr {
            Expr::Name(name, loc) => Ok(Target::Name(name, loc)),
            Expr::Subscript {
                object,
                index,
                location,
            } => Ok(Target::Subscript {
                object,
                index,
                location,
            }),
            Expr::Tuple(items, loc) | Expr::List(items, loc) => {
                let targets = items
                    .into_iter()
                    .map(|item| self.expr_to_target(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Target::Unpack(targets, loc))
            }
            Expr::Attribute { location, .. } => Err(ParseError::new(
                "attribute assignment is not supported",
                location,
            )),
            other => Err(ParseError::new(
                "cannot assign to expression",
                other.location(),
            )),
        }
    }

    pub(crate) fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            Token::Newline(_) | Token::Semicolon(_) | Token::Eof(_)
        )
    }

    fn parse_name_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = vec![self.expect_identifier()?];
        while self.match_token(&Token::Comma(self.current_location())) {
            names.push(self.expect_identifier()?);
        }
        Ok(names)
    }

    fn parse_dotted_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.expect_identifier()?;
        while self.match_token(&Token::Dot(self.current_location())) {
            name.push('.');
            name.push_str(&self.expect_identifier()?);
        }
        Ok(name)
    }

    fn parse_alias(&mut self) -> Result<Option<String>, ParseError> {
        if self.match_token(&Token::As(self.current_location())) {
            Ok(Some(self.expect_identifier()?))
        } else {
            Ok(None)
        }
    }

    /// Parse if statement with its `elif` chain
    fn parse_if_statement(&mut self, loc: SourceLocation) -> Result<Stmt, ParseError> {
        let condition = self.parse_test()?;
        self.expect_colon("after if condition")?;
        let body = self.parse_block()?;
        let mut branches = vec![(condition, body)];

        while self.match_token(&Token::Elif(self.current_location())) {
            let condition = self.parse_test()?;
            self.expect_colon("after elif condition")?;
            let body = self.parse_block()?;
            branches.push((condition, body));
        }

        let else_body = self.parse_else_block()?;

        Ok(Stmt::If {
            branches,
            else_body,
            location: loc,
        })
    }

    fn parse_else_block(&mut self) -> Result<Option<Vec<Stmt>>, ParseError> {
        if self.match_token(&Token::Else(self.current_location())) {
            self.expect_colon("after 'else'")?;
            Ok(Some(self.parse_block()?))
        } else {
            Ok(None)
        }
    }

    /// Parse a loop body with `break`/`continue` permitted
    fn parse_loop_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        body
    }

    /// Parse while statement
    fn parse_while_statement(&mut self, loc: SourceLocation) -> Result<Stmt, ParseError> {
        let condition = self.parse_test()?;
        self.expect_colon("after while condition")?;
        let body = self.parse_loop_body()?;
        let else_body = self.parse_else_block()?;

        Ok(Stmt::While {
            condition,
            body,
            else_body,
            location: loc,
        })
    }

    /// Parse for statement
    fn parse_for_statement(&mut self, loc: SourceLocation) -> Result<Stmt, ParseError> {
        let target = self.parse_target_list()?;
        self.expect_token(&Token::In(self.current_location()), "expected 'in'")?;
        let iter = self.parse_testlist()?;
        self.expect_colon("after for clause")?;
        let body = self.parse_loop_body()?;
        let else_body = self.parse_else_block()?;

        Ok(Stmt::For {
            target,
            iter,
            body,
            else_body,
            location: loc,
        })
    }

    /// Parse `try` with its handlers, `else` and `finally`
    fn parse_try_statement(&mut self, loc: SourceLocation) -> Result<Stmt, ParseError> {
        self.expect_colon("after 'try'")?;
        let body = self.parse_block()?;

        let mut handlers = Vec::new();
        while self.check(&Token::Except(self.current_location())) {
            let handler_loc = self.current_location();
            self.advance();
            let (kind, name) = if self.check(&Token::Colon(self.current_location())) {
                (None, None)
            } else {
                let kind = self.parse_test()?;
                let name = if self.match_token(&Token::As(self.current_location())) {
                    Some(self.expect_identifier()?)
                } else {
                    None
                };
                (Some(kind), name)
            };
            self.expect_colon("after except clause")?;
            let body = self.parse_block()?;
            handlers.push(ExceptHandler {
                kind,
                name,
                body,
                location: handler_loc,
            });
        }

        let else_body = if handlers.is_empty() {
            None
        } else {
            self.parse_else_block()?
        };

        let finally_body = if self.match_token(&Token::Finally(self.current_location())) {
            self.expect_colon("after 'finally'")?;
            Some(self.parse_block()?)
        } else {
            None
        };

        if handlers.is_empty() && finally_body.is_none() {
            return Err(self.error_here("expected 'except' or 'finally' block"));
        }

        Ok(Stmt::Try {
            body,
            handlers,
            else_body,
            finally_body,
            location: loc,
        })
    }

    /// Parse a function definition; the body's scope is analyzed here
    fn parse_function_def(&mut self, loc: SourceLocation) -> Result<Stmt, ParseError> {
        let name = self.expect_identifier()?;
        self.expect_token(
            &Token::LParen(self.current_location()),
            "expected '(' after function name",
        )?;
        let params = self.parse_parameters(&Token::RParen(self.current_location()), true)?;
        self.expect_rparen("after parameters")?;

        if self.match_token(&Token::Arrow(self.current_location())) {
            self.parse_test()?;
        }
        self.expect_colon("after function signature")?;

        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;
        self.loop_depth = saved_loop_depth;
        let body = body?;

        let scope = analyze_scope(&params, &body).map_err(|(message, location)| {
            ParseError::new(message, location)
        })?;

        let def = Rc::new(FunctionDef {
            name,
            params,
            body,
            scope,
            location: loc,
        });
        Ok(Stmt::FunctionDef { def, location: loc })
    }

    /// Parse a parameter list up to (not including) `close`
    pub(crate) fn parse_parameters(
        &mut self,
        close: &Token,
        allow_annotations: bool,
    ) -> Result<Vec<Param>, ParseError> {
        let mut params: Vec<Param> = Vec::new();

        while !self.check(close) {
            if matches!(self.peek(), Token::Star(_) | Token::DoubleStar(_)) {
                return Err(ParseError::new(
                    "variadic parameters are not supported",
                    self.current_location(),
                ));
            }
            let param_loc = self.current_location();
            let name = self.expect_identifier()?;
            if params.iter().any(|p| p.name == name) {
                return Err(ParseError::new(
                    format!("duplicate argument '{}' in function definition", name),
                    param_loc,
                ));
            }
            if allow_annotations && self.match_token(&Token::Colon(self.current_location())) {
                self.parse_test()?;
            }
            let default = if self.match_token(&Token::Eq(self.current_location())) {
                Some(self.parse_test()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(ParseError::new(
                    "non-default argument follows default argument",
                    param_loc,
                ));
            }
            params.push(Param { name, default });

            if !self.match_token(&Token::Comma(self.current_location())) {
                break;
            }
        }

        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::parse::parse_source;

    #[test]
    fn test_if_elif_else() {
        let program = parse_source("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n").unwrap();
        match &program.body[0] {
            Stmt::If {
                branches,
                else_body,
                ..
            } => {
                assert_eq!(branches.len(), 2);
                assert!(else_body.is_some());
            }
            _ => panic!("Expected if statement"),
        }
    }

    #[test]
    fn test_chained_and_unpacking_assignment() {
        let program = parse_source("a = b = 1\nx, (y, z) = 1, (2, 3)\n").unwrap();
        match &program.body[0] {
            Stmt::Assign { targets, .. } => assert_eq!(targets.len(), 2),
            _ => panic!("Expected assignment"),
        }
        match &program.body[1] {
            Stmt::Assign { targets, value, .. } => {
                assert!(matches!(&targets[0], Target::Unpack(items, _) if items.len() == 2));
                assert!(matches!(value, Expr::Tuple(items, _) if items.len() == 2));
            }
            _ => panic!("Expected assignment"),
        }
    }

    #[test]
    fn test_augmented_and_annotated() {
        let program = parse_source("x: int = 1\nx += 2\ny: str\n").unwrap();
        assert!(matches!(program.body[0], Stmt::Assign { .. }));
        assert!(matches!(program.body[1], Stmt::AugAssign { op: BinOp::Add, .. }));
        assert!(matches!(program.body[2], Stmt::Pass { .. }));
    }

    #[test]
    fn test_try_statement() {
        let source = "try:\n    x = 1\nexcept (KeyError, ValueError) as e:\n    pass\nexcept:\n    pass\nelse:\n    y = 2\nfinally:\n    z = 3\n";
        let program = parse_source(source).unwrap();
        match &program.body[0] {
            Stmt::Try {
                handlers,
                else_body,
                finally_body,
                ..
            } => {
                assert_eq!(handlers.len(), 2);
                assert_eq!(handlers[0].name.as_deref(), Some("e"));
                assert!(handlers[1].kind.is_none());
                assert!(else_body.is_some());
                assert!(finally_body.is_some());
            }
            _ => panic!("Expected try statement"),
        }
    }

    #[test]
    fn test_for_else_with_break() {
        let program = parse_source("for i, c in enumerate(s):\n    if c:\n        break\nelse:\n    pass\n").unwrap();
        match &program.body[0] {
            Stmt::For {
                target, else_body, ..
            } => {
                assert!(matches!(target, Target::Unpack(items, _) if items.len() == 2));
                assert!(else_body.is_some());
            }
            _ => panic!("Expected for statement"),
        }
    }

    #[test]
    fn test_break_inside_nested_def_is_rejected() {
        let err = parse_source("while True:\n    def f():\n        break\n").unwrap_err();
        assert!(err.message.contains("'break' outside loop"));
    }

    #[test]
    fn test_non_default_after_default() {
        let err = parse_source("def f(a=1, b):\n    pass\n").unwrap_err();
        assert!(err.message.contains("non-default argument"));
    }

    #[test]
    fn test_imports() {
        let program = parse_source("import math as m, os\nfrom functools import reduce\n").unwrap();
        match &program.body[0] {
            Stmt::Import { names, .. } => {
                assert_eq!(names[0].bound_name(), "m");
                assert_eq!(names[1].bound_name(), "os");
            }
            _ => panic!("Expected import"),
        }
        assert!(matches!(&program.body[1], Stmt::ImportFrom { module, .. } if module == "functools"));
    }

    #[test]
    fn test_single_line_block() {
        let program = parse_source("while x: x -= 1\n").unwrap();
        match &program.body[0] {
            Stmt::While { body, .. } => assert_eq!(body.len(), 1),
            _ => panic!("Expected while statement"),
        }
    }
}
