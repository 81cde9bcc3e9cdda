//! Expression parsing implementation
//!
//! This module handles parsing of expressions by recursive descent, one
//! method per precedence level, lowest first:
//!
//! ```text
//! testlist   ::= test (',' test)* [',']
//! test       ::= lambda | or_test ['if' or_test 'else' test]
//! or_test    ::= and_test ('or' and_test)*
//! and_test   ::= not_test ('and' not_test)*
//! not_test   ::= 'not' not_test | comparison
//! comparison ::= bitor (comp_op bitor)*
//! bitor      ::= bitxor ('|' bitxor)*      (then '^', '&', shifts)
//! arith      ::= term (('+' | '-') term)*
//! term       ::= factor (('*' | '/' | '//' | '%') factor)*
//! factor     ::= ('+' | '-' | '~') factor | power
//! power      ::= primary ['**' factor]
//! primary    ::= atom (call | subscript | attribute)*
//! ```
//!
//! Displays (`[...]`, `(...)`, `{...}`) may hold comprehensions, and
//! adjacent string literals (including f-strings) are concatenated.
//!
//! All parsing methods are implemented as `pub(crate)` methods on the [`Parser`] struct.

use crate::parser::ast::*;
use crate::parser::lexer::Token;
use crate::parser::parse::{ParseError, Parser};
use crate::parser::scope::analyze_scope;
use std::rc::Rc;

impl Parser {
    /// Parse a comma-separated expression list; more than one item (or a
    /// trailing comma) builds a tuple
    pub(crate) fn parse_testlist(&mut self) -> Result<Expr, ParseError> {
        let loc = self.current_location();
        let first = self.parse_test()?;
        if !self.check(&Token::Comma(self.current_location())) {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.match_token(&Token::Comma(self.current_location())) {
            if !self.starts_expression() {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::Tuple(items, loc))
    }

    /// Parse a `for` target list (stops before `in`)
    pub(crate) fn parse_target_list(&mut self) -> Result<Target, ParseError> {
        let loc = self.current_location();
        let first = self.parse_bitor()?;
        if !self.check(&Token::Comma(self.current_location())) {
            return self.expr_to_target(first);
        }

        let mut items = vec![first];
        while self.match_token(&Token::Comma(self.current_location())) {
            if self.check(&Token::In(self.current_location())) {
                break;
            }
            items.push(self.parse_bitor()?);
        }
        self.expr_to_target(Expr::Tuple(items, loc))
    }

    /// Whether the current token can begin an expression
    fn starts_expression(&self) -> bool {
        matches!(
            self.peek(),
            Token::IntLiteral(..)
                | Token::FloatLiteral(..)
                | Token::StringLiteral(..)
                | Token::FStringLiteral(..)
                | Token::Ident(..)
                | Token::None(_)
                | Token::True(_)
                | Token::False(_)
                | Token::Not(_)
                | Token::Lambda(_)
                | Token::Minus(_)
                | Token::Plus(_)
                | Token::Tilde(_)
                | Token::LParen(_)
                | Token::LBracket(_)
                | Token::LBrace(_)
        )
    }

    /// Parse a single expression, including conditional expressions and lambdas
    pub(crate) fn parse_test(&mut self) -> Result<Expr, ParseError> {
        self.nested(|p| {
            if p.check(&Token::Lambda(p.current_location())) {
                return p.parse_lambda();
            }

            let expr = p.parse_or_test()?;
            if p.match_token(&Token::If(p.current_location())) {
                let location = expr.location();
                let condition = p.parse_or_test()?;
                p.expect_token(
                    &Token::Else(p.current_location()),
                    "expected 'else' in conditional expression",
                )?;
                let else_expr = p.parse_test()?;
                return Ok(Expr::IfExp {
                    condition: Box::new(condition),
                    then_expr: Box::new(expr),
                    else_expr: Box::new(else_expr),
                    location,
                });
            }
            Ok(expr)
        })
    }

    /// Parse `lambda params: body`; the body becomes a single return
    fn parse_lambda(&mut self) -> Result<Expr, ParseError> {
        let loc = self.current_location();
        self.advance();
        let params = self.parse_parameters(&Token::Colon(self.current_location()), false)?;
        self.expect_colon("after lambda parameters")?;

        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_test();
        self.function_depth -= 1;
        self.loop_depth = saved_loop_depth;
        let body_expr = body?;

        let body = vec![Stmt::Return {
            location: body_expr.location(),
            value: Some(body_expr),
        }];
        let scope = analyze_scope(&params, &body)
            .map_err(|(message, location)| ParseError::new(message, location))?;

        Ok(Expr::Lambda {
            def: Rc::new(FunctionDef {
                name: "<lambda>".to_string(),
                params,
                body,
                scope,
                location: loc,
            }),
            location: loc,
        })
    }

    fn parse_or_test(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_test()?;

        while self.match_token(&Token::Or(self.current_location())) {
            let location = left.location();
            let right = self.parse_and_test()?;
            left = Expr::BoolOp {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }

        Ok(left)
    }

    fn parse_and_test(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not_test()?;

        while self.match_token(&Token::And(self.current_location())) {
            let location = left.location();
            let right = self.parse_not_test()?;
            left = Expr::BoolOp {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }

        Ok(left)
    }

    fn parse_not_test(&mut self) -> Result<Expr, ParseError> {
        if self.check(&Token::Not(self.current_location())) {
            let location = self.current_location();
            self.advance();
            let operand = self.nested(|p| p.parse_not_test())?;
            return Ok(Expr::UnaryOp {
                op: UnOp::Not,
                operand: Box::new(operand),
                location,
            });
        }
        self.parse_comparison()
    }

    /// Parse a (possibly chained) comparison
    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_bitor()?;
        let mut rest = Vec::new();

        loop {
            let in_token = Token::In(self.current_location());
            let not_token = Token::Not(self.current_location());
            let (op, width) = match self.peek() {
                Token::EqEq(_) => (CmpOp::Eq, 1),
                Token::NotEq(_) => (CmpOp::Ne, 1),
                Token::Lt(_) => (CmpOp::Lt, 1),
                Token::Le(_) => (CmpOp::Le, 1),
                Token::Gt(_) => (CmpOp::Gt, 1),
                Token::Ge(_) => (CmpOp::Ge, 1),
                Token::In(_) => (CmpOp::In, 1),
                Token::Not(_) if self.check_ahead(1, &in_token) => (CmpOp::NotIn, 2),
                Token::Is(_) if self.check_ahead(1, &not_token) => (CmpOp::IsNot, 2),
                Token::Is(_) => (CmpOp::Is, 1),
                _ => break,
            };
            for _ in 0..width {
                self.advance();
            }
            rest.push((op, self.parse_bitor()?));
        }

        if rest.is_empty() {
            return Ok(left);
        }
        let location = left.location();
        Ok(Expr::Compare {
            left: Box::new(left),
            rest,
            location,
        })
    }

    /// Parse a left-associative binary level with the given operator table
    fn parse_binary_level(
        &mut self,
        operators: fn(&Token) -> Option<BinOp>,
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;

        while let Some(op) = operators(self.peek()) {
            self.advance();
            let location = left.location();
            let right = next(self)?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }

        Ok(left)
    }

    pub(crate) fn parse_bitor(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |t| matches!(t, Token::Pipe(_)).then_some(BinOp::BitOr),
            Self::parse_bitxor,
        )
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |t| matches!(t, Token::Caret(_)).then_some(BinOp::BitXor),
            Self::parse_bitand,
        )
    }

    fn parse_bitand(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |t| matches!(t, Token::Amp(_)).then_some(BinOp::BitAnd),
            Self::parse_shift,
        )
    }

    fn parse_shift(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |t| match t {
                Token::LtLt(_) => Some(BinOp::Shl),
                Token::GtGt(_) => Some(BinOp::Shr),
                _ => None,
            },
            Self::parse_arith,
        )
    }

    fn parse_arith(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |t| match t {
                Token::Plus(_) => Some(BinOp::Add),
                Token::Minus(_) => Some(BinOp::Sub),
                _ => None,
            },
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |t| match t {
                Token::Star(_) => Some(BinOp::Mul),
                Token::Slash(_) => Some(BinOp::Div),
                Token::DoubleSlash(_) => Some(BinOp::FloorDiv),
                Token::Percent(_) => Some(BinOp::Mod),
                _ => None,
            },
            Self::parse_factor,
        )
    }

    /// Parse unary `+`, `-`, `~`
    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Minus(_) => UnOp::Neg,
            Token::Plus(_) => UnOp::Pos,
            Token::Tilde(_) => UnOp::Invert,
            _ => return self.parse_power(),
        };
        let location = self.current_location();
        self.advance();
        let operand = self.nested(|p| p.parse_factor())?;
        Ok(Expr::UnaryOp {
            op,
            operand: Box::new(operand),
            location,
        })
    }

    /// Parse `**` (right-associative, binds tighter than unary on its left)
    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        if self.match_token(&Token::DoubleStar(self.current_location())) {
            let location = base.location();
            let exponent = self.nested(|p| p.parse_factor())?;
            return Ok(Expr::BinaryOp {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
                location,
            });
        }
        Ok(base)
    }

    /// Parse an atom followed by calls, subscripts and attribute accesses
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;

        loop {
            let location = self.current_location();
            if self.match_token(&Token::LParen(location)) {
                let (args, kwargs) = self.parse_call_arguments()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                    location,
                };
            } else if self.match_token(&Token::LBracket(location)) {
                let index = self.parse_subscript()?;
                self.expect_token(
                    &Token::RBracket(self.current_location()),
                    "expected ']' after subscript",
                )?;
                expr = Expr::Subscript {
                    object: Box::new(expr),
                    index: Box::new(index),
                    location,
                };
            } else if self.match_token(&Token::Dot(location)) {
                let name = self.expect_identifier()?;
                expr = Expr::Attribute {
                    object: Box::new(expr),
                    name,
                    location,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Parse call arguments after '(' through the closing ')'
    fn parse_call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();

        while !self.check(&Token::RParen(self.current_location())) {
            if matches!(self.peek(), Token::Star(_) | Token::DoubleStar(_)) {
                return Err(ParseError::new(
                    "argument unpacking is not supported",
                    self.current_location(),
                ));
            }

            let is_keyword = matches!(self.peek(), Token::Ident(..))
                && self.check_ahead(1, &Token::Eq(self.current_location()));
            if is_keyword {
                let name_loc = self.current_location();
                let name = self.expect_identifier()?;
                self.advance();
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(ParseError::new(
                        format!("keyword argument repeated: {}", name),
                        name_loc,
                    ));
                }
                kwargs.push((name, self.parse_test()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(ParseError::new(
                        "positional argument follows keyword argument",
                        self.current_location(),
                    ));
                }
                let arg = self.parse_test()?;
                if self.check(&Token::For(self.current_location())) {
                    let location = arg.location();
                    let clauses = self.parse_comprehension_clauses()?;
                    args.push(Expr::Comprehension {
                        kind: CompKind::Generator(Box::new(arg)),
                        clauses,
                        location,
                    });
                } else {
                    args.push(arg);
                }
            }

            if !self.match_token(&Token::Comma(self.current_location())) {
                break;
            }
        }

        self.expect_rparen("after arguments")?;
        Ok((args, kwargs))
    }

    /// Parse the inside of `[...]` after an expression: index, slice or tuple index
    fn parse_subscript(&mut self) -> Result<Expr, ParseError> {
        let loc = self.current_location();
        let first = self.parse_subscript_item()?;
        if !self.check(&Token::Comma(self.current_location())) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.match_token(&Token::Comma(self.current_location())) {
            if self.check(&Token::RBracket(self.current_location())) {
                break;
            }
            items.push(self.parse_subscript_item()?);
        }
        Ok(Expr::Tuple(items, loc))
    }

    fn parse_subscript_item(&mut self) -> Result<Expr, ParseError> {
        let location = self.current_location();
        let lower = if self.check(&Token::Colon(location)) {
            None
        } else {
            let expr = self.parse_test()?;
            if !self.check(&Token::Colon(self.current_location())) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };

        self.advance(); // ':'
        let upper = self.parse_optional_slice_part()?;
        let step = if self.match_token(&Token::Colon(self.current_location())) {
            self.parse_optional_slice_part()?
        } else {
            None
        };

        Ok(Expr::Slice {
            lower,
            upper,
            step,
            location,
        })
    }

    fn parse_optional_slice_part(&mut self) -> Result<Option<Box<Expr>>, ParseError> {
        if matches!(
            self.peek(),
            Token::Colon(_) | Token::RBracket(_) | Token::Comma(_)
        ) {
            Ok(None)
        } else {
            Ok(Some(Box::new(self.parse_test()?)))
        }
    }

    /// Parse `for ... in ...` and `if ...` clauses of a comprehension
    fn parse_comprehension_clauses(&mut self) -> Result<Vec<CompClause>, ParseError> {
        let mut clauses = Vec::new();

        loop {
            if self.match_token(&Token::For(self.current_location())) {
                let target = self.parse_target_list()?;
                self.expect_token(
                    &Token::In(self.current_location()),
                    "expected 'in' in comprehension",
                )?;
                let iter = self.parse_or_test()?;
                clauses.push(CompClause::For { target, iter });
            } else if self.match_token(&Token::If(self.current_location())) {
                clauses.push(CompClause::If(self.parse_or_test()?));
            } else {
                break;
            }
        }

        Ok(clauses)
    }

    /// Parse literals, names and bracketed displays
    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let loc = self.current_location();

        match self.peek_token() {
            Token::IntLiteral(n, _) => {
                self.advance();
                Ok(Expr::IntLiteral(n, loc))
            }
            Token::FloatLiteral(n, _) => {
                self.advance();
                Ok(Expr::FloatLiteral(n, loc))
            }
            Token::StringLiteral(..) | Token::FStringLiteral(..) => self.parse_strings(),
            Token::Ident(name, _) => {
                self.advance();
                Ok(Expr::Name(name, loc))
            }
            Token::True(_) => {
                self.advance();
                Ok(Expr::BoolLiteral(true, loc))
            }
            Token::False(_) => {
                self.advance();
                Ok(Expr::BoolLiteral(false, loc))
            }
            Token::None(_) => {
                self.advance();
                Ok(Expr::NoneLiteral(loc))
            }
            Token::LParen(_) => {
                self.advance();
                self.parse_paren_display(loc)
            }
            Token::LBracket(_) => {
                self.advance();
                self.parse_list_display(loc)
            }
            Token::LBrace(_) => {
                self.advance();
                self.parse_dict_display(loc)
            }
            _ => Err(self.error_here("invalid syntax: expected expression")),
        }
    }

    /// `(...)`: empty tuple, parenthesized expression, tuple or generator
    fn parse_paren_display(&mut self, loc: SourceLocation) -> Result<Expr, ParseError> {
        if self.match_token(&Token::RParen(self.current_location())) {
            return Ok(Expr::Tuple(Vec::new(), loc));
        }

        let first = self.parse_test()?;
        if self.check(&Token::For(self.current_location())) {
            let clauses = self.parse_comprehension_clauses()?;
            self.expect_rparen("after generator expression")?;
            return Ok(Expr::Comprehension {
                kind: CompKind::Generator(Box::new(first)),
                clauses,
                location: loc,
            });
        }

        if self.match_token(&Token::RParen(self.current_location())) {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.match_token(&Token::Comma(self.current_location())) {
            if self.check(&Token::RParen(self.current_location())) {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect_rparen("after tuple")?;
        Ok(Expr::Tuple(items, loc))
    }

    /// `[...]`: list literal or list comprehension
    fn parse_list_display(&mut self, loc: SourceLocation) -> Result<Expr, ParseError> {
        let close = Token::RBracket(loc);
        if self.match_token(&close) {
            return Ok(Expr::List(Vec::new(), loc));
        }

        let first = self.parse_test()?;
        if self.check(&Token::For(self.current_location())) {
            let clauses = self.parse_comprehension_clauses()?;
            self.expect_token(&close, "expected ']' after list comprehension")?;
            return Ok(Expr::Comprehension {
                kind: CompKind::List(Box::new(first)),
                clauses,
                location: loc,
            });
        }

        let mut items = vec![first];
        while self.match_token(&Token::Comma(self.current_location())) {
            if self.check(&close) {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect_token(&close, "expected ']' after list")?;
        Ok(Expr::List(items, loc))
    }

    /// `{...}`: dict literal or dict comprehension
    fn parse_dict_display(&mut self, loc: SourceLocation) -> Result<Expr, ParseError> {
        let close = Token::RBrace(loc);
        if self.match_token(&close) {
            return Ok(Expr::Dict(Vec::new(), loc));
        }

        let key = self.parse_test()?;
        if !self.check(&Token::Colon(self.current_location())) {
            return Err(ParseError::new("set displays are not supported", loc));
        }
        self.advance();
        let value = self.parse_test()?;

        if self.check(&Token::For(self.current_location())) {
            let clauses = self.parse_comprehension_clauses()?;
            self.expect_token(&close, "expected '}' after dict comprehension")?;
            return Ok(Expr::Comprehension {
                kind: CompKind::Dict(Box::new(key), Box::new(value)),
                clauses,
                location: loc,
            });
        }

        let mut entries = vec![(key, value)];
        while self.match_token(&Token::Comma(self.current_location())) {
            if self.check(&close) {
                break;
            }
            let key = self.parse_test()?;
            self.expect_colon("after dict key")?;
            let value = self.parse_test()?;
            entries.push((key, value));
        }
        self.expect_token(&close, "expected '}' after dict")?;
        Ok(Expr::Dict(entries, loc))
    }

    /// Concatenate adjacent string and f-string literals
    fn parse_strings(&mut self) -> Result<Expr, ParseError> {
        let loc = self.current_location();
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut formatted = false;

        loop {
            match self.peek_token() {
                Token::StringLiteral(s, _) => {
                    self.advance();
                    push_literal(&mut parts, &s);
                }
                Token::FStringLiteral(s, token_loc) => {
                    self.advance();
                    formatted = true;
                    for part in parse_fstring(&s, token_loc)? {
                        match part {
                            FStringPart::Literal(text) => push_literal(&mut parts, &text),
                            field => parts.push(field),
                        }
                    }
                }
                _ => break,
            }
        }

        if formatted {
            return Ok(Expr::FString(parts, loc));
        }
        let text = match parts.pop() {
            Some(FStringPart::Literal(text)) => text,
            _ => String::new(),
        };
        Ok(Expr::StringLiteral(text, loc))
    }
}

fn push_literal(parts: &mut Vec<FStringPart>, text: &str) {
    if let Some(FStringPart::Literal(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(FStringPart::Literal(text.to_string()));
    }
}

/// Split f-string content into literal text and `{expr[!conv][:spec]}` fields
pub(crate) fn parse_fstring(content: &str, loc: SourceLocation) -> Result<Vec<FStringPart>, ParseError> {
    let chars: Vec<char> = content.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => {
                return Err(ParseError::new("f-string: single '}' is not allowed", loc));
            }
            '{' => {
                if !literal.is_empty() {
                    parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                }
                let (field, next) = parse_fstring_field(&chars, i + 1, loc)?;
                parts.push(field);
                i = next;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    if !literal.is_empty() {
        parts.push(FStringPart::Literal(literal));
    }
    Ok(parts)
}

/// Parse one replacement field starting after its '{'; returns the index after '}'
fn parse_fstring_field(
    chars: &[char],
    start: usize,
    loc: SourceLocation,
) -> Result<(FStringPart, usize), ParseError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = start;
    let mut expr_end = None;
    let mut conversion = None;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '}' if depth > 0 => depth -= 1,
            '!' if depth == 0 && chars.get(i + 1) != Some(&'=') => {
                expr_end = Some(i);
                conversion = chars.get(i + 1).copied();
                i += 2;
                break;
            }
            ':' | '}' if depth == 0 => {
                expr_end = Some(i);
                break;
            }
            _ => {}
        }
        i += 1;
    }

    let expr_end = expr_end.ok_or_else(|| ParseError::new("f-string: expecting '}'", loc))?;
    if let Some(conv) = conversion {
        if !matches!(conv, 'r' | 's' | 'a') {
            return Err(ParseError::new(
                "f-string: invalid conversion character: expected 's', 'r', or 'a'",
                loc,
            ));
        }
    }

    let mut spec = None;
    if chars.get(i) == Some(&':') {
        let spec_start = i + 1;
        let mut end = spec_start;
        while end < chars.len() && chars[end] != '}' {
            end += 1;
        }
        spec = Some(chars[spec_start..end].iter().collect::<String>());
        i = end;
    }
    if chars.get(i) != Some(&'}') {
        return Err(ParseError::new("f-string: expecting '}'", loc));
    }

    let source: String = chars[start..expr_end].iter().collect();
    if source.trim().is_empty() {
        return Err(ParseError::new("f-string: empty expression not allowed", loc));
    }
    let expr = parse_embedded_expression(source.trim(), loc)?;

    Ok((
        FStringPart::Field {
            expr: Box::new(expr),
            conversion,
            spec,
        },
        i + 1,
    ))
}

/// Parse the expression inside an f-string field; errors point at the literal
fn parse_embedded_expression(source: &str, loc: SourceLocation) -> Result<Expr, ParseError> {
    let relocate = |err: ParseError| ParseError::new(format!("f-string: {}", err.message), loc);
    let mut parser = Parser::new(&format!("({})", source)).map_err(relocate)?;
    let expr = parser.parse_testlist().map_err(relocate)?;
    if !matches!(parser.peek(), Token::Newline(_) | Token::Eof(_)) {
        return Err(ParseError::new("f-string: invalid syntax", loc));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::parse::parse_source;

    fn expr_of(source: &str) -> Expr {
        let program = parse_source(source).unwrap();
        match &program.body[0] {
            Stmt::Expr { expr, .. } => expr.clone(),
            Stmt::Assign { value, .. } => value.clone(),
            other => panic!("Expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        match expr_of("1 + 2 * 3 ** 2\n") {
            Expr::BinaryOp {
                op: BinOp::Add,
                right,
                ..
            } => match *right {
                Expr::BinaryOp {
                    op: BinOp::Mul,
                    right,
                    ..
                } => assert!(matches!(*right, Expr::BinaryOp { op: BinOp::Pow, .. })),
                other => panic!("Expected multiplication, got {:?}", other),
            },
            other => panic!("Expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_unary_minus_binds_looser_than_power() {
        match expr_of("-2 ** 2\n") {
            Expr::UnaryOp { op: UnOp::Neg, operand, .. } => {
                assert!(matches!(*operand, Expr::BinaryOp { op: BinOp::Pow, .. }))
            }
            other => panic!("Expected negation, got {:?}", other),
        }
    }

    #[test]
    fn test_chained_comparison() {
        match expr_of("a < b <= c not in d\n") {
            Expr::Compare { rest, .. } => {
                let ops: Vec<CmpOp> = rest.iter().map(|(op, _)| *op).collect();
                assert_eq!(ops, vec![CmpOp::Lt, CmpOp::Le, CmpOp::NotIn]);
            }
            other => panic!("Expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_conditional_and_lambda() {
        assert!(matches!(expr_of("a if b else c\n"), Expr::IfExp { .. }));
        match expr_of("f = lambda x, y=1: x + y\n") {
            Expr::Lambda { def, .. } => {
                assert_eq!(def.name, "<lambda>");
                assert_eq!(def.params.len(), 2);
                assert!(matches!(def.body[0], Stmt::Return { .. }));
            }
            other => panic!("Expected lambda, got {:?}", other),
        }
    }

    #[test]
    fn test_comprehensions() {
        assert!(matches!(
            expr_of("[x * x for x in range(10) if x % 2]\n"),
            Expr::Comprehension { kind: CompKind::List(_), ref clauses, .. } if clauses.len() == 2
        ));
        assert!(matches!(
            expr_of("{k: v for k, v in pairs}\n"),
            Expr::Comprehension { kind: CompKind::Dict(..), .. }
        ));
        assert!(matches!(
            expr_of("sum(x for x in xs)\n"),
            Expr::Call { ref args, .. } if matches!(args[0], Expr::Comprehension { kind: CompKind::Generator(_), .. })
        ));
    }

    #[test]
    fn test_slices_and_keywords() {
        match expr_of("s[1:-1:2]\n") {
            Expr::Subscript { index, .. } => {
                assert!(matches!(*index, Expr::Slice { lower: Some(_), upper: Some(_), step: Some(_), .. }))
            }
            other => panic!("Expected subscript, got {:?}", other),
        }
        match expr_of("print(a, b, sep=', ', end='')\n") {
            Expr::Call { args, kwargs, .. } => {
                assert_eq!(args.len(), 2);
                assert_eq!(kwargs.len(), 2);
                assert_eq!(kwargs[0].0, "sep");
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_fstring_fields() {
        match expr_of("f'{name!r}: {value:>5} {{literal}}'\n") {
            Expr::FString(parts, _) => {
                assert_eq!(parts.len(), 4);
                assert!(matches!(&parts[0], FStringPart::Field { conversion: Some('r'), .. }));
                assert!(matches!(&parts[2], FStringPart::Field { spec: Some(s), .. } if s == ">5"));
                assert!(matches!(&parts[3], FStringPart::Literal(s) if s == " {literal}"));
            }
            other => panic!("Expected f-string, got {:?}", other),
        }
    }

    #[test]
    fn test_adjacent_strings_concatenate() {
        assert!(matches!(expr_of("'ab' \"cd\"\n"), Expr::StringLiteral(ref s, _) if s == "abcd"));
    }

    #[test]
    fn test_set_display_rejected() {
        let err = parse_source("s = {1, 2}\n").unwrap_err();
        assert!(err.message.contains("set displays"));
    }
}
