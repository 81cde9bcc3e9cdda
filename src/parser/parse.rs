//! Main parser coordinator
//!
//! This module provides the [`Parser`] struct and core parsing infrastructure,
//! including error types, helper methods, and the main parse entry point.
//!
//! # Parser Architecture
//!
//! The Parser uses a recursive descent approach with the following organization:
//! - This module: Parser struct, helper methods, and coordination
//! - `statements`: simple and compound statements, blocks, function definitions
//! - `expressions`: expressions by precedence level, comprehensions, f-strings
//! - `scope`: local/global/nonlocal classification of a function body
//!
//! # Implementation
//!
//! Parser methods are split across multiple files using `impl Parser` blocks,
//! allowing each module to extend the Parser with related functionality while
//! maintaining access to the shared parser state.

use crate::parser::ast::*;
use crate::parser::lexer::{LexError, Lexer, Token};
use thiserror::Error;

/// Deepest bracket/statement nesting accepted before reporting a syntax error
///
/// Each level costs one full trip down the precedence chain; the limit keeps
/// an unoptimized build inside a default 2 MiB thread stack.
pub(crate) const MAX_NESTING: usize = 32;

/// Parser error type
#[derive(Debug, Clone, Error)]
#[error("line {line}, column {column}: {message}", line = .location.line, column = .location.column)]
pub struct ParseError {
    pub message: String,
    pub location: SourceLocation,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError {
            message: err.message,
            location: err.location,
        }
    }
}

/// Recursive descent parser for the traced language
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) position: usize,
    pub(crate) loop_depth: usize,
    pub(crate) function_depth: usize,
    pub(crate) nesting: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize()?;
        Ok(Self {
            tokens,
            position: 0,
            loop_depth: 0,
            function_depth: 0,
            nesting: 0,
        })
    }

    /// Parse the entire program (module body)
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();

        while !self.is_at_end() {
            if self.match_token(&Token::Newline(self.current_location())) {
                continue;
            }
            if self.check(&Token::Indent(self.current_location())) {
                return Err(ParseError::new("unexpected indent", self.current_location()));
            }
            body.extend(self.parse_statement()?);
        }

        Ok(Program::new(body))
    }

    // ===== Helper methods =====

    /// Run `f` one nesting level deeper, failing once the nesting limit is hit
    pub(crate) fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.nesting >= MAX_NESTING {
            return Err(ParseError::new(
                "too many nested blocks or parentheses",
                self.current_location(),
            ));
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    pub(crate) fn match_token(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    pub(crate) fn check_ahead(&self, n: usize, token: &Token) -> bool {
        self.peek_ahead(n)
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(token))
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.position += 1;
        }
        self.previous()
    }

    pub(crate) fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof(_))
    }

    pub(crate) fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.position.min(last)]
    }

    pub(crate) fn peek_token(&self) -> Token {
        self.peek().clone()
    }

    pub(crate) fn peek_ahead(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.position + n)
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.position.saturating_sub(1)]
    }

    pub(crate) fn current_location(&self) -> SourceLocation {
        self.peek().location()
    }

    pub(crate) fn error_here(&self, message: &str) -> ParseError {
        ParseError::new(
            format!("{}, found {}", message, self.peek()),
            self.current_location(),
        )
    }

    pub(crate) fn expect_token(&mut self, token: &Token, message: &str) -> Result<(), ParseError> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(message))
        }
    }

    pub(crate) fn expect_colon(&mut self, ctx: &str) -> Result<(), ParseError> {
        self.expect_token(
            &Token::Colon(self.current_location()),
            &format!("expected ':' {ctx}"),
        )
    }

    pub(crate) fn expect_rparen(&mut self, ctx: &str) -> Result<(), ParseError> {
        self.expect_token(
            &Token::RParen(self.current_location()),
            &format!("expected ')' {ctx}"),
        )
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, ParseError> {
        if let Token::Ident(name, _) = self.peek() {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error_here("expected identifier"))
        }
    }
}

/// Parse a whole source text into a [`Program`]
pub fn parse_source(source: &str) -> Result<Program, ParseError> {
    Parser::new(source)?.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_function() {
        let source = "def add(a, b=2):\n    return a + b\n";
        let program = parse_source(source).unwrap();

        assert_eq!(program.body.len(), 1);
        match &program.body[0] {
            Stmt::FunctionDef { def, .. } => {
                assert_eq!(def.name, "add");
                assert_eq!(def.params.len(), 2);
                assert!(def.params[1].default.is_some());
                assert_eq!(def.body.len(), 1);
                assert!(def.scope.locals.contains("a"));
            }
            _ => panic!("Expected function definition"),
        }
    }

    #[test]
    fn test_parse_statements_on_one_line() {
        let program = parse_source("x = 1; y = 2\nprint(x, y)\n").unwrap();
        assert_eq!(program.body.len(), 3);
        assert_eq!(program.body[2].location().line, 2);
    }

    #[test]
    fn test_unexpected_indent() {
        let err = parse_source("x = 1\n    y = 2\n").unwrap_err();
        assert!(err.message.contains("unexpected indent"));
    }

    #[test]
    fn test_return_outside_function() {
        let err = parse_source("return 1\n").unwrap_err();
        assert!(err.message.contains("'return' outside function"));
    }

    #[test]
    fn test_break_outside_loop() {
        let err = parse_source("if True:\n    break\n").unwrap_err();
        assert!(err.message.contains("'break' outside loop"));
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth));
        let err = parse_source(&nested(MAX_NESTING + 5)).unwrap_err();
        assert!(err.message.contains("nested"));
        let err = parse_source(&nested(10_000)).unwrap_err();
        assert!(err.message.contains("nested"));
    }

    #[test]
    fn test_deepest_accepted_nesting_fits_default_stack() {
        // Runs on the harness's ordinary test thread
        let depth = MAX_NESTING - 2;
        let source = format!("x = {}1{}\n", "[".repeat(depth), "]".repeat(depth));
        parse_source(&source).unwrap();
        let source = format!("y = {}1{}\n", "-(".repeat(depth / 2), ")".repeat(depth / 2));
        parse_source(&source).unwrap();
    }

    #[test]
    fn test_empty_program() {
        let program = parse_source("\n# only a comment\n").unwrap();
        assert!(program.body.is_empty());
        assert_eq!(program.first_line(), 1);
    }
}
