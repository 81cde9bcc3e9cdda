//! Lexer (tokenizer) for the traced language
//!
//! Converts raw source text into a flat [`Token`] stream consumed by the parser.
//! Block structure is indentation based, so the lexer tracks an indentation
//! stack and emits synthetic [`Token::Indent`] / [`Token::Dedent`] tokens at
//! logical line starts, plus a [`Token::Newline`] at the end of every logical
//! line. Newlines inside brackets and after a trailing backslash are joined.

use super::ast::SourceLocation;
use std::fmt;
use thiserror::Error;

/// All token variants produced by the lexer.
///
/// Every variant carries a [`SourceLocation`] so that parse errors can report
/// an accurate line and column without a separate token→location table.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    IntLiteral(i64, SourceLocation),
    FloatLiteral(f64, SourceLocation),
    StringLiteral(String, SourceLocation),
    FStringLiteral(String, SourceLocation),

    // Identifiers
    Ident(String, SourceLocation),

    // Keywords
    False(SourceLocation),
    None(SourceLocation),
    True(SourceLocation),
    And(SourceLocation),
    As(SourceLocation),
    Assert(SourceLocation),
    Break(SourceLocation),
    Continue(SourceLocation),
    Def(SourceLocation),
    Del(SourceLocation),
    Elif(SourceLocation),
    Else(SourceLocation),
    Except(SourceLocation),
    Finally(SourceLocation),
    For(SourceLocation),
    From(SourceLocation),
    Global(SourceLocation),
    If(SourceLocation),
    Import(SourceLocation),
    In(SourceLocation),
    Is(SourceLocation),
    Lambda(SourceLocation),
    Nonlocal(SourceLocation),
    Not(SourceLocation),
    Or(SourceLocation),
    Pass(SourceLocation),
    Raise(SourceLocation),
    Return(SourceLocation),
    Try(SourceLocation),
    While(SourceLocation),

    // Arithmetic
    Plus(SourceLocation),        // +
    Minus(SourceLocation),       // -
    Star(SourceLocation),        // *
    DoubleStar(SourceLocation),  // **
    Slash(SourceLocation),       // /
    DoubleSlash(SourceLocation), // //
    Percent(SourceLocation),     // %

    // Comparison
    EqEq(SourceLocation),  // ==
    NotEq(SourceLocation), // !=
    Lt(SourceLocation),    // <
    Le(SourceLocation),    // <=
    Gt(SourceLocation),    // >
    Ge(SourceLocation),    // >=

    // Bitwise
    Amp(SourceLocation),   // &
    Pipe(SourceLocation),  // |
    Caret(SourceLocation), // ^
    Tilde(SourceLocation), // ~
    LtLt(SourceLocation),  // <<
    GtGt(SourceLocation),  // >>

    // Assignment
    Eq(SourceLocation),            // =
    PlusEq(SourceLocation),        // +=
    MinusEq(SourceLocation),       // -=
    StarEq(SourceLocation),        // *=
    DoubleStarEq(SourceLocation),  // **=
    SlashEq(SourceLocation),       // /=
    DoubleSlashEq(SourceLocation), // //=
    PercentEq(SourceLocation),     // %=
    AmpEq(SourceLocation),         // &=
    PipeEq(SourceLocation),        // |=
    CaretEq(SourceLocation),       // ^=
    LtLtEq(SourceLocation),        // <<=
    GtGtEq(SourceLocation),        // >>=

    // Punctuation
    Dot(SourceLocation),       // .
    Comma(SourceLocation),     // ,
    Colon(SourceLocation),     // :
    Semicolon(SourceLocation), // ;
    Arrow(SourceLocation),     // ->
    LParen(SourceLocation),    // (
    RParen(SourceLocation),    // )
    LBracket(SourceLocation),  // [
    RBracket(SourceLocation),  // ]
    LBrace(SourceLocation),    // {
    RBrace(SourceLocation),    // }

    // Layout
    Newline(SourceLocation),
    Indent(SourceLocation),
    Dedent(SourceLocation),

    // End of file
    Eof(SourceLocation),
}

impl Token {
    /// Returns the source location where this token appears.
    pub fn location(&self) -> SourceLocation {
        match self {
            Token::IntLiteral(_, loc)
            | Token::FloatLiteral(_, loc)
            | Token::StringLiteral(_, loc)
            | Token::FStringLiteral(_, loc)
            | Token::Ident(_, loc)
            | Token::False(loc)
            | Token::None(loc)
            | Token::True(loc)
            | Token::And(loc)
            | Token::As(loc)
            | Token::Assert(loc)
            | Token::Break(loc)
            | Token::Continue(loc)
            | Token::Def(loc)
            | Token::Del(loc)
            | Token::Elif(loc)
            | Token::Else(loc)
            | Token::Except(loc)
            | Token::Finally(loc)
            | Token::For(loc)
            | Token::From(loc)
            | Token::Global(loc)
            | Token::If(loc)
            | Token::Import(loc)
            | Token::In(loc)
            | Token::Is(loc)
            | Token::Lambda(loc)
            | Token::Nonlocal(loc)
            | Token::Not(loc)
            | Token::Or(loc)
            | Token::Pass(loc)
            | Token::Raise(loc)
            | Token::Return(loc)
            | Token::Try(loc)
            | Token::While(loc)
            | Token::Plus(loc)
            | Token::Minus(loc)
            | Token::Star(loc)
            | Token::DoubleStar(loc)
            | Token::Slash(loc)
            | Token::DoubleSlash(loc)
            | Token::Percent(loc)
            | Token::EqEq(loc)
            | Token::NotEq(loc)
            | Token::Lt(loc)
            | Token::Le(loc)
            | Token::Gt(loc)
            | Token::Ge(loc)
            | Token::Amp(loc)
            | Token::Pipe(loc)
            | Token::Caret(loc)
            | Token::Tilde(loc)
            | Token::LtLt(loc)
            | Token::GtGt(loc)
            | Token::Eq(loc)
            | Token::PlusEq(loc)
            | Token::MinusEq(loc)
            | Token::StarEq(loc)
            | Token::DoubleStarEq(loc)
            | Token::SlashEq(loc)
            | Token::DoubleSlashEq(loc)
            | Token::PercentEq(loc)
            | Token::AmpEq(loc)
            | Token::PipeEq(loc)
            | Token::CaretEq(loc)
            | Token::LtLtEq(loc)
            | Token::GtGtEq(loc)
            | Token::Dot(loc)
            | Token::Comma(loc)
            | Token::Colon(loc)
            | Token::Semicolon(loc)
            | Token::Arrow(loc)
            | Token::LParen(loc)
            | Token::RParen(loc)
            | Token::LBracket(loc)
            | Token::RBracket(loc)
            | Token::LBrace(loc)
            | Token::RBrace(loc)
            | Token::Newline(loc)
            | Token::Indent(loc)
            | Token::Dedent(loc)
            | Token::Eof(loc) => *loc,
        }
    }

    fn keyword(ident: &str, loc: SourceLocation) -> Option<Token> {
        let token = match ident {
            "False" => Token::False(loc),
            "None" => Token::None(loc),
            "True" => Token::True(loc),
            "and" => Token::And(loc),
            "as" => Token::As(loc),
            "assert" => Token::Assert(loc),
            "break" => Token::Break(loc),
            "continue" => Token::Continue(loc),
            "def" => Token::Def(loc),
            "del" => Token::Del(loc),
            "elif" => Token::Elif(loc),
            "else" => Token::Else(loc),
            "except" => Token::Except(loc),
            "finally" => Token::Finally(loc),
            "for" => Token::For(loc),
            "from" => Token::From(loc),
            "global" => Token::Global(loc),
            "if" => Token::If(loc),
            "import" => Token::Import(loc),
            "in" => Token::In(loc),
            "is" => Token::Is(loc),
            "lambda" => Token::Lambda(loc),
            "nonlocal" => Token::Nonlocal(loc),
            "not" => Token::Not(loc),
            "or" => Token::Or(loc),
            "pass" => Token::Pass(loc),
            "raise" => Token::Raise(loc),
            "return" => Token::Return(loc),
            "try" => Token::Try(loc),
            "while" => Token::While(loc),
            _ => return None,
        };
        Some(token)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::IntLiteral(n, _) => write!(f, "int literal {}", n),
            Token::FloatLiteral(n, _) => write!(f, "float literal {}", n),
            Token::StringLiteral(s, _) => write!(f, "string literal {:?}", s),
            Token::FStringLiteral(s, _) => write!(f, "f-string {:?}", s),
            Token::Ident(s, _) => write!(f, "identifier '{}'", s),
            Token::False(_) => write!(f, "'False'"),
            Token::None(_) => write!(f, "'None'"),
            Token::True(_) => write!(f, "'True'"),
            Token::And(_) => write!(f, "'and'"),
            Token::As(_) => write!(f, "'as'"),
            Token::Assert(_) => write!(f, "'assert'"),
            Token::Break(_) => write!(f, "'break'"),
            Token::Continue(_) => write!(f, "'continue'"),
            Token::Def(_) => write!(f, "'def'"),
            Token::Del(_) => write!(f, "'del'"),
            Token::Elif(_) => write!(f, "'elif'"),
            Token::Else(_) => write!(f, "'else'"),
            Token::Except(_) => write!(f, "'except'"),
            Token::Finally(_) => write!(f, "'finally'"),
            Token::For(_) => write!(f, "'for'"),
            Token::From(_) => write!(f, "'from'"),
            Token::Global(_) => write!(f, "'global'"),
            Token::If(_) => write!(f, "'if'"),
            Token::Import(_) => write!(f, "'import'"),
            Token::In(_) => write!(f, "'in'"),
            Token::Is(_) => write!(f, "'is'"),
            Token::Lambda(_) => write!(f, "'lambda'"),
            Token::Nonlocal(_) => write!(f, "'nonlocal'"),
            Token::Not(_) => write!(f, "'not'"),
            Token::Or(_) => write!(f, "'or'"),
            Token::Pass(_) => write!(f, "'pass'"),
            Token::Raise(_) => write!(f, "'raise'"),
            Token::Return(_) => write!(f, "'return'"),
            Token::Try(_) => write!(f, "'try'"),
            Token::While(_) => write!(f, "'while'"),
            Token::Plus(_) => write!(f, "'+'"),
            Token::Minus(_) => write!(f, "'-'"),
            Token::Star(_) => write!(f, "'*'"),
            Token::DoubleStar(_) => write!(f, "'**'"),
            Token::Slash(_) => write!(f, "'/'"),
            Token::DoubleSlash(_) => write!(f, "'//'"),
            Token::Percent(_) => write!(f, "'%'"),
            Token::EqEq(_) => write!(f, "'=='"),
            Token::NotEq(_) => write!(f, "'!='"),
            Token::Lt(_) => write!(f, "'<'"),
            Token::Le(_) => write!(f, "'<='"),
            Token::Gt(_) => write!(f, "'>'"),
            Token::Ge(_) => write!(f, "'>='"),
            Token::Amp(_) => write!(f, "'&'"),
            Token::Pipe(_) => write!(f, "'|'"),
            Token::Caret(_) => write!(f, "'^'"),
            Token::Tilde(_) => write!(f, "'~'"),
            Token::LtLt(_) => write!(f, "'<<'"),
            Token::GtGt(_) => write!(f, "'>>'"),
            Token::Eq(_) => write!(f, "'='"),
            Token::PlusEq(_) => write!(f, "'+='"),
            Token::MinusEq(_) => write!(f, "'-='"),
            Token::StarEq(_) => write!(f, "'*='"),
            Token::DoubleStarEq(_) => write!(f, "'**='"),
            Token::SlashEq(_) => write!(f, "'/='"),
            Token::DoubleSlashEq(_) => write!(f, "'//='"),
            Token::PercentEq(_) => write!(f, "'%='"),
            Token::AmpEq(_) => write!(f, "'&='"),
            Token::PipeEq(_) => write!(f, "'|='"),
            Token::CaretEq(_) => write!(f, "'^='"),
            Token::LtLtEq(_) => write!(f, "'<<='"),
            Token::GtGtEq(_) => write!(f, "'>>='"),
            Token::Dot(_) => write!(f, "'.'"),
            Token::Comma(_) => write!(f, "','"),
            Token::Colon(_) => write!(f, "':'"),
            Token::Semicolon(_) => write!(f, "';'"),
            Token::Arrow(_) => write!(f, "'->'"),
            Token::LParen(_) => write!(f, "'('"),
            Token::RParen(_) => write!(f, "')'"),
            Token::LBracket(_) => write!(f, "'['"),
            Token::RBracket(_) => write!(f, "']'"),
            Token::LBrace(_) => write!(f, "'{{'"),
            Token::RBrace(_) => write!(f, "'}}'"),
            Token::Newline(_) => write!(f, "newline"),
            Token::Indent(_) => write!(f, "indent"),
            Token::Dedent(_) => write!(f, "dedent"),
            Token::Eof(_) => write!(f, "end of file"),
        }
    }
}

/// Lexer error type
#[derive(Debug, Clone, Error)]
#[error("line {line}, column {column}: {message}", line = .location.line, column = .location.column)]
pub struct LexError {
    pub message: String,
    pub location: SourceLocation,
}

impl LexError {
    fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

/// Width a tab advances indentation to (next multiple of this)
const TAB_WIDTH: usize = 8;

/// Lexer for the traced language
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    indent_stack: Vec<usize>,
    bracket_depth: usize,
    at_line_start: bool,
}

impl Lexer {
    /// Create a new lexer for the given source string.
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            indent_stack: vec![0],
            bracket_depth: 0,
            at_line_start: true,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            if self.at_line_start && self.bracket_depth == 0 {
                self.at_line_start = false;
                if !self.handle_indentation(&mut tokens)? {
                    continue;
                }
            }

            self.skip_inline_whitespace()?;

            let Some(ch) = self.peek() else {
                break;
            };

            if ch == '\n' {
                let loc = self.current_location();
                self.advance();
                if self.bracket_depth == 0 {
                    if !matches!(tokens.last(), None | Some(Token::Newline(_))) {
                        tokens.push(Token::Newline(loc));
                    }
                    self.at_line_start = true;
                }
                continue;
            }

            tokens.push(self.next_token()?);
        }

        let loc = self.current_location();
        if self.bracket_depth > 0 {
            return Err(LexError::new("unexpected EOF inside brackets", loc));
        }
        if !matches!(tokens.last(), None | Some(Token::Newline(_))) {
            tokens.push(Token::Newline(loc));
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            tokens.push(Token::Dedent(loc));
        }
        tokens.push(Token::Eof(loc));

        Ok(tokens)
    }

    /// Measure the indentation of the line starting at the cursor and emit
    /// INDENT/DEDENT tokens. Returns `false` when the line is blank or a
    /// comment and has been skipped entirely.
    fn handle_indentation(&mut self, tokens: &mut Vec<Token>) -> Result<bool, LexError> {
        let mut width = 0;
        while let Some(ch) = self.peek() {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' => width = 0,
                _ => break,
            }
            self.advance();
        }

        match self.peek() {
            None => return Ok(true),
            Some('\n') | Some('\r') | Some('#') => {
                self.skip_to_line_end();
                if self.peek() == Some('\n') {
                    self.advance();
                }
                self.at_line_start = true;
                return Ok(false);
            }
            Some('\\') if self.peek_ahead(1) == Some('\n') => {
                return Ok(true);
            }
            _ => {}
        }

        let loc = self.current_location();
        let current = self.indent_stack.last().copied().unwrap_or(0);
        if width > current {
            self.indent_stack.push(width);
            tokens.push(Token::Indent(loc));
        } else if width < current {
            while self.indent_stack.last().is_some_and(|&top| top > width) {
                self.indent_stack.pop();
                tokens.push(Token::Dedent(loc));
            }
            if self.indent_stack.last() != Some(&width) {
                return Err(LexError::new(
                    "unindent does not match any outer indentation level",
                    loc,
                ));
            }
        }
        Ok(true)
    }

    /// Get next token
    fn next_token(&mut self) -> Result<Token, LexError> {
        let loc = self.current_location();
        let ch = self
            .advance()
            .ok_or_else(|| LexError::new("unexpected end of file", loc))?;

        match ch {
            '"' | '\'' => self.string_literal(ch, loc, false, false),

            '0'..='9' => self.number_literal(ch, loc),
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.number_literal(ch, loc),

            c if c.is_alphabetic() || c == '_' => self.identifier_or_keyword(c, loc),

            '+' => Ok(self.with_eq(loc, Token::Plus, Token::PlusEq)),
            '-' => {
                if self.peek() == Some('>') {
                    self.advance();
                    Ok(Token::Arrow(loc))
                } else {
                    Ok(self.with_eq(loc, Token::Minus, Token::MinusEq))
                }
            }
            '*' => {
                if self.peek() == Some('*') {
                    self.advance();
                    Ok(self.with_eq(loc, Token::DoubleStar, Token::DoubleStarEq))
                } else {
                    Ok(self.with_eq(loc, Token::Star, Token::StarEq))
                }
            }
            '/' => {
                if self.peek() == Some('/') {
                    self.advance();
                    Ok(self.with_eq(loc, Token::DoubleSlash, Token::DoubleSlashEq))
                } else {
                    Ok(self.with_eq(loc, Token::Slash, Token::SlashEq))
                }
            }
            '%' => Ok(self.with_eq(loc, Token::Percent, Token::PercentEq)),
            '=' => Ok(self.with_eq(loc, Token::Eq, Token::EqEq)),
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::NotEq(loc))
                } else {
                    Err(LexError::new("invalid syntax: '!'", loc))
                }
            }
            '<' => {
                if self.peek() == Some('<') {
                    self.advance();
                    Ok(self.with_eq(loc, Token::LtLt, Token::LtLtEq))
                } else {
                    Ok(self.with_eq(loc, Token::Lt, Token::Le))
                }
            }
            '>' => {
                if self.peek() == Some('>') {
                    self.advance();
                    Ok(self.with_eq(loc, Token::GtGt, Token::GtGtEq))
                } else {
                    Ok(self.with_eq(loc, Token::Gt, Token::Ge))
                }
            }
            '&' => Ok(self.with_eq(loc, Token::Amp, Token::AmpEq)),
            '|' => Ok(self.with_eq(loc, Token::Pipe, Token::PipeEq)),
            '^' => Ok(self.with_eq(loc, Token::Caret, Token::CaretEq)),
            '~' => Ok(Token::Tilde(loc)),
            '.' => Ok(Token::Dot(loc)),
            ',' => Ok(Token::Comma(loc)),
            ':' => Ok(Token::Colon(loc)),
            ';' => Ok(Token::Semicolon(loc)),
            '(' => {
                self.bracket_depth += 1;
                Ok(Token::LParen(loc))
            }
            '[' => {
                self.bracket_depth += 1;
                Ok(Token::LBracket(loc))
            }
            '{' => {
                self.bracket_depth += 1;
                Ok(Token::LBrace(loc))
            }
            ')' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                Ok(Token::RParen(loc))
            }
            ']' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                Ok(Token::RBracket(loc))
            }
            '}' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                Ok(Token::RBrace(loc))
            }

            _ => Err(LexError::new(format!("invalid character '{}'", ch), loc)),
        }
    }

    /// Consume an optional trailing `=` and pick the matching token
    fn with_eq(
        &mut self,
        loc: SourceLocation,
        plain: fn(SourceLocation) -> Token,
        with_eq: fn(SourceLocation) -> Token,
    ) -> Token {
        if self.peek() == Some('=') {
            self.advance();
            with_eq(loc)
        } else {
            plain(loc)
        }
    }

    /// Parse a string literal; the opening quote has been consumed
    fn string_literal(
        &mut self,
        quote: char,
        loc: SourceLocation,
        raw: bool,
        formatted: bool,
    ) -> Result<Token, LexError> {
        let triple = self.peek() == Some(quote) && self.peek_ahead(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }

        let mut string = String::new();
        loop {
            let Some(ch) = self.peek() else {
                return Err(LexError::new("unterminated string literal", loc));
            };

            if ch == quote {
                if !triple {
                    self.advance();
                    break;
                }
                if self.peek_ahead(1) == Some(quote) && self.peek_ahead(2) == Some(quote) {
                    self.advance();
                    self.advance();
                    self.advance();
                    break;
                }
                string.push(ch);
                self.advance();
                continue;
            }

            if ch == '\n' && !triple {
                return Err(LexError::new("unterminated string literal", loc));
            }

            if ch == '\\' {
                self.advance();
                let escaped = self
                    .advance()
                    .ok_or_else(|| LexError::new("unterminated string literal", loc))?;
                if raw {
                    string.push('\\');
                    string.push(escaped);
                    continue;
                }
                match escaped {
                    '\n' => {}
                    'n' => string.push('\n'),
                    't' => string.push('\t'),
                    'r' => string.push('\r'),
                    '0' => string.push('\0'),
                    'a' => string.push('\x07'),
                    'b' => string.push('\x08'),
                    'f' => string.push('\x0c'),
                    'v' => string.push('\x0b'),
                    '\\' => string.push('\\'),
                    '\'' => string.push('\''),
                    '"' => string.push('"'),
                    'x' => string.push(self.hex_escape(2, loc)?),
                    'u' => string.push(self.hex_escape(4, loc)?),
                    'U' => string.push(self.hex_escape(8, loc)?),
                    other => {
                        string.push('\\');
                        string.push(other);
                    }
                }
                continue;
            }

            string.push(ch);
            self.advance();
        }

        if formatted {
            Ok(Token::FStringLiteral(string, loc))
        } else {
            Ok(Token::StringLiteral(string, loc))
        }
    }

    fn hex_escape(&mut self, digits: usize, loc: SourceLocation) -> Result<char, LexError> {
        let mut hex = String::with_capacity(digits);
        for _ in 0..digits {
            match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    hex.push(c);
                    self.advance();
                }
                _ => return Err(LexError::new("truncated escape sequence", loc)),
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| LexError::new(format!("invalid escape sequence \\x{}", hex), loc))
    }

    /// Parse a numeric literal (ints with radix prefixes, floats with exponents)
    fn number_literal(&mut self, first: char, loc: SourceLocation) -> Result<Token, LexError> {
        if first == '0' {
            let radix = match self.peek() {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance();
                let digits = self.take_digits(|c| c.is_digit(radix));
                if digits.is_empty() {
                    return Err(LexError::new("invalid numeric literal", loc));
                }
                let value = i64::from_str_radix(&digits, radix)
                    .map_err(|_| LexError::new("integer literal too large", loc))?;
                return Ok(Token::IntLiteral(value, loc));
            }
        }

        let mut text = String::new();
        text.push(first);
        let mut is_float = first == '.';
        text.push_str(&self.take_digits(|c| c.is_ascii_digit()));

        if !is_float && self.peek() == Some('.') && self.peek_ahead(1) != Some('.') {
            is_float = true;
            self.advance();
            text.push('.');
            text.push_str(&self.take_digits(|c| c.is_ascii_digit()));
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign = self.peek_ahead(1);
            let has_sign = matches!(sign, Some('+') | Some('-'));
            let digit_at = if has_sign { 2 } else { 1 };
            if self.peek_ahead(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.advance();
                text.push('e');
                if has_sign {
                    if let Some(s) = self.advance() {
                        text.push(s);
                    }
                }
                text.push_str(&self.take_digits(|c| c.is_ascii_digit()));
            }
        }

        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(LexError::new("invalid decimal literal", loc));
        }

        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| LexError::new(format!("invalid float literal: {}", text), loc))?;
            Ok(Token::FloatLiteral(value, loc))
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|_| LexError::new("integer literal too large", loc))?;
            Ok(Token::IntLiteral(value, loc))
        }
    }

    /// Consume digits accepted by `accept`, skipping `_` separators
    fn take_digits(&mut self, accept: impl Fn(char) -> bool) -> String {
        let mut digits = String::new();
        while let Some(ch) = self.peek() {
            if accept(ch) {
                digits.push(ch);
                self.advance();
            } else if ch == '_' && self.peek_ahead(1).is_some_and(&accept) {
                self.advance();
            } else {
                break;
            }
        }
        digits
    }

    /// Parse identifier, keyword or prefixed string (`r"..."`, `f"..."`)
    fn identifier_or_keyword(&mut self, first: char, loc: SourceLocation) -> Result<Token, LexError> {
        let mut ident = String::new();
        ident.push(first);

        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if let Some(quote @ ('"' | '\'')) = self.peek() {
            let prefix = ident.to_ascii_lowercase();
            if matches!(prefix.as_str(), "r" | "f" | "rf" | "fr") {
                self.advance();
                let raw = prefix.contains('r');
                let formatted = prefix.contains('f');
                return self.string_literal(quote, loc, raw, formatted);
            }
        }

        Ok(Token::keyword(&ident, loc).unwrap_or(Token::Ident(ident, loc)))
    }

    /// Skip spaces, comments and backslash line continuations
    fn skip_inline_whitespace(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') | Some('\x0c') => {
                    self.advance();
                }
                Some('\n') if self.bracket_depth > 0 => {
                    self.advance();
                }
                Some('#') => self.skip_to_line_end(),
                Some('\\') => {
                    let loc = self.current_location();
                    match (self.peek_ahead(1), self.peek_ahead(2)) {
                        (Some('\n'), _) => {
                            self.advance();
                            self.advance();
                        }
                        (Some('\r'), Some('\n')) => {
                            self.advance();
                            self.advance();
                            self.advance();
                        }
                        _ => {
                            return Err(LexError::new(
                                "unexpected character after line continuation character",
                                loc,
                            ))
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Skip to (not past) the end of the current line
    fn skip_to_line_end(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Peek at current character without consuming
    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    /// Peek ahead n characters
    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.input.get(self.position + n).copied()
    }

    /// Advance to next character
    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += 1;

        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(ch)
    }

    /// Get current source location
    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::new(src).tokenize().unwrap()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = lex("x = 1 + 2\n");

        assert!(matches!(tokens[0], Token::Ident(ref s, _) if s == "x"));
        assert!(matches!(tokens[1], Token::Eq(_)));
        assert!(matches!(tokens[2], Token::IntLiteral(1, _)));
        assert!(matches!(tokens[3], Token::Plus(_)));
        assert!(matches!(tokens[4], Token::IntLiteral(2, _)));
        assert!(matches!(tokens[5], Token::Newline(_)));
        assert!(matches!(tokens[6], Token::Eof(_)));
    }

    #[test]
    fn test_operators() {
        let tokens = lex("** // **= //= != <= >> -> <<=");

        assert!(matches!(tokens[0], Token::DoubleStar(_)));
        assert!(matches!(tokens[1], Token::DoubleSlash(_)));
        assert!(matches!(tokens[2], Token::DoubleStarEq(_)));
        assert!(matches!(tokens[3], Token::DoubleSlashEq(_)));
        assert!(matches!(tokens[4], Token::NotEq(_)));
        assert!(matches!(tokens[5], Token::Le(_)));
        assert!(matches!(tokens[6], Token::GtGt(_)));
        assert!(matches!(tokens[7], Token::Arrow(_)));
        assert!(matches!(tokens[8], Token::LtLtEq(_)));
    }

    #[test]
    fn test_indentation() {
        let tokens = lex("if x:\n    y = 1\n\n    # note\nz = 2\n");

        let layout: Vec<&str> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Indent(_) => Some("indent"),
                Token::Dedent(_) => Some("dedent"),
                Token::Newline(_) => Some("newline"),
                _ => None,
            })
            .collect();
        assert_eq!(layout, vec!["newline", "indent", "newline", "dedent", "newline"]);
    }

    #[test]
    fn test_bad_dedent() {
        let err = Lexer::new("if x:\n        y = 1\n    z = 2\n").tokenize().unwrap_err();
        assert!(err.message.contains("unindent"));
        assert_eq!(err.location.line, 3);
    }

    #[test]
    fn test_brackets_join_lines() {
        let tokens = lex("x = [1,\n     2]\n");
        let newlines = tokens.iter().filter(|t| matches!(t, Token::Newline(_))).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("0x1F 1_000 2.5 .5 1e3 0b101");

        assert!(matches!(tokens[0], Token::IntLiteral(31, _)));
        assert!(matches!(tokens[1], Token::IntLiteral(1000, _)));
        assert!(matches!(tokens[2], Token::FloatLiteral(f, _) if f == 2.5));
        assert!(matches!(tokens[3], Token::FloatLiteral(f, _) if f == 0.5));
        assert!(matches!(tokens[4], Token::FloatLiteral(f, _) if f == 1000.0));
        assert!(matches!(tokens[5], Token::IntLiteral(5, _)));
    }

    #[test]
    fn test_string_literals() {
        let tokens = lex(r#"'it\'s' "a\nb" r"\d" f"{x}" """tri"ple""""#);

        assert!(matches!(tokens[0], Token::StringLiteral(ref s, _) if s == "it's"));
        assert!(matches!(tokens[1], Token::StringLiteral(ref s, _) if s == "a\nb"));
        assert!(matches!(tokens[2], Token::StringLiteral(ref s, _) if s == "\\d"));
        assert!(matches!(tokens[3], Token::FStringLiteral(ref s, _) if s == "{x}"));
        assert!(matches!(tokens[4], Token::StringLiteral(ref s, _) if s == "tri\"ple"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("x = 'abc\n").tokenize().unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_trailing_dedents() {
        let tokens = lex("def f():\n    if x:\n        return 1");
        let dedents = tokens.iter().filter(|t| matches!(t, Token::Dedent(_))).count();
        assert_eq!(dedents, 2);
        assert!(matches!(tokens.last(), Some(Token::Eof(_))));
    }
}
