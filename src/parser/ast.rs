// AST (Abstract Syntax Tree) definitions for the traced language

use rustc_hash::FxHashSet;
use std::rc::Rc;

/// Source location information for error reporting and trace events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,    // -x
    Pos,    // +x
    Not,    // not x
    Invert, // ~x
}

/// Comparison operators (chainable)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}

/// Short-circuit boolean operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// Function parameter with optional default expression
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// Names bound inside a function body, computed once at parse time
#[derive(Debug, Clone, Default)]
pub struct ScopeInfo {
    pub locals: FxHashSet<String>,
    pub globals: FxHashSet<String>,
    pub nonlocals: FxHashSet<String>,
}

/// A function body shared between the AST and every function value created from it
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub scope: ScopeInfo,
    pub location: SourceLocation,
}

/// One part of an f-string
#[derive(Debug, Clone)]
pub enum FStringPart {
    Literal(String),
    Field {
        expr: Box<Expr>,
        conversion: Option<char>,
        spec: Option<String>,
    },
}

/// One `for` or `if` clause of a comprehension
#[derive(Debug, Clone)]
pub enum CompClause {
    For { target: Target, iter: Expr },
    If(Expr),
}

/// Comprehension result shape
#[derive(Debug, Clone)]
pub enum CompKind {
    List(Box<Expr>),
    Dict(Box<Expr>, Box<Expr>),
    Generator(Box<Expr>),
}

/// Expressions
#[derive(Debug, Clone)]
pub enum Expr {
    IntLiteral(i64, SourceLocation),
    FloatLiteral(f64, SourceLocation),
    StringLiteral(String, SourceLocation),
    FString(Vec<FStringPart>, SourceLocation),
    BoolLiteral(bool, SourceLocation),
    NoneLiteral(SourceLocation),
    Name(String, SourceLocation),
    List(Vec<Expr>, SourceLocation),
    Tuple(Vec<Expr>, SourceLocation),
    Dict(Vec<(Expr, Expr)>, SourceLocation),
    Comprehension {
        kind: CompKind,
        clauses: Vec<CompClause>,
        location: SourceLocation,
    },
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        location: SourceLocation,
    },
    UnaryOp {
        op: UnOp,
        operand: Box<Expr>,
        location: SourceLocation,
    },
    BoolOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
        location: SourceLocation,
    },
    Compare {
        left: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
        location: SourceLocation,
    },
    IfExp {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        location: SourceLocation,
    },
    Lambda {
        def: Rc<FunctionDef>,
        location: SourceLocation,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
        location: SourceLocation,
    },
    Attribute {
        object: Box<Expr>,
        name: String,
        location: SourceLocation,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
        location: SourceLocation,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
        location: SourceLocation,
    },
}

impl Expr {
    /// Get the source location of this node
    pub fn location(&self) -> SourceLocation {
        match self {
            Expr::IntLiteral(_, loc)
            | Expr::FloatLiteral(_, loc)
            | Expr::StringLiteral(_, loc)
            | Expr::FString(_, loc)
            | Expr::BoolLiteral(_, loc)
            | Expr::NoneLiteral(loc)
            | Expr::Name(_, loc)
            | Expr::List(_, loc)
            | Expr::Tuple(_, loc)
            | Expr::Dict(_, loc) => *loc,
            Expr::Comprehension { location, .. }
            | Expr::BinaryOp { location, .. }
            | Expr::UnaryOp { location, .. }
            | Expr::BoolOp { location, .. }
            | Expr::Compare { location, .. }
            | Expr::IfExp { location, .. }
            | Expr::Lambda { location, .. }
            | Expr::Call { location, .. }
            | Expr::Attribute { location, .. }
            | Expr::Subscript { location, .. }
            | Expr::Slice { location, .. } => *location,
        }
    }
}

/// Assignment targets
#[derive(Debug, Clone)]
pub enum Target {
    Name(String, SourceLocation),
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
        location: SourceLocation,
    },
    Unpack(Vec<Target>, SourceLocation),
}

/// One `except` clause
#[derive(Debug, Clone)]
pub struct ExceptHandler {
    pub kind: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
    pub location: SourceLocation,
}

/// Imported name with optional alias (`import a as b`, `from m import a as b`)
#[derive(Debug, Clone)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportName {
    pub fn bound_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Statements
#[derive(Debug, Clone)]
pub enum Stmt {
    Expr {
        expr: Expr,
        location: SourceLocation,
    },
    Assign {
        targets: Vec<Target>,
        value: Expr,
        location: SourceLocation,
    },
    AugAssign {
        target: Target,
        op: BinOp,
        value: Expr,
        location: SourceLocation,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        else_body: Option<Vec<Stmt>>,
        location: SourceLocation,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
        location: SourceLocation,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
        location: SourceLocation,
    },
    FunctionDef {
        def: Rc<FunctionDef>,
        location: SourceLocation,
    },
    Return {
        value: Option<Expr>,
        location: SourceLocation,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        else_body: Option<Vec<Stmt>>,
        finally_body: Option<Vec<Stmt>>,
        location: SourceLocation,
    },
    Raise {
        exception: Option<Expr>,
        location: SourceLocation,
    },
    Import {
        names: Vec<ImportName>,
        location: SourceLocation,
    },
    ImportFrom {
        module: String,
        names: Vec<ImportName>,
        location: SourceLocation,
    },
    Global {
        names: Vec<String>,
        location: SourceLocation,
    },
    Nonlocal {
        names: Vec<String>,
        location: SourceLocation,
    },
    Delete {
        targets: Vec<Target>,
        location: SourceLocation,
    },
    Assert {
        test: Expr,
        message: Option<Expr>,
        location: SourceLocation,
    },
    Break {
        location: SourceLocation,
    },
    Continue {
        location: SourceLocation,
    },
    Pass {
        location: SourceLocation,
    },
}

impl Stmt {
    /// Get the source location of this node
    pub fn location(&self) -> SourceLocation {
        match self {
            Stmt::Expr { location, .. }
            | Stmt::Assign { location, .. }
            | Stmt::AugAssign { location, .. }
            | Stmt::If { location, .. }
            | Stmt::While { location, .. }
            | Stmt::For { location, .. }
            | Stmt::FunctionDef { location, .. }
            | Stmt::Return { location, .. }
            | Stmt::Try { location, .. }
            | Stmt::Raise { location, .. }
            | Stmt::Import { location, .. }
            | Stmt::ImportFrom { location, .. }
            | Stmt::Global { location, .. }
            | Stmt::Nonlocal { location, .. }
            | Stmt::Delete { location, .. }
            | Stmt::Assert { location, .. }
            | Stmt::Break { location }
            | Stmt::Continue { location }
            | Stmt::Pass { location } => *location,
        }
    }
}

/// Top-level program structure
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub body: Rc<[Stmt]>,
}

impl Program {
    pub fn new(body: Vec<Stmt>) -> Self {
        Program { body: body.into() }
    }

    /// Line of the first statement, used as the module frame's entry line
    pub fn first_line(&self) -> usize {
        self.body.first().map_or(1, |stmt| stmt.location().line)
    }
}
