//! Abstract Syntax Tree for Lumen
//!
//! The compiler does not parse source text; an external front end produces
//! this tree and hands it over, either in-process or as a JSON document
//! (hence the serde derives — the shapes below deserialize from an
//! ESTree-flavored `{"type": ...}` encoding).
//!
//! Every node carries a `Token` with the source line it originated from, so
//! diagnostics and the chunk line table stay accurate without a full span
//! model.

use serde::{Deserialize, Serialize};

/// Source position of a node. The front end tracks columns too; the
/// compiler only needs lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub line: u32,
}

impl Token {
    pub fn new(line: u32) -> Token {
        Token { line }
    }
}

/// An identifier with its source position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    #[serde(default)]
    pub token: Token,
}

impl Ident {
    pub fn new(name: impl Into<String>, line: u32) -> Ident {
        Ident {
            name: name.into(),
            token: Token::new(line),
        }
    }
}

/// Declaration keyword of a variable statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

impl DeclKind {
    pub fn keyword(self) -> &'static str {
        match self {
            DeclKind::Let => "let",
            DeclKind::Const => "const",
            DeclKind::Var => "var",
        }
    }
}

/// One `name = value` declarator of a variable statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declarator {
    pub name: Ident,
    pub value: Option<Expr>,
}

/// A function literal: shared by function declarations and function
/// expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionLiteral {
    pub name: Option<Ident>,
    pub parameters: Vec<Ident>,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub token: Token,
}

/// The header binding of a `for…in` / `for…of` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ForHead {
    /// `for (let x of …)`, `for (const [a, b] of …)`, `for (var k in …)`
    Decl { kind: DeclKind, pattern: Pattern },
    /// Bare left-hand side: `for (x of …)`, `for (o.k in …)`
    Target { pattern: Pattern },
}

impl ForHead {
    pub fn token(&self) -> Token {
        match self {
            ForHead::Decl { pattern, .. } | ForHead::Target { pattern } => pattern.token(),
        }
    }
}

/// A binding or assignment pattern admitted in loop headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Pattern {
    Identifier { ident: Ident },
    /// `o.k` or `o[k]` as an assignment target.
    Member { target: Box<Expr> },
    /// `[a, , b]` — holes are `None`.
    Array { elements: Vec<Option<Pattern>> },
    /// `{key: binding, …}`.
    Object { properties: Vec<(Ident, Pattern)> },
}

impl Pattern {
    pub fn token(&self) -> Token {
        match self {
            Pattern::Identifier { ident } => ident.token,
            Pattern::Member { target } => target.token(),
            Pattern::Array { elements } => elements
                .iter()
                .flatten()
                .next()
                .map(Pattern::token)
                .unwrap_or_default(),
            Pattern::Object { properties } => properties
                .first()
                .map(|(k, _)| k.token)
                .unwrap_or_default(),
        }
    }
}

/// One clause of a `switch` statement; `condition: None` is `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub condition: Option<Expr>,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub token: Token,
}

/// Statement nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Stmt {
    VarDecl {
        kind: DeclKind,
        declarators: Vec<Declarator>,
        #[serde(default)]
        token: Token,
    },
    Function {
        function: FunctionLiteral,
    },
    Expression {
        expr: Expr,
    },
    Block {
        statements: Vec<Stmt>,
        #[serde(default)]
        token: Token,
    },
    If {
        condition: Expr,
        consequence: Box<Stmt>,
        alternative: Option<Box<Stmt>>,
        #[serde(default)]
        token: Token,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        #[serde(default)]
        token: Token,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
        #[serde(default)]
        token: Token,
    },
    For {
        initializer: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
        #[serde(default)]
        token: Token,
    },
    ForIn {
        left: ForHead,
        object: Expr,
        body: Box<Stmt>,
        #[serde(default)]
        token: Token,
    },
    ForOf {
        left: ForHead,
        iterable: Expr,
        body: Box<Stmt>,
        #[serde(default)]
        token: Token,
    },
    Break {
        label: Option<Ident>,
        #[serde(default)]
        token: Token,
    },
    Continue {
        label: Option<Ident>,
        #[serde(default)]
        token: Token,
    },
    Return {
        value: Option<Expr>,
        #[serde(default)]
        token: Token,
    },
    Labeled {
        label: Ident,
        body: Box<Stmt>,
    },
    Switch {
        scrutinee: Expr,
        cases: Vec<SwitchCase>,
        #[serde(default)]
        token: Token,
    },
    Try {
        body: Vec<Stmt>,
        catch_param: Option<Ident>,
        catch_body: Option<Vec<Stmt>>,
        finally_body: Option<Vec<Stmt>>,
        #[serde(default)]
        token: Token,
    },
    Throw {
        value: Expr,
        #[serde(default)]
        token: Token,
    },
    Empty,
}

impl Stmt {
    /// Line of the statement's leading token, for diagnostics and the line
    /// table.
    pub fn token(&self) -> Token {
        match self {
            Stmt::VarDecl { token, .. }
            | Stmt::Block { token, .. }
            | Stmt::If { token, .. }
            | Stmt::While { token, .. }
            | Stmt::DoWhile { token, .. }
            | Stmt::For { token, .. }
            | Stmt::ForIn { token, .. }
            | Stmt::ForOf { token, .. }
            | Stmt::Break { token, .. }
            | Stmt::Continue { token, .. }
            | Stmt::Return { token, .. }
            | Stmt::Switch { token, .. }
            | Stmt::Try { token, .. }
            | Stmt::Throw { token, .. } => *token,
            Stmt::Function { function } => function.token,
            Stmt::Expression { expr } => expr.token(),
            Stmt::Labeled { label, .. } => label.token,
            Stmt::Empty => Token::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    StrictEqual,
    StrictNotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnaryOp {
    Not,
    Neg,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateOp {
    Increment,
    Decrement,
}

/// Property access: `.name` or `[expr]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MemberKey {
    Prop { name: Ident },
    Index { expr: Box<Expr> },
}

/// Object-literal property key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PropKey {
    Ident { name: Ident },
    String { value: String },
}

/// Expression nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Expr {
    Number {
        value: f64,
        #[serde(default)]
        token: Token,
    },
    String {
        value: String,
        #[serde(default)]
        token: Token,
    },
    Boolean {
        value: bool,
        #[serde(default)]
        token: Token,
    },
    Null {
        #[serde(default)]
        token: Token,
    },
    Undefined {
        #[serde(default)]
        token: Token,
    },
    Identifier {
        ident: Ident,
    },
    Assign {
        target: Box<Expr>,
        op: AssignOp,
        value: Box<Expr>,
        #[serde(default)]
        token: Token,
    },
    Update {
        target: Box<Expr>,
        op: UpdateOp,
        prefix: bool,
        #[serde(default)]
        token: Token,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default)]
        token: Token,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default)]
        token: Token,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        #[serde(default)]
        token: Token,
    },
    Conditional {
        condition: Box<Expr>,
        consequence: Box<Expr>,
        alternative: Box<Expr>,
        #[serde(default)]
        token: Token,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
        #[serde(default)]
        token: Token,
    },
    Member {
        object: Box<Expr>,
        property: MemberKey,
        #[serde(default)]
        token: Token,
    },
    Array {
        elements: Vec<Expr>,
        #[serde(default)]
        token: Token,
    },
    Object {
        properties: Vec<(PropKey, Expr)>,
        #[serde(default)]
        token: Token,
    },
    Function {
        function: FunctionLiteral,
    },
}

impl Expr {
    pub fn token(&self) -> Token {
        match self {
            Expr::Number { token, .. }
            | Expr::String { token, .. }
            | Expr::Boolean { token, .. }
            | Expr::Null { token }
            | Expr::Undefined { token }
            | Expr::Assign { token, .. }
            | Expr::Update { token, .. }
            | Expr::Binary { token, .. }
            | Expr::Logical { token, .. }
            | Expr::Unary { token, .. }
            | Expr::Conditional { token, .. }
            | Expr::Call { token, .. }
            | Expr::Member { token, .. }
            | Expr::Array { token, .. }
            | Expr::Object { token, .. } => *token,
            Expr::Identifier { ident } => ident.token,
            Expr::Function { function } => function.token,
        }
    }
}

/// A full compilation unit as delivered by the front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}
