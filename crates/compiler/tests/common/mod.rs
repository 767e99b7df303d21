//! Shared helpers for the integration tests: terse AST constructors and
//! compile/run drivers. The front end is external to this crate, so tests
//! build trees directly.

#![allow(dead_code)]

use lumen_core::Chunk;
use lumen_runtime::{Value, Vm};
use lumenc::ast::*;
use lumenc::{CompilerConfig, Diagnostic, DiagnosticSink, compile};

pub fn t() -> Token {
    Token::new(1)
}

pub fn id(name: &str) -> Ident {
    Ident::new(name, 1)
}

pub fn num(value: f64) -> Expr {
    Expr::Number { value, token: t() }
}

pub fn string(value: &str) -> Expr {
    Expr::String {
        value: value.to_string(),
        token: t(),
    }
}

pub fn boolean(value: bool) -> Expr {
    Expr::Boolean { value, token: t() }
}

pub fn undefined() -> Expr {
    Expr::Undefined { token: t() }
}

pub fn ident(name: &str) -> Expr {
    Expr::Identifier { ident: id(name) }
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        token: t(),
    }
}

pub fn less(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Less, left, right)
}

pub fn add(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Add, left, right)
}

pub fn eq(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::StrictEqual, left, right)
}

pub fn assign(target: Expr, value: Expr) -> Expr {
    Expr::Assign {
        target: Box::new(target),
        op: AssignOp::Assign,
        value: Box::new(value),
        token: t(),
    }
}

pub fn add_assign(target: Expr, value: Expr) -> Expr {
    Expr::Assign {
        target: Box::new(target),
        op: AssignOp::AddAssign,
        value: Box::new(value),
        token: t(),
    }
}

pub fn post_inc(target: Expr) -> Expr {
    Expr::Update {
        target: Box::new(target),
        op: UpdateOp::Increment,
        prefix: false,
        token: t(),
    }
}

pub fn call(callee: Expr, arguments: Vec<Expr>) -> Expr {
    Expr::Call {
        callee: Box::new(callee),
        arguments,
        token: t(),
    }
}

pub fn member(object: Expr, name: &str) -> Expr {
    Expr::Member {
        object: Box::new(object),
        property: MemberKey::Prop { name: id(name) },
        token: t(),
    }
}

pub fn index(object: Expr, key: Expr) -> Expr {
    Expr::Member {
        object: Box::new(object),
        property: MemberKey::Index {
            expr: Box::new(key),
        },
        token: t(),
    }
}

pub fn array(elements: Vec<Expr>) -> Expr {
    Expr::Array {
        elements,
        token: t(),
    }
}

pub fn object(properties: Vec<(&str, Expr)>) -> Expr {
    Expr::Object {
        properties: properties
            .into_iter()
            .map(|(k, v)| (PropKey::Ident { name: id(k) }, v))
            .collect(),
        token: t(),
    }
}

pub fn function(name: Option<&str>, parameters: Vec<&str>, body: Vec<Stmt>) -> FunctionLiteral {
    FunctionLiteral {
        name: name.map(id),
        parameters: parameters.into_iter().map(id).collect(),
        body,
        token: t(),
    }
}

pub fn func_expr(parameters: Vec<&str>, body: Vec<Stmt>) -> Expr {
    Expr::Function {
        function: function(None, parameters, body),
    }
}

pub fn conditional(condition: Expr, consequence: Expr, alternative: Expr) -> Expr {
    Expr::Conditional {
        condition: Box::new(condition),
        consequence: Box::new(consequence),
        alternative: Box::new(alternative),
        token: t(),
    }
}

// ---------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------

pub fn decl(kind: DeclKind, name: &str, value: Option<Expr>) -> Stmt {
    Stmt::VarDecl {
        kind,
        declarators: vec![Declarator {
            name: id(name),
            value,
        }],
        token: t(),
    }
}

pub fn let_decl(name: &str, value: Expr) -> Stmt {
    decl(DeclKind::Let, name, Some(value))
}

pub fn var_decl(name: &str, value: Expr) -> Stmt {
    decl(DeclKind::Var, name, Some(value))
}

pub fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expression { expr }
}

pub fn block(statements: Vec<Stmt>) -> Stmt {
    Stmt::Block {
        statements,
        token: t(),
    }
}

pub fn if_stmt(condition: Expr, consequence: Stmt, alternative: Option<Stmt>) -> Stmt {
    Stmt::If {
        condition,
        consequence: Box::new(consequence),
        alternative: alternative.map(Box::new),
        token: t(),
    }
}

pub fn while_stmt(condition: Expr, body: Stmt) -> Stmt {
    Stmt::While {
        condition,
        body: Box::new(body),
        token: t(),
    }
}

pub fn do_while(body: Stmt, condition: Expr) -> Stmt {
    Stmt::DoWhile {
        body: Box::new(body),
        condition,
        token: t(),
    }
}

pub fn for_stmt(
    initializer: Option<Stmt>,
    condition: Option<Expr>,
    update: Option<Expr>,
    body: Stmt,
) -> Stmt {
    Stmt::For {
        initializer: initializer.map(Box::new),
        condition,
        update,
        body: Box::new(body),
        token: t(),
    }
}

pub fn for_in(kind: DeclKind, name: &str, object: Expr, body: Stmt) -> Stmt {
    Stmt::ForIn {
        left: ForHead::Decl {
            kind,
            pattern: Pattern::Identifier { ident: id(name) },
        },
        object,
        body: Box::new(body),
        token: t(),
    }
}

pub fn for_of(kind: DeclKind, name: &str, iterable: Expr, body: Stmt) -> Stmt {
    Stmt::ForOf {
        left: ForHead::Decl {
            kind,
            pattern: Pattern::Identifier { ident: id(name) },
        },
        iterable,
        body: Box::new(body),
        token: t(),
    }
}

pub fn brk(label: Option<&str>) -> Stmt {
    Stmt::Break {
        label: label.map(id),
        token: t(),
    }
}

pub fn cont(label: Option<&str>) -> Stmt {
    Stmt::Continue {
        label: label.map(id),
        token: t(),
    }
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return { value, token: t() }
}

pub fn labeled(label: &str, body: Stmt) -> Stmt {
    Stmt::Labeled {
        label: id(label),
        body: Box::new(body),
    }
}

pub fn case(condition: Option<Expr>, body: Vec<Stmt>) -> SwitchCase {
    SwitchCase {
        condition,
        body,
        token: t(),
    }
}

pub fn switch(scrutinee: Expr, cases: Vec<SwitchCase>) -> Stmt {
    Stmt::Switch {
        scrutinee,
        cases,
        token: t(),
    }
}

pub fn func_decl(name: &str, parameters: Vec<&str>, body: Vec<Stmt>) -> Stmt {
    Stmt::Function {
        function: function(Some(name), parameters, body),
    }
}

pub fn try_stmt(
    body: Vec<Stmt>,
    catch_param: Option<&str>,
    catch_body: Option<Vec<Stmt>>,
    finally_body: Option<Vec<Stmt>>,
) -> Stmt {
    Stmt::Try {
        body,
        catch_param: catch_param.map(id),
        catch_body,
        finally_body,
        token: t(),
    }
}

pub fn throw(value: Expr) -> Stmt {
    Stmt::Throw { value, token: t() }
}

// ---------------------------------------------------------------------
// Drivers
// ---------------------------------------------------------------------

pub fn compile_chunk(statements: Vec<Stmt>) -> Chunk {
    let program = Program { statements };
    let mut sink = DiagnosticSink::new();
    let chunk = compile(&program, &CompilerConfig::default(), &mut sink);
    match chunk {
        Some(chunk) => chunk,
        None => panic!("compilation failed: {:?}", sink.diagnostics()),
    }
}

pub fn compile_diagnostics(statements: Vec<Stmt>) -> Vec<Diagnostic> {
    compile_diagnostics_with(statements, CompilerConfig::default())
}

pub fn compile_diagnostics_with(
    statements: Vec<Stmt>,
    config: CompilerConfig,
) -> Vec<Diagnostic> {
    let program = Program { statements };
    let mut sink = DiagnosticSink::new();
    let chunk = compile(&program, &config, &mut sink);
    assert!(chunk.is_none(), "expected compilation to be withheld");
    sink.into_diagnostics()
}

pub fn run_program(statements: Vec<Stmt>) -> Value {
    let chunk = compile_chunk(statements);
    Vm::new().run(&chunk).expect("runtime error")
}

pub fn run_number(statements: Vec<Stmt>) -> f64 {
    match run_program(statements) {
        Value::Number(n) => n,
        other => panic!("expected number, got {:?}", other),
    }
}

pub fn run_string(statements: Vec<Stmt>) -> String {
    match run_program(statements) {
        Value::String(s) => s.to_string(),
        other => panic!("expected string, got {:?}", other),
    }
}
