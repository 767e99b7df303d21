//! Structural properties of emitted chunks: branch integrity, determinism,
//! constant deduplication, switch phase layout, and the jump-window
//! boundary.

mod common;

use common::*;
use lumen_core::{Chunk, OpCode, Value as Constant};
use lumenc::ast::{BinaryOp, Program, Stmt};
use lumenc::{CompilerConfig, DiagnosticSink, compile};

/// Decode-walk a chunk (and its function table, recursively), asserting
/// every branch displacement lands inside the code.
fn assert_branches_resolve(chunk: &Chunk, context: &str) {
    let mut pos = 0;
    while pos < chunk.code.len() {
        let op = OpCode::from_byte(chunk.code[pos])
            .unwrap_or_else(|| panic!("{}: invalid opcode at {}", context, pos));
        let len = chunk
            .instruction_len_at(pos)
            .unwrap_or_else(|| panic!("{}: undecodable instruction at {}", context, pos));
        if op.is_branch() {
            let disp = chunk.read_i16(pos + len - 2) as i64;
            let target = pos as i64 + len as i64 + disp;
            assert!(
                target >= 0 && target < chunk.code.len() as i64,
                "{}: {} at {} targets {} outside [0, {})",
                context,
                op.mnemonic(),
                pos,
                target,
                chunk.code.len()
            );
        }
        pos += len;
    }
    for (i, f) in chunk.functions.iter().enumerate() {
        assert_branches_resolve(&f.chunk, &format!("{}::fn[{}]", context, i));
    }
}

fn loop_heavy_program() -> Vec<Stmt> {
    vec![
        let_decl("x", num(0.0)),
        labeled(
            "outer",
            for_stmt(
                Some(let_decl("i", num(0.0))),
                Some(less(ident("i"), num(4.0))),
                Some(post_inc(ident("i"))),
                block(vec![
                    switch(
                        ident("i"),
                        vec![
                            case(Some(num(0.0)), vec![cont(Some("outer"))]),
                            case(Some(num(1.0)), vec![brk(None)]),
                            case(None, vec![expr_stmt(post_inc(ident("x")))]),
                        ],
                    ),
                    while_stmt(
                        less(ident("x"), num(2.0)),
                        expr_stmt(post_inc(ident("x"))),
                    ),
                ]),
            ),
        ),
        func_decl(
            "f",
            vec!["n"],
            vec![
                do_while(
                    expr_stmt(post_inc(ident("n"))),
                    less(ident("n"), num(3.0)),
                ),
                ret(Some(ident("n"))),
            ],
        ),
        expr_stmt(call(ident("f"), vec![ident("x")])),
    ]
}

#[test]
fn test_no_dangling_jumps_across_statement_forms() {
    let chunk = compile_chunk(loop_heavy_program());
    assert_branches_resolve(&chunk, "<script>");
}

#[test]
fn test_recompilation_yields_identical_chunks() {
    let a = compile_chunk(loop_heavy_program());
    let b = compile_chunk(loop_heavy_program());
    assert_eq!(a, b);
}

#[test]
fn test_constants_deduplicate_by_value() {
    let chunk = compile_chunk(vec![
        expr_stmt(add(num(1.0), num(1.0))),
        expr_stmt(add(string("a"), string("a"))),
        expr_stmt(num(1.0)),
    ]);
    let ones = chunk
        .constants
        .iter()
        .filter(|c| **c == Constant::Number(1.0))
        .count();
    let strs = chunk
        .constants
        .iter()
        .filter(|c| **c == Constant::String("a".into()))
        .count();
    assert_eq!(ones, 1);
    assert_eq!(strs, 1);
}

#[test]
fn test_switch_emits_comparisons_before_bodies() {
    let chunk = compile_chunk(vec![
        let_decl("r", num(0.0)),
        switch(
            num(0.0),
            vec![
                case(
                    Some(num(1.0)),
                    vec![expr_stmt(assign(ident("r"), string("x")))],
                ),
                case(
                    Some(num(2.0)),
                    vec![expr_stmt(assign(ident("r"), string("y")))],
                ),
            ],
        ),
    ]);

    // Walk the instruction stream recording comparison positions and the
    // body-only string loads.
    let mut last_compare = 0usize;
    let mut first_body = usize::MAX;
    let mut pos = 0;
    while pos < chunk.code.len() {
        let op = OpCode::from_byte(chunk.code[pos]).expect("valid opcode");
        let len = chunk.instruction_len_at(pos).expect("decodable");
        match op {
            OpCode::StrictEqual => last_compare = pos,
            OpCode::LoadConst => {
                let idx = chunk.read_u16(pos + 2) as usize;
                if matches!(&chunk.constants[idx], Constant::String(s) if s == "x" || s == "y") {
                    first_body = first_body.min(pos);
                }
            }
            _ => {}
        }
        pos += len;
    }
    assert!(
        last_compare < first_body,
        "case body at {} precedes a comparison at {}",
        first_body,
        last_compare
    );
}

#[test]
fn test_function_frame_size_stays_small() {
    let chunk = compile_chunk(vec![func_decl(
        "addmul",
        vec!["a", "b"],
        vec![ret(Some(add(
            binary(BinaryOp::Mul, ident("a"), ident("b")),
            ident("a"),
        )))],
    )]);
    let proto = &chunk.functions[0];
    assert_eq!(proto.arity, 2);
    assert!(
        proto.register_count <= 8,
        "frame ballooned to {} registers",
        proto.register_count
    );
}

fn repeated_body(n: usize) -> Vec<Stmt> {
    // fn f() { var x = 0; while (x < 1) { x = x + 1; ... n times } return x }
    let mut body: Vec<Stmt> = Vec::with_capacity(n);
    for _ in 0..n {
        body.push(expr_stmt(assign(ident("x"), add(ident("x"), num(1.0)))));
    }
    vec![
        func_decl(
            "f",
            vec![],
            vec![
                var_decl("x", num(0.0)),
                while_stmt(less(ident("x"), num(1.0)), block(body)),
                ret(Some(ident("x"))),
            ],
        ),
        expr_stmt(call(ident("f"), vec![])),
    ]
}

#[test]
fn test_loop_body_inside_jump_window_compiles() {
    let chunk = compile_chunk(repeated_body(2000));
    assert_branches_resolve(&chunk, "<script>");
}

#[test]
fn test_loop_body_past_jump_window_is_fatal() {
    let program = Program {
        statements: repeated_body(4000),
    };
    let mut sink = DiagnosticSink::new();
    let chunk = compile(&program, &CompilerConfig::default(), &mut sink);
    assert!(chunk.is_none());
    assert!(sink.has_errors());
    let message = &sink.diagnostics()[0].message;
    assert!(
        message.contains("displacement"),
        "unexpected message: {}",
        message
    );
}

#[test]
fn test_global_name_table_is_insertion_ordered() {
    let chunk = compile_chunk(vec![
        let_decl("b", num(1.0)),
        let_decl("a", num(2.0)),
        expr_stmt(assign(ident("b"), ident("a"))),
    ]);
    assert_eq!(chunk.globals, vec!["b".to_string(), "a".to_string()]);
}

#[test]
fn test_strict_flag_is_stamped_on_the_chunk() {
    let program = Program {
        statements: vec![let_decl("x", num(1.0))],
    };
    let mut sink = DiagnosticSink::new();
    let config = CompilerConfig::default().strict(true);
    let chunk = compile(&program, &config, &mut sink).expect("compiles");
    assert!(chunk.strict);
}
