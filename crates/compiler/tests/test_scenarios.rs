//! End-to-end scenarios: compile a statement tree, execute the chunk on the
//! VM, observe the completion value.

mod common;

use common::*;
use lumen_runtime::{Value, Vm};
use lumenc::ast::{BinaryOp, DeclKind};

#[test]
fn test_for_loop_accumulates() {
    // let x = 0; for (let i = 0; i < 3; i++) x = x + i; x  =>  3
    let result = run_number(vec![
        let_decl("x", num(0.0)),
        for_stmt(
            Some(let_decl("i", num(0.0))),
            Some(less(ident("i"), num(3.0))),
            Some(post_inc(ident("i"))),
            expr_stmt(assign(ident("x"), add(ident("x"), ident("i")))),
        ),
        expr_stmt(ident("x")),
    ]);
    assert_eq!(result, 3.0);
}

#[test]
fn test_labeled_continue_skips_inner_tail() {
    // let r = 0;
    // outer: for (let i = 0; i < 3; i++)
    //   for (let j = 0; j < 3; j++) {
    //     if (j === 2) continue outer;
    //     r = r + 1;
    //   }
    // r  =>  6
    let result = run_number(vec![
        let_decl("r", num(0.0)),
        labeled(
            "outer",
            for_stmt(
                Some(let_decl("i", num(0.0))),
                Some(less(ident("i"), num(3.0))),
                Some(post_inc(ident("i"))),
                for_stmt(
                    Some(let_decl("j", num(0.0))),
                    Some(less(ident("j"), num(3.0))),
                    Some(post_inc(ident("j"))),
                    block(vec![
                        if_stmt(
                            eq(ident("j"), num(2.0)),
                            cont(Some("outer")),
                            None,
                        ),
                        expr_stmt(assign(ident("r"), add(ident("r"), num(1.0)))),
                    ]),
                ),
            ),
        ),
        expr_stmt(ident("r")),
    ]);
    assert_eq!(result, 6.0);
}

#[test]
fn test_recursive_function() {
    // function f(n) { if (n < 2) return n; return f(n-1) + f(n-2); } f(8) => 21
    let result = run_number(vec![
        func_decl(
            "f",
            vec!["n"],
            vec![
                if_stmt(less(ident("n"), num(2.0)), ret(Some(ident("n"))), None),
                ret(Some(add(
                    call(ident("f"), vec![binary(BinaryOp::Sub, ident("n"), num(1.0))]),
                    call(ident("f"), vec![binary(BinaryOp::Sub, ident("n"), num(2.0))]),
                ))),
            ],
        ),
        expr_stmt(call(ident("f"), vec![num(8.0)])),
    ]);
    assert_eq!(result, 21.0);
}

#[test]
fn test_assignment_value_may_read_its_own_target() {
    // function f() { var a = 1; var b = 2; a = b + a; return a; } f() => 3
    // The right-hand side reads the target after another operand loaded, so
    // the value must not be computed in the target register.
    let result = run_number(vec![
        func_decl(
            "f",
            vec![],
            vec![
                var_decl("a", num(1.0)),
                var_decl("b", num(2.0)),
                expr_stmt(assign(ident("a"), add(ident("b"), ident("a")))),
                ret(Some(ident("a"))),
            ],
        ),
        expr_stmt(call(ident("f"), vec![])),
    ]);
    assert_eq!(result, 3.0);
}

#[test]
fn test_do_while_runs_body_first() {
    // let v = 0; do { v++; } while (v < 3); v  =>  3
    let result = run_number(vec![
        let_decl("v", num(0.0)),
        do_while(
            block(vec![expr_stmt(post_inc(ident("v")))]),
            less(ident("v"), num(3.0)),
        ),
        expr_stmt(ident("v")),
    ]);
    assert_eq!(result, 3.0);
}

#[test]
fn test_continue_in_while_rechecks_condition() {
    // let i = 0; let c = 0;
    // while (i < 5) { i++; if (i < 3) continue; c++; }
    // c  =>  3 (counts i = 3, 4, 5)
    let result = run_number(vec![
        let_decl("i", num(0.0)),
        let_decl("c", num(0.0)),
        while_stmt(
            less(ident("i"), num(5.0)),
            block(vec![
                expr_stmt(post_inc(ident("i"))),
                if_stmt(less(ident("i"), num(3.0)), cont(None), None),
                expr_stmt(post_inc(ident("c"))),
            ]),
        ),
        expr_stmt(ident("c")),
    ]);
    assert_eq!(result, 3.0);
}

#[test]
fn test_continue_in_do_while_reaches_condition() {
    // let n = 0; let hits = 0;
    // do { n++; if (n < 3) continue; hits++; } while (n < 5);
    // hits  =>  3 (the trailing condition still runs after continue)
    let result = run_number(vec![
        let_decl("n", num(0.0)),
        let_decl("hits", num(0.0)),
        do_while(
            block(vec![
                expr_stmt(post_inc(ident("n"))),
                if_stmt(less(ident("n"), num(3.0)), cont(None), None),
                expr_stmt(post_inc(ident("hits"))),
            ]),
            less(ident("n"), num(5.0)),
        ),
        expr_stmt(ident("hits")),
    ]);
    assert_eq!(result, 3.0);
}

#[test]
fn test_for_of_string_uses_iterator_protocol() {
    // let s = ""; for (let c of "ab") s += c; s  =>  "ab"
    let result = run_string(vec![
        let_decl("s", string("")),
        for_of(
            DeclKind::Let,
            "c",
            string("ab"),
            expr_stmt(add_assign(ident("s"), ident("c"))),
        ),
        expr_stmt(ident("s")),
    ]);
    assert_eq!(result, "ab");
}

#[test]
fn test_for_in_walks_keys_in_insertion_order() {
    // let k = ""; for (var key in {a:1, b:2}) k += key; k  =>  "ab"
    let result = run_string(vec![
        let_decl("k", string("")),
        for_in(
            DeclKind::Var,
            "key",
            object(vec![("a", num(1.0)), ("b", num(2.0))]),
            expr_stmt(add_assign(ident("k"), ident("key"))),
        ),
        expr_stmt(ident("k")),
    ]);
    assert_eq!(result, "ab");
}

#[test]
fn test_for_in_over_array_indexes_elements() {
    // let t = 0; let arr = [10, 20, 30];
    // for (var i in arr) t += arr[i];
    // t  =>  60 (the key list holds string indices; arr[i] still reads)
    let result = run_number(vec![
        let_decl("t", num(0.0)),
        let_decl("arr", array(vec![num(10.0), num(20.0), num(30.0)])),
        for_in(
            DeclKind::Var,
            "i",
            ident("arr"),
            expr_stmt(add_assign(ident("t"), index(ident("arr"), ident("i")))),
        ),
        expr_stmt(ident("t")),
    ]);
    assert_eq!(result, 60.0);
}

#[test]
fn test_for_of_array_fast_path() {
    // let t = 0; for (let x of [1,2,3]) t += x; t  =>  6
    let result = run_number(vec![
        let_decl("t", num(0.0)),
        for_of(
            DeclKind::Let,
            "x",
            array(vec![num(1.0), num(2.0), num(3.0)]),
            expr_stmt(add_assign(ident("t"), ident("x"))),
        ),
        expr_stmt(ident("t")),
    ]);
    assert_eq!(result, 6.0);
}

#[test]
fn test_loop_completion_value_is_last_body_value() {
    // let i = 0; while (i < 3) { i++; "v"; }  =>  "v"
    let result = run_string(vec![
        let_decl("i", num(0.0)),
        while_stmt(
            less(ident("i"), num(3.0)),
            block(vec![expr_stmt(post_inc(ident("i"))), expr_stmt(string("v"))]),
        ),
    ]);
    assert_eq!(result, "v");
}

#[test]
fn test_skipped_loop_completion_is_undefined() {
    // 5; while (false) {}  =>  undefined (the loop resets its completion)
    let result = run_program(vec![
        expr_stmt(num(5.0)),
        while_stmt(boolean(false), block(vec![])),
    ]);
    assert!(matches!(result, Value::Undefined));
}

#[test]
fn test_switch_falls_through_without_break() {
    // let r = ""; switch (1) { case 0: r+="a"; case 1: r+="b";
    //   case 2: r+="c"; default: r+="d"; } r  =>  "bcd" ... "d" included
    let result = run_string(vec![
        let_decl("r", string("")),
        switch(
            num(1.0),
            vec![
                case(Some(num(0.0)), vec![expr_stmt(add_assign(ident("r"), string("a")))]),
                case(Some(num(1.0)), vec![expr_stmt(add_assign(ident("r"), string("b")))]),
                case(Some(num(2.0)), vec![expr_stmt(add_assign(ident("r"), string("c")))]),
                case(None, vec![expr_stmt(add_assign(ident("r"), string("d")))]),
            ],
        ),
        expr_stmt(ident("r")),
    ]);
    assert_eq!(result, "bcd");
}

#[test]
fn test_switch_without_match_runs_default_only() {
    let result = run_string(vec![
        let_decl("r", string("")),
        switch(
            num(9.0),
            vec![
                case(Some(num(0.0)), vec![expr_stmt(add_assign(ident("r"), string("a")))]),
                case(None, vec![expr_stmt(add_assign(ident("r"), string("d")))]),
                case(Some(num(1.0)), vec![expr_stmt(add_assign(ident("r"), string("b")))]),
            ],
        ),
        expr_stmt(ident("r")),
    ]);
    // Default body falls through into the case after it.
    assert_eq!(result, "db");
}

#[test]
fn test_switch_break_stops_fall_through() {
    let result = run_string(vec![
        let_decl("r", string("")),
        switch(
            num(0.0),
            vec![
                case(
                    Some(num(0.0)),
                    vec![expr_stmt(add_assign(ident("r"), string("a"))), brk(None)],
                ),
                case(Some(num(1.0)), vec![expr_stmt(add_assign(ident("r"), string("b")))]),
            ],
        ),
        expr_stmt(ident("r")),
    ]);
    assert_eq!(result, "a");
}

#[test]
fn test_closure_counter_shares_captured_cell() {
    // function counter() { let n = 0; let inc = function() { n = n + 1;
    //   return n; }; return inc; }
    // let c = counter(); c(); c(); c()  =>  3
    let result = run_number(vec![
        func_decl(
            "counter",
            vec![],
            vec![
                let_decl("n", num(0.0)),
                let_decl(
                    "inc",
                    func_expr(
                        vec![],
                        vec![
                            expr_stmt(assign(ident("n"), add(ident("n"), num(1.0)))),
                            ret(Some(ident("n"))),
                        ],
                    ),
                ),
                ret(Some(ident("inc"))),
            ],
        ),
        let_decl("c", call(ident("counter"), vec![])),
        expr_stmt(call(ident("c"), vec![])),
        expr_stmt(call(ident("c"), vec![])),
        expr_stmt(call(ident("c"), vec![])),
    ]);
    assert_eq!(result, 3.0);
}

#[test]
fn test_throw_lands_in_catch_binding() {
    // let r = ""; try { throw "e"; r = "no"; } catch (e) { r = e; } r => "e"
    let result = run_string(vec![
        let_decl("r", string("")),
        try_stmt(
            vec![
                throw(string("e")),
                expr_stmt(assign(ident("r"), string("no"))),
            ],
            Some("e"),
            Some(vec![expr_stmt(assign(ident("r"), ident("e")))]),
            None,
        ),
        expr_stmt(ident("r")),
    ]);
    assert_eq!(result, "e");
}

#[test]
fn test_break_routes_through_finally() {
    // let r = "";
    // for (let i = 0; i < 3; i++) {
    //   try { if (i === 1) break; r += "x"; } finally { r += "f"; }
    // }
    // r  =>  "xff"
    let result = run_string(vec![
        let_decl("r", string("")),
        for_stmt(
            Some(let_decl("i", num(0.0))),
            Some(less(ident("i"), num(3.0))),
            Some(post_inc(ident("i"))),
            block(vec![try_stmt(
                vec![
                    if_stmt(eq(ident("i"), num(1.0)), brk(None), None),
                    expr_stmt(add_assign(ident("r"), string("x"))),
                ],
                None,
                None,
                Some(vec![expr_stmt(add_assign(ident("r"), string("f")))]),
            )]),
        ),
        expr_stmt(ident("r")),
    ]);
    assert_eq!(result, "xff");
}

#[test]
fn test_continue_routes_through_finally() {
    // let r = "";
    // for (let i = 0; i < 3; i++) {
    //   try { if (i === 1) continue; r += i; } finally { r += "f"; }
    // }
    // r  =>  "0ff2f"
    let result = run_string(vec![
        let_decl("r", string("")),
        for_stmt(
            Some(let_decl("i", num(0.0))),
            Some(less(ident("i"), num(3.0))),
            Some(post_inc(ident("i"))),
            block(vec![try_stmt(
                vec![
                    if_stmt(eq(ident("i"), num(1.0)), cont(None), None),
                    expr_stmt(add_assign(ident("r"), ident("i"))),
                ],
                None,
                None,
                Some(vec![expr_stmt(add_assign(ident("r"), string("f")))]),
            )]),
        ),
        expr_stmt(ident("r")),
    ]);
    assert_eq!(result, "0ff2f");
}

#[test]
fn test_break_chains_through_nested_finallys() {
    // let r = "";
    // while (true) {
    //   try { try { break; } finally { r += "a"; } } finally { r += "b"; }
    // }
    // r  =>  "ab" (both finally bodies run, innermost first)
    let result = run_string(vec![
        let_decl("r", string("")),
        while_stmt(
            boolean(true),
            block(vec![try_stmt(
                vec![try_stmt(
                    vec![brk(None)],
                    None,
                    None,
                    Some(vec![expr_stmt(add_assign(ident("r"), string("a")))]),
                )],
                None,
                None,
                Some(vec![expr_stmt(add_assign(ident("r"), string("b")))]),
            )]),
        ),
        expr_stmt(ident("r")),
    ]);
    assert_eq!(result, "ab");
}

#[test]
fn test_no_stale_handler_after_break_across_nested_finallys() {
    // Same shape as above, with a throw after the loop. The break must
    // consume every finally guard on its way out, so the throw surfaces
    // uncaught instead of re-entering an already-exited finally body.
    let chunk = compile_chunk(vec![
        let_decl("r", string("")),
        while_stmt(
            boolean(true),
            block(vec![try_stmt(
                vec![try_stmt(
                    vec![brk(None)],
                    None,
                    None,
                    Some(vec![expr_stmt(add_assign(ident("r"), string("a")))]),
                )],
                None,
                None,
                Some(vec![expr_stmt(add_assign(ident("r"), string("b")))]),
            )]),
        ),
        throw(string("boom")),
    ]);
    let mut vm = Vm::new();
    let err = vm.run(&chunk).expect_err("throw after the loop is uncaught");
    assert!(err.message.contains("boom"), "{}", err.message);
    match vm.global(&chunk, "r") {
        Some(Value::String(s)) => assert_eq!(&*s, "ab"),
        other => panic!("finally bodies did not both run: {:?}", other),
    }
}

#[test]
fn test_return_routes_through_finally() {
    // function f() { try { return "a"; } finally { log += "f"; } }
    // let log = ""; f() + log  =>  "af"
    let result = run_string(vec![
        let_decl("log", string("")),
        func_decl(
            "f",
            vec![],
            vec![try_stmt(
                vec![ret(Some(string("a")))],
                None,
                None,
                Some(vec![expr_stmt(add_assign(ident("log"), string("f")))]),
            )],
        ),
        let_decl("got", call(ident("f"), vec![])),
        expr_stmt(add(ident("got"), ident("log"))),
    ]);
    assert_eq!(result, "af");
}

#[test]
fn test_finally_runs_on_thrown_exception() {
    // let r = ""; try { try { throw "x"; } finally { r += "f"; } }
    // catch (e) { r += e; } r  =>  "fx"
    let result = run_string(vec![
        let_decl("r", string("")),
        try_stmt(
            vec![try_stmt(
                vec![throw(string("x"))],
                None,
                None,
                Some(vec![expr_stmt(add_assign(ident("r"), string("f")))]),
            )],
            Some("e"),
            Some(vec![expr_stmt(add_assign(ident("r"), ident("e")))]),
            None,
        ),
        expr_stmt(ident("r")),
    ]);
    assert_eq!(result, "fx");
}

#[test]
fn test_break_from_protocol_loop_invokes_iterator_return() {
    // A user iterable whose return() records its invocation; break after
    // the first element must run it.
    //
    // let log = "";
    // let obj = {};
    // obj[Symbol.iterator] = function () {
    //   let i = 0;
    //   return {
    //     next: function () { i = i + 1;
    //       return i < 3 ? {done: false, value: i} : {done: true}; },
    //     return: function () { log += "R"; return {done: true}; }
    //   };
    // };
    // for (let v of obj) { log += v; break; }
    // log  =>  "1R"
    let iterator_obj = object(vec![
        (
            "next",
            func_expr(
                vec![],
                vec![
                    expr_stmt(assign(ident("i"), add(ident("i"), num(1.0)))),
                    ret(Some(conditional(
                        less(ident("i"), num(3.0)),
                        object(vec![("done", boolean(false)), ("value", ident("i"))]),
                        object(vec![("done", boolean(true))]),
                    ))),
                ],
            ),
        ),
        (
            "return",
            func_expr(
                vec![],
                vec![
                    expr_stmt(add_assign(ident("log"), string("R"))),
                    ret(Some(object(vec![("done", boolean(true))]))),
                ],
            ),
        ),
    ]);
    let result = run_string(vec![
        let_decl("log", string("")),
        let_decl("obj", object(vec![])),
        expr_stmt(assign(
            index(ident("obj"), member(ident("Symbol"), "iterator")),
            func_expr(
                vec![],
                vec![let_decl("i", num(0.0)), ret(Some(iterator_obj))],
            ),
        )),
        for_of(
            lumenc::ast::DeclKind::Let,
            "v",
            ident("obj"),
            block(vec![
                expr_stmt(add_assign(ident("log"), ident("v"))),
                brk(None),
            ]),
        ),
        expr_stmt(ident("log")),
    ]);
    assert_eq!(result, "1R");
}

#[test]
fn test_break_resets_completion_value() {
    // "seed"; while (true) { "body"; break; }
    // break writes undefined into the loop completion register.
    let result = run_program(vec![
        expr_stmt(string("seed")),
        while_stmt(
            boolean(true),
            block(vec![expr_stmt(string("body")), brk(None)]),
        ),
    ]);
    assert!(matches!(result, Value::Undefined));
}

#[test]
fn test_labeled_block_break() {
    // let r = ""; blk: { r += "a"; break blk; r += "b"; } r  =>  "a"
    let result = run_string(vec![
        let_decl("r", string("")),
        labeled(
            "blk",
            block(vec![
                expr_stmt(add_assign(ident("r"), string("a"))),
                brk(Some("blk")),
                expr_stmt(add_assign(ident("r"), string("b"))),
            ]),
        ),
        expr_stmt(ident("r")),
    ]);
    assert_eq!(result, "a");
}

#[test]
fn test_unlabeled_break_skips_labeled_block() {
    // let r = ""; let i = 0;
    // while (i < 2) { i++; blk: { r += "a"; break; } r += "b"; }
    // The bare break exits the while, not the labeled block.
    let result = run_string(vec![
        let_decl("r", string("")),
        let_decl("i", num(0.0)),
        while_stmt(
            less(ident("i"), num(2.0)),
            block(vec![
                expr_stmt(post_inc(ident("i"))),
                labeled(
                    "blk",
                    block(vec![
                        expr_stmt(add_assign(ident("r"), string("a"))),
                        brk(None),
                    ]),
                ),
                expr_stmt(add_assign(ident("r"), string("b"))),
            ]),
        ),
        expr_stmt(ident("r")),
    ]);
    assert_eq!(result, "a");
}

#[test]
fn test_tail_recursive_countdown_does_not_overflow() {
    // function down(n) { if (n === 0) return "done"; return down(n - 1); }
    // A depth far beyond the frame cap only works if tail calls reuse the
    // activation.
    let result = run_string(vec![
        func_decl(
            "down",
            vec!["n"],
            vec![
                if_stmt(eq(ident("n"), num(0.0)), ret(Some(string("done"))), None),
                ret(Some(call(
                    ident("down"),
                    vec![binary(BinaryOp::Sub, ident("n"), num(1.0))],
                ))),
            ],
        ),
        expr_stmt(call(ident("down"), vec![num(5000.0)])),
    ]);
    assert_eq!(result, "done");
}
