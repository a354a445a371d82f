use std::rc::Rc;

use perl_vm::prelude::*;

fn var(name: &str) -> Expr {
    Expr::Var(name.into())
}

fn int(v: i64) -> Expr {
    Expr::Int(v)
}

fn add_assign(name: &str, v: i64) -> Stmt {
    Stmt::Expr(Expr::CompoundAssign(name.into(), BinOp::Add, Box::new(int(v))))
}

fn compile(unit: CompileUnit) -> Rc<Program> {
    Rc::new(compiler::compile(&unit).expect("compiles"))
}

#[test]
fn tail_call_depth_one_million() {
    // sub f { my ($n, $acc) = @_; return $acc if $n == 0; goto &f; }
    let f = SubDef {
        name: "f".into(),
        params: vec!["n".into(), "acc".into()],
        body: vec![
            Stmt::If {
                cond: Expr::Binary(BinOp::NumEq, Box::new(var("n")), Box::new(int(0))),
                then_branch: vec![Stmt::Return(Some(var("acc")))],
                else_branch: vec![],
            },
            Stmt::TailCall {
                name: "f".into(),
                args: vec![
                    Expr::Binary(BinOp::Sub, Box::new(var("n")), Box::new(int(1))),
                    var("acc"),
                ],
            },
        ],
    };

    let program = compile(CompileUnit { subs: vec![f] });
    let result = Interpreter::new(program)
        .run("f", &[Scalar::Int(1_000_000), Scalar::Int(0)])
        .unwrap();

    assert_eq!(result, Scalar::Int(0));
}

#[test]
fn cross_frame_last_with_label() {
    // sub inner { last OUTER; }
    // sub middle { inner(); }
    // sub outer {
    //     my $x = 0;
    //     OUTER: for (my $i = 0; $i < 10; $i += 1) {
    //         $x += 1;
    //         middle();
    //         $x += 10;
    //     }
    //     return $x;
    // }
    let inner = SubDef {
        name: "inner".into(),
        params: vec![],
        body: vec![Stmt::Last(Some("OUTER".into()))],
    };
    let middle = SubDef {
        name: "middle".into(),
        params: vec![],
        body: vec![Stmt::Expr(Expr::Call("inner".into(), vec![]))],
    };
    let outer = SubDef {
        name: "outer".into(),
        params: vec![],
        body: vec![
            Stmt::My("x".into(), Some(int(0))),
            Stmt::For {
                label: Some("OUTER".into()),
                init: Some(Box::new(Stmt::My("i".into(), Some(int(0))))),
                cond: Some(Expr::Binary(
                    BinOp::NumLt,
                    Box::new(var("i")),
                    Box::new(int(10)),
                )),
                step: Some(Box::new(add_assign("i", 1))),
                body: vec![
                    add_assign("x", 1),
                    Stmt::Expr(Expr::Call("middle".into(), vec![])),
                    add_assign("x", 10),
                ],
            },
            Stmt::Return(Some(var("x"))),
        ],
    };

    let program = compile(CompileUnit {
        subs: vec![inner, middle, outer],
    });
    let result = Interpreter::new(program).run("outer", &[]).unwrap();

    // One `$x += 1`, then inner unwound straight past the loop.
    assert_eq!(result, Scalar::Int(1));
}

#[test]
fn cross_frame_next_resumes_at_increment() {
    let skipper = SubDef {
        name: "skipper".into(),
        params: vec![],
        body: vec![Stmt::Next(None)],
    };
    let main = SubDef {
        name: "main".into(),
        params: vec![],
        body: vec![
            Stmt::My("count".into(), Some(int(0))),
            Stmt::For {
                label: None,
                init: Some(Box::new(Stmt::My("i".into(), Some(int(0))))),
                cond: Some(Expr::Binary(
                    BinOp::NumLt,
                    Box::new(var("i")),
                    Box::new(int(3)),
                )),
                step: Some(Box::new(add_assign("i", 1))),
                body: vec![
                    add_assign("count", 1),
                    Stmt::Expr(Expr::Call("skipper".into(), vec![])),
                    add_assign("count", 10),
                ],
            },
            Stmt::Return(Some(var("count"))),
        ],
    };

    let program = compile(CompileUnit {
        subs: vec![skipper, main],
    });
    let result = Interpreter::new(program).run("main", &[]).unwrap();

    // The `+= 10` after the call never runs; the increment step still does.
    assert_eq!(result, Scalar::Int(3));
}

#[test]
fn unmatched_marker_propagates_through_intermediate_frames() {
    // No loop anywhere: the marker escapes the outermost frame.
    let inner = SubDef {
        name: "inner".into(),
        params: vec![],
        body: vec![Stmt::Last(Some("NOWHERE".into()))],
    };
    let main = SubDef {
        name: "main".into(),
        params: vec![],
        body: vec![Stmt::Expr(Expr::Call("inner".into(), vec![]))],
    };

    let program = compile(CompileUnit {
        subs: vec![inner, main],
    });
    let err = Interpreter::new(program).run("main", &[]).unwrap_err();

    assert!(err.is_recoverable());
    assert!(err.to_string().contains("outside a loop block"));
}

#[test]
fn labelled_bare_block_supports_redo() {
    // my $n = 0; { $n += 1; redo if $n < 3; } return $n;
    let body = vec![
        Stmt::My("n".into(), Some(int(0))),
        Stmt::Block {
            label: Some("TRY".into()),
            body: vec![
                add_assign("n", 1),
                Stmt::If {
                    cond: Expr::Binary(BinOp::NumLt, Box::new(var("n")), Box::new(int(3))),
                    then_branch: vec![Stmt::Redo(Some("TRY".into()))],
                    else_branch: vec![],
                },
            ],
        },
        Stmt::Return(Some(var("n"))),
    ];

    let program = compile(CompileUnit::of_main(body));
    assert_eq!(
        Interpreter::new(program).run("main", &[]).unwrap(),
        Scalar::Int(3)
    );
}

#[test]
fn deep_non_tail_recursion_hits_the_depth_guard() {
    // sub f { my ($n) = @_; return 0 if $n == 0; return f($n - 1) + 1; }
    let f = SubDef {
        name: "f".into(),
        params: vec!["n".into()],
        body: vec![
            Stmt::If {
                cond: Expr::Binary(BinOp::NumEq, Box::new(var("n")), Box::new(int(0))),
                then_branch: vec![Stmt::Return(Some(int(0)))],
                else_branch: vec![],
            },
            Stmt::Return(Some(Expr::Binary(
                BinOp::Add,
                Box::new(Expr::Call(
                    "f".into(),
                    vec![Expr::Binary(BinOp::Sub, Box::new(var("n")), Box::new(int(1)))],
                )),
                Box::new(int(1)),
            ))),
        ],
    };

    let program = compile(CompileUnit { subs: vec![f] });

    // Shallow recursion works...
    assert_eq!(
        Interpreter::new(program.clone())
            .run("f", &[Scalar::Int(100)])
            .unwrap(),
        Scalar::Int(100)
    );

    // ...deep recursion without tail form is fatal, not a crash.
    let err = Interpreter::new(program)
        .run("f", &[Scalar::Int(1_000_000)])
        .unwrap_err();
    assert_eq!(err.panic_reason(), Some(PanicReason::CallDepthExceeded));
}

#[test]
fn call_through_code_reference() {
    let double = SubDef {
        name: "double".into(),
        params: vec!["n".into()],
        body: vec![Stmt::Return(Some(Expr::Binary(
            BinOp::Mul,
            Box::new(var("n")),
            Box::new(int(2)),
        )))],
    };
    let main = SubDef {
        name: "main".into(),
        params: vec![],
        body: vec![
            Stmt::My("f".into(), Some(Expr::CodeRef("double".into()))),
            Stmt::Return(Some(Expr::CallRef(Box::new(var("f")), vec![int(21)]))),
        ],
    };

    let program = compile(CompileUnit {
        subs: vec![double, main],
    });
    assert_eq!(
        Interpreter::new(program).run("main", &[]).unwrap(),
        Scalar::Int(42)
    );
}

#[test]
fn return_value_always_lands_in_destination_register() {
    // g() returns undef implicitly; the caller's destination register must
    // hold a defined outcome of the call, not leftovers.
    let g = SubDef {
        name: "g".into(),
        params: vec![],
        body: vec![],
    };
    let main = SubDef {
        name: "main".into(),
        params: vec![],
        body: vec![
            Stmt::My("r".into(), Some(int(7))),
            Stmt::Expr(Expr::Assign(
                "r".into(),
                Box::new(Expr::Call("g".into(), vec![])),
            )),
            Stmt::Return(Some(var("r"))),
        ],
    };

    let program = compile(CompileUnit { subs: vec![g, main] });
    assert_eq!(
        Interpreter::new(program).run("main", &[]).unwrap(),
        Scalar::Undef
    );
}
