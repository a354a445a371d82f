use std::rc::Rc;

use quickcheck_macros::quickcheck;

use perl_vm::consts::MAX_SUB_OPCODES;
use perl_vm::prelude::*;

fn assemble(ops: &[Opcode]) -> Vec<i32> {
    let mut code = vec![];
    for op in ops {
        op.encode(&mut code);
    }
    code
}

fn single_sub(code: Vec<i32>, registers: usize) -> Rc<Program> {
    Rc::new(
        Program::new(
            code,
            vec![],
            registers,
            vec![SubSpec {
                name: "main".into(),
                entry: 0,
                loops: vec![],
            }],
        )
        .expect("verifies"),
    )
}

fn run(program: Rc<Program>) -> Scalar {
    Interpreter::new(program).run("main", &[]).expect("runs")
}

#[quickcheck]
fn add_move_and_adda_agree(a: i32, b: i32) -> bool {
    let unfused = single_sub(
        assemble(&[
            Opcode::LOADI(0, a),
            Opcode::LOADI(1, b),
            Opcode::ADD(2, 0, 1),
            Opcode::MOVE(0, 2),
            Opcode::RET(0),
        ]),
        3,
    );
    let fused = single_sub(
        assemble(&[
            Opcode::LOADI(0, a),
            Opcode::LOADI(1, b),
            Opcode::ADDA(0, 1),
            Opcode::RET(0),
        ]),
        2,
    );

    run(unfused) == run(fused)
}

#[quickcheck]
fn load_move_and_collapsed_load_agree(k: i32) -> bool {
    let unfused = single_sub(
        assemble(&[
            Opcode::LOADI(1, k),
            Opcode::MOVE(0, 1),
            Opcode::RET(0),
        ]),
        2,
    );
    let collapsed = single_sub(assemble(&[Opcode::LOADI(0, k), Opcode::RET(0)]), 1);

    run(unfused) == run(collapsed)
}

#[test]
fn oversize_sub_is_split_into_tail_called_helpers() {
    // Enough top-level statements to overflow the per-sub budget several
    // times over.
    let mut body = vec![Stmt::My("s".into(), Some(Expr::Int(0)))];
    for _ in 0..MAX_SUB_OPCODES {
        body.push(Stmt::Expr(Expr::CompoundAssign(
            "s".into(),
            BinOp::Add,
            Box::new(Expr::Int(1)),
        )));
    }
    body.push(Stmt::Return(Some(Expr::Var("s".into()))));

    let program = compiler::compile(&CompileUnit::of_main(body)).unwrap();

    assert!(
        program.subs().len() >= 2,
        "expected helper subroutines, got {}",
        program.subs().len()
    );
    assert!(program.sub_index("main__0").is_some());

    // Every part respects the budget (plus the trailing tail call).
    let mut entries: Vec<usize> = program.subs().iter().map(|s| s.entry).collect();
    entries.sort_unstable();
    entries.push(program.code().len());
    for pair in entries.windows(2) {
        assert!(pair[1] - pair[0] <= MAX_SUB_OPCODES + 16);
    }

    // Semantics unchanged after the split.
    let result = Interpreter::new(Rc::new(program)).run("main", &[]).unwrap();
    assert_eq!(result, Scalar::Int(MAX_SUB_OPCODES as i64));
}

#[test]
fn split_preserves_locals_across_parts() {
    let mut body = vec![
        Stmt::My("a".into(), Some(Expr::Int(3))),
        Stmt::My("b".into(), Some(Expr::Int(4))),
    ];
    for _ in 0..MAX_SUB_OPCODES {
        body.push(Stmt::Expr(Expr::CompoundAssign(
            "a".into(),
            BinOp::Add,
            Box::new(Expr::Int(0)),
        )));
    }
    // This runs in a helper part; both locals must have travelled with the
    // tail calls.
    body.push(Stmt::Return(Some(Expr::Binary(
        BinOp::Mul,
        Box::new(Expr::Var("a".into())),
        Box::new(Expr::Var("b".into())),
    ))));

    let program = compiler::compile(&CompileUnit::of_main(body)).unwrap();
    assert!(program.subs().len() >= 2);

    let result = Interpreter::new(Rc::new(program)).run("main", &[]).unwrap();
    assert_eq!(result, Scalar::Int(12));
}

#[test]
fn loop_table_records_label_and_targets() {
    let body = vec![Stmt::While {
        label: Some("W".into()),
        cond: Expr::Int(0),
        body: vec![Stmt::Expr(Expr::Int(1))],
    }];
    let program = compiler::compile(&CompileUnit::of_main(body)).unwrap();

    let main = &program.subs()[program.sub_index("main").unwrap()];
    assert_eq!(main.loops.len(), 1);
    let l = &main.loops[0];
    assert_eq!(l.label.as_deref(), Some("W"));
    assert!(l.span.contains(&l.head));
    assert!(program.branch_targets().contains(&l.exit));
}

#[test]
fn unknown_call_target_is_a_compile_error() {
    let unit = CompileUnit::of_main(vec![Stmt::Expr(Expr::Call("nope".into(), vec![]))]);
    assert_eq!(
        compiler::compile(&unit).unwrap_err(),
        CompileError::UnknownSubroutine("nope".into())
    );
}

#[test]
fn duplicate_subroutines_are_rejected() {
    let sub = SubDef {
        name: "twice".into(),
        params: vec![],
        body: vec![],
    };
    let unit = CompileUnit {
        subs: vec![sub.clone(), sub],
    };
    assert_eq!(
        compiler::compile(&unit).unwrap_err(),
        CompileError::DuplicateSubroutine("twice".into())
    );
}

#[test]
fn compiled_branches_land_on_opcode_starts() {
    // Nested control flow; Program::new re-verifies everything the
    // compiler produced.
    let body = vec![
        Stmt::My("n".into(), Some(Expr::Int(0))),
        Stmt::While {
            label: None,
            cond: Expr::Binary(
                BinOp::NumLt,
                Box::new(Expr::Var("n".into())),
                Box::new(Expr::Int(5)),
            ),
            body: vec![
                Stmt::If {
                    cond: Expr::Binary(
                        BinOp::NumEq,
                        Box::new(Expr::Var("n".into())),
                        Box::new(Expr::Int(3)),
                    ),
                    then_branch: vec![Stmt::Last(None)],
                    else_branch: vec![],
                },
                Stmt::Expr(Expr::CompoundAssign(
                    "n".into(),
                    BinOp::Add,
                    Box::new(Expr::Int(1)),
                )),
            ],
        },
        Stmt::Return(Some(Expr::Var("n".into()))),
    ];

    let program = compiler::compile(&CompileUnit::of_main(body)).unwrap();
    assert!(!program.branch_targets().is_empty());

    let result = Interpreter::new(Rc::new(program)).run("main", &[]).unwrap();
    assert_eq!(result, Scalar::Int(3));
}
