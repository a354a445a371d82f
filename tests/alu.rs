use std::rc::Rc;

use quickcheck_macros::quickcheck;

use perl_vm::prelude::*;

fn var(name: &str) -> Expr {
    Expr::Var(name.into())
}

fn int(v: i64) -> Expr {
    Expr::Int(v)
}

fn run_main(body: Vec<Stmt>) -> Scalar {
    let program = compiler::compile(&CompileUnit::of_main(body)).expect("compiles");
    Interpreter::new(Rc::new(program))
        .run("main", &[])
        .expect("runs")
}

#[test]
fn hot_loop_sums_and_fuses() {
    // my $s = 0; for (my $i = 0; $i < 100; $i += 1) { $s += $i } return $s;
    let body = vec![
        Stmt::My("s".into(), Some(int(0))),
        Stmt::For {
            label: None,
            init: Some(Box::new(Stmt::My("i".into(), Some(int(0))))),
            cond: Some(Expr::Binary(
                BinOp::NumLt,
                Box::new(var("i")),
                Box::new(int(100)),
            )),
            step: Some(Box::new(Stmt::Expr(Expr::CompoundAssign(
                "i".into(),
                BinOp::Add,
                Box::new(int(1)),
            )))),
            body: vec![Stmt::Expr(Expr::CompoundAssign(
                "s".into(),
                BinOp::Add,
                Box::new(var("i")),
            ))],
        },
        Stmt::Return(Some(var("s"))),
    ];

    let program = compiler::compile(&CompileUnit::of_main(body)).unwrap();

    // The accumulation must be the fused in-place forms.
    let has = |needle: OpcodeRepr| {
        let code = program.code();
        let mut pc = 0;
        while pc < code.len() {
            let op = OpcodeRepr::decode(code[pc]).unwrap();
            if op == needle {
                return true;
            }
            let layout = op.layout();
            pc += 1 + layout.fixed.len();
            if layout.arg_list {
                pc += 1 + code[pc] as usize;
            }
        }
        false
    };
    assert!(has(OpcodeRepr::ADDA), "loop body fuses to ADDA");
    assert!(has(OpcodeRepr::ADDAI), "increment fuses to ADDAI");
    assert!(!has(OpcodeRepr::MOVE), "no residual register copies");

    let result = Interpreter::new(Rc::new(program)).run("main", &[]).unwrap();
    assert_eq!(result, Scalar::Int(4950));
}

#[test]
fn division_by_zero_is_a_recoverable_exception() {
    let body = vec![Stmt::Return(Some(Expr::Binary(
        BinOp::Div,
        Box::new(int(1)),
        Box::new(int(0)),
    )))];
    let program = compiler::compile(&CompileUnit::of_main(body)).unwrap();
    let err = Interpreter::new(Rc::new(program))
        .run("main", &[])
        .unwrap_err();

    assert!(err.is_recoverable());
    assert!(err.to_string().contains("Illegal division by zero"));
}

#[test]
fn string_operators() {
    let body = vec![
        Stmt::My("s".into(), Some(Expr::Str("ab".into()))),
        Stmt::Expr(Expr::CompoundAssign(
            "s".into(),
            BinOp::Concat,
            Box::new(Expr::Str("cd".into())),
        )),
        Stmt::Return(Some(Expr::Length(Box::new(Expr::Binary(
            BinOp::Repeat,
            Box::new(var("s")),
            Box::new(int(3)),
        ))))),
    ];
    assert_eq!(run_main(body), Scalar::Int(12));
}

#[test]
fn comparisons_are_numeric_or_stringwise() {
    let num = vec![Stmt::Return(Some(Expr::Binary(
        BinOp::NumLt,
        Box::new(Expr::Str("9".into())),
        Box::new(Expr::Str("10".into())),
    )))];
    assert_eq!(run_main(num), Scalar::Bool(true));

    let string = vec![Stmt::Return(Some(Expr::Binary(
        BinOp::StrLt,
        Box::new(Expr::Str("9".into())),
        Box::new(Expr::Str("10".into())),
    )))];
    assert_eq!(run_main(string), Scalar::Bool(false));
}

#[test]
fn magic_string_increment_through_the_vm() {
    let body = vec![
        Stmt::My("v".into(), Some(Expr::Str("Az".into()))),
        Stmt::Incr("v".into()),
        Stmt::Return(Some(var("v"))),
    ];
    assert_eq!(run_main(body), Scalar::str("Ba"));
}

#[test]
fn print_writes_to_the_output_handle() {
    let body = vec![
        Stmt::Print(vec![
            Expr::Str("sum=".into()),
            Expr::Int(42),
            Expr::Str("\n".into()),
        ]),
        Stmt::Return(Some(int(0))),
    ];
    let program = Rc::new(compiler::compile(&CompileUnit::of_main(body)).unwrap());

    let sink = ScalarFile::new();
    let buf = sink.buffer();
    let mut vm = Interpreter::new(program).with_output(Box::new(sink));
    vm.run("main", &[]).unwrap();

    assert_eq!(&*buf.borrow(), b"sum=42\n");
}

#[quickcheck]
fn arithmetic_is_deterministic(x: i32, y: i32) -> bool {
    let body = vec![
        Stmt::My("a".into(), Some(int(x as i64))),
        Stmt::My("b".into(), Some(int(y as i64))),
        Stmt::Return(Some(Expr::Binary(
            BinOp::Add,
            Box::new(Expr::Binary(BinOp::Mul, Box::new(var("a")), Box::new(var("b")))),
            Box::new(var("a")),
        ))),
    ];
    let program = Rc::new(compiler::compile(&CompileUnit::of_main(body)).unwrap());

    let first = Interpreter::new(program.clone()).run("main", &[]).unwrap();
    let second = Interpreter::new(program).run("main", &[]).unwrap();
    first == second
}

#[quickcheck]
fn modulus_matches_perl_sign_rules(x: i32, y: i32) -> quickcheck::TestResult {
    if y == 0 {
        return quickcheck::TestResult::discard();
    }
    let body = vec![Stmt::Return(Some(Expr::Binary(
        BinOp::Mod,
        Box::new(int(x as i64)),
        Box::new(int(y as i64)),
    )))];
    let got = run_main(body);

    let (x, y) = (x as i64, y as i64);
    let expected = ((x % y) + y) % y;
    quickcheck::TestResult::from_bool(got == Scalar::Int(expected))
}
