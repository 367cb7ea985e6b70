// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! End-to-end translation of small resolved programs.

use veri_boogie_backend::{
    boogie_backend::{fuel::FUEL_INCREASE_ERROR, options::BoogieOptions},
    generator::generate_boogie,
};
use veri_boogie_ir::{visit_cmds, Cmd, Implementation, Invariant, Program};
use veri_model::{
    ast::{BinaryOp, Exp, ExpData, ExpKind, LocalDecl, SpecExp, Stmt, StmtKind},
    call_graph::compute_call_graph,
    codespan_reporting::diagnostic::Severity,
    model::{
        FuelAnnotation, FunId, FunctionData, Formal, GlobalEnv, Loc, MethodData, MethodKind,
        ModuleData, ModuleId,
    },
    ty::Type,
};

fn int(name: &str) -> Exp {
    ExpData::local(name, Type::Int)
}

fn translate(env: &mut GlobalEnv) -> Program {
    compute_call_graph(env);
    generate_boogie(env, &BoogieOptions::default())
}

fn asserts(imp: &Implementation) -> Vec<String> {
    let mut msgs = vec![];
    visit_cmds(&imp.body, &mut |c| {
        if let Cmd::Assert { msg, .. } = c {
            msgs.push(msg.clone())
        }
    });
    msgs
}

/// `function sum(n: int): int { if n <= 0 then 0 else n + sum(n - 1) }` as function 0 of
/// a fresh module `M`.
fn add_sum(env: &mut GlobalEnv) -> ModuleId {
    let m = env.add_module(ModuleData::new("M", 0));
    let sum = m.qualified(FunId(0));
    let rec = ExpData::call(
        sum,
        vec![ExpData::binary(BinaryOp::Sub, int("n"), ExpData::int_const(1))],
        Type::Int,
    );
    let mut data = FunctionData::new("sum", vec![Formal::new("n", Type::Int)], Type::Int);
    data.body = Some(ExpData::ite(
        ExpData::binary(BinaryOp::Le, int("n"), ExpData::int_const(0)),
        ExpData::int_const(0),
        ExpData::binary(BinaryOp::Add, int("n"), rec),
    ));
    env.module_mut(m).functions.push(data);
    m
}

fn fuel(m: ModuleId, low: u32, high: u32) -> FuelAnnotation {
    FuelAnnotation {
        fun: m.qualified(FunId(0)),
        low,
        high: Some(high),
        loc: Loc::default(),
    }
}

/// `assert sum(2) == 3;` with the given statement level fuel annotations.
fn assert_sum(m: ModuleId, annotations: Vec<FuelAnnotation>) -> Stmt {
    let call = ExpData::call(m.qualified(FunId(0)), vec![ExpData::int_const(2)], Type::Int);
    Stmt::new(
        StmtKind::Assert {
            exp: ExpData::eq(call, ExpData::int_const(3)),
            fuel: annotations,
            proof: None,
        },
        Loc::default(),
    )
}

#[test]
fn counting_loop() {
    // method count(n: int) {
    //   var i := 0;
    //   while i < n invariant 0 <= i <= n decreases n - i { i := i + 1; }
    // }
    let mut env = GlobalEnv::new();
    let m = env.add_module(ModuleData::new("M", 0));
    let guard = ExpData::binary(BinaryOp::Lt, int("i"), int("n"));
    let invariant = ExpData::and(
        ExpData::binary(BinaryOp::Le, ExpData::int_const(0), int("i")),
        ExpData::binary(BinaryOp::Le, int("i"), int("n")),
    );
    let decreases = ExpData::binary(BinaryOp::Sub, int("n"), int("i"));
    let increment = Stmt::assign(
        int("i"),
        ExpData::binary(BinaryOp::Add, int("i"), ExpData::int_const(1)),
    );
    let body = Stmt::block(vec![
        Stmt::new(
            StmtKind::VarDecl {
                locals: vec![LocalDecl {
                    name: "i".to_string(),
                    ty: Type::Int,
                    ghost: false,
                }],
                init: Some(Box::new(Stmt::assign(int("i"), ExpData::int_const(0)))),
            },
            Loc::default(),
        ),
        Stmt::new(
            StmtKind::While {
                guard: Some(guard),
                invariants: vec![SpecExp::checked(invariant)],
                decreases: vec![decreases],
                modifies: None,
                body: Some(Box::new(Stmt::block(vec![increment]))),
            },
            Loc::default(),
        ),
    ]);
    let mut method = MethodData::new("count", MethodKind::Method, vec![Formal::new("n", Type::Int)], vec![]);
    method.body = Some(body);
    env.module_mut(m).methods.push(method);

    let program = translate(&mut env);
    assert!(!env.has_errors());
    let imp = program.implementation("Impl$$M.count").expect("implementation");
    let mut loops: Vec<(Vec<Invariant>, Vec<Cmd>)> = vec![];
    visit_cmds(&imp.body, &mut |c| {
        if let Cmd::While {
            invariants, body, ..
        } = c
        {
            loops.push((invariants.clone(), body.clone()))
        }
    });
    assert_eq!(loops.len(), 1);
    let (invariants, body) = &loops[0];

    // The well-formedness fact of the invariant is gated by the loop flag and free.
    assert!(invariants[0].free);
    assert!(invariants[0].expr.to_string().starts_with("($w$loop#0 ==> "));

    // The invariant is split into its two conjuncts, each checked.
    let checked = invariants.iter().filter(|i| !i.free).collect::<Vec<_>>();
    assert_eq!(checked.len(), 2);
    assert!(checked
        .iter()
        .all(|i| i.msg == "loop invariant might not hold"));
    assert!(checked[0].expr.to_string().contains("i#0"));

    // Heap and frame facts close the invariant list.
    assert!(invariants
        .iter()
        .any(|i| i.free && i.expr.to_string().contains("$HeapSucc($PreLoopHeap$loop#0, $Heap)")));

    // The body re-checks the measure against its snapshot.
    let mut body_asserts = vec![];
    visit_cmds(body, &mut |c| {
        if let Cmd::Assert { msg, .. } = c {
            body_asserts.push(msg.clone())
        }
    });
    assert!(body_asserts
        .iter()
        .any(|m| m == "decreases expression might not decrease"));
    let locals = imp.locals.iter().map(|l| l.name.as_str()).collect::<Vec<_>>();
    assert!(locals.contains(&"$PreLoopHeap$loop#0"));
    assert!(locals.contains(&"$w$loop#0"));
    assert!(locals.contains(&"$decr$loop#00"));
}

#[test]
fn closures_of_arity_two_get_frame_axioms() {
    // function app(f: (int, int) -> int, x: int): int { f(x, x) }
    let mut env = GlobalEnv::new();
    let m = env.add_module(ModuleData::new("M", 0));
    let f_ty = Type::arrow(vec![Type::Int, Type::Int], Type::Int);
    let apply = ExpData::new(
        ExpKind::Apply {
            fun: ExpData::local("f", f_ty.clone()),
            args: vec![int("x"), int("x")],
        },
        Type::Int,
        Loc::default(),
    );
    let mut data = FunctionData::new(
        "app",
        vec![Formal::new("f", f_ty), Formal::new("x", Type::Int)],
        Type::Int,
    );
    data.body = Some(apply);
    env.module_mut(m).functions.push(data);

    let program = translate(&mut env);
    for name in ["TArrow2", "Apply2", "Requires2", "Reads2", "Handle2"] {
        assert!(program.is_declared(name), "{} missing", name);
    }
    let frame = program.axioms_commented("frame axiom for Apply2");
    assert_eq!(frame.len(), 2);
    let text = frame[0].to_string();
    // Agreement on the footprint read in h0 gives equal results in both heaps.
    assert!(text.contains("Reads2(t0, t1, t, h0, f)"));
    assert!(text.contains(
        "(Apply2(t0, t1, t, h0, f, bx0, bx1) == Apply2(t0, t1, t, h1, f, bx0, bx1))"
    ));
    assert!(frame[1].to_string().contains("Reads2(t0, t1, t, h1, f)"));
    // The application itself goes through the projection.
    assert!(program
        .axioms()
        .any(|a| a.to_string().contains("Apply2(TInt, TInt, TInt, ")));
}

#[test]
fn fuel_bounds_select_the_start_layers() {
    // method {:fuel sum, 1, 2} check() { assert sum(2) == 3; }
    let mut env = GlobalEnv::new();
    let m = add_sum(&mut env);
    let mut method = MethodData::new("check", MethodKind::Lemma, vec![], vec![]);
    method.fuel = vec![fuel(m, 1, 2)];
    method.body = Some(Stmt::block(vec![assert_sum(m, vec![])]));
    env.module_mut(m).methods.push(method);

    let program = translate(&mut env);
    assert!(!env.has_errors());
    let imp = program.implementation("Impl$$M.check").expect("implementation");
    let mut assumed = vec![];
    let mut asserted = vec![];
    visit_cmds(&imp.body, &mut |c| match c {
        Cmd::Assume(e) => assumed.push(e.to_string()),
        Cmd::Assert { expr, .. } => asserted.push(expr.to_string()),
        _ => {}
    });
    // Assumed facts see one unfolding, checked facts two.
    assert!(assumed
        .iter()
        .any(|a| a == "(StartFuel_M.sum == $LS(BaseFuel_M.sum))"));
    assert!(assumed
        .iter()
        .any(|a| a == "(StartFuelAssert_M.sum == $LS($LS(BaseFuel_M.sum)))"));
    assert!(assumed
        .iter()
        .any(|a| a == "(AsFuelBottom(BaseFuel_M.sum) == BaseFuel_M.sum)"));
    assert!(asserted
        .iter()
        .any(|a| a.contains("M.sum(StartFuelAssert_M.sum, ")));
    // Beyond its start layer a call unfolds only through the layer synonym, which stops
    // at the bottom layer.
    assert_eq!(program.axioms_commented("layer synonym of M.sum").len(), 1);
}

#[test]
fn nested_fuel_can_only_increase() {
    // method {:fuel sum, 2, 3} check() { assert {:fuel sum, 1, 2} sum(2) == 3; }
    let mut env = GlobalEnv::new();
    let m = add_sum(&mut env);
    let mut method = MethodData::new("check", MethodKind::Lemma, vec![], vec![]);
    method.fuel = vec![fuel(m, 2, 3)];
    method.body = Some(Stmt::block(vec![assert_sum(m, vec![fuel(m, 1, 2)])]));
    env.module_mut(m).methods.push(method);

    let _ = translate(&mut env);
    assert!(env.has_errors());
    assert!(env
        .diag_messages(Severity::Error)
        .iter()
        .any(|msg| msg == FUEL_INCREASE_ERROR));
}

#[test]
fn nested_fuel_increase_binds_fresh_layers() {
    let mut env = GlobalEnv::new();
    let m = add_sum(&mut env);
    let mut method = MethodData::new("check", MethodKind::Lemma, vec![], vec![]);
    method.body = Some(Stmt::block(vec![assert_sum(m, vec![fuel(m, 3, 4)])]));
    env.module_mut(m).methods.push(method);

    let program = translate(&mut env);
    assert!(!env.has_errors());
    let imp = program.implementation("Impl$$M.check").expect("implementation");
    assert!(imp.locals.iter().any(|l| l.name == "StartFuelAssert_M.sum#0"));
    assert!(asserts(imp)
        .iter()
        .any(|m| m == "assertion might not hold"));
    let text = program.to_string();
    assert!(text.contains("StartFuelAssert_M.sum#0 == $LS($LS($LS($LS(BaseFuel_M.sum))))"));
}
