// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Commands emitted for individual statements.

use veri_boogie_backend::{boogie_backend::options::BoogieOptions, generator::generate_boogie};
use veri_boogie_ir::{visit_cmds, Cmd, Implementation, Program};
use veri_model::{
    ast::{
        BinaryOp, BoundVar, CalcOp, Exp, ExpData, ExpKind, FrameExp, LocalDecl, MatchCaseStmt,
        Rhs, SpecExp, Stmt, StmtKind,
    },
    call_graph::compute_call_graph,
    model::{
        ClassData, ClassId, CtorData, CtorRef, DatatypeData, DatatypeId, FieldData, FieldId,
        Formal, GlobalEnv, Loc, MethodData, MethodId, MethodKind, ModuleData, ModuleId,
    },
    ty::Type,
};

fn int(name: &str) -> Exp {
    ExpData::local(name, Type::Int)
}

fn array(name: &str) -> Exp {
    ExpData::local(name, Type::array(Type::Int))
}

fn elem(a: Exp, i: Exp) -> Exp {
    ExpData::new(
        ExpKind::ArraySelect {
            array: a,
            indices: vec![i],
        },
        Type::Int,
        Loc::default(),
    )
}

fn length(a: Exp) -> Exp {
    ExpData::new(ExpKind::ArrayLength { array: a, dim: 0 }, Type::Int, Loc::default())
}

fn translate(env: &mut GlobalEnv) -> Program {
    compute_call_graph(env);
    generate_boogie(env, &BoogieOptions::default())
}

fn implementation<'a>(program: &'a Program, name: &str) -> &'a Implementation {
    program
        .implementation(name)
        .unwrap_or_else(|| panic!("{} missing", name))
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

fn assumes(imp: &Implementation) -> Vec<String> {
    let mut facts = vec![];
    visit_cmds(&imp.body, &mut |c| {
        if let Cmd::Assume(e) = c {
            facts.push(e.to_string())
        }
    });
    facts
}

/// The quantified effect of a forall statement over `i`.
fn forall_effect(imp: &Implementation) -> String {
    let effects = assumes(imp)
        .into_iter()
        .filter(|a| a.starts_with("(forall i#0: int ::"))
        .collect::<Vec<_>>();
    assert_eq!(effects.len(), 1, "{:?}", effects);
    effects[0].clone()
}

/// The body of a quantifier, past its variables and triggers.
fn quantifier_body(q: &str) -> &str {
    let mut rest = q.split_once("::").map_or(q, |(_, b)| b).trim_start();
    while let Some(after) = rest.strip_prefix('{') {
        rest = after.split_once('}').map_or("", |(_, b)| b).trim_start();
    }
    rest
}

/// `method name(a: array<int>) modifies a { body }` in module `m`.
fn add_array_method(env: &mut GlobalEnv, m: ModuleId, name: &str, body: Stmt) {
    let mut method = MethodData::new(
        name,
        MethodKind::Method,
        vec![Formal::new("a", Type::array(Type::Int))],
        vec![],
    );
    method.modifies = vec![FrameExp::new(array("a"))];
    method.body = Some(body);
    env.module_mut(m).methods.push(method);
}

/// `0 <= i < a.Length && a[i] > 0`
fn positive_elements() -> Exp {
    ExpData::and_all(vec![
        ExpData::binary(BinaryOp::Le, ExpData::int_const(0), int("i")),
        ExpData::binary(BinaryOp::Lt, int("i"), length(array("a"))),
        ExpData::binary(BinaryOp::Gt, elem(array("a"), int("i")), ExpData::int_const(0)),
    ])
}

fn forall_i(body: Stmt) -> Stmt {
    Stmt::new(
        StmtKind::Forall {
            vars: vec![BoundVar::new("i", Type::Int)],
            range: Some(positive_elements()),
            ensures: vec![],
            body: Some(Box::new(body)),
        },
        Loc::default(),
    )
}

/// `class C { var v: int; constructor init() }` as class 0 of module `m`.
fn add_class(env: &mut GlobalEnv, m: ModuleId) -> Type {
    let module = env.module_mut(m);
    module.classes.push(ClassData {
        name: "C".to_string(),
        loc: Default::default(),
        type_params: vec![],
        is_trait: false,
        parents: vec![],
        fuel: vec![],
    });
    module.fields.push(FieldData {
        name: "v".to_string(),
        loc: Default::default(),
        owner: ClassId(0),
        ty: Type::Int,
        mutable: true,
        ghost: false,
    });
    let mut init = MethodData::new("init", MethodKind::Constructor, vec![], vec![]);
    init.owner = Some(ClassId(0));
    init.is_static = false;
    module.methods.push(init);
    Type::class(m.qualified(ClassId(0)), vec![])
}

#[test]
fn mass_assignment_range_reads_the_previous_heap() {
    // method clear(a: array<int>) modifies a {
    //   forall i | 0 <= i < a.Length && a[i] > 0 { a[i] := 0; }
    // }
    let mut env = GlobalEnv::new();
    let m = env.add_module(ModuleData::new("M", 0));
    let assign = Stmt::assign(elem(array("a"), int("i")), ExpData::int_const(0));
    add_array_method(&mut env, m, "clear", Stmt::block(vec![forall_i(assign)]));

    let program = translate(&mut env);
    assert!(!env.has_errors());
    let imp = implementation(&program, "Impl$$M.clear");
    let effect = forall_effect(imp);
    // The range mentions the element before the update.
    assert!(quantifier_body(&effect).contains("read($prevHeap#"), "{}", effect);
    let (range, updated) = quantifier_body(&effect)
        .split_once("==>")
        .unwrap_or_else(|| panic!("no implication in {}", effect));
    assert!(!range.contains("read($Heap, "), "{}", effect);
    assert!(updated.contains("read($Heap, a#0, IndexField(i#0))"), "{}", effect);
    assert!(!updated.contains("read($prevHeap#"), "{}", effect);
    // Locations outside the range keep their values.
    assert!(assumes(imp)
        .iter()
        .any(|a| a.starts_with("(forall $o: ref") && a.contains("(exists i#0: int ::")));
}

#[test]
fn forall_call_exports_postconditions_over_the_previous_range() {
    // method zero(b: array<int>, j: int) modifies b ensures b[j] == 0;
    // method clear(a: array<int>) modifies a {
    //   forall i | 0 <= i < a.Length && a[i] > 0 { zero(a, i); }
    // }
    let mut env = GlobalEnv::new();
    let m = env.add_module(ModuleData::new("M", 0));
    let mut zero = MethodData::new(
        "zero",
        MethodKind::Method,
        vec![
            Formal::new("b", Type::array(Type::Int)),
            Formal::new("j", Type::Int),
        ],
        vec![],
    );
    zero.modifies = vec![FrameExp::new(array("b"))];
    zero.ensures = vec![SpecExp::checked(ExpData::eq(
        elem(array("b"), int("j")),
        ExpData::int_const(0),
    ))];
    env.module_mut(m).methods.push(zero);
    let call = Stmt::new(
        StmtKind::Call {
            lhss: vec![],
            method: m.qualified(MethodId(0)),
            receiver: None,
            type_args: vec![],
            args: vec![array("a"), int("i")],
        },
        Loc::default(),
    );
    add_array_method(&mut env, m, "clear", Stmt::block(vec![forall_i(call)]));

    let program = translate(&mut env);
    assert!(!env.has_errors());
    let imp = implementation(&program, "Impl$$M.clear");
    let effect = forall_effect(imp);
    let (range, post) = quantifier_body(&effect)
        .split_once("==>")
        .unwrap_or_else(|| panic!("no implication in {}", effect));
    assert!(range.contains("read($prevHeap#"), "{}", effect);
    assert!(!range.contains("read($Heap, "), "{}", effect);
    assert!(post.contains("read($Heap, a#0, IndexField(i#0))"), "{}", effect);
    // The definedness branch calls the method once and checks its frame.
    let msgs = asserts(imp);
    assert!(msgs
        .iter()
        .any(|m| m == "call might violate context's modifies clause"));
}

#[test]
fn calculation_steps_are_checked_in_branches() {
    // lemma L() { calc == { 1 + 1; 2; } }
    let mut env = GlobalEnv::new();
    let m = env.add_module(ModuleData::new("M", 0));
    let calc = Stmt::new(
        StmtKind::Calc {
            op: CalcOp::Eq,
            lines: vec![
                ExpData::binary(BinaryOp::Add, ExpData::int_const(1), ExpData::int_const(1)),
                ExpData::int_const(2),
            ],
            steps: vec![CalcOp::Eq],
            hints: vec![Stmt::block(vec![])],
        },
        Loc::default(),
    );
    let mut lemma = MethodData::new("L", MethodKind::Lemma, vec![], vec![]);
    lemma.body = Some(Stmt::block(vec![calc]));
    env.module_mut(m).methods.push(lemma);

    let program = translate(&mut env);
    let imp = implementation(&program, "Impl$$M.L");
    let mut branches = vec![];
    visit_cmds(&imp.body, &mut |c| {
        if let Cmd::If {
            guard: None, then, ..
        } = c
        {
            branches.push(then.clone())
        }
    });
    assert_eq!(branches.len(), 1);
    let step = &branches[0];
    assert!(step.iter().any(|c| matches!(
        c,
        Cmd::Assert { msg, .. }
            if msg == "the calculation step between the previous line and this line might not hold"
    )));
    assert!(matches!(step.last(), Some(Cmd::Assume(e)) if e.to_string() == "false"));
}

#[test]
fn missing_match_cases_are_reported() {
    // datatype List = Nil | Cons(head: int, tail: List)
    // method M(xs: List) { match xs { case Nil => } }
    let mut env = GlobalEnv::new();
    let m = env.add_module(ModuleData::new("M", 0));
    let list = Type::Datatype(m.qualified(DatatypeId(0)), vec![]);
    env.module_mut(m).datatypes.push(DatatypeData {
        name: "List".to_string(),
        loc: Default::default(),
        type_params: vec![],
        ctors: vec![
            CtorData {
                name: "Nil".to_string(),
                loc: Default::default(),
                formals: vec![],
            },
            CtorData {
                name: "Cons".to_string(),
                loc: Default::default(),
                formals: vec![
                    Formal::new("head", Type::Int),
                    Formal::new("tail", list.clone()),
                ],
            },
        ],
        is_codatatype: false,
    });
    let ctor = |index| CtorRef {
        datatype: m.qualified(DatatypeId(0)),
        index,
    };
    let stmt = Stmt::new(
        StmtKind::Match {
            source: ExpData::local("xs", list.clone()),
            cases: vec![MatchCaseStmt {
                ctor: ctor(0),
                vars: vec![],
                body: vec![],
            }],
            missing: vec![ctor(1)],
        },
        Loc::default(),
    );
    let mut method = MethodData::new(
        "M",
        MethodKind::Method,
        vec![Formal::new("xs", list)],
        vec![],
    );
    method.body = Some(Stmt::block(vec![stmt]));
    env.module_mut(m).methods.push(method);

    let program = translate(&mut env);
    let imp = implementation(&program, "Impl$$M.M");
    assert!(asserts(imp)
        .iter()
        .any(|m| m == "missing case in match statement: Cons"));
}

#[test]
fn field_updates_check_the_frame() {
    // method set(c: C) { c.v := 1; }
    let mut env = GlobalEnv::new();
    let m = env.add_module(ModuleData::new("M", 0));
    let c_ty = add_class(&mut env, m);
    let field = ExpData::field_select(
        ExpData::local("c", c_ty.clone()),
        m.qualified(FieldId(0)),
        Type::Int,
    );
    let mut method = MethodData::new("set", MethodKind::Method, vec![Formal::new("c", c_ty)], vec![]);
    method.body = Some(Stmt::block(vec![Stmt::assign(field, ExpData::int_const(1))]));
    env.module_mut(m).methods.push(method);

    let program = translate(&mut env);
    let imp = implementation(&program, "Impl$$M.set");
    let mut frame_checks = vec![];
    visit_cmds(&imp.body, &mut |c| {
        if let Cmd::Assert { expr, msg, .. } = c {
            if msg
                == "assignment might update an object not in the enclosing context's modifies clause"
            {
                frame_checks.push(expr.to_string())
            }
        }
    });
    assert_eq!(frame_checks.len(), 1);
    assert!(frame_checks[0].starts_with("$_Frame[c#0, "), "{}", frame_checks[0]);
    assert!(asserts(imp)
        .iter()
        .any(|m| m == "target object might be null"));
}

#[test]
fn constructor_calls_report_at_the_allocation() {
    // method make() { var c: C; c := new C.init(); }
    let text = "method make() {\n  var c: C;\n  c := new C.init();\n}\n";
    let mut env = GlobalEnv::new();
    let file = env.add_source("make.dfy", text);
    let m = env.add_module(ModuleData::new("M", 0));
    let c_ty = add_class(&mut env, m);
    let start = text.find("c := new").unwrap_or_default() as u32;
    let loc = Loc::new(file, start, start + 18);
    let alloc = Stmt::new(
        StmtKind::Assign {
            lhss: vec![ExpData::local("c", c_ty.clone())],
            rhss: vec![Rhs::New {
                ty: c_ty.clone(),
                init: Some((m.qualified(MethodId(0)), vec![])),
            }],
        },
        loc,
    );
    let decl = Stmt::new(
        StmtKind::VarDecl {
            locals: vec![LocalDecl {
                name: "c".to_string(),
                ty: c_ty,
                ghost: false,
            }],
            init: None,
        },
        Loc::default(),
    );
    let mut method = MethodData::new("make", MethodKind::Method, vec![], vec![]);
    method.body = Some(Stmt::block(vec![decl, alloc]));
    env.module_mut(m).methods.push(method);

    let program = translate(&mut env);
    let imp = implementation(&program, "Impl$$M.make");
    let mut lines = vec![];
    let mut allocations = vec![];
    visit_cmds(&imp.body, &mut |c| match c {
        Cmd::Assert { token, msg, .. } if msg == "target object might be null" => {
            lines.push(token.line)
        }
        Cmd::Assign(lhs, rhs) if lhs.len() == 1 && lhs[0] == "$Heap" => {
            allocations.push(rhs[0].to_string())
        }
        _ => {}
    });
    assert_eq!(lines, vec![3]);
    assert!(allocations
        .iter()
        .any(|a| a.starts_with("update($Heap, $nw#") && a.contains(", alloc, ")));
    assert!(assumes(imp).iter().any(|a| a.contains("dtype($nw#")));
    let mut callees = vec![];
    visit_cmds(&imp.body, &mut |c| {
        if let Cmd::Call { callee, .. } = c {
            callees.push(callee.clone())
        }
    });
    assert_eq!(callees, vec!["Call$$M.C.init".to_string()]);
}
