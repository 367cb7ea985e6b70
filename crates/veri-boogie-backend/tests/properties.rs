// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Algebraic properties of splitting, substitution and type encoding.

use std::collections::BTreeMap;
use veri_boogie_backend::boogie_backend::{
    context::FreshIdGenerator,
    decl_translator::BoogieTranslator,
    exp_translator::ExpTranslator,
    options::BoogieOptions,
    splitter::SplitKind,
    substitution::{alpha_equivalent, Substitution},
    vocabulary::Vocabulary,
};
use veri_boogie_ir::{BBinOp, BExpr, BUnOp};
use veri_model::{
    ast::{BinaryOp, BoundVar, Exp, ExpData},
    model::{ClassData, ClassId, GlobalEnv, ModuleData},
    ty::Type,
};

const VARS: [&str; 3] = ["a", "b", "c"];

fn var(name: &str) -> Exp {
    ExpData::local(name, Type::Bool)
}

/// Evaluates a propositional formula over the translated locals.
fn eval(e: &BExpr, env: &BTreeMap<String, bool>) -> bool {
    match e {
        BExpr::Bool(b) => *b,
        BExpr::Ident(name) => env[name],
        BExpr::Unary(BUnOp::Not, x) => !eval(x, env),
        BExpr::Binary(op, l, r) => {
            let (l, r) = (eval(l, env), eval(r, env));
            match op {
                BBinOp::And => l && r,
                BBinOp::Or => l || r,
                BBinOp::Imp => !l || r,
                BBinOp::Iff | BBinOp::Eq => l == r,
                BBinOp::Neq => l != r,
                _ => panic!("not propositional: {}", e),
            }
        }
        BExpr::Ite(c, t, f) => {
            if eval(c, env) {
                eval(t, env)
            } else {
                eval(f, env)
            }
        }
        _ => panic!("not propositional: {}", e),
    }
}

fn assignments() -> Vec<BTreeMap<String, bool>> {
    (0..1 << VARS.len())
        .map(|bits: usize| {
            VARS.iter()
                .enumerate()
                .map(|(i, v)| (format!("{}#0", v), bits & (1 << i) != 0))
                .collect()
        })
        .collect()
}

#[test]
fn splitting_preserves_meaning() {
    let mut env = GlobalEnv::new();
    let m = env.add_module(ModuleData::new("M", 0));
    let options = BoogieOptions::default();
    let vocab = Vocabulary::builtin().unwrap();
    let tr = BoogieTranslator::new(&env, &options, &vocab);
    let ctx = tr.new_context(m, None);
    let et = ExpTranslator::new(&tr, &ctx, BExpr::ident("$Heap"));

    let (a, b, c) = (var("a"), var("b"), var("c"));
    let formulas = vec![
        ExpData::and(a.clone(), ExpData::or(b.clone(), c.clone())),
        ExpData::implies(a.clone(), ExpData::and(b.clone(), c.clone())),
        ExpData::or(a.clone(), ExpData::and(b.clone(), c.clone())),
        ExpData::not(ExpData::or(a.clone(), ExpData::implies(b.clone(), c.clone()))),
        ExpData::ite(
            a.clone(),
            ExpData::and(b.clone(), c.clone()),
            ExpData::or(b.clone(), ExpData::not(c.clone())),
        ),
        ExpData::implies(ExpData::and(a.clone(), b.clone()), ExpData::implies(c.clone(), a.clone())),
        ExpData::binary(BinaryOp::Iff, a.clone(), b.clone()),
    ];
    for e in &formulas {
        let whole = et.trans(e);
        for positive in [true, false] {
            let (parts, _) = et.split(e, positive, 0);
            assert!(!parts.is_empty());
            assert!(parts.iter().all(|p| p.kind != SplitKind::Free));
            let exprs = parts.into_iter().map(|p| p.expr).collect::<Vec<_>>();
            let combined = if positive {
                BExpr::and_all(exprs)
            } else {
                BExpr::or_all(exprs)
            };
            for asg in assignments() {
                assert_eq!(
                    eval(&combined, &asg),
                    eval(&whole, &asg),
                    "{} split {} as {} under {:?}",
                    whole,
                    if positive { "positively" } else { "negatively" },
                    combined,
                    asg
                );
            }
        }
    }
}

#[test]
fn substitutions_compose() {
    // E = forall x :: x < v && v <= y
    let int = |n: &str| ExpData::local(n, Type::Int);
    let e = ExpData::forall(
        vec![BoundVar::new("x", Type::Int)],
        None,
        ExpData::and(
            ExpData::binary(BinaryOp::Lt, int("x"), int("v")),
            ExpData::binary(BinaryOp::Le, int("v"), int("y")),
        ),
    );
    let fresh = FreshIdGenerator::new();
    // w mentions the bound name, so the second step has to rename.
    let w = ExpData::binary(BinaryOp::Add, int("x"), int("y"));
    let step1 = Substitution::new()
        .with_var("v", int("v'"))
        .apply(&e, &fresh);
    let two_steps = Substitution::new()
        .with_var("v'", w.clone())
        .apply(&step1, &fresh);
    let direct = Substitution::new().with_var("v", w).apply(&e, &fresh);
    assert!(alpha_equivalent(&two_steps, &direct));
    assert!(two_steps.free_vars().contains("x"));
    assert!(!two_steps.free_vars().contains("v"));
}

#[test]
fn type_values_are_idempotent() {
    let mut env = GlobalEnv::new();
    let m = env.add_module(ModuleData::new("M", 0));
    env.module_mut(m).classes.push(ClassData {
        name: "Cell".to_string(),
        loc: Default::default(),
        type_params: vec!["T".to_string()],
        is_trait: false,
        parents: vec![],
        fuel: vec![],
    });
    let options = BoogieOptions::default();
    let vocab = Vocabulary::builtin().unwrap();
    let tr = BoogieTranslator::new(&env, &options, &vocab);
    let class = Type::class(m.qualified(ClassId(0)), vec![Type::seq(Type::Int)]);
    let types = vec![
        Type::Int,
        Type::set(Type::Bool),
        Type::map(Type::Int, Type::seq(Type::Char)),
        Type::arrow(vec![Type::Int], Type::Bool),
        class.clone(),
        Type::array(class),
    ];
    let identity = Substitution::new().with_types(BTreeMap::new());
    for ty in &types {
        let once = tr.type_to_ty(ty);
        let count = tr.program_len();
        assert_eq!(tr.type_to_ty(ty), once);
        assert_eq!(tr.type_to_ty(&identity.apply_type(ty)), once);
        // Type constructors are emitted once.
        assert_eq!(tr.program_len(), count);
    }
}
