// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Trigger synthesis for quantifiers without explicit trigger annotations.

use itertools::Itertools;
use std::collections::BTreeSet;
use veri_boogie_ir::{BExpr, BVar};

/// Functions that never make good triggers.
const EXCLUDED: &[&str] = &["Lit", "$Is", "$IsAlloc", "$IsBox", "$IsAllocBox", "$Box", "$Unbox"];

/// Whether a term may appear in a trigger: no interpreted operators below the root.
fn is_uninterpreted(e: &BExpr) -> bool {
    match e {
        BExpr::Bool(_) | BExpr::Int(_) | BExpr::Real(_) | BExpr::Bv { .. } | BExpr::Ident(_) => {
            true
        }
        BExpr::FunCall { args, .. } => args.iter().all(is_uninterpreted),
        BExpr::Select(m, idx) => is_uninterpreted(m) && idx.iter().all(is_uninterpreted),
        BExpr::Coerce(inner, _) => is_uninterpreted(inner),
        BExpr::Unary(..)
        | BExpr::Binary(..)
        | BExpr::Ite(..)
        | BExpr::Store(..)
        | BExpr::Quant { .. }
        | BExpr::Lambda { .. }
        | BExpr::Old(_) => false,
    }
}

fn mentioned(e: &BExpr, vars: &[BVar]) -> BTreeSet<String> {
    vars.iter()
        .filter(|v| e.mentions(&v.name))
        .map(|v| v.name.clone())
        .collect()
}

/// Collects candidate terms without entering nested binders.
fn collect(e: &BExpr, vars: &[BVar], out: &mut Vec<BExpr>) {
    let is_candidate = match e {
        BExpr::FunCall { name, .. } => !EXCLUDED.contains(&name.as_str()),
        BExpr::Select(..) => true,
        _ => false,
    };
    if is_candidate && is_uninterpreted(e) && !mentioned(e, vars).is_empty() && !out.contains(e) {
        out.push(e.clone())
    }
    match e {
        BExpr::Quant { .. } | BExpr::Lambda { .. } => {}
        BExpr::FunCall { args, .. } => args.iter().for_each(|a| collect(a, vars, out)),
        BExpr::Unary(_, x) | BExpr::Old(x) | BExpr::Coerce(x, _) => collect(x, vars, out),
        BExpr::Binary(_, l, r) => {
            collect(l, vars, out);
            collect(r, vars, out);
        }
        BExpr::Ite(c, t, f) => {
            collect(c, vars, out);
            collect(t, vars, out);
            collect(f, vars, out);
        }
        BExpr::Select(m, idx) => {
            collect(m, vars, out);
            idx.iter().for_each(|i| collect(i, vars, out));
        }
        BExpr::Store(m, idx, v) => {
            collect(m, vars, out);
            idx.iter().for_each(|i| collect(i, vars, out));
            collect(v, vars, out);
        }
        _ => {}
    }
}

/// Synthesizes triggers for a quantifier over `vars` with the given body. Prefers single
/// terms covering every bound variable, minimal with respect to the subterm order; falls back
/// to one multi-term trigger, or no trigger at all.
pub fn synthesize_triggers(vars: &[BVar], body: &BExpr) -> Vec<Vec<BExpr>> {
    if vars.is_empty() {
        return vec![];
    }
    let mut candidates = vec![];
    collect(body, vars, &mut candidates);
    let all = vars.iter().map(|v| v.name.clone()).collect::<BTreeSet<_>>();
    let covering: Vec<BExpr> = candidates
        .iter()
        .filter(|c| mentioned(c, vars) == all)
        .cloned()
        .collect_vec();
    if !covering.is_empty() {
        let is_minimal = |c: &BExpr| {
            !covering
                .iter()
                .any(|d| d != c && c.contains(&|s: &BExpr| s == d))
        };
        return covering
            .iter()
            .filter(|c| is_minimal(c))
            .map(|c| vec![c.clone()])
            .collect();
    }
    // Greedy cover by terms mentioning the most variables first.
    let mut sorted = candidates;
    sorted.sort_by_key(|c| std::cmp::Reverse(mentioned(c, vars).len()));
    let mut covered = BTreeSet::new();
    let mut trigger = vec![];
    for c in sorted {
        let m = mentioned(&c, vars);
        if !m.is_subset(&covered) {
            covered.extend(m);
            trigger.push(c);
        }
        if covered == all {
            return vec![trigger];
        }
    }
    vec![]
}
