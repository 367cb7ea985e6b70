// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Well-founded orders on decreases tuples.

use crate::boogie_backend::exp_translator::boogie_equal;
use veri_boogie_ir::{BBinOp, BExpr};
use veri_model::{
    ast::{Exp, ExpData},
    model::{CallableId, GlobalEnv},
    ty::Type,
};

/// The decreases tuple of a callable: the declared one, or its formals of ordered types.
pub fn callable_decreases(env: &GlobalEnv, callable: CallableId) -> Vec<Exp> {
    let (declared, formals) = match callable {
        CallableId::Function(qid) => {
            let f = env.function(qid);
            (&f.decreases, &f.formals)
        }
        CallableId::Method(qid) => {
            let m = env.method(qid);
            (&m.decreases, &m.ins)
        }
        CallableId::Iterator(qid) => {
            let it = env.iterator(qid);
            (&it.decreases, &it.ins)
        }
    };
    if !declared.is_empty() {
        return declared.clone();
    }
    formals
        .iter()
        .filter(|f| is_ordered(&f.ty))
        .map(|f| ExpData::local(&f.name, f.ty.clone()))
        .collect()
}

fn is_ordered(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Bool
            | Type::Char
            | Type::Int
            | Type::Real
            | Type::Set(_)
            | Type::ISet(_)
            | Type::MultiSet(_)
            | Type::Seq(_)
            | Type::Map(..)
            | Type::Datatype(..)
    )
}

/// Strict well-founded order on single components.
fn less(new: &BExpr, old: &BExpr, ty: &Type) -> BExpr {
    let (n, o) = (new.clone(), old.clone());
    match ty {
        Type::Int => BExpr::and(BExpr::le(BExpr::int(0), o.clone()), BExpr::lt(n, o)),
        Type::Bool => BExpr::and(BExpr::not(n), o),
        Type::Char => BExpr::lt(
            BExpr::call("char#ToInt", vec![n]),
            BExpr::call("char#ToInt", vec![o]),
        ),
        Type::Real => BExpr::and(
            BExpr::le(BExpr::Real("0.0".to_string()), o.clone()),
            BExpr::le(n, BExpr::binary(BBinOp::Sub, o, BExpr::Real("1.0".to_string()))),
        ),
        Type::Set(_) | Type::ISet(_) | Type::MultiSet(_) => {
            let prefix = match ty {
                Type::Set(_) => "Set",
                Type::ISet(_) => "ISet",
                _ => "MultiSet",
            };
            BExpr::and(
                BExpr::call(&format!("{}#Subset", prefix), vec![n.clone(), o.clone()]),
                BExpr::not(BExpr::call(&format!("{}#Equal", prefix), vec![n, o])),
            )
        }
        Type::Seq(_) => BExpr::lt(
            BExpr::call("Seq#Length", vec![n]),
            BExpr::call("Seq#Length", vec![o]),
        ),
        Type::Map(..) => {
            let dn = BExpr::call("Map#Domain", vec![n]);
            let d_o = BExpr::call("Map#Domain", vec![o]);
            BExpr::and(
                BExpr::call("Set#Subset", vec![dn.clone(), d_o.clone()]),
                BExpr::not(BExpr::call("Set#Equal", vec![dn, d_o])),
            )
        }
        Type::Datatype(..) => BExpr::lt(
            BExpr::call("DtRank", vec![n]),
            BExpr::call("DtRank", vec![o]),
        ),
        _ => BExpr::fals(),
    }
}

/// Lexicographic comparison of decreases tuples. Missing components stand for a top element
/// above every value: with an equal common prefix a longer new tuple is smaller, a shorter one
/// is not. With `allow_eq`, an equal tuple is accepted too.
pub fn decreases_less(new: &[(BExpr, Type)], old: &[(BExpr, Type)], allow_eq: bool) -> BExpr {
    let n = new.len().min(old.len());
    let mut disjuncts = vec![];
    let mut prefix_eq = BExpr::tru();
    for k in 0..n {
        let (nk, ty) = &new[k];
        let (ok, _) = &old[k];
        disjuncts.push(BExpr::and(prefix_eq.clone(), less(nk, ok, ty)));
        prefix_eq = BExpr::and(prefix_eq, boogie_equal(nk.clone(), ok.clone(), ty));
    }
    if new.len() > old.len() || (allow_eq && new.len() == old.len()) {
        disjuncts.push(prefix_eq);
    }
    BExpr::or_all(disjuncts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexicographic_tuples() {
        let tuple = |a: &str, b: &str| {
            vec![
                (BExpr::ident(a), Type::Int),
                (BExpr::ident(b), Type::seq(Type::Int)),
            ]
        };
        let strict = decreases_less(&tuple("n1", "s1"), &tuple("n0", "s0"), false);
        assert_eq!(
            strict.to_string(),
            "(((0 <= n0) && (n1 < n0)) || ((n1 == n0) && (Seq#Length(s1) < Seq#Length(s0))))"
        );
        let weak = decreases_less(&tuple("n1", "s1"), &tuple("n0", "s0"), true);
        assert!(weak.to_string().ends_with("|| ((n1 == n0) && Seq#Equal(s1, s0)))"));
    }

    #[test]
    fn missing_components_are_top() {
        let short = |x: &str| vec![(BExpr::ident(x), Type::Bool)];
        let long = |x: &str, y: &str| {
            vec![(BExpr::ident(x), Type::Bool), (BExpr::ident(y), Type::Int)]
        };
        // (a, top) is not below (b, c) unless the first component decreases.
        assert_eq!(decreases_less(&short("a"), &long("b", "c"), false).to_string(), "(!a && b)");
        assert_eq!(decreases_less(&short("a"), &long("b", "c"), true).to_string(), "(!a && b)");
        // (a, c) is below (b, top) as soon as the prefix is equal.
        assert_eq!(
            decreases_less(&long("a", "c"), &short("b"), false).to_string(),
            "((!a && b) || (a == b))"
        );
        // Unordered components never decrease.
        let refs = vec![(BExpr::ident("o"), Type::Object { nullable: false })];
        assert!(decreases_less(&refs, &refs, false).is_false());
    }
}
