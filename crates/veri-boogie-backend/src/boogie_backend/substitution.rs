// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Capture-avoiding substitution on source expressions.
//!
//! A substitution replaces free local variables, the implicit receiver and type parameters.
//! Binders whose name occurs free in the replacement terms are renamed to fresh names for
//! their scope; other binders shadow the mapping. The renaming variant renames every binder.

use crate::boogie_backend::context::FreshIdGenerator;
use std::collections::{BTreeMap, BTreeSet};
use veri_model::{
    ast::{BoundVar, Exp, ExpData, ExpKind, FrameExp, MatchCase},
    ty::Type,
};

#[derive(Debug, Clone, Default)]
pub struct Substitution {
    vars: im::OrdMap<String, Exp>,
    receiver: Option<Exp>,
    types: BTreeMap<String, Type>,
    rename_all: bool,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, name: &str, exp: Exp) -> Self {
        self.vars.insert(name.to_string(), exp);
        self
    }

    pub fn with_vars(mut self, vars: impl IntoIterator<Item = (String, Exp)>) -> Self {
        self.vars.extend(vars);
        self
    }

    pub fn with_receiver(mut self, receiver: Exp) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn with_types(mut self, types: BTreeMap<String, Type>) -> Self {
        self.types = types;
        self
    }

    /// Renames every binder, even when there is no capture.
    pub fn renaming(mut self) -> Self {
        self.rename_all = true;
        self
    }

    pub fn is_identity(&self) -> bool {
        self.vars.is_empty() && self.receiver.is_none() && self.types.is_empty() && !self.rename_all
    }

    /// Applies the substitution, drawing binder names `v$s#n` from `fresh`.
    pub fn apply(&self, exp: &Exp, fresh: &FreshIdGenerator) -> Exp {
        self.apply_with(exp, &mut |name| fresh.fresh(&format!("{}$s", base_name(name))))
    }

    /// Applies the substitution with a custom binder namer.
    pub fn apply_with(&self, exp: &Exp, namer: &mut dyn FnMut(&str) -> String) -> Exp {
        if self.is_identity() {
            return exp.clone();
        }
        let mut avoid = BTreeSet::new();
        for e in self.vars.values().chain(self.receiver.iter()) {
            avoid.extend(e.free_vars());
        }
        let mut run = Run {
            subst: self,
            avoid,
            namer,
        };
        run.exp(exp, &self.vars)
    }

    pub fn apply_frames(&self, frames: &[FrameExp], fresh: &FreshIdGenerator) -> Vec<FrameExp> {
        frames
            .iter()
            .map(|f| FrameExp {
                exp: self.apply(&f.exp, fresh),
                field: f.field,
            })
            .collect()
    }

    pub fn apply_type(&self, ty: &Type) -> Type {
        ty.instantiate(&self.types)
    }
}

/// The name a generated binder name was derived from.
fn base_name(name: &str) -> &str {
    match name.find("$s#") {
        Some(pos) => &name[..pos],
        None => name,
    }
}

struct Run<'a, 'b> {
    subst: &'a Substitution,
    /// Free variables of the replacement terms.
    avoid: BTreeSet<String>,
    namer: &'b mut dyn FnMut(&str) -> String,
}

type VarMap = im::OrdMap<String, Exp>;

impl<'a, 'b> Run<'a, 'b> {
    fn ty(&self, ty: &Type) -> Type {
        ty.instantiate(&self.subst.types)
    }

    /// Introduces binders, returning the renamed binders and the map for their scope.
    fn bind(&mut self, vars: &[BoundVar], map: &VarMap) -> (Vec<BoundVar>, VarMap) {
        let mut map = map.clone();
        let mut result = vec![];
        for v in vars {
            let ty = self.ty(&v.ty);
            if self.subst.rename_all || self.avoid.contains(&v.name) {
                let new_name = (self.namer)(&v.name);
                map.insert(v.name.clone(), ExpData::local(&new_name, ty.clone()));
                result.push(BoundVar::new(&new_name, ty));
            } else {
                map.remove(&v.name);
                result.push(BoundVar::new(&v.name, ty));
            }
        }
        (result, map)
    }

    fn exps(&mut self, exps: &[Exp], map: &VarMap) -> Vec<Exp> {
        exps.iter().map(|e| self.exp(e, map)).collect()
    }

    fn opt(&mut self, exp: &Option<Exp>, map: &VarMap) -> Option<Exp> {
        exp.as_ref().map(|e| self.exp(e, map))
    }

    fn frames(&mut self, frames: &[FrameExp], map: &VarMap) -> Vec<FrameExp> {
        frames
            .iter()
            .map(|f| FrameExp {
                exp: self.exp(&f.exp, map),
                field: f.field,
            })
            .collect()
    }

    fn exp(&mut self, exp: &Exp, map: &VarMap) -> Exp {
        use ExpKind::*;
        let kind = match &exp.kind {
            LocalVar(name) => match map.get(name) {
                Some(e) => return e.at(exp.loc),
                None => LocalVar(name.clone()),
            },
            This => match &self.subst.receiver {
                Some(e) => return e.at(exp.loc),
                None => This,
            },
            Value(v) => Value(v.clone()),
            FieldSelect { obj, field } => FieldSelect {
                obj: self.exp(obj, map),
                field: *field,
            },
            Destructor { obj, ctor, index } => Destructor {
                obj: self.exp(obj, map),
                ctor: *ctor,
                index: *index,
            },
            ArrayLength { array, dim } => ArrayLength {
                array: self.exp(array, map),
                dim: *dim,
            },
            Select { collection, index } => Select {
                collection: self.exp(collection, map),
                index: self.exp(index, map),
            },
            ArraySelect { array, indices } => ArraySelect {
                array: self.exp(array, map),
                indices: self.exps(indices, map),
            },
            SeqSlice { seq, lo, hi } => SeqSlice {
                seq: self.exp(seq, map),
                lo: self.opt(lo, map),
                hi: self.opt(hi, map),
            },
            Update {
                collection,
                index,
                value,
            } => Update {
                collection: self.exp(collection, map),
                index: self.exp(index, map),
                value: self.exp(value, map),
            },
            SetDisplay(es) => SetDisplay(self.exps(es, map)),
            MultiSetDisplay(es) => MultiSetDisplay(self.exps(es, map)),
            SeqDisplay(es) => SeqDisplay(self.exps(es, map)),
            MapDisplay(pairs) => MapDisplay(
                pairs
                    .iter()
                    .map(|(k, v)| (self.exp(k, map), self.exp(v, map)))
                    .collect(),
            ),
            FunctionCall {
                fun,
                receiver,
                type_args,
                args,
            } => FunctionCall {
                fun: *fun,
                receiver: self.opt(receiver, map),
                type_args: type_args.iter().map(|t| self.ty(t)).collect(),
                args: self.exps(args, map),
            },
            Apply { fun, args } => Apply {
                fun: self.exp(fun, map),
                args: self.exps(args, map),
            },
            DatatypeValue {
                ctor,
                type_args,
                args,
            } => DatatypeValue {
                ctor: *ctor,
                type_args: type_args.iter().map(|t| self.ty(t)).collect(),
                args: self.exps(args, map),
            },
            DatatypeTest { obj, ctor } => DatatypeTest {
                obj: self.exp(obj, map),
                ctor: *ctor,
            },
            Old(e) => Old(self.exp(e, map)),
            Fresh(e) => Fresh(self.exp(e, map)),
            Allocated(e) => Allocated(self.exp(e, map)),
            Unary { op, operand } => Unary {
                op: *op,
                operand: self.exp(operand, map),
            },
            Conversion(e) => Conversion(self.exp(e, map)),
            Binary { op, lhs, rhs } => Binary {
                op: *op,
                lhs: self.exp(lhs, map),
                rhs: self.exp(rhs, map),
            },
            Ite { cond, then, els } => Ite {
                cond: self.exp(cond, map),
                then: self.exp(then, map),
                els: self.exp(els, map),
            },
            Let { vars, rhss, body } => {
                let rhss = self.exps(rhss, map);
                let (vars, inner) = self.bind(vars, map);
                Let {
                    vars,
                    rhss,
                    body: self.exp(body, &inner),
                }
            }
            Quantifier {
                kind,
                vars,
                range,
                body,
                triggers,
                induction,
            } => {
                let (new_vars, inner) = self.bind(vars, map);
                Quantifier {
                    kind: *kind,
                    range: self.opt(range, &inner),
                    body: self.exp(body, &inner),
                    triggers: triggers.iter().map(|t| self.exps(t, &inner)).collect(),
                    induction: induction.clone().map(|hint| rename_hint(hint, vars, &new_vars)),
                    vars: new_vars,
                }
            }
            SetComprehension {
                finite,
                vars,
                range,
                term,
            } => {
                let (vars, inner) = self.bind(vars, map);
                SetComprehension {
                    finite: *finite,
                    vars,
                    range: self.exp(range, &inner),
                    term: self.opt(term, &inner),
                }
            }
            MapComprehension {
                finite,
                var,
                range,
                term,
            } => {
                let (mut vars, inner) = self.bind(std::slice::from_ref(var), map);
                MapComprehension {
                    finite: *finite,
                    var: vars.remove(0),
                    range: self.exp(range, &inner),
                    term: self.exp(term, &inner),
                }
            }
            Lambda {
                vars,
                requires,
                reads,
                body,
            } => {
                let (vars, inner) = self.bind(vars, map);
                Lambda {
                    vars,
                    requires: self.opt(requires, &inner),
                    reads: self.frames(reads, &inner),
                    body: self.exp(body, &inner),
                }
            }
            Match { source, cases } => Match {
                source: self.exp(source, map),
                cases: cases
                    .iter()
                    .map(|case| {
                        let (vars, inner) = self.bind(&case.vars, map);
                        MatchCase {
                            ctor: case.ctor,
                            vars,
                            body: self.exp(&case.body, &inner),
                        }
                    })
                    .collect(),
            },
        };
        ExpData::new(kind, self.ty(&exp.ty), exp.loc)
    }
}

fn rename_hint(
    hint: veri_model::ast::InductionHint,
    old: &[BoundVar],
    new: &[BoundVar],
) -> veri_model::ast::InductionHint {
    use veri_model::ast::InductionHint;
    match hint {
        InductionHint::All => InductionHint::All,
        InductionHint::Vars(names) => InductionHint::Vars(
            names
                .into_iter()
                .map(|n| {
                    old.iter()
                        .position(|v| v.name == n)
                        .map(|i| new[i].name.clone())
                        .unwrap_or(n)
                })
                .collect(),
        ),
    }
}

/// Whether two expressions are equal up to the names of bound variables.
pub fn alpha_equivalent(a: &Exp, b: &Exp) -> bool {
    let canonical = |e: &Exp| {
        let mut counter = 0;
        Substitution::new()
            .renaming()
            .apply_with(e, &mut |_| {
                counter += 1;
                format!("$a#{}", counter)
            })
    };
    canonical(a) == canonical(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use veri_model::ast::BinaryOp;

    fn int(name: &str) -> Exp {
        ExpData::local(name, Type::Int)
    }

    #[test]
    fn binders_shadow_the_mapping() {
        // (forall x :: x < y)[x := 1] leaves the bound x alone.
        let q = ExpData::forall(
            vec![BoundVar::new("x", Type::Int)],
            None,
            ExpData::binary(BinaryOp::Lt, int("x"), int("y")),
        );
        let fresh = FreshIdGenerator::new();
        let result = Substitution::new()
            .with_var("x", ExpData::int_const(1))
            .apply(&q, &fresh);
        assert_eq!(result, q);
    }

    #[test]
    fn capture_is_avoided() {
        // (forall x :: x < y)[y := x] renames the bound x.
        let q = ExpData::forall(
            vec![BoundVar::new("x", Type::Int)],
            None,
            ExpData::binary(BinaryOp::Lt, int("x"), int("y")),
        );
        let fresh = FreshIdGenerator::new();
        let result = Substitution::new().with_var("y", int("x")).apply(&q, &fresh);
        assert!(result.free_vars().contains("x"));
        match &result.kind {
            ExpKind::Quantifier { vars, .. } => assert_eq!(vars[0].name, "x$s#0"),
            _ => panic!("expected quantifier"),
        }
    }

    #[test]
    fn types_and_receiver_are_replaced() {
        let this = ExpData::this(Type::type_param("T"));
        let fresh = FreshIdGenerator::new();
        let mut types = BTreeMap::new();
        types.insert("T".to_string(), Type::Int);
        let result = Substitution::new()
            .with_receiver(int("r"))
            .with_types(types)
            .apply(&ExpData::eq(this.clone(), int("z")), &fresh);
        assert_eq!(result.free_vars().into_iter().collect::<Vec<_>>(), vec!["r", "z"]);
        assert!(!result.mentions_this());
    }

    #[test]
    fn renaming_keeps_alpha_equivalence() {
        let q = ExpData::forall(
            vec![BoundVar::new("x", Type::Int)],
            None,
            ExpData::binary(BinaryOp::Lt, int("x"), int("y")),
        );
        let fresh = FreshIdGenerator::new();
        let renamed = Substitution::new().renaming().apply(&q, &fresh);
        assert_ne!(renamed, q);
        assert!(alpha_equivalent(&renamed, &q));
    }
}
