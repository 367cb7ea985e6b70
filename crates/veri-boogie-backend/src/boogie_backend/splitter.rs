// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Splitting of proof obligations.
//!
//! A boolean expression is decomposed into parts that can be checked separately. In positive
//! position the conjunction of the parts is equivalent to the expression, in negative
//! position the disjunction. Calls of predicates with a visible body are inlined below the
//! inlining limit, and quantifiers carrying an induction hint are proved by induction.

use crate::boogie_backend::{
    boogie_helpers::{boogie_can_call_name, boogie_ctor_test_name, boogie_local_name},
    exp_translator::ExpTranslator,
    substitution::Substitution,
    termination::decreases_less,
};
use itertools::Itertools;
use log::debug;
use veri_boogie_ir::{BExpr, Token};
use veri_model::{
    ast::{BinaryOp, BoundVar, Exp, ExpData, ExpKind, InductionHint, QuantKind, UnaryOp},
    model::{CtorRef, FunId, QualifiedId},
    ty::Type,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitKind {
    /// Assumed only.
    Free,
    /// Checked only; the original expression is assumed afterwards.
    Checked,
    /// Checked and assumed.
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitExpr {
    pub kind: SplitKind,
    pub expr: BExpr,
    pub token: Token,
}

impl SplitExpr {
    pub fn is_checked(&self) -> bool {
        self.kind != SplitKind::Free
    }

    fn map(self, f: impl FnOnce(BExpr) -> BExpr) -> Self {
        Self {
            expr: f(self.expr),
            ..self
        }
    }
}

impl<'a> ExpTranslator<'a> {
    /// Splits `e`. Returns the parts and whether any decomposition happened; without one the
    /// single part is the plain translation.
    pub fn split(&self, e: &Exp, positive: bool, limit: usize) -> (Vec<SplitExpr>, bool) {
        let mut parts = vec![];
        let changed = self.split_into(e, positive, limit, None, &mut parts);
        (parts, changed)
    }

    fn leaf(&self, e: &Exp, related: &Option<Token>, parts: &mut Vec<SplitExpr>) {
        parts.push(SplitExpr {
            kind: SplitKind::Both,
            expr: self.trans(e),
            token: self.split_token(e, related),
        })
    }

    fn split_token(&self, e: &Exp, related: &Option<Token>) -> Token {
        let token = self.tr.token(&e.loc);
        match related {
            Some(site) => site.nested(token),
            None => token,
        }
    }

    fn split_into(
        &self,
        e: &Exp,
        positive: bool,
        limit: usize,
        related: Option<Token>,
        parts: &mut Vec<SplitExpr>,
    ) -> bool {
        match &e.kind {
            ExpKind::Binary { op, lhs, rhs } => match (op, positive) {
                (BinaryOp::And, true) | (BinaryOp::Or, false) => {
                    self.split_into(lhs, positive, limit, related.clone(), parts);
                    self.split_into(rhs, positive, limit, related, parts);
                    true
                }
                (BinaryOp::Or, true) => {
                    let l = self.trans(lhs);
                    let mut sub = vec![];
                    self.split_into(rhs, true, limit, related, &mut sub);
                    parts.extend(
                        sub.into_iter()
                            .map(|s| s.map(|x| BExpr::imp(BExpr::not(l.clone()), x))),
                    );
                    true
                }
                (BinaryOp::Imp, true) => {
                    let l = self.trans(lhs);
                    let mut sub = vec![];
                    self.split_into(rhs, true, limit, related, &mut sub);
                    parts.extend(sub.into_iter().map(|s| s.map(|x| BExpr::imp(l.clone(), x))));
                    true
                }
                (BinaryOp::Imp, false) => {
                    let mut sub = vec![];
                    self.split_into(lhs, true, limit, related.clone(), &mut sub);
                    parts.extend(sub.into_iter().map(|s| s.map(BExpr::not)));
                    self.split_into(rhs, false, limit, related, parts);
                    true
                }
                _ => {
                    self.leaf(e, &related, parts);
                    false
                }
            },
            ExpKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                let mut sub = vec![];
                let changed = self.split_into(operand, !positive, limit, related.clone(), &mut sub);
                if !changed {
                    self.leaf(e, &related, parts);
                    return false;
                }
                parts.extend(sub.into_iter().map(|s| s.map(BExpr::not)));
                true
            }
            ExpKind::Ite { cond, then, els } if e.ty == Type::Bool => {
                let c = self.trans(cond);
                let mut t = vec![];
                let mut f = vec![];
                self.split_into(then, positive, limit, related.clone(), &mut t);
                self.split_into(els, positive, limit, related, &mut f);
                let guard = |g: BExpr, x: BExpr| {
                    if positive {
                        BExpr::imp(g, x)
                    } else {
                        BExpr::and(g, x)
                    }
                };
                parts.extend(t.into_iter().map(|s| s.map(|x| guard(c.clone(), x))));
                parts.extend(f.into_iter().map(|s| s.map(|x| guard(BExpr::not(c.clone()), x))));
                true
            }
            ExpKind::Let { vars, rhss, body } => {
                let subst = Substitution::new().with_vars(
                    vars.iter()
                        .map(|v| v.name.clone())
                        .zip(rhss.iter().cloned()),
                );
                let body = subst.apply(body, &self.ctx.fresh);
                self.split_into(&body, positive, limit, related, parts);
                true
            }
            ExpKind::Quantifier {
                kind: QuantKind::Forall,
                vars,
                range,
                body,
                induction,
                ..
            } if positive => {
                if let (Some(hint), true) = (induction, self.tr.options.induction_enabled) {
                    if let Some(ivars) = self.induction_vars(e, vars, hint) {
                        self.split_induction(e, vars, range.as_ref(), body, &ivars, &related, parts);
                        return true;
                    }
                }
                self.split_quantifier(e, &related, parts);
                true
            }
            ExpKind::Quantifier {
                kind: QuantKind::Exists,
                ..
            } if !positive => {
                self.split_quantifier(e, &related, parts);
                true
            }
            ExpKind::FunctionCall {
                fun,
                receiver,
                type_args,
                args,
            } if positive && e.ty == Type::Bool => {
                if self.can_inline(*fun, limit) {
                    self.split_inlined(e, *fun, receiver.as_ref(), type_args, args, &related, parts);
                    true
                } else {
                    self.leaf(e, &related, parts);
                    false
                }
            }
            _ => {
                self.leaf(e, &related, parts);
                false
            }
        }
    }

    /// Checked at one more unfolding, assumed at the base layers.
    fn split_quantifier(&self, e: &Exp, related: &Option<Token>, parts: &mut Vec<SplitExpr>) {
        let token = self.split_token(e, related);
        parts.push(SplitExpr {
            kind: SplitKind::Checked,
            expr: self.with_layer_offset(1).trans(e),
            token: token.clone(),
        });
        parts.push(SplitExpr {
            kind: SplitKind::Free,
            expr: self.trans(e),
            token,
        });
    }

    fn can_inline(&self, fun: QualifiedId<FunId>, limit: usize) -> bool {
        let data = self.tr.env.function(fun);
        data.body.is_some()
            && (!data.is_opaque || fun.module_id == self.ctx.module_id)
            && data.call_info.height < limit
    }

    #[allow(clippy::too_many_arguments)]
    fn split_inlined(
        &self,
        e: &Exp,
        fun: QualifiedId<FunId>,
        receiver: Option<&Exp>,
        type_args: &[Type],
        args: &[Exp],
        related: &Option<Token>,
        parts: &mut Vec<SplitExpr>,
    ) {
        let data = self.tr.env.function(fun);
        let body = match &data.body {
            Some(b) => b,
            None => panic!("BUG: inlining a function without body"),
        };
        let mut subst = Substitution::new()
            .with_vars(
                data.formals
                    .iter()
                    .map(|f| f.name.clone())
                    .zip(args.iter().cloned()),
            )
            .with_types(ExpTranslator::type_instantiation(&data.type_params, type_args));
        if let Some(r) = receiver {
            subst = subst.with_receiver(r.clone());
        }
        let inlined = subst.apply(body, &self.ctx.fresh);
        debug!(
            "inlining {} at {:?}",
            data.name,
            self.tr.env.position(&e.loc)
        );
        let site = self.split_token(e, related);
        let call = self.trans(e);
        let can_call = BExpr::call(
            &boogie_can_call_name(self.tr.env, fun),
            self.call_args(fun, receiver, type_args, args, false),
        );
        let mut sub = vec![];
        self.split_into(
            &inlined,
            true,
            data.call_info.height,
            Some(site.clone()),
            &mut sub,
        );
        let conj = BExpr::and_all(
            sub.iter()
                .filter(|s| s.kind != SplitKind::Free)
                .map(|s| s.expr.clone()),
        );
        for s in sub {
            if s.is_checked() {
                parts.push(SplitExpr {
                    kind: SplitKind::Checked,
                    expr: BExpr::imp(can_call.clone(), BExpr::or(call.clone(), s.expr)),
                    token: s.token,
                })
            }
        }
        parts.push(SplitExpr {
            kind: SplitKind::Free,
            expr: BExpr::imp(can_call, BExpr::iff(call, conj)),
            token: site,
        });
    }

    fn induction_vars(&self, e: &Exp, vars: &[BoundVar], hint: &InductionHint) -> Option<Vec<BoundVar>> {
        let inductive = |ty: &Type| matches!(ty, Type::Int | Type::Seq(_) | Type::Datatype(..));
        match hint {
            InductionHint::All => {
                let ivars = vars.iter().filter(|v| inductive(&v.ty)).cloned().collect_vec();
                (!ivars.is_empty()).then_some(ivars)
            }
            InductionHint::Vars(names) => {
                let mut ivars = vec![];
                for name in names {
                    match vars.iter().find(|v| &v.name == name) {
                        Some(v) if inductive(&v.ty) => ivars.push(v.clone()),
                        Some(_) => {
                            self.tr.error(
                                &e.loc,
                                &format!(
                                    "induction variable `{}` has a type that does not support induction",
                                    name
                                ),
                            );
                            return None;
                        }
                        None => {
                            self.tr.error(
                                &e.loc,
                                &format!("`{}` is not a variable of the quantifier", name),
                            );
                            return None;
                        }
                    }
                }
                (!ivars.is_empty()).then_some(ivars)
            }
        }
    }

    /// One checked case per constructor of the first induction variable (a single case for
    /// integers and sequences), each assuming the induction hypothesis for smaller values.
    #[allow(clippy::too_many_arguments)]
    fn split_induction(
        &self,
        e: &Exp,
        vars: &[BoundVar],
        range: Option<&Exp>,
        body: &Exp,
        ivars: &[BoundVar],
        related: &Option<Token>,
        parts: &mut Vec<SplitExpr>,
    ) {
        let token = self.split_token(e, related);
        let inner = self.shadow(vars.iter().map(|v| &v.name));
        let bvars = ExpTranslator::bound_vars(vars);
        let typing = self.typing(vars);
        let range_t = range.map(|r| inner.trans(r)).unwrap_or_else(BExpr::tru);

        // The hypothesis over renamed copies of the bound variables.
        let renamed = vars
            .iter()
            .map(|v| BoundVar::new(&self.ctx.fresh.fresh(&format!("{}$ih", v.name)), v.ty.clone()))
            .collect_vec();
        let rename = Substitution::new().with_vars(
            vars.iter()
                .zip(&renamed)
                .map(|(v, r)| (v.name.clone(), ExpData::local(&r.name, r.ty.clone()))),
        );
        let ih_body = rename.apply(body, &self.ctx.fresh);
        let ih_range = range.map(|r| rename.apply(r, &self.ctx.fresh));
        let ih_inner = self
            .shadow(renamed.iter().map(|v| &v.name))
            .with_layer_offset(1);
        let tuple = |vs: &[BoundVar], names: &[String]| {
            vs.iter()
                .zip(names)
                .map(|(v, n)| (BExpr::ident(&boogie_local_name(n)), v.ty.clone()))
                .collect_vec()
        };
        let ih_names = ivars
            .iter()
            .map(|iv| {
                let pos = vars.iter().position(|v| v.name == iv.name).unwrap_or(0);
                renamed[pos].name.clone()
            })
            .collect_vec();
        let orig_names = ivars.iter().map(|v| v.name.clone()).collect_vec();
        let less = decreases_less(&tuple(ivars, &ih_names), &tuple(ivars, &orig_names), false);
        let ih_vars = ExpTranslator::bound_vars(&renamed);
        let ih = BExpr::forall(
            ih_vars,
            vec![],
            BExpr::imp(
                BExpr::and_all(vec![
                    self.typing(&renamed),
                    ih_range
                        .as_ref()
                        .map(|r| ih_inner.trans(r))
                        .unwrap_or_else(BExpr::tru),
                    less,
                ]),
                ih_inner.trans(&ih_body),
            ),
        );

        let body_t = inner.with_layer_offset(1).trans(body);
        let case = |extra: BExpr| {
            let formula = BExpr::imp(
                BExpr::and_all(vec![typing.clone(), range_t.clone(), extra, ih.clone()]),
                body_t.clone(),
            );
            BExpr::forall(bvars.clone(), vec![], formula)
        };
        let first = &ivars[0];
        match &first.ty {
            Type::Datatype(qid, _) => {
                let dt = self.tr.env.datatype(*qid);
                let x = BExpr::ident(&boogie_local_name(&first.name));
                for index in 0..dt.ctors.len() {
                    let ctor = CtorRef {
                        datatype: *qid,
                        index,
                    };
                    parts.push(SplitExpr {
                        kind: SplitKind::Checked,
                        expr: case(BExpr::call(
                            &boogie_ctor_test_name(self.tr.env, ctor),
                            vec![x.clone()],
                        )),
                        token: token.clone(),
                    })
                }
            }
            _ => parts.push(SplitExpr {
                kind: SplitKind::Checked,
                expr: case(BExpr::tru()),
                token: token.clone(),
            }),
        }
        parts.push(SplitExpr {
            kind: SplitKind::Free,
            expr: self.trans(e),
            token,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boogie_backend::{
        decl_translator::BoogieTranslator, options::BoogieOptions, vocabulary::Vocabulary,
    };
    use veri_model::model::{
        CtorData, DatatypeData, DatatypeId, Formal, FunctionData, GlobalEnv, ModuleData, ModuleId,
    };

    fn with_env(
        options: BoogieOptions,
        setup: impl FnOnce(&mut GlobalEnv, ModuleId),
        f: impl FnOnce(&ExpTranslator, ModuleId),
    ) {
        let mut env = GlobalEnv::new();
        let m = env.add_module(ModuleData::new("M", 0));
        setup(&mut env, m);
        let vocab = Vocabulary::builtin().unwrap();
        let tr = BoogieTranslator::new(&env, &options, &vocab);
        let ctx = tr.new_context(m, None);
        let et = ExpTranslator::new(&tr, &ctx, BExpr::ident("$Heap"));
        f(&et, m)
    }

    fn with_translator(f: impl FnOnce(&ExpTranslator)) {
        with_env(BoogieOptions::default(), |_, _| {}, |et, _| f(et))
    }

    fn int(name: &str) -> Exp {
        ExpData::local(name, Type::Int)
    }

    fn forall(var: BoundVar, body: Exp, induction: Option<InductionHint>) -> Exp {
        ExpData::new(
            ExpKind::Quantifier {
                kind: QuantKind::Forall,
                vars: vec![var],
                range: None,
                body,
                triggers: vec![],
                induction,
            },
            Type::Bool,
            Default::default(),
        )
    }

    fn kinds(parts: &[SplitExpr]) -> Vec<SplitKind> {
        parts.iter().map(|p| p.kind).collect()
    }

    fn var(name: &str) -> Exp {
        ExpData::local(name, Type::Bool)
    }

    #[test]
    fn conjunctions_and_implications_split() {
        with_translator(|et| {
            let e = ExpData::and(var("a"), ExpData::implies(var("b"), ExpData::and(var("c"), var("d"))));
            let (parts, changed) = et.split(&e, true, 0);
            assert!(changed);
            let texts = parts.iter().map(|p| p.expr.to_string()).collect_vec();
            assert_eq!(texts, vec!["a#0", "(b#0 ==> c#0)", "(b#0 ==> d#0)"]);
            assert!(parts.iter().all(|p| p.kind == SplitKind::Both));
        });
    }

    #[test]
    fn atoms_do_not_split() {
        with_translator(|et| {
            let (parts, changed) = et.split(&var("a"), true, 0);
            assert!(!changed);
            assert_eq!(parts.len(), 1);
            // A conjunction in negative position stays whole.
            let (parts, changed) = et.split(&ExpData::and(var("a"), var("b")), false, 0);
            assert!(!changed);
            assert_eq!(parts[0].expr.to_string(), "(a#0 && b#0)");
        });
    }

    #[test]
    fn negation_flips_polarity() {
        with_translator(|et| {
            let e = ExpData::not(ExpData::or(var("a"), var("b")));
            let (parts, changed) = et.split(&e, true, 0);
            assert!(changed);
            let texts = parts.iter().map(|p| p.expr.to_string()).collect_vec();
            assert_eq!(texts, vec!["!a#0", "!b#0"]);
        });
    }

    #[test]
    fn predicates_are_inlined_below_the_limit() {
        // predicate small(x: int) { 0 < x && x < 10 }
        let setup = |env: &mut GlobalEnv, m: ModuleId| {
            let mut data = FunctionData::new("small", vec![Formal::new("x", Type::Int)], Type::Bool);
            data.body = Some(ExpData::and(
                ExpData::binary(BinaryOp::Lt, ExpData::int_const(0), int("x")),
                ExpData::binary(BinaryOp::Lt, int("x"), ExpData::int_const(10)),
            ));
            env.module_mut(m).functions.push(data);
        };
        with_env(BoogieOptions::default(), setup, |et, m| {
            let call = ExpData::call(m.qualified(FunId(0)), vec![int("y")], Type::Bool);
            let (parts, changed) = et.split(&call, true, 1);
            assert!(changed);
            assert_eq!(
                kinds(&parts),
                vec![SplitKind::Checked, SplitKind::Checked, SplitKind::Free]
            );
            for part in &parts[..2] {
                let text = part.expr.to_string();
                assert!(text.starts_with("(M.small#canCall(y#0) ==> (M.small(y#0) || "), "{}", text);
                // Reported at the conjunct, related to the call site.
                assert!(part.token.related.is_some());
            }
            // At the limit the call stays whole.
            let (parts, changed) = et.split(&call, true, 0);
            assert!(!changed);
            assert_eq!(kinds(&parts), vec![SplitKind::Both]);
        });
    }

    #[test]
    fn quantifiers_are_checked_one_layer_up() {
        // function f(n: int): int, recursive
        let setup = |env: &mut GlobalEnv, m: ModuleId| {
            let mut data = FunctionData::new("f", vec![Formal::new("n", Type::Int)], Type::Int);
            data.call_info.is_recursive = true;
            env.module_mut(m).functions.push(data);
        };
        with_env(BoogieOptions::default(), setup, |et, m| {
            let call = ExpData::call(m.qualified(FunId(0)), vec![int("n")], Type::Int);
            let e = forall(
                BoundVar::new("n", Type::Int),
                ExpData::binary(BinaryOp::Le, ExpData::int_const(0), call),
                None,
            );
            let (parts, changed) = et.split(&e, true, 0);
            assert!(changed);
            assert_eq!(kinds(&parts), vec![SplitKind::Checked, SplitKind::Free]);
            assert!(parts[0].expr.to_string().contains("M.f($LS(StartFuel_M.f), n#0)"));
            assert!(parts[1].expr.to_string().contains("M.f(StartFuel_M.f, n#0)"));
            // Existentials split only in negative position.
            let exists = ExpData::new(
                ExpKind::Quantifier {
                    kind: QuantKind::Exists,
                    vars: vec![BoundVar::new("n", Type::Int)],
                    range: None,
                    body: ExpData::eq(int("n"), ExpData::int_const(0)),
                    triggers: vec![],
                    induction: None,
                },
                Type::Bool,
                Default::default(),
            );
            assert_eq!(kinds(&et.split(&exists, true, 0).0), vec![SplitKind::Both]);
            assert_eq!(
                kinds(&et.split(&exists, false, 0).0),
                vec![SplitKind::Checked, SplitKind::Free]
            );
        });
    }

    #[test]
    fn induction_on_integers_assumes_smaller_instances() {
        let options = BoogieOptions {
            induction_enabled: true,
            ..BoogieOptions::default()
        };
        with_env(options, |_, _| {}, |et, _| {
            let e = forall(
                BoundVar::new("n", Type::Int),
                ExpData::binary(
                    BinaryOp::Le,
                    ExpData::int_const(0),
                    ExpData::binary(BinaryOp::Mul, int("n"), int("n")),
                ),
                Some(InductionHint::All),
            );
            let (parts, changed) = et.split(&e, true, 0);
            assert!(changed);
            assert_eq!(kinds(&parts), vec![SplitKind::Checked, SplitKind::Free]);
            let case = parts[0].expr.to_string();
            assert!(case.starts_with("(forall n#0: int ::"), "{}", case);
            assert!(case.contains("(forall n$ih#"), "{}", case);
        });
        // Without the option the quantifier splits plainly.
        with_translator(|et| {
            let e = forall(
                BoundVar::new("n", Type::Int),
                ExpData::binary(BinaryOp::Le, ExpData::int_const(0), int("n")),
                Some(InductionHint::All),
            );
            let (parts, _) = et.split(&e, true, 0);
            assert!(!parts[0].expr.to_string().contains("$ih#"));
        });
    }

    #[test]
    fn induction_on_datatypes_checks_each_constructor() {
        // datatype Nat = Zero | Succ(pred: Nat)
        let options = BoogieOptions {
            induction_enabled: true,
            ..BoogieOptions::default()
        };
        let setup = |env: &mut GlobalEnv, m: ModuleId| {
            let nat = Type::Datatype(m.qualified(DatatypeId(0)), vec![]);
            env.module_mut(m).datatypes.push(DatatypeData {
                name: "Nat".to_string(),
                loc: Default::default(),
                type_params: vec![],
                ctors: vec![
                    CtorData {
                        name: "Zero".to_string(),
                        loc: Default::default(),
                        formals: vec![],
                    },
                    CtorData {
                        name: "Succ".to_string(),
                        loc: Default::default(),
                        formals: vec![Formal::new("pred", nat)],
                    },
                ],
                is_codatatype: false,
            });
        };
        with_env(options, setup, |et, m| {
            let nat = Type::Datatype(m.qualified(DatatypeId(0)), vec![]);
            let e = forall(
                BoundVar::new("x", nat),
                ExpData::bool_const(true),
                Some(InductionHint::Vars(vec!["x".to_string()])),
            );
            let (parts, _) = et.split(&e, true, 0);
            assert_eq!(
                kinds(&parts),
                vec![SplitKind::Checked, SplitKind::Checked, SplitKind::Free]
            );
            for (index, part) in parts[..2].iter().enumerate() {
                let ctor = CtorRef {
                    datatype: m.qualified(DatatypeId(0)),
                    index,
                };
                let test = format!("{}(x#0)", boogie_ctor_test_name(et.tr.env, ctor));
                assert!(part.expr.to_string().contains(&test));
            }
        });
    }

    #[test]
    fn unknown_induction_variables_are_reported() {
        let options = BoogieOptions {
            induction_enabled: true,
            ..BoogieOptions::default()
        };
        with_env(options, |_, _| {}, |et, _| {
            let e = forall(
                BoundVar::new("n", Type::Int),
                ExpData::binary(BinaryOp::Le, ExpData::int_const(0), int("n")),
                Some(InductionHint::Vars(vec!["k".to_string()])),
            );
            let (parts, _) = et.split(&e, true, 0);
            assert_eq!(kinds(&parts), vec![SplitKind::Checked, SplitKind::Free]);
            assert!(et.tr.env.has_errors());
        });
    }
}
