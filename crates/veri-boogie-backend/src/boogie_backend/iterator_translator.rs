// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Translation of iterators.
//!
//! An iterator yields `CheckWellformed$$` for its specification and, with a body, `Impl$$`
//! checking the body. Yield parameters and their histories are out-parameters of the
//! implementation; the histories start empty. Each `yield` extends the histories, checks the
//! yield-ensures clauses, lets the caller change everything outside the reads frame and
//! assumes the yield-requires clauses of the next step. `old` refers to the start of the
//! current step, kept in `$_OldIterHeap`.

use crate::boogie_backend::{
    boogie_helpers::{
        boogie_iterator_impl_proc_name, boogie_iterator_name, boogie_local_name,
        boogie_type_param_vars, boogie_wf_proc_name, context_heights_equal, frame_type,
        heap_succ, heap_type, is_good_heap, FRAME, HEAP, OLD_ITER_HEAP,
    },
    decl_translator::BoogieTranslator,
    exp_translator::ExpTranslator,
    fuel::FuelMode,
    stmt_translator::StmtTranslator,
    termination::callable_decreases,
    type_encoder::{box_value, boogie_type},
    wellformedness::WfChecker,
};
use itertools::Itertools;
use veri_boogie_ir::{BExpr, BVar, Cmd, Contract, Decl, Implementation, Procedure, TypedIdent};
use veri_model::{
    ast::{ExpData, Rhs, SpecExp, Stmt},
    model::{CallableId, IteratorData, IteratorId, Loc, QualifiedId},
};

impl<'env> BoogieTranslator<'env> {
    pub(crate) fn translate_iterator(&self, qid: QualifiedId<IteratorId>) {
        let data = self.env.iterator(qid);
        self.emit(Decl::Comment(format!(
            "iterator {}",
            boogie_iterator_name(self.env, qid)
        )));
        self.emit_iterator_wf(qid);
        if let Some(body) = &data.body {
            self.emit_iterator_impl(qid, body);
        }
    }

    /// In-parameters with typing and allocatedness, and yield parameters followed by their
    /// histories.
    fn iterator_params(&self, data: &IteratorData) -> (Vec<TypedIdent>, Vec<TypedIdent>) {
        let heap = BExpr::ident(HEAP);
        let mut ins = boogie_type_param_vars(&data.type_params)
            .into_iter()
            .map(|v| TypedIdent::new(&v.name, v.ty))
            .collect_vec();
        for f in &data.ins {
            let name = boogie_local_name(&f.name);
            let v = BExpr::ident(&name);
            ins.push(
                TypedIdent::new(&name, boogie_type(&f.ty)).with_where(BExpr::and(
                    self.type_is(v.clone(), &f.ty),
                    self.type_is_alloc(v, &f.ty, heap.clone()),
                )),
            );
        }
        let outs = data
            .outs
            .iter()
            .chain(&data.histories())
            .map(|f| {
                let name = boogie_local_name(&f.name);
                TypedIdent::new(&name, boogie_type(&f.ty))
                    .with_where(self.type_is(BExpr::ident(&name), &f.ty))
            })
            .collect_vec();
        (ins, outs)
    }

    /// Starts a step in an arbitrary successor of the current heap.
    fn havoc_step(&self, cmds: &mut Vec<Cmd>) {
        let heap = BExpr::ident(HEAP);
        cmds.push(Cmd::assign(OLD_ITER_HEAP, heap.clone()));
        cmds.push(Cmd::havoc(HEAP));
        cmds.push(Cmd::Assume(is_good_heap(heap.clone())));
        cmds.push(Cmd::Assume(heap_succ(BExpr::ident(OLD_ITER_HEAP), heap.clone())));
        cmds.push(Cmd::assign(OLD_ITER_HEAP, heap));
    }

    /// `CheckWellformed$$`: the clauses are defined in the states they are evaluated in.
    fn emit_iterator_wf(&self, qid: QualifiedId<IteratorId>) {
        let env = self.env;
        let data = env.iterator(qid);
        let callable = CallableId::Iterator(qid);
        self.with_context(self.new_context(qid.module_id, Some(callable)), |ctx| {
            let pushed = self.push_member_fuel_scopes(ctx, qid.module_id, None, &data.fuel);
            let et = ExpTranslator::new(self, ctx, BExpr::ident(HEAP))
                .with_old_heap(BExpr::old(BExpr::ident(HEAP)))
                .with_mode(FuelMode::Assert);
            let wf = WfChecker::new(et.clone());
            let mut cmds = vec![];
            for pre in &data.requires {
                wf.check_and_assume(&pre.exp, &mut cmds);
            }
            wf.check_frames(&data.reads, &mut cmds);
            wf.check_frames(&data.modifies, &mut cmds);
            wf.check_all(&data.decreases, &mut cmds);

            // Some step with arbitrary histories.
            ctx.add_local_var(OLD_ITER_HEAP, heap_type());
            self.havoc_step(&mut cmds);
            let histories = data
                .histories()
                .iter()
                .map(|h| boogie_local_name(&h.name))
                .collect_vec();
            if !histories.is_empty() {
                cmds.push(Cmd::Havoc(histories));
            }
            let step = WfChecker::new(et.with_old_heap(BExpr::ident(OLD_ITER_HEAP)));
            for pre in &data.yield_requires {
                step.check_and_assume(&pre.exp, &mut cmds);
            }

            // The step ends in a state changed within the modifies frame.
            let pre_heap = "$PreStepHeap";
            ctx.add_local_var(pre_heap, heap_type());
            cmds.push(Cmd::assign(pre_heap, BExpr::ident(HEAP)));
            cmds.push(Cmd::havoc(HEAP));
            cmds.push(Cmd::Assume(is_good_heap(BExpr::ident(HEAP))));
            cmds.push(Cmd::Assume(heap_succ(BExpr::ident(pre_heap), BExpr::ident(HEAP))));
            let at_pre = et.with_heap(BExpr::ident(pre_heap));
            cmds.push(Cmd::Assume(et.heap_frame_fact(BExpr::ident(pre_heap), |o, f| {
                at_pre.in_frame(&data.modifies, o, Some(f))
            })));
            let outs = data
                .outs
                .iter()
                .map(|f| boogie_local_name(&f.name))
                .collect_vec();
            if !outs.is_empty() {
                cmds.push(Cmd::Havoc(outs));
            }
            for post in data.yield_ensures.iter().chain(&data.ensures) {
                step.check_and_assume(&post.exp, &mut cmds);
            }

            let mut body = ctx.fuel_prologue(env);
            body.extend(cmds);
            let (ins, outs) = self.iterator_params(data);
            let name = boogie_wf_proc_name(env, callable);
            self.emit(Decl::Procedure(Procedure {
                name: name.clone(),
                type_vars: vec![],
                ins: ins.clone(),
                outs: outs.clone(),
                requires: vec![
                    Contract::free(is_good_heap(BExpr::ident(HEAP))),
                    Contract::free(context_heights_equal(
                        env.module(qid.module_id).height,
                        data.call_info.height,
                    )),
                ],
                modifies: vec![HEAP.to_string()],
                ensures: vec![],
            }));
            self.emit(Decl::Implementation(Implementation {
                proc_name: name,
                type_vars: vec![],
                ins: ins.into_iter().map(|t| BVar::new(&t.name, t.ty)).collect(),
                outs: outs.into_iter().map(|t| BVar::new(&t.name, t.ty)).collect(),
                locals: ctx.take_locals(),
                body,
            }));
            for _ in 0..pushed {
                ctx.pop_fuel_scope()
            }
        })
    }

    /// `Impl$$`: the body, with the ensures clauses checked when it completes.
    fn emit_iterator_impl(&self, qid: QualifiedId<IteratorId>, body: &Stmt) {
        let env = self.env;
        let data = env.iterator(qid);
        let callable = CallableId::Iterator(qid);
        self.with_context(self.new_context(qid.module_id, Some(callable)), |ctx| {
            let pushed = self.push_member_fuel_scopes(ctx, qid.module_id, None, &data.fuel);
            let et = ExpTranslator::new(self, ctx, BExpr::ident(HEAP))
                .with_old_heap(BExpr::ident(OLD_ITER_HEAP));
            ctx.add_local_var(FRAME, frame_type());
            ctx.add_local_var(OLD_ITER_HEAP, heap_type());
            let mut cmds = vec![
                Cmd::assign(FRAME, et.frame_lambda(&data.modifies)),
                Cmd::assign(OLD_ITER_HEAP, BExpr::ident(HEAP)),
            ];
            for h in data.histories() {
                cmds.push(Cmd::assign(
                    &boogie_local_name(&h.name),
                    BExpr::call("Seq#Empty", vec![]),
                ));
            }
            let mut decreases = vec![];
            for (k, d) in callable_decreases(env, callable).iter().enumerate() {
                let name = format!("$decr$init#{}", k);
                ctx.add_local_var(&name, boogie_type(&d.ty));
                cmds.push(Cmd::assign(&name, et.trans(d)));
                decreases.push((BExpr::ident(&name), d.ty.clone()));
            }
            let wf = WfChecker::new(et.clone()).with_callable(callable, decreases);
            let st = StmtTranslator::new(wf, callable);
            st.trans_stmt(body, &mut cmds);
            st.check_iterator_ensures(qid, &mut cmds);

            let mut prologue = ctx.fuel_prologue(env);
            prologue.extend(cmds);
            let (ins, outs) = self.iterator_params(data);
            let name = boogie_iterator_impl_proc_name(env, qid);
            let mut requires = vec![
                Contract::free(is_good_heap(BExpr::ident(HEAP))),
                Contract::free(context_heights_equal(
                    env.module(qid.module_id).height,
                    data.call_info.height,
                )),
            ];
            for pre in &data.requires {
                requires.push(Contract::free(BExpr::and(
                    et.can_call(&pre.exp),
                    et.trans(&pre.exp),
                )));
            }
            self.emit(Decl::Procedure(Procedure {
                name: name.clone(),
                type_vars: vec![],
                ins: ins.clone(),
                outs: outs.clone(),
                requires: requires.into_iter().filter(|c| !c.expr.is_true()).collect(),
                modifies: vec![HEAP.to_string()],
                ensures: vec![
                    Contract::free(is_good_heap(BExpr::ident(HEAP))),
                    Contract::free(heap_succ(BExpr::old(BExpr::ident(HEAP)), BExpr::ident(HEAP))),
                ],
            }));
            self.emit(Decl::Implementation(Implementation {
                proc_name: name,
                type_vars: vec![],
                ins: ins.into_iter().map(|t| BVar::new(&t.name, t.ty)).collect(),
                outs: outs.into_iter().map(|t| BVar::new(&t.name, t.ty)).collect(),
                locals: ctx.take_locals(),
                body: prologue,
            }));
            for _ in 0..pushed {
                ctx.pop_fuel_scope()
            }
        })
    }
}

impl<'a> StmtTranslator<'a> {
    fn check_or_assume(&self, spec: &SpecExp, msg: &str, cmds: &mut Vec<Cmd>) {
        if spec.free {
            self.assume(&spec.exp, cmds)
        } else {
            self.check_split(&spec.exp, msg, cmds)
        }
    }

    /// `yield`: assigns the yield parameters, extends the histories, checks the yield-ensures
    /// clauses and starts the next step.
    pub(crate) fn trans_yield(
        &self,
        loc: &Loc,
        qid: QualifiedId<IteratorId>,
        rhss: &[Rhs],
        cmds: &mut Vec<Cmd>,
    ) {
        let data = self.tr.env.iterator(qid);
        if !rhss.is_empty() {
            let lhss = data
                .outs
                .iter()
                .map(|f| ExpData::local(&f.name, f.ty.clone()))
                .collect_vec();
            self.trans_assign(loc, &lhss, rhss, cmds);
        }
        for (y, h) in data.outs.iter().zip(data.histories()) {
            let history = boogie_local_name(&h.name);
            let value = box_value(BExpr::ident(&boogie_local_name(&y.name)), &y.ty);
            cmds.push(Cmd::assign(
                &history,
                BExpr::call("Seq#Build", vec![BExpr::ident(&history), value]),
            ));
        }
        for post in &data.yield_ensures {
            self.check_or_assume(post, "possible violation of yield-ensures condition", cmds);
        }

        // The caller runs; what the iterator reads stays unchanged.
        let prev = self.fresh_local("$PreYieldHeap", heap_type());
        let at_prev = self.et.with_heap(BExpr::ident(&prev));
        cmds.push(Cmd::assign(&prev, self.heap()));
        cmds.push(Cmd::havoc(HEAP));
        cmds.push(Cmd::Assume(is_good_heap(self.heap())));
        cmds.push(Cmd::Assume(heap_succ(BExpr::ident(&prev), self.heap())));
        cmds.push(Cmd::Assume(self.et.heap_frame_fact(BExpr::ident(&prev), |o, f| {
            BExpr::not(at_prev.in_frame(&data.reads, o, Some(f)))
        })));
        cmds.push(Cmd::assign(OLD_ITER_HEAP, self.heap()));
        for pre in &data.yield_requires {
            self.assume(&pre.exp, cmds);
        }
    }

    /// Frame fact for a loop that yields: besides the loop frame, the caller may have changed
    /// anything the iterator does not read.
    pub(crate) fn yielding_frame_fact(
        &self,
        qid: QualifiedId<IteratorId>,
        pre_heap: &str,
        frame: &str,
    ) -> BExpr {
        let reads = &self.tr.env.iterator(qid).reads;
        let at_pre = self.et.with_heap(BExpr::ident(pre_heap));
        let in_frame = Self::in_frame_var(frame);
        self.et.heap_frame_fact(BExpr::ident(pre_heap), |o, f| {
            BExpr::or(
                in_frame(o.clone(), f.clone()),
                BExpr::not(at_pre.in_frame(reads, o, Some(f))),
            )
        })
    }

    /// The ensures clauses of an iterator, checked where its body completes.
    pub(crate) fn check_iterator_ensures(&self, qid: QualifiedId<IteratorId>, cmds: &mut Vec<Cmd>) {
        for post in &self.tr.env.iterator(qid).ensures {
            self.check_or_assume(post, "possible violation of postcondition", cmds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boogie_backend::{options::BoogieOptions, vocabulary::Vocabulary};
    use veri_boogie_ir::{visit_cmds, Program};
    use veri_model::{
        ast::{BinaryOp, Exp, StmtKind, UnaryOp},
        model::{Formal, GlobalEnv, ModuleData},
        ty::Type,
    };

    fn int(name: &str) -> Exp {
        ExpData::local(name, Type::Int)
    }

    /// `iterator Count(n: int) yields (x: int) yield ensures |xs| <= n ensures |xs| == n
    /// { yield 0; }`
    fn setup() -> GlobalEnv {
        let mut env = GlobalEnv::new();
        let m = env.add_module(ModuleData::new("M", 0));
        let mut iter = IteratorData::new(
            "Count",
            vec![Formal::new("n", Type::Int)],
            vec![Formal::new("x", Type::Int)],
        );
        let xs = ExpData::local("xs", Type::seq(Type::Int));
        let len = ExpData::unary(UnaryOp::Cardinality, xs);
        iter.yield_ensures = vec![SpecExp::checked(ExpData::binary(
            BinaryOp::Le,
            len.clone(),
            int("n"),
        ))];
        iter.ensures = vec![SpecExp::checked(ExpData::eq(len, int("n")))];
        iter.body = Some(Stmt::block(vec![Stmt::new(
            StmtKind::Yield(vec![Rhs::Exp(ExpData::int_const(0))]),
            Loc::default(),
        )]));
        env.module_mut(m).iterators.push(iter);
        env
    }

    fn translate(env: &GlobalEnv) -> Program {
        let options = BoogieOptions::default();
        let vocab = Vocabulary::builtin().unwrap();
        BoogieTranslator::new(env, &options, &vocab).translate()
    }

    #[test]
    fn iterator_procedures() {
        let env = setup();
        let program = translate(&env);
        assert!(program.procedure("CheckWellformed$$M.Count").is_some());
        let imp = program.implementation("Impl$$M.Count").expect("implementation");
        let outs = imp.outs.iter().map(|v| v.name.as_str()).collect_vec();
        assert_eq!(outs, vec!["x#0", "xs#0"]);
        assert!(imp.locals.iter().any(|l| l.name == OLD_ITER_HEAP));
        assert!(imp.body.iter().any(|c| matches!(
            c,
            Cmd::Assign(lhs, rhs) if lhs[0] == "xs#0" && rhs[0].to_string() == "Seq#Empty()"
        )));
    }

    #[test]
    fn yields_extend_histories_and_check_yield_ensures() {
        let env = setup();
        let program = translate(&env);
        let imp = program.implementation("Impl$$M.Count").expect("implementation");
        let mut msgs = vec![];
        let mut history_updates = vec![];
        visit_cmds(&imp.body, &mut |c| match c {
            Cmd::Assert { msg, .. } => msgs.push(msg.clone()),
            Cmd::Assign(lhs, rhs) if lhs[0] == "xs#0" => history_updates.push(rhs[0].to_string()),
            _ => {}
        });
        assert!(history_updates
            .iter()
            .any(|u| u.starts_with("Seq#Build(xs#0, $Box(x#0))")));
        // The yield is checked before the ensures clause at the end of the body.
        let yield_check = msgs
            .iter()
            .position(|m| m == "possible violation of yield-ensures condition");
        let post_check = msgs
            .iter()
            .position(|m| m == "possible violation of postcondition");
        assert!(yield_check.is_some());
        assert!(yield_check < post_check);
        // After the yield a new step starts from the havocked heap.
        let mut step_starts = 0;
        visit_cmds(&imp.body, &mut |c| {
            if let Cmd::Assign(lhs, rhs) = c {
                if lhs[0] == OLD_ITER_HEAP && rhs[0].to_string() == HEAP {
                    step_starts += 1
                }
            }
        });
        assert_eq!(step_starts, 2);
    }

    #[test]
    fn returns_check_the_ensures_clauses() {
        let mut env = setup();
        let m = env.get_modules().next().unwrap().0;
        env.module_mut(m).iterators[0].body = Some(Stmt::block(vec![Stmt::new(
            StmtKind::Return(vec![]),
            Loc::default(),
        )]));
        let program = translate(&env);
        let imp = program.implementation("Impl$$M.Count").expect("implementation");
        let mut before_return = 0;
        let mut returned = false;
        visit_cmds(&imp.body, &mut |c| match c {
            Cmd::Return => returned = true,
            Cmd::Assert { msg, .. } if msg == "possible violation of postcondition" && !returned => {
                before_return += 1
            }
            _ => {}
        });
        assert!(returned);
        assert_eq!(before_return, 1);
    }

    fn loop_frame_invariants(loop_body: Stmt) -> Vec<String> {
        let mut env = setup();
        let m = env.get_modules().next().unwrap().0;
        env.module_mut(m).iterators[0].body = Some(Stmt::new(
            StmtKind::While {
                guard: None,
                invariants: vec![],
                decreases: vec![],
                modifies: None,
                body: Some(Box::new(loop_body)),
            },
            Loc::default(),
        ));
        let program = translate(&env);
        let imp = program.implementation("Impl$$M.Count").expect("implementation");
        let mut invs = vec![];
        visit_cmds(&imp.body, &mut |c| {
            if let Cmd::While { invariants, .. } = c {
                invs.extend(invariants.iter().map(|i| i.expr.to_string()))
            }
        });
        invs
    }

    #[test]
    fn loops_that_yield_let_the_caller_change_unread_state() {
        let plain = loop_frame_invariants(Stmt::assign(int("x"), ExpData::int_const(1)));
        assert!(plain.iter().any(|i| i.contains("$_Frame[$o, $f]")));
        // Nothing is read, so after a yield any allocated location may have changed.
        let yielding = loop_frame_invariants(Stmt::new(
            StmtKind::Yield(vec![Rhs::Exp(ExpData::int_const(1))]),
            Loc::default(),
        ));
        assert!(!yielding.is_empty());
        assert!(yielding.iter().all(|i| !i.contains("$_Frame[$o, $f]")));
    }

    #[test]
    fn well_formedness_havocs_histories_and_yield_parameters() {
        let env = setup();
        let program = translate(&env);
        let imp = program
            .implementation("CheckWellformed$$M.Count")
            .expect("implementation");
        let mut havocked = vec![];
        visit_cmds(&imp.body, &mut |c| {
            if let Cmd::Havoc(names) = c {
                havocked.extend(names.clone())
            }
        });
        assert!(havocked.contains(&"xs#0".to_string()));
        assert!(havocked.contains(&"x#0".to_string()));
        assert!(imp.locals.iter().any(|l| l.name == "$PreStepHeap"));
    }
}
