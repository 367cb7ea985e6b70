// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Translation of methods, lemmas and constructors.
//!
//! Each method yields up to three procedures: `Call$$` with the contract seen by callers,
//! `Impl$$` with an implementation checking the body against that contract, and
//! `CheckWellformed$$` checking the contract itself.

use crate::boogie_backend::{
    boogie_helpers::{
        boogie_call_proc_name, boogie_impl_proc_name, boogie_local_name, boogie_method_name,
        boogie_type_param_vars, boogie_wf_proc_name, context_heights_equal, frame_type,
        heap_succ, heap_type, is_allocated, is_good_heap, ref_type, FRAME, HEAP, THIS,
    },
    decl_translator::BoogieTranslator,
    exp_translator::ExpTranslator,
    fuel::FuelMode,
    splitter::SplitKind,
    stmt_translator::StmtTranslator,
    termination::callable_decreases,
    type_encoder::boogie_type,
    wellformedness::WfChecker,
};
use itertools::Itertools;
use log::warn;
use veri_boogie_ir::{BExpr, BVar, Cmd, Contract, Decl, Implementation, Procedure, TypedIdent};
use veri_model::{
    ast::{ExpData, FrameExp, SpecExp, Stmt},
    model::{CallableId, MethodData, MethodId, MethodKind, ModuleId, QualifiedId},
    ty::Type,
};

/// Which procedure of a method a contract is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcKind {
    Call,
    Impl,
}

impl<'env> BoogieTranslator<'env> {
    pub(crate) fn translate_method(&self, qid: QualifiedId<MethodId>) {
        let data = self.env.method(qid);
        let callable = CallableId::Method(qid);
        self.with_context(self.new_context(qid.module_id, Some(callable)), |ctx| {
            let pushed = self.push_member_fuel_scopes(ctx, qid.module_id, data.owner, &data.fuel);
            self.emit(Decl::Comment(format!(
                "{} {}",
                match data.kind {
                    MethodKind::Method => "method",
                    MethodKind::Lemma => "lemma",
                    MethodKind::Constructor => "constructor",
                },
                boogie_method_name(self.env, qid)
            )));
            let et = ExpTranslator::new(self, ctx, BExpr::ident(HEAP))
                .with_old_heap(BExpr::old(BExpr::ident(HEAP)));
            self.emit_method_proc(qid, ProcKind::Call, &et);
            if data.body.is_some() {
                self.emit_method_proc(qid, ProcKind::Impl, &et);
            }
            for _ in 0..pushed {
                ctx.pop_fuel_scope()
            }
        });
        self.emit_method_wf(qid);
        if let Some(body) = &data.body {
            self.emit_method_impl(qid, body);
        }
    }

    /// The frame of a method: its modifies clause, plus the receiver of a constructor.
    fn method_frame(&self, qid: QualifiedId<MethodId>) -> Vec<FrameExp> {
        let data = self.env.method(qid);
        let mut frames = data.modifies.clone();
        if let (MethodKind::Constructor, Some(owner)) = (data.kind, data.owner) {
            let class = qid.module_id.qualified(owner);
            let args = self
                .env
                .class(class)
                .type_params
                .iter()
                .map(|p| Type::type_param(p))
                .collect();
            frames.push(FrameExp::new(ExpData::this(Type::class(class, args))));
        }
        frames
    }

    /// In-parameters with their typing and allocatedness as `where` clauses, and
    /// out-parameters with their typing.
    fn method_params(
        &self,
        data: &MethodData,
        module_id: ModuleId,
    ) -> (Vec<TypedIdent>, Vec<TypedIdent>) {
        let heap = BExpr::ident(HEAP);
        let mut ins = boogie_type_param_vars(&data.type_params)
            .into_iter()
            .map(|v| TypedIdent::new(&v.name, v.ty))
            .collect_vec();
        if let (true, Some(owner)) = (data.has_receiver(), data.owner) {
            let this = BExpr::ident(THIS);
            ins.push(TypedIdent::new(THIS, ref_type()).with_where(BExpr::and(
                self.receiver_typing(module_id, owner, this.clone()),
                is_allocated(heap.clone(), this),
            )));
        }
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
            .map(|f| {
                let name = boogie_local_name(&f.name);
                TypedIdent::new(&name, boogie_type(&f.ty))
                    .with_where(self.type_is(BExpr::ident(&name), &f.ty))
            })
            .collect_vec();
        (ins, outs)
    }

    fn emit_method_proc(&self, qid: QualifiedId<MethodId>, kind: ProcKind, et: &ExpTranslator) {
        let env = self.env;
        let data = env.method(qid);
        let name = match kind {
            ProcKind::Call => boogie_call_proc_name(env, qid),
            ProcKind::Impl => boogie_impl_proc_name(env, qid),
        };
        let (ins, outs) = self.method_params(data, qid.module_id);
        let limit = self.options.inline_limit(data.call_info.height);
        let checked = et.with_mode(FuelMode::Assert);

        let mut requires = vec![Contract::free(is_good_heap(BExpr::ident(HEAP)))];
        if kind == ProcKind::Impl {
            requires.push(Contract::free(context_heights_equal(
                env.module(qid.module_id).height,
                data.call_info.height,
            )));
        }
        for pre in &data.requires {
            let cc = et.can_call(&pre.exp);
            if kind == ProcKind::Impl || pre.free {
                requires.push(Contract::free(BExpr::and(cc, et.trans(&pre.exp))));
                continue;
            }
            requires.push(Contract::free(cc));
            let (parts, _) = checked.split(&pre.exp, true, limit);
            for part in parts {
                requires.push(match part.kind {
                    SplitKind::Free => Contract::free(part.expr),
                    SplitKind::Checked | SplitKind::Both => Contract::checked(
                        part.expr,
                        part.token,
                        "precondition for this call might not hold",
                    ),
                });
            }
        }

        let frame = self.method_frame(qid);
        let old_heap = BExpr::old(BExpr::ident(HEAP));
        let at_old = et.old();
        let mut ensures = vec![
            Contract::free(is_good_heap(BExpr::ident(HEAP))),
            Contract::free(heap_succ(old_heap.clone(), BExpr::ident(HEAP))),
            Contract::free(et.heap_frame_fact(old_heap, |o, f| {
                at_old.in_frame(&frame, o, Some(f))
            })),
        ];
        for post in &data.ensures {
            ensures.push(Contract::free(et.can_call(&post.exp)));
            if post.free || (kind == ProcKind::Impl && !self.post_is_checked(qid, post)) {
                ensures.push(Contract::free(et.trans(&post.exp)));
                continue;
            }
            let (parts, _) = checked.split(&post.exp, true, limit);
            for part in parts {
                ensures.push(match part.kind {
                    SplitKind::Free => Contract::free(part.expr),
                    SplitKind::Checked | SplitKind::Both => Contract::checked(
                        part.expr,
                        part.token,
                        "possible violation of postcondition",
                    ),
                });
            }
        }
        self.emit(Decl::Procedure(Procedure {
            name,
            type_vars: vec![],
            ins,
            outs,
            requires: requires.into_iter().filter(|c| !c.expr.is_true()).collect(),
            modifies: vec![HEAP.to_string()],
            ensures: ensures.into_iter().filter(|c| !c.expr.is_true()).collect(),
        }));
    }

    /// Whether a postcondition is checked by the implementation. A clause inherited from an
    /// overridden method was verified there and is only assumed.
    fn post_is_checked(&self, qid: QualifiedId<MethodId>, post: &SpecExp) -> bool {
        let data = self.env.method(qid);
        match (post.inherited, data.overrides) {
            (true, Some(base)) => {
                warn!(
                    "postcondition of {} inherited from {} is assumed, not re-checked",
                    boogie_method_name(self.env, qid),
                    boogie_method_name(self.env, base)
                );
                false
            }
            _ => true,
        }
    }

    /// The implementation of `Impl$$`, checking the body.
    fn emit_method_impl(&self, qid: QualifiedId<MethodId>, body: &Stmt) {
        let env = self.env;
        let data = env.method(qid);
        let callable = CallableId::Method(qid);
        self.with_context(self.new_context(qid.module_id, Some(callable)), |ctx| {
            let pushed = self.push_member_fuel_scopes(ctx, qid.module_id, data.owner, &data.fuel);
            let et = ExpTranslator::new(self, ctx, BExpr::ident(HEAP))
                .with_old_heap(BExpr::old(BExpr::ident(HEAP)));
            ctx.add_local_var(FRAME, frame_type());
            let mut cmds = vec![Cmd::assign(FRAME, et.frame_lambda(&self.method_frame(qid)))];
            let mut decreases = vec![];
            for (k, d) in callable_decreases(env, callable).iter().enumerate() {
                let name = format!("$decr$init#{}", k);
                ctx.add_local_var(&name, boogie_type(&d.ty));
                cmds.push(Cmd::assign(&name, et.trans(d)));
                decreases.push((BExpr::ident(&name), d.ty.clone()));
            }
            let wf = WfChecker::new(et.clone()).with_callable(callable, decreases);
            StmtTranslator::new(wf, callable).trans_stmt(body, &mut cmds);

            let mut prologue = ctx.fuel_prologue(env);
            prologue.extend(cmds);
            let (ins, outs) = self.method_params(data, qid.module_id);
            self.emit(Decl::Implementation(Implementation {
                proc_name: boogie_impl_proc_name(env, qid),
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

    /// `CheckWellformed$$`: the contract is defined in every state it is evaluated in.
    fn emit_method_wf(&self, qid: QualifiedId<MethodId>) {
        let env = self.env;
        let data = env.method(qid);
        let callable = CallableId::Method(qid);
        self.with_context(self.new_context(qid.module_id, Some(callable)), |ctx| {
            let pushed = self.push_member_fuel_scopes(ctx, qid.module_id, data.owner, &data.fuel);
            let et = ExpTranslator::new(self, ctx, BExpr::ident(HEAP))
                .with_old_heap(BExpr::old(BExpr::ident(HEAP)));
            let wf = WfChecker::new(et.with_mode(FuelMode::Assert));
            let mut cmds = vec![];
            for pre in &data.requires {
                wf.check_and_assume(&pre.exp, &mut cmds);
            }
            wf.check_frames(&data.modifies, &mut cmds);
            wf.check_all(&data.decreases, &mut cmds);

            // The postconditions are evaluated in an arbitrary successor state.
            let pre_heap = "$PreCallHeap";
            ctx.add_local_var(pre_heap, heap_type());
            cmds.push(Cmd::assign(pre_heap, BExpr::ident(HEAP)));
            cmds.push(Cmd::havoc(HEAP));
            cmds.push(Cmd::Assume(is_good_heap(BExpr::ident(HEAP))));
            cmds.push(Cmd::Assume(heap_succ(BExpr::ident(pre_heap), BExpr::ident(HEAP))));
            let at_pre = et.with_heap(BExpr::ident(pre_heap));
            let frame = self.method_frame(qid);
            cmds.push(Cmd::Assume(et.heap_frame_fact(
                BExpr::ident(pre_heap),
                |o, f| at_pre.in_frame(&frame, o, Some(f)),
            )));
            let outs = data
                .outs
                .iter()
                .map(|f| boogie_local_name(&f.name))
                .collect_vec();
            if !outs.is_empty() {
                cmds.push(Cmd::Havoc(outs));
            }
            for post in &data.ensures {
                wf.check_and_assume(&post.exp, &mut cmds);
            }

            let mut body = ctx.fuel_prologue(env);
            body.extend(cmds);
            let (ins, outs) = self.method_params(data, qid.module_id);
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boogie_backend::{options::BoogieOptions, vocabulary::Vocabulary};
    use veri_boogie_ir::{visit_cmds, Program};
    use veri_model::{
        ast::{BinaryOp, Exp, Rhs, StmtKind},
        model::{ClassData, ClassId, FieldData, FieldId, Formal, GlobalEnv, Loc, ModuleData},
    };

    /// Class `C` with field `f: int`, a trait `T` with method `m` ensuring `r > 0`, and an
    /// overriding `C.m` whose inherited postcondition was verified at `T.m`.
    fn setup() -> GlobalEnv {
        let mut env = GlobalEnv::new();
        let m = env.add_module(ModuleData::new("M", 0));
        let module = env.module_mut(m);
        module.classes.push(ClassData {
            name: "T".to_string(),
            loc: Loc::default(),
            type_params: vec![],
            is_trait: true,
            parents: vec![],
            fuel: vec![],
        });
        module.classes.push(ClassData {
            name: "C".to_string(),
            loc: Loc::default(),
            type_params: vec![],
            is_trait: false,
            parents: vec![m.qualified(ClassId(0))],
            fuel: vec![],
        });
        module.fields.push(FieldData {
            name: "f".to_string(),
            loc: Loc::default(),
            owner: ClassId(1),
            ty: Type::Int,
            mutable: true,
            ghost: false,
        });
        let this_ty = Type::class(m.qualified(ClassId(1)), vec![]);
        let r = || ExpData::local("r", Type::Int);
        let positive: Exp = ExpData::binary(BinaryOp::Gt, r(), ExpData::int_const(0));

        let mut base = MethodData::new("m", MethodKind::Method, vec![], vec![Formal::new("r", Type::Int)]);
        base.owner = Some(ClassId(0));
        base.is_static = false;
        base.ensures = vec![SpecExp::checked(positive.clone())];
        module.methods.push(base);

        let mut over = MethodData::new("m", MethodKind::Method, vec![], vec![Formal::new("r", Type::Int)]);
        over.owner = Some(ClassId(1));
        over.is_static = false;
        over.overrides = Some(m.qualified(MethodId(0)));
        over.modifies = vec![FrameExp::new(ExpData::this(this_ty.clone()))];
        over.ensures = vec![SpecExp {
            exp: positive,
            free: false,
            inherited: true,
        }];
        let field = ExpData::field_select(
            ExpData::this(this_ty),
            m.qualified(FieldId(0)),
            Type::Int,
        );
        over.body = Some(Stmt::block(vec![
            Stmt::assign(field, ExpData::int_const(1)),
            Stmt::new(
                StmtKind::Return(vec![Rhs::Exp(ExpData::int_const(1))]),
                Loc::default(),
            ),
        ]));
        module.methods.push(over);
        env
    }

    fn translate(env: &GlobalEnv) -> Program {
        let options = BoogieOptions::default();
        let vocab = Vocabulary::builtin().unwrap();
        BoogieTranslator::new(env, &options, &vocab).translate()
    }

    #[test]
    fn procedures_per_method() {
        let env = setup();
        let program = translate(&env);
        assert!(program.procedure("Call$$M.T.m").is_some());
        assert!(program.procedure("CheckWellformed$$M.T.m").is_some());
        // No body, no implementation to check.
        assert!(program.procedure("Impl$$M.T.m").is_none());
        let imp = program.implementation("Impl$$M.C.m").expect("implementation");
        let mut frame_checks = 0;
        visit_cmds(&imp.body, &mut |c| {
            if let Cmd::Assert { msg, .. } = c {
                if msg.contains("modifies clause") {
                    frame_checks += 1
                }
            }
        });
        assert_eq!(frame_checks, 1);
        assert!(imp.locals.iter().any(|l| l.name == "$_Frame"));
    }

    #[test]
    fn inherited_postconditions_are_free() {
        let env = setup();
        let program = translate(&env);
        let base = program.procedure("Call$$M.T.m").unwrap();
        assert!(base.ensures.iter().any(|c| !c.free));
        let over = program.procedure("Impl$$M.C.m").unwrap();
        assert!(over.ensures.iter().all(|c| c.free));
        // The obligation is still recorded as an assumption.
        assert!(over
            .ensures
            .iter()
            .any(|c| c.expr.to_string().contains("r#0")));
    }
}
