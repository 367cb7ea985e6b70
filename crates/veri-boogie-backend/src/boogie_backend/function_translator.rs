// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Translation of functions and predicates.
//!
//! A function becomes an uninterpreted Boogie function with a `#canCall` companion, and a set
//! of axioms: layer synonyms for fuel-aware functions, a consequence axiom for the
//! postconditions, definitional axioms, a literal variant and a frame axiom. A
//! `CheckWellformed$$` procedure checks the specification and the body.

use crate::boogie_backend::{
    boogie_helpers::{
        boogie_base_fuel_name, boogie_can_call_name, boogie_class_ty_name, boogie_function_name,
        boogie_local_name, boogie_start_fuel_assert_name, boogie_start_fuel_name,
        boogie_type_param_vars, boogie_wf_proc_name, context_above, context_above_in_module,
        context_heights_equal, context_outside_module, field_type, frame_type, heap_read,
        heap_succ, heap_type, is_good_heap, layer_succ, layer_type, layer_zero, null, ref_type,
        HEAP, LAYER, READS_FRAME, THIS,
    },
    decl_translator::BoogieTranslator,
    exp_translator::ExpTranslator,
    fuel::FuelMode,
    splitter::SplitKind,
    termination::callable_decreases,
    type_encoder::boogie_type,
    wellformedness::WfChecker,
};
use itertools::Itertools;
use veri_boogie_ir::{
    BExpr, BType, BVar, Cmd, Contract, Decl, Implementation, Procedure, TypedIdent,
};
use veri_model::{
    ast::{ExpData, ExpKind},
    model::{CallableId, ClassId, FunId, FunctionData, ModuleId, QualifiedId},
    ty::Type,
};

/// Bound variables standing for the Boogie parameters of a function.
pub(crate) struct FunSig {
    pub tys: Vec<BVar>,
    pub layer: Option<BVar>,
    pub heap: Option<BVar>,
    pub this: Option<BVar>,
    pub formals: Vec<BVar>,
}

impl FunSig {
    pub fn new(data: &FunctionData) -> Self {
        Self {
            tys: boogie_type_param_vars(&data.type_params),
            layer: data
                .is_fuel_aware()
                .then(|| BVar::new(LAYER, layer_type())),
            heap: data.reads_heap().then(|| BVar::new("$heap", heap_type())),
            this: data.has_receiver().then(|| BVar::new(THIS, ref_type())),
            formals: data
                .formals
                .iter()
                .map(|f| BVar::new(&boogie_local_name(&f.name), boogie_type(&f.ty)))
                .collect(),
        }
    }

    fn vars(&self, with_layer: bool, heap: Option<&BVar>) -> Vec<BVar> {
        self.tys
            .iter()
            .chain(self.layer.iter().filter(|_| with_layer))
            .chain(heap.or(self.heap.as_ref()))
            .chain(self.this.iter())
            .chain(self.formals.iter())
            .cloned()
            .collect()
    }

    /// All parameters of the function.
    pub fn params(&self) -> Vec<BVar> {
        self.vars(true, None)
    }

    /// Parameters of `#canCall`, which has no layer.
    pub fn can_call_params(&self) -> Vec<BVar> {
        self.vars(false, None)
    }

    /// Arguments with the given layer (if fuel-aware) and heap (if reading the heap), and the
    /// formals mapped by `arg`.
    pub fn args_with(
        &self,
        layer: Option<BExpr>,
        heap: Option<BExpr>,
        arg: impl Fn(&BVar) -> BExpr,
    ) -> Vec<BExpr> {
        let mut out = self.tys.iter().map(BVar::to_expr).collect_vec();
        if let Some(l) = &self.layer {
            out.push(layer.unwrap_or_else(|| l.to_expr()));
        }
        if let Some(h) = &self.heap {
            out.push(heap.unwrap_or_else(|| h.to_expr()));
        }
        out.extend(self.this.iter().map(BVar::to_expr));
        out.extend(self.formals.iter().map(arg));
        out
    }

    pub fn args(&self, layer: Option<BExpr>, heap: Option<BExpr>) -> Vec<BExpr> {
        self.args_with(layer, heap, BVar::to_expr)
    }

    /// `#canCall` arguments: no layer.
    pub fn can_call_args(&self, heap: Option<BExpr>) -> Vec<BExpr> {
        let mut out = self.args(None, heap);
        if self.layer.is_some() {
            out.remove(self.tys.len());
        }
        out
    }
}

impl<'env> BoogieTranslator<'env> {
    /// Typing of the receiver `this` of a member of `owner`.
    pub(crate) fn receiver_typing(
        &self,
        module_id: ModuleId,
        owner: ClassId,
        this: BExpr,
    ) -> BExpr {
        let qid = module_id.qualified(owner);
        let non_null = BExpr::neq(this.clone(), null());
        // The receiver type of a generic class depends on type values not in scope.
        if !self.env.class(qid).type_params.is_empty() {
            return non_null;
        }
        self.ensure_class_ty(qid);
        BExpr::and(
            non_null,
            BExpr::call(
                "$Is",
                vec![this, BExpr::ident(&boogie_class_ty_name(self.env, qid, true))],
            ),
        )
    }

    fn formals_typing(&self, qid: QualifiedId<FunId>, sig: &FunSig) -> BExpr {
        let data = self.env.function(qid);
        let receiver = match (&sig.this, data.owner) {
            (Some(this), Some(owner)) => self.receiver_typing(qid.module_id, owner, this.to_expr()),
            _ => BExpr::tru(),
        };
        BExpr::and(
            receiver,
            BExpr::and_all(
                data.formals
                    .iter()
                    .zip(&sig.formals)
                    .map(|(f, v)| self.type_is(v.to_expr(), &f.ty)),
            ),
        )
    }

    pub(crate) fn translate_function(&self, qid: QualifiedId<FunId>) {
        let data = self.env.function(qid);
        let callable = CallableId::Function(qid);
        self.with_context(self.new_context(qid.module_id, Some(callable)), |ctx| {
            let pushed = self.push_member_fuel_scopes(ctx, qid.module_id, data.owner, &data.fuel);
            let sig = FunSig::new(data);
            self.emit_function_decls(qid, &sig);
            let heap = sig
                .heap
                .as_ref()
                .map(BVar::to_expr)
                .unwrap_or_else(|| BExpr::ident(HEAP));
            let et = ExpTranslator::new(self, ctx, heap)
                .with_mode(FuelMode::Axiom)
                .with_scc_layer(
                    callable,
                    sig.layer.as_ref().map(BVar::to_expr).unwrap_or_else(layer_zero),
                );
            self.emit_consequence_axiom(qid, &sig, &et);
            if data.body.is_some() && !data.is_opaque {
                self.emit_definition_axioms(qid, &sig, &et);
            }
            if data.reads_heap() {
                self.emit_function_frame_axiom(qid, &sig, &et);
            }
            self.emit_function_wf(qid);
            for _ in 0..pushed {
                ctx.pop_fuel_scope()
            }
        })
    }

    fn emit_function_decls(&self, qid: QualifiedId<FunId>, sig: &FunSig) {
        let data = self.env.function(qid);
        let name = boogie_function_name(self.env, qid);
        self.emit(Decl::Comment(format!("function {}", name)));
        self.emit(Decl::function(&name, sig.params(), boogie_type(&data.result_type)));
        self.emit(Decl::function(
            &boogie_can_call_name(self.env, qid),
            sig.can_call_params(),
            BType::Bool,
        ));
        let Some(ly) = &sig.layer else {
            return;
        };
        for c in [
            boogie_base_fuel_name(self.env, qid),
            boogie_start_fuel_name(self.env, qid),
            boogie_start_fuel_assert_name(self.env, qid),
        ] {
            self.emit(Decl::constant(&c, layer_type(), false));
        }
        // Layer synonyms: one more layer than needed is the same function, and the bottom
        // layer is the zero layer.
        let at_succ = BExpr::call(&name, sig.args(Some(layer_succ(ly.to_expr(), 1)), None));
        self.emit(Decl::axiom_with_comment(
            BExpr::forall(
                sig.params(),
                vec![vec![at_succ.clone()]],
                BExpr::eq(at_succ, BExpr::call(&name, sig.args(None, None))),
            ),
            &format!("layer synonym of {}", name),
        ));
        let at_bottom = BExpr::call(
            &name,
            sig.args(Some(BExpr::call("AsFuelBottom", vec![ly.to_expr()])), None),
        );
        self.emit(Decl::axiom(BExpr::forall(
            sig.params(),
            vec![vec![at_bottom]],
            BExpr::eq(
                BExpr::call(&name, sig.args(None, None)),
                BExpr::call(&name, sig.args(Some(layer_zero()), None)),
            ),
        )));
    }

    /// `#canCall || (typing && pre)`: when the axioms of the function apply.
    fn function_antecedent(
        &self,
        qid: QualifiedId<FunId>,
        sig: &FunSig,
        et: &ExpTranslator,
        can_call_args: Vec<BExpr>,
    ) -> BExpr {
        let data = self.env.function(qid);
        let pre = et.trans(&ExpTranslator::conjoin(&data.requires));
        let heap_ok = match &sig.heap {
            Some(_) => is_good_heap(et.heap.clone()),
            None => BExpr::tru(),
        };
        BExpr::and(
            heap_ok,
            BExpr::or(
                BExpr::call(&boogie_can_call_name(self.env, qid), can_call_args),
                BExpr::and(self.formals_typing(qid, sig), pre),
            ),
        )
    }

    fn emit_consequence_axiom(&self, qid: QualifiedId<FunId>, sig: &FunSig, et: &ExpTranslator) {
        let data = self.env.function(qid);
        let name = boogie_function_name(self.env, qid);
        let module_height = self.env.module(qid.module_id).height;
        let app = BExpr::call(&name, sig.args(None, None));
        let post = BExpr::and(
            et.trans(&ExpTranslator::conjoin(&data.ensures)),
            self.type_is(app.clone(), &data.result_type),
        );
        if post.is_true() {
            return;
        }
        let body = BExpr::imp(
            BExpr::and(
                context_above(module_height, data.call_info.height),
                self.function_antecedent(qid, sig, et, sig.can_call_args(None)),
            ),
            BExpr::and(et.can_call_all(&data.ensures), post),
        );
        self.emit(Decl::axiom_with_comment(
            BExpr::forall(sig.params(), vec![vec![app]], body),
            &format!("consequence axiom for {}", name),
        ));
    }

    fn emit_definition_axioms(&self, qid: QualifiedId<FunId>, sig: &FunSig, et: &ExpTranslator) {
        let data = self.env.function(qid);
        let callable = CallableId::Function(qid);
        let body = match &data.body {
            Some(b) => b,
            None => panic!("BUG: definition axiom of a function without body"),
        };
        let name = boogie_function_name(self.env, qid);
        let module_height = self.env.module(qid.module_id).height;
        let height = data.call_info.height;
        let in_module = BExpr::or(
            context_heights_equal(module_height, height),
            context_above_in_module(module_height, height),
        );
        let define = |guard: BExpr, et: &ExpTranslator, comment: &str| {
            let lhs_layer = sig.layer.as_ref().map(|l| layer_succ(l.to_expr(), 1));
            let lhs = BExpr::call(&name, sig.args(lhs_layer, None));
            let axiom = BExpr::imp(
                BExpr::and(guard, self.function_antecedent(qid, sig, et, sig.can_call_args(None))),
                BExpr::and(et.can_call(body), BExpr::eq(lhs.clone(), et.trans(body))),
            );
            self.emit(Decl::axiom_with_comment(
                BExpr::forall(sig.params(), vec![vec![lhs]], axiom),
                &format!("{} for {}", comment, name),
            ));
        };
        match &sig.layer {
            None => define(
                BExpr::or(context_outside_module(module_height), in_module.clone()),
                et,
                "definition axiom",
            ),
            Some(_) => {
                // Within the module, recursive calls unfold as far as the layer allows.
                define(in_module.clone(), et, "deep definition axiom");
                // From other modules, the definition unfolds once.
                define(
                    context_outside_module(module_height),
                    &et.with_scc_layer(callable, layer_zero()),
                    "shallow definition axiom",
                );
            }
        }

        if self.use_lit() && sig.heap.is_none() && !sig.formals.is_empty() {
            let lit = |v: &BVar| BExpr::call("Lit", vec![v.to_expr()]);
            let lit_et = et.with_bindings(
                data.formals
                    .iter()
                    .zip(&sig.formals)
                    .map(|(f, v)| (f.name.clone(), lit(v))),
            );
            let lit_et = match &sig.layer {
                Some(ly) => lit_et.with_scc_layer(callable, layer_succ(ly.to_expr(), 1)),
                None => lit_et,
            };
            let lhs_layer = sig.layer.as_ref().map(|l| layer_succ(l.to_expr(), 1));
            let lhs = BExpr::call(&name, sig.args_with(lhs_layer, None, lit));
            let mut can_call_args = sig.args_with(None, None, lit);
            if sig.layer.is_some() {
                can_call_args.remove(sig.tys.len());
            }
            let axiom = BExpr::imp(
                BExpr::and(
                    BExpr::or(context_outside_module(module_height), in_module),
                    self.function_antecedent(qid, sig, &lit_et, can_call_args),
                ),
                BExpr::and(lit_et.can_call(body), BExpr::eq(lhs.clone(), lit_et.trans(body))),
            );
            self.emit(Decl::axiom_with_comment(
                BExpr::forall(sig.params(), vec![vec![lhs]], axiom),
                &format!("literal definition axiom for {}", name),
            ));
        }
    }

    /// Heaps agreeing on the reads clause give equal results.
    fn emit_function_frame_axiom(&self, qid: QualifiedId<FunId>, sig: &FunSig, et: &ExpTranslator) {
        let data = self.env.function(qid);
        let name = boogie_function_name(self.env, qid);
        let h0 = BVar::new("$h0", heap_type());
        let h1 = BVar::new("$h1", heap_type());
        let o = BVar::new("$o", ref_type());
        let f = BVar::new("$f", field_type());
        let et0 = et.with_heap(h0.to_expr());
        let in_reads = et0.in_frame(&data.reads, o.to_expr(), Some(f.to_expr()));
        let agree = BExpr::forall(
            vec![o.clone(), f.clone()],
            vec![],
            BExpr::imp(
                BExpr::and(BExpr::neq(o.to_expr(), null()), in_reads),
                BExpr::eq(
                    heap_read(h0.to_expr(), o.to_expr(), f.to_expr()),
                    heap_read(h1.to_expr(), o.to_expr(), f.to_expr()),
                ),
            ),
        );
        let at0 = BExpr::call(&name, sig.args(None, Some(h0.to_expr())));
        let at1 = BExpr::call(&name, sig.args(None, Some(h1.to_expr())));
        let vars = sig
            .vars(true, Some(&h0))
            .into_iter()
            .chain(std::iter::once(h1.clone()))
            .collect_vec();
        self.emit(Decl::axiom_with_comment(
            BExpr::forall(
                vars,
                vec![vec![heap_succ(h0.to_expr(), h1.to_expr()), at1.clone()]],
                BExpr::imp(
                    BExpr::and_all(vec![
                        is_good_heap(h0.to_expr()),
                        is_good_heap(h1.to_expr()),
                        self.formals_typing(qid, sig),
                        agree,
                    ]),
                    BExpr::eq(at0, at1),
                ),
            ),
            &format!("frame axiom for {}", name),
        ));
    }

    /// The procedure checking well-formedness of the specification and body.
    fn emit_function_wf(&self, qid: QualifiedId<FunId>) {
        let env = self.env;
        let data = env.function(qid);
        let callable = CallableId::Function(qid);
        let ctx = self.new_context(qid.module_id, Some(callable));
        self.with_nested_context(ctx, |ctx| {
            let pushed = self.push_member_fuel_scopes(ctx, qid.module_id, data.owner, &data.fuel);
            let module_height = env.module(qid.module_id).height;
            let sig = FunSig::new(data);
            let et = ExpTranslator::new(self, ctx, BExpr::ident(HEAP));
            let decreases = callable_decreases(env, callable)
                .iter()
                .map(|d| (et.trans(d), d.ty.clone()))
                .collect_vec();
            let reads_checker = WfChecker::new(et.clone())
                .with_callable(callable, decreases)
                .with_reads_frame(READS_FRAME);
            ctx.add_local_var(READS_FRAME, frame_type());

            let mut cmds = vec![];
            // Everything may be read while checking the reads clause itself.
            let all = BVar::new("$o", ref_type());
            let all_f = BVar::new("$f", field_type());
            cmds.push(Cmd::assign(
                READS_FRAME,
                BExpr::lambda(vec![all, all_f], BExpr::tru()),
            ));
            for pre in &data.requires {
                reads_checker.check_and_assume(pre, &mut cmds);
            }
            reads_checker.check_frames(&data.reads, &mut cmds);
            cmds.push(Cmd::assign(READS_FRAME, et.frame_lambda(&data.reads)));

            // The postconditions are well-formed for any result.
            let mut post = vec![];
            let post_checker = reads_checker.clone().in_postcondition();
            for e in &data.ensures {
                post_checker.check_and_assume(e, &mut post);
            }
            if !post.is_empty() {
                post.push(Cmd::Assume(BExpr::fals()));
                cmds.push(Cmd::nondet(post));
            }

            if let (Some(body), false) = (&data.body, data.is_opaque) {
                let mut check = vec![];
                reads_checker.check(body, &mut check);
                let self_call = ExpData::new(
                    ExpKind::FunctionCall {
                        fun: qid,
                        receiver: None,
                        type_args: data.type_params.iter().map(|p| Type::type_param(p)).collect(),
                        args: data
                            .formals
                            .iter()
                            .map(|f| ExpData::local(&f.name, f.ty.clone()))
                            .collect(),
                    },
                    data.result_type.clone(),
                    data.loc,
                );
                check.push(Cmd::Assume(BExpr::eq(et.trans(&self_call), et.trans(body))));
                check.push(Cmd::Assume(et.can_call(body)));
                let limit = self.options.inline_limit(data.call_info.height);
                for e in &data.ensures {
                    let (parts, _) = et.split(e, true, limit);
                    for part in parts {
                        match part.kind {
                            SplitKind::Free => check.push(Cmd::Assume(part.expr)),
                            SplitKind::Checked | SplitKind::Both => check.push(Cmd::assert(
                                part.expr,
                                part.token,
                                "possible violation of function postcondition",
                            )),
                        }
                    }
                    check.push(Cmd::Assume(et.trans(e)));
                }
                cmds.push(Cmd::If {
                    guard: None,
                    then: check,
                    els: vec![],
                });
            }

            let mut body = ctx.fuel_prologue(env);
            body.extend(cmds);
            let ins = self.function_wf_params(qid, &sig);
            let name = boogie_wf_proc_name(env, callable);
            self.emit(Decl::Procedure(Procedure {
                name: name.clone(),
                type_vars: vec![],
                ins: ins.clone(),
                outs: vec![],
                requires: vec![Contract::free(context_heights_equal(
                    module_height,
                    data.call_info.height,
                ))],
                modifies: vec![],
                ensures: vec![],
            }));
            self.emit(Decl::Implementation(Implementation {
                proc_name: name,
                type_vars: vec![],
                ins: ins
                    .into_iter()
                    .map(|ti| BVar::new(&ti.name, ti.ty))
                    .collect(),
                outs: vec![],
                locals: ctx.take_locals(),
                body,
            }));
            for _ in 0..pushed {
                ctx.pop_fuel_scope()
            }
        })
    }

    /// Parameters of the well-formedness procedure: type values, receiver, formals, with
    /// their typing as `where` clauses.
    fn function_wf_params(&self, qid: QualifiedId<FunId>, sig: &FunSig) -> Vec<TypedIdent> {
        let data = self.env.function(qid);
        let mut ins = sig
            .tys
            .iter()
            .map(|t| TypedIdent::new(&t.name, t.ty.clone()))
            .collect_vec();
        if let (Some(this), Some(owner)) = (&sig.this, data.owner) {
            ins.push(
                TypedIdent::new(&this.name, this.ty.clone())
                    .with_where(self.receiver_typing(qid.module_id, owner, this.to_expr())),
            );
        }
        for (f, v) in data.formals.iter().zip(&sig.formals) {
            ins.push(
                TypedIdent::new(&v.name, v.ty.clone()).with_where(self.type_is(v.to_expr(), &f.ty)),
            );
        }
        ins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boogie_backend::{options::BoogieOptions, vocabulary::Vocabulary};
    use veri_boogie_ir::{visit_cmds, Program};
    use veri_model::{
        ast::{BinaryOp, Exp},
        call_graph::compute_call_graph,
        model::{Formal, GlobalEnv, ModuleData},
    };

    /// `function sum(n: int): int { if n <= 0 then 0 else n + sum(n - 1) }`
    fn sum_program(options: &BoogieOptions) -> Program {
        let mut env = GlobalEnv::new();
        let m = env.add_module(ModuleData::new("M", 0));
        let sum = m.qualified(FunId(0));
        let n = || ExpData::local("n", Type::Int);
        let rec: Exp = ExpData::call(
            sum,
            vec![ExpData::binary(BinaryOp::Sub, n(), ExpData::int_const(1))],
            Type::Int,
        );
        let mut data = FunctionData::new("sum", vec![Formal::new("n", Type::Int)], Type::Int);
        data.body = Some(ExpData::ite(
            ExpData::binary(BinaryOp::Le, n(), ExpData::int_const(0)),
            ExpData::int_const(0),
            ExpData::binary(BinaryOp::Add, n(), rec),
        ));
        env.module_mut(m).functions.push(data);
        compute_call_graph(&mut env);
        let vocab = Vocabulary::builtin().unwrap();
        BoogieTranslator::new(&env, options, &vocab).translate()
    }

    #[test]
    fn recursive_functions_get_fuel_and_two_definitions() {
        let program = sum_program(&BoogieOptions::default());
        for name in [
            "M.sum",
            "M.sum#canCall",
            "BaseFuel_M.sum",
            "StartFuel_M.sum",
            "StartFuelAssert_M.sum",
        ] {
            assert!(program.is_declared(name), "{} missing", name);
        }
        assert_eq!(program.axioms_commented("layer synonym of M.sum").len(), 1);
        let deep = program.axioms_commented("deep definition axiom for M.sum");
        assert_eq!(deep.len(), 1);
        // The recursive call of the deep definition uses the bound layer.
        assert!(deep[0].to_string().contains("M.sum($ly, "));
        let shallow = program.axioms_commented("shallow definition axiom for M.sum");
        assert!(shallow[0].to_string().contains("M.sum($LZ, "));
        assert_eq!(
            program
                .axioms_commented("literal definition axiom for M.sum")
                .len(),
            1
        );
    }

    #[test]
    fn well_formedness_checks_termination() {
        let program = sum_program(&BoogieOptions::default());
        let imp = program
            .implementation("CheckWellformed$$M.sum")
            .expect("well-formedness implementation");
        let mut messages = vec![];
        visit_cmds(&imp.body, &mut |c| {
            if let Cmd::Assert { msg, .. } = c {
                messages.push(msg.clone())
            }
        });
        assert!(messages
            .iter()
            .any(|m| m == "cannot prove termination; try supplying a decreases clause"));
    }

    #[test]
    fn literal_axioms_follow_the_option() {
        let options = BoogieOptions {
            use_literal_hints: false,
            ..BoogieOptions::default()
        };
        let program = sum_program(&options);
        assert!(program
            .axioms_commented("literal definition axiom")
            .is_empty());
    }
}
