// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Translation of statements into Boogie commands.
//!
//! Every statement is checked for well-formedness before it takes effect. Heap updates are
//! licensed by the frame variable of the innermost enclosing frame (`$_Frame` for method
//! bodies) and followed by `$IsGoodHeap`. Loops check their invariants' well-formedness once
//! under a havocked flag, forall statements split into a definedness and an exporter branch,
//! and calculations check each step in its own branch. Statements particular to iterator
//! bodies are translated in `iterator_translator`.

use crate::boogie_backend::{
    boogie_helpers::{
        array_index_field, boogie_call_proc_name, boogie_class_ty_name, boogie_ctor_test_name,
        boogie_dtor_name, boogie_field_name, boogie_local_name, frame_type, heap_read, heap_succ, heap_type, heap_update, is_allocated, is_good_heap,
        null, ref_type, FRAME, HEAP,
    },
    context::DeclContext,
    decl_translator::BoogieTranslator,
    exp_translator::ExpTranslator,
    fuel::FuelMode,
    splitter::SplitKind,
    substitution::Substitution,
    termination::{callable_decreases, decreases_less},
    triggers::synthesize_triggers,
    type_encoder::{box_value, boogie_type, coerce_value, unbox_value},
    wellformedness::WfChecker,
};
use itertools::Itertools;
use veri_boogie_ir::{BBinOp, BExpr, BType, Cmd, Invariant, Token, TypedIdent};
use veri_model::{
    ast::{
        BoundVar, CalcOp, Exp, ExpData, ExpKind, FrameExp, LocalDecl, MatchCaseStmt, Rhs,
        SpecExp, Stmt, StmtKind,
    },
    model::{CallableId, CtorRef, GlobalEnv, Loc, MethodId, QualifiedId},
    ty::Type,
};

/// A location an assignment writes to.
#[derive(Clone)]
enum Target {
    Local(String),
    Heap { obj: BExpr, field: BExpr },
}

#[derive(Clone)]
pub struct StmtTranslator<'a> {
    pub tr: &'a BoogieTranslator<'a>,
    /// Translator for checked positions.
    pub et: ExpTranslator<'a>,
    pub wf: WfChecker<'a>,
    /// The method or iterator whose body is translated.
    pub callable: CallableId,
    /// Frame variable licensing heap updates.
    pub frame: String,
}

impl<'a> StmtTranslator<'a> {
    pub fn new(wf: WfChecker<'a>, callable: CallableId) -> Self {
        Self {
            tr: wf.et.tr,
            et: wf.et.with_mode(FuelMode::Assert),
            wf,
            callable,
            frame: FRAME.to_string(),
        }
    }

    fn with_frame(&self, frame: &str) -> Self {
        let mut st = self.clone();
        st.frame = frame.to_string();
        st.et = self.et.with_frame(frame);
        st.wf.et = self.wf.et.with_frame(frame);
        st
    }

    fn env(&self) -> &'a GlobalEnv {
        self.tr.env
    }

    fn ctx(&self) -> &'a DeclContext {
        self.et.ctx
    }

    fn token(&self, loc: &Loc) -> Token {
        self.tr.token(loc)
    }

    pub(crate) fn heap(&self) -> BExpr {
        BExpr::ident(HEAP)
    }

    /// Translator for assumed positions.
    pub(crate) fn assumed(&self) -> ExpTranslator<'a> {
        self.et.with_mode(FuelMode::Assume)
    }

    pub(crate) fn fresh_local(&self, prefix: &str, ty: BType) -> String {
        let name = self.ctx().fresh.fresh(prefix);
        self.ctx().add_local_var(&name, ty);
        name
    }

    fn declare_local(&self, name: &str, ty: &Type) -> String {
        let name = boogie_local_name(name);
        if !self.ctx().has_local(&name) {
            self.ctx().add_local(
                TypedIdent::new(&name, boogie_type(ty))
                    .with_where(self.tr.type_is(BExpr::ident(&name), ty)),
            );
        }
        name
    }

    pub(crate) fn assume(&self, e: &Exp, cmds: &mut Vec<Cmd>) {
        let et = self.assumed();
        let cc = et.can_call(e);
        if !cc.is_true() {
            cmds.push(Cmd::Assume(cc));
        }
        cmds.push(Cmd::Assume(et.trans(e)));
    }

    fn inline_limit(&self) -> usize {
        let height = self.env().call_info(self.callable).height;
        self.tr.options.inline_limit(height)
    }

    /// Asserts `e` as separately reported parts, then assumes it.
    pub(crate) fn check_split(&self, e: &Exp, msg: &str, cmds: &mut Vec<Cmd>) {
        let (parts, _) = self.et.split(e, true, self.inline_limit());
        for part in parts {
            match part.kind {
                SplitKind::Free => cmds.push(Cmd::Assume(part.expr)),
                SplitKind::Checked | SplitKind::Both => {
                    cmds.push(Cmd::assert(part.expr, part.token, msg))
                }
            }
        }
        self.assume(e, cmds)
    }

    /// Checks well-formedness of a specification clause and asserts or assumes it.
    pub(crate) fn check_spec(&self, spec: &SpecExp, msg: &str, cmds: &mut Vec<Cmd>) {
        self.wf.check(&spec.exp, cmds);
        if spec.free {
            self.assume(&spec.exp, cmds)
        } else {
            self.check_split(&spec.exp, msg, cmds)
        }
    }

    /// Havocs `$Heap` within the frame `allowed`, relative to a fresh snapshot which is
    /// returned.
    fn havoc_heap(
        &self,
        prefix: &str,
        allowed: impl Fn(BExpr, BExpr) -> BExpr,
        cmds: &mut Vec<Cmd>,
    ) -> String {
        let prev = self.fresh_local(prefix, heap_type());
        cmds.push(Cmd::assign(&prev, self.heap()));
        cmds.push(Cmd::havoc(HEAP));
        cmds.push(Cmd::Assume(is_good_heap(self.heap())));
        cmds.push(Cmd::Assume(heap_succ(BExpr::ident(&prev), self.heap())));
        cmds.push(Cmd::Assume(
            self.et.heap_frame_fact(BExpr::ident(&prev), allowed),
        ));
        prev
    }

    pub(crate) fn in_frame_var(frame: &str) -> impl Fn(BExpr, BExpr) -> BExpr + '_ {
        move |o, f| BExpr::select(BExpr::ident(frame), vec![o, f])
    }

    // Statements
    // ----------

    pub fn trans_stmts(&self, stmts: &[Stmt], cmds: &mut Vec<Cmd>) {
        for s in stmts {
            self.trans_stmt(s, cmds)
        }
    }

    pub fn trans_stmt(&self, s: &Stmt, cmds: &mut Vec<Cmd>) {
        match &s.kind {
            StmtKind::Assert { exp, fuel, proof } => {
                let pushed = !fuel.is_empty();
                if pushed {
                    let bind = self.ctx().push_nested_fuel_scope(self.env(), fuel);
                    cmds.extend(bind);
                }
                match proof {
                    Some(proof) => {
                        let mut branch = vec![];
                        self.trans_stmt(proof, &mut branch);
                        self.wf.check(exp, &mut branch);
                        self.check_split(exp, "assertion might not hold", &mut branch);
                        branch.push(Cmd::Assume(BExpr::fals()));
                        cmds.push(Cmd::nondet(branch));
                        self.assume(exp, cmds);
                    }
                    None => {
                        self.wf.check(exp, cmds);
                        self.check_split(exp, "assertion might not hold", cmds);
                    }
                }
                if pushed {
                    self.ctx().pop_fuel_scope()
                }
            }
            StmtKind::Assume(exp) => {
                self.wf.check(exp, cmds);
                self.assume(exp, cmds);
            }
            StmtKind::Print(exps) => self.wf.check_all(exps, cmds),
            StmtKind::VarDecl { locals, init } => {
                self.trans_var_decl(locals, cmds);
                if let Some(init) = init {
                    self.trans_stmt(init, cmds)
                }
            }
            StmtKind::Assign { lhss, rhss } => self.trans_assign(&s.loc, lhss, rhss, cmds),
            StmtKind::AssignSuchThat { lhss, constraint } => {
                self.trans_assign_such_that(s, lhss, constraint, cmds)
            }
            StmtKind::Call {
                lhss,
                method,
                receiver,
                type_args,
                args,
            } => {
                let targets = lhss
                    .iter()
                    .map(|l| (self.target(l, true, cmds), l.ty.clone()))
                    .collect_vec();
                let outs = self.trans_call(&s.loc, *method, receiver.as_ref(), type_args, args, cmds);
                let callee = self.env().method(*method);
                for (((target, ty), out), formal) in targets.into_iter().zip(outs).zip(&callee.outs)
                {
                    let value = coerce_value(BExpr::ident(&out), &ty, &formal.ty);
                    self.assign_to(target, value, &ty, cmds)
                }
            }
            StmtKind::Return(rhss) => {
                match self.callable {
                    CallableId::Method(qid) => {
                        if !rhss.is_empty() {
                            let lhss = self
                                .env()
                                .method(qid)
                                .outs
                                .iter()
                                .map(|f| ExpData::local(&f.name, f.ty.clone()))
                                .collect_vec();
                            self.trans_assign(&s.loc, &lhss, rhss, cmds);
                        }
                    }
                    CallableId::Iterator(qid) => self.check_iterator_ensures(qid, cmds),
                    CallableId::Function(_) => panic!("BUG: return statement in a function"),
                }
                cmds.push(Cmd::Return)
            }
            StmtKind::Yield(rhss) => match self.callable {
                CallableId::Iterator(qid) => self.trans_yield(&s.loc, qid, rhss, cmds),
                _ => panic!("BUG: yield statement outside of an iterator"),
            },
            StmtKind::Break(label) => cmds.push(match label {
                Some(l) => Cmd::Goto(format!("after_{}", l)),
                None => Cmd::Break,
            }),
            StmtKind::Block(stmts) => self.trans_stmts(stmts, cmds),
            StmtKind::If { guard, then, els } => {
                let guard = guard.as_ref().map(|g| {
                    self.wf.check(g, cmds);
                    self.et.trans(g)
                });
                let mut then_cmds = vec![];
                self.trans_stmt(then, &mut then_cmds);
                let mut els_cmds = vec![];
                if let Some(els) = els {
                    self.trans_stmt(els, &mut els_cmds)
                }
                cmds.push(Cmd::If {
                    guard,
                    then: then_cmds,
                    els: els_cmds,
                })
            }
            StmtKind::While {
                guard,
                invariants,
                decreases,
                modifies,
                body,
            } => self.trans_while(
                s,
                guard.as_ref(),
                invariants,
                decreases,
                modifies.as_deref(),
                body.as_deref(),
                cmds,
            ),
            StmtKind::Forall {
                vars,
                range,
                ensures,
                body,
            } => self.trans_forall(vars, range.as_ref(), ensures, body.as_deref(), cmds),
            StmtKind::Calc {
                op,
                lines,
                steps,
                hints,
            } => self.trans_calc(*op, lines, steps, hints, cmds),
            StmtKind::Match {
                source,
                cases,
                missing,
            } => self.trans_match(s, source, cases, missing, cmds),
            StmtKind::Modify { frame, body } => self.trans_modify(s, frame, body.as_deref(), cmds),
        }
        if let Some(label) = &s.label {
            cmds.push(Cmd::Label(format!("after_{}", label)))
        }
    }

    fn trans_var_decl(&self, locals: &[LocalDecl], cmds: &mut Vec<Cmd>) {
        for local in locals {
            let name = self.declare_local(&local.name, &local.ty);
            cmds.push(Cmd::havoc(&name));
        }
    }

    // Assignments
    // -----------

    /// Evaluates the location written by `lhs`, checking that it is defined and licensed by
    /// the frame. With `snapshot`, heap dependent parts are saved in temporaries.
    fn target(&self, lhs: &Exp, snapshot: bool, cmds: &mut Vec<Cmd>) -> Target {
        let (obj, field) = match &lhs.kind {
            ExpKind::LocalVar(name) => return Target::Local(boogie_local_name(name)),
            ExpKind::FieldSelect { obj, field } => {
                self.wf.check(obj, cmds);
                if !self.env().field(*field).mutable {
                    panic!("BUG: assignment to immutable field")
                }
                (obj, BExpr::ident(&boogie_field_name(self.env(), *field)))
            }
            ExpKind::ArraySelect { array, indices } => {
                self.wf.check(array, cmds);
                self.wf.check_all(indices, cmds);
                let a = self.et.trans(array);
                for (dim, i) in indices.iter().enumerate() {
                    cmds.push(Cmd::assert(
                        self.index_in_range(a.clone(), self.et.trans(i), dim),
                        self.token(&i.loc),
                        "index out of range",
                    ));
                }
                (
                    array,
                    array_index_field(indices.iter().map(|i| self.et.trans(i)).collect()),
                )
            }
            ExpKind::Select { collection, index } if matches!(collection.ty, Type::Array { .. }) => {
                self.wf.check(collection, cmds);
                self.wf.check(index, cmds);
                let a = self.et.trans(collection);
                cmds.push(Cmd::assert(
                    self.index_in_range(a, self.et.trans(index), 0),
                    self.token(&index.loc),
                    "index out of range",
                ));
                (collection, array_index_field(vec![self.et.trans(index)]))
            }
            _ => panic!("BUG: assignment to a non-location expression"),
        };
        let mut o = self.et.trans(obj);
        if !matches!(obj.kind, ExpKind::This) {
            cmds.push(Cmd::assert(
                BExpr::neq(o.clone(), null()),
                self.token(&lhs.loc),
                "target object might be null",
            ));
        }
        cmds.push(Cmd::assert(
            BExpr::select(BExpr::ident(&self.frame), vec![o.clone(), field.clone()]),
            self.token(&lhs.loc),
            "assignment might update an object not in the enclosing context's modifies clause",
        ));
        let mut field = field;
        if snapshot {
            let obj_tmp = self.fresh_local("$obj", ref_type());
            cmds.push(Cmd::assign(&obj_tmp, o));
            o = BExpr::ident(&obj_tmp);
            if !matches!(field, BExpr::Ident(_)) {
                let field_tmp = self.fresh_local("$fld", BType::named("Field"));
                cmds.push(Cmd::assign(&field_tmp, field));
                field = BExpr::ident(&field_tmp);
            }
        }
        Target::Heap { obj: o, field }
    }

    fn index_in_range(&self, array: BExpr, index: BExpr, dim: usize) -> BExpr {
        BExpr::and(
            BExpr::le(BExpr::int(0), index.clone()),
            BExpr::lt(
                index,
                BExpr::call("$ArrayLength", vec![array, BExpr::int(dim as i64)]),
            ),
        )
    }

    fn assign_to(&self, target: Target, value: BExpr, ty: &Type, cmds: &mut Vec<Cmd>) {
        match target {
            Target::Local(name) => cmds.push(Cmd::assign(&name, value)),
            Target::Heap { obj, field } => {
                cmds.push(Cmd::assign(
                    HEAP,
                    heap_update(self.heap(), obj, field, box_value(value, ty)),
                ));
                cmds.push(Cmd::Assume(is_good_heap(self.heap())));
            }
        }
    }

    fn havoc_target(&self, target: Target, ty: &Type, cmds: &mut Vec<Cmd>) {
        match target {
            Target::Local(name) => {
                cmds.push(Cmd::havoc(&name));
                cmds.push(Cmd::Assume(self.tr.type_is(BExpr::ident(&name), ty)));
            }
            heap => {
                let tmp = self.fresh_local("$rhs", boogie_type(ty));
                cmds.push(Cmd::havoc(&tmp));
                cmds.push(Cmd::Assume(self.tr.type_is_alloc(
                    BExpr::ident(&tmp),
                    ty,
                    self.heap(),
                )));
                self.assign_to(heap, BExpr::ident(&tmp), ty, cmds)
            }
        }
    }

    pub(crate) fn trans_assign(&self, loc: &Loc, lhss: &[Exp], rhss: &[Rhs], cmds: &mut Vec<Cmd>) {
        if lhss.len() != rhss.len() {
            panic!("BUG: assignment with {} targets and {} values", lhss.len(), rhss.len())
        }
        let parallel = lhss.len() > 1;
        let targets = lhss
            .iter()
            .map(|l| self.target(l, parallel, cmds))
            .collect_vec();
        let values = lhss
            .iter()
            .zip(rhss)
            .map(|(lhs, rhs)| {
                let value = self.trans_rhs(loc, rhs, &lhs.ty, cmds)?;
                if parallel {
                    let tmp = self.fresh_local("$rhs", boogie_type(&lhs.ty));
                    cmds.push(Cmd::assign(&tmp, value));
                    Some(BExpr::ident(&tmp))
                } else {
                    Some(value)
                }
            })
            .collect_vec();
        for ((target, lhs), value) in targets.into_iter().zip(lhss).zip(values) {
            match value {
                Some(v) => self.assign_to(target, v, &lhs.ty, cmds),
                None => self.havoc_target(target, &lhs.ty, cmds),
            }
        }
    }

    /// The value of a right-hand side, represented at type `ty`. `None` for `*`. Checks of
    /// a constructor call are reported at `loc`.
    fn trans_rhs(&self, loc: &Loc, rhs: &Rhs, ty: &Type, cmds: &mut Vec<Cmd>) -> Option<BExpr> {
        match rhs {
            Rhs::Exp(e) => {
                self.wf.check(e, cmds);
                Some(coerce_value(self.et.trans(e), ty, &e.ty))
            }
            Rhs::Havoc => None,
            Rhs::New { ty: class_ty, init } => {
                let nw = self.allocate(class_ty, cmds);
                if let Some((ctor, args)) = init {
                    let receiver = ExpData::local(&nw, class_ty.clone());
                    self.trans_call(loc, *ctor, Some(&receiver), &[], args, cmds);
                }
                Some(BExpr::ident(&nw))
            }
            Rhs::NewArray { elem, dims } => {
                self.wf.check_all(dims, cmds);
                for d in dims {
                    cmds.push(Cmd::assert(
                        BExpr::le(BExpr::int(0), self.et.trans(d)),
                        self.token(&d.loc),
                        "array size might be negative",
                    ));
                }
                let array_ty = Type::Array {
                    elem: Box::new(elem.clone()),
                    dims: dims.len(),
                    nullable: false,
                };
                let nw = self.allocate(&array_ty, cmds);
                for (i, d) in dims.iter().enumerate() {
                    cmds.push(Cmd::Assume(BExpr::eq(
                        BExpr::call("$ArrayLength", vec![BExpr::ident(&nw), BExpr::int(i as i64)]),
                        self.et.trans(d),
                    )));
                }
                Some(BExpr::ident(&nw))
            }
        }
    }

    /// Allocates a fresh object of reference type `ty`.
    fn allocate(&self, ty: &Type, cmds: &mut Vec<Cmd>) -> String {
        let nw = self.fresh_local("$nw", ref_type());
        let obj = BExpr::ident(&nw);
        cmds.push(Cmd::havoc(&nw));
        let mut facts = vec![
            BExpr::neq(obj.clone(), null()),
            BExpr::not(is_allocated(self.heap(), obj.clone())),
            self.tr.type_is(obj.clone(), ty),
        ];
        if let Type::Class { id, args, .. } = ty {
            if !self.env().class(*id).is_trait {
                self.tr.ensure_class_ty(*id);
                let dynamic = if args.is_empty() {
                    BExpr::ident(&boogie_class_ty_name(self.env(), *id, true))
                } else {
                    BExpr::call(
                        &boogie_class_ty_name(self.env(), *id, true),
                        args.iter().map(|a| self.tr.type_to_ty(a)).collect(),
                    )
                };
                facts.push(BExpr::eq(BExpr::call("dtype", vec![obj.clone()]), dynamic));
            }
        }
        cmds.push(Cmd::Assume(BExpr::and_all(facts)));
        cmds.push(Cmd::assign(
            HEAP,
            heap_update(
                self.heap(),
                obj,
                BExpr::ident("alloc"),
                box_value(BExpr::tru(), &Type::Bool),
            ),
        ));
        cmds.push(Cmd::Assume(is_good_heap(self.heap())));
        nw
    }

    fn trans_assign_such_that(
        &self,
        s: &Stmt,
        lhss: &[Exp],
        constraint: &Exp,
        cmds: &mut Vec<Cmd>,
    ) {
        let mut vars = vec![];
        for lhs in lhss {
            match &lhs.kind {
                ExpKind::LocalVar(name) => vars.push(BoundVar::new(name, lhs.ty.clone())),
                _ => {
                    self.tr.error(
                        &lhs.loc,
                        "assign-such-that is only supported for local variables",
                    );
                    return;
                }
            }
        }
        let bvars = ExpTranslator::bound_vars(&vars);
        let inner = self.et.shadow(vars.iter().map(|v| &v.name));
        let mut wf_cmds = vec![];
        for v in &bvars {
            wf_cmds.push(Cmd::havoc(&v.name));
        }
        wf_cmds.push(Cmd::Assume(inner.typing(&vars)));
        self.wf.check(constraint, &mut wf_cmds);
        wf_cmds.push(Cmd::Assume(BExpr::fals()));
        cmds.push(Cmd::nondet(wf_cmds));
        let body = BExpr::and(inner.typing(&vars), inner.trans(constraint));
        let triggers = synthesize_triggers(&bvars, &body);
        cmds.push(Cmd::assert(
            BExpr::exists(bvars.clone(), triggers, body),
            self.token(&s.loc),
            "cannot establish the existence of LHS values that satisfy the such-that predicate",
        ));
        cmds.push(Cmd::Havoc(bvars.iter().map(|v| v.name.clone()).collect()));
        cmds.push(Cmd::Assume(inner.typing(&vars)));
        self.assume(constraint, cmds);
    }

    // Calls
    // -----

    /// Translates a call and returns the temporaries holding its results.
    fn trans_call(
        &self,
        loc: &Loc,
        method: QualifiedId<MethodId>,
        receiver: Option<&Exp>,
        type_args: &[Type],
        args: &[Exp],
        cmds: &mut Vec<Cmd>,
    ) -> Vec<String> {
        let env = self.env();
        let callee = env.method(method);
        let token = self.token(loc);
        if let Some(r) = receiver {
            self.wf.check(r, cmds);
            if callee.has_receiver() && !matches!(r.kind, ExpKind::This) {
                cmds.push(Cmd::assert(
                    BExpr::neq(self.et.trans(r), null()),
                    token.clone(),
                    "target object might be null",
                ));
            }
        }
        self.wf.check_all(args, cmds);

        let mut subst = Substitution::new()
            .with_vars(
                callee
                    .ins
                    .iter()
                    .map(|f| f.name.clone())
                    .zip(args.iter().cloned()),
            )
            .with_types(ExpTranslator::type_instantiation(&callee.type_params, type_args));
        if let Some(r) = receiver {
            subst = subst.with_receiver(r.clone());
        }
        let fresh = &self.ctx().fresh;
        let modifies = subst.apply_frames(&callee.modifies, fresh);
        if !modifies.is_empty() {
            cmds.push(Cmd::assert(
                self.et.frames_subset(&modifies, &self.frame),
                token.clone(),
                "call might violate context's modifies clause",
            ));
        }
        let target = CallableId::Method(method);
        if env.in_same_scc(self.callable, target) {
            let new = callable_decreases(env, target)
                .iter()
                .map(|d| {
                    let d = subst.apply(d, fresh);
                    (self.et.trans(&d), d.ty.clone())
                })
                .collect_vec();
            cmds.push(Cmd::assert(
                decreases_less(&new, &self.wf.caller_decreases, false),
                token,
                "cannot prove termination; try supplying a decreases clause",
            ));
        }

        let mut call_args = type_args.iter().map(|t| self.tr.type_to_ty(t)).collect_vec();
        if callee.has_receiver() {
            call_args.push(match receiver {
                Some(r) => self.et.trans(r),
                None => self.et.this.clone(),
            });
        }
        for (formal, arg) in callee.ins.iter().zip(args) {
            call_args.push(coerce_value(self.et.trans(arg), &formal.ty, &arg.ty));
        }
        let outs = callee
            .outs
            .iter()
            .map(|f| self.fresh_local("$rhs", boogie_type(&f.ty)))
            .collect_vec();
        cmds.push(Cmd::Call {
            callee: boogie_call_proc_name(env, method),
            args: call_args,
            outs: outs.clone(),
        });
        outs
    }

    // Loops
    // -----

    #[allow(clippy::too_many_arguments)]
    fn trans_while(
        &self,
        s: &Stmt,
        guard: Option<&Exp>,
        invariants: &[SpecExp],
        decreases: &[Exp],
        modifies: Option<&[FrameExp]>,
        body: Option<&Stmt>,
        cmds: &mut Vec<Cmd>,
    ) {
        let n = self.ctx().fresh.fresh_index("$loop");
        let suffix = format!("$loop#{}", n);
        let pre_heap = format!("$PreLoopHeap{}", suffix);
        let flag = format!("$w{}", suffix);
        self.ctx().add_local_var(&pre_heap, heap_type());
        self.ctx().add_local_var(&flag, BType::Bool);

        // The loop frame, if declared, must be within the enclosing one.
        let st = match modifies {
            Some(frames) => {
                self.wf.check_frames(frames, cmds);
                cmds.push(Cmd::assert(
                    self.et.frames_subset(frames, &self.frame),
                    self.token(&s.loc),
                    "loop modifies clause might violate context's modifies clause",
                ));
                let frame = format!("$Frame{}", suffix);
                self.ctx().add_local_var(&frame, frame_type());
                cmds.push(Cmd::assign(&frame, self.et.frame_lambda(frames)));
                self.with_frame(&frame)
            }
            None => self.clone(),
        };

        cmds.push(Cmd::assign(&pre_heap, self.heap()));
        let mut init = vec![];
        for (k, d) in decreases.iter().enumerate() {
            let name = format!("$decr_init{}{}", suffix, k);
            self.ctx().add_local_var(&name, boogie_type(&d.ty));
            init.push((BExpr::ident(&name), d.ty.clone()));
            cmds.push(Cmd::assign(&name, self.et.trans(d)));
        }
        cmds.push(Cmd::havoc(&flag));

        let w = BExpr::ident(&flag);
        let token = self.token(&s.loc);
        let assumed = self.assumed();
        let mut invs = vec![Invariant {
            expr: BExpr::binary(BBinOp::Imp, w.clone(), assumed.can_call_all(
                &invariants.iter().map(|i| i.exp.clone()).collect_vec(),
            )),
            free: true,
            token: token.clone(),
            msg: String::new(),
        }];
        for inv in invariants {
            if inv.free {
                invs.push(Invariant {
                    expr: BExpr::imp(w.clone(), assumed.trans(&inv.exp)),
                    free: true,
                    token: self.token(&inv.exp.loc),
                    msg: String::new(),
                });
                continue;
            }
            let (parts, _) = self.et.split(&inv.exp, true, self.inline_limit());
            for part in parts {
                invs.push(Invariant {
                    expr: BExpr::imp(w.clone(), part.expr),
                    free: part.kind == SplitKind::Free,
                    token: part.token,
                    msg: "loop invariant might not hold".to_string(),
                });
            }
        }
        let free_inv = |expr: BExpr| Invariant {
            expr,
            free: true,
            token: token.clone(),
            msg: String::new(),
        };
        invs.push(free_inv(heap_succ(BExpr::ident(&pre_heap), self.heap())));
        let frame_fact = match self.callable {
            CallableId::Iterator(qid) if body.map_or(false, |b| b.contains_yield()) => {
                self.yielding_frame_fact(qid, &pre_heap, &st.frame)
            }
            _ => self
                .et
                .heap_frame_fact(BExpr::ident(&pre_heap), Self::in_frame_var(&st.frame)),
        };
        invs.push(free_inv(frame_fact));
        if !decreases.is_empty() {
            let now = decreases
                .iter()
                .map(|d| (assumed.trans(d), d.ty.clone()))
                .collect_vec();
            invs.push(free_inv(decreases_less(&now, &init, true)));
        }

        let mut loop_body = vec![];
        // Well-formedness of the invariants, guard and decreases, checked once.
        let mut once = vec![];
        for inv in invariants {
            self.wf.check(&inv.exp, &mut once);
            once.push(Cmd::Assume(assumed.trans(&inv.exp)));
        }
        if let Some(g) = guard {
            self.wf.check(g, &mut once);
        }
        self.wf.check_all(decreases, &mut once);
        once.push(Cmd::Assume(BExpr::fals()));
        loop_body.push(Cmd::If {
            guard: Some(BExpr::not(w)),
            then: once,
            els: vec![],
        });
        if let Some(g) = guard {
            loop_body.push(Cmd::If {
                guard: Some(BExpr::not(self.et.trans(g))),
                then: vec![Cmd::Break],
                els: vec![],
            });
        }
        let mut snapshot = vec![];
        for (k, d) in decreases.iter().enumerate() {
            let name = format!("$decr{}{}", suffix, k);
            self.ctx().add_local_var(&name, boogie_type(&d.ty));
            snapshot.push((BExpr::ident(&name), d.ty.clone()));
            loop_body.push(Cmd::assign(&name, self.et.trans(d)));
        }
        if let Some(body) = body {
            st.trans_stmt(body, &mut loop_body);
        }
        if !decreases.is_empty() {
            let now = decreases
                .iter()
                .map(|d| (self.et.trans(d), d.ty.clone()))
                .collect_vec();
            loop_body.push(Cmd::assert(
                decreases_less(&now, &snapshot, false),
                token,
                "decreases expression might not decrease",
            ));
        }
        cmds.push(Cmd::While {
            guard: None,
            invariants: invs,
            body: loop_body,
        });
        if let Some(g) = guard {
            cmds.push(Cmd::Assume(BExpr::not(assumed.trans(g))));
        }
    }

    // Forall statements
    // -----------------

    fn trans_forall(
        &self,
        vars: &[BoundVar],
        range: Option<&Exp>,
        ensures: &[SpecExp],
        body: Option<&Stmt>,
        cmds: &mut Vec<Cmd>,
    ) {
        // Definedness: one arbitrary instance.
        let mut def = vec![];
        for v in vars {
            let name = self.declare_local(&v.name, &v.ty);
            def.push(Cmd::havoc(&name));
        }
        if let Some(r) = range {
            self.wf.check(r, &mut def);
            self.assume(r, &mut def);
        }
        if let Some(body) = body {
            self.trans_stmt(body, &mut def);
        }
        for e in ensures {
            self.check_spec(e, "possible violation of postcondition of forall statement", &mut def);
        }
        def.push(Cmd::Assume(BExpr::fals()));

        // Exporter: the quantified effect.
        let mut export = vec![];
        let bvars = ExpTranslator::bound_vars(vars);
        let q = self.assumed().shadow(vars.iter().map(|v| &v.name));
        // The range is evaluated in the heap before the statement.
        let range_in = |et: &ExpTranslator| {
            BExpr::and(
                q.typing(vars),
                range.map(|r| et.trans(r)).unwrap_or_else(BExpr::tru),
            )
        };
        let quantify = |antecedent: &BExpr, body: BExpr| {
            let formula = BExpr::imp(antecedent.clone(), body);
            let triggers = synthesize_triggers(&bvars, &formula);
            BExpr::forall(bvars.clone(), triggers, formula)
        };
        let mut antecedent = range_in(&q);
        let mut post_et = q.clone();
        match body.map(|b| &b.kind) {
            Some(StmtKind::Assign { lhss, rhss })
                if lhss.len() == 1 && matches!(rhss.as_slice(), [Rhs::Exp(_)]) =>
            {
                let (Some(lhs), Some(Rhs::Exp(rhs))) = (lhss.first(), rhss.first()) else {
                    panic!("BUG: mass assignment without value")
                };
                let prev_name = self.fresh_local("$prevHeap", heap_type());
                let prev = BExpr::ident(&prev_name);
                let at_prev = q.with_heap(prev.clone());
                antecedent = range_in(&at_prev);
                let (obj, field) = self.location(&at_prev, lhs);
                export.push(Cmd::assign(&prev_name, self.heap()));
                export.push(Cmd::havoc(HEAP));
                export.push(Cmd::Assume(is_good_heap(self.heap())));
                export.push(Cmd::Assume(heap_succ(prev.clone(), self.heap())));
                export.push(Cmd::Assume(self.et.heap_frame_fact(prev.clone(), |o, f| {
                    BExpr::exists(
                        bvars.clone(),
                        vec![],
                        BExpr::and_all(vec![
                            antecedent.clone(),
                            BExpr::eq(o, obj.clone()),
                            BExpr::eq(f, field.clone()),
                        ]),
                    )
                })));
                let value = coerce_value(at_prev.trans(rhs), &lhs.ty, &rhs.ty);
                export.push(Cmd::Assume(quantify(
                    &antecedent,
                    BExpr::eq(
                        unbox_value(heap_read(self.heap(), obj.clone(), field.clone()), &lhs.ty),
                        value,
                    ),
                )));
                post_et = q.with_old_heap(prev);
            }
            Some(StmtKind::Call {
                lhss,
                method,
                receiver,
                type_args,
                args,
            }) if lhss.is_empty() => {
                let callee = self.env().method(*method);
                let changes_heap = !callee.modifies.is_empty();
                // Arguments are evaluated before the call.
                let pre_state = |e: &Exp| {
                    if changes_heap {
                        ExpData::new(ExpKind::Old(e.clone()), e.ty.clone(), e.loc)
                    } else {
                        e.clone()
                    }
                };
                let mut subst = Substitution::new()
                    .with_vars(
                        callee
                            .ins
                            .iter()
                            .map(|f| f.name.clone())
                            .zip(args.iter().map(pre_state)),
                    )
                    .with_types(ExpTranslator::type_instantiation(
                        &callee.type_params,
                        type_args,
                    ));
                if let Some(r) = receiver {
                    subst = subst.with_receiver(pre_state(r));
                }
                let mut call_et = q.clone();
                if changes_heap {
                    let prev = self.havoc_heap("$prevHeap", Self::in_frame_var(&self.frame), &mut export);
                    let prev = BExpr::ident(&prev);
                    antecedent = range_in(&q.with_heap(prev.clone()));
                    call_et = q.with_old_heap(prev.clone());
                    post_et = q.with_old_heap(prev);
                }
                let posts = callee
                    .ensures
                    .iter()
                    .map(|e| call_et.trans(&subst.apply(&e.exp, &self.ctx().fresh)))
                    .collect_vec();
                export.push(Cmd::Assume(quantify(&antecedent, BExpr::and_all(posts))));
            }
            _ => {}
        }
        if !ensures.is_empty() {
            let posts = ensures.iter().map(|e| post_et.trans(&e.exp)).collect_vec();
            export.push(Cmd::Assume(quantify(&antecedent, BExpr::and_all(posts))));
        }
        cmds.push(Cmd::If {
            guard: None,
            then: def,
            els: export,
        });
    }

    /// Object and field denoted by an assignable expression, without checks.
    fn location(&self, et: &ExpTranslator, lhs: &Exp) -> (BExpr, BExpr) {
        match &lhs.kind {
            ExpKind::FieldSelect { obj, field } => (
                et.trans(obj),
                BExpr::ident(&boogie_field_name(self.env(), *field)),
            ),
            ExpKind::ArraySelect { array, indices } => (
                et.trans(array),
                array_index_field(indices.iter().map(|i| et.trans(i)).collect()),
            ),
            ExpKind::Select { collection, index } => (
                et.trans(collection),
                array_index_field(vec![et.trans(index)]),
            ),
            _ => panic!("BUG: mass assignment to a non-heap location"),
        }
    }

    // Calculations
    // ------------

    fn trans_calc(
        &self,
        op: CalcOp,
        lines: &[Exp],
        steps: &[CalcOp],
        hints: &[Stmt],
        cmds: &mut Vec<Cmd>,
    ) {
        if lines.len() < 2 {
            self.wf.check_all(lines, cmds);
            return;
        }
        if steps.len() != lines.len() - 1 || hints.len() != steps.len() {
            panic!("BUG: calculation with mismatched steps and lines")
        }
        // Steps are nested back to front: `if (*) { step 0 } else if (*) { step 1 } ..`.
        let mut els = vec![];
        for (i, step) in steps.iter().enumerate().rev() {
            let mut branch = vec![];
            self.wf.check(&lines[i], &mut branch);
            self.wf.check(&lines[i + 1], &mut branch);
            self.trans_stmt(&hints[i], &mut branch);
            let relation = ExpData::binary(step.to_binary(), lines[i].clone(), lines[i + 1].clone())
                .at(lines[i + 1].loc);
            self.check_split(
                &relation,
                "the calculation step between the previous line and this line might not hold",
                &mut branch,
            );
            branch.push(Cmd::Assume(BExpr::fals()));
            els = vec![Cmd::If {
                guard: None,
                then: branch,
                els,
            }];
        }
        cmds.extend(els);
        let last = lines.len() - 1;
        let result = ExpData::binary(op.to_binary(), lines[0].clone(), lines[last].clone());
        self.assume(&result, cmds);
    }

    // Matches
    // -------

    fn trans_match(
        &self,
        s: &Stmt,
        source: &Exp,
        cases: &[MatchCaseStmt],
        missing: &[CtorRef],
        cmds: &mut Vec<Cmd>,
    ) {
        self.wf.check(source, cmds);
        let src = self.et.trans(source);
        let env = self.env();
        let test = |ctor: CtorRef| BExpr::call(&boogie_ctor_test_name(env, ctor), vec![src.clone()]);
        let mut els = vec![Cmd::Assume(BExpr::fals())];
        for ctor in missing.iter().rev() {
            els = vec![Cmd::If {
                guard: Some(test(*ctor)),
                then: vec![Cmd::assert(
                    BExpr::fals(),
                    self.token(&s.loc),
                    &format!("missing case in match statement: {}", env.ctor(*ctor).name),
                )],
                els,
            }];
        }
        for case in cases.iter().rev() {
            let formals = &env.ctor(case.ctor).formals;
            let mut branch = vec![];
            for (i, v) in case.vars.iter().enumerate() {
                let name = self.declare_local(&v.name, &v.ty);
                let dtor = BExpr::call(&boogie_dtor_name(env, case.ctor, i), vec![src.clone()]);
                branch.push(Cmd::assign(&name, coerce_value(dtor, &v.ty, &formals[i].ty)));
            }
            self.trans_stmts(&case.body, &mut branch);
            els = vec![Cmd::If {
                guard: Some(test(case.ctor)),
                then: branch,
                els,
            }];
        }
        cmds.extend(els);
    }

    // Modify
    // ------

    fn trans_modify(&self, s: &Stmt, frame: &[FrameExp], body: Option<&Stmt>, cmds: &mut Vec<Cmd>) {
        self.wf.check_frames(frame, cmds);
        cmds.push(Cmd::assert(
            self.et.frames_subset(frame, &self.frame),
            self.token(&s.loc),
            "modify statement might violate context's modifies clause",
        ));
        match body {
            None => {
                let frame_et = self.et.clone();
                let prev = self.fresh_local("$PreModifyHeap", heap_type());
                let at_prev = frame_et.with_heap(BExpr::ident(&prev));
                cmds.push(Cmd::assign(&prev, self.heap()));
                cmds.push(Cmd::havoc(HEAP));
                cmds.push(Cmd::Assume(is_good_heap(self.heap())));
                cmds.push(Cmd::Assume(heap_succ(BExpr::ident(&prev), self.heap())));
                cmds.push(Cmd::Assume(self.et.heap_frame_fact(BExpr::ident(&prev), |o, f| {
                    at_prev.in_frame(frame, o, Some(f))
                })));
            }
            Some(body) => {
                let name = self.fresh_local("$Frame$modify", frame_type());
                cmds.push(Cmd::assign(&name, self.et.frame_lambda(frame)));
                self.with_frame(&name).trans_stmt(body, cmds);
            }
        }
    }
}
