// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Definedness checks of expressions.
//!
//! `WfChecker::check` emits commands asserting that an expression is defined: receivers are
//! non-null, indices are in range, divisors are non-zero, callee preconditions hold, reads
//! are covered by the enclosing reads frame, and recursive calls terminate. Conditional
//! sub-expressions are checked under their guards.

use crate::boogie_backend::{
    boogie_helpers::{
        array_index_field, boogie_can_call_name, boogie_ctor_test_name, boogie_dtor_name,
        boogie_field_name, boogie_local_name, field_type, frame_type, is_allocated, null,
        ref_type,
    },
    exp_translator::ExpTranslator,
    substitution::Substitution,
    termination::{callable_decreases, decreases_less},
    type_encoder::{boogie_type, coerce_value},
};
use itertools::Itertools;
use veri_boogie_ir::{BExpr, BType, BVar, Cmd, Token};
use veri_model::{
    ast::{BinaryOp, BoundVar, Exp, ExpData, ExpKind, FrameExp},
    model::{CallableId, FunId, QualifiedId},
    ty::Type,
};

#[derive(Clone)]
pub struct WfChecker<'a> {
    pub et: ExpTranslator<'a>,
    /// Frame variable bounding heap reads. Methods may read anything and use `None`.
    pub reads_frame: Option<String>,
    /// The callable being checked, for termination of calls into its component.
    pub callable: Option<CallableId>,
    /// Values of the caller's decreases tuple on entry.
    pub caller_decreases: Vec<(BExpr, Type)>,
    /// Whether a call of the checked function on its own formals denotes its result, as in
    /// postconditions.
    pub self_call_is_result: bool,
}

impl<'a> WfChecker<'a> {
    pub fn new(et: ExpTranslator<'a>) -> Self {
        Self {
            et,
            reads_frame: None,
            callable: None,
            caller_decreases: vec![],
            self_call_is_result: false,
        }
    }

    pub fn with_reads_frame(mut self, frame: &str) -> Self {
        self.reads_frame = Some(frame.to_string());
        self
    }

    pub fn with_callable(mut self, callable: CallableId, decreases: Vec<(BExpr, Type)>) -> Self {
        self.callable = Some(callable);
        self.caller_decreases = decreases;
        self
    }

    pub fn in_postcondition(mut self) -> Self {
        self.self_call_is_result = true;
        self
    }

    fn with_et(&self, et: ExpTranslator<'a>) -> Self {
        Self {
            et,
            ..self.clone()
        }
    }

    fn token(&self, e: &Exp) -> Token {
        self.et.tr.token(&e.loc)
    }

    fn assert(&self, e: &Exp, cond: BExpr, msg: &str, cmds: &mut Vec<Cmd>) {
        if !cond.is_true() {
            cmds.push(Cmd::assert(cond, self.token(e), msg))
        }
    }

    fn non_null(&self, e: &Exp, obj: &Exp, cmds: &mut Vec<Cmd>) {
        if !matches!(obj.kind, ExpKind::This) {
            self.assert(
                e,
                BExpr::neq(self.et.trans(obj), null()),
                "target object might be null",
                cmds,
            )
        }
    }

    fn check_read(&self, e: &Exp, obj: BExpr, field: BExpr, msg: &str, cmds: &mut Vec<Cmd>) {
        if let Some(frame) = &self.reads_frame {
            self.assert(
                e,
                BExpr::select(BExpr::ident(frame), vec![obj, field]),
                msg,
                cmds,
            )
        }
    }

    fn in_range(lo: BExpr, i: BExpr, hi: BExpr) -> BExpr {
        BExpr::and(BExpr::le(lo, i.clone()), BExpr::lt(i, hi))
    }

    /// Havocs bound variables as locals and assumes their typing.
    fn bind_vars(&self, vars: &[BoundVar], cmds: &mut Vec<Cmd>) -> ExpTranslator<'a> {
        let et = self.et.shadow(vars.iter().map(|v| &v.name));
        for v in vars {
            let name = boogie_local_name(&v.name);
            self.et.ctx.add_local_var(&name, boogie_type(&v.ty));
            cmds.push(Cmd::havoc(&name));
        }
        cmds.push(Cmd::Assume(et.typing(vars)));
        et
    }

    /// A fresh local holding the value of a let or case variable.
    fn let_local(&self, v: &BoundVar, value: BExpr, cmds: &mut Vec<Cmd>) -> Exp {
        let name = self.et.ctx.fresh.fresh(&format!("{}$let", v.name));
        self.et.ctx.add_local_var(&name, boogie_type(&v.ty));
        cmds.push(Cmd::assign(&name, value));
        ExpData::local(&name, v.ty.clone())
    }

    fn substitute_locals(&self, vars: &[BoundVar], locals: Vec<Exp>, body: &Exp) -> Exp {
        Substitution::new()
            .with_vars(vars.iter().map(|v| v.name.clone()).zip(locals))
            .apply(body, &self.et.ctx.fresh)
    }

    pub fn check_all(&self, exps: &[Exp], cmds: &mut Vec<Cmd>) {
        for e in exps {
            self.check(e, cmds)
        }
    }

    /// Checks `e` and assumes it afterwards.
    pub fn check_and_assume(&self, e: &Exp, cmds: &mut Vec<Cmd>) {
        self.check(e, cmds);
        cmds.push(Cmd::Assume(self.et.trans(e)));
    }

    pub fn check_frames(&self, frames: &[FrameExp], cmds: &mut Vec<Cmd>) {
        for f in frames {
            self.check(&f.exp, cmds)
        }
    }

    pub fn check(&self, e: &Exp, cmds: &mut Vec<Cmd>) {
        use ExpKind::*;
        let et = &self.et;
        match &e.kind {
            Value(_) | LocalVar(_) | This => {}
            FieldSelect { obj, field } => {
                self.check(obj, cmds);
                self.non_null(e, obj, cmds);
                if et.tr.env.field(*field).mutable {
                    self.check_read(
                        e,
                        et.trans(obj),
                        BExpr::ident(&boogie_field_name(et.tr.env, *field)),
                        "insufficient reads clause to read field",
                        cmds,
                    )
                }
            }
            Destructor { obj, ctor, .. } => {
                self.check(obj, cmds);
                self.assert(
                    e,
                    BExpr::call(&boogie_ctor_test_name(et.tr.env, *ctor), vec![et.trans(obj)]),
                    &format!(
                        "destructor can only be applied to datatype values constructed by '{}'",
                        et.tr.env.ctor(*ctor).name
                    ),
                    cmds,
                )
            }
            ArrayLength { array, .. } => {
                self.check(array, cmds);
                self.non_null(e, array, cmds);
            }
            Select { collection, index } => {
                self.check(collection, cmds);
                self.check(index, cmds);
                let c = et.trans(collection);
                match &collection.ty {
                    Type::Seq(_) => self.assert(
                        e,
                        Self::in_range(
                            BExpr::int(0),
                            et.trans(index),
                            BExpr::call("Seq#Length", vec![c]),
                        ),
                        "index out of range",
                        cmds,
                    ),
                    Type::Map(..) | Type::IMap(..) => {
                        let prefix = if matches!(collection.ty, Type::Map(..)) {
                            "Map"
                        } else {
                            "IMap"
                        };
                        self.assert(
                            e,
                            BExpr::select(
                                BExpr::call(&format!("{}#Domain", prefix), vec![c]),
                                vec![et.boxed(index)],
                            ),
                            "element might not be in domain",
                            cmds,
                        )
                    }
                    Type::Array { .. } => {
                        self.non_null(e, collection, cmds);
                        let i = et.trans(index);
                        self.assert(
                            e,
                            Self::in_range(
                                BExpr::int(0),
                                i.clone(),
                                BExpr::call("$ArrayLength", vec![c.clone(), BExpr::int(0)]),
                            ),
                            "index out of range",
                            cmds,
                        );
                        self.check_read(
                            e,
                            c,
                            array_index_field(vec![i]),
                            "insufficient reads clause to read array element",
                            cmds,
                        )
                    }
                    _ => {}
                }
            }
            ArraySelect { array, indices } => {
                self.check(array, cmds);
                self.check_all(indices, cmds);
                self.non_null(e, array, cmds);
                let a = et.trans(array);
                let is = indices.iter().map(|i| et.trans(i)).collect_vec();
                for (k, i) in is.iter().enumerate() {
                    self.assert(
                        e,
                        Self::in_range(
                            BExpr::int(0),
                            i.clone(),
                            BExpr::call("$ArrayLength", vec![a.clone(), BExpr::int(k as i64)]),
                        ),
                        &format!("index {} out of range", k),
                        cmds,
                    )
                }
                self.check_read(
                    e,
                    a,
                    array_index_field(is),
                    "insufficient reads clause to read array element",
                    cmds,
                )
            }
            SeqSlice { seq, lo, hi } => {
                self.check(seq, cmds);
                let len = match &seq.ty {
                    Type::Array { .. } => {
                        self.non_null(e, seq, cmds);
                        BExpr::call("$ArrayLength", vec![et.trans(seq), BExpr::int(0)])
                    }
                    _ => BExpr::call("Seq#Length", vec![et.trans(seq)]),
                };
                let lo_t = lo.as_ref().map(|l| {
                    self.check(l, cmds);
                    et.trans(l)
                });
                let hi_t = hi.as_ref().map(|h| {
                    self.check(h, cmds);
                    et.trans(h)
                });
                if let Some(h) = &hi_t {
                    self.assert(
                        e,
                        BExpr::and(BExpr::le(BExpr::int(0), h.clone()), BExpr::le(h.clone(), len.clone())),
                        "upper bound of slice out of range",
                        cmds,
                    )
                }
                if let Some(l) = &lo_t {
                    let upper = hi_t.clone().unwrap_or(len);
                    self.assert(
                        e,
                        BExpr::and(BExpr::le(BExpr::int(0), l.clone()), BExpr::le(l.clone(), upper)),
                        "lower bound of slice out of range",
                        cmds,
                    )
                }
                if let Type::Array { .. } = &seq.ty {
                    if let Some(frame) = &self.reads_frame {
                        let i = BVar::new("$i", BType::Int);
                        let a = et.trans(seq);
                        self.assert(
                            e,
                            BExpr::forall(
                                vec![i.clone()],
                                vec![],
                                BExpr::imp(
                                    BExpr::le(BExpr::int(0), i.to_expr()),
                                    BExpr::select(
                                        BExpr::ident(frame),
                                        vec![a.clone(), array_index_field(vec![i.to_expr()])],
                                    ),
                                ),
                            ),
                            "insufficient reads clause to read the array",
                            cmds,
                        )
                    }
                }
            }
            Update {
                collection,
                index,
                value,
            } => {
                self.check(collection, cmds);
                self.check(index, cmds);
                self.check(value, cmds);
                match &collection.ty {
                    Type::Seq(_) => self.assert(
                        e,
                        Self::in_range(
                            BExpr::int(0),
                            et.trans(index),
                            BExpr::call("Seq#Length", vec![et.trans(collection)]),
                        ),
                        "index out of range",
                        cmds,
                    ),
                    Type::MultiSet(_) => self.assert(
                        e,
                        BExpr::le(BExpr::int(0), et.trans(value)),
                        "new number of occurrences might be negative",
                        cmds,
                    ),
                    _ => {}
                }
            }
            FunctionCall {
                fun,
                receiver,
                type_args,
                args,
            } => self.check_call(e, *fun, receiver.as_ref(), type_args, args, cmds),
            Apply { fun, args } => {
                self.check(fun, cmds);
                self.check_all(args, cmds);
                let n = args.len();
                let (arg_tys, res_ty) = match &fun.ty {
                    Type::Arrow(a, r) => (a, r),
                    ty => panic!("BUG: application of a value of type {}", ty),
                };
                let mut call_args = arg_tys.iter().map(|t| et.tr.type_to_ty(t)).collect_vec();
                call_args.push(et.tr.type_to_ty(res_ty));
                call_args.push(et.heap.clone());
                call_args.push(et.trans(fun));
                call_args.extend(args.iter().map(|a| et.boxed(a)));
                self.assert(
                    e,
                    BExpr::call(&format!("Requires{}", n), call_args.clone()),
                    "possible violation of function precondition",
                    cmds,
                );
                if let Some(frame) = &self.reads_frame {
                    let o = BVar::new("$o", ref_type());
                    let f = BVar::new("$f", field_type());
                    let reads = BExpr::call(&format!("Reads{}", n), call_args);
                    self.assert(
                        e,
                        BExpr::forall(
                            vec![o.clone(), f.clone()],
                            vec![],
                            BExpr::imp(
                                BExpr::and(
                                    BExpr::neq(o.to_expr(), null()),
                                    BExpr::select(
                                        reads,
                                        vec![BExpr::call("$Box", vec![o.to_expr()])],
                                    ),
                                ),
                                BExpr::select(BExpr::ident(frame), vec![o.to_expr(), f.to_expr()]),
                            ),
                        ),
                        "insufficient reads clause to invoke the function",
                        cmds,
                    )
                }
            }
            DatatypeValue { args, .. } => self.check_all(args, cmds),
            SetDisplay(es) | MultiSetDisplay(es) | SeqDisplay(es) => self.check_all(es, cmds),
            MapDisplay(pairs) => {
                for (k, v) in pairs {
                    self.check(k, cmds);
                    self.check(v, cmds);
                }
            }
            DatatypeTest { obj, .. } => self.check(obj, cmds),
            Old(inner) => self.with_et(et.old()).check(inner, cmds),
            Fresh(inner) | Allocated(inner) => self.check(inner, cmds),
            Unary { operand, .. } => self.check(operand, cmds),
            Conversion(inner) => {
                self.check(inner, cmds);
                match (&inner.ty, &e.ty) {
                    (Type::Int, Type::Char) => self.assert(
                        e,
                        Self::in_range(BExpr::int(0), et.trans(inner), BExpr::int(65536)),
                        "value to be converted might not fit in char",
                        cmds,
                    ),
                    (Type::Real, Type::Int) => self.assert(
                        e,
                        BExpr::eq(
                            BExpr::call("real", vec![BExpr::call("int", vec![et.trans(inner)])]),
                            et.trans(inner),
                        ),
                        "the real-based number must be an integer",
                        cmds,
                    ),
                    _ => {}
                }
            }
            Binary { op, lhs, rhs } => {
                self.check(lhs, cmds);
                match op {
                    BinaryOp::And | BinaryOp::Imp | BinaryOp::Or => {
                        let mut guarded = vec![];
                        self.check(rhs, &mut guarded);
                        if !guarded.is_empty() {
                            let l = et.trans(lhs);
                            let guard = if *op == BinaryOp::Or { BExpr::not(l) } else { l };
                            cmds.push(Cmd::If {
                                guard: Some(guard),
                                then: guarded,
                                els: vec![],
                            })
                        }
                    }
                    BinaryOp::Div | BinaryOp::Mod => {
                        self.check(rhs, cmds);
                        let zero = if rhs.ty == Type::Real {
                            BExpr::Real("0.0".to_string())
                        } else {
                            BExpr::int(0)
                        };
                        self.assert(
                            e,
                            BExpr::neq(et.strip_lits().trans(rhs), zero),
                            "possible division by zero",
                            cmds,
                        )
                    }
                    _ => self.check(rhs, cmds),
                }
            }
            Ite { cond, then, els } => {
                self.check(cond, cmds);
                let mut t = vec![];
                let mut f = vec![];
                self.check(then, &mut t);
                self.check(els, &mut f);
                if !t.is_empty() || !f.is_empty() {
                    cmds.push(Cmd::If {
                        guard: Some(et.trans(cond)),
                        then: t,
                        els: f,
                    })
                }
            }
            Let { vars, rhss, body } => {
                self.check_all(rhss, cmds);
                let locals = vars
                    .iter()
                    .zip(rhss)
                    .map(|(v, r)| self.let_local(v, et.trans(r), cmds))
                    .collect_vec();
                self.check(&self.substitute_locals(vars, locals, body), cmds)
            }
            Quantifier {
                vars, range, body, ..
            } => {
                let mut inner = vec![];
                let et = self.bind_vars(vars, &mut inner);
                let checker = self.with_et(et);
                if let Some(r) = range {
                    checker.check_and_assume(r, &mut inner);
                }
                checker.check(body, &mut inner);
                self.close_branch(inner, cmds)
            }
            SetComprehension {
                finite,
                vars,
                range,
                term,
            } => {
                if *finite {
                    self.check_finite(e, "set", vars, range);
                }
                let mut inner = vec![];
                let et = self.bind_vars(vars, &mut inner);
                let checker = self.with_et(et);
                checker.check_and_assume(range, &mut inner);
                if let Some(t) = term {
                    checker.check(t, &mut inner);
                }
                self.close_branch(inner, cmds)
            }
            MapComprehension {
                finite,
                var,
                range,
                term,
            } => {
                if *finite {
                    self.check_finite(e, "map", std::slice::from_ref(var), range);
                }
                let mut inner = vec![];
                let et = self.bind_vars(std::slice::from_ref(var), &mut inner);
                let checker = self.with_et(et);
                checker.check_and_assume(range, &mut inner);
                checker.check(term, &mut inner);
                self.close_branch(inner, cmds)
            }
            Lambda {
                vars,
                requires,
                reads,
                body,
            } => {
                let mut inner = vec![];
                let et = self.bind_vars(vars, &mut inner);
                let checker = self.with_et(et.clone());
                if let Some(r) = requires {
                    checker.check_and_assume(r, &mut inner);
                }
                checker.check_frames(reads, &mut inner);
                let frame = et.ctx.fresh.fresh("$lambdaFrame");
                et.ctx
                    .add_local_var(&frame, frame_type());
                inner.push(Cmd::assign(&frame, et.frame_lambda(reads)));
                let body_checker = WfChecker {
                    reads_frame: Some(frame),
                    // Calls in a lambda body do not recurse through the enclosing callable.
                    callable: None,
                    caller_decreases: vec![],
                    self_call_is_result: false,
                    et,
                };
                body_checker.check(body, &mut inner);
                self.close_branch(inner, cmds)
            }
            Match { source, cases } => {
                self.check(source, cmds);
                let src = et.trans(source);
                for case in cases {
                    let formals = &et.tr.env.ctor(case.ctor).formals;
                    let mut inner = vec![];
                    let locals = case
                        .vars
                        .iter()
                        .enumerate()
                        .map(|(i, v)| {
                            let dtor = BExpr::call(
                                &boogie_dtor_name(et.tr.env, case.ctor, i),
                                vec![src.clone()],
                            );
                            self.let_local(v, coerce_value(dtor, &v.ty, &formals[i].ty), &mut inner)
                        })
                        .collect_vec();
                    let bound = inner.len();
                    self.check(&self.substitute_locals(&case.vars, locals, &case.body), &mut inner);
                    if inner.len() > bound {
                        cmds.push(Cmd::If {
                            guard: Some(BExpr::call(
                                &boogie_ctor_test_name(et.tr.env, case.ctor),
                                vec![src.clone()],
                            )),
                            then: inner,
                            els: vec![],
                        })
                    }
                }
            }
        }
    }

    /// A finite comprehension needs a bound for each of its variables in its range.
    fn check_finite(&self, e: &Exp, what: &str, vars: &[BoundVar], range: &Exp) {
        let mut conjuncts = vec![];
        flatten_and(range, &mut conjuncts);
        for v in vars.iter().filter(|v| !is_bounded(v, &conjuncts)) {
            self.et.tr.error(
                &e.loc,
                &format!(
                    "a {} comprehension must produce a finite {}, but no bound was found for `{}`",
                    what, what, v.name
                ),
            )
        }
    }

    /// Wraps the checks of a binder body in `if (*) { .. assume false; }`.
    fn close_branch(&self, mut inner: Vec<Cmd>, cmds: &mut Vec<Cmd>) {
        if inner.iter().any(|c| matches!(c, Cmd::Assert { .. } | Cmd::If { .. })) {
            inner.push(Cmd::Assume(BExpr::fals()));
            cmds.push(Cmd::nondet(inner))
        }
    }

    fn check_call(
        &self,
        e: &Exp,
        fun: QualifiedId<FunId>,
        receiver: Option<&Exp>,
        type_args: &[Type],
        args: &[Exp],
        cmds: &mut Vec<Cmd>,
    ) {
        let et = &self.et;
        let env = et.tr.env;
        let data = env.function(fun);
        if let Some(r) = receiver {
            self.check(r, cmds);
            if data.has_receiver() {
                self.non_null(e, r, cmds);
            }
        }
        self.check_all(args, cmds);

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
        let fresh = &et.ctx.fresh;
        for pre in &data.requires {
            let pre = subst.apply(pre, fresh);
            self.assert(
                e,
                et.trans(&pre),
                "possible violation of function precondition",
                cmds,
            );
        }
        if let (Some(frame), true) = (&self.reads_frame, data.reads_heap()) {
            let reads = subst.apply_frames(&data.reads, fresh);
            let o = BVar::new("$o", ref_type());
            let f = BVar::new("$f", field_type());
            self.assert(
                e,
                BExpr::forall(
                    vec![o.clone(), f.clone()],
                    vec![],
                    BExpr::imp(
                        BExpr::and(
                            BExpr::and(
                                BExpr::neq(o.to_expr(), null()),
                                is_allocated(et.heap.clone(), o.to_expr()),
                            ),
                            et.in_frame(&reads, o.to_expr(), Some(f.to_expr())),
                        ),
                        BExpr::select(BExpr::ident(frame), vec![o.to_expr(), f.to_expr()]),
                    ),
                ),
                "insufficient reads clause to invoke function",
                cmds,
            );
        }
        if let Some(caller) = self.callable {
            let callee = CallableId::Function(fun);
            if env.in_same_scc(caller, callee) && !self.is_self_result(caller, fun, receiver, args)
            {
                let new = callable_decreases(env, callee)
                    .iter()
                    .map(|d| {
                        let d = subst.apply(d, fresh);
                        (et.trans(&d), d.ty.clone())
                    })
                    .collect_vec();
                self.assert(
                    e,
                    decreases_less(&new, &self.caller_decreases, false),
                    "cannot prove termination; try supplying a decreases clause",
                    cmds,
                );
            }
        }
        cmds.push(Cmd::Assume(BExpr::call(
            &boogie_can_call_name(env, fun),
            et.call_args(fun, receiver, type_args, args, false),
        )));
    }

    /// A call of the function being checked with its own formals denotes its result (in
    /// postconditions) and is not a recursive call.
    fn is_self_result(
        &self,
        caller: CallableId,
        fun: QualifiedId<FunId>,
        receiver: Option<&Exp>,
        args: &[Exp],
    ) -> bool {
        if !self.self_call_is_result || caller != CallableId::Function(fun) {
            return false;
        }
        let formals = &self.et.tr.env.function(fun).formals;
        receiver.map_or(true, |r| matches!(r.kind, ExpKind::This))
            && formals.len() == args.len()
            && formals
                .iter()
                .zip(args)
                .all(|(f, a)| matches!(&a.kind, ExpKind::LocalVar(n) if *n == f.name))
    }
}

fn flatten_and<'e>(e: &'e Exp, out: &mut Vec<&'e Exp>) {
    match &e.kind {
        ExpKind::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
        } => {
            flatten_and(lhs, out);
            flatten_and(rhs, out)
        }
        _ => out.push(e),
    }
}

/// Whether `v` ranges over a finite type, or one of the conjuncts confines it to a finite
/// collection, a single value or an integer interval.
fn is_bounded(v: &BoundVar, conjuncts: &[&Exp]) -> bool {
    if matches!(v.ty, Type::Bool | Type::Char | Type::BitVector(_)) {
        return true;
    }
    let is_var = |e: &Exp| matches!(&e.kind, ExpKind::LocalVar(n) if *n == v.name);
    let without_var = |e: &Exp| !e.free_vars().contains(&v.name);
    let (mut lower, mut upper) = (false, false);
    for c in conjuncts {
        let ExpKind::Binary { op, lhs, rhs } = &c.kind else {
            continue;
        };
        let (below, above) = match op {
            BinaryOp::In => {
                let finite = matches!(
                    rhs.ty,
                    Type::Set(_) | Type::MultiSet(_) | Type::Seq(_) | Type::Map(..)
                );
                if finite && is_var(lhs) && without_var(rhs) {
                    return true;
                }
                continue;
            }
            BinaryOp::Eq => {
                if (is_var(lhs) && without_var(rhs)) || (is_var(rhs) && without_var(lhs)) {
                    return true;
                }
                continue;
            }
            BinaryOp::Le | BinaryOp::Lt => (lhs, rhs),
            BinaryOp::Ge | BinaryOp::Gt => (rhs, lhs),
            _ => continue,
        };
        lower |= is_var(above) && without_var(below);
        upper |= is_var(below) && without_var(above);
    }
    lower && upper && v.ty.is_int()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boogie_backend::{
        decl_translator::BoogieTranslator, options::BoogieOptions, vocabulary::Vocabulary,
    };
    use veri_boogie_ir::visit_cmds;
    use veri_model::{
        codespan_reporting::diagnostic::Severity,
        model::{GlobalEnv, ModuleData},
    };

    /// Runs `f` with a checker in a fresh module and returns the reported errors.
    fn with_checker(f: impl FnOnce(&WfChecker)) -> Vec<String> {
        let mut env = GlobalEnv::new();
        let m = env.add_module(ModuleData::new("M", 0));
        let options = BoogieOptions::default();
        let vocab = Vocabulary::builtin().unwrap();
        {
            let tr = BoogieTranslator::new(&env, &options, &vocab);
            let ctx = tr.new_context(m, None);
            let et = ExpTranslator::new(&tr, &ctx, BExpr::ident("$Heap"));
            f(&WfChecker::new(et));
        }
        env.diag_messages(Severity::Error)
    }

    fn int(name: &str) -> Exp {
        ExpData::local(name, Type::Int)
    }

    fn seq(name: &str) -> Exp {
        ExpData::local(name, Type::seq(Type::Int))
    }

    fn index(s: Exp, i: Exp) -> Exp {
        ExpData::new(
            ExpKind::Select {
                collection: s,
                index: i,
            },
            Type::Int,
            Default::default(),
        )
    }

    fn assertions(cmds: &[Cmd]) -> Vec<(String, String)> {
        let mut result = vec![];
        visit_cmds(cmds, &mut |c| {
            if let Cmd::Assert { expr, msg, .. } = c {
                result.push((expr.to_string(), msg.clone()))
            }
        });
        result
    }

    #[test]
    fn divisors_and_indices_are_checked() {
        let errors = with_checker(|wf| {
            let e = ExpData::binary(BinaryOp::Div, index(seq("s"), int("i")), int("d"));
            let mut cmds = vec![];
            wf.check(&e, &mut cmds);
            let asserts = assertions(&cmds);
            assert_eq!(asserts.len(), 2);
            assert_eq!(asserts[0].1, "index out of range");
            assert!(asserts[0].0.contains("Seq#Length(s#0)"));
            assert_eq!(asserts[1], ("(d#0 != 0)".to_string(), "possible division by zero".to_string()));
        });
        assert!(errors.is_empty());
    }

    #[test]
    fn let_values_live_in_fresh_locals() {
        // var y := s[i]; forall i: int :: s[y] == s[i]
        with_checker(|wf| {
            let body = ExpData::forall(
                vec![BoundVar::new("i", Type::Int)],
                None,
                ExpData::eq(index(seq("s"), int("y")), index(seq("s"), int("i"))),
            );
            let e = ExpData::new(
                ExpKind::Let {
                    vars: vec![BoundVar::new("y", Type::Int)],
                    rhss: vec![index(seq("s"), int("i"))],
                    body,
                },
                Type::Bool,
                Default::default(),
            );
            let mut cmds = vec![];
            wf.check(&e, &mut cmds);
            assert!(matches!(
                &cmds[1],
                Cmd::Assign(lhs, rhs) if lhs[0] == "y$let#0" && rhs[0].to_string().contains("i#0")
            ));
            // The value read before the bound `i` is havocked stays in the local.
            let asserts = assertions(&cmds);
            assert_eq!(asserts.len(), 3);
            assert!(asserts[1].0.contains("y$let#0"));
            assert!(!asserts[1].0.contains("i#0"));
        });
    }

    #[test]
    fn binder_checks_run_in_a_dead_branch() {
        with_checker(|wf| {
            let q = ExpData::forall(
                vec![BoundVar::new("i", Type::Int)],
                Some(ExpData::binary(BinaryOp::Le, ExpData::int_const(0), int("i"))),
                ExpData::binary(BinaryOp::Lt, ExpData::int_const(0), index(seq("s"), int("i"))),
            );
            let mut cmds = vec![];
            wf.check(&q, &mut cmds);
            assert_eq!(cmds.len(), 1);
            let Cmd::If {
                guard: None,
                then,
                els,
            } = &cmds[0]
            else {
                panic!("expected a nondeterministic branch")
            };
            assert!(els.is_empty());
            assert!(matches!(&then[0], Cmd::Havoc(names) if names == &vec!["i#0".to_string()]));
            assert!(matches!(then.last(), Some(Cmd::Assume(e)) if e.is_false()));
        });
    }

    #[test]
    fn finite_comprehensions_need_bounds() {
        let comprehension = |range: Exp| {
            ExpData::new(
                ExpKind::SetComprehension {
                    finite: true,
                    vars: vec![BoundVar::new("x", Type::Int)],
                    range,
                    term: None,
                },
                Type::set(Type::Int),
                Default::default(),
            )
        };
        let unbounded = with_checker(|wf| {
            let positive = ExpData::binary(BinaryOp::Lt, ExpData::int_const(0), int("x"));
            wf.check(&comprehension(positive), &mut vec![]);
        });
        assert_eq!(unbounded.len(), 1);
        assert!(unbounded[0].contains("no bound was found for `x`"));

        let bounded = with_checker(|wf| {
            let interval = ExpData::and(
                ExpData::binary(BinaryOp::Le, ExpData::int_const(0), int("x")),
                ExpData::binary(BinaryOp::Lt, int("x"), int("n")),
            );
            wf.check(&comprehension(interval), &mut vec![]);
            let member = ExpData::binary(BinaryOp::In, int("x"), ExpData::local("s", Type::set(Type::Int)));
            wf.check(&comprehension(member), &mut vec![]);
        });
        assert!(bounded.is_empty());

        // An `iset` needs no bound.
        let infinite = with_checker(|wf| {
            let e = ExpData::new(
                ExpKind::SetComprehension {
                    finite: false,
                    vars: vec![BoundVar::new("x", Type::Int)],
                    range: ExpData::binary(BinaryOp::Lt, ExpData::int_const(0), int("x")),
                    term: None,
                },
                Type::ISet(Box::new(Type::Int)),
                Default::default(),
            );
            wf.check(&e, &mut vec![]);
        });
        assert!(infinite.is_empty());
    }
}
