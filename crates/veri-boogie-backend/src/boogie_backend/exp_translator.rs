// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Translation of pure source expressions into Boogie terms.
//!
//! An `ExpTranslator` is a cheap, immutable handle carrying the heap the expression is
//! evaluated in, the old heap, the receiver, and the fuel setting for calls of fuel-aware
//! functions. Derived handles are created with the `with_*` builders; a handle is never
//! mutated in place.

use crate::boogie_backend::{
    boogie_helpers::{
        boogie_can_call_name, boogie_ctor_name, boogie_ctor_test_name, boogie_dtor_name,
        boogie_field_name, boogie_function_name, boogie_local_name, box_type, field_type,
        heap_read, heap_type, is_allocated, layer_succ, null, ref_type, array_index_field,
        FRAME, THIS,
    },
    context::DeclContext,
    decl_translator::BoogieTranslator,
    fuel::FuelMode,
    substitution::Substitution,
    triggers::synthesize_triggers,
    type_encoder::{boogie_type, box_value, coerce_value, unbox_value},
};
use itertools::Itertools;
use num::BigInt;
use std::{collections::BTreeMap, rc::Rc};
use veri_boogie_ir::{BBinOp, BExpr, BType, BVar};
use veri_model::{
    ast::{
        BinaryOp, BoundVar, Exp, ExpData, ExpKind, FrameExp, MatchCase, QuantKind, UnaryOp, Value,
    },
    model::{CallableId, FunId, QualifiedId},
    ty::Type,
};

#[derive(Clone)]
pub struct ExpTranslator<'a> {
    pub tr: &'a BoogieTranslator<'a>,
    pub ctx: &'a DeclContext,
    pub heap: BExpr,
    pub old_heap: Option<BExpr>,
    pub this: BExpr,
    pub mode: FuelMode,
    /// Additional `$LS` applications on the layer of every fuel-aware call.
    pub layer_offset: u32,
    /// Layer used for calls into the given callable's component instead of the start fuel.
    pub scc_layer: Option<(CallableId, BExpr)>,
    /// Name of the frame variable of the enclosing method or loop.
    pub frame: String,
    pub strip_lits: bool,
    bindings: Rc<BTreeMap<String, BExpr>>,
}

impl<'a> ExpTranslator<'a> {
    pub fn new(tr: &'a BoogieTranslator<'a>, ctx: &'a DeclContext, heap: BExpr) -> Self {
        Self {
            tr,
            ctx,
            heap,
            old_heap: None,
            this: BExpr::ident(THIS),
            mode: FuelMode::Assume,
            layer_offset: 0,
            scc_layer: None,
            frame: FRAME.to_string(),
            strip_lits: false,
            bindings: Rc::new(BTreeMap::new()),
        }
    }

    pub fn with_heap(&self, heap: BExpr) -> Self {
        Self {
            heap,
            ..self.clone()
        }
    }

    pub fn with_old_heap(&self, old_heap: BExpr) -> Self {
        Self {
            old_heap: Some(old_heap),
            ..self.clone()
        }
    }

    /// The handle evaluating in the old heap. Without an old heap, the current heap is used.
    pub fn old(&self) -> Self {
        let heap = self.old_heap.clone().unwrap_or_else(|| self.heap.clone());
        self.with_heap(heap)
    }

    pub fn with_this(&self, this: BExpr) -> Self {
        Self {
            this,
            ..self.clone()
        }
    }

    pub fn with_mode(&self, mode: FuelMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }

    pub fn with_layer_offset(&self, offset: u32) -> Self {
        Self {
            layer_offset: self.layer_offset + offset,
            ..self.clone()
        }
    }

    pub fn with_scc_layer(&self, callable: CallableId, layer: BExpr) -> Self {
        Self {
            scc_layer: Some((callable, layer)),
            ..self.clone()
        }
    }

    pub fn with_frame(&self, frame: &str) -> Self {
        Self {
            frame: frame.to_string(),
            ..self.clone()
        }
    }

    pub fn strip_lits(&self) -> Self {
        Self {
            strip_lits: true,
            ..self.clone()
        }
    }

    /// Binds source variables to translated terms.
    pub fn with_bindings(&self, bindings: impl IntoIterator<Item = (String, BExpr)>) -> Self {
        let mut map = (*self.bindings).clone();
        map.extend(bindings);
        Self {
            bindings: Rc::new(map),
            ..self.clone()
        }
    }

    /// Removes bindings of variables rebound by a nested binder.
    pub fn shadow<'n>(&self, names: impl IntoIterator<Item = &'n String>) -> Self {
        let mut map = (*self.bindings).clone();
        let mut changed = false;
        for name in names {
            changed |= map.remove(name).is_some();
        }
        if !changed {
            return self.clone();
        }
        Self {
            bindings: Rc::new(map),
            ..self.clone()
        }
    }

    // Helpers
    // -------

    /// The body of a let with its variables replaced by the right-hand sides. Binders of the
    /// body that clash with variables of the right-hand sides are renamed.
    pub fn let_body(&self, vars: &[BoundVar], rhss: &[Exp], body: &Exp) -> Exp {
        Substitution::new()
            .with_vars(vars.iter().map(|v| v.name.clone()).zip(rhss.iter().cloned()))
            .apply(body, &self.ctx.fresh)
    }

    /// The body of a match case with the case variables replaced by destructor applications
    /// on the source.
    pub fn case_body(&self, source: &Exp, case: &MatchCase) -> Exp {
        Substitution::new()
            .with_vars(case.vars.iter().enumerate().map(|(index, v)| {
                let dtor = ExpData::new(
                    ExpKind::Destructor {
                        obj: source.clone(),
                        ctor: case.ctor,
                        index,
                    },
                    v.ty.clone(),
                    source.loc,
                );
                (v.name.clone(), dtor)
            }))
            .apply(&case.body, &self.ctx.fresh)
    }

    fn lit(&self, e: BExpr) -> BExpr {
        if self.tr.use_lit() && !self.strip_lits {
            BExpr::call("Lit", vec![e])
        } else {
            e
        }
    }

    fn is_lit(e: &BExpr) -> bool {
        matches!(e, BExpr::Bool(_)) || e.is_call_of("Lit")
    }

    pub fn local(&self, name: &str) -> BExpr {
        match self.bindings.get(name) {
            Some(e) => e.clone(),
            None => BExpr::ident(&boogie_local_name(name)),
        }
    }

    pub fn bound_vars(vars: &[BoundVar]) -> Vec<BVar> {
        vars.iter()
            .map(|v| BVar::new(&boogie_local_name(&v.name), boogie_type(&v.ty)))
            .collect()
    }

    /// Typing assumption of bound variables.
    pub fn typing(&self, vars: &[BoundVar]) -> BExpr {
        BExpr::and_all(vars.iter().map(|v| {
            self.tr
                .type_is(BExpr::ident(&boogie_local_name(&v.name)), &v.ty)
        }))
    }

    /// Translates and boxes.
    pub fn boxed(&self, e: &Exp) -> BExpr {
        box_value(self.trans(e), &e.ty)
    }

    /// The layer argument of a call of a fuel-aware function.
    pub fn layer_for(&self, fun: QualifiedId<FunId>) -> BExpr {
        let base = match &self.scc_layer {
            Some((callable, layer))
                if self
                    .tr
                    .env
                    .in_same_scc(*callable, CallableId::Function(fun)) =>
            {
                layer.clone()
            }
            _ if self.mode == FuelMode::Axiom => layer_succ(BExpr::ident("$LZ"), 1),
            _ => self.ctx.fuel_setting(self.tr.env, fun).layer(self.mode),
        };
        layer_succ(base, self.layer_offset)
    }

    /// Arguments of a call: type arguments, layer, heap, receiver, coerced arguments. The
    /// layer is omitted for `#canCall` applications.
    pub fn call_args(
        &self,
        fun: QualifiedId<FunId>,
        receiver: Option<&Exp>,
        type_args: &[Type],
        args: &[Exp],
        with_layer: bool,
    ) -> Vec<BExpr> {
        let data = self.tr.env.function(fun);
        let mut out = type_args.iter().map(|t| self.tr.type_to_ty(t)).collect_vec();
        if with_layer && data.is_fuel_aware() {
            out.push(self.layer_for(fun));
        }
        if data.reads_heap() {
            out.push(self.heap.clone());
        }
        if data.has_receiver() {
            out.push(match receiver {
                Some(r) => self.trans(r),
                None => self.this.clone(),
            });
        }
        for (formal, arg) in data.formals.iter().zip(args) {
            out.push(coerce_value(self.trans(arg), &formal.ty, &arg.ty));
        }
        out
    }

    /// Instantiation of a callee's type parameters.
    pub fn type_instantiation(params: &[String], args: &[Type]) -> BTreeMap<String, Type> {
        params.iter().cloned().zip(args.iter().cloned()).collect()
    }

    // Translation
    // -----------

    pub fn trans(&self, e: &Exp) -> BExpr {
        use ExpKind::*;
        match &e.kind {
            Value(v) => self.trans_value(v),
            LocalVar(name) => self.local(name),
            This => self.this.clone(),
            FieldSelect { obj, field } => {
                let data = self.tr.env.field(*field);
                let o = self.trans(obj);
                if data.mutable {
                    unbox_value(
                        heap_read(
                            self.heap.clone(),
                            o,
                            BExpr::ident(&boogie_field_name(self.tr.env, *field)),
                        ),
                        &e.ty,
                    )
                } else {
                    let is_lit = Self::is_lit(&o);
                    let call = BExpr::call(&boogie_field_name(self.tr.env, *field), vec![o]);
                    let result = coerce_value(call, &e.ty, &data.ty);
                    if is_lit {
                        self.lit(result)
                    } else {
                        result
                    }
                }
            }
            Destructor { obj, ctor, index } => {
                let formal = &self.tr.env.ctor(*ctor).formals[*index];
                let call = BExpr::call(
                    &boogie_dtor_name(self.tr.env, *ctor, *index),
                    vec![self.trans(obj)],
                );
                coerce_value(call, &e.ty, &formal.ty)
            }
            ArrayLength { array, dim } => BExpr::call(
                "$ArrayLength",
                vec![self.trans(array), BExpr::int(*dim as i64)],
            ),
            Select { collection, index } => self.trans_select(e, collection, index),
            ArraySelect { array, indices } => unbox_value(
                heap_read(
                    self.heap.clone(),
                    self.trans(array),
                    array_index_field(indices.iter().map(|i| self.trans(i)).collect()),
                ),
                &e.ty,
            ),
            SeqSlice { seq, lo, hi } => {
                let mut s = self.seq_of(seq);
                if let Some(hi) = hi {
                    s = BExpr::call("Seq#Take", vec![s, self.trans(hi)]);
                }
                if let Some(lo) = lo {
                    s = BExpr::call("Seq#Drop", vec![s, self.trans(lo)]);
                }
                s
            }
            Update {
                collection,
                index,
                value,
            } => {
                let c = self.trans(collection);
                match &collection.ty {
                    Type::Seq(_) => BExpr::call(
                        "Seq#Update",
                        vec![c, self.trans(index), self.boxed(value)],
                    ),
                    Type::Map(..) => {
                        BExpr::call("Map#Build", vec![c, self.boxed(index), self.boxed(value)])
                    }
                    Type::IMap(..) => {
                        BExpr::call("IMap#Build", vec![c, self.boxed(index), self.boxed(value)])
                    }
                    Type::MultiSet(_) => {
                        BExpr::store(c, vec![self.boxed(index)], self.trans(value))
                    }
                    ty => panic!("BUG: update of a value of type {}", ty),
                }
            }
            SetDisplay(elems) => {
                let prefix = if matches!(e.ty, Type::ISet(_)) {
                    "ISet"
                } else {
                    "Set"
                };
                elems.iter().fold(
                    BExpr::call(&format!("{}#Empty", prefix), vec![]),
                    |acc, el| BExpr::call(&format!("{}#UnionOne", prefix), vec![acc, self.boxed(el)]),
                )
            }
            MultiSetDisplay(elems) => elems.iter().fold(
                BExpr::call("MultiSet#Empty", vec![]),
                |acc, el| BExpr::call("MultiSet#UnionOne", vec![acc, self.boxed(el)]),
            ),
            SeqDisplay(elems) => elems.iter().fold(BExpr::call("Seq#Empty", vec![]), |acc, el| {
                BExpr::call("Seq#Build", vec![acc, self.boxed(el)])
            }),
            MapDisplay(pairs) => {
                let prefix = if matches!(e.ty, Type::IMap(..)) {
                    "IMap"
                } else {
                    "Map"
                };
                pairs.iter().fold(
                    BExpr::call(&format!("{}#Empty", prefix), vec![]),
                    |acc, (k, v)| {
                        BExpr::call(
                            &format!("{}#Build", prefix),
                            vec![acc, self.boxed(k), self.boxed(v)],
                        )
                    },
                )
            }
            FunctionCall {
                fun,
                receiver,
                type_args,
                args,
            } => {
                let data = self.tr.env.function(*fun);
                let call = BExpr::call(
                    &boogie_function_name(self.tr.env, *fun),
                    self.call_args(*fun, receiver.as_ref(), type_args, args, true),
                );
                coerce_value(call, &e.ty, &data.result_type)
            }
            Apply { fun, args } => {
                let (arg_tys, res_ty) = match &fun.ty {
                    Type::Arrow(a, r) => (a, r),
                    ty => panic!("BUG: application of a value of type {}", ty),
                };
                let n = args.len();
                self.tr.ensure_arrow_arity(n);
                let mut call_args = arg_tys.iter().map(|t| self.tr.type_to_ty(t)).collect_vec();
                call_args.push(self.tr.type_to_ty(res_ty));
                call_args.push(self.heap.clone());
                call_args.push(self.trans(fun));
                call_args.extend(args.iter().map(|a| self.boxed(a)));
                unbox_value(BExpr::call(&format!("Apply{}", n), call_args), &e.ty)
            }
            DatatypeValue { ctor, args, .. } => {
                let formals = &self.tr.env.ctor(*ctor).formals;
                let targs = formals
                    .iter()
                    .zip(args)
                    .map(|(f, a)| coerce_value(self.trans(a), &f.ty, &a.ty))
                    .collect_vec();
                let all_lit = targs.iter().all(Self::is_lit);
                let value = BExpr::call(&boogie_ctor_name(self.tr.env, *ctor), targs);
                if all_lit {
                    self.lit(value)
                } else {
                    value
                }
            }
            DatatypeTest { obj, ctor } => BExpr::call(
                &boogie_ctor_test_name(self.tr.env, *ctor),
                vec![self.trans(obj)],
            ),
            Old(inner) => self.old().trans(inner),
            Fresh(inner) => self.trans_fresh(inner),
            Allocated(inner) => self
                .tr
                .type_is_alloc(self.trans(inner), &inner.ty, self.heap.clone()),
            Unary { op, operand } => self.trans_unary(e, *op, operand),
            Conversion(inner) => self.trans_conversion(e, inner),
            Binary { op, lhs, rhs } => self.trans_binary(e, *op, lhs, rhs),
            Ite { cond, then, els } => {
                BExpr::ite(self.trans(cond), self.trans(then), self.trans(els))
            }
            Let { vars, rhss, body } => self.trans(&self.let_body(vars, rhss, body)),
            Quantifier {
                kind,
                vars,
                range,
                body,
                triggers,
                ..
            } => self.trans_quantifier(*kind, vars, range.as_ref(), body, triggers),
            SetComprehension {
                finite,
                vars,
                range,
                term,
            } => self.trans_set_comprehension(*finite, vars, range, term.as_ref()),
            MapComprehension {
                finite,
                var,
                range,
                term,
            } => {
                let bx = self.ctx.fresh.fresh("$bx");
                let unboxed = unbox_value(BExpr::ident(&bx), &var.ty);
                let inner = self.with_bindings(vec![(var.name.clone(), unboxed.clone())]);
                let domain = BExpr::lambda(
                    vec![BVar::new(&bx, box_type())],
                    BExpr::and(
                        self.tr.type_is(unboxed, &var.ty),
                        inner.trans(range),
                    ),
                );
                let elements = BExpr::lambda(vec![BVar::new(&bx, box_type())], inner.boxed(term));
                BExpr::call(
                    if *finite { "Map#Glue" } else { "IMap#Glue" },
                    vec![domain, elements, self.tr.type_to_ty(&e.ty)],
                )
            }
            Lambda {
                vars,
                requires,
                reads,
                body,
            } => self.trans_lambda(vars, requires.as_ref(), reads, body),
            Match { source, cases } => self.trans_match(source, cases),
        }
    }

    fn trans_value(&self, v: &Value) -> BExpr {
        match v {
            Value::Bool(b) => BExpr::Bool(*b),
            Value::Int(n) => self.lit(BExpr::Int(n.clone())),
            Value::Real(text) => {
                let text = if text.contains('.') {
                    text.clone()
                } else {
                    format!("{}.0", text)
                };
                self.lit(BExpr::Real(text))
            }
            Value::Char(c) => self.lit(BExpr::call(
                "char#FromInt",
                vec![BExpr::Int(BigInt::from(*c as u32))],
            )),
            Value::BitVector { value, width } => BExpr::Bv {
                value: value.clone(),
                width: *width,
            },
            Value::Null => null(),
        }
    }

    /// The sequence denoted by a sequence or one-dimensional array expression.
    fn seq_of(&self, e: &Exp) -> BExpr {
        match &e.ty {
            Type::Array { .. } => {
                BExpr::call("Seq#FromArray", vec![self.heap.clone(), self.trans(e)])
            }
            _ => self.trans(e),
        }
    }

    fn trans_select(&self, e: &Exp, collection: &Exp, index: &Exp) -> BExpr {
        let c = self.trans(collection);
        match &collection.ty {
            Type::Seq(_) => unbox_value(BExpr::call("Seq#Index", vec![c, self.trans(index)]), &e.ty),
            Type::Map(..) => unbox_value(
                BExpr::select(BExpr::call("Map#Elements", vec![c]), vec![self.boxed(index)]),
                &e.ty,
            ),
            Type::IMap(..) => unbox_value(
                BExpr::select(BExpr::call("IMap#Elements", vec![c]), vec![self.boxed(index)]),
                &e.ty,
            ),
            Type::MultiSet(_) => BExpr::select(c, vec![self.boxed(index)]),
            Type::Array { .. } => unbox_value(
                heap_read(
                    self.heap.clone(),
                    c,
                    array_index_field(vec![self.trans(index)]),
                ),
                &e.ty,
            ),
            ty => panic!("BUG: selection from a value of type {}", ty),
        }
    }

    fn trans_fresh(&self, inner: &Exp) -> BExpr {
        let old_heap = self.old().heap;
        let is_new = |o: BExpr| {
            BExpr::and(
                BExpr::neq(o.clone(), null()),
                BExpr::and(
                    is_allocated(self.heap.clone(), o.clone()),
                    BExpr::not(is_allocated(old_heap.clone(), o)),
                ),
            )
        };
        let value = self.trans(inner);
        match &inner.ty {
            ty if ty.is_ref_type() => is_new(value),
            Type::Set(_) | Type::ISet(_) => {
                let o = self.ctx.fresh.fresh("$o");
                let member = BExpr::select(value, vec![BExpr::call("$Box", vec![BExpr::ident(&o)])]);
                BExpr::forall(
                    vec![BVar::new(&o, ref_type())],
                    vec![vec![member.clone()]],
                    BExpr::imp(member, is_new(BExpr::ident(&o))),
                )
            }
            Type::Seq(_) => {
                let i = self.ctx.fresh.fresh("$i");
                let elem = BExpr::coerce(
                    BExpr::call(
                        "$Unbox",
                        vec![BExpr::call("Seq#Index", vec![value.clone(), BExpr::ident(&i)])],
                    ),
                    ref_type(),
                );
                BExpr::forall(
                    vec![BVar::new(&i, BType::Int)],
                    vec![vec![BExpr::call(
                        "Seq#Index",
                        vec![value.clone(), BExpr::ident(&i)],
                    )]],
                    BExpr::imp(
                        BExpr::and(
                            BExpr::le(BExpr::int(0), BExpr::ident(&i)),
                            BExpr::lt(BExpr::ident(&i), BExpr::call("Seq#Length", vec![value])),
                        ),
                        is_new(elem),
                    ),
                )
            }
            ty => panic!("BUG: fresh applied to a value of type {}", ty),
        }
    }

    fn trans_unary(&self, e: &Exp, op: UnaryOp, operand: &Exp) -> BExpr {
        let x = self.trans(operand);
        match op {
            UnaryOp::Not => BExpr::not(x),
            UnaryOp::Neg => match &e.ty {
                Type::BitVector(_) => self.unsupported_bv(e, x),
                _ => BExpr::neg(x),
            },
            UnaryOp::Cardinality => match &operand.ty {
                Type::Set(_) => BExpr::call("Set#Card", vec![x]),
                Type::MultiSet(_) => BExpr::call("MultiSet#Card", vec![x]),
                Type::Seq(_) => BExpr::call("Seq#Length", vec![x]),
                Type::Map(..) => BExpr::call("Map#Card", vec![x]),
                ty => panic!("BUG: cardinality of a value of type {}", ty),
            },
        }
    }

    fn unsupported_bv(&self, e: &Exp, fallback: BExpr) -> BExpr {
        self.tr
            .error(&e.loc, "bit-vector operations are not supported");
        fallback
    }

    fn trans_conversion(&self, e: &Exp, inner: &Exp) -> BExpr {
        let x = self.trans(inner);
        match (&inner.ty, &e.ty) {
            (from, to) if from == to => x,
            (Type::Int, Type::Real) => BExpr::call("real", vec![x]),
            (Type::Real, Type::Int) => BExpr::call("int", vec![x]),
            (Type::Int, Type::Char) => BExpr::call("char#FromInt", vec![x]),
            (Type::Char, Type::Int) => BExpr::call("char#ToInt", vec![x]),
            (Type::Char, Type::Real) => {
                BExpr::call("real", vec![BExpr::call("char#ToInt", vec![x])])
            }
            (Type::BitVector(_), _) | (_, Type::BitVector(_)) => {
                self.tr.error(
                    &e.loc,
                    "conversions involving bit-vector types are not supported",
                );
                x
            }
            (from, to) => panic!("BUG: conversion from {} to {}", from, to),
        }
    }

    fn trans_binary(&self, e: &Exp, op: BinaryOp, lhs: &Exp, rhs: &Exp) -> BExpr {
        let l = self.trans(lhs);
        let r = self.trans(rhs);
        let ty = &lhs.ty;
        let arith = |bop: BBinOp, l: BExpr, r: BExpr| BExpr::binary(bop, l, r);
        match op {
            BinaryOp::And => BExpr::and(l, r),
            BinaryOp::Or => BExpr::or(l, r),
            BinaryOp::Imp => BExpr::imp(l, r),
            BinaryOp::Iff => BExpr::iff(l, r),
            BinaryOp::Eq => boogie_equal(l, r, ty),
            BinaryOp::Neq => BExpr::not(boogie_equal(l, r, ty)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                // Normalize to `<`/`<=` with swapped operands.
                let (strict, a, b) = match op {
                    BinaryOp::Lt => (true, l, r),
                    BinaryOp::Le => (false, l, r),
                    BinaryOp::Gt => (true, r, l),
                    _ => (false, r, l),
                };
                match ty {
                    Type::Int | Type::Real => {
                        arith(if strict { BBinOp::Lt } else { BBinOp::Le }, a, b)
                    }
                    Type::Char => arith(
                        if strict { BBinOp::Lt } else { BBinOp::Le },
                        BExpr::call("char#ToInt", vec![a]),
                        BExpr::call("char#ToInt", vec![b]),
                    ),
                    Type::Set(_) | Type::ISet(_) | Type::MultiSet(_) => {
                        let prefix = collection_prefix(ty);
                        let subset =
                            BExpr::call(&format!("{}#Subset", prefix), vec![a.clone(), b.clone()]);
                        if strict {
                            BExpr::and(
                                subset,
                                BExpr::not(BExpr::call(&format!("{}#Equal", prefix), vec![a, b])),
                            )
                        } else {
                            subset
                        }
                    }
                    Type::Seq(_) => {
                        let len_a = BExpr::call("Seq#Length", vec![a.clone()]);
                        let len_b = BExpr::call("Seq#Length", vec![b.clone()]);
                        BExpr::and(
                            arith(
                                if strict { BBinOp::Lt } else { BBinOp::Le },
                                len_a.clone(),
                                len_b,
                            ),
                            BExpr::call("Seq#SameUntil", vec![a, b, len_a]),
                        )
                    }
                    Type::BitVector(_) => self.unsupported_bv(e, BExpr::fals()),
                    ty => panic!("BUG: comparison of values of type {}", ty),
                }
            }
            BinaryOp::Add => match ty {
                Type::Int | Type::Real => arith(BBinOp::Add, l, r),
                Type::Char => BExpr::call(
                    "char#FromInt",
                    vec![arith(
                        BBinOp::Add,
                        BExpr::call("char#ToInt", vec![l]),
                        BExpr::call("char#ToInt", vec![r]),
                    )],
                ),
                Type::Set(_) | Type::ISet(_) | Type::MultiSet(_) => {
                    BExpr::call(&format!("{}#Union", collection_prefix(ty)), vec![l, r])
                }
                Type::Seq(_) => BExpr::call("Seq#Append", vec![l, r]),
                Type::Map(..) => BExpr::call("Map#Merge", vec![l, r]),
                Type::IMap(..) => BExpr::call("IMap#Merge", vec![l, r]),
                Type::BitVector(_) => self.unsupported_bv(e, l),
                ty => panic!("BUG: addition of values of type {}", ty),
            },
            BinaryOp::Sub => match ty {
                Type::Int | Type::Real => arith(BBinOp::Sub, l, r),
                Type::Char => BExpr::call(
                    "char#FromInt",
                    vec![arith(
                        BBinOp::Sub,
                        BExpr::call("char#ToInt", vec![l]),
                        BExpr::call("char#ToInt", vec![r]),
                    )],
                ),
                Type::Set(_) | Type::ISet(_) | Type::MultiSet(_) => {
                    BExpr::call(&format!("{}#Difference", collection_prefix(ty)), vec![l, r])
                }
                Type::Map(..) => BExpr::call("Map#Subtract", vec![l, r]),
                Type::IMap(..) => BExpr::call("IMap#Subtract", vec![l, r]),
                Type::BitVector(_) => self.unsupported_bv(e, l),
                ty => panic!("BUG: subtraction of values of type {}", ty),
            },
            BinaryOp::Mul => match ty {
                Type::Int | Type::Real => arith(BBinOp::Mul, l, r),
                Type::Set(_) | Type::ISet(_) | Type::MultiSet(_) => BExpr::call(
                    &format!("{}#Intersection", collection_prefix(ty)),
                    vec![l, r],
                ),
                Type::BitVector(_) => self.unsupported_bv(e, l),
                ty => panic!("BUG: multiplication of values of type {}", ty),
            },
            BinaryOp::Div => match ty {
                Type::Int => arith(BBinOp::Div, l, r),
                Type::Real => arith(BBinOp::RealDiv, l, r),
                Type::BitVector(_) => self.unsupported_bv(e, l),
                ty => panic!("BUG: division of values of type {}", ty),
            },
            BinaryOp::Mod => match ty {
                Type::Int => arith(BBinOp::Mod, l, r),
                Type::BitVector(_) => self.unsupported_bv(e, l),
                ty => panic!("BUG: modulus of values of type {}", ty),
            },
            BinaryOp::In | BinaryOp::NotIn => {
                let member = self.membership(box_value(l, ty), r, &rhs.ty);
                if op == BinaryOp::In {
                    member
                } else {
                    BExpr::not(member)
                }
            }
            BinaryOp::Disjoint => {
                BExpr::call(&format!("{}#Disjoint", collection_prefix(ty)), vec![l, r])
            }
        }
    }

    /// Membership of a boxed element in a collection.
    fn membership(&self, elem: BExpr, collection: BExpr, ty: &Type) -> BExpr {
        match ty {
            Type::Set(_) | Type::ISet(_) => BExpr::select(collection, vec![elem]),
            Type::MultiSet(_) => BExpr::lt(BExpr::int(0), BExpr::select(collection, vec![elem])),
            Type::Seq(_) => BExpr::call("Seq#Contains", vec![collection, elem]),
            Type::Map(..) => BExpr::select(BExpr::call("Map#Domain", vec![collection]), vec![elem]),
            Type::IMap(..) => {
                BExpr::select(BExpr::call("IMap#Domain", vec![collection]), vec![elem])
            }
            ty => panic!("BUG: membership in a value of type {}", ty),
        }
    }

    fn trans_quantifier(
        &self,
        kind: QuantKind,
        vars: &[BoundVar],
        range: Option<&Exp>,
        body: &Exp,
        triggers: &[Vec<Exp>],
    ) -> BExpr {
        let inner = self.shadow(vars.iter().map(|v| &v.name));
        let typing = self.typing(vars);
        let range = range.map(|r| inner.trans(r)).unwrap_or_else(BExpr::tru);
        let body = inner.trans(body);
        let bvars = Self::bound_vars(vars);
        let formula = match kind {
            QuantKind::Forall => BExpr::imp(BExpr::and(typing, range), body),
            QuantKind::Exists => BExpr::and(BExpr::and(typing, range), body),
        };
        let triggers = if triggers.is_empty() {
            synthesize_triggers(&bvars, &formula)
        } else {
            triggers
                .iter()
                .map(|t| t.iter().map(|e| inner.trans(e)).collect())
                .collect()
        };
        match kind {
            QuantKind::Forall => BExpr::forall(bvars, triggers, formula),
            QuantKind::Exists => BExpr::exists(bvars, triggers, formula),
        }
    }

    fn trans_set_comprehension(
        &self,
        finite: bool,
        vars: &[BoundVar],
        range: &Exp,
        term: Option<&Exp>,
    ) -> BExpr {
        let bx = self.ctx.fresh.fresh("$bx");
        let is_simple = vars.len() == 1
            && term.map_or(true, |t| matches!(&t.kind, ExpKind::LocalVar(n) if *n == vars[0].name));
        let members = if is_simple {
            let var = &vars[0];
            let unboxed = unbox_value(BExpr::ident(&bx), &var.ty);
            let inner = self.with_bindings(vec![(var.name.clone(), unboxed.clone())]);
            BExpr::lambda(
                vec![BVar::new(&bx, box_type())],
                BExpr::and(self.tr.type_is(unboxed, &var.ty), inner.trans(range)),
            )
        } else {
            let term = match term {
                Some(t) => t,
                None => panic!("BUG: set comprehension over several variables without a term"),
            };
            let inner = self.shadow(vars.iter().map(|v| &v.name));
            let body = BExpr::and(
                BExpr::and(self.typing(vars), inner.trans(range)),
                BExpr::eq(BExpr::ident(&bx), inner.boxed(term)),
            );
            BExpr::lambda(
                vec![BVar::new(&bx, box_type())],
                BExpr::exists(Self::bound_vars(vars), vec![], body),
            )
        };
        // An `iset` is the membership map itself.
        if finite {
            BExpr::call("Set#FromBoogieMap", vec![members])
        } else {
            members
        }
    }

    fn trans_lambda(
        &self,
        vars: &[BoundVar],
        requires: Option<&Exp>,
        reads: &[FrameExp],
        body: &Exp,
    ) -> BExpr {
        let n = vars.len();
        self.tr.ensure_arrow_arity(n);
        let heap = self.ctx.fresh.fresh("$lheap");
        let boxes = vars
            .iter()
            .map(|_| self.ctx.fresh.fresh("$lbx"))
            .collect_vec();
        let params = std::iter::once(BVar::new(&heap, heap_type()))
            .chain(boxes.iter().map(|b| BVar::new(b, box_type())))
            .collect_vec();
        let inner = self.with_heap(BExpr::ident(&heap)).with_bindings(
            vars.iter()
                .zip(&boxes)
                .map(|(v, b)| (v.name.clone(), unbox_value(BExpr::ident(b), &v.ty))),
        );
        let apply = BExpr::lambda(params.clone(), inner.boxed(body));
        let pre = BExpr::lambda(
            params.clone(),
            requires.map(|r| inner.trans(r)).unwrap_or_else(BExpr::tru),
        );
        let r = self.ctx.fresh.fresh("$r");
        let footprint = BExpr::lambda(
            params,
            BExpr::lambda(
                vec![BVar::new(&r, box_type())],
                inner.in_frame(
                    reads,
                    BExpr::coerce(BExpr::call("$Unbox", vec![BExpr::ident(&r)]), ref_type()),
                    None,
                ),
            ),
        );
        BExpr::call(&format!("Handle{}", n), vec![apply, pre, footprint])
    }

    fn trans_match(&self, source: &Exp, cases: &[MatchCase]) -> BExpr {
        let src = self.trans(source);
        let mut result: Option<BExpr> = None;
        for case in cases.iter().rev() {
            let body = self.trans(&self.case_body(source, case));
            result = Some(match result {
                None => body,
                Some(els) => BExpr::ite(
                    BExpr::call(
                        &boogie_ctor_test_name(self.tr.env, case.ctor),
                        vec![src.clone()],
                    ),
                    body,
                    els,
                ),
            });
        }
        result.unwrap_or_else(|| panic!("BUG: match expression without cases"))
    }

    // Frames
    // ------

    /// Whether `obj` (and, if given, field `field` of it) is in one of the frames.
    pub fn in_frame(&self, frames: &[FrameExp], obj: BExpr, field: Option<BExpr>) -> BExpr {
        BExpr::or_all(frames.iter().map(|frame| {
            let f = self.trans(&frame.exp);
            let boxed = BExpr::call("$Box", vec![obj.clone()]);
            let member = match &frame.exp.ty {
                ty if ty.is_ref_type() => BExpr::eq(obj.clone(), f),
                Type::Set(_) | Type::ISet(_) => BExpr::select(f, vec![boxed]),
                Type::MultiSet(_) => BExpr::lt(BExpr::int(0), BExpr::select(f, vec![boxed])),
                Type::Seq(_) => BExpr::call("Seq#Contains", vec![f, boxed]),
                ty => panic!("BUG: frame expression of type {}", ty),
            };
            match (&frame.field, &field) {
                (Some(fid), Some(fld)) => BExpr::and(
                    member,
                    BExpr::eq(
                        fld.clone(),
                        BExpr::ident(&boogie_field_name(self.tr.env, *fid)),
                    ),
                ),
                _ => member,
            }
        }))
    }

    /// `lambda $o, $f :: $o != null && alloc($o) ==> (o, f) in frames`, the value of a
    /// frame variable.
    pub fn frame_lambda(&self, frames: &[FrameExp]) -> BExpr {
        let o = BVar::new("$o", ref_type());
        let f = BVar::new("$f", field_type());
        BExpr::lambda(
            vec![o.clone(), f.clone()],
            BExpr::imp(
                BExpr::and(
                    BExpr::neq(o.to_expr(), null()),
                    is_allocated(self.heap.clone(), o.to_expr()),
                ),
                self.in_frame(frames, o.to_expr(), Some(f.to_expr())),
            ),
        )
    }

    /// `forall $o, $f :: $o != null && alloc($o) && (o, f) in frames ==> frame[$o, $f]`
    pub fn frames_subset(&self, frames: &[FrameExp], frame_var: &str) -> BExpr {
        let o = BVar::new("$o", ref_type());
        let f = BVar::new("$f", field_type());
        let target = BExpr::select(BExpr::ident(frame_var), vec![o.to_expr(), f.to_expr()]);
        BExpr::forall(
            vec![o.clone(), f.clone()],
            vec![],
            BExpr::imp(
                BExpr::and(
                    BExpr::and(
                        BExpr::neq(o.to_expr(), null()),
                        is_allocated(self.heap.clone(), o.to_expr()),
                    ),
                    self.in_frame(frames, o.to_expr(), Some(f.to_expr())),
                ),
                target,
            ),
        )
    }

    /// Heap change since `prev` is bounded by `allowed(o, f)`.
    pub fn heap_frame_fact(&self, prev: BExpr, allowed: impl Fn(BExpr, BExpr) -> BExpr) -> BExpr {
        let o = BVar::new("$o", ref_type());
        let f = BVar::new("$f", field_type());
        let now = heap_read(self.heap.clone(), o.to_expr(), f.to_expr());
        BExpr::forall(
            vec![o.clone(), f.clone()],
            vec![vec![now.clone()]],
            BExpr::imp(
                BExpr::and(
                    BExpr::neq(o.to_expr(), null()),
                    is_allocated(prev.clone(), o.to_expr()),
                ),
                BExpr::or(
                    BExpr::eq(now, heap_read(prev, o.to_expr(), f.to_expr())),
                    allowed(o.to_expr(), f.to_expr()),
                ),
            ),
        )
    }

    // Call admissibility
    // ------------------

    /// The conjunction of `#canCall` facts of all calls in `e`, guarded by the conditions
    /// under which each call is evaluated.
    pub fn can_call(&self, e: &Exp) -> BExpr {
        use ExpKind::*;
        match &e.kind {
            Binary {
                op: BinaryOp::And | BinaryOp::Imp,
                lhs,
                rhs,
            } => BExpr::and(
                self.can_call(lhs),
                BExpr::imp(self.trans(lhs), self.can_call(rhs)),
            ),
            Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => BExpr::and(
                self.can_call(lhs),
                BExpr::imp(BExpr::not(self.trans(lhs)), self.can_call(rhs)),
            ),
            Ite { cond, then, els } => {
                let c = self.trans(cond);
                BExpr::and(
                    self.can_call(cond),
                    BExpr::and(
                        BExpr::imp(c.clone(), self.can_call(then)),
                        BExpr::imp(BExpr::not(c), self.can_call(els)),
                    ),
                )
            }
            FunctionCall {
                fun,
                receiver,
                type_args,
                args,
            } => {
                let inner = BExpr::and_all(
                    receiver
                        .iter()
                        .chain(args)
                        .map(|a| self.can_call(a)),
                );
                BExpr::and(
                    inner,
                    BExpr::call(
                        &boogie_can_call_name(self.tr.env, *fun),
                        self.call_args(*fun, receiver.as_ref(), type_args, args, false),
                    ),
                )
            }
            Let { vars, rhss, body } => BExpr::and(
                BExpr::and_all(rhss.iter().map(|r| self.can_call(r))),
                self.can_call(&self.let_body(vars, rhss, body)),
            ),
            Quantifier {
                vars, range, body, ..
            } => {
                let inner = self.shadow(vars.iter().map(|v| &v.name));
                let range_cc = range
                    .as_ref()
                    .map(|r| inner.can_call(r))
                    .unwrap_or_else(BExpr::tru);
                let range_t = range
                    .as_ref()
                    .map(|r| inner.trans(r))
                    .unwrap_or_else(BExpr::tru);
                let body_cc = BExpr::and(range_cc, BExpr::imp(range_t, inner.can_call(body)));
                if body_cc.is_true() {
                    return body_cc;
                }
                let bvars = Self::bound_vars(vars);
                let formula = BExpr::imp(self.typing(vars), body_cc);
                let triggers = synthesize_triggers(&bvars, &formula);
                BExpr::forall(bvars, triggers, formula)
            }
            Match { source, cases } => {
                let src = self.trans(source);
                BExpr::and(
                    self.can_call(source),
                    BExpr::and_all(cases.iter().map(|case| {
                        BExpr::imp(
                            BExpr::call(
                                &boogie_ctor_test_name(self.tr.env, case.ctor),
                                vec![src.clone()],
                            ),
                            self.can_call(&self.case_body(source, case)),
                        )
                    })),
                )
            }
            Old(inner) => self.old().can_call(inner),
            // Calls under these binders are admissible by their own definitions.
            Lambda { .. } | SetComprehension { .. } | MapComprehension { .. } => BExpr::tru(),
            _ => BExpr::and_all(e.children().into_iter().map(|c| self.can_call(c))),
        }
    }

    /// `can_call` of a list of expressions, each guarded by the previous ones.
    pub fn can_call_all(&self, exps: &[Exp]) -> BExpr {
        let mut result = BExpr::tru();
        for e in exps.iter().rev() {
            result = BExpr::and(self.can_call(e), BExpr::imp(self.trans(e), result));
        }
        result
    }

    /// A source expression for the conjunction of `exps`.
    pub fn conjoin(exps: &[Exp]) -> Exp {
        ExpData::and_all(exps.iter().cloned())
    }
}

fn collection_prefix(ty: &Type) -> &'static str {
    match ty {
        Type::Set(_) => "Set",
        Type::ISet(_) => "ISet",
        Type::MultiSet(_) => "MultiSet",
        Type::Seq(_) => "Seq",
        Type::Map(..) => "Map",
        Type::IMap(..) => "IMap",
        ty => panic!("BUG: collection operation on a value of type {}", ty),
    }
}

/// Type-directed equality: collections compare extensionally.
pub fn boogie_equal(lhs: BExpr, rhs: BExpr, ty: &Type) -> BExpr {
    if ty.is_collection() {
        BExpr::call(&format!("{}#Equal", collection_prefix(ty)), vec![lhs, rhs])
    } else {
        BExpr::eq(lhs, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boogie_backend::{options::BoogieOptions, vocabulary::Vocabulary};
    use veri_model::model::{GlobalEnv, ModuleData};

    fn with_translator(options: BoogieOptions, f: impl FnOnce(&ExpTranslator)) {
        let mut env = GlobalEnv::new();
        let m = env.add_module(ModuleData::new("M", 0));
        let vocab = Vocabulary::builtin().unwrap();
        let tr = BoogieTranslator::new(&env, &options, &vocab);
        let ctx = tr.new_context(m, None);
        let et = ExpTranslator::new(&tr, &ctx, BExpr::ident("$Heap"));
        f(&et)
    }

    #[test]
    fn literals_and_hints() {
        with_translator(BoogieOptions::default(), |et| {
            assert_eq!(et.trans(&ExpData::int_const(3)).to_string(), "Lit(3)");
            let real = ExpData::new(
                ExpKind::Value(Value::Real("2".to_string())),
                Type::Real,
                Default::default(),
            );
            assert_eq!(et.trans(&real).to_string(), "Lit(2.0)");
        });
        let options = BoogieOptions {
            use_literal_hints: false,
            ..BoogieOptions::default()
        };
        with_translator(options, |et| {
            assert_eq!(et.trans(&ExpData::int_const(3)).to_string(), "3");
        });
    }

    #[test]
    fn collection_operators() {
        with_translator(BoogieOptions::default(), |et| {
            let s = ExpData::local("s", Type::seq(Type::Int));
            let t = ExpData::local("t", Type::seq(Type::Int));
            let prefix = ExpData::binary(BinaryOp::Le, s.clone(), t.clone());
            assert_eq!(
                et.trans(&prefix).to_string(),
                "((Seq#Length(s#0) <= Seq#Length(t#0)) && Seq#SameUntil(s#0, t#0, Seq#Length(s#0)))"
            );
            let x = ExpData::local("x", Type::Int);
            let member = ExpData::binary(BinaryOp::In, x, s.clone());
            assert_eq!(et.trans(&member).to_string(), "Seq#Contains(s#0, $Box(x#0))");
            let eq = ExpData::eq(s, t);
            assert_eq!(et.trans(&eq).to_string(), "Seq#Equal(s#0, t#0)");
        });
    }

    #[test]
    fn quantifiers_get_typing_and_triggers() {
        with_translator(BoogieOptions::default(), |et| {
            let s = ExpData::local("s", Type::seq(Type::Int));
            let i = ExpData::local("i", Type::Int);
            let body = ExpData::binary(
                BinaryOp::Le,
                ExpData::int_const(0),
                ExpData::new(
                    ExpKind::Select {
                        collection: s,
                        index: i,
                    },
                    Type::Int,
                    Default::default(),
                ),
            );
            let q = ExpData::forall(vec![BoundVar::new("i", Type::Int)], None, body);
            let text = et.trans(&q).to_string();
            assert!(text.starts_with("(forall i#0: int :: { Seq#Index(s#0, i#0) }"));
        });
    }

    #[test]
    fn let_binds_translated_values() {
        with_translator(BoogieOptions::default(), |et| {
            let x = ExpData::local("x", Type::Int);
            let e = ExpData::new(
                ExpKind::Let {
                    vars: vec![BoundVar::new("y", Type::Int)],
                    rhss: vec![x],
                    body: ExpData::binary(
                        BinaryOp::Add,
                        ExpData::local("y", Type::Int),
                        ExpData::local("y", Type::Int),
                    ),
                },
                Type::Int,
                Default::default(),
            );
            assert_eq!(et.trans(&e).to_string(), "(x#0 + x#0)");
        });
    }

    #[test]
    fn let_values_are_not_captured_by_nested_binders() {
        with_translator(BoogieOptions::default(), |et| {
            let n = || ExpData::local("n", Type::Int);
            let body = ExpData::forall(
                vec![BoundVar::new("n", Type::Int)],
                None,
                ExpData::eq(ExpData::local("y", Type::Int), n()),
            );
            let e = ExpData::new(
                ExpKind::Let {
                    vars: vec![BoundVar::new("y", Type::Int)],
                    rhss: vec![n()],
                    body,
                },
                Type::Bool,
                Default::default(),
            );
            let text = et.trans(&e).to_string();
            assert!(text.contains("(n#0 == n$s#0)"), "{}", text);
            assert!(!text.contains("(n#0 == n#0)"), "{}", text);
            assert!(text.starts_with("(forall n$s#0: int"), "{}", text);
        });
    }

    #[test]
    fn set_comprehensions_pick_their_encoding() {
        with_translator(BoogieOptions::default(), |et| {
            let range = ExpData::binary(
                BinaryOp::Lt,
                ExpData::int_const(0),
                ExpData::local("x", Type::Int),
            );
            let comprehension = |finite: bool, ty: Type| {
                ExpData::new(
                    ExpKind::SetComprehension {
                        finite,
                        vars: vec![BoundVar::new("x", Type::Int)],
                        range: range.clone(),
                        term: None,
                    },
                    ty,
                    Default::default(),
                )
            };
            let set = et.trans(&comprehension(true, Type::set(Type::Int))).to_string();
            assert!(set.starts_with("Set#FromBoogieMap((lambda $bx#"), "{}", set);
            let iset = et
                .trans(&comprehension(false, Type::ISet(Box::new(Type::Int))))
                .to_string();
            assert!(iset.starts_with("(lambda $bx#"), "{}", iset);
        });
    }
}
