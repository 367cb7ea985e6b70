// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Encoding of first-class functions.
//!
//! A closure of arity `n` is an opaque `HandleType` value built by `Handle{n}` from three
//! maps: the result, the precondition and the footprint, each taking the heap and the boxed
//! arguments. `Apply{n}`, `Requires{n}` and `Reads{n}` project them back. Frame axioms state
//! that heaps agreeing on the footprint give equal projections.

use crate::boogie_backend::{
    boogie_helpers::{
        box_type, field_type, heap_read, heap_succ, heap_type, is_allocated, is_good_heap, null,
        ref_type,
    },
    decl_translator::BoogieTranslator,
    type_encoder::ty_ctor_decls,
};
use itertools::Itertools;
use veri_boogie_ir::{BExpr, BType, BVar, Decl};

/// The parts of a closure signature of one arity.
struct Arity {
    n: usize,
    arg_tys: Vec<BVar>,
    res_ty: BVar,
    boxes: Vec<BVar>,
}

impl Arity {
    fn new(n: usize) -> Self {
        let ty = BType::named("Ty");
        Self {
            n,
            arg_tys: (0..n).map(|i| BVar::new(&format!("t{}", i), ty.clone())).collect(),
            res_ty: BVar::new("t", ty),
            boxes: (0..n)
                .map(|i| BVar::new(&format!("bx{}", i), box_type()))
                .collect(),
        }
    }

    fn set_box() -> BType {
        BType::app("Set", vec![box_type()])
    }

    /// The map type `[Heap, Box, ..]range` of a closure component.
    fn component_type(&self, range: BType) -> BType {
        BType::map(
            std::iter::once(heap_type())
                .chain((0..self.n).map(|_| box_type()))
                .collect(),
            range,
        )
    }

    fn arrow_ty(&self) -> BExpr {
        BExpr::call(
            &format!("TArrow{}", self.n),
            self.arg_tys
                .iter()
                .chain(std::iter::once(&self.res_ty))
                .map(BVar::to_expr)
                .collect(),
        )
    }

    /// Arguments of a projection: type values, heap, handle, boxes.
    fn proj_args(&self, heap: BExpr, f: BExpr) -> Vec<BExpr> {
        self.arg_tys
            .iter()
            .chain(std::iter::once(&self.res_ty))
            .map(BVar::to_expr)
            .chain([heap, f])
            .chain(self.boxes.iter().map(BVar::to_expr))
            .collect()
    }

    fn proj(&self, name: &str, heap: BExpr, f: BExpr) -> BExpr {
        BExpr::call(&format!("{}{}", name, self.n), self.proj_args(heap, f))
    }

    fn proj_params(&self, f: &BVar, heap: &BVar) -> Vec<BVar> {
        self.arg_tys
            .iter()
            .cloned()
            .chain(std::iter::once(self.res_ty.clone()))
            .chain([heap.clone(), f.clone()])
            .chain(self.boxes.iter().cloned())
            .collect()
    }

    fn ty_vars(&self) -> Vec<BVar> {
        self.arg_tys
            .iter()
            .cloned()
            .chain(std::iter::once(self.res_ty.clone()))
            .collect()
    }

    /// Typing of the boxed arguments.
    fn boxes_typed(&self) -> BExpr {
        BExpr::and_all(self.boxes.iter().zip(&self.arg_tys).map(|(b, t)| {
            BExpr::call("$IsBox", vec![b.to_expr(), t.to_expr()])
        }))
    }

    fn component_select(&self, map: BExpr, heap: BExpr) -> BExpr {
        BExpr::select(
            map,
            std::iter::once(heap)
                .chain(self.boxes.iter().map(BVar::to_expr))
                .collect(),
        )
    }
}

impl<'env> BoogieTranslator<'env> {
    /// Emits the closure vocabulary of arity `n` once.
    pub fn ensure_arrow_arity(&self, n: usize) {
        self.emit_once(&format!("TArrow{}", n), || self.arrow_decls(n));
    }

    fn arrow_decls(&self, n: usize) -> Vec<Decl> {
        let a = Arity::new(n);
        let handle_ty = BType::named("HandleType");
        let f = BVar::new("f", handle_ty.clone());
        let heap = BVar::new("heap", heap_type());
        let h = BVar::new("h", a.component_type(box_type()));
        let r = BVar::new("r", a.component_type(BType::Bool));
        let rd = BVar::new("rd", a.component_type(Arity::set_box()));
        let handle = BExpr::call(
            &format!("Handle{}", n),
            vec![h.to_expr(), r.to_expr(), rd.to_expr()],
        );

        let mut decls = ty_ctor_decls(&format!("TArrow{}", n), n + 1);
        decls.push(Decl::Comment(format!("Closures of arity {}", n)));
        let params = a.proj_params(&f, &heap);
        decls.push(Decl::function(&format!("Apply{}", n), params.clone(), box_type()));
        decls.push(Decl::function(&format!("Requires{}", n), params.clone(), BType::Bool));
        decls.push(Decl::function(&format!("Reads{}", n), params, Arity::set_box()));
        decls.push(Decl::function(
            &format!("Handle{}", n),
            vec![h.clone(), r.clone(), rd.clone()],
            handle_ty,
        ));

        // Projections.
        let proj_vars = a
            .ty_vars()
            .into_iter()
            .chain([heap.clone(), h.clone(), r.clone(), rd.clone()])
            .chain(a.boxes.iter().cloned())
            .collect_vec();
        let apply = a.proj("Apply", heap.to_expr(), handle.clone());
        decls.push(Decl::axiom(BExpr::forall(
            proj_vars.clone(),
            vec![vec![apply.clone()]],
            BExpr::eq(apply, a.component_select(h.to_expr(), heap.to_expr())),
        )));
        let requires = a.proj("Requires", heap.to_expr(), handle.clone());
        decls.push(Decl::axiom(BExpr::forall(
            proj_vars.clone(),
            vec![vec![requires.clone()]],
            BExpr::imp(a.component_select(r.to_expr(), heap.to_expr()), requires),
        )));
        let reads = a.proj("Reads", heap.to_expr(), handle);
        let bx = BVar::new("bx", box_type());
        let in_reads = BExpr::select(reads, vec![bx.to_expr()]);
        decls.push(Decl::axiom(BExpr::forall(
            proj_vars.into_iter().chain(std::iter::once(bx.clone())).collect(),
            vec![vec![in_reads.clone()]],
            BExpr::iff(
                in_reads,
                BExpr::select(
                    a.component_select(rd.to_expr(), heap.to_expr()),
                    vec![bx.to_expr()],
                ),
            ),
        )));

        if self.options.emit_closure_frame_axioms {
            decls.extend(self.closure_frame_axioms(&a, &f));
        }

        // Typing of handles.
        let is_f = BExpr::call("$Is", vec![f.to_expr(), a.arrow_ty()]);
        let h_any = BVar::new("h", heap_type());
        let apply_any = a.proj("Apply", h_any.to_expr(), f.to_expr());
        let results_typed = BExpr::forall(
            std::iter::once(h_any.clone())
                .chain(a.boxes.iter().cloned())
                .collect(),
            vec![vec![apply_any.clone()]],
            BExpr::imp(
                BExpr::and_all(vec![
                    is_good_heap(h_any.to_expr()),
                    a.boxes_typed(),
                    a.proj("Requires", h_any.to_expr(), f.to_expr()),
                ]),
                BExpr::call("$IsBox", vec![apply_any, a.res_ty.to_expr()]),
            ),
        );
        decls.push(Decl::axiom(BExpr::forall(
            std::iter::once(f.clone()).chain(a.ty_vars()).collect(),
            vec![vec![is_f.clone()]],
            BExpr::iff(is_f, results_typed),
        )));
        let is_alloc_f =
            BExpr::call("$IsAlloc", vec![f.to_expr(), a.arrow_ty(), h_any.to_expr()]);
        let o = BVar::new("o", ref_type());
        let footprint_allocated = BExpr::forall(
            a.boxes.iter().cloned().chain(std::iter::once(o.clone())).collect(),
            vec![],
            BExpr::imp(
                BExpr::and_all(vec![
                    BExpr::and_all(a.boxes.iter().zip(&a.arg_tys).map(|(b, t)| {
                        BExpr::call("$IsAllocBox", vec![b.to_expr(), t.to_expr(), h_any.to_expr()])
                    })),
                    a.proj("Requires", h_any.to_expr(), f.to_expr()),
                    BExpr::neq(o.to_expr(), null()),
                    BExpr::select(
                        a.proj("Reads", h_any.to_expr(), f.to_expr()),
                        vec![BExpr::call("$Box", vec![o.to_expr()])],
                    ),
                ]),
                is_allocated(h_any.to_expr(), o.to_expr()),
            ),
        );
        decls.push(Decl::axiom(BExpr::forall(
            std::iter::once(f)
                .chain(a.ty_vars())
                .chain(std::iter::once(h_any.clone()))
                .collect(),
            vec![vec![is_alloc_f.clone()]],
            BExpr::imp(
                is_good_heap(h_any.to_expr()),
                BExpr::iff(is_alloc_f, footprint_allocated),
            ),
        )));
        decls
    }

    /// Two heaps that agree on the footprint (read in `h0`, or in `h1`) give equal
    /// projections.
    fn closure_frame_axioms(&self, a: &Arity, f: &BVar) -> Vec<Decl> {
        let h0 = BVar::new("h0", heap_type());
        let h1 = BVar::new("h1", heap_type());
        let o = BVar::new("o", ref_type());
        let fld = BVar::new("fld", field_type());
        let vars = [h0.clone(), h1.clone(), f.clone()]
            .into_iter()
            .chain(a.ty_vars())
            .chain(a.boxes.iter().cloned())
            .collect_vec();
        let agree_on = |footprint_heap: &BVar| {
            BExpr::forall(
                vec![o.clone(), fld.clone()],
                vec![],
                BExpr::imp(
                    BExpr::and(
                        BExpr::neq(o.to_expr(), null()),
                        BExpr::select(
                            a.proj("Reads", footprint_heap.to_expr(), f.to_expr()),
                            vec![BExpr::call("$Box", vec![o.to_expr()])],
                        ),
                    ),
                    BExpr::eq(
                        heap_read(h0.to_expr(), o.to_expr(), fld.to_expr()),
                        heap_read(h1.to_expr(), o.to_expr(), fld.to_expr()),
                    ),
                ),
            )
        };
        let guard = |footprint_heap: &BVar| {
            BExpr::and_all(vec![
                is_good_heap(h0.to_expr()),
                is_good_heap(h1.to_expr()),
                a.boxes_typed(),
                BExpr::call("$Is", vec![f.to_expr(), a.arrow_ty()]),
                agree_on(footprint_heap),
            ])
        };
        let mut decls = vec![];
        for (proj, footprint_heap) in [
            ("Apply", &h0),
            ("Apply", &h1),
            ("Requires", &h0),
            ("Requires", &h1),
            ("Reads", &h0),
            ("Reads", &h1),
        ] {
            let at0 = a.proj(proj, h0.to_expr(), f.to_expr());
            let at1 = a.proj(proj, h1.to_expr(), f.to_expr());
            let equal = if proj == "Reads" {
                BExpr::call("Set#Equal", vec![at0, at1.clone()])
            } else {
                BExpr::eq(at0, at1.clone())
            };
            decls.push(Decl::axiom_with_comment(
                BExpr::forall(
                    vars.clone(),
                    vec![vec![heap_succ(h0.to_expr(), h1.to_expr()), at1]],
                    BExpr::imp(guard(footprint_heap), equal),
                ),
                &format!("frame axiom for {}{}", proj, a.n),
            ));
        }
        decls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boogie_backend::{options::BoogieOptions, vocabulary::Vocabulary};
    use veri_model::model::GlobalEnv;

    #[test]
    fn arity_vocabulary_is_emitted_once() {
        let env = GlobalEnv::new();
        let options = BoogieOptions::default();
        let vocab = Vocabulary::builtin().unwrap();
        let tr = BoogieTranslator::new(&env, &options, &vocab);
        tr.ensure_arrow_arity(2);
        let count = tr.program_len();
        tr.ensure_arrow_arity(2);
        assert_eq!(tr.program_len(), count);
        let program = tr.translate();
        for name in ["TArrow2", "Apply2", "Requires2", "Reads2", "Handle2"] {
            assert!(program.is_declared(name), "{} missing", name);
        }
        assert_eq!(program.axioms_commented("frame axiom for Apply2").len(), 2);
        let text = program.to_string();
        assert!(text.contains("function Apply2(t0: Ty, t1: Ty, t: Ty, heap: Heap, f: HandleType, bx0: Box, bx1: Box) : Box;"));
    }

    #[test]
    fn frame_axioms_can_be_disabled() {
        let env = GlobalEnv::new();
        let options = BoogieOptions {
            emit_closure_frame_axioms: false,
            ..BoogieOptions::default()
        };
        let vocab = Vocabulary::builtin().unwrap();
        let tr = BoogieTranslator::new(&env, &options, &vocab);
        tr.ensure_arrow_arity(1);
        let program = tr.translate();
        assert!(program.is_declared("Apply1"));
        assert!(program.axioms_commented("frame axiom").is_empty());
    }
}
