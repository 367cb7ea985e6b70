// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Encoding of source types.
//!
//! Values have a natural Boogie type (`boogie_type`), and a uniform boxed representation used
//! in generic positions: type parameters, collection elements, heap cells. Source types are
//! also reified as values of type `Ty` (`type_to_ty`), consumed by `$Is`/`$IsAlloc`.

use crate::boogie_backend::{
    boogie_helpers::{
        boogie_class_ty_name, boogie_datatype_ty_name, boogie_tag_name, boogie_type_param_name,
        box_type,
    },
    decl_translator::BoogieTranslator,
};
use itertools::Itertools;
use veri_boogie_ir::{BExpr, BType, BVar, Decl};
use veri_model::{
    model::{ClassId, DatatypeId, QualifiedId},
    ty::Type,
};

/// The Boogie type of values of a source type.
pub fn boogie_type(ty: &Type) -> BType {
    match ty {
        Type::Bool => BType::Bool,
        Type::Int => BType::Int,
        Type::Real => BType::Real,
        Type::Char => BType::named("char"),
        Type::BitVector(n) => BType::Bv(*n),
        Type::Set(_) => BType::app("Set", vec![box_type()]),
        Type::ISet(_) => BType::app("ISet", vec![box_type()]),
        Type::MultiSet(_) => BType::app("MultiSet", vec![box_type()]),
        Type::Seq(_) => BType::app("Seq", vec![box_type()]),
        Type::Map(..) => BType::app("Map", vec![box_type(), box_type()]),
        Type::IMap(..) => BType::app("IMap", vec![box_type(), box_type()]),
        Type::Datatype(..) => BType::named("DatatypeType"),
        Type::Class { .. } | Type::Object { .. } | Type::Array { .. } => BType::named("ref"),
        Type::Arrow(..) => BType::named("HandleType"),
        Type::TypeParameter(_) => box_type(),
        Type::Unresolved => panic!("BUG: unresolved type reached the translator"),
    }
}

/// Whether every value of the Boogie type of `ty` is a value of `ty`, so that typing
/// predicates are trivially true.
pub fn is_trivially_typed(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Bool | Type::Int | Type::Real | Type::Char | Type::BitVector(_)
    )
}

/// Boxes a value of type `ty`. Values of type parameters are boxed already.
pub fn box_value(e: BExpr, ty: &Type) -> BExpr {
    if ty.is_type_parameter() {
        return e;
    }
    match e {
        BExpr::Coerce(inner, _) if inner.is_call_of("$Unbox") => match *inner {
            BExpr::FunCall { mut args, .. } if args.len() == 1 => args.remove(0),
            other => BExpr::call("$Box", vec![other]),
        },
        e => BExpr::call("$Box", vec![e]),
    }
}

/// Unboxes a box to a value of type `ty`.
pub fn unbox_value(e: BExpr, ty: &Type) -> BExpr {
    if ty.is_type_parameter() {
        return e;
    }
    match e {
        BExpr::FunCall { name, mut args } if name == "$Box" && args.len() == 1 => args.remove(0),
        e => BExpr::coerce(BExpr::call("$Unbox", vec![e]), boogie_type(ty)),
    }
}

/// Converts a value of type `actual` to the representation of `declared`, where `declared`
/// may be a type parameter instantiated by `actual`.
pub fn coerce_value(e: BExpr, declared: &Type, actual: &Type) -> BExpr {
    match (declared.is_type_parameter(), actual.is_type_parameter()) {
        (true, false) => box_value(e, actual),
        (false, true) => unbox_value(e, declared),
        _ => e,
    }
}

/// Declarations of a type-value constructor of the given arity: the constructor, its tag
/// and the injectivity inverses.
pub(crate) fn ty_ctor_decls(name: &str, arity: usize) -> Vec<Decl> {
    let ty = BType::named("Ty");
    let tag = boogie_tag_name(name);
    let mut decls = vec![Decl::constant(&tag, BType::named("TyTag"), true)];
    if arity == 0 {
        decls.push(Decl::constant(name, ty, true));
        decls.push(Decl::axiom(BExpr::eq(
            BExpr::call("Tag", vec![BExpr::ident(name)]),
            BExpr::ident(&tag),
        )));
        return decls;
    }
    let vars = (0..arity)
        .map(|i| BVar::new(&format!("t{}", i), ty.clone()))
        .collect_vec();
    let app = BExpr::call(name, vars.iter().map(BVar::to_expr).collect());
    decls.push(Decl::function(name, vars.clone(), ty.clone()));
    decls.push(Decl::axiom(BExpr::forall(
        vars.clone(),
        vec![vec![app.clone()]],
        BExpr::eq(BExpr::call("Tag", vec![app.clone()]), BExpr::ident(&tag)),
    )));
    for (i, var) in vars.iter().enumerate() {
        let inv = format!("{}_{}", name, i);
        decls.push(Decl::function(
            &inv,
            vec![BVar::new("t", ty.clone())],
            ty.clone(),
        ));
        decls.push(Decl::axiom(BExpr::forall(
            vars.clone(),
            vec![vec![app.clone()]],
            BExpr::eq(BExpr::call(&inv, vec![app.clone()]), var.to_expr()),
        )));
    }
    decls
}

impl<'env> BoogieTranslator<'env> {
    /// Reifies a type as a `Ty` value.
    pub fn type_to_ty(&self, ty: &Type) -> BExpr {
        let list = |tys: &[Type]| tys.iter().map(|t| self.type_to_ty(t)).collect_vec();
        match ty {
            Type::Bool => BExpr::ident("TBool"),
            Type::Int => BExpr::ident("TInt"),
            Type::Real => BExpr::ident("TReal"),
            Type::Char => BExpr::ident("TChar"),
            Type::BitVector(n) => BExpr::call("TBitvector", vec![BExpr::int(*n as i64)]),
            Type::Set(e) => BExpr::call("TSet", vec![self.type_to_ty(e)]),
            Type::ISet(e) => BExpr::call("TISet", vec![self.type_to_ty(e)]),
            Type::MultiSet(e) => BExpr::call("TMultiSet", vec![self.type_to_ty(e)]),
            Type::Seq(e) => BExpr::call("TSeq", vec![self.type_to_ty(e)]),
            Type::Map(k, v) => BExpr::call("TMap", vec![self.type_to_ty(k), self.type_to_ty(v)]),
            Type::IMap(k, v) => {
                BExpr::call("TIMap", vec![self.type_to_ty(k), self.type_to_ty(v)])
            }
            Type::Datatype(qid, args) => {
                self.ensure_datatype_ty(*qid);
                let name = boogie_datatype_ty_name(self.env, *qid);
                if args.is_empty() {
                    BExpr::ident(&name)
                } else {
                    BExpr::call(&name, list(args))
                }
            }
            Type::Class { id, args, nullable } => {
                self.ensure_class_ty(*id);
                let name = boogie_class_ty_name(self.env, *id, *nullable);
                if args.is_empty() {
                    BExpr::ident(&name)
                } else {
                    BExpr::call(&name, list(args))
                }
            }
            Type::Object { nullable } => BExpr::ident(if *nullable {
                "Tclass._System.object?"
            } else {
                "Tclass._System.object"
            }),
            Type::Array {
                elem,
                dims,
                nullable,
            } => BExpr::call(
                if *nullable { "TArray?" } else { "TArray" },
                vec![BExpr::int(*dims as i64), self.type_to_ty(elem)],
            ),
            Type::Arrow(args, res) => {
                self.ensure_arrow_arity(args.len());
                let mut tys = list(args);
                tys.push(self.type_to_ty(res));
                BExpr::call(&format!("TArrow{}", args.len()), tys)
            }
            Type::TypeParameter(name) => BExpr::ident(&boogie_type_param_name(name)),
            Type::Unresolved => panic!("BUG: unresolved type reached the translator"),
        }
    }

    /// `$Is(e, ty)` for a value `e` in its natural representation.
    pub fn type_is(&self, e: BExpr, ty: &Type) -> BExpr {
        if is_trivially_typed(ty) {
            BExpr::tru()
        } else if ty.is_type_parameter() {
            BExpr::call("$IsBox", vec![e, self.type_to_ty(ty)])
        } else {
            BExpr::call("$Is", vec![e, self.type_to_ty(ty)])
        }
    }

    /// `$IsAlloc(e, ty, heap)` for a value `e` in its natural representation.
    pub fn type_is_alloc(&self, e: BExpr, ty: &Type, heap: BExpr) -> BExpr {
        if is_trivially_typed(ty) {
            BExpr::tru()
        } else if ty.is_type_parameter() {
            BExpr::call("$IsAllocBox", vec![e, self.type_to_ty(ty), heap])
        } else {
            BExpr::call("$IsAlloc", vec![e, self.type_to_ty(ty), heap])
        }
    }

    /// `$IsBox(bx, ty)` for a boxed value.
    pub fn box_is(&self, bx: BExpr, ty: &Type) -> BExpr {
        BExpr::call("$IsBox", vec![bx, self.type_to_ty(ty)])
    }

    pub fn box_is_alloc(&self, bx: BExpr, ty: &Type, heap: BExpr) -> BExpr {
        BExpr::call("$IsAllocBox", vec![bx, self.type_to_ty(ty), heap])
    }

    /// Emits the nullable and non-null type-value constructors of a class once.
    pub(crate) fn ensure_class_ty(&self, qid: QualifiedId<ClassId>) {
        let arity = self.env.class(qid).type_params.len();
        let nullable = boogie_class_ty_name(self.env, qid, true);
        self.emit_once(&nullable, || {
            let mut decls = ty_ctor_decls(&nullable, arity);
            decls.extend(ty_ctor_decls(
                &boogie_class_ty_name(self.env, qid, false),
                arity,
            ));
            decls
        });
    }

    pub(crate) fn ensure_datatype_ty(&self, qid: QualifiedId<DatatypeId>) {
        let arity = self.env.datatype(qid).type_params.len();
        let name = boogie_datatype_ty_name(self.env, qid);
        self.emit_once(&name, || ty_ctor_decls(&name, arity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boogie_backend::{options::BoogieOptions, vocabulary::Vocabulary};
    use std::collections::BTreeMap;
    use veri_model::model::{ClassData, GlobalEnv, ModuleData};

    #[test]
    fn natural_types() {
        assert_eq!(boogie_type(&Type::seq(Type::Int)).to_string(), "Seq Box");
        assert_eq!(
            boogie_type(&Type::map(Type::Int, Type::Bool)).to_string(),
            "Map Box Box"
        );
        assert_eq!(boogie_type(&Type::array(Type::Int)).to_string(), "ref");
        assert_eq!(boogie_type(&Type::type_param("T")).to_string(), "Box");
        assert_eq!(boogie_type(&Type::BitVector(8)).to_string(), "bv8");
    }

    #[test]
    fn box_unbox_collapse() {
        let x = BExpr::ident("x");
        let boxed = box_value(x.clone(), &Type::Int);
        assert_eq!(boxed.to_string(), "$Box(x)");
        assert_eq!(unbox_value(boxed, &Type::Int), x);
        let unboxed = unbox_value(BExpr::ident("b"), &Type::Int);
        assert_eq!(unboxed.to_string(), "($Unbox(b): int)");
        assert_eq!(box_value(unboxed, &Type::Int), BExpr::ident("b"));
        assert_eq!(
            coerce_value(x.clone(), &Type::type_param("T"), &Type::Int).to_string(),
            "$Box(x)"
        );
        assert_eq!(coerce_value(x.clone(), &Type::Int, &Type::Int), x);
    }

    #[test]
    #[should_panic(expected = "BUG")]
    fn unresolved_types_are_bugs() {
        boogie_type(&Type::Unresolved);
    }

    #[test]
    fn type_values_are_memoized() {
        let mut env = GlobalEnv::new();
        let m = env.add_module(ModuleData::new("M", 0));
        env.module_mut(m).classes.push(ClassData {
            name: "C".to_string(),
            loc: Default::default(),
            type_params: vec!["T".to_string()],
            is_trait: false,
            parents: vec![],
            fuel: vec![],
        });
        let options = BoogieOptions::default();
        let vocab = Vocabulary::builtin().unwrap();
        let tr = BoogieTranslator::new(&env, &options, &vocab);
        let class = Type::Class {
            id: m.qualified(ClassId(0)),
            args: vec![Type::Int],
            nullable: false,
        };
        let ty = tr.type_to_ty(&class);
        assert_eq!(ty.to_string(), "Tclass.M.C(TInt)");
        let count = tr.program_len();
        // Identity instantiation gives the same value and emits nothing new.
        let again = tr.type_to_ty(&class.instantiate(&BTreeMap::new()));
        assert_eq!(ty, again);
        assert_eq!(tr.program_len(), count);
        assert!(tr.type_is(BExpr::ident("x"), &Type::Int).is_true());
        assert_eq!(
            tr.type_is(BExpr::ident("b"), &Type::type_param("T"))
                .to_string(),
            "$IsBox(b, #$T)"
        );
    }
}
