// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Helpers for naming declarations and building recurring Boogie terms.

use veri_boogie_ir::{BBinOp, BExpr, BType, BVar, Token};
use veri_model::model::{
    CallableId, ClassId, CtorRef, DatatypeId, FieldId, FunId, GlobalEnv, IteratorId, Loc,
    MethodId, ModuleId, QualifiedId,
};

/// Name of the global heap variable.
pub const HEAP: &str = "$Heap";
/// Name of the receiver parameter of procedures and functions.
pub const THIS: &str = "this";
/// Name of the frame variable holding the modifies clause of the enclosing method.
pub const FRAME: &str = "$_Frame";
/// Name of the frame variable holding the reads clause of the enclosing function.
pub const READS_FRAME: &str = "$_ReadsFrame";
/// Name of the heap at the start of the current iteration step of an iterator body.
pub const OLD_ITER_HEAP: &str = "$_OldIterHeap";
/// Name of the layer parameter of fuel-aware functions.
pub const LAYER: &str = "$ly";

/// Return boogie name of given module.
pub fn boogie_module_name(env: &GlobalEnv, module_id: ModuleId) -> String {
    env.module(module_id).name.clone()
}

/// Prefix of members: `M` for module level members, `M.C` for class members.
fn boogie_member_prefix(env: &GlobalEnv, module_id: ModuleId, owner: Option<ClassId>) -> String {
    match owner {
        Some(class) => boogie_class_name(env, module_id.qualified(class)),
        None => boogie_module_name(env, module_id),
    }
}

pub fn boogie_class_name(env: &GlobalEnv, qid: QualifiedId<ClassId>) -> String {
    format!(
        "{}.{}",
        boogie_module_name(env, qid.module_id),
        env.class(qid).name
    )
}

pub fn boogie_datatype_name(env: &GlobalEnv, qid: QualifiedId<DatatypeId>) -> String {
    format!(
        "{}.{}",
        boogie_module_name(env, qid.module_id),
        env.datatype(qid).name
    )
}

/// The type-value constructor of a class, `Tclass.M.C?` for the nullable type.
pub fn boogie_class_ty_name(env: &GlobalEnv, qid: QualifiedId<ClassId>, nullable: bool) -> String {
    format!(
        "Tclass.{}{}",
        boogie_class_name(env, qid),
        if nullable { "?" } else { "" }
    )
}

pub fn boogie_datatype_ty_name(env: &GlobalEnv, qid: QualifiedId<DatatypeId>) -> String {
    format!("Tclass.{}", boogie_datatype_name(env, qid))
}

/// The tag constant of a type-value constructor.
pub fn boogie_tag_name(ty_name: &str) -> String {
    match ty_name.strip_prefix("Tclass.") {
        Some(rest) => format!("Tagclass.{}", rest),
        None => format!("Tag{}", ty_name),
    }
}

/// Predicate on type values telling which dynamic types implement a trait.
pub fn boogie_implements_name(env: &GlobalEnv, qid: QualifiedId<ClassId>) -> String {
    format!("implements${}", boogie_class_name(env, qid))
}

pub fn boogie_ctor_name(env: &GlobalEnv, ctor: CtorRef) -> String {
    format!(
        "#{}.{}",
        boogie_datatype_name(env, ctor.datatype),
        env.ctor(ctor).name
    )
}

pub fn boogie_ctor_id_name(env: &GlobalEnv, ctor: CtorRef) -> String {
    format!(
        "##{}.{}",
        boogie_datatype_name(env, ctor.datatype),
        env.ctor(ctor).name
    )
}

/// The constructor test `M.D.C_q`.
pub fn boogie_ctor_test_name(env: &GlobalEnv, ctor: CtorRef) -> String {
    format!(
        "{}.{}_q",
        boogie_datatype_name(env, ctor.datatype),
        env.ctor(ctor).name
    )
}

pub fn boogie_dtor_name(env: &GlobalEnv, ctor: CtorRef, index: usize) -> String {
    let ctor_data = env.ctor(ctor);
    format!(
        "{}.{}.{}",
        boogie_datatype_name(env, ctor.datatype),
        ctor_data.name,
        ctor_data.formals[index].name
    )
}

pub fn boogie_field_name(env: &GlobalEnv, qid: QualifiedId<FieldId>) -> String {
    let field = env.field(qid);
    format!(
        "{}.{}",
        boogie_member_prefix(env, qid.module_id, Some(field.owner)),
        field.name
    )
}

pub fn boogie_function_name(env: &GlobalEnv, qid: QualifiedId<FunId>) -> String {
    let fun = env.function(qid);
    format!(
        "{}.{}",
        boogie_member_prefix(env, qid.module_id, fun.owner),
        fun.name
    )
}

pub fn boogie_can_call_name(env: &GlobalEnv, qid: QualifiedId<FunId>) -> String {
    format!("{}#canCall", boogie_function_name(env, qid))
}

pub fn boogie_base_fuel_name(env: &GlobalEnv, qid: QualifiedId<FunId>) -> String {
    format!("BaseFuel_{}", boogie_function_name(env, qid))
}

pub fn boogie_start_fuel_name(env: &GlobalEnv, qid: QualifiedId<FunId>) -> String {
    format!("StartFuel_{}", boogie_function_name(env, qid))
}

pub fn boogie_start_fuel_assert_name(env: &GlobalEnv, qid: QualifiedId<FunId>) -> String {
    format!("StartFuelAssert_{}", boogie_function_name(env, qid))
}

pub fn boogie_method_name(env: &GlobalEnv, qid: QualifiedId<MethodId>) -> String {
    let method = env.method(qid);
    format!(
        "{}.{}",
        boogie_member_prefix(env, qid.module_id, method.owner),
        method.name
    )
}

/// The procedure callers call.
pub fn boogie_call_proc_name(env: &GlobalEnv, qid: QualifiedId<MethodId>) -> String {
    format!("Call$${}", boogie_method_name(env, qid))
}

/// The procedure whose implementation is the method body.
pub fn boogie_impl_proc_name(env: &GlobalEnv, qid: QualifiedId<MethodId>) -> String {
    format!("Impl$${}", boogie_method_name(env, qid))
}

pub fn boogie_iterator_name(env: &GlobalEnv, qid: QualifiedId<IteratorId>) -> String {
    format!(
        "{}.{}",
        boogie_module_name(env, qid.module_id),
        env.iterator(qid).name
    )
}

/// The procedure whose implementation is the iterator body.
pub fn boogie_iterator_impl_proc_name(env: &GlobalEnv, qid: QualifiedId<IteratorId>) -> String {
    format!("Impl$${}", boogie_iterator_name(env, qid))
}

/// The procedure checking well-formedness of the specification of a callable.
pub fn boogie_wf_proc_name(env: &GlobalEnv, callable: CallableId) -> String {
    format!("CheckWellformed$${}", boogie_callable_name(env, callable))
}

pub fn boogie_callable_name(env: &GlobalEnv, callable: CallableId) -> String {
    match callable {
        CallableId::Function(qid) => boogie_function_name(env, qid),
        CallableId::Method(qid) => boogie_method_name(env, qid),
        CallableId::Iterator(qid) => boogie_iterator_name(env, qid),
    }
}

/// Return boogie name of a source local, parameter or bound variable. Names carrying a `#`
/// were generated by the translator and are kept as they are.
pub fn boogie_local_name(name: &str) -> String {
    if name.contains('#') {
        name.to_string()
    } else {
        format!("{}#0", name)
    }
}

/// The type-value parameter standing for a type parameter.
pub fn boogie_type_param_name(name: &str) -> String {
    format!("#${}", name)
}

pub fn boogie_type_param_vars(params: &[String]) -> Vec<BVar> {
    params
        .iter()
        .map(|p| BVar::new(&boogie_type_param_name(p), BType::named("Ty")))
        .collect()
}

/// Source token of a location.
pub fn boogie_token(env: &GlobalEnv, loc: &Loc) -> Token {
    let pos = env.position(loc);
    Token::new(&pos.file, pos.line, pos.column)
}

// Terms
// -----

pub fn heap_type() -> BType {
    BType::named("Heap")
}

pub fn ref_type() -> BType {
    BType::named("ref")
}

pub fn box_type() -> BType {
    BType::named("Box")
}

pub fn field_type() -> BType {
    BType::named("Field")
}

pub fn layer_type() -> BType {
    BType::named("LayerType")
}

/// The type of frame variables, `[ref, Field]bool`.
pub fn frame_type() -> BType {
    BType::map(vec![ref_type(), field_type()], BType::Bool)
}

pub fn null() -> BExpr {
    BExpr::ident("null")
}

/// `read(h, o, f)`: the boxed value of field `f` of `o`.
pub fn heap_read(heap: BExpr, obj: BExpr, field: BExpr) -> BExpr {
    BExpr::call("read", vec![heap, obj, field])
}

pub fn heap_update(heap: BExpr, obj: BExpr, field: BExpr, value: BExpr) -> BExpr {
    BExpr::call("update", vec![heap, obj, field, value])
}

/// Whether `obj` is allocated in `heap`.
pub fn is_allocated(heap: BExpr, obj: BExpr) -> BExpr {
    BExpr::coerce(
        BExpr::call(
            "$Unbox",
            vec![heap_read(heap, obj, BExpr::ident("alloc"))],
        ),
        BType::Bool,
    )
}

pub fn is_good_heap(heap: BExpr) -> BExpr {
    BExpr::call("$IsGoodHeap", vec![heap])
}

pub fn heap_succ(h0: BExpr, h1: BExpr) -> BExpr {
    BExpr::call("$HeapSucc", vec![h0, h1])
}

/// `$LS` applied `n` times.
pub fn layer_succ(base: BExpr, n: u32) -> BExpr {
    (0..n).fold(base, |e, _| BExpr::call("$LS", vec![e]))
}

pub fn layer_zero() -> BExpr {
    BExpr::ident("$LZ")
}

/// The field selecting element `indices` of an array.
pub fn array_index_field(indices: Vec<BExpr>) -> BExpr {
    let mut iter = indices.into_iter();
    let first = iter
        .next()
        .unwrap_or_else(|| panic!("BUG: array selection without indices"));
    iter.fold(BExpr::call("IndexField", vec![first]), |f, i| {
        BExpr::call("MultiIndexField", vec![f, i])
    })
}

/// `$ModuleContextHeight == m && $FunctionContextHeight == h`
pub fn context_heights_equal(module_height: usize, fun_height: usize) -> BExpr {
    BExpr::and(
        BExpr::eq(
            BExpr::ident("$ModuleContextHeight"),
            BExpr::int(module_height as i64),
        ),
        BExpr::eq(
            BExpr::ident("$FunctionContextHeight"),
            BExpr::int(fun_height as i64),
        ),
    )
}

/// Guard of axioms that are visible from contexts above a declaration: other modules
/// importing this one, or declarations of this module with a greater height.
pub fn context_above(module_height: usize, fun_height: usize) -> BExpr {
    BExpr::or(
        BExpr::binary(
            BBinOp::Gt,
            BExpr::ident("$ModuleContextHeight"),
            BExpr::int(module_height as i64),
        ),
        context_above_in_module(module_height, fun_height),
    )
}

/// Guard of axioms that are only visible within the module of a declaration, above it.
pub fn context_above_in_module(module_height: usize, fun_height: usize) -> BExpr {
    BExpr::and(
        BExpr::eq(
            BExpr::ident("$ModuleContextHeight"),
            BExpr::int(module_height as i64),
        ),
        BExpr::binary(
            BBinOp::Gt,
            BExpr::ident("$FunctionContextHeight"),
            BExpr::int(fun_height as i64),
        ),
    )
}

/// Guard of axioms only visible from other modules.
pub fn context_outside_module(module_height: usize) -> BExpr {
    BExpr::binary(
        BBinOp::Gt,
        BExpr::ident("$ModuleContextHeight"),
        BExpr::int(module_height as i64),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_names() {
        assert_eq!(boogie_local_name("x"), "x#0");
        assert_eq!(boogie_local_name("$rhs#3"), "$rhs#3");
        assert_eq!(boogie_type_param_name("T"), "#$T");
        assert_eq!(boogie_tag_name("Tclass.M.C?"), "Tagclass.M.C?");
    }

    #[test]
    fn layers_and_index_fields() {
        assert_eq!(
            layer_succ(BExpr::ident("BaseFuel_M.f"), 2).to_string(),
            "$LS($LS(BaseFuel_M.f))"
        );
        assert_eq!(
            array_index_field(vec![BExpr::ident("i"), BExpr::ident("j")]).to_string(),
            "MultiIndexField(IndexField(i), j)"
        );
    }
}
