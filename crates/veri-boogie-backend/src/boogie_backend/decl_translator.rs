// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! This module translates the declarations of a resolved program into Boogie.
//!
//! `BoogieTranslator` owns the program under construction and drives the translation of all
//! modules in dependency order. Class and datatype scaffolding lives here; functions, methods
//! and closures are translated in their own modules.

use crate::boogie_backend::{
    boogie_helpers::{
        boogie_class_name, boogie_class_ty_name, boogie_ctor_id_name, boogie_ctor_name,
        boogie_ctor_test_name, boogie_datatype_name, boogie_datatype_ty_name, boogie_dtor_name,
        boogie_field_name, boogie_implements_name, boogie_iterator_name, boogie_token,
        boogie_type_param_vars, heap_read, heap_type, is_allocated, is_good_heap, null, ref_type,
    },
    context::DeclContext,
    options::BoogieOptions,
    type_encoder::{boogie_type, unbox_value},
    vocabulary::Vocabulary,
};
use itertools::Itertools;
use log::{debug, info};
use std::{
    cell::RefCell,
    collections::BTreeSet,
    rc::Rc,
};
use veri_boogie_ir::{BExpr, BType, BVar, Decl, Function, Program, Token};
use veri_model::{
    model::{
        CallableId, ClassId, CtorRef, DatatypeId, FieldId, FuelAnnotation, FunId, GlobalEnv,
        IteratorId, Loc, MethodId, ModuleId, QualifiedId,
    },
    ty::Type,
};

pub struct BoogieTranslator<'env> {
    pub env: &'env GlobalEnv,
    pub options: &'env BoogieOptions,
    pub vocab: &'env Vocabulary,
    program: RefCell<Program>,
    /// The declaration currently being translated.
    current: RefCell<Option<Rc<DeclContext>>>,
    /// Keys of declarations emitted on demand.
    emitted: RefCell<BTreeSet<String>>,
}

impl<'env> BoogieTranslator<'env> {
    pub fn new(env: &'env GlobalEnv, options: &'env BoogieOptions, vocab: &'env Vocabulary) -> Self {
        Self {
            env,
            options,
            vocab,
            program: RefCell::new(Program::new()),
            current: RefCell::new(None),
            emitted: RefCell::new(BTreeSet::new()),
        }
    }

    pub fn emit(&self, decl: Decl) {
        self.program.borrow_mut().add(decl)
    }

    pub fn emit_all(&self, decls: impl IntoIterator<Item = Decl>) {
        for decl in decls {
            self.emit(decl)
        }
    }

    /// Emits the declarations produced by `f` unless `key` was emitted before. The key is
    /// registered before `f` runs, so `f` may request further on-demand declarations.
    pub fn emit_once(&self, key: &str, f: impl FnOnce() -> Vec<Decl>) {
        if !self.emitted.borrow_mut().insert(key.to_string()) {
            return;
        }
        let decls = f();
        self.emit_all(decls)
    }

    pub fn program_len(&self) -> usize {
        self.program.borrow().len()
    }

    /// Whether literal hints are generated. Requires `Lit` in the preamble.
    pub fn use_lit(&self) -> bool {
        self.options.use_literal_hints && self.vocab.has_function("Lit")
    }

    pub fn token(&self, loc: &Loc) -> Token {
        boogie_token(self.env, loc)
    }

    pub fn error(&self, loc: &Loc, msg: &str) {
        self.env.error(loc, &format!("[boogie translator] {}", msg))
    }

    pub fn new_context(&self, module_id: ModuleId, callable: Option<CallableId>) -> DeclContext {
        DeclContext::new(
            self.env,
            module_id,
            callable,
            (self.options.default_fuel_low, self.options.default_fuel_high),
        )
    }

    fn enter(&self, ctx: Rc<DeclContext>) {
        let mut current = self.current.borrow_mut();
        if current.is_some() {
            panic!("BUG: entering a declaration context while another one is active")
        }
        *current = Some(ctx)
    }

    fn exit(&self) {
        match self.current.borrow_mut().take() {
            None => panic!("BUG: leaving a declaration context that was never entered"),
            Some(ctx) if ctx.fuel_depth() != 0 => {
                panic!("BUG: leaving a declaration context with open fuel scopes")
            }
            Some(_) => {}
        }
    }

    /// Runs `f` with `ctx` as the active declaration context.
    pub fn with_context<R>(&self, ctx: DeclContext, f: impl FnOnce(&DeclContext) -> R) -> R {
        let ctx = Rc::new(ctx);
        self.enter(ctx.clone());
        let result = f(&ctx);
        self.exit();
        result
    }

    /// Like `with_context`, but suspends the active context for the duration of `f`.
    pub fn with_nested_context<R>(&self, ctx: DeclContext, f: impl FnOnce(&DeclContext) -> R) -> R {
        let saved = self.current.borrow_mut().take();
        let result = self.with_context(ctx, f);
        *self.current.borrow_mut() = saved;
        result
    }

    /// Opens the declaration level fuel scopes of a member: module, class, then the member's
    /// own annotations. Returns the number of scopes pushed.
    pub(crate) fn push_member_fuel_scopes(
        &self,
        ctx: &DeclContext,
        module_id: ModuleId,
        owner: Option<ClassId>,
        own: &[FuelAnnotation],
    ) -> usize {
        ctx.push_decl_fuel_scope(self.env, &self.env.module(module_id).fuel);
        let mut pushed = 1;
        if let Some(class) = owner {
            ctx.push_decl_fuel_scope(self.env, &self.env.class(module_id.qualified(class)).fuel);
            pushed += 1;
        }
        ctx.push_decl_fuel_scope(self.env, own);
        pushed + 1
    }

    /// Translates every module, lowest height first.
    pub fn translate(self) -> Program {
        let env = self.env;
        let modules = env
            .get_modules()
            .sorted_by_key(|(_, m)| m.height)
            .map(|(id, _)| id)
            .collect_vec();
        for module_id in modules {
            let module = env.module(module_id);
            info!(
                "translating module {} ({} classes, {} datatypes, {} functions, {} methods, {} iterators)",
                module.name,
                module.classes.len(),
                module.datatypes.len(),
                module.functions.len(),
                module.methods.len(),
                module.iterators.len()
            );
            for i in 0..module.classes.len() {
                let qid = module_id.qualified(ClassId(i));
                debug!("class {}", boogie_class_name(env, qid));
                self.translate_class(qid);
            }
            for i in 0..module.datatypes.len() {
                let qid = module_id.qualified(DatatypeId(i));
                debug!("datatype {}", boogie_datatype_name(env, qid));
                self.translate_datatype(qid);
            }
            for i in 0..module.fields.len() {
                let qid = module_id.qualified(FieldId(i));
                debug!("field {}", boogie_field_name(env, qid));
                self.translate_field(qid);
            }
            for i in 0..module.functions.len() {
                let qid = module_id.qualified(FunId(i));
                debug!("function {}", env.function(qid).name);
                self.translate_function(qid);
            }
            for i in 0..module.methods.len() {
                let qid = module_id.qualified(MethodId(i));
                debug!("method {}", env.method(qid).name);
                self.translate_method(qid);
            }
            for i in 0..module.iterators.len() {
                let qid = module_id.qualified(IteratorId(i));
                debug!("iterator {}", boogie_iterator_name(env, qid));
                self.translate_iterator(qid);
            }
        }
        self.program.into_inner()
    }

    // Classes
    // -------

    fn class_ty(&self, qid: QualifiedId<ClassId>, nullable: bool, args: &[BVar]) -> BExpr {
        let name = boogie_class_ty_name(self.env, qid, nullable);
        if args.is_empty() {
            BExpr::ident(&name)
        } else {
            BExpr::call(&name, args.iter().map(BVar::to_expr).collect())
        }
    }

    pub(crate) fn translate_class(&self, qid: QualifiedId<ClassId>) {
        let class = self.env.class(qid);
        self.ensure_class_ty(qid);
        let tys = boogie_type_param_vars(&class.type_params);
        let o = BVar::new("$o", ref_type());
        let h = BVar::new("$h", heap_type());
        let nullable = self.class_ty(qid, true, &tys);
        let non_null = self.class_ty(qid, false, &tys);
        let with = |extra: &[&BVar]| {
            tys.iter()
                .cloned()
                .chain(extra.iter().map(|v| (*v).clone()))
                .collect_vec()
        };
        let is = |ty: &BExpr| BExpr::call("$Is", vec![o.to_expr(), ty.clone()]);
        let is_alloc =
            |ty: &BExpr| BExpr::call("$IsAlloc", vec![o.to_expr(), ty.clone(), h.to_expr()]);

        if class.is_trait {
            let implements = boogie_implements_name(self.env, qid);
            self.emit(Decl::function(
                &implements,
                vec![BVar::new("ty", BType::named("Ty"))],
                BType::Bool,
            ));
            self.emit(Decl::axiom_with_comment(
                BExpr::forall(
                    with(&[&o]),
                    vec![vec![is(&nullable)]],
                    BExpr::iff(
                        is(&nullable),
                        BExpr::or(
                            BExpr::eq(o.to_expr(), null()),
                            BExpr::call(&implements, vec![BExpr::call("dtype", vec![o.to_expr()])]),
                        ),
                    ),
                ),
                &format!("trait {}", class.name),
            ));
        } else {
            self.emit(Decl::axiom_with_comment(
                BExpr::forall(
                    with(&[&o]),
                    vec![vec![is(&nullable)]],
                    BExpr::iff(
                        is(&nullable),
                        BExpr::or(
                            BExpr::eq(o.to_expr(), null()),
                            BExpr::eq(BExpr::call("dtype", vec![o.to_expr()]), nullable.clone()),
                        ),
                    ),
                ),
                &format!("class {}", class.name),
            ));
        }
        self.emit(Decl::axiom(BExpr::forall(
            with(&[&o]),
            vec![vec![is(&non_null)]],
            BExpr::iff(
                is(&non_null),
                BExpr::and(BExpr::neq(o.to_expr(), null()), is(&nullable)),
            ),
        )));
        self.emit(Decl::axiom(BExpr::forall(
            with(&[&o, &h]),
            vec![vec![is_alloc(&nullable)]],
            BExpr::iff(
                is_alloc(&nullable),
                BExpr::or(
                    BExpr::eq(o.to_expr(), null()),
                    is_allocated(h.to_expr(), o.to_expr()),
                ),
            ),
        )));
        self.emit(Decl::axiom(BExpr::forall(
            with(&[&o, &h]),
            vec![vec![is_alloc(&non_null)]],
            BExpr::iff(is_alloc(&non_null), is_alloc(&nullable)),
        )));
        for parent in &class.parents {
            if !self.env.class(*parent).is_trait {
                self.error(
                    &class.loc,
                    &format!("`{}` can only extend traits", class.name),
                );
                continue;
            }
            self.emit(Decl::axiom(BExpr::forall(
                tys.clone(),
                vec![],
                BExpr::call(
                    &boogie_implements_name(self.env, *parent),
                    vec![nullable.clone()],
                ),
            )));
        }
    }

    // Fields
    // ------

    pub(crate) fn translate_field(&self, qid: QualifiedId<FieldId>) {
        let env = self.env;
        let field = env.field(qid);
        let owner = qid.module_id.qualified(field.owner);
        let class = env.class(owner);
        let name = boogie_field_name(env, qid);
        let tys = boogie_type_param_vars(&class.type_params);
        let o = BVar::new("$o", ref_type());
        let owner_ty = self.class_ty(owner, true, &tys);
        let is_owner = BExpr::call("$Is", vec![o.to_expr(), owner_ty.clone()]);
        let quantified = |extra: Vec<BVar>| tys.iter().cloned().chain(extra).collect_vec();
        // Type variables must be reachable from the triggers.
        let trigger = |t: BExpr| {
            if tys.is_empty() {
                vec![t]
            } else {
                vec![t, is_owner.clone()]
            }
        };
        if field.mutable {
            let h = BVar::new("$h", heap_type());
            self.emit(Decl::constant(&name, BType::named("Field"), true));
            self.emit(Decl::axiom(BExpr::eq(
                BExpr::call("FDim", vec![BExpr::ident(&name)]),
                BExpr::int(0),
            )));
            let cell = heap_read(h.to_expr(), o.to_expr(), BExpr::ident(&name));
            let value = unbox_value(cell.clone(), &field.ty);
            let guard = BExpr::and_all(vec![
                is_good_heap(h.to_expr()),
                BExpr::neq(o.to_expr(), null()),
                is_owner.clone(),
            ]);
            let typing = self.type_is(value.clone(), &field.ty);
            if !typing.is_true() {
                self.emit(Decl::axiom_with_comment(
                    BExpr::forall(
                        quantified(vec![h.clone(), o.clone()]),
                        vec![trigger(cell.clone())],
                        BExpr::imp(guard.clone(), typing),
                    ),
                    &format!("field {}", name),
                ));
                self.emit(Decl::axiom(BExpr::forall(
                    quantified(vec![h.clone(), o.clone()]),
                    vec![trigger(cell)],
                    BExpr::imp(
                        BExpr::and(guard, is_allocated(h.to_expr(), o.to_expr())),
                        self.type_is_alloc(value, &field.ty, h.to_expr()),
                    ),
                )));
            }
        } else {
            self.emit(Decl::function(
                &name,
                vec![BVar::new("this", ref_type())],
                boogie_type(&field.ty),
            ));
            let app = BExpr::call(&name, vec![o.to_expr()]);
            let typing = self.type_is(app.clone(), &field.ty);
            if !typing.is_true() {
                self.emit(Decl::axiom_with_comment(
                    BExpr::forall(
                        quantified(vec![o.clone()]),
                        vec![trigger(app.clone())],
                        BExpr::imp(
                            BExpr::and(BExpr::neq(o.to_expr(), null()), is_owner.clone()),
                            typing,
                        ),
                    ),
                    &format!("constant field {}", name),
                ));
            }
            if self.use_lit() {
                let lit_o = BExpr::call("Lit", vec![o.to_expr()]);
                let lit_app = BExpr::call(&name, vec![lit_o]);
                self.emit(Decl::axiom(BExpr::forall(
                    vec![o.clone()],
                    vec![vec![lit_app.clone()]],
                    BExpr::eq(lit_app, BExpr::call("Lit", vec![app])),
                )));
            }
        }
    }

    // Datatypes
    // ---------

    pub(crate) fn translate_datatype(&self, qid: QualifiedId<DatatypeId>) {
        let env = self.env;
        let dt = env.datatype(qid);
        self.ensure_datatype_ty(qid);
        let tys = boogie_type_param_vars(&dt.type_params);
        let dt_ty = {
            let name = boogie_datatype_ty_name(env, qid);
            if tys.is_empty() {
                BExpr::ident(&name)
            } else {
                BExpr::call(&name, tys.iter().map(BVar::to_expr).collect())
            }
        };
        let dt_type = BType::named("DatatypeType");
        let d = BVar::new("d", dt_type.clone());
        let h = BVar::new("$h", heap_type());
        let mut tests = vec![];
        for (index, ctor_data) in dt.ctors.iter().enumerate() {
            let ctor = CtorRef {
                datatype: qid,
                index,
            };
            let ctor_name = boogie_ctor_name(env, ctor);
            let id_name = boogie_ctor_id_name(env, ctor);
            let test_name = boogie_ctor_test_name(env, ctor);
            let args = ctor_data
                .formals
                .iter()
                .enumerate()
                .map(|(i, f)| BVar::new(&format!("a#{}", i), boogie_type(&f.ty)))
                .collect_vec();
            let app = BExpr::call(&ctor_name, args.iter().map(BVar::to_expr).collect());

            self.emit(Decl::Comment(format!(
                "Constructor {}.{}",
                boogie_datatype_name(env, qid),
                ctor_data.name
            )));
            self.emit(Decl::constant(&id_name, BType::named("DtCtorId"), true));
            self.emit(Decl::function(&ctor_name, args.clone(), dt_type.clone()));
            self.emit(Decl::axiom(BExpr::forall(
                args.clone(),
                vec![vec![app.clone()]],
                BExpr::eq(
                    BExpr::call("DatatypeCtorId", vec![app.clone()]),
                    BExpr::ident(&id_name),
                ),
            )));
            self.emit(Decl::Function(Function {
                name: test_name.clone(),
                type_vars: vec![],
                params: vec![d.clone()],
                result: BType::Bool,
                body: Some(BExpr::eq(
                    BExpr::call("DatatypeCtorId", vec![d.to_expr()]),
                    BExpr::ident(&id_name),
                )),
                inline: false,
            }));
            let test = BExpr::call(&test_name, vec![d.to_expr()]);
            tests.push(test.clone());
            self.emit(Decl::axiom(BExpr::forall(
                vec![d.clone()],
                vec![vec![test.clone()]],
                BExpr::imp(
                    test,
                    BExpr::exists(
                        args.clone(),
                        vec![],
                        BExpr::eq(d.to_expr(), app.clone()),
                    ),
                ),
            )));

            for (i, (formal, arg)) in ctor_data.formals.iter().zip(&args).enumerate() {
                let dtor = boogie_dtor_name(env, ctor, i);
                self.emit(Decl::function(
                    &dtor,
                    vec![d.clone()],
                    boogie_type(&formal.ty),
                ));
                self.emit(Decl::axiom(BExpr::forall(
                    args.clone(),
                    vec![vec![app.clone()]],
                    BExpr::eq(BExpr::call(&dtor, vec![app.clone()]), arg.to_expr()),
                )));
                if !dt.is_codatatype {
                    let rank = match &formal.ty {
                        Type::Datatype(..) => Some(BExpr::call("DtRank", vec![arg.to_expr()])),
                        Type::TypeParameter(_) => {
                            Some(BExpr::call("BoxRank", vec![arg.to_expr()]))
                        }
                        _ => None,
                    };
                    if let Some(rank) = rank {
                        self.emit(Decl::axiom(BExpr::forall(
                            args.clone(),
                            vec![vec![app.clone()]],
                            BExpr::lt(rank, BExpr::call("DtRank", vec![app.clone()])),
                        )));
                    }
                }
            }

            if self.use_lit() && !args.is_empty() {
                let lit_app = BExpr::call(
                    &ctor_name,
                    args.iter()
                        .map(|a| BExpr::call("Lit", vec![a.to_expr()]))
                        .collect(),
                );
                self.emit(Decl::axiom(BExpr::forall(
                    args.clone(),
                    vec![vec![lit_app.clone()]],
                    BExpr::eq(lit_app, BExpr::call("Lit", vec![app.clone()])),
                )));
            }

            let is_app = BExpr::call("$Is", vec![app.clone(), dt_ty.clone()]);
            let formal_typing = BExpr::and_all(
                ctor_data
                    .formals
                    .iter()
                    .zip(&args)
                    .map(|(f, a)| self.type_is(a.to_expr(), &f.ty)),
            );
            self.emit(Decl::axiom(BExpr::forall(
                tys.iter().cloned().chain(args.iter().cloned()).collect(),
                vec![vec![is_app.clone()]],
                BExpr::iff(is_app, formal_typing),
            )));
            let is_alloc_app =
                BExpr::call("$IsAlloc", vec![app.clone(), dt_ty.clone(), h.to_expr()]);
            let formal_alloc = BExpr::and_all(
                ctor_data
                    .formals
                    .iter()
                    .zip(&args)
                    .map(|(f, a)| self.type_is_alloc(a.to_expr(), &f.ty, h.to_expr())),
            );
            self.emit(Decl::axiom(BExpr::forall(
                tys.iter()
                    .cloned()
                    .chain(args.iter().cloned())
                    .chain(std::iter::once(h.clone()))
                    .collect(),
                vec![vec![is_alloc_app.clone()]],
                BExpr::imp(
                    is_good_heap(h.to_expr()),
                    BExpr::iff(is_alloc_app, formal_alloc),
                ),
            )));
        }

        // Every well-typed value is built by one of the constructors.
        let is_d = BExpr::call("$Is", vec![d.to_expr(), dt_ty]);
        self.emit(Decl::axiom_with_comment(
            BExpr::forall(
                tys.into_iter().chain(std::iter::once(d)).collect(),
                vec![vec![is_d.clone()]],
                BExpr::imp(is_d, BExpr::or_all(tests)),
            ),
            &format!("datatype {} is exhaustive", dt.name),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veri_model::model::{
        ClassData, CtorData, DatatypeData, FieldData, Formal, ModuleData,
    };

    fn env_with_list() -> GlobalEnv {
        let mut env = GlobalEnv::new();
        let m = env.add_module(ModuleData::new("M", 0));
        let list = m.qualified(DatatypeId(0));
        env.module_mut(m).datatypes.push(DatatypeData {
            name: "List".to_string(),
            loc: Loc::default(),
            type_params: vec!["T".to_string()],
            ctors: vec![
                CtorData {
                    name: "Nil".to_string(),
                    loc: Loc::default(),
                    formals: vec![],
                },
                CtorData {
                    name: "Cons".to_string(),
                    loc: Loc::default(),
                    formals: vec![
                        Formal::new("head", Type::type_param("T")),
                        Formal::new(
                            "tail",
                            Type::Datatype(list, vec![Type::type_param("T")]),
                        ),
                    ],
                },
            ],
            is_codatatype: false,
        });
        env.module_mut(m).classes.push(ClassData {
            name: "C".to_string(),
            loc: Loc::default(),
            type_params: vec![],
            is_trait: false,
            parents: vec![],
            fuel: vec![],
        });
        env.module_mut(m).fields.push(FieldData {
            name: "x".to_string(),
            loc: Loc::default(),
            owner: ClassId(0),
            ty: Type::seq(Type::Int),
            mutable: true,
            ghost: false,
        });
        env
    }

    #[test]
    fn datatype_scaffolding() {
        let env = env_with_list();
        let options = BoogieOptions::default();
        let vocab = Vocabulary::builtin().unwrap();
        let program = BoogieTranslator::new(&env, &options, &vocab).translate();
        assert!(program.is_declared("#M.List.Cons"));
        assert!(program.is_declared("##M.List.Nil"));
        assert!(program.is_declared("M.List.Cons_q"));
        assert!(program.is_declared("M.List.Cons.tail"));
        assert!(program.is_declared("Tclass.M.List"));
        let text = program.to_string();
        assert!(text.contains("BoxRank(a#0) < DtRank(#M.List.Cons(a#0, a#1))"));
        assert!(text.contains("DtRank(a#1) < DtRank(#M.List.Cons(a#0, a#1))"));
        assert_eq!(
            program
                .axioms_commented("datatype List is exhaustive")
                .len(),
            1
        );
    }

    #[test]
    fn mutable_fields_have_typing_axioms() {
        let env = env_with_list();
        let options = BoogieOptions::default();
        let vocab = Vocabulary::builtin().unwrap();
        let program = BoogieTranslator::new(&env, &options, &vocab).translate();
        assert!(program.is_declared("M.C.x"));
        let text = program.to_string();
        assert!(text.contains("axiom (FDim(M.C.x) == 0);"));
        assert_eq!(program.axioms_commented("field M.C.x").len(), 1);
    }

    #[test]
    #[should_panic(expected = "BUG")]
    fn nested_context_entry_is_a_bug() {
        let env = env_with_list();
        let options = BoogieOptions::default();
        let vocab = Vocabulary::builtin().unwrap();
        let tr = BoogieTranslator::new(&env, &options, &vocab);
        let m = ModuleId(0);
        tr.with_context(tr.new_context(m, None), |_| {
            tr.with_context(tr.new_context(m, None), |_| ())
        });
    }

    #[test]
    #[should_panic(expected = "open fuel scopes")]
    fn unbalanced_fuel_scopes_are_a_bug() {
        let env = env_with_list();
        let options = BoogieOptions::default();
        let vocab = Vocabulary::builtin().unwrap();
        let tr = BoogieTranslator::new(&env, &options, &vocab);
        tr.with_context(tr.new_context(ModuleId(0), None), |ctx| {
            ctx.push_decl_fuel_scope(&env, &[])
        });
    }

    #[test]
    fn nested_contexts_restore_the_outer_one() {
        let env = env_with_list();
        let options = BoogieOptions::default();
        let vocab = Vocabulary::builtin().unwrap();
        let tr = BoogieTranslator::new(&env, &options, &vocab);
        let m = ModuleId(0);
        tr.with_context(tr.new_context(m, None), |_| {
            tr.with_nested_context(tr.new_context(m, None), |_| ());
            assert!(tr.current.borrow().is_some());
        });
        assert!(tr.current.borrow().is_none());
    }
}
