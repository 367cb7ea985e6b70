// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Fuel bookkeeping for fuel-aware (recursive) functions.
//!
//! Every fuel-aware function `f` has three layer constants: `BaseFuel_f`, an arbitrary layer,
//! and `StartFuel_f`/`StartFuelAssert_f`, the layers used for calls in assumed and checked
//! positions. A scope stack records the `(low, high)` bounds of the functions annotated in
//! each lexical scope. Declaration level scopes (module, class, callable annotations) bind
//! the global start constants; scopes opened by an annotated assertion bind fresh locals.

use crate::boogie_backend::{
    boogie_helpers::{
        boogie_base_fuel_name, boogie_function_name, boogie_start_fuel_assert_name,
        boogie_start_fuel_name, layer_succ, layer_type,
    },
    context::DeclContext,
};
use std::collections::BTreeMap;
use veri_boogie_ir::{BExpr, Cmd};
use veri_model::model::{FuelAnnotation, FunId, GlobalEnv, QualifiedId};

pub const FUEL_INCREASE_ERROR: &str = "Fuel can only increase within a given scope.";

/// The position a call is translated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuelMode {
    /// Inside axioms: one unfolding.
    Axiom,
    /// Assumed facts: `low` unfoldings.
    Assume,
    /// Checked facts: `high` unfoldings.
    Assert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuelSetting {
    pub low: u32,
    pub high: u32,
    /// Whether the bounds come from an annotation rather than the defaults.
    pub explicit: bool,
    pub start: BExpr,
    pub start_assert: BExpr,
}

impl FuelSetting {
    /// The layer argument for calls in the given mode.
    pub fn layer(&self, mode: FuelMode) -> BExpr {
        match mode {
            FuelMode::Axiom => layer_succ(BExpr::ident("$LZ"), 1),
            FuelMode::Assume => self.start.clone(),
            FuelMode::Assert => self.start_assert.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FuelScope {
    settings: BTreeMap<QualifiedId<FunId>, FuelSetting>,
}

impl DeclContext {
    fn enclosing_explicit(&self, fun: QualifiedId<FunId>) -> Option<FuelSetting> {
        self.fuel_scopes
            .borrow()
            .iter()
            .rev()
            .filter_map(|s| s.settings.get(&fun))
            .find(|s| s.explicit)
            .cloned()
    }

    /// Bounds of an annotation after checking them against the enclosing scopes. A decrease
    /// is reported and the enclosing bounds are kept.
    fn checked_bounds(&self, env: &GlobalEnv, annot: &FuelAnnotation) -> (u32, u32) {
        let (low, high) = (annot.low, annot.high());
        match self.enclosing_explicit(annot.fun) {
            Some(outer) if low < outer.low || high < outer.high => {
                env.error(&annot.loc, FUEL_INCREASE_ERROR);
                (outer.low, outer.high)
            }
            _ => (low, high),
        }
    }

    /// Opens a scope for annotations attached to a declaration. Calls in the scope use the
    /// global start constants of the annotated functions.
    pub fn push_decl_fuel_scope(&self, env: &GlobalEnv, annotations: &[FuelAnnotation]) {
        let mut scope = FuelScope::default();
        for annot in annotations {
            let (low, high) = self.checked_bounds(env, annot);
            scope.settings.insert(
                annot.fun,
                FuelSetting {
                    low,
                    high,
                    explicit: true,
                    start: BExpr::ident(&boogie_start_fuel_name(env, annot.fun)),
                    start_assert: BExpr::ident(&boogie_start_fuel_assert_name(env, annot.fun)),
                },
            );
        }
        self.fuel_scopes.borrow_mut().push(scope)
    }

    /// Opens a scope for annotations attached to a statement. Returns the commands binding
    /// the fresh start layers of the scope.
    pub fn push_nested_fuel_scope(
        &self,
        env: &GlobalEnv,
        annotations: &[FuelAnnotation],
    ) -> Vec<Cmd> {
        let mut scope = FuelScope::default();
        let mut cmds = vec![];
        for annot in annotations {
            let (low, high) = self.checked_bounds(env, annot);
            let start = self.fresh.fresh(&boogie_start_fuel_name(env, annot.fun));
            let start_assert = self
                .fresh
                .fresh(&boogie_start_fuel_assert_name(env, annot.fun));
            self.add_local_var(&start, layer_type());
            self.add_local_var(&start_assert, layer_type());
            let base = BExpr::ident(&boogie_base_fuel_name(env, annot.fun));
            cmds.push(Cmd::Assume(BExpr::eq(
                BExpr::ident(&start),
                layer_succ(base.clone(), low),
            )));
            cmds.push(Cmd::Assume(BExpr::eq(
                BExpr::ident(&start_assert),
                layer_succ(base, high),
            )));
            scope.settings.insert(
                annot.fun,
                FuelSetting {
                    low,
                    high,
                    explicit: true,
                    start: BExpr::ident(&start),
                    start_assert: BExpr::ident(&start_assert),
                },
            );
        }
        self.fuel_scopes.borrow_mut().push(scope);
        cmds
    }

    pub fn pop_fuel_scope(&self) {
        if self.fuel_scopes.borrow_mut().pop().is_none() {
            panic!("BUG: fuel scope stack underflow")
        }
    }

    pub fn fuel_depth(&self) -> usize {
        self.fuel_scopes.borrow().len()
    }

    /// The effective setting of a function in the current scope. Records the function as
    /// used so that the prologue binds its start constants.
    pub fn fuel_setting(&self, env: &GlobalEnv, fun: QualifiedId<FunId>) -> FuelSetting {
        self.fuel_used.borrow_mut().insert(fun);
        let found = self
            .fuel_scopes
            .borrow()
            .iter()
            .rev()
            .find_map(|s| s.settings.get(&fun).cloned());
        found.unwrap_or_else(|| FuelSetting {
            low: self.default_fuel.0,
            high: self.default_fuel.1,
            explicit: false,
            start: BExpr::ident(&boogie_start_fuel_name(env, fun)),
            start_assert: BExpr::ident(&boogie_start_fuel_assert_name(env, fun)),
        })
    }

    /// Assumptions fixing the global start constants of every used function, relative to
    /// the current (declaration level) scopes.
    pub fn fuel_prologue(&self, env: &GlobalEnv) -> Vec<Cmd> {
        let used = self.fuel_used.borrow().clone();
        let mut cmds = vec![];
        for fun in used {
            let (low, high) = self
                .fuel_scopes
                .borrow()
                .iter()
                .rev()
                .find_map(|s| s.settings.get(&fun).map(|s| (s.low, s.high)))
                .unwrap_or(self.default_fuel);
            let base = BExpr::ident(&boogie_base_fuel_name(env, fun));
            cmds.push(Cmd::comment(&format!(
                "fuel of {}: {}/{}",
                boogie_function_name(env, fun),
                low,
                high
            )));
            cmds.push(Cmd::Assume(BExpr::eq(
                BExpr::call("AsFuelBottom", vec![base.clone()]),
                base.clone(),
            )));
            cmds.push(Cmd::Assume(BExpr::eq(
                BExpr::ident(&boogie_start_fuel_name(env, fun)),
                layer_succ(base.clone(), low),
            )));
            cmds.push(Cmd::Assume(BExpr::eq(
                BExpr::ident(&boogie_start_fuel_assert_name(env, fun)),
                layer_succ(base, high),
            )));
        }
        cmds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veri_model::{
        model::{FunctionData, Loc, ModuleData},
        ty::Type,
    };

    fn setup() -> (GlobalEnv, QualifiedId<FunId>) {
        let mut env = GlobalEnv::new();
        let m = env.add_module(ModuleData::new("M", 0));
        env.module_mut(m)
            .functions
            .push(FunctionData::new("f", vec![], Type::Int));
        (env, m.qualified(FunId(0)))
    }

    fn annot(fun: QualifiedId<FunId>, low: u32, high: u32) -> FuelAnnotation {
        FuelAnnotation {
            fun,
            low,
            high: Some(high),
            loc: Loc::default(),
        }
    }

    #[test]
    fn layers_per_mode() {
        let setting = FuelSetting {
            low: 1,
            high: 2,
            explicit: false,
            start: BExpr::ident("StartFuel_M.f"),
            start_assert: BExpr::ident("StartFuelAssert_M.f"),
        };
        assert_eq!(setting.layer(FuelMode::Axiom).to_string(), "$LS($LZ)");
        assert_eq!(setting.layer(FuelMode::Assume).to_string(), "StartFuel_M.f");
        assert_eq!(
            setting.layer(FuelMode::Assert).to_string(),
            "StartFuelAssert_M.f"
        );
    }

    #[test]
    fn decreasing_fuel_is_reported() {
        let (env, f) = setup();
        let ctx = DeclContext::new(&env, f.module_id, None, (1, 2));
        ctx.push_decl_fuel_scope(&env, &[annot(f, 3, 4)]);
        // The nested annotation asks for less and is rejected; the outer bounds stay.
        let _ = ctx.push_nested_fuel_scope(&env, &[annot(f, 1, 2)]);
        assert!(env.has_errors());
        let setting = ctx.fuel_setting(&env, f);
        assert_eq!((setting.low, setting.high), (3, 4));
        ctx.pop_fuel_scope();
        ctx.pop_fuel_scope();
        assert_eq!(ctx.fuel_depth(), 0);
    }
}
