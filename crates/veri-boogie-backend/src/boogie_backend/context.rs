// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Per-declaration translation context.
//!
//! A `DeclContext` is created when translation of a top-level declaration starts and
//! dropped when it ends. It owns the fresh name counters, the fuel scopes and the locals
//! collected for the implementation being generated.

use crate::boogie_backend::fuel::FuelScope;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use veri_boogie_ir::{BType, TypedIdent};
use veri_model::model::{CallableId, FunId, GlobalEnv, ModuleId, QualifiedId};

/// Generates names unique within one declaration, `prefix#n` with a counter per prefix.
#[derive(Debug, Default)]
pub struct FreshIdGenerator {
    counters: RefCell<BTreeMap<String, usize>>,
}

impl FreshIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_index(&self, prefix: &str) -> usize {
        let mut counters = self.counters.borrow_mut();
        let counter = counters.entry(prefix.to_string()).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }

    pub fn fresh(&self, prefix: &str) -> String {
        format!("{}#{}", prefix, self.fresh_index(prefix))
    }
}

#[derive(Debug)]
pub struct DeclContext {
    pub module_id: ModuleId,
    pub callable: Option<CallableId>,
    pub fresh: FreshIdGenerator,
    /// Unfolding bounds used when no annotation applies.
    pub(crate) default_fuel: (u32, u32),
    /// Stack of fuel scopes, innermost last.
    pub(crate) fuel_scopes: RefCell<Vec<FuelScope>>,
    /// Fuel-aware functions whose start fuel was referenced.
    pub(crate) fuel_used: RefCell<BTreeSet<QualifiedId<FunId>>>,
    locals: RefCell<Vec<TypedIdent>>,
    local_names: RefCell<BTreeSet<String>>,
}

impl DeclContext {
    pub fn new(
        env: &GlobalEnv,
        module_id: ModuleId,
        callable: Option<CallableId>,
        default_fuel: (u32, u32),
    ) -> Self {
        if let Some(c) = callable {
            if c.module_id() != module_id {
                panic!(
                    "BUG: callable of module {} translated in context of module {}",
                    c.module_id(),
                    module_id
                )
            }
        }
        // Touch the module so that an unknown id fails early.
        let _ = env.module(module_id);
        Self {
            module_id,
            callable,
            fresh: FreshIdGenerator::new(),
            default_fuel,
            fuel_scopes: RefCell::new(vec![]),
            fuel_used: RefCell::new(BTreeSet::new()),
            locals: RefCell::new(vec![]),
            local_names: RefCell::new(BTreeSet::new()),
        }
    }

    /// Declares a local of the implementation being generated. Declaring a name twice is a
    /// no-op.
    pub fn add_local(&self, local: TypedIdent) {
        if self.local_names.borrow_mut().insert(local.name.clone()) {
            self.locals.borrow_mut().push(local)
        }
    }

    pub fn add_local_var(&self, name: &str, ty: BType) {
        self.add_local(TypedIdent::new(name, ty))
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.local_names.borrow().contains(name)
    }

    /// Removes and returns the collected locals.
    pub fn take_locals(&self) -> Vec<TypedIdent> {
        self.local_names.borrow_mut().clear();
        std::mem::take(&mut *self.locals.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veri_model::model::ModuleData;

    #[test]
    fn fresh_names_count_per_prefix() {
        let fresh = FreshIdGenerator::new();
        assert_eq!(fresh.fresh("$rhs"), "$rhs#0");
        assert_eq!(fresh.fresh("$rhs"), "$rhs#1");
        assert_eq!(fresh.fresh("$nw"), "$nw#0");
        assert_eq!(fresh.fresh_index("loop"), 0);
    }

    #[test]
    fn locals_are_declared_once() {
        let mut env = GlobalEnv::new();
        let m = env.add_module(ModuleData::new("M", 0));
        let ctx = DeclContext::new(&env, m, None, (1, 2));
        ctx.add_local_var("x#0", BType::Int);
        ctx.add_local_var("x#0", BType::Int);
        assert!(ctx.has_local("x#0"));
        assert_eq!(ctx.take_locals().len(), 1);
        assert!(!ctx.has_local("x#0"));
    }
}
