// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Boogie types

/// A Boogie type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BType {
    Bool,
    Int,
    Real,
    /// Bit vector of the given width.
    Bv(u32),
    /// Application of a declared type constructor, e.g. `Set Box` or `ref`.
    Named(String, Vec<BType>),
    /// Polymorphic map type `<a>[T1, ..]R`.
    Map {
        type_vars: Vec<String>,
        domain: Vec<BType>,
        range: Box<BType>,
    },
    /// A type variable bound by an enclosing function, axiom or procedure.
    TypeVar(String),
}

impl BType {
    pub fn named(name: &str) -> BType {
        BType::Named(name.to_string(), vec![])
    }

    pub fn app(name: &str, args: Vec<BType>) -> BType {
        BType::Named(name.to_string(), args)
    }

    pub fn map(domain: Vec<BType>, range: BType) -> BType {
        BType::Map {
            type_vars: vec![],
            domain,
            range: Box::new(range),
        }
    }

    pub fn type_var(name: &str) -> BType {
        BType::TypeVar(name.to_string())
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, BType::Bool)
    }

    /// Whether this is an application of the named constructor.
    pub fn is_named(&self, name: &str) -> bool {
        matches!(self, BType::Named(n, _) if n == name)
    }
}
