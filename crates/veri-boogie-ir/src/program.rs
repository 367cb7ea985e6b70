// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! The output program: an append-only, ordered collection of top-level declarations.

use crate::data::declarations::{Decl, Function, Implementation, Procedure};
use crate::data::expressions::BExpr;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct Program {
    decls: Vec<Decl>,
    names: BTreeSet<String>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a declaration. A name can only be declared once.
    pub fn add(&mut self, decl: Decl) {
        if let Some(name) = decl.name() {
            if !self.names.insert(name.clone()) {
                panic!("BUG: declaration `{}` added twice to the output program", name)
            }
        }
        self.decls.push(decl);
    }

    /// Appends all declarations in order.
    pub fn add_all(&mut self, decls: impl IntoIterator<Item = Decl>) {
        for decl in decls {
            self.add(decl)
        }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn decls(&self) -> &[Decl] {
        &self.decls
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions().find(|f| f.name == name)
    }

    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.decls.iter().find_map(|d| match d {
            Decl::Procedure(p) if p.name == name => Some(p),
            _ => None,
        })
    }

    pub fn implementation(&self, proc_name: &str) -> Option<&Implementation> {
        self.decls.iter().find_map(|d| match d {
            Decl::Implementation(i) if i.proc_name == proc_name => Some(i),
            _ => None,
        })
    }

    pub fn axioms(&self) -> impl Iterator<Item = &BExpr> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Axiom { expr, .. } => Some(expr),
            _ => None,
        })
    }

    /// Axioms whose leading comment contains `text`.
    pub fn axioms_commented(&self, text: &str) -> Vec<&BExpr> {
        self.decls
            .iter()
            .filter_map(|d| match d {
                Decl::Axiom {
                    expr,
                    comment: Some(c),
                } if c.contains(text) => Some(expr),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::BType;

    #[test]
    fn names_are_write_once() {
        let mut program = Program::new();
        program.add(Decl::constant("c", BType::Int, true));
        program.add(Decl::axiom(BExpr::tru()));
        program.add(Decl::axiom(BExpr::tru()));
        assert!(program.is_declared("c"));
        assert_eq!(program.len(), 3);
        let result = std::panic::catch_unwind(move || {
            let mut program = program;
            program.add(Decl::constant("c", BType::Int, false));
        });
        assert!(result.is_err());
    }
}
