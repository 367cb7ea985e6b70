// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Boogie top-level declarations.

use crate::data::commands::{Cmd, Token};
use crate::data::expressions::{BExpr, BVar};
use crate::data::types::BType;

/// A procedure parameter or local, optionally with a `where` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedIdent {
    pub name: String,
    pub ty: BType,
    pub where_clause: Option<BExpr>,
}

impl TypedIdent {
    pub fn new(name: &str, ty: BType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            where_clause: None,
        }
    }

    pub fn with_where(mut self, clause: BExpr) -> Self {
        self.where_clause = if clause.is_true() { None } else { Some(clause) };
        self
    }
}

/// A pre- or postcondition of a procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    pub expr: BExpr,
    pub free: bool,
    pub token: Token,
    pub msg: String,
}

impl Contract {
    pub fn free(expr: BExpr) -> Self {
        Self {
            expr,
            free: true,
            token: Token::default(),
            msg: String::new(),
        }
    }

    pub fn checked(expr: BExpr, token: Token, msg: &str) -> Self {
        Self {
            expr,
            free: false,
            token,
            msg: msg.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub type_vars: Vec<String>,
    pub params: Vec<BVar>,
    pub result: BType,
    pub body: Option<BExpr>,
    /// Emits `{:inline}`.
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    pub name: String,
    pub type_vars: Vec<String>,
    pub ins: Vec<TypedIdent>,
    pub outs: Vec<TypedIdent>,
    pub requires: Vec<Contract>,
    pub modifies: Vec<String>,
    pub ensures: Vec<Contract>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implementation {
    pub proc_name: String,
    pub type_vars: Vec<String>,
    pub ins: Vec<BVar>,
    pub outs: Vec<BVar>,
    pub locals: Vec<TypedIdent>,
    pub body: Vec<Cmd>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    /// `type C _ _;`
    TypeCtor { name: String, arity: usize },
    Const {
        name: String,
        ty: BType,
        unique: bool,
    },
    Function(Function),
    Axiom {
        expr: BExpr,
        comment: Option<String>,
    },
    GlobalVar(TypedIdent),
    Procedure(Procedure),
    Implementation(Implementation),
    Comment(String),
}

impl Decl {
    /// The name this declaration introduces, if any. Implementations share the name of their
    /// procedure and are registered under `impl$<name>`.
    pub fn name(&self) -> Option<String> {
        match self {
            Decl::TypeCtor { name, .. } | Decl::Const { name, .. } => Some(name.clone()),
            Decl::Function(f) => Some(f.name.clone()),
            Decl::GlobalVar(v) => Some(v.name.clone()),
            Decl::Procedure(p) => Some(p.name.clone()),
            Decl::Implementation(i) => Some(format!("impl${}", i.proc_name)),
            Decl::Axiom { .. } | Decl::Comment(_) => None,
        }
    }

    pub fn axiom(expr: BExpr) -> Decl {
        Decl::Axiom {
            expr,
            comment: None,
        }
    }

    pub fn axiom_with_comment(expr: BExpr, comment: &str) -> Decl {
        Decl::Axiom {
            expr,
            comment: Some(comment.to_string()),
        }
    }

    pub fn constant(name: &str, ty: BType, unique: bool) -> Decl {
        Decl::Const {
            name: name.to_string(),
            ty,
            unique,
        }
    }

    pub fn function(name: &str, params: Vec<BVar>, result: BType) -> Decl {
        Decl::Function(Function {
            name: name.to_string(),
            type_vars: vec![],
            params,
            result,
            body: None,
            inline: false,
        })
    }
}
