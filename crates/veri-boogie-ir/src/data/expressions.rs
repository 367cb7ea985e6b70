// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Boogie expressions.
//!
//! Expressions are plain trees. The builder functions perform the light simplifications the
//! translators rely on (dropping `true` conjuncts, `true ==> e`, empty quantifiers), so that
//! generated verification conditions stay readable.

use crate::data::types::BType;
use num::BigInt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BUnOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BBinOp {
    Iff,
    Imp,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    /// Integer division, `div`.
    Div,
    /// Integer modulus, `mod`.
    Mod,
    /// Real division, `/`.
    RealDiv,
}

impl BBinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BBinOp::Iff => "<==>",
            BBinOp::Imp => "==>",
            BBinOp::And => "&&",
            BBinOp::Or => "||",
            BBinOp::Eq => "==",
            BBinOp::Neq => "!=",
            BBinOp::Lt => "<",
            BBinOp::Le => "<=",
            BBinOp::Gt => ">",
            BBinOp::Ge => ">=",
            BBinOp::Add => "+",
            BBinOp::Sub => "-",
            BBinOp::Mul => "*",
            BBinOp::Div => "div",
            BBinOp::Mod => "mod",
            BBinOp::RealDiv => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BQuant {
    Forall,
    Exists,
}

/// A bound variable or formal: name and type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BVar {
    pub name: String,
    pub ty: BType,
}

impl BVar {
    pub fn new(name: &str, ty: BType) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }

    pub fn to_expr(&self) -> BExpr {
        BExpr::ident(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BExpr {
    Bool(bool),
    Int(BigInt),
    /// Decimal real literal in Boogie syntax (always contains a `.`).
    Real(String),
    Bv {
        value: BigInt,
        width: u32,
    },
    /// Variable or constant.
    Ident(String),
    FunCall {
        name: String,
        args: Vec<BExpr>,
    },
    Unary(BUnOp, Box<BExpr>),
    Binary(BBinOp, Box<BExpr>, Box<BExpr>),
    Ite(Box<BExpr>, Box<BExpr>, Box<BExpr>),
    /// Map select `m[i, ..]`.
    Select(Box<BExpr>, Vec<BExpr>),
    /// Map store `m[i, .. := v]`.
    Store(Box<BExpr>, Vec<BExpr>, Box<BExpr>),
    Quant {
        kind: BQuant,
        type_vars: Vec<String>,
        vars: Vec<BVar>,
        triggers: Vec<Vec<BExpr>>,
        body: Box<BExpr>,
    },
    Lambda {
        vars: Vec<BVar>,
        body: Box<BExpr>,
    },
    Old(Box<BExpr>),
    /// Type coercion `e: T`, used to fix the result type of polymorphic functions.
    Coerce(Box<BExpr>, BType),
}

impl BExpr {
    pub fn tru() -> BExpr {
        BExpr::Bool(true)
    }

    pub fn fals() -> BExpr {
        BExpr::Bool(false)
    }

    pub fn int(n: i64) -> BExpr {
        BExpr::Int(BigInt::from(n))
    }

    pub fn ident(name: &str) -> BExpr {
        BExpr::Ident(name.to_string())
    }

    pub fn call(name: &str, args: Vec<BExpr>) -> BExpr {
        BExpr::FunCall {
            name: name.to_string(),
            args,
        }
    }

    pub fn binary(op: BBinOp, lhs: BExpr, rhs: BExpr) -> BExpr {
        BExpr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn not(e: BExpr) -> BExpr {
        match e {
            BExpr::Bool(b) => BExpr::Bool(!b),
            BExpr::Unary(BUnOp::Not, inner) => *inner,
            e => BExpr::Unary(BUnOp::Not, Box::new(e)),
        }
    }

    pub fn neg(e: BExpr) -> BExpr {
        BExpr::Unary(BUnOp::Neg, Box::new(e))
    }

    pub fn and(lhs: BExpr, rhs: BExpr) -> BExpr {
        match (lhs, rhs) {
            (BExpr::Bool(true), e) | (e, BExpr::Bool(true)) => e,
            (BExpr::Bool(false), _) => BExpr::fals(),
            (l, r) => BExpr::binary(BBinOp::And, l, r),
        }
    }

    pub fn or(lhs: BExpr, rhs: BExpr) -> BExpr {
        match (lhs, rhs) {
            (BExpr::Bool(false), e) | (e, BExpr::Bool(false)) => e,
            (BExpr::Bool(true), _) => BExpr::tru(),
            (l, r) => BExpr::binary(BBinOp::Or, l, r),
        }
    }

    pub fn imp(lhs: BExpr, rhs: BExpr) -> BExpr {
        match (lhs, rhs) {
            (BExpr::Bool(true), e) => e,
            (BExpr::Bool(false), _) | (_, BExpr::Bool(true)) => BExpr::tru(),
            (l, r) => BExpr::binary(BBinOp::Imp, l, r),
        }
    }

    pub fn iff(lhs: BExpr, rhs: BExpr) -> BExpr {
        BExpr::binary(BBinOp::Iff, lhs, rhs)
    }

    pub fn eq(lhs: BExpr, rhs: BExpr) -> BExpr {
        BExpr::binary(BBinOp::Eq, lhs, rhs)
    }

    pub fn neq(lhs: BExpr, rhs: BExpr) -> BExpr {
        BExpr::binary(BBinOp::Neq, lhs, rhs)
    }

    pub fn lt(lhs: BExpr, rhs: BExpr) -> BExpr {
        BExpr::binary(BBinOp::Lt, lhs, rhs)
    }

    pub fn le(lhs: BExpr, rhs: BExpr) -> BExpr {
        BExpr::binary(BBinOp::Le, lhs, rhs)
    }

    pub fn add(lhs: BExpr, rhs: BExpr) -> BExpr {
        BExpr::binary(BBinOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: BExpr, rhs: BExpr) -> BExpr {
        BExpr::binary(BBinOp::Sub, lhs, rhs)
    }

    pub fn ite(cond: BExpr, then: BExpr, els: BExpr) -> BExpr {
        match cond {
            BExpr::Bool(true) => then,
            BExpr::Bool(false) => els,
            cond => BExpr::Ite(Box::new(cond), Box::new(then), Box::new(els)),
        }
    }

    pub fn select(map: BExpr, indices: Vec<BExpr>) -> BExpr {
        BExpr::Select(Box::new(map), indices)
    }

    pub fn store(map: BExpr, indices: Vec<BExpr>, value: BExpr) -> BExpr {
        BExpr::Store(Box::new(map), indices, Box::new(value))
    }

    pub fn old(e: BExpr) -> BExpr {
        BExpr::Old(Box::new(e))
    }

    pub fn coerce(e: BExpr, ty: BType) -> BExpr {
        BExpr::Coerce(Box::new(e), ty)
    }

    pub fn and_all(exprs: impl IntoIterator<Item = BExpr>) -> BExpr {
        exprs.into_iter().fold(BExpr::tru(), BExpr::and)
    }

    pub fn or_all(exprs: impl IntoIterator<Item = BExpr>) -> BExpr {
        exprs.into_iter().fold(BExpr::fals(), BExpr::or)
    }

    /// Universal quantification; returns the body when there is nothing to bind.
    pub fn forall(vars: Vec<BVar>, triggers: Vec<Vec<BExpr>>, body: BExpr) -> BExpr {
        Self::quant(BQuant::Forall, vec![], vars, triggers, body)
    }

    pub fn exists(vars: Vec<BVar>, triggers: Vec<Vec<BExpr>>, body: BExpr) -> BExpr {
        Self::quant(BQuant::Exists, vec![], vars, triggers, body)
    }

    pub fn quant(
        kind: BQuant,
        type_vars: Vec<String>,
        vars: Vec<BVar>,
        triggers: Vec<Vec<BExpr>>,
        body: BExpr,
    ) -> BExpr {
        if vars.is_empty() && type_vars.is_empty() {
            return body;
        }
        if matches!(body, BExpr::Bool(_)) {
            return body;
        }
        BExpr::Quant {
            kind,
            type_vars,
            vars,
            triggers,
            body: Box::new(body),
        }
    }

    pub fn lambda(vars: Vec<BVar>, body: BExpr) -> BExpr {
        BExpr::Lambda {
            vars,
            body: Box::new(body),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, BExpr::Bool(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, BExpr::Bool(false))
    }

    /// Whether this is a call of the named function.
    pub fn is_call_of(&self, fun: &str) -> bool {
        matches!(self, BExpr::FunCall { name, .. } if name == fun)
    }

    /// Splits nested conjunctions into their operands.
    pub fn conjuncts(&self) -> Vec<&BExpr> {
        match self {
            BExpr::Binary(BBinOp::And, l, r) => {
                let mut result = l.conjuncts();
                result.extend(r.conjuncts());
                result
            }
            e => vec![e],
        }
    }

    /// Visits this expression and all sub-expressions in pre-order.
    pub fn visit(&self, f: &mut dyn FnMut(&BExpr)) {
        f(self);
        match self {
            BExpr::Bool(_)
            | BExpr::Int(_)
            | BExpr::Real(_)
            | BExpr::Bv { .. }
            | BExpr::Ident(_) => {}
            BExpr::FunCall { args, .. } => args.iter().for_each(|a| a.visit(f)),
            BExpr::Unary(_, e) | BExpr::Old(e) | BExpr::Coerce(e, _) => e.visit(f),
            BExpr::Binary(_, l, r) => {
                l.visit(f);
                r.visit(f);
            }
            BExpr::Ite(c, t, e) => {
                c.visit(f);
                t.visit(f);
                e.visit(f);
            }
            BExpr::Select(m, idx) => {
                m.visit(f);
                idx.iter().for_each(|i| i.visit(f));
            }
            BExpr::Store(m, idx, v) => {
                m.visit(f);
                idx.iter().for_each(|i| i.visit(f));
                v.visit(f);
            }
            BExpr::Quant { triggers, body, .. } => {
                triggers.iter().flatten().for_each(|t| t.visit(f));
                body.visit(f);
            }
            BExpr::Lambda { body, .. } => body.visit(f),
        }
    }

    /// Whether the expression contains a sub-expression satisfying `p`.
    pub fn contains(&self, p: &dyn Fn(&BExpr) -> bool) -> bool {
        let mut found = false;
        self.visit(&mut |e| found = found || p(e));
        found
    }

    /// Whether the identifier occurs in the expression. Bound occurrences count as well.
    pub fn mentions(&self, ident: &str) -> bool {
        self.contains(&|e| matches!(e, BExpr::Ident(n) if n == ident))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_simplify_trivial_operands() {
        let p = BExpr::ident("p");
        assert_eq!(BExpr::and(BExpr::tru(), p.clone()), p);
        assert_eq!(BExpr::imp(BExpr::tru(), p.clone()), p);
        assert!(BExpr::imp(p.clone(), BExpr::tru()).is_true());
        assert_eq!(BExpr::not(BExpr::not(p.clone())), p);
        assert_eq!(BExpr::forall(vec![], vec![], p.clone()), p);
    }

    #[test]
    fn conjuncts_flatten() {
        let e = BExpr::and_all(vec![BExpr::ident("a"), BExpr::ident("b"), BExpr::ident("c")]);
        assert_eq!(e.conjuncts().len(), 3);
        assert!(e.mentions("b"));
        assert!(!e.mentions("d"));
    }
}
