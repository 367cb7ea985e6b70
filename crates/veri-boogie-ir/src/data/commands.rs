// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Boogie commands (structured statements).

use crate::data::expressions::BExpr;

/// Source position an assertion is attributed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token {
    pub file: String,
    pub line: usize,
    pub col: usize,
    /// Position of the call site or inlining site that led to this assertion, if any.
    pub related: Option<Box<Token>>,
}

impl Token {
    pub fn new(file: &str, line: usize, col: usize) -> Self {
        Self {
            file: file.to_string(),
            line,
            col,
            related: None,
        }
    }

    /// Attributes this token to the nested position `inner`.
    pub fn nested(&self, inner: Token) -> Token {
        Token {
            related: Some(Box::new(self.clone())),
            ..inner
        }
    }
}

/// A loop invariant. Free invariants are assumed but never checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invariant {
    pub expr: BExpr,
    pub free: bool,
    pub token: Token,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    Assert {
        expr: BExpr,
        token: Token,
        msg: String,
    },
    Assume(BExpr),
    /// Parallel assignment to variables.
    Assign(Vec<String>, Vec<BExpr>),
    Havoc(Vec<String>),
    Call {
        callee: String,
        args: Vec<BExpr>,
        outs: Vec<String>,
    },
    /// `if (guard) { .. } else { .. }`; a missing guard is `*`.
    If {
        guard: Option<BExpr>,
        then: Vec<Cmd>,
        els: Vec<Cmd>,
    },
    While {
        guard: Option<BExpr>,
        invariants: Vec<Invariant>,
        body: Vec<Cmd>,
    },
    Break,
    Goto(String),
    Label(String),
    Return,
    Comment(String),
}

impl Cmd {
    pub fn assert(expr: BExpr, token: Token, msg: &str) -> Cmd {
        Cmd::Assert {
            expr,
            token,
            msg: msg.to_string(),
        }
    }

    pub fn assign(lhs: &str, rhs: BExpr) -> Cmd {
        Cmd::Assign(vec![lhs.to_string()], vec![rhs])
    }

    pub fn havoc(name: &str) -> Cmd {
        Cmd::Havoc(vec![name.to_string()])
    }

    /// `if (*) { then }`
    pub fn nondet(then: Vec<Cmd>) -> Cmd {
        Cmd::If {
            guard: None,
            then,
            els: vec![],
        }
    }

    pub fn comment(text: &str) -> Cmd {
        Cmd::Comment(text.to_string())
    }

    /// Visits this command and all nested commands in pre-order.
    pub fn visit(&self, f: &mut dyn FnMut(&Cmd)) {
        f(self);
        match self {
            Cmd::If { then, els, .. } => {
                then.iter().for_each(|c| c.visit(f));
                els.iter().for_each(|c| c.visit(f));
            }
            Cmd::While { body, .. } => body.iter().for_each(|c| c.visit(f)),
            _ => {}
        }
    }
}

/// Visits every command of a command list, including nested ones.
pub fn visit_cmds(cmds: &[Cmd], f: &mut dyn FnMut(&Cmd)) {
    for c in cmds {
        c.visit(f);
    }
}
