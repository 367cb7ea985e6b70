// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Serialization to Boogie surface syntax.
//!
//! Binary operators are always parenthesized, so no precedence handling is needed.

use crate::data::commands::{Cmd, Invariant, Token};
use crate::data::declarations::{Contract, Decl, Function, Implementation, Procedure, TypedIdent};
use crate::data::expressions::{BExpr, BQuant, BUnOp, BVar};
use crate::data::types::BType;
use crate::program::Program;
use itertools::Itertools;
use num::{BigInt, Signed};
use std::fmt::{self, Display, Formatter, Write};

const INDENT: &str = "  ";

impl Display for BType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BType::Bool => write!(f, "bool"),
            BType::Int => write!(f, "int"),
            BType::Real => write!(f, "real"),
            BType::Bv(n) => write!(f, "bv{}", n),
            BType::Named(name, args) => {
                write!(f, "{}", name)?;
                for arg in args {
                    match arg {
                        BType::Named(_, a) if !a.is_empty() => write!(f, " ({})", arg)?,
                        BType::Map { .. } => write!(f, " ({})", arg)?,
                        _ => write!(f, " {}", arg)?,
                    }
                }
                Ok(())
            }
            BType::Map {
                type_vars,
                domain,
                range,
            } => {
                if !type_vars.is_empty() {
                    write!(f, "<{}>", type_vars.join(", "))?;
                }
                write!(f, "[{}]{}", domain.iter().join(", "), range)
            }
            BType::TypeVar(name) => write!(f, "{}", name),
        }
    }
}

impl Display for BVar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

fn fmt_int(f: &mut Formatter<'_>, n: &BigInt) -> fmt::Result {
    if n.is_negative() {
        write!(f, "(-{})", n.abs())
    } else {
        write!(f, "{}", n)
    }
}

fn is_atomic(e: &BExpr) -> bool {
    matches!(
        e,
        BExpr::Ident(_) | BExpr::FunCall { .. } | BExpr::Select(..) | BExpr::Store(..)
    )
}

impl Display for BExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BExpr::Bool(b) => write!(f, "{}", b),
            BExpr::Int(n) => fmt_int(f, n),
            BExpr::Real(r) => write!(f, "{}", r),
            BExpr::Bv { value, width } => write!(f, "{}bv{}", value, width),
            BExpr::Ident(name) => write!(f, "{}", name),
            BExpr::FunCall { name, args } => write!(f, "{}({})", name, args.iter().join(", ")),
            BExpr::Unary(BUnOp::Not, e) => write!(f, "!{}", Paren(e)),
            BExpr::Unary(BUnOp::Neg, e) => write!(f, "-{}", Paren(e)),
            BExpr::Binary(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
            BExpr::Ite(c, t, e) => write!(f, "(if {} then {} else {})", c, t, e),
            BExpr::Select(m, idx) => write!(f, "{}[{}]", Paren(m), idx.iter().join(", ")),
            BExpr::Store(m, idx, v) => {
                write!(f, "{}[{} := {}]", Paren(m), idx.iter().join(", "), v)
            }
            BExpr::Quant {
                kind,
                type_vars,
                vars,
                triggers,
                body,
            } => {
                let q = match kind {
                    BQuant::Forall => "forall",
                    BQuant::Exists => "exists",
                };
                write!(f, "({}", q)?;
                if !type_vars.is_empty() {
                    write!(f, "<{}>", type_vars.join(", "))?;
                }
                write!(f, " {} ::", vars.iter().join(", "))?;
                for trigger in triggers {
                    write!(f, " {{ {} }}", trigger.iter().join(", "))?;
                }
                write!(f, " {})", body)
            }
            BExpr::Lambda { vars, body } => {
                write!(f, "(lambda {} :: {})", vars.iter().join(", "), body)
            }
            BExpr::Old(e) => write!(f, "old({})", e),
            BExpr::Coerce(e, ty) => write!(f, "({}: {})", e, ty),
        }
    }
}

/// Parenthesizes non-atomic expressions.
struct Paren<'a>(&'a BExpr);

impl<'a> Display for Paren<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if is_atomic(self.0) || matches!(self.0, BExpr::Binary(..) | BExpr::Quant { .. }) {
            write!(f, "{}", self.0)
        } else {
            write!(f, "({})", self.0)
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn attributes(token: &Token, msg: &str) -> String {
    let mut out = String::new();
    if !msg.is_empty() {
        let _ = write!(out, "{{:msg \"{}\"}} ", escape(msg));
    }
    if !token.file.is_empty() {
        let _ = write!(
            out,
            "{{:sourceloc \"{}\", {}, {}}} ",
            escape(&token.file),
            token.line,
            token.col
        );
        if let Some(related) = &token.related {
            let _ = write!(
                out,
                "{{:relatedloc \"{}\", {}, {}}} ",
                escape(&related.file),
                related.line,
                related.col
            );
        }
    }
    out
}

/// Writes commands at the given indentation level.
pub fn write_cmds(out: &mut String, cmds: &[Cmd], level: usize) {
    for cmd in cmds {
        write_cmd(out, cmd, level);
    }
}

fn write_cmd(out: &mut String, cmd: &Cmd, level: usize) {
    let pad = INDENT.repeat(level);
    match cmd {
        Cmd::Assert { expr, token, msg } => {
            let _ = writeln!(out, "{}assert {}{};", pad, attributes(token, msg), expr);
        }
        Cmd::Assume(e) => {
            let _ = writeln!(out, "{}assume {};", pad, e);
        }
        Cmd::Assign(lhss, rhss) => {
            let _ = writeln!(out, "{}{} := {};", pad, lhss.join(", "), rhss.iter().join(", "));
        }
        Cmd::Havoc(names) => {
            let _ = writeln!(out, "{}havoc {};", pad, names.join(", "));
        }
        Cmd::Call { callee, args, outs } => {
            let lhs = if outs.is_empty() {
                String::new()
            } else {
                format!("{} := ", outs.join(", "))
            };
            let _ = writeln!(out, "{}call {}{}({});", pad, lhs, callee, args.iter().join(", "));
        }
        Cmd::If { guard, then, els } => {
            let guard = guard
                .as_ref()
                .map(|g| g.to_string())
                .unwrap_or_else(|| "*".to_string());
            let _ = writeln!(out, "{}if ({}) {{", pad, guard);
            write_cmds(out, then, level + 1);
            if els.is_empty() {
                let _ = writeln!(out, "{}}}", pad);
            } else {
                let _ = writeln!(out, "{}}} else {{", pad);
                write_cmds(out, els, level + 1);
                let _ = writeln!(out, "{}}}", pad);
            }
        }
        Cmd::While {
            guard,
            invariants,
            body,
        } => {
            let guard = guard
                .as_ref()
                .map(|g| g.to_string())
                .unwrap_or_else(|| "*".to_string());
            let _ = writeln!(out, "{}while ({})", pad, guard);
            for Invariant {
                expr,
                free,
                token,
                msg,
            } in invariants
            {
                if *free {
                    let _ = writeln!(out, "{}{}free invariant {};", pad, INDENT, expr);
                } else {
                    let _ = writeln!(
                        out,
                        "{}{}invariant {}{};",
                        pad,
                        INDENT,
                        attributes(token, msg),
                        expr
                    );
                }
            }
            let _ = writeln!(out, "{}{{", pad);
            write_cmds(out, body, level + 1);
            let _ = writeln!(out, "{}}}", pad);
        }
        Cmd::Break => {
            let _ = writeln!(out, "{}break;", pad);
        }
        Cmd::Goto(label) => {
            let _ = writeln!(out, "{}goto {};", pad, label);
        }
        Cmd::Label(label) => {
            let _ = writeln!(out, "{}{}:", INDENT.repeat(level.saturating_sub(1)), label);
            let _ = writeln!(out, "{}assume true;", pad);
        }
        Cmd::Return => {
            let _ = writeln!(out, "{}return;", pad);
        }
        Cmd::Comment(text) => {
            for line in text.lines() {
                let _ = writeln!(out, "{}// {}", pad, line);
            }
        }
    }
}

fn typed_ident(ti: &TypedIdent) -> String {
    match &ti.where_clause {
        Some(w) => format!("{}: {} where {}", ti.name, ti.ty, w),
        None => format!("{}: {}", ti.name, ti.ty),
    }
}

fn type_params(vars: &[String]) -> String {
    if vars.is_empty() {
        String::new()
    } else {
        format!("<{}>", vars.join(", "))
    }
}

fn write_function(out: &mut String, fun: &Function) {
    let inline = if fun.inline { "{:inline} " } else { "" };
    let _ = write!(
        out,
        "function {}{}{}({}) : {}",
        inline,
        fun.name,
        type_params(&fun.type_vars),
        fun.params.iter().join(", "),
        fun.result
    );
    match &fun.body {
        Some(body) => {
            let _ = writeln!(out, "\n{{\n{}{}\n}}", INDENT, body);
        }
        None => {
            let _ = writeln!(out, ";");
        }
    }
}

fn write_contract(out: &mut String, keyword: &str, c: &Contract) {
    if c.free {
        let _ = writeln!(out, "{}free {} {};", INDENT, keyword, c.expr);
    } else {
        let _ = writeln!(
            out,
            "{}{} {}{};",
            INDENT,
            keyword,
            attributes(&c.token, &c.msg),
            c.expr
        );
    }
}

fn write_procedure(out: &mut String, proc: &Procedure) {
    let _ = write!(
        out,
        "procedure {}{}({})",
        proc.name,
        type_params(&proc.type_vars),
        proc.ins.iter().map(typed_ident).join(", ")
    );
    if !proc.outs.is_empty() {
        let _ = write!(out, "\n{}returns ({})", INDENT, proc.outs.iter().map(typed_ident).join(", "));
    }
    let _ = writeln!(out, ";");
    for r in &proc.requires {
        write_contract(out, "requires", r);
    }
    if !proc.modifies.is_empty() {
        let _ = writeln!(out, "{}modifies {};", INDENT, proc.modifies.join(", "));
    }
    for e in &proc.ensures {
        write_contract(out, "ensures", e);
    }
}

fn write_implementation(out: &mut String, imp: &Implementation) {
    let _ = write!(
        out,
        "implementation {}{}({})",
        imp.proc_name,
        type_params(&imp.type_vars),
        imp.ins.iter().join(", ")
    );
    if !imp.outs.is_empty() {
        let _ = write!(out, " returns ({})", imp.outs.iter().join(", "));
    }
    let _ = writeln!(out, "\n{{");
    for local in &imp.locals {
        let _ = writeln!(out, "{}var {};", INDENT, typed_ident(local));
    }
    if !imp.locals.is_empty() {
        let _ = writeln!(out);
    }
    write_cmds(out, &imp.body, 1);
    let _ = writeln!(out, "}}");
}

impl Display for Decl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        match self {
            Decl::TypeCtor { name, arity } => {
                let _ = writeln!(out, "type {}{};", name, " _".repeat(*arity));
            }
            Decl::Const { name, ty, unique } => {
                let unique = if *unique { "unique " } else { "" };
                let _ = writeln!(out, "const {}{}: {};", unique, name, ty);
            }
            Decl::Function(fun) => write_function(&mut out, fun),
            Decl::Axiom { expr, comment } => {
                if let Some(c) = comment {
                    let _ = writeln!(out, "// {}", c);
                }
                let _ = writeln!(out, "axiom {};", expr);
            }
            Decl::GlobalVar(v) => {
                let _ = writeln!(out, "var {};", typed_ident(v));
            }
            Decl::Procedure(p) => write_procedure(&mut out, p),
            Decl::Implementation(i) => write_implementation(&mut out, i),
            Decl::Comment(text) => {
                for line in text.lines() {
                    let _ = writeln!(out, "// {}", line);
                }
            }
        }
        write!(f, "{}", out)
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for decl in self.decls() {
            writeln!(f, "{}", decl)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expressions_print_in_boogie_syntax() {
        let x = BVar::new("x", BType::Int);
        let body = BExpr::imp(
            BExpr::le(BExpr::int(0), x.to_expr()),
            BExpr::call("f", vec![x.to_expr()]),
        );
        let trig = vec![vec![BExpr::call("f", vec![x.to_expr()])]];
        let q = BExpr::forall(vec![x], trig, body);
        assert_eq!(
            q.to_string(),
            "(forall x: int :: { f(x) } ((0 <= x) ==> f(x)))"
        );
        let sel = BExpr::select(BExpr::ident("$Heap"), vec![BExpr::ident("o"), BExpr::ident("f")]);
        assert_eq!(sel.to_string(), "$Heap[o, f]");
        assert_eq!(BExpr::int(-3).to_string(), "(-3)");
    }

    #[test]
    fn types_print_with_parentheses() {
        let t = BType::app("Set", vec![BType::app("Seq", vec![BType::named("Box")])]);
        assert_eq!(t.to_string(), "Set (Seq Box)");
        let field = BType::Map {
            type_vars: vec!["a".to_string()],
            domain: vec![BType::named("ref"), BType::app("Field", vec![BType::type_var("a")])],
            range: Box::new(BType::type_var("a")),
        };
        assert_eq!(field.to_string(), "<a>[ref, Field a]a");
    }

    #[test]
    fn loops_print_invariants() {
        let cmd = Cmd::While {
            guard: Some(BExpr::lt(BExpr::ident("i#0"), BExpr::ident("n#0"))),
            invariants: vec![Invariant {
                expr: BExpr::le(BExpr::int(0), BExpr::ident("i#0")),
                free: true,
                token: Token::default(),
                msg: String::new(),
            }],
            body: vec![Cmd::assign("i#0", BExpr::add(BExpr::ident("i#0"), BExpr::int(1)))],
        };
        let mut out = String::new();
        write_cmds(&mut out, &[cmd], 0);
        assert!(out.contains("while ((i#0 < n#0))"));
        assert!(out.contains("  free invariant (0 <= i#0);"));
        assert!(out.contains("  i#0 := (i#0 + 1);"));
    }
}
