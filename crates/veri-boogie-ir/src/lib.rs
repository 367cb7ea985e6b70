// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Model of the Boogie intermediate verification language: types, expressions, commands and
//! top-level declarations collected in an append-only [`Program`], printable as Boogie source.

pub mod data;
pub mod printer;
pub mod program;

pub use data::commands::{visit_cmds, Cmd, Invariant, Token};
pub use data::declarations::{Contract, Decl, Function, Implementation, Procedure, TypedIdent};
pub use data::expressions::{BBinOp, BExpr, BQuant, BUnOp, BVar};
pub use data::types::BType;
pub use program::Program;
