// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! The resolved source program consumed by the Boogie backend.

pub mod ast;
pub mod call_graph;
pub mod model;
pub mod ty;

pub use codespan_reporting;
