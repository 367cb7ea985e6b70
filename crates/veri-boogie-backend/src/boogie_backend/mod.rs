// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

pub mod boogie_helpers;
pub mod closure_scaffolding;
pub mod context;
pub mod decl_translator;
pub mod exp_translator;
pub mod fuel;
pub mod function_translator;
pub mod iterator_translator;
pub mod method_translator;
pub mod options;
pub mod splitter;
pub mod stmt_translator;
pub mod substitution;
pub mod termination;
pub mod triggers;
pub mod type_encoder;
pub mod vocabulary;
pub mod wellformedness;
