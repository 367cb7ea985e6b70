// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

pub mod boogie_backend;
pub mod generator;
pub mod generator_options;
