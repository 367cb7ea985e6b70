// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

pub mod commands;
pub mod declarations;
pub mod expressions;
pub mod types;
