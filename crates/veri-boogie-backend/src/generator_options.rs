// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use crate::boogie_backend::options::BoogieOptions;
use anyhow::Context;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options of a generator run. Usually read from a toml file, with some of them overridden
/// from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Path of the generated Boogie file. Nothing is written if empty.
    pub output_path: String,
    /// Verbosity level for logging.
    pub verbosity_level: LevelFilter,
    /// Whether the preamble is written in front of the generated declarations.
    pub include_prelude: bool,
    /// Options of the translator.
    pub backend: BoogieOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            output_path: "output.bpl".to_string(),
            verbosity_level: LevelFilter::Info,
            include_prelude: true,
            backend: BoogieOptions::default(),
        }
    }
}

impl Options {
    pub fn create_from_toml(toml_source: &str) -> anyhow::Result<Options> {
        Ok(toml::from_str(toml_source)?)
    }

    pub fn create_from_toml_file(toml_file: &Path) -> anyhow::Result<Options> {
        let text = std::fs::read_to_string(toml_file)
            .with_context(|| format!("reading options `{}`", toml_file.display()))?;
        Self::create_from_toml(&text)
            .with_context(|| format!("parsing options `{}`", toml_file.display()))
    }

    pub fn set_debug(&mut self) {
        self.verbosity_level = LevelFilter::Debug;
    }
}
