// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;
use clap::Args;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use log::info;
use simplelog::{Config, SimpleLogger};
use std::path::{Path, PathBuf};
use veri_boogie_backend::{generator::run_boogie_gen_with_writer, generator_options::Options};
use veri_model::{
    call_graph::compute_call_graph,
    model::{GlobalEnv, ProgramData},
};

/// General generation options
#[derive(Args, Default)]
#[clap(next_help_heading = "General Options")]
pub struct GeneralConfig {
    /// Path of the generated Boogie file
    #[clap(name = "output", long, short = 'o')]
    pub output: Option<String>,

    /// Use this preamble instead of the built-in one
    #[clap(name = "prelude", long)]
    pub prelude: Option<PathBuf>,

    /// Do not write the preamble in front of the generated declarations
    #[clap(name = "no-prelude-output", long)]
    pub no_prelude_output: bool,

    /// Do not emit literal hints
    #[clap(name = "no-literal-hints", long)]
    pub no_literal_hints: bool,

    /// Unfolding depth for assumptions when no fuel annotation applies
    #[clap(name = "fuel-low", long)]
    pub fuel_low: Option<u32>,

    /// Unfolding depth for assertions when no fuel annotation applies
    #[clap(name = "fuel-high", long)]
    pub fuel_high: Option<u32>,

    /// Display detailed generation progress
    #[clap(name = "verbose", long, short = 'v')]
    pub verbose: bool,

    /// Print the effective options as toml and exit
    #[clap(name = "print-config", long)]
    pub print_config: bool,
}

/// Reads the options file, if any, and applies the command line overrides.
pub fn load_options(config: Option<&Path>, general: &GeneralConfig) -> anyhow::Result<Options> {
    let mut options = match config {
        Some(path) => Options::create_from_toml_file(path)?,
        None => Options::default(),
    };
    if let Some(output) = &general.output {
        options.output_path = output.clone();
    }
    if let Some(prelude) = &general.prelude {
        options.backend.prelude_path = Some(prelude.clone());
    }
    if general.no_prelude_output {
        options.include_prelude = false;
    }
    if general.no_literal_hints {
        options.backend.use_literal_hints = false;
    }
    if let Some(low) = general.fuel_low {
        options.backend.default_fuel_low = low;
    }
    if let Some(high) = general.fuel_high {
        options.backend.default_fuel_high = high;
    }
    if options.backend.default_fuel_high < options.backend.default_fuel_low {
        anyhow::bail!(
            "fuel for assertions ({}) must not be below fuel for assumptions ({})",
            options.backend.default_fuel_high,
            options.backend.default_fuel_low
        )
    }
    if general.verbose {
        options.set_debug();
    }
    Ok(options)
}

pub fn setup_logging(options: &Options) -> anyhow::Result<()> {
    SimpleLogger::init(options.verbosity_level, Config::default()).context("installing logger")
}

/// Loads a resolved program and prepares it for translation.
pub fn load_program(input: &Path) -> anyhow::Result<GlobalEnv> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("reading `{}`", input.display()))?;
    let data: ProgramData = serde_json::from_str(&text)
        .with_context(|| format!("parsing resolved program `{}`", input.display()))?;
    let mut env = GlobalEnv::from_program(data);
    compute_call_graph(&mut env);
    info!(
        "loaded {} module(s) from {}",
        env.get_module_count(),
        input.display()
    );
    Ok(env)
}

pub fn execute(input: &Path, options: Options, print_config: bool) -> anyhow::Result<String> {
    if print_config {
        return Ok(toml::to_string(&options)?);
    }
    let env = load_program(input)?;
    let mut error_writer = StandardStream::stderr(ColorChoice::Auto);
    run_boogie_gen_with_writer(&env, &mut error_writer, &options)?;
    Ok(format!("✅ {}", options.output_path))
}
