// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use clap::*;
use colored::Colorize;
use log::debug;
use prove::{execute, GeneralConfig};
use std::path::PathBuf;

mod prove;

#[derive(Parser)]
#[clap(
    name = env!("CARGO_BIN_NAME"),
    about = "Generates a Boogie program from a resolved source program. The input is the JSON \
             document produced by the resolver; the output is written to the configured path.",
    rename_all = "kebab-case",
    author,
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Args {
    /// Path to the resolved program (JSON)
    pub input: PathBuf,

    /// Boogie generation options (toml)
    #[clap(long = "config", short = 'c')]
    pub config: Option<PathBuf>,

    /// General options
    #[clap(flatten)]
    pub general_config: GeneralConfig,
}

fn main() {
    #[cfg(windows)]
    let _ = colored::control::set_virtual_terminal(true);

    let args = Args::parse();
    let result = prove::load_options(args.config.as_deref(), &args.general_config).and_then(
        |options| {
            prove::setup_logging(&options)?;
            debug!("{} version: {}", env!("CARGO_BIN_NAME"), env!("CARGO_PKG_VERSION"));
            execute(&args.input, options, args.general_config.print_config)
        },
    );

    match result {
        Ok(msg) => println!("{}", msg),
        Err(err) => {
            let err = format!("{:?}", err);
            println!("{}", err.bold().red());
            std::process::exit(1);
        }
    }
}
