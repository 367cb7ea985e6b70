// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Entry points of the Boogie generator.

use crate::{
    boogie_backend::{
        decl_translator::BoogieTranslator, options::BoogieOptions, vocabulary::Vocabulary,
    },
    generator_options::Options,
};
use anyhow::{anyhow, Context};
use codespan_reporting::{
    diagnostic::Severity,
    term::termcolor::{ColorChoice, StandardStream, WriteColor},
};
use log::{error, info};
use std::{fs, path::Path, time::Instant};
use veri_boogie_ir::Program;
use veri_model::model::GlobalEnv;

/// Translates all modules of `env`. A malformed preamble is logged and yields an empty
/// program.
pub fn generate_boogie(env: &GlobalEnv, options: &BoogieOptions) -> Program {
    match Vocabulary::from_options(options) {
        Ok(vocab) => generate_with_vocabulary(env, options, &vocab),
        Err(err) => {
            error!("cannot generate Boogie: {:#}", err);
            Program::new()
        }
    }
}

pub fn generate_with_vocabulary(
    env: &GlobalEnv,
    options: &BoogieOptions,
    vocab: &Vocabulary,
) -> Program {
    BoogieTranslator::new(env, options, vocab).translate()
}

/// The Boogie source of a generated program, optionally preceded by the preamble.
pub fn boogie_source(vocab: &Vocabulary, program: &Program, include_prelude: bool) -> String {
    let mut text = String::new();
    if include_prelude {
        text.push_str(vocab.text());
        text.push('\n');
    }
    text.push_str(&program.to_string());
    text
}

pub fn run_boogie_gen(env: &GlobalEnv, options: &Options) -> anyhow::Result<String> {
    let mut error_writer = StandardStream::stderr(ColorChoice::Auto);
    run_boogie_gen_with_writer(env, &mut error_writer, options)
}

/// Runs the generator and writes the result to `options.output_path`, reporting diagnostics
/// to `error_writer`. Returns the generated text.
pub fn run_boogie_gen_with_writer<W: WriteColor>(
    env: &GlobalEnv,
    error_writer: &mut W,
    options: &Options,
) -> anyhow::Result<String> {
    check_errors(env, error_writer, "exiting with model errors")?;

    let vocab = Vocabulary::from_options(&options.backend)?;
    info!("preamble declares {} symbols", vocab.symbol_count());

    let now = Instant::now();
    let program = generate_with_vocabulary(env, &options.backend, &vocab);
    info!(
        "{:.3}s translation, {} declarations",
        now.elapsed().as_secs_f64(),
        program.len()
    );
    check_errors(env, error_writer, "exiting with translation errors")?;

    let text = boogie_source(&vocab, &program, options.include_prelude);
    if !options.output_path.is_empty() {
        let path = Path::new(&options.output_path);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating `{}`", dir.display()))?;
        }
        fs::write(path, &text).with_context(|| format!("writing `{}`", path.display()))?;
        info!("wrote {}", path.display());
    }
    Ok(text)
}

/// Reports all diagnostics and fails with `msg` if any of them is an error.
pub fn check_errors<W: WriteColor>(
    env: &GlobalEnv,
    error_writer: &mut W,
    msg: &'static str,
) -> anyhow::Result<()> {
    let errors = env.has_errors();
    env.report_diag(error_writer, Severity::Warning);
    if errors {
        Err(anyhow!(msg))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codespan_reporting::term::termcolor::Buffer;
    use veri_model::model::{Loc, ModuleData};

    #[test]
    fn broken_preamble_gives_empty_program() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.bpl");
        fs::write(&path, "type Ty;\n").unwrap();
        let mut env = GlobalEnv::new();
        env.add_module(ModuleData::new("M", 0));
        let options = BoogieOptions {
            prelude_path: Some(path),
            ..BoogieOptions::default()
        };
        assert!(generate_boogie(&env, &options).is_empty());
    }

    #[test]
    fn errors_stop_generation() {
        let env = GlobalEnv::new();
        env.error(&Loc::default(), "unresolved name");
        let mut buffer = Buffer::no_color();
        let options = Options {
            output_path: String::new(),
            ..Options::default()
        };
        let err = run_boogie_gen_with_writer(&env, &mut buffer, &options).unwrap_err();
        assert_eq!(err.to_string(), "exiting with model errors");
    }

    #[test]
    fn output_file_starts_with_the_preamble() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("gen").join("out.bpl");
        let mut env = GlobalEnv::new();
        env.add_module(ModuleData::new("M", 0));
        let options = Options {
            output_path: out.to_string_lossy().to_string(),
            ..Options::default()
        };
        let mut buffer = Buffer::no_color();
        let text = run_boogie_gen_with_writer(&env, &mut buffer, &options).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), text);
        let vocab = Vocabulary::builtin().unwrap();
        assert!(text.starts_with(vocab.text()));
    }
}
