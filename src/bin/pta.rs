// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The main routine of `oopta`.
//!
//! Loads a JSON program and runs the pointer analysis selected by the
//! options on it.

use anyhow::{bail, Context};
use log::*;
use std::env;

use oopta::ir::program::Program;
use oopta::pta;
use oopta::util::options::AnalysisOptions;

fn main() -> anyhow::Result<()> {
    // Initialize loggers.
    if env::var("PTA_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PTA_LOG")
            .write_style("PTA_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    // Get any options specified via the PTA_FLAGS environment variable
    let mut options = AnalysisOptions::default();
    let pta_flags = env::var("PTA_FLAGS").unwrap_or_default();
    let pta_args: Vec<String> = serde_json::from_str(&pta_flags).unwrap_or_default();
    options.parse_from_args(&pta_args[..]);

    // Let arguments supplied on the command line override the environment variable.
    let args = env::args_os()
        .enumerate()
        .map(|(i, arg)| {
            arg.into_string()
                .map_err(|arg| anyhow::anyhow!("Argument {i} is not valid Unicode: {arg:?}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    options.parse_from_args(args.get(1..).unwrap_or_default());
    info!("PTA Options: {:?}", options);

    let input = match &options.input {
        Some(input) => input.clone(),
        None => bail!("no input program given"),
    };
    let program = Program::from_json_file(std::path::Path::new(&input)).with_context(|| format!("failed to load `{input}`"))?;
    pta::run_pointer_analysis(&program, &options)?;
    Ok(())
}
