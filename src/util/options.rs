// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Analysis options.

use clap::error::ErrorKind;
use clap::{Arg, Command};

use crate::pta::PTAType;

const OOPTA_USAGE: &str = r#"pta [OPTIONS] INPUT"#;

/// When static initializers become reachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClinitMode {
    /// Every static initializer is an entry point.
    Full,
    /// A static initializer becomes reachable when its class is first used
    /// by a reachable method.
    OnTheFly,
}

/// Creates the clap::Command metadata for argument parsing.
fn make_options_parser() -> Command<'static> {
    Command::new("oopta")
        .no_binary_name(true)
        .override_usage(OOPTA_USAGE)
        .version(env!("CARGO_PKG_VERSION"))
        .arg(Arg::new("pta-type")
            .long("pta-type")
            .takes_value(true)
            .value_parser(["insensitive", "ci", "callsite-sensitive", "cs", "object-sensitive", "obj"])
            .default_value("callsite-sensitive")
            .help("The type of pointer analysis.")
            .long_help("Context-insensitive, callsite-sensitive and object-sensitive analyses are supported."))
        .arg(Arg::new("context-depth")
            .long("context-depth")
            .takes_value(true)
            .value_parser(clap::value_parser!(u32))
            .default_value("1")
            .help("The context depth limit for a context-sensitive pointer analysis."))
        .arg(Arg::new("clinit-mode")
            .long("clinit-mode")
            .takes_value(true)
            .value_parser(["full", "on-the-fly"])
            .default_value("on-the-fly")
            .help("Whether static initializers are all reachable or triggered by first use."))
        .arg(Arg::new("ignore-resolution-errors")
            .long("ignore-resolution-errors")
            .takes_value(false)
            .help("Skip invoke statements whose target cannot be resolved instead of aborting."))
        .arg(Arg::new("handle-finalizers")
            .long("handle-finalizers")
            .takes_value(false)
            .help("Register objects overriding finalize() with the program's finalizer register method."))
        .arg(Arg::new("dump-stats")
            .long("dump-stats")
            .takes_value(false)
            .help("Dump the statistics of the analysis results."))
        .arg(Arg::new("call-graph-output")
            .long("dump-call-graph")
            .takes_value(true)
            .help("Dump the call graph in DOT format to the output file."))
        .arg(Arg::new("pts-output")
            .long("dump-pts")
            .takes_value(true)
            .help("Dump points-to results to the output file, or `stdout`."))
        .arg(Arg::new("INPUT")
            .help("The JSON program to be analyzed."))
}

#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    pub pta_type: PTAType,
    // options for context-sensitive analysis
    pub context_depth: u32,
    pub clinit_mode: ClinitMode,
    pub ignore_resolution_errors: bool,
    pub handle_finalizers: bool,

    pub dump_stats: bool,
    pub call_graph_output: Option<String>,
    pub pts_output: Option<String>,
    pub input: Option<String>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            pta_type: PTAType::CallSiteSensitive,
            context_depth: 1,
            clinit_mode: ClinitMode::OnTheFly,
            ignore_resolution_errors: false,
            handle_finalizers: false,
            dump_stats: false,
            call_graph_output: None,
            pts_output: None,
            input: None,
        }
    }
}

impl AnalysisOptions {
    /// Parses options from a list of strings. Options given later override
    /// the ones already set, so environment flags can be parsed first.
    pub fn parse_from_args(&mut self, args: &[String]) {
        let matches = match make_options_parser().try_get_matches_from(args.iter()) {
            Ok(matches) => matches,
            Err(e) => match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    print!("{e}");
                    std::process::exit(0);
                }
                _ => e.exit(),
            },
        };
        let explicit = |id: &str| {
            matches.value_source(id) == Some(clap::ValueSource::CommandLine)
        };

        if explicit("pta-type") {
            if let Some(pta_type) = matches.get_one::<String>("pta-type") {
                self.pta_type = match pta_type.as_str() {
                    "insensitive" | "ci" => PTAType::ContextInsensitive,
                    "object-sensitive" | "obj" => PTAType::ObjectSensitive,
                    _ => PTAType::CallSiteSensitive,
                };
            }
        }
        if explicit("context-depth") {
            if let Some(depth) = matches.get_one::<u32>("context-depth") {
                self.context_depth = *depth;
            }
        }
        if explicit("clinit-mode") {
            if let Some(mode) = matches.get_one::<String>("clinit-mode") {
                self.clinit_mode = match mode.as_str() {
                    "full" => ClinitMode::Full,
                    _ => ClinitMode::OnTheFly,
                };
            }
        }

        self.ignore_resolution_errors |= matches.contains_id("ignore-resolution-errors");
        self.handle_finalizers |= matches.contains_id("handle-finalizers");
        self.dump_stats |= matches.contains_id("dump-stats");
        if let Some(output) = matches.get_one::<String>("call-graph-output") {
            self.call_graph_output = Some(output.clone());
        }
        if let Some(output) = matches.get_one::<String>("pts-output") {
            self.pts_output = Some(output.clone());
        }
        if let Some(input) = matches.get_one::<String>("INPUT") {
            self.input = Some(input.clone());
        }
    }
}
