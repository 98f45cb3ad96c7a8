mod builtins;
mod error;
mod exec;
mod jobs;
mod parser;
mod shell;
mod signals;
mod utils;

use crate::error::ShellError;
use crate::jobs::JOB_LIST;
use crate::shell::Options;
use nix::libc;
use nix::unistd;
use std::env;

fn main() {
    // Parse command-line arguments.
    let options = parse_args(env::args().skip(1));

    // Redirect stderr to stdout so a driver reading stdout sees all output.
    if let Err(err) = unistd::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO) {
        utils::fatal(ShellError::Dup(err));
    }
    utils::init_logging(options.verbose);

    // Install signal handlers.
    if let Err(err) = signals::install_signal_handlers() {
        utils::fatal(err);
    }
    match JOB_LIST.lock() {
        Ok(mut jobs) => jobs.set_verbose(options.verbose),
        Err(err) => utils::fatal(err),
    }

    // Run the main shell loop with the options.
    if let Err(err) = shell::run_shell(&options) {
        utils::fatal(err);
    }
}

/// getopt-style flags: `-h`, `-v`, `-p`, combinable as in `-vp`.
fn parse_args(args: impl Iterator<Item = String>) -> Options {
    let mut options = Options {
        emit_prompt: true,
        verbose: false,
    };
    for arg in args {
        let Some(flags) = arg.strip_prefix('-').filter(|flags| !flags.is_empty()) else {
            utils::print_usage();
        };
        for flag in flags.chars() {
            match flag {
                'h' => utils::print_usage(),
                'v' => options.verbose = true,
                'p' => options.emit_prompt = false,
                _ => utils::print_usage(),
            }
        }
    }
    options
}
