//! mystop - spins for <n> seconds, then stops its whole process group with
//! SIGTSTP. Exits normally once continued.
//!
//! usage: mystop <n>

mod common;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::getpgrp;
use std::process;

fn main() {
    common::spin(common::seconds_arg());
    if let Err(err) = killpg(getpgrp(), Signal::SIGTSTP) {
        eprintln!("mystop: killpg(SIGTSTP): {}", err);
        process::exit(1);
    }
}
