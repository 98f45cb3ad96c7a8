//! myint - spins for <n> seconds, then interrupts itself with SIGINT.
//!
//! usage: myint <n>

mod common;

use nix::sys::signal::{raise, Signal};
use std::process;

fn main() {
    common::spin(common::seconds_arg());
    if let Err(err) = raise(Signal::SIGINT) {
        eprintln!("myint: raise(SIGINT): {}", err);
        process::exit(1);
    }
}
