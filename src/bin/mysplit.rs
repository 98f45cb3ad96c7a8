//! mysplit - forks a child that spins for <n> seconds; the parent waits for
//! it. Both live in the same process group, which makes it a check that the
//! shell signals whole groups.
//!
//! usage: mysplit <n>

mod common;

use nix::sys::wait::waitpid;
use nix::unistd::{fork, ForkResult};
use std::process;

fn main() {
    let secs = common::seconds_arg();

    // SAFETY: single threaded; the child only sleeps and exits.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => common::spin(secs),
        Ok(ForkResult::Parent { child }) => {
            if let Err(err) = waitpid(child, None) {
                eprintln!("mysplit: waitpid: {}", err);
                process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("mysplit: fork: {}", err);
            process::exit(1);
        }
    }
}
