//! myspin - spins for <n> seconds, then exits normally.
//!
//! usage: myspin <n>

mod common;

fn main() {
    common::spin(common::seconds_arg());
}
