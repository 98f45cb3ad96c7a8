//! Argument handling shared by the trace helper programs.

use std::env;
use std::process;
use std::thread;
use std::time::Duration;

/// Reads the single `<n>` argument. Wrong usage exits 0 so a trace driver
/// does not mistake it for a job failure; a non-numeric count exits 1.
pub fn seconds_arg() -> u64 {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("helper");
    let [_, count] = args.as_slice() else {
        eprintln!("Usage: {} <n>", program);
        process::exit(0);
    };
    count.parse().unwrap_or_else(|_| {
        eprintln!("{}: <n> must be a positive integer", program);
        process::exit(1);
    })
}

/// Sleeps in one-second steps so a stop or continue lands between steps.
pub fn spin(secs: u64) {
    for _ in 0..secs {
        thread::sleep(Duration::from_secs(1));
    }
}
