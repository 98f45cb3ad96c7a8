use std::fmt::Display;
use std::io;
use std::process;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "TSH_LOG";

pub fn print_usage() -> ! {
    println!("Usage: shell [-hvp]");
    println!("   -h   print this message");
    println!("   -v   print additional diagnostic information");
    println!("   -p   do not emit a command prompt");
    process::exit(1);
}

/// Prints an unrecoverable error and terminates the shell.
pub fn fatal(err: impl Display) -> ! {
    println!("{}", err);
    process::exit(1);
}

/// Installs the diagnostics subscriber. `TSH_LOG` wins over the default level,
/// which is `debug` in verbose mode and `warn` otherwise.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
