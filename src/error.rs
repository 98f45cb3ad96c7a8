use thiserror::Error;

/// Unrecoverable failures: the shell prints the message and exits with 1.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("fork error: {0}")]
    Fork(nix::Error),
    #[error("pipe error: {0}")]
    Pipe(nix::Error),
    #[error("sigprocmask error: {0}")]
    SignalMask(nix::Error),
    #[error("Signal error: {0}")]
    SignalAction(nix::Error),
    #[error("Signal error: {0}")]
    SignalRegister(std::io::Error),
    #[error("dup2 error: {0}")]
    Dup(nix::Error),
    #[error("read error: {0}")]
    Input(#[from] std::io::Error),
    #[error("readline error: {0}")]
    Editor(#[from] rustyline::error::ReadlineError),
}
