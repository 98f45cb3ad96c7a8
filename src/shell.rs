use crate::builtins::handle_builtin;
use crate::error::ShellError;
use crate::exec::execute_command;
use crate::parser::parse_command_line;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, BufRead, IsTerminal, StdinLock, Write};
use tracing::debug;

/// Global prompt string.
pub static PROMPT: &str = "tsh> ";

/// Options taken from the command line.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// If true, prints the command prompt.
    pub emit_prompt: bool,
    /// If true, prints extra information about jobs.
    pub verbose: bool,
}

/// Where command lines come from: a line editor on an interactive terminal,
/// plain stdin otherwise (driver scripts, pipes).
enum LineReader {
    Editor(DefaultEditor),
    Stdin(StdinLock<'static>),
}

impl LineReader {
    fn new(emit_prompt: bool) -> Result<Self, ShellError> {
        if emit_prompt && io::stdin().is_terminal() {
            Ok(LineReader::Editor(DefaultEditor::new()?))
        } else {
            Ok(LineReader::Stdin(io::stdin().lock()))
        }
    }

    /// Returns the next line without its trailing newline, or `None` at
    /// end-of-file (ctrl-d).
    fn next_line(&mut self, emit_prompt: bool) -> Result<Option<String>, ShellError> {
        match self {
            LineReader::Editor(editor) => loop {
                match editor.readline(PROMPT) {
                    Ok(line) => {
                        if !line.trim().is_empty() {
                            let _ = editor.add_history_entry(line.as_str());
                        }
                        return Ok(Some(line));
                    }
                    // ctrl-c at the prompt just discards the line.
                    Err(ReadlineError::Interrupted) => continue,
                    Err(ReadlineError::Eof) => return Ok(None),
                    Err(err) => return Err(err.into()),
                }
            },
            LineReader::Stdin(stdin) => {
                if emit_prompt {
                    print!("{}", PROMPT);
                    io::stdout().flush()?;
                }
                let mut cmdline = String::new();
                if stdin.read_line(&mut cmdline)? == 0 {
                    return Ok(None);
                }
                let len = cmdline.trim_end_matches(['\n', '\r']).len();
                cmdline.truncate(len);
                Ok(Some(cmdline))
            }
        }
    }
}

/// Runs the main shell loop: prints the prompt (if enabled), reads input,
/// parses it, and evaluates commands. Returns at end-of-file.
pub fn run_shell(options: &Options) -> Result<(), ShellError> {
    let mut reader = LineReader::new(options.emit_prompt)?;

    while let Some(cmdline) = reader.next_line(options.emit_prompt)? {
        if cmdline.trim().is_empty() {
            continue;
        }
        debug!(cmdline = cmdline.as_str(), "received command");
        eval(&cmdline)?;
        io::stdout().flush()?;
    }
    Ok(())
}

/// Evaluates one command line: a built-in runs immediately, anything else is
/// launched as a job.
fn eval(cmdline: &str) -> Result<(), ShellError> {
    let command = match parse_command_line(cmdline) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("Parse error: {}", err);
            return Ok(());
        }
    };
    if command.argv.is_empty() {
        return Ok(());
    }
    if handle_builtin(&command.argv)? {
        return Ok(());
    }
    execute_command(&command.argv, command.background, cmdline)
}
