use crate::error::ShellError;
use crate::jobs::{JobList, JobState, Transition, JOB_LIST};
use crate::signals::{self, SignalGuard};
use nix::fcntl::OFlag;
use nix::libc;
use nix::sys::signal::{self as nix_signal, SigSet, SigmaskHow};
use nix::unistd::{self, ForkResult, Pid};
use std::ffi::CString;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::OwnedFd;
use tracing::debug;

/// Executes an external command:
/// - forks a child with SIGCHLD, SIGINT and SIGTSTP blocked,
/// - puts the child in its own process group and execs the program,
/// - registers the job once the exec is known to have succeeded,
/// - waits for a foreground job, or announces a background one.
pub fn execute_command(argv: &[String], bg: bool, cmdline: &str) -> Result<(), ShellError> {
    let args = match argv
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(args) => args,
        Err(_) => {
            eprintln!("{}: argument contains a NUL byte", argv[0]);
            return Ok(());
        }
    };
    // Built before fork: the child must not allocate.
    let not_found = format!("{}: Command not found\n", argv[0]);
    let (status_rd, status_wr) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(ShellError::Pipe)?;

    let mut jobs = JOB_LIST.lock()?;
    // SAFETY: the child only makes async-signal-safe calls before exec/_exit.
    let child = match unsafe { unistd::fork() } {
        Ok(ForkResult::Child) => {
            exec_child(&args, not_found.as_bytes(), &status_wr, jobs.saved_mask())
        }
        Ok(ForkResult::Parent { child }) => child,
        Err(err) => return Err(ShellError::Fork(err)),
    };
    // Also done by the child; whichever runs first wins. EACCES after the
    // child's exec is expected.
    let _ = unistd::setpgid(child, child);
    drop(status_wr);

    if !exec_succeeded(status_rd, child) {
        return Ok(());
    }

    let state = if bg {
        JobState::Background
    } else {
        JobState::Foreground
    };
    let jid = match jobs.add(child, state, cmdline) {
        Ok(jid) => jid,
        Err(err) => {
            debug!(%child, error = %err, "job left untracked");
            println!("{}", err);
            return Ok(());
        }
    };
    debug!(jid, %child, ?state, cmdline, live = jobs.count(), "job launched");

    if bg {
        drop(jobs);
        println!("[{}] ({}) {}", jid, child, cmdline);
        Ok(())
    } else {
        wait_fg(jobs, child)
    }
}

/// Runs in the forked child. Never returns.
fn exec_child(args: &[CString], not_found: &[u8], status_wr: &OwnedFd, mask: &SigSet) -> ! {
    // A group of its own keeps terminal-generated signals away from the job;
    // the shell relays them instead.
    let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
    // Keyboard signals sent to the shell's group before the setpgid are still
    // pending here; ignoring them discards them before the mask comes off.
    signals::discard_keyboard_signals();
    signals::restore_default_handlers();
    let _ = nix_signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(mask), None);

    let err = match unistd::execvp(&args[0], args) {
        Ok(never) => match never {},
        Err(err) => err,
    };
    let _ = unistd::write(io::stderr(), not_found);
    let _ = unistd::write(status_wr, &(err as i32).to_ne_bytes());
    // SAFETY: _exit skips the atexit handlers and buffers inherited from the shell.
    unsafe { libc::_exit(0) }
}

/// The status pipe is close-on-exec: EOF means the child image was replaced,
/// an errno payload means exec failed.
fn exec_succeeded(status_rd: OwnedFd, child: Pid) -> bool {
    let mut report = Vec::new();
    match File::from(status_rd).read_to_end(&mut report) {
        Ok(_) if report.is_empty() => true,
        Ok(_) => {
            let errno = report
                .get(..4)
                .and_then(|raw| <[u8; 4]>::try_from(raw).ok())
                .map(i32::from_ne_bytes);
            debug!(%child, ?errno, "exec failed");
            false
        }
        Err(err) => {
            debug!(%child, error = %err, "exec status unreadable, assuming the command started");
            true
        }
    }
}

/// Blocks until `pid` is no longer the foreground job, then reports how it
/// left the foreground.
///
/// Takes the job list guard so the transition cannot slip in between the
/// caller's state change and the first check.
pub fn wait_fg(mut jobs: SignalGuard<'_, JobList>, pid: Pid) -> Result<(), ShellError> {
    if jobs.foreground_pid().is_none() {
        return Ok(());
    }
    let Some(jid) = jobs.find_by_pid(pid).map(|job| job.jid) else {
        return Ok(());
    };

    while jobs.foreground_pid() == Some(pid) {
        jobs.suspend();
    }
    let outcome = jobs.foreground_outcome(pid);
    drop(jobs);

    debug!(jid, %pid, ?outcome, "foreground job done");
    match outcome {
        Some(Transition::Stopped(signal)) => {
            println!("Job [{}] ({}) is stopped by signal {}", jid, pid, signal as i32);
        }
        Some(Transition::Terminated(signal)) => {
            println!("Job [{}] ({}) is terminated by signal {}", jid, pid, signal as i32);
        }
        Some(Transition::Exited) | None => {}
    }
    Ok(())
}
