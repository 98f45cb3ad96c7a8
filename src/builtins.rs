use crate::error::ShellError;
use crate::exec::wait_fg;
use crate::jobs::{Job, JobList, JobState, JobTableError, JOB_LIST};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::debug;

/// User errors from `bg` and `fg`. None of them stop the shell.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BgFgError {
    #[error("{0} command requires PID or %jobid argument")]
    MissingArgument(String),
    #[error("{0}: argument must be a PID or %jobid")]
    InvalidArgument(String),
    #[error("%{0}: No such job")]
    NoSuchJob(u32),
    #[error("({0}): No such process")]
    NoSuchProcess(Pid),
    #[error("[{jid}] ({pid}): already in foreground")]
    AlreadyForeground { jid: u32, pid: Pid },
    #[error("[{jid}] ({pid}): already running in background")]
    AlreadyBackground { jid: u32, pid: Pid },
    #[error(transparent)]
    Table(#[from] JobTableError),
}

/// The argument of `bg`/`fg`: `%jid` or a bare pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTarget {
    Job(u32),
    Process(Pid),
}

impl JobTarget {
    pub fn parse(cmd: &str, arg: &str) -> Result<Self, BgFgError> {
        let invalid = || BgFgError::InvalidArgument(cmd.to_string());
        match arg.strip_prefix('%') {
            Some(jid) => match jid.parse::<u32>() {
                Ok(jid) if jid > 0 => Ok(JobTarget::Job(jid)),
                _ => Err(invalid()),
            },
            None => match arg.parse::<i32>() {
                Ok(pid) if pid > 0 => Ok(JobTarget::Process(Pid::from_raw(pid))),
                _ => Err(invalid()),
            },
        }
    }
}

/// Checks if the command is a built-in command and, if so, executes it.
/// Supported built-ins are "quit", "jobs", "bg" and "fg".
/// Returns true if the command was built-in and handled; false otherwise.
pub fn handle_builtin(argv: &[String]) -> Result<bool, ShellError> {
    let Some(name) = argv.first() else {
        return Ok(false);
    };
    match name.as_str() {
        "quit" => std::process::exit(0),
        "jobs" => {
            let jl = JOB_LIST.lock()?;
            for job in jl.list() {
                println!("{}", job);
            }
            Ok(true)
        }
        "bg" | "fg" => {
            do_bgfg(argv)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Executes the built-in `bg` and `fg` commands.
pub fn do_bgfg(argv: &[String]) -> Result<(), ShellError> {
    let mut jobs = JOB_LIST.lock()?;
    let job = match switch_state(&mut jobs, argv) {
        Ok(job) => job,
        Err(err) => {
            drop(jobs);
            eprintln!("{}", err);
            return Ok(());
        }
    };
    debug!(jid = job.jid, pid = %job.pid, state = ?job.state, "resuming job");

    if job.state == JobState::Foreground {
        continue_group(job.pid);
        wait_fg(jobs, job.pid)
    } else {
        println!("[{}] ({}) {}", job.jid, job.pid, job.cmdline());
        continue_group(job.pid);
        Ok(())
    }
}

/// Resolves the target of `argv` and moves it to the state the command asks
/// for. Returns a copy of the updated job.
fn switch_state(jobs: &mut JobList, argv: &[String]) -> Result<Job, BgFgError> {
    let cmd = argv.first().map(String::as_str).unwrap_or("fg");
    let arg = argv
        .get(1)
        .ok_or_else(|| BgFgError::MissingArgument(cmd.to_string()))?;

    let job = match JobTarget::parse(cmd, arg)? {
        JobTarget::Job(jid) => jobs.find_by_job_id(jid).ok_or(BgFgError::NoSuchJob(jid))?,
        JobTarget::Process(pid) => jobs
            .find_by_pid(pid)
            .ok_or(BgFgError::NoSuchProcess(pid))?,
    };
    let (jid, pid) = (job.jid, job.pid);

    let wanted = if cmd == "fg" {
        JobState::Foreground
    } else {
        JobState::Background
    };
    match (wanted, job.state) {
        (JobState::Foreground, JobState::Foreground) => {
            return Err(BgFgError::AlreadyForeground { jid, pid })
        }
        (JobState::Background, JobState::Background) => {
            return Err(BgFgError::AlreadyBackground { jid, pid })
        }
        _ => {}
    }

    jobs.set_state(pid, wanted)?;
    jobs.find_by_pid(pid)
        .copied()
        .ok_or(BgFgError::NoSuchProcess(pid))
}

fn continue_group(pid: Pid) {
    if let Err(err) = killpg(pid, Signal::SIGCONT) {
        debug!(%pid, error = %err, "failed to continue job");
    }
}
