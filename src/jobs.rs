use crate::signals::SignalMutex;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use std::fmt;
use thiserror::Error;

/// Maximum number of jobs tracked at any point in time.
pub const MAXJOBS: usize = 16;
/// Maximum stored length of a job's command line, in bytes.
pub const MAXLINE: usize = 1024;

/// The process-wide job list, shared between the command loop and the
/// job-control signal handlers.
pub static JOB_LIST: SignalMutex<JobList> = SignalMutex::new(JobList::new());

/// Represents the state of a job.
///
/// Transitions: FG -> ST on ctrl-z, ST -> FG and BG -> FG on `fg`,
/// ST -> BG on `bg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Undefined,
    Foreground,
    Background,
    Stopped,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Undefined => "Undefined",
            JobState::Foreground => "Foreground",
            JobState::Background => "Running",
            JobState::Stopped => "Stopped",
        }
    }
}

/// How the foreground job left the foreground, as seen by the reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Exited,
    Terminated(Signal),
    Stopped(Signal),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobTableError {
    #[error("invalid pid {0}")]
    InvalidPid(Pid),
    #[error("Tried to create too many jobs")]
    Full,
    #[error("({pid}): cannot run in foreground while ({holder}) holds it")]
    ForegroundTaken { pid: Pid, holder: Pid },
    #[error("({0}): No such process")]
    NoSuchProcess(Pid),
}

/// Command line text stored inline, so clearing a slot from the reaper never
/// touches the allocator.
#[derive(Clone, Copy)]
struct CmdLine {
    buf: [u8; MAXLINE],
    len: usize,
}

impl CmdLine {
    const EMPTY: CmdLine = CmdLine {
        buf: [0; MAXLINE],
        len: 0,
    };

    fn new(text: &str) -> Self {
        let mut len = text.len().min(MAXLINE);
        while !text.is_char_boundary(len) {
            len -= 1;
        }
        let mut buf = [0; MAXLINE];
        buf[..len].copy_from_slice(&text.as_bytes()[..len]);
        CmdLine { buf, len }
    }

    fn as_str(&self) -> &str {
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }
}

impl fmt::Debug for CmdLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

/// Represents a job in the shell.
#[derive(Debug, Clone, Copy)]
pub struct Job {
    pub pid: Pid,
    pub jid: u32,
    pub state: JobState,
    cmdline: CmdLine,
}

impl Job {
    const EMPTY: Job = Job {
        pid: Pid::from_raw(0),
        jid: 0,
        state: JobState::Undefined,
        cmdline: CmdLine::EMPTY,
    };

    /// The command line the job was launched with.
    pub fn cmdline(&self) -> &str {
        self.cmdline.as_str()
    }

    fn is_empty(&self) -> bool {
        self.pid.as_raw() == 0
    }
}

/// Formats the job the way the `jobs` built-in lists it.
impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] ({}) {} {}",
            self.jid,
            self.pid,
            self.state.as_str(),
            self.cmdline()
        )
    }
}

/// Fixed-capacity job table. Slots are scanned linearly; an empty slot has
/// pid 0 and state `Undefined`.
pub struct JobList {
    slots: [Job; MAXJOBS],
    next_jid: u32,
    fg_outcome: Option<(Pid, Transition)>,
    verbose: bool,
}

impl JobList {
    /// Creates a new, empty job list.
    pub const fn new() -> Self {
        JobList {
            slots: [Job::EMPTY; MAXJOBS],
            next_jid: 1,
            fg_outcome: None,
            verbose: false,
        }
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Adds a new job and returns its job ID.
    pub fn add(&mut self, pid: Pid, state: JobState, cmdline: &str) -> Result<u32, JobTableError> {
        if pid.as_raw() < 1 {
            return Err(JobTableError::InvalidPid(pid));
        }
        if state == JobState::Foreground {
            if let Some(holder) = self.foreground_pid() {
                return Err(JobTableError::ForegroundTaken { pid, holder });
            }
        }
        let jid = self.next_jid;
        let slot = self
            .slots
            .iter_mut()
            .find(|job| job.is_empty())
            .ok_or(JobTableError::Full)?;
        *slot = Job {
            pid,
            jid,
            state,
            cmdline: CmdLine::new(cmdline),
        };
        self.next_jid += 1;
        if self.verbose {
            println!("Added job [{}] {} {}", jid, pid, slot.cmdline());
        }
        Ok(jid)
    }

    /// Deletes the job with the given pid. Safe to call from the reaper.
    pub fn remove(&mut self, pid: Pid) -> bool {
        if pid.as_raw() < 1 {
            return false;
        }
        match self.find_by_pid_mut(pid) {
            Some(slot) => {
                *slot = Job::EMPTY;
                self.next_jid = self.max_job_id() + 1;
                true
            }
            None => false,
        }
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        if pid.as_raw() < 1 {
            return None;
        }
        self.slots.iter().find(|job| job.pid == pid)
    }

    fn find_by_pid_mut(&mut self, pid: Pid) -> Option<&mut Job> {
        if pid.as_raw() < 1 {
            return None;
        }
        self.slots.iter_mut().find(|job| job.pid == pid)
    }

    pub fn find_by_job_id(&self, jid: u32) -> Option<&Job> {
        if jid < 1 {
            return None;
        }
        self.slots.iter().find(|job| job.jid == jid)
    }

    /// Returns the process ID of the foreground job, if any.
    pub fn foreground_pid(&self) -> Option<Pid> {
        self.slots
            .iter()
            .find(|job| job.state == JobState::Foreground)
            .map(|job| job.pid)
    }

    /// Returns the largest job ID currently allocated, 0 when empty.
    pub fn max_job_id(&self) -> u32 {
        self.slots.iter().map(|job| job.jid).max().unwrap_or(0)
    }

    /// Live jobs in table order.
    pub fn list(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().filter(|job| !job.is_empty())
    }

    /// Number of live jobs.
    pub fn count(&self) -> usize {
        self.list().count()
    }

    /// Moves a job to a new state, refusing a second foreground job.
    pub fn set_state(&mut self, pid: Pid, state: JobState) -> Result<(), JobTableError> {
        if state == JobState::Foreground {
            if let Some(holder) = self.foreground_pid().filter(|&holder| holder != pid) {
                return Err(JobTableError::ForegroundTaken { pid, holder });
            }
        }
        let job = self
            .find_by_pid_mut(pid)
            .ok_or(JobTableError::NoSuchProcess(pid))?;
        job.state = state;
        Ok(())
    }

    /// Applies one child status change reported by `waitpid`.
    ///
    /// Runs inside the SIGCHLD handler: no allocation, no output.
    pub fn reconcile(&mut self, status: WaitStatus) {
        let (pid, transition) = match status {
            WaitStatus::Stopped(pid, signal) => (pid, Transition::Stopped(signal)),
            WaitStatus::Signaled(pid, Signal::SIGINT, _) => {
                (pid, Transition::Terminated(Signal::SIGINT))
            }
            WaitStatus::Exited(pid, _) | WaitStatus::Signaled(pid, _, _) => {
                (pid, Transition::Exited)
            }
            _ => return,
        };

        let was_foreground = self
            .find_by_pid(pid)
            .is_some_and(|job| job.state == JobState::Foreground);

        match transition {
            Transition::Stopped(_) => {
                if let Some(job) = self.find_by_pid_mut(pid) {
                    job.state = JobState::Stopped;
                }
            }
            Transition::Terminated(_) | Transition::Exited => {
                self.remove(pid);
            }
        }

        if was_foreground {
            self.fg_outcome = Some((pid, transition));
        }
    }

    /// The transition that most recently took `pid` out of the foreground.
    pub fn foreground_outcome(&self, pid: Pid) -> Option<Transition> {
        self.fg_outcome
            .filter(|&(outcome_pid, _)| outcome_pid == pid)
            .map(|(_, transition)| transition)
    }
}
