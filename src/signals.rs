use crate::error::ShellError;
use crate::jobs::JOB_LIST;
use crate::utils;
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{self, killpg, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};
use once_cell::sync::Lazy;
use signal_hook::consts::signal::SIGQUIT;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, Ordering};

/// Signals whose handlers read or write the job list.
static JOB_CONTROL_SIGNALS: Lazy<SigSet> = Lazy::new(|| {
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTSTP);
    set
});

/// Shared state guarded by blocking the job-control signals instead of a lock.
///
/// The main flow reaches the value only through [`SignalMutex::lock`], which
/// keeps SIGCHLD, SIGINT and SIGTSTP blocked for the lifetime of the guard.
/// The handlers for those signals are installed with the same set as their
/// `sa_mask`, so they never nest with each other either.
pub struct SignalMutex<T> {
    held: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: the shell is single threaded; exclusion between the main flow and
// the handlers comes from the signal mask.
unsafe impl<T: Send> Sync for SignalMutex<T> {}

impl<T> SignalMutex<T> {
    pub const fn new(value: T) -> Self {
        SignalMutex {
            held: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Blocks the job-control signals and returns a guard to the value.
    /// Must not be nested.
    pub fn lock(&self) -> Result<SignalGuard<'_, T>, ShellError> {
        let mut prev = SigSet::empty();
        signal::sigprocmask(
            SigmaskHow::SIG_BLOCK,
            Some(&*JOB_CONTROL_SIGNALS),
            Some(&mut prev),
        )
        .map_err(ShellError::SignalMask)?;
        let nested = self.held.swap(true, Ordering::Acquire);
        debug_assert!(!nested, "signal mutex locked twice");
        Ok(SignalGuard { mutex: self, prev })
    }

    /// Access from a job-control signal handler.
    ///
    /// # Safety
    ///
    /// The caller must be a handler installed by this module, whose `sa_mask`
    /// blocks every other job-control handler. The main flow holds no
    /// reference outside a [`SignalGuard`], and while a guard is alive these
    /// handlers cannot run.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn handler_access(&self) -> &mut T {
        &mut *self.value.get()
    }
}

/// Keeps the job-control signals blocked; restores the previous mask on drop.
pub struct SignalGuard<'a, T> {
    mutex: &'a SignalMutex<T>,
    prev: SigSet,
}

impl<T> SignalGuard<'_, T> {
    /// The signal mask that was in effect before the guard was taken.
    pub fn saved_mask(&self) -> &SigSet {
        &self.prev
    }

    /// Atomically restores the saved mask and sleeps until a signal handler
    /// has run, then blocks the job-control signals again.
    pub fn suspend(&mut self) {
        // SAFETY: `prev` is a valid, initialized sigset_t. sigsuspend always
        // returns -1/EINTR after a handler ran.
        unsafe {
            libc::sigsuspend(self.prev.as_ref());
        }
    }
}

impl<T> Deref for SignalGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: handlers are blocked while the guard lives.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for SignalGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and `&mut self` makes this the only reference.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for SignalGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.held.store(false, Ordering::Release);
        if let Err(err) = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.prev), None) {
            utils::fatal(ShellError::SignalMask(err));
        }
    }
}

/// Installs the shell's handlers:
/// - SIGCHLD: reap every child that exited or stopped.
/// - SIGINT (ctrl-c) and SIGTSTP (ctrl-z): relay to the foreground job.
/// - SIGQUIT: print a termination message and exit.
pub fn install_signal_handlers() -> Result<(), ShellError> {
    install(Signal::SIGINT, sigint_handler)?;
    install(Signal::SIGTSTP, sigtstp_handler)?;
    install(Signal::SIGCHLD, sigchld_handler)?;

    // SAFETY: the action only calls write(2) and _exit(2).
    unsafe { signal_hook::low_level::register(SIGQUIT, sigquit_action) }
        .map_err(ShellError::SignalRegister)?;

    // The mask is inherited across exec; a parent that blocked these would
    // leave the shell deaf to its children.
    let mut inherited = *JOB_CONTROL_SIGNALS;
    inherited.add(Signal::SIGQUIT);
    signal::sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&inherited), None)
        .map_err(ShellError::SignalMask)
}

fn install(signal: Signal, handler: extern "C" fn(libc::c_int)) -> Result<(), ShellError> {
    let action = SigAction::new(
        SigHandler::Handler(handler),
        SaFlags::SA_RESTART,
        *JOB_CONTROL_SIGNALS,
    );
    // SAFETY: the handlers below are async-signal-safe and touch the job list
    // only through `handler_access`.
    unsafe { signal::sigaction(signal, &action) }
        .map(drop)
        .map_err(ShellError::SignalAction)
}

/// Drops any pending SIGINT or SIGTSTP of a forked child. Setting a signal to
/// SIG_IGN discards its pending instances even while it is blocked.
pub fn discard_keyboard_signals() {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    for signal in [Signal::SIGINT, Signal::SIGTSTP] {
        // SAFETY: SIG_IGN runs no handler code.
        let _ = unsafe { signal::sigaction(signal, &ignore) };
    }
}

/// Resets the dispositions the shell changed, for a forked child before exec.
pub fn restore_default_handlers() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for signal in [
        Signal::SIGINT,
        Signal::SIGTSTP,
        Signal::SIGCHLD,
        Signal::SIGQUIT,
    ] {
        // SAFETY: installing SIG_DFL has no handler code to be unsafe.
        let _ = unsafe { signal::sigaction(signal, &default) };
    }
}

/// Reaps all available zombie or stopped children without waiting for any
/// running child.
extern "C" fn sigchld_handler(_: libc::c_int) {
    let saved = Errno::last_raw();
    // SAFETY: installed with JOB_CONTROL_SIGNALS as its mask.
    let jobs = unsafe { JOB_LIST.handler_access() };
    loop {
        match waitpid(
            Pid::from_raw(-1),
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
        ) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(status) => jobs.reconcile(status),
        }
    }
    Errno::set_raw(saved);
}

extern "C" fn sigint_handler(_: libc::c_int) {
    relay(Signal::SIGINT);
}

extern "C" fn sigtstp_handler(_: libc::c_int) {
    relay(Signal::SIGTSTP);
}

/// Forwards a keyboard signal to the foreground job's whole process group.
/// Without a foreground job the signal is absorbed.
fn relay(signal: Signal) {
    let saved = Errno::last_raw();
    // SAFETY: only called from handlers installed with JOB_CONTROL_SIGNALS.
    let jobs = unsafe { JOB_LIST.handler_access() };
    if let Some(pid) = jobs.foreground_pid() {
        let _ = killpg(pid, signal);
    }
    Errno::set_raw(saved);
}

fn sigquit_action() {
    // SAFETY: fd 1 stays open for the life of the shell.
    let stdout = unsafe { BorrowedFd::borrow_raw(libc::STDOUT_FILENO) };
    let _ = unistd::write(stdout, b"Terminating after receipt of SIGQUIT signal\n");
    signal_hook::low_level::exit(1);
}
