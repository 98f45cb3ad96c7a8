//! End-to-end job control scenarios: the shell runs without a prompt, reads a
//! script from stdin and everything it prints is collected from stdout.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const TSH: &str = env!("CARGO_BIN_EXE_tsh");
const MYSPIN: &str = env!("CARGO_BIN_EXE_myspin");
const MYINT: &str = env!("CARGO_BIN_EXE_myint");
const MYSTOP: &str = env!("CARGO_BIN_EXE_mystop");
const MYSPLIT: &str = env!("CARGO_BIN_EXE_mysplit");

/// Time for the shell to start up or for a job to be launched.
const SETTLE: Duration = Duration::from_millis(700);

fn spawn_shell() -> Child {
    Command::new(TSH)
        .arg("-p")
        .env_remove("TSH_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn tsh")
}

fn send(shell: &mut Child, line: &str) {
    let stdin = shell.stdin.as_mut().expect("stdin is piped");
    writeln!(stdin, "{}", line).expect("write to tsh");
    stdin.flush().expect("flush tsh stdin");
}

fn signal_shell(shell: &Child, signal: Signal) {
    kill(Pid::from_raw(shell.id() as i32), signal).expect("signal tsh");
}

/// Closes stdin (end-of-file makes the shell exit) and collects the output.
fn finish(mut shell: Child) -> (String, ExitStatus) {
    drop(shell.stdin.take());
    let output = shell.wait_with_output().expect("wait for tsh");
    (
        String::from_utf8_lossy(&output.stdout).into_owned(),
        output.status,
    )
}

fn run_script(lines: &[String]) -> (String, ExitStatus) {
    let mut shell = spawn_shell();
    for line in lines {
        send(&mut shell, line);
    }
    finish(shell)
}

/// Pulls the pid out of the first `Job [jid] (pid) ...` report.
fn reported_pid(output: &str, jid: u32) -> String {
    let prefix = format!("Job [{}] (", jid);
    let start = output.find(&prefix).expect("job report") + prefix.len();
    let end = output[start..].find(')').expect("closing paren") + start;
    output[start..end].to_string()
}

#[test]
fn test_quit_exits_zero() {
    let (output, status) = run_script(&["quit".to_string(), "jobs".to_string()]);
    assert!(status.success());
    assert!(output.is_empty(), "{output}");
}

#[test]
fn test_bad_flag_prints_usage() {
    let output = Command::new(TSH).arg("-x").output().expect("run tsh");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage: shell [-hvp]"));
}

#[test]
fn test_help_flag_prints_usage() {
    let output = Command::new(TSH).args(["-v", "-h"]).output().expect("run tsh");
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Usage: shell [-hvp]"), "{stdout}");
    assert!(stdout.contains("-p   do not emit a command prompt"), "{stdout}");
}

#[test]
fn test_unknown_command_is_not_registered() {
    let (output, status) = run_script(&[
        "no-such-command-for-tsh arg".to_string(),
        "jobs".to_string(),
    ]);
    assert!(status.success());
    assert!(output.contains("no-such-command-for-tsh: Command not found"), "{output}");
    assert!(!output.contains("[1]"), "{output}");
}

#[test]
fn test_background_job_is_listed_running() {
    let (output, status) = run_script(&["sleep 1 &".to_string(), "jobs".to_string()]);
    assert!(status.success());
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2, "{output}");
    assert!(lines[0].starts_with("[1] ("), "{output}");
    assert!(lines[0].ends_with(") sleep 1 &"), "{output}");
    assert!(lines[1].ends_with(") Running sleep 1 &"), "{output}");
}

#[test]
fn test_background_job_is_reaped_without_user_action() {
    let mut shell = spawn_shell();
    send(&mut shell, &format!("{} 1 &", MYSPIN));
    thread::sleep(Duration::from_millis(2000));
    send(&mut shell, "jobs");
    let (output, _) = finish(shell);
    assert_eq!(output.lines().count(), 1, "{output}");
    assert!(!output.contains("Running"), "{output}");
}

#[test]
fn test_foreground_interrupted_by_itself() {
    let (output, _) = run_script(&[format!("{} 1", MYINT), "jobs".to_string()]);
    assert!(output.contains("is terminated by signal 2"), "{output}");
    assert!(!output.contains("Foreground"), "{output}");
}

#[test]
fn test_foreground_stopped_then_listed() {
    let (output, _) = run_script(&[format!("{} 1", MYSTOP), "jobs".to_string()]);
    let pid = reported_pid(&output, 1);
    assert!(
        output.contains(&format!("Job [1] ({}) is stopped by signal 20", pid)),
        "{output}"
    );
    assert!(
        output.contains(&format!("[1] ({}) Stopped {} 1", pid, MYSTOP)),
        "{output}"
    );
}

#[test]
fn test_fg_resumes_stopped_job_until_exit() {
    let (output, _) = run_script(&[
        format!("{} 1", MYSTOP),
        "fg %1".to_string(),
        "jobs".to_string(),
    ]);
    assert_eq!(output.matches("is stopped by signal").count(), 1, "{output}");
    assert!(!output.contains("Stopped"), "{output}");
    assert!(!output.contains("Foreground"), "{output}");
}

#[test]
fn test_bg_resumes_stopped_job_with_one_ack() {
    let (output, _) = run_script(&[format!("{} 1", MYSTOP), "bg %1".to_string()]);
    let pid = reported_pid(&output, 1);
    let ack = format!("[1] ({}) {} 1", pid, MYSTOP);
    assert_eq!(output.lines().filter(|line| *line == ack).count(), 1, "{output}");
}

#[test]
fn test_bgfg_user_errors() {
    let (output, status) = run_script(&[
        "fg".to_string(),
        "bg %7".to_string(),
        "fg 99999".to_string(),
        "bg nope".to_string(),
    ]);
    assert!(status.success());
    assert!(output.contains("fg command requires PID or %jobid argument"), "{output}");
    assert!(output.contains("%7: No such job"), "{output}");
    assert!(output.contains("(99999): No such process"), "{output}");
    assert!(output.contains("bg: argument must be a PID or %jobid"), "{output}");
}

#[test]
fn test_keyboard_interrupt_reaches_whole_group() {
    let mut shell = spawn_shell();
    send(&mut shell, &format!("{} 5", MYSPLIT));
    thread::sleep(SETTLE);
    signal_shell(&shell, Signal::SIGINT);
    send(&mut shell, "jobs");
    let (output, status) = finish(shell);
    assert!(status.success());
    assert!(output.contains("is terminated by signal 2"), "{output}");
    assert!(!output.contains("Foreground"), "{output}");
}

#[test]
fn test_keyboard_stop_on_foreground_job() {
    let mut shell = spawn_shell();
    send(&mut shell, &format!("{} 5", MYSPIN));
    thread::sleep(SETTLE);
    signal_shell(&shell, Signal::SIGTSTP);
    send(&mut shell, "jobs");
    let (output, _) = finish(shell);
    assert!(output.contains("is stopped by signal 20"), "{output}");
    assert!(output.contains(&format!("Stopped {} 5", MYSPIN)), "{output}");
}

#[test]
fn test_keyboard_interrupt_without_foreground_job_is_absorbed() {
    let mut shell = spawn_shell();
    send(&mut shell, &format!("{} 3 &", MYSPIN));
    thread::sleep(SETTLE);
    signal_shell(&shell, Signal::SIGINT);
    thread::sleep(Duration::from_millis(200));
    send(&mut shell, "jobs");
    let (output, status) = finish(shell);
    assert!(status.success());
    assert!(output.contains(&format!("Running {} 3 &", MYSPIN)), "{output}");
    assert!(!output.contains("terminated"), "{output}");
}

#[test]
fn test_job_table_capacity() {
    let mut script: Vec<String> = (0..17).map(|_| "sleep 2 &".to_string()).collect();
    script.push("jobs".to_string());
    let (output, _) = run_script(&script);
    assert_eq!(output.matches("Tried to create too many jobs").count(), 1, "{output}");
    assert_eq!(output.matches(") Running sleep 2 &").count(), 16, "{output}");
}

#[test]
fn test_sigquit_terminates_shell() {
    let shell = spawn_shell();
    thread::sleep(SETTLE);
    signal_shell(&shell, Signal::SIGQUIT);
    thread::sleep(Duration::from_millis(200));
    let output = shell.wait_with_output().expect("wait for tsh");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout)
        .contains("Terminating after receipt of SIGQUIT signal"));
}

#[test]
fn test_keyboard_stop_storm_during_launches_does_not_hang() {
    let mut shell = Command::new(TSH)
        .arg("-p")
        .env_remove("TSH_LOG")
        .process_group(0)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .expect("spawn tsh");
    let group = Pid::from_raw(-(shell.id() as i32));

    let done = Arc::new(AtomicBool::new(false));
    let storm = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                if kill(group, Signal::SIGTSTP).is_err() {
                    break;
                }
                thread::sleep(Duration::from_micros(200));
            }
        })
    };

    let script = "true\n".repeat(1000);
    {
        let mut stdin = shell.stdin.take().expect("stdin is piped");
        stdin.write_all(script.as_bytes()).expect("write to tsh");
    }

    let deadline = Instant::now() + Duration::from_secs(60);
    let status = loop {
        if let Some(status) = shell.try_wait().expect("poll tsh") {
            break Some(status);
        }
        if Instant::now() > deadline {
            break None;
        }
        thread::sleep(Duration::from_millis(50));
    };
    done.store(true, Ordering::Relaxed);
    storm.join().expect("join signal thread");

    if status.is_none() {
        let _ = shell.kill();
        let _ = shell.wait();
    }
    assert!(status.is_some_and(|status| status.success()), "tsh hung while launching");
}
