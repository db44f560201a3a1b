//! OS-level termination by process identifier.
//!
//! `terminate` asks politely (SIGTERM). `force_kill` is the fallback for
//! children that ignore it: it kills the direct children of the process first,
//! then the process itself. Grandchildren are not chased.

use nodebase_core::{NodebaseError, NodebaseResult};
use tracing::debug;

#[cfg(unix)]
fn send(pid: u32, signal: nix::sys::signal::Signal) -> NodebaseResult<()> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), signal).map_err(|e| NodebaseError::Io(e.into()))
}

/// Request graceful termination.
#[cfg(unix)]
pub fn terminate(pid: u32) -> NodebaseResult<()> {
    send(pid, nix::sys::signal::Signal::SIGTERM)
}

/// Kill the direct children of `pid`, then `pid` itself.
#[cfg(unix)]
pub fn force_kill(pid: u32) -> NodebaseResult<()> {
    use nix::sys::signal::Signal;

    for child in child_pids(pid) {
        debug!(pid = child, parent = pid, "killing child process");
        let _ = send(child, Signal::SIGKILL);
    }
    send(pid, Signal::SIGKILL)
}

/// Whether a process with this identifier exists (zombies included).
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
pub fn terminate(pid: u32) -> NodebaseResult<()> {
    taskkill(pid, false)
}

#[cfg(not(unix))]
pub fn force_kill(pid: u32) -> NodebaseResult<()> {
    taskkill(pid, true)
}

#[cfg(not(unix))]
pub fn is_alive(pid: u32) -> bool {
    std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn taskkill(pid: u32, force: bool) -> NodebaseResult<()> {
    let pid_str = pid.to_string();
    let mut args = vec!["/PID", pid_str.as_str(), "/T"];
    if force {
        args.push("/F");
    }
    let status = std::process::Command::new("taskkill").args(&args).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(NodebaseError::Other(format!("taskkill exited with {status}")))
    }
}

/// Direct children of `pid`, found by parent PID in `/proc`.
#[cfg(target_os = "linux")]
pub fn child_pids(pid: u32) -> Vec<u32> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter(|candidate| parent_pid(*candidate) == Some(pid))
        .collect()
}

#[cfg(not(target_os = "linux"))]
pub fn child_pids(_pid: u32) -> Vec<u32> {
    Vec::new()
}

/// Parent PID from `/proc/<pid>/stat`. The command name may contain spaces
/// and parentheses, so fields are read after the last `)`.
#[cfg(target_os = "linux")]
fn parent_pid(pid: u32) -> Option<u32> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_stat_ppid(&stat)
}

#[cfg(target_os = "linux")]
fn parse_stat_ppid(stat: &str) -> Option<u32> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    after_comm.split_whitespace().nth(1)?.parse().ok()
}
