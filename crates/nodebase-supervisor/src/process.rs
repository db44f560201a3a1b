//! A single supervised child process.
//!
//! A `ManagedProcess` moves through `Born -> Ready -> Running -> Dead` exactly
//! once. The spawn and the wait for exit run on a dedicated tokio task, so
//! neither blocks whoever asked for the launch. Once `Dead` the object is never
//! relaunched; a restart builds a successor with the same name, argv and
//! observer.

use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::observer::ProcessObserver;
use crate::signal;

/// Lifecycle state. Ordering follows the lifecycle, and state only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessState {
    Born,
    Ready,
    Running,
    Dead,
}

/// Creates OS processes from an argv.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, argv: &[String]) -> std::io::Result<Child>;
}

/// Spawns with `tokio::process::Command`.
///
/// stdin is always closed. stdout/stderr are inherited unless `quiet`.
#[derive(Debug, Clone, Default)]
pub struct TokioSpawner {
    pub quiet: bool,
}

impl TokioSpawner {
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

impl ProcessSpawner for TokioSpawner {
    fn spawn(&self, argv: &[String]) -> std::io::Result<Child> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null());
        if self.quiet {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        cmd.spawn()
    }
}

struct Inner {
    state: ProcessState,
    pid: Option<u32>,
    exited: bool,
    kill_timer: Option<JoinHandle<()>>,
}

/// A named, supervised OS process.
pub struct ManagedProcess {
    name: String,
    argv: Vec<String>,
    observer: Option<Arc<dyn ProcessObserver>>,
    inner: Mutex<Inner>,
}

impl ManagedProcess {
    pub fn new(
        name: impl Into<String>,
        argv: Vec<String>,
        observer: Option<Arc<dyn ProcessObserver>>,
    ) -> Self {
        Self {
            name: name.into(),
            argv,
            observer,
            inner: Mutex::new(Inner {
                state: ProcessState::Born,
                pid: None,
                exited: false,
                kill_timer: None,
            }),
        }
    }

    /// A fresh `Born` process with the same name, argv and observer.
    pub fn successor(&self) -> Self {
        Self::new(self.name.clone(), self.argv.clone(), self.observer.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn observer(&self) -> Option<&Arc<dyn ProcessObserver>> {
        self.observer.as_ref()
    }

    pub fn state(&self) -> ProcessState {
        self.lock().state
    }

    pub fn is_dead(&self) -> bool {
        self.state() == ProcessState::Dead
    }

    /// Native process identifier, available only while `Running`.
    pub fn pid(&self) -> Option<u32> {
        let inner = self.lock();
        match inner.state {
            ProcessState::Running => inner.pid,
            _ => None,
        }
    }

    /// Whether the OS process was spawned and has not been reaped yet.
    pub fn is_alive(&self) -> bool {
        let inner = self.lock();
        inner.pid.is_some() && !inner.exited
    }

    /// Whether the OS process was spawned and has since been reaped.
    pub fn has_exited(&self) -> bool {
        self.lock().exited
    }

    /// Launch on a dedicated task. Returns the task handle; the caller may drop it.
    pub fn launch(self: &Arc<Self>, spawner: Arc<dyn ProcessSpawner>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.supervise(spawner).await })
    }

    /// Request graceful termination and arm the forced-kill fallback.
    ///
    /// The process is `Dead` as soon as this returns. Returns `false` if it
    /// already was. If the OS process is still alive after `grace`, it and its
    /// direct children are killed by PID.
    pub fn stop(self: &Arc<Self>, grace: Duration) -> bool {
        let pid = {
            let mut inner = self.lock();
            let previous = inner.state;
            if previous == ProcessState::Dead {
                return false;
            }
            // Before Running there is no OS process yet; the launch task sees
            // Dead and backs off on its own.
            inner.state = ProcessState::Dead;
            match previous {
                ProcessState::Running => inner.pid,
                _ => None,
            }
        };

        let Some(pid) = pid else {
            debug!(name = %self.name, "stopped before running");
            return true;
        };

        info!(name = %self.name, pid, "stopping process");
        if let Err(e) = signal::terminate(pid) {
            warn!(name = %self.name, pid, error = %e, "graceful termination failed");
        }

        let this = Arc::clone(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if this.is_alive() {
                warn!(name = %this.name, pid, "still alive after grace period, killing");
                if let Err(e) = signal::force_kill(pid) {
                    warn!(name = %this.name, pid, error = %e, "forced kill failed");
                }
            }
        });

        let mut inner = self.lock();
        if inner.exited {
            timer.abort();
        } else {
            inner.kill_timer = Some(timer);
        }
        true
    }

    async fn supervise(self: Arc<Self>, spawner: Arc<dyn ProcessSpawner>) {
        if !self.advance(ProcessState::Ready) {
            debug!(name = %self.name, "stopped before launch");
            return;
        }
        self.notify(|o| o.before(&self.name, &self.argv));
        info!(name = %self.name, argv = ?self.argv, "starting process");

        let mut child = match spawner.spawn(&self.argv) {
            Ok(child) => child,
            Err(e) => {
                warn!(name = %self.name, error = %e, "spawn failed");
                self.lock().state = ProcessState::Dead;
                let reason = e.to_string();
                self.notify(|o| o.error(&self.name, &self.argv, None, &reason));
                self.notify(|o| o.after(&self.name, &self.argv, None, None));
                return;
            }
        };

        let pid = child.id();
        let running = {
            let mut inner = self.lock();
            inner.pid = pid;
            if inner.state == ProcessState::Dead {
                false
            } else {
                inner.state = ProcessState::Running;
                true
            }
        };

        if running {
            info!(name = %self.name, pid = ?pid, "process running");
            if let Some(pid) = pid {
                self.notify(|o| o.started(&self.name, &self.argv, pid));
            }
        } else {
            warn!(name = %self.name, pid = ?pid, "stopped while spawning, killing");
            if let Err(e) = child.start_kill() {
                warn!(name = %self.name, pid = ?pid, error = %e, "kill after late spawn failed");
            }
        }

        let result = child.wait().await;

        {
            let mut inner = self.lock();
            inner.state = ProcessState::Dead;
            inner.exited = true;
            if let Some(timer) = inner.kill_timer.take() {
                timer.abort();
            }
        }

        match result {
            Ok(status) => {
                info!(name = %self.name, pid = ?pid, status = %status, "process exited");
                self.notify(|o| o.after(&self.name, &self.argv, pid, status.code()));
            }
            Err(e) => {
                warn!(name = %self.name, pid = ?pid, error = %e, "wait failed");
                let reason = e.to_string();
                self.notify(|o| o.error(&self.name, &self.argv, pid, &reason));
                self.notify(|o| o.after(&self.name, &self.argv, pid, None));
            }
        }
    }

    /// Move forward to `to`. Returns `false` if the process is already there or past it.
    fn advance(&self, to: ProcessState) -> bool {
        let mut inner = self.lock();
        if inner.state < to {
            inner.state = to;
            true
        } else {
            false
        }
    }

    fn notify(&self, f: impl FnOnce(&dyn ProcessObserver)) {
        if let Some(observer) = &self.observer {
            f(observer.as_ref());
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("name", &self.name)
            .field("argv", &self.argv)
            .field("state", &self.state())
            .finish()
    }
}
