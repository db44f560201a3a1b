//! Name-keyed registry of managed processes.
//!
//! At most one non-dead process exists per name. Every operation takes the
//! registry lock for its whole read-modify-write, so two concurrent starts of
//! the same name cannot both spawn. Nothing here waits on a child: spawning,
//! waiting and the forced-kill fallback all run on their own tasks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::argv::tokenize;
use crate::config::SupervisorConfig;
use crate::observer::ProcessObserver;
use crate::process::{ManagedProcess, ProcessSpawner, ProcessState};

/// Externally visible status of a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceStatus {
    /// No entry for the name.
    #[serde(rename = "n/a")]
    Absent,
    #[serde(rename = "started")]
    Running,
    #[serde(rename = "stopped")]
    Stopped,
    /// Launch requested but the OS process does not exist yet.
    #[serde(rename = "unknown")]
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "n/a",
            Self::Running => "started",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }

    fn of(state: ProcessState) -> Self {
        match state {
            ProcessState::Running => Self::Running,
            ProcessState::Dead => Self::Stopped,
            ProcessState::Born | ProcessState::Ready => Self::Unknown,
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information returned when listing the registry.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub name: String,
    pub argv: Vec<String>,
    pub status: ServiceStatus,
    pub pid: Option<u32>,
}

/// Owns the `name -> ManagedProcess` mapping.
pub struct ProcessRegistry {
    processes: Arc<RwLock<HashMap<String, Arc<ManagedProcess>>>>,
    spawner: Arc<dyn ProcessSpawner>,
    observer: Option<Arc<dyn ProcessObserver>>,
    config: SupervisorConfig,
}

impl ProcessRegistry {
    /// Create an empty registry.
    pub fn new(config: SupervisorConfig, spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            processes: Arc::new(RwLock::new(HashMap::new())),
            spawner,
            observer: None,
            config,
        }
    }

    /// Observer attached to every process started through [`Self::start`].
    pub fn with_observer(mut self, observer: Arc<dyn ProcessObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Start `command_line` under `name`.
    ///
    /// A no-op if `name` already maps to a live process. Returns once the
    /// process is registered; spawn success or failure reaches the observer.
    pub async fn start(&self, name: &str, command_line: &str) -> bool {
        self.start_argv(name, tokenize(command_line), self.observer.clone())
            .await
    }

    /// Start an already-split argv under `name` with a specific observer.
    pub async fn start_argv(
        &self,
        name: &str,
        argv: Vec<String>,
        observer: Option<Arc<dyn ProcessObserver>>,
    ) -> bool {
        let mut processes = self.processes.write().await;
        if let Some(existing) = processes.get(name) {
            if !existing.is_dead() {
                debug!(name, "already running, start ignored");
                return true;
            }
        }

        let process = Arc::new(ManagedProcess::new(name, argv, observer));
        processes.insert(name.to_string(), Arc::clone(&process));
        process.launch(Arc::clone(&self.spawner));
        info!(name, "process registered");
        true
    }

    /// Stop `name`. A no-op for an absent or already-dead name.
    pub async fn stop(&self, name: &str) -> bool {
        let mut processes = self.processes.write().await;
        let live = processes.get(name).map(|p| !p.is_dead()).unwrap_or(false);
        if !live {
            debug!(name, "nothing to stop");
            return true;
        }
        if let Some(process) = processes.remove(name) {
            process.stop(self.config.grace_period());
            info!(name, "process removed");
        }
        true
    }

    /// Stop `name` and start a successor with the same argv and observer.
    ///
    /// Works on entries whose process already died. A no-op for an absent name.
    pub async fn restart(&self, name: &str) {
        let mut processes = self.processes.write().await;
        let Some(previous) = processes.get(name).cloned() else {
            debug!(name, "nothing to restart");
            return;
        };

        previous.stop(self.config.grace_period());
        let successor = Arc::new(previous.successor());
        processes.insert(name.to_string(), Arc::clone(&successor));
        successor.launch(Arc::clone(&self.spawner));
        info!(name, "process restarted");
    }

    pub async fn status(&self, name: &str) -> ServiceStatus {
        let processes = self.processes.read().await;
        processes
            .get(name)
            .map(|p| ServiceStatus::of(p.state()))
            .unwrap_or(ServiceStatus::Absent)
    }

    /// Stop every registered process.
    ///
    /// Keys are snapshotted first, so entries removed concurrently are skipped.
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.processes.read().await.keys().cloned().collect();
        for name in names {
            self.stop(&name).await;
        }
    }

    /// The process currently registered under `name`.
    pub async fn get(&self, name: &str) -> Option<Arc<ManagedProcess>> {
        self.processes.read().await.get(name).cloned()
    }

    /// All registered processes, sorted by name.
    pub async fn list(&self) -> Vec<ProcessInfo> {
        let processes = self.processes.read().await;
        let mut infos: Vec<ProcessInfo> = processes
            .values()
            .map(|p| ProcessInfo {
                name: p.name().to_string(),
                argv: p.argv().to_vec(),
                status: ServiceStatus::of(p.state()),
                pid: p.pid(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub async fn count(&self) -> usize {
        self.processes.read().await.len()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::observer::{ChannelObserver, LifecycleEvent};
    use crate::process::TokioSpawner;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::process::Child;

    struct CountingSpawner {
        inner: TokioSpawner,
        spawned: AtomicUsize,
    }

    impl ProcessSpawner for CountingSpawner {
        fn spawn(&self, argv: &[String]) -> std::io::Result<Child> {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            self.inner.spawn(argv)
        }
    }

    fn counting() -> Arc<CountingSpawner> {
        Arc::new(CountingSpawner {
            inner: TokioSpawner::quiet(),
            spawned: AtomicUsize::new(0),
        })
    }

    fn registry_with(spawner: Arc<dyn ProcessSpawner>, grace_ms: u64) -> ProcessRegistry {
        ProcessRegistry::new(
            SupervisorConfig::with_grace_period(Duration::from_millis(grace_ms)),
            spawner,
        )
    }

    async fn eventually(mut check: impl FnMut() -> bool, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        check()
    }

    async fn wait_running(registry: &ProcessRegistry, name: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while registry.status(name).await != ServiceStatus::Running {
            assert!(tokio::time::Instant::now() < deadline, "{name} never started");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn status_strings() {
        assert_eq!(ServiceStatus::Absent.as_str(), "n/a");
        assert_eq!(ServiceStatus::Running.to_string(), "started");
        assert_eq!(ServiceStatus::Stopped.as_str(), "stopped");
        assert_eq!(
            serde_json::to_value(ServiceStatus::Unknown).unwrap(),
            serde_json::json!("unknown")
        );
    }

    #[tokio::test]
    async fn start_twice_spawns_once() {
        let spawner = counting();
        let registry = registry_with(spawner.clone(), 1000);

        assert!(registry.start("app", "sleep 30").await);
        assert!(registry.start("app", "sleep 30").await);
        wait_running(&registry, "app").await;
        assert!(registry.start("app", "sleep 30").await);

        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count().await, 1);
        registry.stop("app").await;
    }

    #[tokio::test]
    async fn stop_absent_name_is_noop() {
        let registry = registry_with(counting(), 1000);
        assert!(registry.stop("ghost").await);
        assert_eq!(registry.status("ghost").await, ServiceStatus::Absent);
    }

    #[tokio::test]
    async fn exited_process_reports_stopped_and_stop_is_noop() {
        let registry = registry_with(counting(), 1000);
        registry.start("once", "true").await;
        let process = registry.get("once").await.unwrap();
        assert!(eventually(|| process.has_exited(), Duration::from_secs(5)).await);

        assert_eq!(registry.status("once").await, ServiceStatus::Stopped);
        assert!(registry.stop("once").await);
        assert_eq!(registry.status("once").await, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn spawn_failure_fires_error_then_after() {
        let (observer, mut events) = ChannelObserver::new();
        let registry = registry_with(counting(), 1000).with_observer(Arc::new(observer));

        assert!(registry.start("broken", "/definitely/not/here --flag").await);

        let before = events.recv().await.unwrap();
        assert!(matches!(before, LifecycleEvent::Before { .. }));
        let error = events.recv().await.unwrap();
        assert!(matches!(error, LifecycleEvent::Error { pid: None, .. }));
        let after = events.recv().await.unwrap();
        assert!(matches!(
            after,
            LifecycleEvent::After {
                pid: None,
                exit_code: None,
                ..
            }
        ));
        assert_eq!(registry.status("broken").await, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn empty_command_is_a_spawn_failure() {
        let (observer, mut events) = ChannelObserver::new();
        let registry = registry_with(counting(), 1000).with_observer(Arc::new(observer));

        assert!(registry.start("empty", "").await);
        events.recv().await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            LifecycleEvent::Error { .. }
        ));
    }

    #[tokio::test]
    async fn lifecycle_events_for_clean_exit() {
        let (observer, mut events) = ChannelObserver::new();
        let registry = registry_with(counting(), 1000).with_observer(Arc::new(observer));
        registry.start("quick", "sh -c exit").await;

        assert!(matches!(events.recv().await.unwrap(), LifecycleEvent::Before { .. }));
        let pid = match events.recv().await.unwrap() {
            LifecycleEvent::Started { pid, .. } => pid,
            other => panic!("expected Started, got {other:?}"),
        };
        match events.recv().await.unwrap() {
            LifecycleEvent::After {
                pid: after_pid,
                exit_code,
                ..
            } => {
                assert_eq!(after_pid, Some(pid));
                assert_eq!(exit_code, Some(0));
            }
            other => panic!("expected After, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn graceful_stop_needs_no_forced_kill() {
        let registry = registry_with(counting(), 10_000);
        registry.start("sleeper", "sleep 30").await;
        wait_running(&registry, "sleeper").await;
        let process = registry.get("sleeper").await.unwrap();

        assert!(registry.stop("sleeper").await);
        assert!(process.is_dead());
        assert_eq!(registry.status("sleeper").await, ServiceStatus::Absent);
        assert!(eventually(|| process.has_exited(), Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn stubborn_process_is_killed_after_grace() {
        let registry = registry_with(counting(), 300);
        registry
            .start_argv(
                "stubborn",
                argv(&["sh", "-c", "trap '' TERM; sleep 30; sleep 30"]),
                None,
            )
            .await;
        wait_running(&registry, "stubborn").await;
        // Let the shell install its trap.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let process = registry.get("stubborn").await.unwrap();
        let pid = process.pid().unwrap();

        registry.stop("stubborn").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(process.is_alive(), "SIGTERM should have been ignored");

        assert!(eventually(|| process.has_exited(), Duration::from_secs(3)).await);
        assert!(!crate::signal::is_alive(pid));
    }

    #[tokio::test]
    async fn restart_builds_successor_with_same_identity() {
        let (observer, _events) = ChannelObserver::new();
        let observer: Arc<dyn ProcessObserver> = Arc::new(observer);
        let registry = registry_with(counting(), 1000);
        registry
            .start_argv("svc", argv(&["sleep", "30"]), Some(Arc::clone(&observer)))
            .await;
        wait_running(&registry, "svc").await;
        let old = registry.get("svc").await.unwrap();

        registry.restart("svc").await;
        let new = registry.get("svc").await.unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        assert!(old.is_dead());
        assert_eq!(new.name(), old.name());
        assert_eq!(new.argv(), old.argv());
        assert!(Arc::ptr_eq(new.observer().unwrap(), &observer));

        wait_running(&registry, "svc").await;
        assert!(eventually(|| old.has_exited(), Duration::from_secs(3)).await);
        registry.stop("svc").await;
    }

    #[tokio::test]
    async fn restart_relaunches_exited_process() {
        let spawner = counting();
        let registry = registry_with(spawner.clone(), 1000);
        registry.start("job", "true").await;
        let first = registry.get("job").await.unwrap();
        assert!(eventually(|| first.has_exited(), Duration::from_secs(5)).await);

        registry.restart("job").await;
        let second = registry.get("job").await.unwrap();
        assert!(eventually(|| second.has_exited(), Duration::from_secs(5)).await);
        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn restart_absent_name_is_noop() {
        let spawner = counting();
        let registry = registry_with(spawner.clone(), 1000);
        registry.restart("ghost").await;
        assert_eq!(registry.count().await, 0);
        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_all_clears_registry() {
        let registry = registry_with(counting(), 1000);
        registry.start("a", "sleep 30").await;
        registry.start("b", "sleep 30").await;
        wait_running(&registry, "a").await;
        wait_running(&registry, "b").await;

        let listed = registry.list().await;
        assert_eq!(
            listed.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(listed.iter().all(|p| p.pid.is_some()));

        registry.stop_all().await;
        assert_eq!(registry.count().await, 0);
        assert_eq!(registry.status("a").await, ServiceStatus::Absent);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_starts_spawn_once() {
        let spawner = counting();
        let registry = Arc::new(registry_with(spawner.clone(), 1000));

        let starts: Vec<_> = (0..32)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.start("x", "sleep 30").await })
            })
            .collect();
        for start in starts {
            assert!(start.await.unwrap());
        }
        wait_running(&registry, "x").await;

        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count().await, 1);
        registry.stop("x").await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_right_after_start_leaves_nothing_behind() {
        let (observer, mut events) = ChannelObserver::new();
        let registry = registry_with(counting(), 200).with_observer(Arc::new(observer));

        let mut stopped = Vec::new();
        for _ in 0..50 {
            registry.start("flash", "sleep 30").await;
            let process = registry.get("flash").await.unwrap();
            assert!(registry.stop("flash").await);
            assert!(process.is_dead());
            assert_eq!(registry.status("flash").await, ServiceStatus::Absent);
            stopped.push(process);
        }

        let (mut befores, mut afters) = (0, 0);
        let mut started = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            while let Ok(event) = events.try_recv() {
                match event {
                    LifecycleEvent::Before { .. } => befores += 1,
                    LifecycleEvent::Started { pid, .. } => started.push(pid),
                    LifecycleEvent::After { .. } => afters += 1,
                    LifecycleEvent::Error { .. } => {}
                }
            }
            if befores == afters && stopped.iter().all(|p| !p.is_alive()) {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "unbalanced lifecycle: {befores} before, {afters} after"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(registry.count().await, 0);
        for pid in started {
            assert!(!crate::signal::is_alive(pid), "pid {pid} outlived its stop");
        }
    }
}
