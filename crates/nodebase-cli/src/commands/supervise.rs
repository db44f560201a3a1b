//! `nodebase supervise`: run the process supervisor.
//!
//! Autostarts the configured apps, then executes one control line per stdin
//! line until stdin closes or the process is interrupted. Every supervised
//! process is stopped on the way out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{info, warn};

use nodebase_supervisor::{
    ChannelObserver, ControlCommand, LifecycleEvent, ManagedProcess, ProcessRegistry,
    SupervisorConfig, TokioSpawner,
};

use crate::config::AppEntry;

/// Extra time allowed after the grace period for forced kills to land.
const SHUTDOWN_SLACK: Duration = Duration::from_millis(500);

pub async fn run(
    apps: &[AppEntry],
    grace: Duration,
    token: Option<String>,
    quiet: bool,
) -> Result<()> {
    let (observer, mut lifecycle) = ChannelObserver::new();
    let registry = ProcessRegistry::new(
        SupervisorConfig::with_grace_period(grace),
        Arc::new(TokioSpawner { quiet }),
    )
    .with_observer(Arc::new(observer));

    if token.is_some() {
        info!("control token required");
    }

    for app in apps.iter().filter(|app| app.autostart) {
        info!(name = %app.name, "autostarting");
        registry.start(&app.name, &app.command).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => match ControlCommand::parse(&line, token.as_deref()) {
                    Ok(command) => println!("{}", registry.execute(command).await),
                    Err(e) => {
                        warn!(error = %e, "rejected control line");
                        println!("error: {e}");
                    }
                },
                None => break,
            },
            Some(event) = lifecycle.recv() => print_event(&event),
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }
    }

    shutdown(&registry, grace).await;
    while let Ok(event) = lifecycle.try_recv() {
        print_event(&event);
    }
    Ok(())
}

/// Stop everything and wait for the processes to be reaped, up to the grace
/// period plus a little slack.
async fn shutdown(registry: &ProcessRegistry, grace: Duration) {
    let mut stopping: Vec<Arc<ManagedProcess>> = Vec::new();
    for info in registry.list().await {
        if let Some(process) = registry.get(&info.name).await {
            stopping.push(process);
        }
    }

    info!(count = stopping.len(), "stopping all processes");
    registry.stop_all().await;

    let deadline = Instant::now() + grace + SHUTDOWN_SLACK;
    while stopping.iter().any(|p| p.is_alive()) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn print_event(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::Before { name, argv } => println!("[{name}] starting: {}", argv.join(" ")),
        LifecycleEvent::Started { name, pid, .. } => println!("[{name}] started (pid {pid})"),
        LifecycleEvent::Error { name, reason, .. } => println!("[{name}] error: {reason}"),
        LifecycleEvent::After {
            name, exit_code, ..
        } => match exit_code {
            Some(code) => println!("[{name}] exited with code {code}"),
            None => println!("[{name}] exited"),
        },
    }
}
