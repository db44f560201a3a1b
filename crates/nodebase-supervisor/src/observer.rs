//! Lifecycle observers for managed processes.
//!
//! A [`ProcessObserver`] is told about four moments in a process's life:
//! `before` the spawn is attempted, `started` once the OS process exists,
//! `error` when spawning or waiting fails, and `after` once it is dead.
//! `after` always fires exactly once per launched process.

use tokio::sync::mpsc;

/// Receives lifecycle notifications. All methods default to no-ops.
pub trait ProcessObserver: Send + Sync {
    fn before(&self, _name: &str, _argv: &[String]) {}

    fn started(&self, _name: &str, _argv: &[String], _pid: u32) {}

    fn error(&self, _name: &str, _argv: &[String], _pid: Option<u32>, _reason: &str) {}

    fn after(&self, _name: &str, _argv: &[String], _pid: Option<u32>, _exit_code: Option<i32>) {}
}

/// A lifecycle notification as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Before {
        name: String,
        argv: Vec<String>,
    },
    Started {
        name: String,
        argv: Vec<String>,
        pid: u32,
    },
    Error {
        name: String,
        argv: Vec<String>,
        pid: Option<u32>,
        reason: String,
    },
    After {
        name: String,
        argv: Vec<String>,
        pid: Option<u32>,
        exit_code: Option<i32>,
    },
}

impl LifecycleEvent {
    /// Name of the managed process this event belongs to.
    pub fn name(&self) -> &str {
        match self {
            Self::Before { name, .. }
            | Self::Started { name, .. }
            | Self::Error { name, .. }
            | Self::After { name, .. } => name,
        }
    }
}

/// Forwards every notification into an unbounded channel.
///
/// Sending never blocks; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProcessObserver for ChannelObserver {
    fn before(&self, name: &str, argv: &[String]) {
        self.emit(LifecycleEvent::Before {
            name: name.to_string(),
            argv: argv.to_vec(),
        });
    }

    fn started(&self, name: &str, argv: &[String], pid: u32) {
        self.emit(LifecycleEvent::Started {
            name: name.to_string(),
            argv: argv.to_vec(),
            pid,
        });
    }

    fn error(&self, name: &str, argv: &[String], pid: Option<u32>, reason: &str) {
        self.emit(LifecycleEvent::Error {
            name: name.to_string(),
            argv: argv.to_vec(),
            pid,
            reason: reason.to_string(),
        });
    }

    fn after(&self, name: &str, argv: &[String], pid: Option<u32>, exit_code: Option<i32>) {
        self.emit(LifecycleEvent::After {
            name: name.to_string(),
            argv: argv.to_vec(),
            pid,
            exit_code,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_observer_forwards_in_order() {
        let (observer, mut rx) = ChannelObserver::new();
        let argv = vec!["node".to_string(), "app.js".to_string()];
        observer.before("app", &argv);
        observer.started("app", &argv, 42);
        observer.after("app", &argv, Some(42), Some(0));

        assert!(matches!(rx.try_recv().unwrap(), LifecycleEvent::Before { .. }));
        assert!(matches!(
            rx.try_recv().unwrap(),
            LifecycleEvent::Started { pid: 42, .. }
        ));
        let after = rx.try_recv().unwrap();
        assert_eq!(after.name(), "app");
        assert!(matches!(
            after,
            LifecycleEvent::After {
                exit_code: Some(0),
                ..
            }
        ));
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.before("app", &[]);
    }
}
