//! nodebase-supervisor: supervision of named long-running child processes.
//!
//! A [`ProcessRegistry`] maps service names to [`ManagedProcess`]es. Starting
//! is idempotent per name, stopping escalates from SIGTERM to a kill by PID
//! after a grace period, and restarting builds a fresh process from the old
//! one's argv and observer. Lifecycle transitions are reported to a
//! [`ProcessObserver`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use nodebase_supervisor::{ChannelObserver, ProcessRegistry, SupervisorConfig, TokioSpawner};
//!
//! # async fn example() {
//! let (observer, mut events) = ChannelObserver::new();
//! let registry = ProcessRegistry::new(SupervisorConfig::default(), Arc::new(TokioSpawner::default()))
//!     .with_observer(Arc::new(observer));
//!
//! registry.start("chat", "node /srv/chat/index.js 8081").await;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

pub mod argv;
pub mod config;
pub mod control;
pub mod observer;
pub mod process;
pub mod registry;
pub mod signal;

pub use argv::{parse_command_line, tokenize, Tokens};
pub use config::SupervisorConfig;
pub use control::{generate_control_token, ControlCommand, ControlReply};
pub use observer::{ChannelObserver, LifecycleEvent, ProcessObserver};
pub use process::{ManagedProcess, ProcessSpawner, ProcessState, TokioSpawner};
pub use registry::{ProcessInfo, ProcessRegistry, ServiceStatus};
