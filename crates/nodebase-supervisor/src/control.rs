//! Line-oriented control commands for a [`ProcessRegistry`].
//!
//! ```text
//! [token] start <name> <command line...>
//! [token] restart <name>
//! [token] stop <name>
//! [token] stop !
//! [token] status <name>
//! [token] list
//! ```
//!
//! The leading token is required only when the registry's owner configured
//! one. The command line of `start` is the raw text after the name, handed to
//! the registry untouched so it is tokenized exactly once.

use std::fmt;

use nodebase_core::{NodebaseError, NodebaseResult};
use rand::Rng;

use crate::argv::{parse_command_line, Tokens};
use crate::registry::{ProcessInfo, ProcessRegistry, ServiceStatus};

/// Name that addresses every process in `stop`.
pub const ALL: &str = "!";

/// A parsed control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Start { name: String, command_line: String },
    Restart { name: String },
    Stop { name: String },
    StopAll,
    Status { name: String },
    List,
}

impl ControlCommand {
    /// Parse one control line, checking `token` first when one is expected.
    pub fn parse(line: &str, token: Option<&str>) -> NodebaseResult<Self> {
        let mut tokens = Tokens::new(line);

        if let Some(expected) = token {
            match tokens.next() {
                Some(given) if given == expected => {}
                _ => return Err(NodebaseError::InvalidArgument("bad control token".into())),
            }
        }

        let verb = tokens
            .next()
            .ok_or_else(|| NodebaseError::InvalidArgument("empty command".into()))?;

        if verb == "list" {
            return Ok(Self::List);
        }

        let name = tokens
            .next()
            .ok_or_else(|| NodebaseError::InvalidArgument(format!("{verb}: missing name")))?;

        match verb.as_str() {
            "start" => {
                let rest = tokens.remainder();
                parse_command_line((!rest.is_empty()).then_some(rest))?;
                Ok(Self::Start {
                    name,
                    command_line: rest.to_string(),
                })
            }
            "restart" => Ok(Self::Restart { name }),
            "stop" if name == ALL => Ok(Self::StopAll),
            "stop" => Ok(Self::Stop { name }),
            "status" => Ok(Self::Status { name }),
            other => Err(NodebaseError::InvalidArgument(format!(
                "unknown command: {other}"
            ))),
        }
    }
}

/// Result of executing a control command.
#[derive(Debug, Clone)]
pub enum ControlReply {
    Done { verb: &'static str, name: String },
    Status { name: String, status: ServiceStatus },
    List(Vec<ProcessInfo>),
}

impl fmt::Display for ControlReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done { verb, name } => write!(f, "ok {verb} {name}"),
            Self::Status { name, status } => write!(f, "{name} {status}"),
            Self::List(infos) => {
                if infos.is_empty() {
                    return write!(f, "(no processes)");
                }
                for (i, info) in infos.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    let pid = info
                        .pid
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    write!(
                        f,
                        "{:<16} {:<8} {:<8} {}",
                        info.name,
                        info.status,
                        pid,
                        info.argv.join(" ")
                    )?;
                }
                Ok(())
            }
        }
    }
}

impl ProcessRegistry {
    /// Execute a parsed control command.
    pub async fn execute(&self, command: ControlCommand) -> ControlReply {
        match command {
            ControlCommand::Start { name, command_line } => {
                self.start(&name, &command_line).await;
                ControlReply::Done { verb: "start", name }
            }
            ControlCommand::Restart { name } => {
                self.restart(&name).await;
                ControlReply::Done {
                    verb: "restart",
                    name,
                }
            }
            ControlCommand::Stop { name } => {
                self.stop(&name).await;
                ControlReply::Done { verb: "stop", name }
            }
            ControlCommand::StopAll => {
                self.stop_all().await;
                ControlReply::Done {
                    verb: "stop",
                    name: ALL.to_string(),
                }
            }
            ControlCommand::Status { name } => {
                let status = self.status(&name).await;
                ControlReply::Status { name, status }
            }
            ControlCommand::List => ControlReply::List(self.list().await),
        }
    }
}

/// Generate a random control token (hex-encoded, 16 bytes = 32 hex chars).
pub fn generate_control_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}
