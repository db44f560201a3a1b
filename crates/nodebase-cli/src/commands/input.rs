//! Interactive stdin lines for `host` and `join`.
//!
//! ```text
//! /quit                     leave
//! /kick <user>              remove a member (host only)
//! /send <type> [json]       send a raw message
//! anything else             a text message
//! ```

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

/// Message type used for plain text lines.
pub const TEXT_MESSAGE: &str = "message";

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Quit,
    Kick(String),
    Send { msg_type: String, payload: Value },
    Text(String),
    Empty,
}

impl Input {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Empty);
        }
        let Some(command) = line.strip_prefix('/') else {
            return Ok(Self::Text(line.to_string()));
        };

        let (verb, rest) = command
            .split_once(char::is_whitespace)
            .map(|(v, r)| (v, r.trim()))
            .unwrap_or((command, ""));

        match verb {
            "quit" => Ok(Self::Quit),
            "kick" if !rest.is_empty() => Ok(Self::Kick(rest.to_string())),
            "kick" => bail!("usage: /kick <user>"),
            "send" => {
                let (msg_type, payload) = rest
                    .split_once(char::is_whitespace)
                    .map(|(t, p)| (t, p.trim()))
                    .unwrap_or((rest, ""));
                if msg_type.is_empty() {
                    bail!("usage: /send <type> [json]");
                }
                let payload = if payload.is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(payload).context("invalid JSON payload")?
                };
                Ok(Self::Send {
                    msg_type: msg_type.to_string(),
                    payload,
                })
            }
            other => bail!("unknown command: /{other}"),
        }
    }
}

/// Payload of a plain text line.
pub fn text_payload(text: &str, user_id: Option<&str>) -> Value {
    match user_id {
        Some(user_id) => json!({"text": text, "userId": user_id}),
        None => json!({"text": text}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_text() {
        assert_eq!(Input::parse("  hello there ").unwrap(), Input::Text("hello there".into()));
        assert_eq!(Input::parse("   ").unwrap(), Input::Empty);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(Input::parse("/quit").unwrap(), Input::Quit);
        assert_eq!(Input::parse("/kick  bob").unwrap(), Input::Kick("bob".into()));
        assert_eq!(
            Input::parse(r#"/send move {"x": 1}"#).unwrap(),
            Input::Send {
                msg_type: "move".into(),
                payload: json!({"x": 1})
            }
        );
        assert_eq!(
            Input::parse("/send ping").unwrap(),
            Input::Send {
                msg_type: "ping".into(),
                payload: json!({})
            }
        );
    }

    #[test]
    fn bad_commands_are_errors() {
        assert!(Input::parse("/kick").is_err());
        assert!(Input::parse("/send").is_err());
        assert!(Input::parse("/send move {oops").is_err());
        assert!(Input::parse("/dance").is_err());
    }

    #[test]
    fn text_payload_carries_sender() {
        assert_eq!(text_payload("hi", None), json!({"text": "hi"}));
        assert_eq!(
            text_payload("hi", Some("alice")),
            json!({"text": "hi", "userId": "alice"})
        );
    }
}
