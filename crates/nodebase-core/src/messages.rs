//! Tunnel protocol wire messages.
//!
//! Every frame is an [`Envelope`] whose `type` selects how `payload` is read.
//! Outbound payloads are built from the typed structs below; inbound payloads
//! are read leniently because the relay may add fields this crate does not know.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::NodebaseResult;

/// Message type tags.
pub mod msg {
    pub const CREATE_INSTANCE: &str = "create_instance";
    pub const RECLAIM_INSTANCE: &str = "reclaim_instance";
    pub const INSTANCE_CREATED: &str = "instance_created";
    pub const INSTANCE_RECLAIMED: &str = "instance_reclaimed";
    pub const JOIN_INSTANCE: &str = "join_instance";
    pub const ACK: &str = "ack";
    pub const KICK_CLIENT: &str = "kick_client";
    pub const KICK: &str = "kick";
    pub const LIST_INSTANCES: &str = "list_instances";
    pub const INSTANCE_LIST: &str = "instance_list";
    pub const ERROR: &str = "error";
}

/// A single protocol frame: `{type, service, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(msg_type: impl Into<String>, service: impl Into<String>, payload: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            service: service.into(),
            payload,
        }
    }

    /// Build an envelope from a typed payload.
    pub fn with_payload<T: Serialize>(
        msg_type: impl Into<String>,
        service: impl Into<String>,
        payload: &T,
    ) -> NodebaseResult<Self> {
        Ok(Self::new(msg_type, service, serde_json::to_value(payload)?))
    }

    /// Read the payload as a typed value. A null payload reads as `{}`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> NodebaseResult<T> {
        let value = if self.payload.is_null() {
            Value::Object(Map::new())
        } else {
            self.payload.clone()
        };
        Ok(serde_json::from_value(value)?)
    }

    /// Whether `payload.success` is `true`.
    pub fn is_success(&self) -> bool {
        self.payload
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is(&self, msg_type: &str) -> bool {
        self.msg_type == msg_type
    }
}

// ── Outbound payloads ───────────────────────────────────────────────

/// `create_instance`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInstance {
    pub name: String,
    pub token: Option<String>,
    pub server_token: Option<String>,
}

/// `reclaim_instance`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReclaimInstance {
    pub uuid: String,
    pub token: Option<String>,
    pub server_token: Option<String>,
}

/// `join_instance`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinInstance {
    pub uuid: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub token: Option<String>,
}

/// `kick_client`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KickClient {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "instanceUuid")]
    pub instance_uuid: Option<String>,
}

// ── Inbound payloads ────────────────────────────────────────────────

/// Payload of `instance_created` and `instance_reclaimed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "hasToken", default, skip_serializing_if = "Option::is_none")]
    pub has_token: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of the `ack` sent in reply to `join_instance`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinAck {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "instanceUuid", default)]
    pub instance_uuid: Option<String>,
    #[serde(rename = "instanceName", default)]
    pub instance_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of an `error` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorPayload {
    /// Human-readable reason, falling back to the `error` field.
    pub fn reason(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

/// One entry of an `instance_list` reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "hasToken", default, skip_serializing_if = "Option::is_none")]
    pub has_token: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of `instance_list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceList {
    #[serde(default)]
    pub instances: Vec<InstanceInfo>,
}

/// Extract the human-readable reason from an `error` envelope.
pub fn error_reason(envelope: &Envelope) -> String {
    envelope
        .payload_as::<ErrorPayload>()
        .map(|p| p.reason())
        .unwrap_or_else(|_| "Unknown error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_instance_sends_null_tokens() {
        let env = Envelope::with_payload(
            msg::CREATE_INSTANCE,
            "chat",
            &CreateInstance {
                name: "Room".into(),
                token: None,
                server_token: None,
            },
        )
        .unwrap();
        assert_eq!(
            env.payload,
            json!({"name": "Room", "token": null, "server_token": null})
        );
    }

    #[test]
    fn join_and_kick_use_camel_case_ids() {
        let join = serde_json::to_value(JoinInstance {
            uuid: "u-1".into(),
            user_id: "alice".into(),
            token: Some("t".into()),
        })
        .unwrap();
        assert_eq!(join, json!({"uuid": "u-1", "userId": "alice", "token": "t"}));

        let kick = serde_json::to_value(KickClient {
            user_id: "bob".into(),
            instance_uuid: Some("u-1".into()),
        })
        .unwrap();
        assert_eq!(kick, json!({"userId": "bob", "instanceUuid": "u-1"}));
    }

    #[test]
    fn instance_ack_keeps_unknown_fields() {
        let env = Envelope::new(
            msg::INSTANCE_CREATED,
            "chat",
            json!({"success": true, "uuid": "abc", "name": "Room", "hasToken": false, "owner": "me"}),
        );
        let ack: InstanceAck = env.payload_as().unwrap();
        assert!(ack.success);
        assert_eq!(ack.uuid.as_deref(), Some("abc"));
        assert_eq!(ack.has_token, Some(false));
        assert_eq!(ack.extra.get("owner"), Some(&json!("me")));
    }

    #[test]
    fn null_payload_reads_as_empty_object() {
        let env = Envelope::new(msg::INSTANCE_LIST, "chat", Value::Null);
        let list: InstanceList = env.payload_as().unwrap();
        assert!(list.instances.is_empty());
        assert!(!env.is_success());
    }

    #[test]
    fn error_reason_falls_back() {
        let with_message = Envelope::new(msg::ERROR, "", json!({"message": "bad token"}));
        assert_eq!(error_reason(&with_message), "bad token");

        let with_error = Envelope::new(msg::ERROR, "", json!({"error": "nope"}));
        assert_eq!(error_reason(&with_error), "nope");

        let empty = Envelope::new(msg::ERROR, "", Value::Null);
        assert_eq!(error_reason(&empty), "Unknown error");
    }
}
