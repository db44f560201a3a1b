//! JSON text codec for the tunnel protocol.
//!
//! Every WebSocket text frame carries exactly one envelope:
//! `{"type": "...", "service": "...", "payload": {...}}`

use crate::error::{NodebaseError, NodebaseResult};
use crate::messages::Envelope;

/// Encode an envelope into a single text frame.
pub fn encode(envelope: &Envelope) -> NodebaseResult<String> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode a text frame into an envelope.
///
/// Missing `service` and `payload` fields are tolerated; a missing `type` is not.
pub fn decode(text: &str) -> NodebaseResult<Envelope> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(NodebaseError::InvalidMessage(
            "frame is not a JSON object".into(),
        ));
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_uses_wire_field_names() {
        let env = Envelope::new("list_instances", "chat", json!({}));
        let text = encode(&env).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "list_instances");
        assert_eq!(value["service"], "chat");
        assert_eq!(value["payload"], json!({}));
    }

    #[test]
    fn decode_tolerates_missing_service_and_payload() {
        let env = decode(r#"{"type":"kick"}"#).unwrap();
        assert_eq!(env.msg_type, "kick");
        assert_eq!(env.service, "");
        assert!(env.payload.is_null());
    }

    #[test]
    fn decode_rejects_missing_type() {
        assert!(decode(r#"{"service":"chat","payload":{}}"#).is_err());
    }

    #[test]
    fn decode_rejects_non_object() {
        let err = decode("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, NodebaseError::InvalidMessage(_)));
        assert!(decode("not json").is_err());
    }
}
