//! One-shot directory query: which instances exist for a service.
//!
//! Only a malformed relay URL is an error. An unreachable relay, an `error`
//! reply, an early close and the timeout all read as "no instances".

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use nodebase_core::messages::{error_reason, InstanceList};
use nodebase_core::{msg, ChannelEvent, Envelope, InstanceInfo, MessageChannel, NodebaseResult};

use crate::endpoint::build_ws_url;
use crate::websocket::WebSocketChannel;

/// How long a listing may take, connection included.
pub const LIST_TIMEOUT: Duration = Duration::from_secs(3);

/// List the instances a relay hosts for `service`.
pub async fn list_instances(
    relay_url: &str,
    service: &str,
    server_token: Option<&str>,
) -> NodebaseResult<Vec<InstanceInfo>> {
    list_instances_within(relay_url, service, server_token, LIST_TIMEOUT).await
}

/// [`list_instances`] with an explicit deadline.
pub async fn list_instances_within(
    relay_url: &str,
    service: &str,
    server_token: Option<&str>,
    timeout: Duration,
) -> NodebaseResult<Vec<InstanceInfo>> {
    let url = build_ws_url(relay_url, server_token)?;
    let deadline = Instant::now() + timeout;

    let (channel, mut events) =
        match tokio::time::timeout_at(deadline, WebSocketChannel::connect(url.as_str())).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                warn!(%service, error = %e, "relay unreachable, no instances");
                return Ok(Vec::new());
            }
            Err(_) => {
                warn!(%service, "timed out connecting to relay");
                return Ok(Vec::new());
            }
        };

    Ok(query_instances(&channel, &mut events, service, deadline).await)
}

/// Run the query over an already-connecting channel and close it afterwards.
///
/// Waits for `Open`, sends `list_instances`, then settles on the first
/// `instance_list`, `error` or close, or when `deadline` passes.
pub async fn query_instances<C: MessageChannel>(
    channel: &C,
    events: &mut mpsc::UnboundedReceiver<ChannelEvent>,
    service: &str,
    deadline: Instant,
) -> Vec<InstanceInfo> {
    let settled = tokio::time::timeout_at(deadline, async {
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::Open => {
                    let request = Envelope::new(msg::LIST_INSTANCES, service, serde_json::json!({}));
                    if let Err(e) = channel.send(request) {
                        warn!(%service, error = %e, "failed to send list request");
                        return Vec::new();
                    }
                }
                ChannelEvent::Message(envelope) if envelope.is(msg::INSTANCE_LIST) => {
                    return match envelope.payload_as::<InstanceList>() {
                        Ok(list) => list.instances,
                        Err(e) => {
                            warn!(%service, error = %e, "malformed instance list");
                            Vec::new()
                        }
                    };
                }
                ChannelEvent::Message(envelope) if envelope.is(msg::ERROR) => {
                    warn!(%service, reason = %error_reason(&envelope), "relay refused listing");
                    return Vec::new();
                }
                ChannelEvent::Message(envelope) => {
                    debug!(msg_type = %envelope.msg_type, "ignoring message while listing");
                }
                ChannelEvent::Error(reason) => {
                    debug!(%service, %reason, "channel error while listing");
                }
                ChannelEvent::Closed => {
                    debug!(%service, "relay closed before replying");
                    return Vec::new();
                }
            }
        }
        Vec::new()
    })
    .await;

    channel.close();
    settled.unwrap_or_else(|_| {
        warn!(%service, "timed out waiting for instance list");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodebase_core::MemoryChannel;
    use serde_json::json;

    fn deadline(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    /// Queue `events`; the sender is returned so the stream stays open.
    fn inbound(
        events: Vec<ChannelEvent>,
    ) -> (
        mpsc::UnboundedSender<ChannelEvent>,
        mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in events {
            tx.send(event).unwrap();
        }
        (tx, rx)
    }

    #[tokio::test]
    async fn list_reply_resolves_with_instances() {
        let channel = MemoryChannel::new();
        let (_tx, mut events) = inbound(vec![
            ChannelEvent::Open,
            ChannelEvent::Message(Envelope::new(
                msg::INSTANCE_LIST,
                "chat",
                json!({"instances": [
                    {"uuid": "u-1", "name": "Lobby", "hasToken": false},
                    {"uuid": "u-2", "name": "Private", "hasToken": true, "clients": 3}
                ]}),
            )),
        ]);

        let instances = query_instances(&channel, &mut events, "chat", deadline(1000)).await;
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].name.as_deref(), Some("Private"));
        assert_eq!(instances[1].extra.get("clients"), Some(&json!(3)));

        assert_eq!(
            channel.sent(),
            vec![Envelope::new(msg::LIST_INSTANCES, "chat", json!({}))]
        );
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn error_reply_resolves_empty() {
        let channel = MemoryChannel::new();
        let (_tx, mut events) = inbound(vec![
            ChannelEvent::Open,
            ChannelEvent::Message(Envelope::new(msg::ERROR, "chat", json!({"message": "nope"}))),
        ]);
        assert!(query_instances(&channel, &mut events, "chat", deadline(1000))
            .await
            .is_empty());
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn early_close_resolves_empty() {
        let channel = MemoryChannel::new();
        let (_tx, mut events) = inbound(vec![
            ChannelEvent::Open,
            ChannelEvent::Error("reset".into()),
            ChannelEvent::Closed,
        ]);
        assert!(query_instances(&channel, &mut events, "chat", deadline(1000))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn silence_times_out_empty() {
        let channel = MemoryChannel::new();
        let (_tx, mut events) = inbound(vec![ChannelEvent::Open]);
        let started = std::time::Instant::now();
        assert!(query_instances(&channel, &mut events, "chat", deadline(100))
            .await
            .is_empty());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(channel.close_calls(), 1);
    }

    #[tokio::test]
    async fn invalid_url_is_the_only_hard_error() {
        assert!(list_instances("not a url", "chat", None).await.is_err());
        assert!(list_instances("ftp://relay/ws", "chat", None).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_relay_resolves_empty() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let instances = list_instances_within(
            &format!("ws://{addr}/ws"),
            "chat",
            Some("secret"),
            Duration::from_millis(500),
        )
        .await
        .unwrap();
        assert!(instances.is_empty());
    }
}
