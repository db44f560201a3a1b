//! Instance client: joins an existing instance by UUID.
//!
//! A kick is terminal. Once kicked the client closes its channel and ignores
//! every later event, including the close that follows.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use nodebase_core::messages::{error_reason, JoinAck, JoinInstance};
use nodebase_core::{msg, ChannelEvent, Envelope, MessageChannel};

use crate::id::generate_id;

/// Construction options for an [`InstanceClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub service: String,
    pub instance_uuid: String,
    /// Generated when not given.
    pub user_id: Option<String>,
    /// Token the instance requires to join.
    pub instance_token: Option<String>,
    /// Token the relay requires of every connection. Carried in the URL.
    pub server_token: Option<String>,
}

impl ClientOptions {
    pub fn new(service: impl Into<String>, instance_uuid: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            instance_uuid: instance_uuid.into(),
            user_id: None,
            instance_token: None,
            server_token: None,
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn instance_token(mut self, token: impl Into<String>) -> Self {
        self.instance_token = Some(token.into());
        self
    }

    pub fn server_token(mut self, token: impl Into<String>) -> Self {
        self.server_token = Some(token.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Connected,
    Joined,
    Kicked,
    Disconnected,
}

/// Notifications emitted by an [`InstanceClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Opened,
    Joined(JoinAck),
    /// The host removed this client. Carries the raw kick payload.
    Kicked(Value),
    Error(String),
    Message(Envelope),
    Closed,
}

/// Participant side of the instance tunnel protocol.
pub struct InstanceClient<C: MessageChannel> {
    channel: C,
    options: ClientOptions,
    user_id: String,
    state: ClientState,
    instance_name: Option<String>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl<C: MessageChannel> InstanceClient<C> {
    pub fn new(channel: C, options: ClientOptions) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let user_id = options.user_id.clone().unwrap_or_else(generate_id);
        let client = Self {
            channel,
            options,
            user_id,
            state: ClientState::Connecting,
            instance_name: None,
            events,
        };
        (client, rx)
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn instance_uuid(&self) -> &str {
        &self.options.instance_uuid
    }

    /// Name reported by the relay once joined.
    pub fn instance_name(&self) -> Option<&str> {
        self.instance_name.as_deref()
    }

    pub fn is_joined(&self) -> bool {
        self.state == ClientState::Joined
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Feed one event from the channel's read half.
    pub fn handle_event(&mut self, event: ChannelEvent) {
        if matches!(self.state, ClientState::Kicked | ClientState::Disconnected) {
            debug!(user_id = %self.user_id, ?event, "ignoring event after session end");
            return;
        }

        match event {
            ChannelEvent::Open => self.handle_open(),
            ChannelEvent::Message(envelope) => self.handle_message(envelope),
            ChannelEvent::Error(reason) => {
                warn!(user_id = %self.user_id, %reason, "channel error");
                self.emit(ClientEvent::Error(reason));
            }
            ChannelEvent::Closed => {
                debug!(user_id = %self.user_id, "client channel closed");
                self.state = ClientState::Disconnected;
                self.emit(ClientEvent::Closed);
            }
        }
    }

    fn handle_open(&mut self) {
        if self.state != ClientState::Connecting {
            return;
        }
        self.state = ClientState::Connected;
        self.emit(ClientEvent::Opened);

        let payload = JoinInstance {
            uuid: self.options.instance_uuid.clone(),
            user_id: self.user_id.clone(),
            token: self.options.instance_token.clone(),
        };
        match serde_json::to_value(payload) {
            Ok(value) => {
                self.send(msg::JOIN_INSTANCE, value);
            }
            Err(e) => warn!(error = %e, "failed to encode join"),
        }
    }

    fn handle_message(&mut self, envelope: Envelope) {
        match envelope.msg_type.as_str() {
            msg::ACK if envelope.is_success() => match envelope.payload_as::<JoinAck>() {
                Ok(ack) if ack.instance_uuid.is_some() => {
                    info!(
                        user_id = %self.user_id,
                        instance = ?ack.instance_uuid,
                        name = ?ack.instance_name,
                        "joined instance"
                    );
                    self.instance_name = ack.instance_name.clone();
                    self.state = ClientState::Joined;
                    self.emit(ClientEvent::Joined(ack));
                }
                _ => self.emit(ClientEvent::Message(envelope)),
            },
            msg::KICK => {
                info!(user_id = %self.user_id, "kicked from instance");
                self.state = ClientState::Kicked;
                self.emit(ClientEvent::Kicked(envelope.payload));
                self.channel.close();
            }
            msg::ERROR => {
                let reason = error_reason(&envelope);
                warn!(user_id = %self.user_id, %reason, "relay error");
                self.emit(ClientEvent::Error(reason));
            }
            _ => self.emit(ClientEvent::Message(envelope)),
        }
    }

    /// Send a message for this client's service. Returns `false` when the
    /// channel is not open or the session has ended.
    pub fn send(&self, msg_type: &str, payload: Value) -> bool {
        if matches!(self.state, ClientState::Kicked | ClientState::Disconnected)
            || !self.channel.is_open()
        {
            debug!(msg_type, "client not connected, dropping message");
            return false;
        }
        match self
            .channel
            .send(Envelope::new(msg_type, self.options.service.as_str(), payload))
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "send failed");
                false
            }
        }
    }

    /// Close the channel and end the session.
    pub fn disconnect(&mut self) {
        self.channel.close();
        if self.state != ClientState::Kicked && self.state != ClientState::Disconnected {
            self.state = ClientState::Disconnected;
            self.emit(ClientEvent::Closed);
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}
