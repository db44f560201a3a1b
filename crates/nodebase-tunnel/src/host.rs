//! Instance host: owns one named instance on the relay.
//!
//! On open the host asks the relay to create an instance, or to reclaim a
//! previous one when it was given a UUID. A rejected reclaim falls back to a
//! plain create. Broadcasts are only accepted once an instance is active.

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use nodebase_core::messages::{error_reason, CreateInstance, InstanceAck, KickClient, ReclaimInstance};
use nodebase_core::{msg, ChannelEvent, Envelope, MessageChannel};

/// Instance name used when none is given.
pub const DEFAULT_INSTANCE_NAME: &str = "Room";

/// Construction options for an [`InstanceHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOptions {
    pub service: String,
    pub name: String,
    /// Token members must present to join.
    pub instance_token: Option<String>,
    /// Token the relay requires of hosts.
    pub server_token: Option<String>,
    /// UUID of a previous instance to take over.
    pub reclaim_uuid: Option<String>,
}

impl HostOptions {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            name: DEFAULT_INSTANCE_NAME.to_string(),
            instance_token: None,
            server_token: None,
            reclaim_uuid: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
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

    pub fn reclaim(mut self, uuid: impl Into<String>) -> Self {
        self.reclaim_uuid = Some(uuid.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Connecting,
    Connected,
    InstanceActive,
    Disconnected,
}

/// Notifications emitted by an [`InstanceHost`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Opened,
    Created(InstanceAck),
    Reclaimed(InstanceAck),
    Error(String),
    /// Any message the host does not consume itself.
    Message(Envelope),
    Closed,
}

/// Host side of the instance tunnel protocol.
pub struct InstanceHost<C: MessageChannel> {
    channel: C,
    options: HostOptions,
    state: HostState,
    instance_uuid: Option<String>,
    events: mpsc::UnboundedSender<HostEvent>,
}

impl<C: MessageChannel> InstanceHost<C> {
    pub fn new(channel: C, options: HostOptions) -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let host = Self {
            channel,
            options,
            state: HostState::Connecting,
            instance_uuid: None,
            events,
        };
        (host, rx)
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn instance_uuid(&self) -> Option<&str> {
        self.instance_uuid.as_deref()
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Feed one event from the channel's read half.
    pub fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Open => self.handle_open(),
            ChannelEvent::Message(envelope) => self.handle_message(envelope),
            ChannelEvent::Error(reason) => {
                warn!(service = %self.options.service, %reason, "channel error");
                self.emit(HostEvent::Error(reason));
            }
            ChannelEvent::Closed => self.handle_close(),
        }
    }

    fn handle_open(&mut self) {
        if self.state != HostState::Connecting {
            return;
        }
        self.state = HostState::Connected;
        self.emit(HostEvent::Opened);

        if self.options.reclaim_uuid.is_some() {
            self.send_reclaim();
        } else {
            self.send_create();
        }
    }

    fn handle_message(&mut self, envelope: Envelope) {
        if self.state == HostState::Disconnected {
            return;
        }

        match envelope.msg_type.as_str() {
            msg::INSTANCE_CREATED if envelope.is_success() => {
                self.activate(&envelope, HostEvent::Created);
            }
            msg::INSTANCE_RECLAIMED if envelope.is_success() => {
                self.activate(&envelope, HostEvent::Reclaimed);
            }
            msg::INSTANCE_RECLAIMED => {
                info!(
                    service = %self.options.service,
                    uuid = ?self.options.reclaim_uuid,
                    "reclaim rejected, creating a new instance"
                );
                self.options.reclaim_uuid = None;
                self.send_create();
            }
            msg::ERROR => {
                let reason = error_reason(&envelope);
                warn!(service = %self.options.service, %reason, "relay error");
                self.emit(HostEvent::Error(reason));
            }
            _ => self.emit(HostEvent::Message(envelope)),
        }
    }

    fn handle_close(&mut self) {
        if self.state == HostState::Disconnected {
            return;
        }
        debug!(service = %self.options.service, "host channel closed");
        self.state = HostState::Disconnected;
        self.emit(HostEvent::Closed);
    }

    fn activate(&mut self, envelope: &Envelope, wrap: fn(InstanceAck) -> HostEvent) {
        let ack: InstanceAck = match envelope.payload_as() {
            Ok(ack) => ack,
            Err(e) => {
                self.emit(HostEvent::Error(format!("malformed {}: {e}", envelope.msg_type)));
                return;
            }
        };
        let Some(uuid) = ack.uuid.clone() else {
            self.emit(HostEvent::Error(format!("{} without uuid", envelope.msg_type)));
            return;
        };

        info!(service = %self.options.service, %uuid, name = ?ack.name, "instance active");
        self.instance_uuid = Some(uuid);
        self.state = HostState::InstanceActive;
        self.emit(wrap(ack));
    }

    fn send_create(&self) {
        let payload = CreateInstance {
            name: self.options.name.clone(),
            token: self.options.instance_token.clone(),
            server_token: self.options.server_token.clone(),
        };
        self.send_typed(msg::CREATE_INSTANCE, &payload);
    }

    fn send_reclaim(&self) {
        let Some(uuid) = self.options.reclaim_uuid.clone() else {
            return;
        };
        let payload = ReclaimInstance {
            uuid,
            token: self.options.instance_token.clone(),
            server_token: self.options.server_token.clone(),
        };
        self.send_typed(msg::RECLAIM_INSTANCE, &payload);
    }

    fn send_typed<T: serde::Serialize>(&self, msg_type: &str, payload: &T) {
        match Envelope::with_payload(msg_type, self.options.service.as_str(), payload) {
            Ok(envelope) => {
                self.send_envelope(envelope);
            }
            Err(e) => warn!(msg_type, error = %e, "failed to encode payload"),
        }
    }

    /// Send an arbitrary message for this host's service. Returns `false`
    /// when the channel is not open.
    pub fn send(&self, msg_type: &str, payload: Value) -> bool {
        self.send_envelope(Envelope::new(msg_type, self.options.service.as_str(), payload))
    }

    fn send_envelope(&self, envelope: Envelope) -> bool {
        if !self.channel.is_open() {
            debug!(msg_type = %envelope.msg_type, "channel not open, dropping message");
            return false;
        }
        match self.channel.send(envelope) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "send failed");
                false
            }
        }
    }

    /// Broadcast to the instance's members with `instanceUuid` injected into
    /// the payload. A null payload counts as `{}`. Returns `false` unless an
    /// instance is active.
    pub fn broadcast(&self, msg_type: &str, payload: Value) -> bool {
        let (HostState::InstanceActive, Some(uuid)) = (self.state, self.instance_uuid.as_ref())
        else {
            warn!(msg_type, "cannot broadcast without an active instance");
            return false;
        };

        let mut fields = match payload {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => {
                warn!(msg_type, payload = %other, "broadcast payload must be an object");
                return false;
            }
        };
        fields.insert("instanceUuid".to_string(), Value::String(uuid.clone()));
        self.send(msg_type, Value::Object(fields))
    }

    /// Ask the relay to remove a member from this instance.
    pub fn kick_user(&self, user_id: &str) -> bool {
        let payload = KickClient {
            user_id: user_id.to_string(),
            instance_uuid: self.instance_uuid.clone(),
        };
        match serde_json::to_value(payload) {
            Ok(value) => self.send(msg::KICK_CLIENT, value),
            Err(e) => {
                warn!(error = %e, "failed to encode kick");
                false
            }
        }
    }

    /// Close the channel. The host stays usable for inspection only.
    pub fn disconnect(&mut self) {
        self.channel.close();
        self.handle_close();
    }

    fn emit(&self, event: HostEvent) {
        let _ = self.events.send(event);
    }
}
