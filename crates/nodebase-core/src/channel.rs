//! Abstract message channel for the tunnel protocol.
//!
//! The instance host and client state machines never touch a socket directly:
//! they send through a [`MessageChannel`] and are fed [`ChannelEvent`]s by
//! whoever owns the read half. The channel is assumed ordered and reliable
//! while open.

use std::sync::{Arc, Mutex};

use crate::error::{NodebaseError, NodebaseResult};
use crate::messages::Envelope;

/// Events produced by the read half of a channel, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel finished opening and can carry messages.
    Open,
    /// A decoded inbound message.
    Message(Envelope),
    /// A transport-level error. Usually followed by `Closed`.
    Error(String),
    /// The channel is closed; no further events follow.
    Closed,
}

/// The write half of a duplex message channel.
pub trait MessageChannel: Send + Sync {
    /// Queue an envelope for delivery.
    fn send(&self, envelope: Envelope) -> NodebaseResult<()>;

    /// Close the channel. Closing twice is a no-op.
    fn close(&self);

    /// Whether the channel can still carry outbound messages.
    fn is_open(&self) -> bool;
}

#[derive(Debug, Default)]
struct MemoryInner {
    sent: Vec<Envelope>,
    closed: bool,
    close_calls: usize,
}

/// In-memory channel that records everything sent through it.
///
/// Clones share the same record, so a test can hand one clone to a state
/// machine and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// All envelopes sent so far.
    pub fn sent(&self) -> Vec<Envelope> {
        self.lock().sent.clone()
    }

    /// Remove and return all envelopes sent so far.
    pub fn take_sent(&self) -> Vec<Envelope> {
        std::mem::take(&mut self.lock().sent)
    }

    /// Message types sent so far, in order.
    pub fn sent_types(&self) -> Vec<String> {
        self.lock().sent.iter().map(|e| e.msg_type.clone()).collect()
    }

    /// Number of times `close` was called.
    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // A poisoned record is still a valid record.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MessageChannel for MemoryChannel {
    fn send(&self, envelope: Envelope) -> NodebaseResult<()> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(NodebaseError::Transport("channel closed".into()));
        }
        inner.sent.push(envelope);
        Ok(())
    }

    fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.close_calls += 1;
    }

    fn is_open(&self) -> bool {
        !self.lock().closed
    }
}
