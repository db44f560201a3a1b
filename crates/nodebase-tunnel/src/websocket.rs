//! WebSocket implementation of [`MessageChannel`].
//!
//! Each frame is one JSON text message holding an [`Envelope`]. The socket is
//! split: a writer task drains an outbound queue into the sink, and a dispatch
//! loop decodes inbound frames into [`ChannelEvent`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use nodebase_core::{decode, encode, ChannelEvent, Envelope, MessageChannel};
use nodebase_core::{NodebaseError, NodebaseResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected WebSocket carrying tunnel protocol envelopes.
pub struct WebSocketChannel {
    outgoing: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
    writer_handle: JoinHandle<()>,
    dispatch_handle: JoinHandle<()>,
}

impl WebSocketChannel {
    /// Connect to a relay. The returned receiver yields `Open` first, then
    /// inbound messages, and ends with `Closed`.
    pub async fn connect(
        url: &str,
    ) -> NodebaseResult<(Self, mpsc::UnboundedReceiver<ChannelEvent>)> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| NodebaseError::Transport(format!("WebSocket connect error: {e}")))?;

        tracing::info!("WebSocket connected to {}", url);

        let (ws_sink, ws_read) = ws_stream.split();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<ChannelEvent>();
        let open = Arc::new(AtomicBool::new(true));

        let _ = events_tx.send(ChannelEvent::Open);

        let writer_handle = tokio::spawn(Self::write_loop(ws_sink, outgoing_rx));

        let dispatch_handle = {
            let outgoing = outgoing.clone();
            let open = open.clone();
            tokio::spawn(async move {
                Self::dispatch_loop(ws_read, events_tx, outgoing, open).await;
            })
        };

        Ok((
            Self {
                outgoing,
                open,
                writer_handle,
                dispatch_handle,
            },
            events_rx,
        ))
    }

    async fn write_loop(
        mut ws_sink: SplitSink<WsStream, Message>,
        mut outgoing: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = outgoing.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if let Err(e) = ws_sink.send(msg).await {
                tracing::warn!("WebSocket write error: {}", e);
                break;
            }
            if is_close {
                break;
            }
        }
        let _ = ws_sink.close().await;
    }

    /// Decode inbound frames until the socket closes.
    async fn dispatch_loop(
        mut ws_read: SplitStream<WsStream>,
        events: mpsc::UnboundedSender<ChannelEvent>,
        outgoing: mpsc::UnboundedSender<Message>,
        open: Arc<AtomicBool>,
    ) {
        while let Some(msg) = ws_read.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(_) => {
                        tracing::warn!("dropping non-UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(_)) => {
                    tracing::debug!("WebSocket close frame received");
                    break;
                }
                Ok(Message::Ping(payload)) => {
                    let _ = outgoing.send(Message::Pong(payload));
                    continue;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!("WebSocket read error: {}", e);
                    let _ = events.send(ChannelEvent::Error(e.to_string()));
                    break;
                }
            };

            match decode(&text) {
                Ok(envelope) => {
                    if events.send(ChannelEvent::Message(envelope)).is_err() {
                        tracing::debug!("event receiver dropped");
                        break;
                    }
                }
                Err(e) => tracing::warn!("dropping invalid frame: {}", e),
            }
        }

        open.store(false, Ordering::SeqCst);
        let _ = events.send(ChannelEvent::Closed);
        tracing::debug!("WebSocket dispatch loop ended");
    }
}

impl MessageChannel for WebSocketChannel {
    fn send(&self, envelope: Envelope) -> NodebaseResult<()> {
        if !self.is_open() {
            return Err(NodebaseError::Transport("channel closed".into()));
        }
        let text = encode(&envelope)?;
        self.outgoing
            .send(Message::Text(text))
            .map_err(|_| NodebaseError::Transport("WebSocket writer stopped".into()))
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.outgoing.send(Message::Close(None));
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.dispatch_handle.abort();
        // Once closed, the writer exits by itself after flushing the close frame.
        if self.is_open() {
            self.writer_handle.abort();
        }
    }
}

impl std::fmt::Debug for WebSocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketChannel")
            .field("open", &self.is_open())
            .finish()
    }
}
