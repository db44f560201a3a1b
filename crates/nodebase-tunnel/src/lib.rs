//! nodebase-tunnel: client side of the instance tunnel protocol.
//!
//! An [`InstanceHost`] creates (or reclaims) a named instance on a relay and
//! broadcasts to its members; an [`InstanceClient`] joins one by UUID; and
//! [`list_instances`] asks the relay which instances exist for a service.
//!
//! The host and client are synchronous state machines fed with
//! [`ChannelEvent`]s; [`WebSocketChannel`] supplies those events from a real
//! socket.
//!
//! ```no_run
//! use nodebase_tunnel::{HostEvent, HostOptions, InstanceHost, WebSocketChannel};
//!
//! # async fn example() -> nodebase_core::NodebaseResult<()> {
//! let url = nodebase_tunnel::build_ws_url("ws://127.0.0.1:8080/ws", None)?;
//! let (channel, mut inbound) = WebSocketChannel::connect(url.as_str()).await?;
//! let (mut host, mut events) = InstanceHost::new(channel, HostOptions::new("chat").name("Lobby"));
//!
//! while let Some(event) = inbound.recv().await {
//!     host.handle_event(event);
//!     while let Ok(event) = events.try_recv() {
//!         if let HostEvent::Created(ack) = event {
//!             println!("instance {:?} is live", ack.uuid);
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod directory;
pub mod endpoint;
pub mod host;
pub mod id;
pub mod websocket;

pub use client::{ClientEvent, ClientOptions, ClientState, InstanceClient};
pub use directory::{list_instances, list_instances_within, query_instances, LIST_TIMEOUT};
pub use endpoint::build_ws_url;
pub use host::{HostEvent, HostOptions, HostState, InstanceHost};
pub use id::generate_id;
pub use websocket::WebSocketChannel;

// Re-export the channel abstraction for convenience.
pub use nodebase_core::{ChannelEvent, MessageChannel};
