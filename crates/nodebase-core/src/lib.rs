//! nodebase-core: shared library for nodebase.
//!
//! Provides the error taxonomy, the JSON wire envelope used by the instance
//! tunnel protocol, the text codec, and the abstract message channel that the
//! tunnel state machines are driven through.

pub mod channel;
pub mod codec;
pub mod error;
pub mod messages;

// Re-export commonly used items at crate root.
pub use channel::{ChannelEvent, MemoryChannel, MessageChannel};
pub use codec::{decode, encode};
pub use error::{NodebaseError, NodebaseResult};
pub use messages::{msg, Envelope, InstanceInfo};
