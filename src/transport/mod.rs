//! Mesh transport
//!
//! Named-channel framing between one authoritative server and its peers.
//! Frames travel as newline-delimited JSON over a Unix domain socket (or TCP
//! where local sockets are unavailable). Each node constructs and owns its
//! transport instances; nothing here is process-global.
//!
//! Channels: `item` and `priorityItem` flow peer→server; `command` flows in
//! both directions and is re-broadcast by the server hub.

mod client;
mod error;
mod frame;
mod server;

pub use client::{ClientEvent, TransportClient};
pub use error::{TransportError, TransportResult};
pub use frame::{Endpoint, Frame};
pub use server::{ServerEvent, TransportServer};
