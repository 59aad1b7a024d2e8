//! BACnet/IP field side
//!
//! The physical link is served by a blocking listener thread. Requests are
//! routed to the gateway or to a routed device by their NPDU destination and
//! answered from the shared registry.

pub mod codec;
mod listener;
mod service;

pub use listener::{FieldSocket, ListenerHandle, ListenerSettings, spawn_listener};
pub use service::{Destination, FieldService, Outcome, Outgoing};
