//! bacgate - routed BACnet/IP gateway
//!
//! A single BACnet/IP presence fronting a set of virtual devices. The
//! supervising Erlang process creates and updates the devices over a
//! length-prefixed external-term channel on stdin/stdout:
//! - `port`: framing, call correlation, outbound notifications
//! - `protocol`: the command vocabulary and its term decoding
//! - `dispatch`: applies commands to the device registry
//! - `device` / `object`: routed devices and their data points
//! - `field`: the BACnet/IP side served from the same registry

pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod field;
pub mod object;
pub mod port;
pub mod protocol;

pub use config::GatewayConfig;
pub use dispatch::Dispatcher;
