//! Error types for the gateway.

use crate::object::ObjectType;

/// Errors raised while turning a control-channel request into a command.
/// Every variant is answered with `{error, bad_request}`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed command: {0}")]
    Malformed(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// Errors from creating or mutating a routed object
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ObjectError {
    #[error("Instance {0} exceeds the maximum object instance")]
    InstanceExhausted(u32),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Instance {instance} already holds a {existing:?} object")]
    InstanceTaken { instance: u32, existing: ObjectType },

    #[error("Object {0} is busy")]
    Busy(u32),

    #[error("Value {0} is out of range")]
    ValueOutOfRange(u32),
}

/// Errors from applying a command to the registry.
/// Every variant is answered with `{error, failed_processing}`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unknown device: {0}")]
    UnknownDevice(u32),

    #[error("Unknown object {object} on device {device}")]
    UnknownObject { device: u32, object: u32 },

    #[error("Object {object} on device {device} is not a {expected:?}")]
    WrongObjectType { device: u32, object: u32, expected: ObjectType },

    #[error("No gateway device has been created")]
    GatewayMissing,

    #[error("Gateway already exists with instance {0}")]
    GatewayConflict(u32),

    #[error("Device registry is full ({0} devices)")]
    RegistryFull(usize),

    #[error("Device instance {0} is out of range")]
    InvalidDeviceInstance(u32),

    #[error(transparent)]
    Object(#[from] ObjectError),
}

/// Errors on the control channel itself
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream ended inside a frame ({got} of {expected} bytes)")]
    Truncated { expected: usize, got: usize },

    #[error("Frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
}

/// Errors decoding BACnet/IP traffic from the field
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Packet truncated")]
    Truncated,

    #[error("Invalid BVLC header: {0}")]
    Bvlc(String),

    #[error("Invalid NPDU: {0}")]
    Npdu(String),

    #[error("Invalid APDU: {0}")]
    Apdu(String),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Unsupported application tag {0}")]
    UnsupportedValue(u8),
}

/// Errors loading the gateway configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    MissingFile(std::path::PathBuf),

    #[error("Failed to load configuration: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
