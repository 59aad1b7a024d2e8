//! Gateway configuration
//!
//! Layered with figment, lowest priority first:
//! 1. built-in defaults
//! 2. the TOML file given on the command line, if any
//! 3. `BACGATE_*` environment variables (`BACGATE_NETWORK_ID`, `BACGATE_PORT`, ...)
//! 4. the legacy `BACNET_NETWORK_ID`, `BACNET_IP` and `BACNET_PORT` variables

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::device::{DeviceAddress, RegistrySettings};
use crate::error::ConfigError;
use crate::field::ListenerSettings;
use crate::port::DEFAULT_HEARTBEAT_PERIOD;

/// Legacy variables and the keys they set
const LEGACY_ENV: [(&str, &str); 3] = [
    ("BACNET_NETWORK_ID", "network_id"),
    ("BACNET_IP", "interface"),
    ("BACNET_PORT", "port"),
];

/// Smallest frame limit that still fits a control-channel call
const MIN_FRAME_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Network number of the virtual network behind the gateway
    pub network_id: u16,
    /// Address the field socket binds to
    pub interface: IpAddr,
    /// BACnet/IP UDP port
    pub port: u16,
    /// Directed broadcast address (e.g. "10.0.1.255"); limited broadcast when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<Ipv4Addr>,
    /// Field receive timeout, in milliseconds
    pub receive_timeout_ms: u64,
    pub heartbeat_interval_secs: u64,
    pub max_devices: usize,
    /// Largest accepted control-channel frame, in bytes
    pub max_frame_len: usize,
    pub vendor_id: u16,
    pub vendor_name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            network_id: 1000,
            interface: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 47808,
            broadcast: None,
            receive_timeout_ms: 3000,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_PERIOD.as_secs(),
            max_devices: 32,
            max_frame_len: 16 * 1024 * 1024,
            vendor_id: 260,
            vendor_name: "bacgate".to_string(),
        }
    }
}

impl GatewayConfig {
    /// The layered provider chain; callers may merge further overrides
    pub fn figment(path: Option<&Path>) -> Result<Figment, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(GatewayConfig::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
            figment = figment.merge(Toml::file(path));
        }
        Ok(figment.merge(Env::prefixed("BACGATE_")).merge(legacy_env()))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::extract(Self::figment(path)?)
    }

    pub fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: GatewayConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receive_timeout_ms == 0 {
            return Err(ConfigError::Invalid("receive_timeout_ms must be positive".to_string()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid("heartbeat_interval_secs must be positive".to_string()));
        }
        if self.max_devices == 0 {
            return Err(ConfigError::Invalid("max_devices must be at least 1".to_string()));
        }
        if self.max_frame_len < MIN_FRAME_LEN {
            return Err(ConfigError::Invalid(format!(
                "max_frame_len must be at least {} bytes",
                MIN_FRAME_LEN
            )));
        }
        if self.network_id == 0 || self.network_id == u16::MAX {
            return Err(ConfigError::Invalid(format!(
                "network_id {} is reserved",
                self.network_id
            )));
        }
        Ok(())
    }

    pub fn listener_settings(&self) -> ListenerSettings {
        ListenerSettings {
            interface: self.interface,
            port: self.port,
            broadcast: self
                .broadcast
                .map(|ip| SocketAddr::new(IpAddr::V4(ip), self.port)),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
        }
    }

    pub fn registry_settings(&self, link_address: DeviceAddress) -> RegistrySettings {
        RegistrySettings {
            network_id: self.network_id,
            max_devices: self.max_devices,
            link_address,
            vendor_name: self.vendor_name.clone(),
            vendor_id: self.vendor_id,
        }
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

fn legacy_env() -> Env {
    Env::raw().filter_map(|key| {
        LEGACY_ENV
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, field)| (*field).into())
    })
}
