//! Device registry

use std::sync::Arc;

use parking_lot::Mutex;

use super::{DeviceAddress, DeviceSpec, RoutedDevice};
use crate::error::DispatchError;
use crate::object::MAX_INSTANCE;

/// Registry shared between the control channel and the field listener.
/// Hold the lock for one operation only, never across I/O.
pub type SharedRegistry = Arc<Mutex<Registry>>;

/// Values every device in the registry is built with
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Virtual network number routed devices live on
    pub network_id: u16,
    pub max_devices: usize,
    /// Physical address of the gateway on the local link
    pub link_address: DeviceAddress,
    pub vendor_name: String,
    pub vendor_id: u16,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            network_id: 1000,
            max_devices: 32,
            link_address: DeviceAddress::default(),
            vendor_name: "bacgate".to_string(),
            vendor_id: 260,
        }
    }
}

/// Ordered set of routed devices; position 0 is the gateway
#[derive(Debug)]
pub struct Registry {
    devices: Vec<RoutedDevice>,
    settings: RegistrySettings,
}

impl Registry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            devices: Vec::new(),
            settings,
        }
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn network_id(&self) -> u16 {
        self.settings.network_id
    }

    pub fn gateway(&self) -> Option<&RoutedDevice> {
        self.devices.first()
    }

    pub fn device_at(&self, index: usize) -> Option<&RoutedDevice> {
        self.devices.get(index)
    }

    pub fn device_at_mut(&mut self, index: usize) -> Option<&mut RoutedDevice> {
        self.devices.get_mut(index)
    }

    pub fn by_instance(&self, instance: u32) -> Option<&RoutedDevice> {
        self.devices.iter().find(|device| device.instance() == instance)
    }

    pub fn by_instance_mut(&mut self, instance: u32) -> Option<&mut RoutedDevice> {
        self.devices.iter_mut().find(|device| device.instance() == instance)
    }

    pub fn instance_to_index(&self, instance: u32) -> Option<usize> {
        self.devices.iter().position(|device| device.instance() == instance)
    }

    pub fn index_to_instance(&self, index: usize) -> Option<u32> {
        self.devices.get(index).map(RoutedDevice::instance)
    }

    /// Routed (non-gateway) device answering on virtual MAC `mac`
    pub fn by_virtual_mac(&self, mac: &[u8]) -> Option<usize> {
        self.devices
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, device)| device.address().mac == mac)
            .map(|(index, _)| index)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoutedDevice> {
        self.devices.iter()
    }

    /// Create the gateway at position 0; repeating it with the same instance is a no-op
    pub fn create_gateway(&mut self, spec: DeviceSpec) -> Result<usize, DispatchError> {
        check_device_instance(spec.instance)?;
        if let Some(gateway) = self.gateway() {
            return if gateway.instance() == spec.instance {
                Ok(0)
            } else {
                Err(DispatchError::GatewayConflict(gateway.instance()))
            };
        }

        let address = self.settings.link_address.clone();
        self.devices.push(RoutedDevice::new(spec, address, &self.settings));
        Ok(0)
    }

    /// Append a routed device behind the gateway; existing instances are returned as-is
    pub fn add_device(&mut self, spec: DeviceSpec) -> Result<usize, DispatchError> {
        check_device_instance(spec.instance)?;
        if self.devices.is_empty() {
            return Err(DispatchError::GatewayMissing);
        }
        if let Some(index) = self.instance_to_index(spec.instance) {
            return Ok(index);
        }
        if self.devices.len() >= self.settings.max_devices {
            return Err(DispatchError::RegistryFull(self.settings.max_devices));
        }

        let address = DeviceAddress::virtual_for(spec.instance, self.settings.network_id);
        self.devices.push(RoutedDevice::new(spec, address, &self.settings));
        Ok(self.devices.len() - 1)
    }
}

fn check_device_instance(instance: u32) -> Result<(), DispatchError> {
    if instance >= MAX_INSTANCE {
        Err(DispatchError::InvalidDeviceInstance(instance))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(instance: u32) -> DeviceSpec {
        DeviceSpec {
            instance,
            name: format!("Device {}", instance),
            description: String::new(),
            model: "GW".to_string(),
            firmware_version: "0.1".to_string(),
        }
    }

    fn registry() -> Registry {
        Registry::new(RegistrySettings {
            link_address: DeviceAddress {
                net: 0,
                mac: vec![192, 168, 1, 10, 0xBA, 0xC0],
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_gateway_uses_link_address() {
        let mut registry = registry();
        assert_eq!(registry.create_gateway(spec(1)), Ok(0));
        let gateway = registry.gateway().unwrap();
        assert_eq!(gateway.instance(), 1);
        assert_eq!(gateway.address().mac, vec![192, 168, 1, 10, 0xBA, 0xC0]);
    }

    #[test]
    fn test_child_gets_virtual_address() {
        let mut registry = registry();
        registry.create_gateway(spec(1)).unwrap();
        assert_eq!(registry.add_device(spec(0x000102)), Ok(1));

        let child = registry.by_instance(0x000102).unwrap();
        assert_eq!(child.address().net, 1000);
        assert_eq!(child.address().mac, vec![0x00, 0x01, 0x02]);
        assert_eq!(registry.by_virtual_mac(&[0x00, 0x01, 0x02]), Some(1));
    }

    #[test]
    fn test_create_is_idempotent() {
        let mut registry = registry();
        registry.create_gateway(spec(1)).unwrap();
        assert_eq!(registry.create_gateway(spec(1)), Ok(0));
        assert_eq!(registry.add_device(spec(5)), Ok(1));
        assert_eq!(registry.add_device(spec(5)), Ok(1));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.index_to_instance(1), Some(5));
        assert_eq!(registry.instance_to_index(5), Some(1));
    }

    #[test]
    fn test_gateway_rules() {
        let mut registry = registry();
        assert_eq!(registry.add_device(spec(5)), Err(DispatchError::GatewayMissing));
        registry.create_gateway(spec(1)).unwrap();
        assert_eq!(registry.create_gateway(spec(2)), Err(DispatchError::GatewayConflict(1)));
        assert_eq!(registry.gateway().unwrap().instance(), 1);
    }

    #[test]
    fn test_capacity_and_instance_limits() {
        let mut registry = Registry::new(RegistrySettings {
            max_devices: 2,
            ..Default::default()
        });
        assert_eq!(
            registry.create_gateway(spec(MAX_INSTANCE)),
            Err(DispatchError::InvalidDeviceInstance(MAX_INSTANCE))
        );
        registry.create_gateway(spec(1)).unwrap();
        registry.add_device(spec(2)).unwrap();
        assert_eq!(registry.add_device(spec(3)), Err(DispatchError::RegistryFull(2)));
    }
}
